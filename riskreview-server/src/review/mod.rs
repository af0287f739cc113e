//! The review workflow: lifecycle changes, approvals, history and reads.
//!
//! Each component is a thin async shell around the pure rules in
//! `riskreview_core`. Mutating components share one `AssessmentLocks` so
//! that every write to an assessment and its approvals is serialized.

pub mod history;
pub mod lifecycle;
mod locks;
pub mod queries;
pub mod quorum;

pub use history::{AssessmentHistory, CycleApproval, HistoryProjector, ReviewCycle};
pub use lifecycle::{AssessmentInput, ReviewLifecycleManager};
pub use locks::AssessmentLocks;
pub use queries::{AssessmentQueries, AssessmentView, ListFilter};
pub use quorum::{ApprovalOutcome, ApprovalQuorumTracker};

use tokio::sync::OwnedMutexGuard;
use tokio_util::sync::CancellationToken;

use riskreview_core::{AssessmentId, RiskAssessment};

use crate::error::ServiceError;
use crate::repository::AssessmentRepository;

/// Fail with `Cancelled` if the caller has given up. Called after
/// validation and again right before the commit.
pub(crate) fn ensure_not_cancelled(cancel: &CancellationToken) -> Result<(), ServiceError> {
    if cancel.is_cancelled() {
        Err(ServiceError::Cancelled)
    } else {
        Ok(())
    }
}

/// Take the write lock on a stored assessment and load it under the lock.
///
/// Unknown ids fail with `NotFound` before a lock entry is created, so the
/// lock table only ever holds ids of assessments that exist. Assessments
/// are never deleted, which keeps the second read from missing.
pub(crate) async fn lock_existing(
    locks: &AssessmentLocks,
    repository: &dyn AssessmentRepository,
    id: AssessmentId,
) -> Result<(OwnedMutexGuard<()>, RiskAssessment), ServiceError> {
    if repository.get_assessment(id).await?.is_none() {
        return Err(ServiceError::assessment_not_found(id));
    }
    let guard = locks.acquire(id).await;
    let current = repository
        .get_assessment(id)
        .await?
        .ok_or_else(|| ServiceError::assessment_not_found(id))?;
    Ok((guard, current))
}
