//! Recording approvals and promoting assessments that reach quorum.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use riskreview_core::{Actor, ApprovalDraft, AssessmentId, PersonId, ReviewStatus};

use super::{ensure_not_cancelled, lock_existing};
use super::lifecycle::{log_conflict, promote_if_quorum_met};
use super::locks::AssessmentLocks;
use crate::clock::Clock;
use crate::config::ReviewSettings;
use crate::directory::PersonDirectory;
use crate::error::ServiceError;
use crate::repository::AssessmentRepository;

/// Result of an approve call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalOutcome {
    /// Approvals counted toward quorum in the current cycle, this call included.
    pub approvals_received: usize,
    pub minimum_approvals_required: usize,
    /// Whether the assessment is approved after this call.
    pub assessment_approved: bool,
    /// Set only when this call caused the promotion.
    pub next_review_date: Option<NaiveDate>,
}

/// Count the approvals of a cycle toward quorum.
///
/// With `distinct` set, repeated approvals by one person count once.
pub fn count_toward_quorum<'a, I>(approvers: I, distinct: bool) -> usize
where
    I: IntoIterator<Item = &'a PersonId>,
{
    if distinct {
        approvers.into_iter().collect::<HashSet<_>>().len()
    } else {
        approvers.into_iter().count()
    }
}

pub struct ApprovalQuorumTracker {
    repository: Arc<dyn AssessmentRepository>,
    directory: Arc<dyn PersonDirectory>,
    clock: Arc<dyn Clock>,
    locks: Arc<AssessmentLocks>,
    settings: ReviewSettings,
}

impl ApprovalQuorumTracker {
    pub fn new(
        repository: Arc<dyn AssessmentRepository>,
        directory: Arc<dyn PersonDirectory>,
        clock: Arc<dyn Clock>,
        locks: Arc<AssessmentLocks>,
        settings: ReviewSettings,
    ) -> Self {
        Self {
            repository,
            directory,
            clock,
            locks,
            settings,
        }
    }

    /// Record one approval per approver and promote the assessment if the
    /// current cycle now has enough of them.
    ///
    /// All approver ids must resolve in the person directory. If any do not,
    /// the call fails naming every unresolved id and nothing is written.
    pub async fn approve(
        &self,
        id: AssessmentId,
        approver_ids: Vec<PersonId>,
        notes: Option<String>,
        actor: Actor,
        cancel: &CancellationToken,
    ) -> Result<ApprovalOutcome, ServiceError> {
        let (_guard, current) = lock_existing(&self.locks, self.repository.as_ref(), id).await?;

        if approver_ids.is_empty() {
            return Err(ServiceError::validation(
                "at least one approver must be given",
            ));
        }
        self.ensure_all_resolve(&approver_ids).await?;
        ensure_not_cancelled(cancel)?;

        let existing = self.repository.list_approvals(id).await?;
        let approvals_received = count_toward_quorum(
            existing
                .iter()
                .map(|a| &a.approver_id)
                .chain(approver_ids.iter()),
            self.settings.count_distinct_approvers,
        );

        let now = self.clock.now();
        let result = promote_if_quorum_met(
            current,
            approvals_received,
            self.settings.minimum_approvals_required,
            self.clock.today(),
            actor.clone(),
            now,
        );
        let drafts: Vec<ApprovalDraft> = approver_ids
            .into_iter()
            .map(|approver_id| ApprovalDraft {
                approver_id,
                approved_at: now,
                notes: notes.clone(),
            })
            .collect();

        ensure_not_cancelled(cancel)?;
        let (saved, inserted) = self
            .repository
            .record_approvals(&result.assessment, drafts)
            .await
            .map_err(|e| log_conflict(id, e))?;

        let next_review_date = result.promoted_next_review_date();
        info!(
            "Risk assessment {}: {} approval(s) recorded by {}, {}/{} toward quorum",
            id,
            inserted.len(),
            actor,
            approvals_received,
            self.settings.minimum_approvals_required
        );
        if let Some(next) = next_review_date {
            info!("Risk assessment {} approved, next review due {}", id, next);
        }

        Ok(ApprovalOutcome {
            approvals_received,
            minimum_approvals_required: self.settings.minimum_approvals_required,
            assessment_approved: saved.status == ReviewStatus::Approved,
            next_review_date,
        })
    }

    async fn ensure_all_resolve(&self, approver_ids: &[PersonId]) -> Result<(), ServiceError> {
        let mut unresolved: Vec<&PersonId> = Vec::new();
        for approver_id in approver_ids {
            if unresolved.contains(&approver_id) {
                continue;
            }
            if self.directory.resolve(approver_id).await?.is_none() {
                debug!("Approver {} not found in person directory", approver_id);
                unresolved.push(approver_id);
            }
        }
        if unresolved.is_empty() {
            return Ok(());
        }
        let names: Vec<String> = unresolved.iter().map(|id| id.to_string()).collect();
        Err(ServiceError::validation(format!(
            "unknown approver id(s): {}",
            names.join(", ")
        )))
    }
}
