//! Creating, editing and restarting reviews of risk assessments.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use riskreview_core::{
    initial_draft, transition, Actor, AssessmentDetails, AssessmentId, CategoryId,
    LifecycleEffect, LifecycleEvent, ReviewInterval, RiskAssessment, TransitionResult,
};

use super::{ensure_not_cancelled, lock_existing};
use super::locks::AssessmentLocks;
use crate::clock::Clock;
use crate::error::ServiceError;
use crate::repository::{AssessmentRepository, RepositoryError};

/// Caller-supplied descriptive fields, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentInput {
    pub title: String,
    /// Years between reviews; must be 1, 2, 3 or 5.
    pub review_interval: u32,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl AssessmentInput {
    /// Check the input and turn it into domain details.
    pub fn validate(self) -> Result<AssessmentDetails, ServiceError> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(ServiceError::validation("title must not be empty"));
        }
        let review_interval = ReviewInterval::try_from(self.review_interval)?;
        Ok(AssessmentDetails {
            title: title.to_string(),
            review_interval,
            description: self.description,
            scope: self.scope,
            notes: self.notes,
        })
    }
}

/// Promote an assessment once its current cycle has enough approvals.
///
/// Below the minimum, or when the assessment is already approved, nothing
/// changes. Shared with the quorum tracker so both paths use one rule.
pub(crate) fn promote_if_quorum_met(
    assessment: RiskAssessment,
    approvals_received: usize,
    minimum_approvals_required: usize,
    today: NaiveDate,
    actor: Actor,
    at: DateTime<Utc>,
) -> TransitionResult {
    if approvals_received < minimum_approvals_required {
        return TransitionResult::no_change(assessment);
    }
    transition(
        assessment,
        LifecycleEvent::QuorumReached { today, actor, at },
    )
}

pub struct ReviewLifecycleManager {
    repository: Arc<dyn AssessmentRepository>,
    clock: Arc<dyn Clock>,
    locks: Arc<AssessmentLocks>,
}

impl ReviewLifecycleManager {
    pub fn new(
        repository: Arc<dyn AssessmentRepository>,
        clock: Arc<dyn Clock>,
        locks: Arc<AssessmentLocks>,
    ) -> Self {
        Self {
            repository,
            clock,
            locks,
        }
    }

    /// Create a new assessment, under review and due one interval from today.
    pub async fn create(
        &self,
        category_id: CategoryId,
        input: AssessmentInput,
        actor: Actor,
        cancel: &CancellationToken,
    ) -> Result<RiskAssessment, ServiceError> {
        let details = input.validate()?;
        if self.repository.get_category(category_id).await?.is_none() {
            return Err(ServiceError::category_not_found(category_id));
        }
        ensure_not_cancelled(cancel)?;

        let draft = initial_draft(
            category_id,
            details,
            self.clock.today(),
            actor.clone(),
            self.clock.now(),
        );
        let assessment = self.repository.insert_assessment(draft).await?;

        info!(
            "Created risk assessment {} '{}' in category {} by {} (next review {})",
            assessment.id,
            assessment.details.title,
            category_id,
            actor,
            assessment.next_review_date
        );
        Ok(assessment)
    }

    /// Replace the descriptive fields and interval. Status, dates and
    /// approvals are left alone.
    pub async fn update(
        &self,
        id: AssessmentId,
        input: AssessmentInput,
        actor: Actor,
        cancel: &CancellationToken,
    ) -> Result<RiskAssessment, ServiceError> {
        let details = input.validate()?;
        let (_guard, current) = lock_existing(&self.locks, self.repository.as_ref(), id).await?;
        let event = LifecycleEvent::DetailsEdited {
            details,
            actor,
            at: self.clock.now(),
        };
        let summary = event.log_summary();
        let result = transition(current, event);

        ensure_not_cancelled(cancel)?;
        let saved = self
            .repository
            .save_assessment(&result.assessment)
            .await
            .map_err(|e| log_conflict(id, e))?;

        info!("Risk assessment {}: {}", id, summary);
        Ok(saved)
    }

    /// Revoke every in-flight approval and put the assessment back under
    /// review. Both dates are kept. Safe to repeat.
    pub async fn start_review(
        &self,
        id: AssessmentId,
        actor: Actor,
        cancel: &CancellationToken,
    ) -> Result<RiskAssessment, ServiceError> {
        let (_guard, current) = lock_existing(&self.locks, self.repository.as_ref(), id).await?;
        let previous_status = current.status;
        let event = LifecycleEvent::ReviewStarted {
            actor,
            at: self.clock.now(),
        };
        let summary = event.log_summary();
        let result = transition(current, event);

        debug_assert!(result.effects.contains(&LifecycleEffect::ClearApprovals));

        ensure_not_cancelled(cancel)?;
        let (saved, cleared) = self
            .repository
            .restart_review(&result.assessment)
            .await
            .map_err(|e| log_conflict(id, e))?;

        info!(
            "Risk assessment {}: {} ({} -> {}), cleared {} approval(s)",
            id, summary, previous_status, saved.status, cleared
        );
        Ok(saved)
    }
}

/// Convert a repository failure, warning on version conflicts: with the
/// per-assessment lock held, only another process can cause one.
pub(crate) fn log_conflict(id: AssessmentId, err: RepositoryError) -> ServiceError {
    if let RepositoryError::Conflict {
        expected_version, ..
    } = &err
    {
        warn!(
            "Risk assessment {} was modified concurrently (expected version {})",
            id, expected_version
        );
    }
    err.into()
}
