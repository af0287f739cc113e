//! Approval history of an assessment, with approver names resolved.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::warn;

use riskreview_core::{Approval, ApprovalId, AssessmentId, CategoryId, PersonId};

use crate::directory::PersonDirectory;
use crate::error::ServiceError;
use crate::repository::AssessmentRepository;

/// Shown in place of a name the directory could not supply.
pub const UNKNOWN_NAME: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentHistory {
    pub assessment_id: AssessmentId,
    pub title: String,
    pub category_id: CategoryId,
    pub category_name: String,
    pub cycles: Vec<ReviewCycle>,
}

/// The approvals given in one review cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewCycle {
    /// The assessment's last review date. After a restart the open cycle
    /// still carries the date of the previous approval; `None` if the
    /// assessment has never been approved.
    pub review_date: Option<NaiveDate>,
    pub approvals: Vec<CycleApproval>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleApproval {
    pub approval_id: ApprovalId,
    pub approver_id: PersonId,
    pub approver_name: String,
    pub approved_at: DateTime<Utc>,
    pub notes: Option<String>,
}

pub struct HistoryProjector {
    repository: Arc<dyn AssessmentRepository>,
    directory: Arc<dyn PersonDirectory>,
}

impl HistoryProjector {
    pub fn new(
        repository: Arc<dyn AssessmentRepository>,
        directory: Arc<dyn PersonDirectory>,
    ) -> Self {
        Self {
            repository,
            directory,
        }
    }

    /// Project the stored approvals into review cycles.
    ///
    /// Only the current cycle is kept in storage (a restart deletes the
    /// previous one), so the result holds zero or one cycle.
    pub async fn history(&self, id: AssessmentId) -> Result<AssessmentHistory, ServiceError> {
        let assessment = self
            .repository
            .get_assessment(id)
            .await?
            .ok_or_else(|| ServiceError::assessment_not_found(id))?;

        let category_name = match self.repository.get_category(assessment.category_id).await? {
            Some(category) => category.name,
            None => {
                warn!(
                    "Risk assessment {} references missing category {}",
                    id, assessment.category_id
                );
                UNKNOWN_NAME.to_string()
            }
        };

        let mut approvals = self.repository.list_approvals(id).await?;
        approvals.sort_by_key(|a| (a.approved_at, a.id));

        let cycles = if approvals.is_empty() {
            vec![]
        } else {
            let mut resolved = Vec::with_capacity(approvals.len());
            for approval in approvals {
                let approver_name = self.display_name(&approval.approver_id).await;
                resolved.push(cycle_approval(approval, approver_name));
            }
            vec![ReviewCycle {
                review_date: assessment.last_review_date,
                approvals: resolved,
            }]
        };

        Ok(AssessmentHistory {
            assessment_id: assessment.id,
            title: assessment.details.title,
            category_id: assessment.category_id,
            category_name,
            cycles,
        })
    }

    async fn display_name(&self, approver_id: &PersonId) -> String {
        match self.directory.resolve(approver_id).await {
            Ok(Some(name)) => name,
            Ok(None) => UNKNOWN_NAME.to_string(),
            Err(e) => {
                warn!("Failed to resolve approver {}: {}", approver_id, e);
                UNKNOWN_NAME.to_string()
            }
        }
    }
}

fn cycle_approval(approval: Approval, approver_name: String) -> CycleApproval {
    CycleApproval {
        approval_id: approval.id,
        approver_id: approval.approver_id,
        approver_name,
        approved_at: approval.approved_at,
        notes: approval.notes,
    }
}
