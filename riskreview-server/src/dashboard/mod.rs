//! Dashboard rollup of overdue and due-soon review work.
//!
//! This module provides:
//! - A pure `summarize` over a slice of assessments
//! - `DashboardSummarizer`, which reads every assessment and summarizes it
//! - The JSON handler for `GET /dashboard/summary`

pub mod handlers;
pub mod types;

use std::sync::Arc;

use chrono::NaiveDate;

use riskreview_core::{days_until, AlertStatus, ReviewStatus, RiskAssessment};

pub use types::{AlertBreakdown, DashboardSummary};

use crate::clock::Clock;
use crate::error::ServiceError;
use crate::repository::AssessmentRepository;

/// Count overdue and due-soon work as of `today`.
///
/// Only approved assessments are ever overdue or due soon; one under review
/// is already being worked on.
pub fn summarize(
    assessments: &[RiskAssessment],
    today: NaiveDate,
    lookahead_days: i64,
) -> DashboardSummary {
    let mut summary = DashboardSummary {
        as_of: today,
        lookahead_days,
        overdue_count: 0,
        due_soon_count: 0,
        total_count: assessments.len(),
        under_review_count: 0,
        alerts: AlertBreakdown::default(),
    };

    for assessment in assessments {
        match assessment.status {
            ReviewStatus::UnderReview => summary.under_review_count += 1,
            ReviewStatus::Approved => {
                let days = days_until(assessment.next_review_date, today);
                if days < 0 {
                    summary.overdue_count += 1;
                } else if days <= lookahead_days {
                    summary.due_soon_count += 1;
                }
            }
        }

        match assessment.alert_status(today) {
            AlertStatus::Red => summary.alerts.red += 1,
            AlertStatus::Amber => summary.alerts.amber += 1,
            AlertStatus::Green => summary.alerts.green += 1,
        }
    }

    summary
}

pub struct DashboardSummarizer {
    repository: Arc<dyn AssessmentRepository>,
    clock: Arc<dyn Clock>,
    lookahead_days: i64,
}

impl DashboardSummarizer {
    pub fn new(
        repository: Arc<dyn AssessmentRepository>,
        clock: Arc<dyn Clock>,
        lookahead_days: i64,
    ) -> Self {
        Self {
            repository,
            clock,
            lookahead_days,
        }
    }

    pub async fn summary(&self) -> Result<DashboardSummary, ServiceError> {
        let assessments = self.repository.list_assessments().await?;
        Ok(summarize(
            &assessments,
            self.clock.today(),
            self.lookahead_days,
        ))
    }
}
