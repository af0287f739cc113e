//! Types for the dashboard summary.

use chrono::NaiveDate;
use serde::Serialize;

/// Assessments per alert colour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AlertBreakdown {
    pub red: usize,
    pub amber: usize,
    pub green: usize,
}

/// Rollup of review work across every assessment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    /// The date the counts were computed for.
    pub as_of: NaiveDate,
    /// Window used for `due_soon_count`.
    pub lookahead_days: i64,
    /// Approved assessments whose next review date has passed.
    pub overdue_count: usize,
    /// Approved assessments due within the lookahead window, today included.
    pub due_soon_count: usize,
    pub total_count: usize,
    pub under_review_count: usize,
    pub alerts: AlertBreakdown,
}
