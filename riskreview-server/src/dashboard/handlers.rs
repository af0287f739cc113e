//! HTTP handler for the dashboard API.

use std::sync::Arc;

use axum::{extract::State, Json};

use super::DashboardSummary;
use crate::error::ServiceError;
use crate::AppState;

/// Handler: GET /dashboard/summary
///
/// Overdue, due-soon and total counts as of today, using the configured
/// lookahead window.
pub async fn get_summary(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DashboardSummary>, ServiceError> {
    let summary = state.service.get_dashboard_summary().await?;
    Ok(Json(summary))
}
