//! JSON-over-HTTP surface for the review service.
//!
//! The caller identifies itself with the `X-Actor` header, which is recorded
//! in audit fields and logs. There is no authentication at this layer.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use riskreview_core::{Actor, AssessmentId, Category, CategoryId, PersonId, RiskAssessment};

use crate::catalog::CategoryInput;
use crate::dashboard;
use crate::error::ServiceError;
use crate::review::{
    ApprovalOutcome, AssessmentHistory, AssessmentInput, AssessmentView, ListFilter,
};
use crate::AppState;

pub const ACTOR_HEADER: &str = "x-actor";
const ANONYMOUS: &str = "anonymous";

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServiceError::NotFound { .. } => StatusCode::NOT_FOUND,
            ServiceError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::Conflict(_) => StatusCode::CONFLICT,
            ServiceError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = match self {
            ServiceError::Internal(detail) => {
                error!("Internal error while handling request: {}", detail);
                "internal error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// The actor named by the `X-Actor` header, or "anonymous".
fn actor_from_headers(headers: &HeaderMap) -> Actor {
    headers
        .get(ACTOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(Actor::from)
        .unwrap_or_else(|| Actor::from(ANONYMOUS))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAssessmentRequest {
    pub category_id: CategoryId,
    #[serde(flatten)]
    pub details: AssessmentInput,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproveRequest {
    pub approver_ids: Vec<PersonId>,
    #[serde(default)]
    pub notes: Option<String>,
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "service": "riskreview",
        "version": crate::get_service_version(),
    }))
}

// =============================================================================
// Categories
// =============================================================================

async fn list_categories(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Category>>, ServiceError> {
    Ok(Json(state.service.list_categories().await?))
}

async fn create_category(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(input): Json<CategoryInput>,
) -> Result<(StatusCode, Json<Category>), ServiceError> {
    let cancel = state.shutdown.child_token();
    let category = state
        .service
        .create_category(input, actor_from_headers(&headers), &cancel)
        .await?;
    Ok((StatusCode::CREATED, Json(category)))
}

async fn get_category(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Category>, ServiceError> {
    Ok(Json(state.service.get_category(CategoryId(id)).await?))
}

async fn update_category(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(input): Json<CategoryInput>,
) -> Result<Json<Category>, ServiceError> {
    let cancel = state.shutdown.child_token();
    let category = state
        .service
        .update_category(CategoryId(id), input, actor_from_headers(&headers), &cancel)
        .await?;
    Ok(Json(category))
}

async fn delete_category(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<StatusCode, ServiceError> {
    let cancel = state.shutdown.child_token();
    state
        .service
        .delete_category(CategoryId(id), actor_from_headers(&headers), &cancel)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Assessments
// =============================================================================

async fn list_assessments(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<ListFilter>,
) -> Result<Json<Vec<AssessmentView>>, ServiceError> {
    Ok(Json(state.service.list_assessments(&filter).await?))
}

async fn create_assessment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<CreateAssessmentRequest>,
) -> Result<(StatusCode, Json<RiskAssessment>), ServiceError> {
    let cancel = state.shutdown.child_token();
    let assessment = state
        .service
        .create_assessment(
            request.category_id,
            request.details,
            actor_from_headers(&headers),
            &cancel,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(assessment)))
}

async fn get_assessment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<AssessmentView>, ServiceError> {
    Ok(Json(state.service.get_assessment(AssessmentId(id)).await?))
}

async fn update_assessment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(input): Json<AssessmentInput>,
) -> Result<Json<RiskAssessment>, ServiceError> {
    let cancel = state.shutdown.child_token();
    let assessment = state
        .service
        .update_assessment(
            AssessmentId(id),
            input,
            actor_from_headers(&headers),
            &cancel,
        )
        .await?;
    Ok(Json(assessment))
}

async fn start_review(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<RiskAssessment>, ServiceError> {
    let cancel = state.shutdown.child_token();
    let assessment = state
        .service
        .start_review(AssessmentId(id), actor_from_headers(&headers), &cancel)
        .await?;
    Ok(Json(assessment))
}

async fn approve(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(request): Json<ApproveRequest>,
) -> Result<Json<ApprovalOutcome>, ServiceError> {
    let cancel = state.shutdown.child_token();
    let outcome = state
        .service
        .approve(
            AssessmentId(id),
            request.approver_ids,
            request.notes,
            actor_from_headers(&headers),
            &cancel,
        )
        .await?;
    Ok(Json(outcome))
}

async fn get_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<AssessmentHistory>, ServiceError> {
    Ok(Json(state.service.get_history(AssessmentId(id)).await?))
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/categories", get(list_categories).post(create_category))
        .route(
            "/categories/{id}",
            get(get_category)
                .put(update_category)
                .delete(delete_category),
        )
        .route(
            "/assessments",
            get(list_assessments).post(create_assessment),
        )
        .route(
            "/assessments/{id}",
            get(get_assessment).put(update_assessment),
        )
        .route("/assessments/{id}/start-review", post(start_review))
        .route("/assessments/{id}/approve", post(approve))
        .route("/assessments/{id}/history", get(get_history))
        .route("/dashboard/summary", get(dashboard::handlers::get_summary))
        .with_state(state)
}
