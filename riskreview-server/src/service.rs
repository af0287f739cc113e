//! The operations exposed to callers, wired to their components.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use riskreview_core::{Actor, AssessmentId, Category, CategoryId, PersonId, RiskAssessment};

use crate::catalog::{CategoryCatalog, CategoryInput};
use crate::clock::Clock;
use crate::config::ReviewSettings;
use crate::dashboard::{DashboardSummarizer, DashboardSummary};
use crate::directory::PersonDirectory;
use crate::error::ServiceError;
use crate::repository::AssessmentRepository;
use crate::review::{
    ApprovalOutcome, ApprovalQuorumTracker, AssessmentHistory, AssessmentInput, AssessmentLocks,
    AssessmentQueries, AssessmentView, HistoryProjector, ListFilter, ReviewLifecycleManager,
};

pub struct RiskReviewService {
    settings: ReviewSettings,
    lifecycle: ReviewLifecycleManager,
    quorum: ApprovalQuorumTracker,
    history: HistoryProjector,
    queries: AssessmentQueries,
    dashboard: DashboardSummarizer,
    catalog: CategoryCatalog,
}

impl RiskReviewService {
    pub fn new(
        repository: Arc<dyn AssessmentRepository>,
        directory: Arc<dyn PersonDirectory>,
        clock: Arc<dyn Clock>,
        settings: ReviewSettings,
    ) -> Self {
        let locks = Arc::new(AssessmentLocks::new());
        Self {
            settings,
            lifecycle: ReviewLifecycleManager::new(
                repository.clone(),
                clock.clone(),
                locks.clone(),
            ),
            quorum: ApprovalQuorumTracker::new(
                repository.clone(),
                directory.clone(),
                clock.clone(),
                locks,
                settings,
            ),
            history: HistoryProjector::new(repository.clone(), directory),
            queries: AssessmentQueries::new(repository.clone(), clock.clone()),
            dashboard: DashboardSummarizer::new(
                repository.clone(),
                clock.clone(),
                settings.review_lookahead_days,
            ),
            catalog: CategoryCatalog::new(repository, clock),
        }
    }

    pub fn settings(&self) -> &ReviewSettings {
        &self.settings
    }

    // =========================================================================
    // Assessments
    // =========================================================================

    pub async fn create_assessment(
        &self,
        category_id: CategoryId,
        input: AssessmentInput,
        actor: Actor,
        cancel: &CancellationToken,
    ) -> Result<RiskAssessment, ServiceError> {
        self.lifecycle.create(category_id, input, actor, cancel).await
    }

    pub async fn update_assessment(
        &self,
        id: AssessmentId,
        input: AssessmentInput,
        actor: Actor,
        cancel: &CancellationToken,
    ) -> Result<RiskAssessment, ServiceError> {
        self.lifecycle.update(id, input, actor, cancel).await
    }

    pub async fn start_review(
        &self,
        id: AssessmentId,
        actor: Actor,
        cancel: &CancellationToken,
    ) -> Result<RiskAssessment, ServiceError> {
        self.lifecycle.start_review(id, actor, cancel).await
    }

    pub async fn approve(
        &self,
        id: AssessmentId,
        approver_ids: Vec<PersonId>,
        notes: Option<String>,
        actor: Actor,
        cancel: &CancellationToken,
    ) -> Result<ApprovalOutcome, ServiceError> {
        self.quorum
            .approve(id, approver_ids, notes, actor, cancel)
            .await
    }

    pub async fn get_assessment(&self, id: AssessmentId) -> Result<AssessmentView, ServiceError> {
        self.queries.get(id).await
    }

    pub async fn list_assessments(
        &self,
        filter: &ListFilter,
    ) -> Result<Vec<AssessmentView>, ServiceError> {
        self.queries.list(filter).await
    }

    pub async fn get_history(&self, id: AssessmentId) -> Result<AssessmentHistory, ServiceError> {
        self.history.history(id).await
    }

    pub async fn get_dashboard_summary(&self) -> Result<DashboardSummary, ServiceError> {
        self.dashboard.summary().await
    }

    // =========================================================================
    // Categories
    // =========================================================================

    pub async fn create_category(
        &self,
        input: CategoryInput,
        actor: Actor,
        cancel: &CancellationToken,
    ) -> Result<Category, ServiceError> {
        self.catalog.create(input, actor, cancel).await
    }

    pub async fn update_category(
        &self,
        id: CategoryId,
        input: CategoryInput,
        actor: Actor,
        cancel: &CancellationToken,
    ) -> Result<Category, ServiceError> {
        self.catalog.update(id, input, actor, cancel).await
    }

    pub async fn delete_category(
        &self,
        id: CategoryId,
        actor: Actor,
        cancel: &CancellationToken,
    ) -> Result<(), ServiceError> {
        self.catalog.delete(id, actor, cancel).await
    }

    pub async fn get_category(&self, id: CategoryId) -> Result<Category, ServiceError> {
        self.catalog.get(id).await
    }

    pub async fn list_categories(&self) -> Result<Vec<Category>, ServiceError> {
        self.catalog.list().await
    }
}
