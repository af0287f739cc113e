//! Repository abstraction for assessment persistence.
//!
//! This module defines the `AssessmentRepository` trait that abstracts
//! storage of categories, assessments and approvals. Implementations
//! provide different backends (in-memory, SQLite).
//!
//! # Aggregate writes
//!
//! An assessment exclusively owns the approvals of its current review cycle.
//! Writes that touch both (`record_approvals`, `restart_review`) and plain
//! assessment saves are compare-and-swap on `RiskAssessment::version`: the
//! caller passes the assessment as it read it (with its updates applied),
//! the repository checks the stored version still matches, writes everything
//! in one transaction, and returns the assessment with the bumped version.
//! A mismatch is reported as `RepositoryError::Conflict` and nothing is
//! written.

mod memory;
mod sqlite;

pub use memory::InMemoryRepository;
pub use sqlite::SqliteRepository;

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

use riskreview_core::{
    Approval, ApprovalDraft, AssessmentDraft, AssessmentId, Category, CategoryDraft, CategoryId,
    RiskAssessment,
};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("storage failure during {operation}: {message}")]
    Storage {
        operation: &'static str,
        message: String,
    },

    #[error("corrupt {what} in storage: {detail}")]
    Corruption { what: &'static str, detail: String },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("risk assessment {id} changed since it was read (expected version {expected_version})")]
    Conflict {
        id: AssessmentId,
        expected_version: i64,
    },

    #[error("a category named '{0}' already exists")]
    DuplicateCategoryName(String),

    #[error("category {id} is still used by {count} risk assessment(s)")]
    CategoryInUse { id: CategoryId, count: usize },
}

impl RepositoryError {
    pub fn storage(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Storage {
            operation,
            message: message.into(),
        }
    }

    pub fn corruption(what: &'static str, detail: impl Into<String>) -> Self {
        Self::Corruption {
            what,
            detail: detail.into(),
        }
    }

    pub fn assessment_not_found(id: AssessmentId) -> Self {
        Self::NotFound {
            entity: "risk assessment",
            id: id.0,
        }
    }

    pub fn category_not_found(id: CategoryId) -> Self {
        Self::NotFound {
            entity: "category",
            id: id.0,
        }
    }
}

/// Repository trait for the assessment aggregate and its categories.
#[async_trait]
pub trait AssessmentRepository: Send + Sync {
    // =========================================================================
    // Categories
    // =========================================================================

    /// Insert a category. Fails with `DuplicateCategoryName` if another
    /// category has the same name ignoring case, checked in the same
    /// transaction as the insert.
    async fn insert_category(&self, draft: CategoryDraft) -> Result<Category, RepositoryError>;

    /// Overwrite a category's name, description and audit fields.
    async fn update_category(&self, category: &Category) -> Result<Category, RepositoryError>;

    /// Delete a category. Fails with `CategoryInUse` while any assessment
    /// references it; the reference count is taken inside the transaction.
    async fn delete_category(&self, id: CategoryId) -> Result<(), RepositoryError>;

    async fn get_category(&self, id: CategoryId) -> Result<Option<Category>, RepositoryError>;

    /// All categories ordered by name.
    async fn list_categories(&self) -> Result<Vec<Category>, RepositoryError>;

    async fn count_assessments_in_category(&self, id: CategoryId)
        -> Result<usize, RepositoryError>;

    // =========================================================================
    // Assessments
    // =========================================================================

    /// Insert a new assessment. Fails with `NotFound` if its category
    /// does not exist.
    async fn insert_assessment(
        &self,
        draft: AssessmentDraft,
    ) -> Result<RiskAssessment, RepositoryError>;

    async fn get_assessment(
        &self,
        id: AssessmentId,
    ) -> Result<Option<RiskAssessment>, RepositoryError>;

    /// All assessments ordered by id.
    async fn list_assessments(&self) -> Result<Vec<RiskAssessment>, RepositoryError>;

    /// Compare-and-swap save of the assessment row only.
    async fn save_assessment(
        &self,
        assessment: &RiskAssessment,
    ) -> Result<RiskAssessment, RepositoryError>;

    // =========================================================================
    // Approvals (current review cycle only)
    // =========================================================================

    /// Approvals of the current cycle, ordered by approval time then id.
    async fn list_approvals(&self, id: AssessmentId) -> Result<Vec<Approval>, RepositoryError>;

    /// Number of current-cycle approvals for every assessment that has any.
    async fn approval_counts(&self) -> Result<HashMap<AssessmentId, usize>, RepositoryError>;

    /// Atomically append approvals and save the assessment (which may have
    /// been promoted by the caller). Returns the saved assessment and the
    /// inserted approval records.
    async fn record_approvals(
        &self,
        assessment: &RiskAssessment,
        approvals: Vec<ApprovalDraft>,
    ) -> Result<(RiskAssessment, Vec<Approval>), RepositoryError>;

    /// Atomically delete every approval of the assessment and save it.
    /// Returns the saved assessment and the number of approvals removed.
    async fn restart_review(
        &self,
        assessment: &RiskAssessment,
    ) -> Result<(RiskAssessment, usize), RepositoryError>;
}
