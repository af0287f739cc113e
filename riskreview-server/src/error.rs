//! Error taxonomy surfaced by the review service.

use thiserror::Error;

use riskreview_core::{AssessmentId, IntervalError};

use crate::directory::DirectoryError;
use crate::repository::RepositoryError;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// Unknown assessment or category id.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// Input rejected before anything was written.
    #[error("{0}")]
    Validation(String),

    /// Another writer changed the assessment between read and commit.
    /// Retrying once is expected to succeed.
    #[error("risk assessment {0} was modified concurrently; retry the operation")]
    Conflict(AssessmentId),

    /// The caller cancelled before the commit point. Nothing was written.
    #[error("operation cancelled before commit")]
    Cancelled,

    /// Storage or directory failure. The message is for logs, not callers.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn assessment_not_found(id: AssessmentId) -> Self {
        Self::NotFound {
            entity: "risk assessment",
            id: id.0,
        }
    }

    pub fn category_not_found(id: riskreview_core::CategoryId) -> Self {
        Self::NotFound {
            entity: "category",
            id: id.0,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

impl From<IntervalError> for ServiceError {
    fn from(err: IntervalError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<RepositoryError> for ServiceError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => Self::NotFound { entity, id },
            RepositoryError::Conflict { id, .. } => Self::Conflict(id),
            RepositoryError::DuplicateCategoryName(_) | RepositoryError::CategoryInUse { .. } => {
                Self::Validation(err.to_string())
            }
            RepositoryError::Storage { .. } | RepositoryError::Corruption { .. } => {
                Self::Internal(err.to_string())
            }
        }
    }
}

impl From<DirectoryError> for ServiceError {
    fn from(err: DirectoryError) -> Self {
        Self::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use riskreview_core::CategoryId;

    #[test]
    fn test_repository_errors_map_to_taxonomy() {
        let err: ServiceError = RepositoryError::DuplicateCategoryName("Fire".to_string()).into();
        assert!(matches!(err, ServiceError::Validation(ref m) if m.contains("Fire")));

        let err: ServiceError = RepositoryError::CategoryInUse {
            id: CategoryId(3),
            count: 2,
        }
        .into();
        assert!(matches!(err, ServiceError::Validation(_)));

        let err: ServiceError = RepositoryError::Conflict {
            id: AssessmentId(9),
            expected_version: 4,
        }
        .into();
        assert!(matches!(err, ServiceError::Conflict(AssessmentId(9))));

        let err: ServiceError = RepositoryError::storage("get", "disk full").into();
        assert!(matches!(err, ServiceError::Internal(_)));
    }

    #[test]
    fn test_interval_error_is_validation() {
        let err: ServiceError = IntervalError(4).into();
        assert!(matches!(err, ServiceError::Validation(ref m) if m.contains("got 4")));
    }

    #[test]
    fn test_not_found_message_names_entity_and_id() {
        assert_eq!(
            ServiceError::assessment_not_found(AssessmentId(12)).to_string(),
            "risk assessment 12 not found"
        );
        assert_eq!(
            ServiceError::category_not_found(CategoryId(5)).to_string(),
            "category 5 not found"
        );
    }
}
