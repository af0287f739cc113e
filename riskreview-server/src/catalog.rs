//! Risk assessment categories.

use std::sync::Arc;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use riskreview_core::{Actor, Audit, Category, CategoryDraft, CategoryId};

use crate::clock::Clock;
use crate::error::ServiceError;
use crate::repository::AssessmentRepository;
use crate::review::ensure_not_cancelled;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryInput {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl CategoryInput {
    fn validated_name(&self) -> Result<String, ServiceError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(ServiceError::validation("category name must not be empty"));
        }
        Ok(name.to_string())
    }
}

pub struct CategoryCatalog {
    repository: Arc<dyn AssessmentRepository>,
    clock: Arc<dyn Clock>,
}

impl CategoryCatalog {
    pub fn new(repository: Arc<dyn AssessmentRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { repository, clock }
    }

    /// Names are unique ignoring case and surrounding whitespace.
    pub async fn create(
        &self,
        input: CategoryInput,
        actor: Actor,
        cancel: &CancellationToken,
    ) -> Result<Category, ServiceError> {
        let name = input.validated_name()?;
        ensure_not_cancelled(cancel)?;

        let category = self
            .repository
            .insert_category(CategoryDraft {
                name,
                description: input.description,
                audit: Audit::created(actor.clone(), self.clock.now()),
            })
            .await?;
        info!(
            "Created category {} '{}' by {}",
            category.id, category.name, actor
        );
        Ok(category)
    }

    pub async fn update(
        &self,
        id: CategoryId,
        input: CategoryInput,
        actor: Actor,
        cancel: &CancellationToken,
    ) -> Result<Category, ServiceError> {
        let name = input.validated_name()?;
        let mut category = self.get(id).await?;
        category.name = name;
        category.description = input.description;
        category.audit.touch(actor.clone(), self.clock.now());

        ensure_not_cancelled(cancel)?;
        let saved = self.repository.update_category(&category).await?;
        info!("Updated category {} by {}", id, actor);
        Ok(saved)
    }

    /// Fails with a validation error while any assessment is filed under it.
    pub async fn delete(
        &self,
        id: CategoryId,
        actor: Actor,
        cancel: &CancellationToken,
    ) -> Result<(), ServiceError> {
        ensure_not_cancelled(cancel)?;
        self.repository.delete_category(id).await?;
        info!("Deleted category {} by {}", id, actor);
        Ok(())
    }

    pub async fn get(&self, id: CategoryId) -> Result<Category, ServiceError> {
        self.repository
            .get_category(id)
            .await?
            .ok_or_else(|| ServiceError::category_not_found(id))
    }

    pub async fn list(&self) -> Result<Vec<Category>, ServiceError> {
        Ok(self.repository.list_categories().await?)
    }
}
