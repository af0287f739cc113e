//! Person directory collaborator.
//!
//! Approvers are people owned by another system. The review core only asks
//! whether an id resolves and what display name to show for it.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

use riskreview_core::PersonId;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("person directory unavailable: {0}")]
    Unavailable(String),

    #[error("failed to load person directory from {path}: {message}")]
    Load { path: String, message: String },
}

#[async_trait]
pub trait PersonDirectory: Send + Sync {
    /// Display name for a person, or `None` if the id is unknown.
    async fn resolve(&self, id: &PersonId) -> Result<Option<String>, DirectoryError>;
}

/// Directory backed by a fixed map, optionally loaded from a JSON file of
/// the form `{ "person-id": "Display Name" }`.
#[derive(Debug, Default)]
pub struct StaticDirectory {
    people: HashMap<PersonId, String>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_people<I, K, V>(people: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<PersonId>,
        V: Into<String>,
    {
        let people = people
            .into_iter()
            .map(|(id, name)| (id.into(), name.into()))
            .collect();
        Self { people }
    }

    pub async fn from_json_file(path: &Path) -> Result<Self, DirectoryError> {
        let load_error = |message: String| DirectoryError::Load {
            path: path.display().to_string(),
            message,
        };
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| load_error(e.to_string()))?;
        let people: HashMap<String, String> =
            serde_json::from_str(&raw).map_err(|e| load_error(e.to_string()))?;
        Ok(Self::with_people(people))
    }

    pub fn len(&self) -> usize {
        self.people.len()
    }

    pub fn is_empty(&self) -> bool {
        self.people.is_empty()
    }
}

#[async_trait]
impl PersonDirectory for StaticDirectory {
    async fn resolve(&self, id: &PersonId) -> Result<Option<String>, DirectoryError> {
        Ok(self.people.get(id).cloned())
    }
}
