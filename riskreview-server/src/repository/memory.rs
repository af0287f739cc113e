//! In-memory implementation of `AssessmentRepository`.
//!
//! All tables live behind a single `RwLock`, so every method is atomic with
//! respect to every other. All state is lost on restart.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use riskreview_core::{
    category_name_key, Approval, ApprovalDraft, ApprovalId, AssessmentDraft, AssessmentId,
    Category, CategoryDraft, CategoryId, RiskAssessment,
};

use super::{AssessmentRepository, RepositoryError};

#[derive(Default)]
struct Tables {
    categories: BTreeMap<CategoryId, Category>,
    assessments: BTreeMap<AssessmentId, RiskAssessment>,
    approvals: Vec<Approval>,
    next_category_id: i64,
    next_assessment_id: i64,
    next_approval_id: i64,
}

impl Tables {
    fn name_taken(&self, name: &str, except: Option<CategoryId>) -> bool {
        let key = category_name_key(name);
        self.categories
            .values()
            .any(|c| Some(c.id) != except && category_name_key(&c.name) == key)
    }

    fn references_to(&self, id: CategoryId) -> usize {
        self.assessments
            .values()
            .filter(|a| a.category_id == id)
            .count()
    }

    /// Version check shared by every aggregate write.
    fn check_version(&self, assessment: &RiskAssessment) -> Result<(), RepositoryError> {
        let stored = self
            .assessments
            .get(&assessment.id)
            .ok_or_else(|| RepositoryError::assessment_not_found(assessment.id))?;
        if stored.version != assessment.version {
            return Err(RepositoryError::Conflict {
                id: assessment.id,
                expected_version: assessment.version,
            });
        }
        Ok(())
    }

    fn store_bumped(&mut self, assessment: &RiskAssessment) -> RiskAssessment {
        let mut saved = assessment.clone();
        saved.version += 1;
        self.assessments.insert(saved.id, saved.clone());
        saved
    }
}

/// In-memory assessment repository.
pub struct InMemoryRepository {
    tables: RwLock<Tables>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
        }
    }
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AssessmentRepository for InMemoryRepository {
    async fn insert_category(&self, draft: CategoryDraft) -> Result<Category, RepositoryError> {
        let mut tables = self.tables.write().await;
        if tables.name_taken(&draft.name, None) {
            return Err(RepositoryError::DuplicateCategoryName(draft.name));
        }
        tables.next_category_id += 1;
        let category = Category {
            id: CategoryId(tables.next_category_id),
            name: draft.name,
            description: draft.description,
            audit: draft.audit,
        };
        tables.categories.insert(category.id, category.clone());
        Ok(category)
    }

    async fn update_category(&self, category: &Category) -> Result<Category, RepositoryError> {
        let mut tables = self.tables.write().await;
        if !tables.categories.contains_key(&category.id) {
            return Err(RepositoryError::category_not_found(category.id));
        }
        if tables.name_taken(&category.name, Some(category.id)) {
            return Err(RepositoryError::DuplicateCategoryName(
                category.name.clone(),
            ));
        }
        tables.categories.insert(category.id, category.clone());
        Ok(category.clone())
    }

    async fn delete_category(&self, id: CategoryId) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        if !tables.categories.contains_key(&id) {
            return Err(RepositoryError::category_not_found(id));
        }
        let count = tables.references_to(id);
        if count > 0 {
            return Err(RepositoryError::CategoryInUse { id, count });
        }
        tables.categories.remove(&id);
        Ok(())
    }

    async fn get_category(&self, id: CategoryId) -> Result<Option<Category>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables.categories.get(&id).cloned())
    }

    async fn list_categories(&self) -> Result<Vec<Category>, RepositoryError> {
        let tables = self.tables.read().await;
        let mut categories: Vec<Category> = tables.categories.values().cloned().collect();
        categories.sort_by_key(|c| (category_name_key(&c.name), c.id));
        Ok(categories)
    }

    async fn count_assessments_in_category(
        &self,
        id: CategoryId,
    ) -> Result<usize, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables.references_to(id))
    }

    async fn insert_assessment(
        &self,
        draft: AssessmentDraft,
    ) -> Result<RiskAssessment, RepositoryError> {
        let mut tables = self.tables.write().await;
        if !tables.categories.contains_key(&draft.category_id) {
            return Err(RepositoryError::category_not_found(draft.category_id));
        }
        tables.next_assessment_id += 1;
        let assessment = draft.into_assessment(AssessmentId(tables.next_assessment_id));
        tables.assessments.insert(assessment.id, assessment.clone());
        Ok(assessment)
    }

    async fn get_assessment(
        &self,
        id: AssessmentId,
    ) -> Result<Option<RiskAssessment>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables.assessments.get(&id).cloned())
    }

    async fn list_assessments(&self) -> Result<Vec<RiskAssessment>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables.assessments.values().cloned().collect())
    }

    async fn save_assessment(
        &self,
        assessment: &RiskAssessment,
    ) -> Result<RiskAssessment, RepositoryError> {
        let mut tables = self.tables.write().await;
        tables.check_version(assessment)?;
        Ok(tables.store_bumped(assessment))
    }

    async fn list_approvals(&self, id: AssessmentId) -> Result<Vec<Approval>, RepositoryError> {
        let tables = self.tables.read().await;
        let mut approvals: Vec<Approval> = tables
            .approvals
            .iter()
            .filter(|a| a.assessment_id == id)
            .cloned()
            .collect();
        approvals.sort_by_key(|a| (a.approved_at, a.id));
        Ok(approvals)
    }

    async fn approval_counts(&self) -> Result<HashMap<AssessmentId, usize>, RepositoryError> {
        let tables = self.tables.read().await;
        let mut counts = HashMap::new();
        for approval in &tables.approvals {
            *counts.entry(approval.assessment_id).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn record_approvals(
        &self,
        assessment: &RiskAssessment,
        approvals: Vec<ApprovalDraft>,
    ) -> Result<(RiskAssessment, Vec<Approval>), RepositoryError> {
        let mut tables = self.tables.write().await;
        tables.check_version(assessment)?;

        let mut inserted = Vec::with_capacity(approvals.len());
        for draft in approvals {
            tables.next_approval_id += 1;
            inserted.push(Approval {
                id: ApprovalId(tables.next_approval_id),
                assessment_id: assessment.id,
                approver_id: draft.approver_id,
                approved_at: draft.approved_at,
                notes: draft.notes,
            });
        }
        tables.approvals.extend(inserted.iter().cloned());

        let saved = tables.store_bumped(assessment);
        Ok((saved, inserted))
    }

    async fn restart_review(
        &self,
        assessment: &RiskAssessment,
    ) -> Result<(RiskAssessment, usize), RepositoryError> {
        let mut tables = self.tables.write().await;
        tables.check_version(assessment)?;

        let before = tables.approvals.len();
        tables.approvals.retain(|a| a.assessment_id != assessment.id);
        let cleared = before - tables.approvals.len();

        let saved = tables.store_bumped(assessment);
        Ok((saved, cleared))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, NaiveDate, Utc};
    use riskreview_core::{
        initial_draft, Actor, AssessmentDetails, Audit, PersonId, ReviewInterval, ReviewStatus,
    };

    fn at() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-01-01T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn category_draft(name: &str) -> CategoryDraft {
        CategoryDraft {
            name: name.to_string(),
            description: None,
            audit: Audit::created(Actor::from("admin"), at()),
        }
    }

    fn assessment_draft(category_id: CategoryId) -> AssessmentDraft {
        initial_draft(
            category_id,
            AssessmentDetails {
                title: "Boiler room".to_string(),
                review_interval: ReviewInterval::OneYear,
                description: None,
                scope: None,
                notes: None,
            },
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            Actor::from("admin"),
            at(),
        )
    }

    fn approval(approver: &str, offset_minutes: i64) -> ApprovalDraft {
        ApprovalDraft {
            approver_id: PersonId::from(approver),
            approved_at: at() + Duration::minutes(offset_minutes),
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_category_names_unique_ignoring_case() {
        let repo = InMemoryRepository::new();
        repo.insert_category(category_draft("Fire Safety"))
            .await
            .unwrap();

        let err = repo
            .insert_category(category_draft("fire safety"))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::DuplicateCategoryName(_)));
    }

    #[tokio::test]
    async fn test_update_category_may_keep_own_name() {
        let repo = InMemoryRepository::new();
        let mut category = repo
            .insert_category(category_draft("Fire Safety"))
            .await
            .unwrap();
        category.name = "FIRE SAFETY".to_string();
        let updated = repo.update_category(&category).await.unwrap();
        assert_eq!(updated.name, "FIRE SAFETY");
    }

    #[tokio::test]
    async fn test_delete_category_blocked_by_references() {
        let repo = InMemoryRepository::new();
        let category = repo.insert_category(category_draft("Fire")).await.unwrap();
        repo.insert_assessment(assessment_draft(category.id))
            .await
            .unwrap();

        let err = repo.delete_category(category.id).await.unwrap_err();
        assert!(matches!(
            err,
            RepositoryError::CategoryInUse { count: 1, .. }
        ));
        assert!(repo.get_category(category.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_insert_assessment_requires_category() {
        let repo = InMemoryRepository::new();
        let err = repo
            .insert_assessment(assessment_draft(CategoryId(42)))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound { id: 42, .. }));
    }

    #[tokio::test]
    async fn test_record_approvals_bumps_version_and_orders_by_time() {
        let repo = InMemoryRepository::new();
        let category = repo.insert_category(category_draft("Fire")).await.unwrap();
        let assessment = repo
            .insert_assessment(assessment_draft(category.id))
            .await
            .unwrap();

        let (saved, inserted) = repo
            .record_approvals(&assessment, vec![approval("late", 10), approval("early", 1)])
            .await
            .unwrap();
        assert_eq!(saved.version, assessment.version + 1);
        assert_eq!(inserted.len(), 2);

        let listed = repo.list_approvals(assessment.id).await.unwrap();
        let approvers: Vec<&str> = listed.iter().map(|a| a.approver_id.0.as_str()).collect();
        assert_eq!(approvers, vec!["early", "late"]);
    }

    #[tokio::test]
    async fn test_stale_version_conflicts_and_writes_nothing() {
        let repo = InMemoryRepository::new();
        let category = repo.insert_category(category_draft("Fire")).await.unwrap();
        let stale = repo
            .insert_assessment(assessment_draft(category.id))
            .await
            .unwrap();
        repo.record_approvals(&stale, vec![approval("a", 0)])
            .await
            .unwrap();

        let err = repo
            .record_approvals(&stale, vec![approval("b", 1)])
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict { .. }));
        assert_eq!(repo.list_approvals(stale.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_restart_review_clears_only_that_assessment() {
        let repo = InMemoryRepository::new();
        let category = repo.insert_category(category_draft("Fire")).await.unwrap();
        let first = repo
            .insert_assessment(assessment_draft(category.id))
            .await
            .unwrap();
        let second = repo
            .insert_assessment(assessment_draft(category.id))
            .await
            .unwrap();
        let (first, _) = repo
            .record_approvals(&first, vec![approval("a", 0), approval("b", 1)])
            .await
            .unwrap();
        repo.record_approvals(&second, vec![approval("c", 2)])
            .await
            .unwrap();

        let mut restarted = first.clone();
        restarted.status = ReviewStatus::UnderReview;
        let (saved, cleared) = repo.restart_review(&restarted).await.unwrap();

        assert_eq!(cleared, 2);
        assert_eq!(saved.version, first.version + 1);
        assert!(repo.list_approvals(first.id).await.unwrap().is_empty());

        let counts = repo.approval_counts().await.unwrap();
        assert_eq!(counts.get(&second.id), Some(&1));
        assert_eq!(counts.get(&first.id), None);
    }
}
