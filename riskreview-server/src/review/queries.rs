//! Read side: single assessments and filtered lists with derived fields.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use riskreview_core::{AlertStatus, AssessmentId, CategoryId, ReviewStatus, RiskAssessment};

use crate::clock::Clock;
use crate::error::ServiceError;
use crate::repository::AssessmentRepository;

/// Narrowing applied by `list`. Every set field must match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListFilter {
    #[serde(default)]
    pub category_id: Option<CategoryId>,
    #[serde(default)]
    pub status: Option<ReviewStatus>,
    #[serde(default)]
    pub overdue_only: bool,
    /// Case-insensitive substring of the title.
    #[serde(default)]
    pub title_contains: Option<String>,
}

impl ListFilter {
    pub fn matches(&self, assessment: &RiskAssessment, today: NaiveDate) -> bool {
        if let Some(category_id) = self.category_id {
            if assessment.category_id != category_id {
                return false;
            }
        }
        if let Some(status) = self.status {
            if assessment.status != status {
                return false;
            }
        }
        if self.overdue_only && !assessment.is_overdue(today) {
            return false;
        }
        if let Some(needle) = &self.title_contains {
            let needle = needle.trim().to_lowercase();
            if !needle.is_empty() && !assessment.details.title.to_lowercase().contains(&needle) {
                return false;
            }
        }
        true
    }
}

/// An assessment together with the values derived from it on read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentView {
    #[serde(flatten)]
    pub assessment: RiskAssessment,
    pub alert_status: AlertStatus,
    pub is_overdue: bool,
    pub days_until_due: i64,
    /// Approval records in the current review cycle.
    pub approval_count: usize,
}

impl AssessmentView {
    pub fn new(assessment: RiskAssessment, approval_count: usize, today: NaiveDate) -> Self {
        Self {
            alert_status: assessment.alert_status(today),
            is_overdue: assessment.is_overdue(today),
            days_until_due: assessment.days_until_due(today),
            approval_count,
            assessment,
        }
    }
}

pub struct AssessmentQueries {
    repository: Arc<dyn AssessmentRepository>,
    clock: Arc<dyn Clock>,
}

impl AssessmentQueries {
    pub fn new(repository: Arc<dyn AssessmentRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { repository, clock }
    }

    pub async fn get(&self, id: AssessmentId) -> Result<AssessmentView, ServiceError> {
        let assessment = self
            .repository
            .get_assessment(id)
            .await?
            .ok_or_else(|| ServiceError::assessment_not_found(id))?;
        let approval_count = self.repository.list_approvals(id).await?.len();
        Ok(AssessmentView::new(
            assessment,
            approval_count,
            self.clock.today(),
        ))
    }

    /// Matching assessments ordered by next review date, then id.
    pub async fn list(&self, filter: &ListFilter) -> Result<Vec<AssessmentView>, ServiceError> {
        let today = self.clock.today();
        let counts = self.repository.approval_counts().await?;

        let mut views: Vec<AssessmentView> = self
            .repository
            .list_assessments()
            .await?
            .into_iter()
            .filter(|a| filter.matches(a, today))
            .map(|a| {
                let count = counts.get(&a.id).copied().unwrap_or(0);
                AssessmentView::new(a, count, today)
            })
            .collect();
        views.sort_by_key(|v| (v.assessment.next_review_date, v.assessment.id));
        Ok(views)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use riskreview_core::{
        initial_draft, transition, Actor, AssessmentDetails, Audit, CategoryDraft,
        LifecycleEvent, ReviewInterval,
    };

    use crate::clock::FixedClock;
    use crate::repository::InMemoryRepository;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn at() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-01-01T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn details(title: &str, interval: ReviewInterval) -> AssessmentDetails {
        AssessmentDetails {
            title: title.to_string(),
            review_interval: interval,
            description: None,
            scope: None,
            notes: None,
        }
    }

    async fn insert(
        repository: &InMemoryRepository,
        category_id: CategoryId,
        title: &str,
        interval: ReviewInterval,
        created_on: NaiveDate,
    ) -> RiskAssessment {
        repository
            .insert_assessment(initial_draft(
                category_id,
                details(title, interval),
                created_on,
                Actor::from("admin"),
                at(),
            ))
            .await
            .unwrap()
    }

    async fn approve_on(
        repository: &InMemoryRepository,
        assessment: RiskAssessment,
        on: NaiveDate,
    ) {
        let promoted = transition(
            assessment,
            LifecycleEvent::QuorumReached {
                today: on,
                actor: Actor::from("admin"),
                at: at(),
            },
        )
        .assessment;
        repository.save_assessment(&promoted).await.unwrap();
    }

    async fn seeded() -> (AssessmentQueries, Arc<InMemoryRepository>, CategoryId, CategoryId) {
        let repository = Arc::new(InMemoryRepository::new());
        let mut ids = vec![];
        for name in ["Premises", "Events"] {
            let category = repository
                .insert_category(CategoryDraft {
                    name: name.to_string(),
                    description: None,
                    audit: Audit::created(Actor::from("admin"), at()),
                })
                .await
                .unwrap();
            ids.push(category.id);
        }
        let clock = Arc::new(FixedClock::on(date(2024, 6, 1)));
        let queries = AssessmentQueries::new(repository.clone(), clock);
        (queries, repository, ids[0], ids[1])
    }

    #[tokio::test]
    async fn test_list_orders_by_next_review_date_then_id() {
        let (queries, repository, premises, events) = seeded().await;
        let jan = date(2024, 1, 1);
        let a = insert(&repository, premises, "Roof", ReviewInterval::FiveYears, jan).await;
        let b = insert(&repository, events, "Fete", ReviewInterval::OneYear, jan).await;
        let c = insert(&repository, events, "Fair", ReviewInterval::OneYear, jan).await;

        let ids: Vec<AssessmentId> = queries
            .list(&ListFilter::default())
            .await
            .unwrap()
            .into_iter()
            .map(|v| v.assessment.id)
            .collect();
        assert_eq!(ids, vec![b.id, c.id, a.id]);
    }

    #[tokio::test]
    async fn test_filters_combine() {
        let (queries, repository, premises, events) = seeded().await;
        let overdue = insert(
            &repository,
            premises,
            "Boiler",
            ReviewInterval::OneYear,
            date(2022, 1, 1),
        )
        .await;
        approve_on(&repository, overdue.clone(), date(2023, 1, 1)).await;
        let jan = date(2024, 1, 1);
        insert(&repository, premises, "Roof", ReviewInterval::OneYear, jan).await;
        insert(&repository, events, "Boiler hire", ReviewInterval::OneYear, jan).await;

        let only_overdue = queries
            .list(&ListFilter {
                overdue_only: true,
                ..ListFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(only_overdue.len(), 1);
        assert_eq!(only_overdue[0].assessment.id, overdue.id);
        assert_eq!(only_overdue[0].alert_status, AlertStatus::Red);

        let by_title = queries
            .list(&ListFilter {
                title_contains: Some("BOILER".to_string()),
                ..ListFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(by_title.len(), 2);

        let premises_under_review = queries
            .list(&ListFilter {
                category_id: Some(premises),
                status: Some(ReviewStatus::UnderReview),
                ..ListFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(premises_under_review.len(), 1);
        assert_eq!(premises_under_review[0].assessment.details.title, "Roof");
    }

    #[tokio::test]
    async fn test_get_derives_view_fields() {
        let (queries, repository, premises, _) = seeded().await;
        let created = insert(
            &repository,
            premises,
            "Roof",
            ReviewInterval::OneYear,
            date(2024, 1, 1),
        )
        .await;

        let view = queries.get(created.id).await.unwrap();
        assert_eq!(view.alert_status, AlertStatus::Amber);
        assert!(!view.is_overdue);
        assert_eq!(view.days_until_due, 214);
        assert_eq!(view.approval_count, 0);

        let err = queries.get(AssessmentId(500)).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { id: 500, .. }));
    }
}
