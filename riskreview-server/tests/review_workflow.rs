//! End-to-end review workflow through the service facade.

use std::sync::Arc;

use chrono::NaiveDate;
use tokio_util::sync::CancellationToken;

use riskreview_core::{Actor, AssessmentId, CategoryId, PersonId, ReviewStatus};
use riskreview_server::catalog::CategoryInput;
use riskreview_server::directory::StaticDirectory;
use riskreview_server::repository::{AssessmentRepository, InMemoryRepository, SqliteRepository};
use riskreview_server::review::{ApprovalOutcome, AssessmentInput, ListFilter};
use riskreview_server::{FixedClock, ReviewSettings, RiskReviewService, ServiceError};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn people(ids: &[&str]) -> Vec<PersonId> {
    ids.iter().map(|id| PersonId::from(*id)).collect()
}

fn input(title: &str, interval: u32) -> AssessmentInput {
    AssessmentInput {
        title: title.to_string(),
        review_interval: interval,
        description: Some("Annual walk-round".to_string()),
        scope: None,
        notes: None,
    }
}

fn directory() -> Arc<StaticDirectory> {
    Arc::new(StaticDirectory::with_people(
        (1..=10).map(|i| (format!("p{}", i), format!("Person {}", i))),
    ))
}

struct Harness {
    service: Arc<RiskReviewService>,
    repository: Arc<dyn AssessmentRepository>,
    clock: Arc<FixedClock>,
    category_id: CategoryId,
}

impl Harness {
    async fn with_repository(
        repository: Arc<dyn AssessmentRepository>,
        today: NaiveDate,
        settings: ReviewSettings,
    ) -> Self {
        let clock = Arc::new(FixedClock::on(today));
        let service = Arc::new(RiskReviewService::new(
            repository.clone(),
            directory(),
            clock.clone(),
            settings,
        ));
        let category = service
            .create_category(
                CategoryInput {
                    name: "Premises".to_string(),
                    description: None,
                },
                Actor::from("admin"),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        Self {
            service,
            repository,
            clock,
            category_id: category.id,
        }
    }

    async fn in_memory(today: NaiveDate) -> Self {
        Self::with_repository(
            Arc::new(InMemoryRepository::new()),
            today,
            ReviewSettings::default(),
        )
        .await
    }

    async fn sqlite(today: NaiveDate) -> Self {
        Self::with_repository(
            Arc::new(SqliteRepository::new_in_memory().unwrap()),
            today,
            ReviewSettings::default(),
        )
        .await
    }

    async fn create(&self, title: &str, interval: u32) -> AssessmentId {
        self.service
            .create_assessment(
                self.category_id,
                input(title, interval),
                Actor::from("admin"),
                &CancellationToken::new(),
            )
            .await
            .unwrap()
            .id
    }

    async fn approve(&self, id: AssessmentId, who: &[&str]) -> ApprovalOutcome {
        self.service
            .approve(
                id,
                people(who),
                None,
                Actor::from("approver"),
                &CancellationToken::new(),
            )
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn create_on_new_year_is_due_a_year_later() {
    let h = Harness::in_memory(date(2024, 1, 1)).await;
    let id = h.create("Boiler room", 1).await;

    let view = h.service.get_assessment(id).await.unwrap();
    assert_eq!(view.assessment.status, ReviewStatus::UnderReview);
    assert_eq!(view.assessment.last_review_date, None);
    assert_eq!(view.assessment.next_review_date, date(2025, 1, 1));
}

#[tokio::test]
async fn create_on_leap_day_clamps_to_end_of_february() {
    let h = Harness::in_memory(date(2024, 2, 29)).await;
    let id = h.create("Boiler room", 1).await;
    let view = h.service.get_assessment(id).await.unwrap();
    assert_eq!(view.assessment.next_review_date, date(2025, 2, 28));
}

#[tokio::test]
async fn intervals_outside_allowed_set_rejected() {
    let h = Harness::in_memory(date(2024, 1, 1)).await;
    let cancel = CancellationToken::new();
    let id = h.create("Boiler room", 2).await;

    for bad in [0, 4, 6, 10] {
        let err = h
            .service
            .create_assessment(h.category_id, input("Roof", bad), Actor::from("a"), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)), "create {}", bad);

        let err = h
            .service
            .update_assessment(id, input("Roof", bad), Actor::from("a"), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)), "update {}", bad);
    }
}

#[tokio::test]
async fn quorum_of_two_on_sqlite() {
    let h = Harness::sqlite(date(2024, 3, 10)).await;
    let id = h.create("Kitchen", 2).await;

    let first = h.approve(id, &["p1"]).await;
    assert_eq!(first.approvals_received, 1);
    assert!(!first.assessment_approved);

    let second = h.approve(id, &["p2"]).await;
    assert_eq!(second.approvals_received, 2);
    assert!(second.assessment_approved);
    assert_eq!(second.next_review_date, Some(date(2026, 3, 10)));

    let view = h.service.get_assessment(id).await.unwrap();
    assert_eq!(view.assessment.status, ReviewStatus::Approved);
    assert_eq!(view.assessment.last_review_date, Some(date(2024, 3, 10)));
    assert_eq!(view.approval_count, 2);
}

#[tokio::test]
async fn start_review_keeps_next_date_until_next_approval() {
    let h = Harness::in_memory(date(2024, 1, 1)).await;
    let cancel = CancellationToken::new();
    let id = h.create("Kitchen", 1).await;
    h.approve(id, &["p1", "p2"]).await;

    h.clock.set(
        date(2024, 9, 1)
            .and_hms_opt(9, 0, 0)
            .unwrap()
            .and_utc(),
    );
    let restarted = h
        .service
        .start_review(id, Actor::from("admin"), &cancel)
        .await
        .unwrap();
    assert_eq!(restarted.status, ReviewStatus::UnderReview);
    assert_eq!(restarted.next_review_date, date(2025, 1, 1));
    assert_eq!(restarted.last_review_date, Some(date(2024, 1, 1)));

    let view = h.service.get_assessment(id).await.unwrap();
    assert_eq!(view.approval_count, 0);
    assert!(h.service.get_history(id).await.unwrap().cycles.is_empty());

    h.approve(id, &["p3"]).await;
    let unchanged = h.service.get_assessment(id).await.unwrap();
    assert_eq!(unchanged.assessment.next_review_date, date(2025, 1, 1));

    let promoted = h.approve(id, &["p4"]).await;
    assert_eq!(promoted.next_review_date, Some(date(2025, 9, 1)));
}

#[tokio::test]
async fn dashboard_counts_overdue_and_due_soon() {
    let h = Harness::in_memory(date(2023, 6, 10)).await;
    let overdue = h.create("Overdue", 1).await;
    h.approve(overdue, &["p1", "p2"]).await;

    h.clock.set(date(2023, 6, 25).and_hms_opt(12, 0, 0).unwrap().and_utc());
    let due_soon = h.create("Due soon", 1).await;
    h.approve(due_soon, &["p1", "p2"]).await;

    h.clock.set(date(2023, 7, 30).and_hms_opt(12, 0, 0).unwrap().and_utc());
    let later = h.create("Later", 1).await;
    h.approve(later, &["p1", "p2"]).await;

    // Today is 2024-06-15: next dates fall at today-5, today+10 and today+45.
    h.clock.set(date(2024, 6, 15).and_hms_opt(12, 0, 0).unwrap().and_utc());
    let summary = h.service.get_dashboard_summary().await.unwrap();
    assert_eq!(summary.overdue_count, 1);
    assert_eq!(summary.due_soon_count, 1);
    assert_eq!(summary.total_count, 3);
    assert_eq!(summary.lookahead_days, 30);

    let overdue_only = h
        .service
        .list_assessments(&ListFilter {
            overdue_only: true,
            ..ListFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(overdue_only.len(), 1);
    assert_eq!(overdue_only[0].assessment.id, overdue);
}

#[tokio::test]
async fn category_delete_guarded_while_referenced() {
    let h = Harness::sqlite(date(2024, 1, 1)).await;
    let cancel = CancellationToken::new();
    h.create("Roof", 1).await;

    let err = h
        .service
        .delete_category(h.category_id, Actor::from("admin"), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));

    let spare = h
        .service
        .create_category(
            CategoryInput {
                name: "Spare".to_string(),
                description: None,
            },
            Actor::from("admin"),
            &cancel,
        )
        .await
        .unwrap();
    h.service
        .delete_category(spare.id, Actor::from("admin"), &cancel)
        .await
        .unwrap();
    assert_eq!(h.service.list_categories().await.unwrap().len(), 1);
}

#[tokio::test]
async fn unresolved_approvers_write_nothing() {
    let h = Harness::sqlite(date(2024, 1, 1)).await;
    let id = h.create("Roof", 1).await;
    let before = h.repository.get_assessment(id).await.unwrap().unwrap();

    let err = h
        .service
        .approve(
            id,
            people(&["p1", "stranger"]),
            None,
            Actor::from("a"),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    match err {
        ServiceError::Validation(message) => assert!(message.contains("stranger")),
        other => panic!("expected validation error, got {:?}", other),
    }

    assert!(h.repository.list_approvals(id).await.unwrap().is_empty());
    assert_eq!(h.repository.get_assessment(id).await.unwrap().unwrap(), before);
}

#[tokio::test]
async fn cancelled_operations_write_nothing() {
    let h = Harness::sqlite(date(2024, 1, 1)).await;
    let id = h.create("Roof", 1).await;
    h.approve(id, &["p1"]).await;
    let before = h.repository.get_assessment(id).await.unwrap().unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = h
        .service
        .approve(id, people(&["p2"]), None, Actor::from("a"), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Cancelled));

    let err = h
        .service
        .start_review(id, Actor::from("a"), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Cancelled));

    let err = h
        .service
        .create_assessment(h.category_id, input("Hall", 1), Actor::from("a"), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Cancelled));

    assert_eq!(h.repository.get_assessment(id).await.unwrap().unwrap(), before);
    assert_eq!(h.repository.list_approvals(id).await.unwrap().len(), 1);
    assert_eq!(h.repository.list_assessments().await.unwrap().len(), 1);
}

#[tokio::test]
async fn duplicate_approvers_count_by_default() {
    let h = Harness::in_memory(date(2024, 1, 1)).await;
    let id = h.create("Roof", 1).await;

    let outcome = h.approve(id, &["p1", "p1"]).await;
    assert_eq!(outcome.approvals_received, 2);
    assert!(outcome.assessment_approved);
}

#[tokio::test]
async fn duplicate_approvers_count_once_when_distinct() {
    let h = Harness::with_repository(
        Arc::new(InMemoryRepository::new()),
        date(2024, 1, 1),
        ReviewSettings {
            count_distinct_approvers: true,
            ..ReviewSettings::default()
        },
    )
    .await;
    let id = h.create("Roof", 1).await;

    let outcome = h.approve(id, &["p1", "p1"]).await;
    assert_eq!(outcome.approvals_received, 1);
    assert!(!outcome.assessment_approved);
    assert_eq!(h.repository.list_approvals(id).await.unwrap().len(), 2);

    let outcome = h.approve(id, &["p1"]).await;
    assert_eq!(outcome.approvals_received, 1);

    let outcome = h.approve(id, &["p2"]).await;
    assert_eq!(outcome.approvals_received, 2);
    assert!(outcome.assessment_approved);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_approvals_promote_exactly_once() {
    let h = Harness::sqlite(date(2024, 1, 1)).await;
    let id = h.create("Roof", 3).await;

    let mut handles = Vec::new();
    for i in 1..=10 {
        let service = h.service.clone();
        handles.push(tokio::spawn(async move {
            service
                .approve(
                    id,
                    vec![PersonId::from(format!("p{}", i))],
                    None,
                    Actor::from(format!("p{}", i)),
                    &CancellationToken::new(),
                )
                .await
        }));
    }

    let mut promotions = 0;
    let mut received = Vec::new();
    for handle in handles {
        let outcome = handle.await.unwrap().unwrap();
        if outcome.next_review_date.is_some() {
            promotions += 1;
        }
        received.push(outcome.approvals_received);
    }
    received.sort_unstable();

    assert_eq!(promotions, 1);
    assert_eq!(received, (1..=10).collect::<Vec<_>>());
    assert_eq!(h.repository.list_approvals(id).await.unwrap().len(), 10);

    let stored = h.repository.get_assessment(id).await.unwrap().unwrap();
    assert_eq!(stored.status, ReviewStatus::Approved);
    assert_eq!(stored.next_review_date, date(2027, 1, 1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn start_review_racing_approval_ends_consistent() {
    let h = Harness::sqlite(date(2024, 1, 1)).await;

    for round in 0..20 {
        let id = h.create(&format!("Kitchen {}", round), 1).await;
        h.approve(id, &["p1"]).await;

        let approver = h.service.clone();
        let approval = tokio::spawn(async move {
            approver
                .approve(
                    id,
                    people(&["p2"]),
                    None,
                    Actor::from("p2"),
                    &CancellationToken::new(),
                )
                .await
        });
        let restarter = h.service.clone();
        let restart = tokio::spawn(async move {
            restarter
                .start_review(id, Actor::from("admin"), &CancellationToken::new())
                .await
        });
        let outcome = approval.await.unwrap().unwrap();
        restart.await.unwrap().unwrap();

        let stored = h.repository.get_assessment(id).await.unwrap().unwrap();
        let approvals = h.repository.list_approvals(id).await.unwrap();
        assert_eq!(stored.status, ReviewStatus::UnderReview);

        match outcome.approvals_received {
            // Approval committed first, then the restart revoked both.
            2 => {
                assert!(outcome.assessment_approved);
                assert_eq!(outcome.next_review_date, Some(date(2025, 1, 1)));
                assert!(approvals.is_empty());
                assert_eq!(stored.last_review_date, Some(date(2024, 1, 1)));
                assert_eq!(stored.next_review_date, date(2025, 1, 1));
            }
            // Restart committed first; the approval opened a new cycle.
            1 => {
                assert!(!outcome.assessment_approved);
                assert_eq!(outcome.next_review_date, None);
                assert_eq!(approvals.len(), 1);
                assert_eq!(approvals[0].approver_id, PersonId::from("p2"));
                assert_eq!(stored.last_review_date, None);
            }
            other => panic!("round {}: unexpected approval count {}", round, other),
        }
    }
}

#[tokio::test]
async fn history_lists_current_cycle_with_names() {
    let h = Harness::in_memory(date(2024, 1, 1)).await;
    let id = h.create("Roof", 1).await;
    h.approve(id, &["p2"]).await;
    h.clock.advance(chrono::Duration::minutes(5));
    h.approve(id, &["p1"]).await;

    let history = h.service.get_history(id).await.unwrap();
    assert_eq!(history.category_name, "Premises");
    assert_eq!(history.cycles.len(), 1);
    assert_eq!(history.cycles[0].review_date, Some(date(2024, 1, 1)));
    let names: Vec<&str> = history.cycles[0]
        .approvals
        .iter()
        .map(|a| a.approver_name.as_str())
        .collect();
    assert_eq!(names, vec!["Person 2", "Person 1"]);
}
