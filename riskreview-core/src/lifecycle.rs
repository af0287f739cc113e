//! Pure state transition function for the review lifecycle.
//!
//! Takes an assessment and an event and returns the updated assessment plus
//! the effects the caller must carry out against storage. No I/O happens
//! here, which keeps every rule testable without a repository.
//!
//! ```text
//!   create ──► UnderReview ──quorum reached──► Approved
//!                  ▲                              │
//!                  └──────────start review────────┘
//! ```

use chrono::{DateTime, NaiveDate, Utc};

use crate::assessment::{
    Actor, AssessmentDetails, AssessmentDraft, Audit, CategoryId, ReviewStatus, RiskAssessment,
};
use crate::schedule::next_review_date;

/// Things that happen to an existing assessment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Descriptive fields or the interval were edited.
    DetailsEdited {
        details: AssessmentDetails,
        actor: Actor,
        at: DateTime<Utc>,
    },
    /// A new review cycle was requested; in-flight approvals are revoked.
    ReviewStarted { actor: Actor, at: DateTime<Utc> },
    /// The current cycle's approvals reached the configured minimum.
    QuorumReached {
        today: NaiveDate,
        actor: Actor,
        at: DateTime<Utc>,
    },
}

impl LifecycleEvent {
    /// Short description for log lines.
    pub fn log_summary(&self) -> String {
        match self {
            Self::DetailsEdited { actor, .. } => format!("DetailsEdited by {}", actor),
            Self::ReviewStarted { actor, .. } => format!("ReviewStarted by {}", actor),
            Self::QuorumReached { today, actor, .. } => {
                format!("QuorumReached on {} by {}", today, actor)
            }
        }
    }
}

/// Storage work implied by a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEffect {
    /// Delete every approval recorded for the assessment.
    ClearApprovals,
    /// The assessment became approved and is next due on this date.
    Promoted { next_review_date: NaiveDate },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionResult {
    pub assessment: RiskAssessment,
    pub effects: Vec<LifecycleEffect>,
}

impl TransitionResult {
    pub fn new(assessment: RiskAssessment, effects: Vec<LifecycleEffect>) -> Self {
        Self {
            assessment,
            effects,
        }
    }

    pub fn no_change(assessment: RiskAssessment) -> Self {
        Self {
            assessment,
            effects: vec![],
        }
    }

    /// The promotion date, if this transition approved the assessment.
    pub fn promoted_next_review_date(&self) -> Option<NaiveDate> {
        self.effects.iter().find_map(|effect| match effect {
            LifecycleEffect::Promoted { next_review_date } => Some(*next_review_date),
            _ => None,
        })
    }
}

/// Build a freshly created assessment: under review, never reviewed, and
/// due one interval from today.
pub fn initial_draft(
    category_id: CategoryId,
    details: AssessmentDetails,
    today: NaiveDate,
    actor: Actor,
    at: DateTime<Utc>,
) -> AssessmentDraft {
    let next = next_review_date(today, details.review_interval);
    AssessmentDraft {
        category_id,
        details,
        last_review_date: None,
        next_review_date: next,
        status: ReviewStatus::UnderReview,
        audit: Audit::created(actor, at),
    }
}

/// Apply an event to an assessment.
pub fn transition(assessment: RiskAssessment, event: LifecycleEvent) -> TransitionResult {
    match (assessment.status, event) {
        // Editing never touches status, dates or approvals. A new interval
        // takes effect at the next promotion.
        (_, LifecycleEvent::DetailsEdited { details, actor, at }) => {
            let mut assessment = assessment;
            assessment.details = details;
            assessment.audit.touch(actor, at);
            TransitionResult::no_change(assessment)
        }

        // Restarting from either state clears approvals and keeps both dates.
        (_, LifecycleEvent::ReviewStarted { actor, at }) => {
            let mut assessment = assessment;
            assessment.status = ReviewStatus::UnderReview;
            assessment.audit.touch(actor, at);
            TransitionResult::new(assessment, vec![LifecycleEffect::ClearApprovals])
        }

        (ReviewStatus::UnderReview, LifecycleEvent::QuorumReached { today, actor, at }) => {
            let mut assessment = assessment;
            let next = next_review_date(today, assessment.details.review_interval);
            assessment.status = ReviewStatus::Approved;
            assessment.last_review_date = Some(today);
            assessment.next_review_date = next;
            assessment.audit.touch(actor, at);
            TransitionResult::new(
                assessment,
                vec![LifecycleEffect::Promoted {
                    next_review_date: next,
                }],
            )
        }

        // Already approved in this cycle: extra approvals do not move the dates.
        (ReviewStatus::Approved, LifecycleEvent::QuorumReached { .. }) => {
            TransitionResult::no_change(assessment)
        }
    }
}
