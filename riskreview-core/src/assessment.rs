//! Domain types for risk assessments, their categories and approvals.
//!
//! Following the principle of "make illegal states unrepresentable", the
//! review interval is an enum of the four permitted lengths rather than a
//! raw integer. Raw values from callers go through `TryFrom<u32>`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Newtype for a risk assessment's database identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssessmentId(pub i64);

impl fmt::Display for AssessmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Newtype for a category's database identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryId(pub i64);

impl fmt::Display for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApprovalId(pub i64);

/// Identifier of a person held by the external directory.
///
/// This is a weak reference: the review core never owns people, it only
/// asks the directory whether the id resolves and what to call them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersonId(pub String);

impl fmt::Display for PersonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for PersonId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for PersonId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Opaque audit attribution supplied by the caller of a mutating operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Actor(pub String);

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Actor {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Actor {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// How often an assessment must be re-approved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum ReviewInterval {
    OneYear,
    TwoYears,
    ThreeYears,
    FiveYears,
}

impl ReviewInterval {
    pub const ALLOWED: [u32; 4] = [1, 2, 3, 5];

    pub fn years(self) -> u32 {
        match self {
            Self::OneYear => 1,
            Self::TwoYears => 2,
            Self::ThreeYears => 3,
            Self::FiveYears => 5,
        }
    }
}

/// A review interval outside the permitted set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("review interval must be one of 1, 2, 3 or 5 years (got {0})")]
pub struct IntervalError(pub u32);

impl TryFrom<u32> for ReviewInterval {
    type Error = IntervalError;

    fn try_from(years: u32) -> Result<Self, Self::Error> {
        match years {
            1 => Ok(Self::OneYear),
            2 => Ok(Self::TwoYears),
            3 => Ok(Self::ThreeYears),
            5 => Ok(Self::FiveYears),
            other => Err(IntervalError(other)),
        }
    }
}

impl From<ReviewInterval> for u32 {
    fn from(interval: ReviewInterval) -> Self {
        interval.years()
    }
}

impl fmt::Display for ReviewInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.years() {
            1 => write!(f, "1 year"),
            n => write!(f, "{} years", n),
        }
    }
}

/// Stored lifecycle state of an assessment.
///
/// Being overdue is never stored; it is derived from the dates on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReviewStatus {
    UnderReview,
    Approved,
}

impl ReviewStatus {
    /// Stable name used by persistence adapters.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UnderReview => "under_review",
            Self::Approved => "approved",
        }
    }
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnderReview => write!(f, "Under Review"),
            Self::Approved => write!(f, "Approved"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown review status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for ReviewStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "under_review" => Ok(Self::UnderReview),
            "approved" => Ok(Self::Approved),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Who created and last modified a record, and when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Audit {
    pub created_by: Actor,
    pub created_at: DateTime<Utc>,
    pub modified_by: Option<Actor>,
    pub modified_at: Option<DateTime<Utc>>,
}

impl Audit {
    pub fn created(actor: Actor, at: DateTime<Utc>) -> Self {
        Self {
            created_by: actor,
            created_at: at,
            modified_by: None,
            modified_at: None,
        }
    }

    /// Re-stamp the modification metadata.
    pub fn touch(&mut self, actor: Actor, at: DateTime<Utc>) {
        self.modified_by = Some(actor);
        self.modified_at = Some(at);
    }
}

/// Descriptive, caller-editable fields of an assessment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentDetails {
    pub title: String,
    pub review_interval: ReviewInterval,
    pub description: Option<String>,
    pub scope: Option<String>,
    pub notes: Option<String>,
}

/// The aggregate root of the review lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessment {
    pub id: AssessmentId,
    pub category_id: CategoryId,
    #[serde(flatten)]
    pub details: AssessmentDetails,
    pub last_review_date: Option<NaiveDate>,
    pub next_review_date: NaiveDate,
    pub status: ReviewStatus,
    #[serde(flatten)]
    pub audit: Audit,
    /// Optimistic concurrency token, bumped on every aggregate write.
    pub version: i64,
}

/// An assessment that has not been assigned an identity yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssessmentDraft {
    pub category_id: CategoryId,
    pub details: AssessmentDetails,
    pub last_review_date: Option<NaiveDate>,
    pub next_review_date: NaiveDate,
    pub status: ReviewStatus,
    pub audit: Audit,
}

impl AssessmentDraft {
    /// Attach the identity assigned by storage.
    pub fn into_assessment(self, id: AssessmentId) -> RiskAssessment {
        RiskAssessment {
            id,
            category_id: self.category_id,
            details: self.details,
            last_review_date: self.last_review_date,
            next_review_date: self.next_review_date,
            status: self.status,
            audit: self.audit,
            version: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub description: Option<String>,
    #[serde(flatten)]
    pub audit: Audit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryDraft {
    pub name: String,
    pub description: Option<String>,
    pub audit: Audit,
}

/// Key under which category names must be unique.
///
/// Uniqueness is case-insensitive and ignores surrounding whitespace.
pub fn category_name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// A single approver's sign-off within the current review cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Approval {
    pub id: ApprovalId,
    pub assessment_id: AssessmentId,
    pub approver_id: PersonId,
    pub approved_at: DateTime<Utc>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalDraft {
    pub approver_id: PersonId,
    pub approved_at: DateTime<Utc>,
    pub notes: Option<String>,
}
