//! Traffic-light alert status for review urgency.
//!
//! The alert status is derived on every read and never persisted.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::assessment::{ReviewStatus, RiskAssessment};
use crate::schedule::days_until;

/// Approved assessments due within this many days are flagged amber.
pub const DUE_SOON_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Red,
    Amber,
    Green,
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Red => write!(f, "red"),
            Self::Amber => write!(f, "amber"),
            Self::Green => write!(f, "green"),
        }
    }
}

/// Map an assessment's status and due date to an alert colour.
///
/// An assessment under review is always amber, whatever its dates say.
pub fn alert_status(
    status: ReviewStatus,
    next_review_date: NaiveDate,
    today: NaiveDate,
) -> AlertStatus {
    match status {
        ReviewStatus::UnderReview => AlertStatus::Amber,
        ReviewStatus::Approved => {
            let days = days_until(next_review_date, today);
            if days < 0 {
                AlertStatus::Red
            } else if days <= DUE_SOON_DAYS {
                AlertStatus::Amber
            } else {
                AlertStatus::Green
            }
        }
    }
}

/// True only for approved assessments whose review date has passed.
pub fn is_overdue(status: ReviewStatus, next_review_date: NaiveDate, today: NaiveDate) -> bool {
    status == ReviewStatus::Approved && next_review_date < today
}

impl RiskAssessment {
    pub fn alert_status(&self, today: NaiveDate) -> AlertStatus {
        alert_status(self.status, self.next_review_date, today)
    }

    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        is_overdue(self.status, self.next_review_date, today)
    }

    pub fn days_until_due(&self, today: NaiveDate) -> i64 {
        days_until(self.next_review_date, today)
    }
}
