//! Review date arithmetic.

use chrono::{Months, NaiveDate};

use crate::assessment::ReviewInterval;

/// Add whole calendar years to a date.
///
/// 29 February maps to 28 February when the target year is not a leap year.
/// Dates beyond chrono's representable range saturate at `NaiveDate::MAX`.
pub fn add_years(date: NaiveDate, years: u32) -> NaiveDate {
    years
        .checked_mul(12)
        .and_then(|months| date.checked_add_months(Months::new(months)))
        .unwrap_or(NaiveDate::MAX)
}

/// Date by which an assessment reviewed on `reviewed_on` must be reviewed again.
pub fn next_review_date(reviewed_on: NaiveDate, interval: ReviewInterval) -> NaiveDate {
    add_years(reviewed_on, interval.years())
}

/// Signed number of days from `today` until `due`. Negative when overdue.
pub fn days_until(due: NaiveDate, today: NaiveDate) -> i64 {
    due.signed_duration_since(today).num_days()
}
