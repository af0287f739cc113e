pub mod alert;
pub mod assessment;
pub mod lifecycle;
pub mod schedule;

pub use alert::{alert_status, is_overdue, AlertStatus, DUE_SOON_DAYS};
pub use assessment::*;
pub use lifecycle::{initial_draft, transition, LifecycleEffect, LifecycleEvent, TransitionResult};
pub use schedule::{add_years, days_until, next_review_date};
