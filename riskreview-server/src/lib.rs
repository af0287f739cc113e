pub mod api;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod dashboard;
pub mod directory;
pub mod error;
pub mod repository;
pub mod review;
pub mod service;

use tokio_util::sync::CancellationToken;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{Config, ReviewSettings};
pub use error::ServiceError;
pub use service::RiskReviewService;

mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub fn get_service_version() -> String {
    // First check for git hash from the release build environment
    if let Some(git_hash) = option_env!("RISKREVIEW_GIT_HASH") {
        if git_hash.len() >= 8 {
            git_hash[..8].to_string()
        } else {
            git_hash.to_string()
        }
    } else if let Some(git_hash) = built_info::GIT_COMMIT_HASH {
        // Fall back to built crate's git detection (for cargo builds)
        if git_hash.len() >= 8 {
            git_hash[..8].to_string()
        } else {
            git_hash.to_string()
        }
    } else {
        built_info::PKG_VERSION.to_string()
    }
}

pub struct AppState {
    pub service: RiskReviewService,
    /// Cancelled when the server begins shutting down. Each mutating request
    /// runs under a child token, so in-flight writes that have not reached
    /// their commit point are abandoned.
    pub shutdown: CancellationToken,
}
