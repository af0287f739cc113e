use anyhow::{bail, Context, Result};
use std::env;
use std::path::PathBuf;

/// Settings consumed by the review rules themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReviewSettings {
    /// Number of approvals that promotes an assessment to Approved.
    pub minimum_approvals_required: usize,
    /// Window used by the dashboard to classify an assessment as due soon.
    pub review_lookahead_days: i64,
    /// When set, repeated approvals by the same person within one cycle
    /// count once toward quorum. Every record is stored either way.
    pub count_distinct_approvers: bool,
}

impl Default for ReviewSettings {
    fn default() -> Self {
        Self {
            minimum_approvals_required: 2,
            review_lookahead_days: 30,
            count_distinct_approvers: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub review: ReviewSettings,
    pub port: u16,
    /// Directory for persistent state (SQLite database).
    /// Defaults to current working directory.
    pub state_dir: PathBuf,
    /// Optional JSON file mapping person ids to display names.
    pub directory_path: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let minimum_approvals_required = env::var("MIN_APPROVALS_REQUIRED")
            .unwrap_or_else(|_| "2".to_string())
            .parse::<usize>()
            .context("MIN_APPROVALS_REQUIRED must be a valid number")?;
        if minimum_approvals_required == 0 {
            bail!("MIN_APPROVALS_REQUIRED must be at least 1");
        }

        let review_lookahead_days = env::var("REVIEW_LOOKAHEAD_DAYS")
            .unwrap_or_else(|_| "30".to_string())
            .parse::<i64>()
            .context("REVIEW_LOOKAHEAD_DAYS must be a valid number")?;
        if review_lookahead_days < 0 {
            bail!("REVIEW_LOOKAHEAD_DAYS must not be negative");
        }

        let count_distinct_approvers = parse_flag(env::var("COUNT_DISTINCT_APPROVERS").ok());

        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .context("PORT must be a valid number")?;

        let state_dir = env::var("STATE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));

        let directory_path = env::var("DIRECTORY_PATH")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        Ok(Config {
            review: ReviewSettings {
                minimum_approvals_required,
                review_lookahead_days,
                count_distinct_approvers,
            },
            port,
            state_dir,
            directory_path,
        })
    }

    pub fn database_path(&self) -> PathBuf {
        self.state_dir.join("riskreview-state.db")
    }
}

/// Parse a boolean feature flag. Anything other than "true"/"1"/"yes" is off.
pub fn parse_flag(value: Option<String>) -> bool {
    value
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
}
