use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod alerts;
pub mod engine;
pub mod locks;
pub mod notify;
pub mod query;
pub mod store;
pub mod sweep;
pub mod validator;

#[cfg(feature = "github")]
pub mod github;

pub use engine::{AdminClaim, Outcome, RejectReason, StreakEngine};
pub use locks::UserLocks;
pub use notify::{Notifier, NotifyError};
pub use query::{Query, StatusView};
pub use store::Store;
pub use sweep::{
    DefaultSweepMessages, InactivitySweep, SweepMessages, SweepReport, SweepScheduler, SweepTier,
};

/// Discord snowflake of the participant.
pub type UserId = u64;
pub type Day = u32;

pub const FINAL_DAY: Day = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakRecord {
    pub user_id: UserId,
    pub username: String,
    pub current_day: Day,
    pub last_post_timestamp: DateTime<Utc>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub reminders_enabled: bool,
}

impl StreakRecord {
    pub const fn next_day(&self) -> Day {
        self.current_day + 1
    }

    pub fn days_inactive(&self, now: DateTime<Utc>) -> i64 {
        validator::days_inactive(self.last_post_timestamp, now)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HallOfFameEntry {
    pub user_id: UserId,
    pub username: String,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedRepo {
    pub user_id: UserId,
    pub github_repo: String,
}

impl LinkedRepo {
    /// Splits `owner/name` into its parts.
    pub fn owner_and_name(&self) -> Option<(&str, &str)> {
        split_repo(&self.github_repo)
    }
}

pub fn split_repo(repo: &str) -> Option<(&str, &str)> {
    let (owner, name) = repo.trim().split_once('/')?;
    let valid = |part: &str| {
        !part.is_empty()
            && part
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    };
    (valid(owner) && valid(name)).then_some((owner, name))
}
