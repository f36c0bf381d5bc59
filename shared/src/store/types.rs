use chrono::{DateTime, Utc};

use crate::{HallOfFameEntry, LinkedRepo, StreakRecord};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StreakRow {
    pub user_id: i64,
    pub username: String,
    pub current_day: i64,
    pub last_post_timestamp: i64,
    pub is_active: bool,
    pub created_at: i64,
    pub completed_at: Option<i64>,
    pub reminders_enabled: bool,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct HallOfFameRow {
    pub user_id: i64,
    pub username: String,
    pub completed_at: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RepoRow {
    pub user_id: i64,
    pub github_repo: String,
}

pub(crate) fn to_millis(time: DateTime<Utc>) -> i64 {
    time.timestamp_millis()
}

pub(crate) fn from_millis(millis: i64) -> anyhow::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| anyhow::anyhow!("Timestamp out of range: {millis}"))
}

impl TryFrom<StreakRow> for StreakRecord {
    type Error = anyhow::Error;

    fn try_from(row: StreakRow) -> anyhow::Result<Self> {
        Ok(Self {
            user_id: row.user_id as u64,
            username: row.username,
            current_day: u32::try_from(row.current_day)?,
            last_post_timestamp: from_millis(row.last_post_timestamp)?,
            is_active: row.is_active,
            created_at: from_millis(row.created_at)?,
            completed_at: row.completed_at.map(from_millis).transpose()?,
            reminders_enabled: row.reminders_enabled,
        })
    }
}

impl TryFrom<HallOfFameRow> for HallOfFameEntry {
    type Error = anyhow::Error;

    fn try_from(row: HallOfFameRow) -> anyhow::Result<Self> {
        Ok(Self {
            user_id: row.user_id as u64,
            username: row.username,
            completed_at: from_millis(row.completed_at)?,
        })
    }
}

impl From<RepoRow> for LinkedRepo {
    fn from(row: RepoRow) -> Self {
        Self {
            user_id: row.user_id as u64,
            github_repo: row.github_repo,
        }
    }
}
