use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::instrument;

use crate::{store::Store, HallOfFameEntry, LinkedRepo, StreakRecord, UserId};

#[derive(Debug, Clone, Serialize)]
pub struct StatusView {
    #[serde(flatten)]
    pub record: StreakRecord,
    pub days_since_last_post: i64,
}

/// Read-only projections over the store.
#[derive(Clone, Debug)]
pub struct Query {
    store: Store,
}

impl Query {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn leaderboard(&self, limit: u32) -> anyhow::Result<Vec<StreakRecord>> {
        self.store.list_leaderboard(limit).await
    }

    /// One page of the active leaderboard plus the number of active users.
    /// `page` starts at 1.
    #[instrument(skip(self))]
    pub async fn leaderboard_page(
        &self,
        page: u32,
        per_page: u32,
    ) -> anyhow::Result<(Vec<StreakRecord>, u64)> {
        let offset = page.saturating_sub(1) as u64 * per_page as u64;
        let records = self.store.list_leaderboard_page(per_page, offset).await?;
        let total = self.store.count_active().await?;
        Ok((records, total))
    }

    /// 1-based position on the active leaderboard.
    pub async fn rank(&self, user_id: UserId) -> anyhow::Result<Option<(u64, StreakRecord)>> {
        self.store.rank(user_id).await
    }

    pub async fn status(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<StatusView>> {
        Ok(self.store.get(user_id).await?.map(|record| StatusView {
            days_since_last_post: record.days_inactive(now),
            record,
        }))
    }

    pub async fn hall_of_fame(&self, limit: u32) -> anyhow::Result<Vec<HallOfFameEntry>> {
        self.store.hall_of_fame(limit).await
    }

    pub async fn inactive(
        &self,
        days: u32,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Vec<StreakRecord>> {
        self.store.list_inactive(days, now).await
    }

    pub async fn linked_repo(&self, user_id: UserId) -> anyhow::Result<Option<LinkedRepo>> {
        self.store.linked_repo(user_id).await
    }
}
