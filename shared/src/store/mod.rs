use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use tracing::{debug, instrument};

use crate::{Day, HallOfFameEntry, LinkedRepo, StreakRecord, UserId, FINAL_DAY};

pub mod types;

use self::types::{to_millis, HallOfFameRow, RepoRow, StreakRow};

const STREAK_COLUMNS: &str = "user_id, username, current_day, last_post_timestamp, is_active, created_at, completed_at, reminders_enabled";

/// Sole owner of the persisted streak data.
///
/// Every method is a single statement or a single transaction. Methods that
/// target one user report "nothing matched" as `false`/`None`, storage
/// failures come back as `Err`.
#[derive(Clone, Debug)]
pub struct Store(SqlitePool);

impl Store {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        let store = Self(pool);
        store.migrate().await?;
        Ok(store)
    }

    /// A private database living as long as the returned store.
    pub async fn in_memory() -> anyhow::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        let store = Self(pool);
        store.migrate().await?;
        Ok(store)
    }

    /// Waits for open connections to finish. Later calls fail.
    pub async fn close(&self) {
        self.0.close().await;
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.0
    }

    async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.0).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn get(&self, user_id: UserId) -> anyhow::Result<Option<StreakRecord>> {
        let row: Option<StreakRow> = sqlx::query_as(&format!(
            "SELECT {STREAK_COLUMNS} FROM user_streaks WHERE user_id = ?"
        ))
        .bind(user_id as i64)
        .fetch_optional(&self.0)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// Inserts a day 1 record. Returns `false` if the user already has one.
    #[instrument(skip(self))]
    pub async fn create(
        &self,
        user_id: UserId,
        username: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO user_streaks
                (user_id, username, current_day, last_post_timestamp, is_active, created_at, reminders_enabled)
            VALUES (?, ?, 1, ?, 1, ?, 1)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(user_id as i64)
        .bind(username)
        .bind(to_millis(now))
        .bind(to_millis(now))
        .execute(&self.0)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Also reactivates the record, so a deactivated user who resumes
    /// their streak is tracked again.
    #[instrument(skip(self))]
    pub async fn update_progress(
        &self,
        user_id: UserId,
        username: &str,
        new_day: Day,
        now: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        let completed_at = (new_day == FINAL_DAY).then(|| to_millis(now));
        let result = sqlx::query(
            r#"
            UPDATE user_streaks
            SET username = ?, current_day = ?, last_post_timestamp = ?, completed_at = ?, is_active = 1
            WHERE user_id = ?
            "#,
        )
        .bind(username)
        .bind(new_day as i64)
        .bind(to_millis(now))
        .bind(completed_at)
        .bind(user_id as i64)
        .execute(&self.0)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Back to day 1, reactivated, completion cleared.
    #[instrument(skip(self))]
    pub async fn reset(&self, user_id: UserId, now: DateTime<Utc>) -> anyhow::Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE user_streaks
            SET current_day = 1, last_post_timestamp = ?, completed_at = NULL, is_active = 1
            WHERE user_id = ?
            "#,
        )
        .bind(to_millis(now))
        .bind(user_id as i64)
        .execute(&self.0)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Administrative upsert. No progression or time window rules apply.
    #[instrument(skip(self))]
    pub async fn force_set(
        &self,
        user_id: UserId,
        username: &str,
        day: Day,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let completed_at = (day == FINAL_DAY).then(|| to_millis(now));
        sqlx::query(
            r#"
            INSERT INTO user_streaks
                (user_id, username, current_day, last_post_timestamp, is_active, created_at, completed_at, reminders_enabled)
            VALUES (?1, ?2, ?3, ?4, 1, ?4, ?5, 1)
            ON CONFLICT (user_id) DO UPDATE
            SET username = excluded.username,
                current_day = excluded.current_day,
                last_post_timestamp = excluded.last_post_timestamp,
                completed_at = CASE
                    WHEN excluded.current_day = ?6 THEN COALESCE(user_streaks.completed_at, excluded.completed_at)
                    ELSE NULL
                END,
                is_active = 1
            "#,
        )
        .bind(user_id as i64)
        .bind(username)
        .bind(day as i64)
        .bind(to_millis(now))
        .bind(completed_at)
        .bind(FINAL_DAY as i64)
        .execute(&self.0)
        .await?;

        Ok(())
    }

    /// Only flips active records, so running it twice is a no-op.
    #[instrument(skip(self))]
    pub async fn deactivate(&self, user_id: UserId) -> anyhow::Result<bool> {
        let result =
            sqlx::query("UPDATE user_streaks SET is_active = 0 WHERE user_id = ? AND is_active = 1")
                .bind(user_id as i64)
                .execute(&self.0)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, user_id: UserId) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM user_streaks WHERE user_id = ?")
            .bind(user_id as i64)
            .execute(&self.0)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Moves a finished streak into the hall of fame in one transaction.
    /// Returns `false` and leaves both tables untouched if there is no
    /// active record to move.
    #[instrument(skip(self))]
    pub async fn archive_to_hall_of_fame(
        &self,
        user_id: UserId,
        username: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        let mut tx = self.0.begin().await?;

        let deleted = sqlx::query("DELETE FROM user_streaks WHERE user_id = ?")
            .bind(user_id as i64)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if deleted == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            r#"
            INSERT INTO hall_of_fame (user_id, username, completed_at)
            VALUES (?, ?, ?)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(user_id as i64)
        .bind(username)
        .bind(to_millis(now))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!("Archived {user_id} ({username}) to the hall of fame");
        Ok(true)
    }

    /// Active records, highest day first, earlier poster first on ties.
    pub async fn list_leaderboard(&self, limit: u32) -> anyhow::Result<Vec<StreakRecord>> {
        self.list_leaderboard_page(limit, 0).await
    }

    #[instrument(skip(self))]
    pub async fn list_leaderboard_page(
        &self,
        limit: u32,
        offset: u64,
    ) -> anyhow::Result<Vec<StreakRecord>> {
        let rows: Vec<StreakRow> = sqlx::query_as(&format!(
            r#"
            SELECT {STREAK_COLUMNS}
            FROM user_streaks
            WHERE is_active = 1
            ORDER BY current_day DESC, last_post_timestamp ASC, user_id ASC
            LIMIT ? OFFSET ?
            "#
        ))
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.0)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    #[instrument(skip(self))]
    pub async fn count_active(&self) -> anyhow::Result<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM user_streaks WHERE is_active = 1")
            .fetch_one(&self.0)
            .await?;
        Ok(count as u64)
    }

    /// 1-based leaderboard position, `None` for absent or inactive users.
    #[instrument(skip(self))]
    pub async fn rank(&self, user_id: UserId) -> anyhow::Result<Option<(u64, StreakRecord)>> {
        let Some(record) = self.get(user_id).await?.filter(|record| record.is_active) else {
            return Ok(None);
        };

        let last_post = to_millis(record.last_post_timestamp);
        let (ahead,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
            FROM user_streaks
            WHERE is_active = 1
              AND (current_day > ?1
                OR (current_day = ?1 AND last_post_timestamp < ?2)
                OR (current_day = ?1 AND last_post_timestamp = ?2 AND user_id < ?3))
            "#,
        )
        .bind(record.current_day as i64)
        .bind(last_post)
        .bind(user_id as i64)
        .fetch_one(&self.0)
        .await?;

        Ok(Some((ahead as u64 + 1, record)))
    }

    #[instrument(skip(self))]
    pub async fn list_inactive(
        &self,
        days_threshold: u32,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Vec<StreakRecord>> {
        let threshold = now - Duration::days(days_threshold as i64);
        let rows: Vec<StreakRow> = sqlx::query_as(&format!(
            r#"
            SELECT {STREAK_COLUMNS}
            FROM user_streaks
            WHERE is_active = 1 AND last_post_timestamp < ?
            ORDER BY last_post_timestamp ASC
            "#
        ))
        .bind(to_millis(threshold))
        .fetch_all(&self.0)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    #[instrument(skip(self))]
    pub async fn set_reminders_enabled(
        &self,
        user_id: UserId,
        enabled: bool,
    ) -> anyhow::Result<bool> {
        let result = sqlx::query("UPDATE user_streaks SET reminders_enabled = ? WHERE user_id = ?")
            .bind(enabled)
            .bind(user_id as i64)
            .execute(&self.0)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    pub async fn hall_of_fame(&self, limit: u32) -> anyhow::Result<Vec<HallOfFameEntry>> {
        let rows: Vec<HallOfFameRow> = sqlx::query_as(
            r#"
            SELECT user_id, username, completed_at
            FROM hall_of_fame
            ORDER BY completed_at ASC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.0)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    #[instrument(skip(self))]
    pub async fn link_repo(&self, user_id: UserId, repo: &str) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_repos (user_id, github_repo)
            VALUES (?, ?)
            ON CONFLICT (user_id) DO UPDATE
            SET github_repo = excluded.github_repo
            "#,
        )
        .bind(user_id as i64)
        .bind(repo)
        .execute(&self.0)
        .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn linked_repo(&self, user_id: UserId) -> anyhow::Result<Option<LinkedRepo>> {
        let row: Option<RepoRow> =
            sqlx::query_as("SELECT user_id, github_repo FROM user_repos WHERE user_id = ?")
                .bind(user_id as i64)
                .fetch_optional(&self.0)
                .await?;

        Ok(row.map(Into::into))
    }
}
