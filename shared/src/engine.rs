use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use crate::{
    locks::UserLocks,
    split_repo,
    store::Store,
    validator::{self, Validation},
    Day, StreakRecord, UserId, FINAL_DAY,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Progression,
    TimeWindow,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Not a progress post.
    Ignored,
    Accepted {
        day: Day,
        milestone: bool,
        completed: bool,
    },
    Rejected {
        reason: RejectReason,
        message: String,
    },
    /// The record changed under us (dropped or archived concurrently).
    Failed,
}

impl Outcome {
    fn accepted(day: Day) -> Self {
        Self::Accepted {
            day,
            milestone: validator::is_milestone(day),
            completed: day == FINAL_DAY,
        }
    }

    fn rejected(reason: RejectReason, validation: Validation) -> Self {
        Self::Rejected {
            reason,
            message: validation.message,
        }
    }
}

/// Proof that the caller is allowed to override streaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdminClaim {
    granted_to: UserId,
}

impl AdminClaim {
    pub const fn granted_to(&self) -> UserId {
        self.granted_to
    }

    pub fn verify(user_id: UserId, admins: &[UserId]) -> Option<Self> {
        admins
            .contains(&user_id)
            .then_some(Self {
                granted_to: user_id,
            })
    }
}

#[derive(Clone, Debug)]
pub struct StreakEngine {
    store: Store,
    locks: UserLocks,
}

impl StreakEngine {
    pub fn new(store: Store, locks: UserLocks) -> Self {
        Self { store, locks }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn locks(&self) -> &UserLocks {
        &self.locks
    }

    #[instrument(skip(self, text))]
    pub async fn handle_post(
        &self,
        user_id: UserId,
        username: &str,
        text: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Outcome> {
        let Some(day) = validator::parse_progress_tag(text) else {
            return Ok(Outcome::Ignored);
        };

        let _guard = self.locks.lock(user_id).await;
        let record = self.store.get(user_id).await?;

        let is_new_user = record.is_none();
        let current_day = record.as_ref().map_or(0, |record| record.current_day);

        let progression = validator::validate_progression(current_day, day, is_new_user);
        if !progression.accepted {
            debug!("{username} posted day {day} while on day {current_day}");
            return Ok(Outcome::rejected(RejectReason::Progression, progression));
        }

        if let Some(record) = &record {
            let window = validator::validate_time_window(record.last_post_timestamp, now);
            if !window.accepted {
                debug!("{username} already posted on {}", now.date_naive());
                return Ok(Outcome::rejected(RejectReason::TimeWindow, window));
            }
        }

        self.apply(record.as_ref(), user_id, username, day, now)
            .await
    }

    /// Writes a validated post. `record` is what the caller read under the
    /// user's lock.
    async fn apply(
        &self,
        record: Option<&StreakRecord>,
        user_id: UserId,
        username: &str,
        day: Day,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Outcome> {
        let applied = if record.is_none() {
            self.store.create(user_id, username, now).await?
        } else if day == FINAL_DAY {
            self.store
                .archive_to_hall_of_fame(user_id, username, now)
                .await?
        } else {
            // Also reactivates a deactivated record
            self.store
                .update_progress(user_id, username, day, now)
                .await?
        };

        if !applied {
            warn!("Progress of {username} ({user_id}) was not applied for day {day}");
            return Ok(Outcome::Failed);
        }

        if day == FINAL_DAY {
            info!("{username} ({user_id}) completed the challenge");
        } else {
            debug!("{username} ({user_id}) logged day {day}");
        }
        Ok(Outcome::accepted(day))
    }

    #[instrument(skip(self))]
    pub async fn reset(
        &self,
        claim: &AdminClaim,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        let _guard = self.locks.lock(user_id).await;
        let found = self.store.reset(user_id, now).await?;
        if found {
            info!("{} reset {user_id} to day 1", claim.granted_to);
        }
        Ok(found)
    }

    #[instrument(skip(self))]
    pub async fn force_set(
        &self,
        claim: &AdminClaim,
        user_id: UserId,
        username: &str,
        day: Day,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        if !(1..=FINAL_DAY).contains(&day) {
            anyhow::bail!("Day must be between 1 and {FINAL_DAY}, got {day}");
        }

        let _guard = self.locks.lock(user_id).await;
        self.store.force_set(user_id, username, day, now).await?;
        info!("{} set {username} ({user_id}) to day {day}", claim.granted_to);
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn deactivate(&self, claim: &AdminClaim, user_id: UserId) -> anyhow::Result<bool> {
        let _guard = self.locks.lock(user_id).await;
        let changed = self.store.deactivate(user_id).await?;
        if changed {
            info!("{} deactivated {user_id}", claim.granted_to);
        }
        Ok(changed)
    }

    #[instrument(skip(self))]
    pub async fn drop_user(&self, claim: &AdminClaim, user_id: UserId) -> anyhow::Result<bool> {
        let _guard = self.locks.lock(user_id).await;
        let found = self.store.delete(user_id).await?;
        if found {
            info!("{} dropped {user_id} from tracking", claim.granted_to);
        }
        Ok(found)
    }

    /// Returns the new setting, or `None` for users that are not tracked.
    #[instrument(skip(self))]
    pub async fn toggle_reminders(&self, user_id: UserId) -> anyhow::Result<Option<bool>> {
        let _guard = self.locks.lock(user_id).await;
        let Some(record) = self.store.get(user_id).await? else {
            return Ok(None);
        };

        let enabled = !record.reminders_enabled;
        if !self.store.set_reminders_enabled(user_id, enabled).await? {
            return Ok(None);
        }
        Ok(Some(enabled))
    }

    /// Returns `false` if `repo` is not an `owner/name` pair.
    #[instrument(skip(self))]
    pub async fn link_repo(&self, user_id: UserId, repo: &str) -> anyhow::Result<bool> {
        let Some((owner, name)) = split_repo(repo) else {
            return Ok(false);
        };

        self.store
            .link_repo(user_id, &format!("{owner}/{name}"))
            .await?;
        Ok(true)
    }
}
