use std::{collections::BTreeMap, sync::Arc, time::Duration};

use chrono::{DateTime, Days, Utc};
use strum::{EnumIter, IntoEnumIterator};
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    locks::UserLocks,
    notify::{bounded, Notifier, NotifyError},
    store::Store,
    StreakRecord, UserId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, EnumIter, strum::Display)]
pub enum SweepTier {
    Gentle,
    Firm,
    PublicWarning,
    Removal,
}

impl SweepTier {
    pub const fn days(&self) -> u32 {
        match self {
            Self::Gentle => 3,
            Self::Firm => 5,
            Self::PublicWarning => 7,
            Self::Removal => 14,
        }
    }

    pub const fn is_reminder(&self) -> bool {
        !matches!(self, Self::Removal)
    }

    pub const fn is_public(&self) -> bool {
        matches!(self, Self::PublicWarning)
    }
}

/// Texts the sweep sends. The bot renders them from its message file.
pub trait SweepMessages: Send + Sync {
    fn reminder(&self, tier: SweepTier, record: &StreakRecord, mention: &str) -> String;
    fn removal_announcement(&self, record: &StreakRecord, mention: &str) -> String;
    fn removal_direct(&self, record: &StreakRecord) -> String;
}

pub struct DefaultSweepMessages;

impl SweepMessages for DefaultSweepMessages {
    fn reminder(&self, tier: SweepTier, record: &StreakRecord, mention: &str) -> String {
        let day = record.current_day;
        match tier {
            SweepTier::Gentle => format!(
                "🌟 Hey there! Just a friendly reminder to log your coding progress. You're on day {day}."
            ),
            SweepTier::Firm => format!(
                "⚠️ You haven't posted in 5 days. Don't break your streak now, you're on day {day}!"
            ),
            SweepTier::PublicWarning | SweepTier::Removal => format!(
                "🚨 **7 days without posting!** Your streak is at risk. {mention} - Currently on day {day}"
            ),
        }
    }

    fn removal_announcement(&self, _record: &StreakRecord, mention: &str) -> String {
        format!("💔 {mention} has been removed from tracking after 14 days of inactivity. Post your next day anytime to pick up where you left off!")
    }

    fn removal_direct(&self, _record: &StreakRecord) -> String {
        "💔 You've been removed from 100 Days of Code tracking after 14 days of inactivity. When you're ready, start again with [1/100]!".to_string()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub sent: BTreeMap<SweepTier, usize>,
    pub failed: BTreeMap<SweepTier, usize>,
    pub deactivated: Vec<UserId>,
}

impl SweepReport {
    fn record(&mut self, tier: SweepTier, user_id: UserId, result: Result<(), NotifyError>) {
        match result {
            Ok(()) => *self.sent.entry(tier).or_default() += 1,
            Err(e) => {
                if e.is_expected() {
                    warn!("Failed to notify {user_id} ({tier}): {e}");
                } else {
                    error!("Failed to notify {user_id} ({tier}): {e:?}");
                }
                *self.failed.entry(tier).or_default() += 1;
            }
        }
    }

    pub fn sent(&self, tier: SweepTier) -> usize {
        self.sent.get(&tier).copied().unwrap_or_default()
    }

    pub fn failed(&self, tier: SweepTier) -> usize {
        self.failed.get(&tier).copied().unwrap_or_default()
    }
}

pub struct InactivitySweep {
    store: Store,
    locks: UserLocks,
    notifier: Arc<dyn Notifier>,
    messages: Arc<dyn SweepMessages>,
    notify_timeout: Duration,
}

impl InactivitySweep {
    pub fn new(
        store: Store,
        locks: UserLocks,
        notifier: Arc<dyn Notifier>,
        messages: Arc<dyn SweepMessages>,
        notify_timeout: Duration,
    ) -> Self {
        Self {
            store,
            locks,
            notifier,
            messages,
            notify_timeout,
        }
    }

    /// One full pass: exact-day reminders, then the removal sweep.
    /// A storage error aborts the pass, a failed notification does not.
    #[instrument(skip(self))]
    pub async fn run(&self, now: DateTime<Utc>) -> anyhow::Result<SweepReport> {
        let mut report = SweepReport::default();

        for tier in SweepTier::iter().filter(SweepTier::is_reminder) {
            let candidates = self.store.list_inactive(tier.days(), now).await?;
            debug!("{} users inactive for {}+ days", candidates.len(), tier.days());

            for record in candidates {
                if !record.reminders_enabled {
                    continue;
                }
                // Later days are covered by the next tier, not by repeating this one
                if record.days_inactive(now) != tier.days() as i64 {
                    continue;
                }

                let result = self.remind(tier, &record).await;
                report.record(tier, record.user_id, result);
            }
        }

        let stragglers = self
            .store
            .list_inactive(SweepTier::Removal.days(), now)
            .await?;
        for record in stragglers {
            if !self.deactivate_if_still_inactive(record.user_id, now).await? {
                continue;
            }
            report.deactivated.push(record.user_id);

            let mention = self.notifier.mention(record.user_id);
            let announcement = self.messages.removal_announcement(&record, &mention);
            let result = bounded(self.notify_timeout, self.notifier.announce(&announcement)).await;
            report.record(SweepTier::Removal, record.user_id, result);

            let direct = self.messages.removal_direct(&record);
            let result = bounded(
                self.notify_timeout,
                self.notifier.direct_message(record.user_id, &direct),
            )
            .await;
            report.record(SweepTier::Removal, record.user_id, result);
        }

        info!(
            "Sweep finished: {} reminders sent, {} failed, {} users removed",
            report.sent.values().sum::<usize>(),
            report.failed.values().sum::<usize>(),
            report.deactivated.len()
        );
        Ok(report)
    }

    async fn remind(&self, tier: SweepTier, record: &StreakRecord) -> Result<(), NotifyError> {
        let mention = self.notifier.mention(record.user_id);
        let text = self.messages.reminder(tier, record, &mention);
        if tier.is_public() {
            bounded(self.notify_timeout, self.notifier.announce(&text)).await
        } else {
            bounded(
                self.notify_timeout,
                self.notifier.direct_message(record.user_id, &text),
            )
            .await
        }
    }

    /// The listing is a snapshot; the user may have posted or been removed since.
    async fn deactivate_if_still_inactive(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        let _guard = self.locks.lock(user_id).await;
        let still_inactive = self.store.get(user_id).await?.is_some_and(|record| {
            record.is_active && record.days_inactive(now) >= SweepTier::Removal.days() as i64
        });
        if !still_inactive {
            debug!("{user_id} changed since the inactivity listing, skipping");
            return Ok(false);
        }

        self.store.deactivate(user_id).await
    }
}

/// Fires the sweep once a day at `hour`:00 UTC. A trigger that arrives
/// while the previous run is still going is dropped.
#[derive(Clone)]
pub struct SweepScheduler {
    sweep: Arc<InactivitySweep>,
    hour: u32,
    running: Arc<Mutex<()>>,
}

impl SweepScheduler {
    pub fn new(sweep: Arc<InactivitySweep>, hour: u32) -> anyhow::Result<Self> {
        if hour > 23 {
            anyhow::bail!("Sweep hour must be within 0..=23, got {hour}");
        }

        Ok(Self {
            sweep,
            hour,
            running: Default::default(),
        })
    }

    pub fn next_run_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let today = now.date_naive().and_hms_opt(self.hour, 0, 0)?.and_utc();
        if today > now {
            Some(today)
        } else {
            today.checked_add_days(Days::new(1))
        }
    }

    /// Returns `None` when the run was skipped because another one is in progress.
    pub async fn trigger(&self, now: DateTime<Utc>) -> Option<anyhow::Result<SweepReport>> {
        let Ok(_running) = self.running.clone().try_lock_owned() else {
            warn!("Previous inactivity sweep is still running. Skipping this trigger");
            return None;
        };

        let result = self.sweep.run(now).await;
        if let Err(e) = &result {
            error!("Inactivity sweep aborted, will retry on the next trigger: {e:?}");
        }
        Some(result)
    }

    pub async fn run_forever<F>(self, on_report: F)
    where
        F: Fn(&SweepReport, Duration) + Send + Sync + 'static,
    {
        let on_report = Arc::new(on_report);
        loop {
            let now = Utc::now();
            let Some(next) = self.next_run_after(now) else {
                error!("Failed to compute the next sweep time after {now}");
                return;
            };
            info!("Next inactivity sweep at {next}");
            tokio::time::sleep((next - now).to_std().unwrap_or_default()).await;

            let scheduler = self.clone();
            let on_report = on_report.clone();
            tokio::spawn(async move {
                let started = std::time::Instant::now();
                if let Some(Ok(report)) = scheduler.trigger(Utc::now()).await {
                    on_report(&report, started.elapsed());
                }
            });
        }
    }
}
