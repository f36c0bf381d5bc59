use std::time::Duration;

use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::Histogram;
use prometheus_client::registry::Registry;
use shared::{Outcome, RejectReason, SweepReport};

use crate::events::commands::Command;

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum PostOutcome {
    Accepted,
    Milestone,
    Completed,
    RejectedProgression,
    RejectedTimeWindow,
    Failed,
    Error,
}

impl PostOutcome {
    /// `None` for messages that were not progress posts.
    pub fn from_outcome(outcome: &Outcome) -> Option<Self> {
        Some(match outcome {
            Outcome::Ignored => return None,
            Outcome::Accepted {
                completed: true, ..
            } => PostOutcome::Completed,
            Outcome::Accepted {
                milestone: true, ..
            } => PostOutcome::Milestone,
            Outcome::Accepted { .. } => PostOutcome::Accepted,
            Outcome::Rejected {
                reason: RejectReason::Progression,
                ..
            } => PostOutcome::RejectedProgression,
            Outcome::Rejected {
                reason: RejectReason::TimeWindow,
                ..
            } => PostOutcome::RejectedTimeWindow,
            Outcome::Failed => PostOutcome::Failed,
        })
    }
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum CommandKind {
    Leaderboard,
    Status,
    MyRank,
    RemindToggle,
    HallOfFame,
    LinkRepo,
    Commits,
    Help,
    Reset,
    ForceAdd,
    Deactivate,
    DropUser,
    Inactive,
    ListUsers,
    UserStatus,
    Invalid,
    Unknown,
}

impl From<&Command> for CommandKind {
    fn from(command: &Command) -> Self {
        match command {
            Command::Leaderboard => CommandKind::Leaderboard,
            Command::Status(_) => CommandKind::Status,
            Command::MyRank => CommandKind::MyRank,
            Command::RemindToggle => CommandKind::RemindToggle,
            Command::HallOfFame => CommandKind::HallOfFame,
            Command::LinkRepo(_) => CommandKind::LinkRepo,
            Command::Commits(_) => CommandKind::Commits,
            Command::Help => CommandKind::Help,
            Command::Reset(_) => CommandKind::Reset,
            Command::ForceAdd { .. } => CommandKind::ForceAdd,
            Command::Deactivate(_) => CommandKind::Deactivate,
            Command::DropUser(_) => CommandKind::DropUser,
            Command::Inactive(_) => CommandKind::Inactive,
            Command::ListUsers(_) => CommandKind::ListUsers,
            Command::UserStatus(_) => CommandKind::UserStatus,
            Command::Invalid { .. } => CommandKind::Invalid,
            Command::Unknown(_) => CommandKind::Unknown,
        }
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct PostRecord {
    pub outcome: PostOutcome,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct CommandRecord {
    pub command: CommandKind,
    pub success: u32,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct SweepRecord {
    pub tier: String,
    pub success: u32,
}

pub struct PrometheusClient {
    registry: Registry,
    posts: Family<PostRecord, Counter>,
    commands: Family<CommandRecord, Counter>,
    sweep_notifications: Family<SweepRecord, Counter>,
    sweep_deactivations: Counter,
    sweep_duration: Histogram,

    // Discord does not report usage, so count every write ourselves
    discord_api_write_request: Counter,
}

impl Default for PrometheusClient {
    fn default() -> Self {
        let mut registry = Registry::default();
        let posts = Family::default();
        let commands = Family::default();
        let sweep_notifications = Family::default();
        let sweep_deactivations = Counter::default();
        let discord_api_write_request = Counter::default();
        let sweep_duration = Histogram::new(
            [1., 5., 10., 30., 60., 120., 300., 600., 1800., f64::INFINITY].into_iter(),
        );

        registry.register(
            "discord_api_write_requests",
            "Display total used discord write requests from the start at a metric time",
            discord_api_write_request.clone(),
        );
        registry.register("bot_posts", "Progress posts by outcome", posts.clone());
        registry.register("bot_commands", "Processed chat commands", commands.clone());
        registry.register(
            "sweep_notifications",
            "Inactivity notifications by tier and delivery result",
            sweep_notifications.clone(),
        );
        registry.register(
            "sweep_deactivations",
            "Users removed by the inactivity sweep",
            sweep_deactivations.clone(),
        );
        registry.register(
            "sweep_duration_seconds",
            "Duration of the daily inactivity sweep",
            sweep_duration.clone(),
        );

        Self {
            registry,
            posts,
            commands,
            sweep_notifications,
            sweep_deactivations,
            sweep_duration,
            discord_api_write_request,
        }
    }
}

impl PrometheusClient {
    pub fn record_post(&self, outcome: PostOutcome) {
        self.posts.get_or_create(&PostRecord { outcome }).inc();
    }

    pub fn record_command(&self, command: &Command, success: bool) {
        self.commands
            .get_or_create(&CommandRecord {
                command: command.into(),
                success: success as u32,
            })
            .inc();
    }

    pub fn record_sweep(&self, report: &SweepReport, elapsed: Duration) {
        for (tier, count) in &report.sent {
            self.sweep_notifications
                .get_or_create(&SweepRecord {
                    tier: tier.to_string(),
                    success: 1,
                })
                .inc_by(*count as u64);
        }
        for (tier, count) in &report.failed {
            self.sweep_notifications
                .get_or_create(&SweepRecord {
                    tier: tier.to_string(),
                    success: 0,
                })
                .inc_by(*count as u64);
        }
        self.sweep_deactivations
            .inc_by(report.deactivated.len() as u64);
        self.sweep_duration.observe(elapsed.as_secs_f64());
    }

    pub fn add_write_request(&self) {
        self.discord_api_write_request.inc();
    }

    pub fn encode(&self) -> anyhow::Result<String> {
        let mut body = String::new();
        encode(&mut body, &self.registry)?;
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use shared::{Outcome, RejectReason, SweepReport, SweepTier};

    use super::{PostOutcome, PrometheusClient};
    use crate::events::commands::Command;

    #[test]
    fn outcomes_map_to_labels() {
        let label = PostOutcome::from_outcome;
        assert_eq!(label(&Outcome::Ignored), None);
        assert_eq!(
            label(&Outcome::Accepted {
                day: 100,
                milestone: false,
                completed: true
            }),
            Some(PostOutcome::Completed)
        );
        assert_eq!(
            label(&Outcome::Accepted {
                day: 20,
                milestone: true,
                completed: false
            }),
            Some(PostOutcome::Milestone)
        );
        assert_eq!(
            label(&Outcome::Rejected {
                reason: RejectReason::TimeWindow,
                message: String::new()
            }),
            Some(PostOutcome::RejectedTimeWindow)
        );
    }

    #[test]
    fn encodes_recorded_metrics() {
        let prometheus = PrometheusClient::default();
        prometheus.record_post(PostOutcome::Accepted);
        prometheus.record_command(&Command::Leaderboard, true);

        let mut report = SweepReport::default();
        report.sent.insert(SweepTier::Gentle, 2);
        report.failed.insert(SweepTier::PublicWarning, 1);
        report.deactivated.push(5);
        prometheus.record_sweep(&report, Duration::from_secs(3));

        let body = prometheus.encode().unwrap();
        assert!(body.contains("bot_posts_total{outcome=\"Accepted\"} 1"));
        assert!(body.contains("bot_commands_total{command=\"Leaderboard\",success=\"1\"} 1"));
        assert!(body.contains("sweep_notifications_total{tier=\"Gentle\",success=\"1\"} 2"));
        assert!(body.contains("sweep_notifications_total{tier=\"PublicWarning\",success=\"0\"} 1"));
        assert!(body.contains("sweep_deactivations_total 1"));
    }
}
