use std::sync::Arc;

use shared::{AdminClaim, Query, StreakEngine, UserId};
use tracing::{debug, instrument};

use crate::{
    api::{prometheus::PrometheusClient, ChannelId, DiscordClient, DiscordMessage, GithubClient},
    messages::MessageLoader,
};

use self::commands::Command;

pub mod commands;
pub(crate) mod common;
pub mod progress;

pub const COMMAND_PREFIX: char = '!';

#[derive(Debug, Clone, Default)]
pub struct BotConfig {
    pub bot_user_id: UserId,
    pub log_channel_id: ChannelId,
    pub command_channel_ids: Vec<ChannelId>,
    pub admin_ids: Vec<UserId>,
}

impl BotConfig {
    pub fn is_command_channel(&self, channel_id: ChannelId) -> bool {
        channel_id == self.log_channel_id || self.command_channel_ids.contains(&channel_id)
    }

    /// Channels the poll loop reads, the log channel first.
    pub fn channels(&self) -> Vec<ChannelId> {
        let mut channels = vec![self.log_channel_id];
        for channel in &self.command_channel_ids {
            if !channels.contains(channel) {
                channels.push(*channel);
            }
        }
        channels
    }

    pub fn admin_claim(&self, user_id: UserId) -> Option<AdminClaim> {
        AdminClaim::verify(user_id, &self.admin_ids)
    }
}

#[derive(Clone)]
pub struct Context {
    pub discord: Arc<DiscordClient>,
    pub github: Option<Arc<GithubClient>>,
    pub engine: Arc<StreakEngine>,
    pub query: Arc<Query>,
    pub messages: Arc<MessageLoader>,
    pub prometheus: Arc<PrometheusClient>,
    pub config: Arc<BotConfig>,
}

#[derive(Debug, Clone)]
pub enum EventType {
    Progress,
    Command(Command),
}

#[derive(Debug, Clone)]
pub struct Event {
    pub event: EventType,
    pub message: DiscordMessage,
}

impl Event {
    /// Decides what an incoming chat message is, if anything.
    pub fn classify(message: DiscordMessage, config: &BotConfig) -> Option<Event> {
        if message.author.bot || message.author.id == config.bot_user_id {
            return None;
        }

        let content = message.content.trim_start();
        let event = if content.starts_with(COMMAND_PREFIX) {
            if !config.is_command_channel(message.channel_id) {
                return None;
            }
            EventType::Command(Command::parse_command(content)?)
        } else if message.channel_id == config.log_channel_id {
            EventType::Progress
        } else {
            return None;
        };

        Some(Event { event, message })
    }

    #[instrument(skip(self, context), fields(message = self.message.id, author = self.message.author.id))]
    pub async fn execute(&self, context: &Context) -> anyhow::Result<()> {
        match &self.event {
            EventType::Progress => progress::handle(context, &self.message).await,
            EventType::Command(command) => {
                debug!("Executing {command:?}");
                command.run(context, &self.message).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::api::{DiscordMessage, DiscordUser};

    use super::{commands::Command, BotConfig, Event, EventType};

    fn config() -> BotConfig {
        BotConfig {
            bot_user_id: 1,
            log_channel_id: 10,
            command_channel_ids: vec![20, 10],
            admin_ids: vec![99],
        }
    }

    fn message(channel_id: u64, author: u64, content: &str) -> DiscordMessage {
        DiscordMessage {
            id: 1000,
            channel_id,
            author: DiscordUser {
                id: author,
                username: "alice".to_string(),
                global_name: None,
                bot: false,
            },
            content: content.to_string(),
            timestamp: chrono::Utc::now(),
            mentions: vec![],
        }
    }

    #[test]
    fn log_channel_posts_are_progress() {
        let event = Event::classify(message(10, 5, "[1/100] hello"), &config()).unwrap();
        assert!(matches!(event.event, EventType::Progress));

        // Untagged chatter is still handed to the engine, which ignores it
        let event = Event::classify(message(10, 5, "nice work!"), &config()).unwrap();
        assert!(matches!(event.event, EventType::Progress));
    }

    #[test]
    fn commands_only_in_allowed_channels() {
        let event = Event::classify(message(20, 5, "!leaderboard"), &config()).unwrap();
        assert!(matches!(event.event, EventType::Command(Command::Leaderboard)));

        let event = Event::classify(message(10, 5, "  !myrank"), &config()).unwrap();
        assert!(matches!(event.event, EventType::Command(Command::MyRank)));

        assert!(Event::classify(message(30, 5, "!leaderboard"), &config()).is_none());
        assert!(Event::classify(message(30, 5, "[1/100] wrong channel"), &config()).is_none());
    }

    #[test]
    fn bots_are_ignored() {
        assert!(Event::classify(message(10, 1, "[1/100]"), &config()).is_none());

        let mut from_bot = message(10, 5, "[1/100]");
        from_bot.author.bot = true;
        assert!(Event::classify(from_bot, &config()).is_none());
    }

    #[test]
    fn channels_are_deduplicated() {
        assert_eq!(config().channels(), vec![10, 20]);
        assert!(config().admin_claim(99).is_some());
        assert!(config().admin_claim(5).is_none());
    }
}
