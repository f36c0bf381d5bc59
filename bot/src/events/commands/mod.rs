use chrono::{DateTime, Utc};
use shared::{Day, UserId};
use tracing::{error, info, instrument};

use crate::{api::DiscordMessage, messages::MsgCategory};

use super::{
    common::{self, parse_mention},
    Context,
};

pub mod admin;
pub mod general;
pub mod repo;

pub const LEADERBOARD_SIZE: u32 = 5;
pub const HALL_OF_FAME_SIZE: u32 = 25;
pub const DEFAULT_COMMITS: u8 = 5;
pub const DEFAULT_INACTIVE_DAYS: u32 = 3;
pub const USERS_PER_PAGE: u32 = 50;
/// Lines per chat message for long listings.
pub const LINES_PER_MESSAGE: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Leaderboard,
    Status(Option<UserId>),
    MyRank,
    RemindToggle,
    HallOfFame,
    LinkRepo(String),
    Commits(u8),
    Help,

    // Privileged
    Reset(UserId),
    ForceAdd { user_id: UserId, day: Day },
    Deactivate(UserId),
    DropUser(UserId),
    Inactive(u32),
    /// 1-based page.
    ListUsers(u32),
    UserStatus(UserId),

    Invalid { usage: &'static str },
    Unknown(String),
}

/// Everything a command wants to say, delivered by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandReply {
    pub messages: Vec<String>,
    pub direct: Option<(UserId, String)>,
}

impl CommandReply {
    pub fn text(text: String) -> Self {
        Self {
            messages: vec![text],
            direct: None,
        }
    }

    pub fn category(
        context: &Context,
        category: MsgCategory,
        args: Vec<(&'static str, String)>,
    ) -> anyhow::Result<Self> {
        Ok(Self::text(context.messages.format(category, args)?))
    }

    /// A title followed by the lines, split so no message gets too long.
    pub fn listing(title: String, lines: Vec<String>) -> Self {
        let mut messages = vec![];
        for (index, chunk) in lines.chunks(LINES_PER_MESSAGE).enumerate() {
            let body = chunk.join("\n");
            if index == 0 {
                messages.push(format!("{title}\n{body}"));
            } else {
                messages.push(body);
            }
        }
        if messages.is_empty() {
            messages.push(title);
        }

        Self {
            messages,
            direct: None,
        }
    }

    pub fn with_direct(mut self, user_id: UserId, text: String) -> Self {
        self.direct = Some((user_id, text));
        self
    }
}

fn single_mention(args: &[String], usage: &'static str) -> Result<UserId, Command> {
    match args {
        [target] => parse_mention(target).ok_or(Command::Invalid { usage }),
        _ => Err(Command::Invalid { usage }),
    }
}

impl Command {
    pub fn parse_command(content: &str) -> Option<Command> {
        let (command, args) = common::extract_command_with_args(content)?;

        let parsed = match command.as_str() {
            "leaderboard" | "lb" | "top" => Ok(Command::Leaderboard),
            "status" => match args.as_slice() {
                [] => Ok(Command::Status(None)),
                _ => single_mention(&args, "!status [@user]").map(|id| Command::Status(Some(id))),
            },
            "myrank" | "rank" => Ok(Command::MyRank),
            "remind-toggle" | "reminders" => Ok(Command::RemindToggle),
            "halloffame" | "hall-of-fame" | "hof" => Ok(Command::HallOfFame),
            "link-repo" | "linkrepo" => match args.as_slice() {
                [repo] => Ok(Command::LinkRepo(repo.clone())),
                _ => Err(Command::Invalid {
                    usage: "!link-repo owner/name",
                }),
            },
            "commits" => Self::parse_commits(&args),
            "100doc-help" | "help" => Ok(Command::Help),

            "reset" => single_mention(&args, "!reset @user").map(Command::Reset),
            "force-add" | "force-set" | "setday" => Self::parse_force_add(&args),
            "deactivate" => single_mention(&args, "!deactivate @user").map(Command::Deactivate),
            "drop-user" | "drop" => single_mention(&args, "!drop-user @user").map(Command::DropUser),
            "inactive" => match args.as_slice() {
                [] => Ok(Command::Inactive(DEFAULT_INACTIVE_DAYS)),
                [days] => days.parse().map(Command::Inactive).map_err(|_| Command::Invalid {
                    usage: "!inactive [days]",
                }),
                _ => Err(Command::Invalid {
                    usage: "!inactive [days]",
                }),
            },
            "list-users" | "users" => match args.as_slice() {
                [] => Ok(Command::ListUsers(1)),
                [page] => match page.parse::<u32>() {
                    Ok(0) | Err(_) => Err(Command::Invalid {
                        usage: "!list-users [page]",
                    }),
                    Ok(page) => Ok(Command::ListUsers(page)),
                },
                _ => Err(Command::Invalid {
                    usage: "!list-users [page]",
                }),
            },
            "userstatus" | "user-status" => {
                single_mention(&args, "!userstatus @user").map(Command::UserStatus)
            }

            _ => {
                info!("Unknown command: {command}");
                Ok(Command::Unknown(command))
            }
        };

        Some(parsed.unwrap_or_else(|invalid| invalid))
    }

    fn parse_commits(args: &[String]) -> Result<Command, Command> {
        const USAGE: &str = "!commits [n]";
        match args {
            [] => Ok(Command::Commits(DEFAULT_COMMITS)),
            [count] => match count.parse::<u32>() {
                Ok(0) | Err(_) => Err(Command::Invalid { usage: USAGE }),
                Ok(count) => Ok(Command::Commits(
                    count.min(shared::github::MAX_COMMITS as u32) as u8,
                )),
            },
            _ => Err(Command::Invalid { usage: USAGE }),
        }
    }

    fn parse_force_add(args: &[String]) -> Result<Command, Command> {
        const USAGE: &str = "!force-add @user day";
        match args {
            [target, day] => {
                let user_id = parse_mention(target).ok_or(Command::Invalid { usage: USAGE })?;
                let day = day.parse().map_err(|_| Command::Invalid { usage: USAGE })?;
                Ok(Command::ForceAdd { user_id, day })
            }
            _ => Err(Command::Invalid { usage: USAGE }),
        }
    }

    pub fn is_privileged(&self) -> bool {
        matches!(
            self,
            Command::Reset(_)
                | Command::ForceAdd { .. }
                | Command::Deactivate(_)
                | Command::DropUser(_)
                | Command::Inactive(_)
                | Command::ListUsers(_)
                | Command::UserStatus(_)
        )
    }

    #[instrument(skip(self, context, message), fields(sender = message.author.id))]
    pub async fn execute(
        &self,
        context: &Context,
        message: &DiscordMessage,
        now: DateTime<Utc>,
    ) -> anyhow::Result<CommandReply> {
        let sender = message.author.id;
        let claim = context.config.admin_claim(sender);
        if self.is_privileged() && claim.is_none() {
            info!("{sender} tried to use a privileged command: {self:?}");
            return CommandReply::category(context, MsgCategory::ErrorRightsViolation, vec![]);
        }

        match (self, claim) {
            (Command::Leaderboard, _) => general::leaderboard(context, now).await,
            (Command::Status(target), _) => {
                general::status(context, target.unwrap_or(sender), target.is_none(), now).await
            }
            (Command::MyRank, _) => general::my_rank(context, sender).await,
            (Command::RemindToggle, _) => general::remind_toggle(context, sender).await,
            (Command::HallOfFame, _) => general::hall_of_fame(context).await,
            (Command::Help, _) => CommandReply::category(context, MsgCategory::Help, vec![]),
            (Command::LinkRepo(repo), _) => repo::link_repo(context, sender, repo).await,
            (Command::Commits(count), _) => repo::commits(context, sender, *count).await,

            (Command::Reset(target), Some(claim)) => admin::reset(context, &claim, *target, now).await,
            (Command::ForceAdd { user_id, day }, Some(claim)) => {
                admin::force_add(context, &claim, message, *user_id, *day, now).await
            }
            (Command::Deactivate(target), Some(claim)) => {
                admin::deactivate(context, &claim, *target).await
            }
            (Command::DropUser(target), Some(claim)) => {
                admin::drop_user(context, &claim, *target).await
            }
            (Command::Inactive(days), Some(_)) => admin::inactive(context, *days, now).await,
            (Command::ListUsers(page), Some(_)) => admin::list_users(context, *page, now).await,
            (Command::UserStatus(target), Some(_)) => {
                general::status(context, *target, false, now).await
            }

            (Command::Invalid { usage }, _) => CommandReply::category(
                context,
                MsgCategory::ErrorInvalidArgument,
                vec![("usage", usage.to_string())],
            ),
            (Command::Unknown(command), _) => CommandReply::category(
                context,
                MsgCategory::ErrorUnknownCommand,
                vec![("command", command.clone())],
            ),
            (_, None) => CommandReply::category(context, MsgCategory::ErrorRightsViolation, vec![]),
        }
    }

    /// Executes the command and delivers its replies.
    pub async fn run(&self, context: &Context, message: &DiscordMessage) -> anyhow::Result<()> {
        let reply = match self.execute(context, message, Utc::now()).await {
            Ok(reply) => {
                context.prometheus.record_command(self, true);
                reply
            }
            Err(e) => {
                error!("Failed to execute {self:?} for {}: {e:?}", message.author.id);
                context.prometheus.record_command(self, false);
                CommandReply::text(
                    context
                        .messages
                        .format_or_log(MsgCategory::ErrorGeneric, vec![]),
                )
            }
        };

        for text in &reply.messages {
            context.reply_text(message, text).await?;
        }
        if let Some((user_id, text)) = &reply.direct {
            context.direct_message(*user_id, text).await;
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{sync::Arc, time::Duration};

    use shared::{Query, Store, StreakEngine, UserLocks};

    use super::*;
    use crate::{
        api::{prometheus::PrometheusClient, DiscordClient, DiscordUser},
        events::BotConfig,
        messages::MessageLoader,
    };

    pub const ADMIN: UserId = 99;

    pub async fn test_context() -> Context {
        let store = Store::in_memory().await.unwrap();
        let prometheus = Arc::new(PrometheusClient::default());
        Context {
            discord: Arc::new(
                DiscordClient::new("token", 10, Duration::from_secs(1), prometheus.clone())
                    .unwrap(),
            ),
            github: None,
            engine: Arc::new(StreakEngine::new(store.clone(), UserLocks::default())),
            query: Arc::new(Query::new(store)),
            messages: Arc::new(
                MessageLoader::from_toml(include_str!("../../../../Messages.toml"), 10).unwrap(),
            ),
            prometheus,
            config: Arc::new(BotConfig {
                bot_user_id: 1,
                log_channel_id: 10,
                command_channel_ids: vec![20],
                admin_ids: vec![ADMIN],
            }),
        }
    }

    pub fn message_from(author: UserId, content: &str) -> DiscordMessage {
        DiscordMessage {
            id: 500,
            channel_id: 20,
            author: DiscordUser {
                id: author,
                username: format!("user{author}"),
                global_name: None,
                bot: false,
            },
            content: content.to_string(),
            timestamp: Utc::now(),
            mentions: vec![],
        }
    }

    pub async fn run_as(context: &Context, author: UserId, content: &str) -> CommandReply {
        let message = message_from(author, content);
        let command = Command::parse_command(content).unwrap();
        command.execute(context, &message, Utc::now()).await.unwrap()
    }

    fn parse(content: &str) -> Command {
        Command::parse_command(content).unwrap()
    }

    #[test]
    fn aliases() {
        assert_eq!(parse("!leaderboard"), Command::Leaderboard);
        assert_eq!(parse("!LB"), Command::Leaderboard);
        assert_eq!(parse("!top"), Command::Leaderboard);
        assert_eq!(parse("!rank"), Command::MyRank);
        assert_eq!(parse("!myrank"), Command::MyRank);
        assert_eq!(parse("!reminders"), Command::RemindToggle);
        assert_eq!(parse("!remind-toggle"), Command::RemindToggle);
        assert_eq!(parse("!hof"), Command::HallOfFame);
        assert_eq!(parse("!halloffame"), Command::HallOfFame);
        assert_eq!(parse("!help"), Command::Help);
        assert_eq!(parse("!100doc-help"), Command::Help);
        assert_eq!(parse("!users"), Command::ListUsers(1));
        assert_eq!(parse("!list-users"), Command::ListUsers(1));
        assert_eq!(parse("!list-users 3"), Command::ListUsers(3));
    }

    #[test]
    fn mentions_and_arguments() {
        assert_eq!(parse("!status"), Command::Status(None));
        assert_eq!(parse("!status <@42>"), Command::Status(Some(42)));
        assert_eq!(parse("!reset <@!42>"), Command::Reset(42));
        assert_eq!(parse("!deactivate 42"), Command::Deactivate(42));
        assert_eq!(parse("!drop <@42>"), Command::DropUser(42));
        assert_eq!(parse("!userstatus <@42>"), Command::UserStatus(42));
        assert_eq!(
            parse("!force-add <@42> 30"),
            Command::ForceAdd {
                user_id: 42,
                day: 30
            }
        );
        // Range is checked when executing so the admin gets a precise error
        assert_eq!(
            parse("!setday <@42> 150"),
            Command::ForceAdd {
                user_id: 42,
                day: 150
            }
        );
        assert_eq!(
            parse("!link-repo rust-lang/rust"),
            Command::LinkRepo("rust-lang/rust".to_string())
        );
    }

    #[test]
    fn defaults_and_caps() {
        assert_eq!(parse("!commits"), Command::Commits(DEFAULT_COMMITS));
        assert_eq!(parse("!commits 3"), Command::Commits(3));
        assert_eq!(parse("!commits 50"), Command::Commits(10));
        assert_eq!(parse("!inactive"), Command::Inactive(DEFAULT_INACTIVE_DAYS));
        assert_eq!(parse("!inactive 7"), Command::Inactive(7));
    }

    #[test]
    fn invalid_arguments() {
        assert!(matches!(parse("!reset"), Command::Invalid { .. }));
        assert!(matches!(parse("!reset alice"), Command::Invalid { .. }));
        assert!(matches!(parse("!status <@1> <@2>"), Command::Invalid { .. }));
        assert!(matches!(parse("!force-add <@42>"), Command::Invalid { .. }));
        assert!(matches!(parse("!force-add <@42> -1"), Command::Invalid { .. }));
        assert!(matches!(parse("!commits 0"), Command::Invalid { .. }));
        assert!(matches!(parse("!commits many"), Command::Invalid { .. }));
        assert!(matches!(parse("!inactive soon"), Command::Invalid { .. }));
        assert!(matches!(parse("!link-repo"), Command::Invalid { .. }));
        assert!(matches!(parse("!list-users 0"), Command::Invalid { .. }));
    }

    #[test]
    fn unknown_and_empty() {
        assert_eq!(parse("!dance now"), Command::Unknown("dance".to_string()));
        assert!(Command::parse_command("!").is_none());
        assert!(Command::parse_command("[1/100] hello").is_none());
    }

    #[test]
    fn listing_is_chunked() {
        let lines = (1..=25).map(|i| i.to_string()).collect();
        let reply = CommandReply::listing("title".to_string(), lines);
        assert_eq!(reply.messages.len(), 3);
        assert!(reply.messages[0].starts_with("title\n1\n"));
        assert_eq!(reply.messages[2], "21\n22\n23\n24\n25");

        let empty = CommandReply::listing("title".to_string(), vec![]);
        assert_eq!(empty.messages, vec!["title".to_string()]);
    }

    #[tokio::test]
    async fn privileged_commands_need_admin() {
        let context = test_context().await;
        let denied = context
            .messages
            .format(MsgCategory::ErrorRightsViolation, vec![])
            .unwrap();

        for command in ["!reset <@5>", "!force-add <@5> 3", "!list-users", "!inactive"] {
            let reply = run_as(&context, 5, command).await;
            assert_eq!(reply.messages, vec![denied.clone()], "{command}");
        }

        let reply = run_as(&context, ADMIN, "!list-users").await;
        assert_ne!(reply.messages, vec![denied]);
    }

    #[tokio::test]
    async fn unknown_and_invalid_replies() {
        let context = test_context().await;

        let reply = run_as(&context, 5, "!dance").await;
        assert!(reply.messages[0].contains("!dance"));

        let reply = run_as(&context, ADMIN, "!reset nobody").await;
        assert!(reply.messages[0].contains("!reset @user"));
    }
}
