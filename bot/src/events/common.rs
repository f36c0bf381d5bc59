use shared::{Notifier, UserId};
use tracing::warn;

use crate::{api::DiscordMessage, messages::MsgCategory};

use super::{Context, COMMAND_PREFIX};

impl Context {
    pub async fn reply_text(&self, message: &DiscordMessage, text: &str) -> anyhow::Result<()> {
        if text.is_empty() {
            return Ok(());
        }

        self.discord
            .reply(message.channel_id, message.id, text)
            .await?;
        Ok(())
    }

    pub async fn reply(
        &self,
        message: &DiscordMessage,
        category: MsgCategory,
        args: Vec<(&'static str, String)>,
    ) -> anyhow::Result<()> {
        let text = self.messages.format(category, args)?;
        self.reply_text(message, &text).await
    }

    // Same as `reply`, kept separate so error paths read as such
    pub async fn reply_with_error(
        &self,
        message: &DiscordMessage,
        error: MsgCategory,
        args: Vec<(&'static str, String)>,
    ) -> anyhow::Result<()> {
        self.reply(message, error, args).await
    }

    /// Best effort; users may have closed their DMs.
    pub async fn direct_message(&self, user_id: UserId, text: &str) {
        if let Err(e) = self.discord.direct_message(user_id, text).await {
            if e.is_expected() {
                warn!("Could not DM {user_id}: {e}");
            } else {
                tracing::error!("Failed to DM {user_id}: {e:?}");
            }
        }
    }
}

/// Splits `!name arg1 arg2` into a lowercase name and its arguments.
pub fn extract_command_with_args(content: &str) -> Option<(String, Vec<String>)> {
    let body = content.trim().strip_prefix(COMMAND_PREFIX)?;
    let mut parts = body.split_whitespace();
    let command = parts.next()?.to_lowercase();
    Some((command, parts.map(str::to_string).collect()))
}

/// Accepts `<@id>`, `<@!id>` or a bare id.
pub fn parse_mention(arg: &str) -> Option<UserId> {
    let id = arg
        .strip_prefix("<@")
        .and_then(|rest| rest.strip_suffix('>'))
        .map(|rest| rest.trim_start_matches('!'))
        .unwrap_or(arg);
    id.parse().ok()
}

pub fn mention(user_id: UserId) -> String {
    format!("<@{user_id}>")
}

#[cfg(test)]
mod tests {
    use super::{extract_command_with_args, parse_mention};

    #[test]
    fn command_and_args() {
        assert_eq!(
            extract_command_with_args("!Force-Add <@12> 30"),
            Some((
                "force-add".to_string(),
                vec!["<@12>".to_string(), "30".to_string()]
            ))
        );
        assert_eq!(
            extract_command_with_args("  !leaderboard  "),
            Some(("leaderboard".to_string(), vec![]))
        );
        assert_eq!(extract_command_with_args("!"), None);
        assert_eq!(
            extract_command_with_args("! leaderboard"),
            Some(("leaderboard".to_string(), vec![]))
        );
        assert_eq!(extract_command_with_args("leaderboard"), None);
    }

    #[test]
    fn mentions() {
        assert_eq!(parse_mention("<@123>"), Some(123));
        assert_eq!(parse_mention("<@!123>"), Some(123));
        assert_eq!(parse_mention("123"), Some(123));
        assert_eq!(parse_mention("<#123>"), None);
        assert_eq!(parse_mention("<@&123>"), None);
        assert_eq!(parse_mention("@alice"), None);
    }
}
