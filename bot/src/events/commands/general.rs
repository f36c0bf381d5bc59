use chrono::{DateTime, Utc};
use shared::{StatusView, UserId};

use crate::{
    events::{common::mention, Context},
    messages::{MessageLoader, MsgCategory},
};

use super::{CommandReply, HALL_OF_FAME_SIZE, LEADERBOARD_SIZE};

const MEDALS: [&str; 5] = ["🥇", "🥈", "🥉", "4️⃣", "5️⃣"];
const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M UTC";

pub async fn leaderboard(context: &Context, now: DateTime<Utc>) -> anyhow::Result<CommandReply> {
    let top = context.query.leaderboard(LEADERBOARD_SIZE).await?;
    if top.is_empty() {
        return CommandReply::category(context, MsgCategory::LeaderboardEmpty, vec![]);
    }

    let lines = top
        .iter()
        .enumerate()
        .map(|(index, record)| {
            let medal = MEDALS.get(index).copied().unwrap_or("•");
            let days_ago = record.days_inactive(now);
            let mut line = format!("{medal} **{}** - Day {}", record.username, record.current_day);
            if days_ago > 0 {
                line.push_str(&format!(" (last post {days_ago} days ago)"));
            }
            line
        })
        .collect();

    let title = context
        .messages
        .format(MsgCategory::LeaderboardTitle, vec![])?;
    Ok(CommandReply::listing(title, lines))
}

pub fn render_status(messages: &MessageLoader, view: &StatusView) -> anyhow::Result<String> {
    let record = &view.record;
    let completed = record
        .completed_at
        .map(|at| format!("\nCompleted: {}", at.format(DATE_TIME_FORMAT)))
        .unwrap_or_default();

    messages.format(
        MsgCategory::Status,
        vec![
            ("username", record.username.clone()),
            ("day", record.current_day.to_string()),
            (
                "status",
                if record.is_active { "Active" } else { "Inactive" }.to_string(),
            ),
            ("days_ago", view.days_since_last_post.to_string()),
            (
                "last_post",
                record.last_post_timestamp.format(DATE_TIME_FORMAT).to_string(),
            ),
            ("completed", completed),
        ],
    )
}

/// `own` selects the wording for users asking about themselves.
pub async fn status(
    context: &Context,
    user_id: UserId,
    own: bool,
    now: DateTime<Utc>,
) -> anyhow::Result<CommandReply> {
    match context.query.status(user_id, now).await? {
        Some(view) => Ok(CommandReply::text(render_status(&context.messages, &view)?)),
        None if own => CommandReply::category(context, MsgCategory::NotTracked, vec![]),
        None => CommandReply::category(
            context,
            MsgCategory::ErrorUserNotFound,
            vec![("mention", mention(user_id))],
        ),
    }
}

pub async fn my_rank(context: &Context, user_id: UserId) -> anyhow::Result<CommandReply> {
    if let Some((rank, record)) = context.query.rank(user_id).await? {
        return CommandReply::category(
            context,
            MsgCategory::Rank,
            vec![
                ("rank", rank.to_string()),
                ("day", record.current_day.to_string()),
            ],
        );
    }

    let tracked = context.engine.store().get(user_id).await?.is_some();
    let category = if tracked {
        MsgCategory::NotRanked
    } else {
        MsgCategory::NotTracked
    };
    CommandReply::category(context, category, vec![])
}

pub async fn remind_toggle(context: &Context, user_id: UserId) -> anyhow::Result<CommandReply> {
    let category = match context.engine.toggle_reminders(user_id).await? {
        Some(true) => MsgCategory::RemindersEnabled,
        Some(false) => MsgCategory::RemindersDisabled,
        None => MsgCategory::NotTracked,
    };
    CommandReply::category(context, category, vec![])
}

pub async fn hall_of_fame(context: &Context) -> anyhow::Result<CommandReply> {
    let entries = context.query.hall_of_fame(HALL_OF_FAME_SIZE).await?;
    if entries.is_empty() {
        return CommandReply::category(context, MsgCategory::HallOfFameEmpty, vec![]);
    }

    let lines = entries
        .iter()
        .map(|entry| {
            format!(
                "🏅 **{}** - finished {}",
                entry.username,
                entry.completed_at.format("%Y-%m-%d")
            )
        })
        .collect();
    let title = context
        .messages
        .format(MsgCategory::HallOfFameTitle, vec![])?;
    Ok(CommandReply::listing(title, lines))
}
