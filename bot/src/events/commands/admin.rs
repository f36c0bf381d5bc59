use chrono::{DateTime, Utc};
use shared::{AdminClaim, Day, UserId, FINAL_DAY};

use crate::{
    api::DiscordMessage,
    events::{common::mention, Context},
    messages::MsgCategory,
};

use super::{CommandReply, LINES_PER_MESSAGE, USERS_PER_PAGE};

fn not_found(context: &Context, user_id: UserId) -> anyhow::Result<CommandReply> {
    CommandReply::category(
        context,
        MsgCategory::ErrorUserNotFound,
        vec![("mention", mention(user_id))],
    )
}

pub async fn reset(
    context: &Context,
    claim: &AdminClaim,
    user_id: UserId,
    now: DateTime<Utc>,
) -> anyhow::Result<CommandReply> {
    if !context.engine.reset(claim, user_id, now).await? {
        return not_found(context, user_id);
    }

    let direct = context.messages.format(MsgCategory::ResetDirect, vec![])?;
    Ok(CommandReply::category(
        context,
        MsgCategory::ResetDone,
        vec![("mention", mention(user_id))],
    )?
    .with_direct(user_id, direct))
}

/// The stored name comes from the mention in the command, then the
/// existing record, then the bare id.
async fn target_username(
    context: &Context,
    message: &DiscordMessage,
    user_id: UserId,
) -> anyhow::Result<String> {
    if let Some(user) = message.mentions.iter().find(|user| user.id == user_id) {
        return Ok(user.username.clone());
    }

    Ok(context
        .engine
        .store()
        .get(user_id)
        .await?
        .map(|record| record.username)
        .unwrap_or_else(|| user_id.to_string()))
}

pub async fn force_add(
    context: &Context,
    claim: &AdminClaim,
    message: &DiscordMessage,
    user_id: UserId,
    day: Day,
    now: DateTime<Utc>,
) -> anyhow::Result<CommandReply> {
    if !(1..=FINAL_DAY).contains(&day) {
        return CommandReply::category(context, MsgCategory::ErrorDayRange, vec![]);
    }

    let username = target_username(context, message, user_id).await?;
    context
        .engine
        .force_set(claim, user_id, &username, day, now)
        .await?;

    CommandReply::category(
        context,
        MsgCategory::ForceSetDone,
        vec![("mention", mention(user_id)), ("day", day.to_string())],
    )
}

pub async fn deactivate(
    context: &Context,
    claim: &AdminClaim,
    user_id: UserId,
) -> anyhow::Result<CommandReply> {
    if context.engine.deactivate(claim, user_id).await? {
        return CommandReply::category(
            context,
            MsgCategory::DeactivateDone,
            vec![("mention", mention(user_id))],
        );
    }

    if context.engine.store().get(user_id).await?.is_some() {
        CommandReply::category(
            context,
            MsgCategory::DeactivateNoop,
            vec![("mention", mention(user_id))],
        )
    } else {
        not_found(context, user_id)
    }
}

pub async fn drop_user(
    context: &Context,
    claim: &AdminClaim,
    user_id: UserId,
) -> anyhow::Result<CommandReply> {
    if !context.engine.drop_user(claim, user_id).await? {
        return not_found(context, user_id);
    }

    let direct = context.messages.format(MsgCategory::DropDirect, vec![])?;
    Ok(CommandReply::category(
        context,
        MsgCategory::DropDone,
        vec![("mention", mention(user_id))],
    )?
    .with_direct(user_id, direct))
}

pub async fn inactive(
    context: &Context,
    days: u32,
    now: DateTime<Utc>,
) -> anyhow::Result<CommandReply> {
    let users = context.query.inactive(days, now).await?;
    if users.is_empty() {
        return CommandReply::category(context, MsgCategory::InactiveNone, vec![]);
    }

    let lines = users
        .iter()
        .map(|record| {
            format!(
                "{} - Day {} (last seen {})",
                record.username,
                record.current_day,
                record.last_post_timestamp.format("%b %d")
            )
        })
        .collect();
    let title = context.messages.format(
        MsgCategory::InactiveTitle,
        vec![("days", days.to_string())],
    )?;
    Ok(CommandReply::listing(title, lines))
}

/// Active users in leaderboard order, one page at a time.
pub async fn list_users(
    context: &Context,
    page: u32,
    now: DateTime<Utc>,
) -> anyhow::Result<CommandReply> {
    let (users, total) = context.query.leaderboard_page(page, USERS_PER_PAGE).await?;
    if total == 0 {
        return CommandReply::category(context, MsgCategory::ListUsersEmpty, vec![]);
    }

    let pages = total.div_ceil(USERS_PER_PAGE as u64);
    let first = (page.saturating_sub(1) as u64) * USERS_PER_PAGE as u64;
    let lines: Vec<String> = users
        .iter()
        .enumerate()
        .map(|(index, record)| {
            format!(
                "{}. {} - Day {} ({}d ago)",
                first + index as u64 + 1,
                record.username,
                record.current_day,
                record.days_inactive(now)
            )
        })
        .collect();

    let mut messages: Vec<String> = lines
        .chunks(LINES_PER_MESSAGE)
        .map(|chunk| chunk.join("\n"))
        .collect();
    if pages > 1 || messages.is_empty() {
        messages.push(context.messages.format(
            MsgCategory::ListUsersPage,
            vec![("page", page.to_string()), ("pages", pages.to_string())],
        )?);
    }

    Ok(CommandReply {
        messages,
        direct: None,
    })
}
