use shared::{Outcome, RejectReason};
use tracing::{error, info};

use crate::{
    api::{prometheus::PostOutcome, DiscordMessage},
    messages::{MessageLoader, MsgCategory},
};

use super::{common::mention, Context};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressReply {
    Nothing,
    React,
    ReactAndReply(String),
    Reply(String),
}

/// What the bot shows the author for a processed post.
pub fn progress_reply(
    outcome: &Outcome,
    message: &DiscordMessage,
    messages: &MessageLoader,
) -> anyhow::Result<ProgressReply> {
    Ok(match outcome {
        Outcome::Ignored => ProgressReply::Nothing,
        Outcome::Accepted {
            completed: true, ..
        } => ProgressReply::Reply(messages.format(
            MsgCategory::Completed,
            vec![
                ("username", message.author.display_name().to_string()),
                ("mention", mention(message.author.id)),
            ],
        )?),
        Outcome::Accepted {
            day,
            milestone: true,
            ..
        } => ProgressReply::ReactAndReply(
            messages.format(MsgCategory::Milestone, vec![("day", day.to_string())])?,
        ),
        Outcome::Accepted { .. } => ProgressReply::React,
        Outcome::Rejected {
            reason,
            message: text,
        } => {
            let category = match reason {
                RejectReason::Progression => MsgCategory::RejectedProgression,
                RejectReason::TimeWindow => MsgCategory::RejectedTimeWindow,
            };
            ProgressReply::Reply(messages.format(category, vec![("message", text.clone())])?)
        }
        Outcome::Failed => {
            ProgressReply::Reply(messages.format(MsgCategory::ProgressFailed, vec![])?)
        }
    })
}

pub async fn handle(context: &Context, message: &DiscordMessage) -> anyhow::Result<()> {
    let outcome = context
        .engine
        .handle_post(
            message.author.id,
            &message.author.username,
            &message.content,
            message.timestamp,
        )
        .await;

    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(
                "Failed to process progress of {} ({}): {e:?}",
                message.author.username, message.author.id
            );
            context.prometheus.record_post(PostOutcome::Error);
            context
                .reply_with_error(message, MsgCategory::ProgressFailed, vec![])
                .await?;
            return Ok(());
        }
    };

    if let Some(label) = PostOutcome::from_outcome(&outcome) {
        info!("Post {} by {}: {label:?}", message.id, message.author.username);
        context.prometheus.record_post(label);
    }

    match progress_reply(&outcome, message, &context.messages)? {
        ProgressReply::Nothing => {}
        ProgressReply::React => {
            context
                .discord
                .react_accepted(message.channel_id, message.id)
                .await?
        }
        ProgressReply::ReactAndReply(text) => {
            context
                .discord
                .react_accepted(message.channel_id, message.id)
                .await?;
            context.reply_text(message, &text).await?;
        }
        ProgressReply::Reply(text) => context.reply_text(message, &text).await?,
    }

    Ok(())
}
