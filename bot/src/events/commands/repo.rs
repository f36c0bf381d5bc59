use shared::UserId;
use tracing::warn;

use crate::{events::Context, messages::MsgCategory};

use super::CommandReply;

pub async fn link_repo(
    context: &Context,
    user_id: UserId,
    repo: &str,
) -> anyhow::Result<CommandReply> {
    if !context.engine.link_repo(user_id, repo).await? {
        return CommandReply::category(context, MsgCategory::ErrorRepoFormat, vec![]);
    }

    CommandReply::category(
        context,
        MsgCategory::RepoLinked,
        vec![("repo", repo.trim().to_string())],
    )
}

pub async fn commits(context: &Context, user_id: UserId, count: u8) -> anyhow::Result<CommandReply> {
    let Some(github) = &context.github else {
        return CommandReply::category(context, MsgCategory::ErrorCommitsUnavailable, vec![]);
    };

    let linked = context.query.linked_repo(user_id).await?;
    let Some((linked, (owner, name))) = linked
        .as_ref()
        .and_then(|linked| Some((linked, linked.owner_and_name()?)))
    else {
        return CommandReply::category(context, MsgCategory::ErrorNoLinkedRepo, vec![]);
    };

    let commits = match github.recent_commits(owner, name, count).await {
        Ok(commits) => commits,
        Err(e) => {
            warn!("Failed to fetch commits of {} for {user_id}: {e:?}", linked.github_repo);
            return CommandReply::category(context, MsgCategory::ErrorCommitsUnavailable, vec![]);
        }
    };

    let repo = ("repo", linked.github_repo.clone());
    if commits.is_empty() {
        return CommandReply::category(context, MsgCategory::CommitsEmpty, vec![repo]);
    }

    let lines = commits
        .iter()
        .map(|commit| format!("`{}` [{}](<{}>)", commit.short_sha(), commit.title, commit.url))
        .collect();
    let title = context.messages.format(MsgCategory::CommitsTitle, vec![repo])?;
    Ok(CommandReply::listing(title, lines))
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use crate::{
        api::GithubClient,
        events::commands::tests::{run_as, test_context},
    };

    #[tokio::test]
    async fn linking_checks_the_format() {
        let context = test_context().await;

        let linked = run_as(&context, 5, "!link-repo rust-lang/rustlings").await;
        assert!(linked.messages[0].contains("`rust-lang/rustlings`"));
        let stored = context.query.linked_repo(5).await.unwrap().unwrap();
        assert_eq!(stored.github_repo, "rust-lang/rustlings");

        let rejected = run_as(&context, 5, "!link-repo https://github.com/rust-lang").await;
        assert!(rejected.messages[0].contains("owner/name"));
        // The previous link survives a rejected one
        let stored = context.query.linked_repo(5).await.unwrap().unwrap();
        assert_eq!(stored.github_repo, "rust-lang/rustlings");
    }

    #[tokio::test]
    async fn commits_without_github_or_link() {
        let mut context = test_context().await;

        let unavailable = run_as(&context, 5, "!commits").await;
        assert!(unavailable.messages[0].contains("Couldn't fetch commits"));

        context.github = Some(Arc::new(
            GithubClient::new(None, Duration::from_secs(1)).unwrap(),
        ));
        let unlinked = run_as(&context, 5, "!commits 3").await;
        assert!(unlinked.messages[0].contains("!link-repo"));
    }
}
