use std::time::Duration;

use octocrab::models::repos::RepoCommit;
use serde::Serialize;
use tracing::instrument;

pub const MAX_COMMITS: u8 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitSummary {
    pub sha: String,
    pub title: String,
    pub url: String,
}

impl CommitSummary {
    pub fn short_sha(&self) -> &str {
        self.sha.get(..7).unwrap_or(&self.sha)
    }
}

impl From<RepoCommit> for CommitSummary {
    fn from(commit: RepoCommit) -> Self {
        Self {
            title: commit
                .commit
                .message
                .lines()
                .next()
                .unwrap_or_default()
                .to_string(),
            url: commit.html_url,
            sha: commit.sha,
        }
    }
}

#[derive(Clone)]
pub struct GithubClient {
    octocrab: octocrab::Octocrab,
    timeout: Duration,
}

impl GithubClient {
    /// Anonymous access works for public repositories at a lower rate limit.
    pub fn new(github_token: Option<String>, timeout: Duration) -> anyhow::Result<Self> {
        let builder = octocrab::Octocrab::builder();
        let octocrab = match github_token {
            Some(token) => builder.personal_token(token).build()?,
            None => builder.build()?,
        };

        Ok(Self { octocrab, timeout })
    }

    #[instrument(skip(self))]
    pub async fn recent_commits(
        &self,
        owner: &str,
        repo: &str,
        count: u8,
    ) -> anyhow::Result<Vec<CommitSummary>> {
        let count = count.clamp(1, MAX_COMMITS);
        let repos = self.octocrab.repos(owner, repo);
        let request = repos.list_commits().per_page(count).send();

        let page = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| anyhow::anyhow!("GitHub did not answer within {:?}", self.timeout))??;

        Ok(page
            .items
            .into_iter()
            .take(count as usize)
            .map(Into::into)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::CommitSummary;

    #[test]
    fn short_sha() {
        let commit = CommitSummary {
            sha: "0123456789abcdef".to_string(),
            title: "Fix".to_string(),
            url: String::new(),
        };
        assert_eq!(commit.short_sha(), "0123456");

        let short = CommitSummary {
            sha: "abc".to_string(),
            ..commit
        };
        assert_eq!(short.short_sha(), "abc");
    }
}
