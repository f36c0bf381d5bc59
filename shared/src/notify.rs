use std::time::Duration;

use async_trait::async_trait;

use crate::UserId;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// The platform refused delivery, e.g. the user closed their DMs.
    #[error("delivery denied: {0}")]
    Denied(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl NotifyError {
    /// Denials and timeouts happen routinely and are not worth an alert.
    pub const fn is_expected(&self) -> bool {
        matches!(self, Self::Denied(_) | Self::Timeout(_))
    }
}

/// The outbound half of the chat transport.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn direct_message(&self, user_id: UserId, text: &str) -> Result<(), NotifyError>;

    /// Posts to the public progress channel.
    async fn announce(&self, text: &str) -> Result<(), NotifyError>;

    fn mention(&self, user_id: UserId) -> String {
        format!("<@{user_id}>")
    }
}

/// Runs a notification with an upper bound on how long it may take.
pub async fn bounded<F>(limit: Duration, fut: F) -> Result<(), NotifyError>
where
    F: std::future::Future<Output = Result<(), NotifyError>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .unwrap_or(Err(NotifyError::Timeout(limit)))
}
