use std::fmt;

use reqwest::{Client, Response};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{Event, Level, Subscriber};

/// Discord caps webhook content at 2000 characters.
const MAX_CONTENT: usize = 1900;

#[derive(Debug, Serialize)]
struct WebhookPayload {
    content: String,
}

/// Forwards warnings and errors to a chat webhook so operators notice
/// failures without reading the logs.
#[derive(Clone)]
pub struct AlertLayer {
    sender: mpsc::UnboundedSender<(String, Level)>,
}

fn render(message: &str, level: Level) -> String {
    let mut content = format!("**{}**: `{}`", level.as_str(), message.replace('`', "'"));
    if content.len() > MAX_CONTENT {
        let mut cut = MAX_CONTENT;
        while !content.is_char_boundary(cut) {
            cut -= 1;
        }
        content.truncate(cut);
        content.push_str("…`");
    }
    content
}

async fn send_alert(client: &Client, url: &str, content: String) -> anyhow::Result<Response> {
    Ok(client
        .post(url)
        .json(&WebhookPayload { content })
        .send()
        .await?)
}

async fn sender_task(
    mut reader: mpsc::UnboundedReceiver<(String, Level)>,
    client: Client,
    url: String,
) {
    while let Some((message, level)) = reader.recv().await {
        match send_alert(&client, &url, render(&message, level)).await {
            Ok(response) if response.status().is_success() => {}
            // Logging here would feed back into this layer
            Ok(response) => eprintln!("Failed to send alert: Received HTTP {}", response.status()),
            Err(e) => eprintln!("Failed to send alert: {}", e),
        }
    }
}

impl AlertLayer {
    /// Must be called inside a tokio runtime.
    pub fn new(webhook_url: String) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        tokio::spawn(sender_task(receiver, Client::new(), webhook_url));
        Self { sender }
    }

    pub fn alert(&self, message: &str, level: Level) {
        let _ = self.sender.send((message.to_string(), level));
    }
}

impl<S: Subscriber> tracing_subscriber::Layer<S> for AlertLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        let level = event.metadata().level();
        if level > &Level::WARN {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        self.alert(&visitor.to_string(), *level);
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
}

impl fmt::Display for MessageVisitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        }
    }
}

#[cfg(test)]
mod tests {
    use tracing_subscriber::layer::SubscriberExt;

    use super::*;

    #[test]
    fn long_messages_are_truncated() {
        let rendered = render(&"é".repeat(3000), Level::ERROR);
        assert!(rendered.len() <= MAX_CONTENT + "…`".len());
        assert!(rendered.starts_with("**ERROR**: `"));
        assert!(rendered.ends_with("…`"));
    }

    #[test]
    fn backticks_do_not_break_formatting() {
        assert_eq!(render("a `b`", Level::WARN), "**WARN**: `a 'b'`");
    }

    #[tokio::test]
    async fn only_warnings_and_errors_are_forwarded() {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let layer = AlertLayer { sender };
        let subscriber = tracing_subscriber::registry().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("all good");
            tracing::warn!("disk almost full");
            tracing::error!("database is gone");
        });

        assert_eq!(
            receiver.recv().await,
            Some(("disk almost full".to_string(), Level::WARN))
        );
        assert_eq!(
            receiver.recv().await,
            Some(("database is gone".to_string(), Level::ERROR))
        );
        assert!(receiver.try_recv().is_err());
    }
}
