//! Chat channel abstraction and the reply sink handed to session steps.

pub mod telegram;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;

/// An event received from a channel.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// A plain text message.
    Message {
        chat_id: i64,
        user_name: String,
        text: String,
        sent_at: DateTime<Utc>,
    },

    /// A slash command (e.g. /start).
    Command {
        chat_id: i64,
        user_name: String,
        command: String,
        sent_at: DateTime<Utc>,
    },
}

/// A message to send back through a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub chat_id: i64,
    pub text: String,
}

/// Trait for messaging channel integrations.
///
/// Implementations run a background loop that produces `ChannelEvent`s
/// and can send outbound messages.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Channel: Send + Sync {
    /// Run the channel's receive loop, sending events to `tx`.
    /// Should run until `cancel` is triggered.
    async fn run(&self, tx: Sender<ChannelEvent>, cancel: CancellationToken);

    /// Send a message through this channel.
    async fn send_message(&self, msg: &OutboundMessage) -> color_eyre::Result<()>;
}

/// Fire-and-forget progress and result messages for the operator.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, text: &str);
}

/// Sends notifications to one chat. Delivery failures are logged and dropped.
pub struct ChatNotifier {
    channel: Arc<dyn Channel>,
    chat_id: i64,
}

impl ChatNotifier {
    pub fn new(channel: Arc<dyn Channel>, chat_id: i64) -> Self {
        Self { channel, chat_id }
    }
}

#[async_trait]
impl Notifier for ChatNotifier {
    async fn notify(&self, text: &str) {
        let msg = OutboundMessage {
            chat_id: self.chat_id,
            text: text.to_owned(),
        };
        if let Err(e) = self.channel.send_message(&msg).await {
            tracing::warn!(chat_id = self.chat_id, error = %e, "failed to deliver reply");
        }
    }
}

/// Prints notifications to stdout, for running a session from the terminal.
pub struct ConsoleNotifier;

#[async_trait]
impl Notifier for ConsoleNotifier {
    async fn notify(&self, text: &str) {
        println!("{text}");
    }
}

/// Collects notifications in order.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct RecordingNotifier {
    messages: std::sync::Mutex<Vec<String>>,
}

#[cfg(test)]
impl RecordingNotifier {
    pub(crate) fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, text: &str) {
        self.messages.lock().unwrap().push(text.to_owned());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_chat_notifier_targets_its_chat() {
        let mut mock = MockChannel::new();
        mock.expect_send_message()
            .withf(|msg: &OutboundMessage| msg.chat_id == 42 && msg.text == "hello")
            .times(1)
            .returning(|_| Ok(()));

        ChatNotifier::new(Arc::new(mock), 42).notify("hello").await;
    }

    #[tokio::test]
    async fn test_chat_notifier_swallows_send_errors() {
        let mut mock = MockChannel::new();
        mock.expect_send_message()
            .times(1)
            .returning(|_| Err(color_eyre::eyre::eyre!("network down")));

        ChatNotifier::new(Arc::new(mock), 42).notify("hello").await;
    }
}
