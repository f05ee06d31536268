//! Authorization guard: stale-message watermark and single-operator check.

use crate::command::CommandEvent;
use crate::secrets::{BOT_NAMESPACE, CHAT_ID_KEY, SecretError, SecretStore};
use chrono::{DateTime, Utc};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    /// Sent before this process started; queued messages are never replayed.
    #[error("message predates process start")]
    Stale,

    #[error("sender is not the authorized operator")]
    Unauthorized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Rejected(Rejection),
}

pub struct AuthorizationGuard {
    watermark: DateTime<Utc>,
    secrets: Arc<dyn SecretStore>,
}

impl AuthorizationGuard {
    /// `watermark` is the process start instant.
    pub fn new(watermark: DateTime<Utc>, secrets: Arc<dyn SecretStore>) -> Self {
        Self { watermark, secrets }
    }

    pub fn watermark(&self) -> DateTime<Utc> {
        self.watermark
    }

    /// Decide whether `event` may drive a session. Staleness is checked first,
    /// so stale messages are dropped without a secret lookup.
    pub fn admit(&self, event: &CommandEvent) -> Admission {
        if event.timestamp < self.watermark {
            return Admission::Rejected(Rejection::Stale);
        }

        let authorized = match self.secrets.get_secret(BOT_NAMESPACE, CHAT_ID_KEY) {
            Ok(Some(id)) => id,
            Ok(None) => {
                tracing::warn!("no authorized chat id stored yet; send /start to initialize");
                return Admission::Rejected(Rejection::Unauthorized);
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to read authorized chat id");
                return Admission::Rejected(Rejection::Unauthorized);
            }
        };

        if authorized.trim() == event.sender_id.to_string() {
            Admission::Admitted
        } else {
            Admission::Rejected(Rejection::Unauthorized)
        }
    }
}

/// Result of the `/start` bootstrap command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bootstrap {
    Initialized,
    AlreadyInitialized,
}

impl Bootstrap {
    pub fn reply(self) -> &'static str {
        match self {
            Self::Initialized => "Bot initialized.",
            Self::AlreadyInitialized => "Bot already initialized.",
        }
    }
}

/// Record `chat_id` as the authorized operator unless one is already stored.
/// An existing id is never overwritten.
pub fn bootstrap(secrets: &dyn SecretStore, chat_id: i64) -> Result<Bootstrap, SecretError> {
    if secrets.get_secret(BOT_NAMESPACE, CHAT_ID_KEY)?.is_some() {
        return Ok(Bootstrap::AlreadyInitialized);
    }
    secrets.set_secret(BOT_NAMESPACE, CHAT_ID_KEY, &chat_id.to_string())?;
    Ok(Bootstrap::Initialized)
}
