//! Daemon mode: a Telegram bot that runs one clocking session per command.
//!
//! The daemon runs a `tokio::select!` loop over two sources:
//! 1. Telegram messages (via mpsc channel from background long-poll)
//! 2. Shutdown signals (SIGTERM/SIGINT)
//!
//! Events are handled one at a time; the next message is not read until the
//! current session has been torn down.

use crate::browser::BrowserLauncher;
use crate::browser::webdriver::WebDriverLauncher;
use crate::channel::telegram::TelegramChannel;
use crate::channel::{Channel, ChannelEvent, ChatNotifier, OutboundMessage};
use crate::command::CommandEvent;
use crate::config::Config;
use crate::guard::{self, Admission, AuthorizationGuard, Rejection};
use crate::secrets::{BOT_NAMESPACE, BOT_TOKEN_KEY, FileSecretStore, SecretStore};
use crate::session::Orchestrator;
use chrono::{DateTime, Utc};
use color_eyre::eyre::{Result, WrapErr, eyre};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub const UNAUTHORIZED: &str = "Unauthorized user.";

/// Run the bot in the foreground until a shutdown signal arrives.
///
/// `started_at` is the stale-message watermark: anything sent before it is ignored.
pub async fn run(root: &Path, started_at: DateTime<Utc>) -> Result<()> {
    let config = Arc::new(Config::load(root)?);
    let secrets: Arc<dyn SecretStore> = Arc::new(FileSecretStore::in_root(root));

    let token = secrets
        .get_secret(BOT_NAMESPACE, BOT_TOKEN_KEY)
        .wrap_err("failed to read bot token")?
        .ok_or_else(|| eyre!("no bot token stored; run `autoclock setup` first"))?;
    let channel: Arc<dyn Channel> = Arc::new(TelegramChannel::new(token)?);
    let launcher: Arc<dyn BrowserLauncher> = Arc::new(
        WebDriverLauncher::new(&config.browser).wrap_err("failed to set up WebDriver client")?,
    );

    tracing::info!(
        username = %config.username,
        webdriver = %config.browser.webdriver_url,
        watermark = %started_at,
        "starting daemon"
    );

    let runner = DaemonRunner::new(
        channel,
        AuthorizationGuard::new(started_at, secrets.clone()),
        Orchestrator::new(launcher, secrets.clone(), config),
        secrets,
    );

    let cancel = CancellationToken::new();
    spawn_shutdown_listener(cancel.clone());
    runner.run(cancel).await;
    Ok(())
}

fn spawn_shutdown_listener(cancel: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => {}
                        _ = sigterm.recv() => {}
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to install SIGTERM handler");
                    let _ = ctrl_c.await;
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
        }
        tracing::info!("shutdown signal received");
        cancel.cancel();
    });
}

/// Routes channel events to the guard, the orchestrator and the bootstrap handler.
pub struct DaemonRunner {
    channel: Arc<dyn Channel>,
    guard: AuthorizationGuard,
    orchestrator: Orchestrator,
    secrets: Arc<dyn SecretStore>,
}

impl DaemonRunner {
    pub fn new(
        channel: Arc<dyn Channel>,
        guard: AuthorizationGuard,
        orchestrator: Orchestrator,
        secrets: Arc<dyn SecretStore>,
    ) -> Self {
        Self {
            channel,
            guard,
            orchestrator,
            secrets,
        }
    }

    /// Poll the channel and handle events until `cancel` fires or the channel closes.
    pub async fn run(&self, cancel: CancellationToken) {
        let (tx, mut rx) = mpsc::channel::<ChannelEvent>(64);
        let channel = self.channel.clone();
        let poll_cancel = cancel.clone();
        tokio::spawn(async move {
            channel.run(tx, poll_cancel).await;
        });

        tracing::info!("ready, listening for Telegram messages");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("shutting down");
                    break;
                }

                event = rx.recv() => {
                    match event {
                        Some(event) => self.handle_event(event).await,
                        None => {
                            tracing::warn!("channel closed, shutting down");
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Handle one channel event to completion.
    pub async fn handle_event(&self, event: ChannelEvent) {
        match event {
            ChannelEvent::Command {
                chat_id,
                user_name,
                command,
                ..
            } => {
                if command == "start" {
                    tracing::info!(chat_id, %user_name, "bootstrap requested");
                    self.handle_start(chat_id).await;
                } else {
                    tracing::debug!(chat_id, %command, "ignoring unknown slash command");
                }
            }
            ChannelEvent::Message {
                chat_id,
                user_name,
                text,
                sent_at,
            } => {
                let event = CommandEvent {
                    text,
                    sender_id: chat_id,
                    chat_id,
                    timestamp: sent_at,
                };
                self.handle_command(event, &user_name).await;
            }
        }
    }

    async fn handle_command(&self, event: CommandEvent, user_name: &str) {
        match self.guard.admit(&event) {
            Admission::Rejected(Rejection::Stale) => {
                tracing::info!(
                    chat_id = event.chat_id,
                    sent_at = %event.timestamp,
                    watermark = %self.guard.watermark(),
                    "ignoring message sent before start"
                );
            }
            Admission::Rejected(Rejection::Unauthorized) => {
                tracing::warn!(chat_id = event.chat_id, user_name, "unauthorized sender");
                self.send(event.chat_id, UNAUTHORIZED).await;
            }
            Admission::Admitted => {
                tracing::info!(chat_id = event.chat_id, command = %event.text, "processing command");
                let notifier = ChatNotifier::new(self.channel.clone(), event.chat_id);
                self.orchestrator.process(&event.text, &notifier).await;
            }
        }
    }

    async fn handle_start(&self, chat_id: i64) {
        match guard::bootstrap(self.secrets.as_ref(), chat_id) {
            Ok(outcome) => {
                tracing::info!(chat_id, ?outcome, "bootstrap handled");
                self.send(chat_id, outcome.reply()).await;
            }
            Err(e) => {
                tracing::error!(chat_id, error = %e, "failed to store authorized chat id");
            }
        }
    }

    async fn send(&self, chat_id: i64, text: &str) {
        let msg = OutboundMessage {
            chat_id,
            text: text.to_owned(),
        };
        if let Err(e) = self.channel.send_message(&msg).await {
            tracing::warn!(chat_id, error = %e, "failed to send reply");
        }
    }
}
