//! Session orchestrator: one command, one browser, three steps.
//!
//! ```text
//! Idle → AwaitingLogin → AwaitingNavigation → AwaitingToggle → Done
//! ```
//!
//! The first failing step ends the session. Whatever happens, the browser
//! session is released before [`Orchestrator::process`] returns.

use crate::browser::{BrowserLauncher, Session};
use crate::channel::Notifier;
use crate::command::Direction;
use crate::config::Config;
use crate::secrets::{CREDENTIAL_NAMESPACE, SecretStore};
use crate::steps::clock::{self, ClockFailure};
use crate::steps::login::{self, Credentials};
use crate::steps::{error_message, navigate};
use std::sync::Arc;

pub const INVALID_COMMAND: &str = "Invalid command.";
pub const NAVIGATING_TO_LOGIN: &str = "Navigating to login page...";
pub const NAVIGATING_TO_CLOCKING: &str = "Navigating to clocking page...";
pub const MISSING_CREDENTIALS: &str =
    "No password is stored for the portal account. Run `autoclock setup`, then retry.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    AwaitingLogin,
    AwaitingNavigation,
    AwaitingToggle,
    Done,
}

/// How processing one command ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// Not `in` / `out`; no browser was opened.
    InvalidCommand,
    /// No stored password; no browser was opened.
    MissingCredentials,
    /// The browser could not be started.
    LaunchFailed,
    LoginFailed,
    NavigationFailed,
    /// The clock step ran; carries its result as relayed to the operator.
    Toggled(Result<String, ClockFailure>),
}

impl SessionEnd {
    /// State the machine was in when it stopped.
    pub fn state(&self) -> SessionState {
        match self {
            Self::InvalidCommand | Self::MissingCredentials | Self::LaunchFailed => {
                SessionState::Idle
            }
            Self::LoginFailed => SessionState::AwaitingLogin,
            Self::NavigationFailed => SessionState::AwaitingNavigation,
            Self::Toggled(_) => SessionState::Done,
        }
    }
}

/// Runs clocking sessions. Callers must not run two sessions at once.
pub struct Orchestrator {
    launcher: Arc<dyn BrowserLauncher>,
    secrets: Arc<dyn SecretStore>,
    config: Arc<Config>,
}

impl Orchestrator {
    pub fn new(
        launcher: Arc<dyn BrowserLauncher>,
        secrets: Arc<dyn SecretStore>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            launcher,
            secrets,
            config,
        }
    }

    /// Process one admitted command, reporting progress through `notifier`.
    pub async fn process(&self, text: &str, notifier: &dyn Notifier) -> SessionEnd {
        let Some(direction) = Direction::parse(text) else {
            notifier.notify(INVALID_COMMAND).await;
            return SessionEnd::InvalidCommand;
        };

        let credentials = match self.credentials() {
            Ok(Some(credentials)) => credentials,
            Ok(None) => {
                tracing::warn!(username = %self.config.username, "no password stored");
                notifier.notify(MISSING_CREDENTIALS).await;
                return SessionEnd::MissingCredentials;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to read credentials");
                notifier.notify(&error_message(&e)).await;
                return SessionEnd::MissingCredentials;
            }
        };

        let page = match self.launcher.launch().await {
            Ok(page) => page,
            Err(e) => {
                tracing::error!(error = %e, "failed to launch browser");
                notifier.notify(&error_message(&e)).await;
                return SessionEnd::LaunchFailed;
            }
        };

        let session = Session::new(page);
        let end = self.drive(&session, direction, &credentials, notifier).await;
        session.release().await;
        tracing::info!(%direction, state = ?end.state(), "session finished");
        end
    }

    async fn drive(
        &self,
        session: &Session,
        direction: Direction,
        credentials: &Credentials,
        notifier: &dyn Notifier,
    ) -> SessionEnd {
        let site = &self.config.site;
        let mut state = SessionState::Idle;

        advance(&mut state, SessionState::AwaitingLogin);
        notifier.notify(NAVIGATING_TO_LOGIN).await;
        let login = login::authenticate(session, site, credentials, notifier).await;
        if !login.success {
            return SessionEnd::LoginFailed;
        }

        advance(&mut state, SessionState::AwaitingNavigation);
        notifier.notify(NAVIGATING_TO_CLOCKING).await;
        let navigation = navigate::navigate_to_target(session, site).await;
        notifier.notify(&navigation.message).await;
        if !navigation.success {
            return SessionEnd::NavigationFailed;
        }

        advance(&mut state, SessionState::AwaitingToggle);
        let result = match session.page().wait_for_load().await {
            Ok(()) => {
                clock::toggle(session, site, direction, self.config.browser.toggle_timeout()).await
            }
            Err(e) => Err(ClockFailure::Unexpected(e.to_string())),
        };
        let reply = match &result {
            Ok(message) => message.clone(),
            Err(failure) => failure.to_string(),
        };
        notifier.notify(&reply).await;

        advance(&mut state, SessionState::Done);
        SessionEnd::Toggled(result)
    }

    fn credentials(&self) -> Result<Option<Credentials>, crate::secrets::SecretError> {
        let username = &self.config.username;
        Ok(self
            .secrets
            .get_secret(CREDENTIAL_NAMESPACE, username)?
            .map(|password| Credentials {
                username: username.clone(),
                password,
            }))
    }
}

fn advance(state: &mut SessionState, next: SessionState) {
    tracing::debug!(from = ?*state, to = ?next, "session transition");
    *state = next;
}
