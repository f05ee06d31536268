//! Authentication step.

use super::error_message;
use crate::browser::{DriverError, Session};
use crate::channel::Notifier;
use crate::config::SiteConfig;

pub const LOGGING_IN: &str = "Not logged in. Logging in...";
pub const LOGIN_SUCCEEDED: &str = "Successfully logged in.";
pub const LOGIN_FAILED: &str = "Failed to log in.";

/// Portal credentials, read from the secret store for one session.
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoginOutcome {
    pub success: bool,
    /// No login form was shown, e.g. a session cookie was still valid.
    pub already_authenticated: bool,
}

impl LoginOutcome {
    fn failed() -> Self {
        Self {
            success: false,
            already_authenticated: false,
        }
    }
}

/// Log in to the portal, or confirm an existing login.
///
/// A driver fault is reported to the operator and releases the session before
/// returning a failed outcome.
pub async fn authenticate(
    session: &Session,
    site: &SiteConfig,
    credentials: &Credentials,
    notifier: &dyn Notifier,
) -> LoginOutcome {
    match try_authenticate(session, site, credentials, notifier).await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::warn!(error = %e, "login step failed");
            notifier.notify(&error_message(&e)).await;
            session.release().await;
            LoginOutcome::failed()
        }
    }
}

async fn try_authenticate(
    session: &Session,
    site: &SiteConfig,
    credentials: &Credentials,
    notifier: &dyn Notifier,
) -> Result<LoginOutcome, DriverError> {
    let page = session.page();
    page.goto(&site.login_url).await?;
    page.wait_for_load().await?;

    if page.query_selector(&site.login_button_selector).await?.is_none() {
        tracing::info!("login form absent, already authenticated");
        return Ok(LoginOutcome {
            success: true,
            already_authenticated: true,
        });
    }

    notifier.notify(LOGGING_IN).await;
    page.fill(&site.username_selector, &credentials.username).await?;
    page.fill(&site.password_selector, &credentials.password).await?;
    page.click(&site.login_button_selector).await?;
    page.wait_for_load().await?;

    let success = page
        .query_selector(&site.post_login_marker_selector)
        .await?
        .is_some();
    if success {
        tracing::info!(username = %credentials.username, "logged in");
        notifier.notify(LOGIN_SUCCEEDED).await;
    } else {
        tracing::warn!(username = %credentials.username, "post-login marker missing");
        notifier.notify(LOGIN_FAILED).await;
    }

    Ok(LoginOutcome {
        success,
        already_authenticated: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::BrowserLauncher;
    use crate::browser::fake::{FakeLauncher, Scenario};
    use crate::channel::{MockNotifier, RecordingNotifier};

    fn site() -> SiteConfig {
        SiteConfig::default()
    }

    fn credentials() -> Credentials {
        Credentials {
            username: "qps56811".into(),
            password: "hunter2".into(),
        }
    }

    /// Login form present; clicking it reveals the marker when `accepts`.
    fn login_form(accepts: bool) -> Scenario {
        let site = site();
        let button = site.login_button_selector.clone();
        let marker = site.post_login_marker_selector.clone();
        Scenario::default()
            .with_element(&site.username_selector)
            .with_element(&site.password_selector)
            .with_element(&site.login_button_selector)
            .on_click(&site.login_button_selector, move |page| {
                page.hide(&button);
                if accepts {
                    page.show(&marker);
                }
            })
    }

    #[tokio::test]
    async fn test_already_authenticated_sends_nothing_and_fills_nothing() {
        let launcher = FakeLauncher::new(Scenario::default());
        let session = Session::new(launcher.launch().await.unwrap());
        let mut notifier = MockNotifier::new();
        notifier.expect_notify().never();

        let outcome = authenticate(&session, &site(), &credentials(), &notifier).await;

        assert!(outcome.success);
        assert!(outcome.already_authenticated);
        assert!(launcher.fills().is_empty());
        assert!(launcher.clicks().is_empty());
        assert_eq!(launcher.gotos(), vec![site().login_url]);
        assert!(!session.is_released());
        session.release().await;
    }

    #[tokio::test]
    async fn test_performs_login_when_form_present() {
        let launcher = FakeLauncher::new(login_form(true));
        let session = Session::new(launcher.launch().await.unwrap());
        let notifier = RecordingNotifier::default();

        let outcome = authenticate(&session, &site(), &credentials(), &notifier).await;

        assert!(outcome.success);
        assert!(!outcome.already_authenticated);
        assert_eq!(notifier.messages(), vec![LOGGING_IN, LOGIN_SUCCEEDED]);
        assert_eq!(
            launcher.fills(),
            vec![
                ("#txtUsr".to_string(), "qps56811".to_string()),
                ("#txtPwd".to_string(), "hunter2".to_string()),
            ]
        );
        assert_eq!(launcher.clicks(), vec!["#btnLogin"]);
        session.release().await;
    }

    #[tokio::test]
    async fn test_missing_marker_is_failure_without_release() {
        let launcher = FakeLauncher::new(login_form(false));
        let session = Session::new(launcher.launch().await.unwrap());
        let notifier = RecordingNotifier::default();

        let outcome = authenticate(&session, &site(), &credentials(), &notifier).await;

        assert!(!outcome.success);
        assert_eq!(notifier.messages(), vec![LOGGING_IN, LOGIN_FAILED]);
        assert!(!session.is_released());
        session.release().await;
    }

    #[tokio::test]
    async fn test_driver_fault_reports_and_releases() {
        let launcher = FakeLauncher::new(Scenario::default().failing_goto());
        let session = Session::new(launcher.launch().await.unwrap());
        let notifier = RecordingNotifier::default();

        let outcome = authenticate(&session, &site(), &credentials(), &notifier).await;

        assert!(!outcome.success);
        assert_eq!(
            notifier.messages(),
            vec!["An error occurred: net::ERR_NAME_NOT_RESOLVED. Please retry."]
        );
        assert!(session.is_released());
        assert_eq!(launcher.closes(), 1);
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let rendered = format!("{:?}", credentials());
        assert!(rendered.contains("qps56811"));
        assert!(!rendered.contains("hunter2"));
    }
}
