//! Navigation step: landing page → clocking page.

use super::error_message;
use crate::browser::{DriverError, Session};
use crate::config::SiteConfig;

pub const NAVIGATED: &str = "Successfully navigated to clocking page.";
pub const LINK_MISSING: &str = "Error: Clocking page button not found. Please retry.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationOutcome {
    pub success: bool,
    /// Relayed to the operator verbatim.
    pub message: String,
}

/// Follow the clocking shortcut. Releases the session on any failure.
pub async fn navigate_to_target(session: &Session, site: &SiteConfig) -> NavigationOutcome {
    match try_navigate(session, site).await {
        Ok(true) => NavigationOutcome {
            success: true,
            message: NAVIGATED.to_owned(),
        },
        Ok(false) => {
            tracing::warn!(selector = %site.clocking_link_selector, "clocking link not found");
            session.release().await;
            NavigationOutcome {
                success: false,
                message: LINK_MISSING.to_owned(),
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "navigation step failed");
            session.release().await;
            NavigationOutcome {
                success: false,
                message: error_message(&e),
            }
        }
    }
}

async fn try_navigate(session: &Session, site: &SiteConfig) -> Result<bool, DriverError> {
    let page = session.page();
    if page.query_selector(&site.clocking_link_selector).await?.is_none() {
        return Ok(false);
    }
    page.click(&site.clocking_link_selector).await?;
    Ok(true)
}
