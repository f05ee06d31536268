//! Clock action step: compare, act, confirm.
//!
//! The status label is third-party text, so it is matched loosely: a
//! case-insensitive substring test for "clocked in" / "clocked out". That
//! tolerates cosmetic changes such as "You are currently Clocked In".

use crate::browser::{DriverError, Session};
use crate::command::Direction;
use crate::config::SiteConfig;
use std::time::Duration;

/// Shown when the portal has no clock element.
pub const UNKNOWN_TIME: &str = "Unknown time";

/// Clocking state inferred from the status label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockStatus {
    ClockedIn,
    ClockedOut,
    Unknown,
}

impl ClockStatus {
    pub fn parse(text: &str) -> Self {
        let text = text.to_lowercase();
        if text.contains(Direction::In.phrase()) {
            Self::ClockedIn
        } else if text.contains(Direction::Out.phrase()) {
            Self::ClockedOut
        } else {
            Self::Unknown
        }
    }
}

/// Whether `status_text` shows the state `direction` aims for.
pub fn reached(status_text: &str, direction: Direction) -> bool {
    status_text.to_lowercase().contains(direction.phrase())
}

/// Why a toggle did not produce a confirmed result. `Display` is the text
/// relayed to the operator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClockFailure {
    #[error("Clocking status element not found. Please retry.")]
    ElementMissing,

    #[error("Timed out waiting for the clocking status to change. Please retry.")]
    Timeout,

    #[error("Failed to {}. Please retry.", .0.verb())]
    NoStatusChange(Direction),

    #[error("An error occurred: {0}. Please retry.")]
    Unexpected(String),
}

impl From<DriverError> for ClockFailure {
    fn from(e: DriverError) -> Self {
        match e {
            DriverError::Timeout { .. } => Self::Timeout,
            other => Self::Unexpected(other.to_string()),
        }
    }
}

/// Bring the clocking control into `direction`'s state.
///
/// Idempotent: if the portal already shows the target state, nothing is
/// clicked. The reported time is the one displayed before the click. Never
/// releases the session.
pub async fn toggle(
    session: &Session,
    site: &SiteConfig,
    direction: Direction,
    timeout: Duration,
) -> Result<String, ClockFailure> {
    let result = try_toggle(session, site, direction, timeout).await;
    match &result {
        Ok(message) => tracing::info!(%direction, reply = %message, "clock step finished"),
        Err(failure) => tracing::warn!(%direction, ?failure, "clock step failed"),
    }
    result
}

async fn try_toggle(
    session: &Session,
    site: &SiteConfig,
    direction: Direction,
    timeout: Duration,
) -> Result<String, ClockFailure> {
    let page = session.page();
    let Some(status) = page.query_selector(&site.status_selector).await? else {
        return Err(ClockFailure::ElementMissing);
    };
    let clock = page.query_selector(&site.clock_selector).await?;

    let initial = page.text_content(&status).await?;
    let clock_time = match clock {
        Some(element) => page.text_content(&element).await?.trim().to_owned(),
        None => UNKNOWN_TIME.to_owned(),
    };
    tracing::debug!(status = ?ClockStatus::parse(&initial), %clock_time, "current clocking state");

    if reached(&initial, direction) {
        return Ok(format!("Already {}. Time: {clock_time}", direction.phrase()));
    }

    page.click(&site.submit_selector).await?;
    page.wait_for_text_change(&site.status_selector, &initial, timeout)
        .await?;

    let updated = page
        .current_text(&site.status_selector)
        .await?
        .ok_or(ClockFailure::ElementMissing)?;
    if reached(&updated, direction) {
        Ok(format!("Successfully {} at time {clock_time}", direction.phrase()))
    } else {
        tracing::warn!(status = %updated, "status changed but not to the target state");
        Err(ClockFailure::NoStatusChange(direction))
    }
}
