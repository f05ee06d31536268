//! Page automation abstraction over a single headless browser tab.
//!
//! Steps never talk to a concrete browser. They receive a [`Session`], which
//! owns one [`PageDriver`] for the lifetime of a single command and makes sure
//! the page is closed exactly once, however many exit paths ask for it.

#[cfg(test)]
pub(crate) mod fake;
pub mod webdriver;

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Interval between polls in condition waits.
pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Opaque reference to an element found on the current page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementHandle(pub String);

/// Faults raised by a page driver.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("element not found: {0}")]
    ElementNotFound(String),

    #[error("timed out after {}s waiting for {what}", .after.as_secs())]
    Timeout { after: Duration, what: String },

    #[error("{0}")]
    Protocol(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Primitive operations on one browser page.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Load `url` in the page.
    async fn goto(&self, url: &str) -> Result<(), DriverError>;

    /// Block until the current document has finished loading.
    async fn wait_for_load(&self) -> Result<(), DriverError>;

    /// Find the first element matching a CSS selector.
    async fn query_selector(&self, selector: &str) -> Result<Option<ElementHandle>, DriverError>;

    /// Replace the value of the input matching `selector`.
    async fn fill(&self, selector: &str, value: &str) -> Result<(), DriverError>;

    async fn click(&self, selector: &str) -> Result<(), DriverError>;

    async fn text_content(&self, element: &ElementHandle) -> Result<String, DriverError>;

    /// Block until an element matching `selector` has text different from
    /// `initial`, or fail with [`DriverError::Timeout`] after `timeout`.
    ///
    /// Lookups that fail mid-wait (the page may be reloading after a
    /// postback) are retried until the deadline.
    async fn wait_for_text_change(
        &self,
        selector: &str,
        initial: &str,
        timeout: Duration,
    ) -> Result<(), DriverError> {
        let poll = async {
            loop {
                match self.current_text(selector).await {
                    Ok(Some(text)) if text != initial => return,
                    Ok(_) => {}
                    Err(e) => tracing::debug!(selector, error = %e, "status lookup failed, retrying"),
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        };
        tokio::time::timeout(timeout, poll)
            .await
            .map_err(|_| DriverError::Timeout {
                after: timeout,
                what: format!("text of {selector} to change"),
            })
    }

    /// Release the page and its browser session.
    async fn close(&self) -> Result<(), DriverError>;

    /// Text of the element matching `selector`, if present.
    async fn current_text(&self, selector: &str) -> Result<Option<String>, DriverError> {
        match self.query_selector(selector).await? {
            Some(element) => self.text_content(&element).await.map(Some),
            None => Ok(None),
        }
    }
}

/// Opens a brand-new browser page. Called once per processed command.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn PageDriver>, DriverError>;
}

/// One browser lifecycle scoped to a single command.
pub struct Session {
    page: Box<dyn PageDriver>,
    released: AtomicBool,
}

impl Session {
    pub fn new(page: Box<dyn PageDriver>) -> Self {
        Self {
            page,
            released: AtomicBool::new(false),
        }
    }

    pub fn page(&self) -> &dyn PageDriver {
        self.page.as_ref()
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Close the underlying page. Only the first call reaches the driver;
    /// later calls are no-ops. Close failures are logged, not returned.
    pub async fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        match self.page.close().await {
            Ok(()) => tracing::debug!("browser session closed"),
            Err(e) => tracing::warn!(error = %e, "failed to close browser session"),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.is_released() {
            tracing::warn!("browser session dropped without being released");
        }
    }
}
