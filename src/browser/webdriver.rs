//! W3C WebDriver client using raw reqwest (no framework).
//!
//! Talks JSON over HTTP to a running chromedriver or geckodriver. Each
//! [`WebDriverLauncher::launch`] creates a new WebDriver session, so every
//! command starts with a fresh browser profile.

use super::{BrowserLauncher, DriverError, ElementHandle, POLL_INTERVAL, PageDriver};
use crate::config::{BrowserConfig, BrowserKind};
use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;

/// Key under which WebDriver returns element references.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735a7e6e2c";

#[derive(Debug, Deserialize)]
struct WdResponse {
    value: Value,
}

#[derive(Debug, Deserialize)]
struct WdError {
    error: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewSession {
    session_id: String,
}

/// Launches pages by creating WebDriver sessions.
pub struct WebDriverLauncher {
    client: reqwest::Client,
    endpoint: String,
    capabilities: Value,
    load_timeout: Duration,
}

impl WebDriverLauncher {
    pub fn new(config: &BrowserConfig) -> Result<Self, DriverError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.webdriver_url.trim_end_matches('/').to_owned(),
            capabilities: capabilities(config.browser, config.headless),
            load_timeout: Duration::from_secs(config.page_load_timeout_secs),
        })
    }
}

#[async_trait]
impl BrowserLauncher for WebDriverLauncher {
    async fn launch(&self) -> Result<Box<dyn PageDriver>, DriverError> {
        let value = send(
            &self.client,
            Method::POST,
            &format!("{}/session", self.endpoint),
            Some(json!({ "capabilities": self.capabilities })),
        )
        .await?;
        let session: NewSession = serde_json::from_value(value)
            .map_err(|e| DriverError::Protocol(format!("unexpected new session response: {e}")))?;

        tracing::debug!(session_id = %session.session_id, "webdriver session created");
        Ok(Box::new(WebDriverPage {
            client: self.client.clone(),
            base: format!("{}/session/{}", self.endpoint, session.session_id),
            load_timeout: self.load_timeout,
        }))
    }
}

/// One WebDriver session, i.e. one browser window.
pub struct WebDriverPage {
    client: reqwest::Client,
    base: String,
    load_timeout: Duration,
}

impl WebDriverPage {
    async fn command(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, DriverError> {
        send(&self.client, method, &format!("{}{path}", self.base), body).await
    }

    async fn find(&self, selector: &str) -> Result<Option<String>, DriverError> {
        let result = self
            .command(
                Method::POST,
                "/element",
                Some(json!({ "using": "css selector", "value": selector })),
            )
            .await;

        match result {
            Ok(value) => element_id(&value).map(Some),
            Err(DriverError::ElementNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn require(&self, selector: &str) -> Result<String, DriverError> {
        self.find(selector)
            .await?
            .ok_or_else(|| DriverError::ElementNotFound(selector.to_owned()))
    }
}

#[async_trait]
impl PageDriver for WebDriverPage {
    async fn goto(&self, url: &str) -> Result<(), DriverError> {
        self.command(Method::POST, "/url", Some(json!({ "url": url })))
            .await
            .map(drop)
    }

    async fn wait_for_load(&self) -> Result<(), DriverError> {
        let poll = async {
            loop {
                let state = self
                    .command(
                        Method::POST,
                        "/execute/sync",
                        Some(json!({ "script": "return document.readyState", "args": [] })),
                    )
                    .await?;
                if state.as_str() == Some("complete") {
                    return Ok::<(), DriverError>(());
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        };
        tokio::time::timeout(self.load_timeout, poll)
            .await
            .map_err(|_| DriverError::Timeout {
                after: self.load_timeout,
                what: "page load".into(),
            })?
    }

    async fn query_selector(&self, selector: &str) -> Result<Option<ElementHandle>, DriverError> {
        Ok(self.find(selector).await?.map(ElementHandle))
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<(), DriverError> {
        let id = self.require(selector).await?;
        self.command(Method::POST, &format!("/element/{id}/clear"), Some(json!({})))
            .await?;
        self.command(
            Method::POST,
            &format!("/element/{id}/value"),
            Some(json!({ "text": value })),
        )
        .await
        .map(drop)
    }

    async fn click(&self, selector: &str) -> Result<(), DriverError> {
        let id = self.require(selector).await?;
        self.command(Method::POST, &format!("/element/{id}/click"), Some(json!({})))
            .await
            .map(drop)
    }

    async fn text_content(&self, element: &ElementHandle) -> Result<String, DriverError> {
        let value = self
            .command(Method::GET, &text_content_path(&element.0), None)
            .await?;
        Ok(property_text(&value))
    }

    async fn close(&self) -> Result<(), DriverError> {
        self.command(Method::DELETE, "", None).await.map(drop)
    }
}

async fn send(
    client: &reqwest::Client,
    method: Method,
    url: &str,
    body: Option<Value>,
) -> Result<Value, DriverError> {
    let mut request = client.request(method, url);
    if let Some(body) = body {
        request = request.json(&body);
    }
    let resp = request.send().await?;
    let status = resp.status();
    let body: WdResponse = resp.json().await?;

    if status.is_success() {
        Ok(body.value)
    } else {
        Err(classify_error(body.value))
    }
}

/// Map a WebDriver error payload onto a [`DriverError`].
fn classify_error(value: Value) -> DriverError {
    match serde_json::from_value::<WdError>(value) {
        Ok(err) if err.error == "no such element" => DriverError::ElementNotFound(err.message),
        Ok(err) => DriverError::Protocol(format!("{}: {}", err.error, first_line(&err.message))),
        Err(_) => DriverError::Protocol("malformed webdriver error response".into()),
    }
}

/// The DOM `textContent` property, which includes hidden text and keeps
/// whitespace, unlike the rendered-text endpoint.
fn text_content_path(element_id: &str) -> String {
    format!("/element/{element_id}/property/textContent")
}

/// `textContent` is null for documents and doctypes.
fn property_text(value: &Value) -> String {
    value.as_str().unwrap_or_default().to_owned()
}

fn element_id(value: &Value) -> Result<String, DriverError> {
    value
        .get(ELEMENT_KEY)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| DriverError::Protocol("element reference missing from response".into()))
}

/// Drivers append multi-line stack traces to messages; users only need the first line.
fn first_line(message: &str) -> &str {
    message.lines().next().unwrap_or_default().trim()
}

fn capabilities(browser: BrowserKind, headless: bool) -> Value {
    match browser {
        BrowserKind::Chrome => {
            let mut args = vec!["--disable-gpu", "--no-sandbox", "--window-size=1280,1024"];
            if headless {
                args.push("--headless=new");
            }
            json!({
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": { "args": args },
                }
            })
        }
        BrowserKind::Firefox => {
            let args: Vec<&str> = if headless { vec!["-headless"] } else { vec![] };
            json!({
                "alwaysMatch": {
                    "browserName": "firefox",
                    "moz:firefoxOptions": { "args": args },
                }
            })
        }
    }
}
