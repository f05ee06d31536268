//! Configuration loaded from `.autoclock/config.toml`.
//!
//! Holds everything about the portal that is not secret: the login URL, the
//! CSS selectors of each control, the account name, and how to reach the
//! WebDriver server. Passwords and the bot token live in the secret store.

use color_eyre::eyre::{Result, WrapErr, eyre};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_DIR: &str = ".autoclock";
const CONFIG_FILE: &str = "config.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Portal account name. The password is stored under this key.
    pub username: String,

    #[serde(default)]
    pub site: SiteConfig,

    #[serde(default)]
    pub browser: BrowserConfig,
}

/// Where the portal lives and how to find its controls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SiteConfig {
    pub login_url: String,
    pub username_selector: String,
    pub password_selector: String,
    pub login_button_selector: String,
    /// Element that only exists once logged in.
    pub post_login_marker_selector: String,
    /// Shortcut link from the landing page to the clocking page.
    pub clocking_link_selector: String,
    pub status_selector: String,
    pub clock_selector: String,
    pub submit_selector: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            login_url: "https://selfservice.diamond.ac.uk/Login.aspx".into(),
            username_selector: "#txtUsr".into(),
            password_selector: "#txtPwd".into(),
            login_button_selector: "#btnLogin".into(),
            post_login_marker_selector: "#ContentPlaceHolder1_repShortcuts_lblShortcut_1".into(),
            clocking_link_selector: "#ContentPlaceHolder1_repShortcuts_lblShortcut_1".into(),
            status_selector: "#ContentPlaceHolder1_lblClockingStatus".into(),
            clock_selector: "#ContentPlaceHolder1_divClock".into(),
            submit_selector: "#ContentPlaceHolder1_btnSubmit".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserKind {
    Chrome,
    Firefox,
}

/// WebDriver endpoint and wait bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BrowserConfig {
    /// chromedriver listens on 9515 by default, geckodriver on 4444.
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,

    #[serde(default = "default_browser")]
    pub browser: BrowserKind,

    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Upper bound on waiting for a page to finish loading (seconds).
    #[serde(default = "default_page_load_timeout")]
    pub page_load_timeout_secs: u64,

    /// Upper bound on waiting for the clocking status to change (seconds).
    #[serde(default = "default_toggle_timeout")]
    pub toggle_timeout_secs: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            webdriver_url: default_webdriver_url(),
            browser: default_browser(),
            headless: default_headless(),
            page_load_timeout_secs: default_page_load_timeout(),
            toggle_timeout_secs: default_toggle_timeout(),
        }
    }
}

impl BrowserConfig {
    pub fn toggle_timeout(&self) -> Duration {
        Duration::from_secs(self.toggle_timeout_secs)
    }

    /// A zero bound would fail every wait immediately.
    pub fn validate(&self) -> Result<()> {
        if self.page_load_timeout_secs == 0 {
            color_eyre::eyre::bail!("browser.page_load_timeout_secs must be at least 1");
        }
        if self.toggle_timeout_secs == 0 {
            color_eyre::eyre::bail!("browser.toggle_timeout_secs must be at least 1");
        }
        Ok(())
    }
}

fn default_webdriver_url() -> String {
    "http://localhost:9515".into()
}

fn default_browser() -> BrowserKind {
    BrowserKind::Chrome
}

fn default_headless() -> bool {
    true
}

fn default_page_load_timeout() -> u64 {
    30
}

fn default_toggle_timeout() -> u64 {
    30
}

/// Path of the config file under `root`.
pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_DIR).join(CONFIG_FILE)
}

impl Config {
    /// A config with default site and browser settings for `username`.
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            site: SiteConfig::default(),
            browser: BrowserConfig::default(),
        }
    }

    /// Load config from `.autoclock/config.toml` under `root`.
    pub fn load(root: &Path) -> Result<Self> {
        let path = config_path(root);
        let content = std::fs::read_to_string(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                eyre!(
                    "No config found at {}\n\n\
                     Create one with:\n\
                     \x20 autoclock init --username <your-portal-username>\n\
                     then store your password and bot token with:\n\
                     \x20 autoclock setup\n",
                    path.display()
                )
            } else {
                eyre!("failed to read {}: {e}", path.display())
            }
        })?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| eyre!("failed to parse {}: {e}", path.display()))?;
        if config.username.trim().is_empty() {
            color_eyre::eyre::bail!("{}: username must not be empty", path.display());
        }
        config.browser.validate().wrap_err_with(|| format!("invalid {}", path.display()))?;
        Ok(config)
    }

    /// Write this config to `.autoclock/config.toml` under `root`.
    pub fn save(&self, root: &Path) -> Result<PathBuf> {
        let path = config_path(root);
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .wrap_err_with(|| format!("failed to create {}", dir.display()))?;
        }
        let content = toml::to_string_pretty(self).wrap_err("failed to serialize config")?;
        std::fs::write(&path, content)
            .wrap_err_with(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }
}
