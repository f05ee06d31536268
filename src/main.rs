//! autoclock: clock in and out of the self-service portal from Telegram.
//!
//! Send `in` or `out` to the bot; it logs in with a headless browser, opens
//! the clocking page, toggles the clock and replies with the result.

use autoclock::browser::webdriver::WebDriverLauncher;
use autoclock::channel::ConsoleNotifier;
use autoclock::config::{Config, config_path};
use autoclock::daemon;
use autoclock::secrets::{self, FileSecretStore, Provisioned, SecretStore};
use autoclock::session::{Orchestrator, SessionEnd};
use chrono::Utc;
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, bail};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Clock in and out of the self-service portal from Telegram.
#[derive(Parser)]
#[command(name = "autoclock", version, about)]
struct Cli {
    /// Directory holding `.autoclock/` (defaults to current directory).
    #[arg(short = 'C', long, global = true)]
    dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default `.autoclock/config.toml`.
    Init {
        /// Portal account name.
        #[arg(long)]
        username: String,

        /// Overwrite an existing config.
        #[arg(long)]
        force: bool,
    },

    /// Store the portal password and Telegram bot token, prompting for any that are missing.
    Setup,

    /// Run the Telegram bot in the foreground.
    Run,

    /// Run one clocking session now and print the replies.
    Clock {
        /// `in` or `out`.
        direction: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let started_at = Utc::now();
    color_eyre::install()?;
    init_tracing();

    let cli = Cli::parse();
    let root = match &cli.dir {
        Some(d) => d.clone(),
        None => std::env::current_dir().wrap_err("failed to get current directory")?,
    };

    match cli.command {
        Command::Init { username, force } => cmd_init(&root, &username, force),
        Command::Setup => cmd_setup(&root),
        Command::Run => daemon::run(&root, started_at).await,
        Command::Clock { direction } => cmd_clock(&root, &direction).await,
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            // Respect RUST_LOG if provided, else default to info
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

fn cmd_init(root: &Path, username: &str, force: bool) -> Result<()> {
    let username = username.trim();
    if username.is_empty() {
        bail!("username must not be empty");
    }
    let path = config_path(root);
    if path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }

    let path = Config::new(username).save(root)?;
    println!("Config written: {}", path.display());
    println!("Next: run `autoclock setup` to store your password and bot token.");
    Ok(())
}

/// Prompt for whatever secrets are missing. Existing ones are left alone.
/// Input is read without echo.
fn cmd_setup(root: &Path) -> Result<()> {
    let config = Config::load(root)?;
    let store = FileSecretStore::in_root(root);

    let report = secrets::provision(&store, &config.username, |label| {
        rpassword::prompt_password(label)
    })?;

    if report.other_accounts {
        println!(
            "Note: passwords are stored for other usernames, but not for {}.",
            config.username
        );
    }
    match report.password {
        Provisioned::Found => println!("Password for {} found in secret store.", config.username),
        Provisioned::Stored => println!("Password stored in secret store."),
    }
    match report.bot_token {
        Provisioned::Found => println!("Bot token found in secret store."),
        Provisioned::Stored => println!("Bot token stored in secret store."),
    }

    println!("Secrets file: {}", store.path().display());
    println!("Start the bot with `autoclock run`, then send /start to it from your account.");
    Ok(())
}

async fn cmd_clock(root: &Path, direction: &str) -> Result<()> {
    let config = Arc::new(Config::load(root)?);
    let store: Arc<dyn SecretStore> = Arc::new(FileSecretStore::in_root(root));
    let launcher = Arc::new(WebDriverLauncher::new(&config.browser)?);
    let orchestrator = Orchestrator::new(launcher, store, config);

    match orchestrator.process(direction, &ConsoleNotifier).await {
        SessionEnd::Toggled(Ok(_)) => Ok(()),
        end => bail!("clocking session did not complete ({:?})", end.state()),
    }
}
