//! FreightMaster command-line client
//!
//! Signs in to the Frappe ERP with the PKCE authorization-code flow, keeps the
//! session in a local file, and fetches ERP data through the authenticated
//! request wrapper:
//! 1. `login` opens the browser and serves the redirect URI on loopback
//! 2. Data commands attach the stored bearer token and refresh it once on 401
//! 3. An unrecoverable 401 clears the session and asks for a new login

mod callback_server;
mod cli;
mod commands;
mod config;
mod error;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Command};
use crate::commands::App;
use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse(std::env::args().skip(1))?;
    if cli.command == Command::Help {
        println!("{}", cli::USAGE);
        return Ok(());
    }

    let config_path = Config::resolve_path(cli.config_path.as_deref());
    info!(path = %config_path.display(), "loading configuration");
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    info!(
        api = %config.api.base_url,
        client_id = %config.oauth.client_id,
        "configuration loaded"
    );

    let app = App::open(config).await?;
    let _events = commands::spawn_event_reporter(app.session().events());

    let output = app.run(cli.command).await?;
    println!("{output}");
    Ok(())
}

/// Logs go to stderr so command output on stdout stays pipeable.
///
/// Filter from `LOG_LEVEL` or `RUST_LOG` (default `info`); `LOG_FORMAT=json`
/// switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_env("LOG_LEVEL")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}
