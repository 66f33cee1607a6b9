//! Command execution
//!
//! `App` wires the session store, session manager and ERP client from the
//! loaded config. Each command returns the text to print on stdout; logs go
//! to stderr.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use freightmaster_auth::{FileSessionStore, SessionEvent, SessionEvents, SessionManager, SessionStore};
use freightmaster_client::{AuthenticatedClient, ErpClient, ListResource};
use tracing::{info, warn};

use crate::callback_server::{self, RedirectTarget};
use crate::cli::{Command, ListTarget, USAGE};
use crate::config::Config;
use crate::error::Error;

pub struct App {
    config: Config,
    session_path: PathBuf,
    session: Arc<SessionManager>,
    erp: ErpClient,
}

impl App {
    /// Load the session file and build the clients.
    pub async fn open(config: Config) -> Result<Self> {
        let path = config.session_path()?;
        let store = FileSessionStore::load(path.clone())
            .await
            .with_context(|| format!("failed to open session file {}", path.display()))?;
        let session_path = store.path().to_path_buf();
        Self::with_store(config, session_path, Arc::new(store))
    }

    pub fn with_store(
        config: Config,
        session_path: PathBuf,
        store: Arc<dyn SessionStore>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("freightmaster/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;
        let session = Arc::new(SessionManager::new(http.clone(), config.oauth.clone(), store));
        let erp = ErpClient::new(
            AuthenticatedClient::new(http, session.clone()),
            config.api.base_url.clone(),
        );
        Ok(Self {
            config,
            session_path,
            session,
            erp,
        })
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub async fn run(&self, command: Command) -> Result<String> {
        match command {
            Command::Help => Ok(USAGE.to_string()),
            Command::Login => self.login().await,
            Command::Logout => {
                self.session.logout().await?;
                Ok("Signed out.".into())
            }
            Command::Whoami => self.whoami().await,
            Command::Status => self.status().await,
            Command::Dashboard => pretty(&self.erp.dashboard().await?),
            Command::Get { path } => pretty(&self.erp.get(&path).await?),
            Command::List {
                target,
                search,
                filters,
            } => match target {
                ListTarget::Documents(ListResource::ShipmentManifests) => pretty(
                    &self
                        .erp
                        .shipment_manifests(search.as_deref(), &filters)
                        .await?,
                ),
                ListTarget::Documents(resource) => {
                    pretty(&self.erp.list(resource, search.as_deref()).await?)
                }
                ListTarget::Reference(resource) => pretty(&self.erp.lookup(resource).await?),
            },
            Command::PrintVehicleLog { name, output } => {
                let pdf = self.erp.print_vehicle_log(&name).await?;
                tokio::fs::write(&output, &pdf)
                    .await
                    .with_context(|| format!("failed to write {}", output.display()))?;
                info!(name = %name, path = %output.display(), "saved vehicle log PDF");
                Ok(format!("Saved {name} to {} ({} bytes).", output.display(), pdf.len()))
            }
        }
    }

    async fn login(&self) -> Result<String> {
        let target = RedirectTarget::from_redirect_uri(&self.config.oauth.redirect_uri)?;
        let (router, outcome) = callback_server::build_callback_router(self.session.clone(), &target.path);
        let listener = callback_server::serve(&target, router)
            .await
            .with_context(|| format!("failed to listen on {}:{}", target.addr.0, target.addr.1))?;
        info!(addr = %listener.addr, path = %target.path, "waiting for login redirect");

        let request = self.session.begin_login().await?;
        eprintln!("Sign in with your browser. If it does not open, visit:\n\n  {}\n", request.url);
        if let Err(e) = open::that(&request.url) {
            warn!(error = %e, "could not open a browser");
        }

        let timeout = self.config.login_timeout();
        let result = tokio::select! {
            waited = tokio::time::timeout(timeout, outcome) => match waited {
                Ok(Ok(outcome)) => outcome.map_err(anyhow::Error::from),
                Ok(Err(_)) => Err(anyhow!("callback listener stopped before a redirect arrived")),
                Err(_) => Err(Error::LoginTimedOut(timeout.as_secs()).into()),
            },
            Ok(()) = tokio::signal::ctrl_c() => Err(Error::LoginCancelled.into()),
        };
        listener.shutdown().await;
        result?;

        let name = self
            .session
            .display_claims()
            .await?
            .and_then(|claims| claims.display_name().map(str::to_string));
        info!("login complete");
        Ok(match name {
            Some(name) => format!("Signed in as {name}."),
            None => "Signed in.".into(),
        })
    }

    async fn whoami(&self) -> Result<String> {
        if !self.session.is_authenticated().await? {
            return Ok("Not signed in.".into());
        }
        let Some(claims) = self.session.display_claims().await? else {
            return Ok("Signed in (no identity token).".into());
        };
        let mut out = format!(
            "{}  {}",
            claims.initials(),
            claims.display_name().unwrap_or("(unknown)")
        );
        if let Some(email) = claims.email.as_deref().filter(|e| Some(*e) != claims.display_name()) {
            out.push_str(&format!("\n    {email}"));
        }
        Ok(out)
    }

    async fn status(&self) -> Result<String> {
        let state = if self.session.is_authenticated().await? {
            "signed in"
        } else {
            "signed out"
        };
        Ok(format!(
            "session:      {state}\nsession file: {}\napi:          {}\nprovider:     {}",
            self.session_path.display(),
            self.config.api.base_url,
            self.config.oauth.authorize_url,
        ))
    }
}

/// Log session lifecycle changes for the lifetime of the process.
pub fn spawn_event_reporter(events: &SessionEvents) -> tokio::task::JoinHandle<()> {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            match event {
                SessionEvent::Authenticated => info!("session established"),
                SessionEvent::Expired => {
                    warn!("session expired, run `freightmaster login` to sign in again")
                }
                SessionEvent::LoggedOut => info!("session cleared"),
            }
        }
    })
}

fn pretty<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).context("failed to format response")
}
