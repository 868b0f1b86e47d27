//! auth-api-cli
//!
//! Command-line front end for the authenticated API client:
//! 1. Loads configuration and the persisted session
//! 2. Runs one command (login, register, logout, whoami, request)
//! 3. Expired credentials are refreshed and the request replayed transparently
//! 4. A failed refresh logs the session out and prints a notice

mod cli;
mod config;
mod metrics;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use auth_client::{ApiClient, AuthEvent, LogoutReason};
use auth_session::{FileStore, SessionStore};
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transport::{ApiRequest, ReqwestTransport};

use crate::cli::Command;
use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs on stderr with LOG_LEVEL / RUST_LOG support; stdout carries results
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let invocation = cli::parse(&args)?;

    let prometheus = if invocation.metrics {
        Some(metrics::install_recorder()?)
    } else {
        None
    };

    let (config_path, explicit) = Config::resolve_path(invocation.config.as_deref());
    let config = Config::load_or_default(&config_path, explicit)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    info!(
        base_url = %config.api.base_url,
        storage_dir = %config.storage.dir.display(),
        auto_refresh = config.auth.auto_refresh,
        "configuration loaded"
    );

    let client = build_client(&config).await?;
    let mut events = client.subscribe();

    let result = run(&client, invocation.command).await;

    for notice in drain_notices(&mut events) {
        eprintln!("{notice}");
    }
    if let Some(handle) = prometheus {
        eprint!("{}", handle.render());
    }

    println!("{}", result?);
    Ok(())
}

async fn build_client(config: &Config) -> Result<ApiClient> {
    let transport = ReqwestTransport::new(config.api.base_url.clone())?
        .timeout(Duration::from_secs(config.api.timeout_secs));
    let storage = FileStore::open(&config.storage.dir).await.with_context(|| {
        format!(
            "failed to open session storage at {}",
            config.storage.dir.display()
        )
    })?;
    let session = SessionStore::load(Arc::new(storage), config.storage.key.clone()).await;
    Ok(ApiClient::new(
        Arc::new(transport),
        Arc::new(session),
        config.client_options(),
    ))
}

/// Run one command and return what to print on stdout.
async fn run(client: &ApiClient, command: Command) -> Result<String> {
    match command {
        Command::Login { email } => {
            let password = std::env::var("AUTH_PASSWORD")
                .context("AUTH_PASSWORD must be set for login")?;
            let user = client.login(&email, &password).await?;
            Ok(serde_json::to_string_pretty(&user)?)
        }
        Command::Register { body } => {
            let user = client.register(&body).await?;
            Ok(serde_json::to_string_pretty(&user)?)
        }
        Command::Logout => {
            client.logout().await;
            Ok("logged out".to_string())
        }
        Command::Whoami => {
            let session = client.session().get();
            match session.identity() {
                Some(identity) if session.is_authenticated() => {
                    Ok(serde_json::to_string_pretty(identity)?)
                }
                _ => Ok("not logged in".to_string()),
            }
        }
        Command::Request { method, path, body } => {
            let mut request = ApiRequest::new(method, path);
            if let Some(body) = body {
                request = request.json(&body)?;
            }
            let response = client.dispatch(request).await?;
            let status = response.status();
            let text = match response.json::<serde_json::Value>() {
                Ok(json) => serde_json::to_string_pretty(&json)?,
                Err(_) => response.text(),
            };
            if !status.is_success() {
                bail!("request failed with status {status}: {text}");
            }
            Ok(text)
        }
    }
}

/// User-facing notices for session events received while the command ran.
fn drain_notices(events: &mut broadcast::Receiver<AuthEvent>) -> Vec<String> {
    let mut notices = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let AuthEvent::LoggedOut {
            reason: LogoutReason::RefreshFailed(message),
        } = event
        {
            notices.push(format!(
                "session expired and could not be renewed ({message}); log in again"
            ));
        }
    }
    notices
}
