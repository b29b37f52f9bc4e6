//! healthbar-service - runs one Health Bar backend service.
//!
//! Settings are layered: built-in defaults, then the optional TOML file given
//! with `--config`, then command-line flags and their environment variables.
//! `JWT_SECRET` must be provided through the flag or the environment.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use healthbar_core::blob::BlobStore;
use healthbar_core::config::ServiceConfig;
use healthbar_core::logging::init_tracing;
use healthbar_core::store::Database;
use healthbar_services::{ServiceKind, ServiceState, app};
use secrecy::SecretString;
use tokio::signal::unix::{SignalKind, signal};
use tracing::info;

/// Health Bar backend service
#[derive(Parser, Debug)]
#[command(name = "healthbar-service")]
#[command(version, about, long_about = None)]
struct Args {
    /// Which service to run
    #[arg(value_enum)]
    service: ServiceKind,

    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen port (defaults to the service's well-known port)
    #[arg(long, env = "PORT")]
    port: Option<u16>,

    /// `SQLite` database file shared by all services
    #[arg(long, env = "DB_PATH")]
    db_path: Option<PathBuf>,

    /// Directory for uploaded prescription files
    #[arg(long, env = "UPLOAD_PATH")]
    upload_path: Option<PathBuf>,

    /// Secret used to sign and verify bearer tokens
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    jwt_secret: Option<String>,

    /// Bearer token lifetime in seconds
    #[arg(long, env = "TOKEN_TTL_SECS")]
    token_ttl_secs: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log to file instead of stdout
    #[arg(long)]
    log_file: Option<PathBuf>,
}

impl Args {
    fn service_config(&self) -> Result<ServiceConfig> {
        let mut config = match &self.config {
            Some(path) => ServiceConfig::from_file(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => ServiceConfig::default(),
        };
        if let Some(port) = self.port {
            config.port = Some(port);
        }
        if let Some(db_path) = &self.db_path {
            config.db_path.clone_from(db_path);
        }
        if let Some(upload_path) = &self.upload_path {
            config.upload_path.clone_from(upload_path);
        }
        if let Some(ttl) = self.token_ttl_secs {
            config.token_ttl_secs = ttl;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level, args.log_file.as_deref())
        .context("failed to initialize logging")?;

    let config = args.service_config()?;
    let Some(secret) = args.jwt_secret.clone().filter(|s| !s.is_empty()) else {
        bail!("JWT_SECRET must be set");
    };
    let secret = SecretString::from(secret);

    let db = Database::open(&config.db_path)
        .with_context(|| format!("failed to open database {}", config.db_path.display()))?;

    let blobs = BlobStore::new(&config.upload_path);
    if args.service == ServiceKind::Prescription {
        blobs.ensure_root().await.with_context(|| {
            format!(
                "failed to create upload directory {}",
                config.upload_path.display()
            )
        })?;
    }

    let state = ServiceState::new(
        &db,
        &secret,
        Duration::from_secs(config.token_ttl_secs),
        blobs,
    )
    .context("failed to initialize credentials")?;
    let router = app(args.service, state);

    let port = config.port.unwrap_or_else(|| args.service.default_port());
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    let mut sigterm = signal(SignalKind::terminate()).context("failed to register SIGTERM")?;
    let mut sigint = signal(SignalKind::interrupt()).context("failed to register SIGINT")?;

    info!(
        service = args.service.name(),
        addr = %addr,
        db = %config.db_path.display(),
        "service listening"
    );

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT"),
        }
    })
    .await
    .context("server error")?;

    info!(service = args.service.name(), "service stopped");
    Ok(())
}
