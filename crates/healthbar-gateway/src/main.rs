//! healthbar-gateway - public entry point for the Health Bar services.
//!
//! Settings are layered: built-in defaults, then the optional TOML file given
//! with `--config`, then command-line flags and their environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use healthbar_core::logging::init_tracing;
use healthbar_gateway::rate_limit::spawn_sweeper;
use healthbar_gateway::{GatewayConfig, GatewayState, build_router};
use tokio::signal::unix::{SignalKind, signal};
use tracing::info;

/// Health Bar API gateway
#[derive(Parser, Debug)]
#[command(name = "healthbar-gateway")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen port
    #[arg(long, env = "PORT")]
    port: Option<u16>,

    /// Base URL of the auth service
    #[arg(long, env = "AUTH_SERVICE_URL")]
    auth_service_url: Option<String>,

    /// Base URL of the patient service
    #[arg(long, env = "PATIENT_SERVICE_URL")]
    patient_service_url: Option<String>,

    /// Base URL of the doctor service
    #[arg(long, env = "DOCTOR_SERVICE_URL")]
    doctor_service_url: Option<String>,

    /// Base URL of the timeline service
    #[arg(long, env = "TIMELINE_SERVICE_URL")]
    timeline_service_url: Option<String>,

    /// Base URL of the prescription service
    #[arg(long, env = "PRESCRIPTION_SERVICE_URL")]
    prescription_service_url: Option<String>,

    /// Token refill rate per client, in requests per second
    #[arg(long, env = "RATE_LIMIT_RPS")]
    rate_limit_rps: Option<f64>,

    /// Token bucket capacity per client
    #[arg(long, env = "RATE_LIMIT_BURST")]
    rate_limit_burst: Option<u32>,

    /// Seconds between sweeps of idle rate limit buckets
    #[arg(long, env = "RATE_LIMIT_SWEEP_SECS")]
    rate_limit_sweep_secs: Option<u64>,

    /// Seconds to wait for a backend's response headers
    #[arg(long, env = "UPSTREAM_TIMEOUT_SECS")]
    upstream_timeout_secs: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log to file instead of stdout
    #[arg(long)]
    log_file: Option<PathBuf>,
}

impl Args {
    fn gateway_config(&self) -> Result<GatewayConfig> {
        let mut config = match &self.config {
            Some(path) => GatewayConfig::from_file(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => GatewayConfig::default(),
        };
        if let Some(port) = self.port {
            config.port = port;
        }

        let backends = &mut config.backends;
        for (target, value) in [
            (&mut backends.auth, &self.auth_service_url),
            (&mut backends.patient, &self.patient_service_url),
            (&mut backends.doctor, &self.doctor_service_url),
            (&mut backends.timeline, &self.timeline_service_url),
            (&mut backends.prescription, &self.prescription_service_url),
        ] {
            if let Some(url) = value {
                target.clone_from(url);
            }
        }

        if let Some(rps) = self.rate_limit_rps {
            config.rate_limit.requests_per_second = rps;
        }
        if let Some(burst) = self.rate_limit_burst {
            config.rate_limit.burst = burst;
        }
        if let Some(secs) = self.rate_limit_sweep_secs {
            config.rate_limit.sweep_interval_secs = secs;
        }
        if self.upstream_timeout_secs.is_some() {
            config.upstream_timeout_secs = self.upstream_timeout_secs;
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

    let config = args.gateway_config()?;
    let port = config.port;
    let sweep_interval = config.rate_limit.sweep_interval();

    let state = GatewayState::new(config).context("failed to register metrics")?;
    for route in state.routes.iter() {
        info!(service = route.name, prefix = route.prefix, upstream = %route.upstream, "route");
    }
    let sweeper = spawn_sweeper(state.limiter.clone(), sweep_interval);
    let router = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    let mut sigterm = signal(SignalKind::terminate()).context("failed to register SIGTERM")?;
    let mut sigint = signal(SignalKind::interrupt()).context("failed to register SIGINT")?;

    info!(addr = %addr, "gateway listening");

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

    sweeper.abort();
    info!("gateway stopped");
    Ok(())
}
