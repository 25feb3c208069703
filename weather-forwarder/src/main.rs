//! Weather forwarder entry point.
//!
//! Listens on `FORWARDER_ADDR` (default `0.0.0.0:8000`) and forwards station
//! reports to InfluxDB. See [`weather_forwarder::config`] for the full list
//! of environment variables.
//!
//! Log verbosity follows `RUST_LOG` when set, otherwise `LOG_LEVEL`
//! (default `info`).

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use weather_forwarder::backend::{InfluxBackend, TimeseriesBackend};
use weather_forwarder::config::Config;
use weather_forwarder::{router, AppState, ProcessState};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    init_tracing()?;

    let process = ProcessState::now();
    info!(started_at = %process.start_time.to_rfc3339(), "weather-forwarder starting");

    let cfg = Config::load().await?;
    cfg.log_config();

    let backend = InfluxBackend::connect(
        &cfg.influx_url,
        &cfg.influx_token,
        &cfg.influx_org,
        &cfg.influx_bucket,
        cfg.influx_timeout,
    );

    match backend.ping().await {
        Ok(()) => info!(url = %cfg.influx_url, "InfluxDB reachable"),
        Err(e) => warn!(url = %cfg.influx_url, error = %e, "InfluxDB not reachable at startup"),
    }

    let state = Arc::new(AppState {
        process,
        backend: Arc::new(backend),
    });
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(cfg.listen_addr).await?;
    info!(addr = %cfg.listen_addr, "weather-forwarder listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("weather-forwarder stopped");
    Ok(())
}

fn init_tracing() -> Result<()> {
    let filter = match std::env::var("RUST_LOG") {
        Ok(_) => EnvFilter::from_default_env(),
        Err(_) => {
            let level = std::env::var("LOG_LEVEL")
                .unwrap_or_else(|_| "info".to_string())
                .to_lowercase();
            let level = match level.as_str() {
                "warning" => "warn",
                "critical" | "fatal" => "error",
                other => other,
            };
            EnvFilter::try_new(level)?
        }
    };

    tracing_subscriber::fmt().with_env_filter(filter).json().init();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
