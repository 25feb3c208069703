//! Weather-station to InfluxDB forwarder.
//!
//! Stations report readings as flat key/value parameters. Each report is
//! turned into one point in the `weather` measurement and written straight
//! through to InfluxDB. `/health` reports whether the database answers and
//! when the newest point was stored.

pub mod backend;
pub mod config;
pub mod handlers;
pub mod health;
pub mod line_protocol;
pub mod models;
pub mod point;
pub mod secrets;

use std::sync::Arc;

use axum::{routing::get, Router};
use chrono::{DateTime, Utc};
use tower_http::trace::TraceLayer;

use crate::backend::TimeseriesBackend;

// ------------------------------------------------------------------ //
//  Shared application state                                           //
// ------------------------------------------------------------------ //

/// Facts about this process fixed at startup.
#[derive(Debug, Clone, Copy)]
pub struct ProcessState {
    pub start_time: DateTime<Utc>,
}

impl ProcessState {
    /// Capture the current instant as the start time.
    pub fn now() -> Self {
        Self {
            start_time: Utc::now(),
        }
    }
}

/// Shared state injected into every Axum handler via `State`.
pub struct AppState {
    pub process: ProcessState,
    pub backend: Arc<dyn TimeseriesBackend>,
}

/// Build the HTTP router for the given state.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/measurements",
            get(handlers::receive_query).post(handlers::receive_form),
        )
        .route(
            "/measurements/",
            get(handlers::receive_query).post(handlers::receive_form),
        )
        .route("/health", get(handlers::health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
