//! Axum HTTP handlers for the forwarder.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Form, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use tracing::{debug, error, info, warn};

use crate::{
    health::{self, HealthStatus},
    models::HealthResponse,
    point::build_point,
    AppState,
};

/// Header carrying the IANA zone the health timestamps should use.
pub const REQUESTED_TZ_HEADER: &str = "x-requested-tz";

/// Body of every ingestion response.
const OK_BODY: &str = "OK";

// ------------------------------------------------------------------ //
//  GET|POST /measurements                                             //
// ------------------------------------------------------------------ //

/// Station report sent as query parameters.
pub async fn receive_query(
    State(state): State<Arc<AppState>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    params: Option<Query<Vec<(String, String)>>>,
) -> &'static str {
    let params = params.map(|Query(p)| first_wins(p)).unwrap_or_default();
    forward(&state, peer, params).await
}

/// Station report sent as an urlencoded form body.
pub async fn receive_form(
    State(state): State<Arc<AppState>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    params: Option<Form<Vec<(String, String)>>>,
) -> &'static str {
    let params = params.map(|Form(p)| first_wins(p)).unwrap_or_default();
    forward(&state, peer, params).await
}

/// Collapse repeated keys, keeping the first value sent.
fn first_wins(pairs: Vec<(String, String)>) -> HashMap<String, String> {
    let mut params = HashMap::with_capacity(pairs.len());
    for (key, value) in pairs {
        params.entry(key).or_insert(value);
    }
    params
}

/// Build a point from the report and write it.
///
/// Always answers `OK`: stations retry aggressively on anything else, so
/// backend trouble is only logged.
async fn forward(
    state: &AppState,
    peer: Option<ConnectInfo<SocketAddr>>,
    params: HashMap<String, String>,
) -> &'static str {
    let peer = peer.map(|ConnectInfo(addr)| addr.to_string());
    info!(peer = peer.as_deref().unwrap_or("unknown"), "received measurement data");

    if params.is_empty() {
        warn!("received empty measurement data");
        return OK_BODY;
    }
    debug!(?params, "measurement data");

    let point = build_point(&params);
    match state.backend.write_point(&point).await {
        Ok(()) => info!(
            fields = point.fields.len(),
            tags = point.tags.len(),
            "wrote measurement"
        ),
        Err(e) => {
            let detail = format!("{e:#}");
            error!(error = %detail, "failed to write measurement");
        }
    }

    OK_BODY
}

// ------------------------------------------------------------------ //
//  GET /health                                                        //
// ------------------------------------------------------------------ //

pub async fn health_check(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let requested_tz = headers
        .get(REQUESTED_TZ_HEADER)
        .and_then(|v| v.to_str().ok());

    let report = health::compose(&state.process, requested_tz, state.backend.as_ref()).await;
    let code = match report.status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (code, Json(HealthResponse::from(report)))
}
