//! Health report composition.
//!
//! A report folds the immutable process start time together with a live
//! query for the newest stored point. Both timestamps are rendered in the
//! timezone the caller asked for, falling back to UTC when the name is not a
//! known IANA zone.

use chrono::{DateTime, Duration};
use chrono_tz::Tz;
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::backend::TimeseriesBackend;
use crate::point::MEASUREMENT;
use crate::ProcessState;

/// How far back to look for the newest point.
pub const LATEST_POINT_WINDOW_DAYS: i64 = 30;

// ------------------------------------------------------------------ //
//  Types                                                              //
// ------------------------------------------------------------------ //

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

impl HealthStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Unhealthy => "unhealthy",
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub backend_connected: bool,
    /// Absent when nothing was stored inside the window or the query failed.
    pub last_measurement: Option<DateTime<Tz>>,
    pub started_on: DateTime<Tz>,
    /// Zone actually used for rendering.
    pub timezone: Tz,
    pub error: Option<String>,
}

// ------------------------------------------------------------------ //
//  Composition                                                        //
// ------------------------------------------------------------------ //

/// Resolve a caller-supplied zone name, falling back to UTC.
pub fn resolve_timezone(requested: Option<&str>) -> Tz {
    let name = match requested.map(str::trim) {
        None | Some("") => return Tz::UTC,
        Some(name) if name.eq_ignore_ascii_case("utc") => return Tz::UTC,
        Some(name) => name,
    };

    match name.parse::<Tz>() {
        Ok(tz) => tz,
        Err(e) => {
            warn!(requested = name, error = %e, "unknown timezone, falling back to UTC");
            Tz::UTC
        }
    }
}

/// Build a health report from process state and a live backend query.
///
/// Backend failures never escape; they turn the report unhealthy.
pub async fn compose(
    process: &ProcessState,
    requested_tz: Option<&str>,
    backend: &dyn TimeseriesBackend,
) -> HealthReport {
    let tz = resolve_timezone(requested_tz);
    let started_on = process.start_time.with_timezone(&tz);

    let window = Duration::days(LATEST_POINT_WINDOW_DAYS);
    match backend.latest_point_time(MEASUREMENT, window).await {
        Ok(latest) => {
            debug!(?latest, "latest point lookup succeeded");
            HealthReport {
                status: HealthStatus::Healthy,
                backend_connected: true,
                last_measurement: latest.map(|t| t.with_timezone(&tz)),
                started_on,
                timezone: tz,
                error: None,
            }
        }
        Err(e) => {
            let detail = format!("{e:#}");
            error!(error = %detail, "health query failed");
            HealthReport {
                status: HealthStatus::Unhealthy,
                backend_connected: false,
                last_measurement: None,
                started_on,
                timezone: tz,
                error: Some(detail),
            }
        }
    }
}

// ------------------------------------------------------------------ //
//  Tests                                                              //
// ------------------------------------------------------------------ //
