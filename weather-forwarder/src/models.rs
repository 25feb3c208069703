//! HTTP response models for the forwarder's public API.

use serde::Serialize;

use crate::health::{HealthReport, HealthStatus};

/// Body returned by `GET /health`.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub influxdb_connected: bool,
    pub last_measurement_rfc3339: Option<String>,
    pub started_on_rfc3339: String,
    /// IANA name of the zone the timestamps are rendered in.
    pub timezone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<HealthReport> for HealthResponse {
    fn from(report: HealthReport) -> Self {
        Self {
            status: report.status,
            influxdb_connected: report.backend_connected,
            last_measurement_rfc3339: report.last_measurement.map(|t| t.to_rfc3339()),
            started_on_rfc3339: report.started_on.to_rfc3339(),
            timezone: report.timezone.name().to_string(),
            error: report.error,
        }
    }
}
