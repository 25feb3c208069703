//! Time-series backend trait and implementations.

use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use influxdb2::api::query::FluxRecord;
use influxdb2::models::health::Status;
use influxdb2::models::Query;
use influxdb2_structmap::value::Value;
use tokio::time::timeout;

use crate::line_protocol::to_line_protocol;
use crate::point::Point;

// ------------------------------------------------------------------ //
//  Trait                                                              //
// ------------------------------------------------------------------ //

/// The operations this service needs from the time-series database.
#[async_trait]
pub trait TimeseriesBackend: Send + Sync {
    /// Write a single point and wait for the backend to acknowledge it.
    async fn write_point(&self, point: &Point) -> Result<()>;

    /// Timestamp of the newest point in `measurement` within `window`.
    async fn latest_point_time(
        &self,
        measurement: &str,
        window: Duration,
    ) -> Result<Option<DateTime<Utc>>>;

    /// Lightweight liveness check.
    async fn ping(&self) -> Result<()>;
}

// ------------------------------------------------------------------ //
//  InfluxBackend (production)                                         //
// ------------------------------------------------------------------ //

/// InfluxDB 2.x backend via the `influxdb2` client.
pub struct InfluxBackend {
    client: influxdb2::Client,
    org: String,
    bucket: String,
    /// Upper bound on every call to the database.
    timeout: StdDuration,
}

impl InfluxBackend {
    pub fn connect(
        url: &str,
        token: &str,
        org: &str,
        bucket: &str,
        timeout: StdDuration,
    ) -> Self {
        Self {
            client: influxdb2::Client::new(url, org, token),
            org: org.to_string(),
            bucket: bucket.to_string(),
            timeout,
        }
    }

    fn latest_point_flux(&self, measurement: &str, window: Duration) -> String {
        format!(
            r#"from(bucket: "{}")
  |> range(start: -{}s)
  |> filter(fn: (r) => r._measurement == "{}")
  |> group()
  |> sort(columns: ["_time"], desc: true)
  |> limit(n: 1)"#,
            self.bucket,
            window.num_seconds(),
            measurement
        )
    }
}

/// Extract the `_time` column of a Flux record as UTC.
fn record_time(record: &FluxRecord) -> Option<DateTime<Utc>> {
    match record.values.get("_time") {
        Some(Value::TimeRFC(t)) => Some(t.with_timezone(&Utc)),
        _ => None,
    }
}

#[async_trait]
impl TimeseriesBackend for InfluxBackend {
    async fn write_point(&self, point: &Point) -> Result<()> {
        let line = to_line_protocol(point)?;

        timeout(
            self.timeout,
            self.client.write_line_protocol(&self.org, &self.bucket, line),
        )
        .await
        .context("InfluxDB write timed out")?
        .context("InfluxDB write failed")
    }

    async fn latest_point_time(
        &self,
        measurement: &str,
        window: Duration,
    ) -> Result<Option<DateTime<Utc>>> {
        let query = Query::new(self.latest_point_flux(measurement, window));

        let records = timeout(self.timeout, self.client.query_raw(Some(query)))
            .await
            .context("InfluxDB query timed out")?
            .context("InfluxDB query failed")?;

        Ok(records.iter().filter_map(record_time).max())
    }

    async fn ping(&self) -> Result<()> {
        let health = timeout(self.timeout, self.client.health())
            .await
            .context("InfluxDB health check timed out")?
            .context("InfluxDB health check failed")?;

        match health.status {
            Status::Pass => Ok(()),
            status => bail!(
                "InfluxDB reported status {:?}: {}",
                status,
                health.message.unwrap_or_default()
            ),
        }
    }
}

// ------------------------------------------------------------------ //
//  FakeBackend (for tests)                                            //
// ------------------------------------------------------------------ //

/// In-memory backend that records written points for test assertions.
///
/// A successful write stamps the point with `Utc::now()`, which then shows up
/// as the latest point time, the way the real database assigns write times.
#[derive(Debug, Default, Clone)]
pub struct FakeBackend {
    pub points: Arc<Mutex<Vec<Point>>>,
    /// Line protocol of every accepted write, as the database would see it.
    pub lines: Arc<Mutex<Vec<String>>>,
    latest: Arc<Mutex<Option<DateTime<Utc>>>>,
    write_error: Option<String>,
    query_error: Option<String>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend a point was already stored at `at`.
    pub fn with_latest(self, at: DateTime<Utc>) -> Self {
        *self.latest.lock().unwrap() = Some(at);
        self
    }

    /// Make every write fail with `msg`.
    pub fn failing_writes(mut self, msg: &str) -> Self {
        self.write_error = Some(msg.to_string());
        self
    }

    /// Make every query and ping fail with `msg`.
    pub fn failing_queries(mut self, msg: &str) -> Self {
        self.query_error = Some(msg.to_string());
        self
    }

    /// Consume all points written so far (drains the buffer).
    pub fn drain(&self) -> Vec<Point> {
        self.points.lock().unwrap().drain(..).collect()
    }

    /// Non-destructive snapshot of currently collected points.
    pub fn snapshot(&self) -> Vec<Point> {
        self.points.lock().unwrap().clone()
    }

    /// Non-destructive snapshot of the encoded lines.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }
}

#[async_trait]
impl TimeseriesBackend for FakeBackend {
    async fn write_point(&self, point: &Point) -> Result<()> {
        if let Some(msg) = &self.write_error {
            return Err(anyhow!(msg.clone()));
        }
        let line = to_line_protocol(point)?;
        self.lines.lock().unwrap().push(line);
        self.points.lock().unwrap().push(point.clone());
        *self.latest.lock().unwrap() = Some(Utc::now());
        Ok(())
    }

    async fn latest_point_time(
        &self,
        _measurement: &str,
        window: Duration,
    ) -> Result<Option<DateTime<Utc>>> {
        if let Some(msg) = &self.query_error {
            return Err(anyhow!(msg.clone()));
        }
        let cutoff = Utc::now() - window;
        let latest = *self.latest.lock().unwrap();
        Ok(latest.filter(|t| *t >= cutoff))
    }

    async fn ping(&self) -> Result<()> {
        match &self.query_error {
            Some(msg) => Err(anyhow!(msg.clone())),
            None => Ok(()),
        }
    }
}

// ------------------------------------------------------------------ //
//  Tests                                                              //
// ------------------------------------------------------------------ //

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn sample_point() -> Point {
        let mut p = Point::new();
        p.fields.insert("tempf".into(), 74.3);
        p
    }

    #[test]
    fn flux_targets_bucket_measurement_and_window() {
        let backend = InfluxBackend::connect(
            "http://localhost:8086",
            "token",
            "org",
            "ws-5000",
            StdDuration::from_secs(5),
        );
        let flux = backend.latest_point_flux("weather", Duration::days(30));
        assert!(flux.contains(r#"from(bucket: "ws-5000")"#));
        assert!(flux.contains("range(start: -2592000s)"));
        assert!(flux.contains(r#"r._measurement == "weather""#));
        assert!(flux.contains("limit(n: 1)"));
    }

    #[test]
    fn record_time_reads_time_column() {
        let at = DateTime::parse_from_rfc3339("2025-06-28T15:30:00+02:00").unwrap();
        let mut values = BTreeMap::new();
        values.insert("_time".to_string(), Value::TimeRFC(at));
        let record = FluxRecord { table: 0, values };
        assert_eq!(record_time(&record), Some(at.with_timezone(&Utc)));

        let empty = FluxRecord {
            table: 0,
            values: BTreeMap::new(),
        };
        assert_eq!(record_time(&empty), None);
    }

    /// Accept connections and never answer, holding sockets open.
    async fn silent_server() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn influx_calls_time_out_against_silent_server() {
        let url = silent_server().await;
        let backend =
            InfluxBackend::connect(&url, "token", "org", "ws-5000", StdDuration::from_secs(1));

        let started = std::time::Instant::now();
        let err = backend.write_point(&sample_point()).await.unwrap_err();
        assert_eq!(err.to_string(), "InfluxDB write timed out");

        let err = backend
            .latest_point_time("weather", Duration::days(30))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "InfluxDB query timed out");

        let err = backend.ping().await.unwrap_err();
        assert_eq!(err.to_string(), "InfluxDB health check timed out");

        assert!(started.elapsed() < StdDuration::from_secs(10));
    }

    #[tokio::test]
    async fn fake_stores_filtered_line() {
        let fake = FakeBackend::new();
        let mut p = sample_point();
        p.fields.insert("soilmoisture".into(), f64::NAN);
        p.tags.insert("mac".into(), String::new());

        fake.write_point(&p).await.unwrap();
        assert_eq!(fake.lines(), vec!["weather tempf=74.3".to_string()]);
    }

    #[tokio::test]
    async fn fake_records_writes_and_latest_time() {
        let fake = FakeBackend::new();
        assert_eq!(
            fake.latest_point_time("weather", Duration::days(30)).await.unwrap(),
            None
        );

        fake.write_point(&sample_point()).await.unwrap();
        assert_eq!(fake.snapshot().len(), 1);
        assert!(fake
            .latest_point_time("weather", Duration::days(30))
            .await
            .unwrap()
            .is_some());
        assert_eq!(fake.drain().len(), 1);
        assert!(fake.snapshot().is_empty());
    }

    #[tokio::test]
    async fn fake_ignores_points_outside_window() {
        let fake = FakeBackend::new().with_latest(Utc::now() - Duration::days(45));
        assert_eq!(
            fake.latest_point_time("weather", Duration::days(30)).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn fake_rejects_points_without_fields() {
        let fake = FakeBackend::new();
        assert!(fake.write_point(&Point::new()).await.is_err());
        assert!(fake.snapshot().is_empty());
    }

    #[tokio::test]
    async fn fake_failures_are_reported() {
        let fake = FakeBackend::new()
            .failing_writes("write refused")
            .failing_queries("connection refused");
        let err = fake.write_point(&sample_point()).await.unwrap_err();
        assert_eq!(err.to_string(), "write refused");
        assert!(fake.latest_point_time("weather", Duration::days(1)).await.is_err());
        assert!(fake.ping().await.is_err());
    }
}
