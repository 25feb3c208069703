//! Runtime configuration for the forwarder.
//!
//! All values come from environment variables (optionally via `.env`).
//! Credentials go through [`SecretsClient`] so they can live in Bitwarden.
//!
//! | Env var               | Default                 |
//! |-----------------------|-------------------------|
//! | `INFLUX_URL`          | `http://localhost:8086` |
//! | `INFLUX_TOKEN`        | required                |
//! | `INFLUX_ORG`          | required                |
//! | `INFLUX_BUCKET`       | `ws-5000`               |
//! | `INFLUX_TIMEOUT_SECS` | `30`                    |
//! | `FORWARDER_ADDR`      | `0.0.0.0:8000`          |

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tracing::info;

use crate::secrets::SecretsClient;

const DEFAULT_INFLUX_URL: &str = "http://localhost:8086";
const DEFAULT_INFLUX_BUCKET: &str = "ws-5000";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8000";

#[derive(Debug, Clone)]
pub struct Config {
    pub influx_url: String,
    pub influx_token: String,
    pub influx_org: String,
    pub influx_bucket: String,
    /// Bound on each write, query and health check.
    pub influx_timeout: Duration,
    pub listen_addr: SocketAddr,
}

impl Config {
    /// Load configuration, resolving credentials through Bitwarden or env.
    ///
    /// Fails when the token or org is missing, or a value does not parse.
    pub async fn load() -> Result<Self> {
        let secrets = SecretsClient::from_env();
        let token = secrets.require("BWS_INFLUX_TOKEN_ID", "INFLUX_TOKEN").await?;
        let org = secrets.require("BWS_INFLUX_ORG_ID", "INFLUX_ORG").await?;

        Self::from_lookup(token, org, |key| std::env::var(key).ok())
    }

    /// Assemble the non-secret settings from `lookup`.
    pub fn from_lookup<F>(influx_token: String, influx_org: String, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let timeout_secs: u64 = parse_or(&lookup, "INFLUX_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?;

        Ok(Self {
            influx_url: lookup("INFLUX_URL").unwrap_or_else(|| DEFAULT_INFLUX_URL.to_string()),
            influx_token,
            influx_org,
            influx_bucket: lookup("INFLUX_BUCKET")
                .unwrap_or_else(|| DEFAULT_INFLUX_BUCKET.to_string()),
            influx_timeout: Duration::from_secs(timeout_secs),
            listen_addr: parse_or(&lookup, "FORWARDER_ADDR", DEFAULT_LISTEN_ADDR.parse()?)?,
        })
    }

    /// Log the loaded configuration without the token.
    pub fn log_config(&self) {
        info!(
            influx_url = %self.influx_url,
            influx_org = %self.influx_org,
            influx_bucket = %self.influx_bucket,
            influx_timeout_secs = self.influx_timeout.as_secs(),
            listen_addr = %self.listen_addr,
            "configuration loaded"
        );
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("Invalid {key} '{raw}': {e}")),
        None => Ok(default),
    }
}
