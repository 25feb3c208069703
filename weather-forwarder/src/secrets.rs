//! Credential lookup through Bitwarden Secrets Manager.
//!
//! When `BWS_ACCESS_TOKEN` is set, secrets such as the InfluxDB token are
//! fetched from Bitwarden by id. Without it, or when Bitwarden cannot serve
//! the secret, the plain environment variable is used instead, which is how
//! local development and CI run.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use tracing::warn;

const DEFAULT_BWS_API_URL: &str = "https://api.bitwarden.com";

pub struct SecretsClient {
    /// Machine-account access token, if Bitwarden is configured.
    access_token: Option<String>,
    api_url: String,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct BwsSecretResponse {
    value: String,
}

impl SecretsClient {
    pub fn from_env() -> Self {
        Self {
            access_token: std::env::var("BWS_ACCESS_TOKEN").ok(),
            api_url: std::env::var("BWS_API_URL")
                .unwrap_or_else(|_| DEFAULT_BWS_API_URL.to_string()),
            http: reqwest::Client::new(),
        }
    }

    /// Resolve a required secret.
    ///
    /// `id_var` names the env var holding the Bitwarden secret id;
    /// `env_fallback` names the env var holding the secret itself.
    pub async fn require(&self, id_var: &str, env_fallback: &str) -> Result<String> {
        if let Some(token) = &self.access_token {
            match std::env::var(id_var) {
                Ok(secret_id) => match self.fetch(token, &secret_id).await {
                    Ok(value) => return Ok(value),
                    Err(e) => warn!(
                        secret_id = %secret_id,
                        error = %e,
                        "Bitwarden lookup failed, falling back to {env_fallback}"
                    ),
                },
                Err(_) => warn!("{id_var} not set, falling back to {env_fallback}"),
            }
        }

        std::env::var(env_fallback)
            .ok()
            .filter(|v| !v.is_empty())
            .with_context(|| format!("{env_fallback} environment variable is required"))
    }

    async fn fetch(&self, token: &str, secret_id: &str) -> Result<String> {
        let url = format!("{}/secrets/{}", self.api_url, secret_id);
        let resp = self
            .http
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .context("HTTP request to Bitwarden Secrets Manager failed")?;

        if !resp.status().is_success() {
            return Err(anyhow!("Bitwarden API returned status {}", resp.status()));
        }

        let body: BwsSecretResponse = resp
            .json()
            .await
            .context("Failed to parse Bitwarden response")?;
        Ok(body.value)
    }
}
