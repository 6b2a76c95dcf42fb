//! API client for the metrics aggregator

use anyhow::{Context, Result};
use metrics_engine::models::ApiResponse;
use reqwest::Client;
use serde::de::DeserializeOwned;
use url::Url;

/// Thin client that unwraps the `{success, data, error}` envelope
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let mut base = base_url.to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// GET `path` and return the envelope's `data`
    pub async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .context("Failed to send request")?;

        let status = response.status();
        let body = response.text().await.context("Failed to read response")?;

        let envelope: ApiResponse<T> = match serde_json::from_str(&body) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => anyhow::bail!("API error ({}): {}", status, body),
            Err(e) => return Err(e).context("Failed to parse response"),
        };

        if !status.is_success() || !envelope.success {
            let message = envelope.error.unwrap_or_else(|| "unknown error".to_string());
            anyhow::bail!("API error ({}): {}", status, message);
        }

        envelope
            .data
            .context("Response marked successful but carried no data")
    }
}
