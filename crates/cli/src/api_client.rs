use anyhow::{Context, Result};
use reqwest::Url;
use serde::{Deserialize, de::DeserializeOwned};

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url).context("invalid server URL")?;
        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
        })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base_url.join(path).context("failed to build API URL")
    }

    async fn send_json<T: DeserializeOwned>(&self, req: reqwest::RequestBuilder) -> Result<T> {
        let response = req.send().await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            if let Ok(err) = serde_json::from_str::<ErrorResponse>(&body) {
                anyhow::bail!(
                    "API error ({}, code {}): {}",
                    status,
                    err.error_code,
                    err.description
                );
            }
            anyhow::bail!("API error ({}): {}", status, body);
        }
        Ok(serde_json::from_str(&body)?)
    }

    /// GET /health. A degraded server answers 503 with the same body.
    pub async fn health(&self) -> Result<HealthResponse> {
        let url = self.url("/health")?;
        let response = self.http.get(url).send().await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        match serde_json::from_str::<HealthResponse>(&body) {
            Ok(health) => Ok(health),
            Err(_) => anyhow::bail!("API error ({}): {}", status, body),
        }
    }

    pub async fn stats(&self) -> Result<StatsResponse> {
        let url = self.url("/stats")?;
        self.send_json(self.http.get(url)).await
    }
}

// =============================================================================
// Response types (mirrored from server handlers)
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    pub error_code: u16,
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub upstream: String,
    pub metadata: String,
    pub cache_entries: u64,
}

#[derive(Debug, Deserialize)]
pub struct StatsResponse {
    pub total_files: u64,
    pub total_users: u64,
    pub total_downloads: u64,
    pub total_bytes: u64,
}
