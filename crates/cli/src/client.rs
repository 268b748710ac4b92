//! API client for the advisor daemon

use advisor_lib::{Baseline, CycleReport};
use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use url::Url;

/// API client for the advisor daemon
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// GET a JSON document; `Ok(None)` on 404
    async fn get_optional<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }

        response
            .json()
            .await
            .map(Some)
            .context("Failed to parse response")
    }

    /// Latest cycle report, `None` before the daemon has finished a cycle
    pub async fn latest_report(&self) -> Result<Option<CycleReport>> {
        self.get_optional("api/v1/report").await
    }

    pub async fn baselines(&self) -> Result<BTreeMap<String, Baseline>> {
        Ok(self
            .get_optional("api/v1/baselines")
            .await?
            .unwrap_or_default())
    }

    pub async fn baseline(&self, source: &str) -> Result<Option<Baseline>> {
        self.get_optional(&format!("api/v1/baselines/{}", source))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn baseline_json(source: &str, avg_volume: f64) -> serde_json::Value {
        json!({
            "source": source,
            "avg_volume": avg_volume,
            "avg_latency": 0.5,
            "sample_count": 3,
            "last_updated": "2024-03-01T12:00:00Z"
        })
    }

    #[tokio::test]
    async fn test_baselines_are_decoded() {
        let mut server = mockito::Server::new_async().await;
        let body = json!({ "Syslog": baseline_json("Syslog", 2048.0) });
        let mock = server
            .mock("GET", "/api/v1/baselines")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let baselines = client.baselines().await.unwrap();

        mock.assert_async().await;
        assert_eq!(baselines.len(), 1);
        assert_eq!(baselines["Syslog"].avg_volume, 2048.0);
        assert_eq!(baselines["Syslog"].sample_count, 3);
    }

    #[tokio::test]
    async fn test_unknown_baseline_is_none() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v1/baselines/Missing")
            .with_status(404)
            .with_body(r#"{"error":"no baseline for source 'Missing'"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        assert!(client.baseline("Missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_report_not_ready_is_none() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v1/report")
            .with_status(404)
            .with_body(r#"{"error":"no cycle has completed yet"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        assert!(client.latest_report().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_server_error_is_reported() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v1/report")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let err = client.latest_report().await.unwrap_err();
        assert!(err.to_string().contains("500"));
    }

    #[test]
    fn test_invalid_url_rejected() {
        assert!(ApiClient::new("not a url").is_err());
    }
}
