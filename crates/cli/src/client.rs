//! HTTP client for the sentinel service API

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use url::Url;

/// API client for the sentinel service
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let response = request.send().await.context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body.trim());
        }

        Ok(response)
    }

    /// GET a JSON document
    async fn get_url<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let response = self.send(self.client.get(url)).await?;
        response.json().await.context("Failed to parse response")
    }

    /// URL of `devices/<device>/<leaf>` with the device id percent-encoded
    /// as a single path segment
    pub fn device_url(&self, device: &str, leaf: &str, limit: Option<usize>) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("API URL cannot carry a path: {}", self.base_url))?
            .pop_if_empty()
            .extend(["devices", device, leaf]);
        if let Some(limit) = limit {
            url.query_pairs_mut()
                .append_pair("limit", &limit.to_string());
        }
        Ok(url)
    }

    /// GET a plain-text document
    pub async fn get_text(&self, path: &str) -> Result<String> {
        let url = self.base_url.join(path).context("Invalid path")?;
        let response = self.send(self.client.get(url)).await?;
        response.text().await.context("Failed to read response")
    }

    /// POST a JSON body and return the plain-text acknowledgement
    pub async fn post_text<B: Serialize>(&self, path: &str, body: &B) -> Result<String> {
        let url = self.base_url.join(path).context("Invalid path")?;
        let response = self.send(self.client.post(url).json(body)).await?;
        response.text().await.context("Failed to read response")
    }

    pub async fn ingest(&self, sample: &SampleRecord) -> Result<()> {
        self.post_text("ingest", sample).await.map(|_| ())
    }

    pub async fn stats(&self) -> Result<BTreeMap<String, String>> {
        let body = self.get_text("stats").await?;
        Ok(parse_stats(&body))
    }

    pub async fn health(&self) -> Result<HealthReport> {
        // unhealthy services answer 503 with the same body
        let url = self.base_url.join("healthz").context("Invalid path")?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;
        response.json().await.context("Failed to parse response")
    }

    pub async fn history(&self, device: &str, limit: usize) -> Result<Vec<SampleRecord>> {
        self.get_url(self.device_url(device, "history", Some(limit))?)
            .await
    }

    pub async fn anomalies(&self, device: &str, limit: usize) -> Result<Vec<AnomalyEntry>> {
        self.get_url(self.device_url(device, "anomalies", Some(limit))?)
            .await
    }

    pub async fn window(&self, device: &str) -> Result<WindowSnapshot> {
        self.get_url(self.device_url(device, "window", None)?).await
    }
}

/// Parse the `key=value` lines of the stats endpoint
pub fn parse_stats(body: &str) -> BTreeMap<String, String> {
    body.lines()
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}

// API response types

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRecord {
    pub device: String,
    pub timestamp: i64,
    pub cpu: f64,
    pub rps: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyEntry {
    pub ts: i64,
    pub rps: i64,
    pub z: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowSnapshot {
    pub mean: f64,
    pub std_dev: f64,
    pub count: usize,
    pub capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub components: HashMap<String, ComponentReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentReport {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stats() {
        let stats = parse_stats("devices_tracked=12\nqueue_depth=0\nnoise\n");
        assert_eq!(stats.get("devices_tracked").map(String::as_str), Some("12"));
        assert_eq!(stats.get("queue_depth").map(String::as_str), Some("0"));
        assert_eq!(stats.len(), 2);
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(ApiClient::with_timeout("not a url", Duration::from_secs(5)).is_err());
    }

    #[tokio::test]
    async fn test_ingest_posts_sample() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/ingest")
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"device":"device-3","rps":90}"#.to_string(),
            ))
            .with_status(200)
            .with_body("ok\n")
            .create_async()
            .await;

        let client = ApiClient::with_timeout(&server.url(), Duration::from_secs(5)).unwrap();
        let sample = SampleRecord {
            device: "device-3".to_string(),
            timestamp: 1,
            cpu: 4.5,
            rps: 90,
        };
        client.ingest(&sample).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_bad_payload_surfaces_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/ingest")
            .with_status(400)
            .with_body("bad payload\n")
            .create_async()
            .await;

        let client = ApiClient::with_timeout(&server.url(), Duration::from_secs(5)).unwrap();
        let sample = SampleRecord {
            device: String::new(),
            timestamp: 1,
            cpu: 0.0,
            rps: 1,
        };
        let err = client.ingest(&sample).await.unwrap_err();
        assert!(err.to_string().contains("bad payload"));
    }

    #[tokio::test]
    async fn test_anomalies_are_decoded() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/devices/device-1/anomalies?limit=5")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"[{"ts":10,"rps":900,"z":4.5}]"#)
            .create_async()
            .await;

        let client = ApiClient::with_timeout(&server.url(), Duration::from_secs(5)).unwrap();
        let anomalies = client.anomalies("device-1", 5).await.unwrap();

        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].rps, 900);
    }

    #[test]
    fn test_device_url_encodes_reserved_characters() {
        let client =
            ApiClient::with_timeout("http://localhost:8080", Duration::from_secs(5)).unwrap();

        let url = client.device_url("rack/7?a#b", "history", Some(3)).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8080/devices/rack%2F7%3Fa%23b/history?limit=3"
        );
    }

    #[test]
    fn test_device_url_keeps_base_path() {
        let client =
            ApiClient::with_timeout("http://localhost:8080/sentinel/", Duration::from_secs(5))
                .unwrap();

        let url = client.device_url("device-1", "window", None).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/sentinel/devices/device-1/window");
    }

    #[tokio::test]
    async fn test_window_for_device_with_slash_hits_one_route() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/devices/edge%2F1/window")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"mean":10.0,"std_dev":0.0,"count":3,"capacity":50}"#)
            .create_async()
            .await;

        let client = ApiClient::with_timeout(&server.url(), Duration::from_secs(5)).unwrap();
        let window = client.window("edge/1").await.unwrap();

        assert_eq!(window.count, 3);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_health_reads_503_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/healthz")
            .with_status(503)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"status":"unhealthy","components":{"analyzer":{"status":"unhealthy","message":"stopped","last_check_timestamp":5}}}"#,
            )
            .create_async()
            .await;

        let client = ApiClient::with_timeout(&server.url(), Duration::from_secs(5)).unwrap();
        let report = client.health().await.unwrap();

        assert_eq!(report.status, "unhealthy");
        assert_eq!(
            report.components["analyzer"].message.as_deref(),
            Some("stopped")
        );
    }
}
