use anyhow::{Context, Result, anyhow};
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use wreq::Client;
use wreq_util::Emulation;

use crate::storage::StorageManager;

pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Fetches crop snapshots and stores them in the data directory.
pub struct DatasetDownloader {
    client: Client,
    storage: StorageManager,
    user_agent: String,
}

impl DatasetDownloader {
    pub fn new(storage: StorageManager, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .emulation(Emulation::Firefox136)
            .timeout(DOWNLOAD_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            storage,
            user_agent: user_agent.to_string(),
        })
    }

    /// Downloads one export and saves it under `file_name`. The body must be
    /// valid JSON; anything else is rejected before touching the disk.
    pub async fn download(&self, url: &str, file_name: &str) -> Result<PathBuf> {
        info!("Downloading {} from {}", file_name, url);

        let response = self
            .client
            .get(url)
            .header("User-Agent", &self.user_agent)
            .send()
            .await
            .with_context(|| format!("Request for {} failed", file_name))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "HTTP error downloading {}: {}",
                file_name,
                response.status()
            ));
        }

        let bytes = response
            .bytes()
            .await
            .with_context(|| format!("Failed to read body for {}", file_name))?;

        serde_json::from_slice::<Value>(&bytes)
            .with_context(|| format!("{} is not valid JSON", file_name))?;

        let path = self.storage.write_atomic(file_name, &bytes)?;
        info!("Saved {} ({} bytes)", path.display(), bytes.len());
        Ok(path)
    }

    /// Downloads every `(url, file_name)` pair, stopping at the first failure.
    pub async fn download_all(&self, targets: &[(&str, &str)]) -> Result<Vec<PathBuf>> {
        let mut saved = Vec::with_capacity(targets.len());
        for (url, file_name) in targets {
            saved.push(self.download(url, file_name).await?);
        }
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_download_saves_json() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rice"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"records": []})))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let storage = StorageManager::new(dir.path());
        let downloader = DatasetDownloader::new(storage.clone(), "test-agent").unwrap();

        let url = format!("{}/rice", server.uri());
        let saved = downloader.download(&url, "rice.json").await.unwrap();
        assert_eq!(saved, storage.path_for("rice.json"));

        let content: Value = serde_json::from_str(&storage.read_to_string("rice.json").unwrap()).unwrap();
        assert_eq!(content, json!({"records": []}));
    }

    #[tokio::test]
    async fn test_download_rejects_http_errors_and_non_json() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/html"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let storage = StorageManager::new(dir.path());
        let downloader = DatasetDownloader::new(storage.clone(), "test-agent").unwrap();

        let missing = format!("{}/missing", server.uri());
        assert!(downloader.download(&missing, "rice.json").await.is_err());

        let html = format!("{}/html", server.uri());
        assert!(downloader.download(&html, "jowar.json").await.is_err());

        assert!(!storage.exists("rice.json"));
        assert!(!storage.exists("jowar.json"));
    }
}
