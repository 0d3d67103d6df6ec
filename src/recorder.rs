//! Recorder implementations: HTTP bulk upload and a log-only sink.

use async_trait::async_trait;
use serde::Serialize;
use splitd_core::{ClientTag, Error as CoreError, EventRecord, ImpressionsBatch, Recorder};
use tracing::{debug, info};
use url::Url;

use crate::config::RecorderConfig;
use crate::error::{Error, Result};

const IMPRESSIONS_PATH: &str = "testImpressions/bulk";
const EVENTS_PATH: &str = "events/bulk";

const SDK_VERSION_HEADER: &str = "SplitSDKVersion";
const CLIENT_KEY_HEADER: &str = "SplitSDKClientKey";

/// Posts batches as JSON to the events backend.
#[derive(Debug, Clone)]
pub struct HttpRecorder {
    http_client: reqwest::Client,
    impressions_url: Url,
    events_url: Url,
    api_key: String,
}

impl HttpRecorder {
    /// Build a recorder rooted at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HttpClient`] when the client cannot be built, or a
    /// configuration error when the endpoint URLs cannot be derived.
    pub fn new(base_url: &Url, config: &RecorderConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(Error::HttpClient)?;

        Ok(Self {
            http_client,
            impressions_url: endpoint(base_url, IMPRESSIONS_PATH)?,
            events_url: endpoint(base_url, EVENTS_PATH)?,
            api_key: config.api_key.clone(),
        })
    }

    async fn post<B>(&self, kind: &'static str, url: &Url, tag: &ClientTag, body: &B) -> splitd_core::Result<()>
    where
        B: Serialize + Sync + ?Sized,
    {
        let response = self
            .http_client
            .post(url.as_str())
            .bearer_auth(&self.api_key)
            .header(SDK_VERSION_HEADER, &tag.sdk_version)
            .header(CLIENT_KEY_HEADER, &tag.id)
            .json(body)
            .send()
            .await
            .map_err(|e| CoreError::recorder(kind, tag.to_string(), e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CoreError::recorder(
                kind,
                tag.to_string(),
                format!("HTTP {}", status.as_u16()),
            ));
        }
        debug!(kind, tag = %tag, status = status.as_u16(), "Batch accepted");
        Ok(())
    }
}

fn endpoint(base_url: &Url, path: &str) -> Result<Url> {
    let joined = format!("{}/{path}", base_url.as_str().trim_end_matches('/'));
    Url::parse(&joined).map_err(|e| {
        Error::Core(CoreError::invalid_config(format!(
            "recorder.url: cannot derive {path}: {e}"
        )))
    })
}

#[async_trait]
impl Recorder for HttpRecorder {
    async fn record_impressions(&self, tag: &ClientTag, batch: ImpressionsBatch) -> splitd_core::Result<()> {
        self.post("impressions", &self.impressions_url, tag, &batch).await
    }

    async fn record_events(&self, tag: &ClientTag, batch: Vec<EventRecord>) -> splitd_core::Result<()> {
        self.post("events", &self.events_url, tag, &batch).await
    }
}

/// Logs batch sizes and discards the data. Used when no backend is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogRecorder;

#[async_trait]
impl Recorder for LogRecorder {
    async fn record_impressions(&self, tag: &ClientTag, batch: ImpressionsBatch) -> splitd_core::Result<()> {
        let impressions: usize = batch.iter().map(|group| group.impressions.len()).sum();
        info!(tag = %tag, features = batch.len(), impressions, "Discarding impressions (no recorder url)");
        Ok(())
    }

    async fn record_events(&self, tag: &ClientTag, batch: Vec<EventRecord>) -> splitd_core::Result<()> {
        info!(tag = %tag, events = batch.len(), "Discarding events (no recorder url)");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;

    #[test]
    fn test_endpoint_keeps_base_path() {
        let base = Url::parse("https://events.example.com/api").unwrap();
        assert_eq!(
            endpoint(&base, IMPRESSIONS_PATH).unwrap().as_str(),
            "https://events.example.com/api/testImpressions/bulk"
        );

        let base = Url::parse("https://events.example.com/api/").unwrap();
        assert_eq!(
            endpoint(&base, EVENTS_PATH).unwrap().as_str(),
            "https://events.example.com/api/events/bulk"
        );
    }

    #[tokio::test]
    async fn test_log_recorder_accepts_everything() {
        let tag = ClientTag::new("id-1", "go-1.0");
        assert!(LogRecorder.record_impressions(&tag, Vec::new()).await.is_ok());
        assert!(LogRecorder.record_events(&tag, Vec::new()).await.is_ok());
    }
}
