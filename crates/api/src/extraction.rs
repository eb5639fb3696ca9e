//! Vision-model extraction client
//!
//! Sends uploaded resume documents to the extraction service and returns the
//! structured JSON it produces. The call has a bounded timeout so a slow
//! model never pins a request handler.

use std::time::Duration;

use serde::Serialize;

/// HTTP client for the resume extraction service
#[derive(Clone)]
pub struct ExtractionClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Serialize)]
struct ExtractionRequest<'a> {
    file_name: &'a str,
    content_base64: &'a str,
}

impl ExtractionClient {
    pub fn new(base_url: &str, api_key: &str, timeout_secs: u64) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// Extract structured resume data from a base64-encoded document
    pub async fn extract(
        &self,
        file_name: &str,
        content_base64: &str,
    ) -> Result<serde_json::Value, ExtractionError> {
        let url = format!("{}/v1/extract", self.base_url);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&ExtractionRequest {
                file_name,
                content_base64,
            })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ExtractionError::Timeout
                } else {
                    ExtractionError::Request(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, body = %body, "Extraction service returned an error");
            return Err(ExtractionError::Upstream(status.as_u16()));
        }

        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| ExtractionError::Request(e.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("Extraction request timed out")]
    Timeout,
    #[error("Extraction request failed: {0}")]
    Request(String),
    #[error("Extraction service error (status {0})")]
    Upstream(u16),
}
