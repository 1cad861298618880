//! Delivery sink boundary and its HTTP implementation.
//!
//! The sink makes exactly one attempt per call and reports the outcome; retry
//! policy lives in the collector, which re-buffers failed readings in its
//! backlog. Readings go out as a JSON array, snapshots as raw bytes with
//! their MIME type.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::debug;

use crate::config::SinkConfig;
use crate::reading::{Reading, Snapshot};

/// Errors that can occur while delivering to the remote collector.
#[derive(Debug)]
pub enum SinkError {
    /// HTTP request failed
    Request(reqwest::Error),

    /// Server returned a non-success status code
    Status { code: StatusCode, message: String },

    /// Request timeout
    Timeout,

    /// Sink configuration error
    Config(String),
}

impl std::fmt::Display for SinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkError::Request(e) => write!(f, "HTTP request failed: {}", e),
            SinkError::Status { code, message } => {
                write!(f, "Server error ({}): {}", code, message)
            }
            SinkError::Timeout => write!(f, "Request timed out"),
            SinkError::Config(e) => write!(f, "Sink configuration error: {}", e),
        }
    }
}

impl std::error::Error for SinkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SinkError::Request(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for SinkError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SinkError::Timeout
        } else {
            SinkError::Request(err)
        }
    }
}

/// Boundary to the remote endpoint that accepts delivered data.
///
/// A batch is an ordered sequence of readings, oldest first; the whole batch
/// either succeeds or fails as one attempt.
#[async_trait]
pub trait DeliverySink: Send + Sync {
    async fn send_readings(&self, batch: &[Reading]) -> Result<(), SinkError>;
    async fn send_snapshot(&self, snapshot: &Snapshot) -> Result<(), SinkError>;
}

/// HTTP delivery sink with bearer-token authentication.
///
/// Reuses one pooled [`Client`] across requests. Readings POST to the data
/// URL as a JSON array; snapshots POST to the image URL as raw bytes with
/// the image MIME type and an ISO-8601 `timestamp` query parameter.
pub struct HttpSink {
    client: Client,
    data_url: String,
    image_url: String,
    api_token: String,
}

impl HttpSink {
    /// Create a sink from the configured endpoint parameters.
    pub fn new(config: &SinkConfig) -> Result<Self, SinkError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| SinkError::Config(e.to_string()))?;

        Ok(Self {
            client,
            data_url: config.data_url.clone(),
            image_url: config.image_url.clone(),
            api_token: config.api_token.clone(),
        })
    }

    /// Get the configured readings endpoint.
    pub fn data_url(&self) -> &str {
        &self.data_url
    }

    /// Get the configured snapshot endpoint.
    pub fn image_url(&self) -> &str {
        &self.image_url
    }

    async fn check_status(response: reqwest::Response) -> Result<(), SinkError> {
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            Err(SinkError::Status {
                code: status,
                message,
            })
        }
    }
}

#[async_trait]
impl DeliverySink for HttpSink {
    async fn send_readings(&self, batch: &[Reading]) -> Result<(), SinkError> {
        debug!(
            batch_size = batch.len(),
            url = %self.data_url,
            "Sending reading batch"
        );

        let response = self
            .client
            .post(&self.data_url)
            .bearer_auth(&self.api_token)
            .json(batch)
            .send()
            .await?;

        Self::check_status(response).await
    }

    async fn send_snapshot(&self, snapshot: &Snapshot) -> Result<(), SinkError> {
        debug!(
            bytes = snapshot.image_data.len(),
            timestamp = %snapshot.timestamp,
            url = %self.image_url,
            "Sending snapshot"
        );

        let response = self
            .client
            .post(&self.image_url)
            .query(&[("timestamp", snapshot.timestamp.to_rfc3339())])
            .bearer_auth(&self.api_token)
            .header(reqwest::header::CONTENT_TYPE, snapshot.image_type.as_str())
            .body(snapshot.image_data.clone())
            .send()
            .await?;

        Self::check_status(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> SinkConfig {
        SinkConfig {
            data_url: "http://localhost:8080/api/v1/data".to_string(),
            image_url: "http://localhost:8080/api/v1/image".to_string(),
            api_token: "test-token".to_string(),
            request_timeout_secs: 30,
        }
    }

    #[test]
    fn test_sink_creation() {
        let sink = HttpSink::new(&test_config()).unwrap();
        assert_eq!(sink.data_url(), "http://localhost:8080/api/v1/data");
        assert_eq!(sink.image_url(), "http://localhost:8080/api/v1/image");
    }

    #[test]
    fn test_sink_error_display() {
        let err = SinkError::Timeout;
        assert_eq!(format!("{}", err), "Request timed out");

        let err = SinkError::Status {
            code: StatusCode::BAD_GATEWAY,
            message: "upstream down".to_string(),
        };
        assert!(format!("{}", err).contains("502"));
        assert!(format!("{}", err).contains("upstream down"));

        let err = SinkError::Config("bad timeout".to_string());
        assert!(format!("{}", err).contains("bad timeout"));
    }

    #[test]
    fn test_batch_wire_format_is_json_array() {
        let batch = vec![Reading::new(), Reading::new()];
        let json = serde_json::to_value(&batch).unwrap();
        assert!(json.is_array());
        assert_eq!(json.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_send_to_unreachable_endpoint_fails() {
        let config = SinkConfig {
            data_url: "http://127.0.0.1:9/api/v1/data".to_string(),
            image_url: "http://127.0.0.1:9/api/v1/image".to_string(),
            api_token: "test-token".to_string(),
            request_timeout_secs: 1,
        };
        let sink = HttpSink::new(&config).unwrap();

        let result = sink.send_readings(&[Reading::new()]).await;
        assert!(result.is_err());
    }
}
