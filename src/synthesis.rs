//! HTTP client for the speech synthesis backend.
//!
//! One request per speakable chunk: `POST { "text": ... }`, answered with a
//! streamed byte body of encoded audio. The body is consumed incrementally
//! while it downloads; only the connection phase carries a timeout.

use crate::config::SynthesisConfig;
use crate::error::{Result, VoiceError};
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use std::time::Duration;
use tracing::debug;

/// Streamed audio bytes for one chunk.
pub type AudioByteStream = BoxStream<'static, reqwest::Result<Bytes>>;

/// Client for the synthesis backend.
#[derive(Debug, Clone)]
pub struct SynthesisClient {
    http: reqwest::Client,
    endpoint: String,
}

impl SynthesisClient {
    /// Build a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be constructed.
    pub fn new(config: &SynthesisConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .build()
            .map_err(|e| VoiceError::Synthesis(format!("HTTP client build failed: {e}")))?;
        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
        })
    }

    /// Request synthesis of `text` and return the response byte stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be sent or the backend
    /// answers with a non-success status.
    pub async fn stream(&self, text: &str) -> Result<AudioByteStream> {
        debug!("requesting synthesis of {} chars", text.chars().count());

        let response = self
            .http
            .post(&self.endpoint)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await
            .map_err(|e| VoiceError::Synthesis(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(VoiceError::Synthesis(format!(
                "backend returned {status}"
            )));
        }

        Ok(response.bytes_stream().boxed())
    }
}
