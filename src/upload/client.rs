use anyhow::{Context, Result};
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// The remote transcription capability.
///
/// `transcribe` accepts one complete audio container plus trailing context
/// from the previous confirmed text; an empty returned string means "no
/// meaningful speech in this segment". `finalize` runs the whole-transcript
/// cleanup pass and returns the polished replacement.
#[async_trait::async_trait]
pub trait TranscriptionApi: Send + Sync {
    async fn transcribe(&self, audio: Vec<u8>, context: &str) -> Result<String>;

    async fn finalize(&self, full_text: &str) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct TranscribeResponse {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
struct FinalCleanupRequest<'a> {
    text: &'a str,
    #[serde(rename = "isFinalCleanup")]
    is_final_cleanup: bool,
}

/// HTTP client for the transcription endpoint (multipart upload, bearer auth)
pub struct HttpTranscribeClient {
    http: Client,
    endpoint: String,
    auth_token: String,
}

impl HttpTranscribeClient {
    pub fn new(endpoint: impl Into<String>, auth_token: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            endpoint: endpoint.into(),
            auth_token: auth_token.into(),
        })
    }
}

#[async_trait::async_trait]
impl TranscriptionApi for HttpTranscribeClient {
    async fn transcribe(&self, audio: Vec<u8>, context: &str) -> Result<String> {
        debug!(
            "Uploading segment: {} bytes, {} context chars",
            audio.len(),
            context.len()
        );

        let part = Part::bytes(audio)
            .file_name("segment.wav")
            .mime_str("audio/wav")
            .context("Invalid audio MIME type")?;
        let form = Form::new()
            .part("audio", part)
            .text("context", context.to_string());

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.auth_token)
            .multipart(form)
            .send()
            .await
            .context("Transcription request failed")?;

        if !response.status().is_success() {
            anyhow::bail!("Transcription endpoint returned {}", response.status());
        }

        let body: TranscribeResponse = response
            .json()
            .await
            .context("Malformed transcription response")?;

        Ok(body.text.unwrap_or_default())
    }

    async fn finalize(&self, full_text: &str) -> Result<String> {
        debug!("Requesting final cleanup pass ({} chars)", full_text.len());

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.auth_token)
            .json(&FinalCleanupRequest {
                text: full_text,
                is_final_cleanup: true,
            })
            .send()
            .await
            .context("Final cleanup request failed")?;

        if !response.status().is_success() {
            anyhow::bail!("Final cleanup endpoint returned {}", response.status());
        }

        let body: TranscribeResponse = response
            .json()
            .await
            .context("Malformed cleanup response")?;

        body.text
            .filter(|t| !t.trim().is_empty())
            .context("Cleanup response contained no text")
    }
}
