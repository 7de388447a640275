//! Speech recognizers: a disabled one and an HTTP sidecar.

use super::SpeechRecognizer;
use anyhow::{Context, Result};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::{info, warn};

/// Recognition is not permitted or not installed. Always yields nothing.
pub struct UnavailableRecognizer;

#[async_trait::async_trait]
impl SpeechRecognizer for UnavailableRecognizer {
    fn name(&self) -> &str {
        "unavailable"
    }

    async fn transcribe(&self, _audio: &[u8]) -> Option<String> {
        None
    }
}

#[derive(Debug, Deserialize)]
struct TranscribeResponse {
    #[serde(default)]
    text: String,
}

/// Speech-to-text sidecar reached at `{url}/transcribe`.
pub struct SidecarRecognizer {
    url: String,
    client: reqwest::Client,
}

impl SidecarRecognizer {
    pub fn new(url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            url: url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    async fn request(&self, audio: &[u8]) -> Result<String> {
        let part = Part::bytes(audio.to_vec())
            .file_name("capture.m4a")
            .mime_str("audio/mp4")?;
        let form = Form::new().part("file", part);

        let resp = self
            .client
            .post(format!("{}/transcribe", self.url))
            .multipart(form)
            .send()
            .await
            .context("Speech sidecar unreachable")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("Speech sidecar error ({}): {}", status, text);
        }

        let body: TranscribeResponse = resp
            .json()
            .await
            .context("Failed to parse speech sidecar response")?;
        Ok(body.text)
    }
}

#[async_trait::async_trait]
impl SpeechRecognizer for SidecarRecognizer {
    fn name(&self) -> &str {
        "sidecar"
    }

    async fn transcribe(&self, audio: &[u8]) -> Option<String> {
        info!("SidecarRecognizer: transcribing {} bytes", audio.len());
        match self.request(audio).await {
            Ok(text) if !text.trim().is_empty() => Some(text),
            Ok(_) => {
                info!("SidecarRecognizer: no speech recognized");
                None
            }
            Err(e) => {
                warn!("SidecarRecognizer: {:#}", e);
                None
            }
        }
    }
}
