//! Transcription backend boundary
//!
//! The state machine is backend-agnostic: anything that accepts WAV
//! bytes and returns a response body asynchronously can serve as the
//! backend. The audio kind flag lets an implementation tune itself for
//! short keyword probes versus longer continuous clips.

use async_trait::async_trait;

use crate::{Error, Result};

/// What kind of audio a request carries
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AudioKind {
    /// Short sliding window probed for the wake keyword
    KeywordProbe,
    /// Fixed-length sequential clip from continuous mode
    Continuous,
}

/// External speech-to-text service
#[async_trait]
pub trait TranscriptionBackend: Send + Sync {
    /// Transcribe WAV bytes, returning the raw response body
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the service rejects it.
    async fn transcribe(&self, wav: &[u8], kind: AudioKind) -> Result<String>;
}

/// HTTP transcription backend (Whisper-style multipart endpoint)
pub struct HttpTranscriber {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl HttpTranscriber {
    /// Create a backend for `endpoint` using `model`
    ///
    /// # Errors
    ///
    /// Returns error if the endpoint is empty.
    pub fn new(endpoint: String, model: String, api_key: Option<String>) -> Result<Self> {
        if endpoint.is_empty() {
            return Err(Error::Config(
                "transcription endpoint required".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            endpoint,
            model,
            api_key,
        })
    }
}

#[async_trait]
impl TranscriptionBackend for HttpTranscriber {
    async fn transcribe(&self, wav: &[u8], kind: AudioKind) -> Result<String> {
        tracing::debug!(audio_bytes = wav.len(), ?kind, "starting transcription");

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(wav.to_vec())
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Stt(e.to_string()))?,
            )
            .text("model", self.model.clone());

        let mut request = self.client.post(&self.endpoint).multipart(form);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let response = request.send().await.map_err(|e| {
            tracing::warn!(error = %e, "transcription request failed");
            e
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, body = %body, "transcription API error");
            return Err(Error::Stt(format!("API error {status}: {body}")));
        }

        let body = response.text().await?;
        tracing::debug!(body_bytes = body.len(), "transcription response received");
        Ok(body)
    }
}
