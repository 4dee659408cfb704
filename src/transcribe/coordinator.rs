//! Transcription coordination
//!
//! Bridges an audio window to the backend: encode to WAV, send, scan
//! the streaming response for the transcript. No error escapes this
//! boundary; a failed request is reported as an unsuccessful result so
//! the state machine can skip the tick and retry.

use std::sync::Arc;

use crate::audio::wav;
use crate::transcribe::scanner::extract_transcript;
use crate::transcribe::{AudioKind, TranscriptionBackend};

/// Outcome of one transcription request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcription {
    /// Whether the backend call succeeded
    pub success: bool,
    /// Extracted transcript, if any
    pub text: Option<String>,
}

impl Transcription {
    const FAILED: Self = Self {
        success: false,
        text: None,
    };
}

/// Dispatches audio windows to the transcription backend
#[derive(Clone)]
pub struct TranscriptionCoordinator {
    backend: Arc<dyn TranscriptionBackend>,
}

impl TranscriptionCoordinator {
    /// Create a coordinator over `backend`
    #[must_use]
    pub fn new(backend: Arc<dyn TranscriptionBackend>) -> Self {
        Self { backend }
    }

    /// Transcribe mono samples, never failing past this boundary
    ///
    /// Backend failure yields `success: false` with no text; an empty
    /// or absent transcript with a successful call yields
    /// `success: true, text: None`.
    pub async fn transcribe(
        &self,
        samples: &[f32],
        sample_rate: u32,
        kind: AudioKind,
    ) -> Transcription {
        if samples.is_empty() {
            tracing::debug!("skipping transcription of empty window");
            return Transcription::FAILED;
        }

        let wav_bytes = wav::encode_pcm16(samples, sample_rate, 1);

        match self.backend.transcribe(&wav_bytes, kind).await {
            Ok(body) => {
                let text = extract_transcript(&body).filter(|t| !t.trim().is_empty());
                tracing::debug!(text = ?text, "transcription complete");
                Transcription {
                    success: true,
                    text,
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "transcription failed");
                Transcription::FAILED
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Error, Result};
    use async_trait::async_trait;

    struct CannedBackend {
        body: Result<String>,
    }

    #[async_trait]
    impl TranscriptionBackend for CannedBackend {
        async fn transcribe(&self, _wav: &[u8], _kind: AudioKind) -> Result<String> {
            match &self.body {
                Ok(body) => Ok(body.clone()),
                Err(_) => Err(Error::Stt("backend down".to_string())),
            }
        }
    }

    fn coordinator(body: Result<String>) -> TranscriptionCoordinator {
        TranscriptionCoordinator::new(Arc::new(CannedBackend { body }))
    }

    #[tokio::test]
    async fn success_extracts_text() {
        let coordinator = coordinator(Ok(r#"{"text": "hello", "is_final": true}"#.to_string()));
        let result = coordinator
            .transcribe(&[0.1; 160], 16000, AudioKind::KeywordProbe)
            .await;

        assert!(result.success);
        assert_eq!(result.text.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn backend_failure_is_contained() {
        let coordinator = coordinator(Err(Error::Stt("down".to_string())));
        let result = coordinator
            .transcribe(&[0.1; 160], 16000, AudioKind::Continuous)
            .await;

        assert!(!result.success);
        assert!(result.text.is_none());
    }

    #[tokio::test]
    async fn blank_transcript_is_success_without_text() {
        let coordinator = coordinator(Ok(r#"{"text": "   "}"#.to_string()));
        let result = coordinator
            .transcribe(&[0.1; 160], 16000, AudioKind::KeywordProbe)
            .await;

        assert!(result.success);
        assert!(result.text.is_none());
    }

    #[tokio::test]
    async fn empty_window_never_dispatches() {
        let coordinator = coordinator(Ok(r#"{"text": "should not appear"}"#.to_string()));
        let result = coordinator
            .transcribe(&[], 16000, AudioKind::KeywordProbe)
            .await;

        assert!(!result.success);
    }
}
