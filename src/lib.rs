//! Hark - wake-word voice-activation pipeline
//!
//! Continuous microphone capture into a ring buffer, a periodic wake
//! keyword probing loop, silence-bounded command capture, and
//! asynchronous transcription with stale-result rejection.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │  Capture device (cpal)                                │
//! │     └─ writes frames ──▶ RingAudioBuffer              │
//! └────────────────────────────┬─────────────────────────┘
//!                              │ windowed reads
//! ┌────────────────────────────▼─────────────────────────┐
//! │  VoiceActivationStateMachine (tick-driven)            │
//! │     probing ─▶ pause ─▶ command capture ─▶ busy       │
//! │     continuous clips                                  │
//! └────────────────────────────┬─────────────────────────┘
//!                              │ dispatch (generation-tagged)
//! ┌────────────────────────────▼─────────────────────────┐
//! │  TranscriptionCoordinator                             │
//! │     WAV encode ─▶ backend ─▶ streaming JSON scan      │
//! └──────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod config;
pub mod error;
pub mod keyword;
pub mod listener;
pub mod transcribe;

pub use audio::{AudioWindow, CaptureDevice, MicCapture, RingAudioBuffer};
pub use config::PipelineConfig;
pub use error::{Error, Result};
pub use keyword::{KeywordSet, KeywordSpec};
pub use listener::{
    Category, Mode, VoiceActivationStateMachine, VoiceEvent, VoicePipeline,
    command_from_utterance,
};
pub use transcribe::{
    AudioKind, HttpTranscriber, Transcription, TranscriptionBackend, TranscriptionCoordinator,
};
