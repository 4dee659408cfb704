//! Transcription: backend boundary, response scanning, coordination

mod backend;
mod coordinator;
mod scanner;

pub use backend::{AudioKind, HttpTranscriber, TranscriptionBackend};
pub use coordinator::{Transcription, TranscriptionCoordinator};
pub use scanner::extract_transcript;
