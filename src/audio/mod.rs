//! Audio capture, buffering, and encoding
//!
//! The ring buffer is the shared store between the capture callback and
//! the state machine; the WAV encoder produces the bytes sent to the
//! transcription backend.

mod capture;
mod ring;
pub mod wav;

pub use capture::{CaptureDevice, DEFAULT_SAMPLE_RATE, MicCapture};
pub use ring::{AudioWindow, RingAudioBuffer, distance_in_ring, rms};
