//! Audio capture from microphone
//!
//! The cpal input stream is the only true concurrent actor in the
//! pipeline: its callback writes frames into the shared ring and thereby
//! advances the logical cursor. Everything else only reads.

use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream};

use crate::audio::RingAudioBuffer;
use crate::{Error, Result};

/// Default sample rate for speech capture (16kHz)
pub const DEFAULT_SAMPLE_RATE: u32 = 16000;

/// Capture device boundary
///
/// Implemented by the cpal microphone adapter and by in-memory fakes in
/// tests. Must tolerate being queried before any frames exist.
pub trait CaptureDevice {
    /// Start capturing at the requested rate, returning the actual rate
    ///
    /// # Errors
    ///
    /// Returns error if the device cannot be opened.
    fn start(&mut self, sample_rate: u32) -> Result<u32>;

    /// Logical write position in frames (0 before any frames exist)
    fn current_position(&self) -> i64;

    /// Whether the device is currently capturing
    fn is_running(&self) -> bool;

    /// Stop capturing; safe to call when already stopped
    fn stop(&mut self);
}

/// Microphone capture into a shared ring buffer
pub struct MicCapture {
    ring: Arc<RingAudioBuffer>,
    input_gain: f32,
    stream: Option<Stream>,
    sample_rate: u32,
}

impl MicCapture {
    /// Create a capture adapter writing into `ring`
    ///
    /// `input_gain` is applied per sample before frames enter the ring.
    #[must_use]
    pub const fn new(ring: Arc<RingAudioBuffer>, input_gain: f32) -> Self {
        Self {
            ring,
            input_gain,
            stream: None,
            sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }

    /// Sample rate the stream was opened with
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl CaptureDevice for MicCapture {
    fn start(&mut self, sample_rate: u32) -> Result<u32> {
        if self.stream.is_some() {
            return Ok(self.sample_rate);
        }

        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| Error::DeviceNotReady("no input device available".to_string()))?;

        #[allow(clippy::cast_possible_truncation)]
        let channels = self.ring.channels() as u16;

        // Prefer a config at the requested rate; fall back to whatever
        // the device offers and report the actual rate to the caller.
        let config = device
            .supported_input_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                c.channels() == channels
                    && c.min_sample_rate() <= SampleRate(sample_rate)
                    && c.max_sample_rate() >= SampleRate(sample_rate)
            })
            .map_or_else(
                || {
                    device
                        .default_input_config()
                        .map(|c| c.config())
                        .map_err(|e| Error::Audio(e.to_string()))
                },
                |c| Ok(c.with_sample_rate(SampleRate(sample_rate)).config()),
            )?;

        let actual_rate = config.sample_rate.0;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            requested = sample_rate,
            actual = actual_rate,
            channels = config.channels,
            "opening capture stream"
        );

        let ring = Arc::clone(&self.ring);
        let gain = self.input_gain;

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if (gain - 1.0).abs() < f32::EPSILON {
                        ring.write(data);
                    } else {
                        let scaled: Vec<f32> = data.iter().map(|s| s * gain).collect();
                        ring.write(&scaled);
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio capture error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;
        self.stream = Some(stream);
        self.sample_rate = actual_rate;

        tracing::debug!(sample_rate = actual_rate, "audio capture started");
        Ok(actual_rate)
    }

    fn current_position(&self) -> i64 {
        self.ring.cursor()
    }

    fn is_running(&self) -> bool {
        self.stream.is_some()
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!("audio capture stopped");
        }
    }
}
