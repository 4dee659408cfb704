//! Ring buffer for captured audio
//!
//! Fixed-capacity circular store of the most recent frames. The capture
//! device appends on its own thread; the state machine only ever reads.
//! The logical write cursor is a strictly increasing frame count, never
//! wrapped, so a reader can tell whether a requested window has already
//! been overwritten.

use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::{Error, Result};

/// A mono, channel-averaged window read out of the ring
#[derive(Debug, Clone, PartialEq)]
pub struct AudioWindow {
    /// Logical index of the first frame in the window
    pub start_frame: i64,
    /// Samples, one per frame, clamped to [-1, 1]
    pub samples: Vec<f32>,
}

impl AudioWindow {
    /// Number of frames in the window
    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.samples.len()
    }

    /// RMS amplitude of the window
    #[must_use]
    pub fn rms(&self) -> f32 {
        rms(&self.samples)
    }
}

/// Circular store of interleaved audio frames
pub struct RingAudioBuffer {
    /// Capacity in frames
    capacity: usize,
    /// Channels per frame
    channels: usize,
    /// Interleaved sample storage, `capacity * channels` long
    samples: Mutex<Vec<f32>>,
    /// Total frames ever written (not wrapped)
    cursor: AtomicI64,
}

impl RingAudioBuffer {
    /// Create a ring holding `capacity` frames of `channels`-channel audio
    ///
    /// # Panics
    ///
    /// Panics if `capacity` or `channels` is zero.
    #[must_use]
    pub fn new(capacity: usize, channels: usize) -> Self {
        assert!(capacity > 0, "ring capacity must be positive");
        assert!(channels > 0, "channel count must be positive");

        Self {
            capacity,
            channels,
            samples: Mutex::new(vec![0.0; capacity * channels]),
            cursor: AtomicI64::new(0),
        }
    }

    /// Capacity in frames
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Channels per frame
    #[must_use]
    pub const fn channels(&self) -> usize {
        self.channels
    }

    /// Current write cursor (total frames written)
    #[must_use]
    pub fn cursor(&self) -> i64 {
        self.cursor.load(Ordering::Acquire)
    }

    /// Append interleaved frames from the capture callback
    ///
    /// Advances the cursor by the number of complete frames in `data`.
    /// A trailing partial frame is dropped. A burst larger than the ring
    /// advances the cursor by the full frame count but only its most
    /// recent `capacity` frames survive. Never blocks beyond the copy
    /// under the sample lock.
    pub fn write(&self, data: &[f32]) {
        let frames = data.len() / self.channels;
        if frames == 0 {
            return;
        }

        let cursor = self.cursor.load(Ordering::Acquire);
        let total = self.capacity * self.channels;
        let src = &data[..frames * self.channels];

        // Earlier frames of an oversized burst would be overwritten by
        // its own later frames; skip them instead of copying twice.
        let skipped_frames = src.len().saturating_sub(total) / self.channels;
        let src = &src[skipped_frames * self.channels..];

        {
            let mut samples = match self.samples.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };

            #[allow(
                clippy::cast_possible_truncation,
                clippy::cast_sign_loss,
                clippy::cast_possible_wrap
            )]
            let mut pos = ((cursor + skipped_frames as i64).rem_euclid(self.capacity as i64)
                as usize)
                * self.channels;

            let tail = (total - pos).min(src.len());
            samples[pos..pos + tail].copy_from_slice(&src[..tail]);
            pos = 0;
            if tail < src.len() {
                let head = src.len() - tail;
                samples[pos..head].copy_from_slice(&src[tail..]);
            }
        }

        #[allow(clippy::cast_possible_wrap)]
        self.cursor.store(cursor + frames as i64, Ordering::Release);
    }

    /// Read a window of frames as mono samples
    ///
    /// Multi-channel frames are down-mixed by arithmetic mean and clamped
    /// to [-1, 1]. A window crossing the physical end of the ring is
    /// assembled from the tail and head segments in logical order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DataStale`] if the window has already been
    /// overwritten (or `frame_count` is zero), and
    /// [`Error::BufferUnderrun`] if it extends past the frames written
    /// so far.
    pub fn read_window(&self, start_frame: i64, frame_count: usize) -> Result<AudioWindow> {
        let cursor = self.cursor();

        if frame_count == 0 {
            return Err(Error::DataStale {
                start_frame,
                cursor,
                capacity: self.capacity,
            });
        }

        #[allow(clippy::cast_possible_wrap)]
        let capacity = self.capacity as i64;

        if start_frame < 0 || cursor - start_frame > capacity {
            return Err(Error::DataStale {
                start_frame,
                cursor,
                capacity: self.capacity,
            });
        }

        #[allow(clippy::cast_possible_wrap)]
        let end_frame = start_frame + frame_count as i64;
        if end_frame > cursor {
            return Err(Error::BufferUnderrun {
                end_frame,
                requested: frame_count,
                cursor,
            });
        }

        let samples = match self.samples.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let start = start_frame.rem_euclid(capacity) as usize;
        let mut out = Vec::with_capacity(frame_count);

        for i in 0..frame_count {
            let frame = (start + i) % self.capacity;
            let base = frame * self.channels;
            #[allow(clippy::cast_precision_loss)]
            let mean = samples[base..base + self.channels].iter().sum::<f32>()
                / self.channels as f32;
            out.push(mean.clamp(-1.0, 1.0));
        }

        Ok(AudioWindow {
            start_frame,
            samples: out,
        })
    }

    /// Read up to the most recent `seconds` of audio
    ///
    /// Shorter than requested when less history exists; the window is
    /// clamped to what the ring still holds.
    ///
    /// # Errors
    ///
    /// Returns an error when no frames have been captured yet.
    pub fn read_last_seconds(&self, seconds: f32, sample_rate: u32) -> Result<AudioWindow> {
        let cursor = self.cursor();

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let wanted = (seconds.max(0.0) * sample_rate as f32) as i64;
        #[allow(clippy::cast_possible_wrap)]
        let available = cursor.min(self.capacity as i64);
        let frames = wanted.min(available);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        self.read_window(cursor - frames, frames.max(0) as usize)
    }

    /// RMS amplitude over the most recent `seconds` of audio
    ///
    /// Returns 0.0 when no audio is available yet; loudness of missing
    /// history is not an error worth surfacing to a probe tick.
    #[must_use]
    pub fn recent_rms(&self, seconds: f32, sample_rate: u32) -> f32 {
        self.read_last_seconds(seconds, sample_rate)
            .map_or(0.0, |window| window.rms())
    }
}

impl std::fmt::Debug for RingAudioBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingAudioBuffer")
            .field("capacity", &self.capacity)
            .field("channels", &self.channels)
            .field("cursor", &self.cursor())
            .finish_non_exhaustive()
    }
}

/// Cyclic forward distance from `from` to `to` in a ring of `ring_size`
///
/// Always in `[0, ring_size)`. Used to measure how much unread audio a
/// sequential cursor has available.
#[must_use]
pub fn distance_in_ring(from: i64, to: i64, ring_size: i64) -> i64 {
    debug_assert!(ring_size > 0);
    (to - from).rem_euclid(ring_size)
}

/// RMS amplitude of a sample slice
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}
