//! Voice activation state machine
//!
//! A sans-IO core advanced by `tick(now)`: it decides when to probe for
//! the wake keyword, when command capture starts and ends, and which
//! transcription results are still current. All IO (timers, the actual
//! backend calls) lives in the driver; the machine only reads the ring
//! and emits dispatch requests and events.
//!
//! Cancellation is cooperative. Each dispatch category carries a
//! generation counter captured at dispatch time; bumping a counter
//! silently invalidates every result still in flight for that category.
//! Nothing prevents requests of different categories from overlapping —
//! correctness is at-most-one-honored-result per category, not
//! at-most-one-in-flight request.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::audio::{RingAudioBuffer, distance_in_ring};
use crate::config::PipelineConfig;
use crate::keyword::{KeywordSet, extract_command_after_wake_word};

/// RMS measurement window for silence detection, in seconds
const SILENCE_PROBE_SECONDS: f32 = 0.2;

/// Convert a configured duration in seconds to a [`Duration`]
///
/// Rounded to whole milliseconds so that a value like 0.4, which has no
/// exact f32 representation, still compares equal at a tick landing on
/// the configured boundary.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn configured_duration(seconds: f32) -> Duration {
    Duration::from_millis((f64::from(seconds) * 1000.0).round() as u64)
}

/// Operating mode; the machine is in exactly one at any instant
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Periodically probing recent audio for the wake keyword
    Probing,
    /// Keyword heard; waiting out the trigger phrase before capture
    PausingThenCommand,
    /// Capturing a command, watching for silence or the length cap
    WaitingForCommandEnd,
    /// A command or continuous clip is in flight at the backend
    Busy,
    /// Transcribing fixed-length sequential clips
    Continuous,
}

/// In-flight work category, one generation counter each
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Category {
    /// Wake keyword probe
    Probe,
    /// Captured command window
    Command,
    /// Continuous-mode clip
    Continuous,
}

/// A transcription the driver should dispatch
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    /// Work category
    pub category: Category,
    /// Generation captured at dispatch time
    pub generation: u64,
    /// Mono samples to transcribe
    pub samples: Vec<f32>,
    /// Sample rate of the window
    pub sample_rate: u32,
}

/// Notification to session observers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceEvent {
    /// Wake keyword heard in a probe window
    KeywordDetected(String),
    /// Command capture has begun
    CommandListenStarted,
    /// A command was transcribed
    CommandHeard(String),
    /// Command capture ended with no speech
    EmptyCommandHeard,
    /// Speech transcribed in continuous mode
    SpeechRecognized(String),
}

/// What one advance of the machine produced
#[derive(Debug, Default)]
pub struct TickOutput {
    /// Transcriptions to dispatch
    pub dispatches: Vec<DispatchRequest>,
    /// Events for session observers
    pub events: Vec<VoiceEvent>,
}

impl TickOutput {
    fn merge(&mut self, other: Self) {
        self.dispatches.extend(other.dispatches);
        self.events.extend(other.events);
    }
}

/// Orchestrates probing, command capture, and continuous transcription
pub struct VoiceActivationStateMachine {
    config: PipelineConfig,
    keywords: KeywordSet,
    ring: Arc<RingAudioBuffer>,
    sample_rate: u32,

    mode: Mode,
    listening: bool,

    probe_gen: u64,
    cmd_gen: u64,
    continuous_gen: u64,

    last_probe_at: Option<Instant>,
    pause_started_at: Option<Instant>,
    command_start_frame: i64,
    command_started_at: Option<Instant>,
    last_non_silent_at: Option<Instant>,

    continuous_cursor: i64,
    last_clip_at: Option<Instant>,

    /// Category whose in-flight request holds `Mode::Busy`
    busy_source: Option<Category>,
}

impl VoiceActivationStateMachine {
    /// Create a machine over `ring` with the given configuration
    #[must_use]
    pub fn new(config: PipelineConfig, ring: Arc<RingAudioBuffer>, sample_rate: u32) -> Self {
        let keywords = config.keyword_set();
        let idle = if config.continuous_default {
            Mode::Continuous
        } else {
            Mode::Probing
        };

        Self {
            config,
            keywords,
            ring,
            sample_rate,
            mode: idle,
            listening: false,
            probe_gen: 0,
            cmd_gen: 0,
            continuous_gen: 0,
            last_probe_at: None,
            pause_started_at: None,
            command_start_frame: 0,
            command_started_at: None,
            last_non_silent_at: None,
            continuous_cursor: 0,
            last_clip_at: None,
            busy_source: None,
        }
    }

    /// Current mode
    #[must_use]
    pub const fn mode(&self) -> Mode {
        self.mode
    }

    /// Whether keyword/continuous ticks are allowed to fire
    #[must_use]
    pub const fn is_listening(&self) -> bool {
        self.listening
    }

    /// Live generation for a category
    #[must_use]
    pub const fn generation(&self, category: Category) -> u64 {
        match category {
            Category::Probe => self.probe_gen,
            Category::Command => self.cmd_gen,
            Category::Continuous => self.continuous_gen,
        }
    }

    /// Update the sample rate after the device reports the actual one
    pub const fn set_sample_rate(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate;
    }

    const fn idle_mode(&self) -> Mode {
        if self.config.continuous_default {
            Mode::Continuous
        } else {
            Mode::Probing
        }
    }

    /// Allow probing/continuous ticks to fire
    ///
    /// Does not touch the capture device; idempotent. In-flight results
    /// from before the call are invalidated.
    pub fn start_listening(&mut self, now: Instant) {
        if self.listening {
            return;
        }

        self.listening = true;
        self.bump_all_generations();
        self.mode = self.idle_mode();
        self.busy_source = None;
        self.last_probe_at = None;
        self.last_clip_at = None;
        self.continuous_cursor = self.ring.cursor();
        self.last_non_silent_at = Some(now);

        tracing::info!(mode = ?self.mode, "keyword listening started");
    }

    /// Stop probing/continuous ticks; idempotent
    ///
    /// The capture device keeps running. Everything in flight becomes
    /// stale.
    pub fn stop_listening(&mut self) {
        if !self.listening && self.busy_source.is_none() {
            return;
        }

        self.listening = false;
        self.bump_all_generations();
        self.mode = self.idle_mode();
        self.busy_source = None;
        self.pause_started_at = None;
        self.command_started_at = None;

        tracing::info!("keyword listening stopped");
    }

    /// Begin command capture as if `trigger` had been heard
    pub fn start_command_listening(&mut self, trigger: &str, now: Instant) -> TickOutput {
        let mut output = TickOutput::default();

        self.listening = true;
        self.probe_gen += 1;
        self.continuous_gen += 1;
        self.busy_source = None;
        self.mode = Mode::PausingThenCommand;
        self.pause_started_at = Some(now);
        output
            .events
            .push(VoiceEvent::KeywordDetected(trigger.to_string()));

        tracing::debug!(trigger, "command capture requested");
        output
    }

    /// Invalidate all in-flight work (session teardown)
    pub fn bump_all_generations(&mut self) {
        self.probe_gen += 1;
        self.cmd_gen += 1;
        self.continuous_gen += 1;
    }

    /// Advance timers and issue any due dispatches
    pub fn tick(&mut self, now: Instant) -> TickOutput {
        if !self.listening {
            return TickOutput::default();
        }

        match self.mode {
            Mode::Probing => self.tick_probe(now),
            Mode::PausingThenCommand => self.tick_pause(now),
            Mode::WaitingForCommandEnd => self.tick_command_window(now),
            Mode::Continuous => self.tick_continuous(now),
            Mode::Busy => TickOutput::default(),
        }
    }

    /// Handle an asynchronous transcription result
    ///
    /// Stale results (generation mismatch) are discarded silently, but a
    /// stale result from the category holding `Busy` still releases the
    /// mode — the request it superseded is never coming back.
    pub fn handle_result(
        &mut self,
        category: Category,
        generation: u64,
        success: bool,
        text: Option<&str>,
        now: Instant,
    ) -> TickOutput {
        let mut output = TickOutput::default();

        let release_busy = self.mode == Mode::Busy && self.busy_source == Some(category);

        if generation != self.generation(category) {
            tracing::debug!(
                ?category,
                generation,
                live = self.generation(category),
                "discarding stale transcription result"
            );
            if release_busy {
                self.busy_source = None;
                self.mode = self.idle_mode();
            }
            return output;
        }

        match category {
            Category::Probe => output.merge(self.handle_probe_result(success, text, now)),
            Category::Command => {
                // Honor at most once even if a duplicate slips through.
                self.cmd_gen += 1;
                if release_busy {
                    self.busy_source = None;
                    self.mode = self.idle_mode();
                }
                output.merge(Self::command_events(success, text));
            }
            Category::Continuous => {
                if release_busy {
                    self.busy_source = None;
                    self.mode = self.idle_mode();
                }
                if success
                    && let Some(text) = text.map(str::trim)
                    && !text.is_empty()
                {
                    output
                        .events
                        .push(VoiceEvent::SpeechRecognized(text.to_string()));
                    output.events.push(VoiceEvent::CommandHeard(text.to_string()));
                }
            }
        }

        output
    }

    // --- Probing ---

    fn tick_probe(&mut self, now: Instant) -> TickOutput {
        let mut output = TickOutput::default();

        let interval = configured_duration(self.config.probe_interval);
        let due = self
            .last_probe_at
            .is_none_or(|last| now.duration_since(last) >= interval);
        if !due {
            return output;
        }

        match self
            .ring
            .read_last_seconds(self.config.probe_seconds, self.sample_rate)
        {
            Ok(window) if window.frame_count() > 0 => {
                output.dispatches.push(DispatchRequest {
                    category: Category::Probe,
                    generation: self.probe_gen,
                    samples: window.samples,
                    sample_rate: self.sample_rate,
                });
                self.last_probe_at = Some(now);
            }
            Ok(_) => {}
            Err(e) => {
                // Not enough history yet; retry next tick.
                tracing::trace!(error = %e, "probe window unavailable");
            }
        }

        output
    }

    fn handle_probe_result(
        &mut self,
        success: bool,
        text: Option<&str>,
        now: Instant,
    ) -> TickOutput {
        let mut output = TickOutput::default();

        if !self.listening || self.mode != Mode::Probing || !success {
            return output;
        }

        let Some(text) = text else {
            return output;
        };

        if self.keywords.matched(text).is_some() {
            tracing::info!(text, "wake keyword detected");

            // Invalidate every other in-flight probe and continuous clip.
            self.probe_gen += 1;
            self.continuous_gen += 1;

            self.mode = Mode::PausingThenCommand;
            self.pause_started_at = Some(now);
            output
                .events
                .push(VoiceEvent::KeywordDetected(text.to_string()));
        }

        output
    }

    // --- Post-keyword pause and command capture ---

    fn tick_pause(&mut self, now: Instant) -> TickOutput {
        let mut output = TickOutput::default();

        let pause = configured_duration(self.config.post_keyword_pause);
        let elapsed = self
            .pause_started_at
            .is_none_or(|started| now.duration_since(started) >= pause);
        if !elapsed {
            return output;
        }

        self.command_start_frame = self.ring.cursor();
        self.command_started_at = Some(now);
        self.last_non_silent_at = Some(now);
        self.mode = Mode::WaitingForCommandEnd;
        output.events.push(VoiceEvent::CommandListenStarted);

        tracing::debug!(
            start_frame = self.command_start_frame,
            "command capture started"
        );
        output
    }

    fn tick_command_window(&mut self, now: Instant) -> TickOutput {
        let mut output = TickOutput::default();

        let rms = self.ring.recent_rms(SILENCE_PROBE_SECONDS, self.sample_rate);
        if rms >= self.config.silence_rms_threshold {
            self.last_non_silent_at = Some(now);
        }

        let silence_timeout = configured_duration(self.config.silence_timeout);
        let max_duration = configured_duration(self.config.command_max_seconds);

        let silent_long_enough = self
            .last_non_silent_at
            .is_some_and(|t| now.duration_since(t) >= silence_timeout);
        let hit_length_cap = self
            .command_started_at
            .is_some_and(|t| now.duration_since(t) >= max_duration);

        if !silent_long_enough && !hit_length_cap {
            return output;
        }

        tracing::debug!(
            silence = silent_long_enough,
            length_cap = hit_length_cap,
            "finalizing command capture"
        );
        output.merge(self.finalize_command());
        output
    }

    fn finalize_command(&mut self) -> TickOutput {
        let mut output = TickOutput::default();

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
        let max_frames =
            (self.config.command_max_seconds * self.sample_rate as f32).max(1.0) as i64;
        let captured = self.ring.cursor() - self.command_start_frame;
        let frames = captured.clamp(1, max_frames);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        match self
            .ring
            .read_window(self.command_start_frame, frames as usize)
        {
            Ok(window) => {
                self.cmd_gen += 1;
                self.mode = Mode::Busy;
                self.busy_source = Some(Category::Command);
                output.dispatches.push(DispatchRequest {
                    category: Category::Command,
                    generation: self.cmd_gen,
                    samples: window.samples,
                    sample_rate: self.sample_rate,
                });
            }
            Err(e) => {
                // Nothing usable was captured; report an empty command.
                tracing::warn!(error = %e, "command window unreadable");
                self.mode = self.idle_mode();
                self.busy_source = None;
                output.events.push(VoiceEvent::EmptyCommandHeard);
            }
        }

        output
    }

    fn command_events(success: bool, text: Option<&str>) -> TickOutput {
        let mut output = TickOutput::default();

        if !success {
            // Backend failure: back to idle, eligible for retry later.
            tracing::warn!("command transcription failed");
            return output;
        }

        match text.map(str::trim) {
            Some(text) if !text.is_empty() => {
                output
                    .events
                    .push(VoiceEvent::CommandHeard(text.to_string()));
            }
            _ => output.events.push(VoiceEvent::EmptyCommandHeard),
        }

        output
    }

    // --- Continuous mode ---

    fn tick_continuous(&mut self, now: Instant) -> TickOutput {
        let mut output = TickOutput::default();

        let clip = configured_duration(self.config.clip_seconds);
        let Some(last) = self.last_clip_at else {
            // Align the clip timer with the first tick in this mode.
            self.last_clip_at = Some(now);
            return output;
        };
        if now.duration_since(last) < clip {
            return output;
        }

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
        let frames_needed = (self.config.clip_seconds * self.sample_rate as f32) as i64;
        #[allow(clippy::cast_possible_wrap)]
        let ring_size = self.ring.capacity() as i64;
        let position = self.ring.cursor();

        let available = distance_in_ring(
            self.continuous_cursor.rem_euclid(ring_size),
            position.rem_euclid(ring_size),
            ring_size,
        );
        if available < frames_needed {
            // Not enough unread audio yet; try again next tick.
            return output;
        }

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let read = self
            .ring
            .read_window(self.continuous_cursor, frames_needed as usize);
        self.last_clip_at = Some(now);

        match read {
            Ok(window) => {
                // The cursor advances even when the clip is skipped for
                // silence; clips never overlap and are never re-read.
                self.continuous_cursor += frames_needed;

                let rms = window.rms();
                if rms < self.config.continuous_silence_threshold {
                    tracing::trace!(rms, "silent clip skipped");
                    return output;
                }

                self.mode = Mode::Busy;
                self.busy_source = Some(Category::Continuous);
                output.dispatches.push(DispatchRequest {
                    category: Category::Continuous,
                    generation: self.continuous_gen,
                    samples: window.samples,
                    sample_rate: self.sample_rate,
                });
            }
            Err(e) => {
                // The writer lapped the sequential cursor; resynchronize
                // to the present rather than chasing overwritten audio.
                tracing::warn!(error = %e, "continuous cursor lapped, resyncing");
                self.continuous_cursor = position;
            }
        }

        output
    }
}

/// Strip the wake word from a detected utterance
///
/// Convenience for callers reacting to [`VoiceEvent::KeywordDetected`]:
/// `"hey hark, lights on"` becomes `"lights on"` when the keyword
/// prefixes the utterance, otherwise the text is returned unchanged.
#[must_use]
pub fn command_from_utterance(text: &str, wake_word: &str) -> String {
    extract_command_after_wake_word(text, wake_word)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;

    fn test_config() -> PipelineConfig {
        PipelineConfig {
            keyword: "computer".to_string(),
            probe_seconds: 2.0,
            probe_interval: 1.0,
            post_keyword_pause: 0.4,
            command_max_seconds: 10.0,
            silence_rms_threshold: 0.01,
            silence_timeout: 2.0,
            clip_seconds: 3.0,
            continuous_silence_threshold: 0.01,
            rolling_buffer_seconds: 30.0,
            ..PipelineConfig::default()
        }
    }

    fn machine_with_audio(
        config: PipelineConfig,
        seconds_of_audio: f32,
        amplitude: f32,
    ) -> (VoiceActivationStateMachine, Arc<RingAudioBuffer>) {
        let rate = config.sample_rate;
        let ring = Arc::new(RingAudioBuffer::new(config.ring_capacity(), 1));
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let frames = (seconds_of_audio * rate as f32) as usize;
        ring.write(&vec![amplitude; frames]);

        let machine = VoiceActivationStateMachine::new(config, Arc::clone(&ring), rate);
        (machine, ring)
    }

    #[test]
    fn no_ticks_until_listening() {
        let (mut machine, _ring) = machine_with_audio(test_config(), 5.0, 0.1);
        let now = Instant::now();

        let output = machine.tick(now);
        assert!(output.dispatches.is_empty());
        assert!(!machine.is_listening());
    }

    #[test]
    fn probe_fires_on_interval() {
        let (mut machine, _ring) = machine_with_audio(test_config(), 5.0, 0.1);
        let start = Instant::now();
        machine.start_listening(start);

        let output = machine.tick(start);
        assert_eq!(output.dispatches.len(), 1);
        let dispatch = &output.dispatches[0];
        assert_eq!(dispatch.category, Category::Probe);
        assert_eq!(dispatch.samples.len(), 2 * 16000);

        // Within the interval: no new probe.
        let output = machine.tick(start + Duration::from_millis(500));
        assert!(output.dispatches.is_empty());

        // Past the interval: probe again.
        let output = machine.tick(start + Duration::from_millis(1100));
        assert_eq!(output.dispatches.len(), 1);
    }

    #[test]
    fn keyword_match_enters_command_capture() {
        let (mut machine, ring) = machine_with_audio(test_config(), 5.0, 0.1);
        let start = Instant::now();
        machine.start_listening(start);

        let probe = machine.tick(start).dispatches.remove(0);
        let output = machine.handle_result(
            Category::Probe,
            probe.generation,
            true,
            Some("hey computer turn on lights"),
            start + Duration::from_millis(200),
        );

        assert_eq!(
            output.events,
            vec![VoiceEvent::KeywordDetected(
                "hey computer turn on lights".to_string()
            )]
        );
        assert_eq!(machine.mode(), Mode::PausingThenCommand);

        // Pause not yet over.
        let output = machine.tick(start + Duration::from_millis(300));
        assert!(output.events.is_empty());
        assert_eq!(machine.mode(), Mode::PausingThenCommand);

        // After the pause, capture begins at the current cursor.
        let output = machine.tick(start + Duration::from_millis(700));
        assert_eq!(output.events, vec![VoiceEvent::CommandListenStarted]);
        assert_eq!(machine.mode(), Mode::WaitingForCommandEnd);
        assert_eq!(machine.command_start_frame, ring.cursor());
    }

    #[test]
    fn pause_ends_at_exact_millisecond_boundary() {
        // 0.4s is not exactly representable as f32 seconds; a tick
        // landing exactly on +400ms must still end the pause.
        let (mut machine, _ring) = machine_with_audio(test_config(), 5.0, 0.1);
        let start = Instant::now();
        machine.start_listening(start);
        machine.start_command_listening("computer", start);

        let output = machine.tick(start + Duration::from_millis(400));
        assert_eq!(output.events, vec![VoiceEvent::CommandListenStarted]);
        assert_eq!(machine.mode(), Mode::WaitingForCommandEnd);
    }

    #[test]
    fn silence_timeout_fires_at_exact_boundary() {
        let (mut machine, ring) = machine_with_audio(test_config(), 5.0, 0.0);
        let start = Instant::now();
        machine.start_listening(start);
        machine.start_command_listening("computer", start);
        machine.tick(start + Duration::from_millis(400));
        ring.write(&vec![0.0; 16000]);

        // Silence clock started at +400ms; exactly 2s later it fires.
        let output = machine.tick(start + Duration::from_millis(2400));
        assert_eq!(output.dispatches.len(), 1);
        assert_eq!(machine.mode(), Mode::Busy);
    }

    #[test]
    fn non_matching_probe_stays_probing() {
        let (mut machine, _ring) = machine_with_audio(test_config(), 5.0, 0.1);
        let start = Instant::now();
        machine.start_listening(start);

        let probe = machine.tick(start).dispatches.remove(0);
        let output = machine.handle_result(
            Category::Probe,
            probe.generation,
            true,
            Some("nothing relevant"),
            start,
        );

        assert!(output.events.is_empty());
        assert_eq!(machine.mode(), Mode::Probing);
    }

    #[test]
    fn stale_probe_result_is_discarded() {
        let (mut machine, _ring) = machine_with_audio(test_config(), 5.0, 0.1);
        let start = Instant::now();
        machine.start_listening(start);

        let probe = machine.tick(start).dispatches.remove(0);

        // A keyword arrives first and bumps the probe generation.
        machine.handle_result(
            Category::Probe,
            probe.generation,
            true,
            Some("computer"),
            start,
        );
        assert_eq!(machine.mode(), Mode::PausingThenCommand);

        // The older in-flight probe now resolves with a keyword too;
        // it must change nothing.
        let output = machine.handle_result(
            Category::Probe,
            probe.generation,
            true,
            Some("computer again"),
            start,
        );
        assert!(output.events.is_empty());
        assert_eq!(machine.mode(), Mode::PausingThenCommand);
    }

    #[test]
    fn silence_timeout_finalizes_command() {
        // Ring full of silence: RMS stays below threshold after start.
        let (mut machine, ring) = machine_with_audio(test_config(), 5.0, 0.0);
        let start = Instant::now();
        machine.start_listening(start);

        machine.start_command_listening("computer", start);
        machine.tick(start + Duration::from_millis(400));
        assert_eq!(machine.mode(), Mode::WaitingForCommandEnd);

        // Feed some audio so the command window is readable.
        ring.write(&vec![0.0; 16000]);

        // Before the silence timeout nothing happens.
        let output = machine.tick(start + Duration::from_millis(1400));
        assert!(output.dispatches.is_empty());

        // At 2s of silence the command finalizes even though
        // command_max_seconds is 10s.
        let output = machine.tick(start + Duration::from_millis(2500));
        assert_eq!(output.dispatches.len(), 1);
        assert_eq!(output.dispatches[0].category, Category::Command);
        assert_eq!(machine.mode(), Mode::Busy);
    }

    #[test]
    fn loud_audio_defers_silence_timeout() {
        let config = test_config();
        let rate = config.sample_rate;
        let ring = Arc::new(RingAudioBuffer::new(config.ring_capacity(), 1));
        ring.write(&vec![0.2; (5 * rate) as usize]);
        let mut machine = VoiceActivationStateMachine::new(config, Arc::clone(&ring), rate);

        let start = Instant::now();
        machine.start_listening(start);
        machine.start_command_listening("computer", start);
        machine.tick(start + Duration::from_millis(400));

        // Loud ring keeps refreshing the silence clock.
        let output = machine.tick(start + Duration::from_millis(2500));
        assert!(output.dispatches.is_empty());
        assert_eq!(machine.mode(), Mode::WaitingForCommandEnd);
    }

    #[test]
    fn command_result_round_trip() {
        let (mut machine, ring) = machine_with_audio(test_config(), 5.0, 0.0);
        let start = Instant::now();
        machine.start_listening(start);
        machine.start_command_listening("computer", start);
        machine.tick(start + Duration::from_millis(400));
        ring.write(&vec![0.0; 16000]);

        let output = machine.tick(start + Duration::from_millis(2500));
        let dispatch = &output.dispatches[0];

        let output = machine.handle_result(
            Category::Command,
            dispatch.generation,
            true,
            Some("turn on the lights"),
            start + Duration::from_secs(3),
        );

        assert_eq!(
            output.events,
            vec![VoiceEvent::CommandHeard("turn on the lights".to_string())]
        );
        assert_eq!(machine.mode(), Mode::Probing);
    }

    #[test]
    fn empty_command_result_signals_empty() {
        let (mut machine, ring) = machine_with_audio(test_config(), 5.0, 0.0);
        let start = Instant::now();
        machine.start_listening(start);
        machine.start_command_listening("computer", start);
        machine.tick(start + Duration::from_millis(400));
        ring.write(&vec![0.0; 16000]);

        let dispatch = machine
            .tick(start + Duration::from_millis(2500))
            .dispatches
            .remove(0);
        let output = machine.handle_result(
            Category::Command,
            dispatch.generation,
            true,
            None,
            start + Duration::from_secs(3),
        );

        assert_eq!(output.events, vec![VoiceEvent::EmptyCommandHeard]);
        assert_eq!(machine.mode(), Mode::Probing);
    }

    #[test]
    fn stale_command_result_releases_busy_without_events() {
        let (mut machine, ring) = machine_with_audio(test_config(), 5.0, 0.0);
        let start = Instant::now();
        machine.start_listening(start);
        machine.start_command_listening("computer", start);
        machine.tick(start + Duration::from_millis(400));
        ring.write(&vec![0.0; 16000]);

        let dispatch = machine
            .tick(start + Duration::from_millis(2500))
            .dispatches
            .remove(0);
        assert_eq!(machine.mode(), Mode::Busy);

        // Bump before arrival (e.g. a stop/start cycle would do this).
        machine.bump_all_generations();

        let output = machine.handle_result(
            Category::Command,
            dispatch.generation,
            true,
            Some("too late"),
            start + Duration::from_secs(3),
        );

        assert!(output.events.is_empty());
        assert_eq!(machine.mode(), Mode::Probing);
    }

    #[test]
    fn busy_blocks_probe_dispatch() {
        let (mut machine, ring) = machine_with_audio(test_config(), 5.0, 0.0);
        let start = Instant::now();
        machine.start_listening(start);
        machine.start_command_listening("computer", start);
        machine.tick(start + Duration::from_millis(400));
        ring.write(&vec![0.0; 16000]);
        machine.tick(start + Duration::from_millis(2500));
        assert_eq!(machine.mode(), Mode::Busy);

        let output = machine.tick(start + Duration::from_secs(5));
        assert!(output.dispatches.is_empty());
    }

    #[test]
    fn continuous_clip_skips_silence_but_advances_cursor() {
        let mut config = test_config();
        config.continuous_default = true;
        let rate = config.sample_rate;
        let ring = Arc::new(RingAudioBuffer::new(config.ring_capacity(), 1));
        let mut machine = VoiceActivationStateMachine::new(config, Arc::clone(&ring), rate);

        let start = Instant::now();
        machine.start_listening(start);
        assert_eq!(machine.mode(), Mode::Continuous);

        // First tick only aligns the clip timer.
        machine.tick(start);

        // 3s of quiet audio (RMS 0.005 < threshold 0.01).
        ring.write(&vec![0.005; (3 * rate) as usize]);
        let output = machine.tick(start + Duration::from_secs(3));
        assert!(output.dispatches.is_empty());
        assert_eq!(machine.continuous_cursor, i64::from(3 * rate));

        // 3s of loud audio (RMS 0.2): dispatched, cursor advances again.
        ring.write(&vec![0.2; (3 * rate) as usize]);
        let output = machine.tick(start + Duration::from_secs(6));
        assert_eq!(output.dispatches.len(), 1);
        assert_eq!(output.dispatches[0].category, Category::Continuous);
        assert_eq!(machine.continuous_cursor, i64::from(6 * rate));
        assert_eq!(machine.mode(), Mode::Busy);

        // A non-empty result emits both notifications and returns the
        // machine to continuous mode.
        let generation = output.dispatches[0].generation;
        let output = machine.handle_result(
            Category::Continuous,
            generation,
            true,
            Some("ambient speech"),
            start + Duration::from_secs(7),
        );
        assert_eq!(
            output.events,
            vec![
                VoiceEvent::SpeechRecognized("ambient speech".to_string()),
                VoiceEvent::CommandHeard("ambient speech".to_string()),
            ]
        );
        assert_eq!(machine.mode(), Mode::Continuous);
    }

    #[test]
    fn continuous_waits_for_enough_audio() {
        let mut config = test_config();
        config.continuous_default = true;
        let rate = config.sample_rate;
        let ring = Arc::new(RingAudioBuffer::new(config.ring_capacity(), 1));
        let mut machine = VoiceActivationStateMachine::new(config, Arc::clone(&ring), rate);

        let start = Instant::now();
        machine.start_listening(start);
        machine.tick(start);

        // Only 1s of audio for a 3s clip: nothing happens.
        ring.write(&vec![0.2; rate as usize]);
        let output = machine.tick(start + Duration::from_secs(3));
        assert!(output.dispatches.is_empty());
        assert_eq!(machine.continuous_cursor, 0);
    }

    #[test]
    fn stop_listening_is_idempotent_and_invalidates() {
        let (mut machine, _ring) = machine_with_audio(test_config(), 5.0, 0.1);
        let start = Instant::now();
        machine.start_listening(start);

        let probe = machine.tick(start).dispatches.remove(0);
        machine.stop_listening();
        machine.stop_listening();

        let output = machine.handle_result(
            Category::Probe,
            probe.generation,
            true,
            Some("computer"),
            start,
        );
        assert!(output.events.is_empty());
        assert_eq!(machine.mode(), Mode::Probing);
        assert!(!machine.is_listening());
    }

    #[test]
    fn restarting_listening_invalidates_old_probes() {
        let (mut machine, _ring) = machine_with_audio(test_config(), 5.0, 0.1);
        let start = Instant::now();
        machine.start_listening(start);
        let probe = machine.tick(start).dispatches.remove(0);

        machine.stop_listening();
        machine.start_listening(start + Duration::from_secs(1));

        let output = machine.handle_result(
            Category::Probe,
            probe.generation,
            true,
            Some("computer"),
            start + Duration::from_secs(2),
        );
        assert!(output.events.is_empty());
        assert_eq!(machine.mode(), Mode::Probing);
    }

    #[test]
    fn command_from_utterance_strips_wake_word() {
        assert_eq!(
            command_from_utterance("computer, lights on", "computer"),
            "lights on"
        );
        assert_eq!(
            command_from_utterance("lights on", "computer"),
            "lights on"
        );
    }
}
