//! Voice pipeline session
//!
//! Owns the ring buffer, the capture adapter, the state machine, and
//! the transcription coordinator, and wires them together with a tokio
//! loop: a periodic tick advances the machine, dispatched requests run
//! as spawned tasks, and their results are fed back through a channel.
//!
//! Observers are an explicit list owned by the session and torn down
//! with it. A panic inside an observer is caught at the emit boundary
//! and logged; it never unwinds into the state machine.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use crate::audio::{AudioWindow, CaptureDevice, MicCapture, RingAudioBuffer};
use crate::config::PipelineConfig;
use crate::listener::machine::{
    Category, DispatchRequest, TickOutput, VoiceActivationStateMachine, VoiceEvent,
};
use crate::transcribe::{
    AudioKind, HttpTranscriber, Transcription, TranscriptionBackend, TranscriptionCoordinator,
};
use crate::{Error, Result};

/// Tick granularity of the session loop
const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Observer callback for session events
pub type EventObserver = Box<dyn Fn(&VoiceEvent) + Send>;

/// A completed transcription arriving back at the session loop
struct TranscriptionArrival {
    category: Category,
    generation: u64,
    result: Transcription,
}

/// A voice-activation session
///
/// Not `Send`: the cpal stream must stay on the thread that created it,
/// so the session loop runs wherever the session was built.
pub struct VoicePipeline {
    config: PipelineConfig,
    ring: Arc<RingAudioBuffer>,
    capture: MicCapture,
    machine: VoiceActivationStateMachine,
    coordinator: TranscriptionCoordinator,
    observers: Vec<EventObserver>,
    results_tx: mpsc::UnboundedSender<TranscriptionArrival>,
    results_rx: Option<mpsc::UnboundedReceiver<TranscriptionArrival>>,
    sample_rate: u32,
}

impl VoicePipeline {
    /// Create a session with the HTTP transcription backend
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let backend = HttpTranscriber::new(
            config.backend.endpoint.clone(),
            config.backend.model.clone(),
            config.backend.api_key.clone(),
        )?;
        Self::with_backend(config, Arc::new(backend))
    }

    /// Create a session over a caller-supplied backend
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid.
    pub fn with_backend(
        config: PipelineConfig,
        backend: Arc<dyn TranscriptionBackend>,
    ) -> Result<Self> {
        config.validate()?;

        let ring = Arc::new(RingAudioBuffer::new(
            config.ring_capacity(),
            config.channels,
        ));
        let capture = MicCapture::new(Arc::clone(&ring), config.input_gain);
        let machine =
            VoiceActivationStateMachine::new(config.clone(), Arc::clone(&ring), config.sample_rate);
        let coordinator = TranscriptionCoordinator::new(backend);
        let (results_tx, results_rx) = mpsc::unbounded_channel();

        Ok(Self {
            sample_rate: config.sample_rate,
            config,
            ring,
            capture,
            machine,
            coordinator,
            observers: Vec::new(),
            results_tx,
            results_rx: Some(results_rx),
        })
    }

    /// Register an observer for session events
    pub fn subscribe(&mut self, observer: impl Fn(&VoiceEvent) + Send + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// Start the capture device if it is not already running
    ///
    /// # Errors
    ///
    /// Returns error if the device cannot be opened.
    pub fn start_capture(&mut self) -> Result<u32> {
        if self.capture.is_running() {
            return Ok(self.sample_rate);
        }

        let actual = self.capture.start(self.config.sample_rate)?;
        if actual != self.sample_rate {
            tracing::info!(
                requested = self.config.sample_rate,
                actual,
                "capture device chose a different sample rate"
            );
            self.sample_rate = actual;
            self.machine.set_sample_rate(actual);
        }
        Ok(actual)
    }

    /// Begin probing for the wake keyword
    ///
    /// Starts the capture device when needed. Idempotent; anything
    /// already in flight from a previous session is invalidated.
    ///
    /// # Errors
    ///
    /// Returns error if capture cannot be started.
    pub fn start_keyword_listening(&mut self) -> Result<()> {
        self.start_capture()?;
        self.machine.start_listening(Instant::now());
        Ok(())
    }

    /// Stop probing; the capture device keeps running
    pub fn stop_keyword_listening(&mut self) {
        self.machine.stop_listening();
    }

    /// Begin command capture as if `trigger` had been heard
    ///
    /// # Errors
    ///
    /// Returns error if capture cannot be started.
    pub fn start_cmd_listening(&mut self, trigger: &str) -> Result<()> {
        self.start_capture()?;
        let output = self.machine.start_command_listening(trigger, Instant::now());
        self.process(output);
        Ok(())
    }

    /// Transcribe caller-supplied mono samples
    pub async fn transcribe(&self, samples: &[f32], sample_rate: u32) -> Transcription {
        self.coordinator
            .transcribe(samples, sample_rate, AudioKind::Continuous)
            .await
    }

    /// The most recent `seconds` of captured audio
    ///
    /// # Errors
    ///
    /// Returns error when nothing has been captured yet.
    pub fn read_last_seconds(&self, seconds: f32) -> Result<AudioWindow> {
        self.ring.read_last_seconds(seconds, self.sample_rate)
    }

    /// RMS loudness over the most recent `seconds` of audio
    #[must_use]
    pub fn compute_recent_rms(&self, seconds: f32) -> f32 {
        self.ring.recent_rms(seconds, self.sample_rate)
    }

    /// Run the session loop until interrupted
    ///
    /// # Errors
    ///
    /// Returns error if the loop is already running or capture fails.
    pub async fn run(&mut self) -> Result<()> {
        let mut results_rx = self
            .results_rx
            .take()
            .ok_or_else(|| Error::Config("session loop already running".to_string()))?;

        self.start_capture()?;

        let mut interval = tokio::time::interval(TICK_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let output = self.machine.tick(Instant::now());
                    self.process(output);
                }
                arrival = results_rx.recv() => {
                    let Some(arrival) = arrival else { break };
                    let output = self.machine.handle_result(
                        arrival.category,
                        arrival.generation,
                        arrival.result.success,
                        arrival.result.text.as_deref(),
                        Instant::now(),
                    );
                    self.process(output);
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("interrupt received, shutting down");
                    break;
                }
            }
        }

        self.results_rx = Some(results_rx);
        self.teardown();
        Ok(())
    }

    /// Stop capture and invalidate all in-flight work; idempotent
    pub fn teardown(&mut self) {
        self.machine.stop_listening();
        self.machine.bump_all_generations();
        self.capture.stop();
    }

    /// Spawn dispatches and deliver events from one machine advance
    fn process(&mut self, output: TickOutput) {
        for dispatch in output.dispatches {
            self.spawn_dispatch(dispatch);
        }
        self.emit(&output.events);
    }

    fn spawn_dispatch(&self, dispatch: DispatchRequest) {
        let coordinator = self.coordinator.clone();
        let tx = self.results_tx.clone();
        let kind = audio_kind(dispatch.category);

        tokio::spawn(async move {
            let result = coordinator
                .transcribe(&dispatch.samples, dispatch.sample_rate, kind)
                .await;
            // The loop may already be gone during teardown.
            let _ = tx.send(TranscriptionArrival {
                category: dispatch.category,
                generation: dispatch.generation,
                result,
            });
        });
    }

    /// Deliver events to every observer, containing panics
    fn emit(&self, events: &[VoiceEvent]) {
        for event in events {
            tracing::debug!(?event, "voice event");
            for observer in &self.observers {
                if catch_unwind(AssertUnwindSafe(|| observer(event))).is_err() {
                    tracing::error!(?event, "event observer panicked");
                }
            }
        }
    }
}

/// Backend tuning flag for a dispatch category
///
/// Probes are short keyword scans; command windows and continuous clips
/// are full utterances.
const fn audio_kind(category: Category) -> AudioKind {
    match category {
        Category::Probe => AudioKind::KeywordProbe,
        Category::Command | Category::Continuous => AudioKind::Continuous,
    }
}
