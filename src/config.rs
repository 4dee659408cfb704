//! Configuration for the voice pipeline
//!
//! Defaults cover a working keyword setup; an optional TOML file at
//! `~/.config/hark/config.toml` overlays them. All file fields are
//! optional so a partial file only overrides what it names.

use std::path::PathBuf;

use serde::Deserialize;

use crate::keyword::{KeywordSet, KeywordSpec};
use crate::{Error, Result};

/// Full pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Primary wake keyword
    pub keyword: String,

    /// Require word boundaries around the primary keyword
    pub keyword_boundary: bool,

    /// Alternate keywords, each with its own boundary rule
    pub alternates: Vec<KeywordSpec>,

    /// Seconds of recent audio per keyword probe
    pub probe_seconds: f32,

    /// Seconds between keyword probes
    pub probe_interval: f32,

    /// Pause after keyword detection before command capture starts
    pub post_keyword_pause: f32,

    /// Maximum command capture duration in seconds
    pub command_max_seconds: f32,

    /// RMS level below which audio counts as silence
    pub silence_rms_threshold: f32,

    /// Seconds of silence that end command capture
    pub silence_timeout: f32,

    /// Clip length for continuous mode, in seconds
    pub clip_seconds: f32,

    /// RMS level below which a continuous clip is skipped
    pub continuous_silence_threshold: f32,

    /// Return to continuous mode (instead of probing) after a command
    pub continuous_default: bool,

    /// Rolling capture buffer length in seconds
    pub rolling_buffer_seconds: f32,

    /// Gain applied to captured samples
    pub input_gain: f32,

    /// Capture sample rate in Hz
    pub sample_rate: u32,

    /// Capture channel count
    pub channels: usize,

    /// Transcription backend settings
    pub backend: BackendConfig,
}

/// Transcription backend settings
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Endpoint URL for the multipart transcription API
    pub endpoint: String,

    /// Model identifier sent with each request
    pub model: String,

    /// Bearer token (`HARK_API_KEY` env overrides the file value)
    pub api_key: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            keyword: "hark".to_string(),
            keyword_boundary: true,
            alternates: Vec::new(),
            probe_seconds: 2.0,
            probe_interval: 1.0,
            post_keyword_pause: 0.4,
            command_max_seconds: 10.0,
            silence_rms_threshold: 0.01,
            silence_timeout: 2.0,
            clip_seconds: 3.0,
            continuous_silence_threshold: 0.01,
            continuous_default: false,
            rolling_buffer_seconds: 30.0,
            input_gain: 1.0,
            sample_rate: 16000,
            channels: 1,
            backend: BackendConfig {
                endpoint: "https://api.openai.com/v1/audio/transcriptions".to_string(),
                model: "whisper-1".to_string(),
                api_key: None,
            },
        }
    }
}

impl PipelineConfig {
    /// Load defaults, the config file overlay, and env overrides
    ///
    /// # Errors
    ///
    /// Returns error if the config file exists but cannot be parsed, or
    /// if the resulting configuration is invalid.
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        if let Some(path) = config_file_path()
            && path.exists()
        {
            let raw = std::fs::read_to_string(&path)?;
            let file: ConfigFile = toml::from_str(&raw)?;
            tracing::debug!(path = %path.display(), "loaded config file");
            config.apply(file);
        }

        if let Ok(key) = std::env::var("HARK_API_KEY")
            && !key.is_empty()
        {
            config.backend.api_key = Some(key);
        }

        config.validate()?;
        Ok(config)
    }

    /// Overlay a parsed config file onto this configuration
    fn apply(&mut self, file: ConfigFile) {
        if let Some(keyword) = file.keyword {
            if let Some(phrase) = keyword.phrase {
                self.keyword = phrase;
            }
            if let Some(boundary) = keyword.boundary {
                self.keyword_boundary = boundary;
            }
            if let Some(alternates) = keyword.alternates {
                self.alternates = alternates
                    .into_iter()
                    .map(|a| KeywordSpec::new(&a.phrase, a.boundary.unwrap_or(true)))
                    .collect();
            }
        }

        if let Some(timing) = file.timing {
            set(&mut self.probe_seconds, timing.probe_seconds);
            set(&mut self.probe_interval, timing.probe_interval);
            set(&mut self.post_keyword_pause, timing.post_keyword_pause);
            set(&mut self.command_max_seconds, timing.command_max_seconds);
            set(&mut self.silence_rms_threshold, timing.silence_rms_threshold);
            set(&mut self.silence_timeout, timing.silence_timeout);
        }

        if let Some(continuous) = file.continuous {
            set(&mut self.clip_seconds, continuous.clip_seconds);
            set(
                &mut self.continuous_silence_threshold,
                continuous.silence_threshold,
            );
            set(&mut self.continuous_default, continuous.default_mode);
        }

        if let Some(audio) = file.audio {
            set(&mut self.rolling_buffer_seconds, audio.rolling_buffer_seconds);
            set(&mut self.input_gain, audio.input_gain);
            set(&mut self.sample_rate, audio.sample_rate);
            set(&mut self.channels, audio.channels);
        }

        if let Some(backend) = file.backend {
            set(&mut self.backend.endpoint, backend.endpoint);
            set(&mut self.backend.model, backend.model);
            if backend.api_key.is_some() {
                self.backend.api_key = backend.api_key;
            }
        }
    }

    /// Reject configurations the pipeline cannot run with
    ///
    /// # Errors
    ///
    /// Returns error naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.keyword.trim().is_empty() {
            return Err(Error::Config("keyword must not be empty".to_string()));
        }

        let positive = [
            ("probe_seconds", self.probe_seconds),
            ("probe_interval", self.probe_interval),
            ("command_max_seconds", self.command_max_seconds),
            ("silence_timeout", self.silence_timeout),
            ("clip_seconds", self.clip_seconds),
            ("rolling_buffer_seconds", self.rolling_buffer_seconds),
            ("input_gain", self.input_gain),
        ];
        for (name, value) in positive {
            if value <= 0.0 {
                return Err(Error::Config(format!("{name} must be positive")));
            }
        }

        if self.post_keyword_pause < 0.0 {
            return Err(Error::Config(
                "post_keyword_pause must not be negative".to_string(),
            ));
        }
        if self.sample_rate == 0 {
            return Err(Error::Config("sample_rate must be positive".to_string()));
        }
        if self.channels == 0 {
            return Err(Error::Config("channels must be positive".to_string()));
        }
        if self.rolling_buffer_seconds < self.probe_seconds {
            return Err(Error::Config(
                "rolling buffer must hold at least one probe window".to_string(),
            ));
        }

        Ok(())
    }

    /// The configured keyword set, primary first
    #[must_use]
    pub fn keyword_set(&self) -> KeywordSet {
        KeywordSet::new(
            KeywordSpec::new(&self.keyword, self.keyword_boundary),
            self.alternates.clone(),
        )
    }

    /// Ring capacity in frames for the rolling buffer
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    pub fn ring_capacity(&self) -> usize {
        (self.rolling_buffer_seconds * self.sample_rate as f32).max(1.0) as usize
    }
}

fn set<T>(target: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *target = value;
    }
}

/// Path of the user config file (`~/.config/hark/config.toml`)
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "hark", "hark")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

// --- TOML file schema (all fields optional) ---

/// Top-level config file schema
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    keyword: Option<KeywordFileConfig>,
    timing: Option<TimingFileConfig>,
    continuous: Option<ContinuousFileConfig>,
    audio: Option<AudioFileConfig>,
    backend: Option<BackendFileConfig>,
}

#[derive(Debug, Default, Deserialize)]
struct KeywordFileConfig {
    phrase: Option<String>,
    boundary: Option<bool>,
    alternates: Option<Vec<AlternateFileConfig>>,
}

#[derive(Debug, Deserialize)]
struct AlternateFileConfig {
    phrase: String,
    boundary: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct TimingFileConfig {
    probe_seconds: Option<f32>,
    probe_interval: Option<f32>,
    post_keyword_pause: Option<f32>,
    command_max_seconds: Option<f32>,
    silence_rms_threshold: Option<f32>,
    silence_timeout: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
struct ContinuousFileConfig {
    clip_seconds: Option<f32>,
    silence_threshold: Option<f32>,
    default_mode: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct AudioFileConfig {
    rolling_buffer_seconds: Option<f32>,
    input_gain: Option<f32>,
    sample_rate: Option<u32>,
    channels: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct BackendFileConfig {
    endpoint: Option<String>,
    model: Option<String>,
    api_key: Option<String>,
}
