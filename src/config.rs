use anyhow::{Context, Result};
use serde::Deserialize;

use crate::audio::CaptureConfig;
use crate::session::SessionConfig;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub audio: AudioConfig,
    pub session: LiveConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "live-voice".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Microphone capture rate sent to the remote service
    pub input_sample_rate: u32,
    /// Rate of audio received from the remote service
    pub output_sample_rate: u32,
    pub channels: u16,
    /// Samples per capture callback
    pub block_size: usize,
    /// Where synthesized speech clips are saved
    pub clips_path: String,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_sample_rate: 16000,
            output_sample_rate: 24000,
            channels: 1,
            block_size: 4096,
            clips_path: "recordings/clips".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    pub model: String,
    pub voice_name: String,
    /// Outbound queue depth before capture chunks are dropped
    pub outbound_capacity: usize,
    pub input_transcription: bool,
    pub output_transcription: bool,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash-native-audio-preview-12-2025".to_string(),
            voice_name: "Zephyr".to_string(),
            outbound_capacity: 64,
            input_transcription: true,
            output_transcription: true,
        }
    }
}

impl Config {
    /// Load from a config file (extension optional) with `LIVE_VOICE__*` overrides
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("LIVE_VOICE").separator("__"))
            .build()
            .with_context(|| format!("Failed to read config: {}", path))?;

        let cfg: Self = settings
            .try_deserialize()
            .context("Failed to parse config")?;
        cfg.validate()?;

        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.audio.input_sample_rate == 0 || self.audio.output_sample_rate == 0 {
            anyhow::bail!("Sample rates must be non-zero");
        }
        if self.audio.channels == 0 {
            anyhow::bail!("Channel count must be non-zero");
        }
        if self.audio.block_size == 0 {
            anyhow::bail!("Capture block size must be non-zero");
        }
        if self.session.outbound_capacity == 0 {
            anyhow::bail!("Outbound queue capacity must be non-zero");
        }
        Ok(())
    }

    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            sample_rate: self.audio.input_sample_rate,
            channels: self.audio.channels,
            block_size: self.audio.block_size,
        }
    }

    /// Build a fresh per-session configuration (new session ID each call)
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            model: self.session.model.clone(),
            voice_name: Some(self.session.voice_name.clone()),
            capture: self.capture_config(),
            output_sample_rate: self.audio.output_sample_rate,
            outbound_capacity: self.session.outbound_capacity,
            input_transcription: self.session.input_transcription,
            output_transcription: self.session.output_transcription,
            ..SessionConfig::default()
        }
    }
}
