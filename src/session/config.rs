use serde::{Deserialize, Serialize};

use crate::audio::CaptureConfig;
use crate::transport::{Modality, SessionSetup};

/// Configuration for a live voice session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Unique session identifier (e.g., "live-6f1c...")
    pub session_id: String,

    /// Remote model identifier
    pub model: String,

    /// Prebuilt voice for the model's spoken replies
    pub voice_name: Option<String>,

    /// Microphone format and callback block size
    pub capture: CaptureConfig,

    /// Rate of audio received from the remote service
    pub output_sample_rate: u32,

    /// Outbound queue depth; chunks beyond it are dropped
    pub outbound_capacity: usize,

    /// Request transcripts of the user's speech
    pub input_transcription: bool,

    /// Request transcripts of the model's speech
    pub output_transcription: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: format!("live-{}", uuid::Uuid::new_v4()),
            model: "gemini-2.5-flash-native-audio-preview-12-2025".to_string(),
            voice_name: None,
            capture: CaptureConfig::default(), // 16kHz mono, 4096-sample blocks
            output_sample_rate: 24000,
            outbound_capacity: 64,
            input_transcription: true,
            output_transcription: true,
        }
    }
}

impl SessionConfig {
    pub fn for_model(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }

    /// Parameters for the Connecting state
    pub fn setup(&self) -> SessionSetup {
        SessionSetup {
            model: self.model.clone(),
            response_modalities: vec![Modality::Audio],
            voice_name: self.voice_name.clone(),
            input_audio_transcription: self.input_transcription,
            output_audio_transcription: self.output_transcription,
        }
    }
}
