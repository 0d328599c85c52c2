use serde::{Deserialize, Serialize};

use super::bridge::{from_transport_text, to_transport_text};
use crate::error::Result;

/// Response modality requested from the remote service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Modality {
    Audio,
}

/// Parameters sent while the duplex channel is being established
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSetup {
    pub model: String,
    pub response_modalities: Vec<Modality>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_name: Option<String>,
    /// Subscribe to transcripts of the user's speech
    pub input_audio_transcription: bool,
    /// Subscribe to transcripts of the model's speech
    pub output_audio_transcription: bool,
}

/// An immutable PCM16 payload with its declared rate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedChunk {
    pub data: Vec<u8>,
    pub sample_rate: u32,
}

impl EncodedChunk {
    pub fn new(data: Vec<u8>, sample_rate: u32) -> Self {
        Self { data, sample_rate }
    }

    /// MIME-like type tag, e.g. `audio/pcm;rate=16000`
    pub fn mime_type(&self) -> String {
        pcm_mime_type(self.sample_rate)
    }

    pub fn to_media(&self) -> MediaBlob {
        MediaBlob {
            data: to_transport_text(&self.data),
            mime_type: self.mime_type(),
        }
    }

    pub fn from_transport_text(text: &str, sample_rate: u32) -> Result<Self> {
        Ok(Self::new(from_transport_text(text)?, sample_rate))
    }
}

pub fn pcm_mime_type(sample_rate: u32) -> String {
    format!("audio/pcm;rate={}", sample_rate)
}

/// Parse the rate out of an `audio/pcm;rate=N` tag
pub fn parse_pcm_rate(mime_type: &str) -> Option<u32> {
    let mut parts = mime_type.split(';').map(str::trim);
    if !parts.next()?.eq_ignore_ascii_case("audio/pcm") {
        return None;
    }
    parts.find_map(|p| p.strip_prefix("rate=")?.parse().ok())
}

/// Base64 media payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaBlob {
    pub data: String,
    pub mime_type: String,
}

impl MediaBlob {
    /// Declared rate of an `audio/pcm` payload
    pub fn sample_rate(&self) -> Option<u32> {
        parse_pcm_rate(&self.mime_type)
    }
}

/// Outbound message: one chunk of realtime microphone audio
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientMessage {
    pub media: MediaBlob,
}

impl ClientMessage {
    pub fn audio(chunk: &EncodedChunk) -> Self {
        Self {
            media: chunk.to_media(),
        }
    }
}

/// Inbound message from the remote service
///
/// Any combination of fields may be present in a single message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    /// Base64 PCM16 audio at the output rate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_data: Option<String>,
    /// Barge-in: the user started speaking over the model
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub interrupted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_transcript: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_transcript: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub turn_complete: bool,
}

impl ServerMessage {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn audio(data: &[u8]) -> Self {
        Self {
            audio_data: Some(to_transport_text(data)),
            ..Self::default()
        }
    }

    pub fn interrupted() -> Self {
        Self {
            interrupted: true,
            ..Self::default()
        }
    }

    pub fn input_transcript(text: impl Into<String>) -> Self {
        Self {
            input_transcript: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn output_transcript(text: impl Into<String>) -> Self {
        Self {
            output_transcript: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn turn_complete() -> Self {
        Self {
            turn_complete: true,
            ..Self::default()
        }
    }
}
