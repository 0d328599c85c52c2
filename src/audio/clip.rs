use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use super::pcm::{decode_pcm16, AudioBuffer, BYTES_PER_SAMPLE};
use super::wav::wrap_as_wav;
use crate::error::{Error, Result};
use crate::transport::bridge::from_transport_text;

/// Default rate of synthesized voice output
pub const SPEECH_SAMPLE_RATE: u32 = 24000;

/// A complete synthesized speech response (mono PCM16)
#[derive(Debug, Clone)]
pub struct SpeechClip {
    pub id: String,
    pub sample_rate: u32,
    pcm: Vec<u8>,
}

impl SpeechClip {
    pub fn new(pcm: Vec<u8>, sample_rate: u32) -> Result<Self> {
        if pcm.len() % BYTES_PER_SAMPLE != 0 {
            return Err(Error::MalformedAudio {
                byte_len: pcm.len(),
                frame_bytes: BYTES_PER_SAMPLE,
            });
        }

        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            sample_rate,
            pcm,
        })
    }

    /// Build a clip from a base64 payload as returned by the remote service
    pub fn from_transport_text(text: &str, sample_rate: u32) -> Result<Self> {
        Self::new(from_transport_text(text)?, sample_rate)
    }

    pub fn pcm(&self) -> &[u8] {
        &self.pcm
    }

    pub fn duration_secs(&self) -> f64 {
        (self.pcm.len() / BYTES_PER_SAMPLE) as f64 / f64::from(self.sample_rate)
    }

    pub fn to_buffer(&self) -> Result<AudioBuffer> {
        decode_pcm16(&self.pcm, self.sample_rate, 1)
    }

    pub fn to_wav(&self) -> Result<Vec<u8>> {
        wrap_as_wav(&self.pcm, self.sample_rate)
    }

    /// Write the clip as `<id>.wav` under `dir`, creating it if needed
    pub fn save(&self, dir: impl AsRef<Path>) -> Result<PathBuf> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let path = dir.join(format!("{}.wav", self.id));
        fs::write(&path, self.to_wav()?)?;

        info!(
            "Saved speech clip {} ({:.2}s) to {}",
            self.id,
            self.duration_secs(),
            path.display()
        );

        Ok(path)
    }
}
