use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::io::Cursor;
use std::path::Path;
use tracing::{debug, info};

use super::pcm::{pcm16_to_samples, samples_to_pcm16};
use crate::error::Result;

/// Size of the canonical RIFF/WAVE header written for 16-bit PCM
pub const WAV_HEADER_LEN: usize = 44;

fn pcm16_spec(sample_rate: u32, channels: u16) -> WavSpec {
    WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    }
}

/// Wrap raw mono PCM16 bytes in a 44-byte WAV header
///
/// The payload bytes are copied through unchanged, so reading the data chunk
/// back yields exactly `pcm`.
pub fn wrap_as_wav(pcm: &[u8], sample_rate: u32) -> Result<Vec<u8>> {
    let samples = pcm16_to_samples(pcm)?;

    let mut cursor = Cursor::new(Vec::with_capacity(WAV_HEADER_LEN + pcm.len()));
    {
        let mut writer = WavWriter::new(&mut cursor, pcm16_spec(sample_rate, 1))?;
        for sample in samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
    }

    let bytes = cursor.into_inner();
    debug!(
        "Wrapped {} PCM bytes as WAV ({} Hz, {} bytes total)",
        pcm.len(),
        sample_rate,
        bytes.len()
    );

    Ok(bytes)
}

/// A decoded 16-bit WAV file
#[derive(Debug, Clone)]
pub struct WavAudio {
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    /// Interleaved i16 samples
    pub samples: Vec<i16>,
}

impl WavAudio {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path)?;
        Self::from_reader(reader)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let reader = WavReader::new(Cursor::new(bytes))?;
        Self::from_reader(reader)
    }

    fn from_reader<R: std::io::Read>(reader: WavReader<R>) -> Result<Self> {
        let spec = reader.spec();
        let samples = reader.into_samples::<i16>().collect::<std::result::Result<Vec<_>, _>>()?;

        let duration_seconds =
            samples.len() as f64 / (f64::from(spec.sample_rate) * f64::from(spec.channels));

        debug!(
            "Audio loaded: {:.2}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }

    /// The data chunk as little-endian PCM16 bytes
    pub fn pcm_bytes(&self) -> Vec<u8> {
        samples_to_pcm16(&self.samples)
    }
}
