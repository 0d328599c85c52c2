//! PCM16 codec
//!
//! Converts between native float samples and 16-bit little-endian linear PCM,
//! the format the remote service consumes and produces.

use crate::error::{Error, Result};

/// Bytes per 16-bit sample
pub const BYTES_PER_SAMPLE: usize = 2;

/// Scale between float samples in [-1, 1] and i16
const PCM16_SCALE: f32 = 32768.0;

/// Decoded native audio: one float array per channel
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub sample_rate: u32,
    pub channels: Vec<Vec<f32>>,
}

impl AudioBuffer {
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: vec![samples],
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Frames per channel
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / f64::from(self.sample_rate)
    }

    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }
}

/// Encode float samples to 16-bit little-endian PCM
///
/// Each sample is multiplied by 32768 and truncated toward zero. There is no
/// clamping: a full-scale `1.0` does not fit in an i16 and wraps to -32768,
/// and larger magnitudes wrap the same way.
pub fn encode_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * BYTES_PER_SAMPLE);
    for &sample in samples {
        bytes.extend_from_slice(&truncate_to_i16(sample * PCM16_SCALE).to_le_bytes());
    }
    bytes
}

/// Integer truncation with two's-complement wrap-around
fn truncate_to_i16(value: f32) -> i16 {
    if !value.is_finite() {
        return 0;
    }
    // `as i64` truncates toward zero; the second cast keeps the low 16 bits
    (value as i64) as i16
}

/// Decode interleaved 16-bit little-endian PCM into per-channel float arrays
pub fn decode_pcm16(bytes: &[u8], sample_rate: u32, channel_count: u16) -> Result<AudioBuffer> {
    let channel_count = usize::from(channel_count.max(1));
    let frame_bytes = BYTES_PER_SAMPLE * channel_count;

    if bytes.len() % frame_bytes != 0 {
        return Err(Error::MalformedAudio {
            byte_len: bytes.len(),
            frame_bytes,
        });
    }

    let frame_count = bytes.len() / frame_bytes;
    let mut channels = vec![Vec::with_capacity(frame_count); channel_count];

    for frame in bytes.chunks_exact(frame_bytes) {
        for (channel, sample) in channels.iter_mut().zip(frame.chunks_exact(BYTES_PER_SAMPLE)) {
            let value = i16::from_le_bytes([sample[0], sample[1]]);
            channel.push(f32::from(value) / PCM16_SCALE);
        }
    }

    Ok(AudioBuffer {
        sample_rate,
        channels,
    })
}

/// Reinterpret PCM16 bytes as i16 samples
pub fn pcm16_to_samples(bytes: &[u8]) -> Result<Vec<i16>> {
    if bytes.len() % BYTES_PER_SAMPLE != 0 {
        return Err(Error::MalformedAudio {
            byte_len: bytes.len(),
            frame_bytes: BYTES_PER_SAMPLE,
        });
    }

    Ok(bytes
        .chunks_exact(BYTES_PER_SAMPLE)
        .map(|s| i16::from_le_bytes([s[0], s[1]]))
        .collect())
}

pub fn samples_to_pcm16(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}
