use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::info;

use super::output::OutputDevice;
use crate::error::{Error, Result};

/// One fixed-size block of microphone samples
///
/// Produced by a capture device and consumed within a single capture step.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Float samples in [-1, 1], interleaved when multi-channel
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Milliseconds since capture started
    pub timestamp_ms: u64,
}

/// Capture format requested from a microphone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureConfig {
    pub sample_rate: u32,
    pub channels: u16,
    /// Samples per delivered frame (the capture callback cadence)
    pub block_size: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000, // Live input rate
            channels: 1,        // Mono
            block_size: 4096,   // ~256ms at 16kHz
        }
    }
}

impl CaptureConfig {
    /// Reject formats no device can deliver
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 || self.channels == 0 || self.block_size == 0 {
            return Err(Error::DeviceAcquisition(format!(
                "unusable capture format: {}Hz, {} channels, {} samples per block",
                self.sample_rate, self.channels, self.block_size
            )));
        }
        Ok(())
    }

    /// Wall-clock duration of one block in milliseconds
    pub fn block_duration_ms(&self) -> u64 {
        let frames = (self.block_size / usize::from(self.channels.max(1))) as u64;
        frames * 1000 / u64::from(self.sample_rate.max(1))
    }
}

/// Microphone capture backend
///
/// Implementations deliver fixed-size frames on the returned channel and must
/// never block the thread that produces samples.
#[async_trait::async_trait]
pub trait CaptureDevice: Send + Sync {
    /// Start capturing audio
    ///
    /// Returns a channel receiver that will receive audio frames
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>>;

    /// Stop capturing audio (no-op when already stopped)
    async fn stop(&mut self) -> Result<()>;

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Source of the two audio devices a live session needs
#[async_trait::async_trait]
pub trait AudioDevices: Send + Sync {
    /// Acquire the microphone (may wait on a permission prompt)
    async fn acquire_input(&self, config: &CaptureConfig) -> Result<Box<dyn CaptureDevice>>;

    /// Open an output device running at `sample_rate`
    fn open_output(&self, sample_rate: u32) -> Result<Box<dyn OutputDevice>>;
}

/// Hands out a pre-built capture/output pair, once
///
/// Used when the host application owns device creation and passes the
/// devices in rather than having the pipeline query them.
pub struct InjectedDevices {
    input: Mutex<Option<Box<dyn CaptureDevice>>>,
    output: Mutex<Option<Box<dyn OutputDevice>>>,
}

impl InjectedDevices {
    pub fn new(input: Box<dyn CaptureDevice>, output: Box<dyn OutputDevice>) -> Self {
        Self {
            input: Mutex::new(Some(input)),
            output: Mutex::new(Some(output)),
        }
    }

    /// A provider with no microphone, as when permission is denied
    pub fn without_input(output: Box<dyn OutputDevice>) -> Self {
        Self {
            input: Mutex::new(None),
            output: Mutex::new(Some(output)),
        }
    }
}

#[async_trait::async_trait]
impl AudioDevices for InjectedDevices {
    async fn acquire_input(&self, config: &CaptureConfig) -> Result<Box<dyn CaptureDevice>> {
        let device = self
            .input
            .lock()
            .map_err(|_| Error::DeviceAcquisition("input device lock poisoned".to_string()))?
            .take()
            .ok_or_else(|| Error::DeviceAcquisition("microphone unavailable".to_string()))?;

        info!(
            "Acquired input device: {} ({}Hz, {} channels)",
            device.name(),
            config.sample_rate,
            config.channels
        );

        Ok(device)
    }

    fn open_output(&self, sample_rate: u32) -> Result<Box<dyn OutputDevice>> {
        let mut device = self
            .output
            .lock()
            .map_err(|_| Error::DeviceAcquisition("output device lock poisoned".to_string()))?
            .take()
            .ok_or_else(|| Error::DeviceAcquisition("audio output unavailable".to_string()))?;

        if device.sample_rate() != sample_rate {
            let actual = device.sample_rate();
            device.release();
            return Err(Error::DeviceAcquisition(format!(
                "output device runs at {}Hz, expected {}Hz",
                actual, sample_rate
            )));
        }

        Ok(device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_config_defaults() {
        let config = CaptureConfig::default();
        assert_eq!(config.sample_rate, 16000);
        assert_eq!(config.channels, 1);
        assert_eq!(config.block_size, 4096);
        assert_eq!(config.block_duration_ms(), 256);
    }

    #[test]
    fn test_block_duration_stereo() {
        let config = CaptureConfig {
            sample_rate: 48000,
            channels: 2,
            block_size: 960,
        };
        assert_eq!(config.block_duration_ms(), 10);
    }

    #[test]
    fn test_zero_block_size_is_rejected() {
        let config = CaptureConfig {
            block_size: 0,
            ..CaptureConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::DeviceAcquisition(_))));
        assert!(CaptureConfig::default().validate().is_ok());
    }

    #[test]
    fn test_mismatched_output_is_released() {
        let (output, renderer) = crate::audio::TimelineOutput::new(16000);
        let (capture, _feed) = crate::audio::FeedCapture::new(CaptureConfig::default());
        let devices = InjectedDevices::new(Box::new(capture), Box::new(output));

        assert!(matches!(
            devices.open_output(24000),
            Err(Error::DeviceAcquisition(_))
        ));
        assert!(renderer.is_released());
    }
}
