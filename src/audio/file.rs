use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::backend::{AudioFrame, CaptureConfig, CaptureDevice};
use super::wav::WavAudio;
use crate::error::{Error, Result};

/// Capture device that replays a 16-bit WAV file as microphone input
///
/// Blocks are delivered at the configured block size. When `realtime` is set
/// each block is released one block duration after the previous one, which
/// reproduces the cadence of a live audio callback.
pub struct WavFileCapture {
    path: PathBuf,
    config: CaptureConfig,
    realtime: bool,
    task: Option<JoinHandle<()>>,
    name: String,
}

impl WavFileCapture {
    pub fn new(path: impl AsRef<Path>, config: CaptureConfig) -> Self {
        let path = path.as_ref().to_path_buf();
        let name = format!("file:{}", path.display());
        Self {
            path,
            config,
            realtime: true,
            task: None,
            name,
        }
    }

    /// Deliver blocks as fast as the consumer accepts them
    pub fn unpaced(mut self) -> Self {
        self.realtime = false;
        self
    }
}

#[async_trait::async_trait]
impl CaptureDevice for WavFileCapture {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.task.is_some() {
            return Err(Error::DeviceAcquisition("Already capturing".to_string()));
        }
        self.config.validate()?;

        let audio = WavAudio::open(&self.path)
            .map_err(|e| Error::DeviceAcquisition(format!("{}: {}", self.path.display(), e)))?;

        if audio.sample_rate != self.config.sample_rate || audio.channels != self.config.channels {
            return Err(Error::DeviceAcquisition(format!(
                "{} is {}Hz/{}ch, expected {}Hz/{}ch",
                self.path.display(),
                audio.sample_rate,
                audio.channels,
                self.config.sample_rate,
                self.config.channels
            )));
        }

        let (tx, rx) = mpsc::channel(8);
        let config = self.config;
        let realtime = self.realtime;
        let block_ms = config.block_duration_ms();

        info!(
            "Replaying {} as capture input ({:.1}s, {} samples per block)",
            self.path.display(),
            audio.duration_seconds,
            config.block_size
        );

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(block_ms.max(1)));

            for (index, block) in audio.samples.chunks(config.block_size).enumerate() {
                if realtime {
                    ticker.tick().await;
                }

                let mut samples: Vec<f32> = block.iter().map(|&s| f32::from(s) / 32768.0).collect();
                // The last block is padded with silence to keep the block size fixed
                samples.resize(config.block_size, 0.0);

                let frame = AudioFrame {
                    samples,
                    sample_rate: config.sample_rate,
                    channels: config.channels,
                    timestamp_ms: index as u64 * block_ms,
                };

                if tx.send(frame).await.is_err() {
                    debug!("Capture consumer gone, stopping replay");
                    return;
                }
            }

            debug!("Capture file exhausted");
        });

        self.task = Some(task);
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(task) = self.task.take() {
            task.abort();
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!("Capture replay task failed: {}", e);
                }
            }
            info!("File capture stopped: {}", self.path.display());
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
