// Push-based capture device
//
// A host audio callback hands raw float samples to a `CaptureFeed`. The feed
// slices them into fixed-size blocks and forwards each block without ever
// blocking the callback thread: when the frame queue is full, the block is
// dropped.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::backend::{AudioFrame, CaptureConfig, CaptureDevice};
use crate::error::{Error, Result};

/// Frames buffered between the callback and the session
const FRAME_QUEUE_DEPTH: usize = 32;

struct FeedState {
    tx: Option<mpsc::Sender<AudioFrame>>,
    pending: Vec<f32>,
    frames_emitted: u64,
}

struct FeedShared {
    config: CaptureConfig,
    state: Mutex<FeedState>,
    capturing: AtomicBool,
    dropped: AtomicU64,
}

/// Capture device fed by an external audio callback
pub struct FeedCapture {
    shared: Arc<FeedShared>,
    name: String,
}

/// Non-blocking producer handle for a `FeedCapture`
#[derive(Clone)]
pub struct CaptureFeed {
    shared: Arc<FeedShared>,
}

impl FeedCapture {
    pub fn new(config: CaptureConfig) -> (Self, CaptureFeed) {
        let shared = Arc::new(FeedShared {
            config,
            state: Mutex::new(FeedState {
                tx: None,
                pending: Vec::with_capacity(config.block_size),
                frames_emitted: 0,
            }),
            capturing: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        });

        let capture = Self {
            shared: Arc::clone(&shared),
            name: "feed".to_string(),
        };

        (capture, CaptureFeed { shared })
    }
}

#[async_trait::async_trait]
impl CaptureDevice for FeedCapture {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.shared.capturing.load(Ordering::SeqCst) {
            return Err(Error::DeviceAcquisition("Already capturing".to_string()));
        }
        self.shared.config.validate()?;

        let (tx, rx) = mpsc::channel(FRAME_QUEUE_DEPTH);
        {
            let mut state = self
                .shared
                .state
                .lock()
                .map_err(|_| Error::DeviceAcquisition("capture state poisoned".to_string()))?;
            state.tx = Some(tx);
            state.pending.clear();
            state.frames_emitted = 0;
        }
        self.shared.capturing.store(true, Ordering::SeqCst);

        info!(
            "Feed capture started ({}Hz, {} channels, {} samples per block)",
            self.shared.config.sample_rate,
            self.shared.config.channels,
            self.shared.config.block_size
        );

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if !self.shared.capturing.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        if let Ok(mut state) = self.shared.state.lock() {
            // Dropping the sender ends the frame stream
            state.tx = None;
            state.pending.clear();
        }

        info!("Feed capture stopped");
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.shared.capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl CaptureFeed {
    /// Push raw samples from an audio callback
    ///
    /// Returns the number of complete blocks forwarded. Samples pushed while
    /// the device is stopped are discarded.
    pub fn push(&self, samples: &[f32]) -> usize {
        if !self.shared.capturing.load(Ordering::Relaxed) {
            return 0;
        }

        let Ok(mut state) = self.shared.state.lock() else {
            return 0;
        };

        let config = self.shared.config;
        let frames_per_block = (config.block_size / usize::from(config.channels.max(1))) as u64;
        let mut forwarded = 0;

        for &sample in samples {
            state.pending.push(sample);
            if state.pending.len() < config.block_size {
                continue;
            }

            let block = std::mem::replace(&mut state.pending, Vec::with_capacity(config.block_size));
            let timestamp_ms =
                state.frames_emitted * frames_per_block * 1000 / u64::from(config.sample_rate.max(1));
            state.frames_emitted += 1;

            let frame = AudioFrame {
                samples: block,
                sample_rate: config.sample_rate,
                channels: config.channels,
                timestamp_ms,
            };

            let Some(tx) = &state.tx else {
                break;
            };

            match tx.try_send(frame) {
                Ok(()) => forwarded += 1,
                Err(_) => {
                    let dropped = self.shared.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    debug!("Capture queue full, dropped block ({} total)", dropped);
                }
            }
        }

        forwarded
    }

    /// Blocks dropped because the consumer fell behind
    pub fn dropped_blocks(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    pub fn is_capturing(&self) -> bool {
        self.shared.capturing.load(Ordering::Relaxed)
    }
}
