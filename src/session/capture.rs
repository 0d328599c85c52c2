use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use super::stats::SessionCounters;
use crate::audio::{encode_pcm16, AudioFrame};
use crate::transport::{ClientMessage, EncodedChunk};

/// Turns captured frames into outbound audio messages
///
/// Forwarding is fire-and-forget: a chunk that cannot be queued right away
/// (session not open, queue full, transport gone) is dropped for good.
pub struct CapturePipeline {
    outbound: Option<mpsc::Sender<ClientMessage>>,
    counters: Arc<SessionCounters>,
}

impl CapturePipeline {
    pub(crate) fn new(counters: Arc<SessionCounters>) -> Self {
        Self {
            outbound: None,
            counters,
        }
    }

    /// Start forwarding into an open session's outbound queue
    pub fn attach(&mut self, outbound: mpsc::Sender<ClientMessage>) {
        self.outbound = Some(outbound);
    }

    /// Stop forwarding; dropping the sender signals end of input to the transport
    pub fn detach(&mut self) {
        self.outbound = None;
    }

    pub fn is_attached(&self) -> bool {
        self.outbound.is_some()
    }

    /// Encode one frame and hand it to the session without waiting
    ///
    /// Returns whether the chunk was queued.
    pub fn forward(&mut self, frame: &AudioFrame) -> bool {
        let Some(outbound) = &self.outbound else {
            SessionCounters::bump(&self.counters.chunks_dropped);
            debug!("No open session, dropping capture block at {}ms", frame.timestamp_ms);
            return false;
        };

        let chunk = EncodedChunk::new(encode_pcm16(&frame.samples), frame.sample_rate);
        let bytes = chunk.data.len();

        match outbound.try_send(ClientMessage::audio(&chunk)) {
            Ok(()) => {
                let sent = SessionCounters::bump(&self.counters.chunks_sent);
                debug!(
                    "Queued capture chunk {} ({} bytes, {}ms)",
                    sent, bytes, frame.timestamp_ms
                );
                true
            }
            Err(TrySendError::Full(_)) => {
                let dropped = SessionCounters::bump(&self.counters.chunks_dropped);
                debug!("Outbound queue full, dropped capture chunk ({} dropped)", dropped);
                false
            }
            Err(TrySendError::Closed(_)) => {
                SessionCounters::bump(&self.counters.chunks_dropped);
                warn!("Transport no longer accepts audio, detaching capture");
                self.outbound = None;
                false
            }
        }
    }
}
