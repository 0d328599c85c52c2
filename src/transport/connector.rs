use tokio::sync::mpsc;
use tracing::info;

use super::messages::{ClientMessage, ServerMessage, SessionSetup};
use crate::error::{Error, Result};

/// Event delivered on the inbound side of a duplex channel
#[derive(Debug, Clone)]
pub enum TransportEvent {
    Message(ServerMessage),
    /// Remote closed the channel, with an optional reason
    Closed(Option<String>),
    /// Transport failure; terminal for the session
    Error(String),
}

/// An established duplex channel
///
/// Dropping `outbound` tells the remote side the session is over.
pub struct LiveChannel {
    pub outbound: mpsc::Sender<ClientMessage>,
    pub inbound: mpsc::Receiver<TransportEvent>,
}

/// Establishes duplex channels to the remote streaming service
#[async_trait::async_trait]
pub trait LiveConnector: Send + Sync {
    /// Connect; `outbound_capacity` bounds the outbound message queue
    async fn connect(&self, setup: SessionSetup, outbound_capacity: usize) -> Result<LiveChannel>;
}

/// The remote side of a loopback channel
pub struct RemoteEnd {
    pub setup: SessionSetup,
    /// Messages the session sent
    pub outbound: mpsc::Receiver<ClientMessage>,
    /// Push events to the session
    pub inbound: mpsc::Sender<TransportEvent>,
}

impl RemoteEnd {
    pub async fn send(&self, message: ServerMessage) -> bool {
        self.inbound.send(TransportEvent::Message(message)).await.is_ok()
    }

    pub async fn close(&self, reason: Option<&str>) -> bool {
        self.inbound
            .send(TransportEvent::Closed(reason.map(str::to_string)))
            .await
            .is_ok()
    }

    pub async fn fail(&self, error: &str) -> bool {
        self.inbound
            .send(TransportEvent::Error(error.to_string()))
            .await
            .is_ok()
    }
}

/// Inbound events buffered per loopback channel
const INBOUND_CAPACITY: usize = 64;

/// In-memory connector; each accepted connection is handed out as a `RemoteEnd`
pub struct LoopbackConnector {
    accepted: Option<mpsc::UnboundedSender<RemoteEnd>>,
}

impl LoopbackConnector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RemoteEnd>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { accepted: Some(tx) }, rx)
    }

    /// A connector that rejects every connection attempt
    pub fn refusing() -> Self {
        Self { accepted: None }
    }
}

#[async_trait::async_trait]
impl LiveConnector for LoopbackConnector {
    async fn connect(&self, setup: SessionSetup, outbound_capacity: usize) -> Result<LiveChannel> {
        let accepted = self
            .accepted
            .as_ref()
            .ok_or_else(|| Error::Session("connection refused".to_string()))?;

        let (outbound_tx, outbound_rx) = mpsc::channel(outbound_capacity.max(1));
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);

        info!("Loopback connection accepted for model {}", setup.model);

        accepted
            .send(RemoteEnd {
                setup,
                outbound: outbound_rx,
                inbound: inbound_tx,
            })
            .map_err(|_| Error::Session("remote end gone".to_string()))?;

        Ok(LiveChannel {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}
