use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::capture::CapturePipeline;
use super::config::SessionConfig;
use super::playback::PlaybackScheduler;
use super::stats::{SessionCounters, SessionStats, Speaker, TranscriptSegment};
use crate::audio::{AudioDevices, AudioFrame, CaptureDevice};
use crate::error::{Error, Result};
use crate::transport::{LiveConnector, ServerMessage, TransportEvent};

/// Lifecycle of the duplex session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Connecting,
    Open,
    Closed,
}

/// Why a session reached Closed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// `close()` was called or the handle was dropped
    User,
    /// The remote service closed the channel
    Remote(Option<String>),
    /// Transport failure
    Error(String),
}

/// Events for the consumer of a session (typically a transcript view)
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Opened,
    InputTranscript(TranscriptSegment),
    OutputTranscript(TranscriptSegment),
    /// Queued model audio was flushed because the user started speaking
    Interrupted,
    TurnComplete,
    /// Transport failure; always followed by `Closed`
    Error(String),
    Closed(CloseReason),
}

enum Control {
    Close(oneshot::Sender<()>),
}

/// A live, full-duplex voice session
///
/// All session state (capture forwarding, the playback timeline) is owned by
/// one driver task; this handle talks to it through channels.
pub struct LiveSession {
    id: String,
    started_at: DateTime<Utc>,
    state: watch::Receiver<SessionState>,
    control_tx: mpsc::Sender<Control>,
    counters: Arc<SessionCounters>,
    driver: Mutex<Option<JoinHandle<Result<()>>>>,
}

impl LiveSession {
    /// Acquire devices, connect, and start streaming
    ///
    /// Fails with `DeviceAcquisition` when the microphone or output device is
    /// unavailable, and with `Session` when the connection cannot be
    /// established. In both cases everything acquired so far is released and
    /// no session exists.
    pub async fn open(
        config: SessionConfig,
        devices: &dyn AudioDevices,
        connector: &dyn LiveConnector,
    ) -> Result<(Self, mpsc::UnboundedReceiver<SessionEvent>)> {
        info!(
            "Opening live session {} (model {})",
            config.session_id, config.model
        );
        debug!("Session {} -> {:?}", config.session_id, SessionState::Connecting);

        let mut capture = devices.acquire_input(&config.capture).await?;

        let output = match devices.open_output(config.output_sample_rate) {
            Ok(output) => output,
            Err(e) => {
                release_capture(capture.as_mut()).await;
                return Err(e);
            }
        };
        let mut scheduler = PlaybackScheduler::new(output);

        let connecting = connector.connect(config.setup(), config.outbound_capacity);
        let channel = match connecting.await {
            Ok(channel) => channel,
            Err(e) => {
                release_capture(capture.as_mut()).await;
                scheduler.close();
                return Err(match e {
                    Error::Session(_) => e,
                    other => Error::Session(other.to_string()),
                });
            }
        };

        let frames = match capture.start().await {
            Ok(frames) => frames,
            Err(e) => {
                scheduler.close();
                return Err(match e {
                    Error::DeviceAcquisition(_) => e,
                    other => Error::DeviceAcquisition(other.to_string()),
                });
            }
        };

        // Open: capture forwards, playback schedules
        let counters = Arc::new(SessionCounters::default());
        let mut pipeline = CapturePipeline::new(Arc::clone(&counters));
        pipeline.attach(channel.outbound);
        scheduler.open();

        let (state_tx, state_rx) = watch::channel(SessionState::Open);
        let (control_tx, control_rx) = mpsc::channel(4);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let _ = events_tx.send(SessionEvent::Opened);

        info!(
            "Live session {} open (capture: {}, output: {}Hz)",
            config.session_id,
            capture.name(),
            scheduler.sample_rate()
        );

        let driver = SessionDriver {
            session_id: config.session_id.clone(),
            capture,
            frames: Some(frames),
            pipeline,
            scheduler,
            inbound: channel.inbound,
            control_rx,
            events_tx,
            state_tx,
            counters: Arc::clone(&counters),
        };

        let started_at = Utc::now();
        let handle = tokio::spawn(driver.run());

        Ok((
            Self {
                id: config.session_id,
                started_at,
                state: state_rx,
                control_tx,
                counters,
                driver: Mutex::new(Some(handle)),
            },
            events_rx,
        ))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Close the session
    ///
    /// When this returns, capture has stopped, all scheduled playback has
    /// been stopped, and both devices are released. Closing an already
    /// closed session is a no-op.
    pub async fn close(&self) -> Result<()> {
        if self.state() == SessionState::Closed {
            debug!("Session {} already closed", self.id);
            return Ok(());
        }

        info!("Closing live session {}", self.id);

        let (ack_tx, ack_rx) = oneshot::channel();
        if self.control_tx.send(Control::Close(ack_tx)).await.is_ok() {
            // A dropped ack means the driver shut down on its own first
            let _ = ack_rx.await;
        }

        Ok(())
    }

    /// Wait for the session to end
    ///
    /// Returns the final stats, or the `Session` error that terminated it.
    pub async fn join(&self) -> Result<SessionStats> {
        let handle = self.driver.lock().await.take();
        if let Some(handle) = handle {
            match handle.await {
                Ok(outcome) => outcome?,
                Err(e) => {
                    error!("Session driver panicked: {}", e);
                    return Err(Error::Session(format!("session task failed: {}", e)));
                }
            }
        }

        Ok(self.stats())
    }

    /// Get current session statistics
    pub fn stats(&self) -> SessionStats {
        let ended_at = self.counters.ended_at.get().copied();
        let duration = ended_at
            .unwrap_or_else(Utc::now)
            .signed_duration_since(self.started_at);

        SessionStats {
            session_id: self.id.clone(),
            state: self.state(),
            started_at: self.started_at,
            ended_at,
            duration_secs: duration.num_milliseconds() as f64 / 1000.0,
            chunks_sent: SessionCounters::get(&self.counters.chunks_sent),
            chunks_dropped: SessionCounters::get(&self.counters.chunks_dropped),
            chunks_played: SessionCounters::get(&self.counters.chunks_played),
            chunks_rejected: SessionCounters::get(&self.counters.chunks_rejected),
            interruptions: SessionCounters::get(&self.counters.interruptions),
            transcript_segments_count: SessionCounters::get(&self.counters.transcript_segments),
        }
    }
}

async fn release_capture(capture: &mut dyn CaptureDevice) {
    if let Err(e) = capture.stop().await {
        warn!("Failed to release capture device {}: {}", capture.name(), e);
    }
}

/// What woke the driver loop
enum Step {
    Control(Option<Control>),
    Inbound(Option<TransportEvent>),
    Frame(Option<AudioFrame>),
}

/// Single owner of a session's mutable state
struct SessionDriver {
    session_id: String,
    capture: Box<dyn CaptureDevice>,
    frames: Option<mpsc::Receiver<AudioFrame>>,
    pipeline: CapturePipeline,
    scheduler: PlaybackScheduler,
    inbound: mpsc::Receiver<TransportEvent>,
    control_rx: mpsc::Receiver<Control>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    state_tx: watch::Sender<SessionState>,
    counters: Arc<SessionCounters>,
}

impl SessionDriver {
    async fn run(mut self) -> Result<()> {
        debug!("Session {} driver started", self.session_id);

        loop {
            let step = tokio::select! {
                biased;
                control = self.control_rx.recv() => Step::Control(control),
                event = self.inbound.recv() => Step::Inbound(event),
                frame = next_frame(&mut self.frames) => Step::Frame(frame),
            };

            match step {
                Step::Control(Some(Control::Close(ack))) => {
                    self.shutdown(CloseReason::User).await;
                    let _ = ack.send(());
                    return Ok(());
                }
                Step::Control(None) => {
                    debug!("Session {} handle dropped", self.session_id);
                    self.shutdown(CloseReason::User).await;
                    return Ok(());
                }
                Step::Inbound(Some(TransportEvent::Message(message))) => self.dispatch(message),
                Step::Inbound(Some(TransportEvent::Closed(reason))) => {
                    self.shutdown(CloseReason::Remote(reason)).await;
                    return Ok(());
                }
                Step::Inbound(Some(TransportEvent::Error(e))) => {
                    error!("Session {} transport error: {}", self.session_id, e);
                    self.emit(SessionEvent::Error(e.clone()));
                    self.shutdown(CloseReason::Error(e.clone())).await;
                    return Err(Error::Session(e));
                }
                Step::Inbound(None) => {
                    self.shutdown(CloseReason::Remote(None)).await;
                    return Ok(());
                }
                Step::Frame(Some(frame)) => {
                    self.pipeline.forward(&frame);
                }
                Step::Frame(None) => {
                    info!("Session {} capture stream ended", self.session_id);
                    self.frames = None;
                }
            }
        }
    }

    /// Route one inbound message
    ///
    /// A barge-in is applied before any audio carried in the same message.
    fn dispatch(&mut self, message: ServerMessage) {
        if message.interrupted {
            let flushed = self.scheduler.interrupt();
            SessionCounters::bump(&self.counters.interruptions);
            debug!("Barge-in flushed {} units", flushed);
            self.emit(SessionEvent::Interrupted);
        }

        if let Some(audio) = message.audio_data.as_deref() {
            match self.scheduler.enqueue_text(audio) {
                Ok(Some(_)) => {
                    SessionCounters::bump(&self.counters.chunks_played);
                }
                Ok(None) => {}
                Err(e) if e.is_chunk_local() => {
                    let rejected = SessionCounters::bump(&self.counters.chunks_rejected);
                    warn!("Skipping inbound audio chunk ({} skipped): {}", rejected, e);
                }
                Err(e) => {
                    SessionCounters::bump(&self.counters.chunks_rejected);
                    error!("Session {} could not schedule audio: {}", self.session_id, e);
                }
            }
        }

        if let Some(text) = message.input_transcript {
            SessionCounters::bump(&self.counters.transcript_segments);
            self.emit(SessionEvent::InputTranscript(TranscriptSegment::new(Speaker::User, text)));
        }

        if let Some(text) = message.output_transcript {
            SessionCounters::bump(&self.counters.transcript_segments);
            self.emit(SessionEvent::OutputTranscript(TranscriptSegment::new(Speaker::Model, text)));
        }

        if message.turn_complete {
            self.emit(SessionEvent::TurnComplete);
        }
    }

    fn emit(&self, event: SessionEvent) {
        if self.events_tx.send(event).is_err() {
            debug!("Session {} has no event listener", self.session_id);
        }
    }

    /// Enter Closed: silence playback first, then release everything
    async fn shutdown(&mut self, reason: CloseReason) {
        self.scheduler.close();
        self.pipeline.detach();
        self.frames = None;
        release_capture(self.capture.as_mut()).await;

        let ended_at = self.counters.mark_ended();
        self.state_tx.send_replace(SessionState::Closed);
        info!(
            "Live session {} closed at {} ({:?})",
            self.session_id,
            ended_at.to_rfc3339(),
            reason
        );
        self.emit(SessionEvent::Closed(reason));
    }
}

/// Next captured frame, or pending forever once capture has ended
async fn next_frame(frames: &mut Option<mpsc::Receiver<AudioFrame>>) -> Option<AudioFrame> {
    match frames {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
