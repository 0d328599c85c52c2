use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;

use super::session::SessionState;

/// Statistics about a live session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub session_id: String,

    pub state: SessionState,

    /// When the session reached Open
    pub started_at: DateTime<Utc>,

    /// When the session reached Closed, if it has
    pub ended_at: Option<DateTime<Utc>>,

    /// Seconds the session has been open, frozen once it closes
    pub duration_secs: f64,

    /// Capture chunks handed to the transport
    pub chunks_sent: usize,

    /// Capture chunks dropped (queue full or session not open)
    pub chunks_dropped: usize,

    /// Inbound audio chunks scheduled for playback
    pub chunks_played: usize,

    /// Inbound audio chunks skipped as undecodable
    pub chunks_rejected: usize,

    /// Barge-in events received
    pub interruptions: usize,

    /// Transcript fragments received (both directions)
    pub transcript_segments_count: usize,
}

/// Who spoke a transcript fragment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Model,
}

/// A single transcript fragment from the remote service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub speaker: Speaker,

    /// Transcribed text
    pub text: String,

    /// When this fragment was received
    pub timestamp: DateTime<Utc>,
}

impl TranscriptSegment {
    pub fn new(speaker: Speaker, text: impl Into<String>) -> Self {
        Self {
            speaker,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Counters shared between a session handle and its driver task
#[derive(Debug, Default)]
pub(crate) struct SessionCounters {
    pub chunks_sent: AtomicUsize,
    pub chunks_dropped: AtomicUsize,
    pub chunks_played: AtomicUsize,
    pub chunks_rejected: AtomicUsize,
    pub interruptions: AtomicUsize,
    pub transcript_segments: AtomicUsize,
    /// Set once by the driver on entering Closed
    pub ended_at: OnceLock<DateTime<Utc>>,
}

impl SessionCounters {
    pub fn bump(counter: &AtomicUsize) -> usize {
        counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    /// Record the close time; later calls keep the first one
    pub fn mark_ended(&self) -> DateTime<Utc> {
        *self.ended_at.get_or_init(Utc::now)
    }
}
