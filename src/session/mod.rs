//! Live voice session management
//!
//! This module provides the `LiveSession` abstraction that manages:
//! - Microphone capture and PCM16 encoding for the remote service
//! - Gapless, interruptible playback of streamed replies
//! - Session lifecycle (Connecting -> Open -> Closed)
//! - Transcript events and session statistics

mod capture;
mod config;
mod playback;
#[allow(clippy::module_inception)]
mod session;
mod stats;

pub use capture::CapturePipeline;
pub use config::SessionConfig;
pub use playback::{PlaybackScheduler, PlaybackUnit, SchedulerState};
pub use session::{CloseReason, LiveSession, SessionEvent, SessionState};
pub use stats::{SessionStats, Speaker, TranscriptSegment};
