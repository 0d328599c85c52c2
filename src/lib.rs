pub mod audio;
pub mod config;
pub mod error;
pub mod session;
pub mod transport;

pub use audio::{
    AudioBuffer, AudioDevices, AudioFrame, CaptureConfig, CaptureDevice, CaptureFeed,
    FeedCapture, InjectedDevices, OutputDevice, SpeechClip, TimelineOutput, TimelineRenderer,
    WavAudio, WavFileCapture,
};
pub use config::Config;
pub use error::{Error, Result};
pub use session::{
    CloseReason, LiveSession, PlaybackScheduler, SessionConfig, SessionEvent, SessionState,
    SessionStats, TranscriptSegment,
};
pub use transport::{
    ClientMessage, LiveConnector, LoopbackConnector, RemoteEnd, ServerMessage, SessionSetup,
    TransportEvent,
};
