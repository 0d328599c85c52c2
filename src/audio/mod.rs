pub mod backend;
pub mod clip;
pub mod feed;
pub mod file;
pub mod output;
pub mod pcm;
pub mod wav;

pub use backend::{AudioDevices, AudioFrame, CaptureConfig, CaptureDevice, InjectedDevices};
pub use clip::{SpeechClip, SPEECH_SAMPLE_RATE};
pub use feed::{CaptureFeed, FeedCapture};
pub use file::WavFileCapture;
pub use output::{OutputDevice, ScheduledVoice, TimelineOutput, TimelineRenderer, VoiceId};
pub use pcm::{decode_pcm16, encode_pcm16, AudioBuffer};
pub use wav::{wrap_as_wav, WavAudio};
