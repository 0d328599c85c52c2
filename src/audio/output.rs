// Output devices and the software playback timeline
//
// An output device exposes a monotonically advancing clock in seconds and
// accepts buffers to start at an absolute time on that clock. `TimelineOutput`
// implements this in software: its clock advances only as the paired
// `TimelineRenderer` pulls samples, so it can sit behind any host audio
// callback and stays deterministic under test.

use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

use super::pcm::AudioBuffer;
use crate::error::{Error, Result};

/// Handle for one scheduled buffer on an output device
pub type VoiceId = u64;

/// Where a device actually placed a scheduled buffer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledVoice {
    pub id: VoiceId,
    /// Start on the device clock in seconds; never earlier than the clock
    /// was when the buffer was accepted
    pub start: f64,
}

/// Audio output with a sample-accurate playback clock
pub trait OutputDevice: Send {
    fn sample_rate(&self) -> u32;

    /// Current position of the device clock in seconds
    fn current_time(&self) -> f64;

    /// Schedule `buffer` to start at `start_at` seconds on the device clock
    ///
    /// Times already in the past start immediately. The returned start is
    /// read under the same lock that placed the voice, so it stays correct
    /// while another thread is rendering.
    fn schedule(&mut self, buffer: AudioBuffer, start_at: f64) -> Result<ScheduledVoice>;

    /// Stop a voice immediately; unknown or finished voices are ignored
    fn stop(&mut self, voice: VoiceId);

    /// Voices that finished playing naturally since the last call
    fn take_finished(&mut self) -> Vec<VoiceId>;

    /// Release the device; later calls are no-ops
    fn release(&mut self);

    fn is_released(&self) -> bool;
}

struct Voice {
    id: VoiceId,
    start_frame: u64,
    samples: Vec<f32>,
}

impl Voice {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.samples.len() as u64
    }
}

struct TimelineState {
    sample_rate: u32,
    /// Frames rendered so far; the device clock
    position: u64,
    voices: Vec<Voice>,
    finished: Vec<VoiceId>,
    next_id: VoiceId,
    released: bool,
}

fn lock(state: &Mutex<TimelineState>) -> MutexGuard<'_, TimelineState> {
    // A panic inside render cannot leave the timeline half-updated in a way
    // that matters for playback, so recover the guard
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Software output device; see the module docs
pub struct TimelineOutput {
    state: Arc<Mutex<TimelineState>>,
}

/// Pull side of a `TimelineOutput`, driven by the audio callback
#[derive(Clone)]
pub struct TimelineRenderer {
    state: Arc<Mutex<TimelineState>>,
}

impl TimelineOutput {
    pub fn new(sample_rate: u32) -> (Self, TimelineRenderer) {
        let state = Arc::new(Mutex::new(TimelineState {
            sample_rate,
            position: 0,
            voices: Vec::new(),
            finished: Vec::new(),
            next_id: 0,
            released: false,
        }));

        info!("Timeline output created ({}Hz)", sample_rate);

        (
            Self {
                state: Arc::clone(&state),
            },
            TimelineRenderer { state },
        )
    }
}

impl OutputDevice for TimelineOutput {
    fn sample_rate(&self) -> u32 {
        lock(&self.state).sample_rate
    }

    fn current_time(&self) -> f64 {
        let state = lock(&self.state);
        state.position as f64 / f64::from(state.sample_rate)
    }

    fn schedule(&mut self, buffer: AudioBuffer, start_at: f64) -> Result<ScheduledVoice> {
        let mut state = lock(&self.state);
        if state.released {
            return Err(Error::DeviceReleased);
        }

        let requested = (start_at.max(0.0) * f64::from(state.sample_rate)).round() as u64;
        let start_frame = requested.max(state.position);
        let samples = mixdown(&buffer);

        let id = state.next_id;
        state.next_id += 1;
        let start = start_frame as f64 / f64::from(state.sample_rate);

        debug!(
            "Voice {} scheduled at frame {} ({} frames)",
            id,
            start_frame,
            samples.len()
        );

        if samples.is_empty() {
            state.finished.push(id);
        } else {
            state.voices.push(Voice {
                id,
                start_frame,
                samples,
            });
        }

        Ok(ScheduledVoice { id, start })
    }

    fn stop(&mut self, voice: VoiceId) {
        lock(&self.state).voices.retain(|v| v.id != voice);
    }

    fn take_finished(&mut self) -> Vec<VoiceId> {
        std::mem::take(&mut lock(&self.state).finished)
    }

    fn release(&mut self) {
        let mut state = lock(&self.state);
        if state.released {
            return;
        }
        state.released = true;
        state.voices.clear();
        state.finished.clear();
        info!("Timeline output released at {:.3}s", state.position as f64 / f64::from(state.sample_rate));
    }

    fn is_released(&self) -> bool {
        lock(&self.state).released
    }
}

/// Average all channels into one
fn mixdown(buffer: &AudioBuffer) -> Vec<f32> {
    match buffer.channels.as_slice() {
        [] => Vec::new(),
        [mono] => mono.clone(),
        channels => {
            let scale = 1.0 / channels.len() as f32;
            (0..buffer.frames())
                .map(|i| channels.iter().map(|c| c[i]).sum::<f32>() * scale)
                .collect()
        }
    }
}

impl TimelineRenderer {
    /// Fill `out` with the next mono samples and advance the clock
    pub fn render(&self, out: &mut [f32]) {
        out.fill(0.0);

        let mut state = lock(&self.state);
        let window_start = state.position;
        let window_end = window_start + out.len() as u64;
        state.position = window_end;

        if state.released {
            return;
        }

        for voice in &state.voices {
            let start = voice.start_frame.max(window_start);
            let end = voice.end_frame().min(window_end);
            for frame in start..end {
                out[(frame - window_start) as usize] += voice.samples[(frame - voice.start_frame) as usize];
            }
        }

        let mut done = Vec::new();
        state.voices.retain(|v| {
            let playing = v.end_frame() > window_end;
            if !playing {
                done.push(v.id);
            }
            playing
        });
        state.finished.extend(done);
    }

    /// Render `frames` samples into a new vector
    pub fn advance(&self, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0; frames];
        self.render(&mut out);
        out
    }

    /// Voices scheduled and not yet finished or stopped
    pub fn active_voices(&self) -> usize {
        lock(&self.state).voices.len()
    }

    /// Start frames of all live voices, in scheduling order
    pub fn scheduled_starts(&self) -> Vec<u64> {
        lock(&self.state).voices.iter().map(|v| v.start_frame).collect()
    }

    pub fn position(&self) -> u64 {
        lock(&self.state).position
    }

    pub fn is_released(&self) -> bool {
        lock(&self.state).released
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_advances_with_render() {
        let (output, renderer) = TimelineOutput::new(24000);
        assert_eq!(output.current_time(), 0.0);

        renderer.advance(12000);
        assert!((output.current_time() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_voice_plays_at_scheduled_frame() {
        let (mut output, renderer) = TimelineOutput::new(1000);
        output
            .schedule(AudioBuffer::mono(vec![0.5; 4], 1000), 0.002)
            .unwrap();

        let out = renderer.advance(8);
        assert_eq!(out, vec![0.0, 0.0, 0.5, 0.5, 0.5, 0.5, 0.0, 0.0]);
        assert_eq!(renderer.active_voices(), 0);
        assert_eq!(output.take_finished(), vec![0]);
    }

    #[test]
    fn test_past_start_plays_immediately() {
        let (mut output, renderer) = TimelineOutput::new(1000);
        renderer.advance(10);

        let voice = output.schedule(AudioBuffer::mono(vec![0.1; 2], 1000), 0.0).unwrap();
        assert_eq!(renderer.scheduled_starts(), vec![10]);
        assert!((voice.start - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_stopped_voice_is_silent() {
        let (mut output, renderer) = TimelineOutput::new(1000);
        let voice = output.schedule(AudioBuffer::mono(vec![0.5; 10], 1000), 0.0).unwrap();

        renderer.advance(3);
        output.stop(voice.id);
        assert!(renderer.advance(7).iter().all(|&s| s == 0.0));
        assert!(output.take_finished().is_empty());
    }

    #[test]
    fn test_stereo_is_mixed_down() {
        let (mut output, renderer) = TimelineOutput::new(1000);
        let buffer = AudioBuffer {
            sample_rate: 1000,
            channels: vec![vec![0.5, 0.5], vec![0.0, 0.25]],
        };
        output.schedule(buffer, 0.0).unwrap();
        assert_eq!(renderer.advance(2), vec![0.25, 0.375]);
    }

    #[test]
    fn test_release_is_idempotent_and_rejects_schedule() {
        let (mut output, renderer) = TimelineOutput::new(1000);
        output.schedule(AudioBuffer::mono(vec![0.5; 10], 1000), 0.0).unwrap();

        output.release();
        output.release();

        assert!(output.is_released());
        assert_eq!(renderer.active_voices(), 0);
        assert!(matches!(
            output.schedule(AudioBuffer::mono(vec![0.5], 1000), 0.0),
            Err(Error::DeviceReleased)
        ));
    }
}
