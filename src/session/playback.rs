//! Gapless, interruptible playback of streamed audio chunks
//!
//! The scheduler keeps a virtual clock holding the time at which the next
//! chunk should start. Each decoded chunk is placed at
//! `max(virtual_clock, device_time)` and the clock advances by the chunk's
//! duration, so chunks play back to back in arrival order. When the device
//! has already passed the clock (the producer fell behind) the chunk starts
//! immediately and the timeline jumps forward; late chunks are never dropped.

use std::collections::VecDeque;
use tracing::{debug, info, warn};

use crate::audio::{decode_pcm16, AudioBuffer, OutputDevice, SpeechClip, VoiceId};
use crate::error::{Error, Result};
use crate::transport::from_transport_text;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Virtual clock unset
    Idle,
    Scheduling,
    /// Flushed by a barge-in; the next chunk resumes scheduling
    Interrupted,
    /// Device released; nothing more will play
    Closed,
}

/// One scheduled buffer on the output timeline
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackUnit {
    pub voice: VoiceId,
    /// Start on the device clock, in seconds
    pub start: f64,
    pub duration: f64,
}

impl PlaybackUnit {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

pub struct PlaybackScheduler {
    output: Box<dyn OutputDevice>,
    channels: u16,
    state: SchedulerState,
    virtual_clock: Option<f64>,
    units: VecDeque<PlaybackUnit>,
}

impl PlaybackScheduler {
    pub fn new(output: Box<dyn OutputDevice>) -> Self {
        Self::with_channels(output, 1)
    }

    pub fn with_channels(output: Box<dyn OutputDevice>, channels: u16) -> Self {
        Self {
            output,
            channels,
            state: SchedulerState::Idle,
            virtual_clock: None,
            units: VecDeque::new(),
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn virtual_clock(&self) -> Option<f64> {
        self.virtual_clock
    }

    pub fn sample_rate(&self) -> u32 {
        self.output.sample_rate()
    }

    pub fn current_time(&self) -> f64 {
        self.output.current_time()
    }

    /// Units scheduled and not yet finished
    pub fn pending_units(&mut self) -> usize {
        self.reap();
        self.units.len()
    }

    /// Session opened: anchor the clock at the device's current time
    pub fn open(&mut self) {
        if self.state == SchedulerState::Closed {
            return;
        }
        let now = self.output.current_time();
        self.virtual_clock = Some(now);
        self.state = SchedulerState::Scheduling;
        debug!("Playback clock anchored at {:.3}s", now);
    }

    /// Schedule a base64 PCM16 payload received from the transport
    pub fn enqueue_text(&mut self, text: &str) -> Result<Option<PlaybackUnit>> {
        if self.state == SchedulerState::Closed {
            return Ok(None);
        }
        let pcm = from_transport_text(text)?;
        self.enqueue_pcm(&pcm)
    }

    /// Schedule raw PCM16 bytes; returns `None` once closed
    pub fn enqueue_pcm(&mut self, pcm: &[u8]) -> Result<Option<PlaybackUnit>> {
        if self.state == SchedulerState::Closed {
            return Ok(None);
        }
        let buffer = decode_pcm16(pcm, self.output.sample_rate(), self.channels)?;
        self.schedule_buffer(buffer).map(Some)
    }

    /// Queue a complete synthesized clip on the same timeline
    pub fn play_clip(&mut self, clip: &SpeechClip) -> Result<Option<PlaybackUnit>> {
        if self.state == SchedulerState::Closed {
            return Ok(None);
        }
        if clip.sample_rate != self.output.sample_rate() {
            return Err(Error::Config(format!(
                "clip is {}Hz but the output runs at {}Hz",
                clip.sample_rate,
                self.output.sample_rate()
            )));
        }
        self.schedule_buffer(clip.to_buffer()?).map(Some)
    }

    fn schedule_buffer(&mut self, buffer: AudioBuffer) -> Result<PlaybackUnit> {
        self.reap();

        let now = self.output.current_time();
        let clock = self.virtual_clock.unwrap_or(now);
        if clock < now && !self.units.is_empty() {
            debug!("Playback fell behind by {:.3}s, starting chunk immediately", now - clock);
        }
        let duration = buffer.duration();

        // A concurrent render can advance the device past `now` before the
        // voice is placed, so the clock follows the placed start
        let placed = self.output.schedule(buffer, clock.max(now))?;
        let unit = PlaybackUnit {
            voice: placed.id,
            start: placed.start,
            duration,
        };

        self.virtual_clock = Some(unit.end());
        self.units.push_back(unit);
        self.state = SchedulerState::Scheduling;

        debug!(
            "Scheduled voice {} at {:.3}s for {:.3}s ({} pending)",
            unit.voice,
            unit.start,
            duration,
            self.units.len()
        );

        Ok(unit)
    }

    /// Barge-in: stop everything scheduled and re-anchor the clock at now
    ///
    /// Returns the number of units stopped.
    pub fn interrupt(&mut self) -> usize {
        if self.state == SchedulerState::Closed {
            return 0;
        }

        let stopped = self.stop_all();
        let now = self.output.current_time();
        self.virtual_clock = Some(now);
        self.state = SchedulerState::Interrupted;

        info!("Playback interrupted at {:.3}s ({} units flushed)", now, stopped);
        stopped
    }

    /// Stop all audio and release the output device; safe to call repeatedly
    pub fn close(&mut self) {
        if self.state == SchedulerState::Closed {
            return;
        }

        let stopped = self.stop_all();
        self.output.release();
        self.virtual_clock = None;
        self.state = SchedulerState::Closed;

        info!("Playback closed ({} units discarded)", stopped);
    }

    fn stop_all(&mut self) -> usize {
        self.reap();
        let stopped = self.units.len();
        for unit in self.units.drain(..) {
            self.output.stop(unit.voice);
        }
        stopped
    }

    /// Drop units the device reports as finished
    fn reap(&mut self) {
        let finished = self.output.take_finished();
        if finished.is_empty() {
            return;
        }
        let before = self.units.len();
        self.units.retain(|u| !finished.contains(&u.voice));
        if before - self.units.len() != finished.len() {
            warn!("Output reported completion of untracked voices");
        }
    }
}
