// src/playhead.rs

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use crate::beat_clock::BeatClock;
use crate::settings::LoopPolicy;
use crate::transport::TransportState;

/// Render-side playback position.
///
/// Owned by the render state and mutated only while a render callback runs.
/// The position is kept on the sample grid of the active timeline so that
/// successive passes stay sample-exact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Playhead {
    /// Sample within the current pass.
    pub position: u64,

    /// Zero-based index of the current pass.
    pub current_loop: u32,

    pub state: TransportState,

    /// Samples of count-in left before the scheduling window starts.
    pub preroll: u64,
}

impl Playhead {
    #[inline]
    pub fn position_beats(&self, clock: &BeatClock) -> f64 {
        clock.sample_index_to_beat(self.position)
    }

    #[inline]
    pub fn is_playing(&self) -> bool {
        self.state.is_playing()
    }

    /// The playhead as the host should see it.
    ///
    /// A pass that ended exactly on a buffer boundary wraps at the start of
    /// the next callback; report the post-wrap position already.
    pub fn normalized(&self, pass_samples: u64, policy: LoopPolicy) -> Playhead {
        if self.position >= pass_samples && policy.may_wrap(self.current_loop) {
            Playhead {
                position: 0,
                current_loop: self.current_loop.saturating_add(1),
                ..*self
            }
        } else {
            *self
        }
    }

    pub fn reset(&mut self) {
        self.position = 0;
        self.current_loop = 0;
        self.preroll = 0;
    }
}

/// Lock-free shared state for render -> control readback.
///
/// Written at the end of every render callback, and eagerly by the control
/// thread when it issues a command, so queries never block and reflect a
/// command before the next callback has run.
///
/// Every eager store bumps `control_epoch`. A callback that started before
/// the bump does not publish its playhead, so it cannot overwrite a
/// command's readback with the state it had before seeing that command.
#[derive(Debug)]
pub struct PlayheadReadback {
    /// Beat position stored as f64 bits (no AtomicF64 in std)
    position_bits: AtomicU64,
    current_loop: AtomicU32,
    playing: AtomicBool,
    /// Host sample time of the last rendered buffer, as f64 bits.
    host_time_bits: AtomicU64,
    control_epoch: AtomicU64,
}

impl PlayheadReadback {
    pub fn new() -> Self {
        Self {
            position_bits: AtomicU64::new(0.0_f64.to_bits()),
            current_loop: AtomicU32::new(0),
            playing: AtomicBool::new(false),
            host_time_bits: AtomicU64::new(0.0_f64.to_bits()),
            control_epoch: AtomicU64::new(0),
        }
    }

    /// Number of eager control-side stores so far.
    ///
    /// The render thread reads this before it drains commands and hands it
    /// back to [`publish`](Self::publish).
    #[inline]
    pub fn control_epoch(&self) -> u64 {
        self.control_epoch.load(Ordering::Acquire)
    }

    /// Publish the render thread's view of the playhead.
    ///
    /// Skipped, returning `false`, when the control thread stored newer
    /// values after `since_epoch` was read. The next callback publishes.
    #[inline]
    pub fn publish(&self, playhead: &Playhead, clock: &BeatClock, since_epoch: u64) -> bool {
        if self.control_epoch() != since_epoch {
            return false;
        }
        self.position_bits
            .store(playhead.position_beats(clock).to_bits(), Ordering::Relaxed);
        self.current_loop.store(playhead.current_loop, Ordering::Relaxed);
        self.playing.store(playhead.is_playing(), Ordering::Release);
        true
    }

    #[inline]
    pub fn store_position(&self, beats: f64) {
        self.position_bits.store(beats.to_bits(), Ordering::Relaxed);
        self.bump_epoch();
    }

    #[inline]
    pub fn store_current_loop(&self, current_loop: u32) {
        self.current_loop.store(current_loop, Ordering::Relaxed);
        self.bump_epoch();
    }

    #[inline]
    pub fn store_playing(&self, playing: bool) {
        self.playing.store(playing, Ordering::Release);
        self.bump_epoch();
    }

    #[inline]
    fn bump_epoch(&self) {
        self.control_epoch.fetch_add(1, Ordering::AcqRel);
    }

    #[inline]
    pub fn store_host_time(&self, sample_time: f64) {
        self.host_time_bits.store(sample_time.to_bits(), Ordering::Relaxed);
    }

    #[inline]
    pub fn position(&self) -> f64 {
        f64::from_bits(self.position_bits.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn current_loop(&self) -> u32 {
        self.current_loop.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    #[inline]
    pub fn host_time(&self) -> f64 {
        f64::from_bits(self.host_time_bits.load(Ordering::Relaxed))
    }
}

impl Default for PlayheadReadback {
    fn default() -> Self {
        Self::new()
    }
}
