// src/observer.rs

use std::sync::atomic::Ordering;
use std::sync::{Arc, TryLockError};

use crate::engine::EngineShared;
use crate::event::Trigger;
use crate::scheduler::{CallbackStats, RenderScheduler};

/// Destination for scheduled triggers.
///
/// Called on the render thread: implementations must not block or allocate.
pub trait TriggerSink: Send {
    fn schedule(&mut self, trigger: Trigger);
}

impl<F> TriggerSink for F
where
    F: FnMut(Trigger) + Send,
{
    #[inline]
    fn schedule(&mut self, trigger: Trigger) {
        self(trigger)
    }
}

/// Preallocated trigger list.
///
/// Triggers past capacity are dropped and counted rather than growing the
/// buffer on the render thread.
#[derive(Debug)]
pub struct TriggerBuffer {
    triggers: Vec<Trigger>,
    capacity: usize,
    overflowed: u64,
}

impl TriggerBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            triggers: Vec::with_capacity(capacity),
            capacity,
            overflowed: 0,
        }
    }

    #[inline]
    pub fn triggers(&self) -> &[Trigger] {
        &self.triggers
    }

    /// Triggers dropped because the buffer was full.
    #[inline]
    pub fn overflowed(&self) -> u64 {
        self.overflowed
    }

    /// Forget collected triggers, keeping the allocation.
    pub fn clear(&mut self) {
        self.triggers.clear();
    }

    pub fn len(&self) -> usize {
        self.triggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }
}

impl TriggerSink for TriggerBuffer {
    #[inline]
    fn schedule(&mut self, trigger: Trigger) {
        if self.triggers.len() < self.capacity {
            self.triggers.push(trigger);
        } else {
            self.overflowed += 1;
        }
    }
}

/// Render-side state shared by all observers of one engine.
pub(crate) struct RenderState {
    pub(crate) scheduler: RenderScheduler,

    /// Observer id and host time (f64 bits) of the last claimed buffer.
    last_buffer: Option<(u64, u64)>,
}

impl RenderState {
    pub(crate) fn new(scheduler: RenderScheduler) -> Self {
        Self {
            scheduler,
            last_buffer: None,
        }
    }

    /// Claim the buffer starting at `sample_time` for `observer`.
    ///
    /// Returns `false` when a different observer already rendered a buffer
    /// with the same host time. The claim still moves to `observer`, so an
    /// observer that replaces another on a host without timestamps loses
    /// one buffer, not all of them.
    fn claim(&mut self, observer: u64, sample_time: f64) -> bool {
        let time = sample_time.to_bits();
        let repeated = matches!(
            self.last_buffer,
            Some((owner, last)) if owner != observer && last == time
        );
        self.last_buffer = Some((observer, time));
        !repeated
    }
}

/// Render-thread handle returned by `update_sequence`.
///
/// The host calls [`RenderObserver::render`] once per audio buffer, before
/// the synthesis stage. Several observers may exist; they share one
/// playhead. A callback that finds another observer mid-render is skipped
/// rather than blocking, and so is a callback for a buffer another observer
/// already rendered (same `sample_time`). Both are counted as skipped.
pub struct RenderObserver<S: TriggerSink> {
    shared: Arc<EngineShared>,
    id: u64,
    sink: S,
}

impl<S: TriggerSink> RenderObserver<S> {
    pub(crate) fn new(shared: Arc<EngineShared>, sink: S) -> Self {
        let id = shared.next_observer_id.fetch_add(1, Ordering::Relaxed);
        Self { shared, id, sink }
    }

    /// Schedule the next `frame_count` samples into the sink.
    ///
    /// `sample_time` is the host timestamp of the buffer start. Besides
    /// readback it identifies the buffer, so each buffer advances the
    /// playhead once however many observers are attached to it.
    pub fn render(&mut self, sample_time: f64, frame_count: u32) {
        let shared = &*self.shared;

        let mut state = match shared.render.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                shared.diagnostics.record_skipped_callback();
                return;
            }
        };

        if !state.claim(self.id, sample_time) {
            shared.diagnostics.record_skipped_callback();
            return;
        }

        let epoch = shared.readback.control_epoch();
        let timeline = shared.store.current_snapshot();
        let mut stats = CallbackStats::default();

        let scheduler = &mut state.scheduler;
        scheduler.render(&timeline, frame_count, &mut self.sink, &mut stats);

        let reported = scheduler
            .playhead()
            .normalized(timeline.pass_samples(), timeline.loop_policy());
        shared.readback.publish(&reported, timeline.clock(), epoch);
        shared.readback.store_host_time(sample_time);

        shared.diagnostics.record_callback();
        stats.record(&shared.diagnostics);
    }

    #[inline]
    pub fn sink(&self) -> &S {
        &self.sink
    }

    #[inline]
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trigger(offset: u32) -> Trigger {
        Trigger::note_off(0, 60, offset)
    }

    #[test]
    fn test_buffer_drops_past_capacity() {
        let mut buffer = TriggerBuffer::with_capacity(2);
        for offset in 0..5 {
            buffer.schedule(trigger(offset));
        }
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.overflowed(), 3);
        assert_eq!(buffer.triggers()[1].offset, 1);

        buffer.clear();
        assert!(buffer.is_empty());
        buffer.schedule(trigger(9));
        assert_eq!(buffer.triggers()[0].offset, 9);
    }

    #[test]
    fn test_buffer_claimed_once_across_observers() {
        let scheduler = RenderScheduler::new(rtrb::RingBuffer::new(4).1, 4, 4);
        let mut state = RenderState::new(scheduler);

        assert!(state.claim(0, 0.0));
        assert!(!state.claim(1, 0.0));
        assert!(state.claim(0, 256.0));
        assert!(!state.claim(1, 256.0));

        // Hosts without timestamps keep passing the same time.
        assert!(state.claim(1, 256.0));
        assert!(state.claim(1, 256.0));
    }

    #[test]
    fn test_closures_are_sinks() {
        let mut seen = Vec::new();
        {
            let mut sink = |t: Trigger| seen.push(t.offset);
            sink.schedule(trigger(4));
            sink.schedule(trigger(7));
        }
        assert_eq!(seen, vec![4, 7]);
    }
}
