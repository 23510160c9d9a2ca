// src/timeline.rs
//
// Immutable timeline snapshots and the store that publishes them.
//
// The control thread builds a complete `Timeline` off to the side and swaps
// it in with a single atomic pointer exchange. The render thread only ever
// loads the current pointer, so it sees either the old timeline or the new
// one in full.
//
// Retired timelines are parked in the store and released on the control
// thread once the render thread no longer holds them, so the render thread
// never frees memory.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::{ArcSwap, Guard};

use crate::beat_clock::BeatClock;
use crate::error::SequencerError;
use crate::event::{EventKind, SequenceEvent};
use crate::settings::{LoopPolicy, SequenceSettings, SettingsCorrections};

/// Sample rate assumed by the placeholder timeline before the first publish.
const PLACEHOLDER_SAMPLE_RATE: f64 = 48_000.0;

/// An event resolved onto the sample grid of its timeline.
#[derive(Debug, Clone, Copy)]
pub struct TimelineEvent {
    pub event: SequenceEvent,
    pub kind: EventKind,
    /// Sample position within one pass.
    pub sample: u64,
    /// For note-ons: sample of the paired note-off (pass end if unpaired).
    /// Equal to `sample` for every other kind.
    pub end_sample: u64,
}

/// Summary of the corrections applied while building a timeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub accepted: usize,
    /// Events with a negative or non-finite beat, or a non-note-off at or past the end.
    pub dropped: usize,
    /// Note-offs at or past the end, moved onto the pass boundary.
    pub clamped_note_offs: usize,
    pub settings: SettingsCorrections,
}

/// Immutable pairing of an event list and its playback settings.
#[derive(Debug)]
pub struct Timeline {
    generation: u64,
    settings: SequenceSettings,
    clock: BeatClock,
    /// Length of one pass in samples (never zero).
    pass_samples: u64,
    /// Sorted by beat; equal beats keep declaration order.
    events: Vec<TimelineEvent>,
}

impl Timeline {
    /// Placeholder timeline used before anything has been published.
    pub fn empty() -> Self {
        let settings = SequenceSettings::default();
        let clock = BeatClock::new(settings.tempo, PLACEHOLDER_SAMPLE_RATE);
        Self {
            generation: 0,
            settings,
            clock,
            pass_samples: pass_samples(&clock, settings.length),
            events: Vec::new(),
        }
    }

    /// Build a timeline from host events.
    ///
    /// Settings are clamped and out-of-range events dropped; see [`PublishReport`].
    /// Fails only on an unusable sample rate or if memory cannot be reserved.
    pub fn build(
        events: &[SequenceEvent],
        settings: SequenceSettings,
        sample_rate: f64,
    ) -> Result<(Self, PublishReport), SequencerError> {
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            return Err(SequencerError::InvalidSampleRate(sample_rate));
        }

        let (settings, corrections) = settings.sanitized();
        let clock = BeatClock::new(settings.tempo, sample_rate);
        let pass_samples = pass_samples(&clock, settings.length);

        let mut report = PublishReport {
            settings: corrections,
            ..Default::default()
        };

        let mut resolved: Vec<TimelineEvent> = Vec::new();
        resolved
            .try_reserve_exact(events.len())
            .map_err(|_| SequencerError::Allocation {
                requested: events.len(),
            })?;

        for event in events {
            let kind = event.kind();
            let beat = event.beat;

            if !beat.is_finite() || beat < 0.0 {
                report.dropped += 1;
                continue;
            }

            let (event, sample) = if beat >= settings.length {
                if kind != EventKind::NoteOff {
                    report.dropped += 1;
                    continue;
                }
                report.clamped_note_offs += 1;
                let mut clamped = *event;
                clamped.beat = settings.length;
                (clamped, pass_samples)
            } else {
                let sample = clock.beat_to_sample_index(beat).min(pass_samples - 1);
                (*event, sample)
            };

            resolved.push(TimelineEvent {
                event,
                kind,
                sample,
                end_sample: sample,
            });
        }

        // Stable: equal beats keep declaration order.
        resolved.sort_by(|a, b| a.event.beat.total_cmp(&b.event.beat));
        pair_note_offs(&mut resolved, pass_samples);

        report.accepted = resolved.len();

        Ok((
            Self {
                generation: 0,
                settings,
                clock,
                pass_samples,
                events: resolved,
            },
            report,
        ))
    }

    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[inline]
    pub fn settings(&self) -> &SequenceSettings {
        &self.settings
    }

    #[inline]
    pub fn clock(&self) -> &BeatClock {
        &self.clock
    }

    #[inline]
    pub fn loop_policy(&self) -> LoopPolicy {
        self.settings.loop_policy()
    }

    #[inline]
    pub fn pass_samples(&self) -> u64 {
        self.pass_samples
    }

    #[inline]
    pub fn events(&self) -> &[TimelineEvent] {
        &self.events
    }

    /// Events with `start <= sample < end`, in playback order.
    ///
    /// Binary search, so the cost depends on the window, not the timeline.
    #[inline]
    pub fn events_in(&self, start: u64, end: u64) -> &[TimelineEvent] {
        let lo = self.events.partition_point(|e| e.sample < start);
        let hi = self.events.partition_point(|e| e.sample < end);
        &self.events[lo..hi.max(lo)]
    }

    /// Pass-relative sample a seek to `beat` lands on.
    ///
    /// Negative or non-finite targets go to the start. While looping the
    /// target wraps into the pass; otherwise a target past the end is kept
    /// and the sequence ends on the next callback.
    pub fn seek_sample(&self, beat: f64) -> u64 {
        let beat = if beat.is_finite() { beat.max(0.0) } else { 0.0 };
        let sample = self.clock.beat_to_sample_index(beat);
        if self.loop_policy().is_looping() {
            sample % self.pass_samples
        } else {
            sample
        }
    }

    /// Events sitting exactly on the pass boundary (clamped note-offs).
    #[inline]
    pub fn events_at_end(&self) -> &[TimelineEvent] {
        let lo = self.events.partition_point(|e| e.sample < self.pass_samples);
        &self.events[lo..]
    }
}

fn pass_samples(clock: &BeatClock, length: f64) -> u64 {
    clock.beat_to_sample_index(length).max(1)
}

/// Record each note-on's paired note-off sample.
///
/// A note-off closes the oldest open note-on with the same channel and key.
fn pair_note_offs(events: &mut [TimelineEvent], pass_samples: u64) {
    let mut open: HashMap<(u8, u8), VecDeque<usize>> = HashMap::new();

    for index in 0..events.len() {
        let event = events[index];
        let key = (event.event.channel(), event.event.data1);
        match event.kind {
            EventKind::NoteOn => {
                events[index].end_sample = pass_samples;
                open.entry(key).or_default().push_back(index);
            }
            EventKind::NoteOff => {
                if let Some(on_index) = open.get_mut(&key).and_then(|q| q.pop_front()) {
                    events[on_index].end_sample = event.sample;
                }
            }
            EventKind::Other => {}
        }
    }
}

//
// ===============================
// MARK: Timeline store
// ===============================
//

/// Atomically swappable "current timeline".
///
/// Single writer (control thread)
/// Any number of readers (render observers)
pub struct TimelineStore {
    current: ArcSwap<Timeline>,

    next_generation: AtomicU64,

    /// Timelines swapped out but possibly still loaded by the render thread.
    /// Locked by the control thread only.
    retired: Mutex<Vec<Arc<Timeline>>>,
}

impl TimelineStore {
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(Timeline::empty()),
            next_generation: AtomicU64::new(1),
            retired: Mutex::new(Vec::new()),
        }
    }

    /// Swap in a new timeline and return a handle to it.
    ///
    /// Control-thread only.
    pub fn publish(&self, mut timeline: Timeline) -> Arc<Timeline> {
        timeline.generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        let timeline = Arc::new(timeline);
        let previous = self.current.swap(Arc::clone(&timeline));
        self.retire(previous);

        timeline
    }

    /// Get the currently active timeline.
    ///
    /// Audio-thread-safe, lock-free.
    #[inline]
    pub fn current_snapshot(&self) -> Guard<Arc<Timeline>> {
        self.current.load()
    }

    /// Owned handle to the current timeline, for control-thread queries.
    pub fn current_full(&self) -> Arc<Timeline> {
        self.current.load_full()
    }

    /// Release retired timelines nobody references any more.
    ///
    /// Returns how many are still held by a reader. Control-thread only.
    pub fn collect(&self) -> usize {
        let mut retired = self.retired.lock().unwrap_or_else(PoisonError::into_inner);
        retired.retain(|t| Arc::strong_count(t) > 1);
        retired.len()
    }

    fn retire(&self, timeline: Arc<Timeline>) {
        {
            let mut retired = self.retired.lock().unwrap_or_else(PoisonError::into_inner);
            retired.push(timeline);
        }
        self.collect();
    }
}

impl Default for TimelineStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::SequenceNote;

    fn settings(length: f64) -> SequenceSettings {
        SequenceSettings::new(length, 120.0, true, 0)
    }

    #[test]
    fn test_events_sorted_with_stable_ties() {
        let events = [
            SequenceEvent::note_on(0, 67, 100, 1.0),
            SequenceEvent::note_on(0, 60, 100, 0.0),
            SequenceEvent::note_on(0, 64, 100, 1.0),
            SequenceEvent::note_on(0, 62, 100, 1.0),
        ];
        let (timeline, report) = Timeline::build(&events, settings(4.0), 44_100.0).unwrap();
        let keys: Vec<u8> = timeline.events().iter().map(|e| e.event.data1).collect();
        assert_eq!(keys, vec![60, 67, 64, 62]);
        assert_eq!(report.accepted, 4);
    }

    #[test]
    fn test_out_of_range_events_are_dropped() {
        let events = [
            SequenceEvent::note_on(0, 60, 100, -0.5),
            SequenceEvent::note_on(0, 61, 100, f64::NAN),
            SequenceEvent::note_on(0, 62, 100, 4.0),
            SequenceEvent::new(0xB0, 7, 100, 5.0),
            SequenceEvent::note_on(0, 63, 100, 3.5),
        ];
        let (timeline, report) = Timeline::build(&events, settings(4.0), 44_100.0).unwrap();
        assert_eq!(report.dropped, 4);
        assert_eq!(report.accepted, 1);
        assert_eq!(timeline.events()[0].event.data1, 63);
    }

    #[test]
    fn test_late_note_offs_clamp_to_pass_end() {
        let note = SequenceNote::new(0, 60, 100, 3.5, 1.0).unwrap();
        let (timeline, report) =
            Timeline::build(&SequenceNote::flatten(&[note]), settings(4.0), 44_100.0).unwrap();

        assert_eq!(report.clamped_note_offs, 1);
        assert_eq!(timeline.pass_samples(), 88_200);
        assert_eq!(timeline.events_at_end().len(), 1);
        assert_eq!(timeline.events_at_end()[0].event.beat, 4.0);
        assert_eq!(timeline.events()[0].end_sample, 88_200);
    }

    #[test]
    fn test_note_on_paired_with_note_off() {
        let notes = [
            SequenceNote::new(0, 60, 100, 0.0, 1.0).unwrap(),
            SequenceNote::new(0, 60, 100, 1.0, 0.5).unwrap(),
        ];
        let (timeline, _) =
            Timeline::build(&SequenceNote::flatten(&notes), settings(2.0), 44_100.0).unwrap();

        let ons: Vec<_> = timeline
            .events()
            .iter()
            .filter(|e| e.kind == EventKind::NoteOn)
            .map(|e| (e.sample, e.end_sample))
            .collect();
        assert_eq!(ons, vec![(0, 22_050), (22_050, 33_075)]);
    }

    #[test]
    fn test_events_in_window() {
        let events = [
            SequenceEvent::note_on(0, 60, 100, 0.0),
            SequenceEvent::note_on(0, 62, 100, 0.5),
            SequenceEvent::note_on(0, 64, 100, 1.0),
        ];
        let (timeline, _) = Timeline::build(&events, settings(2.0), 44_100.0).unwrap();

        let window: Vec<u8> = timeline
            .events_in(0, 22_050)
            .iter()
            .map(|e| e.event.data1)
            .collect();
        assert_eq!(window, vec![60, 62]);
        assert!(timeline.events_in(11_026, 22_050).is_empty());
        assert_eq!(timeline.events_in(22_050, 22_051).len(), 1);
    }

    #[test]
    fn test_seek_wraps_only_while_looping() {
        let (looped, _) = Timeline::build(&[], settings(4.0), 44_100.0).unwrap();
        assert_eq!(looped.seek_sample(5.0), 22_050);
        assert_eq!(looped.seek_sample(-1.0), 0);
        assert_eq!(looped.seek_sample(f64::INFINITY), 0);

        let once = SequenceSettings::new(4.0, 120.0, false, 0);
        let (single, _) = Timeline::build(&[], once, 44_100.0).unwrap();
        assert_eq!(single.seek_sample(5.0), 110_250);
    }

    #[test]
    fn test_invalid_sample_rate_rejected() {
        let result = Timeline::build(&[], settings(4.0), 0.0);
        assert_eq!(result.unwrap_err(), SequencerError::InvalidSampleRate(0.0));
    }

    #[test]
    fn test_publish_swaps_whole_timeline() {
        let store = TimelineStore::new();
        assert_eq!(store.current_snapshot().generation(), 0);

        let (timeline, _) = Timeline::build(
            &[SequenceEvent::note_on(0, 60, 100, 0.0)],
            SequenceSettings::new(2.0, 90.0, false, 0),
            48_000.0,
        )
        .unwrap();
        let handle = store.publish(timeline);

        let current = store.current_snapshot();
        assert!(Arc::ptr_eq(&*current, &handle));
        assert_eq!(current.settings().tempo, 90.0);
        assert_eq!(current.events().len(), 1);
    }

    #[test]
    fn test_retired_timeline_kept_while_loaded() {
        let store = TimelineStore::new();
        let reader = store.current_full();

        let (timeline, _) = Timeline::build(&[], settings(4.0), 48_000.0).unwrap();
        store.publish(timeline);

        // Reader still holds the placeholder.
        assert_eq!(store.collect(), 1);
        assert_eq!(reader.generation(), 0);

        drop(reader);
        assert_eq!(store.collect(), 0);
    }

    #[test]
    fn test_generations_increase() {
        let store = TimelineStore::new();
        let (a, _) = Timeline::build(&[], settings(4.0), 48_000.0).unwrap();
        let (b, _) = Timeline::build(&[], settings(4.0), 48_000.0).unwrap();
        let first = store.publish(a).generation();
        let second = store.publish(b).generation();
        assert!(second > first);
    }
}
