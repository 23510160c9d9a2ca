// src/scheduler.rs

use rtrb::Consumer;

use crate::active_notes::{ActiveNote, ActiveNotes};
use crate::beat_clock::BeatClock;
use crate::diagnostics::Diagnostics;
use crate::event::{EventKind, Trigger};
use crate::observer::TriggerSink;
use crate::playhead::Playhead;
use crate::timeline::{Timeline, TimelineEvent};
use crate::transport::{FlushScope, TransportCommand, TransportState};

/// Per-callback tallies, folded into [`Diagnostics`] once per buffer.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CallbackStats {
    pub triggers: u64,
    pub synthesized_note_offs: u64,
    pub unmatched_note_offs: u64,
    pub note_overflows: u64,
}

impl CallbackStats {
    pub fn record(&self, diagnostics: &Diagnostics) {
        diagnostics.record_triggers(self.triggers);
        diagnostics.record_synthesized_note_offs(self.synthesized_note_offs);
        diagnostics.record_unmatched_note_offs(self.unmatched_note_offs);
        diagnostics.record_note_overflows(self.note_overflows);
    }
}

/// Turns the active timeline into sample-accurate triggers.
///
/// This struct runs exclusively on the render thread.
/// It must be deterministic, allocation-free, and lock-free.
///
/// Work per callback is bounded by the pending commands, the sounding notes
/// and the events inside the buffer's window, never by the timeline length.
pub struct RenderScheduler {
    /// Transport mailbox (consumer side)
    commands: Consumer<TransportCommand>,

    /// Most commands drained in one callback
    command_budget: usize,

    playhead: Playhead,

    /// Notes emitted and not yet released
    active: ActiveNotes,

    /// Timeline the playhead position was computed against
    synced_generation: Option<u64>,
    synced_clock: Option<BeatClock>,
}

impl RenderScheduler {
    pub fn new(
        commands: Consumer<TransportCommand>,
        command_budget: usize,
        max_active_notes: usize,
    ) -> Self {
        Self {
            commands,
            command_budget,
            playhead: Playhead::default(),
            active: ActiveNotes::with_capacity(max_active_notes),
            synced_generation: None,
            synced_clock: None,
        }
    }

    #[inline]
    pub fn playhead(&self) -> &Playhead {
        &self.playhead
    }

    #[cfg(test)]
    pub fn active_notes(&self) -> &ActiveNotes {
        &self.active
    }

    /// Schedule one buffer of `frames` samples.
    ///
    /// Called once per audio buffer by the render observer.
    /// It must not allocate or block.
    pub fn render<S: TriggerSink + ?Sized>(
        &mut self,
        timeline: &Timeline,
        frames: u32,
        sink: &mut S,
        stats: &mut CallbackStats,
    ) {
        self.sync_timeline(timeline, sink, stats);
        self.apply_commands(timeline, sink, stats);

        if !self.playhead.is_playing() || frames == 0 {
            return;
        }

        let frames = frames as u64;
        let pass = timeline.pass_samples();
        let mut cursor = 0u64;

        // Count-in: the window starts after the remaining pre-roll.
        if self.playhead.preroll > 0 {
            let wait = self.playhead.preroll.min(frames);
            self.playhead.preroll -= wait;
            cursor = wait;
        }

        while cursor < frames {
            if self.playhead.position >= pass {
                if self.playhead.position == pass {
                    self.emit_all(timeline.events_at_end(), cursor, sink, stats);
                }

                if timeline.loop_policy().may_wrap(self.playhead.current_loop) {
                    self.playhead.position = 0;
                    self.playhead.current_loop = self.playhead.current_loop.saturating_add(1);
                    continue;
                }

                // End of sequence
                self.flush(FlushScope::All, cursor, sink, stats);
                self.playhead.state = TransportState::Stopped;
                return;
            }

            let start = self.playhead.position;
            let span = (frames - cursor).min(pass - start);

            for event in timeline.events_in(start, start + span) {
                let offset = cursor + (event.sample - start);
                self.emit(event, offset, sink, stats);
            }

            self.playhead.position += span;
            cursor += span;
        }
    }

    // -------------------------------
    // MARK: Transport
    // -------------------------------

    fn apply_commands<S: TriggerSink + ?Sized>(
        &mut self,
        timeline: &Timeline,
        sink: &mut S,
        stats: &mut CallbackStats,
    ) {
        for _ in 0..self.command_budget {
            let Ok(command) = self.commands.pop() else {
                break;
            };
            self.apply(command, timeline, sink, stats);
        }
    }

    /// Apply a transport command at the start of the buffer.
    fn apply<S: TriggerSink + ?Sized>(
        &mut self,
        command: TransportCommand,
        timeline: &Timeline,
        sink: &mut S,
        stats: &mut CallbackStats,
    ) {
        match command {
            TransportCommand::PlayFromStart => self.playhead.reset(),
            TransportCommand::PlayAfterDelay { beats } => {
                self.playhead.preroll = timeline.clock().beat_to_sample_index(beats);
            }
            TransportCommand::Seek { beat } => {
                self.playhead.position = timeline.seek_sample(beat);
            }
            TransportCommand::Stop => self.playhead.preroll = 0,
            TransportCommand::Play
            | TransportCommand::Panic
            | TransportCommand::StopPlayingNotes => {}
        }

        self.flush(command.flush_scope(), 0, sink, stats);
        self.playhead.state = command.next_state(self.playhead.state);
    }

    /// Follow a newly published timeline.
    ///
    /// The beat position carries over at the new tempo; sounding notes are
    /// flushed because the new timeline may not contain their note-offs.
    fn sync_timeline<S: TriggerSink + ?Sized>(
        &mut self,
        timeline: &Timeline,
        sink: &mut S,
        stats: &mut CallbackStats,
    ) {
        if self.synced_generation == Some(timeline.generation()) {
            return;
        }

        let clock = timeline.clock();
        if let Some(previous) = self.synced_clock {
            let beats = previous.sample_index_to_beat(self.playhead.position);
            let preroll = previous.sample_index_to_beat(self.playhead.preroll);

            let pass = timeline.pass_samples();
            let mut position = clock.beat_to_sample_index(beats);
            if timeline.loop_policy().is_looping() && position > pass {
                position %= pass;
            }

            self.playhead.position = position;
            self.playhead.preroll = clock.beat_to_sample_index(preroll);
        }

        self.flush(FlushScope::All, 0, sink, stats);

        self.synced_generation = Some(timeline.generation());
        self.synced_clock = Some(*clock);
    }

    // -------------------------------
    // MARK: Emission
    // -------------------------------

    fn emit_all<S: TriggerSink + ?Sized>(
        &mut self,
        events: &[TimelineEvent],
        offset: u64,
        sink: &mut S,
        stats: &mut CallbackStats,
    ) {
        for event in events {
            self.emit(event, offset, sink, stats);
        }
    }

    /// Emit one timeline event, keeping the active-notes set in step.
    #[inline]
    fn emit<S: TriggerSink + ?Sized>(
        &mut self,
        event: &TimelineEvent,
        offset: u64,
        sink: &mut S,
        stats: &mut CallbackStats,
    ) {
        let raw = &event.event;
        match event.kind {
            EventKind::NoteOn => {
                let tracked = self.active.insert(ActiveNote {
                    channel: raw.channel(),
                    note: raw.data1,
                    start_sample: event.sample,
                    end_sample: event.end_sample,
                });
                if !tracked {
                    stats.note_overflows += 1;
                    return;
                }
            }
            EventKind::NoteOff => {
                if !self.active.remove(raw.channel(), raw.data1) {
                    stats.unmatched_note_offs += 1;
                    return;
                }
            }
            EventKind::Other => {}
        }

        sink.schedule(Trigger::from_event(raw, offset as u32));
        stats.triggers += 1;
    }

    /// Synthesize note-offs at `offset` for the notes in `scope`.
    fn flush<S: TriggerSink + ?Sized>(
        &mut self,
        scope: FlushScope,
        offset: u64,
        sink: &mut S,
        stats: &mut CallbackStats,
    ) {
        let offset = offset as u32;
        let mut released = 0u64;
        let mut release = |note: &ActiveNote| {
            sink.schedule(Trigger::note_off(note.channel, note.note, offset));
            released += 1;
        };

        match scope {
            FlushScope::None => {}
            FlushScope::All => self.active.release_all(&mut release),
            FlushScope::NotCovering => {
                self.active
                    .release_not_covering(self.playhead.position, &mut release)
            }
        }

        stats.synthesized_note_offs += released;
        stats.triggers += released;
    }
}
