//! Control-thread facade for the sequencer.
//!
//! # Architecture
//!
//! - **Control thread** owns [`SequencerEngine`]: it publishes timelines and
//!   issues transport commands
//! - **Render thread** owns one or more [`RenderObserver`]s and calls
//!   `render` once per audio buffer
//! - Timelines are swapped atomically, transport commands travel through a
//!   wait-free SPSC queue, and playhead readback uses atomics
//!
//! # Usage
//!
//! ```ignore
//! let mut engine = SequencerEngine::new();
//! let mut observer = engine.update_sequence(&events, settings, 44_100.0, sink)?;
//! engine.play_from_start()?;
//!
//! // Render thread, once per buffer:
//! observer.render(sample_time, frames);
//! ```

use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex};

use log::{debug, error, info, warn};
use rtrb::{Producer, RingBuffer};

use crate::config::EngineConfig;
use crate::diagnostics::{Diagnostics, DiagnosticsSnapshot};
use crate::error::SequencerError;
use crate::event::SequenceEvent;
use crate::observer::{RenderObserver, RenderState, TriggerSink};
use crate::playhead::PlayheadReadback;
use crate::scheduler::RenderScheduler;
use crate::settings::SequenceSettings;
use crate::timeline::{PublishReport, Timeline, TimelineStore};
use crate::transport::TransportCommand;

/// State shared between the engine and its observers.
pub(crate) struct EngineShared {
    pub(crate) store: TimelineStore,
    pub(crate) readback: PlayheadReadback,
    pub(crate) diagnostics: Diagnostics,

    /// Render-side state. Only observers lock it, and only with `try_lock`.
    pub(crate) render: Mutex<RenderState>,

    pub(crate) next_observer_id: AtomicU64,
}

/// Handle for the control thread.
///
/// All methods are safe to call from the main thread and return without
/// waiting on the render thread. Transport methods update readback
/// immediately, so a query right after a command reflects it.
pub struct SequencerEngine {
    shared: Arc<EngineShared>,

    /// Transport mailbox (producer side)
    commands: Producer<TransportCommand>,

    config: EngineConfig,
}

impl SequencerEngine {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let config = config.normalized();
        let (producer, consumer) = RingBuffer::new(config.command_capacity);

        let shared = Arc::new(EngineShared {
            store: TimelineStore::new(),
            readback: PlayheadReadback::new(),
            diagnostics: Diagnostics::new(),
            render: Mutex::new(RenderState::new(RenderScheduler::new(
                consumer,
                config.command_capacity,
                config.max_active_notes,
            ))),
            next_observer_id: AtomicU64::new(0),
        });

        debug!(
            "Sequencer engine created ({} command slots, {} active notes)",
            config.command_capacity, config.max_active_notes
        );

        Self {
            shared,
            commands: producer,
            config,
        }
    }

    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ═══════════════════════════════════════════════════════════════════
    // Publishing
    // ═══════════════════════════════════════════════════════════════════

    /// Replace the sequence and return a render observer feeding `sink`.
    ///
    /// The new timeline takes effect on the next render callback of any
    /// observer; observers returned by earlier calls keep working.
    pub fn update_sequence<S: TriggerSink>(
        &mut self,
        events: &[SequenceEvent],
        settings: SequenceSettings,
        sample_rate: f64,
        sink: S,
    ) -> Result<RenderObserver<S>, SequencerError> {
        self.publish(events, settings, sample_rate)?;
        Ok(self.observer(sink))
    }

    /// Replace the sequence without creating an observer.
    pub fn publish(
        &mut self,
        events: &[SequenceEvent],
        settings: SequenceSettings,
        sample_rate: f64,
    ) -> Result<PublishReport, SequencerError> {
        let (timeline, report) = Timeline::build(events, settings, sample_rate)
            .inspect_err(|e| error!("Error building timeline: {e}"))?;

        if report.settings.tempo_clamped {
            warn!("Tempo {} clamped to {}", settings.tempo, timeline.settings().tempo);
        }
        if report.settings.length_clamped {
            warn!("Length {} clamped to {}", settings.length, timeline.settings().length);
        }
        if report.dropped > 0 {
            warn!("Dropped {} out-of-range events", report.dropped);
        }

        self.shared
            .diagnostics
            .record_publish(report.dropped, report.clamped_note_offs);

        let timeline = self.shared.store.publish(timeline);
        info!(
            "Published timeline #{} ({} events, {} beats at {} BPM, {:?})",
            timeline.generation(),
            report.accepted,
            timeline.settings().length,
            timeline.settings().tempo,
            timeline.loop_policy()
        );

        Ok(report)
    }

    /// Attach another observer to the current sequence.
    pub fn observer<S: TriggerSink>(&self, sink: S) -> RenderObserver<S> {
        RenderObserver::new(Arc::clone(&self.shared), sink)
    }

    /// Settings of the timeline currently in effect.
    pub fn settings(&self) -> SequenceSettings {
        *self.shared.store.current_snapshot().settings()
    }

    /// Free timelines the render thread no longer references.
    ///
    /// Publishing already does this; call it to release memory sooner.
    /// Returns how many retired timelines are still in use.
    pub fn collect_garbage(&self) -> usize {
        self.shared.store.collect()
    }

    // ═══════════════════════════════════════════════════════════════════
    // Readback
    // ═══════════════════════════════════════════════════════════════════

    /// Current position in beats, within the current pass.
    pub fn position(&self) -> f64 {
        self.shared.readback.position()
    }

    pub fn current_loop(&self) -> u32 {
        self.shared.readback.current_loop()
    }

    pub fn is_playing(&self) -> bool {
        self.shared.readback.is_playing()
    }

    /// Host sample time of the last rendered buffer.
    pub fn last_render_time(&self) -> f64 {
        self.shared.readback.host_time()
    }

    pub fn diagnostics(&self) -> DiagnosticsSnapshot {
        self.shared.diagnostics.snapshot()
    }

    // ═══════════════════════════════════════════════════════════════════
    // Transport
    // ═══════════════════════════════════════════════════════════════════

    /// Start from the current position.
    pub fn play(&mut self) -> Result<(), SequencerError> {
        self.send(TransportCommand::Play)?;
        self.shared.readback.store_playing(true);
        Ok(())
    }

    /// Reset position and loop counter, then start.
    pub fn play_from_start(&mut self) -> Result<(), SequencerError> {
        self.send(TransportCommand::PlayFromStart)?;
        let readback = &self.shared.readback;
        readback.store_position(0.0);
        readback.store_current_loop(0);
        readback.store_playing(true);
        Ok(())
    }

    /// Start from the current position after `beats` of count-in.
    pub fn play_after_delay(&mut self, beats: f64) -> Result<(), SequencerError> {
        let beats = if beats.is_finite() { beats.max(0.0) } else { 0.0 };
        self.send(TransportCommand::PlayAfterDelay { beats })?;
        self.shared.readback.store_playing(true);
        Ok(())
    }

    /// Stop and release every sounding note.
    pub fn stop(&mut self) -> Result<(), SequencerError> {
        self.send(TransportCommand::Stop)?;
        self.shared.readback.store_playing(false);
        Ok(())
    }

    /// Move the playhead to `beat`, keeping the play/stop state.
    pub fn seek_to(&mut self, beat: f64) -> Result<(), SequencerError> {
        let timeline = self.shared.store.current_full();
        let target = timeline.seek_sample(beat);

        self.send(TransportCommand::Seek { beat })?;
        self.shared
            .readback
            .store_position(timeline.clock().sample_index_to_beat(target));
        Ok(())
    }

    /// Seek to the start.
    pub fn rewind(&mut self) -> Result<(), SequencerError> {
        self.seek_to(0.0)
    }

    /// Release every sounding note without stopping.
    pub fn panic(&mut self) -> Result<(), SequencerError> {
        self.send(TransportCommand::Panic)
    }

    /// Host-facing alias of [`SequencerEngine::panic`].
    pub fn stop_playing_notes(&mut self) -> Result<(), SequencerError> {
        self.send(TransportCommand::StopPlayingNotes)
    }

    fn send(&mut self, command: TransportCommand) -> Result<(), SequencerError> {
        debug!("Transport command {:?}", command);
        if self.commands.push(command).is_err() {
            self.shared.diagnostics.record_rejected_command();
            warn!("Transport queue full, rejected {:?}", command);
            return Err(SequencerError::CommandQueueFull(command));
        }
        Ok(())
    }
}

impl Default for SequencerEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SequencerEngine {
    /// Observers that outlive the engine release their notes and go quiet.
    fn drop(&mut self) {
        if self.commands.push(TransportCommand::Stop).is_err() {
            warn!("Transport queue full while shutting down; notes may keep sounding");
        }
        self.shared.readback.store_playing(false);
        self.shared.store.collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Trigger;
    use crate::observer::TriggerBuffer;

    fn events() -> Vec<SequenceEvent> {
        vec![
            SequenceEvent::note_on(0, 60, 100, 0.0),
            SequenceEvent::note_off(0, 60, 1.0),
        ]
    }

    #[test]
    fn test_commands_visible_before_render() {
        let mut engine = SequencerEngine::new();
        engine
            .publish(&events(), SequenceSettings::default(), 44_100.0)
            .unwrap();

        assert!(!engine.is_playing());
        engine.play().unwrap();
        assert!(engine.is_playing());

        engine.seek_to(2.0).unwrap();
        assert_eq!(engine.position(), 2.0);

        engine.stop().unwrap();
        assert!(!engine.is_playing());
        assert_eq!(engine.position(), 2.0);
    }

    #[test]
    fn test_seek_position_wraps_with_looping() {
        let mut engine = SequencerEngine::new();
        engine
            .publish(&[], SequenceSettings::new(4.0, 120.0, true, 0), 44_100.0)
            .unwrap();
        engine.seek_to(5.0).unwrap();
        assert_eq!(engine.position(), 1.0);
        engine.seek_to(-3.0).unwrap();
        assert_eq!(engine.position(), 0.0);
    }

    #[test]
    fn test_full_queue_rejects_command() {
        let config = EngineConfig {
            command_capacity: 2,
            ..EngineConfig::default()
        };
        let mut engine = SequencerEngine::with_config(config);

        engine.panic().unwrap();
        engine.panic().unwrap();
        assert_eq!(
            engine.play(),
            Err(SequencerError::CommandQueueFull(TransportCommand::Play))
        );
        assert!(!engine.is_playing());
        assert_eq!(engine.diagnostics().rejected_commands, 1);
    }

    #[test]
    fn test_invalid_sample_rate_leaves_sequence_untouched() {
        let mut engine = SequencerEngine::new();
        engine
            .publish(&events(), SequenceSettings::new(8.0, 90.0, true, 0), 44_100.0)
            .unwrap();

        let result = engine.update_sequence(
            &events(),
            SequenceSettings::default(),
            f64::NAN,
            |_t: Trigger| {},
        );
        assert!(matches!(result, Err(SequencerError::InvalidSampleRate(_))));
        assert_eq!(engine.settings().tempo, 90.0);
    }

    #[test]
    fn test_settings_clamped_on_publish() {
        let mut engine = SequencerEngine::new();
        let report = engine
            .publish(&events(), SequenceSettings::new(0.0, -5.0, true, 0), 44_100.0)
            .unwrap();
        assert!(report.settings.tempo_clamped);
        assert!(report.settings.length_clamped);
        assert!(engine.settings().tempo > 0.0);
        assert!(engine.settings().length > 0.0);
    }

    #[test]
    fn test_dropping_engine_silences_observers() {
        let mut engine = SequencerEngine::new();
        let mut observer = engine
            .update_sequence(
                &events(),
                SequenceSettings::default(),
                44_100.0,
                TriggerBuffer::with_capacity(16),
            )
            .unwrap();

        engine.play_from_start().unwrap();
        observer.render(0.0, 256);
        assert_eq!(observer.sink().len(), 1);

        drop(engine);
        observer.sink_mut().clear();
        observer.render(256.0, 256);

        let triggers = observer.sink().triggers();
        assert_eq!(triggers.len(), 1);
        assert!(triggers[0].is_note_off());

        observer.sink_mut().clear();
        observer.render(512.0, 44_100);
        assert!(observer.sink().is_empty());
    }
}
