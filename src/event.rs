// src/event.rs

/// ===============================
/// Timeline-side sequence events
/// ===============================

const STATUS_NOTE_OFF: u8 = 0x80;
const STATUS_NOTE_ON: u8 = 0x90;

/// One raw timed event in musical time.
///
/// These events:
/// - are built by the host and copied into a snapshot at publish time
/// - are relative to the sequence start (beat 0)
/// - need not be sorted when handed to the engine
///
/// `#[repr(C)]` so the C ABI can borrow host arrays directly.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SequenceEvent {
    pub status: u8,
    pub data1: u8,
    pub data2: u8,
    pub beat: f64,
}

impl SequenceEvent {
    pub fn new(status: u8, data1: u8, data2: u8, beat: f64) -> Self {
        Self {
            status,
            data1,
            data2,
            beat,
        }
    }

    pub fn note_on(channel: u8, note: u8, velocity: u8, beat: f64) -> Self {
        Self::new(STATUS_NOTE_ON | (channel & 0x0F), note, velocity, beat)
    }

    pub fn note_off(channel: u8, note: u8, beat: f64) -> Self {
        Self::new(STATUS_NOTE_OFF | (channel & 0x0F), note, 0, beat)
    }

    /// Classify the event by its status byte.
    ///
    /// A note-on with velocity 0 is a note-off.
    #[inline]
    pub fn kind(&self) -> EventKind {
        match self.status & 0xF0 {
            STATUS_NOTE_ON if self.data2 > 0 => EventKind::NoteOn,
            STATUS_NOTE_ON | STATUS_NOTE_OFF => EventKind::NoteOff,
            _ => EventKind::Other,
        }
    }

    #[inline]
    pub fn channel(&self) -> u8 {
        self.status & 0x0F
    }
}

/// How the scheduler treats an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    NoteOn,
    NoteOff,
    /// Any other message (control change, program change, ...), passed through.
    Other,
}

/// One musical note's lifetime.
///
/// Invariant: `note_off.beat > note_on.beat`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SequenceNote {
    pub note_on: SequenceEvent,
    pub note_off: SequenceEvent,
}

impl SequenceNote {
    /// Build a note starting at `position` lasting `duration` beats.
    ///
    /// Returns `None` if `duration` is not positive.
    pub fn new(channel: u8, note: u8, velocity: u8, position: f64, duration: f64) -> Option<Self> {
        if duration.is_nan() || duration <= 0.0 {
            return None;
        }

        Some(Self {
            note_on: SequenceEvent::note_on(channel, note, velocity, position),
            note_off: SequenceEvent::note_off(channel, note, position + duration),
        })
    }

    /// Flatten notes into raw events, note-on then note-off for each note.
    pub fn flatten(notes: &[SequenceNote]) -> Vec<SequenceEvent> {
        notes
            .iter()
            .flat_map(|n| [n.note_on, n.note_off])
            .collect()
    }
}

/// ===============================
/// Render-side scheduled triggers
/// ===============================

/// A trigger handed to the synthesis stage.
///
/// These triggers:
/// - are RT-safe (plain `Copy` data)
/// - contain NO musical-time information
/// - carry their position as a sample offset into the current buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trigger {
    pub status: u8,
    pub data1: u8,
    pub data2: u8,
    /// Offset in frames from the start of the buffer being rendered.
    pub offset: u32,
}

impl Trigger {
    #[inline]
    pub fn from_event(event: &SequenceEvent, offset: u32) -> Self {
        Self {
            status: event.status,
            data1: event.data1,
            data2: event.data2,
            offset,
        }
    }

    /// Synthesized note-off for a sounding note.
    #[inline]
    pub fn note_off(channel: u8, note: u8, offset: u32) -> Self {
        Self {
            status: STATUS_NOTE_OFF | (channel & 0x0F),
            data1: note,
            data2: 0,
            offset,
        }
    }

    #[inline]
    pub fn is_note_on(&self) -> bool {
        self.status & 0xF0 == STATUS_NOTE_ON && self.data2 > 0
    }

    #[inline]
    pub fn is_note_off(&self) -> bool {
        match self.status & 0xF0 {
            STATUS_NOTE_OFF => true,
            STATUS_NOTE_ON => self.data2 == 0,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kinds() {
        assert_eq!(SequenceEvent::note_on(0, 60, 100, 0.0).kind(), EventKind::NoteOn);
        assert_eq!(SequenceEvent::note_off(0, 60, 1.0).kind(), EventKind::NoteOff);
        // Running-status style note-off
        assert_eq!(SequenceEvent::new(0x93, 60, 0, 1.0).kind(), EventKind::NoteOff);
        // Control change
        assert_eq!(SequenceEvent::new(0xB0, 7, 100, 0.0).kind(), EventKind::Other);
    }

    #[test]
    fn test_channel_is_masked() {
        let event = SequenceEvent::note_on(0x1F, 60, 100, 0.0);
        assert_eq!(event.status, 0x9F);
        assert_eq!(event.channel(), 0x0F);
    }

    #[test]
    fn test_note_rejects_empty_duration() {
        assert!(SequenceNote::new(0, 60, 100, 1.0, 0.0).is_none());

        let note = SequenceNote::new(2, 60, 100, 1.0, 0.5).unwrap();
        assert_eq!(note.note_on.beat, 1.0);
        assert_eq!(note.note_off.beat, 1.5);
        assert_eq!(note.note_off.status, 0x82);
    }

    #[test]
    fn test_flatten_keeps_note_order() {
        let notes = [
            SequenceNote::new(0, 60, 100, 0.0, 1.0).unwrap(),
            SequenceNote::new(0, 64, 100, 0.5, 1.0).unwrap(),
        ];
        let events = SequenceNote::flatten(&notes);
        let keys: Vec<_> = events.iter().map(|e| (e.data1, e.kind())).collect();
        assert_eq!(
            keys,
            vec![
                (60, EventKind::NoteOn),
                (60, EventKind::NoteOff),
                (64, EventKind::NoteOn),
                (64, EventKind::NoteOff),
            ]
        );
    }

    #[test]
    fn test_trigger_classification() {
        let off = Trigger::note_off(1, 60, 10);
        assert!(off.is_note_off());
        assert!(!off.is_note_on());
        assert_eq!(off.status, 0x81);

        let on = Trigger::from_event(&SequenceEvent::note_on(0, 60, 90, 0.0), 3);
        assert!(on.is_note_on());
        assert_eq!(on.offset, 3);
    }
}
