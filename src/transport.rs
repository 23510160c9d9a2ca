// src/transport.rs
//
// Transport state machine.
//
// Commands are issued on the control thread, queued in a wait-free mailbox,
// and applied by the render thread at the start of the next callback. The
// state machine itself is pure so both sides agree on what a command does.

/// Play/stop state of the sequencer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportState {
    #[default]
    Stopped,
    Playing,
}

impl TransportState {
    #[inline]
    pub fn is_playing(&self) -> bool {
        matches!(self, TransportState::Playing)
    }
}

/// A request from the control thread to the render thread.
///
/// Commands are:
/// - `Copy`, so the mailbox never allocates or drops on the render thread
/// - applied in the order they were issued
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransportCommand {
    /// Start from the current position.
    Play,

    /// Reset position and loop counter, then start.
    PlayFromStart,

    /// Start from the current position after a count-in.
    PlayAfterDelay { beats: f64 },

    /// Stop after flushing every sounding note.
    Stop,

    /// Move the playhead; play/stop state is preserved.
    Seek { beat: f64 },

    /// Flush every sounding note; play/stop state is preserved.
    Panic,

    /// Same flush as `Panic`, issued by the host's "stop playing notes".
    StopPlayingNotes,
}

/// Which sounding notes a command silences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushScope {
    None,
    /// Every sounding note.
    All,
    /// Notes that do not cover the new playhead position.
    NotCovering,
}

impl TransportCommand {
    /// Transport state after applying this command in `state`.
    #[inline]
    pub fn next_state(&self, state: TransportState) -> TransportState {
        match self {
            TransportCommand::Play
            | TransportCommand::PlayFromStart
            | TransportCommand::PlayAfterDelay { .. } => TransportState::Playing,
            TransportCommand::Stop => TransportState::Stopped,
            TransportCommand::Seek { .. }
            | TransportCommand::Panic
            | TransportCommand::StopPlayingNotes => state,
        }
    }

    #[inline]
    pub fn flush_scope(&self) -> FlushScope {
        match self {
            TransportCommand::Play | TransportCommand::PlayAfterDelay { .. } => FlushScope::None,
            TransportCommand::PlayFromStart
            | TransportCommand::Stop
            | TransportCommand::Panic
            | TransportCommand::StopPlayingNotes => FlushScope::All,
            TransportCommand::Seek { .. } => FlushScope::NotCovering,
        }
    }
}
