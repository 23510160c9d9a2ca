// src/lib.rs
//
// Library entry point for FFI consumers (iOS/Swift) and Rust hosts.

mod active_notes;
mod beat_clock;
mod config;
mod diagnostics;
mod engine;
mod error;
mod event;
mod observer;
mod playhead;
mod scheduler;
mod settings;
mod timeline;
mod transport;

pub mod ffi;

#[cfg(feature = "web")]
mod wasm;


// Re-export key types for Rust consumers
pub use beat_clock::{BeatClock, beats_to_samples, samples_to_beats};
pub use config::{DEFAULT_COMMAND_CAPACITY, DEFAULT_MAX_ACTIVE_NOTES, EngineConfig};
pub use diagnostics::DiagnosticsSnapshot;
pub use engine::SequencerEngine;
pub use error::SequencerError;
pub use event::{EventKind, SequenceEvent, SequenceNote, Trigger};
pub use observer::{RenderObserver, TriggerBuffer, TriggerSink};
pub use settings::{
    DEFAULT_TEMPO, LoopPolicy, MIN_LENGTH, MIN_TEMPO, SequenceSettings, SettingsCorrections,
};
pub use timeline::{PublishReport, Timeline, TimelineEvent};
pub use transport::{TransportCommand, TransportState};
