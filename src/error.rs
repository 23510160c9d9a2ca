// src/error.rs

use thiserror::Error;

use crate::transport::TransportCommand;

/// Failures reported to the control thread.
///
/// The render path never produces these; it skips and counts instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SequencerError {
    #[error("Invalid sample rate: {0}")]
    InvalidSampleRate(f64),

    #[error("Could not reserve memory for {requested} events")]
    Allocation { requested: usize },

    #[error("Transport command queue is full, dropped {0:?}")]
    CommandQueueFull(TransportCommand),
}
