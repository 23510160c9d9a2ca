// src/diagnostics.rs

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters the render path bumps instead of failing.
///
/// Relaxed atomics only: the render thread never waits on them and the
/// control thread reads a recent value.
#[derive(Debug, Default)]
pub struct Diagnostics {
    callbacks: AtomicU64,
    /// Callbacks that found another observer rendering, or rendering the
    /// same buffer before them.
    skipped_callbacks: AtomicU64,
    triggers: AtomicU64,
    synthesized_note_offs: AtomicU64,
    unmatched_note_offs: AtomicU64,
    /// Note-ons not emitted because the active-notes set was full.
    note_overflows: AtomicU64,
    dropped_events: AtomicU64,
    clamped_note_offs: AtomicU64,
    rejected_commands: AtomicU64,
}

/// Point-in-time copy of [`Diagnostics`].
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiagnosticsSnapshot {
    pub callbacks: u64,
    pub skipped_callbacks: u64,
    pub triggers: u64,
    pub synthesized_note_offs: u64,
    pub unmatched_note_offs: u64,
    pub note_overflows: u64,
    pub dropped_events: u64,
    pub clamped_note_offs: u64,
    pub rejected_commands: u64,
}

#[inline]
fn bump(counter: &AtomicU64, n: u64) {
    if n > 0 {
        counter.fetch_add(n, Ordering::Relaxed);
    }
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    // -------------------------------
    // MARK: Render thread
    // -------------------------------

    #[inline]
    pub fn record_callback(&self) {
        bump(&self.callbacks, 1);
    }

    #[inline]
    pub fn record_skipped_callback(&self) {
        bump(&self.skipped_callbacks, 1);
    }

    #[inline]
    pub fn record_triggers(&self, n: u64) {
        bump(&self.triggers, n);
    }

    #[inline]
    pub fn record_synthesized_note_offs(&self, n: u64) {
        bump(&self.synthesized_note_offs, n);
    }

    #[inline]
    pub fn record_unmatched_note_offs(&self, n: u64) {
        bump(&self.unmatched_note_offs, n);
    }

    #[inline]
    pub fn record_note_overflows(&self, n: u64) {
        bump(&self.note_overflows, n);
    }

    // -------------------------------
    // MARK: Control thread
    // -------------------------------

    pub fn record_publish(&self, dropped: usize, clamped_note_offs: usize) {
        bump(&self.dropped_events, dropped as u64);
        bump(&self.clamped_note_offs, clamped_note_offs as u64);
    }

    pub fn record_rejected_command(&self) {
        bump(&self.rejected_commands, 1);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        DiagnosticsSnapshot {
            callbacks: load(&self.callbacks),
            skipped_callbacks: load(&self.skipped_callbacks),
            triggers: load(&self.triggers),
            synthesized_note_offs: load(&self.synthesized_note_offs),
            unmatched_note_offs: load(&self.unmatched_note_offs),
            note_overflows: load(&self.note_overflows),
            dropped_events: load(&self.dropped_events),
            clamped_note_offs: load(&self.clamped_note_offs),
            rejected_commands: load(&self.rejected_commands),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let diagnostics = Diagnostics::new();
        diagnostics.record_callback();
        diagnostics.record_callback();
        diagnostics.record_triggers(5);
        diagnostics.record_unmatched_note_offs(0);
        diagnostics.record_publish(2, 1);

        let snapshot = diagnostics.snapshot();
        assert_eq!(snapshot.callbacks, 2);
        assert_eq!(snapshot.triggers, 5);
        assert_eq!(snapshot.unmatched_note_offs, 0);
        assert_eq!(snapshot.dropped_events, 2);
        assert_eq!(snapshot.clamped_note_offs, 1);
    }
}
