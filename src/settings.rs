// src/settings.rs

/// Slowest tempo accepted; anything below is clamped up at publish time.
pub const MIN_TEMPO: f64 = 1.0;

/// Tempo substituted for a non-finite tempo.
pub const DEFAULT_TEMPO: f64 = 120.0;

/// Shortest sequence length in beats.
pub const MIN_LENGTH: f64 = 1.0 / 64.0;

/// Playback settings for one timeline.
///
/// `number_of_loops <= 0` means "loop forever" when looping is enabled.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SequenceSettings {
    /// Length of one pass in beats.
    pub length: f64,
    /// Beats per minute.
    pub tempo: f64,
    pub loop_enabled: bool,
    pub number_of_loops: i32,
}

impl Default for SequenceSettings {
    fn default() -> Self {
        Self {
            length: 4.0,
            tempo: DEFAULT_TEMPO,
            loop_enabled: true,
            number_of_loops: 0,
        }
    }
}

/// Which fields `SequenceSettings::sanitized` had to correct.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettingsCorrections {
    pub tempo_clamped: bool,
    pub length_clamped: bool,
}

impl SettingsCorrections {
    pub fn any(&self) -> bool {
        self.tempo_clamped || self.length_clamped
    }
}

impl SequenceSettings {
    pub fn new(length: f64, tempo: f64, loop_enabled: bool, number_of_loops: i32) -> Self {
        Self {
            length,
            tempo,
            loop_enabled,
            number_of_loops,
        }
    }

    /// Clamp tempo and length into ranges the beat clock can divide by.
    pub fn sanitized(self) -> (Self, SettingsCorrections) {
        let mut out = self;
        let mut corrections = SettingsCorrections::default();

        if !out.tempo.is_finite() {
            out.tempo = DEFAULT_TEMPO;
            corrections.tempo_clamped = true;
        } else if out.tempo < MIN_TEMPO {
            out.tempo = MIN_TEMPO;
            corrections.tempo_clamped = true;
        }

        if !out.length.is_finite() || out.length < MIN_LENGTH {
            out.length = MIN_LENGTH;
            corrections.length_clamped = true;
        }

        (out, corrections)
    }

    #[inline]
    pub fn loop_policy(&self) -> LoopPolicy {
        if !self.loop_enabled {
            LoopPolicy::Once
        } else if self.number_of_loops <= 0 {
            LoopPolicy::Forever
        } else {
            LoopPolicy::Times(self.number_of_loops as u32)
        }
    }
}

/// What happens when the playhead reaches the end of a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPolicy {
    /// Play one pass, then stop.
    Once,
    /// Play this many passes in total, then stop.
    Times(u32),
    Forever,
}

impl LoopPolicy {
    /// Whether the pass with index `current_loop` may wrap into another pass.
    #[inline]
    pub fn may_wrap(&self, current_loop: u32) -> bool {
        match *self {
            LoopPolicy::Once => false,
            LoopPolicy::Times(n) => current_loop.saturating_add(1) < n,
            LoopPolicy::Forever => true,
        }
    }

    #[inline]
    pub fn is_looping(&self) -> bool {
        !matches!(self, LoopPolicy::Once)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_and_negative_loops_are_infinite() {
        let zero = SequenceSettings::new(4.0, 120.0, true, 0);
        let negative = SequenceSettings::new(4.0, 120.0, true, -3);
        assert_eq!(zero.loop_policy(), LoopPolicy::Forever);
        assert_eq!(negative.loop_policy(), LoopPolicy::Forever);
    }

    #[test]
    fn test_disabled_loop_plays_once() {
        let settings = SequenceSettings::new(4.0, 120.0, false, 8);
        assert_eq!(settings.loop_policy(), LoopPolicy::Once);
        assert!(!settings.loop_policy().may_wrap(0));
    }

    #[test]
    fn test_finite_loops_stop_after_last_pass() {
        let policy = SequenceSettings::new(4.0, 120.0, true, 2).loop_policy();
        assert!(policy.may_wrap(0));
        assert!(!policy.may_wrap(1));
    }

    #[test]
    fn test_sanitize_clamps_bad_values() {
        let (settings, corrections) = SequenceSettings::new(-1.0, 0.0, true, 0).sanitized();
        assert_eq!(settings.tempo, MIN_TEMPO);
        assert_eq!(settings.length, MIN_LENGTH);
        assert!(corrections.tempo_clamped);
        assert!(corrections.length_clamped);

        let (settings, corrections) =
            SequenceSettings::new(f64::NAN, f64::INFINITY, true, 0).sanitized();
        assert_eq!(settings.tempo, DEFAULT_TEMPO);
        assert_eq!(settings.length, MIN_LENGTH);
        assert!(corrections.any());
    }

    #[test]
    fn test_sanitize_keeps_valid_values() {
        let original = SequenceSettings::new(8.0, 96.0, false, 1);
        let (settings, corrections) = original.sanitized();
        assert_eq!(settings, original);
        assert!(!corrections.any());
    }
}
