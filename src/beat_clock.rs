//
// ===============================
// MARK: Beat clock
// ===============================
//

/// Converts between musical time (beats) and the sample domain.
///
/// This struct:
/// - is real-time safe
/// - is copyable
/// - holds no playback state
///
/// Tempo must be positive; callers clamp it at the settings boundary.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct BeatClock {
    /// Beats per minute
    tempo: f64,

    /// Sample rate (Hz)
    sample_rate: f64,
}

impl BeatClock {
    pub fn new(tempo: f64, sample_rate: f64) -> Self {
        debug_assert!(tempo > 0.0, "tempo must be positive");
        debug_assert!(sample_rate > 0.0, "sample rate must be positive");
        Self { tempo, sample_rate }
    }

    #[inline]
    pub fn tempo(&self) -> f64 {
        self.tempo
    }

    #[inline]
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    #[inline]
    pub fn seconds_per_beat(&self) -> f64 {
        60.0 / self.tempo
    }

    #[inline]
    pub fn samples_per_beat(&self) -> f64 {
        self.seconds_per_beat() * self.sample_rate
    }

    // -------------------------------
    // MARK: Conversions
    // -------------------------------

    #[inline]
    pub fn beats_to_samples(&self, beats: f64) -> f64 {
        beats_to_samples(beats, self.tempo, self.sample_rate)
    }

    #[inline]
    pub fn samples_to_beats(&self, samples: f64) -> f64 {
        samples_to_beats(samples, self.tempo, self.sample_rate)
    }

    /// Beat position snapped to the nearest whole sample.
    ///
    /// Negative beats snap to sample 0.
    #[inline]
    pub fn beat_to_sample_index(&self, beats: f64) -> u64 {
        let samples = self.beats_to_samples(beats).round();
        if samples > 0.0 { samples as u64 } else { 0 }
    }

    #[inline]
    pub fn sample_index_to_beat(&self, sample: u64) -> f64 {
        self.samples_to_beats(sample as f64)
    }
}

/// `beats * (60 / tempo) * sample_rate`
#[inline]
pub fn beats_to_samples(beats: f64, tempo: f64, sample_rate: f64) -> f64 {
    beats * (60.0 / tempo) * sample_rate
}

/// Inverse of [`beats_to_samples`].
#[inline]
pub fn samples_to_beats(samples: f64, tempo: f64, sample_rate: f64) -> f64 {
    samples / sample_rate * (tempo / 60.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_beat_at_60_bpm_is_one_second() {
        let clock = BeatClock::new(60.0, 44_100.0);
        assert_eq!(clock.beats_to_samples(1.0), 44_100.0);
        assert_eq!(clock.samples_to_beats(44_100.0), 1.0);
    }

    #[test]
    fn test_half_beat_at_120_bpm() {
        let clock = BeatClock::new(120.0, 44_100.0);
        assert_eq!(clock.beat_to_sample_index(0.5), 11_025);
        assert_eq!(clock.beat_to_sample_index(0.6), 13_230);
    }

    #[test]
    fn test_negative_beats_snap_to_zero() {
        let clock = BeatClock::new(120.0, 48_000.0);
        assert_eq!(clock.beat_to_sample_index(-2.0), 0);
    }

    #[test]
    fn test_round_trip_across_practical_ranges() {
        for &tempo in &[20.0, 75.0, 120.0, 133.3, 400.0] {
            for &rate in &[8_000.0, 44_100.0, 48_000.0, 96_000.0, 192_000.0] {
                let clock = BeatClock::new(tempo, rate);
                for &beat in &[0.0, 0.25, 1.0, 3.98, 1024.5] {
                    let back = clock.samples_to_beats(clock.beats_to_samples(beat));
                    assert!((back - beat).abs() < 1e-9, "{tempo} {rate} {beat}");
                }
            }
        }
    }

    #[test]
    fn test_sample_index_within_one_sample() {
        let clock = BeatClock::new(133.0, 48_000.0);
        let exact = clock.beats_to_samples(2.37);
        let snapped = clock.beat_to_sample_index(2.37) as f64;
        assert!((exact - snapped).abs() <= 0.5);
    }
}
