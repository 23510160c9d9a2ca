// src/active_notes.rs

/// A note whose note-on has been emitted but whose note-off has not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveNote {
    pub channel: u8,
    pub note: u8,
    /// Pass-relative sample of the note-on.
    pub start_sample: u64,
    /// Pass-relative sample of the paired note-off.
    pub end_sample: u64,
}

impl ActiveNote {
    /// Whether the note is still sounding at `position` and its note-off lies ahead.
    #[inline]
    pub fn covers(&self, position: u64) -> bool {
        self.start_sample < position && position < self.end_sample
    }
}

/// Fixed-capacity set of sounding notes.
///
/// Responsibilities:
/// - remember every emitted note-on until its note-off
/// - hand back everything still sounding for a flush
///
/// Does NOT:
/// - allocate after construction
/// - emit triggers itself
///
/// The same key may be present more than once (retriggered notes); a
/// note-off releases the oldest entry for its key.
#[derive(Debug)]
pub struct ActiveNotes {
    notes: Vec<ActiveNote>,
    capacity: usize,
}

impl ActiveNotes {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            notes: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Track a note. Returns `false` if the set is full.
    #[inline]
    pub fn insert(&mut self, note: ActiveNote) -> bool {
        if self.notes.len() >= self.capacity {
            return false;
        }
        self.notes.push(note);
        true
    }

    /// Release the oldest entry for `(channel, note)`.
    ///
    /// Returns `false` if no such note is sounding.
    #[inline]
    pub fn remove(&mut self, channel: u8, note: u8) -> bool {
        match self
            .notes
            .iter()
            .position(|n| n.channel == channel && n.note == note)
        {
            Some(index) => {
                self.notes.remove(index);
                true
            }
            None => false,
        }
    }

    /// Release every note that does not cover `position`, oldest first.
    pub fn release_not_covering(&mut self, position: u64, mut on_release: impl FnMut(&ActiveNote)) {
        self.notes.retain(|n| {
            if n.covers(position) {
                true
            } else {
                on_release(n);
                false
            }
        });
    }

    /// Release every note, oldest first.
    pub fn release_all(&mut self, mut on_release: impl FnMut(&ActiveNote)) {
        for note in &self.notes {
            on_release(note);
        }
        self.notes.clear();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.notes.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = &ActiveNote> {
        self.notes.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(key: u8, start: u64, end: u64) -> ActiveNote {
        ActiveNote {
            channel: 0,
            note: key,
            start_sample: start,
            end_sample: end,
        }
    }

    #[test]
    fn test_insert_respects_capacity() {
        let mut notes = ActiveNotes::with_capacity(2);
        assert!(notes.insert(note(60, 0, 10)));
        assert!(notes.insert(note(61, 0, 10)));
        assert!(!notes.insert(note(62, 0, 10)));
        assert_eq!(notes.len(), 2);
    }

    #[test]
    fn test_remove_releases_oldest_duplicate() {
        let mut notes = ActiveNotes::with_capacity(4);
        notes.insert(note(60, 0, 20));
        notes.insert(note(60, 5, 10));

        assert!(notes.remove(0, 60));
        assert_eq!(notes.iter().next().unwrap().start_sample, 5);
        assert!(notes.remove(0, 60));
        assert!(!notes.remove(0, 60));
    }

    #[test]
    fn test_remove_matches_channel() {
        let mut notes = ActiveNotes::with_capacity(4);
        notes.insert(ActiveNote {
            channel: 3,
            ..note(60, 0, 10)
        });
        assert!(!notes.remove(0, 60));
        assert!(notes.remove(3, 60));
    }

    #[test]
    fn test_release_all_empties_set() {
        let mut notes = ActiveNotes::with_capacity(4);
        notes.insert(note(60, 0, 10));
        notes.insert(note(64, 0, 10));

        let mut released = Vec::new();
        notes.release_all(|n| released.push(n.note));
        assert_eq!(released, vec![60, 64]);
        assert!(notes.is_empty());

        // Idempotent on an empty set.
        notes.release_all(|_| panic!("nothing to release"));
    }

    #[test]
    fn test_release_not_covering_keeps_sounding_notes() {
        let mut notes = ActiveNotes::with_capacity(4);
        notes.insert(note(60, 0, 100));
        notes.insert(note(62, 40, 60));
        notes.insert(note(64, 50, 200));

        let mut released = Vec::new();
        notes.release_not_covering(50, |n| released.push(n.note));

        // 64 starts exactly at 50 and will be retriggered, so it is released.
        assert_eq!(released, vec![64]);
        let kept: Vec<u8> = notes.iter().map(|n| n.note).collect();
        assert_eq!(kept, vec![60, 62]);
    }
}
