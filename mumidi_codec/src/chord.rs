// Chord detection.
//
// The encoder treats chord detection as a black box behind `ChordDetector`:
// given one track's notes it returns chord labels with their onset ticks, and
// the encoder turns each into a `Chord_<label>` row ahead of that tick's
// notes.
//
// `OnsetChordDetector` is the stock implementation. It walks notes in onset
// order and groups every note starting within `onset_window` ticks of a
// group's first note. A group of three or more distinct pitches is named by
// its interval set above the lowest pitch (`maj`, `7dom`, ...) or, when no
// known shape matches, by its note count (`Chord_4`) if that count falls in
// the configured unknown-chord range.

use crate::config::TokenizerConfig;
use crate::score::Note;

/// Known chord shapes as semitone offsets above the root.
pub const CHORD_MAPS: &[(&str, &[u8])] = &[
    ("min", &[0, 3, 7]),
    ("maj", &[0, 4, 7]),
    ("dim", &[0, 3, 6]),
    ("aug", &[0, 4, 8]),
    ("sus2", &[0, 2, 7]),
    ("sus4", &[0, 5, 7]),
    ("7dom", &[0, 4, 7, 10]),
    ("7min", &[0, 3, 7, 10]),
    ("7maj", &[0, 4, 7, 11]),
    ("7halfdim", &[0, 3, 6, 10]),
    ("7dim", &[0, 3, 6, 9]),
    ("7aug", &[0, 4, 8, 11]),
    ("9maj", &[0, 4, 7, 10, 14]),
    ("9min", &[0, 4, 7, 10, 13]),
];

/// A chord found in a track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedChord {
    /// Label value, without the `Chord_` prefix.
    pub label: String,
    pub tick: u32,
}

pub trait ChordDetector {
    /// Detect chords in one track's notes, given the document time division.
    fn detect(&self, notes: &[Note], ticks_per_beat: u32) -> Vec<DetectedChord>;

    /// Every label this detector can produce, in vocabulary order.
    fn labels(&self) -> Vec<String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnsetChordDetector {
    /// Samples per beat used to size the onset window (one sample).
    pub resolution: u32,
    /// Note counts `[min, max)` that still produce an unnamed chord.
    pub unknown_range: Option<(usize, usize)>,
}

impl OnsetChordDetector {
    pub fn from_config(config: &TokenizerConfig) -> Self {
        OnsetChordDetector {
            resolution: config.first_resolution(),
            unknown_range: config.chord_unknown,
        }
    }

    fn name_group(&self, pitches: &[u8]) -> Option<String> {
        if pitches.len() < 3 {
            return None;
        }
        let root = pitches[0];
        let intervals: Vec<u8> = pitches.iter().map(|p| p - root).collect();
        if let Some((name, _)) = CHORD_MAPS.iter().find(|(_, shape)| *shape == intervals.as_slice()) {
            return Some(name.to_string());
        }
        match self.unknown_range {
            Some((lo, hi)) if (lo..hi).contains(&pitches.len()) => Some(pitches.len().to_string()),
            _ => None,
        }
    }
}

impl ChordDetector for OnsetChordDetector {
    fn detect(&self, notes: &[Note], ticks_per_beat: u32) -> Vec<DetectedChord> {
        let window = ticks_per_beat / self.resolution.max(1);
        let mut sorted: Vec<&Note> = notes.iter().collect();
        sorted.sort_by_key(|n| (n.start, n.pitch));

        let mut chords = Vec::new();
        let mut i = 0;
        while i < sorted.len() {
            let onset = sorted[i].start;
            let mut j = i;
            while j < sorted.len() && sorted[j].start - onset <= window {
                j += 1;
            }
            let mut pitches: Vec<u8> = sorted[i..j].iter().map(|n| n.pitch).collect();
            pitches.sort_unstable();
            pitches.dedup();
            if let Some(label) = self.name_group(&pitches) {
                chords.push(DetectedChord { label, tick: onset });
            }
            i = j;
        }
        chords
    }

    fn labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = CHORD_MAPS.iter().map(|(name, _)| name.to_string()).collect();
        if let Some((lo, hi)) = self.unknown_range {
            labels.extend((lo..hi).map(|n| n.to_string()));
        }
        labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> OnsetChordDetector {
        OnsetChordDetector::from_config(&TokenizerConfig::default())
    }

    fn notes(onsets: &[(u32, u8)]) -> Vec<Note> {
        onsets
            .iter()
            .map(|&(start, pitch)| Note::new(pitch, 80, start, start + 480))
            .collect()
    }

    #[test]
    fn test_detect_triads() {
        let notes = notes(&[(0, 60), (0, 64), (0, 67), (960, 57), (960, 60), (960, 64)]);
        let chords = detector().detect(&notes, 480);
        assert_eq!(
            chords,
            vec![
                DetectedChord { label: "maj".to_string(), tick: 0 },
                DetectedChord { label: "min".to_string(), tick: 960 },
            ]
        );
    }

    #[test]
    fn test_onset_window_groups_near_notes() {
        // 480 / 8 = 60 tick window
        let notes = notes(&[(0, 60), (30, 64), (60, 67), (200, 72)]);
        let chords = detector().detect(&notes, 480);
        assert_eq!(chords.len(), 1);
        assert_eq!(chords[0].label, "maj");
        assert_eq!(chords[0].tick, 0);
    }

    #[test]
    fn test_unknown_and_small_groups() {
        let d = detector();
        // Two notes: not a chord.
        assert!(d.detect(&notes(&[(0, 60), (0, 62)]), 480).is_empty());
        // Four-note cluster: unknown chord named by size.
        let cluster = d.detect(&notes(&[(0, 60), (0, 61), (0, 62), (0, 63)]), 480);
        assert_eq!(cluster[0].label, "4");
        // Octave doubling collapses only identical pitches, so C-E-G-C is unnamed.
        let doubled = d.detect(&notes(&[(0, 60), (0, 64), (0, 67), (0, 72)]), 480);
        assert_eq!(doubled[0].label, "4");

        let strict = OnsetChordDetector {
            unknown_range: None,
            ..d
        };
        assert!(strict.detect(&notes(&[(0, 60), (0, 61), (0, 62)]), 480).is_empty());
    }

    #[test]
    fn test_labels_cover_detections() {
        let d = detector();
        let labels = d.labels();
        assert_eq!(labels.len(), CHORD_MAPS.len() + 3);
        assert!(labels.contains(&"9min".to_string()));
        assert!(labels.contains(&"5".to_string()));
    }
}
