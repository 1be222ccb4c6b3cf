// Document normalisation before encoding.
//
// The encoder assumes a tidy score: one track per tag, notes on the position
// grid, velocities and tempos already equal to vocabulary bins, no duplicate
// onsets. `preprocess` produces such a score from an arbitrary one without
// touching the caller's copy:
//
// - tracks sharing a tag are merged (every percussion track shares `Drums`)
// - notes outside the melodic / percussion pitch range, or with no length,
//   are dropped
// - note starts snap to the nearest grid sample, keeping each note's length
// - velocities snap to the nearest velocity bin
// - notes are sorted by (start, pitch, end) and same-(start, pitch) repeats
//   dropped
// - tempo changes snap to the grid and to the nearest tempo bin; redundant
//   changes are removed and tick 0 always has a tempo

use crate::config::TokenizerConfig;
use crate::grid::TimeGrid;
use crate::score::{DEFAULT_TEMPO_BPM, Instrument, Note, Score, TempoChange};

/// Nearest bin to `value`; the first of equally close bins wins.
pub fn nearest_bin<T: Copy>(bins: &[T], value: f64, as_f64: impl Fn(T) -> f64) -> Option<T> {
    let mut best: Option<(T, f64)> = None;
    for &bin in bins {
        let dist = (as_f64(bin) - value).abs();
        match best {
            Some((_, d)) if d <= dist => {}
            _ => best = Some((bin, dist)),
        }
    }
    best.map(|(bin, _)| bin)
}

pub fn preprocess(score: &Score, config: &TokenizerConfig) -> Score {
    let grid = TimeGrid::new(score.ticks_per_beat, config.max_resolution());
    let velocities = config.velocities();

    let mut instruments: Vec<Instrument> = Vec::new();
    for track in &score.instruments {
        match instruments.iter_mut().find(|i| i.tag() == track.tag()) {
            Some(merged) => merged.notes.extend_from_slice(&track.notes),
            None => instruments.push(track.clone()),
        }
    }

    for track in &mut instruments {
        let (lo, hi) = if track.is_drum {
            config.drum_pitch_range
        } else {
            config.pitch_range
        };
        let before = track.notes.len();
        let mut notes: Vec<Note> = track
            .notes
            .iter()
            .filter(|n| (lo..hi).contains(&n.pitch) && n.end > n.start)
            .map(|n| {
                let start = grid.snap(n.start);
                let velocity = nearest_bin(&velocities, f64::from(n.velocity), f64::from)
                    .unwrap_or(n.velocity);
                Note::new(n.pitch, velocity, start, start + n.duration())
            })
            .collect();
        notes.sort_by_key(|n| (n.start, n.pitch, n.end));
        notes.dedup_by_key(|n| (n.start, n.pitch));
        if notes.len() != before {
            log::debug!(
                "track {:?}: kept {} of {} notes",
                track.tag(),
                notes.len(),
                before
            );
        }
        track.notes = notes;
    }

    Score {
        ticks_per_beat: score.ticks_per_beat,
        tempo_changes: preprocess_tempos(&score.tempo_changes, &grid, config),
        instruments,
    }
}

fn preprocess_tempos(
    changes: &[TempoChange],
    grid: &TimeGrid,
    config: &TokenizerConfig,
) -> Vec<TempoChange> {
    let tempos = config.tempos();
    let quantize = |bpm: f64| {
        nearest_bin(&tempos, bpm, f64::from)
            .map(f64::from)
            .unwrap_or(bpm)
    };

    let mut snapped: Vec<TempoChange> = changes
        .iter()
        .map(|c| TempoChange::new(grid.snap(c.tick), quantize(c.bpm)))
        .collect();
    snapped.sort_by_key(|c| c.tick);

    let mut out: Vec<TempoChange> = Vec::with_capacity(snapped.len());
    for change in snapped {
        // The last change at a tick wins.
        if out.last().is_some_and(|last| last.tick == change.tick) {
            out.pop();
        }
        if out.last().is_some_and(|last| last.bpm == change.bpm) {
            continue;
        }
        out.push(change);
    }

    if out.first().is_none_or(|first| first.tick > 0) {
        let default = TempoChange::new(0, quantize(DEFAULT_TEMPO_BPM));
        if out.first().is_some_and(|first| first.bpm == default.bpm) {
            out[0].tick = 0;
        } else {
            out.insert(0, default);
        }
    }
    out
}
