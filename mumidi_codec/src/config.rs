// Tokenizer configuration.
//
// Everything that shapes the vocabulary lives in `TokenizerConfig`, which is
// persisted as JSON next to a tokenized dataset so the exact same tokenizer
// can be rebuilt later. Defaults follow the usual MuMIDI setup: piano-range
// pitches, a drum pitch range, an 8-samples-per-beat grid for the first bar
// and 4 for the next two, 32 velocity bins, 32 tempo bins, every program.
//
// `max_bar_embedding` is the size of the bar positional-encoding field. It
// grows during encoding and is always saved at its grown value (see
// tokenizer.rs), so a reloaded tokenizer never shrinks below what a previous
// dataset needed. `max_bar_embedding_limit` caps that growth.

use crate::error::{CodecError, CodecResult};
use crate::token::{Program, SpecialToken};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One entry of the beat-resolution table: beats `[start, end)` are sampled
/// at `resolution` samples per beat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeatRange {
    pub start: u32,
    pub end: u32,
    pub resolution: u32,
}

impl BeatRange {
    pub fn new(start: u32, end: u32, resolution: u32) -> Self {
        BeatRange {
            start,
            end,
            resolution,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenizerConfig {
    /// Melodic pitches `[start, end)`.
    pub pitch_range: (u8, u8),
    /// Percussion pitches `[start, end)`.
    pub drum_pitch_range: (u8, u8),
    pub beat_res: Vec<BeatRange>,
    pub nb_velocities: u8,
    pub nb_tempos: u32,
    /// Tempo bins span `[min, max]` BPM inclusive.
    pub tempo_range: (u32, u32),
    /// Track tags that are encoded; tracks with any other tag are skipped.
    pub programs: Vec<Program>,
    /// Current size of the bar positional-encoding field.
    pub max_bar_embedding: u32,
    /// Upper bound on `max_bar_embedding` growth.
    pub max_bar_embedding_limit: u32,
    pub special_tokens: Vec<SpecialToken>,
    pub use_tempos: bool,
    pub use_chords: bool,
    /// Note-count range `[min, max)` for which an unrecognised simultaneous
    /// group still becomes a chord token (`Chord_<count>`). `None` disables
    /// unknown chords.
    pub chord_unknown: Option<(usize, usize)>,
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        TokenizerConfig {
            pitch_range: (21, 109),
            drum_pitch_range: (27, 88),
            beat_res: vec![BeatRange::new(0, 4, 8), BeatRange::new(4, 12, 4)],
            nb_velocities: 32,
            nb_tempos: 32,
            tempo_range: (40, 250),
            programs: Program::all(),
            max_bar_embedding: 60,
            max_bar_embedding_limit: 65_536,
            special_tokens: SpecialToken::ALL.to_vec(),
            use_tempos: false,
            use_chords: false,
            chord_unknown: Some((3, 6)),
        }
    }
}

impl TokenizerConfig {
    /// Finest samples-per-beat of the beat-resolution table.
    pub fn max_resolution(&self) -> u32 {
        self.beat_res.iter().map(|r| r.resolution).max().unwrap_or(1)
    }

    /// Resolution of the range starting at beat 0 (the chord onset window).
    pub fn first_resolution(&self) -> u32 {
        self.beat_res
            .iter()
            .min_by_key(|r| r.start)
            .map(|r| r.resolution)
            .unwrap_or(1)
    }

    /// Velocity bins: `linspace(0, 127, n + 1)[1:]`, truncated.
    pub fn velocities(&self) -> Vec<u8> {
        let n = u32::from(self.nb_velocities);
        (1..=n).map(|i| (127 * i / n) as u8).collect()
    }

    /// Tempo bins: `nb_tempos` integer BPM values evenly spread over
    /// `tempo_range`, rounded to the nearest integer.
    pub fn tempos(&self) -> Vec<u32> {
        let (lo, hi) = self.tempo_range;
        if self.nb_tempos <= 1 {
            return vec![lo];
        }
        let steps = u64::from(self.nb_tempos - 1);
        let mut tempos: Vec<u32> = (0..=steps)
            .map(|i| {
                let num = 2 * (u64::from(lo) * steps + i * u64::from(hi - lo)) + steps;
                (num / (2 * steps)) as u32
            })
            .collect();
        tempos.dedup();
        tempos
    }

    pub fn validate(&self) -> CodecResult<()> {
        let invalid = |msg: String| Err(CodecError::InvalidConfig(msg));
        if self.beat_res.is_empty() {
            return invalid("beat_res is empty".to_string());
        }
        for range in &self.beat_res {
            if range.start >= range.end || range.resolution == 0 {
                return invalid(format!("bad beat range {range:?}"));
            }
        }
        for (name, (start, end)) in [
            ("pitch_range", self.pitch_range),
            ("drum_pitch_range", self.drum_pitch_range),
        ] {
            if start >= end || end > 128 {
                return invalid(format!("{name} ({start}, {end}) is not a MIDI pitch range"));
            }
        }
        if self.nb_velocities == 0 || self.nb_velocities > 127 {
            return invalid(format!("nb_velocities {} not in 1..=127", self.nb_velocities));
        }
        if self.nb_tempos == 0 || self.tempo_range.0 == 0 || self.tempo_range.0 > self.tempo_range.1
        {
            return invalid(format!(
                "{} tempos over {:?} is not a tempo range",
                self.nb_tempos, self.tempo_range
            ));
        }
        if self.programs.is_empty() {
            return invalid("no programs allowed".to_string());
        }
        if self.max_bar_embedding > self.max_bar_embedding_limit {
            return invalid(format!(
                "max_bar_embedding {} exceeds its limit {}",
                self.max_bar_embedding, self.max_bar_embedding_limit
            ));
        }
        Ok(())
    }

    pub fn load(path: &Path) -> CodecResult<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| CodecError::io(path, e))?;
        let config: TokenizerConfig = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> CodecResult<()> {
        let data = serde_json::to_string_pretty(self)?;
        std::fs::write(path, data).map_err(|e| CodecError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_valid() {
        let config = TokenizerConfig::default();
        config.validate().unwrap();
        assert_eq!(config.max_resolution(), 8);
        assert_eq!(config.first_resolution(), 8);
        assert_eq!(config.programs.len(), 129);
    }

    #[test]
    fn test_velocity_bins() {
        let velocities = TokenizerConfig::default().velocities();
        assert_eq!(velocities.len(), 32);
        assert_eq!(velocities[0], 3);
        assert_eq!(velocities[19], 79);
        assert_eq!(*velocities.last().unwrap(), 127);
    }

    #[test]
    fn test_tempo_bins() {
        let tempos = TokenizerConfig::default().tempos();
        assert_eq!(tempos.len(), 32);
        assert_eq!(tempos[0], 40);
        assert_eq!(*tempos.last().unwrap(), 250);
        assert!(tempos.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_validate_rejects() {
        let mut config = TokenizerConfig::default();
        config.beat_res.clear();
        assert!(config.validate().is_err());

        let mut config = TokenizerConfig::default();
        config.pitch_range = (60, 60);
        assert!(config.validate().is_err());

        let mut config = TokenizerConfig::default();
        config.max_bar_embedding = config.max_bar_embedding_limit + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_json_roundtrip() {
        let mut config = TokenizerConfig::default();
        config.use_tempos = true;
        config.use_chords = true;
        config.max_bar_embedding = 123;
        config.programs = vec![Program::Drums, Program::Melodic(0), Program::Melodic(33)];
        config.drum_pitch_range = (30, 80);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        config.save(&path).unwrap();
        let loaded = TokenizerConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let config: TokenizerConfig = serde_json::from_str(r#"{"use_tempos": true}"#).unwrap();
        assert!(config.use_tempos);
        assert_eq!(config.max_bar_embedding, 60);
    }
}
