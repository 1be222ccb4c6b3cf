// The public entry point: one tokenizer instance per vocabulary.
//
// `MuMidiTokenizer` owns the configuration and everything derived from it
// (vocabulary, duration table, chord detector, type graph) and wires the
// pipeline together:
//
//   encode: Score -> preprocess -> encode_score -> TokenSequence
//   decode: TokenSequence -> Decoder -> Score (-> MIDI file)
//   check:  TokenSequence -> validate -> error ratio
//
// Encoding takes `&mut self` because it may grow the bar field. The grown
// capacity is what `save_params` writes out, so models trained on ids from
// one session keep working after a reload. `probe_bar_capacity` lets a
// caller size the bar field for a whole corpus before handing out ids.
//
// Token files store each sequence twice, as labels (readable, stable across
// vocabulary edits) and as ids (what a model consumes). Loading reads the
// labels.

use crate::chord::{ChordDetector, OnsetChordDetector};
use crate::config::TokenizerConfig;
use crate::decode::Decoder;
use crate::duration::DurationTable;
use crate::encode::encode_score;
use crate::error::{CodecError, CodecResult};
use crate::grid::TimeGrid;
use crate::midi;
use crate::preprocess::preprocess;
use crate::score::Score;
use crate::token::TokenSequence;
use crate::validate::{TokenTypeGraph, ValidationReport, validate};
use crate::vocab::Vocabulary;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// On-disk form of a tokenized document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenFile {
    pub tokens: Vec<Vec<String>>,
    pub ids: Vec<Vec<u32>>,
}

pub struct MuMidiTokenizer {
    config: TokenizerConfig,
    vocab: Vocabulary,
    durations: DurationTable,
    chords: OnsetChordDetector,
    graph: TokenTypeGraph,
}

impl MuMidiTokenizer {
    pub fn new(config: TokenizerConfig) -> CodecResult<Self> {
        config.validate()?;
        let durations = DurationTable::new(&config.beat_res);
        let chords = OnsetChordDetector::from_config(&config);
        let chord_labels = if config.use_chords {
            chords.labels()
        } else {
            Vec::new()
        };
        let vocab = Vocabulary::build(&config, durations.bins(), &chord_labels);
        log::debug!("vocabulary field sizes: {:?}", vocab.sizes());
        Ok(MuMidiTokenizer {
            graph: TokenTypeGraph::new(config.use_chords),
            config,
            vocab,
            durations,
            chords,
        })
    }

    pub fn from_params(path: &Path) -> CodecResult<Self> {
        MuMidiTokenizer::new(TokenizerConfig::load(path)?)
    }

    /// The configuration as it would be saved: bar capacity at its current,
    /// possibly grown, value.
    pub fn params(&self) -> TokenizerConfig {
        TokenizerConfig {
            max_bar_embedding: self.vocab.bar_capacity(),
            ..self.config.clone()
        }
    }

    pub fn save_params(&self, path: &Path) -> CodecResult<()> {
        self.params().save(path)
    }

    pub fn config(&self) -> &TokenizerConfig {
        &self.config
    }

    pub fn vocab(&self) -> &Vocabulary {
        &self.vocab
    }

    pub fn durations(&self) -> &DurationTable {
        &self.durations
    }

    pub fn encode(&mut self, score: &Score) -> CodecResult<TokenSequence> {
        check_ticks_per_beat(score)?;
        let score = preprocess(score, &self.config);
        let chords: Option<&dyn ChordDetector> = Some(&self.chords);
        encode_score(
            &score,
            &self.config,
            &mut self.durations,
            chords,
            &mut self.vocab,
        )
    }

    /// Grow the bar field to fit every score, returning the new capacity.
    /// Fails on the first score that would exceed the limit, keeping the
    /// growth made for earlier scores.
    pub fn probe_bar_capacity(&mut self, scores: &[Score]) -> CodecResult<u32> {
        for score in scores {
            check_ticks_per_beat(score)?;
            let score = preprocess(score, &self.config);
            let grid = TimeGrid::new(score.ticks_per_beat, self.config.max_resolution());
            let last_onset = score
                .instruments
                .iter()
                .filter(|track| self.config.programs.contains(&track.tag()))
                .flat_map(|track| track.notes.iter())
                .map(|note| note.start)
                .max();
            if let Some(tick) = last_onset {
                self.vocab
                    .ensure_bar_capacity(grid.bar(tick), self.config.max_bar_embedding_limit)?;
            }
        }
        Ok(self.vocab.bar_capacity())
    }

    pub fn decode(&self, sequence: &TokenSequence, time_division: u32) -> CodecResult<Score> {
        Decoder::new(self.config.max_resolution()).decode(sequence, time_division)
    }

    /// Decode and write the result as a standard MIDI file.
    pub fn decode_to_file(
        &self,
        sequence: &TokenSequence,
        time_division: u32,
        path: &Path,
    ) -> CodecResult<Score> {
        let score = self.decode(sequence, time_division)?;
        midi::write_midi(&score, path)?;
        Ok(score)
    }

    pub fn validate(&self, sequence: &TokenSequence) -> ValidationReport {
        validate(&self.graph, sequence)
    }

    /// Fraction of rows that break the grammar, in [0, 1].
    pub fn tokens_errors(&self, sequence: &TokenSequence) -> f64 {
        self.validate(sequence).ratio()
    }

    pub fn sequence_to_ids(&self, sequence: &TokenSequence) -> CodecResult<Vec<Vec<u32>>> {
        sequence
            .rows
            .iter()
            .map(|row| self.vocab.row_to_ids(row))
            .collect()
    }

    pub fn ids_to_sequence(&self, ids: &[Vec<u32>]) -> CodecResult<TokenSequence> {
        let rows = ids
            .iter()
            .map(|row| self.vocab.ids_to_row(row))
            .collect::<CodecResult<Vec<_>>>()?;
        Ok(TokenSequence::new(rows))
    }

    pub fn save_tokens(&self, sequence: &TokenSequence, path: &Path) -> CodecResult<()> {
        let file = TokenFile {
            tokens: sequence.to_labels(),
            ids: self.sequence_to_ids(sequence)?,
        };
        let data = serde_json::to_string(&file)?;
        std::fs::write(path, data).map_err(|e| CodecError::io(path, e))
    }

    pub fn load_tokens(&self, path: &Path) -> CodecResult<TokenSequence> {
        let data = std::fs::read_to_string(path).map_err(|e| CodecError::io(path, e))?;
        let file: TokenFile = serde_json::from_str(&data)?;
        TokenSequence::from_labels(&file.tokens, self.vocab.has_tempo())
    }
}

/// Scores with no time division cannot be placed on a grid.
fn check_ticks_per_beat(score: &Score) -> CodecResult<()> {
    if score.ticks_per_beat == 0 {
        return Err(CodecError::InvalidTicksPerBeat(0));
    }
    Ok(())
}
