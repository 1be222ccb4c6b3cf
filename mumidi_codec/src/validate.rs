// Grammar check for generated sequences.
//
// A model emits rows one at a time; this scores how far a sequence strays
// from what the encoder could have produced. Two things are checked:
//
// - type order: each row's primary type must be a successor of the previous
//   row's type in `TokenTypeGraph` (Bar -> Position -> Program -> notes ...)
// - time consistency: bars advance one at a time, positions strictly
//   increase within a bar and agree with their own position encoding, no
//   melodic pitch repeats at one position, and a row's positional encodings
//   never point behind the current bar/position (checked even when the type
//   transition itself is an error)
//
// Rows containing PAD or MASK in any field count as one error and are
// otherwise skipped. Scoring never fails: any input produces a ratio.

use crate::token::{Token, TokenRow, TokenSequence, TokenType};
use std::collections::{BTreeMap, BTreeSet};

/// Allowed primary-type transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenTypeGraph {
    edges: BTreeMap<TokenType, BTreeSet<TokenType>>,
}

impl TokenTypeGraph {
    pub fn new(use_chords: bool) -> Self {
        use TokenType::*;
        let mut edges: BTreeMap<TokenType, BTreeSet<TokenType>> = BTreeMap::new();
        let mut add = |from: TokenType, to: &[TokenType]| {
            edges.entry(from).or_default().extend(to.iter().copied());
        };
        add(Bar, &[Bar, Position]);
        add(Position, &[Program]);
        add(Program, &[Pitch, DrumPitch]);
        add(Pitch, &[Pitch, Program, Bar, Position]);
        add(DrumPitch, &[DrumPitch, Program, Bar, Position]);
        if use_chords {
            add(Program, &[Chord]);
            add(Chord, &[Pitch]);
        }
        TokenTypeGraph { edges }
    }

    pub fn allows(&self, from: TokenType, to: TokenType) -> bool {
        self.edges.get(&from).is_some_and(|next| next.contains(&to))
    }

    pub fn successors(&self, from: TokenType) -> impl Iterator<Item = TokenType> + '_ {
        self.edges.get(&from).into_iter().flatten().copied()
    }
}

/// Error count for one sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ValidationReport {
    pub rows: usize,
    pub errors: usize,
}

impl ValidationReport {
    /// Errors per row, in [0, 1]. An empty sequence scores 0.
    pub fn ratio(&self) -> f64 {
        if self.rows == 0 {
            return 0.0;
        }
        (self.errors as f64 / self.rows as f64).min(1.0)
    }
}

fn bar_of(row: &TokenRow) -> i64 {
    match row.bar_enc {
        Token::BarPosEnc(bar) => i64::from(bar),
        _ => -1,
    }
}

fn position_of(row: &TokenRow) -> i64 {
    match row.position_enc {
        Token::PositionPosEnc(Some(pos)) => i64::from(pos),
        _ => -1,
    }
}

pub fn validate(graph: &TokenTypeGraph, sequence: &TokenSequence) -> ValidationReport {
    let mut report = ValidationReport {
        rows: sequence.len(),
        errors: 0,
    };
    let Some((first, rest)) = sequence.rows.split_first() else {
        return report;
    };

    let mut previous = first.token_type();
    let mut bar = bar_of(first);
    let mut position = position_of(first);
    let mut pitches: BTreeSet<u8> = BTreeSet::new();

    for row in rest {
        if row.fields().into_iter().any(Token::is_pad_or_mask) {
            report.errors += 1;
            continue;
        }

        let current = row.token_type();
        if graph.allows(previous, current) {
            match &row.primary {
                Token::Bar => {
                    bar += 1;
                    position = -1;
                    pitches.clear();
                }
                Token::Pitch(pitch) => {
                    if !pitches.insert(*pitch) {
                        report.errors += 1;
                    }
                }
                Token::Position(value) => {
                    let value = i64::from(*value);
                    if value <= position || value != position_of(row) {
                        report.errors += 1;
                    } else {
                        position = value;
                        pitches.clear();
                    }
                }
                Token::Program(_) => pitches.clear(),
                _ => {}
            }
        } else {
            report.errors += 1;
        }

        if position_of(row) < position || bar_of(row) < bar {
            report.errors += 1;
        }
        previous = current;
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::duration::DurationBin;
    use crate::token::{Program, SpecialToken};

    fn note(pitch: u8, bar: u32, pos: u32) -> TokenRow {
        TokenRow::note(Token::Pitch(pitch), bar, pos, None, 79, DurationBin::new(1, 0, 8))
    }

    fn well_formed() -> Vec<TokenRow> {
        vec![
            TokenRow::structural(Token::Bar, 0, None, None),
            TokenRow::structural(Token::Position(0), 0, Some(0), None),
            TokenRow::structural(Token::Program(Program::Melodic(0)), 0, Some(0), None),
            note(60, 0, 0),
            note(64, 0, 0),
            TokenRow::structural(Token::Position(8), 0, Some(8), None),
            TokenRow::structural(Token::Program(Program::Melodic(0)), 0, Some(8), None),
            note(60, 0, 8),
            TokenRow::structural(Token::Bar, 1, None, None),
            TokenRow::structural(Token::Position(0), 1, Some(0), None),
            TokenRow::structural(Token::Program(Program::Drums), 1, Some(0), None),
            TokenRow::note(Token::DrumPitch(36), 1, 0, None, 79, DurationBin::new(0, 1, 8)),
        ]
    }

    #[test]
    fn test_graph_edges() {
        let graph = TokenTypeGraph::new(false);
        assert!(graph.allows(TokenType::Bar, TokenType::Position));
        assert!(!graph.allows(TokenType::Position, TokenType::Pitch));
        assert!(!graph.allows(TokenType::Program, TokenType::Chord));
        let with_chords = TokenTypeGraph::new(true);
        assert!(with_chords.allows(TokenType::Program, TokenType::Chord));
        assert_eq!(
            with_chords.successors(TokenType::Chord).collect::<Vec<_>>(),
            vec![TokenType::Pitch]
        );
    }

    #[test]
    fn test_well_formed_scores_zero() {
        let graph = TokenTypeGraph::new(false);
        let report = validate(&graph, &TokenSequence::new(well_formed()));
        assert_eq!(report.errors, 0);
        assert_eq!(report.ratio(), 0.0);
        assert_eq!(validate(&graph, &TokenSequence::default()).ratio(), 0.0);
    }

    #[test]
    fn test_duplicate_pitch() {
        let graph = TokenTypeGraph::new(false);
        let mut rows = well_formed();
        rows.insert(4, note(60, 0, 0));
        let report = validate(&graph, &TokenSequence::new(rows));
        assert_eq!(report.errors, 1);
        assert!(report.ratio() > 0.0);
    }

    #[test]
    fn test_bad_transitions_and_specials() {
        let graph = TokenTypeGraph::new(false);
        let mut rows = well_formed();
        // Position straight to Pitch.
        rows.remove(2);
        assert_eq!(validate(&graph, &TokenSequence::new(rows)).errors, 1);

        let mut rows = well_formed();
        rows[4].duration = Some(Token::Special(SpecialToken::Pad));
        assert_eq!(validate(&graph, &TokenSequence::new(rows)).errors, 1);
    }

    #[test]
    fn test_positions_must_advance() {
        let graph = TokenTypeGraph::new(false);
        let mut rows = well_formed();
        // Position 4 repeated within one bar.
        rows[5] = TokenRow::structural(Token::Position(4), 0, Some(4), None);
        rows.insert(8, TokenRow::structural(Token::Position(4), 0, Some(4), None));
        rows.insert(9, TokenRow::structural(Token::Program(Program::Melodic(0)), 0, Some(4), None));
        rows.insert(10, note(62, 0, 4));
        let report = validate(&graph, &TokenSequence::new(rows));
        assert_eq!(report.errors, 1);

        // A position whose encoding disagrees with its value.
        let mut rows = well_formed();
        rows[5] = TokenRow::structural(Token::Position(8), 0, Some(9), None);
        assert_eq!(validate(&graph, &TokenSequence::new(rows)).errors, 1);
    }

    #[test]
    fn test_repeated_drum_hit_is_allowed() {
        let graph = TokenTypeGraph::new(false);
        let mut rows = well_formed();
        let hit = rows[11].clone();
        rows.push(hit);
        let report = validate(&graph, &TokenSequence::new(rows));
        assert_eq!(report.errors, 0);
    }

    #[test]
    fn test_encoding_behind_current_bar() {
        let graph = TokenTypeGraph::new(false);
        // Last drum row claims bar 0 while the cursor is in bar 1.
        let mut rows = well_formed();
        rows[11] = TokenRow::note(Token::DrumPitch(36), 0, 0, None, 79, DurationBin::new(0, 1, 8));
        assert_eq!(validate(&graph, &TokenSequence::new(rows)).errors, 1);

        // Program straight to Position (disallowed) with a bar encoding behind
        // the cursor: both checks fire.
        let mut rows = well_formed();
        rows.push(TokenRow::structural(Token::Program(Program::Drums), 1, Some(0), None));
        rows.push(TokenRow::structural(Token::Position(4), 0, Some(4), None));
        let report = validate(&graph, &TokenSequence::new(rows));
        assert_eq!(report.errors, 2);
        assert_eq!(report.ratio(), 2.0 / 14.0);
    }

    #[test]
    fn test_ratio_clamped() {
        let report = ValidationReport { rows: 2, errors: 5 };
        assert_eq!(report.ratio(), 1.0);
    }
}
