// Decoding: token rows -> score.
//
// The decoder replays the structural rows as a small state machine (current
// bar, current tick, current track) and turns every complete Pitch/DrumPitch
// row into a note at the current tick. The output time division only needs
// to be a multiple of the grid resolution; it does not have to match the
// time division the rows were encoded from.
//
// Rows a model may have corrupted are tolerated rather than rejected: a note
// row missing its velocity or duration (or carrying PAD/MASK there) is
// dropped, as is a Position row past the end of the bar or a note whose end
// tick overflows. Chord rows are skipped, and notes seen before any Program
// row land on the default track. Grammar violations are the validator's business.
//
// With tempo tracking on, the tempo map is read off the Position rows: a
// change is recorded whenever the value differs from the previous one, and
// the first tempo applies from tick 0.

use crate::duration::DurationBin;
use crate::error::{CodecError, CodecResult};
use crate::grid::TimeGrid;
use crate::score::{DEFAULT_TEMPO_BPM, Instrument, Note, Score, TempoChange};
use crate::token::{Program, Token, TokenRow, TokenSequence};

#[derive(Debug, Clone, Copy)]
pub struct Decoder {
    /// Samples per beat of the encoding grid.
    pub resolution: u32,
    /// Track for notes that precede every Program row.
    pub default_program: Program,
}

impl Decoder {
    pub fn new(resolution: u32) -> Self {
        Decoder {
            resolution,
            default_program: Program::Melodic(0),
        }
    }

    pub fn decode(&self, sequence: &TokenSequence, time_division: u32) -> CodecResult<Score> {
        if time_division == 0 || time_division % self.resolution != 0 {
            return Err(CodecError::InvalidTimeDivision {
                time_division,
                resolution: self.resolution,
            });
        }
        let grid = TimeGrid::new(time_division, self.resolution);

        let mut tracks: Vec<(Program, Vec<Note>)> = Vec::new();
        let mut current_track: Option<usize> = None;
        let mut current_bar: Option<u32> = None;
        let mut tick = 0;
        let mut tempo_changes: Vec<TempoChange> = Vec::new();
        let mut dropped = 0usize;

        for row in &sequence.rows {
            match &row.primary {
                Token::Bar => {
                    let bar = current_bar.map_or(0, |b| b + 1);
                    current_bar = Some(bar);
                    tick = grid.bar_start(bar);
                }
                Token::Position(position) if *position >= grid.positions_per_bar() => {
                    dropped += 1;
                    continue;
                }
                Token::Position(position) => {
                    let bar = *current_bar.get_or_insert(0);
                    tick = grid.tick_at(bar, *position);
                }
                Token::Program(program) => {
                    current_track = Some(track_index(&mut tracks, *program));
                }
                Token::Pitch(pitch) | Token::DrumPitch(pitch) => {
                    let end = note_attributes(row).and_then(|(velocity, duration)| {
                        let end = tick.checked_add(duration.checked_ticks(time_division)?)?;
                        Some((velocity, end))
                    });
                    match end {
                        Some((velocity, end)) => {
                            let index = *current_track.get_or_insert_with(|| {
                                track_index(&mut tracks, self.default_program)
                            });
                            tracks[index].1.push(Note::new(*pitch, velocity, tick, end));
                        }
                        None => dropped += 1,
                    }
                }
                _ => {}
            }

            // Position rows sit exactly on the tick whose tempo they carry;
            // Bar rows for skipped bars already carry the next event's tempo.
            if let (Token::Position(_), Some(Token::Tempo(bpm))) = (&row.primary, &row.tempo) {
                let bpm = f64::from(*bpm);
                if tempo_changes.last().is_none_or(|last| last.bpm != bpm) {
                    tempo_changes.push(TempoChange::new(tick, bpm));
                }
            }
        }

        if dropped > 0 {
            log::debug!("dropped {dropped} malformed rows");
        }
        match tempo_changes.first_mut() {
            Some(first) => first.tick = 0,
            None => tempo_changes.push(TempoChange::new(0, DEFAULT_TEMPO_BPM)),
        }

        let instruments = tracks
            .into_iter()
            .map(|(program, notes)| {
                let mut instrument = match program {
                    Program::Drums => Instrument::drums(),
                    Program::Melodic(p) => Instrument::melodic(p),
                };
                instrument.notes = notes;
                instrument
            })
            .collect();

        Ok(Score {
            ticks_per_beat: time_division,
            tempo_changes,
            instruments,
        })
    }
}

/// Index of a track's note list, created on first use.
fn track_index(tracks: &mut Vec<(Program, Vec<Note>)>, program: Program) -> usize {
    match tracks.iter().position(|(p, _)| *p == program) {
        Some(index) => index,
        None => {
            tracks.push((program, Vec::new()));
            tracks.len() - 1
        }
    }
}

fn note_attributes(row: &TokenRow) -> Option<(u8, DurationBin)> {
    match (&row.velocity, &row.duration) {
        (Some(Token::Velocity(velocity)), Some(Token::Duration(duration))) => {
            Some((*velocity, *duration))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::SpecialToken;

    fn seq(rows: &[&[&str]]) -> TokenSequence {
        let rows: Vec<Vec<&str>> = rows.iter().map(|r| r.to_vec()).collect();
        TokenSequence::from_labels(&rows, false).unwrap()
    }

    #[test]
    fn test_single_note() {
        let tokens = seq(&[
            &["Bar_None", "BarPosEnc_0", "PositionPosEnc_None"],
            &["Position_0", "BarPosEnc_0", "PositionPosEnc_0"],
            &["Program_0", "BarPosEnc_0", "PositionPosEnc_0"],
            &["Pitch_60", "BarPosEnc_0", "PositionPosEnc_0", "Velocity_79", "Duration_0.4.8"],
        ]);
        let score = Decoder::new(8).decode(&tokens, 480).unwrap();
        assert_eq!(score.ticks_per_beat, 480);
        assert_eq!(score.instruments.len(), 1);
        assert_eq!(score.instruments[0].name, "Acoustic Grand Piano");
        assert_eq!(score.instruments[0].notes, vec![Note::new(60, 79, 0, 240)]);
        assert_eq!(score.tempo_changes, vec![TempoChange::new(0, DEFAULT_TEMPO_BPM)]);
    }

    #[test]
    fn test_rejects_time_division() {
        let err = Decoder::new(8).decode(&TokenSequence::default(), 100).unwrap_err();
        assert!(matches!(
            err,
            CodecError::InvalidTimeDivision { time_division: 100, resolution: 8 }
        ));
        assert!(Decoder::new(8).decode(&TokenSequence::default(), 96).is_ok());
    }

    #[test]
    fn test_bars_and_positions() {
        let tokens = seq(&[
            &["Bar_None", "BarPosEnc_0", "PositionPosEnc_None"],
            &["Bar_None", "BarPosEnc_1", "PositionPosEnc_None"],
            &["Position_12", "BarPosEnc_1", "PositionPosEnc_12"],
            &["Program_-1", "BarPosEnc_1", "PositionPosEnc_12"],
            &["DrumPitch_36", "BarPosEnc_1", "PositionPosEnc_12", "Velocity_79", "Duration_0.1.8"],
        ]);
        // 960 ticks per beat: bar 1 starts at 3840, position 12 is 1.5 beats in.
        let score = Decoder::new(8).decode(&tokens, 960).unwrap();
        let drums = &score.instruments[0];
        assert!(drums.is_drum);
        assert_eq!(drums.name, "Drums");
        assert_eq!(drums.notes, vec![Note::new(36, 79, 5280, 5400)]);
    }

    #[test]
    fn test_position_without_bar() {
        let tokens = seq(&[
            &["Position_4", "BarPosEnc_0", "PositionPosEnc_4"],
            &["Pitch_60", "BarPosEnc_0", "PositionPosEnc_4", "Velocity_79", "Duration_1.0.8"],
            &["Bar_None", "BarPosEnc_1", "PositionPosEnc_None"],
            &["Position_0", "BarPosEnc_1", "PositionPosEnc_0"],
            &["Pitch_62", "BarPosEnc_1", "PositionPosEnc_0", "Velocity_79", "Duration_1.0.8"],
        ]);
        let score = Decoder::new(8).decode(&tokens, 480).unwrap();
        // No Program row: the default track collects both notes.
        assert_eq!(score.instruments.len(), 1);
        assert_eq!(score.instruments[0].tag(), Program::Melodic(0));
        let starts: Vec<u32> = score.instruments[0].notes.iter().map(|n| n.start).collect();
        assert_eq!(starts, vec![240, 1920]);
    }

    #[test]
    fn test_drops_incomplete_notes_and_chords() {
        let mut tokens = seq(&[
            &["Bar_None", "BarPosEnc_0", "PositionPosEnc_None"],
            &["Position_0", "BarPosEnc_0", "PositionPosEnc_0"],
            &["Program_0", "BarPosEnc_0", "PositionPosEnc_0"],
            &["Chord_maj", "BarPosEnc_0", "PositionPosEnc_0"],
            &["Pitch_60", "BarPosEnc_0", "PositionPosEnc_0", "Velocity_79", "Duration_0.4.8"],
            &["Pitch_64", "BarPosEnc_0", "PositionPosEnc_0"],
            &["Pitch_67", "BarPosEnc_0", "PositionPosEnc_0", "Velocity_79", "Duration_0.4.8"],
        ]);
        tokens.rows[6].velocity = Some(Token::Special(SpecialToken::Mask));
        let score = Decoder::new(8).decode(&tokens, 480).unwrap();
        let pitches: Vec<u8> = score.instruments[0].notes.iter().map(|n| n.pitch).collect();
        assert_eq!(pitches, vec![60]);
    }

    #[test]
    fn test_drops_out_of_range_rows() {
        let tokens = seq(&[
            &["Bar_None", "BarPosEnc_0", "PositionPosEnc_None"],
            &["Position_4", "BarPosEnc_0", "PositionPosEnc_4"],
            &["Program_0", "BarPosEnc_0", "PositionPosEnc_4"],
            &["Pitch_60", "BarPosEnc_0", "PositionPosEnc_4", "Velocity_79", "Duration_1.0.8"],
            &["Position_4000000000", "BarPosEnc_0", "PositionPosEnc_4000000000"],
            &["Pitch_62", "BarPosEnc_0", "PositionPosEnc_4", "Velocity_79", "Duration_1.0.8"],
            &["Pitch_64", "BarPosEnc_0", "PositionPosEnc_4", "Velocity_79", "Duration_9000000.0.8"],
        ]);
        let score = Decoder::new(8).decode(&tokens, 480).unwrap();
        // The bad Position row leaves the cursor at position 4; the huge
        // duration overflows the tick range.
        let notes = &score.instruments[0].notes;
        assert_eq!(notes, &vec![Note::new(60, 79, 240, 720), Note::new(62, 79, 240, 720)]);
    }

    #[test]
    fn test_tracks_in_first_seen_order() {
        let d = DurationBin::new(1, 0, 8);
        let tokens = TokenSequence::new(vec![
            TokenRow::structural(Token::Bar, 0, None, None),
            TokenRow::structural(Token::Position(0), 0, Some(0), None),
            TokenRow::structural(Token::Program(Program::Melodic(40)), 0, Some(0), None),
            TokenRow::note(Token::Pitch(67), 0, 0, None, 79, d),
            TokenRow::structural(Token::Position(8), 0, Some(8), None),
            TokenRow::structural(Token::Program(Program::Drums), 0, Some(8), None),
            TokenRow::note(Token::DrumPitch(38), 0, 8, None, 79, d),
            TokenRow::structural(Token::Program(Program::Melodic(40)), 0, Some(8), None),
            TokenRow::note(Token::Pitch(69), 0, 8, None, 79, d),
        ]);
        let score = Decoder::new(8).decode(&tokens, 480).unwrap();
        let tags: Vec<Program> = score.instruments.iter().map(Instrument::tag).collect();
        assert_eq!(tags, vec![Program::Melodic(40), Program::Drums]);
        assert_eq!(score.instruments[0].name, "Violin");
        assert_eq!(score.instruments[0].notes.len(), 2);
    }

    #[test]
    fn test_tempo_changes_rebuilt() {
        let d = DurationBin::new(1, 0, 8);
        let tokens = TokenSequence::new(vec![
            TokenRow::structural(Token::Bar, 0, None, Some(121)),
            TokenRow::structural(Token::Position(0), 0, Some(0), Some(121)),
            TokenRow::structural(Token::Program(Program::Melodic(0)), 0, Some(0), Some(121)),
            TokenRow::note(Token::Pitch(60), 0, 0, Some(121), 79, d),
            TokenRow::structural(Token::Position(8), 0, Some(8), Some(135)),
            TokenRow::structural(Token::Program(Program::Melodic(0)), 0, Some(8), Some(135)),
            TokenRow::note(Token::Pitch(62), 0, 8, Some(135), 79, d),
            TokenRow::structural(Token::Bar, 1, None, Some(135)),
        ]);
        let score = Decoder::new(8).decode(&tokens, 480).unwrap();
        assert_eq!(
            score.tempo_changes,
            vec![TempoChange::new(0, 121.0), TempoChange::new(480, 135.0)]
        );
    }

    #[test]
    fn test_tempo_after_silent_bar() {
        let d = DurationBin::new(1, 0, 8);
        let tokens = TokenSequence::new(vec![
            TokenRow::structural(Token::Bar, 0, None, Some(87)),
            TokenRow::structural(Token::Bar, 1, None, Some(87)),
            TokenRow::structural(Token::Position(0), 1, Some(0), Some(87)),
            TokenRow::structural(Token::Program(Program::Melodic(0)), 1, Some(0), Some(87)),
            TokenRow::note(Token::Pitch(60), 1, 0, Some(87), 79, d),
            TokenRow::structural(Token::Bar, 2, None, Some(148)),
            TokenRow::structural(Token::Bar, 3, None, Some(148)),
            TokenRow::structural(Token::Position(0), 3, Some(0), Some(148)),
            TokenRow::structural(Token::Program(Program::Melodic(0)), 3, Some(0), Some(148)),
            TokenRow::note(Token::Pitch(60), 3, 0, Some(148), 79, d),
        ]);
        let score = Decoder::new(8).decode(&tokens, 480).unwrap();
        assert_eq!(
            score.tempo_changes,
            vec![TempoChange::new(0, 87.0), TempoChange::new(3 * 1920, 148.0)]
        );
    }
}
