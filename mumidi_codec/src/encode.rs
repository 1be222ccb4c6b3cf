// Encoding: score -> token rows.
//
// Two stages:
//
// 1. `TrackEncoder` turns one instrument into unordered `Event`s: a Pitch or
//    DrumPitch event per note (carrying its velocity and quantized duration)
//    and, when chords are on, a Chord event per detected chord. Chord events
//    go in front of the track's note events so that the stable sort below
//    keeps a chord ahead of same-tick notes of the same track.
//
// 2. `SequenceAssembler` merges every track's events into one sequence,
//    stably sorted by (tick, track tag), and inserts the structural rows:
//    on a new tick, one Bar row per bar crossed (so silent bars still show
//    up) followed by one Position row; on a new track within a tick, a
//    Program row. Every row carries the current bar and position in its
//    positional-encoding fields and, when enabled, the tempo in force.
//
// Tempo lookup is a forward merge: the index into the tempo list only moves
// forward as events are consumed, never searched.
//
// The assembler grows the vocabulary's bar field to cover the last bar it
// emits. The bound check happens before any row is produced, so an encode
// that would exceed the limit fails without touching the vocabulary.

use crate::chord::ChordDetector;
use crate::duration::{DurationBin, DurationQuantizer, DurationTable};
use crate::error::CodecResult;
use crate::grid::TimeGrid;
use crate::config::TokenizerConfig;
use crate::score::{DEFAULT_TEMPO_BPM, Instrument, Score, TempoChange};
use crate::token::{Program, Token, TokenRow, TokenSequence};
use crate::vocab::Vocabulary;

/// Velocity and duration carried by note events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteAttributes {
    pub velocity: u8,
    pub duration: DurationBin,
}

/// One track-level event before global ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Pitch, DrumPitch or Chord.
    pub primary: Token,
    pub tick: u32,
    pub program: Program,
    /// `None` for chords.
    pub note: Option<NoteAttributes>,
}

/// Per-track event extraction.
pub struct TrackEncoder<'a> {
    pub programs: &'a [Program],
    pub durations: DurationQuantizer<'a>,
    pub chords: Option<&'a dyn ChordDetector>,
    pub ticks_per_beat: u32,
}

impl TrackEncoder<'_> {
    /// Events for one track; empty when the track's tag is not allowed.
    pub fn encode_track(&self, track: &Instrument) -> Vec<Event> {
        let program = track.tag();
        if !self.programs.contains(&program) {
            log::debug!("skipping track {:?} ({}): program not allowed", program, track.name);
            return Vec::new();
        }

        let mut events = Vec::with_capacity(track.notes.len());
        if let Some(detector) = self.chords.filter(|_| !track.is_drum) {
            events.extend(
                detector
                    .detect(&track.notes, self.ticks_per_beat)
                    .into_iter()
                    .map(|chord| Event {
                        primary: Token::Chord(chord.label),
                        tick: chord.tick,
                        program,
                        note: None,
                    }),
            );
        }

        events.extend(track.notes.iter().map(|note| {
            let primary = if track.is_drum {
                Token::DrumPitch(note.pitch)
            } else {
                Token::Pitch(note.pitch)
            };
            Event {
                primary,
                tick: note.start,
                program,
                note: Some(NoteAttributes {
                    velocity: note.velocity,
                    duration: self.durations.quantize(note.duration()),
                }),
            }
        }));
        events
    }
}

/// Global ordering plus structural row insertion.
pub struct SequenceAssembler<'a> {
    pub grid: TimeGrid,
    pub tempo_changes: &'a [TempoChange],
    pub use_tempos: bool,
    pub bar_limit: u32,
}

impl SequenceAssembler<'_> {
    pub fn assemble(
        &self,
        mut events: Vec<Event>,
        vocab: &mut Vocabulary,
    ) -> CodecResult<TokenSequence> {
        events.sort_by_key(|e| (e.tick, e.program));

        if let Some(last) = events.last() {
            vocab.ensure_bar_capacity(self.grid.bar(last.tick), self.bar_limit)?;
        }

        let tempo_of = |change: &TempoChange| change.bpm.round() as u32;
        let mut tempo_index = 0;
        let mut tempo = self
            .tempo_changes
            .first()
            .map_or(DEFAULT_TEMPO_BPM as u32, tempo_of);

        let mut rows = Vec::with_capacity(events.len() * 2);
        let mut current_tick: Option<u32> = None;
        let mut current_bar: Option<u32> = None;
        let mut bar = 0;
        let mut position = 0;
        let mut current_track: Option<Program> = None;

        for event in events {
            if self.use_tempos {
                while let Some(next) = self.tempo_changes.get(tempo_index + 1) {
                    if next.tick > event.tick {
                        break;
                    }
                    tempo_index += 1;
                    tempo = tempo_of(next);
                }
            }
            let row_tempo = self.use_tempos.then_some(tempo);

            if current_tick != Some(event.tick) {
                let (event_bar, event_position) = self.grid.locate(event.tick);
                current_tick = Some(event.tick);
                current_track = None;
                position = event_position;

                let first_new_bar = current_bar.map_or(0, |b| b + 1);
                for b in first_new_bar..=event_bar {
                    rows.push(TokenRow::structural(Token::Bar, b, None, row_tempo));
                }
                if first_new_bar <= event_bar {
                    current_bar = Some(event_bar);
                    bar = event_bar;
                }

                rows.push(TokenRow::structural(
                    Token::Position(position),
                    bar,
                    Some(position),
                    row_tempo,
                ));
            }

            if current_track != Some(event.program) {
                current_track = Some(event.program);
                rows.push(TokenRow::structural(
                    Token::Program(event.program),
                    bar,
                    Some(position),
                    row_tempo,
                ));
            }

            rows.push(match event.note {
                Some(attrs) => TokenRow::note(
                    event.primary,
                    bar,
                    position,
                    row_tempo,
                    attrs.velocity,
                    attrs.duration,
                ),
                None => TokenRow::structural(event.primary, bar, Some(position), row_tempo),
            });
        }

        Ok(TokenSequence::new(rows))
    }
}

/// Encode an already preprocessed score.
pub fn encode_score(
    score: &Score,
    config: &TokenizerConfig,
    durations: &mut DurationTable,
    chords: Option<&dyn ChordDetector>,
    vocab: &mut Vocabulary,
) -> CodecResult<TokenSequence> {
    let track_encoder = TrackEncoder {
        programs: &config.programs,
        durations: durations.quantizer(score.ticks_per_beat),
        chords: chords.filter(|_| config.use_chords),
        ticks_per_beat: score.ticks_per_beat,
    };
    let events: Vec<Event> = score
        .instruments
        .iter()
        .flat_map(|track| track_encoder.encode_track(track))
        .collect();
    log::debug!(
        "encoding {} events from {} tracks",
        events.len(),
        score.instruments.len()
    );

    let assembler = SequenceAssembler {
        grid: TimeGrid::new(score.ticks_per_beat, config.max_resolution()),
        tempo_changes: &score.tempo_changes,
        use_tempos: config.use_tempos,
        bar_limit: config.max_bar_embedding_limit,
    };
    assembler.assemble(events, vocab)
}
