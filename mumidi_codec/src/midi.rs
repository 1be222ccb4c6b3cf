// Standard MIDI File input/output for scores.
//
// Reading: metrical-timing files only. Notes are paired per (track, channel,
// key), first on / first off, with a velocity-0 NoteOn treated as a NoteOff.
// Each note lands in the instrument keyed by (track, channel, program at
// note-on), so a track that switches program or mixes channels splits into
// several instruments. Channel 9 is percussion. Tempo meta events from any
// track form the tempo map. Notes still sounding at end of track are dropped
// with a warning.
//
// Writing: SMF format 1 with a tempo track followed by one track per
// instrument. Percussion goes on channel 9; melodic tracks take the other
// channels in order. At one tick, note-offs are written before note-ons so
// back-to-back repeats of a pitch survive a reload.
//
// Uses the `midly` crate for parsing and serialization.

use crate::error::{CodecError, CodecResult};
use crate::score::{Instrument, Note, Score, TempoChange};
use midly::{
    Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind,
    num::{u4, u7, u15, u24, u28},
};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::Path;

const DRUM_CHANNEL: u8 = 9;

/// Largest ticks-per-beat a metrical SMF header can hold.
pub const MAX_TICKS_PER_BEAT: u32 = 0x7FFF;

pub fn load_midi(path: &Path) -> CodecResult<Score> {
    let bytes = std::fs::read(path).map_err(|e| CodecError::io(path, e))?;
    parse_midi(&bytes)
}

pub fn parse_midi(bytes: &[u8]) -> CodecResult<Score> {
    let smf = Smf::parse(bytes)?;
    let ticks_per_beat = match smf.header.timing {
        Timing::Metrical(tpb) => u32::from(tpb.as_int()),
        Timing::Timecode(..) => return Err(CodecError::UnsupportedTiming),
    };
    if ticks_per_beat == 0 {
        return Err(CodecError::InvalidTicksPerBeat(0));
    }

    let mut tempo_changes: Vec<TempoChange> = Vec::new();
    let mut instruments: BTreeMap<(usize, u8, u8), Instrument> = BTreeMap::new();
    let mut dangling = 0usize;

    for (track_index, track) in smf.tracks.iter().enumerate() {
        let mut tick = 0u32;
        let mut name: Option<String> = None;
        let mut programs = [0u8; 16];
        // (channel, key) -> queue of (start, velocity, program)
        let mut sounding: HashMap<(u8, u8), VecDeque<(u32, u8, u8)>> = HashMap::new();

        for event in track {
            tick += event.delta.as_int();
            match &event.kind {
                TrackEventKind::Meta(MetaMessage::Tempo(us)) => {
                    let bpm = 60_000_000.0 / f64::from(us.as_int().max(1));
                    tempo_changes.push(TempoChange::new(tick, bpm));
                }
                TrackEventKind::Meta(MetaMessage::TrackName(raw)) => {
                    name = Some(String::from_utf8_lossy(raw).trim().to_string());
                }
                TrackEventKind::Midi { channel, message } => {
                    let channel = channel.as_int();
                    match message {
                        MidiMessage::ProgramChange { program } => {
                            programs[usize::from(channel)] = program.as_int();
                        }
                        MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                            sounding.entry((channel, key.as_int())).or_default().push_back((
                                tick,
                                vel.as_int(),
                                programs[usize::from(channel)],
                            ));
                        }
                        MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                            let pitch = key.as_int();
                            let Some((start, velocity, program)) = sounding
                                .get_mut(&(channel, pitch))
                                .and_then(VecDeque::pop_front)
                            else {
                                continue;
                            };
                            let is_drum = channel == DRUM_CHANNEL;
                            instruments
                                .entry((track_index, channel, if is_drum { 0 } else { program }))
                                .or_insert_with(|| {
                                    let mut instrument = if is_drum {
                                        Instrument::drums()
                                    } else {
                                        Instrument::melodic(program)
                                    };
                                    if let Some(name) = name.as_ref().filter(|n| !n.is_empty()) {
                                        instrument.name = name.clone();
                                    }
                                    instrument
                                })
                                .notes
                                .push(Note::new(pitch, velocity, start, tick));
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
        }
        dangling += sounding.values().map(VecDeque::len).sum::<usize>();
    }

    if dangling > 0 {
        log::warn!("dropped {dangling} notes with no matching note-off");
    }

    tempo_changes.sort_by_key(|c| c.tick);
    if tempo_changes.is_empty() {
        tempo_changes = Score::new(ticks_per_beat).tempo_changes;
    }

    let instruments: Vec<Instrument> = instruments
        .into_values()
        .filter(|i| !i.notes.is_empty())
        .map(|mut i| {
            i.notes.sort_by_key(|n| (n.start, n.pitch));
            i
        })
        .collect();
    log::debug!(
        "read {} instruments at {} ticks per beat",
        instruments.len(),
        ticks_per_beat
    );

    Ok(Score {
        ticks_per_beat,
        tempo_changes,
        instruments,
    })
}

/// Absolute-tick events to delta-timed track events, closed with
/// `EndOfTrack`. Events must already be in tick order.
fn delta_encode<'a>(events: Vec<(u32, TrackEventKind<'a>)>) -> Track<'a> {
    let mut track: Track<'a> = Vec::with_capacity(events.len() + 1);
    let mut last = 0;
    for (tick, kind) in events {
        track.push(TrackEvent {
            delta: u28::new(tick - last),
            kind,
        });
        last = tick;
    }
    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
    track
}

/// Convert a score to an in-memory SMF. Fails when the score's
/// ticks-per-beat does not fit a metrical header.
pub fn score_to_smf(score: &Score) -> CodecResult<Smf<'_>> {
    let ticks_per_beat = u16::try_from(score.ticks_per_beat)
        .ok()
        .filter(|&tpb| tpb > 0 && u32::from(tpb) <= MAX_TICKS_PER_BEAT)
        .ok_or(CodecError::InvalidTicksPerBeat(score.ticks_per_beat))?;
    let mut smf = Smf::new(Header::new(
        Format::Parallel,
        Timing::Metrical(u15::new(ticks_per_beat)),
    ));

    let mut tempo_events: Vec<(u32, TrackEventKind<'_>)> = score
        .tempo_changes
        .iter()
        .map(|change| {
            let us = change.micros_per_beat().clamp(1, 0xFF_FFFF);
            (change.tick, TrackEventKind::Meta(MetaMessage::Tempo(u24::new(us))))
        })
        .collect();
    tempo_events.sort_by_key(|&(tick, _)| tick);
    smf.tracks.push(delta_encode(tempo_events));

    let mut melodic_channels = (0u8..16).filter(|&c| c != DRUM_CHANNEL).cycle();
    for instrument in &score.instruments {
        let channel = if instrument.is_drum {
            DRUM_CHANNEL
        } else {
            melodic_channels.next().unwrap_or(0)
        };
        let channel = u4::new(channel);

        let mut events: Vec<(u32, TrackEventKind<'_>)> = vec![(
            0,
            TrackEventKind::Meta(MetaMessage::TrackName(instrument.name.as_bytes())),
        )];
        if !instrument.is_drum {
            events.push((
                0,
                TrackEventKind::Midi {
                    channel,
                    message: MidiMessage::ProgramChange {
                        program: u7::new(instrument.program.min(127)),
                    },
                },
            ));
        }

        // (tick, off-before-on, event)
        let mut notes: Vec<(u32, u8, TrackEventKind<'_>)> = Vec::new();
        for note in &instrument.notes {
            let key = u7::new(note.pitch.min(127));
            notes.push((
                note.start,
                1,
                TrackEventKind::Midi {
                    channel,
                    message: MidiMessage::NoteOn {
                        key,
                        vel: u7::new(note.velocity.clamp(1, 127)),
                    },
                },
            ));
            notes.push((
                note.end,
                0,
                TrackEventKind::Midi {
                    channel,
                    message: MidiMessage::NoteOff {
                        key,
                        vel: u7::new(0),
                    },
                },
            ));
        }
        notes.sort_by_key(|&(tick, order, _)| (tick, order));
        events.extend(notes.into_iter().map(|(tick, _, kind)| (tick, kind)));

        smf.tracks.push(delta_encode(events));
    }

    Ok(smf)
}

pub fn write_midi(score: &Score, path: &Path) -> CodecResult<()> {
    let smf = score_to_smf(score)?;
    let mut buf = Vec::new();
    smf.write_std(&mut buf).map_err(|e| CodecError::io(path, e))?;
    std::fs::write(path, &buf).map_err(|e| CodecError::io(path, e))
}
