// The symbolic-music document the codec reads and writes.
//
// A `Score` is a tick timeline: a ticks-per-beat time division, an ordered
// list of tempo changes, and instrument tracks holding notes. It is the
// boundary type of the codec: midi.rs converts it to and from Standard MIDI
// Files, the tokenizer encodes it into token rows, and the decoder rebuilds
// a fresh one from rows.
//
// The track tag of a note (program or percussion) lives on its `Instrument`.

use crate::token::Program;
use serde::{Deserialize, Serialize};

/// Tempo assumed when a document carries none.
pub const DEFAULT_TEMPO_BPM: f64 = 120.0;

/// A single note on the tick timeline. `end` is exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Note {
    pub pitch: u8,
    pub velocity: u8,
    pub start: u32,
    pub end: u32,
}

impl Note {
    pub fn new(pitch: u8, velocity: u8, start: u32, end: u32) -> Self {
        Note {
            pitch,
            velocity,
            start,
            end,
        }
    }

    pub fn duration(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }
}

/// A tempo change, in quarter-note beats per minute.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TempoChange {
    pub tick: u32,
    pub bpm: f64,
}

impl TempoChange {
    pub fn new(tick: u32, bpm: f64) -> Self {
        TempoChange { tick, bpm }
    }

    /// Microseconds per quarter note, as stored in MIDI tempo meta events.
    pub fn micros_per_beat(&self) -> u32 {
        (60_000_000.0 / self.bpm).round() as u32
    }
}

/// One instrument track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    /// General MIDI program (0-127). Ignored for tagging when `is_drum`.
    pub program: u8,
    pub is_drum: bool,
    pub name: String,
    pub notes: Vec<Note>,
}

impl Instrument {
    pub fn new(program: u8, is_drum: bool, name: impl Into<String>) -> Self {
        Instrument {
            program,
            is_drum,
            name: name.into(),
            notes: Vec::new(),
        }
    }

    /// A melodic instrument named after its General MIDI program.
    pub fn melodic(program: u8) -> Self {
        Instrument::new(program, false, program_name(program))
    }

    /// The percussion track.
    pub fn drums() -> Self {
        Instrument::new(0, true, "Drums")
    }

    /// The tag the encoder groups this track under.
    pub fn tag(&self) -> Program {
        if self.is_drum {
            Program::Drums
        } else {
            Program::Melodic(self.program)
        }
    }
}

/// A complete multi-track document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub ticks_per_beat: u32,
    pub tempo_changes: Vec<TempoChange>,
    pub instruments: Vec<Instrument>,
}

impl Score {
    /// An empty score at the given time division with the default tempo.
    pub fn new(ticks_per_beat: u32) -> Self {
        Score {
            ticks_per_beat,
            tempo_changes: vec![TempoChange::new(0, DEFAULT_TEMPO_BPM)],
            instruments: Vec::new(),
        }
    }

    /// Last note-off tick across all tracks.
    pub fn max_tick(&self) -> u32 {
        self.instruments
            .iter()
            .flat_map(|i| i.notes.iter())
            .map(|n| n.end)
            .max()
            .unwrap_or(0)
    }

    pub fn note_count(&self) -> usize {
        self.instruments.iter().map(|i| i.notes.len()).sum()
    }

    /// The track with a given tag, if present.
    pub fn instrument(&self, tag: Program) -> Option<&Instrument> {
        self.instruments.iter().find(|i| i.tag() == tag)
    }
}

/// General MIDI level 1 program names.
pub fn program_name(program: u8) -> &'static str {
    const NAMES: [&str; 128] = [
        "Acoustic Grand Piano", "Bright Acoustic Piano", "Electric Grand Piano",
        "Honky-tonk Piano", "Electric Piano 1", "Electric Piano 2", "Harpsichord", "Clavi",
        "Celesta", "Glockenspiel", "Music Box", "Vibraphone", "Marimba", "Xylophone",
        "Tubular Bells", "Dulcimer", "Drawbar Organ", "Percussive Organ", "Rock Organ",
        "Church Organ", "Reed Organ", "Accordion", "Harmonica", "Tango Accordion",
        "Acoustic Guitar (nylon)", "Acoustic Guitar (steel)", "Electric Guitar (jazz)",
        "Electric Guitar (clean)", "Electric Guitar (muted)", "Overdriven Guitar",
        "Distortion Guitar", "Guitar Harmonics", "Acoustic Bass", "Electric Bass (finger)",
        "Electric Bass (pick)", "Fretless Bass", "Slap Bass 1", "Slap Bass 2", "Synth Bass 1",
        "Synth Bass 2", "Violin", "Viola", "Cello", "Contrabass", "Tremolo Strings",
        "Pizzicato Strings", "Orchestral Harp", "Timpani", "String Ensemble 1",
        "String Ensemble 2", "SynthStrings 1", "SynthStrings 2", "Choir Aahs", "Voice Oohs",
        "Synth Voice", "Orchestra Hit", "Trumpet", "Trombone", "Tuba", "Muted Trumpet",
        "French Horn", "Brass Section", "SynthBrass 1", "SynthBrass 2", "Soprano Sax",
        "Alto Sax", "Tenor Sax", "Baritone Sax", "Oboe", "English Horn", "Bassoon",
        "Clarinet", "Piccolo", "Flute", "Recorder", "Pan Flute", "Blown Bottle", "Shakuhachi",
        "Whistle", "Ocarina", "Lead 1 (square)", "Lead 2 (sawtooth)", "Lead 3 (calliope)",
        "Lead 4 (chiff)", "Lead 5 (charang)", "Lead 6 (voice)", "Lead 7 (fifths)",
        "Lead 8 (bass + lead)", "Pad 1 (new age)", "Pad 2 (warm)", "Pad 3 (polysynth)",
        "Pad 4 (choir)", "Pad 5 (bowed)", "Pad 6 (metallic)", "Pad 7 (halo)", "Pad 8 (sweep)",
        "FX 1 (rain)", "FX 2 (soundtrack)", "FX 3 (crystal)", "FX 4 (atmosphere)",
        "FX 5 (brightness)", "FX 6 (goblins)", "FX 7 (echoes)", "FX 8 (sci-fi)", "Sitar",
        "Banjo", "Shamisen", "Koto", "Kalimba", "Bag pipe", "Fiddle", "Shanai", "Tinkle Bell",
        "Agogo", "Steel Drums", "Woodblock", "Taiko Drum", "Melodic Tom", "Synth Drum",
        "Reverse Cymbal", "Guitar Fret Noise", "Breath Noise", "Seashore", "Bird Tweet",
        "Telephone Ring", "Helicopter", "Applause", "Gunshot",
    ];
    NAMES.get(program as usize).copied().unwrap_or("Unknown")
}
