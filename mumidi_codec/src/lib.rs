// MuMIDI codec
//
// Turns multi-track MIDI scores into sequences of pooled multi-field token
// rows for sequence models, and back. Each row is one time step: a primary
// token (Pitch / DrumPitch / Bar / Position / Program / Chord) plus
// bar and position encodings, an optional tempo, and for notes a velocity
// and a quantized duration. Each field has its own id table so a model can
// embed the fields separately and sum them.
//
// Architecture:
// - error.rs: CodecError / CodecResult
// - token.rs: Token, TokenType, TokenRow, TokenSequence, label grammar
// - duration.rs: Duration bins from the beat-resolution table, cached
//   nearest-bin quantization per ticks-per-beat
// - grid.rs: Tick <-> (bar, position) arithmetic on a 4-beat bar
// - score.rs: Score / Instrument / Note / TempoChange document model
// - config.rs: TokenizerConfig, JSON params
// - vocab.rs: Per-field label <-> id tables, growable bar field
// - chord.rs: ChordDetector trait and the onset-window detector
// - preprocess.rs: Track merging, grid snapping, velocity/tempo binning
// - encode.rs: TrackEncoder (per-track events) + SequenceAssembler (rows)
// - decode.rs: Rows back to a Score at any compatible time division
// - validate.rs: Type-transition graph and grammar error ratio
// - midi.rs: Standard MIDI File read/write via midly
// - tokenizer.rs: MuMidiTokenizer, the facade tying it all together
//
// Encoding is deterministic: the same score and configuration always give
// the same rows.

pub mod chord;
pub mod config;
pub mod decode;
pub mod duration;
pub mod encode;
pub mod error;
pub mod grid;
pub mod midi;
pub mod preprocess;
pub mod score;
pub mod token;
pub mod tokenizer;
pub mod validate;
pub mod vocab;

pub use config::TokenizerConfig;
pub use error::{CodecError, CodecResult};
pub use score::{Instrument, Note, Score, TempoChange};
pub use token::{Program, Token, TokenRow, TokenSequence};
pub use tokenizer::MuMidiTokenizer;
