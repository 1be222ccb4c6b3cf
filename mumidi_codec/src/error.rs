// Error types for the codec.
//
// Only genuine failures surface here: bad configuration, a decode precondition
// violation, vocabulary lookups that miss, and I/O around params, token files
// and MIDI files. Lossy-but-intentional policies (filtered tracks, dropped
// rows, out-of-range durations) are not errors and never reach this enum.
// The validator never returns an error at all.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("invalid time division {time_division}: must be divisible by {resolution}")]
    InvalidTimeDivision { time_division: u32, resolution: u32 },
    #[error("invalid ticks per beat {0}: must be between 1 and 32767")]
    InvalidTicksPerBeat(u32),
    #[error("bar index {bar} exceeds the bar embedding limit of {limit}")]
    BarCapacityExceeded { bar: u32, limit: u32 },
    #[error("invalid tokenizer config: {0}")]
    InvalidConfig(String),
    #[error("token `{label}` is not in vocabulary field {field}")]
    UnknownToken { label: String, field: usize },
    #[error("token id {id} is out of range for vocabulary field {field}")]
    UnknownId { id: u32, field: usize },
    #[error("malformed token label `{0}`")]
    InvalidLabel(String),
    #[error("row of width {width} does not match any row shape (expected {structural} or {full})")]
    RowWidth {
        width: usize,
        structural: usize,
        full: usize,
    },
    #[error("SMPTE timecode MIDI files are not supported")]
    UnsupportedTiming,
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("MIDI error: {0}")]
    Midi(#[from] midly::Error),
}

pub type CodecResult<T> = Result<T, CodecError>;

impl CodecError {
    /// Wrap an `std::io::Error` with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CodecError::Io {
            path: path.into(),
            source,
        }
    }
}
