// Token vocabulary types: the symbols a row is built from.
//
// A `Token` is one typed symbol. Its textual form is the label grammar
// `<Type>_<Value>` (e.g. `Pitch_60`, `Program_-1`, `Duration_0.4.8`,
// `PositionPosEnc_None`) and round-trips exactly through `Display`/`FromStr`.
// The vocabulary (vocab.rs) maps labels to integer ids per field.
//
// A `TokenRow` is one pooled time step. Fields are named rather than
// positional, so the optional tempo field never shifts the meaning of the
// velocity/duration pair. The flattened order used for labels and ids is
// fixed: [primary, bar_enc, position_enc, tempo?, velocity, duration].
//
// `TokenType` is the closed set of token kinds the type-transition graph in
// validate.rs is keyed on.

use crate::duration::DurationBin;
use crate::error::{CodecError, CodecResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Track tag: a General MIDI program, or the single percussion tag.
///
/// All percussion tracks collapse onto `Drums` regardless of their program
/// number. `Drums` orders before every melodic program (its label value is
/// `-1`), which fixes the within-tick track order of the encoder's sort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i16", into = "i16")]
pub enum Program {
    Drums,
    Melodic(u8),
}

impl Program {
    pub fn is_drums(self) -> bool {
        matches!(self, Program::Drums)
    }

    /// Every tag a tokenizer can know about: drums, then programs 0..=127.
    pub fn all() -> Vec<Program> {
        std::iter::once(Program::Drums)
            .chain((0..=127).map(Program::Melodic))
            .collect()
    }
}

impl TryFrom<i16> for Program {
    type Error = String;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(Program::Drums),
            0..=127 => Ok(Program::Melodic(value as u8)),
            _ => Err(format!("program {value} out of range (-1..=127)")),
        }
    }
}

impl From<Program> for i16 {
    fn from(program: Program) -> i16 {
        match program {
            Program::Drums => -1,
            Program::Melodic(p) => p as i16,
        }
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", i16::from(*self))
    }
}

/// Tokens every vocabulary field starts with. `Pad` is always id 0 when
/// configured first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SpecialToken {
    Pad,
    Bos,
    Eos,
    Mask,
}

impl SpecialToken {
    pub const ALL: [SpecialToken; 4] = [
        SpecialToken::Pad,
        SpecialToken::Bos,
        SpecialToken::Eos,
        SpecialToken::Mask,
    ];

    fn name(self) -> &'static str {
        match self {
            SpecialToken::Pad => "PAD",
            SpecialToken::Bos => "BOS",
            SpecialToken::Eos => "EOS",
            SpecialToken::Mask => "MASK",
        }
    }
}

/// The kind of a token, independent of its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TokenType {
    Special(SpecialToken),
    Pitch,
    DrumPitch,
    Bar,
    Position,
    Program,
    Chord,
    BarPosEnc,
    PositionPosEnc,
    Tempo,
    Velocity,
    Duration,
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TokenType::Special(s) => s.name(),
            TokenType::Pitch => "Pitch",
            TokenType::DrumPitch => "DrumPitch",
            TokenType::Bar => "Bar",
            TokenType::Position => "Position",
            TokenType::Program => "Program",
            TokenType::Chord => "Chord",
            TokenType::BarPosEnc => "BarPosEnc",
            TokenType::PositionPosEnc => "PositionPosEnc",
            TokenType::Tempo => "Tempo",
            TokenType::Velocity => "Velocity",
            TokenType::Duration => "Duration",
        };
        f.write_str(name)
    }
}

/// One typed symbol.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Token {
    Special(SpecialToken),
    Pitch(u8),
    DrumPitch(u8),
    Bar,
    Position(u32),
    Program(Program),
    Chord(String),
    BarPosEnc(u32),
    /// `None` is the placeholder carried by Bar rows.
    PositionPosEnc(Option<u32>),
    Tempo(u32),
    Velocity(u8),
    Duration(DurationBin),
}

impl Token {
    pub fn token_type(&self) -> TokenType {
        match self {
            Token::Special(s) => TokenType::Special(*s),
            Token::Pitch(_) => TokenType::Pitch,
            Token::DrumPitch(_) => TokenType::DrumPitch,
            Token::Bar => TokenType::Bar,
            Token::Position(_) => TokenType::Position,
            Token::Program(_) => TokenType::Program,
            Token::Chord(_) => TokenType::Chord,
            Token::BarPosEnc(_) => TokenType::BarPosEnc,
            Token::PositionPosEnc(_) => TokenType::PositionPosEnc,
            Token::Tempo(_) => TokenType::Tempo,
            Token::Velocity(_) => TokenType::Velocity,
            Token::Duration(_) => TokenType::Duration,
        }
    }

    /// True for the padding and mask placeholders a model may emit.
    pub fn is_pad_or_mask(&self) -> bool {
        matches!(
            self,
            Token::Special(SpecialToken::Pad) | Token::Special(SpecialToken::Mask)
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ty = self.token_type();
        match self {
            Token::Special(_) | Token::Bar | Token::PositionPosEnc(None) => {
                write!(f, "{ty}_None")
            }
            Token::Pitch(v) | Token::DrumPitch(v) | Token::Velocity(v) => write!(f, "{ty}_{v}"),
            Token::Position(v) | Token::BarPosEnc(v) | Token::Tempo(v) => write!(f, "{ty}_{v}"),
            Token::PositionPosEnc(Some(v)) => write!(f, "{ty}_{v}"),
            Token::Program(p) => write!(f, "{ty}_{p}"),
            Token::Chord(c) => write!(f, "{ty}_{c}"),
            Token::Duration(d) => write!(f, "{ty}_{d}"),
        }
    }
}

impl FromStr for Token {
    type Err = CodecError;

    fn from_str(label: &str) -> CodecResult<Self> {
        let bad = || CodecError::InvalidLabel(label.to_string());
        let (ty, value) = label.split_once('_').ok_or_else(bad)?;
        let token = match ty {
            "PAD" | "BOS" | "EOS" | "MASK" => {
                let special = SpecialToken::ALL
                    .into_iter()
                    .find(|s| s.name() == ty)
                    .ok_or_else(bad)?;
                Token::Special(special)
            }
            "Pitch" => Token::Pitch(value.parse().map_err(|_| bad())?),
            "DrumPitch" => Token::DrumPitch(value.parse().map_err(|_| bad())?),
            "Bar" => Token::Bar,
            "Position" => Token::Position(value.parse().map_err(|_| bad())?),
            "Program" => {
                let raw: i16 = value.parse().map_err(|_| bad())?;
                Token::Program(Program::try_from(raw).map_err(|_| bad())?)
            }
            "Chord" if !value.is_empty() => Token::Chord(value.to_string()),
            "BarPosEnc" => Token::BarPosEnc(value.parse().map_err(|_| bad())?),
            "PositionPosEnc" if value == "None" => Token::PositionPosEnc(None),
            "PositionPosEnc" => Token::PositionPosEnc(Some(value.parse().map_err(|_| bad())?)),
            "Tempo" => Token::Tempo(value.parse().map_err(|_| bad())?),
            "Velocity" => Token::Velocity(value.parse().map_err(|_| bad())?),
            "Duration" => Token::Duration(value.parse().map_err(|_| bad())?),
            _ => return Err(bad()),
        };
        Ok(token)
    }
}

/// One pooled time step.
///
/// Bar, Position, Program and Chord rows carry no velocity/duration. Note
/// rows carry both. `tempo` is present iff the tokenizer tracks tempo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRow {
    pub primary: Token,
    pub bar_enc: Token,
    pub position_enc: Token,
    pub tempo: Option<Token>,
    pub velocity: Option<Token>,
    pub duration: Option<Token>,
}

impl TokenRow {
    /// A row without velocity/duration (Bar, Position, Program, Chord).
    pub fn structural(primary: Token, bar: u32, position: Option<u32>, tempo: Option<u32>) -> Self {
        TokenRow {
            primary,
            bar_enc: Token::BarPosEnc(bar),
            position_enc: Token::PositionPosEnc(position),
            tempo: tempo.map(Token::Tempo),
            velocity: None,
            duration: None,
        }
    }

    /// A Pitch or DrumPitch row.
    pub fn note(
        primary: Token,
        bar: u32,
        position: u32,
        tempo: Option<u32>,
        velocity: u8,
        duration: DurationBin,
    ) -> Self {
        TokenRow {
            velocity: Some(Token::Velocity(velocity)),
            duration: Some(Token::Duration(duration)),
            ..TokenRow::structural(primary, bar, Some(position), tempo)
        }
    }

    pub fn token_type(&self) -> TokenType {
        self.primary.token_type()
    }

    /// Present fields in their fixed flattened order.
    pub fn fields(&self) -> Vec<&Token> {
        let mut fields = vec![&self.primary, &self.bar_enc, &self.position_enc];
        fields.extend(self.tempo.iter());
        fields.extend(self.velocity.iter());
        fields.extend(self.duration.iter());
        fields
    }

    pub fn to_labels(&self) -> Vec<String> {
        self.fields().into_iter().map(Token::to_string).collect()
    }

    /// Rebuild a row from its flattened tokens. The width alone decides the
    /// shape: `3 + tempo` for rows without velocity/duration, two more for
    /// note rows.
    pub fn from_tokens(tokens: Vec<Token>, has_tempo: bool) -> CodecResult<Self> {
        let structural = 3 + usize::from(has_tempo);
        let full = structural + 2;
        let width = tokens.len();
        if width != structural && width != full {
            return Err(CodecError::RowWidth {
                width,
                structural,
                full,
            });
        }
        let mut it = tokens.into_iter();
        // Width was checked above, so these pulls cannot run dry.
        let mut next = || it.next().unwrap_or(Token::Special(SpecialToken::Pad));
        let primary = next();
        let bar_enc = next();
        let position_enc = next();
        let tempo = has_tempo.then(&mut next);
        let (velocity, duration) = if width == full {
            (Some(next()), Some(next()))
        } else {
            (None, None)
        };
        Ok(TokenRow {
            primary,
            bar_enc,
            position_enc,
            tempo,
            velocity,
            duration,
        })
    }

    pub fn from_labels<S: AsRef<str>>(labels: &[S], has_tempo: bool) -> CodecResult<Self> {
        let tokens = labels
            .iter()
            .map(|l| l.as_ref().parse())
            .collect::<CodecResult<Vec<Token>>>()?;
        TokenRow::from_tokens(tokens, has_tempo)
    }
}

/// The encoder's output for one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenSequence {
    pub rows: Vec<TokenRow>,
}

impl TokenSequence {
    pub fn new(rows: Vec<TokenRow>) -> Self {
        TokenSequence { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn to_labels(&self) -> Vec<Vec<String>> {
        self.rows.iter().map(TokenRow::to_labels).collect()
    }

    pub fn from_labels<S: AsRef<str>>(rows: &[Vec<S>], has_tempo: bool) -> CodecResult<Self> {
        let rows = rows
            .iter()
            .map(|r| TokenRow::from_labels(r, has_tempo))
            .collect::<CodecResult<Vec<_>>>()?;
        Ok(TokenSequence { rows })
    }
}
