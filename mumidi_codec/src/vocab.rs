// Multi-field vocabulary.
//
// Each pooled row is embedded field by field, so the vocabulary is an ordered
// list of independent label <-> id tables:
//
//   0: Pitch / DrumPitch / Bar / Position / Program / (Chord)
//   1: BarPosEnc (bar positional encoding)
//   2: PositionPosEnc (position positional encoding, plus `None` for Bar rows)
//   3: Tempo (only when tempo tracking is on)
//  -2: Velocity
//  -1: Duration
//
// Every field starts with the configured special tokens, so `PAD_None` is id
// 0 everywhere and can be used as the padding index.
//
// The bar field is the only part that changes after construction. Encoding a
// document whose notes reach bar `b` grows it to at least `b + 1` labels.
// Labels are appended, never removed, so ids handed out earlier stay valid
// and the capacity only increases over the vocabulary's lifetime.

use crate::config::TokenizerConfig;
use crate::duration::DurationBin;
use crate::error::{CodecError, CodecResult};
use crate::token::{Program, Token, TokenRow};
use std::collections::HashMap;

pub const PRIMARY_FIELD: usize = 0;
pub const BAR_FIELD: usize = 1;
pub const POSITION_FIELD: usize = 2;

/// One label <-> id table.
#[derive(Debug, Clone, Default)]
pub struct Field {
    labels: Vec<String>,
    ids: HashMap<String, u32>,
}

impl Field {
    /// Add a label, returning its id. Re-adding an existing label is a no-op.
    pub fn push(&mut self, label: String) -> u32 {
        if let Some(&id) = self.ids.get(&label) {
            return id;
        }
        let id = self.labels.len() as u32;
        self.ids.insert(label.clone(), id);
        self.labels.push(label);
        id
    }

    fn push_token(&mut self, token: Token) -> u32 {
        self.push(token.to_string())
    }

    pub fn id(&self, label: &str) -> Option<u32> {
        self.ids.get(label).copied()
    }

    pub fn label(&self, id: u32) -> Option<&str> {
        self.labels.get(id as usize).map(String::as_str)
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Vocabulary {
    fields: Vec<Field>,
    has_tempo: bool,
    bar_capacity: u32,
}

impl Vocabulary {
    /// Build every field from the configuration, the duration bins and the
    /// chord labels (empty when chords are off).
    pub fn build(config: &TokenizerConfig, durations: &[DurationBin], chords: &[String]) -> Self {
        let field_count = 5 + usize::from(config.use_tempos);
        let mut fields = vec![Field::default(); field_count];
        for field in &mut fields {
            for &special in &config.special_tokens {
                field.push_token(Token::Special(special));
            }
        }

        let positions = config.max_resolution() * crate::grid::BEATS_PER_BAR;

        let primary = &mut fields[PRIMARY_FIELD];
        for pitch in config.pitch_range.0..config.pitch_range.1 {
            primary.push_token(Token::Pitch(pitch));
        }
        for pitch in config.drum_pitch_range.0..config.drum_pitch_range.1 {
            primary.push_token(Token::DrumPitch(pitch));
        }
        primary.push_token(Token::Bar);
        for pos in 0..positions {
            primary.push_token(Token::Position(pos));
        }
        for &program in &config.programs {
            primary.push_token(Token::Program(program));
        }
        if config.use_chords {
            for chord in chords {
                primary.push_token(Token::Chord(chord.clone()));
            }
        }

        for bar in 0..config.max_bar_embedding {
            fields[BAR_FIELD].push_token(Token::BarPosEnc(bar));
        }

        fields[POSITION_FIELD].push_token(Token::PositionPosEnc(None));
        for pos in 0..positions {
            fields[POSITION_FIELD].push_token(Token::PositionPosEnc(Some(pos)));
        }

        if config.use_tempos {
            for tempo in config.tempos() {
                fields[3].push_token(Token::Tempo(tempo));
            }
        }

        for velocity in config.velocities() {
            fields[field_count - 2].push_token(Token::Velocity(velocity));
        }
        for &bin in durations {
            fields[field_count - 1].push_token(Token::Duration(bin));
        }

        Vocabulary {
            fields,
            has_tempo: config.use_tempos,
            bar_capacity: config.max_bar_embedding,
        }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, index: usize) -> &Field {
        &self.fields[index]
    }

    /// Size of every field, in field order (embedding table sizes).
    pub fn sizes(&self) -> Vec<usize> {
        self.fields.iter().map(Field::len).collect()
    }

    pub fn has_tempo(&self) -> bool {
        self.has_tempo
    }

    pub fn tempo_field(&self) -> Option<usize> {
        self.has_tempo.then_some(3)
    }

    pub fn velocity_field(&self) -> usize {
        self.fields.len() - 2
    }

    pub fn duration_field(&self) -> usize {
        self.fields.len() - 1
    }

    /// Number of `BarPosEnc` labels.
    pub fn bar_capacity(&self) -> u32 {
        self.bar_capacity
    }

    /// Grow the bar field so `bar` has a label. Returns whether it grew.
    ///
    /// Fails without touching the field when `bar` would push the capacity
    /// past `limit`.
    pub fn ensure_bar_capacity(&mut self, bar: u32, limit: u32) -> CodecResult<bool> {
        if bar < self.bar_capacity {
            return Ok(false);
        }
        if bar >= limit {
            return Err(CodecError::BarCapacityExceeded { bar, limit });
        }
        for b in self.bar_capacity..=bar {
            self.fields[BAR_FIELD].push_token(Token::BarPosEnc(b));
        }
        log::info!(
            "bar embedding grown from {} to {}",
            self.bar_capacity,
            bar + 1
        );
        self.bar_capacity = bar + 1;
        Ok(true)
    }

    pub fn token_id(&self, field: usize, token: &Token) -> CodecResult<u32> {
        let label = token.to_string();
        self.fields[field]
            .id(&label)
            .ok_or(CodecError::UnknownToken { label, field })
    }

    pub fn id_token(&self, field: usize, id: u32) -> CodecResult<Token> {
        self.fields[field]
            .label(id)
            .ok_or(CodecError::UnknownId { id, field })?
            .parse()
    }

    /// True when the primary field has a Program label for this tag.
    pub fn knows_program(&self, program: Program) -> bool {
        self.fields[PRIMARY_FIELD]
            .id(&Token::Program(program).to_string())
            .is_some()
    }

    fn row_widths(&self) -> (usize, usize) {
        let structural = 3 + usize::from(self.has_tempo);
        (structural, structural + 2)
    }

    /// Flatten a row into per-field ids.
    pub fn row_to_ids(&self, row: &TokenRow) -> CodecResult<Vec<u32>> {
        let tokens = row.fields();
        let (structural, full) = self.row_widths();
        if row.tempo.is_some() != self.has_tempo || (tokens.len() != structural && tokens.len() != full)
        {
            return Err(CodecError::RowWidth {
                width: tokens.len(),
                structural,
                full,
            });
        }
        // Structural rows are a prefix of the field list and note rows cover
        // it exactly, so a token's position is its field index.
        tokens
            .into_iter()
            .enumerate()
            .map(|(field, token)| self.token_id(field, token))
            .collect()
    }

    /// Rebuild a row from per-field ids.
    pub fn ids_to_row(&self, ids: &[u32]) -> CodecResult<TokenRow> {
        let (structural, full) = self.row_widths();
        if ids.len() != structural && ids.len() != full {
            return Err(CodecError::RowWidth {
                width: ids.len(),
                structural,
                full,
            });
        }
        let tokens = ids
            .iter()
            .enumerate()
            .map(|(field, &id)| self.id_token(field, id))
            .collect::<CodecResult<Vec<_>>>()?;
        TokenRow::from_tokens(tokens, self.has_tempo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::duration::duration_bins;
    use crate::token::SpecialToken;

    fn vocab(config: &TokenizerConfig) -> Vocabulary {
        Vocabulary::build(config, &duration_bins(&config.beat_res), &[])
    }

    #[test]
    fn test_field_layout() {
        let config = TokenizerConfig::default();
        let v = vocab(&config);
        assert_eq!(v.fields().len(), 5);
        assert_eq!(v.tempo_field(), None);
        assert_eq!(v.velocity_field(), 3);
        assert_eq!(v.duration_field(), 4);

        let sizes = v.sizes();
        // specials + 88 pitches + 61 drum pitches + bar + 32 positions + 129 programs
        assert_eq!(sizes[0], 4 + 88 + 61 + 1 + 32 + 129);
        assert_eq!(sizes[1], 4 + 60);
        assert_eq!(sizes[2], 4 + 1 + 32);
        assert_eq!(sizes[3], 4 + 32);
        assert_eq!(sizes[4], 4 + 64);

        for field in v.fields() {
            assert_eq!(field.label(0), Some("PAD_None"));
        }
    }

    #[test]
    fn test_tempo_field() {
        let config = TokenizerConfig {
            use_tempos: true,
            ..TokenizerConfig::default()
        };
        let v = vocab(&config);
        assert_eq!(v.fields().len(), 6);
        assert_eq!(v.tempo_field(), Some(3));
        assert_eq!(v.field(3).len(), 4 + 32);
        assert!(v.token_id(3, &Token::Tempo(40)).is_ok());
    }

    #[test]
    fn test_bar_growth_is_monotonic() {
        let mut v = vocab(&TokenizerConfig::default());
        assert_eq!(v.bar_capacity(), 60);
        assert!(!v.ensure_bar_capacity(59, 1000).unwrap());
        let id_59 = v.token_id(BAR_FIELD, &Token::BarPosEnc(59)).unwrap();

        assert!(v.ensure_bar_capacity(75, 1000).unwrap());
        assert_eq!(v.bar_capacity(), 76);
        assert_eq!(v.field(BAR_FIELD).len(), 4 + 76);
        assert_eq!(v.token_id(BAR_FIELD, &Token::BarPosEnc(59)).unwrap(), id_59);
        assert!(v.token_id(BAR_FIELD, &Token::BarPosEnc(75)).is_ok());

        assert!(!v.ensure_bar_capacity(10, 1000).unwrap());
        assert_eq!(v.bar_capacity(), 76);
    }

    #[test]
    fn test_bar_growth_limit() {
        let mut v = vocab(&TokenizerConfig::default());
        let err = v.ensure_bar_capacity(100, 100).unwrap_err();
        assert!(matches!(err, CodecError::BarCapacityExceeded { bar: 100, limit: 100 }));
        assert_eq!(v.bar_capacity(), 60);
    }

    #[test]
    fn test_row_ids_roundtrip() {
        let v = vocab(&TokenizerConfig::default());
        let rows = [
            TokenRow::structural(Token::Bar, 3, None, None),
            TokenRow::structural(Token::Program(Program::Drums), 3, Some(4), None),
            TokenRow::note(Token::Pitch(60), 3, 4, None, 79, DurationBin::new(0, 4, 8)),
        ];
        for row in rows {
            let ids = v.row_to_ids(&row).unwrap();
            assert_eq!(v.ids_to_row(&ids).unwrap(), row);
        }
        assert_eq!(
            v.row_to_ids(&TokenRow::structural(Token::Bar, 0, None, None)).unwrap()[2],
            SpecialToken::ALL.len() as u32
        );
    }

    #[test]
    fn test_unknown_tokens() {
        let v = vocab(&TokenizerConfig::default());
        let row = TokenRow::note(Token::Pitch(10), 0, 0, None, 79, DurationBin::new(0, 4, 8));
        assert!(matches!(
            v.row_to_ids(&row),
            Err(CodecError::UnknownToken { field: 0, .. })
        ));
        assert!(matches!(v.ids_to_row(&[9999, 0, 0]), Err(CodecError::UnknownId { .. })));
        assert!(matches!(v.ids_to_row(&[0, 0]), Err(CodecError::RowWidth { .. })));
        let tempo_row = TokenRow::structural(Token::Bar, 0, None, Some(120));
        assert!(v.row_to_ids(&tempo_row).is_err());
    }
}
