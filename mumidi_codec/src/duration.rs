// Duration bins and nearest-bin quantization.
//
// The set of allowed note lengths is derived from the beat-resolution table:
// every (beat, position, resolution) triple inside each beat range, plus one
// closing entry at the end of the last range, minus the zero-length first
// entry. A bin's tick length depends on the document's ticks-per-beat, so the
// tick table is computed once per distinct ticks-per-beat value and cached
// for the lifetime of the tokenizer.
//
// Quantization picks the bin with the smallest absolute distance to the raw
// duration. On ties the first bin in table order wins. It never fails: a
// duration far outside the table snaps to the nearest end.

use crate::config::BeatRange;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// One allowed duration: `beat` whole beats plus `pos` samples at `res`
/// samples per beat. Label form is `beat.pos.res`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DurationBin {
    pub beat: u32,
    pub pos: u32,
    pub res: u32,
}

impl DurationBin {
    pub fn new(beat: u32, pos: u32, res: u32) -> Self {
        DurationBin { beat, pos, res }
    }

    /// Length in ticks for a given ticks-per-beat (time division),
    /// saturating at `u32::MAX`.
    pub fn ticks(self, ticks_per_beat: u32) -> u32 {
        self.checked_ticks(ticks_per_beat).unwrap_or(u32::MAX)
    }

    /// Length in ticks, or `None` when it does not fit a tick count.
    pub fn checked_ticks(self, ticks_per_beat: u32) -> Option<u32> {
        let samples = u64::from(self.beat)
            .checked_mul(u64::from(self.res))?
            .checked_add(u64::from(self.pos))?;
        let ticks = samples.checked_mul(u64::from(ticks_per_beat))? / u64::from(self.res.max(1));
        u32::try_from(ticks).ok()
    }
}

impl fmt::Display for DurationBin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.beat, self.pos, self.res)
    }
}

impl FromStr for DurationBin {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('.').collect();
        let [beat, pos, res] = parts.as_slice() else {
            return Err(format!("duration `{s}` is not beat.pos.res"));
        };
        let parse = |v: &str| v.parse::<u32>().map_err(|e| format!("duration `{s}`: {e}"));
        let bin = DurationBin::new(parse(*beat)?, parse(*pos)?, parse(*res)?);
        if bin.res == 0 || bin.pos >= bin.res {
            return Err(format!("duration `{s}` has an invalid resolution"));
        }
        Ok(bin)
    }
}

/// Build the ordered duration bins from a beat-resolution table.
pub fn duration_bins(beat_res: &[BeatRange]) -> Vec<DurationBin> {
    let mut bins: Vec<DurationBin> = beat_res
        .iter()
        .flat_map(|range| {
            (range.start..range.end).flat_map(move |beat| {
                (0..range.resolution).map(move |pos| DurationBin::new(beat, pos, range.resolution))
            })
        })
        .collect();
    if let Some(last) = beat_res.iter().max_by_key(|r| r.end) {
        bins.push(DurationBin::new(last.end, 0, last.resolution));
    }
    if !bins.is_empty() {
        bins.remove(0);
    }
    bins
}

/// Duration bins plus the per-ticks-per-beat tick tables.
#[derive(Debug, Clone)]
pub struct DurationTable {
    bins: Vec<DurationBin>,
    ticks_cache: HashMap<u32, Vec<u32>>,
}

impl DurationTable {
    pub fn new(beat_res: &[BeatRange]) -> Self {
        DurationTable {
            bins: duration_bins(beat_res),
            ticks_cache: HashMap::new(),
        }
    }

    pub fn bins(&self) -> &[DurationBin] {
        &self.bins
    }

    /// Quantizer for one ticks-per-beat value, computing its tick table on
    /// first use.
    pub fn quantizer(&mut self, ticks_per_beat: u32) -> DurationQuantizer<'_> {
        let bins = &self.bins;
        let ticks = self.ticks_cache.entry(ticks_per_beat).or_insert_with(|| {
            log::debug!("computing duration table for {ticks_per_beat} ticks per beat");
            bins.iter().map(|b| b.ticks(ticks_per_beat)).collect()
        });
        DurationQuantizer { bins, ticks }
    }

    /// Number of ticks-per-beat values cached so far.
    pub fn cached_resolutions(&self) -> usize {
        self.ticks_cache.len()
    }
}

/// Nearest-bin lookup against one tick table.
#[derive(Debug, Clone, Copy)]
pub struct DurationQuantizer<'a> {
    bins: &'a [DurationBin],
    ticks: &'a [u32],
}

impl DurationQuantizer<'_> {
    /// Index of the nearest bin; first minimal distance wins.
    pub fn nearest_index(&self, duration: u32) -> usize {
        let mut best = 0;
        let mut best_dist = u32::MAX;
        for (i, &t) in self.ticks.iter().enumerate() {
            let dist = t.abs_diff(duration);
            if dist < best_dist {
                best = i;
                best_dist = dist;
            }
        }
        best
    }

    pub fn quantize(&self, duration: u32) -> DurationBin {
        self.bins[self.nearest_index(duration)]
    }

    pub fn ticks(&self) -> &[u32] {
        self.ticks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TokenizerConfig;

    fn default_table() -> DurationTable {
        DurationTable::new(&TokenizerConfig::default().beat_res)
    }

    #[test]
    fn test_default_bins_shape() {
        let table = default_table();
        let bins = table.bins();
        // 4 beats at 8 + 8 beats at 4 + closing entry - zero entry
        assert_eq!(bins.len(), 32 + 32 + 1 - 1);
        assert_eq!(bins[0], DurationBin::new(0, 1, 8));
        assert_eq!(*bins.last().unwrap(), DurationBin::new(12, 0, 4));
    }

    #[test]
    fn test_quantize_nearest() {
        let mut table = default_table();
        let q = table.quantizer(480);
        assert_eq!(q.quantize(240), DurationBin::new(0, 4, 8));
        assert_eq!(q.quantize(250), DurationBin::new(0, 4, 8));
        assert_eq!(q.quantize(480), DurationBin::new(1, 0, 8));
    }

    #[test]
    fn test_quantize_tie_takes_first() {
        let mut table = default_table();
        let q = table.quantizer(480);
        // 90 is equidistant from 60 (0.1.8) and 120 (0.2.8).
        assert_eq!(q.quantize(90), DurationBin::new(0, 1, 8));
    }

    #[test]
    fn test_quantize_out_of_range() {
        let mut table = default_table();
        let q = table.quantizer(480);
        assert_eq!(q.quantize(0), DurationBin::new(0, 1, 8));
        assert_eq!(q.quantize(1_000_000), DurationBin::new(12, 0, 4));
    }

    #[test]
    fn test_quantize_idempotent() {
        let mut table = default_table();
        for tpb in [96, 384, 480] {
            let q = table.quantizer(tpb);
            for (i, &t) in q.ticks().iter().enumerate() {
                assert_eq!(q.nearest_index(t), i, "tpb {tpb} tick {t}");
                let bin = q.quantize(t);
                assert_eq!(q.quantize(bin.ticks(tpb)), bin);
            }
        }
        assert_eq!(table.cached_resolutions(), 3);
    }

    #[test]
    fn test_label_parse() {
        assert_eq!("2.3.4".parse::<DurationBin>(), Ok(DurationBin::new(2, 3, 4)));
        assert!("2.3".parse::<DurationBin>().is_err());
        assert!("2.5.4".parse::<DurationBin>().is_err());
        assert!("1.0.0".parse::<DurationBin>().is_err());
    }
}
