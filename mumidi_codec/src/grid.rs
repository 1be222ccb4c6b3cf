// The time grid: absolute ticks <-> (bar, position).
//
// Every bar is four beats. Each beat is split into `resolution` samples,
// where `resolution` is the finest samples-per-beat of the beat-resolution
// table, so a bar has `4 * resolution` positions. The grid is defined by the
// document's ticks-per-beat; the same grid at a different ticks-per-beat is
// used by the decoder to lay notes back out at the output time division.
//
// All arithmetic is integer. A position is floor((tick mod bar) * res / tpb),
// which equals floor((tick mod bar) / ticks_per_sample) without forming the
// (possibly fractional) ticks_per_sample.

/// Beats per bar. The tokenizer has no time-signature support.
pub const BEATS_PER_BAR: u32 = 4;

/// Tick grid for one ticks-per-beat value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeGrid {
    pub ticks_per_beat: u32,
    /// Samples per beat (the finest configured resolution).
    pub resolution: u32,
}

impl TimeGrid {
    pub fn new(ticks_per_beat: u32, resolution: u32) -> Self {
        TimeGrid {
            ticks_per_beat,
            resolution,
        }
    }

    pub fn ticks_per_bar(&self) -> u32 {
        self.ticks_per_beat * BEATS_PER_BAR
    }

    /// Number of positions in one bar.
    pub fn positions_per_bar(&self) -> u32 {
        self.resolution * BEATS_PER_BAR
    }

    pub fn bar(&self, tick: u32) -> u32 {
        tick / self.ticks_per_bar()
    }

    pub fn position(&self, tick: u32) -> u32 {
        let in_bar = u64::from(tick % self.ticks_per_bar());
        (in_bar * u64::from(self.resolution) / u64::from(self.ticks_per_beat)) as u32
    }

    /// (bar, position) of an absolute tick.
    pub fn locate(&self, tick: u32) -> (u32, u32) {
        (self.bar(tick), self.position(tick))
    }

    /// First tick of a bar.
    pub fn bar_start(&self, bar: u32) -> u32 {
        bar * self.ticks_per_bar()
    }

    /// Tick of a (bar, position) pair. Exact when ticks-per-beat is a
    /// multiple of the resolution, which the decoder requires; otherwise the
    /// tick is rounded up so that `locate` maps it back to the same pair.
    pub fn tick_at(&self, bar: u32, position: u32) -> u32 {
        self.bar_start(bar) + self.sample_tick(position)
    }

    /// Tick offset of a sample index, rounded up.
    pub fn sample_tick(&self, sample: u32) -> u32 {
        let num = u64::from(sample) * u64::from(self.ticks_per_beat);
        num.div_ceil(u64::from(self.resolution)) as u32
    }

    /// Nearest sample index to an arbitrary tick (half rounds up).
    pub fn nearest_sample(&self, tick: u32) -> u32 {
        let num = 2 * u64::from(tick) * u64::from(self.resolution) + u64::from(self.ticks_per_beat);
        (num / (2 * u64::from(self.ticks_per_beat))) as u32
    }

    /// Snap a tick onto the grid.
    pub fn snap(&self, tick: u32) -> u32 {
        self.sample_tick(self.nearest_sample(tick))
    }

    /// True when every grid point falls on a whole tick.
    pub fn is_exact(&self) -> bool {
        self.ticks_per_beat % self.resolution == 0
    }
}
