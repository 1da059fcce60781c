//! Performance harness: timed lookup loops over a populated store.
//!
//! One parameterized loop covers every variant, width and access pattern:
//!
//! - [`LookupVariant::Single`] issues `ops` single-key lookups.
//! - The batch variants issue `ops / width` full rounds, then a single-key
//!   pass over the `ops % width` leftover keys so every run does exactly
//!   `ops` lookups.
//!
//! Keys start at 0 and advance linearly (+1 per lookup, +width per round) or
//! are redrawn from a seeded generator. The loops never log; results come
//! back as [`PerfSample`]s for the report.
//!
//! Every pass also folds its found bits into a fingerprint, inside the timed
//! region. Single-key lookups pack one bit per lookup and fold once per 64
//! lookups, batch rounds fold their bitmap once per round, so no row pays
//! more than one fold per 8 lookups at the default width. With linear keys
//! the single-key and 64-wide fingerprints are identical.

use std::fmt as StdFmt;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::batch::{Batch, BatchVariant, BatchWidth};
use crate::clock::CycleClock;
use crate::profile::RANDOM_KEY_LIMIT;
use crate::store::KvStore;
use crate::tracing_helpers::debug_log;

/// Batch slot overwritten with the profile's absent probe after each round.
pub const PERTURBED_SLOT: usize = 3;

// ============================================================================
//  Selectors
// ============================================================================

/// Lookup code path under measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LookupVariant {
    /// One key per call. The baseline.
    Single,
    /// Bulk search over a batch (hash, prefetch, vector compare).
    Accelerated,
    /// One single-key lookup per batch slot.
    Reference,
}

impl LookupVariant {
    /// Every variant in report order.
    pub const ALL: [Self; 3] = [Self::Single, Self::Accelerated, Self::Reference];

    /// API tag used in report rows.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Single => "V0",
            Self::Accelerated => "V4",
            Self::Reference => "V5",
        }
    }

    /// The batch implementation behind this variant, if any.
    #[must_use]
    pub const fn batch(self) -> Option<BatchVariant> {
        match self {
            Self::Single => None,
            Self::Accelerated => Some(BatchVariant::Accelerated),
            Self::Reference => Some(BatchVariant::Reference),
        }
    }
}

impl StdFmt::Display for LookupVariant {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        let name = match self {
            Self::Single => "single",
            Self::Accelerated => "accelerated",
            Self::Reference => "reference",
        };
        write!(f, "{} ({name})", self.tag())
    }
}

/// Whether a measurement runs on cold or warmed caches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum StartMode {
    /// Timed pass only.
    Cold,
    /// One identical untimed pass, then the timed pass.
    #[default]
    Warm,
}

/// How keys advance between lookups.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum AccessPattern {
    /// +1 per lookup, +width per batch round.
    #[default]
    Linear,
    /// Uniform redraw in `[0, 2³¹)`.
    Random,
}

// ============================================================================
//  KeyCursor
// ============================================================================

/// Produces the next lookup key(s).
///
/// A random cursor with a non-zero `reseed` reseeds its generator before
/// every draw (so every round draws the same keys). Zero never reseeds.
#[derive(Debug, Clone)]
pub struct KeyCursor {
    pattern: AccessPattern,
    rng: StdRng,
    reseed: u64,
}

impl KeyCursor {
    /// Cursor whose generator starts from `seed`.
    #[must_use]
    pub fn new(pattern: AccessPattern, seed: u64, reseed: u64) -> Self {
        Self {
            pattern,
            rng: StdRng::seed_from_u64(seed),
            reseed,
        }
    }

    #[inline(always)]
    fn maybe_reseed(&mut self) {
        if self.reseed > 0 {
            self.rng = StdRng::seed_from_u64(self.reseed);
        }
    }

    /// Key that follows `current`.
    #[inline]
    pub fn next_key(&mut self, current: u64) -> u64 {
        match self.pattern {
            AccessPattern::Linear => current.wrapping_add(1),
            AccessPattern::Random => {
                self.maybe_reseed();
                self.rng.gen_range(0..RANDOM_KEY_LIMIT)
            }
        }
    }

    /// Move every slot of `batch` to its next-round key.
    #[inline]
    pub fn advance_batch<const N: usize>(&mut self, batch: &mut Batch<N>) {
        match self.pattern {
            AccessPattern::Linear => batch.shift_keys(N as u64),
            AccessPattern::Random => {
                self.maybe_reseed();
                for slot in batch.slots_mut().iter_mut() {
                    slot.key = self.rng.gen_range(0..RANDOM_KEY_LIMIT);
                }
            }
        }
    }
}

// ============================================================================
//  HarnessConfig
// ============================================================================

/// Parameters shared by every variant of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HarnessConfig {
    /// Lookups per timed pass.
    pub ops: u64,
    /// Slots per batch round.
    pub width: BatchWidth,
    /// Key advance strategy.
    pub access: AccessPattern,
    /// Seed of the random cursor.
    pub seed: u64,
    /// Reseed value for random draws, 0 for none.
    pub reseed: u64,
    /// Cold or warm measurement.
    pub start: StartMode,
    /// Absent key written into slot [`PERTURBED_SLOT`] after every round.
    pub absent_probe: Option<u64>,
}

impl HarnessConfig {
    /// Linear, 8-wide, warm, unperturbed run of `ops` lookups.
    #[must_use]
    pub const fn new(ops: u64) -> Self {
        Self {
            ops,
            width: BatchWidth::X8,
            access: AccessPattern::Linear,
            seed: 0,
            reseed: 0,
            start: StartMode::Warm,
            absent_probe: None,
        }
    }
}

// ============================================================================
//  Timed loops
// ============================================================================

const FINGERPRINT_SEED: u64 = 0xcbf2_9ce4_8422_2325;

#[inline(always)]
const fn fold_fingerprint(acc: u64, bits: u64) -> u64 {
    (acc.rotate_left(5) ^ bits).wrapping_mul(0x0100_0000_01b3)
}

/// Found bits in lookup order, 64 to a word.
#[derive(Debug, Clone, Copy)]
struct Fingerprint {
    acc: u64,
    word: u64,
    filled: u32,
}

impl Fingerprint {
    const fn new() -> Self {
        Self {
            acc: FINGERPRINT_SEED,
            word: 0,
            filled: 0,
        }
    }

    /// One single-key result.
    #[inline(always)]
    fn push(&mut self, found: bool) {
        self.word |= u64::from(found) << self.filled;
        self.filled += 1;
        if self.filled == 64 {
            self.acc = fold_fingerprint(self.acc, self.word);
            self.word = 0;
            self.filled = 0;
        }
    }

    /// One batch round's bitmap.
    #[inline(always)]
    const fn push_round(&mut self, bits: u64) {
        self.acc = fold_fingerprint(self.acc, bits);
    }

    /// Fold any partial word.
    const fn finish(self) -> u64 {
        if self.filled == 0 {
            self.acc
        } else {
            fold_fingerprint(self.acc, self.word)
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Pass {
    cycles: u64,
    hits: u64,
    fingerprint: u64,
}

fn timed_single<S: KvStore>(store: &S, cfg: &HarnessConfig) -> Pass {
    let mut cursor = KeyCursor::new(cfg.access, cfg.seed, cfg.reseed);
    let mut key = 0u64;
    let mut hits = 0u64;
    let mut fingerprint = Fingerprint::new();

    let start = CycleClock::now();
    for _ in 0..cfg.ops {
        let found = store.lookup(key).is_some();
        hits += u64::from(found);
        fingerprint.push(found);
        key = cursor.next_key(key);
    }
    let cycles = CycleClock::since(start);

    Pass {
        cycles,
        hits,
        fingerprint: fingerprint.finish(),
    }
}

fn timed_batched<S: KvStore, const N: usize>(
    store: &S,
    variant: BatchVariant,
    cfg: &HarnessConfig,
) -> Pass {
    let mut cursor = KeyCursor::new(cfg.access, cfg.seed, cfg.reseed);
    let mut batch = Batch::<N>::starting_at(0);
    let width = N as u64;
    let rounds = cfg.ops / width;
    let rest = cfg.ops % width;
    let mut hits = 0u64;
    let mut fingerprint = Fingerprint::new();

    let start = CycleClock::now();
    for _ in 0..rounds {
        let outcome = variant.lookup(store, &mut batch);
        hits += u64::from(outcome.hits);
        fingerprint.push_round(outcome.found.bits());
        cursor.advance_batch(&mut batch);
        if let Some(probe) = cfg.absent_probe {
            batch.overwrite_key(PERTURBED_SLOT, probe);
        }
    }

    let mut key = batch.slots()[0].key;
    for _ in 0..rest {
        let found = store.lookup(key).is_some();
        hits += u64::from(found);
        fingerprint.push(found);
        key = cursor.next_key(key);
    }
    let cycles = CycleClock::since(start);

    Pass {
        cycles,
        hits,
        fingerprint: fingerprint.finish(),
    }
}

fn timed_pass<S: KvStore>(store: &S, variant: LookupVariant, cfg: &HarnessConfig) -> Pass {
    let Some(batch) = variant.batch() else {
        return timed_single(store, cfg);
    };
    match cfg.width {
        BatchWidth::X1 => timed_batched::<S, 1>(store, batch, cfg),
        BatchWidth::X8 => timed_batched::<S, 8>(store, batch, cfg),
        BatchWidth::X16 => timed_batched::<S, 16>(store, batch, cfg),
        BatchWidth::X32 => timed_batched::<S, 32>(store, batch, cfg),
        BatchWidth::X64 => timed_batched::<S, 64>(store, batch, cfg),
    }
}

/// Measure one variant against `store`.
///
/// In [`StartMode::Warm`] an identical pass runs first and its timing is
/// discarded. Both passes see the same keys.
pub fn run_variant<S: KvStore>(
    store: &S,
    variant: LookupVariant,
    cfg: &HarnessConfig,
    clock: &CycleClock,
) -> PerfSample {
    if cfg.start == StartMode::Warm {
        let warmup = timed_pass(store, variant, cfg);
        debug_log!(variant = variant.tag(), cycles = warmup.cycles, "warm-up pass done");
    }
    let pass = timed_pass(store, variant, cfg);
    let width = match variant {
        LookupVariant::Single => 1,
        _ => cfg.width.slots(),
    };

    debug_log!(
        variant = variant.tag(),
        width,
        ops = cfg.ops,
        cycles = pass.cycles,
        hits = pass.hits,
        "timed pass done"
    );

    PerfSample {
        variant,
        width,
        ops: cfg.ops,
        cycles: pass.cycles,
        hits: pass.hits,
        found_fingerprint: pass.fingerprint,
        hz: clock.hz(),
    }
}

// ============================================================================
//  Results
// ============================================================================

/// Outcome of one timed pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerfSample {
    /// Variant measured.
    pub variant: LookupVariant,
    /// Keys per call (1 for [`LookupVariant::Single`]).
    pub width: usize,
    /// Lookups performed.
    pub ops: u64,
    /// Counter ticks for the whole pass.
    pub cycles: u64,
    /// Lookups that found their key.
    pub hits: u64,
    /// Fold of every found bit, in lookup order.
    pub found_fingerprint: u64,
    /// Counter frequency used to convert cycles to time.
    pub hz: f64,
}

impl PerfSample {
    /// Cycles per lookup (integer division, as reported historically).
    #[must_use]
    pub const fn cycles_per_op(&self) -> u64 {
        match self.ops {
            0 => 0,
            ops => self.cycles / ops,
        }
    }

    /// Millions of lookups per second.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn mops(&self) -> f64 {
        if self.cycles == 0 {
            return 0.0;
        }
        let secs = self.cycles as f64 / self.hz;
        self.ops as f64 / (secs * 1.0e6)
    }
}

/// One report row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerfRow {
    /// The measurement.
    pub sample: PerfSample,
    /// `mops * 100 / baseline mops`, 0 when the baseline is 0.
    pub ratio_pct: f64,
}

/// Samples of one run with throughput ratios against a baseline.
#[derive(Debug, Clone, PartialEq)]
pub struct PerfTable {
    /// Variant whose throughput is 100%.
    pub baseline: LookupVariant,
    /// Rows in measurement order.
    pub rows: Vec<PerfRow>,
}

impl PerfTable {
    /// Build the table. Without a `baseline` sample every ratio is 0.
    #[must_use]
    pub fn new(samples: &[PerfSample], baseline: LookupVariant) -> Self {
        let base = samples
            .iter()
            .find(|s| s.variant == baseline)
            .map_or(0.0, PerfSample::mops);
        let rows = samples
            .iter()
            .map(|&sample| PerfRow {
                sample,
                ratio_pct: if base > 0.0 {
                    sample.mops() * 100.0 / base
                } else {
                    0.0
                },
            })
            .collect();
        Self { baseline, rows }
    }

    /// Lookups per pass of the baseline row, 0 if absent.
    #[must_use]
    pub fn baseline_ops(&self) -> u64 {
        self.rows
            .iter()
            .find(|r| r.sample.variant == self.baseline)
            .map_or(0, |r| r.sample.ops)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::{BucketTable, DEFAULT_MEMORY_BUDGET};

    fn sequential(n: u64) -> BucketTable {
        let mut t = BucketTable::init("harness-test", 1024, DEFAULT_MEMORY_BUDGET).unwrap();
        for k in 0..n {
            t.insert_or_update(k, k).unwrap();
        }
        t
    }

    fn clock() -> CycleClock {
        CycleClock::fixed(1.0e9)
    }

    #[test]
    fn test_every_variant_counts_all_hits() {
        let t = sequential(1_000);
        let cfg = HarnessConfig::new(1_000);
        for variant in LookupVariant::ALL {
            let s = run_variant(&t, variant, &cfg, &clock());
            assert_eq!(s.ops, 1_000);
            assert_eq!(s.hits, 1_000, "{variant}");
        }
    }

    #[test]
    fn test_remainder_pass_covers_leftover_keys() {
        let t = sequential(100);
        let mut cfg = HarnessConfig::new(203);
        cfg.width = BatchWidth::X16;
        cfg.start = StartMode::Cold;
        // 12 rounds of 16 keys plus 11 single lookups: keys 0..203, 100 present.
        for variant in [LookupVariant::Accelerated, LookupVariant::Reference] {
            let s = run_variant(&t, variant, &cfg, &clock());
            assert_eq!(s.hits, 100, "{variant}");
            assert_eq!(s.width, 16);
        }
    }

    #[test]
    fn test_ops_below_width_runs_remainder_only() {
        let t = sequential(10);
        let mut cfg = HarnessConfig::new(5);
        cfg.width = BatchWidth::X64;
        let s = run_variant(&t, LookupVariant::Accelerated, &cfg, &clock());
        assert_eq!(s.hits, 5);
    }

    #[test]
    fn test_absent_probe_costs_one_hit_per_round() {
        let t = sequential(1_000);
        let mut cfg = HarnessConfig::new(800);
        cfg.absent_probe = Some(1_001_000);
        let s = run_variant(&t, LookupVariant::Accelerated, &cfg, &clock());
        // The probe lands after each advance, so rounds 2..=100 each miss once.
        assert_eq!(s.hits, 800 - 99);

        cfg.width = BatchWidth::X1;
        let narrow = run_variant(&t, LookupVariant::Accelerated, &cfg, &clock());
        assert_eq!(narrow.hits, 800, "slot 3 does not exist in a 1-wide batch");
    }

    #[test]
    fn test_variants_share_fingerprint() {
        let t = sequential(500);
        let mut cfg = HarnessConfig::new(1_024);
        cfg.access = AccessPattern::Random;
        cfg.seed = 9;
        let a = run_variant(&t, LookupVariant::Accelerated, &cfg, &clock());
        let r = run_variant(&t, LookupVariant::Reference, &cfg, &clock());
        assert_eq!(a.found_fingerprint, r.found_fingerprint);
        assert_eq!(a.hits, r.hits);
    }

    #[test]
    fn test_single_and_x64_fingerprints_match_on_linear_keys() {
        // Sparse hits so the fingerprint depends on which lookups hit.
        let mut t = BucketTable::init("harness-test", 1024, DEFAULT_MEMORY_BUDGET).unwrap();
        for k in (0..3_000u64).filter(|k| k % 3 == 0 || k % 7 == 0) {
            t.insert_or_update(k, k).unwrap();
        }
        for ops in [640, 1_000, 63] {
            let mut cfg = HarnessConfig::new(ops);
            cfg.width = BatchWidth::X64;
            let single = run_variant(&t, LookupVariant::Single, &cfg, &clock());
            let wide = run_variant(&t, LookupVariant::Accelerated, &cfg, &clock());
            assert_eq!(single.hits, wide.hits, "{ops} ops");
            assert_eq!(single.found_fingerprint, wide.found_fingerprint, "{ops} ops");
        }
    }

    #[test]
    fn test_fingerprint_packs_one_bit_per_lookup() {
        let mut fp = Fingerprint::new();
        for i in 0..64 {
            fp.push(i % 2 == 0);
        }
        let mut round = Fingerprint::new();
        round.push_round(0x5555_5555_5555_5555);
        assert_eq!(fp.finish(), round.finish());

        let mut partial = Fingerprint::new();
        partial.push(true);
        assert_ne!(partial.finish(), Fingerprint::new().finish());
    }

    #[test]
    fn test_random_cursor_reseed_repeats_keys() {
        let mut cursor = KeyCursor::new(AccessPattern::Random, 1, 77);
        let first = cursor.next_key(0);
        assert_eq!(cursor.next_key(first), first);

        let mut free = KeyCursor::new(AccessPattern::Random, 1, 0);
        let keys: Vec<u64> = (0..8).map(|_| free.next_key(0)).collect();
        assert!(keys.iter().all(|&k| k < RANDOM_KEY_LIMIT));
        assert!(keys.windows(2).any(|w| w[0] != w[1]));
    }

    #[test]
    fn test_linear_cursor_shifts_batch() {
        let mut cursor = KeyCursor::new(AccessPattern::Linear, 0, 0);
        let mut batch = Batch::<8>::starting_at(0);
        cursor.advance_batch(&mut batch);
        assert_eq!(batch.slots()[0].key, 8);
        assert_eq!(batch.slots()[7].key, 15);
        assert_eq!(cursor.next_key(41), 42);
    }

    #[test]
    fn test_sample_math() {
        let s = PerfSample {
            variant: LookupVariant::Single,
            width: 1,
            ops: 1_000_000,
            cycles: 50_000_000,
            hits: 0,
            found_fingerprint: 0,
            hz: 1.0e9,
        };
        assert_eq!(s.cycles_per_op(), 50);
        assert!((s.mops() - 20.0).abs() < 1e-9);

        let idle = PerfSample { ops: 0, cycles: 0, ..s };
        assert_eq!(idle.cycles_per_op(), 0);
        assert_eq!(idle.mops(), 0.0);
    }

    #[test]
    fn test_table_ratios() {
        let base = PerfSample {
            variant: LookupVariant::Single,
            width: 1,
            ops: 1_000,
            cycles: 2_000,
            hits: 1_000,
            found_fingerprint: 0,
            hz: 1.0e9,
        };
        let fast = PerfSample {
            variant: LookupVariant::Accelerated,
            width: 8,
            cycles: 1_000,
            ..base
        };
        let table = PerfTable::new(&[base, fast], LookupVariant::Single);
        assert!((table.rows[0].ratio_pct - 100.0).abs() < 1e-9);
        assert!((table.rows[1].ratio_pct - 200.0).abs() < 1e-9);
        assert_eq!(table.baseline_ops(), 1_000);

        let orphan = PerfTable::new(&[fast], LookupVariant::Single);
        assert_eq!(orphan.rows[0].ratio_pct, 0.0);
        assert_eq!(orphan.baseline_ops(), 0);
    }
}
