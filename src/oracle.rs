//! Consistency oracle: prove two lookup paths agree without keeping results.
//!
//! Each path walks the same key sequence against the same store and feeds
//! the decimal text of every value it finds into its own running digest.
//! Equal digests over an equal number of visited keys mean the paths found
//! the same values in the same order. Memory stays constant however long the
//! walk is.
//!
//! Two comparisons are offered:
//! - [`sequential_vs_batch`]: single-key lookups against accelerated
//!   batches
//! - [`batch_vs_batch`]: any two batch variants at the same width
//!
//! A mismatch is a [`Verdict`], not an error. It says *that* the paths
//! diverged, never *where*.

use std::fmt as StdFmt;
use std::fmt::Write as _;

use sha2::{Digest, Sha256};

use crate::batch::{Batch, BatchVariant, BatchWidth, FoundBitmap, prefix_mask};
use crate::error::BenchError;
use crate::harness::{AccessPattern, KeyCursor};
use crate::store::{KvPair, KvStore};
use crate::tracing_helpers::{debug_log, warn_log};

// ============================================================================
//  DigestAccumulator
// ============================================================================

/// Running digest over the values one path observed.
#[derive(Debug, Clone)]
pub struct DigestAccumulator<D: Digest = Sha256> {
    hasher: D,
    text: String,
    hits: u64,
    visited: u64,
}

impl<D: Digest> DigestAccumulator<D> {
    /// Empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self {
            hasher: D::new(),
            text: String::with_capacity(20),
            hits: 0,
            visited: 0,
        }
    }

    #[inline]
    fn feed(&mut self, value: u64) {
        self.text.clear();
        // Writing into a String cannot fail.
        let _ = write!(self.text, "{value}");
        self.hasher.update(self.text.as_bytes());
        self.hits += 1;
    }

    /// Record one single-key lookup.
    #[inline]
    pub fn record(&mut self, result: Option<u64>) {
        self.visited += 1;
        if let Some(value) = result {
            self.feed(value);
        }
    }

    /// Record one batch round: `slots` are the active slots, `found` the
    /// round's bitmap. Values are fed in ascending slot order.
    #[inline]
    pub fn record_batch(&mut self, slots: &[KvPair], found: FoundBitmap) {
        self.visited += slots.len() as u64;
        for i in found {
            self.feed(slots[i].value);
        }
    }

    /// Values fed so far.
    #[must_use]
    pub const fn hits(&self) -> u64 {
        self.hits
    }

    /// Keys looked up so far.
    #[must_use]
    pub const fn visited(&self) -> u64 {
        self.visited
    }

    /// Close the digest.
    #[must_use]
    pub fn finalize(self) -> DigestSummary {
        DigestSummary {
            digest: self.hasher.finalize().to_vec(),
            hits: self.hits,
            visited: self.visited,
        }
    }
}

impl<D: Digest> Default for DigestAccumulator<D> {
    fn default() -> Self {
        Self::new()
    }
}

/// A finished path: its digest and traversal counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestSummary {
    /// Raw digest bytes.
    pub digest: Vec<u8>,
    /// Values fed.
    pub hits: u64,
    /// Keys looked up.
    pub visited: u64,
}

impl DigestSummary {
    /// Lowercase hex of the digest.
    #[must_use]
    pub fn hex(&self) -> String {
        let mut out = String::with_capacity(self.digest.len() * 2);
        for byte in &self.digest {
            let _ = write!(out, "{byte:02x}");
        }
        out
    }
}

// ============================================================================
//  Config and report
// ============================================================================

/// Shape of one oracle walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OracleConfig {
    /// Keys each path looks up.
    pub key_count: u64,
    /// First key of the walk.
    pub start_key: u64,
    /// Batch width of the batched path(s).
    pub width: BatchWidth,
    /// Key advance between rounds. [`sequential_vs_batch`] is always linear.
    pub access: AccessPattern,
    /// Seed shared by both random cursors.
    pub seed: u64,
}

impl OracleConfig {
    /// Linear 8-wide walk over `key_count` keys from 0.
    #[must_use]
    pub const fn new(key_count: u64) -> Self {
        Self {
            key_count,
            start_key: 0,
            width: BatchWidth::X8,
            access: AccessPattern::Linear,
            seed: 0,
        }
    }
}

/// Whether the two digests agreed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
    /// Identical digests.
    Match,
    /// Different digests.
    Mismatch,
}

/// Outcome of one oracle comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleReport {
    /// Name of the left path.
    pub left_label: &'static str,
    /// Name of the right path.
    pub right_label: &'static str,
    /// Left path summary.
    pub left: DigestSummary,
    /// Right path summary.
    pub right: DigestSummary,
    /// Comparison result.
    pub verdict: Verdict,
}

impl OracleReport {
    /// `true` on [`Verdict::Match`].
    #[must_use]
    pub fn is_match(&self) -> bool {
        self.verdict == Verdict::Match
    }
}

impl StdFmt::Display for Verdict {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.write_str(match self {
            Self::Match => "PASS",
            Self::Mismatch => "FAILED",
        })
    }
}

/// Compare two finished paths.
///
/// # Errors
///
/// [`BenchError::TraversalLengthMismatch`] if the paths visited different
/// numbers of keys. Their digests would not be comparable.
pub fn compare(
    left_label: &'static str,
    left: DigestSummary,
    right_label: &'static str,
    right: DigestSummary,
) -> Result<OracleReport, BenchError> {
    if left.visited != right.visited {
        return Err(BenchError::TraversalLengthMismatch {
            left: left.visited,
            right: right.visited,
        });
    }

    let verdict = if left.digest == right.digest {
        Verdict::Match
    } else {
        Verdict::Mismatch
    };

    if verdict == Verdict::Mismatch {
        warn_log!(
            left = left_label,
            right = right_label,
            left_digest = %left.hex(),
            right_digest = %right.hex(),
            left_hits = left.hits,
            right_hits = right.hits,
            "lookup paths disagree"
        );
    } else {
        debug_log!(
            left = left_label,
            right = right_label,
            keys = left.visited,
            hits = left.hits,
            "lookup paths agree"
        );
    }

    Ok(OracleReport {
        left_label,
        right_label,
        left,
        right,
        verdict,
    })
}

// ============================================================================
//  Walks
// ============================================================================

/// Narrow the final round to the `rest` leading slots.
fn trim_last_round<const N: usize>(batch: &mut Batch<N>, rest: u64) -> Result<(), BenchError> {
    batch.set_mask(prefix_mask(rest as u32))
}

fn walk_batched<S: KvStore, const N: usize>(
    store: &S,
    variant: BatchVariant,
    cfg: &OracleConfig,
) -> Result<DigestSummary, BenchError> {
    let mut acc = DigestAccumulator::<Sha256>::new();
    let mut cursor = KeyCursor::new(cfg.access, cfg.seed, 0);
    let mut batch = Batch::<N>::starting_at(cfg.start_key);
    let width = N as u64;

    for _ in 0..cfg.key_count / width {
        let outcome = variant.lookup(store, &mut batch);
        acc.record_batch(batch.active_slots(), outcome.found);
        cursor.advance_batch(&mut batch);
    }

    let rest = cfg.key_count % width;
    if rest > 0 {
        trim_last_round(&mut batch, rest)?;
        let outcome = variant.lookup(store, &mut batch);
        acc.record_batch(batch.active_slots(), outcome.found);
    }

    Ok(acc.finalize())
}

fn walk_batched_at_width<S: KvStore>(
    store: &S,
    variant: BatchVariant,
    cfg: &OracleConfig,
) -> Result<DigestSummary, BenchError> {
    match cfg.width {
        BatchWidth::X1 => walk_batched::<S, 1>(store, variant, cfg),
        BatchWidth::X8 => walk_batched::<S, 8>(store, variant, cfg),
        BatchWidth::X16 => walk_batched::<S, 16>(store, variant, cfg),
        BatchWidth::X32 => walk_batched::<S, 32>(store, variant, cfg),
        BatchWidth::X64 => walk_batched::<S, 64>(store, variant, cfg),
    }
}

fn walk_sequential<S: KvStore>(store: &S, cfg: &OracleConfig) -> DigestSummary {
    let mut acc = DigestAccumulator::<Sha256>::new();
    let mut key = cfg.start_key;
    for _ in 0..cfg.key_count {
        acc.record(store.lookup(key));
        key = key.wrapping_add(1);
    }
    acc.finalize()
}

/// Single-key lookups (+1 per step) against accelerated batches (+width per
/// round) over the same `key_count` keys.
///
/// A trailing partial round runs with its mask narrowed to the leftover
/// keys. `cfg.access` is ignored: the single-key path only walks linearly.
///
/// # Errors
///
/// [`BenchError::TraversalLengthMismatch`] if the paths' key counts differ.
pub fn sequential_vs_batch<S: KvStore>(
    store: &S,
    cfg: &OracleConfig,
) -> Result<OracleReport, BenchError> {
    let linear = OracleConfig {
        access: AccessPattern::Linear,
        ..*cfg
    };
    let left = walk_sequential(store, &linear);
    let right = walk_batched_at_width(store, BatchVariant::Accelerated, &linear)?;
    compare("single", left, BatchVariant::Accelerated.name(), right)
}

/// Two batch variants over the same key sequence, each with its own cursor.
///
/// With [`AccessPattern::Random`] both cursors start from `cfg.seed`, so the
/// paths still see identical keys.
///
/// # Errors
///
/// [`BenchError::TraversalLengthMismatch`] if the paths' key counts differ.
pub fn batch_vs_batch<S: KvStore>(
    store: &S,
    cfg: &OracleConfig,
    left: BatchVariant,
    right: BatchVariant,
) -> Result<OracleReport, BenchError> {
    let l = walk_batched_at_width(store, left, cfg)?;
    let r = walk_batched_at_width(store, right, cfg)?;
    compare(left.name(), l, right.name(), r)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use sha2::Sha512;

    use super::*;
    use crate::store::{BucketTable, DEFAULT_MEMORY_BUDGET};

    fn evens(n: u64) -> BucketTable {
        let mut t = BucketTable::init("oracle-test", 512, DEFAULT_MEMORY_BUDGET).unwrap();
        for k in (0..n).step_by(2) {
            t.insert_or_update(k, k * 10).unwrap();
        }
        t
    }

    #[test]
    fn test_accumulator_feeds_decimal_text() {
        let mut acc = DigestAccumulator::<Sha256>::new();
        acc.record(Some(12));
        acc.record(None);
        acc.record(Some(345));
        let summary = acc.finalize();

        let mut expected = Sha256::new();
        expected.update(b"12345");
        assert_eq!(summary.digest, expected.finalize().to_vec());
        assert_eq!(summary.hits, 2);
        assert_eq!(summary.visited, 3);
        assert_eq!(summary.hex().len(), 64);
    }

    #[test]
    fn test_accumulator_with_other_digest() {
        let mut acc = DigestAccumulator::<Sha512>::new();
        acc.record(Some(1));
        assert_eq!(acc.finalize().digest.len(), 64);
    }

    #[test]
    fn test_record_batch_uses_found_slots_only() {
        let slots = [KvPair::new(0, 7), KvPair::new(1, 8), KvPair::new(2, 9)];
        let mut acc = DigestAccumulator::<Sha256>::new();
        acc.record_batch(&slots, FoundBitmap::from_bits(0b101));

        let mut single = DigestAccumulator::<Sha256>::new();
        single.record(Some(7));
        single.record(None);
        single.record(Some(9));
        assert_eq!(acc.finalize(), single.finalize());
    }

    #[test]
    fn test_sequential_vs_batch_matches() {
        let t = evens(2_000);
        let report = sequential_vs_batch(&t, &OracleConfig::new(2_000)).unwrap();
        assert!(report.is_match());
        assert_eq!(report.left.hits, 1_000);
        assert_eq!(report.left.visited, 2_000);
    }

    #[test]
    fn test_uneven_key_count_uses_partial_round() {
        let t = evens(100);
        let mut cfg = OracleConfig::new(101);
        for width in BatchWidth::ALL {
            cfg.width = width;
            let report = sequential_vs_batch(&t, &cfg).unwrap();
            assert!(report.is_match(), "{width}");
            assert_eq!(report.right.visited, 101, "{width}");
        }
    }

    #[test]
    fn test_batch_vs_batch_random_walk() {
        let mut t = BucketTable::init("oracle-random", 512, DEFAULT_MEMORY_BUDGET).unwrap();
        for k in 0..5_000u64 {
            t.insert_or_update(k * 429_497, k).unwrap();
        }
        let mut cfg = OracleConfig::new(4_100);
        cfg.access = AccessPattern::Random;
        cfg.seed = 3;
        cfg.width = BatchWidth::X32;
        let report =
            batch_vs_batch(&t, &cfg, BatchVariant::Reference, BatchVariant::Accelerated).unwrap();
        assert!(report.is_match());
        assert_eq!(report.left_label, "batch-reference");
    }

    #[test]
    fn test_compare_guards_traversal_length() {
        let mut a = DigestAccumulator::<Sha256>::new();
        let mut b = DigestAccumulator::<Sha256>::new();
        a.record(None);
        b.record(None);
        b.record(None);
        let err = compare("a", a.finalize(), "b", b.finalize()).unwrap_err();
        assert_eq!(err, BenchError::TraversalLengthMismatch { left: 1, right: 2 });
    }

    #[test]
    fn test_compare_reports_mismatch() {
        let mut a = DigestAccumulator::<Sha256>::new();
        let mut b = DigestAccumulator::<Sha256>::new();
        a.record(Some(1));
        b.record(Some(2));
        let report = compare("a", a.finalize(), "b", b.finalize()).unwrap();
        assert_eq!(report.verdict, Verdict::Mismatch);
        assert_ne!(report.left.hex(), report.right.hex());
    }

    #[test]
    fn test_empty_walk_matches() {
        let t = evens(10);
        let report = sequential_vs_batch(&t, &OracleConfig::new(0)).unwrap();
        assert!(report.is_match());
        assert_eq!(report.left.visited, 0);
    }
}
