//! Workload profile catalog.
//!
//! A profile is a recipe for one population scenario: how many keys, how
//! they are distributed, and how many buckets the store is sized with. The
//! registry is a `static` table; [`resolve`] hands back a copy, so nothing a
//! run does can leak into the next one.
//!
//! | distribution | key for record `i` | value |
//! |---|---|---|
//! | [`Sequential`](Distribution::Sequential) | `i` | `i + 1 + 0x7FFF_FFFF_FFFF` |
//! | [`ModuloScattered`](Distribution::ModuloScattered) | `(i + 1_000_000·i) mod 12_208_745` | same |
//! | [`Quadratic`](Distribution::Quadratic) | `i²` | same |
//! | [`UniformRandom`](Distribution::UniformRandom) | uniform in `[0, 2³¹)` | `i` |
//! | [`ScaledSparse`](Distribution::ScaledSparse) | `i · element_count` | `i` |
//!
//! The expected bucket statistics in the registry were measured on the
//! reference store layout. They are printed next to the observed numbers
//! and never checked.

use std::fmt as StdFmt;

use rand::Rng;

use crate::error::BenchError;
use crate::store::KvStore;
use crate::tracing_helpers::debug_log;

/// Value offset shared by the first three distributions.
pub const VALUE_BASE: u64 = 0x7FFF_FFFF_FFFF;

/// Modulus of [`Distribution::ModuloScattered`].
pub const SCATTER_MODULUS: u64 = 12_208_745;

/// Exclusive upper bound of random keys (31-bit draws).
pub const RANDOM_KEY_LIMIT: u64 = 1 << 31;

/// Key placed in the perturbation slot of profile 1059. It lies past the
/// last sequential key, so it is never present.
pub const PARTIAL_MISS_PROBE: u64 = 1_001_000;

// ============================================================================
//  Distribution
// ============================================================================

/// Key generation rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Distribution {
    /// Dense keys `0..N`.
    Sequential,
    /// Keys folded by a prime-ish modulus; collides once N nears the modulus.
    ModuloScattered,
    /// Perfect squares; the gaps widen as `i` grows.
    Quadratic,
    /// Uniform 31-bit keys from the run's seeded generator.
    UniformRandom,
    /// Multiples of N.
    ScaledSparse,
}

impl Distribution {
    /// Key of record `i` in a population of `count`. `None` for
    /// [`UniformRandom`](Self::UniformRandom), whose keys come from the RNG.
    #[must_use]
    #[inline]
    pub const fn key_at(self, i: u64, count: u64) -> Option<u64> {
        match self {
            Self::Sequential => Some(i),
            Self::ModuloScattered => {
                Some(i.wrapping_add(i.wrapping_mul(1_000_000)) % SCATTER_MODULUS)
            }
            Self::Quadratic => Some(i.wrapping_mul(i)),
            Self::UniformRandom => None,
            Self::ScaledSparse => Some(i.wrapping_mul(count)),
        }
    }

    /// Value stored for record `i`.
    #[must_use]
    #[inline]
    pub const fn value_at(self, i: u64) -> u64 {
        match self {
            Self::Sequential | Self::ModuloScattered | Self::Quadratic => i + 1 + VALUE_BASE,
            Self::UniformRandom | Self::ScaledSparse => i,
        }
    }

    /// Short name used in listings.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::ModuloScattered => "modulo-scattered",
            Self::Quadratic => "quadratic",
            Self::UniformRandom => "uniform-random",
            Self::ScaledSparse => "scaled-sparse",
        }
    }
}

impl StdFmt::Display for Distribution {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
//  WorkloadProfile
// ============================================================================

/// One registry entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorkloadProfile {
    /// Registry key.
    pub id: u32,
    /// Key generation rule.
    pub distribution: Distribution,
    /// Records inserted; also the default operation count of a run.
    pub element_count: u64,
    /// Buckets requested from the store.
    pub target_bucket_count: u64,
    /// Active buckets measured on the reference layout.
    pub expected_active_buckets: u64,
    /// `active / total` buckets measured on the reference layout.
    pub expected_occupancy: f64,
    /// Human-readable tag.
    pub label: &'static str,
    /// Absent key written into batch slot 3 after every round, if any.
    pub absent_probe: Option<u64>,
}

impl WorkloadProfile {
    const fn new(
        id: u32,
        distribution: Distribution,
        element_count: u64,
        target_bucket_count: u64,
        expected_active_buckets: u64,
        expected_occupancy: f64,
        label: &'static str,
    ) -> Self {
        Self {
            id,
            distribution,
            element_count,
            target_bucket_count,
            expected_active_buckets,
            expected_occupancy,
            label,
            absent_probe: None,
        }
    }

    const fn with_absent_probe(mut self, key: u64) -> Self {
        self.absent_probe = Some(key);
        self
    }

    /// Same profile with a different population size.
    ///
    /// Tests use this to run a registry scenario at a scale that fits in a
    /// test process.
    #[must_use]
    pub const fn scaled_to(mut self, element_count: u64) -> Self {
        self.element_count = element_count;
        self
    }
}

impl StdFmt::Display for WorkloadProfile {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        write!(
            f,
            "{:>5}  {:<17} {:>9} elements  {:>10} buckets  expect {:>8} active ({:.4})  {}",
            self.id,
            self.distribution.name(),
            self.element_count,
            self.target_bucket_count,
            self.expected_active_buckets,
            self.expected_occupancy,
            self.label
        )
    }
}

// ============================================================================
//  Registry
// ============================================================================

use Distribution::{ModuloScattered, Quadratic, ScaledSparse, Sequential, UniformRandom};

const MIB: u64 = 1 << 20;
const HUGE: u64 = 500_000_000;

static PROFILES: &[WorkloadProfile] = &[
    // Sequential, 1e3 .. 1e7
    WorkloadProfile::new(1, Sequential, 1_000, MIB, 1_000, 0.001, "sequential 1e3"),
    WorkloadProfile::new(2, Sequential, 10_000, MIB, 10_000, 0.0095, "sequential 1e4"),
    WorkloadProfile::new(3, Sequential, 100_000, MIB, 100_000, 0.0954, "sequential 1e5"),
    WorkloadProfile::new(4, Sequential, 1_000_000, MIB, 100_000, 0.9537, "sequential 1e6"),
    WorkloadProfile::new(5, Sequential, 10_000_000, MIB, 1_000_000, 1.0, "sequential 1e7"),
    WorkloadProfile::new(6, Sequential, 3_000_000, MIB, 1_000_000, 1.0, "sequential 3e6"),
    WorkloadProfile::new(7, Sequential, 4_000_000, MIB, 1_000_000, 1.0, "sequential 4e6"),
    WorkloadProfile::new(8, Sequential, 5_000_000, MIB, 1_000_000, 1.0, "sequential 5e6"),
    WorkloadProfile::new(9, Sequential, 6_000_000, MIB, 1_000_000, 1.0, "sequential 6e6"),
    WorkloadProfile::new(10, Sequential, 7_000_000, MIB, 1_000, 0.001, "sequential 7e6"),
    // Modulo-scattered
    WorkloadProfile::new(11, ModuloScattered, 1_000, MIB, 1_000, 0.001, "scattered 1e3"),
    WorkloadProfile::new(12, ModuloScattered, 10_000, MIB, 9_978, 0.0095, "scattered 1e4"),
    WorkloadProfile::new(13, ModuloScattered, 100_000, MIB, 96_864, 0.0924, "scattered 1e5"),
    WorkloadProfile::new(14, ModuloScattered, 1_000_000, MIB, 665_289, 0.6345, "scattered 1e6"),
    WorkloadProfile::new(15, ModuloScattered, 10_000_000, MIB, 1_048_576, 1.0, "scattered 1e7"),
    // Quadratic
    WorkloadProfile::new(20, Quadratic, 2_000_000, MIB, 989_261, 0.9434, "quadratic 2e6"),
    WorkloadProfile::new(21, Quadratic, 3_000_000, MIB, 989_261, 0.9434, "quadratic 3e6"),
    WorkloadProfile::new(22, Quadratic, 4_000_000, MIB, 1_025_909, 0.9784, "quadratic 4e6"),
    WorkloadProfile::new(23, Quadratic, 5_000_000, MIB, 1_040_006, 0.9918, "quadratic 5e6"),
    WorkloadProfile::new(24, Quadratic, 6_000_000, MIB, 1_045_319, 0.9969, "quadratic 6e6"),
    WorkloadProfile::new(25, Quadratic, 7_000_000, MIB, 1_047_308, 0.9988, "quadratic 7e6"),
    WorkloadProfile::new(29, Quadratic, 7_000_000, MIB, 1_047_308, 0.9988, "quadratic 7e6 (alt)"),
    // Uniform random
    WorkloadProfile::new(31, UniformRandom, 1_000, MIB, 1_000, 0.001, "random 1e3"),
    WorkloadProfile::new(32, UniformRandom, 10_000, MIB, 9_949, 0.0095, "random 1e4"),
    WorkloadProfile::new(33, UniformRandom, 100_000, MIB, 95_208, 0.0908, "random 1e5"),
    WorkloadProfile::new(34, UniformRandom, 1_000_000, MIB, 644_486, 0.6146, "random 1e6"),
    WorkloadProfile::new(35, UniformRandom, 10_000_000, MIB, 1_048_500, 0.9999, "random 1e7"),
    WorkloadProfile::new(36, UniformRandom, 3_000_000, MIB, 1_048_500, 0.9999, "random 3e6"),
    // Scaled-sparse, bucket usage from ~10% to ~95%
    WorkloadProfile::new(40, ScaledSparse, 120_000, MIB, 114_195, 0.01089, "sparse 12e4"),
    WorkloadProfile::new(41, ScaledSparse, 250_000, MIB, 223_931, 0.2136, "sparse 25e4"),
    WorkloadProfile::new(42, ScaledSparse, 360_000, MIB, 305_228, 0.2911, "sparse 36e4"),
    WorkloadProfile::new(43, ScaledSparse, 500_000, MIB, 399_339, 0.3808, "sparse 5e5"),
    WorkloadProfile::new(44, ScaledSparse, 700_000, MIB, 510_995, 0.4873, "sparse 7e5"),
    WorkloadProfile::new(45, ScaledSparse, 1_000_000, MIB, 645_734, 0.6158, "sparse 1e6"),
    WorkloadProfile::new(46, ScaledSparse, 1_300_000, MIB, 748_349, 0.7137, "sparse 13e5"),
    WorkloadProfile::new(47, ScaledSparse, 1_900_000, MIB, 874_700, 0.8342, "sparse 19e5"),
    WorkloadProfile::new(48, ScaledSparse, 2_500_000, MIB, 953_081, 0.9089, "sparse 25e5"),
    WorkloadProfile::new(49, ScaledSparse, 3_500_000, MIB, 1_009_506, 0.9327, "sparse 35e5"),
    // Scaled-sparse over a huge bucket array. Needs tens of GiB.
    WorkloadProfile::new(50, ScaledSparse, 120_000, HUGE, 114_195, 0.01089, "sparse 12e4 huge"),
    WorkloadProfile::new(51, ScaledSparse, 250_000, HUGE, 114_195, 0.01089, "sparse 25e4 huge"),
    WorkloadProfile::new(52, ScaledSparse, 360_000, HUGE, 114_195, 0.01089, "sparse 36e4 huge"),
    WorkloadProfile::new(53, ScaledSparse, 500_000, HUGE, 114_195, 0.01089, "sparse 5e5 huge"),
    WorkloadProfile::new(54, ScaledSparse, 700_000, HUGE, 114_195, 0.01089, "sparse 7e5 huge"),
    WorkloadProfile::new(55, ScaledSparse, 1_300_000, HUGE, 114_195, 0.01089, "sparse 13e5 huge"),
    WorkloadProfile::new(56, ScaledSparse, 1_900_000, HUGE, 114_195, 0.01089, "sparse 19e5 huge"),
    WorkloadProfile::new(57, ScaledSparse, 2_500_000, HUGE, 114_195, 0.01089, "sparse 25e5 huge"),
    WorkloadProfile::new(59, ScaledSparse, 3_500_000, HUGE, 114_195, 0.01089, "sparse 35e5 huge"),
    // Sequential 1e6 with one guaranteed miss per batch round.
    WorkloadProfile::new(1059, Sequential, 1_000_000, MIB, 1_000, 0.001, "seq 1e6, partial miss")
        .with_absent_probe(PARTIAL_MISS_PROBE),
];

/// Every registered profile, in registry order.
#[must_use]
pub fn profiles() -> &'static [WorkloadProfile] {
    PROFILES
}

/// Look up a profile by id. The first entry carrying `id` wins.
///
/// # Errors
///
/// [`BenchError::ProfileNotFound`] when no entry carries `id`.
pub fn resolve(id: u32) -> Result<WorkloadProfile, BenchError> {
    PROFILES
        .iter()
        .find(|p| p.id == id)
        .copied()
        .ok_or(BenchError::ProfileNotFound { id })
}

// ============================================================================
//  Population
// ============================================================================

/// Insert `profile.element_count` records into `store`.
///
/// Random keys are drawn from `rng`, so a seeded generator reproduces the
/// same population. Duplicate random keys overwrite, which leaves the store
/// holding fewer records than inserts issued.
///
/// Returns the number of inserts issued.
///
/// # Errors
///
/// [`BenchError::StoreFull`] if the store rejects an insert.
pub fn generate<S, R>(
    profile: &WorkloadProfile,
    store: &mut S,
    rng: &mut R,
) -> Result<u64, BenchError>
where
    S: KvStore,
    R: Rng + ?Sized,
{
    let count = profile.element_count;
    let dist = profile.distribution;

    for i in 0..count {
        let key = match dist.key_at(i, count) {
            Some(key) => key,
            None => rng.gen_range(0..RANDOM_KEY_LIMIT),
        };
        store
            .insert_or_update(key, dist.value_at(i))
            .map_err(|source| BenchError::StoreFull { key, source })?;
    }

    debug_log!(
        profile = profile.id,
        distribution = %dist,
        inserts = count,
        stored = store.len(),
        "profile populated"
    );
    Ok(count)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashSet;

    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::store::{BucketTable, DEFAULT_MEMORY_BUDGET};

    fn small(id: u32, count: u64) -> WorkloadProfile {
        resolve(id).unwrap().scaled_to(count)
    }

    fn populate(profile: &WorkloadProfile, seed: u64) -> BucketTable {
        let mut t = BucketTable::init("profile-test", 4096, DEFAULT_MEMORY_BUDGET).unwrap();
        let mut rng = StdRng::seed_from_u64(seed);
        generate(profile, &mut t, &mut rng).unwrap();
        t
    }

    #[test]
    fn test_registry_ids_are_unique() {
        let mut seen = HashSet::new();
        for p in profiles() {
            assert!(seen.insert(p.id), "duplicate id {}", p.id);
        }
    }

    #[test]
    fn test_resolve_known_and_unknown() {
        let p = resolve(20).unwrap();
        assert_eq!(p.distribution, Distribution::Quadratic);
        assert_eq!(p.element_count, 2_000_000);
        assert_eq!(p.target_bucket_count, 1 << 20);

        assert_eq!(resolve(0).unwrap_err(), BenchError::ProfileNotFound { id: 0 });
        assert_eq!(resolve(58).unwrap_err(), BenchError::ProfileNotFound { id: 58 });
    }

    #[test]
    fn test_only_partial_miss_profile_has_probe() {
        for p in profiles() {
            if p.id == 1059 {
                assert_eq!(p.absent_probe, Some(PARTIAL_MISS_PROBE));
                assert!(PARTIAL_MISS_PROBE >= p.element_count);
            } else {
                assert_eq!(p.absent_probe, None, "profile {}", p.id);
            }
        }
    }

    #[test]
    fn test_resolve_returns_a_copy() {
        let mut p = resolve(1).unwrap();
        p.element_count = 1;
        assert_eq!(resolve(1).unwrap().element_count, 1_000);
    }

    #[test]
    fn test_key_and_value_formulas() {
        assert_eq!(Sequential.key_at(5, 10), Some(5));
        assert_eq!(Sequential.value_at(5), 6 + VALUE_BASE);
        assert_eq!(ModuloScattered.key_at(13, 0), Some(13_000_013 % SCATTER_MODULUS));
        assert_eq!(Quadratic.key_at(1_999_999, 0), Some(1_999_999 * 1_999_999));
        assert_eq!(ScaledSparse.key_at(3, 120_000), Some(360_000));
        assert_eq!(ScaledSparse.value_at(3), 3);
        assert_eq!(UniformRandom.key_at(3, 10), None);
        assert_eq!(UniformRandom.value_at(3), 3);
    }

    #[test]
    fn test_generate_sequential() {
        let p = small(1, 500);
        let t = populate(&p, 0);
        assert_eq!(t.len(), 500);
        for i in 0..500 {
            assert_eq!(t.lookup(i), Some(i + 1 + VALUE_BASE));
        }
        assert_eq!(t.lookup(500), None);
    }

    #[test]
    fn test_generate_random_is_seeded() {
        let p = small(31, 1_000);
        let a = populate(&p, 42);
        let b = populate(&p, 42);

        let mut keys_a = Vec::new();
        let _ = a.for_each(|kv| {
            assert!(kv.key < RANDOM_KEY_LIMIT);
            keys_a.push(kv.key);
            std::ops::ControlFlow::Continue(())
        });
        assert!(!keys_a.is_empty());
        for k in keys_a {
            assert_eq!(a.lookup(k), b.lookup(k));
        }
    }

    #[test]
    fn test_generate_reports_store_full() {
        let p = small(1, 100);
        let budget = 1024;
        let mut t = BucketTable::init("tiny", 1, budget).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        let err = generate(&p, &mut t, &mut rng).unwrap_err();
        assert!(matches!(err, BenchError::StoreFull { .. }), "{err}");
    }

    #[test]
    fn test_empty_profile_generates_nothing() {
        let p = small(40, 0);
        let t = populate(&p, 0);
        assert!(t.is_empty());
    }
}
