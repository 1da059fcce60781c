//! One profile run from start to finish.
//!
//! Resolve the profile, build and populate a fresh store, measure the
//! selected variants, run the selected oracle comparisons, then release the
//! store. Nothing is printed here; the caller renders the [`RunSummary`].

use std::fmt as StdFmt;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::batch::BatchVariant;
use crate::clock::CycleClock;
use crate::config::RunConfig;
use crate::error::BenchError;
use crate::harness::{HarnessConfig, LookupVariant, PerfSample, PerfTable, run_variant};
use crate::oracle::{OracleConfig, OracleReport, batch_vs_batch, sequential_vs_batch};
use crate::profile::{WorkloadProfile, generate, resolve};
use crate::report::PopulationSummary;
use crate::store::{BucketTable, TableStats};
use crate::tracing_helpers::info_log;

/// Label given to the store of every run.
pub const STORE_LABEL: &str = "kvprobe";

/// Everything a run produced.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Profile that was run.
    pub profile: WorkloadProfile,
    /// Seed the run used.
    pub seed: u64,
    /// Inserts issued while populating.
    pub inserted: u64,
    /// Store statistics after population.
    pub stats: TableStats,
    /// One sample per measured variant.
    pub samples: Vec<PerfSample>,
    /// Comparison table, when the lookup selector asks for one.
    pub table: Option<PerfTable>,
    /// Oracle results in run order.
    pub oracle: Vec<OracleReport>,
}

impl RunSummary {
    /// `true` when every oracle comparison matched.
    #[must_use]
    pub fn consistent(&self) -> bool {
        self.oracle.iter().all(OracleReport::is_match)
    }
}

impl StdFmt::Display for RunSummary {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        writeln!(
            f,
            "{}",
            PopulationSummary {
                profile: &self.profile,
                stats: self.stats,
            }
        )?;
        writeln!(f, "seed:{} inserts:{}", self.seed, self.inserted)?;
        for sample in &self.samples {
            writeln!(f, "{sample}")?;
        }
        if let Some(table) = &self.table {
            writeln!(f, "{table}")?;
        }
        for report in &self.oracle {
            writeln!(f, "{report}")?;
        }
        Ok(())
    }
}

/// Seconds since the Unix epoch, or 0 if the clock is before it.
#[must_use]
pub fn wall_clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

/// Run the profile named by `cfg`.
///
/// # Errors
///
/// - [`BenchError::ProfileNotFound`] for an unknown id
/// - [`BenchError::StoreInit`] if the store cannot be sized
/// - [`BenchError::StoreFull`] if population exceeds the memory budget
/// - [`BenchError::TraversalLengthMismatch`] from the oracle guard
pub fn execute(cfg: &RunConfig) -> Result<RunSummary, BenchError> {
    let profile = resolve(cfg.profile_id)?;
    let seed = cfg.seed.unwrap_or_else(wall_clock_seed);
    info_log!(
        profile = profile.id,
        label = profile.label,
        seed,
        buckets = profile.target_bucket_count,
        "starting profile run"
    );

    let mut store = BucketTable::init(STORE_LABEL, profile.target_bucket_count, cfg.memory_budget)
        .map_err(BenchError::StoreInit)?;
    let mut rng = StdRng::seed_from_u64(seed);
    let inserted = generate(&profile, &mut store, &mut rng)?;
    let stats = store.stats();
    info_log!(
        elements = stats.elements,
        active_buckets = stats.active_buckets,
        expected_active_buckets = profile.expected_active_buckets,
        longest_chain = stats.longest_chain,
        "store populated"
    );

    let clock = match cfg.clock_hz {
        Some(hz) => CycleClock::fixed(hz),
        None => CycleClock::calibrate(cfg.calibration),
    };

    let harness = HarnessConfig {
        ops: cfg.ops.unwrap_or(profile.element_count),
        width: cfg.width,
        access: cfg.lookup.access(),
        seed,
        reseed: 0,
        start: cfg.start,
        absent_probe: profile.absent_probe,
    };
    let samples: Vec<PerfSample> = cfg
        .lookup
        .variants()
        .iter()
        .map(|&variant| run_variant(&store, variant, &harness, &clock))
        .collect();
    let table = cfg
        .lookup
        .compares()
        .then(|| PerfTable::new(&samples, LookupVariant::Single));

    let oracle_cfg = OracleConfig {
        key_count: cfg.oracle_keys.unwrap_or(profile.element_count.saturating_mul(8)),
        width: cfg.width,
        ..OracleConfig::new(0)
    };
    let mut oracle = Vec::new();
    if cfg.consistency.sequential() {
        oracle.push(sequential_vs_batch(&store, &oracle_cfg)?);
    }
    if cfg.consistency.batch() {
        oracle.push(batch_vs_batch(
            &store,
            &oracle_cfg,
            BatchVariant::Reference,
            BatchVariant::Accelerated,
        )?);
    }

    store.free();

    Ok(RunSummary {
        profile,
        seed,
        inserted,
        stats,
        samples,
        table,
        oracle,
    })
}
