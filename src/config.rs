//! Run configuration and mode selectors.
//!
//! Selectors parse either a name or the numeric code older scripts pass
//! (`255` for everything, `0`/`4`/`5`/`6` for lookups, `0`/`1` for
//! consistency).

use std::str::FromStr;
use std::time::Duration;

use crate::batch::BatchWidth;
use crate::error::BenchError;
use crate::harness::{AccessPattern, LookupVariant, StartMode};
use crate::store::DEFAULT_MEMORY_BUDGET;

// ============================================================================
//  LookupSelector
// ============================================================================

/// Which lookup variants the performance harness measures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum LookupSelector {
    /// V0, V4 and V5 with linear keys, plus the comparison table.
    #[default]
    All,
    /// V0 only.
    Single,
    /// V4 only.
    Accelerated,
    /// V5 only.
    Reference,
    /// V0, V4 and V5 with random keys, plus the comparison table.
    Random,
    /// No measurement.
    None,
}

impl LookupSelector {
    /// Variants to run, in report order.
    #[must_use]
    pub const fn variants(self) -> &'static [LookupVariant] {
        match self {
            Self::All | Self::Random => &LookupVariant::ALL,
            Self::Single => &[LookupVariant::Single],
            Self::Accelerated => &[LookupVariant::Accelerated],
            Self::Reference => &[LookupVariant::Reference],
            Self::None => &[],
        }
    }

    /// Key advance used by the measured variants.
    #[must_use]
    pub const fn access(self) -> AccessPattern {
        match self {
            Self::Random => AccessPattern::Random,
            _ => AccessPattern::Linear,
        }
    }

    /// Whether a baseline comparison table is printed.
    #[must_use]
    pub const fn compares(self) -> bool {
        matches!(self, Self::All | Self::Random)
    }
}

impl FromStr for LookupSelector {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self, BenchError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" | "255" => Ok(Self::All),
            "single" | "0" => Ok(Self::Single),
            "accelerated" | "4" => Ok(Self::Accelerated),
            "reference" | "5" => Ok(Self::Reference),
            "random" | "6" => Ok(Self::Random),
            "none" => Ok(Self::None),
            _ => Err(BenchError::UnknownSelector {
                kind: "lookup",
                value: s.to_owned(),
            }),
        }
    }
}

// ============================================================================
//  ConsistencySelector
// ============================================================================

/// Which oracle comparisons run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConsistencySelector {
    /// Both comparisons.
    #[default]
    All,
    /// Single-key path against accelerated batches.
    Sequential,
    /// Reference batches against accelerated batches.
    Batch,
    /// No oracle.
    None,
}

impl ConsistencySelector {
    /// Run the sequential-vs-batch comparison.
    #[must_use]
    pub const fn sequential(self) -> bool {
        matches!(self, Self::All | Self::Sequential)
    }

    /// Run the batch-vs-batch comparison.
    #[must_use]
    pub const fn batch(self) -> bool {
        matches!(self, Self::All | Self::Batch)
    }
}

impl FromStr for ConsistencySelector {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self, BenchError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" | "255" => Ok(Self::All),
            "sequential" | "0" => Ok(Self::Sequential),
            "batch" | "1" => Ok(Self::Batch),
            "none" => Ok(Self::None),
            _ => Err(BenchError::UnknownSelector {
                kind: "consistency",
                value: s.to_owned(),
            }),
        }
    }
}

// ============================================================================
//  RunConfig
// ============================================================================

/// Default calibration window of the cycle clock.
pub const DEFAULT_CALIBRATION: Duration = Duration::from_millis(250);

/// Everything one profile run needs.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    /// Registry id of the workload profile.
    pub profile_id: u32,
    /// Harness variants.
    pub lookup: LookupSelector,
    /// Oracle comparisons.
    pub consistency: ConsistencySelector,
    /// Cold or warm measurement.
    pub start: StartMode,
    /// RNG seed; wall-clock seconds when `None`.
    pub seed: Option<u64>,
    /// Batch width for the batched variants and the oracle.
    pub width: BatchWidth,
    /// Lookups per timed pass; the profile's element count when `None`.
    pub ops: Option<u64>,
    /// Keys per oracle path; `8 × element_count` when `None`.
    pub oracle_keys: Option<u64>,
    /// Store memory budget in bytes.
    pub memory_budget: u64,
    /// Sleep window for clock calibration.
    pub calibration: Duration,
    /// Skip calibration and assume this counter frequency.
    pub clock_hz: Option<f64>,
}

impl RunConfig {
    /// Defaults for `profile_id`.
    #[must_use]
    pub fn new(profile_id: u32) -> Self {
        Self {
            profile_id,
            ..Self::default()
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            profile_id: 1,
            lookup: LookupSelector::All,
            consistency: ConsistencySelector::All,
            start: StartMode::Warm,
            seed: None,
            width: BatchWidth::X8,
            ops: None,
            oracle_keys: None,
            memory_budget: DEFAULT_MEMORY_BUDGET,
            calibration: DEFAULT_CALIBRATION,
            clock_hz: None,
        }
    }
}
