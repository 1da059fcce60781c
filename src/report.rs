//! Plain-text rendering of run results.
//!
//! The perf table keeps the historical column layout so output can be pasted
//! straight into existing spreadsheets:
//!
//! ```text
//! Summary:@1000000 options,V0 as the baseline (rows: V0 V4 V5)
//! CPO  |---| MOPS  |---|Ratio for OPS|---|  Cycles |---|  Options  |
//! 41.00       70.73      100.00%           41234567          1000000
//! ...
//! -------------------------------------------------------------------|
//! ```

use std::fmt as StdFmt;

use crate::harness::{PerfSample, PerfTable};
use crate::oracle::{OracleReport, Verdict};
use crate::profile::WorkloadProfile;
use crate::store::TableStats;

const TABLE_HEAD: &str = "CPO  |---| MOPS  |---|Ratio for OPS|---|  Cycles |---|  Options  | ";
const TABLE_END: &str = "-------------------------------------------------------------------| ";

impl StdFmt::Display for PerfSample {
    #[allow(clippy::cast_precision_loss)]
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        write!(
            f,
            "[{}] x{} searched {} keys|cycles/op:{}|cycles:{}|hits:{}|mops:{:.2}",
            self.variant.tag(),
            self.width,
            self.ops,
            self.cycles_per_op(),
            self.cycles,
            self.hits,
            self.mops()
        )
    }
}

impl StdFmt::Display for PerfTable {
    #[allow(clippy::cast_precision_loss)]
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        let order: Vec<&str> = self.rows.iter().map(|r| r.sample.variant.tag()).collect();
        writeln!(
            f,
            "Summary:@{} options,{} as the baseline (rows: {})",
            self.baseline_ops(),
            self.baseline.tag(),
            order.join(" ")
        )?;
        writeln!(f, "{TABLE_HEAD}")?;
        for row in &self.rows {
            let s = &row.sample;
            writeln!(
                f,
                "{:.2}       {:.2}      {:.2}%           {}          {}",
                s.cycles_per_op() as f64,
                s.mops(),
                row.ratio_pct,
                s.cycles,
                s.ops
            )?;
        }
        write!(f, "{TABLE_END}")
    }
}

impl StdFmt::Display for OracleReport {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        write!(
            f,
            "{}|-> MATCH <-|{} ---[{}]",
            self.left_label, self.right_label, self.verdict
        )?;
        if self.verdict == Verdict::Mismatch {
            write!(
                f,
                "\n[{}]\n\t digest:{} ({} hits / {} keys)\n[{}]\n\t digest:{} ({} hits / {} keys)",
                self.left_label,
                self.left.hex(),
                self.left.hits,
                self.left.visited,
                self.right_label,
                self.right.hex(),
                self.right.hits,
                self.right.visited
            )?;
        }
        Ok(())
    }
}

/// Observed bucket usage next to what the profile expects.
#[derive(Debug, Clone, Copy)]
pub struct PopulationSummary<'a> {
    /// Profile that populated the store.
    pub profile: &'a WorkloadProfile,
    /// Store statistics after population.
    pub stats: TableStats,
}

impl StdFmt::Display for PopulationSummary<'_> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        writeln!(f, "item:{} (profile {})", self.profile.label, self.profile.id)?;
        writeln!(f, "{}", self.stats)?;
        write!(
            f,
            "expected active_buckets:{} bucket_usage_rate:{:.2}%",
            self.profile.expected_active_buckets,
            100.0 * self.profile.expected_occupancy
        )
    }
}

/// Registry listing, one profile per line.
#[derive(Debug, Clone, Copy)]
pub struct ProfileListing<'a>(pub &'a [WorkloadProfile]);

impl StdFmt::Display for ProfileListing<'_> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        writeln!(
            f,
            "{:>5}  {:<17} {:>18}  {:>18}  {:>27}  label",
            "id", "distribution", "elements", "buckets", "expected"
        )?;
        for profile in self.0 {
            writeln!(f, "{profile}")?;
        }
        Ok(())
    }
}
