//! `kvprobe` command line.
//!
//! ```bash
//! kvprobe 4                    # profile 4, every variant, both oracles
//! kvprobe 34 random none       # random-access comparison, no oracle
//! kvprobe 1059 4 0 --cold      # V4 only, sequential oracle, cold caches
//! RUST_LOG=kvprobe=debug kvprobe 20
//! ```

use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use kvprobe::config::DEFAULT_CALIBRATION;
use kvprobe::harness::StartMode;
use kvprobe::report::ProfileListing;
use kvprobe::{BatchWidth, ConsistencySelector, LookupSelector, RunConfig};

#[derive(Parser, Debug)]
#[command(name = "kvprobe")]
#[command(version, about = "Batch-lookup benchmark and consistency oracle for a bucketed hash table")]
struct Cli {
    /// Workload profile id (see --list-profiles)
    #[arg(required_unless_present = "list_profiles")]
    profile_id: Option<u32>,

    /// Lookup variants: all|255, single|0, accelerated|4, reference|5, random|6, none
    #[arg(default_value = "all")]
    lookup: LookupSelector,

    /// Oracle comparisons: all|255, sequential|0, batch|1, none
    #[arg(default_value = "all")]
    consistency: ConsistencySelector,

    /// Skip the warm-up pass before each timed pass
    #[arg(long)]
    cold: bool,

    /// RNG seed (default: seconds since the Unix epoch)
    #[arg(long)]
    seed: Option<u64>,

    /// Batch width: 1, 8, 16, 32 or 64
    #[arg(long, default_value = "8")]
    width: BatchWidth,

    /// Lookups per timed pass (default: the profile's element count)
    #[arg(long)]
    ops: Option<u64>,

    /// Keys per oracle path (default: 8 x the profile's element count)
    #[arg(long)]
    oracle_keys: Option<u64>,

    /// Store memory budget in GiB
    #[arg(long, default_value = "32")]
    memory_budget_gib: u64,

    /// Clock calibration window in milliseconds
    #[arg(long, default_value_t = DEFAULT_CALIBRATION.as_millis() as u64)]
    calibrate_ms: u64,

    /// Assume this counter frequency instead of calibrating
    #[arg(long)]
    clock_hz: Option<f64>,

    /// Print the profile registry and exit
    #[arg(long)]
    list_profiles: bool,
}

impl Cli {
    fn run_config(&self, profile_id: u32) -> Result<RunConfig> {
        let memory_budget = self
            .memory_budget_gib
            .checked_mul(1 << 30)
            .context("memory budget overflows u64")?;
        Ok(RunConfig {
            profile_id,
            lookup: self.lookup,
            consistency: self.consistency,
            start: if self.cold { StartMode::Cold } else { StartMode::Warm },
            seed: self.seed,
            width: self.width,
            ops: self.ops,
            oracle_keys: self.oracle_keys,
            memory_budget,
            calibration: Duration::from_millis(self.calibrate_ms),
            clock_hz: self.clock_hz,
        })
    }
}

fn run(cli: &Cli) -> Result<()> {
    if cli.list_profiles {
        print!("{}", ProfileListing(kvprobe::profile::profiles()));
        return Ok(());
    }

    let profile_id = cli.profile_id.context("a profile id is required")?;
    let config = cli.run_config(profile_id)?;
    let summary =
        kvprobe::execute(&config).with_context(|| format!("profile {profile_id} failed"))?;
    print!("{summary}");

    #[cfg(feature = "tracing")]
    if !summary.consistent() {
        tracing::warn!(profile = profile_id, "consistency check reported a mismatch");
    }
    Ok(())
}

fn main() -> ExitCode {
    kvprobe::init_tracing();
    let cli = Cli::parse();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            #[cfg(feature = "tracing")]
            tracing::error!("run aborted: {e:#}");
            eprintln!("kvprobe: {e:#}");
            ExitCode::FAILURE
        }
    }
}
