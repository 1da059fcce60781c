//! # kvprobe
//!
//! Batch-lookup benchmark and consistency oracle for a bucketed hash table.
//!
//! The crate answers two questions about a key-value store:
//!
//! 1. How much faster is a batched lookup than one key at a time, across
//!    populations of different size and collision pressure?
//! 2. Does the batched path return exactly what the single-key path returns?
//!
//! | Module | Role |
//! |--------|------|
//! | [`store`] | `KvStore` trait and the `BucketTable` implementation |
//! | [`profile`] | Static registry of workload profiles and their generators |
//! | [`batch`] | Fixed-width batch buffers and the two batch lookup variants |
//! | [`harness`] | Timed loops, key cursors, perf samples |
//! | [`oracle`] | Digest-based cross-check of two lookup paths |
//! | [`run`] | One profile run end to end |
//!
//! ## Example
//!
//! ```rust
//! use kvprobe::batch::{Batch, lookup_batch_accelerated};
//! use kvprobe::oracle::{sequential_vs_batch, OracleConfig};
//! use kvprobe::profile::{generate, resolve};
//! use kvprobe::store::{BucketTable, DEFAULT_MEMORY_BUDGET};
//! use rand::SeedableRng;
//!
//! let profile = resolve(1)?;
//! let mut table = BucketTable::init("doc", profile.target_bucket_count, DEFAULT_MEMORY_BUDGET)
//!     .map_err(kvprobe::BenchError::StoreInit)?;
//! let mut rng = rand::rngs::StdRng::seed_from_u64(1);
//! generate(&profile, &mut table, &mut rng)?;
//!
//! let mut batch = Batch::<8>::starting_at(0);
//! assert_eq!(lookup_batch_accelerated(&table, &mut batch).hits, 8);
//!
//! let report = sequential_vs_batch(&table, &OracleConfig::new(8_000))?;
//! assert!(report.is_match());
//! # Ok::<(), kvprobe::BenchError>(())
//! ```
//!
//! ## Features
//!
//! - `tracing` (default): debug and trace events from the store, catalog,
//!   harness and oracle. Install a subscriber with [`init_tracing`]. Without
//!   it `tracing` and `tracing-subscriber` are not linked and
//!   [`init_tracing`] does nothing.

#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
// Hot-path inlining is checked against the benches.
#![allow(clippy::inline_always)]

pub mod batch;
pub mod clock;
pub mod config;
pub mod error;
pub mod harness;
#[cfg(feature = "tracing")]
pub mod logging;
pub mod oracle;
pub mod profile;
pub mod report;
pub mod run;
pub mod store;

mod prefetch;
mod tracing_helpers;

pub use batch::{Batch, BatchOutcome, BatchVariant, BatchWidth, FoundBitmap, MAX_BATCH};
pub use config::{ConsistencySelector, LookupSelector, RunConfig};
pub use error::BenchError;
pub use harness::{LookupVariant, PerfSample, PerfTable};
#[cfg(feature = "tracing")]
pub use logging::init_tracing;
pub use oracle::{OracleReport, Verdict};
pub use profile::{Distribution, WorkloadProfile};
pub use run::{RunSummary, execute};
pub use store::{BucketTable, BulkSlots, KvPair, KvStore, StoreError};

/// No subscriber to install: built without the `tracing` feature.
#[cfg(not(feature = "tracing"))]
pub const fn init_tracing() {}

#[cfg(test)]
mod tests {
    #[test]
    fn test_init_tracing_with_or_without_feature() {
        crate::init_tracing();
        crate::init_tracing();
        crate::tracing_helpers::debug_log!(enabled = cfg!(feature = "tracing"), "macro expands");
    }
}
