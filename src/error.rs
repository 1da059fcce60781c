//! Error taxonomy for profile runs.
//!
//! Only resolution and initialization failures stop a run. A lookup miss is
//! an unset found bit and a digest mismatch is a [`Verdict`], neither of
//! them is an error.
//!
//! [`Verdict`]: crate::oracle::Verdict

use thiserror::Error;

use crate::store::StoreError;

/// Errors surfaced by the catalog, batch buffers, oracle and run driver.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BenchError {
    /// No profile in the registry carries the requested id.
    #[error("no workload profile with id {id}")]
    ProfileNotFound {
        /// The id that failed to resolve.
        id: u32,
    },

    /// The store refused to initialize.
    #[error("store initialization failed: {0}")]
    StoreInit(#[source] StoreError),

    /// The store ran out of budget while the catalog was populating it.
    #[error("store rejected insert of key {key}: {source}")]
    StoreFull {
        /// Key whose insert failed.
        key: u64,
        /// Underlying store error.
        #[source]
        source: StoreError,
    },

    /// A batch or bulk search was asked to process more slots than it holds.
    #[error("{requested} slots requested but capacity is {capacity}")]
    CapacityMisuse {
        /// Number of slots requested (a mask's population count or a slice
        /// length).
        requested: u32,
        /// Fixed capacity of the batch buffer.
        capacity: usize,
    },

    /// A batch width outside {1, 8, 16, 32, 64} was requested.
    #[error("unsupported batch width {width} (expected 1, 8, 16, 32 or 64)")]
    UnsupportedWidth {
        /// The rejected width.
        width: usize,
    },

    /// A lookup or consistency selector did not name a known mode.
    #[error("unknown {kind} selector {value:?}")]
    UnknownSelector {
        /// Which selector was being parsed.
        kind: &'static str,
        /// The rejected text.
        value: String,
    },

    /// The two oracle paths did not visit the same number of keys, so their
    /// digests cannot be compared.
    #[error("oracle paths visited {left} and {right} keys")]
    TraversalLengthMismatch {
        /// Keys visited by the left path.
        left: u64,
        /// Keys visited by the right path.
        right: u64,
    },
}
