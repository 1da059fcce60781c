//! Key-value store seam.
//!
//! The harness and oracle only talk to a store through [`KvStore`]. The crate
//! ships one implementation, [`BucketTable`], a bounded-index bucketed hash
//! table with 8-byte keys and 8-byte values.

use std::fmt as StdFmt;
use std::ops::{ControlFlow, Deref, DerefMut};

use thiserror::Error;

use crate::batch::{FoundBitmap, MAX_BATCH};
use crate::error::BenchError;

mod bucket_table;
pub mod probe;

pub use bucket_table::{BucketTable, DEFAULT_MEMORY_BUDGET, KVP_PER_PAGE, TableStats};

// ============================================================================
//  KvPair
// ============================================================================

/// One key-value record.
///
/// Batch buffers hold these directly: the key is the lookup input and the
/// value is overwritten in place on a hit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct KvPair {
    /// Lookup key.
    pub key: u64,
    /// Stored or written-back value.
    pub value: u64,
}

impl KvPair {
    /// Create a record.
    #[must_use]
    #[inline(always)]
    pub const fn new(key: u64, value: u64) -> Self {
        Self { key, value }
    }
}

// ============================================================================
//  BulkSlots
// ============================================================================

/// Slot buffer handed to [`KvStore::search_bulk`]: at most [`MAX_BATCH`]
/// records, so every slot has a bit in the returned [`FoundBitmap`].
#[derive(Debug, PartialEq, Eq)]
pub struct BulkSlots<'a>(&'a mut [KvPair]);

impl<'a> BulkSlots<'a> {
    /// Wrap `slots` for a bulk search.
    ///
    /// # Errors
    ///
    /// [`BenchError::CapacityMisuse`] if `slots` holds more than
    /// [`MAX_BATCH`] records.
    pub fn new(slots: &'a mut [KvPair]) -> Result<Self, BenchError> {
        if slots.len() > MAX_BATCH {
            return Err(BenchError::CapacityMisuse {
                requested: u32::try_from(slots.len()).unwrap_or(u32::MAX),
                capacity: MAX_BATCH,
            });
        }
        Ok(Self(slots))
    }

    /// Wrap a slice whose length the caller already bounds by [`MAX_BATCH`].
    #[inline(always)]
    pub(crate) fn bounded(slots: &'a mut [KvPair]) -> Self {
        debug_assert!(slots.len() <= MAX_BATCH);
        Self(slots)
    }
}

impl Deref for BulkSlots<'_> {
    type Target = [KvPair];

    #[inline(always)]
    fn deref(&self) -> &[KvPair] {
        self.0
    }
}

impl DerefMut for BulkSlots<'_> {
    #[inline(always)]
    fn deref_mut(&mut self) -> &mut [KvPair] {
        self.0
    }
}

// ============================================================================
//  StoreError
// ============================================================================

/// Errors raised by a store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Bucket count was zero.
    #[error("bucket count must be non-zero, got {requested}")]
    InvalidBucketCount {
        /// Count the caller asked for.
        requested: u64,
    },

    /// Bucket count exceeds the largest index the table can address.
    #[error("bucket count {requested} exceeds the maximum of {max}")]
    TooManyBuckets {
        /// Count the caller asked for.
        requested: u64,
        /// Largest supported count.
        max: u64,
    },

    /// The bucket array alone does not fit in the memory budget.
    #[error("bucket array needs {needed} bytes but the budget is {budget}")]
    BudgetTooSmall {
        /// Bytes the bucket array needs.
        needed: u64,
        /// Caller-supplied budget.
        budget: u64,
    },

    /// Growing a bucket page run would exceed the memory budget.
    #[error("memory budget of {budget} bytes exhausted")]
    OutOfMemory {
        /// Caller-supplied budget.
        budget: u64,
    },
}

// ============================================================================
//  KvStore
// ============================================================================

/// Contract the benchmark core needs from a key-value store.
///
/// Lookups take `&self`; the store is only mutated while the catalog
/// populates it, before any measurement starts.
pub trait KvStore {
    /// Look up `key`, returning its value when present.
    fn lookup(&self, key: u64) -> Option<u64>;

    /// Insert `key`, replacing the value if the key already exists.
    ///
    /// # Errors
    ///
    /// Returns an error when the store cannot make room for a new record.
    fn insert_or_update(&mut self, key: u64, value: u64) -> Result<(), StoreError>;

    /// Remove `key`. Returns `true` if it was present.
    fn delete(&mut self, key: u64) -> bool;

    /// Visit every record until `f` breaks.
    ///
    /// Returns `Break` if the walk was cut short.
    fn for_each<F>(&self, f: F) -> ControlFlow<()>
    where
        F: FnMut(KvPair) -> ControlFlow<()>;

    /// Number of records stored.
    fn len(&self) -> usize;

    /// `true` when no record is stored.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve every slot in `slots`, writing values back for hits.
    ///
    /// Bit `i` of the result is set when `slots[i].key` was found.
    /// [`BulkSlots`] caps the buffer at [`MAX_BATCH`], so every slot is
    /// resolved.
    ///
    /// The default issues one [`lookup`](Self::lookup) per slot. Stores with a
    /// faster bulk path override it; both must agree slot for slot.
    fn search_bulk(&self, mut slots: BulkSlots<'_>) -> FoundBitmap {
        let mut found = FoundBitmap::EMPTY;
        for (i, slot) in slots.iter_mut().enumerate() {
            if let Some(value) = self.lookup(slot.key) {
                slot.value = value;
                found.set(i);
            }
        }
        found
    }
}

impl StdFmt::Display for KvPair {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        write!(f, "{} => {}", self.key, self.value)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Minimal map-backed store that relies on the default bulk path.
    #[derive(Default)]
    struct MapStore(HashMap<u64, u64>);

    impl KvStore for MapStore {
        fn lookup(&self, key: u64) -> Option<u64> {
            self.0.get(&key).copied()
        }

        fn insert_or_update(&mut self, key: u64, value: u64) -> Result<(), StoreError> {
            self.0.insert(key, value);
            Ok(())
        }

        fn delete(&mut self, key: u64) -> bool {
            self.0.remove(&key).is_some()
        }

        fn for_each<F>(&self, mut f: F) -> ControlFlow<()>
        where
            F: FnMut(KvPair) -> ControlFlow<()>,
        {
            for (&key, &value) in &self.0 {
                f(KvPair::new(key, value))?;
            }
            ControlFlow::Continue(())
        }

        fn len(&self) -> usize {
            self.0.len()
        }
    }

    #[test]
    fn test_default_search_bulk_writes_back_hits() {
        let mut store = MapStore::default();
        store.insert_or_update(1, 10).unwrap();
        store.insert_or_update(3, 30).unwrap();

        let mut slots = [
            KvPair::new(1, 0),
            KvPair::new(2, 99),
            KvPair::new(3, 0),
        ];
        let found = store.search_bulk(BulkSlots::new(&mut slots).unwrap());

        assert_eq!(found.bits(), 0b101);
        assert_eq!(slots[0].value, 10);
        assert_eq!(slots[1].value, 99, "miss keeps prior contents");
        assert_eq!(slots[2].value, 30);
    }

    #[test]
    fn test_default_search_bulk_empty() {
        let store = MapStore::default();
        assert!(store.is_empty());
        let mut none: [KvPair; 0] = [];
        let found = store.search_bulk(BulkSlots::new(&mut none).unwrap());
        assert_eq!(found.bits(), 0);
    }

    #[test]
    fn test_bulk_slots_capacity() {
        let mut full = [KvPair::default(); MAX_BATCH];
        assert_eq!(BulkSlots::new(&mut full).unwrap().len(), MAX_BATCH);

        let mut over = [KvPair::default(); MAX_BATCH + 1];
        assert_eq!(
            BulkSlots::new(&mut over).unwrap_err(),
            BenchError::CapacityMisuse {
                requested: 65,
                capacity: MAX_BATCH,
            }
        );
    }

    #[test]
    fn test_default_search_bulk_resolves_last_slot() {
        let mut store = MapStore::default();
        for k in 0..200 {
            store.insert_or_update(k, k + 1).unwrap();
        }
        let mut slots: Vec<KvPair> = (0..MAX_BATCH as u64).map(|k| KvPair::new(k, 0)).collect();
        let found = store.search_bulk(BulkSlots::new(&mut slots).unwrap());
        assert_eq!(found.count(), 64);
        assert_eq!(slots[63].value, 64);
    }

    #[test]
    fn test_kvpair_display() {
        assert_eq!(KvPair::new(4, 40).to_string(), "4 => 40");
    }
}
