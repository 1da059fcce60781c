//! Shared helpers for the integration tests.
//!
//! ```rust,ignore
//! mod common;
//!
//! #[test]
//! fn my_test() {
//!     common::init_tracing();
//!     let table = common::table_with(0..100, |k| k * 2);
//! }
//! ```
//!
//! Logging follows the binary: `RUST_LOG` filters, `KVPROBE_LOG_DIR` adds an
//! NDJSON file.

#![allow(dead_code)]

use std::collections::HashMap;
use std::ops::ControlFlow;

use kvprobe::store::{
    BucketTable, BulkSlots, DEFAULT_MEMORY_BUDGET, KvPair, KvStore, StoreError,
};

/// Install the crate's subscriber once per test binary.
pub fn init_tracing() {
    kvprobe::init_tracing();
}

/// Bucket table holding `keys`, each mapped to `value(key)`.
///
/// # Panics
/// If an insert fails.
#[allow(clippy::unwrap_used)]
pub fn table_with(keys: impl IntoIterator<Item = u64>, value: impl Fn(u64) -> u64) -> BucketTable {
    let mut table = BucketTable::init("test", 1 << 12, DEFAULT_MEMORY_BUDGET).unwrap();
    for key in keys {
        table.insert_or_update(key, value(key)).unwrap();
    }
    table
}

/// Store whose single-key lookup and bulk search disagree on one key.
///
/// `lookup` answers truthfully; `search_bulk` reports `bad_value` for
/// `liar_key`. Used to show the oracle notices.
pub struct LyingStore {
    inner: HashMap<u64, u64>,
    liar_key: u64,
    bad_value: u64,
}

impl LyingStore {
    /// Wrap `pairs`, lying about `liar_key` on the bulk path.
    pub fn new(pairs: impl IntoIterator<Item = (u64, u64)>, liar_key: u64, bad_value: u64) -> Self {
        Self {
            inner: pairs.into_iter().collect(),
            liar_key,
            bad_value,
        }
    }
}

impl KvStore for LyingStore {
    fn lookup(&self, key: u64) -> Option<u64> {
        self.inner.get(&key).copied()
    }

    fn insert_or_update(&mut self, key: u64, value: u64) -> Result<(), StoreError> {
        self.inner.insert(key, value);
        Ok(())
    }

    fn delete(&mut self, key: u64) -> bool {
        self.inner.remove(&key).is_some()
    }

    fn for_each<F>(&self, mut f: F) -> ControlFlow<()>
    where
        F: FnMut(KvPair) -> ControlFlow<()>,
    {
        for (&key, &value) in &self.inner {
            f(KvPair::new(key, value))?;
        }
        ControlFlow::Continue(())
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn search_bulk(&self, mut slots: BulkSlots<'_>) -> kvprobe::FoundBitmap {
        let mut found = kvprobe::FoundBitmap::EMPTY;
        for (i, slot) in slots.iter_mut().enumerate() {
            if let Some(value) = self.lookup(slot.key) {
                slot.value = if slot.key == self.liar_key { self.bad_value } else { value };
                found.set(i);
            }
        }
        found
    }
}
