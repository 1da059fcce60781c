//! `BucketTable` - a bounded-index bucketed hash table.
//!
//! Keys hash into a power-of-two bucket array. Each bucket owns a contiguous
//! run of pages of [`KVP_PER_PAGE`] records, stored as parallel key and value
//! arrays so a bucket's keys can be scanned with vector compares. A bucket's
//! page run doubles when it fills, and every page is charged against the
//! caller's memory budget.

use std::fmt as StdFmt;
use std::mem::size_of;
use std::ops::ControlFlow;

use super::{BulkSlots, KvPair, KvStore, StoreError, probe};
use crate::batch::{FoundBitmap, MAX_BATCH};
use crate::prefetch::{prefetch_indexed, prefetch_read};
use crate::tracing_helpers::{debug_log, trace_log};

/// Records per bucket page.
pub const KVP_PER_PAGE: usize = 4;

/// Budget used when the caller has no opinion: 32 GiB.
pub const DEFAULT_MEMORY_BUDGET: u64 = 32 << 30;

/// Largest bucket count accepted by [`BucketTable::init`].
const MAX_BUCKETS: u64 = 1 << 32;

const PAGE_BYTES: u64 = (KVP_PER_PAGE * size_of::<KvPair>()) as u64;

/// One bucket: parallel key/value arrays sized in whole pages.
#[derive(Debug, Default)]
struct Bucket {
    keys: Vec<u64>,
    values: Vec<u64>,
}

impl Bucket {
    #[inline(always)]
    fn pages(&self) -> usize {
        self.keys.capacity().div_ceil(KVP_PER_PAGE)
    }
}

/// Mixes a key into a bucket hash (64-bit finalizer from MurmurHash3).
#[inline(always)]
const fn hash_key(key: u64) -> u64 {
    let mut h = key;
    h ^= h >> 33;
    h = h.wrapping_mul(0xff51_afd7_ed55_8ccd);
    h ^= h >> 33;
    h = h.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    h ^= h >> 33;
    h
}

// ============================================================================
//  BucketTable
// ============================================================================

/// Bucketed hash table with 8-byte keys and 8-byte values.
///
/// # Example
///
/// ```rust
/// use kvprobe::store::{BucketTable, KvStore, DEFAULT_MEMORY_BUDGET};
///
/// let mut table = BucketTable::init("demo", 1024, DEFAULT_MEMORY_BUDGET)?;
/// table.insert_or_update(7, 70)?;
/// assert_eq!(table.lookup(7), Some(70));
/// assert_eq!(table.lookup(8), None);
/// # Ok::<(), kvprobe::store::StoreError>(())
/// ```
pub struct BucketTable {
    label: String,
    buckets: Vec<Bucket>,
    mask: u64,
    len: usize,
    memory_budget: u64,
    bytes_used: u64,
}

impl BucketTable {
    /// Create a table with at least `bucket_count` buckets.
    ///
    /// The count is rounded up to a power of two. The bucket array is charged
    /// against `memory_budget` up front; record pages are charged as they
    /// are allocated.
    ///
    /// # Errors
    ///
    /// - [`StoreError::InvalidBucketCount`] for a zero count
    /// - [`StoreError::TooManyBuckets`] above 2³² buckets
    /// - [`StoreError::BudgetTooSmall`] if the bucket array alone exceeds the
    ///   budget
    pub fn init(label: &str, bucket_count: u64, memory_budget: u64) -> Result<Self, StoreError> {
        if bucket_count == 0 {
            return Err(StoreError::InvalidBucketCount {
                requested: bucket_count,
            });
        }
        let too_many = StoreError::TooManyBuckets {
            requested: bucket_count,
            max: MAX_BUCKETS,
        };
        if bucket_count > MAX_BUCKETS {
            return Err(too_many);
        }

        let nbuckets = bucket_count.next_power_of_two();
        let header_bytes = nbuckets * size_of::<Bucket>() as u64;
        if header_bytes > memory_budget {
            return Err(StoreError::BudgetTooSmall {
                needed: header_bytes,
                budget: memory_budget,
            });
        }

        let slots = usize::try_from(nbuckets).map_err(|_| too_many)?;
        let mut buckets = Vec::with_capacity(slots);
        buckets.resize_with(slots, Bucket::default);

        debug_log!(label, nbuckets, memory_budget, "bucket table initialized");

        Ok(Self {
            label: label.to_owned(),
            buckets,
            mask: nbuckets - 1,
            len: 0,
            memory_budget,
            bytes_used: header_bytes,
        })
    }

    /// Name given at init.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Number of buckets (a power of two).
    #[must_use]
    #[inline(always)]
    pub fn bucket_count(&self) -> u64 {
        self.mask + 1
    }

    /// Bytes charged against the budget so far.
    #[must_use]
    pub const fn bytes_used(&self) -> u64 {
        self.bytes_used
    }

    /// Walk every bucket and summarize its usage.
    #[must_use]
    pub fn stats(&self) -> TableStats {
        let mut active = 0u64;
        let mut longest = 0usize;
        for bucket in &self.buckets {
            let n = bucket.keys.len();
            if n > 0 {
                active += 1;
                longest = longest.max(n);
            }
        }

        #[allow(clippy::cast_precision_loss)]
        let occupancy = active as f64 / self.bucket_count() as f64;

        TableStats {
            buckets: self.bucket_count(),
            active_buckets: active,
            occupancy,
            elements: self.len as u64,
            longest_chain: longest,
            bytes_used: self.bytes_used,
        }
    }

    /// Release the table.
    pub fn free(self) {
        debug_log!(label = %self.label, elements = self.len, "bucket table released");
        drop(self);
    }

    #[inline(always)]
    #[allow(clippy::cast_possible_truncation)] // mask < buckets.len(), which fits in usize
    const fn bucket_index(&self, key: u64) -> usize {
        (hash_key(key) & self.mask) as usize
    }
}

impl KvStore for BucketTable {
    #[inline]
    fn lookup(&self, key: u64) -> Option<u64> {
        let bucket = &self.buckets[self.bucket_index(key)];
        probe::find_key_scalar(&bucket.keys, key).map(|pos| bucket.values[pos])
    }

    fn insert_or_update(&mut self, key: u64, value: u64) -> Result<(), StoreError> {
        let idx = self.bucket_index(key);
        let bucket = &mut self.buckets[idx];

        if let Some(pos) = probe::find_key_scalar(&bucket.keys, key) {
            bucket.values[pos] = value;
            return Ok(());
        }

        if bucket.keys.len() == bucket.keys.capacity() {
            let grow = bucket.pages().max(1);
            let extra = grow as u64 * PAGE_BYTES;
            if self.bytes_used + extra > self.memory_budget {
                return Err(StoreError::OutOfMemory {
                    budget: self.memory_budget,
                });
            }
            bucket.keys.reserve_exact(grow * KVP_PER_PAGE);
            bucket.values.reserve_exact(grow * KVP_PER_PAGE);
            self.bytes_used += extra;
            trace_log!(bucket = idx, pages = bucket.pages(), "bucket page run grown");
        }

        bucket.keys.push(key);
        bucket.values.push(value);
        self.len += 1;
        Ok(())
    }

    fn delete(&mut self, key: u64) -> bool {
        let idx = self.bucket_index(key);
        let bucket = &mut self.buckets[idx];
        match probe::find_key_scalar(&bucket.keys, key) {
            Some(pos) => {
                bucket.keys.swap_remove(pos);
                bucket.values.swap_remove(pos);
                self.len -= 1;
                true
            }
            None => false,
        }
    }

    fn for_each<F>(&self, mut f: F) -> ControlFlow<()>
    where
        F: FnMut(KvPair) -> ControlFlow<()>,
    {
        for bucket in &self.buckets {
            for (&key, &value) in bucket.keys.iter().zip(&bucket.values) {
                f(KvPair::new(key, value))?;
            }
        }
        ControlFlow::Continue(())
    }

    #[inline]
    fn len(&self) -> usize {
        self.len
    }

    /// Three passes: hash every key, prefetch every bucket header and key
    /// page, then resolve each key with a vector compare over its page run.
    fn search_bulk(&self, mut slots: BulkSlots<'_>) -> FoundBitmap {
        let n = slots.len();

        let mut index = [0usize; MAX_BATCH];
        for (slot, idx) in slots.iter().zip(index.iter_mut()) {
            *idx = self.bucket_index(slot.key);
        }
        let index = &index[..n];

        prefetch_indexed(&self.buckets, index);
        for &b in index {
            prefetch_read(self.buckets[b].keys.as_ptr());
        }

        let mut found = FoundBitmap::EMPTY;
        for (i, (slot, &b)) in slots.iter_mut().zip(index).enumerate() {
            let bucket = &self.buckets[b];
            if let Some(pos) = probe::find_key(&bucket.keys, slot.key) {
                slot.value = bucket.values[pos];
                found.set(i);
            }
        }
        found
    }
}

impl StdFmt::Debug for BucketTable {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("BucketTable")
            .field("label", &self.label)
            .field("buckets", &self.bucket_count())
            .field("len", &self.len)
            .field("bytes_used", &self.bytes_used)
            .field("memory_budget", &self.memory_budget)
            .finish_non_exhaustive()
    }
}

// ============================================================================
//  TableStats
// ============================================================================

/// Bucket usage snapshot, for reporting only.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TableStats {
    /// Total buckets.
    pub buckets: u64,
    /// Buckets holding at least one record.
    pub active_buckets: u64,
    /// `active_buckets / buckets`.
    pub occupancy: f64,
    /// Records stored.
    pub elements: u64,
    /// Most records held by a single bucket.
    pub longest_chain: usize,
    /// Bytes charged against the budget.
    pub bytes_used: u64,
}

impl StdFmt::Display for TableStats {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        write!(
            f,
            "nbuckets:{} active_buckets:{} bucket_usage_rate:{:.2}% ",
            self.buckets,
            self.active_buckets,
            100.0 * self.occupancy,
        )?;
        write!(
            f,
            "elements:{} longest_bucket:{} bytes:{}",
            self.elements, self.longest_chain, self.bytes_used
        )
    }
}
