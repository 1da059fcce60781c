//! Batch lookup: resolve up to 64 keys per call.
//!
//! A [`Batch<N>`] is a fixed array of `N` key slots plus an active mask. The
//! mask's population count decides how many *leading* slots take part in a
//! lookup: a mask of `0b1010` activates slots 0 and 1, not 1 and 3. To keep
//! `found & !mask == 0` true, [`Batch::set_mask`] stores the normalized
//! leading run rather than the caller's bits.
//!
//! Two variants resolve a batch:
//! - [`lookup_batch_reference`]: one [`KvStore::lookup`] per active slot
//! - [`lookup_batch_accelerated`]: the store's bulk path
//!   ([`KvStore::search_bulk`])
//!
//! Both write hit values back into their slots and must agree bit for bit.

use std::fmt as StdFmt;
use std::str::FromStr;

use crate::error::BenchError;
use crate::store::{BulkSlots, KvPair, KvStore};

/// Largest supported batch width.
pub const MAX_BATCH: usize = 64;

/// Mask selecting the low `count` slots.
#[must_use]
#[inline(always)]
pub const fn prefix_mask(count: u32) -> u64 {
    match count {
        0 => 0,
        64.. => u64::MAX,
        n => (1u64 << n) - 1,
    }
}

// ============================================================================
//  FoundBitmap
// ============================================================================

/// Bit `i` set means slot `i`'s key was present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FoundBitmap(u64);

impl FoundBitmap {
    /// No slot found.
    pub const EMPTY: Self = Self(0);

    /// Wrap raw bits.
    #[must_use]
    #[inline(always)]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Raw bits.
    #[must_use]
    #[inline(always)]
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Mark slot `slot` as found.
    #[inline(always)]
    pub fn set(&mut self, slot: usize) {
        debug_assert!(slot < MAX_BATCH, "slot {slot} out of range");
        self.0 |= 1u64 << slot;
    }

    /// Whether slot `slot` was found.
    #[must_use]
    #[inline(always)]
    pub const fn contains(self, slot: usize) -> bool {
        slot < MAX_BATCH && (self.0 >> slot) & 1 == 1
    }

    /// Number of found slots.
    #[must_use]
    #[inline(always)]
    pub const fn count(self) -> u32 {
        self.0.count_ones()
    }

    /// `true` when no slot was found.
    #[must_use]
    #[inline(always)]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Found slot indices in ascending order.
    #[must_use]
    #[inline(always)]
    pub const fn iter(self) -> SetBits {
        SetBits(self.0)
    }
}

impl IntoIterator for FoundBitmap {
    type Item = usize;
    type IntoIter = SetBits;

    fn into_iter(self) -> SetBits {
        self.iter()
    }
}

impl StdFmt::Binary for FoundBitmap {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        StdFmt::Binary::fmt(&self.0, f)
    }
}

/// Iterator over set bit positions, lowest first.
#[derive(Debug, Clone)]
pub struct SetBits(u64);

impl Iterator for SetBits {
    type Item = usize;

    #[inline(always)]
    fn next(&mut self) -> Option<usize> {
        if self.0 == 0 {
            return None;
        }
        let bit = self.0.trailing_zeros() as usize;
        self.0 &= self.0 - 1;
        Some(bit)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.0.count_ones() as usize;
        (n, Some(n))
    }
}

impl ExactSizeIterator for SetBits {}

/// Result of one batch lookup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Slots whose key was present.
    pub found: FoundBitmap,
    /// `found.count()`.
    pub hits: u32,
}

// ============================================================================
//  BatchWidth
// ============================================================================

/// Runtime choice of batch width, mapped onto `Batch<N>` by the callers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum BatchWidth {
    /// One slot: single-key semantics through the batch API.
    X1,
    /// 8 slots.
    #[default]
    X8,
    /// 16 slots.
    X16,
    /// 32 slots.
    X32,
    /// 64 slots.
    X64,
}

impl BatchWidth {
    /// Every supported width, narrowest first.
    pub const ALL: [Self; 5] = [Self::X1, Self::X8, Self::X16, Self::X32, Self::X64];

    /// Slots per batch.
    #[must_use]
    pub const fn slots(self) -> usize {
        match self {
            Self::X1 => 1,
            Self::X8 => 8,
            Self::X16 => 16,
            Self::X32 => 32,
            Self::X64 => 64,
        }
    }
}

impl TryFrom<usize> for BatchWidth {
    type Error = BenchError;

    fn try_from(width: usize) -> Result<Self, BenchError> {
        Self::ALL
            .into_iter()
            .find(|w| w.slots() == width)
            .ok_or(BenchError::UnsupportedWidth { width })
    }
}

impl FromStr for BatchWidth {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self, BenchError> {
        let width = s.trim().parse::<usize>().map_err(|_| BenchError::UnknownSelector {
            kind: "width",
            value: s.to_string(),
        })?;
        Self::try_from(width)
    }
}

impl StdFmt::Display for BatchWidth {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        write!(f, "x{}", self.slots())
    }
}

// ============================================================================
//  Batch
// ============================================================================

/// Fixed-capacity batch of key slots with an active mask.
///
/// `N` must be 1, 8, 16, 32 or 64; any other width fails to compile.
///
/// # Example
///
/// ```rust
/// use kvprobe::batch::{Batch, lookup_batch_reference};
/// use kvprobe::store::{BucketTable, KvStore, DEFAULT_MEMORY_BUDGET};
///
/// let mut table = BucketTable::init("doc", 64, DEFAULT_MEMORY_BUDGET)?;
/// table.insert_or_update(2, 20)?;
///
/// let mut batch = Batch::<8>::starting_at(0);
/// let outcome = lookup_batch_reference(&table, &mut batch);
/// assert_eq!(outcome.found.bits(), 0b100);
/// assert_eq!(batch.slots()[2].value, 20);
/// # Ok::<(), kvprobe::store::StoreError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch<const N: usize> {
    slots: [KvPair; N],
    mask: u64,
}

impl<const N: usize> Batch<N> {
    const SUPPORTED_WIDTH: () = assert!(
        matches!(N, 1 | 8 | 16 | 32 | 64),
        "batch width must be 1, 8, 16, 32 or 64"
    );

    /// Slot capacity.
    pub const CAPACITY: usize = N;

    /// Zeroed slots, every slot active.
    #[must_use]
    pub const fn new() -> Self {
        let () = Self::SUPPORTED_WIDTH;
        Self {
            slots: [KvPair::new(0, 0); N],
            mask: prefix_mask(N as u32),
        }
    }

    /// Slots holding `first_key, first_key + 1, ...`, every slot active.
    #[must_use]
    pub fn starting_at(first_key: u64) -> Self {
        let mut batch = Self::new();
        batch.reset_keys(first_key);
        batch
    }

    /// Rewrite slot keys to `first_key + i`.
    #[inline]
    pub fn reset_keys(&mut self, first_key: u64) {
        for (i, slot) in self.slots.iter_mut().enumerate() {
            slot.key = first_key.wrapping_add(i as u64);
        }
    }

    /// Add `step` to every slot key.
    #[inline]
    pub fn shift_keys(&mut self, step: u64) {
        for slot in &mut self.slots {
            slot.key = slot.key.wrapping_add(step);
        }
    }

    /// Overwrite one slot's key. Returns `false` (and does nothing) when
    /// `slot` is beyond the capacity.
    #[inline]
    pub fn overwrite_key(&mut self, slot: usize, key: u64) -> bool {
        match self.slots.get_mut(slot) {
            Some(s) => {
                s.key = key;
                true
            }
            None => false,
        }
    }

    /// Select the active slots.
    ///
    /// Only the population count of `mask` matters; the stored mask is the
    /// low `popcount(mask)` bits.
    ///
    /// # Errors
    ///
    /// [`BenchError::CapacityMisuse`] if `mask` selects more than `N` slots.
    /// The batch is left unchanged.
    pub fn set_mask(&mut self, mask: u64) -> Result<(), BenchError> {
        let requested = mask.count_ones();
        if requested as usize > N {
            return Err(BenchError::CapacityMisuse {
                requested,
                capacity: N,
            });
        }
        self.mask = prefix_mask(requested);
        Ok(())
    }

    /// Activate the first `count` slots.
    ///
    /// # Errors
    ///
    /// [`BenchError::CapacityMisuse`] if `count > N`.
    pub fn set_active(&mut self, count: usize) -> Result<(), BenchError> {
        if count > N {
            return Err(BenchError::CapacityMisuse {
                requested: u32::try_from(count).unwrap_or(u32::MAX),
                capacity: N,
            });
        }
        self.mask = prefix_mask(count as u32);
        Ok(())
    }

    /// Active mask (always a low run of bits).
    #[must_use]
    #[inline(always)]
    pub const fn mask(&self) -> u64 {
        self.mask
    }

    /// Number of active leading slots.
    #[must_use]
    #[inline(always)]
    pub const fn active_len(&self) -> usize {
        self.mask.count_ones() as usize
    }

    /// All slots.
    #[must_use]
    #[inline(always)]
    pub const fn slots(&self) -> &[KvPair; N] {
        &self.slots
    }

    /// All slots, mutably.
    #[inline(always)]
    pub fn slots_mut(&mut self) -> &mut [KvPair; N] {
        &mut self.slots
    }

    /// The active leading slots.
    #[must_use]
    #[inline(always)]
    pub fn active_slots(&self) -> &[KvPair] {
        &self.slots[..self.active_len()]
    }

    /// The active leading slots, mutably.
    #[inline(always)]
    pub fn active_slots_mut(&mut self) -> &mut [KvPair] {
        let n = self.active_len();
        &mut self.slots[..n]
    }
}

impl<const N: usize> Default for Batch<N> {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
//  Lookup variants
// ============================================================================

/// Resolve the active slots with one store lookup each.
///
/// This is the ground truth the accelerated path is checked against.
#[inline]
pub fn lookup_batch_reference<S: KvStore, const N: usize>(
    store: &S,
    batch: &mut Batch<N>,
) -> BatchOutcome {
    let mut found = FoundBitmap::EMPTY;
    let mut hits = 0;
    for (i, slot) in batch.active_slots_mut().iter_mut().enumerate() {
        if let Some(value) = store.lookup(slot.key) {
            slot.value = value;
            found.set(i);
            hits += 1;
        }
    }
    BatchOutcome { found, hits }
}

/// Resolve the active slots through the store's bulk search.
#[inline]
pub fn lookup_batch_accelerated<S: KvStore, const N: usize>(
    store: &S,
    batch: &mut Batch<N>,
) -> BatchOutcome {
    let found = store.search_bulk(BulkSlots::bounded(batch.active_slots_mut()));
    BatchOutcome {
        found,
        hits: found.count(),
    }
}

/// Which batch implementation to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BatchVariant {
    /// [`lookup_batch_reference`].
    Reference,
    /// [`lookup_batch_accelerated`].
    Accelerated,
}

impl BatchVariant {
    /// Run this variant over `batch`.
    #[inline]
    pub fn lookup<S: KvStore, const N: usize>(
        self,
        store: &S,
        batch: &mut Batch<N>,
    ) -> BatchOutcome {
        match self {
            Self::Reference => lookup_batch_reference(store, batch),
            Self::Accelerated => lookup_batch_accelerated(store, batch),
        }
    }

    /// Short name used in reports.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Reference => "batch-reference",
            Self::Accelerated => "batch-accelerated",
        }
    }
}
