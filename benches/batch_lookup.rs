//! Batch lookup throughput using Divan.
//!
//! Run with: `cargo bench --bench batch_lookup`
//!
//! Compares single-key lookup, the reference batch path and the accelerated
//! batch path at every supported width, over a populated table.
#![allow(clippy::unwrap_used)]

use divan::{Bencher, black_box};
use kvprobe::batch::{Batch, lookup_batch_accelerated, lookup_batch_reference};
use kvprobe::profile::{generate, resolve};
use kvprobe::store::{BucketTable, DEFAULT_MEMORY_BUDGET, KvStore};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::LazyLock;

fn main() {
    divan::main();
}

const KEYS: u64 = 1 << 16;

/// Sequential profile over a quarter of the bucket count.
static TABLE: LazyLock<BucketTable> = LazyLock::new(|| {
    let profile = resolve(3).unwrap().scaled_to(KEYS);
    let mut table = BucketTable::init("bench", 1 << 18, DEFAULT_MEMORY_BUDGET).unwrap();
    let mut rng = StdRng::seed_from_u64(0);
    generate(&profile, &mut table, &mut rng).unwrap();
    table
});

// =============================================================================
// Single key
// =============================================================================

#[divan::bench]
fn single(bencher: Bencher) {
    let table = &*TABLE;
    let mut key = 0u64;
    bencher.bench_local(|| {
        key = (key + 1) % KEYS;
        black_box(table.lookup(black_box(key)))
    });
}

// =============================================================================
// Batches
// =============================================================================

fn run_batches<const N: usize>(bencher: Bencher, accelerated: bool) {
    let table = &*TABLE;
    let mut batch = Batch::<N>::starting_at(0);
    bencher.counter(divan::counter::ItemsCount::new(N)).bench_local(|| {
        let outcome = if accelerated {
            lookup_batch_accelerated(table, &mut batch)
        } else {
            lookup_batch_reference(table, &mut batch)
        };
        batch.shift_keys(N as u64);
        if batch.slots()[0].key >= KEYS {
            batch.reset_keys(0);
        }
        black_box(outcome)
    });
}

#[divan::bench(consts = [1, 8, 16, 32, 64])]
fn reference<const N: usize>(bencher: Bencher) {
    run_batches::<N>(bencher, false);
}

#[divan::bench(consts = [1, 8, 16, 32, 64])]
fn accelerated<const N: usize>(bencher: Bencher) {
    run_batches::<N>(bencher, true);
}

// =============================================================================
// Partial-miss rounds
// =============================================================================

#[divan::bench]
fn accelerated_with_absent_slot(bencher: Bencher) {
    let table = &*TABLE;
    let mut batch = Batch::<8>::starting_at(0);
    bencher.bench_local(|| {
        batch.overwrite_key(3, KEYS + 1_000);
        let outcome = lookup_batch_accelerated(table, &mut batch);
        batch.shift_keys(8);
        if batch.slots()[0].key >= KEYS {
            batch.reset_keys(0);
        }
        black_box(outcome)
    });
}
