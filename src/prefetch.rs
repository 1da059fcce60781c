//! Software prefetch hints for the bulk lookup path.
//!
//! The accelerated batch search hashes every key of a round first and issues
//! a prefetch for each target bucket before touching any of them, so the
//! cache misses of up to 64 independent buckets overlap instead of
//! serializing.
//!
//! - **`x86_64`**: `_mm_prefetch` with `_MM_HINT_T0`
//! - **`aarch64`**: `_prefetch` with read intent, locality 3
//! - **Other**: no-op

/// Hint that the cache line holding `ptr` will be read soon.
///
/// Null and dangling pointers are fine: a prefetch never faults.
#[inline(always)]
pub fn prefetch_read<T>(ptr: *const T) {
    if ptr.is_null() {
        return;
    }

    #[cfg(target_arch = "x86_64")]
    {
        // SAFETY: a prefetch is a hint; invalid addresses do not fault.
        unsafe {
            std::arch::x86_64::_mm_prefetch(ptr.cast::<i8>(), std::arch::x86_64::_MM_HINT_T0);
        }
    }

    #[cfg(target_arch = "aarch64")]
    {
        // SAFETY: a prefetch is a hint; invalid addresses do not fault.
        unsafe {
            std::arch::aarch64::_prefetch(
                ptr.cast::<i8>(),
                std::arch::aarch64::_PREFETCH_READ,
                std::arch::aarch64::_PREFETCH_LOCALITY3,
            );
        }
    }

    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    {
        let _ = ptr;
    }
}

/// Prefetch each element of `items` selected by `indices`.
///
/// Out-of-range indices are skipped.
#[inline]
pub fn prefetch_indexed<T>(items: &[T], indices: &[usize]) {
    for &i in indices {
        if let Some(item) = items.get(i) {
            prefetch_read(std::ptr::from_ref(item));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefetch_null_is_noop() {
        prefetch_read::<u64>(std::ptr::null());
    }

    #[test]
    fn test_prefetch_indexed_skips_out_of_range() {
        let buckets = [0u64; 32];
        prefetch_indexed(&buckets, &[0, 7, 31, 32, usize::MAX]);
    }
}
