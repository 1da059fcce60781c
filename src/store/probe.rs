//! Exact-match probes over a bucket's key page.
//!
//! A bucket keeps its keys in one contiguous `u64` run, so finding a key is a
//! linear exact-match scan. The bulk path compares several keys per
//! instruction; the single-key path stays scalar.
//!
//! # Architecture Support
//!
//! - **`x86_64`** with AVX2: 4 keys per compare (runtime detection)
//! - **`x86_64`** with SSE4.1: 2 keys per compare (runtime detection)
//! - **Other**: scalar scan

/// Position of `target` in `keys`, using the widest vector unit available.
#[inline]
#[must_use]
pub fn find_key(keys: &[u64], target: u64) -> Option<usize> {
    #[cfg(target_arch = "x86_64")]
    {
        if is_x86_feature_detected!("avx2") {
            // SAFETY: AVX2 availability was just checked.
            return unsafe { x86::find_key_avx2(keys, target) };
        }
        if is_x86_feature_detected!("sse4.1") {
            // SAFETY: SSE4.1 availability was just checked.
            return unsafe { x86::find_key_sse41(keys, target) };
        }
        return find_key_scalar(keys, target);
    }

    #[cfg(not(target_arch = "x86_64"))]
    {
        find_key_scalar(keys, target)
    }
}

/// Position of `target` in `keys`, one comparison at a time.
#[inline]
#[must_use]
pub fn find_key_scalar(keys: &[u64], target: u64) -> Option<usize> {
    keys.iter().position(|&k| k == target)
}

#[cfg(target_arch = "x86_64")]
mod x86 {
    use std::arch::x86_64::{
        _mm_cmpeq_epi64, _mm_loadu_si128, _mm_movemask_epi8, _mm_set1_epi64x,
        _mm256_cmpeq_epi64, _mm256_loadu_si256, _mm256_movemask_epi8, _mm256_set1_epi64x,
    };

    use super::find_key_scalar;

    /// Four lanes per compare. The movemask yields 8 bits per matching lane.
    ///
    /// # Safety
    /// Caller must ensure AVX2 is available.
    #[inline]
    #[target_feature(enable = "avx2")]
    #[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
    pub unsafe fn find_key_avx2(keys: &[u64], target: u64) -> Option<usize> {
        let chunks = keys.chunks_exact(4);
        let tail = chunks.remainder();

        // SAFETY: every `chunk` is exactly 4 u64s (32 bytes) and loadu has no
        // alignment requirement.
        unsafe {
            let needle = _mm256_set1_epi64x(target as i64);
            for (n, chunk) in chunks.enumerate() {
                let lanes = _mm256_loadu_si256(chunk.as_ptr().cast());
                let mask = _mm256_movemask_epi8(_mm256_cmpeq_epi64(lanes, needle)) as u32;
                if mask != 0 {
                    return Some(n * 4 + (mask.trailing_zeros() / 8) as usize);
                }
            }
        }

        find_key_scalar(tail, target).map(|i| keys.len() - tail.len() + i)
    }

    /// Two lanes per compare.
    ///
    /// # Safety
    /// Caller must ensure SSE4.1 is available (`_mm_cmpeq_epi64`).
    #[inline]
    #[target_feature(enable = "sse4.1")]
    #[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
    pub unsafe fn find_key_sse41(keys: &[u64], target: u64) -> Option<usize> {
        let chunks = keys.chunks_exact(2);
        let tail = chunks.remainder();

        // SAFETY: every `chunk` is exactly 2 u64s (16 bytes).
        unsafe {
            let needle = _mm_set1_epi64x(target as i64);
            for (n, chunk) in chunks.enumerate() {
                let lanes = _mm_loadu_si128(chunk.as_ptr().cast());
                let mask = _mm_movemask_epi8(_mm_cmpeq_epi64(lanes, needle)) as u32;
                if mask != 0 {
                    return Some(n * 2 + (mask.trailing_zeros() / 8) as usize);
                }
            }
        }

        find_key_scalar(tail, target).map(|i| keys.len() - tail.len() + i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(not(miri))]
    fn test_find_key_empty() {
        assert_eq!(find_key(&[], 7), None);
        assert_eq!(find_key_scalar(&[], 7), None);
    }

    #[test]
    #[cfg(not(miri))]
    fn test_find_key_every_position() {
        // Covers full vector chunks and every tail length.
        for len in 1..=13u64 {
            let keys: Vec<u64> = (0..len).map(|i| i * 3 + 1).collect();
            for (i, &k) in keys.iter().enumerate() {
                assert_eq!(find_key(&keys, k), Some(i), "len={len}");
                assert_eq!(find_key_scalar(&keys, k), Some(i), "len={len}");
            }
            assert_eq!(find_key(&keys, 0), None, "len={len}");
        }
    }

    #[test]
    #[cfg(not(miri))]
    fn test_find_key_first_duplicate_wins() {
        let keys = [5u64, 9, 9, 9, 9, 9];
        assert_eq!(find_key(&keys, 9), Some(1));
    }

    #[test]
    #[cfg(not(miri))]
    fn test_find_key_high_bit_keys() {
        let keys = [u64::MAX, 1 << 63, 0];
        assert_eq!(find_key(&keys, 1 << 63), Some(1));
        assert_eq!(find_key(&keys, u64::MAX), Some(0));
    }
}
