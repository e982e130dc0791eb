//! Benchmark workloads for the stackarena allocator.
//!
//! Provides deterministic allocation patterns shared by the Criterion
//! benches:
//!
//! - [`request_sizes`]: seeded pseudo-random request sizes
//! - [`nested_scopes`]: recursive scopes, one slice per level (strict LIFO)
//! - [`sibling_churn`]: a long-lived allocation outliving grown siblings

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use stackarena::{StackBox, StackSlice};

/// Generate `n` deterministic request sizes in `1..=max_bytes`.
pub fn request_sizes(n: usize, max_bytes: usize, seed: u64) -> Vec<usize> {
    let max_bytes = max_bytes.max(1) as u64;
    (0..n as u64)
        .map(|i| {
            let h = seed
                .wrapping_mul(6364136223846793005)
                .wrapping_add(i.wrapping_mul(1442695040888963407));
            ((h >> 17) % max_bytes) as usize + 1
        })
        .collect()
}

/// Open one scope per entry of `sizes`, each holding a byte slice of that
/// size, and touch every level on the way back out.
///
/// Returns a checksum so the work cannot be optimised away.
pub fn nested_scopes(sizes: &[usize]) -> u64 {
    match sizes.split_first() {
        None => 0,
        Some((&size, rest)) => {
            let mut level = StackSlice::filled(size, 0u8);
            let inner = nested_scopes(rest);
            level[size - 1] = (inner & 0xff) as u8;
            inner.wrapping_add(level[size - 1] as u64 + size as u64)
        }
    }
}

/// Hold one small value while `rounds` batches of `siblings` slices of
/// `sibling_bytes` each are created and released in reverse.
pub fn sibling_churn(rounds: usize, siblings: usize, sibling_bytes: usize) -> u64 {
    let outer = StackBox::new(0u64);
    let mut total = *outer;
    for _ in 0..rounds {
        let batch: Vec<_> = (0..siblings)
            .map(|i| StackSlice::filled(sibling_bytes, i as u8))
            .collect();
        total += batch.iter().map(|s| s[0] as u64).sum::<u64>();
        for slice in batch.into_iter().rev() {
            drop(slice);
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_sizes_are_deterministic_and_bounded() {
        let a = request_sizes(64, 500, 42);
        let b = request_sizes(64, 500, 42);
        assert_eq!(a, b);
        assert!(a.iter().all(|&s| (1..=500).contains(&s)));
    }

    #[test]
    fn nested_scopes_releases_everything() {
        let sizes = request_sizes(32, 4096, 7);
        nested_scopes(&sizes);
        assert_eq!(stackarena::stats().live_allocations, 0);
    }

    #[test]
    fn sibling_churn_sums_indices() {
        // Each round contributes 0 + 1 + ... + 7.
        assert_eq!(sibling_churn(3, 8, 256), 3 * 28);
        assert_eq!(stackarena::stats().live_allocations, 0);
    }
}
