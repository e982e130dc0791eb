//! Arena configuration parameters.
//!
//! The cache-line size is a build-time constant. It can be pinned with the
//! `STACKARENA_CACHE_LINE_SIZE` environment variable; otherwise it is 64
//! bytes on x86 and the natural maximum scalar alignment everywhere else.

use std::mem::align_of;

/// Largest alignment any primitive scalar needs on this target.
///
/// Used as the cache-line fallback so carve-outs are never less aligned
/// than the global allocator's own guarantee.
pub const MAX_SCALAR_ALIGN: usize = max_of(
    max_of(align_of::<u128>(), align_of::<f64>()),
    max_of(align_of::<usize>(), align_of::<u64>()),
);

/// Alignment and rounding granularity of every arena allocation, in bytes.
pub const CACHE_LINE_SIZE: usize = match option_env!("STACKARENA_CACHE_LINE_SIZE") {
    Some(value) => match parse_cache_line(value) {
        0 => DETECTED_CACHE_LINE_SIZE,
        size => size,
    },
    None => DETECTED_CACHE_LINE_SIZE,
};

#[cfg(any(target_arch = "x86_64", target_arch = "x86"))]
const DETECTED_CACHE_LINE_SIZE: usize = 64;

#[cfg(not(any(target_arch = "x86_64", target_arch = "x86")))]
const DETECTED_CACHE_LINE_SIZE: usize = MAX_SCALAR_ALIGN;

const fn max_of(a: usize, b: usize) -> usize {
    if a > b {
        a
    } else {
        b
    }
}

/// Parse a decimal cache-line size at compile time. Zero means "unknown".
const fn parse_cache_line(value: &str) -> usize {
    let bytes = value.as_bytes();
    assert!(
        !bytes.is_empty(),
        "STACKARENA_CACHE_LINE_SIZE must not be empty"
    );
    let mut size = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        let digit = bytes[i];
        assert!(
            digit.is_ascii_digit(),
            "STACKARENA_CACHE_LINE_SIZE must be a decimal integer"
        );
        size = match size.checked_mul(10) {
            Some(v) => match v.checked_add((digit - b'0') as usize) {
                Some(v) => v,
                None => panic!("STACKARENA_CACHE_LINE_SIZE overflows usize"),
            },
            None => panic!("STACKARENA_CACHE_LINE_SIZE overflows usize"),
        };
        i += 1;
    }
    if size != 0 {
        assert!(
            size.is_power_of_two() && size >= MAX_SCALAR_ALIGN,
            "STACKARENA_CACHE_LINE_SIZE must be a power of two no smaller than the maximum scalar alignment"
        );
    }
    size
}

/// Configuration for an [`Arena`](crate::Arena).
///
/// Only the starting point of the growth policy is tunable; the policy
/// itself (at least four allocations of the triggering size per block) is
/// fixed. The thread-local arena always uses [`ArenaConfig::default`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArenaConfig {
    /// Size in bytes of the first backing block request.
    ///
    /// Always a power of two and at least [`CACHE_LINE_SIZE`].
    pub initial_growth_target: usize,
}

impl ArenaConfig {
    /// Default initial growth target in bytes.
    pub const DEFAULT_INITIAL_GROWTH_TARGET: usize = 64;

    /// Create a config with the given initial growth target.
    ///
    /// The value is raised to the next power of two and to at least one
    /// cache line, so every backing block can hold at least one carve-out.
    pub fn new(initial_growth_target: usize) -> Self {
        let target = initial_growth_target
            .max(CACHE_LINE_SIZE)
            .checked_next_power_of_two()
            .unwrap_or(1 << (usize::BITS - 1));
        Self {
            initial_growth_target: target,
        }
    }
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_INITIAL_GROWTH_TARGET)
    }
}
