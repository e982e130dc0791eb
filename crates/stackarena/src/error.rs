//! Arena-specific error types.
//!
//! Allocation failure is recoverable and travels through `Result`.
//! Releasing memory the arena does not own is a different kind of problem
//! (double free, foreign pointer, cross-thread release) and gets its own
//! type so it can never be confused with an allocation failure.

use std::error::Error;
use std::fmt;

/// Why an allocation request could not be satisfied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AllocFailure {
    /// Rounding the request or computing the next block size overflowed,
    /// or the resulting layout is not representable.
    SizeOverflow,
    /// The global allocator refused a backing block.
    OutOfMemory {
        /// Size in bytes of the backing block that was requested.
        block_size: usize,
    },
}

/// An allocation request failed. The arena state is unchanged.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AllocError {
    /// Number of bytes the caller asked for.
    pub requested: usize,
    /// What went wrong.
    pub reason: AllocFailure,
}

impl AllocError {
    pub(crate) fn overflow(requested: usize) -> Self {
        Self {
            requested,
            reason: AllocFailure::SizeOverflow,
        }
    }

    pub(crate) fn out_of_memory(requested: usize, block_size: usize) -> Self {
        Self {
            requested,
            reason: AllocFailure::OutOfMemory { block_size },
        }
    }
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason {
            AllocFailure::SizeOverflow => write!(
                f,
                "arena allocation of {} bytes failed: size overflow",
                self.requested
            ),
            AllocFailure::OutOfMemory { block_size } => write!(
                f,
                "arena allocation of {} bytes failed: backing block of {block_size} bytes unavailable",
                self.requested
            ),
        }
    }
}

impl Error for AllocError {}

/// A release targeted an address no block in the current chain owns.
///
/// This is a usage error, not a runtime condition: it is never retried.
/// The thread-local entry points turn it into a panic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UnmanagedMemory {
    /// The offending address.
    pub address: usize,
}

impl fmt::Display for UnmanagedMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "deallocated unmanaged memory at {:#x}", self.address)
    }
}

impl Error for UnmanagedMemory {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_mentions_block_size() {
        let err = AllocError::out_of_memory(100, 4096);
        let msg = err.to_string();
        assert!(msg.contains("100 bytes"));
        assert!(msg.contains("4096 bytes"));
    }

    #[test]
    fn unmanaged_display_is_hex() {
        let err = UnmanagedMemory { address: 0xdead };
        assert_eq!(err.to_string(), "deallocated unmanaged memory at 0xdead");
    }
}
