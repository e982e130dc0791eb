//! The block-chain arena.
//!
//! [`Arena`] owns the current chain of blocks, at most one detached spare
//! block, and the growth target. Allocation bumps the head of the chain;
//! release rewinds the block that owns the address, retiring every block
//! in front of it along the way.
//!
//! ```text
//! Arena
//! ├── current: Block ─previous─▶ Block ─previous─▶ Block ─▶ None
//! ├── spare:   Block (detached, largest retired block)
//! └── growth_target (monotonic, power of two)
//! ```

use std::ptr::NonNull;

use tracing::{debug, trace, warn};

use crate::block::Block;
use crate::config::ArenaConfig;
use crate::error::{AllocError, UnmanagedMemory};
use crate::sizing::{next_growth_target, round_to_cache_line};

/// Point-in-time view of an arena's bookkeeping.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ArenaStats {
    /// Number of blocks in the current chain.
    pub chain_blocks: usize,
    /// Sum of the capacities of the blocks in the current chain, in bytes.
    pub chain_capacity: usize,
    /// Sum of the bytes carved out of the blocks in the current chain.
    pub chain_used: usize,
    /// Capacity of the spare block, if one is held.
    pub spare_capacity: Option<usize>,
    /// Size of the next backing block request.
    pub growth_target: usize,
    /// Allocations handed out and not yet released.
    pub live_allocations: usize,
    /// Backing blocks obtained from the global allocator so far.
    pub blocks_created: u64,
}

/// A stack-discipline arena over a chain of cache-line aligned blocks.
///
/// Not thread-safe by construction (it holds raw block pointers, so it is
/// neither `Send` nor `Sync`). The crate keeps one per thread, see
/// [`crate::local`]; standalone instances are useful for tests and for
/// callers that manage their own scoping.
pub struct Arena {
    current: Option<Box<Block>>,
    spare: Option<Box<Block>>,
    growth_target: usize,
    live: usize,
    blocks_created: u64,
}

impl Arena {
    /// Create an empty arena. No memory is requested until the first
    /// allocation.
    pub fn new(config: ArenaConfig) -> Self {
        Self {
            current: None,
            spare: None,
            growth_target: config.initial_growth_target,
            live: 0,
            blocks_created: 0,
        }
    }

    /// Carve `requested` bytes, cache-line aligned.
    ///
    /// The request is rounded up to a whole number of cache lines; a
    /// zero-byte request takes one line so every live allocation has a
    /// distinct address inside its block. On failure the arena is left
    /// exactly as it was.
    pub fn allocate(&mut self, requested: usize) -> Result<NonNull<u8>, AllocError> {
        let size = round_to_cache_line(requested.max(1)).ok_or(AllocError::overflow(requested))?;
        let ptr = match self.bump(size) {
            Some(ptr) => ptr,
            None => self.grow(size, requested)?,
        };
        self.live += 1;
        Ok(ptr)
    }

    /// Try the current block, then the spare.
    fn bump(&mut self, size: usize) -> Option<NonNull<u8>> {
        if let Some(ptr) = self.current.as_mut().and_then(|block| block.allocate(size)) {
            return Some(ptr);
        }
        let ptr = self.spare.as_mut()?.allocate(size)?;
        let mut spare = self.spare.take()?;
        if let Some(current) = self.current.take() {
            spare.attach_previous(current);
        }
        debug!(capacity = spare.capacity(), "promoted spare block to current");
        self.current = Some(spare);
        Some(ptr)
    }

    /// Put a fresh block in front of the chain and carve `size` from it.
    fn grow(&mut self, size: usize, requested: usize) -> Result<NonNull<u8>, AllocError> {
        let target =
            next_growth_target(self.growth_target, size).ok_or(AllocError::overflow(requested))?;
        let mut block = Box::new(Block::new(target, requested)?);
        let ptr = block
            .allocate(size)
            .ok_or(AllocError::overflow(requested))?;

        self.growth_target = target;
        self.blocks_created += 1;
        if let Some(current) = self.current.take() {
            block.attach_previous(current);
        }
        trace!(
            capacity = target,
            requested,
            blocks_created = self.blocks_created,
            "grew arena chain"
        );
        self.current = Some(block);
        Ok(ptr)
    }

    /// Release the allocation at `ptr`.
    ///
    /// A null pointer is a no-op. Otherwise the block owning `ptr` is
    /// rewound to it, and every block in front of that one is retired: the
    /// largest retired block is kept as the spare, the rest are returned to
    /// the global allocator.
    ///
    /// Returns [`UnmanagedMemory`] if no block in the current chain owns
    /// `ptr`; the arena is not modified in that case.
    pub fn deallocate(&mut self, ptr: *mut u8) -> Result<(), UnmanagedMemory> {
        if ptr.is_null() {
            return Ok(());
        }
        if let Some(current) = self.current.as_mut() {
            if current.contains_and_rewind(ptr) {
                self.live = self.live.saturating_sub(1);
                return Ok(());
            }
        }
        if !self.chain_contains(ptr) {
            return Err(UnmanagedMemory {
                address: ptr as usize,
            });
        }

        while let Some(mut block) = self.current.take() {
            if block.contains_and_rewind(ptr) {
                self.current = Some(block);
                self.live = self.live.saturating_sub(1);
                return Ok(());
            }
            self.current = block.take_previous();
            self.retire(block);
        }
        // chain_contains guarantees the loop returns.
        Err(UnmanagedMemory {
            address: ptr as usize,
        })
    }

    /// Offer an exhausted, detached block to the spare slot.
    fn retire(&mut self, block: Box<Block>) {
        let keep = match &self.spare {
            None => true,
            Some(spare) => block.capacity() > spare.capacity(),
        };
        if keep {
            debug!(capacity = block.capacity(), "retired block kept as spare");
            self.spare = Some(block);
        } else {
            debug!(capacity = block.capacity(), "retired block released");
        }
    }

    fn chain_contains(&self, ptr: *const u8) -> bool {
        self.chain().any(|block| block.contains(ptr))
    }

    fn chain(&self) -> impl Iterator<Item = &Block> {
        std::iter::successors(self.current.as_deref(), |block| block.previous())
    }

    /// Allocations handed out and not yet released.
    pub fn live_allocations(&self) -> usize {
        self.live
    }

    /// Size of the next backing block request.
    pub fn growth_target(&self) -> usize {
        self.growth_target
    }

    /// Snapshot of the arena's bookkeeping.
    pub fn stats(&self) -> ArenaStats {
        let (chain_blocks, chain_capacity, chain_used) = self
            .chain()
            .fold((0, 0, 0), |(n, cap, used), block| {
                (n + 1, cap + block.capacity(), used + block.used())
            });
        ArenaStats {
            chain_blocks,
            chain_capacity,
            chain_used,
            spare_capacity: self.spare.as_ref().map(|block| block.capacity()),
            growth_target: self.growth_target,
            live_allocations: self.live,
            blocks_created: self.blocks_created,
        }
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::new(ArenaConfig::default())
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        if self.live != 0 {
            // Someone still points into the chain (typically a handle held
            // in a longer-lived thread-local). Leak rather than free.
            warn!(
                live_allocations = self.live,
                "arena dropped with live allocations; leaking block chain"
            );
            std::mem::forget(self.current.take());
        }
    }
}
