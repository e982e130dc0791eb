//! Low-level primitives for backing memory.
//!
//! The only two places the arena talks to the global allocator. Every
//! backing block is requested with cache-line alignment, so the address
//! handed back by the allocator is also the block's usable base.

#![allow(unsafe_code)]

use std::alloc::{self, Layout};
use std::ptr::NonNull;

use crate::config::CACHE_LINE_SIZE;
use crate::error::AllocError;

/// Layout of a backing block of `size` bytes.
pub(crate) fn block_layout(size: usize) -> Option<Layout> {
    if size == 0 {
        return None;
    }
    Layout::from_size_align(size, CACHE_LINE_SIZE).ok()
}

/// Obtain a cache-line aligned backing block of `layout.size()` bytes.
///
/// `requested` is only used to describe the failure.
pub(crate) fn acquire(layout: Layout, requested: usize) -> Result<NonNull<u8>, AllocError> {
    debug_assert!(layout.size() != 0);
    // SAFETY: `block_layout` never produces a zero-sized layout.
    let ptr = unsafe { alloc::alloc(layout) };
    NonNull::new(ptr).ok_or_else(|| AllocError::out_of_memory(requested, layout.size()))
}

/// Return a backing block to the global allocator.
///
/// # Safety
///
/// `ptr` must come from [`acquire`] called with the same `layout`, and must
/// not be released twice.
pub(crate) unsafe fn release(ptr: NonNull<u8>, layout: Layout) {
    // SAFETY: upheld by the caller.
    unsafe { alloc::dealloc(ptr.as_ptr(), layout) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_sized_layout_is_rejected() {
        assert!(block_layout(0).is_none());
    }

    #[test]
    fn acquired_block_is_cache_aligned() {
        let layout = block_layout(4096).unwrap();
        let ptr = acquire(layout, 4096).unwrap();
        assert_eq!(ptr.as_ptr() as usize % CACHE_LINE_SIZE, 0);
        // SAFETY: acquired above with the same layout.
        unsafe { release(ptr, layout) };
    }

    #[test]
    fn oversized_layout_is_rejected() {
        assert!(block_layout(usize::MAX).is_none());
    }
}
