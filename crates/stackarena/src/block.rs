//! Backing blocks and the single-owner block chain.
//!
//! A [`Block`] is one cache-line aligned backing allocation with a bump
//! cursor. Blocks form a chain through `previous`: each block exclusively
//! owns the one it was placed in front of, so dropping the head of a chain
//! releases the whole chain.

#![allow(unsafe_code)]

use std::alloc::Layout;
use std::fmt;
use std::ptr::NonNull;

use crate::error::AllocError;
use crate::raw;

/// A single contiguous backing allocation with bump allocation.
///
/// Metadata lives out of band: the backing memory holds payload only, and
/// every position inside it is expressed as an offset from `base`.
pub struct Block {
    /// Start of the backing allocation, cache-line aligned.
    base: NonNull<u8>,
    /// Layout the backing allocation was obtained with.
    layout: Layout,
    /// Bump cursor: offset of the next free byte.
    cursor: usize,
    /// The block this one was chained in front of.
    previous: Option<Box<Block>>,
}

impl Block {
    /// Obtain a new block of `capacity` bytes with no predecessor.
    ///
    /// `requested` is the caller-visible size that triggered the growth and
    /// is only used in the error.
    pub fn new(capacity: usize, requested: usize) -> Result<Self, AllocError> {
        let layout = raw::block_layout(capacity).ok_or(AllocError::overflow(requested))?;
        let base = raw::acquire(layout, requested)?;
        Ok(Self {
            base,
            layout,
            cursor: 0,
            previous: None,
        })
    }

    /// Bump-allocate `size` bytes.
    ///
    /// `size` must already be rounded to the cache line. Returns `None` if
    /// the remaining capacity is too small.
    #[inline]
    pub fn allocate(&mut self, size: usize) -> Option<NonNull<u8>> {
        if size > self.remaining() {
            return None;
        }
        let offset = self.cursor;
        self.cursor += size;
        // SAFETY: offset + size <= capacity, so `offset` is within the
        // backing allocation.
        Some(unsafe { self.base.add(offset) })
    }

    /// Offset of `ptr` from `base` if it falls inside this block.
    #[inline]
    fn offset_of(&self, ptr: *const u8) -> Option<usize> {
        let offset = (ptr as usize).wrapping_sub(self.base.as_ptr() as usize);
        (offset < self.capacity()).then_some(offset)
    }

    /// Whether `ptr` lies inside `[base, base + capacity)`.
    #[inline]
    pub fn contains(&self, ptr: *const u8) -> bool {
        self.offset_of(ptr).is_some()
    }

    /// If `ptr` lies inside this block, rewind the cursor to it and return
    /// `true`.
    ///
    /// The cursor only ever moves backward here. Releasing an address that
    /// is not the top of the stack restores capacity down to that address.
    #[inline]
    pub fn contains_and_rewind(&mut self, ptr: *const u8) -> bool {
        match self.offset_of(ptr) {
            Some(offset) => {
                if offset < self.cursor {
                    self.cursor = offset;
                }
                true
            }
            None => false,
        }
    }

    /// Detach and return the predecessor.
    pub fn take_previous(&mut self) -> Option<Box<Block>> {
        self.previous.take()
    }

    /// Link `other` (and its chain) behind this block.
    ///
    /// Any predecessor this block already had is chained behind the tail
    /// of `other`, so no block is dropped.
    pub fn attach_previous(&mut self, mut other: Box<Block>) {
        if let Some(existing) = self.previous.take() {
            let mut tail = &mut other;
            while tail.previous.is_some() {
                tail = tail.previous.as_mut().expect("checked by loop condition");
            }
            tail.previous = Some(existing);
        }
        self.previous = Some(other);
    }

    /// The predecessor, if any.
    pub fn previous(&self) -> Option<&Block> {
        self.previous.as_deref()
    }

    /// Usable size in bytes.
    pub fn capacity(&self) -> usize {
        self.layout.size()
    }

    /// Bytes currently carved out.
    pub fn used(&self) -> usize {
        self.cursor
    }

    /// Bytes still available.
    pub fn remaining(&self) -> usize {
        self.capacity() - self.cursor
    }

    /// Start of the usable region.
    pub fn base(&self) -> NonNull<u8> {
        self.base
    }
}

impl Drop for Block {
    fn drop(&mut self) {
        // Unlink the chain first so each predecessor is dropped with no
        // predecessor of its own; recursion depth stays at one.
        let mut previous = self.previous.take();
        while let Some(mut block) = previous {
            previous = block.previous.take();
        }
        // SAFETY: `base` was acquired with `layout` in `Block::new` and is
        // released exactly once, here.
        unsafe { raw::release(self.base, self.layout) }
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("base", &self.base)
            .field("capacity", &self.capacity())
            .field("used", &self.cursor)
            .field("has_previous", &self.previous.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CACHE_LINE_SIZE;

    const LINE: usize = CACHE_LINE_SIZE;

    fn block(lines: usize) -> Block {
        Block::new(lines * LINE, lines * LINE).unwrap()
    }

    #[test]
    fn base_is_cache_aligned() {
        let b = block(4);
        assert_eq!(b.base().as_ptr() as usize % LINE, 0);
        assert_eq!(b.capacity(), 4 * LINE);
        assert_eq!(b.used(), 0);
    }

    #[test]
    fn sequential_allocations_abut() {
        let mut b = block(4);
        let p1 = b.allocate(LINE).unwrap();
        let p2 = b.allocate(2 * LINE).unwrap();
        assert_eq!(p1, b.base());
        assert_eq!(p2.as_ptr() as usize, p1.as_ptr() as usize + LINE);
        assert_eq!(b.used(), 3 * LINE);
        assert_eq!(b.remaining(), LINE);
    }

    #[test]
    fn allocation_fails_when_full() {
        let mut b = block(2);
        assert!(b.allocate(2 * LINE).is_some());
        assert!(b.allocate(LINE).is_none());
        // A zero-byte bump on a full block still fits.
        assert!(b.allocate(0).is_some());
    }

    #[test]
    fn rewind_restores_capacity() {
        let mut b = block(4);
        let p1 = b.allocate(LINE).unwrap();
        let _p2 = b.allocate(LINE).unwrap();
        assert!(b.contains_and_rewind(p1.as_ptr()));
        assert_eq!(b.used(), 0);
        assert_eq!(b.allocate(LINE), Some(p1));
    }

    #[test]
    fn rewind_never_moves_forward() {
        let mut b = block(4);
        let p1 = b.allocate(LINE).unwrap();
        let p2 = b.allocate(LINE).unwrap();
        assert!(b.contains_and_rewind(p1.as_ptr()));
        // p2 is above the cursor now: still owned, cursor unchanged.
        assert!(b.contains_and_rewind(p2.as_ptr()));
        assert_eq!(b.used(), 0);
    }

    #[test]
    fn foreign_pointer_is_not_contained() {
        let mut b = block(2);
        let local = 0u8;
        assert!(!b.contains(&local));
        assert!(!b.contains_and_rewind(&local));
        let end = (b.base().as_ptr() as usize + b.capacity()) as *const u8;
        assert!(!b.contains(end));
    }

    #[test]
    fn chain_links_and_detaches() {
        let older = Box::new(block(1));
        let older_base = older.base();
        let mut newer = block(1);
        newer.attach_previous(older);
        assert_eq!(newer.previous().map(Block::base), Some(older_base));
        let detached = newer.take_previous().unwrap();
        assert_eq!(detached.base(), older_base);
        assert!(newer.previous().is_none());
    }

    #[test]
    fn attach_keeps_existing_predecessor() {
        let a = Box::new(block(1));
        let a_base = a.base();
        let b = Box::new(block(1));
        let b_base = b.base();
        let mut head = block(1);
        head.attach_previous(a);
        head.attach_previous(b);
        let first = head.previous().unwrap();
        assert_eq!(first.base(), b_base);
        assert_eq!(first.previous().map(Block::base), Some(a_base));
    }

    #[test]
    fn long_chain_drops_without_recursion() {
        let mut head = Box::new(block(1));
        for _ in 0..100_000 {
            let mut next = Box::new(block(1));
            next.attach_previous(head);
            head = next;
        }
        drop(head);
    }
}
