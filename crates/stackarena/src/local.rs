//! The per-thread arena and its free-function entry points.
//!
//! Each thread lazily creates its own [`Arena`] on first use and drops it
//! when the thread exits. Nothing here is shared between threads.
//!
//! Handles release through [`release`], which tolerates drop order that is
//! not strictly LIFO (tuple fields, struct fields and `Vec` elements drop
//! front to back). A handle dropped while younger allocations are still
//! live is parked, and its bytes are reclaimed as soon as everything above
//! it has been released.

#![allow(unsafe_code)]

use std::cell::RefCell;
use std::ptr::NonNull;

use tracing::{debug, error};

use crate::arena::{Arena, ArenaStats};
use crate::config::ArenaConfig;
use crate::error::{AllocError, UnmanagedMemory};

thread_local! {
    static ARENA: RefCell<ThreadArena> = RefCell::new(ThreadArena::new());
}

/// A handle release waiting for the allocations above it.
struct Deferred {
    ptr: NonNull<u8>,
    depth: usize,
}

struct ThreadArena {
    arena: Arena,
    deferred: Vec<Deferred>,
}

impl ThreadArena {
    fn new() -> Self {
        Self {
            arena: Arena::new(ArenaConfig::default()),
            deferred: Vec::new(),
        }
    }

    /// Release the handle allocation at `ptr`, created at `depth`.
    fn release(&mut self, ptr: NonNull<u8>, depth: usize) -> Result<(), UnmanagedMemory> {
        let live = self.arena.live_allocations();
        if depth < live {
            debug!(depth, live, "deferred out-of-order handle release");
            self.deferred.push(Deferred { ptr, depth });
            return Ok(());
        }
        self.arena.deallocate(ptr.as_ptr())?;
        self.settle()
    }

    /// Reclaim parked releases that are now on top of the stack.
    fn settle(&mut self) -> Result<(), UnmanagedMemory> {
        while let Some(index) = self
            .deferred
            .iter()
            .position(|parked| parked.depth == self.arena.live_allocations())
        {
            let parked = self.deferred.swap_remove(index);
            self.arena.deallocate(parked.ptr.as_ptr())?;
        }
        Ok(())
    }
}

/// Carve `size` bytes from the calling thread's arena.
///
/// The returned address is aligned to [`CACHE_LINE_SIZE`] and stays valid
/// until it (or an address carved before it) is passed to [`deallocate`].
///
/// # Panics
///
/// Panics if called from a thread-local destructor after this thread's
/// arena has already been torn down.
///
/// [`CACHE_LINE_SIZE`]: crate::CACHE_LINE_SIZE
pub fn allocate(size: usize) -> Result<NonNull<u8>, AllocError> {
    ARENA.with(|local| local.borrow_mut().arena.allocate(size))
}

/// Release an address obtained from [`allocate`] on this thread.
///
/// Null is a no-op. Releasing an address rewinds the arena to it, which
/// also reclaims every allocation carved after it.
///
/// # Safety
///
/// `ptr` must be null or have been returned by [`allocate`] on this
/// thread. No allocation carved after `ptr`, including the storage behind
/// any [`StackBox`] or [`StackSlice`] created since, may be used once this
/// returns: the next allocation may reuse those bytes.
///
/// # Panics
///
/// Panics with "deallocated unmanaged memory" if no block in this thread's
/// chain owns `ptr` (double free, foreign pointer, or an address carved on
/// another thread).
///
/// [`StackBox`]: crate::StackBox
/// [`StackSlice`]: crate::StackSlice
pub unsafe fn deallocate(ptr: *mut u8) {
    let result = ARENA.with(|local| {
        let mut local = local.borrow_mut();
        local.arena.deallocate(ptr)?;
        local.settle()
    });
    if let Err(err) = result {
        unmanaged(err);
    }
}

/// Bookkeeping snapshot of the calling thread's arena.
pub fn stats() -> ArenaStats {
    ARENA.with(|local| local.borrow().arena.stats())
}

/// Allocate on behalf of a handle and report its LIFO depth.
///
/// Panics like [`allocate`] once the thread's arena has been torn down.
pub(crate) fn acquire(size: usize) -> Result<(NonNull<u8>, usize), AllocError> {
    ARENA.with(|local| {
        let mut local = local.borrow_mut();
        let ptr = local.arena.allocate(size)?;
        Ok((ptr, local.arena.live_allocations()))
    })
}

/// Release on behalf of a handle created at `depth`.
///
/// Once the thread's arena has been torn down this is a no-op: the arena
/// leaks its chain while allocations are outstanding, so the memory the
/// handle points at is still valid, just never reclaimed.
pub(crate) fn release(ptr: NonNull<u8>, depth: usize) {
    let outcome = ARENA.try_with(|local| local.borrow_mut().release(ptr, depth));
    if let Ok(Err(err)) = outcome {
        unmanaged(err);
    }
}

#[cold]
#[inline(never)]
fn unmanaged(err: UnmanagedMemory) -> ! {
    error!(address = err.address, "deallocated unmanaged memory");
    panic!("{err}");
}
