//! Scope-bound owning handles over thread-local arena allocations.
//!
//! [`StackBox`] owns one value, [`StackSlice`] owns a run of plain-data
//! elements. Both release their bytes to the creating thread's arena when
//! dropped. Dropping them in the reverse order they were created, which is
//! what ordinary nested scopes do, reclaims the bytes immediately; any
//! other order holds the bytes back until the younger allocations are gone.
//!
//! Handles are neither `Send` nor `Sync`; releasing on another thread is
//! rejected at compile time:
//!
//! ```compile_fail
//! let boxed = stackarena::StackBox::new(5u32);
//! std::thread::spawn(move || drop(boxed));
//! ```
//!
//! and they cannot be duplicated:
//!
//! ```compile_fail
//! let boxed = stackarena::StackBox::new(5u32);
//! let copy = boxed.clone();
//! ```

#![allow(unsafe_code)]

use std::alloc::{handle_alloc_error, Layout};
use std::fmt;
use std::marker::PhantomData;
use std::mem::{self, ManuallyDrop, MaybeUninit};
use std::ops::{Deref, DerefMut, Range};
use std::ptr::{self, NonNull};
use std::slice;

use crate::config::CACHE_LINE_SIZE;
use crate::error::AllocError;
use crate::local;

/// Releases a handle's bytes when dropped, so the release still happens if
/// the value's destructor unwinds.
struct Release {
    ptr: NonNull<u8>,
    depth: usize,
}

impl Drop for Release {
    fn drop(&mut self) {
        local::release(self.ptr, self.depth);
    }
}

/// A single value placed in the thread-local arena.
///
/// Dereferences to `T`. Dropping the box runs `T`'s destructor and then
/// hands the bytes back to the arena.
///
/// Boxes are meant to be dropped youngest first. One dropped while younger
/// allocations are still live (a tuple or `Vec` of boxes, or a new box
/// assigned over an existing one) runs its destructor immediately, but its
/// bytes stay reserved until everything above them has been released.
///
/// # Panics
///
/// Creating a box from a thread-local destructor after this thread's arena
/// has been torn down panics.
pub struct StackBox<T> {
    ptr: NonNull<T>,
    depth: usize,
    _owns: PhantomData<T>,
}

impl<T> StackBox<T> {
    /// Move `value` into the arena.
    ///
    /// Aborts through [`handle_alloc_error`] if no backing memory is
    /// available, like `Box::new`.
    pub fn new(value: T) -> Self {
        match Self::try_new(value) {
            Ok(boxed) => boxed,
            Err(_) => handle_alloc_error(Layout::new::<T>()),
        }
    }

    /// Move `value` into the arena, reporting allocation failure.
    pub fn try_new(value: T) -> Result<Self, AllocError> {
        const {
            assert!(
                mem::align_of::<T>() <= CACHE_LINE_SIZE,
                "type alignment exceeds the arena cache-line size"
            )
        };
        let (raw, depth) = local::acquire(mem::size_of::<T>())?;
        let ptr = raw.cast::<T>();
        // SAFETY: `raw` is cache-line aligned (which satisfies `T`, checked
        // above) and spans at least `size_of::<T>()` bytes.
        unsafe { ptr.as_ptr().write(value) };
        Ok(Self {
            ptr,
            depth,
            _owns: PhantomData,
        })
    }

    /// Address of the value inside the arena.
    pub fn as_ptr(&self) -> *const T {
        self.ptr.as_ptr()
    }

    /// Mutable address of the value inside the arena.
    pub fn as_mut_ptr(&mut self) -> *mut T {
        self.ptr.as_ptr()
    }

    /// Move the value out and release the allocation.
    pub fn into_inner(self) -> T {
        let this = ManuallyDrop::new(self);
        // SAFETY: the value is initialised and, since `this` is never
        // dropped, is read exactly once.
        let value = unsafe { ptr::read(this.ptr.as_ptr()) };
        local::release(this.ptr.cast(), this.depth);
        value
    }
}

impl<T> Drop for StackBox<T> {
    fn drop(&mut self) {
        let _release = Release {
            ptr: self.ptr.cast(),
            depth: self.depth,
        };
        // SAFETY: the value is initialised and dropped exactly once; the
        // bytes are released afterwards by `_release`.
        unsafe { ptr::drop_in_place(self.ptr.as_ptr()) }
    }
}

impl<T> Deref for StackBox<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: initialised in `try_new`, uniquely owned by `self`.
        unsafe { self.ptr.as_ref() }
    }
}

impl<T> DerefMut for StackBox<T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: initialised in `try_new`, uniquely owned by `self`.
        unsafe { self.ptr.as_mut() }
    }
}

impl<T> AsRef<T> for StackBox<T> {
    fn as_ref(&self) -> &T {
        self
    }
}

impl<T> AsMut<T> for StackBox<T> {
    fn as_mut(&mut self) -> &mut T {
        self
    }
}

impl<T: fmt::Debug> fmt::Debug for StackBox<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

impl<T: fmt::Display> fmt::Display for StackBox<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&**self, f)
    }
}

/// A run of plain-data elements in the thread-local arena.
///
/// No element is ever constructed or destroyed by the slice itself, so
/// only `Copy` element types (and `MaybeUninit` of them) are accepted.
/// [`StackSlice::uninit`] hands out the raw storage untouched.
///
/// Release order follows the same rules as [`StackBox`]: a slice dropped
/// before younger allocations keeps its bytes reserved until they are
/// gone.
pub struct StackSlice<T> {
    ptr: NonNull<T>,
    len: usize,
    depth: usize,
    _owns: PhantomData<T>,
}

impl<T> StackSlice<T> {
    fn try_allocate(len: usize) -> Result<Self, AllocError> {
        const {
            assert!(
                mem::align_of::<T>() <= CACHE_LINE_SIZE,
                "element alignment exceeds the arena cache-line size"
            );
            assert!(
                !mem::needs_drop::<T>(),
                "stack slices never run element destructors"
            );
        };
        let bytes = mem::size_of::<T>()
            .checked_mul(len)
            .ok_or_else(|| AllocError::overflow(mem::size_of::<T>().saturating_mul(len)))?;
        let (raw, depth) = local::acquire(bytes)?;
        Ok(Self {
            ptr: raw.cast(),
            len,
            depth,
            _owns: PhantomData,
        })
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the slice has no elements.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Address of the first element.
    pub fn as_ptr(&self) -> *const T {
        self.ptr.as_ptr()
    }

    /// Mutable address of the first element.
    pub fn as_mut_ptr(&mut self) -> *mut T {
        self.ptr.as_ptr()
    }

    /// `begin..end` bounds of the elements.
    pub fn as_ptr_range(&self) -> Range<*const T> {
        let start = self.as_ptr();
        // SAFETY: `len` elements were reserved starting at `start`.
        start..unsafe { start.add(self.len) }
    }
}

impl<T: Copy> StackSlice<T> {
    /// `len` copies of `value`.
    ///
    /// Aborts through [`handle_alloc_error`] if no backing memory is
    /// available.
    pub fn filled(len: usize, value: T) -> Self {
        match Self::try_filled(len, value) {
            Ok(slice) => slice,
            Err(_) => handle_alloc_error(array_layout::<T>(len)),
        }
    }

    /// `len` copies of `value`, reporting allocation failure.
    pub fn try_filled(len: usize, value: T) -> Result<Self, AllocError> {
        let mut slice = StackSlice::<MaybeUninit<T>>::try_allocate(len)?;
        for slot in slice.iter_mut() {
            slot.write(value);
        }
        // SAFETY: every element was written above.
        Ok(unsafe { slice.assume_init() })
    }

    /// A copy of `src`.
    pub fn from_slice(src: &[T]) -> Self {
        let mut slice = Self::uninit(src.len());
        for (slot, &value) in slice.iter_mut().zip(src) {
            slot.write(value);
        }
        // SAFETY: every element was written above.
        unsafe { slice.assume_init() }
    }

    /// Reserve storage for `len` elements without initialising any of them.
    pub fn uninit(len: usize) -> StackSlice<MaybeUninit<T>> {
        match Self::try_uninit(len) {
            Ok(slice) => slice,
            Err(_) => handle_alloc_error(array_layout::<T>(len)),
        }
    }

    /// Reserve storage for `len` elements, reporting allocation failure.
    pub fn try_uninit(len: usize) -> Result<StackSlice<MaybeUninit<T>>, AllocError> {
        StackSlice::<MaybeUninit<T>>::try_allocate(len)
    }
}

fn array_layout<T>(len: usize) -> Layout {
    Layout::array::<T>(len).unwrap_or(Layout::new::<T>())
}

impl<T: Copy> StackSlice<MaybeUninit<T>> {
    /// Reinterpret the storage as initialised elements.
    ///
    /// # Safety
    ///
    /// Every element must have been written.
    pub unsafe fn assume_init(self) -> StackSlice<T> {
        let this = ManuallyDrop::new(self);
        StackSlice {
            ptr: this.ptr.cast(),
            len: this.len,
            depth: this.depth,
            _owns: PhantomData,
        }
    }
}

impl<T> Drop for StackSlice<T> {
    fn drop(&mut self) {
        local::release(self.ptr.cast(), self.depth);
    }
}

impl<T> Deref for StackSlice<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        // SAFETY: `len` elements reserved and initialised (or `T` is
        // `MaybeUninit`), uniquely owned by `self`.
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl<T> DerefMut for StackSlice<T> {
    fn deref_mut(&mut self) -> &mut [T] {
        // SAFETY: as in `deref`.
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl<'a, T> IntoIterator for &'a StackSlice<T> {
    type Item = &'a T;
    type IntoIter = slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, T> IntoIterator for &'a mut StackSlice<T> {
    type Item = &'a mut T;
    type IntoIter = slice::IterMut<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

impl<T: fmt::Debug> fmt::Debug for StackSlice<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}
