//! Per-thread, stack-discipline memory arena.
//!
//! Allocations are carved from cache-line aligned backing blocks by
//! bumping a cursor, and released by rewinding it. Callers are expected to
//! release in last-in-first-out order, the way nested scopes exit; in
//! exchange both directions cost roughly a pointer bump.
//!
//! # Architecture
//!
//! ```text
//! thread_local Arena (local)
//! ├── current: Block chain (newest first, each block owns its predecessor)
//! ├── spare: one detached Block kept for reuse
//! └── growth_target: next backing block size (monotonic)
//!
//! StackBox<T> / StackSlice<T>  ──acquire──▶ Arena::allocate
//!                              ◀─release─── Arena::deallocate (on drop)
//! ```
//!
//! # Example
//!
//! ```
//! use stackarena::{StackBox, StackSlice};
//!
//! let header = StackBox::new((1u32, 2u32));
//! {
//!     let mut scratch = StackSlice::filled(256, 0.0f32);
//!     scratch[0] = header.0 as f32;
//!     assert_eq!(scratch.len(), 256);
//! } // scratch released here, before header
//! assert_eq!(header.1, 2);
//! ```
//!
//! The raw entry points [`allocate`] and [`deallocate`] expose the same
//! per-thread arena without the handle wrappers.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_code)]

pub mod arena;
pub mod block;
pub mod config;
pub mod error;
pub mod handle;
pub mod local;
mod raw;
pub mod sizing;

// Public re-exports for the primary API surface.
pub use arena::{Arena, ArenaStats};
pub use config::{ArenaConfig, CACHE_LINE_SIZE};
pub use error::{AllocError, AllocFailure, UnmanagedMemory};
pub use handle::{StackBox, StackSlice};
pub use local::{allocate, deallocate, stats};
