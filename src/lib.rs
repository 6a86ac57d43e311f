//! # tagalloc - A Boundary-Tag Heap Allocator
//!
//! This crate provides a **first-fit, explicit free list** heap allocator
//! over a single contiguous region that grows on demand, by default through
//! the `sbrk` system call.
//!
//! ## Overview
//!
//! All bookkeeping lives inside the managed memory itself. Every block starts
//! with a header whose size field doubles as the allocation tag, and free
//! blocks reuse the first bytes of their payload as free-list links:
//!
//! ```text
//!   Allocated block:                     Free block:
//!   ┌──────────────────────────┐         ┌──────────────────────────┐
//!   │ size: +N                 │ header  │ size: -N                 │ header
//!   │ prev: physical neighbour │         │ prev: physical neighbour │
//!   ├──────────────────────────┤         ├──────────────────────────┤
//!   │                          │ ◄─ ptr  │ nextFree                 │ payload
//!   │     N bytes of caller    │         │ prevFree                 │
//!   │        payload           │         │     N - 16 bytes unused  │
//!   └──────────────────────────┘         └──────────────────────────┘
//! ```
//!
//! Blocks tile the region back to back, so the next block is found from the
//! size alone, and the previous one through the `prev` link:
//!
//! ```text
//!   base                                                            top
//!   ┌────────┬──────────┬────────┬────────────────┬────────┬──────────┐
//!   │ A (+32)│          │ F (-64)│                │ A (+16)│          │
//!   └────────┴──────────┴────────┴────────────────┴────────┴──────────┘
//!        ▲                   │ ▲                       │        ▲
//!        └───── prev ────────┘ └──────── prev ─────────┘      tail
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   tagalloc
//!   ├── align      - Alignment macro and helpers
//!   ├── block      - Block header codec (internal)
//!   ├── region     - Physical block walker (internal)
//!   ├── free_list  - Explicit free list (internal)
//!   ├── store      - BackingStore trait and ArenaStore
//!   ├── sbrk       - SbrkStore (unix)
//!   ├── config     - HeapConfig
//!   ├── heap       - Heap: init, allocate, release
//!   ├── check      - Consistency checker and heap dump
//!   └── locked     - LockedHeap, a mutex around a Heap
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use tagalloc::{ArenaStore, Heap};
//!
//! let mut heap = Heap::new(ArenaStore::with_capacity(4096)).unwrap();
//!
//! let a = heap.allocate(16).unwrap();
//! let _b = heap.allocate(16).unwrap();
//!
//! unsafe { heap.release(a) };
//!
//! // The freed block is reused before the region grows.
//! let c = heap.allocate(16).unwrap();
//! assert_eq!(a, c);
//! assert!(heap.check().is_consistent());
//! ```
//!
//! ## How It Works
//!
//! - **allocate** rounds the request up to [`ALIGNMENT`], takes the first
//!   free-list block that is large enough and splits off the excess as a new
//!   free block when it can hold at least [`MIN_BLOCK_SIZE`] bytes. With no
//!   fit, the region grows by exactly the request plus one header.
//! - **release** tags the block free, pushes it on the front of the free list
//!   and merges it with a free physical predecessor and/or successor, so no
//!   two neighbouring blocks are ever both free.
//!
//! ## Limitations
//!
//! - **Single-threaded core**: wrap the heap in [`LockedHeap`] to share it
//! - **First fit only**: the free-list scan is linear in its length
//! - **No shrinking**: released memory stays in the region until [`Heap::init`]
//! - **Growth failure is fatal** through [`Heap::allocate`]; use
//!   [`Heap::try_allocate`] to get it as an error instead
//!
//! ## Safety
//!
//! Releasing an address that was not returned by this heap, or releasing it
//! twice, is undefined behaviour and is not detected.

pub mod align;
mod block;
mod check;
mod config;
mod free_list;
mod heap;
mod locked;
mod region;
#[cfg(unix)]
mod sbrk;
mod store;

pub use block::{ALIGNMENT, HEADER_SIZE, MIN_BLOCK_SIZE};
pub use check::{HeapDump, HeapReport, HeapStats, Violation};
pub use config::HeapConfig;
pub use heap::{Heap, HeapError};
pub use locked::LockedHeap;
#[cfg(unix)]
pub use sbrk::{SbrkStore, program_break};
pub use store::{ArenaStore, BackingStore, StoreError};
