use std::{process, ptr::NonNull};

use log::{debug, error, trace};
use thiserror::Error;

use crate::{
  align::checked_align_up,
  block::{BlockPtr, BlockState, HEADER_SIZE, MIN_BLOCK_SIZE},
  config::HeapConfig,
  free_list::FreeList,
  region::Region,
  store::{BackingStore, StoreError},
};

#[derive(Debug, Error)]
pub enum HeapError {
  #[error(transparent)]
  Store(#[from] StoreError),
  #[error("request of {0} bytes is too large for a block")]
  RequestTooLarge(usize),
  #[error("growing by {requested} bytes would exceed the region limit of {limit} bytes")]
  RegionLimit { requested: usize, limit: usize },
  /// The store grew somewhere other than the region top. The store keeps that
  /// growth, so the region cannot grow again until [`Heap::init`].
  #[error("backing store grew from {found:#x}, expected the region top {expected:#x}")]
  Discontiguous { expected: usize, found: usize },
}

/// First-fit allocator over a single growable region.
///
/// Every block starts with a boundary-tag header; free blocks are also
/// threaded on an explicit free list through their payloads. Freed blocks
/// are merged with free physical neighbours immediately, so no two adjacent
/// blocks are ever both free.
pub struct Heap<S: BackingStore> {
  store: S,
  region: Region,
  free_list: FreeList,
  tail: Option<BlockPtr>,
  config: HeapConfig,
}

// SAFETY: the heap exclusively owns its region; nothing in it is shared with
// other heaps.
unsafe impl<S: BackingStore + Send> Send for Heap<S> {}

impl<S: BackingStore> Heap<S> {
  pub fn new(store: S) -> Result<Self, HeapError> {
    Self::with_config(store, HeapConfig::default())
  }

  pub fn with_config(
    store: S,
    config: HeapConfig,
  ) -> Result<Self, HeapError> {
    let region = Region::new(store.region_base());
    let mut heap = Self {
      store,
      region,
      free_list: FreeList::default(),
      tail: None,
      config,
    };
    heap.init()?;
    Ok(heap)
  }

  /// Forgets every block and shrinks the region back to zero length.
  ///
  /// Addresses handed out before the call must not be used afterwards.
  pub fn init(&mut self) -> Result<(), HeapError> {
    self.store.reset_region()?;
    self.region.reset(self.store.region_base());
    self.free_list.clear();
    self.tail = None;
    debug!("heap initialised at {:p}", self.region.base());
    Ok(())
  }

  pub fn config(&self) -> &HeapConfig {
    &self.config
  }

  pub fn store(&self) -> &S {
    &self.store
  }

  pub fn region_base(&self) -> NonNull<u8> {
    self.region.base()
  }

  pub fn region_size(&self) -> usize {
    self.region.size()
  }

  /// Allocates at least `size` bytes, `None` when `size` is zero.
  ///
  /// Failing to grow the region is fatal: the error is logged and the process
  /// aborts. Use [`try_allocate`](Self::try_allocate) to handle it instead.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> Option<NonNull<u8>> {
    match self.try_allocate(size) {
      Ok(ptr) => ptr,
      Err(err) => {
        error!("allocation of {size} bytes failed: {err}");
        process::abort()
      }
    }
  }

  /// Allocates at least `size` bytes, rounded up to [`ALIGNMENT`](crate::ALIGNMENT).
  ///
  /// The returned address is aligned to [`ALIGNMENT`](crate::ALIGNMENT) and
  /// the memory is not zeroed. `Ok(None)` when `size` is zero.
  pub fn try_allocate(
    &mut self,
    size: usize,
  ) -> Result<Option<NonNull<u8>>, HeapError> {
    if size == 0 {
      return Ok(None);
    }
    let need = round_request(size)?;

    let block = match self.free_list.search_first_fit(need) {
      Some(block) => {
        self.take_free_block(block, need);
        block
      }
      None => self.grow(need)?,
    };

    self.verify();
    Ok(Some(block.payload()))
  }

  /// Returns a block to the heap and merges it with free neighbours.
  ///
  /// # Safety
  ///
  /// `ptr` must have been returned by [`allocate`](Self::allocate) or
  /// [`try_allocate`](Self::try_allocate) on this heap since the last
  /// [`init`](Self::init), and must not have been released already. Neither
  /// condition is checked.
  pub unsafe fn release(
    &mut self,
    ptr: NonNull<u8>,
  ) {
    let block = unsafe { BlockPtr::from_payload(ptr) };
    let capacity = block.state().capacity();
    trace!("release {:p} ({capacity} bytes)", ptr);

    block.set_state(BlockState::Free(capacity));
    self.free_list.push_front(block);
    self.coalesce(block);

    self.verify();
  }

  /// Usable bytes behind an allocated address.
  ///
  /// # Safety
  ///
  /// `ptr` must be a live allocation of this heap.
  pub unsafe fn capacity_of(
    &self,
    ptr: NonNull<u8>,
  ) -> usize {
    unsafe { BlockPtr::from_payload(ptr) }.state().capacity()
  }

  /// Turns a free-list block into an allocation of `need` bytes, splitting off
  /// the excess as a new free block when it is large enough to stand alone.
  fn take_free_block(
    &mut self,
    block: BlockPtr,
    need: usize,
  ) {
    let capacity = block.state().capacity();
    let successor = self.region.next_block(block);

    // The links are only readable while the block is still tagged free.
    self.free_list.unlink(block);
    block.set_state(BlockState::Allocated(capacity));
    trace!("first fit {:#x} ({capacity} bytes) for {need}", block.addr());

    let excess = capacity.saturating_sub(need + HEADER_SIZE);
    if excess < MIN_BLOCK_SIZE {
      return;
    }

    // SAFETY: `need + HEADER_SIZE + excess` is within the original span.
    let remainder = unsafe { BlockPtr::from_header(block.payload().add(need)) };
    remainder.set_state(BlockState::Free(excess));
    remainder.set_physical_prev(Some(block));
    match successor {
      Some(next) => next.set_physical_prev(Some(remainder)),
      None => self.tail = Some(remainder),
    }
    self.free_list.push_front(remainder);
    block.set_state(BlockState::Allocated(need));
    trace!("split {:#x}: {need} allocated, {excess} free", block.addr());
  }

  /// Appends a new allocated block of `need` bytes at the top of the region.
  fn grow(
    &mut self,
    need: usize,
  ) -> Result<BlockPtr, HeapError> {
    let span = need + HEADER_SIZE;
    if let Some(limit) = self.config.region_limit {
      if self.region.size().checked_add(span).is_none_or(|size| size > limit) {
        return Err(HeapError::RegionLimit {
          requested: span,
          limit,
        });
      }
    }

    let previous_top = self.store.grow_region(span)?;
    let expected = self.region.top();
    let found = previous_top.as_ptr().addr();
    // The store's growth is not rolled back; every later growth lands past it.
    if found != expected {
      return Err(HeapError::Discontiguous { expected, found });
    }

    // SAFETY: the store just made `span` bytes at `previous_top` available.
    let block = unsafe { BlockPtr::from_header(previous_top) };
    self.region.extend(span);
    block.set_state(BlockState::Allocated(need));
    block.set_physical_prev(self.tail);
    self.tail = Some(block);

    debug!("grew region by {span} bytes to {}", self.region.size());
    Ok(block)
  }

  /// Merges a free, listed `block` with its free physical neighbours. The
  /// surviving list node is the lowest-addressed free block involved.
  fn coalesce(
    &mut self,
    block: BlockPtr,
  ) {
    debug_assert!(block.state().is_free());
    let mut merged = block;
    let mut total = block.state().capacity();
    let successor = self.region.next_block(block);

    if let Some(prev) = block.physical_prev().filter(|prev| prev.state().is_free()) {
      // `prev` is already listed and keeps its node; `block` disappears.
      self.free_list.unlink(block);
      total += prev.state().capacity() + HEADER_SIZE;
      if let Some(next) = successor {
        next.set_physical_prev(Some(prev));
      }
      if self.tail == Some(block) {
        self.tail = Some(prev);
      }
      trace!("merge {:#x} into previous {:#x}", block.addr(), prev.addr());
      merged = prev;
    }

    if let Some(next) = successor.filter(|next| next.state().is_free()) {
      self.free_list.unlink(next);
      total += next.state().capacity() + HEADER_SIZE;
      match self.region.next_block(next) {
        Some(after) => after.set_physical_prev(Some(merged)),
        None => {
          if self.tail == Some(next) {
            self.tail = Some(merged);
          }
        }
      }
      trace!("merge next {:#x} into {:#x}", next.addr(), merged.addr());
    }

    merged.set_state(BlockState::Free(total));
    debug_assert!(!self.free_list.is_empty());
  }

  fn verify(&self) {
    if cfg!(debug_assertions) && self.config.verify {
      let report = self.check();
      debug_assert!(report.is_consistent(), "heap inconsistent: {:?}", report.violations);
    }
  }

  pub(crate) fn region(&self) -> &Region {
    &self.region
  }

  pub(crate) fn free_list(&self) -> &FreeList {
    &self.free_list
  }

  pub(crate) fn tail(&self) -> Option<BlockPtr> {
    self.tail
  }
}

/// Rounds a request up to the alignment unit, rejecting sizes whose block
/// would not fit the signed tag.
fn round_request(size: usize) -> Result<usize, HeapError> {
  checked_align_up(size)
    .filter(|need| {
      need
        .checked_add(HEADER_SIZE)
        .is_some_and(|span| span <= isize::MAX as usize)
    })
    .ok_or(HeapError::RequestTooLarge(size))
}
