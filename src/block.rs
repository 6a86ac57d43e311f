use std::{mem, ptr::NonNull};

/// Header present on every block, allocated or free.
///
/// `size` is the boundary tag: positive for an allocated block, negative for a
/// free one, magnitude is the payload capacity in bytes.
#[repr(C)]
struct BlockInfo {
  size: isize,
  prev: Option<NonNull<Block>>,
}

/// Free-list links. They live in the first bytes of the payload, so they only
/// exist while the block is free.
#[repr(C)]
struct FreeLinks {
  next: Option<NonNull<Block>>,
  prev: Option<NonNull<Block>>,
}

#[repr(C)]
pub(crate) struct Block {
  info: BlockInfo,
  links: FreeLinks,
}

/// Bytes of bookkeeping in front of every payload.
pub const HEADER_SIZE: usize = mem::size_of::<BlockInfo>();

/// Granularity of every block capacity: the size of the free-link pair, so a
/// freed payload can always hold its links.
pub const ALIGNMENT: usize = mem::size_of::<FreeLinks>();

/// Smallest span worth carving out as a separate free block.
pub const MIN_BLOCK_SIZE: usize = mem::size_of::<Block>();

const _: () = assert!(ALIGNMENT.is_power_of_two());
const _: () = assert!(HEADER_SIZE % ALIGNMENT == 0);
const _: () = assert!(MIN_BLOCK_SIZE == HEADER_SIZE + ALIGNMENT);

/// Decoded boundary tag of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BlockState {
  Allocated(usize),
  Free(usize),
}

impl BlockState {
  #[inline]
  pub(crate) fn capacity(self) -> usize {
    match self {
      BlockState::Allocated(capacity) | BlockState::Free(capacity) => capacity,
    }
  }

  #[inline]
  pub(crate) fn is_free(self) -> bool {
    matches!(self, BlockState::Free(_))
  }

  fn encode(self) -> isize {
    debug_assert!(self.capacity() <= isize::MAX as usize);
    match self {
      BlockState::Allocated(capacity) => capacity as isize,
      BlockState::Free(capacity) => -(capacity as isize),
    }
  }

  fn decode(raw: isize) -> Self {
    if raw < 0 {
      BlockState::Free(raw.unsigned_abs())
    } else {
      BlockState::Allocated(raw as usize)
    }
  }
}

/// Handle to a block header inside the managed region.
///
/// All raw memory access of the allocator goes through this type. Holding a
/// `BlockPtr` asserts that its header lies inside the live region; the free
/// link accessors additionally require the block to be tagged free, because
/// for an allocated block those bytes belong to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BlockPtr(NonNull<Block>);

impl BlockPtr {
  /// # Safety
  ///
  /// `header` must be aligned to [`ALIGNMENT`] and point into the managed
  /// region with at least [`HEADER_SIZE`] bytes (plus [`ALIGNMENT`] once the
  /// block is tagged free) valid for reads and writes for as long as the
  /// handle is used.
  #[inline]
  pub(crate) unsafe fn from_header(header: NonNull<u8>) -> Self {
    debug_assert!(header.as_ptr().addr() % ALIGNMENT == 0);
    Self(header.cast())
  }

  /// # Safety
  ///
  /// `payload` must be an address previously produced by [`BlockPtr::payload`].
  #[inline]
  pub(crate) unsafe fn from_payload(payload: NonNull<u8>) -> Self {
    unsafe { Self::from_header(payload.sub(HEADER_SIZE)) }
  }

  #[inline]
  pub(crate) fn addr(self) -> usize {
    self.0.as_ptr().addr()
  }

  #[inline]
  pub(crate) fn header(self) -> NonNull<u8> {
    self.0.cast()
  }

  /// Address handed to the caller: just past the header.
  #[inline]
  pub(crate) fn payload(self) -> NonNull<u8> {
    // SAFETY: every block spans at least `HEADER_SIZE` bytes.
    unsafe { self.header().add(HEADER_SIZE) }
  }

  #[inline]
  pub(crate) fn state(self) -> BlockState {
    BlockState::decode(unsafe { (*self.0.as_ptr()).info.size })
  }

  #[inline]
  pub(crate) fn set_state(
    self,
    state: BlockState,
  ) {
    unsafe { (*self.0.as_ptr()).info.size = state.encode() }
  }

  /// Header plus capacity, regardless of the tag.
  #[inline]
  pub(crate) fn span(self) -> usize {
    HEADER_SIZE + self.state().capacity()
  }

  #[inline]
  pub(crate) fn physical_prev(self) -> Option<BlockPtr> {
    unsafe { (*self.0.as_ptr()).info.prev }.map(BlockPtr)
  }

  #[inline]
  pub(crate) fn set_physical_prev(
    self,
    prev: Option<BlockPtr>,
  ) {
    unsafe { (*self.0.as_ptr()).info.prev = prev.map(|block| block.0) }
  }

  #[inline]
  pub(crate) fn free_next(self) -> Option<BlockPtr> {
    debug_assert!(self.state().is_free(), "free link read on allocated block");
    unsafe { (*self.0.as_ptr()).links.next }.map(BlockPtr)
  }

  #[inline]
  pub(crate) fn free_prev(self) -> Option<BlockPtr> {
    debug_assert!(self.state().is_free(), "free link read on allocated block");
    unsafe { (*self.0.as_ptr()).links.prev }.map(BlockPtr)
  }

  #[inline]
  pub(crate) fn set_free_next(
    self,
    next: Option<BlockPtr>,
  ) {
    debug_assert!(self.state().is_free(), "free link written on allocated block");
    unsafe { (*self.0.as_ptr()).links.next = next.map(|block| block.0) }
  }

  #[inline]
  pub(crate) fn set_free_prev(
    self,
    prev: Option<BlockPtr>,
  ) {
    debug_assert!(self.state().is_free(), "free link written on allocated block");
    unsafe { (*self.0.as_ptr()).links.prev = prev.map(|block| block.0) }
  }
}
