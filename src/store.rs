use std::{
  alloc::{self, Layout},
  io,
  ptr::NonNull,
};

use thiserror::Error;

use crate::ALIGNMENT;

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("backing store exhausted: requested {requested} bytes, {available} available")]
  Exhausted { requested: usize, available: usize },
  #[error("growth of {0} bytes does not fit in intptr_t")]
  TooLarge(usize),
  #[error("program break is at {found:#x}, expected the region top {expected:#x}")]
  Shared { expected: usize, found: usize },
  #[error("sbrk failed with {0}")]
  Os(#[from] io::Error),
}

/// Source of the contiguous memory a [`Heap`](crate::Heap) manages.
///
/// The region starts at [`region_base`](BackingStore::region_base), which must
/// be aligned to [`ALIGNMENT`], and only ever grows upward by the exact byte
/// counts the heap asks for.
pub trait BackingStore {
  fn region_base(&self) -> NonNull<u8>;

  /// Extends the region by exactly `bytes` and returns the previous top.
  fn grow_region(
    &mut self,
    bytes: usize,
  ) -> Result<NonNull<u8>, StoreError>;

  /// Shrinks the region back to zero length.
  fn reset_region(&mut self) -> Result<(), StoreError>;
}

/// Fixed-capacity store over a single buffer from the global allocator.
///
/// Growth bumps a length; once `capacity` bytes are handed out every further
/// request fails with [`StoreError::Exhausted`].
pub struct ArenaStore {
  base: NonNull<u8>,
  layout: Layout,
  len: usize,
}

// SAFETY: the buffer is exclusively owned by the store.
unsafe impl Send for ArenaStore {}

impl ArenaStore {
  /// # Panics
  ///
  /// Panics if `capacity` rounded up to [`ALIGNMENT`] overflows `isize`.
  pub fn with_capacity(capacity: usize) -> Self {
    let layout = match Layout::from_size_align(capacity.max(ALIGNMENT), ALIGNMENT) {
      Ok(layout) => layout.pad_to_align(),
      Err(_) => panic!("arena capacity overflow: {capacity} bytes"),
    };
    // SAFETY: `layout` has a non-zero size.
    let ptr = unsafe { alloc::alloc_zeroed(layout) };
    let Some(base) = NonNull::new(ptr) else {
      alloc::handle_alloc_error(layout)
    };
    Self { base, layout, len: 0 }
  }

  pub fn capacity(&self) -> usize {
    self.layout.size()
  }

  /// Bytes handed out so far.
  pub fn len(&self) -> usize {
    self.len
  }

  pub fn is_empty(&self) -> bool {
    self.len == 0
  }
}

impl BackingStore for ArenaStore {
  fn region_base(&self) -> NonNull<u8> {
    self.base
  }

  fn grow_region(
    &mut self,
    bytes: usize,
  ) -> Result<NonNull<u8>, StoreError> {
    let available = self.capacity() - self.len;
    if bytes > available {
      return Err(StoreError::Exhausted {
        requested: bytes,
        available,
      });
    }
    // SAFETY: `len <= capacity`, so the result stays inside the buffer.
    let previous_top = unsafe { self.base.add(self.len) };
    self.len += bytes;
    Ok(previous_top)
  }

  fn reset_region(&mut self) -> Result<(), StoreError> {
    self.len = 0;
    Ok(())
  }
}

impl Drop for ArenaStore {
  fn drop(&mut self) {
    // SAFETY: allocated in `with_capacity` with this exact layout.
    unsafe { alloc::dealloc(self.base.as_ptr(), self.layout) }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_arena_grows_contiguously() {
    let mut store = ArenaStore::with_capacity(256);
    let base = store.region_base();

    assert_eq!(base.as_ptr().addr() % ALIGNMENT, 0);
    assert_eq!(store.grow_region(32).unwrap(), base);
    assert_eq!(store.grow_region(64).unwrap(), unsafe { base.add(32) });
    assert_eq!(store.len(), 96);
  }

  #[test]
  fn test_arena_exhaustion() {
    let mut store = ArenaStore::with_capacity(64);
    store.grow_region(48).unwrap();

    let err = store.grow_region(32).unwrap_err();
    assert!(matches!(
      err,
      StoreError::Exhausted {
        requested: 32,
        available: 16
      }
    ));
    assert_eq!(store.len(), 48);
  }

  #[test]
  fn test_arena_reset() {
    let mut store = ArenaStore::with_capacity(64);
    store.grow_region(64).unwrap();
    store.reset_region().unwrap();

    assert!(store.is_empty());
    assert_eq!(store.grow_region(16).unwrap(), store.region_base());
  }

  #[test]
  fn test_arena_capacity_is_rounded() {
    let store = ArenaStore::with_capacity(1);
    assert_eq!(store.capacity(), ALIGNMENT);
  }
}
