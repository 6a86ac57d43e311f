use std::{io, ptr::NonNull};

use libc::{c_void, intptr_t, sbrk};

use crate::{
  ALIGNMENT,
  store::{BackingStore, StoreError},
};

/// Backing store on top of the process data segment, grown with `sbrk(2)`.
pub struct SbrkStore {
  base: NonNull<u8>,
  grown: usize,
}

// SAFETY: the program break is process-wide; the store only touches the span
// it grew itself.
unsafe impl Send for SbrkStore {}

/// Current program break.
pub fn program_break() -> *mut c_void {
  unsafe { sbrk(0) }
}

fn checked_sbrk(increment: intptr_t) -> Result<*mut c_void, StoreError> {
  let previous = unsafe { sbrk(increment) };
  if previous == usize::MAX as *mut c_void {
    return Err(StoreError::Os(io::Error::last_os_error()));
  }
  Ok(previous)
}

impl SbrkStore {
  /// Claims the program break as the base of a new region, padding it up to
  /// [`ALIGNMENT`] first.
  ///
  /// # Safety
  ///
  /// While the store is alive nothing else may shrink the program break below
  /// the top of the region. Other code that grows the break in between is
  /// detected by the heap as a discontiguous region.
  pub unsafe fn new() -> Result<Self, StoreError> {
    let brk = checked_sbrk(0)?.cast::<u8>();
    let pad = brk.align_offset(ALIGNMENT);
    if pad > 0 {
      checked_sbrk(pad as intptr_t)?;
    }
    let base = NonNull::new(brk.wrapping_add(pad))
      .ok_or_else(|| StoreError::Os(io::Error::other("program break is null")))?;
    Ok(Self { base, grown: 0 })
  }

  /// Bytes currently held past the base.
  pub fn grown(&self) -> usize {
    self.grown
  }
}

impl BackingStore for SbrkStore {
  fn region_base(&self) -> NonNull<u8> {
    self.base
  }

  fn grow_region(
    &mut self,
    bytes: usize,
  ) -> Result<NonNull<u8>, StoreError> {
    let increment = intptr_t::try_from(bytes).map_err(|_| StoreError::TooLarge(bytes))?;
    let previous = checked_sbrk(increment)?;
    self.grown += bytes;
    NonNull::new(previous.cast::<u8>())
      .ok_or_else(|| StoreError::Os(io::Error::other("sbrk returned null")))
  }

  /// Fails with [`StoreError::Shared`], leaving the break untouched, when the
  /// break is no longer at the top of this store's region.
  fn reset_region(&mut self) -> Result<(), StoreError> {
    if self.grown > 0 {
      let expected = self.base.as_ptr().addr() + self.grown;
      let found = checked_sbrk(0)?.addr();
      if found != expected {
        return Err(StoreError::Shared { expected, found });
      }
      let decrement = intptr_t::try_from(self.grown).map_err(|_| StoreError::TooLarge(self.grown))?;
      checked_sbrk(-decrement)?;
      self.grown = 0;
    }
    Ok(())
  }
}
