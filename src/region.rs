use std::ptr::NonNull;

use crate::block::BlockPtr;

/// The managed byte range `[base, base + size)` and physical-order traversal
/// over the blocks laid out in it.
pub(crate) struct Region {
  base: NonNull<u8>,
  size: usize,
}

impl Region {
  pub(crate) fn new(base: NonNull<u8>) -> Self {
    Self { base, size: 0 }
  }

  pub(crate) fn reset(
    &mut self,
    base: NonNull<u8>,
  ) {
    self.base = base;
    self.size = 0;
  }

  #[inline]
  pub(crate) fn base(&self) -> NonNull<u8> {
    self.base
  }

  #[inline]
  pub(crate) fn size(&self) -> usize {
    self.size
  }

  /// Address one past the last byte of the region.
  #[inline]
  pub(crate) fn top(&self) -> usize {
    self.base.as_ptr().addr() + self.size
  }

  pub(crate) fn extend(
    &mut self,
    bytes: usize,
  ) {
    self.size += bytes;
  }

  #[inline]
  pub(crate) fn offset_of(
    &self,
    block: BlockPtr,
  ) -> usize {
    block.addr().wrapping_sub(self.base.as_ptr().addr())
  }

  pub(crate) fn first_block(&self) -> Option<BlockPtr> {
    if self.size == 0 {
      return None;
    }
    // SAFETY: a non-empty region always starts with a block header.
    Some(unsafe { BlockPtr::from_header(self.base) })
  }

  /// The block physically following `block`, or `None` when `block` reaches
  /// the top of the region.
  pub(crate) fn next_block(
    &self,
    block: BlockPtr,
  ) -> Option<BlockPtr> {
    let next = self.offset_of(block).checked_add(block.span())?;
    if next >= self.size {
      return None;
    }
    // SAFETY: `next` is inside the region and blocks tile the region.
    Some(unsafe { BlockPtr::from_header(self.base.add(next)) })
  }

  pub(crate) fn blocks(&self) -> Blocks<'_> {
    Blocks {
      region: self,
      next: self.first_block(),
    }
  }
}

/// Physical-order iterator over a region's blocks.
pub(crate) struct Blocks<'a> {
  region: &'a Region,
  next: Option<BlockPtr>,
}

impl Iterator for Blocks<'_> {
  type Item = BlockPtr;

  fn next(&mut self) -> Option<BlockPtr> {
    let current = self.next?;
    self.next = self.region.next_block(current);
    Some(current)
  }
}
