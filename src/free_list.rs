use crate::block::BlockPtr;

/// Unordered doubly linked list of free blocks, threaded through their
/// payloads. Insertion is at the head, so the most recently freed block is
/// the first one a search sees.
#[derive(Default)]
pub(crate) struct FreeList {
  head: Option<BlockPtr>,
}

impl FreeList {
  #[inline]
  pub(crate) fn head(&self) -> Option<BlockPtr> {
    self.head
  }

  #[inline]
  pub(crate) fn is_empty(&self) -> bool {
    self.head.is_none()
  }

  pub(crate) fn clear(&mut self) {
    self.head = None;
  }

  /// `block` must be tagged free and not already in the list.
  pub(crate) fn push_front(
    &mut self,
    block: BlockPtr,
  ) {
    block.set_free_next(self.head);
    block.set_free_prev(None);
    if let Some(head) = self.head {
      head.set_free_prev(Some(block));
    }
    self.head = Some(block);
  }

  /// `block` must be tagged free and currently in the list.
  pub(crate) fn unlink(
    &mut self,
    block: BlockPtr,
  ) {
    let next = block.free_next();
    let prev = block.free_prev();

    match prev {
      Some(prev) => prev.set_free_next(next),
      None => self.head = next,
    }
    if let Some(next) = next {
      next.set_free_prev(prev);
    }
  }

  /// First block, in list order, whose capacity is at least `min_capacity`.
  pub(crate) fn search_first_fit(
    &self,
    min_capacity: usize,
  ) -> Option<BlockPtr> {
    self
      .iter()
      .find(|block| block.state().capacity() >= min_capacity)
  }

  pub(crate) fn iter(&self) -> Iter {
    Iter { next: self.head }
  }
}

pub(crate) struct Iter {
  next: Option<BlockPtr>,
}

impl Iterator for Iter {
  type Item = BlockPtr;

  fn next(&mut self) -> Option<BlockPtr> {
    let current = self.next?;
    self.next = current.free_next();
    Some(current)
  }
}
