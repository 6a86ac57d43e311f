use std::{
  ptr::NonNull,
  sync::{Mutex, MutexGuard, PoisonError},
};

use crate::{
  check::HeapReport,
  heap::{Heap, HeapError},
  store::BackingStore,
};

/// A [`Heap`] behind one mutex, for callers that share it between threads.
///
/// Every operation takes the lock for its whole duration; the heap itself has
/// no internal synchronisation.
pub struct LockedHeap<S: BackingStore> {
  inner: Mutex<Heap<S>>,
}

impl<S: BackingStore> LockedHeap<S> {
  pub fn new(heap: Heap<S>) -> Self {
    Self {
      inner: Mutex::new(heap),
    }
  }

  fn lock(&self) -> MutexGuard<'_, Heap<S>> {
    self.inner.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn allocate(
    &self,
    size: usize,
  ) -> Option<NonNull<u8>> {
    self.lock().allocate(size)
  }

  pub fn try_allocate(
    &self,
    size: usize,
  ) -> Result<Option<NonNull<u8>>, HeapError> {
    self.lock().try_allocate(size)
  }

  /// # Safety
  ///
  /// Same contract as [`Heap::release`].
  pub unsafe fn release(
    &self,
    ptr: NonNull<u8>,
  ) {
    unsafe { self.lock().release(ptr) }
  }

  pub fn check(&self) -> HeapReport {
    self.lock().check()
  }

  /// Runs `f` with exclusive access to the heap.
  pub fn with<R>(
    &self,
    f: impl FnOnce(&mut Heap<S>) -> R,
  ) -> R {
    f(&mut self.lock())
  }

  pub fn into_inner(self) -> Heap<S> {
    self.inner.into_inner().unwrap_or_else(PoisonError::into_inner)
  }
}

#[cfg(test)]
mod tests {
  use std::{sync::Arc, thread};

  use super::*;
  use crate::store::ArenaStore;

  #[test]
  fn test_shared_between_threads() {
    let heap = Heap::new(ArenaStore::with_capacity(1 << 16)).unwrap();
    let locked = Arc::new(LockedHeap::new(heap));

    let workers: Vec<_> = (0..4u8)
      .map(|id| {
        let locked = Arc::clone(&locked);
        thread::spawn(move || {
          for round in 0..50usize {
            let size = 8 + (round % 5) * 24;
            let ptr = locked.allocate(size).unwrap();
            unsafe {
              ptr.as_ptr().write_bytes(id, size);
              assert!((0..size).all(|i| *ptr.as_ptr().add(i) == id));
              locked.release(ptr);
            }
          }
        })
      })
      .collect();

    for worker in workers {
      worker.join().unwrap();
    }

    let report = locked.check();
    assert!(report.is_consistent(), "{:?}", report.violations);
    assert_eq!(report.stats.allocated_blocks, 0);
    assert!(report.stats.free_blocks <= 1);
  }

  #[test]
  fn test_with_and_into_inner() {
    let locked = LockedHeap::new(Heap::new(ArenaStore::with_capacity(1024)).unwrap());

    let size = locked.with(|heap| {
      heap.allocate(40).unwrap();
      heap.region_size()
    });

    assert_eq!(locked.into_inner().region_size(), size);
  }
}
