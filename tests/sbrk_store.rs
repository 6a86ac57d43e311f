//! The program break is process-wide, so everything touching it lives in this
//! single test, in its own test binary.
#![cfg(unix)]

use tagalloc::{ALIGNMENT, BackingStore, HEADER_SIZE, Heap, HeapError, SbrkStore, StoreError, program_break};

#[test]
fn test_sbrk_store_lifecycle() {
  let mut store = unsafe { SbrkStore::new() }.unwrap();
  let base = store.region_base();
  let base_addr = base.as_ptr().addr();

  assert_eq!(base_addr % ALIGNMENT, 0);
  assert_eq!(program_break().addr(), base_addr);

  // Growth hands back the previous top.
  assert_eq!(store.grow_region(64).unwrap(), base);
  assert_eq!(store.grow_region(32).unwrap(), unsafe { base.add(64) });
  assert_eq!(program_break().addr(), base_addr + 96);

  assert!(matches!(
    store.grow_region(isize::MAX as usize + 1),
    Err(StoreError::TooLarge(_))
  ));
  // Fits intptr_t but no address space can back it: sbrk's (void*)-1.
  assert!(matches!(
    store.grow_region(isize::MAX as usize / 2),
    Err(StoreError::Os(_))
  ));
  assert_eq!(store.grown(), 96);
  assert_eq!(program_break().addr(), base_addr + 96);

  // Someone else grows the break above us: reset must not release their bytes.
  let foreign = unsafe { libc::sbrk(4096) };
  assert_eq!(foreign.addr(), base_addr + 96);
  let err = store.reset_region().unwrap_err();
  assert!(matches!(
    err,
    StoreError::Shared { expected, found } if expected == base_addr + 96 && found == base_addr + 96 + 4096
  ));
  assert_eq!(store.grown(), 96);
  assert_eq!(program_break().addr(), base_addr + 96 + 4096);

  unsafe { libc::sbrk(-4096) };
  store.reset_region().unwrap();
  assert_eq!(store.grown(), 0);
  assert_eq!(program_break().addr(), base_addr);

  // Same through the heap: init refuses while a foreign growth sits on top.
  let mut heap = Heap::new(store).unwrap();
  let ptr = heap.allocate(64).unwrap();
  assert_eq!(ptr, unsafe { base.add(HEADER_SIZE) });
  assert_eq!(program_break().addr(), base_addr + 64 + HEADER_SIZE);

  unsafe { libc::sbrk(4096) };
  assert!(matches!(heap.init(), Err(HeapError::Store(StoreError::Shared { .. }))));
  assert_eq!(program_break().addr(), base_addr + 64 + HEADER_SIZE + 4096);

  unsafe { libc::sbrk(-4096) };
  heap.init().unwrap();
  assert_eq!(heap.region_size(), 0);
  assert_eq!(program_break().addr(), base_addr);
}
