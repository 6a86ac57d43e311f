use std::ptr::NonNull;

use tagalloc::{ALIGNMENT, ArenaStore, HEADER_SIZE, Heap, HeapConfig};

fn heap() -> Heap<ArenaStore> {
  let config = HeapConfig::default().with_verify(true);
  Heap::with_config(ArenaStore::with_capacity(1 << 20), config).unwrap()
}

#[test_log::test]
fn test_freed_block_is_reused_before_growing() {
  let mut heap = heap();

  let a = heap.allocate(16).unwrap();
  let _b = heap.allocate(16).unwrap();
  unsafe { heap.release(a) };
  let grown = heap.region_size();

  let c = heap.allocate(16).unwrap();

  assert_eq!(c, a);
  assert_eq!(heap.region_size(), grown);
}

#[test_log::test]
fn test_smaller_request_reuses_released_address() {
  let mut heap = heap();

  for (n, m) in [(100, 100), (100, 1), (256, 200), (48, 33)] {
    heap.init().unwrap();
    let p = heap.allocate(n).unwrap();
    let _fence = heap.allocate(8).unwrap();
    unsafe { heap.release(p) };
    let grown = heap.region_size();

    assert_eq!(heap.allocate(m).unwrap(), p);
    assert_eq!(heap.region_size(), grown);
  }
}

#[test_log::test]
fn test_neighbours_merge_into_one_free_block() {
  let mut heap = heap();

  let a = heap.allocate(32).unwrap();
  let b = heap.allocate(32).unwrap();
  let _c = heap.allocate(32).unwrap();
  unsafe {
    heap.release(a);
    heap.release(b);
  }

  let report = heap.check();
  assert!(report.is_consistent(), "{:?}", report.violations);
  assert_eq!(report.stats.free_blocks, 1);
  assert_eq!(report.stats.free_list_len, 1);
  assert_eq!(report.stats.free_bytes, 32 + 32 + HEADER_SIZE);
}

#[test_log::test]
fn test_large_block_serves_two_smaller_requests() {
  let mut heap = heap();

  let big = heap.allocate(512).unwrap();
  unsafe { heap.release(big) };
  let grown = heap.region_size();

  let first = heap.allocate(200).unwrap();
  let second = heap.allocate(200).unwrap();

  assert_eq!(heap.region_size(), grown);
  assert_eq!(first, big);
  assert_eq!(second, unsafe { big.add(208 + HEADER_SIZE) });
}

#[test_log::test]
fn test_zero_size_request() {
  let mut heap = heap();

  assert_eq!(heap.allocate(0), None);
  assert_eq!(heap.region_size(), 0);
}

/// xorshift64, enough to drive a reproducible workload.
struct Rng(u64);

impl Rng {
  fn next(&mut self) -> u64 {
    let mut x = self.0;
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    self.0 = x;
    x
  }

  fn below(
    &mut self,
    bound: usize,
  ) -> usize {
    (self.next() % bound as u64) as usize
  }
}

struct Live {
  ptr: NonNull<u8>,
  size: usize,
  fill: u8,
}

#[test]
fn test_random_interleavings_keep_the_heap_consistent() {
  for seed in [0x9E37_79B9_7F4A_7C15, 0xDEAD_BEEF, 42] {
    let mut rng = Rng(seed);
    let mut heap = Heap::new(ArenaStore::with_capacity(1 << 20)).unwrap();
    let mut live: Vec<Live> = Vec::new();

    for step in 0..3_000 {
      if live.is_empty() || rng.below(100) < 55 {
        let size = 1 + rng.below(400);
        let ptr = heap.allocate(size).unwrap();
        let capacity = unsafe { heap.capacity_of(ptr) };
        assert!(capacity >= size);
        assert_eq!(capacity % ALIGNMENT, 0);
        assert_eq!(ptr.as_ptr().addr() % ALIGNMENT, 0);

        let fill = step as u8;
        unsafe { ptr.as_ptr().write_bytes(fill, size) };
        live.push(Live { ptr, size, fill });
      } else {
        let victim = live.swap_remove(rng.below(live.len()));
        let bytes = unsafe { std::slice::from_raw_parts(victim.ptr.as_ptr(), victim.size) };
        assert!(bytes.iter().all(|&b| b == victim.fill), "payload clobbered at step {step}");
        unsafe { heap.release(victim.ptr) };
      }

      let report = heap.check();
      assert!(report.is_consistent(), "step {step}: {:?}", report.violations);
      assert_eq!(report.stats.free_list_len, report.stats.free_blocks);
      assert_eq!(report.stats.allocated_blocks, live.len());
    }

    for victim in live.drain(..) {
      unsafe { heap.release(victim.ptr) };
    }
    let report = heap.check();
    assert!(report.is_consistent());
    assert_eq!(report.stats.blocks, 1);
    assert_eq!(report.stats.free_bytes, heap.region_size() - HEADER_SIZE);
  }
}
