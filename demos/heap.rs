use std::{io::Read, ptr::NonNull};

use tagalloc::{Heap, HeapConfig, SbrkStore, program_break};

/// Waits until the user presses ENTER.
/// Useful when you want to inspect memory state with tools like `pmap`, `htop`,
/// `gdb`, or just visually track how allocations change the program break.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

fn print_program_break(label: &str) {
  println!(
    "[{}] PID = {}, program break (sbrk(0)) = {:?}",
    label,
    std::process::id(),
    program_break(),
  );
}

fn print_heap(heap: &Heap<SbrkStore>) {
  eprintln!("{}\n", heap.dump());
}

fn allocate(
  heap: &mut Heap<SbrkStore>,
  size: usize,
) -> NonNull<u8> {
  match heap.try_allocate(size) {
    Ok(Some(ptr)) => {
      println!(
        "Allocated {} bytes ({} usable), address = {:?}, program break = {:?}",
        size,
        unsafe { heap.capacity_of(ptr) },
        ptr,
        program_break()
      );
      ptr
    }
    Ok(None) => unreachable!("non-zero request"),
    Err(err) => {
      eprintln!("allocation of {size} bytes failed: {err}");
      std::process::exit(1);
    }
  }
}

fn main() {
  env_logger::init();

  // Make sure stdout has its buffer before we claim the break.
  print_program_break("start");

  // SAFETY: nothing in this program shrinks the break behind the store.
  let store = match unsafe { SbrkStore::new() } {
    Ok(store) => store,
    Err(err) => {
      eprintln!("cannot use sbrk: {err}");
      std::process::exit(1);
    }
  };
  let config = HeapConfig::default().with_verify(true);
  let mut heap = match Heap::with_config(store, config) {
    Ok(heap) => heap,
    Err(err) => {
      eprintln!("cannot initialise heap: {err}");
      std::process::exit(1);
    }
  };
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 1) Three neighbouring blocks, each one grows the region.
  // --------------------------------------------------------------------
  println!("\n[1] Allocate a, b, c");
  let a = allocate(&mut heap, 24);
  let b = allocate(&mut heap, 24);
  let c = allocate(&mut heap, 100);
  unsafe { a.as_ptr().write_bytes(0xAB, 24) };
  print_heap(&heap);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 2) Release a, then b: they merge into a single free block.
  // --------------------------------------------------------------------
  println!("\n[2] Release a and b");
  unsafe {
    heap.release(a);
    heap.release(b);
  }
  print_heap(&heap);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 3) A small request is carved out of the merged block; the break does
  //    not move.
  // --------------------------------------------------------------------
  print_program_break("before reuse");
  println!("\n[3] Allocate 8 bytes (check reuse of freed block)");
  let d = allocate(&mut heap, 8);
  println!(
    "[3] d == a? {}",
    if d == a {
      "Yes, it reused the freed block"
    } else {
      "No, it allocated somewhere else"
    }
  );
  print_program_break("after reuse");
  print_heap(&heap);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 4) Release everything and look at the checker's summary.
  // --------------------------------------------------------------------
  unsafe {
    heap.release(c);
    heap.release(d);
  }
  let report = heap.check();
  println!("\n[4] {:?}", report.stats);
  println!("[4] consistent: {}", report.is_consistent());
  println!("[4] sbrk grown by {} bytes", heap.store().grown());

  println!("\n[5] End of example. Process will exit and the OS will reclaim all memory.");
}
