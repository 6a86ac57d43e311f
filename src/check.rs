use std::fmt;

use log::{error, warn};
use thiserror::Error;

use crate::{
  ALIGNMENT,
  block::{BlockPtr, BlockState},
  heap::Heap,
  store::BackingStore,
};

/// A structural problem found by [`Heap::check`]. Blocks are identified by
/// their offset from the region base.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
  #[error("block {block:#x}: previous link is {found:?}, expected {expected:?}")]
  PhysicalPrevMismatch {
    block: usize,
    expected: Option<usize>,
    found: Option<usize>,
  },
  #[error("block {block:#x}: capacity {capacity} is not a non-zero multiple of the alignment unit")]
  UnalignedCapacity { block: usize, capacity: usize },
  #[error("blocks {first:#x} and {second:#x} are adjacent and both free")]
  AdjacentFree { first: usize, second: usize },
  #[error("last block ends at {end:#x} but the region is {region:#x} bytes")]
  ChainLength { end: usize, region: usize },
  #[error("tail marker is {found:?}, last block is {expected:?}")]
  TailMismatch {
    expected: Option<usize>,
    found: Option<usize>,
  },
  #[error("free list node {addr:#x} is not a block of this region")]
  ForeignFreeNode { addr: usize },
  #[error("free list revisits block {block:#x}")]
  FreeListCycle { block: usize },
  #[error("free list contains allocated block {block:#x}")]
  AllocatedInFreeList { block: usize },
  #[error("free list node {block:#x} has a broken back link")]
  BrokenBackLink { block: usize },
  #[error("free block {block:#x} is missing from the free list")]
  UnlistedFreeBlock { block: usize },
  #[error("{physical} free blocks in the region but {listed} on the free list")]
  FreeCountMismatch { physical: usize, listed: usize },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
  pub region_bytes: usize,
  pub blocks: usize,
  pub allocated_blocks: usize,
  pub free_blocks: usize,
  pub allocated_bytes: usize,
  pub free_bytes: usize,
  pub largest_free: usize,
  pub free_list_len: usize,
}

#[derive(Debug, Clone, Default)]
pub struct HeapReport {
  pub stats: HeapStats,
  pub violations: Vec<Violation>,
}

impl HeapReport {
  pub fn is_consistent(&self) -> bool {
    self.violations.is_empty()
  }
}

/// Result of walking the free list against the known block starts.
struct FreeWalk {
  nodes: Vec<BlockPtr>,
  /// Indexed like the physical block list.
  visited: Vec<bool>,
  stop: Option<Violation>,
}

impl<S: BackingStore> Heap<S> {
  /// Walks the region and the free list and reports every structural
  /// violation it finds. Never panics on a corrupted heap; when anything is
  /// wrong each violation is logged at `warn` and a full dump at `error`.
  pub fn check(&self) -> HeapReport {
    let region = self.region();
    let offset = |block: BlockPtr| region.offset_of(block);

    let mut stats = HeapStats {
      region_bytes: region.size(),
      ..HeapStats::default()
    };
    let mut violations = Vec::new();
    let blocks: Vec<BlockPtr> = region.blocks().collect();

    let mut last: Option<BlockPtr> = None;
    for &block in &blocks {
      if block.physical_prev() != last {
        violations.push(Violation::PhysicalPrevMismatch {
          block: offset(block),
          expected: last.map(offset),
          found: block.physical_prev().map(offset),
        });
      }

      let state = block.state();
      if state.capacity() == 0 || state.capacity() % ALIGNMENT != 0 {
        violations.push(Violation::UnalignedCapacity {
          block: offset(block),
          capacity: state.capacity(),
        });
      }

      match state {
        BlockState::Allocated(capacity) => {
          stats.allocated_blocks += 1;
          stats.allocated_bytes += capacity;
        }
        BlockState::Free(capacity) => {
          stats.free_blocks += 1;
          stats.free_bytes += capacity;
          stats.largest_free = stats.largest_free.max(capacity);
          if let Some(prev) = last.filter(|prev| prev.state().is_free()) {
            violations.push(Violation::AdjacentFree {
              first: offset(prev),
              second: offset(block),
            });
          }
        }
      }
      last = Some(block);
    }
    stats.blocks = blocks.len();

    if let Some(last) = last {
      let end = offset(last) + last.span();
      if end != region.size() {
        violations.push(Violation::ChainLength {
          end,
          region: region.size(),
        });
      }
    }
    if self.tail() != last {
      violations.push(Violation::TailMismatch {
        expected: last.map(offset),
        found: self.tail().map(offset),
      });
    }

    let walk = self.walk_free_list(&blocks);
    stats.free_list_len = walk.nodes.len();

    let mut prev: Option<BlockPtr> = None;
    for &node in &walk.nodes {
      if node.free_prev() != prev {
        violations.push(Violation::BrokenBackLink {
          block: offset(node),
        });
      }
      prev = Some(node);
    }

    match walk.stop {
      Some(violation) => violations.push(violation),
      None => {
        for (&block, &listed) in blocks.iter().zip(&walk.visited) {
          if block.state().is_free() && !listed {
            violations.push(Violation::UnlistedFreeBlock {
              block: offset(block),
            });
          }
        }
        if walk.nodes.len() != stats.free_blocks {
          violations.push(Violation::FreeCountMismatch {
            physical: stats.free_blocks,
            listed: walk.nodes.len(),
          });
        }
      }
    }

    if !violations.is_empty() {
      for violation in &violations {
        warn!("heap check: {violation}");
      }
      error!("heap dump:\n{}", self.dump());
    }

    HeapReport { stats, violations }
  }

  /// Follows the free list from its head. Only nodes found among `blocks`
  /// (sorted by address) and tagged free are dereferenced.
  fn walk_free_list(
    &self,
    blocks: &[BlockPtr],
  ) -> FreeWalk {
    let region = self.region();
    let mut visited = vec![false; blocks.len()];
    let mut nodes = Vec::new();
    let mut cursor = self.free_list().head();

    while let Some(node) = cursor {
      let Ok(index) = blocks.binary_search_by_key(&node.addr(), |block| block.addr()) else {
        let stop = Violation::ForeignFreeNode { addr: node.addr() };
        return FreeWalk {
          nodes,
          visited,
          stop: Some(stop),
        };
      };
      if visited[index] {
        let stop = Violation::FreeListCycle {
          block: region.offset_of(node),
        };
        return FreeWalk {
          nodes,
          visited,
          stop: Some(stop),
        };
      }
      visited[index] = true;
      if !node.state().is_free() {
        let stop = Violation::AllocatedInFreeList {
          block: region.offset_of(node),
        };
        return FreeWalk {
          nodes,
          visited,
          stop: Some(stop),
        };
      }
      nodes.push(node);
      cursor = node.free_next();
    }

    FreeWalk {
      nodes,
      visited,
      stop: None,
    }
  }

  /// Printable snapshot of every block and the free list.
  pub fn dump(&self) -> HeapDump<'_, S> {
    HeapDump { heap: self }
  }
}

pub struct HeapDump<'a, S: BackingStore> {
  heap: &'a Heap<S>,
}

struct Link(Option<BlockPtr>);

impl fmt::Display for Link {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    match self.0 {
      Some(block) => write!(f, "{:#x}", block.addr()),
      None => f.write_str("(nil)"),
    }
  }
}

impl<S: BackingStore> fmt::Display for HeapDump<'_, S> {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    let heap = self.heap;
    let region = heap.region();
    let blocks: Vec<BlockPtr> = region.blocks().collect();

    writeln!(f, "heap size:\t{:#x}", region.size())?;
    writeln!(f, "heap start:\t{:p}", region.base())?;
    writeln!(f, "heap end:\t{:#x}", region.top())?;
    writeln!(f, "free list head: {}", Link(heap.free_list().head()))?;
    writeln!(f, "tail: {}", Link(heap.tail()))?;

    for &block in &blocks {
      match block.state() {
        BlockState::Allocated(capacity) => writeln!(
          f,
          "{:#x}: {}\tALLOCATED\tprev: {}",
          block.addr(),
          capacity,
          Link(block.physical_prev())
        )?,
        BlockState::Free(capacity) => writeln!(
          f,
          "{:#x}: -{}\tFREE\tnextFree: {}, prevFree: {}, prev: {}",
          block.addr(),
          capacity,
          Link(block.free_next()),
          Link(block.free_prev()),
          Link(block.physical_prev())
        )?,
      }
    }
    writeln!(f, "END OF HEAP")?;
    writeln!(f)?;

    f.write_str("Head ")?;
    let walk = heap.walk_free_list(&blocks);
    for node in &walk.nodes {
      write!(f, "-> {:#x} ", node.addr())?;
    }
    if let Some(stop) = walk.stop {
      write!(f, "-> !! {stop}")?;
    }
    Ok(())
  }
}
