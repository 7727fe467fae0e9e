//! Test utilities for multi-rank forest tests.
//!
//! Provides forest fixtures and global-invariant checks shared by the
//! forest test modules.

use std::sync::{Arc, Once};

use crate::comm::Comm;
use crate::config::ForestConfig;
use crate::connectivity::{Connectivity, TreeId};
use crate::forest::{Forest, Hooks};
use crate::octant::Octant;

static TRACING: Once = Once::new();

/// Install a test-writer subscriber once; `RUST_LOG` selects the level.
pub fn init_tracing() {
  TRACING.call_once(|| {
    let _ = tracing_subscriber::fmt()
      .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
      .with_test_writer()
      .try_init();
  });
}

// =============================================================================
// Fixtures
// =============================================================================

/// Uniform forest at `level` over `connectivity` with payload 0.
pub fn uniform_forest(comm: Comm, connectivity: Arc<Connectivity>, level: u8) -> Forest<u32> {
  init_tracing();
  Forest::new(comm, connectivity, ForestConfig::uniform(level), |_, _| {}).unwrap()
}

/// Uniform single-tree forest at `level`.
pub fn unit_forest(comm: Comm, level: u8) -> Forest<u32> {
  uniform_forest(comm, Arc::new(Connectivity::unit_cube()), level)
}

/// Forest whose leaves all sit on rank 0.
pub fn skewed_forest(comm: Comm, level: u8) -> Forest<u32> {
  let mut forest = unit_forest(comm, level);
  let total = forest.global_num_octants();
  let mut counts = vec![0; forest.size()];
  counts[0] = total;
  forest.partition_given(&counts).unwrap();
  forest
}

/// Refine everything inside the octant `corner` of tree 0 down to `level`,
/// producing a forest with a sharp level jump.
pub fn refine_corner(forest: &mut Forest<u32>, corner: Octant, level: u8) {
  forest
    .refine(
      true,
      Some(level),
      |tree, leaf| tree == 0 && (corner.contains(&leaf.octant) || leaf.octant.is_ancestor_of(&corner)),
      Hooks::none(),
    )
    .unwrap();
}

// =============================================================================
// Global checks
// =============================================================================

/// Largest level difference between any leaf of a gathered global sequence
/// and its neighbours along `offsets`, by brute force.
pub fn max_level_jump(
  global: &[(TreeId, Octant)],
  connectivity: &Connectivity,
  offsets: &[[i32; 3]],
) -> u8 {
  let mut worst = 0;
  for &(tree, leaf) in global {
    for &offset in offsets {
      let probe = touching_probe(&leaf, offset);
      let Some((other_tree, probe)) = connectivity.transform_exterior(tree, &probe) else {
        continue;
      };
      let neighbor = global
        .iter()
        .find(|(t, o)| *t == other_tree && o.contains(&probe))
        .map(|(_, o)| o.level);
      if let Some(level) = neighbor {
        worst = worst.max(level.abs_diff(leaf.level));
      }
    }
  }
  worst
}

/// Finest cell just outside `leaf` along `offset`.
fn touching_probe(leaf: &Octant, offset: [i32; 3]) -> Octant {
  let len = leaf.side_len();
  let pick = |base: i32, o: i32| match o {
    -1 => base - 1,
    1 => base + len,
    _ => base,
  };
  Octant::from_raw(
    pick(leaf.x, offset[0]),
    pick(leaf.y, offset[1]),
    pick(leaf.z, offset[2]),
    crate::constants::MAX_LEVEL,
  )
}
