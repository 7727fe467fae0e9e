//! Connectivity - how the trees of a forest are stitched together.
//!
//! The forest only reads it. Trees are arranged as an axis-aligned brick of
//! `nx * ny * nz` unit cubes with identical orientation, optionally periodic
//! per axis, so crossing a tree boundary is a pure translation by `ROOT_LEN`.
//!
//! ```text
//!   tree index = tx + nx * (ty + ny * tz)
//!
//!   ┌────┬────┬────┐
//!   │ 3  │ 4  │ 5  │   ty = 1
//!   ├────┼────┼────┤
//!   │ 0  │ 1  │ 2  │   ty = 0
//!   └────┴────┴────┘
//!    tx=0 tx=1 tx=2
//! ```

use glam::DVec3;

use crate::bounds::DAabb3;
use crate::constants::{MAX_LEVEL, ROOT_LEN};
use crate::octant::Octant;

/// Index of a tree within a connectivity.
pub type TreeId = u32;

/// Number of neighbour slots per tree (3x3x3 offsets including the tree itself).
const NEIGHBOR_SLOTS: usize = 27;

/// Read-only description of the trees and their adjacency.
#[derive(Clone, Debug)]
pub struct Connectivity {
  dims: [u32; 3],
  /// Physical edge length of each tree.
  tree_size: f64,
  /// Physical origin of tree 0.
  origin: DVec3,
  /// Neighbour tree per offset slot, `None` at a non-periodic boundary.
  neighbors: Vec<[Option<TreeId>; NEIGHBOR_SLOTS]>,
}

#[inline]
fn slot(offset: [i32; 3]) -> usize {
  ((offset[0] + 1) + 3 * (offset[1] + 1) + 9 * (offset[2] + 1)) as usize
}

impl Connectivity {
  /// A single tree covering the unit cube.
  pub fn unit_cube() -> Self {
    Self::brick([1, 1, 1], [false; 3])
  }

  /// A single tree connected to itself across every face.
  pub fn periodic() -> Self {
    Self::brick([1, 1, 1], [true; 3])
  }

  /// A brick of `dims[0] * dims[1] * dims[2]` trees.
  ///
  /// # Panics
  /// If any dimension is zero or the tree count overflows `TreeId`.
  pub fn brick(dims: [u32; 3], periodic: [bool; 3]) -> Self {
    assert!(dims.iter().all(|&d| d > 0), "brick dimensions must be positive");
    let num_trees = dims
      .iter()
      .try_fold(1u32, |acc, &d| acc.checked_mul(d))
      .expect("brick tree count overflows TreeId");

    let mut neighbors = Vec::with_capacity(num_trees as usize);
    for tree in 0..num_trees {
      let coords = Self::coords_in(dims, tree);
      let mut slots = [None; NEIGHBOR_SLOTS];
      for dz in -1..=1 {
        for dy in -1..=1 {
          for dx in -1..=1 {
            let offset = [dx, dy, dz];
            slots[slot(offset)] = Self::shifted(dims, periodic, coords, offset);
          }
        }
      }
      neighbors.push(slots);
    }

    Self {
      dims,
      tree_size: 1.0,
      origin: DVec3::ZERO,
      neighbors,
    }
  }

  /// Set the physical placement of the brick.
  pub fn with_geometry(mut self, origin: DVec3, tree_size: f64) -> Self {
    debug_assert!(tree_size > 0.0);
    self.origin = origin;
    self.tree_size = tree_size;
    self
  }

  fn coords_in(dims: [u32; 3], tree: TreeId) -> [u32; 3] {
    [
      tree % dims[0],
      (tree / dims[0]) % dims[1],
      tree / (dims[0] * dims[1]),
    ]
  }

  fn shifted(
    dims: [u32; 3],
    periodic: [bool; 3],
    coords: [u32; 3],
    offset: [i32; 3],
  ) -> Option<TreeId> {
    let mut moved = [0u32; 3];
    for axis in 0..3 {
      let n = dims[axis] as i64;
      let mut c = coords[axis] as i64 + offset[axis] as i64;
      if c < 0 || c >= n {
        if !periodic[axis] {
          return None;
        }
        c = c.rem_euclid(n);
      }
      moved[axis] = c as u32;
    }
    Some(moved[0] + dims[0] * (moved[1] + dims[1] * moved[2]))
  }

  /// Number of trees.
  #[inline]
  pub fn num_trees(&self) -> u32 {
    self.neighbors.len() as u32
  }

  /// Brick dimensions.
  #[inline]
  pub fn dims(&self) -> [u32; 3] {
    self.dims
  }

  /// Brick coordinates of a tree.
  pub fn tree_coords(&self, tree: TreeId) -> [u32; 3] {
    Self::coords_in(self.dims, tree)
  }

  /// Tree adjacent to `tree` across the face, edge, or corner given by
  /// `offset` (each component in `-1..=1`).
  pub fn neighbor_tree(&self, tree: TreeId, offset: [i32; 3]) -> Option<TreeId> {
    debug_assert!(offset.iter().all(|c| (-1..=1).contains(c)));
    self.neighbors[tree as usize][slot(offset)]
  }

  /// Move an octant that lies outside its tree's root into the tree that
  /// owns that region.
  ///
  /// Returns the octant unchanged if it is inside the root, and `None` if it
  /// lies beyond a non-periodic domain boundary.
  pub fn transform_exterior(&self, tree: TreeId, octant: &Octant) -> Option<(TreeId, Octant)> {
    let mut offset = [0i32; 3];
    for (axis, c) in octant.coords().into_iter().enumerate() {
      offset[axis] = if c < 0 {
        -1
      } else if c >= ROOT_LEN {
        1
      } else {
        0
      };
    }
    if offset == [0, 0, 0] {
      return Some((tree, *octant));
    }
    let target = self.neighbor_tree(tree, offset)?;
    let delta = offset.map(|o| -o * ROOT_LEN);
    Some((target, octant.translated(delta)))
  }

  /// Physical extent of a tree.
  pub fn tree_bounds(&self, tree: TreeId) -> DAabb3 {
    let [tx, ty, tz] = self.tree_coords(tree);
    let min = self.origin + DVec3::new(tx as f64, ty as f64, tz as f64) * self.tree_size;
    DAabb3::new(min, min + DVec3::splat(self.tree_size))
  }

  /// Physical extent of an octant of `tree`.
  pub fn octant_bounds(&self, tree: TreeId, octant: &Octant) -> DAabb3 {
    let scale = 1.0 / (1u64 << MAX_LEVEL) as f64;
    let lo = DVec3::new(octant.x as f64, octant.y as f64, octant.z as f64) * scale;
    let hi = lo + DVec3::splat(octant.side_len() as f64 * scale);
    self.tree_bounds(tree).sub_box(lo, hi)
  }
}

#[cfg(test)]
#[path = "connectivity_test.rs"]
mod connectivity_test;
