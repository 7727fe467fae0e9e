//! Octree resolution constants and neighbour direction tables.
//!
//! Coordinates of every octant live on the finest grid of `ROOT_LEN` cells
//! per axis. An octant at level `l` has side length `2^(MAX_LEVEL - l)`.
//!
//! ```text
//! level 0   ┌───────────────┐  len = 2^30
//!           │               │
//! level 1   ├───────┬───────┤  len = 2^29
//!           │       │       │
//! level 2   ├───┬───┼───┬───┤  len = 2^28
//!   ...
//! level 30  ├┬┬┬┬┬┬┬┼┬┬┬┬┬┬┬┤  len = 1 (position markers only)
//! ```
//!
//! # Child numbering
//!
//! ```text
//! Child index bits (binary: ZYX):
//!   0 = (0,0,0)    4 = (0,0,1)
//!   1 = (1,0,0)    5 = (1,0,1)
//!   2 = (0,1,0)    6 = (0,1,1)
//!   3 = (1,1,0)    7 = (1,1,1)
//! ```

/// Spatial dimension.
pub const DIM: usize = 3;

/// Children per octant (2^DIM).
pub const CHILDREN: usize = 1 << DIM;

/// Finest coordinate resolution level.
///
/// At this level a linear id needs `3 * 30 = 90` bits.
pub const MAX_LEVEL: u8 = 30;

/// Finest level an octant stored in a forest may have.
///
/// One below `MAX_LEVEL` so that same-size neighbours of any stored octant
/// can be represented without overflowing `i32`.
pub const QMAX_LEVEL: u8 = MAX_LEVEL - 1;

/// Side length of the root octant in finest-level units.
pub const ROOT_LEN: i32 = 1 << MAX_LEVEL;

/// Number of faces of an octant.
pub const FACES: usize = 6;

/// Number of edges of an octant.
pub const EDGES: usize = 12;

/// Number of corners of an octant.
pub const CORNERS: usize = 8;

/// Offsets of the 6 face neighbours, in units of the octant length.
pub const FACE_OFFSETS: [[i32; 3]; FACES] = [
  [-1, 0, 0], // -X
  [1, 0, 0],  // +X
  [0, -1, 0], // -Y
  [0, 1, 0],  // +Y
  [0, 0, -1], // -Z
  [0, 0, 1],  // +Z
];

/// Offsets of the 12 edge neighbours.
///
/// Edges 0-3 are parallel to X, 4-7 to Y, 8-11 to Z.
pub const EDGE_OFFSETS: [[i32; 3]; EDGES] = [
  [0, -1, -1],
  [0, 1, -1],
  [0, -1, 1],
  [0, 1, 1],
  [-1, 0, -1],
  [1, 0, -1],
  [-1, 0, 1],
  [1, 0, 1],
  [-1, -1, 0],
  [1, -1, 0],
  [-1, 1, 0],
  [1, 1, 0],
];

/// Offsets of the 8 corner neighbours, indexed like children (binary ZYX).
pub const CORNER_OFFSETS: [[i32; 3]; CORNERS] = [
  [-1, -1, -1],
  [1, -1, -1],
  [-1, 1, -1],
  [1, 1, -1],
  [-1, -1, 1],
  [1, -1, 1],
  [-1, 1, 1],
  [1, 1, 1],
];

/// Side length of an octant at `level`.
#[inline(always)]
pub const fn octant_len(level: u8) -> i32 {
  1 << (MAX_LEVEL - level)
}

#[cfg(test)]
#[path = "constants_test.rs"]
mod constants_test;
