//! Octant - immutable value type representing one cell of an octree.
//!
//! Coordinates are stored at the finest resolution (`MAX_LEVEL`), not at the
//! octant's own level. This keeps octants of different sizes directly
//! comparable, which balance and partition rely on. Level 0 is the root,
//! higher levels are finer.

use std::cmp::Ordering;

use crate::constants::{octant_len, CHILDREN, MAX_LEVEL, ROOT_LEN};
use crate::lid::LinearId;

/// One cell of an octree.
///
/// `x`, `y`, `z` are the minimal corner in finest-level units. A valid octant
/// lies inside `[0, ROOT_LEN)^3` and its coordinates are multiples of its
/// length. Neighbour computations may produce octants outside the root; those
/// are only used transiently and never stored in a forest.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub struct Octant {
  /// Minimal corner X at finest resolution
  pub x: i32,
  /// Minimal corner Y at finest resolution
  pub y: i32,
  /// Minimal corner Z at finest resolution
  pub z: i32,
  /// Refinement level (0 = root)
  pub level: u8,
}

impl Octant {
  /// Create a valid octant.
  ///
  /// # Panics
  /// If the octant is not aligned to its level or lies outside the root.
  pub fn new(x: i32, y: i32, z: i32, level: u8) -> Self {
    let octant = Self { x, y, z, level };
    assert!(
      octant.is_valid(),
      "octant ({x}, {y}, {z}) at level {level} is outside the root or misaligned"
    );
    octant
  }

  /// Create an octant without validation (may lie outside the root).
  #[inline]
  pub(crate) const fn from_raw(x: i32, y: i32, z: i32, level: u8) -> Self {
    Self { x, y, z, level }
  }

  /// The root octant.
  #[inline]
  pub const fn root() -> Self {
    Self::from_raw(0, 0, 0, 0)
  }

  /// Side length in finest-level units.
  #[inline]
  pub const fn side_len(&self) -> i32 {
    octant_len(self.level)
  }

  /// Coordinates as an array.
  #[inline]
  pub const fn coords(&self) -> [i32; 3] {
    [self.x, self.y, self.z]
  }

  /// True if the coordinates are inside the root cube.
  #[inline]
  pub fn is_inside_root(&self) -> bool {
    (0..ROOT_LEN).contains(&self.x)
      && (0..ROOT_LEN).contains(&self.y)
      && (0..ROOT_LEN).contains(&self.z)
  }

  /// True if inside the root and aligned to the octant's own length.
  pub fn is_valid(&self) -> bool {
    if self.level > MAX_LEVEL || !self.is_inside_root() {
      return false;
    }
    let mask = self.side_len() - 1;
    (self.x & mask) == 0 && (self.y & mask) == 0 && (self.z & mask) == 0
  }

  /// Get child octant (finer detail: level + 1).
  ///
  /// Child: 0-7 where bits represent +X, +Y, +Z offsets:
  /// - bit 0: X offset (0 or 1)
  /// - bit 1: Y offset (0 or 1)
  /// - bit 2: Z offset (0 or 1)
  ///
  /// # Panics
  /// If the octant is already at `MAX_LEVEL`.
  pub fn child(&self, child: usize) -> Self {
    assert!(self.level < MAX_LEVEL, "cannot refine below MAX_LEVEL");
    debug_assert!(child < CHILDREN);
    let half = octant_len(self.level + 1);
    Self::from_raw(
      self.x + if child & 1 != 0 { half } else { 0 },
      self.y + if child & 2 != 0 { half } else { 0 },
      self.z + if child & 4 != 0 { half } else { 0 },
      self.level + 1,
    )
  }

  /// All 8 children in Morton order.
  pub fn children(&self) -> [Self; CHILDREN] {
    std::array::from_fn(|i| self.child(i))
  }

  /// Get parent octant (coarser: level - 1).
  ///
  /// Returns None for the root.
  pub fn parent(&self) -> Option<Self> {
    if self.level == 0 {
      return None;
    }
    let len = self.side_len();
    Some(Self::from_raw(
      self.x & !len,
      self.y & !len,
      self.z & !len,
      self.level - 1,
    ))
  }

  /// Position among siblings (0-7); the root reports 0.
  pub fn child_id(&self) -> usize {
    if self.level == 0 {
      return 0;
    }
    let len = self.side_len();
    (((self.x & len) != 0) as usize)
      | ((((self.y & len) != 0) as usize) << 1)
      | ((((self.z & len) != 0) as usize) << 2)
  }

  /// Sibling with the given child id.
  pub fn sibling(&self, child: usize) -> Self {
    match self.parent() {
      Some(parent) => parent.child(child),
      None => *self,
    }
  }

  /// Ancestor at `level` (which must not be finer than this octant).
  pub fn ancestor(&self, level: u8) -> Self {
    debug_assert!(level <= self.level);
    let mask = !(octant_len(level) - 1);
    Self::from_raw(self.x & mask, self.y & mask, self.z & mask, level)
  }

  /// First (minimal corner) descendant at `level`.
  pub fn first_descendant(&self, level: u8) -> Self {
    debug_assert!(level >= self.level);
    Self::from_raw(self.x, self.y, self.z, level)
  }

  /// Last (maximal corner) descendant at `level`.
  pub fn last_descendant(&self, level: u8) -> Self {
    debug_assert!(level >= self.level);
    let shift = self.side_len() - octant_len(level);
    Self::from_raw(self.x + shift, self.y + shift, self.z + shift, level)
  }

  /// True if `self` strictly contains `other`.
  pub fn is_ancestor_of(&self, other: &Self) -> bool {
    self.level < other.level && other.ancestor(self.level).coords() == self.coords()
  }

  /// True if `self` equals or contains `other`.
  pub fn contains(&self, other: &Self) -> bool {
    self.level <= other.level && other.ancestor(self.level).coords() == self.coords()
  }

  /// True if `self` is the immediate parent of `other`.
  pub fn is_parent_of(&self, other: &Self) -> bool {
    other.parent().is_some_and(|p| p == *self)
  }

  /// True if both octants share a parent and differ.
  pub fn is_sibling_of(&self, other: &Self) -> bool {
    self != other && self.level > 0 && self.parent() == other.parent()
  }

  /// True if `octants` are exactly the 8 children of one parent, in order.
  pub fn is_family(octants: &[Self]) -> bool {
    if octants.len() != CHILDREN || octants[0].level == 0 {
      return false;
    }
    let Some(parent) = octants[0].parent() else {
      return false;
    };
    octants
      .iter()
      .enumerate()
      .all(|(i, octant)| *octant == parent.child(i))
  }

  /// Same-size neighbour shifted by `offset` octant lengths per axis.
  ///
  /// The result may lie outside the root.
  pub fn neighbor(&self, offset: [i32; 3]) -> Self {
    let len = self.side_len();
    Self::from_raw(
      self.x + offset[0] * len,
      self.y + offset[1] * len,
      self.z + offset[2] * len,
      self.level,
    )
  }

  /// Translate by whole finest-level units, keeping the level.
  pub(crate) fn translated(&self, delta: [i32; 3]) -> Self {
    Self::from_raw(
      self.x + delta[0],
      self.y + delta[1],
      self.z + delta[2],
      self.level,
    )
  }

  /// Smallest octant containing both `self` and `other`.
  pub fn nearest_common_ancestor(&self, other: &Self) -> Self {
    let diff = ((self.x ^ other.x) | (self.y ^ other.y) | (self.z ^ other.z)) as u32;
    let level_of_diff = if diff == 0 {
      MAX_LEVEL
    } else {
      // highest differing bit b forces the ancestor length 2^(b+1)
      let highest = 31 - diff.leading_zeros();
      MAX_LEVEL.saturating_sub(highest as u8 + 1)
    };
    let level = level_of_diff.min(self.level).min(other.level);
    self.ancestor(level)
  }

  /// Linear position on the uniform grid of `level`.
  ///
  /// Octants finer than the grid map to their ancestor at `level`; coarser
  /// octants map to the grid cell containing their minimal corner. Bit `i`
  /// of the grid coordinate goes to bit `3i` (x), `3i + 1` (y), `3i + 2` (z).
  ///
  /// # Panics
  /// If `level > MAX_LEVEL` or the octant lies outside the root.
  pub fn linear_id(&self, level: u8) -> LinearId {
    assert!(level <= MAX_LEVEL, "grid level {level} exceeds MAX_LEVEL");
    assert!(self.is_inside_root(), "linear id of octant outside the root: {self:?}");
    let shift = (MAX_LEVEL - level) as u32;
    let x = (self.x as u32) >> shift;
    let y = (self.y as u32) >> shift;
    let z = (self.z as u32) >> shift;

    let mut id = LinearId::ZERO;
    for i in 0..level as u32 {
      if (x >> i) & 1 == 1 {
        id.set_bit(3 * i);
      }
      if (y >> i) & 1 == 1 {
        id.set_bit(3 * i + 1);
      }
      if (z >> i) & 1 == 1 {
        id.set_bit(3 * i + 2);
      }
    }
    id
  }

  /// Octant at `level` located at linear position `id` of the uniform grid.
  ///
  /// Inverse of [`Octant::linear_id`] at equal levels.
  ///
  /// # Panics
  /// If `level > MAX_LEVEL` or `id` has bits beyond `3 * level`.
  pub fn from_linear_id(id: LinearId, level: u8) -> Self {
    assert!(level <= MAX_LEVEL, "grid level {level} exceeds MAX_LEVEL");
    assert!(
      id.bit_len() <= 3 * level as u32,
      "linear id {id} does not fit a grid of level {level}"
    );
    let (mut x, mut y, mut z) = (0i32, 0i32, 0i32);
    for i in 0..level as u32 {
      x |= (id.bit(3 * i) as i32) << i;
      y |= (id.bit(3 * i + 1) as i32) << i;
      z |= (id.bit(3 * i + 2) as i32) << i;
    }
    let shift = (MAX_LEVEL - level) as u32;
    Self::from_raw(x << shift, y << shift, z << shift, level)
  }
}

impl Ord for Octant {
  /// Morton order: the highest differing interleaved bit decides (z above
  /// y above x); with equal corners the coarser octant comes first.
  fn cmp(&self, other: &Self) -> Ordering {
    let ex = (self.x ^ other.x) as u32;
    let ey = (self.y ^ other.y) as u32;
    let ez = (self.z ^ other.z) as u32;
    let exy = ex | ey;
    if (exy | ez) == 0 {
      return self.level.cmp(&other.level);
    }
    if ez > (exy & !ez) {
      self.z.cmp(&other.z)
    } else if ey > (ex & !ey) {
      self.y.cmp(&other.y)
    } else {
      self.x.cmp(&other.x)
    }
  }
}

impl PartialOrd for Octant {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

#[cfg(test)]
#[path = "octant_test.rs"]
mod octant_test;
