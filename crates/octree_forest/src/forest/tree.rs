//! Tree - the locally owned, Morton-ordered leaves of one octree.
//!
//! Only leaves are stored. Parent/child relationships are computed on demand
//! from the octant coordinates.

use crate::constants::{MAX_LEVEL, QMAX_LEVEL};
use crate::octant::Octant;

/// One cell of the forest and its user payload.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Leaf<D> {
  pub octant: Octant,
  pub data: D,
}

impl<D: Default> Leaf<D> {
  /// Leaf with a default payload.
  pub fn new(octant: Octant) -> Self {
    Self {
      octant,
      data: D::default(),
    }
  }
}

/// Local slice of one tree.
#[derive(Clone, Debug)]
pub struct Tree<D> {
  leaves: Vec<Leaf<D>>,
  /// Leaf count per level.
  per_level: [u64; QMAX_LEVEL as usize + 1],
}

impl<D> Tree<D> {
  /// Create an empty tree slice.
  pub fn new() -> Self {
    Self {
      leaves: Vec::new(),
      per_level: [0; QMAX_LEVEL as usize + 1],
    }
  }

  /// Build from leaves that are already in Morton order.
  pub fn from_leaves(leaves: Vec<Leaf<D>>) -> Self {
    let mut tree = Self::new();
    tree.set_leaves(leaves);
    tree
  }

  /// Number of leaves.
  #[inline]
  pub fn len(&self) -> usize {
    self.leaves.len()
  }

  /// Check if empty.
  #[inline]
  pub fn is_empty(&self) -> bool {
    self.leaves.is_empty()
  }

  /// Leaves in Morton order.
  #[inline]
  pub fn leaves(&self) -> &[Leaf<D>] {
    &self.leaves
  }

  /// Mutable access to the payloads. Octants must not be changed.
  #[inline]
  pub fn leaves_mut(&mut self) -> &mut [Leaf<D>] {
    &mut self.leaves
  }

  /// Leaf count at `level`.
  pub fn count_at(&self, level: u8) -> u64 {
    self.per_level.get(level as usize).copied().unwrap_or(0)
  }

  /// Finest level present, `None` if empty.
  pub fn max_level(&self) -> Option<u8> {
    self
      .per_level
      .iter()
      .rposition(|&count| count > 0)
      .map(|level| level as u8)
  }

  /// Take all leaves out, leaving the tree empty.
  pub fn take_leaves(&mut self) -> Vec<Leaf<D>> {
    self.per_level = [0; QMAX_LEVEL as usize + 1];
    std::mem::take(&mut self.leaves)
  }

  /// Replace all leaves. They must be in Morton order.
  pub fn set_leaves(&mut self, leaves: Vec<Leaf<D>>) {
    self.per_level = [0; QMAX_LEVEL as usize + 1];
    for leaf in &leaves {
      self.per_level[leaf.octant.level as usize] += 1;
    }
    self.leaves = leaves;
  }

  /// Append a leaf that follows all current leaves in Morton order.
  pub fn push(&mut self, leaf: Leaf<D>) {
    debug_assert!(self.leaves.last().map_or(true, |last| last.octant < leaf.octant));
    self.per_level[leaf.octant.level as usize] += 1;
    self.leaves.push(leaf);
  }

  /// Index of the leaf that equals or contains `octant`.
  pub fn find_containing(&self, octant: &Octant) -> Option<usize> {
    find_containing(&self.leaves, |leaf| &leaf.octant, octant)
  }

  /// True if the leaves are strictly increasing, valid, and pairwise
  /// non-overlapping.
  pub fn is_sorted_and_disjoint(&self) -> bool {
    self
      .leaves
      .iter()
      .all(|leaf| leaf.octant.is_valid() && leaf.octant.level <= QMAX_LEVEL)
      && self
        .leaves
        .windows(2)
        .all(|pair| pair[0].octant < pair[1].octant && !pair[0].octant.contains(&pair[1].octant))
  }
}

impl<D> Default for Tree<D> {
  fn default() -> Self {
    Self::new()
  }
}

/// Index of the element of sorted, disjoint `items` that equals or contains
/// `octant`.
///
/// A containing leaf precedes all of its descendants in Morton order, so it
/// is the last element not greater than `octant`.
pub(crate) fn find_containing<T>(
  items: &[T],
  octant_of: impl Fn(&T) -> &Octant,
  octant: &Octant,
) -> Option<usize> {
  let after = items.partition_point(|item| octant_of(item) <= octant);
  let index = after.checked_sub(1)?;
  octant_of(&items[index]).contains(octant).then_some(index)
}

/// True if sorted, disjoint `octants` tile the whole root cube.
pub(crate) fn covers_root<'a>(octants: impl IntoIterator<Item = &'a Octant>) -> bool {
  let mut next = crate::lid::LinearId::ZERO;
  let mut any = false;
  for octant in octants {
    any = true;
    if octant.linear_id(MAX_LEVEL) != next {
      return false;
    }
    next = octant.last_descendant(MAX_LEVEL).linear_id(MAX_LEVEL) + crate::lid::LinearId::ONE;
  }
  any && next == crate::lid::LinearId::ONE << (3 * MAX_LEVEL as u32)
}

#[cfg(test)]
#[path = "tree_test.rs"]
mod tree_test;
