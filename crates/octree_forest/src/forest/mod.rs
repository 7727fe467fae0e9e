//! Distributed forest of octrees.
//!
//! Each rank owns a contiguous slice of the global leaf sequence: trees in
//! index order, leaves of a tree in Morton order, ranks in rank order. The
//! global layout (`global_first_octant`, `global_first_position`) is
//! replicated on every rank and refreshed after every collective mutation.
//!
//! # Module Structure
//!
//! - [`tree`]: `Tree`, `Leaf` - local leaves of one tree
//! - [`hooks`]: `Hooks`, `CoarsenCandidate` - user callbacks
//! - `adapt`: refine and coarsen
//! - `balance`: 2:1 size balance
//! - `partition`: load redistribution
//!
//! All mutating operations are collective: every rank of the group must call
//! them in the same order.

mod adapt;
mod balance;
pub mod hooks;
mod partition;
pub mod tree;

use std::sync::Arc;

use crate::bounds::DAabb3;
use crate::comm::{Comm, Rank};
use crate::config::ForestConfig;
use crate::connectivity::{Connectivity, TreeId};
use crate::constants::MAX_LEVEL;
use crate::error::{ForestError, ForestResult};
use crate::inspect::Inspect;
use crate::lid::LinearId;
use crate::octant::Octant;

pub use adapt::AdaptStats;
pub use balance::BalanceStats;
pub use hooks::{CoarsenCandidate, Hooks, InitFn, ReplaceFn};
pub use partition::WeightFn;
pub use tree::{Leaf, Tree};

/// Location of the first leaf of a rank: its tree and its minimal corner at
/// the finest level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
  pub tree: TreeId,
  pub octant: Octant,
}

impl Position {
  /// Position of the minimal corner of `octant` in `tree`.
  pub fn of(tree: TreeId, octant: &Octant) -> Self {
    Self {
      tree,
      octant: octant.first_descendant(MAX_LEVEL),
    }
  }

  /// Sentinel following every leaf of a forest with `num_trees` trees.
  pub fn end(num_trees: u32) -> Self {
    Self {
      tree: num_trees,
      octant: Octant::root().first_descendant(MAX_LEVEL),
    }
  }
}

/// One rank's part of a distributed forest.
pub struct Forest<D> {
  comm: Comm,
  connectivity: Arc<Connectivity>,
  trees: Vec<Tree<D>>,
  local_num_octants: u64,
  global_num_octants: u64,
  /// Global index of each rank's first leaf, `size + 1` entries.
  global_first_octant: Vec<u64>,
  /// Position of each rank's first leaf, `size + 1` entries.
  global_first_position: Vec<Position>,
  revision: u64,
  inspect: Option<Inspect>,
}

impl<D> std::fmt::Debug for Forest<D> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Forest")
      .field("rank", &self.comm.rank())
      .field("local_num_octants", &self.local_num_octants)
      .field("global_num_octants", &self.global_num_octants)
      .field("revision", &self.revision)
      .finish_non_exhaustive()
  }
}

/// Count-balanced start offsets: rank `r` gets `total / size` items, plus
/// one if `r < total % size`. Returns `size + 1` offsets.
pub fn uniform_offsets(total: u64, size: usize) -> Vec<u64> {
  let size64 = size as u64;
  let base = total / size64;
  let rem = total % size64;
  (0..=size64).map(|r| r * base + r.min(rem)).collect()
}

impl<D: Default + Send + 'static> Forest<D> {
  /// Collective: build a new forest over `connectivity`.
  ///
  /// The starting level follows [`ForestConfig::starting_level`]. Ranks
  /// receive count-balanced contiguous ranges of the uniform grid; with
  /// `fill_uniform == false` every range is covered by the coarsest
  /// possible leaves instead. `init` runs once per created leaf.
  #[tracing::instrument(skip_all, fields(rank = comm.rank()))]
  pub fn new(
    comm: Comm,
    connectivity: Arc<Connectivity>,
    config: ForestConfig,
    mut init: impl FnMut(TreeId, &mut Leaf<D>),
  ) -> ForestResult<Self> {
    let num_trees = connectivity.num_trees();
    let level = config.starting_level(num_trees, comm.size())?;
    let per_tree = 1u128 << (3 * level as u32);
    let total = (num_trees as u128) * per_tree;
    let total = u64::try_from(total).map_err(|_| {
      ForestError::InvalidConfig(format!(
        "{total} leaves at level {level} exceed the global index range"
      ))
    })?;
    let per_tree = per_tree as u64;

    let offsets = uniform_offsets(total, comm.size());
    let (begin, end) = (offsets[comm.rank()], offsets[comm.rank() + 1]);

    let mut trees: Vec<Tree<D>> = (0..num_trees).map(|_| Tree::new()).collect();
    if begin < end {
      let first_tree = (begin / per_tree) as TreeId;
      let last_tree = ((end - 1) / per_tree) as TreeId;
      for tree in first_tree..=last_tree {
        let tree_begin = tree as u64 * per_tree;
        let lo = begin.max(tree_begin) - tree_begin;
        let hi = end.min(tree_begin + per_tree) - tree_begin;
        let octants = if config.fill_uniform {
          (lo..hi)
            .map(|id| Octant::from_linear_id(LinearId::from(id), level))
            .collect()
        } else {
          let mut cover = Vec::new();
          coarse_cover(
            Octant::root(),
            level,
            LinearId::from(lo),
            LinearId::from(hi - 1),
            &mut cover,
          );
          cover
        };
        let leaves = octants
          .into_iter()
          .map(|octant| {
            let mut leaf = Leaf::new(octant);
            init(tree, &mut leaf);
            leaf
          })
          .collect();
        trees[tree as usize].set_leaves(leaves);
      }
    }

    let mut forest = Self {
      comm,
      connectivity,
      trees,
      local_num_octants: 0,
      global_num_octants: 0,
      global_first_octant: Vec::new(),
      global_first_position: Vec::new(),
      revision: 0,
      inspect: None,
    };
    forest.sync_layout()?;
    tracing::debug!(
      level,
      local = forest.local_num_octants,
      global = forest.global_num_octants,
      "forest created"
    );
    Ok(forest)
  }

  /// Collective: recompute local counts and allgather the global layout.
  ///
  /// Mutating collectives do this themselves; it is needed after local
  /// operations such as [`Forest::balance_subtree`].
  pub fn sync_layout(&mut self) -> ForestResult<()> {
    self.local_num_octants = self.trees.iter().map(|t| t.len() as u64).sum();
    let first = self
      .trees
      .iter()
      .enumerate()
      .find_map(|(index, tree)| {
        tree
          .leaves()
          .first()
          .map(|leaf| Position::of(index as TreeId, &leaf.octant))
      });
    let gathered = self.comm.allgather((self.local_num_octants, first))?;

    let size = self.comm.size();
    let mut offsets = Vec::with_capacity(size + 1);
    let mut running = 0u64;
    for &(count, _) in &gathered {
      offsets.push(running);
      running += count;
    }
    offsets.push(running);

    let mut positions = vec![Position::end(self.connectivity.num_trees()); size + 1];
    for rank in (0..size).rev() {
      positions[rank] = gathered[rank].1.unwrap_or(positions[rank + 1]);
    }

    self.global_num_octants = running;
    self.global_first_octant = offsets;
    self.global_first_position = positions;
    Ok(())
  }

  /// Sync the layout after a mutation and bump the revision if the global
  /// leaf count changed.
  pub(crate) fn finish_mutation(&mut self, global_before: u64) -> ForestResult<()> {
    self.sync_layout()?;
    if self.global_num_octants != global_before {
      self.revision += 1;
    }
    Ok(())
  }

  /// Deep copy sharing the connectivity and the communicator.
  ///
  /// The copy starts at revision 0 without an inspect record. Without
  /// `copy_data` all payloads are reset to `D::default()`. Both forests draw
  /// collective epochs from the same counter, so they may be mutated in any
  /// interleaving as long as every rank follows it.
  pub fn copy(&self, copy_data: bool) -> Self
  where
    D: Clone,
  {
    self.copy_onto(self.comm.clone(), copy_data)
  }

  /// Collective: like [`Forest::copy`], but the copy runs on a duplicated
  /// communicator, so its collectives never interleave with the original's.
  #[tracing::instrument(skip_all, fields(rank = self.comm.rank()))]
  pub fn copy_with_duplicate_comm(&self, copy_data: bool) -> ForestResult<Self>
  where
    D: Clone,
  {
    let comm = self.comm.duplicate()?;
    Ok(self.copy_onto(comm, copy_data))
  }

  fn copy_onto(&self, comm: Comm, copy_data: bool) -> Self
  where
    D: Clone,
  {
    let trees = self
      .trees
      .iter()
      .map(|tree| {
        if copy_data {
          tree.clone()
        } else {
          Tree::from_leaves(tree.leaves().iter().map(|l| Leaf::new(l.octant)).collect())
        }
      })
      .collect();
    Self {
      comm,
      connectivity: Arc::clone(&self.connectivity),
      trees,
      local_num_octants: self.local_num_octants,
      global_num_octants: self.global_num_octants,
      global_first_octant: self.global_first_octant.clone(),
      global_first_position: self.global_first_position.clone(),
      revision: 0,
      inspect: None,
    }
  }
}

impl<D> Forest<D> {
  /// This rank.
  #[inline]
  pub fn rank(&self) -> Rank {
    self.comm.rank()
  }

  /// Number of ranks.
  #[inline]
  pub fn size(&self) -> usize {
    self.comm.size()
  }

  /// Communicator shared with the forest.
  #[inline]
  pub fn comm(&self) -> &Comm {
    &self.comm
  }

  /// Read-only connectivity.
  #[inline]
  pub fn connectivity(&self) -> &Arc<Connectivity> {
    &self.connectivity
  }

  /// Number of trees.
  #[inline]
  pub fn num_trees(&self) -> u32 {
    self.connectivity.num_trees()
  }

  /// Local slice of `tree`.
  pub fn tree(&self, tree: TreeId) -> &Tree<D> {
    &self.trees[tree as usize]
  }

  /// All local tree slices, indexed by tree id.
  pub fn trees(&self) -> &[Tree<D>] {
    &self.trees
  }

  /// First tree with local leaves.
  pub fn first_local_tree(&self) -> Option<TreeId> {
    self.trees.iter().position(|t| !t.is_empty()).map(|t| t as TreeId)
  }

  /// Last tree with local leaves.
  pub fn last_local_tree(&self) -> Option<TreeId> {
    self.trees.iter().rposition(|t| !t.is_empty()).map(|t| t as TreeId)
  }

  /// Local leaves with their tree, in global order.
  pub fn leaves(&self) -> impl Iterator<Item = (TreeId, &Leaf<D>)> {
    self
      .trees
      .iter()
      .enumerate()
      .flat_map(|(index, tree)| tree.leaves().iter().map(move |leaf| (index as TreeId, leaf)))
  }

  /// Local leaves with mutable payloads, in global order.
  pub fn leaves_mut(&mut self) -> impl Iterator<Item = (TreeId, &mut Leaf<D>)> {
    self.trees.iter_mut().enumerate().flat_map(|(index, tree)| {
      tree
        .leaves_mut()
        .iter_mut()
        .map(move |leaf| (index as TreeId, leaf))
    })
  }

  #[inline]
  pub fn local_num_octants(&self) -> u64 {
    self.local_num_octants
  }

  #[inline]
  pub fn global_num_octants(&self) -> u64 {
    self.global_num_octants
  }

  /// Global index of each rank's first leaf (`size + 1` entries).
  #[inline]
  pub fn global_first_octant(&self) -> &[u64] {
    &self.global_first_octant
  }

  /// Position of each rank's first leaf (`size + 1` entries). Empty ranks
  /// repeat the entry of the next rank.
  #[inline]
  pub fn global_first_position(&self) -> &[Position] {
    &self.global_first_position
  }

  /// Structural revision, increased by every mutation that changed the
  /// global leaf set or moved leaves between ranks.
  #[inline]
  pub fn revision(&self) -> u64 {
    self.revision
  }

  /// Attach or detach the balance diagnostics record.
  pub fn set_inspect(&mut self, inspect: Option<Inspect>) {
    self.inspect = inspect;
  }

  pub fn inspect(&self) -> Option<&Inspect> {
    self.inspect.as_ref()
  }

  pub fn inspect_mut(&mut self) -> Option<&mut Inspect> {
    self.inspect.as_mut()
  }

  /// Rank owning the leaf that contains `octant` of `tree`.
  pub fn find_owner(&self, tree: TreeId, octant: &Octant) -> Rank {
    owner_of(&self.global_first_position, Position::of(tree, octant))
  }

  /// Physical extent of an octant.
  pub fn octant_bounds(&self, tree: TreeId, octant: &Octant) -> DAabb3 {
    self.connectivity.octant_bounds(tree, octant)
  }

  /// Collective: every rank receives the complete global `(tree, octant)`
  /// sequence.
  pub fn gather_leaves(&self) -> ForestResult<Vec<(TreeId, Octant)>> {
    let local: Vec<(TreeId, Octant)> = self.leaves().map(|(t, l)| (t, l.octant)).collect();
    Ok(self.comm.allgather(local)?.into_iter().flatten().collect())
  }

  /// Collective: CRC32 of the global leaf sequence, independent of how it
  /// is partitioned.
  pub fn checksum(&self) -> ForestResult<u32> {
    let mut hasher = crc32fast::Hasher::new();
    let mut len = 0u64;
    for (tree, leaf) in self.leaves() {
      let mut record = [0u8; 17];
      record[0..4].copy_from_slice(&tree.to_be_bytes());
      record[4..8].copy_from_slice(&leaf.octant.x.to_be_bytes());
      record[8..12].copy_from_slice(&leaf.octant.y.to_be_bytes());
      record[12..16].copy_from_slice(&leaf.octant.z.to_be_bytes());
      record[16] = leaf.octant.level;
      hasher.update(&record);
      len += record.len() as u64;
    }
    let parts = self.comm.allgather((hasher.finalize(), len))?;

    let mut combined = crc32fast::Hasher::new();
    for (crc, len) in parts {
      combined.combine(&crc32fast::Hasher::new_with_initial_len(crc, len));
    }
    Ok(combined.finalize())
  }

  /// Collective: check the global ordering invariant and the replicated
  /// layout.
  pub fn is_valid(&self) -> ForestResult<bool> {
    let local_ok = self.trees.iter().all(Tree::is_sorted_and_disjoint)
      && self.global_first_octant.len() == self.size() + 1
      && self.global_first_octant[self.rank() + 1] - self.global_first_octant[self.rank()]
        == self.local_num_octants;
    let all_ok = !self.comm.allreduce_any(!local_ok)?;

    let global = self.gather_leaves()?;
    let mut complete = global.len() as u64 == self.global_num_octants;
    let mut start = 0;
    for tree in 0..self.num_trees() {
      let count = global[start..].iter().take_while(|(t, _)| *t == tree).count();
      complete &= tree::covers_root(global[start..start + count].iter().map(|(_, o)| o));
      start += count;
    }
    complete &= start == global.len();
    Ok(all_ok && complete)
  }
}

/// Owner of `position` given replicated first positions.
pub(crate) fn owner_of(first_positions: &[Position], position: Position) -> Rank {
  first_positions
    .partition_point(|p| *p <= position)
    .saturating_sub(1)
    .min(first_positions.len().saturating_sub(2))
}

/// Coarsest octants whose grid range at `level` lies inside `[lo, hi]`,
/// appended in Morton order.
fn coarse_cover(octant: Octant, level: u8, lo: LinearId, hi: LinearId, out: &mut Vec<Octant>) {
  let first = octant.linear_id(level);
  let last = octant.last_descendant(level).linear_id(level);
  if last < lo || first > hi {
    return;
  }
  if lo <= first && last <= hi {
    out.push(octant);
    return;
  }
  for child in octant.children() {
    coarse_cover(child, level, lo, hi, out);
  }
}
