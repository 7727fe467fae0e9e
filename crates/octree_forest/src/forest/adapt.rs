//! Refine and coarsen.
//!
//! Both operations are purely local rewrites of each tree's leaf vector
//! followed by a collective layout sync.
//!
//! # Refine
//!
//! Non-recursive mode asks the predicate once per existing leaf. Recursive
//! mode walks a depth-first stack so that children are asked in Morton
//! order right after their parent was split. Leaves at `max_level` are never
//! offered for refinement.
//!
//! # Coarsen
//!
//! Leaves are streamed into the output vector. Whenever its tail forms a
//! complete family that has not been evaluated yet, the family is offered to
//! the predicate. In recursive mode a merged parent is pushed back onto the
//! stream and may complete a family with its preceding siblings.

use smallvec::SmallVec;

use crate::connectivity::TreeId;
use crate::constants::{CHILDREN, QMAX_LEVEL};
use crate::error::{ForestError, ForestResult};
use crate::octant::Octant;

use super::hooks::{CoarsenCandidate, Hooks};
use super::{Forest, Leaf};

/// Local statistics of one refine or coarsen call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AdaptStats {
  /// Leaves split into 8 children.
  pub subdivisions: u64,
  /// Families merged into their parent.
  pub merges: u64,
  /// Orphan callbacks issued.
  pub orphans: u64,
}

/// The parent of `leaves` if they are a complete family in child order.
fn family_parent<D>(leaves: &[Leaf<D>]) -> Option<Octant> {
  if leaves.len() != CHILDREN {
    return None;
  }
  let parent = leaves[0].octant.parent()?;
  leaves
    .iter()
    .enumerate()
    .all(|(i, leaf)| leaf.octant == parent.child(i))
    .then_some(parent)
}

impl<D: Default + Send + 'static> Forest<D> {
  /// Collective: split leaves selected by `refine_fn`.
  ///
  /// `max_level` defaults to and is clamped at `QMAX_LEVEL`; leaves at the
  /// maximum are not offered. Every split runs `init` on the 8 children and
  /// then `replace(tree, [parent], children)`.
  #[tracing::instrument(skip_all, fields(rank = self.comm.rank(), recursive))]
  pub fn refine(
    &mut self,
    recursive: bool,
    max_level: Option<u8>,
    mut refine_fn: impl FnMut(TreeId, &Leaf<D>) -> bool,
    mut hooks: Hooks<'_, D>,
  ) -> ForestResult<AdaptStats> {
    let max_level = max_level.unwrap_or(QMAX_LEVEL).min(QMAX_LEVEL);
    let global_before = self.global_num_octants;
    let mut stats = AdaptStats::default();

    for (index, tree) in self.trees.iter_mut().enumerate() {
      if tree.is_empty() {
        continue;
      }
      let tree_id = index as TreeId;
      let old = tree.take_leaves();
      let mut out = Vec::with_capacity(old.len());

      if recursive {
        let mut stack: Vec<Leaf<D>> = Vec::new();
        for leaf in old {
          stack.push(leaf);
          while let Some(leaf) = stack.pop() {
            if leaf.octant.level < max_level && refine_fn(tree_id, &leaf) {
              let children = hooks.split(tree_id, leaf);
              stats.subdivisions += 1;
              // reversed so that child 0 is popped first
              stack.extend(children.into_iter().rev());
            } else {
              out.push(leaf);
            }
          }
        }
      } else {
        for leaf in old {
          if leaf.octant.level < max_level && refine_fn(tree_id, &leaf) {
            out.extend(hooks.split(tree_id, leaf));
            stats.subdivisions += 1;
          } else {
            out.push(leaf);
          }
        }
      }
      tree.set_leaves(out);
    }

    self.finish_mutation(global_before)?;
    tracing::debug!(subdivisions = stats.subdivisions, "refine done");
    Ok(stats)
  }

  /// Collective: merge families selected by `coarsen_fn`.
  ///
  /// With `callback_orphans`, leaves that never took part in a family
  /// evaluation are reported once as [`CoarsenCandidate::Orphan`] after the
  /// pass over their tree. Every merge runs `init` on the parent and then
  /// `replace(tree, family, [parent])`. Families never span trees or ranks.
  #[tracing::instrument(skip_all, fields(rank = self.comm.rank(), recursive))]
  pub fn coarsen(
    &mut self,
    recursive: bool,
    callback_orphans: bool,
    mut coarsen_fn: impl FnMut(TreeId, CoarsenCandidate<'_, D>) -> bool,
    mut hooks: Hooks<'_, D>,
  ) -> ForestResult<AdaptStats> {
    let global_before = self.global_num_octants;
    let mut stats = AdaptStats::default();

    for (index, tree) in self.trees.iter_mut().enumerate() {
      if tree.is_empty() {
        continue;
      }
      let tree_id = index as TreeId;
      let old = tree.take_leaves();
      let mut out: Vec<Leaf<D>> = Vec::with_capacity(old.len());
      // parallel to `out`: took part in a family evaluation
      let mut evaluated: Vec<bool> = Vec::with_capacity(old.len());
      // no family may start before this index of `out`
      let mut frozen = 0;

      for leaf in old {
        out.push(leaf);
        evaluated.push(false);

        loop {
          let n = out.len();
          if n - frozen < CHILDREN || family_parent(&out[n - CHILDREN..]).is_none() {
            break;
          }
          let tail = n - CHILDREN;
          evaluated[tail..].fill(true);
          if !coarsen_fn(tree_id, CoarsenCandidate::Family(&out[tail..])) {
            frozen = n;
            break;
          }
          let family: SmallVec<[Leaf<D>; CHILDREN]> = out.drain(tail..).collect();
          evaluated.truncate(tail);
          let parent = hooks.merge(tree_id, &family);
          drop(family);
          out.push(parent);
          evaluated.push(!recursive);
          stats.merges += 1;
          if !recursive {
            frozen = out.len();
            break;
          }
        }
      }

      if callback_orphans {
        for (leaf, _) in out.iter().zip(&evaluated).filter(|(_, seen)| !**seen) {
          coarsen_fn(tree_id, CoarsenCandidate::Orphan(leaf));
          stats.orphans += 1;
        }
      }
      tree.set_leaves(out);
    }

    self.finish_mutation(global_before)?;
    tracing::debug!(merges = stats.merges, orphans = stats.orphans, "coarsen done");
    Ok(stats)
  }

  /// Collective: refine uniformly to `level` (no-op for leaves at or below).
  pub fn refine_uniform(&mut self, level: u8, hooks: Hooks<'_, D>) -> ForestResult<AdaptStats> {
    if level > QMAX_LEVEL {
      return Err(ForestError::LevelOutOfRange {
        level,
        max: QMAX_LEVEL,
      });
    }
    self.refine(true, Some(level), |_, _| true, hooks)
  }
}

#[cfg(test)]
#[path = "adapt_test.rs"]
mod adapt_test;
