//! 2:1 size balance.
//!
//! Balance runs in rounds. A leaf `q` at level `l >= 2` forces, for every
//! neighbour direction, the parent of its same-size neighbour `n` to be
//! covered by leaves no coarser than level `l - 1`. That parent is a
//! *seed*. A seed is violated when some leaf strictly contains it, and the
//! containing leaf is then split just enough to reach the seed.
//!
//! ```text
//!   q at level l          seed = parent(n), level l - 1
//!   ┌──┐               ┌─────┐
//!   │q ├──┐            │  n  │   a leaf strictly containing the
//!   └──┘n │            │     │   seed is split down towards it
//!      └──┘            └─────┘
//! ```
//!
//! # Round structure
//!
//! 1. **Seeds**: scan the active leaves (all leaves in round 0, afterwards
//!    only the leaves created in the previous round) in parallel
//! 2. **Route**: send each seed to the owner of its first descendant
//! 3. **Discover**: compute the sparse exchange pattern with the configured
//!    strategy (notify, ranges, or both with verification)
//! 4. **Exchange**: one message per pattern pair, possibly empty
//! 5. **Apply**: merge-walk the sorted seeds against the sorted leaves
//!
//! The loop stops when no rank split anything. Every split produces leaves
//! at least one level finer than before, so it ends after at most
//! `QMAX_LEVEL + 1` rounds.

use rayon::prelude::*;
use smallvec::SmallVec;
use web_time::Instant;

use crate::comm::Rank;
use crate::config::{Adjacency, InspectConfig};
use crate::connectivity::{Connectivity, TreeId};
use crate::constants::QMAX_LEVEL;
use crate::discovery::{CommPattern, Notify, PeerDiscovery, Ranges};
use crate::error::{ForestError, ForestResult};
use crate::octant::Octant;

use super::hooks::Hooks;
use super::tree::find_containing;
use super::{Forest, Leaf};

/// Seeds of one leaf across all directions of an adjacency.
type SeedBuf = SmallVec<[(TreeId, Octant); 26]>;

/// Statistics of one balance call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BalanceStats {
  /// Rounds until no rank split a leaf, including the final quiet round.
  pub rounds: u32,
  /// Splits performed on this rank.
  pub splits: u64,
  /// Splits performed on all ranks.
  pub global_splits: u64,
}

/// Seeds forced by `leaf` of `tree` under `adjacency`.
///
/// Neighbours outside the domain are dropped; neighbours in other trees are
/// moved there through the connectivity.
pub(crate) fn seeds_of(
  connectivity: &Connectivity,
  tree: TreeId,
  leaf: &Octant,
  adjacency: Adjacency,
) -> SeedBuf {
  let mut seeds = SeedBuf::new();
  if leaf.level < 2 {
    return seeds;
  }
  let own_parent = leaf.parent();
  for offset in adjacency.offsets() {
    let Some((target, neighbor)) = connectivity.transform_exterior(tree, &leaf.neighbor(offset))
    else {
      continue;
    };
    let Some(seed) = neighbor.parent() else {
      continue;
    };
    // a sibling lies inside our own parent, which is not a leaf
    if target == tree && Some(seed) == own_parent {
      continue;
    }
    seeds.push((target, seed));
  }
  seeds
}

/// Output of applying seeds to one tree.
struct SplitOutput<D> {
  leaves: Vec<Leaf<D>>,
  created: Vec<(TreeId, Octant)>,
  splits: u64,
}

/// Split `leaf` until no seed lies strictly inside any resulting leaf.
///
/// `seeds` must be sorted and strictly inside `leaf`.
fn refine_toward<D: Default>(
  tree: TreeId,
  leaf: Leaf<D>,
  seeds: &[Octant],
  hooks: &mut Hooks<'_, D>,
  output: &mut SplitOutput<D>,
  is_new: bool,
) {
  if seeds.is_empty() {
    if is_new {
      output.created.push((tree, leaf.octant));
    }
    output.leaves.push(leaf);
    return;
  }
  tracing::trace!(tree, octant = ?leaf.octant, seeds = seeds.len(), "split toward seeds");
  output.splits += 1;
  let mut rest = seeds;
  for child in hooks.split(tree, leaf) {
    let inside = rest.iter().take_while(|s| child.octant.contains(s)).count();
    let (mine, tail) = rest.split_at(inside);
    rest = tail;
    let strict = match mine.first() {
      Some(first) if *first == child.octant => &mine[1..],
      _ => mine,
    };
    refine_toward(tree, child, strict, hooks, output, true);
  }
}

impl<D: Default + Send + 'static> Forest<D> {
  /// Collective: refine until neighbouring leaves differ by at most one
  /// level under `adjacency`.
  ///
  /// Splits follow the `init`/`replace` contract of refine. Counters and
  /// timings go to the attached inspect record, whose configuration also
  /// selects the peer-discovery strategy (notify by default).
  #[tracing::instrument(skip_all, fields(rank = self.comm.rank(), adjacency = ?adjacency))]
  pub fn balance(
    &mut self,
    adjacency: Adjacency,
    mut hooks: Hooks<'_, D>,
  ) -> ForestResult<BalanceStats> {
    let start = Instant::now();
    let global_before = self.global_num_octants;
    let me = self.comm.rank();
    let size = self.comm.size();
    let config = self
      .inspect
      .as_ref()
      .map(|record| record.config.clone())
      .unwrap_or_default();

    let mut stats = BalanceStats::default();
    let mut active: Vec<(TreeId, Octant)> = self.leaves().map(|(t, l)| (t, l.octant)).collect();

    for round in 0..=QMAX_LEVEL {
      let _span = tracing::debug_span!("round", round).entered();
      stats.rounds += 1;

      // Phase 1: seeds of the active leaves
      let connectivity = &*self.connectivity;
      let seeds: Vec<(TreeId, Octant)> = active
        .par_iter()
        .flat_map_iter(|(tree, leaf)| seeds_of(connectivity, *tree, leaf, adjacency))
        .collect();
      let generated = seeds.len() as u64;

      // Phase 2: route to owners
      let mut buckets: Vec<Vec<(TreeId, Octant)>> = vec![Vec::new(); size];
      for (tree, seed) in seeds {
        buckets[self.find_owner(tree, &seed)].push((tree, seed));
      }
      for bucket in &mut buckets {
        bucket.sort_unstable();
        bucket.dedup();
      }
      let receivers: Vec<Rank> = (0..size)
        .filter(|&r| r != me && !buckets[r].is_empty())
        .collect();

      // Phase 3: discover who sends to whom
      let pattern = self.discover_pattern(&config, &receivers)?;

      // Phase 4: exchange
      let outgoing: Vec<(Rank, Vec<(TreeId, Octant)>)> = pattern
        .send_to
        .iter()
        .map(|&r| (r, std::mem::take(&mut buckets[r])))
        .collect();
      let sent: u64 = outgoing.iter().map(|(_, s)| s.len() as u64).sum();
      let nonzero_sends = outgoing.iter().filter(|(_, s)| !s.is_empty()).count() as u64;
      let zero_sends = outgoing.len() as u64 - nonzero_sends;
      let incoming = self.comm.exchange(outgoing, &pattern.recv_from)?;
      let received: u64 = incoming.iter().map(|(_, s)| s.len() as u64).sum();
      let zero_receives = incoming.iter().filter(|(_, s)| s.is_empty()).count() as u64;

      let mut local = std::mem::take(&mut buckets[me]);
      for (_, seeds) in incoming {
        local.extend(seeds);
      }
      local.sort_unstable();
      local.dedup();

      // Phase 5: apply
      let (splits, created) = self.apply_seeds(&local, &mut hooks);
      active = created;
      let global_splits = self.comm.allreduce_sum(splits)?;
      stats.splits += splits;
      stats.global_splits += global_splits;

      if let Some(record) = self.inspect.as_mut() {
        record.seeds_generated += generated;
        record.seeds_sent += sent;
        record.seeds_received += received;
        record.nonzero_sends += nonzero_sends;
        record.zero_sends += zero_sends;
        record.zero_receives += zero_receives;
        record.octants_created += 7 * splits;
      }
      tracing::debug!(generated, sent, received, splits, global_splits, "balance round");

      if global_splits == 0 {
        break;
      }
    }

    self.finish_mutation(global_before)?;
    let elapsed = start.elapsed().as_micros() as u64;
    if let Some(record) = self.inspect.as_mut() {
      record.record_balance(stats.rounds as u64, elapsed);
    }
    tracing::debug!(
      rounds = stats.rounds,
      global_splits = stats.global_splits,
      elapsed_us = elapsed,
      "balance done"
    );
    Ok(stats)
  }

  /// Local 2:1 balance of the part of `tree` held by this rank.
  ///
  /// No communication: only seeds of this rank's leaves of `tree` that land
  /// in the same tree and in the local range are applied. Leaves of the
  /// other trees and ranks are neither read nor split. The global layout
  /// keeps the old counts until the next [`Forest::sync_layout`], the
  /// revision is left alone, and `global_splits` of the result stays 0.
  ///
  /// # Panics
  /// If `tree` is not a tree of the connectivity.
  #[tracing::instrument(skip_all, fields(rank = self.comm.rank(), tree = tree, adjacency = ?adjacency))]
  pub fn balance_subtree(
    &mut self,
    tree: TreeId,
    adjacency: Adjacency,
    mut hooks: Hooks<'_, D>,
  ) -> BalanceStats {
    let me = self.comm.rank();
    let mut stats = BalanceStats::default();
    let mut active: Vec<Octant> = self.trees[tree as usize]
      .leaves()
      .iter()
      .map(|leaf| leaf.octant)
      .collect();

    for _ in 0..=QMAX_LEVEL {
      stats.rounds += 1;
      let connectivity = &*self.connectivity;
      let mut seeds: Vec<(TreeId, Octant)> = active
        .par_iter()
        .flat_map_iter(|leaf| seeds_of(connectivity, tree, leaf, adjacency))
        .filter(|(target, _)| *target == tree)
        .collect();
      seeds.retain(|(target, seed)| self.find_owner(*target, seed) == me);
      seeds.sort_unstable();
      seeds.dedup();

      let (splits, created) = self.apply_seeds(&seeds, &mut hooks);
      stats.splits += splits;
      if splits == 0 {
        break;
      }
      active = created.into_iter().map(|(_, octant)| octant).collect();
    }

    self.local_num_octants = self.trees.iter().map(|t| t.len() as u64).sum();
    tracing::debug!(rounds = stats.rounds, splits = stats.splits, "subtree balanced");
    stats
  }

  /// Run the strategies selected by `config` and pick the one to use.
  fn discover_pattern(
    &mut self,
    config: &InspectConfig,
    receivers: &[Rank],
  ) -> ForestResult<CommPattern> {
    let ranges_strategy = Ranges {
      max_ranges: config.max_ranges,
    };
    let want_ranges = config.use_ranges || config.use_ranges_notify;
    let want_notify = !config.use_ranges || config.use_ranges_notify;

    let ranges = if want_ranges {
      Some(self.timed_discovery(&ranges_strategy, true, receivers)?)
    } else {
      None
    };
    let notify = if want_notify {
      Some(self.timed_discovery(&Notify, false, receivers)?)
    } else {
      None
    };

    if config.use_ranges_notify && config.use_verify {
      let missing = match (&ranges, &notify) {
        (Some(ranges), Some(notify)) if !ranges.covers(notify) => {
          Some(ranges.missing_sources(notify))
        }
        _ => None,
      };
      let reports = self.comm.allgather(missing)?;
      if let Some((rank, missing)) = reports
        .into_iter()
        .enumerate()
        .find_map(|(rank, report)| report.map(|m| (rank, m)))
      {
        return Err(ForestError::PatternMismatch { rank, missing });
      }
    }

    let chosen = if config.use_ranges { ranges } else { notify };
    chosen.ok_or_else(|| ForestError::InvalidConfig("no discovery strategy selected".into()))
  }

  fn timed_discovery(
    &mut self,
    strategy: &dyn PeerDiscovery,
    is_ranges: bool,
    receivers: &[Rank],
  ) -> ForestResult<CommPattern> {
    let start = Instant::now();
    let pattern = strategy.discover(&self.comm, receivers)?;
    if let Some(record) = self.inspect.as_mut() {
      record.record_discovery(is_ranges, start.elapsed().as_micros() as u64);
    }
    Ok(pattern)
  }

  /// Split local leaves that strictly contain one of the sorted, deduped
  /// `seeds`. Returns the number of splits and the created leaves.
  fn apply_seeds(
    &mut self,
    seeds: &[(TreeId, Octant)],
    hooks: &mut Hooks<'_, D>,
  ) -> (u64, Vec<(TreeId, Octant)>) {
    let mut splits = 0;
    let mut created = Vec::new();
    let mut start = 0;
    while start < seeds.len() {
      let tree_id = seeds[start].0;
      let end = start + seeds[start..].iter().take_while(|(t, _)| *t == tree_id).count();
      let group: Vec<Octant> = seeds[start..end].iter().map(|(_, o)| *o).collect();
      start = end;

      let tree = &mut self.trees[tree_id as usize];
      if tree.is_empty() {
        continue;
      }
      let old = tree.take_leaves();
      let mut output = SplitOutput {
        leaves: Vec::with_capacity(old.len()),
        created,
        splits: 0,
      };
      let mut cursor = 0;
      for leaf in old {
        while cursor < group.len() && group[cursor] <= leaf.octant {
          cursor += 1;
        }
        let inside = group[cursor..]
          .iter()
          .take_while(|s| leaf.octant.is_ancestor_of(s))
          .count();
        let strict = &group[cursor..cursor + inside];
        cursor += inside;
        refine_toward(tree_id, leaf, strict, hooks, &mut output, false);
      }
      tree.set_leaves(output.leaves);
      created = output.created;
      splits += output.splits;
    }
    (splits, created)
  }

  /// Collective: check the 2:1 condition over the gathered global leaf set.
  pub fn is_balanced(&self, adjacency: Adjacency) -> ForestResult<bool> {
    let global = self.gather_leaves()?;
    let mut tree_ranges = vec![0..0; self.num_trees() as usize];
    let mut start = 0;
    while start < global.len() {
      let tree = global[start].0;
      let end = start + global[start..].iter().take_while(|(t, _)| *t == tree).count();
      tree_ranges[tree as usize] = start..end;
      start = end;
    }

    let connectivity = &*self.connectivity;
    let violated = global.par_iter().any(|(tree, leaf)| {
      seeds_of(connectivity, *tree, leaf, adjacency)
        .into_iter()
        .any(|(target, seed)| {
          let slice = &global[tree_ranges[target as usize].clone()];
          find_containing(slice, |(_, o)| o, &seed).is_some_and(|i| slice[i].1 != seed)
        })
    });
    Ok(!violated)
  }
}

#[cfg(test)]
#[path = "balance_test.rs"]
mod balance_test;
