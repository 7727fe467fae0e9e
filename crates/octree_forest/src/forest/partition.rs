//! Load redistribution.
//!
//! A partition computes new start offsets into the global leaf sequence,
//! identically on every rank, and then ships contiguous chunks with one
//! point-to-point exchange. Senders and receivers follow from the old and
//! new offsets, so no peer discovery is needed.
//!
//! Offsets come from one of three sources:
//!
//! - leaf counts (`partition` without weights)
//! - per-leaf weights (`partition` with a weight function)
//! - explicit per-rank counts (`partition_given`)
//!
//! With `for_coarsening`, boundaries that cut a complete family are moved to
//! the nearer end of that family, so a following coarsen can merge it.

use web_time::Instant;

use crate::comm::Rank;
use crate::connectivity::TreeId;
use crate::constants::CHILDREN;
use crate::error::{ForestError, ForestResult};
use crate::octant::Octant;

use super::{uniform_offsets, Forest, Leaf};

/// Per-leaf weight used by a weighted partition.
pub type WeightFn<'a, D> = dyn FnMut(TreeId, &Leaf<D>) -> u64 + 'a;

/// Leaves moved off their rank by the transition `old -> new`, summed over
/// all ranks.
fn shipped_count(old: &[u64], new: &[u64]) -> u64 {
  (0..old.len() - 1)
    .map(|r| {
      let kept = new[r + 1]
        .min(old[r + 1])
        .saturating_sub(new[r].max(old[r]));
      (new[r + 1] - new[r]) - kept
    })
    .sum()
}

/// Move every interior boundary that cuts a complete family to the nearer
/// end of the family (ties go to the family start).
///
/// `window` holds `(global index, tree, octant)` for at least the indices
/// `b - 7 .. b + 7` around each boundary `b`, sorted by index.
fn align_to_families(offsets: &mut [u64], window: &[(u64, TreeId, Octant)]) {
  let total = offsets[offsets.len() - 1];
  let lookup = |index: u64| {
    window
      .binary_search_by_key(&index, |&(i, _, _)| i)
      .ok()
      .map(|at| window[at])
  };
  let family = |start: u64| -> bool {
    let Some((_, tree, _)) = lookup(start) else {
      return false;
    };
    let mut octants = [Octant::root(); CHILDREN];
    for (k, slot) in octants.iter_mut().enumerate() {
      match lookup(start + k as u64) {
        Some((_, t, octant)) if t == tree => *slot = octant,
        _ => return false,
      }
    }
    Octant::is_family(&octants)
  };

  let last = offsets.len() - 1;
  for boundary in &mut offsets[1..last] {
    let b = *boundary;
    if b == 0 || b >= total {
      continue;
    }
    let lowest = b.saturating_sub(CHILDREN as u64 - 1);
    if let Some(f) = (lowest..b).find(|&f| f + CHILDREN as u64 <= total && family(f)) {
      let end = f + CHILDREN as u64;
      *boundary = if b - f <= end - b { f } else { end };
    }
  }
}

impl<D: Default + Send + 'static> Forest<D> {
  /// Collective: redistribute leaves evenly by count, or by `weight` if
  /// given. Returns the number of leaves shipped between ranks.
  ///
  /// With unit weights the result matches the count rule; a total weight of
  /// zero falls back to it.
  #[tracing::instrument(skip_all, fields(rank = self.comm.rank(), for_coarsening))]
  pub fn partition(
    &mut self,
    for_coarsening: bool,
    weight: Option<&mut WeightFn<'_, D>>,
  ) -> ForestResult<u64> {
    let offsets = match weight {
      Some(weight) => self.weighted_offsets(weight)?,
      None => None,
    };
    let mut offsets =
      offsets.unwrap_or_else(|| uniform_offsets(self.global_num_octants, self.comm.size()));
    if for_coarsening {
      self.correct_for_coarsening(&mut offsets)?;
    }
    self.transfer(&offsets)
  }

  /// Collective: ship leaves so that rank `r` ends up with `counts[r]`.
  pub fn partition_given(&mut self, counts: &[u64]) -> ForestResult<u64> {
    if counts.len() != self.comm.size() {
      return Err(ForestError::InvalidConfig(format!(
        "{} partition counts for {} ranks",
        counts.len(),
        self.comm.size()
      )));
    }
    let given: u64 = counts.iter().sum();
    if given != self.global_num_octants {
      return Err(ForestError::PartitionCount {
        given,
        expected: self.global_num_octants,
      });
    }
    let mut offsets = Vec::with_capacity(counts.len() + 1);
    let mut running = 0;
    offsets.push(0);
    for &count in counts {
      running += count;
      offsets.push(running);
    }
    self.transfer(&offsets)
  }

  /// Start offsets balancing `weight`, or `None` if the total weight is 0.
  fn weighted_offsets(&self, weight: &mut WeightFn<'_, D>) -> ForestResult<Option<Vec<u64>>> {
    let me = self.comm.rank();
    let size = self.comm.size();
    let weights: Vec<u64> = self.leaves().map(|(t, leaf)| weight(t, leaf)).collect();
    let sums = self.comm.allgather(weights.iter().sum::<u64>())?;
    let total: u64 = sums.iter().sum();
    if total == 0 {
      return Ok(None);
    }

    // interior cut c belongs to the leaf whose weight interval (lo, hi]
    // contains it; the next rank starts right after that leaf
    let cuts = uniform_offsets(total, size);
    let first_index = self.global_first_octant[me];
    let mut running: u64 = sums[..me].iter().sum();
    let mut next = 1;
    while next < size && cuts[next] <= running {
      next += 1;
    }
    let mut found: Vec<(Rank, u64)> = Vec::new();
    for (i, w) in weights.iter().enumerate() {
      running += w;
      while next < size && cuts[next] <= running {
        found.push((next, first_index + i as u64 + 1));
        next += 1;
      }
    }

    let mut offsets = vec![0; size + 1];
    offsets[size] = self.global_num_octants;
    for (rank, start) in self.comm.allgather(found)?.into_iter().flatten() {
      offsets[rank] = start;
    }
    Ok(Some(offsets))
  }

  /// Collective: exchange the leaves around every interior boundary and
  /// align the boundaries to family borders.
  fn correct_for_coarsening(&self, offsets: &mut [u64]) -> ForestResult<()> {
    let me = self.comm.rank();
    let reach = CHILDREN as u64 - 1;
    let first_index = self.global_first_octant[me];
    let last = offsets.len() - 1;
    let near = |index: u64| {
      offsets[1..last]
        .iter()
        .any(|&b| index + reach >= b && index < b + reach)
    };
    let mine: Vec<(u64, TreeId, Octant)> = self
      .leaves()
      .enumerate()
      .map(|(i, (tree, leaf))| (first_index + i as u64, tree, leaf.octant))
      .filter(|&(index, _, _)| near(index))
      .collect();
    let mut window: Vec<(u64, TreeId, Octant)> =
      self.comm.allgather(mine)?.into_iter().flatten().collect();
    window.sort_unstable_by_key(|&(index, _, _)| index);
    window.dedup_by_key(|entry| entry.0);

    let before = offsets.to_vec();
    align_to_families(offsets, &window);
    if before != offsets {
      tracing::debug!(?before, after = ?offsets, "boundaries moved to family borders");
    }
    Ok(())
  }

  /// Collective: ship leaves to match `offsets`. Returns the global number
  /// of shipped leaves.
  fn transfer(&mut self, offsets: &[u64]) -> ForestResult<u64> {
    let start = Instant::now();
    let me = self.comm.rank();
    let size = self.comm.size();
    let old = self.global_first_octant.clone();
    debug_assert_eq!(offsets.len(), size + 1);
    debug_assert_eq!(offsets[size], old[size]);

    let shipped = shipped_count(&old, offsets);
    if shipped == 0 {
      return Ok(0);
    }

    let mut leaves = Vec::with_capacity(self.local_num_octants as usize);
    for (index, tree) in self.trees.iter_mut().enumerate() {
      leaves.extend(tree.take_leaves().into_iter().map(|leaf| (index as TreeId, leaf)));
    }

    let mut source = leaves.into_iter();
    let mut kept = Vec::new();
    let mut outgoing: Vec<(Rank, Vec<(TreeId, Leaf<D>)>)> = Vec::new();
    for dest in 0..size {
      let lo = offsets[dest].max(old[me]);
      let hi = offsets[dest + 1].min(old[me + 1]);
      if lo >= hi {
        continue;
      }
      let chunk: Vec<_> = source.by_ref().take((hi - lo) as usize).collect();
      if dest == me {
        kept = chunk;
      } else {
        outgoing.push((dest, chunk));
      }
    }

    let recv_from: Vec<Rank> = (0..size)
      .filter(|&src| {
        src != me && offsets[me + 1].min(old[src + 1]) > offsets[me].max(old[src])
      })
      .collect();
    let sent: usize = outgoing.iter().map(|(_, chunk)| chunk.len()).sum();
    let mut parts = self.comm.exchange(outgoing, &recv_from)?;
    parts.push((me, kept));
    parts.sort_by_key(|(rank, _)| *rank);

    let mut per_tree: Vec<Vec<Leaf<D>>> = (0..self.trees.len()).map(|_| Vec::new()).collect();
    for (tree, leaf) in parts.into_iter().flat_map(|(_, chunk)| chunk) {
      per_tree[tree as usize].push(leaf);
    }
    for (tree, leaves) in self.trees.iter_mut().zip(per_tree) {
      tree.set_leaves(leaves);
    }

    self.sync_layout()?;
    self.revision += 1;
    tracing::debug!(
      shipped,
      sent,
      local = self.local_num_octants,
      elapsed_us = start.elapsed().as_micros() as u64,
      "partition done"
    );
    Ok(shipped)
  }
}

#[cfg(test)]
#[path = "partition_test.rs"]
mod partition_test;
