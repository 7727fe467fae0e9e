//! Sparse peer discovery.
//!
//! Before a sparse exchange every rank knows whom it wants to send to but
//! not who will send to it. A [`PeerDiscovery`] strategy turns the local
//! receiver list into a [`CommPattern`] that is consistent across ranks:
//! rank `a` lists `b` in `send_to` exactly when `b` lists `a` in
//! `recv_from`.
//!
//! - [`Notify`] asks every rank directly (one flag per pair).
//! - [`Ranges`] allgathers a compressed interval summary of each receiver
//!   list. It may over-approximate; the extra pairs exchange empty messages.

use crate::comm::{Comm, Rank};
use crate::error::CommError;

/// Who a rank sends to and receives from in one sparse exchange.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommPattern {
  /// Sorted destination ranks.
  pub send_to: Vec<Rank>,
  /// Sorted source ranks.
  pub recv_from: Vec<Rank>,
}

impl CommPattern {
  /// True if every pair of `other` also appears in `self`.
  pub fn covers(&self, other: &CommPattern) -> bool {
    is_sorted_subset(&other.send_to, &self.send_to)
      && is_sorted_subset(&other.recv_from, &self.recv_from)
  }

  /// Ranks of `other.recv_from` missing from `self.recv_from`.
  pub fn missing_sources(&self, other: &CommPattern) -> Vec<Rank> {
    other
      .recv_from
      .iter()
      .copied()
      .filter(|r| self.recv_from.binary_search(r).is_err())
      .collect()
  }
}

fn is_sorted_subset(small: &[Rank], large: &[Rank]) -> bool {
  small.iter().all(|r| large.binary_search(r).is_ok())
}

/// Strategy for computing a [`CommPattern`] collectively.
pub trait PeerDiscovery {
  /// Collective: `receivers` lists the ranks this rank has data for, sorted
  /// and without the calling rank.
  fn discover(&self, comm: &Comm, receivers: &[Rank]) -> Result<CommPattern, CommError>;
}

/// Pairwise all-to-all of "I will send to you" flags.
#[derive(Clone, Copy, Debug, Default)]
pub struct Notify;

impl PeerDiscovery for Notify {
  fn discover(&self, comm: &Comm, receivers: &[Rank]) -> Result<CommPattern, CommError> {
    let mut flags = vec![false; comm.size()];
    for &r in receivers {
      flags[r] = true;
    }
    let incoming = comm.all_to_all(flags)?;
    let recv_from = incoming
      .into_iter()
      .enumerate()
      .filter(|&(peer, flag)| flag && peer != comm.rank())
      .map(|(peer, _)| peer)
      .collect();
    Ok(CommPattern {
      send_to: receivers.to_vec(),
      recv_from,
    })
  }
}

/// Interval summaries of the receiver lists, allgathered.
#[derive(Clone, Copy, Debug)]
pub struct Ranges {
  /// Upper bound for the intervals per rank (at least 1).
  pub max_ranges: usize,
}

impl Ranges {
  /// Compress sorted `receivers` into at most `max_ranges` inclusive
  /// intervals by repeatedly merging the two neighbours with the smallest
  /// gap (earliest on ties).
  pub fn compress(receivers: &[Rank], max_ranges: usize) -> Vec<(Rank, Rank)> {
    let mut ranges: Vec<(Rank, Rank)> = Vec::new();
    for &r in receivers {
      match ranges.last_mut() {
        Some(last) if last.1 + 1 == r => last.1 = r,
        _ => ranges.push((r, r)),
      }
    }
    let max_ranges = max_ranges.max(1);
    while ranges.len() > max_ranges {
      let merge_at = ranges
        .windows(2)
        .enumerate()
        .min_by_key(|&(i, pair)| (pair[1].0 - pair[0].1, i))
        .map(|(i, _)| i)
        .unwrap_or(0);
      let next = ranges.remove(merge_at + 1);
      ranges[merge_at].1 = next.1;
    }
    ranges
  }
}

impl Default for Ranges {
  fn default() -> Self {
    Self {
      max_ranges: crate::config::InspectConfig::DEFAULT_MAX_RANGES,
    }
  }
}

impl PeerDiscovery for Ranges {
  fn discover(&self, comm: &Comm, receivers: &[Rank]) -> Result<CommPattern, CommError> {
    let me = comm.rank();
    let mine = Self::compress(receivers, self.max_ranges);
    let all = comm.allgather(mine.clone())?;

    let send_to = mine
      .iter()
      .flat_map(|&(lo, hi)| lo..=hi)
      .filter(|&r| r != me)
      .collect();
    let recv_from = all
      .iter()
      .enumerate()
      .filter(|&(peer, ranges)| peer != me && ranges.iter().any(|&(lo, hi)| (lo..=hi).contains(&me)))
      .map(|(peer, _)| peer)
      .collect();
    Ok(CommPattern { send_to, recv_from })
  }
}

#[cfg(test)]
#[path = "discovery_test.rs"]
mod discovery_test;
