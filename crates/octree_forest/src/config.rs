//! Configuration for forest construction and balance.

use crate::constants::{CORNER_OFFSETS, EDGE_OFFSETS, FACE_OFFSETS, QMAX_LEVEL};
use crate::error::{ForestError, ForestResult};

/// Parameters for building a new forest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForestConfig {
  /// Lower bound for the number of leaves per rank. The starting level is
  /// raised until the uniform grid has at least this many leaves per rank.
  pub min_octants_per_process: u64,

  /// Coarsest allowed starting level.
  pub min_level: u8,

  /// Fill each rank's range with leaves of the starting level (`true`) or
  /// with the coarsest leaves that cover the same range (`false`).
  pub fill_uniform: bool,
}

impl ForestConfig {
  /// Uniform forest at exactly `level`.
  pub fn uniform(level: u8) -> Self {
    Self {
      min_octants_per_process: 0,
      min_level: level,
      fill_uniform: true,
    }
  }

  pub(crate) fn validate(&self) -> ForestResult<()> {
    if self.min_level > QMAX_LEVEL {
      return Err(ForestError::LevelOutOfRange {
        level: self.min_level,
        max: QMAX_LEVEL,
      });
    }
    Ok(())
  }

  /// Smallest level `>= min_level` whose uniform grid over `num_trees` trees
  /// gives every one of `num_ranks` ranks at least `min_octants_per_process`.
  pub fn starting_level(&self, num_trees: u32, num_ranks: usize) -> ForestResult<u8> {
    self.validate()?;
    let wanted = (self.min_octants_per_process as u128).saturating_mul(num_ranks as u128);
    let mut level = self.min_level;
    while (num_trees as u128) << (3 * level as u32) < wanted {
      if level == QMAX_LEVEL {
        return Err(ForestError::InvalidConfig(format!(
          "{} octants per rank over {num_ranks} ranks exceed the finest uniform grid",
          self.min_octants_per_process
        )));
      }
      level += 1;
    }
    Ok(level)
  }
}

impl Default for ForestConfig {
  fn default() -> Self {
    Self {
      min_octants_per_process: 0,
      min_level: 0,
      fill_uniform: true,
    }
  }
}

/// Which neighbours take part in 2:1 balance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Adjacency {
  /// Leaves sharing a face.
  #[default]
  Face,
  /// Faces and edges.
  Edge,
  /// Faces, edges, and corners.
  Corner,
}

impl Adjacency {
  /// Neighbour offsets covered by this adjacency.
  pub fn offsets(self) -> impl Iterator<Item = [i32; 3]> {
    let faces: &'static [[i32; 3]] = &FACE_OFFSETS;
    let edges: &'static [[i32; 3]] = match self {
      Adjacency::Face => &[],
      _ => &EDGE_OFFSETS,
    };
    let corners: &'static [[i32; 3]] = match self {
      Adjacency::Corner => &CORNER_OFFSETS,
      _ => &[],
    };
    faces.iter().chain(edges).chain(corners).copied()
  }

  /// Number of neighbour directions.
  pub fn num_directions(self) -> usize {
    match self {
      Adjacency::Face => 6,
      Adjacency::Edge => 18,
      Adjacency::Corner => 26,
    }
  }
}

/// Switches for the balance peer-discovery strategies.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InspectConfig {
  /// Use the ranges pattern for the seed exchange (otherwise notify).
  pub use_ranges: bool,
  /// Compute both the ranges and the notify pattern.
  pub use_ranges_notify: bool,
  /// With both patterns computed, fail unless notify is covered by ranges.
  pub use_verify: bool,
  /// Maximum number of rank intervals per rank for the ranges pattern.
  pub max_ranges: usize,
}

impl InspectConfig {
  /// Default interval budget of the ranges strategy.
  pub const DEFAULT_MAX_RANGES: usize = 25;
}

impl Default for InspectConfig {
  fn default() -> Self {
    Self {
      use_ranges: false,
      use_ranges_notify: false,
      use_verify: false,
      max_ranges: Self::DEFAULT_MAX_RANGES,
    }
  }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;
