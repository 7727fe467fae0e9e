//! Error types for collective operations.
//!
//! Violations of local preconditions (misaligned octants, out-of-range child
//! ids) are programming errors and panic. Everything that can fail because of
//! the process group or user input surfaces as a [`ForestError`].

use thiserror::Error;

use crate::comm::Rank;

/// Errors raised by the communicator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommError {
  #[error("rank {rank} is outside a group of {size}")]
  InvalidRank { rank: Rank, size: usize },

  #[error("peer rank {peer} hung up")]
  Disconnected { peer: Rank },

  #[error("the process group was aborted")]
  Aborted,

  #[error("message from rank {from} carried an unexpected payload type")]
  PayloadType { from: Rank },
}

/// Errors raised by forest operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ForestError {
  #[error("invalid configuration: {0}")]
  InvalidConfig(String),

  #[error("level {level} is outside 0..={max}")]
  LevelOutOfRange { level: u8, max: u8 },

  #[error(transparent)]
  Comm(#[from] CommError),

  #[error("rank {rank}: notify pattern is not covered by the ranges pattern (missing {missing:?})")]
  PatternMismatch { rank: Rank, missing: Vec<Rank> },

  #[error("partition counts sum to {given}, forest has {expected} leaves")]
  PartitionCount { given: u64, expected: u64 },
}

/// Result type for forest operations.
pub type ForestResult<T> = Result<T, ForestError>;
