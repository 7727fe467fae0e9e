//! octree_forest - Distributed forest of adaptive octrees
//!
//! A forest is a brick of cube-shaped trees. Each tree is an adaptive octree
//! whose leaves are stored as a linear, Morton-ordered sequence, and the
//! global leaf sequence is split into contiguous slices over a group of
//! ranks. Ranks are in-process threads talking through explicit messages.
//!
//! # Features
//!
//! - **Linear ids**: 128-bit unsigned arithmetic for Morton positions
//! - **Octants**: Morton encoding, family relations, neighbour geometry
//! - **Refine / Coarsen**: callback-driven adaptation with init and
//!   replace hooks
//! - **2:1 Balance**: face, edge, or corner balance with notify or
//!   ranges peer discovery
//! - **Partition**: count, weight, or explicit redistribution, optionally
//!   keeping families together for a following coarsen
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use octree_forest::{run_group, Adjacency, Connectivity, Forest, ForestConfig, Hooks};
//!
//! let connectivity = Arc::new(Connectivity::brick([2, 1, 1], [false; 3]));
//! run_group(4, |comm| {
//!     let mut forest: Forest<u32> =
//!         Forest::new(comm, connectivity.clone(), ForestConfig::uniform(2), |_, _| {})?;
//!     forest.refine(true, Some(5), |tree, leaf| tree == 0 && leaf.octant.x == 0, Hooks::none())?;
//!     forest.balance(Adjacency::Face, Hooks::none())?;
//!     forest.partition(false, None)?;
//!     println!("rank {}: {} leaves", forest.rank(), forest.local_num_octants());
//!     Ok::<_, octree_forest::ForestError>(())
//! });
//! ```

pub mod constants;
pub mod lid;
pub mod octant;

// Re-export commonly used items
pub use constants::{CHILDREN, MAX_LEVEL, QMAX_LEVEL, ROOT_LEN};
pub use lid::LinearId;
pub use octant::Octant;

// Geometry and tree topology
pub mod bounds;
pub mod connectivity;
pub use bounds::DAabb3;
pub use connectivity::{Connectivity, TreeId};

// Process group and sparse exchange
pub mod comm;
pub mod discovery;
pub use comm::{run_group, Comm, Rank, Tag, TagKind};
pub use discovery::{CommPattern, Notify, PeerDiscovery, Ranges};

pub mod config;
pub mod error;
pub mod inspect;
pub use config::{Adjacency, ForestConfig, InspectConfig};
pub use error::{CommError, ForestError, ForestResult};
pub use inspect::{Inspect, Timing};

// The distributed forest
pub mod forest;
pub use forest::{
  AdaptStats, BalanceStats, CoarsenCandidate, Forest, Hooks, Leaf, Position, Tree, WeightFn,
};

#[cfg(test)]
mod test_utils;
