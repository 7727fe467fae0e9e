//! Diagnostics record for the balance peer-discovery strategies.
//!
//! Attach one to a forest with `Forest::set_inspect`; balance then fills in
//! counters and timings and honours the strategy switches in its
//! [`InspectConfig`].
//!
//! # Usage
//!
//! ```ignore
//! forest.set_inspect(Some(Inspect::new(InspectConfig {
//!     use_ranges: true,
//!     use_ranges_notify: true,
//!     use_verify: true,
//!     ..Default::default()
//! })));
//! forest.balance(Adjacency::Face, Hooks::none())?;
//! let record = forest.inspect().unwrap();
//! println!("{} rounds, {} seeds sent", record.balance_rounds, record.seeds_sent);
//! ```

use crate::config::InspectConfig;

/// Running summary of one kind of timing, in microseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timing {
    /// Number of samples.
    pub count: u64,
    pub total_us: u64,
    pub max_us: u64,
    /// Most recent sample.
    pub last_us: Option<u64>,
}

impl Timing {
    pub fn record(&mut self, us: u64) {
        self.count += 1;
        self.total_us += us;
        self.max_us = self.max_us.max(us);
        self.last_us = Some(us);
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Mean sample, 0 without samples.
    pub fn mean_us(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total_us as f64 / self.count as f64
        }
    }
}

/// Counters and timings of balance calls since the record was attached.
#[derive(Debug, Clone, Default)]
pub struct Inspect {
    /// Strategy switches read by balance.
    pub config: InspectConfig,

    // Counters
    /// Number of balance calls.
    pub balance_calls: u64,
    /// Rounds over all balance calls.
    pub balance_rounds: u64,
    /// Seeds produced by the local neighbour scan.
    pub seeds_generated: u64,
    /// Seeds sent to other ranks.
    pub seeds_sent: u64,
    /// Seeds received from other ranks.
    pub seeds_received: u64,
    /// Leaves created by balance splits on this rank.
    pub octants_created: u64,
    /// Peers that received a non-empty seed message.
    pub nonzero_sends: u64,
    /// Messages sent without seeds because the ranges pattern over-approximated.
    pub zero_sends: u64,
    /// Messages received without seeds.
    pub zero_receives: u64,

    // Timing (microseconds)
    /// Ranges discovery per round.
    pub ranges_us: Timing,
    /// Notify discovery per round.
    pub notify_us: Timing,
    /// Whole balance calls.
    pub balance_us: Timing,
}

impl Inspect {
    /// Create an empty record with the given switches.
    pub fn new(config: InspectConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Reset counters and timings, keeping the switches.
    pub fn reset(&mut self) {
        *self = Self::new(self.config.clone());
    }

    /// Record one discovery timing.
    pub fn record_discovery(&mut self, ranges: bool, timing_us: u64) {
        if ranges {
            self.ranges_us.record(timing_us);
        } else {
            self.notify_us.record(timing_us);
        }
    }

    /// Record a finished balance call.
    pub fn record_balance(&mut self, rounds: u64, timing_us: u64) {
        self.balance_calls += 1;
        self.balance_rounds += rounds;
        self.balance_us.record(timing_us);
    }
}
