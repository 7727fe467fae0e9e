//! Message-passing communicator for a group of ranks.
//!
//! Each rank runs on its own OS thread and owns a [`Comm`] handle. Ranks
//! share no mutable state; everything travels through per-rank
//! `crossbeam-channel` inboxes carrying type-erased payloads.
//!
//! # Usage
//!
//! ```ignore
//! let sums = run_group(4, |comm| {
//!   comm.allreduce_sum(comm.rank() as u64).unwrap()
//! });
//! assert_eq!(sums, vec![6; 4]);
//! ```
//!
//! Every collective draws a fresh epoch from a counter that advances in
//! lockstep on all ranks, so messages of successive collectives never mix.
//! A rank that panics raises the group abort flag and blocked receives on
//! the other ranks fail with [`CommError::Aborted`].

use std::any::Any;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};

use crate::error::CommError;

/// Index of a rank within its group.
pub type Rank = usize;

/// How often a blocked receive re-checks the abort flag.
const ABORT_POLL: Duration = Duration::from_millis(20);

const NO_RANK: usize = usize::MAX;

/// Kind of traffic a message belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TagKind {
  Allgather,
  AllToAll,
  PointToPoint,
}

/// Message tag: the communication context, the collective's epoch, and
/// its kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Tag {
  pub context: u64,
  pub epoch: u64,
  pub kind: TagKind,
}

/// Type-erased message.
struct Envelope {
  from: Rank,
  tag: Tag,
  payload: Box<dyn Any + Send>,
}

/// State shared by all ranks of a group.
struct Group {
  senders: Vec<Sender<Envelope>>,
  aborted: AtomicBool,
  /// First rank that raised the abort flag.
  abort_origin: AtomicUsize,
}

impl Group {
  fn abort(&self, rank: Rank) {
    let _ = self
      .abort_origin
      .compare_exchange(NO_RANK, rank, Ordering::AcqRel, Ordering::Acquire);
    self.aborted.store(true, Ordering::Release);
  }

  fn is_aborted(&self) -> bool {
    self.aborted.load(Ordering::Acquire)
  }
}

/// One rank's handle on the group.
///
/// Clones share the inbox and the epoch counter, so a clone is the same
/// rank, not a new participant. [`Comm::duplicate`] gives a handle with its
/// own context whose messages never match those of the original.
#[derive(Clone)]
pub struct Comm {
  rank: Rank,
  group: Arc<Group>,
  inbox: Receiver<Envelope>,
  /// Messages that arrived before their matching receive was posted.
  pending: Arc<Mutex<VecDeque<Envelope>>>,
  context: u64,
  epoch: Arc<AtomicU64>,
  /// Next free context id, shared by every handle of this rank.
  contexts: Arc<AtomicU64>,
}

impl std::fmt::Debug for Comm {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Comm")
      .field("rank", &self.rank)
      .field("size", &self.size())
      .field("context", &self.context)
      .finish()
  }
}

impl Comm {
  /// Create the handles of a new group, one per rank.
  pub fn group(size: usize) -> Vec<Comm> {
    assert!(size > 0, "a group needs at least one rank");
    let (senders, receivers): (Vec<_>, Vec<_>) = (0..size).map(|_| unbounded()).unzip();
    let group = Arc::new(Group {
      senders,
      aborted: AtomicBool::new(false),
      abort_origin: AtomicUsize::new(NO_RANK),
    });
    receivers
      .into_iter()
      .enumerate()
      .map(|(rank, inbox)| Comm {
        rank,
        group: Arc::clone(&group),
        inbox,
        pending: Arc::new(Mutex::new(VecDeque::new())),
        context: 0,
        epoch: Arc::new(AtomicU64::new(0)),
        contexts: Arc::new(AtomicU64::new(1)),
      })
      .collect()
  }

  /// This rank's index.
  #[inline]
  pub fn rank(&self) -> Rank {
    self.rank
  }

  /// Number of ranks in the group.
  #[inline]
  pub fn size(&self) -> usize {
    self.group.senders.len()
  }

  /// Raise the group abort flag.
  pub fn abort(&self) {
    self.group.abort(self.rank);
  }

  /// Communication context of this handle; 0 for the handles of
  /// [`Comm::group`].
  #[inline]
  pub fn context(&self) -> u64 {
    self.context
  }

  /// Draw the tag for the next collective.
  ///
  /// Must be called the same number of times on every rank.
  pub fn next_tag(&self, kind: TagKind) -> Tag {
    Tag {
      context: self.context,
      epoch: self.epoch.fetch_add(1, Ordering::Relaxed),
      kind,
    }
  }

  /// Collective: a handle for the same rank in a fresh context with its own
  /// epoch counter.
  ///
  /// Every rank must duplicate in the same order, so the context ids agree.
  pub fn duplicate(&self) -> Result<Comm, CommError> {
    self.barrier()?;
    let context = self.contexts.fetch_add(1, Ordering::Relaxed);
    tracing::trace!(rank = self.rank, context, "duplicate");
    Ok(Comm {
      context,
      epoch: Arc::new(AtomicU64::new(0)),
      ..self.clone()
    })
  }

  fn check_rank(&self, rank: Rank) -> Result<(), CommError> {
    if rank < self.size() {
      Ok(())
    } else {
      Err(CommError::InvalidRank {
        rank,
        size: self.size(),
      })
    }
  }

  /// Send a value to `to` (non-blocking, unbounded buffering).
  pub fn send<T: Send + 'static>(&self, to: Rank, tag: Tag, value: T) -> Result<(), CommError> {
    self.check_rank(to)?;
    if self.group.is_aborted() {
      return Err(CommError::Aborted);
    }
    tracing::trace!(from = self.rank, to, ?tag, "send");
    self.group.senders[to]
      .send(Envelope {
        from: self.rank,
        tag,
        payload: Box::new(value),
      })
      .map_err(|_| {
        if self.group.is_aborted() {
          CommError::Aborted
        } else {
          CommError::Disconnected { peer: to }
        }
      })
  }

  /// Block until the message from `from` with `tag` arrives.
  pub fn recv<T: Send + 'static>(&self, from: Rank, tag: Tag) -> Result<T, CommError> {
    self.check_rank(from)?;
    let envelope = self.take_matching(from, tag)?;
    envelope
      .payload
      .downcast::<T>()
      .map(|boxed| *boxed)
      .map_err(|_| CommError::PayloadType { from })
  }

  fn take_matching(&self, from: Rank, tag: Tag) -> Result<Envelope, CommError> {
    let mut pending = self.pending.lock().map_err(|_| CommError::Aborted)?;
    if let Some(index) = pending
      .iter()
      .position(|e| e.from == from && e.tag == tag)
    {
      if let Some(envelope) = pending.remove(index) {
        return Ok(envelope);
      }
    }

    loop {
      match self.inbox.recv_timeout(ABORT_POLL) {
        Ok(envelope) if envelope.from == from && envelope.tag == tag => return Ok(envelope),
        Ok(envelope) => pending.push_back(envelope),
        Err(RecvTimeoutError::Timeout) => {
          if self.group.is_aborted() {
            return Err(CommError::Aborted);
          }
        }
        Err(RecvTimeoutError::Disconnected) => return Err(CommError::Disconnected { peer: from }),
      }
    }
  }

  /// Every rank contributes one value; every rank receives all of them in
  /// rank order.
  pub fn allgather<T: Clone + Send + 'static>(&self, value: T) -> Result<Vec<T>, CommError> {
    let tag = self.next_tag(TagKind::Allgather);
    for peer in (0..self.size()).filter(|&p| p != self.rank) {
      self.send(peer, tag, value.clone())?;
    }
    let mut own = Some(value);
    let mut gathered = Vec::with_capacity(self.size());
    for peer in 0..self.size() {
      if peer == self.rank {
        if let Some(v) = own.take() {
          gathered.push(v);
        }
      } else {
        gathered.push(self.recv(peer, tag)?);
      }
    }
    Ok(gathered)
  }

  /// Global sum of one `u64` per rank.
  pub fn allreduce_sum(&self, value: u64) -> Result<u64, CommError> {
    Ok(self.allgather(value)?.into_iter().sum())
  }

  /// True on every rank if `flag` is true on any rank.
  pub fn allreduce_any(&self, flag: bool) -> Result<bool, CommError> {
    Ok(self.allgather(flag)?.into_iter().any(|f| f))
  }

  /// Synchronise all ranks.
  pub fn barrier(&self) -> Result<(), CommError> {
    self.allgather(()).map(|_| ())
  }

  /// Personalised all-to-all: `outgoing[r]` goes to rank `r`; the result
  /// holds the value received from each rank in rank order.
  pub fn all_to_all<T: Send + 'static>(&self, outgoing: Vec<T>) -> Result<Vec<T>, CommError> {
    assert_eq!(outgoing.len(), self.size(), "all_to_all needs one value per rank");
    let tag = self.next_tag(TagKind::AllToAll);
    let mut own = None;
    for (peer, value) in outgoing.into_iter().enumerate() {
      if peer == self.rank {
        own = Some(value);
      } else {
        self.send(peer, tag, value)?;
      }
    }
    let mut received = Vec::with_capacity(self.size());
    for peer in 0..self.size() {
      if peer == self.rank {
        received.extend(own.take());
      } else {
        received.push(self.recv(peer, tag)?);
      }
    }
    Ok(received)
  }

  /// Sparse point-to-point exchange with a known pattern.
  ///
  /// Sends each `(rank, value)` and receives exactly one message from every
  /// rank in `recv_from`. Received values come back in `recv_from` order.
  pub fn exchange<T: Send + 'static>(
    &self,
    outgoing: Vec<(Rank, T)>,
    recv_from: &[Rank],
  ) -> Result<Vec<(Rank, T)>, CommError> {
    let tag = self.next_tag(TagKind::PointToPoint);
    for (peer, value) in outgoing {
      self.send(peer, tag, value)?;
    }
    recv_from
      .iter()
      .map(|&peer| self.recv(peer, tag).map(|value| (peer, value)))
      .collect()
  }
}

/// Raises the abort flag if the rank's thread unwinds.
struct AbortOnPanic<'a> {
  comm: &'a Comm,
}

impl Drop for AbortOnPanic<'_> {
  fn drop(&mut self) {
    if std::thread::panicking() {
      self.comm.abort();
    }
  }
}

/// Run `body` on `size` ranks, one scoped thread each, and collect the
/// results in rank order.
///
/// If any rank panics, the panic of the first rank that aborted the group
/// is re-raised after all threads have finished.
pub fn run_group<R, F>(size: usize, body: F) -> Vec<R>
where
  F: Fn(Comm) -> R + Sync,
  R: Send,
{
  let comms = Comm::group(size);
  let group = Arc::clone(&comms[0].group);
  let body = &body;

  let outcomes: Vec<std::thread::Result<R>> = std::thread::scope(|scope| {
    let handles: Vec<_> = comms
      .into_iter()
      .map(|comm| {
        std::thread::Builder::new()
          .name(format!("rank-{}", comm.rank()))
          .spawn_scoped(scope, move || {
            let guard = AbortOnPanic { comm: &comm };
            let result = body(comm.clone());
            drop(guard);
            result
          })
          .unwrap_or_else(|e| panic!("failed to spawn rank thread: {e}"))
      })
      .collect();
    handles.into_iter().map(|h| h.join()).collect()
  });

  let origin = group.abort_origin.load(Ordering::Acquire);
  let mut results = Vec::with_capacity(size);
  let mut first_panic = None;
  for (rank, outcome) in outcomes.into_iter().enumerate() {
    match outcome {
      Ok(value) => results.push(value),
      Err(payload) => {
        if rank == origin || first_panic.is_none() {
          first_panic = Some(payload);
        }
      }
    }
  }
  if let Some(payload) = first_panic {
    std::panic::resume_unwind(payload);
  }
  results
}

#[cfg(test)]
#[path = "comm_test.rs"]
mod comm_test;
