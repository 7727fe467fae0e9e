use super::*;

#[test]
fn test_single_rank_group() {
  let results = run_group(1, |comm| {
    assert_eq!(comm.size(), 1);
    comm.allgather(7u32).unwrap()
  });
  assert_eq!(results, vec![vec![7]]);
}

#[test]
fn test_allgather_in_rank_order() {
  let results = run_group(4, |comm| comm.allgather(comm.rank() * 10).unwrap());
  for gathered in results {
    assert_eq!(gathered, vec![0, 10, 20, 30]);
  }
}

#[test]
fn test_allreduce() {
  let results = run_group(5, |comm| {
    let sum = comm.allreduce_sum(comm.rank() as u64).unwrap();
    let any = comm.allreduce_any(comm.rank() == 2).unwrap();
    (sum, any)
  });
  assert!(results.iter().all(|&r| r == (10, true)));
}

#[test]
fn test_all_to_all_personalised() {
  let results = run_group(3, |comm| {
    let outgoing = (0..comm.size()).map(|to| (comm.rank(), to)).collect();
    comm.all_to_all(outgoing).unwrap()
  });
  for (rank, received) in results.into_iter().enumerate() {
    assert_eq!(received, vec![(0, rank), (1, rank), (2, rank)]);
  }
}

#[test]
fn test_exchange_sparse_ring() {
  let results = run_group(4, |comm| {
    let size = comm.size();
    let next = (comm.rank() + 1) % size;
    let prev = (comm.rank() + size - 1) % size;
    comm
      .exchange(vec![(next, format!("from {}", comm.rank()))], &[prev])
      .unwrap()
  });
  assert_eq!(results[0], vec![(3, "from 3".to_string())]);
  assert_eq!(results[2], vec![(1, "from 1".to_string())]);
}

/// Messages of a later collective must not be consumed by an earlier one.
#[test]
fn test_successive_collectives_do_not_mix() {
  let results = run_group(3, |comm| {
    let mut rounds = Vec::new();
    for round in 0..20u64 {
      rounds.push(comm.allreduce_sum(round).unwrap());
    }
    rounds
  });
  let expected: Vec<u64> = (0..20).map(|r| r * 3).collect();
  assert!(results.iter().all(|r| *r == expected));
}

#[test]
fn test_send_to_invalid_rank() {
  run_group(2, |comm| {
    let tag = comm.next_tag(TagKind::PointToPoint);
    assert_eq!(
      comm.send(9, tag, 1u8),
      Err(CommError::InvalidRank { rank: 9, size: 2 })
    );
  });
}

#[test]
fn test_wrong_payload_type_is_reported() {
  let results = run_group(2, |comm| {
    let tag = comm.next_tag(TagKind::PointToPoint);
    let peer = 1 - comm.rank();
    comm.send(peer, tag, 5u32).unwrap();
    comm.recv::<String>(peer, tag)
  });
  assert_eq!(results[0], Err(CommError::PayloadType { from: 1 }));
}

/// Traffic on a duplicate waits in the pending queue while the original
/// runs a collective of the same kind.
#[test]
fn test_duplicate_has_separate_context() {
  let results = run_group(2, |comm| {
    let dup = comm.duplicate().unwrap();
    assert_ne!(dup.context(), comm.context());
    let second = comm.duplicate().unwrap();
    assert_ne!(second.context(), dup.context());

    let peer = 1 - comm.rank();
    let dup_tag = dup.next_tag(TagKind::Allgather);
    if comm.rank() == 0 {
      dup.send(peer, dup_tag, 99u32).unwrap();
    }
    let gathered = comm.allgather(comm.rank() as u32).unwrap();
    let from_dup = if comm.rank() == 1 {
      Some(dup.recv::<u32>(peer, dup_tag).unwrap())
    } else {
      None
    };
    (dup.context(), gathered, from_dup)
  });
  assert_eq!(results[0].0, results[1].0);
  assert_eq!(results[0].1, vec![0, 1]);
  assert_eq!(results[1].1, vec![0, 1]);
  assert_eq!(results[1].2, Some(99));
}

#[test]
#[should_panic(expected = "rank 1 failed")]
fn test_panicking_rank_aborts_group() {
  run_group(3, |comm| {
    if comm.rank() == 1 {
      panic!("rank 1 failed");
    }
    // the others block on rank 1 until the abort flag is seen
    let err = comm.barrier().unwrap_err();
    assert_eq!(err, CommError::Aborted);
  });
}
