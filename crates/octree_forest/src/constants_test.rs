use super::*;

#[test]
fn test_root_len_is_power_of_two() {
  assert!((ROOT_LEN as u32).is_power_of_two());
  assert_eq!(octant_len(0), ROOT_LEN);
  assert_eq!(octant_len(MAX_LEVEL), 1);
}

#[test]
fn test_lengths_halve_per_level() {
  for level in 0..MAX_LEVEL {
    assert_eq!(
      octant_len(level),
      2 * octant_len(level + 1),
      "Length at level {} should be twice the length at level {}",
      level,
      level + 1
    );
  }
}

/// Every direction table entry must be a unit step on at least one axis and
/// the tables must not overlap.
#[test]
fn test_direction_tables_are_disjoint() {
  let mut all: Vec<[i32; 3]> = Vec::new();
  all.extend_from_slice(&FACE_OFFSETS);
  all.extend_from_slice(&EDGE_OFFSETS);
  all.extend_from_slice(&CORNER_OFFSETS);
  assert_eq!(all.len(), 26);

  for (i, a) in all.iter().enumerate() {
    assert!(a.iter().all(|c| (-1..=1).contains(c)));
    assert!(a.iter().any(|&c| c != 0), "Offset {:?} is the zero step", a);
    for b in &all[i + 1..] {
      assert_ne!(a, b, "Duplicate offset {:?}", a);
    }
  }

  assert!(FACE_OFFSETS
    .iter()
    .all(|o| o.iter().filter(|&&c| c != 0).count() == 1));
  assert!(EDGE_OFFSETS
    .iter()
    .all(|o| o.iter().filter(|&&c| c != 0).count() == 2));
  assert!(CORNER_OFFSETS
    .iter()
    .all(|o| o.iter().filter(|&&c| c != 0).count() == 3));
}

/// Corner offsets follow the child numbering (bit 0: X, bit 1: Y, bit 2: Z).
#[test]
fn test_corner_offsets_follow_child_bits() {
  for (i, offset) in CORNER_OFFSETS.iter().enumerate() {
    for axis in 0..DIM {
      let expected = if (i >> axis) & 1 == 1 { 1 } else { -1 };
      assert_eq!(offset[axis], expected);
    }
  }
}
