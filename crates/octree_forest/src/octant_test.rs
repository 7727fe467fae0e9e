use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use proptest::prelude::*;

use super::*;
use crate::constants::QMAX_LEVEL;

fn arb_octant() -> impl Strategy<Value = Octant> {
  (0u8..=QMAX_LEVEL).prop_flat_map(|level| {
    let cells = 1i64 << level;
    (0..cells, 0..cells, 0..cells).prop_map(move |(i, j, k)| {
      let len = octant_len(level) as i64;
      Octant::new((i * len) as i32, (j * len) as i32, (k * len) as i32, level)
    })
  })
}

// =========================================================================
// Octant structure
// =========================================================================

/// Equal octants must produce equal hashes (HashMap invariant).
#[test]
fn test_octant_hash_consistency() {
  let a = Octant::new(0, octant_len(2), 0, 2);
  let b = Octant::new(0, octant_len(2), 0, 2);

  let hash = |o: &Octant| {
    let mut hasher = DefaultHasher::new();
    o.hash(&mut hasher);
    hasher.finish()
  };

  assert_eq!(a, b);
  assert_eq!(hash(&a), hash(&b), "Equal octants must have equal hashes");
}

#[test]
#[should_panic(expected = "outside the root or misaligned")]
fn test_misaligned_octant_panics() {
  let _ = Octant::new(1, 0, 0, 3);
}

#[test]
#[should_panic(expected = "outside the root or misaligned")]
fn test_octant_outside_root_panics() {
  let _ = Octant::new(ROOT_LEN, 0, 0, 1);
}

/// Child bits: X (bit 0), Y (bit 1), Z (bit 2).
#[test]
fn test_child_offsets() {
  let parent = Octant::new(0, 0, 0, 1);
  let half = octant_len(2);
  for i in 0..CHILDREN {
    let child = parent.child(i);
    assert_eq!(child.level, 2);
    assert_eq!(child.x, if i & 1 != 0 { half } else { 0 });
    assert_eq!(child.y, if i & 2 != 0 { half } else { 0 });
    assert_eq!(child.z, if i & 4 != 0 { half } else { 0 });
    assert_eq!(child.child_id(), i, "Child {} reports wrong id", i);
    assert_eq!(child.parent(), Some(parent));
    assert!(parent.is_parent_of(&child));
    assert!(parent.is_ancestor_of(&child));
  }
}

#[test]
fn test_root_has_no_parent() {
  assert_eq!(Octant::root().parent(), None);
  assert_eq!(Octant::root().child_id(), 0);
  assert_eq!(Octant::root().side_len(), ROOT_LEN);
}

#[test]
fn test_children_form_a_family() {
  let parent = Octant::new(octant_len(3), 0, octant_len(3), 3);
  let children = parent.children();
  assert!(Octant::is_family(&children));

  let mut broken = children;
  broken.swap(0, 1);
  assert!(!Octant::is_family(&broken));
  assert!(!Octant::is_family(&children[..7]));
  assert!(children[0].is_sibling_of(&children[7]));
  assert!(!children[0].is_sibling_of(&children[0]));
}

#[test]
fn test_descendants_and_ancestors() {
  let octant = Octant::new(octant_len(2), octant_len(2), 0, 2);
  let first = octant.first_descendant(5);
  let last = octant.last_descendant(5);

  assert_eq!(first.coords(), octant.coords());
  assert_eq!(last.x, octant.x + octant.side_len() - octant_len(5));
  assert_eq!(first.ancestor(2), octant);
  assert_eq!(last.ancestor(2), octant);
  assert!(octant.contains(&octant));
  assert!(!octant.is_ancestor_of(&octant));
  assert!(octant.contains(&last));
}

#[test]
fn test_neighbor_may_leave_root() {
  let octant = Octant::new(0, 0, 0, 1);
  let left = octant.neighbor([-1, 0, 0]);
  assert!(!left.is_inside_root());
  assert_eq!(left.x, -octant_len(1));

  let right = octant.neighbor([1, 0, 0]);
  assert!(right.is_valid());
  assert_eq!(right, Octant::root().child(1));
}

#[test]
fn test_nearest_common_ancestor() {
  let a = Octant::root().child(0).child(7);
  let b = Octant::root().child(0).child(3).child(1);
  assert_eq!(a.nearest_common_ancestor(&b), Octant::root().child(0));

  let c = Octant::root().child(5);
  assert_eq!(a.nearest_common_ancestor(&c), Octant::root());
  assert_eq!(a.nearest_common_ancestor(&a), a);
}

// =========================================================================
// Morton order
// =========================================================================

#[test]
fn test_children_sorted_in_morton_order() {
  let children = Octant::root().child(3).children();
  for pair in children.windows(2) {
    assert!(pair[0] < pair[1], "{:?} should precede {:?}", pair[0], pair[1]);
  }
}

#[test]
fn test_ancestor_precedes_descendant() {
  let parent = Octant::root().child(6);
  let child = parent.child(0);
  assert!(parent < child);
  assert!(parent < parent.child(7));
  assert!(parent.child(7) < Octant::root().child(7));
}

#[test]
fn test_z_dominates_order() {
  let low_z_far_x = Octant::root().child(1).child(1);
  let high_z = Octant::root().child(4);
  assert!(low_z_far_x < high_z);
}

// =========================================================================
// Linear id encoding
// =========================================================================

#[test]
fn test_linear_id_of_children() {
  for i in 0..CHILDREN {
    let child = Octant::root().child(i);
    assert_eq!(child.linear_id(1), LinearId::from(i as u64));
  }
}

/// Deep levels need more than 64 bits.
#[test]
fn test_linear_id_at_finest_level_uses_high_limb() {
  let last = Octant::root().last_descendant(MAX_LEVEL);
  let id = last.linear_id(MAX_LEVEL);
  assert_eq!(id.bit_len(), 90);
  assert_eq!(id.high(), (1u64 << 26) - 1);
  assert_eq!(id.low(), u64::MAX);
  assert_eq!(Octant::from_linear_id(id, MAX_LEVEL), last);
}

#[test]
fn test_finer_octant_encodes_as_ancestor() {
  let octant = Octant::root().child(5).child(2).child(7);
  assert_eq!(octant.linear_id(1), LinearId::from(5));
  assert_eq!(octant.linear_id(2), LinearId::from(5 * 8 + 2));
}

#[test]
fn test_coarser_octant_encodes_minimal_corner() {
  let octant = Octant::root().child(3);
  let corner_cell = octant.first_descendant(4);
  assert_eq!(octant.linear_id(4), corner_cell.linear_id(4));
}

#[test]
#[should_panic(expected = "does not fit")]
fn test_from_linear_id_rejects_oversized_id() {
  let _ = Octant::from_linear_id(LinearId::from(8), 1);
}

proptest! {
  #[test]
  fn prop_decode_of_encode_truncates_to_grid(octant in arb_octant(), level in 0u8..=MAX_LEVEL) {
    let decoded = Octant::from_linear_id(octant.linear_id(level), level);
    let mask = !(octant_len(level) - 1);
    prop_assert_eq!(decoded.level, level);
    prop_assert_eq!(decoded.coords(), [octant.x & mask, octant.y & mask, octant.z & mask]);
  }

  #[test]
  fn prop_linear_id_order_matches_morton_order(a in arb_octant(), b in arb_octant()) {
    // at the finest grid, lid order equals Morton order up to level ties
    let la = a.linear_id(MAX_LEVEL);
    let lb = b.linear_id(MAX_LEVEL);
    if la != lb {
      prop_assert_eq!(la.cmp(&lb), a.cmp(&b));
    } else {
      prop_assert_eq!(a.cmp(&b), a.level.cmp(&b.level));
    }
  }

  #[test]
  fn prop_order_is_antisymmetric(a in arb_octant(), b in arb_octant()) {
    prop_assert_eq!(a.cmp(&b), b.cmp(&a).reverse());
    prop_assert_eq!(a == b, a.cmp(&b) == Ordering::Equal);
  }

  #[test]
  fn prop_parent_child_roundtrip(octant in arb_octant()) {
    if let Some(parent) = octant.parent() {
      prop_assert_eq!(parent.child(octant.child_id()), octant);
      prop_assert!(parent.is_ancestor_of(&octant));
    }
  }
}
