use super::*;

#[test]
fn test_unit_cube_has_no_neighbors() {
  let conn = Connectivity::unit_cube();
  assert_eq!(conn.num_trees(), 1);
  assert_eq!(conn.neighbor_tree(0, [0, 0, 0]), Some(0));
  assert_eq!(conn.neighbor_tree(0, [1, 0, 0]), None);
  assert_eq!(conn.neighbor_tree(0, [-1, -1, -1]), None);
}

#[test]
fn test_periodic_cube_wraps_to_itself() {
  let conn = Connectivity::periodic();
  for offset in crate::constants::CORNER_OFFSETS {
    assert_eq!(conn.neighbor_tree(0, offset), Some(0));
  }
}

#[test]
fn test_brick_tree_numbering() {
  let conn = Connectivity::brick([3, 2, 2], [false; 3]);
  assert_eq!(conn.num_trees(), 12);
  assert_eq!(conn.tree_coords(0), [0, 0, 0]);
  assert_eq!(conn.tree_coords(4), [1, 1, 0]);
  assert_eq!(conn.tree_coords(11), [2, 1, 1]);

  assert_eq!(conn.neighbor_tree(0, [1, 0, 0]), Some(1));
  assert_eq!(conn.neighbor_tree(0, [0, 1, 0]), Some(3));
  assert_eq!(conn.neighbor_tree(0, [0, 0, 1]), Some(6));
  assert_eq!(conn.neighbor_tree(0, [1, 1, 1]), Some(10));
  assert_eq!(conn.neighbor_tree(2, [1, 0, 0]), None);
}

#[test]
fn test_brick_periodic_axis_only_wraps_that_axis() {
  let conn = Connectivity::brick([2, 1, 1], [true, false, false]);
  assert_eq!(conn.neighbor_tree(1, [1, 0, 0]), Some(0));
  assert_eq!(conn.neighbor_tree(0, [-1, 0, 0]), Some(1));
  assert_eq!(conn.neighbor_tree(0, [0, 1, 0]), None);
}

#[test]
fn test_transform_exterior_translates_into_neighbor() {
  let conn = Connectivity::brick([2, 1, 1], [false; 3]);
  let octant = Octant::root().child(1).neighbor([1, 0, 0]);
  assert!(!octant.is_inside_root());

  let (tree, moved) = conn.transform_exterior(0, &octant).unwrap();
  assert_eq!(tree, 1);
  assert_eq!(moved, Octant::root().child(0));

  assert_eq!(conn.transform_exterior(1, &octant), None);
}

#[test]
fn test_transform_interior_is_identity() {
  let conn = Connectivity::unit_cube();
  let octant = Octant::root().child(3);
  assert_eq!(conn.transform_exterior(0, &octant), Some((0, octant)));
}

#[test]
fn test_octant_bounds_follow_geometry() {
  let conn = Connectivity::brick([2, 1, 1], [false; 3]).with_geometry(DVec3::splat(-1.0), 2.0);
  let tree1 = conn.tree_bounds(1);
  assert_eq!(tree1.min, DVec3::new(1.0, -1.0, -1.0));
  assert_eq!(tree1.max, DVec3::new(3.0, 1.0, 1.0));

  let bounds = conn.octant_bounds(1, &Octant::root().child(7));
  assert_eq!(bounds.min, DVec3::new(2.0, 0.0, 0.0));
  assert_eq!(bounds.max, DVec3::new(3.0, 1.0, 1.0));
}
