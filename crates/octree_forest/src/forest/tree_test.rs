use super::*;

fn uniform(level: u8) -> Vec<Leaf<()>> {
  let mut octants = vec![Octant::root()];
  for _ in 0..level {
    octants = octants.iter().flat_map(|o| o.children()).collect();
  }
  octants.into_iter().map(Leaf::new).collect()
}

#[test]
fn test_empty_tree() {
  let tree: Tree<()> = Tree::new();
  assert!(tree.is_empty());
  assert_eq!(tree.len(), 0);
  assert_eq!(tree.max_level(), None);
  assert_eq!(tree.find_containing(&Octant::root()), None);
}

#[test]
fn test_level_counts_follow_leaves() {
  let mut leaves = uniform(1);
  let split = leaves.remove(3);
  for (offset, child) in split.octant.children().into_iter().enumerate() {
    leaves.insert(3 + offset, Leaf::new(child));
  }
  let tree = Tree::from_leaves(leaves);
  assert_eq!(tree.len(), 15);
  assert_eq!(tree.count_at(1), 7);
  assert_eq!(tree.count_at(2), 8);
  assert_eq!(tree.max_level(), Some(2));
  assert!(tree.is_sorted_and_disjoint());
  assert!(covers_root(tree.leaves().iter().map(|l| &l.octant)));
}

#[test]
fn test_find_containing() {
  let tree = Tree::from_leaves(uniform(2));
  let deep = Octant::root().child(5).child(2).child(7);
  let index = tree.find_containing(&deep).unwrap();
  assert_eq!(tree.leaves()[index].octant, Octant::root().child(5).child(2));

  // an ancestor of several leaves is not contained by any of them
  assert_eq!(tree.find_containing(&Octant::root().child(5)), None);
}

#[test]
fn test_take_leaves_resets_counts() {
  let mut tree = Tree::from_leaves(uniform(1));
  let taken = tree.take_leaves();
  assert_eq!(taken.len(), 8);
  assert!(tree.is_empty());
  assert_eq!(tree.count_at(1), 0);
}

#[test]
fn test_overlap_is_detected() {
  let leaves = vec![
    Leaf::<()>::new(Octant::root().child(0)),
    Leaf::new(Octant::root().child(0).child(1)),
  ];
  assert!(!Tree::from_leaves(leaves).is_sorted_and_disjoint());
}

#[test]
fn test_gap_is_not_a_cover() {
  let mut leaves = uniform(1);
  leaves.remove(4);
  assert!(!covers_root(leaves.iter().map(|l| &l.octant)));
  assert!(!covers_root(std::iter::empty::<&Octant>()));
  assert!(covers_root([Octant::root()].iter()));
}
