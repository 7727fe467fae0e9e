//! User callbacks that run when leaves are created or replaced.

use crate::connectivity::TreeId;

use super::Leaf;

/// Initialiser for a freshly created leaf (payload is `D::default()`).
pub type InitFn<'a, D> = dyn FnMut(TreeId, &mut Leaf<D>) + 'a;

/// Called with the outgoing and the incoming leaves of one replacement:
/// one parent and its eight children on refinement, the reverse on
/// coarsening. Incoming leaves are already initialised.
pub type ReplaceFn<'a, D> = dyn FnMut(TreeId, &[Leaf<D>], &mut [Leaf<D>]) + 'a;

/// Optional `init` and `replace` callbacks for one mutation.
pub struct Hooks<'a, D> {
  init: Option<Box<InitFn<'a, D>>>,
  replace: Option<Box<ReplaceFn<'a, D>>>,
}

impl<'a, D> Hooks<'a, D> {
  /// No callbacks.
  pub fn none() -> Self {
    Self {
      init: None,
      replace: None,
    }
  }

  /// Set the initialiser.
  pub fn with_init(mut self, init: impl FnMut(TreeId, &mut Leaf<D>) + 'a) -> Self {
    self.init = Some(Box::new(init));
    self
  }

  /// Set the replace callback.
  pub fn with_replace(
    mut self,
    replace: impl FnMut(TreeId, &[Leaf<D>], &mut [Leaf<D>]) + 'a,
  ) -> Self {
    self.replace = Some(Box::new(replace));
    self
  }

  pub(crate) fn init(&mut self, tree: TreeId, leaf: &mut Leaf<D>) {
    if let Some(init) = self.init.as_mut() {
      init(tree, leaf);
    }
  }

  pub(crate) fn replace(&mut self, tree: TreeId, outgoing: &[Leaf<D>], incoming: &mut [Leaf<D>]) {
    if let Some(replace) = self.replace.as_mut() {
      replace(tree, outgoing, incoming);
    }
  }

  /// Split `parent` into its children, running `init` on each child and
  /// then `replace` once. The parent is dropped.
  pub(crate) fn split(&mut self, tree: TreeId, parent: Leaf<D>) -> [Leaf<D>; 8]
  where
    D: Default,
  {
    let mut children = parent.octant.children().map(Leaf::new);
    for child in children.iter_mut() {
      self.init(tree, child);
    }
    self.replace(tree, std::slice::from_ref(&parent), &mut children);
    children
  }

  /// Merge a complete family into `parent`, running `init` on the parent and
  /// then `replace` once. The family is dropped.
  pub(crate) fn merge(&mut self, tree: TreeId, family: &[Leaf<D>]) -> Leaf<D>
  where
    D: Default,
  {
    let octant = family[0]
      .octant
      .parent()
      .unwrap_or_else(|| panic!("cannot merge a family at the root level"));
    let mut parent = Leaf::new(octant);
    self.init(tree, &mut parent);
    self.replace(tree, family, std::slice::from_mut(&mut parent));
    parent
  }
}

impl<D> Default for Hooks<'_, D> {
  fn default() -> Self {
    Self::none()
  }
}

/// What a coarsen predicate is asked about.
#[derive(Debug)]
pub enum CoarsenCandidate<'a, D> {
  /// Eight siblings in child order; returning `true` merges them.
  Family(&'a [Leaf<D>]),
  /// A leaf that is not part of a complete local family; the predicate's
  /// return value is ignored.
  Orphan(&'a Leaf<D>),
}

impl<'a, D> CoarsenCandidate<'a, D> {
  /// First leaf of the candidate.
  pub fn first(&self) -> &'a Leaf<D> {
    match self {
      CoarsenCandidate::Family(family) => &family[0],
      CoarsenCandidate::Orphan(leaf) => leaf,
    }
  }

  /// True for a family.
  pub fn is_family(&self) -> bool {
    matches!(self, CoarsenCandidate::Family(_))
  }
}

#[cfg(test)]
#[path = "hooks_test.rs"]
mod hooks_test;
