//! Axis-aligned bounding box for the physical extent of trees and octants.

use glam::DVec3;

/// Double-precision axis-aligned bounding box.
///
/// Each tree of a connectivity occupies one box in physical space; octants
/// map to sub-boxes of their tree's box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DAabb3 {
	/// Minimum corner (inclusive).
	pub min: DVec3,
	/// Maximum corner (inclusive).
	pub max: DVec3,
}

impl DAabb3 {
	/// Create a new AABB from min and max corners.
	///
	/// # Panics
	/// Debug-asserts that min <= max on all axes.
	pub fn new(min: DVec3, max: DVec3) -> Self {
		debug_assert!(
			min.x <= max.x && min.y <= max.y && min.z <= max.z,
			"AABB min must be <= max on all axes"
		);
		Self { min, max }
	}

	/// Sub-box spanning the fractional range `[lo, hi]` of this box per axis.
	///
	/// Fractions are in `[0, 1]`; `lo = 0, hi = 1` returns the box itself.
	#[inline]
	pub fn sub_box(&self, lo: DVec3, hi: DVec3) -> Self {
		let size = self.size();
		Self::new(self.min + size * lo, self.min + size * hi)
	}

	/// Get the size of the AABB (max - min).
	#[inline]
	pub fn size(&self) -> DVec3 {
		self.max - self.min
	}
}
