//! The `Point` type.
//!
//! Points are plain double-precision values. The third coordinate `z` is
//! carried through the pipeline verbatim for callers that attach a height or
//! payload to each point; the triangulation itself only ever reads `x` and
//! `y`.

use serde::{Deserialize, Serialize};

/// A 2D input point with a carried (never interpreted) third coordinate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// X coordinate.
    pub x: f64,
    /// Y coordinate.
    pub y: f64,
    /// Carried payload coordinate; ignored by the triangulation.
    pub z: f64,
}

impl Point {
    /// Create a point with `z = 0`.
    #[must_use]
    #[inline]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y, z: 0.0 }
    }

    /// Create a point with an explicit carried coordinate.
    #[must_use]
    #[inline]
    pub const fn with_z(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Whether both triangulated coordinates are finite.
    #[must_use]
    #[inline]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Exact coordinate equality on the triangulated coordinates only.
    ///
    /// Two points with equal `(x, y)` but different `z` are duplicates as
    /// far as the triangulation is concerned.
    #[must_use]
    #[inline]
    pub fn same_xy(&self, other: &Self) -> bool {
        self.x == other.x && self.y == other.y
    }

    /// Bit-level key of the triangulated coordinates, for exact hashing.
    #[must_use]
    #[inline]
    pub fn xy_bits(&self) -> (u64, u64) {
        (self.x.to_bits(), self.y.to_bits())
    }
}

/// Axis-aligned bounding box of a point sequence.
///
/// Returns `None` for an empty slice. Non-finite coordinates poison the
/// bounds and are the caller's responsibility to reject beforehand.
#[must_use]
pub fn bounding_box(points: &[Point]) -> Option<(Point, Point)> {
    let first = points.first()?;
    let (mut min, mut max) = (*first, *first);
    for p in &points[1..] {
        min.x = min.x.min(p.x);
        min.y = min.y.min(p.y);
        max.x = max.x.max(p.x);
        max.y = max.y.max(p.y);
    }
    Some((min, max))
}
