//! The predicate kernel.
//!
//! [`PredicateKernel`] bundles the tiered predicates behind the interface
//! the rest of the crate consumes: index-based orientation and in-circle
//! tests that run fast first, fall back to exact arithmetic, and (for the
//! `_sos` variants) finish with symbolic perturbation so that no query ever
//! comes back undecided.
//!
//! The kernel also owns the semantics of the synthetic point at infinity.
//! Its stored coordinates are decorative; every predicate involving
//! `inf_idx` is answered symbolically:
//!
//! - `orient2d(a, b, P∞)` is the sign of the turn of `(a → b)` counted CCW
//!   from east – `sign(b.y - a.y)`, ties broken by `sign(a.x - b.x)`, then
//!   by vertex index. The other argument positions reduce to this one by
//!   cyclic rotation.
//! - The circumdisk of a triangle containing `P∞` is the open half-plane
//!   beyond its finite edge, so the in-circle test degenerates to an
//!   orientation query against that edge.
//! - `P∞` lies outside every finite circumcircle.

use robust::{incircle as robust_incircle, Coord};

use crate::geometry::point::Point;
use crate::geometry::predicates::{
    self, incircle_fast, orient2d_det, orient2d_fast, InCircle, Orientation,
};
use crate::geometry::sos;

/// Tiered predicates over an indexed point set with one infinity vertex.
#[derive(Debug)]
pub struct PredicateKernel<'a> {
    points: &'a [Point],
    inf_idx: u32,
}

impl<'a> PredicateKernel<'a> {
    /// Create a kernel over `points`, where `points[inf_idx]` is the
    /// synthetic point at infinity.
    ///
    /// Forces the one-time computation of the error-bound constants.
    #[must_use]
    pub fn new(points: &'a [Point], inf_idx: u32) -> Self {
        predicates::init();
        debug_assert!((inf_idx as usize) < points.len());
        Self { points, inf_idx }
    }

    /// Number of points, including the infinity vertex.
    #[must_use]
    #[inline]
    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    /// Index of the infinity vertex.
    #[must_use]
    #[inline]
    pub const fn inf_idx(&self) -> u32 {
        self.inf_idx
    }

    /// Whether `v` is the infinity vertex.
    #[must_use]
    #[inline]
    pub const fn is_inf(&self, v: u32) -> bool {
        v == self.inf_idx
    }

    /// Coordinates of vertex `v`.
    #[must_use]
    #[inline]
    pub fn point(&self, v: u32) -> &Point {
        &self.points[v as usize]
    }

    // =========================================================================
    // Orientation
    // =========================================================================

    /// Orientation of `(a, b, c)`, fast → exact. `DEGENERATE` is a legal
    /// result and means the three points are exactly collinear.
    #[must_use]
    pub fn orient2d(&self, a: u32, b: u32, c: u32) -> Orientation {
        if let Some(sign) = self.orient_inf_cases(a, b, c) {
            return sign;
        }
        match orient2d_fast(self.point(a), self.point(b), self.point(c)) {
            Orientation::DEGENERATE => {
                sos::orient2d_exact(self.point(a), self.point(b), self.point(c))
            }
            sign => sign,
        }
    }

    /// Orientation of `(a, b, c)`, fast → exact → SoS. Never `DEGENERATE`.
    #[must_use]
    pub fn orient2d_sos(&self, a: u32, b: u32, c: u32) -> Orientation {
        if let Some(sign) = self.orient_inf_cases(a, b, c) {
            return sign;
        }
        sos::orient2d_sos(
            (self.point(a), a),
            (self.point(b), b),
            (self.point(c), c),
        )
    }

    /// Orientation over explicit `(point, index)` pairs, fast → exact → SoS.
    ///
    /// Exists for synthetic query points that are not part of the point set
    /// (the exterior-walk anchor); all three pairs must be finite.
    #[must_use]
    pub fn orient2d_sos_pts(
        &self,
        a: (&Point, u32),
        b: (&Point, u32),
        c: (&Point, u32),
    ) -> Orientation {
        sos::orient2d_sos(a, b, c)
    }

    /// Symbolic orientation against the infinity vertex: the east-turn rule.
    fn orient_ideal(&self, a: u32, b: u32) -> Orientation {
        let (pa, pb) = (self.point(a), self.point(b));
        if pa.y != pb.y {
            return if pb.y > pa.y {
                Orientation::POSITIVE
            } else {
                Orientation::NEGATIVE
            };
        }
        if pa.x != pb.x {
            return if pa.x > pb.x {
                Orientation::POSITIVE
            } else {
                Orientation::NEGATIVE
            };
        }
        // Coordinate-identical points; fall back to the index order so the
        // result stays total and antisymmetric.
        if a < b {
            Orientation::POSITIVE
        } else {
            Orientation::NEGATIVE
        }
    }

    /// Resolve orientation queries that involve the infinity vertex by
    /// cyclic rotation onto [`Self::orient_ideal`]. `None` means all three
    /// vertices are finite.
    fn orient_inf_cases(&self, a: u32, b: u32, c: u32) -> Option<Orientation> {
        if self.is_inf(c) {
            Some(self.orient_ideal(a, b))
        } else if self.is_inf(b) {
            Some(self.orient_ideal(c, a))
        } else if self.is_inf(a) {
            Some(self.orient_ideal(b, c))
        } else {
            None
        }
    }

    // =========================================================================
    // In-circle
    // =========================================================================

    /// In-circle test of vertex `v` against the circumdisk of `tri`,
    /// fast → exact. `BOUNDARY` is a legal result.
    #[must_use]
    pub fn incircle(&self, tri: [u32; 3], v: u32) -> InCircle {
        self.incircle_impl(tri, v, false)
    }

    /// In-circle test of vertex `v` against the circumdisk of `tri`,
    /// fast → exact → SoS. Never `BOUNDARY`.
    #[must_use]
    pub fn incircle_sos(&self, tri: [u32; 3], v: u32) -> InCircle {
        self.incircle_impl(tri, v, true)
    }

    fn incircle_impl(&self, tri: [u32; 3], v: u32, with_sos: bool) -> InCircle {
        // The infinity vertex is outside every finite circumcircle.
        if self.is_inf(v) {
            return InCircle::OUTSIDE;
        }
        // A triangle containing the infinity vertex has the open half-plane
        // beyond its finite edge as its circumdisk.
        if let Some((x, y)) = self.finite_edge_of_ghost(tri) {
            let sign = if with_sos {
                self.orient2d_sos(x, y, v)
            } else {
                self.orient2d(x, y, v)
            };
            return match sign {
                Orientation::POSITIVE => InCircle::INSIDE,
                Orientation::NEGATIVE => InCircle::OUTSIDE,
                Orientation::DEGENERATE => InCircle::BOUNDARY,
            };
        }

        let [a, b, c] = tri;
        let (pa, pb, pc, pv) = (self.point(a), self.point(b), self.point(c), self.point(v));
        match incircle_fast(pa, pb, pc, pv) {
            InCircle::BOUNDARY => {}
            clear => return clear,
        }
        let exact = robust_incircle(
            Coord { x: pa.x, y: pa.y },
            Coord { x: pb.x, y: pb.y },
            Coord { x: pc.x, y: pc.y },
            Coord { x: pv.x, y: pv.y },
        );
        if exact > 0.0 {
            return InCircle::INSIDE;
        }
        if exact < 0.0 {
            return InCircle::OUTSIDE;
        }
        if !with_sos {
            return InCircle::BOUNDARY;
        }
        match sos::incircle_symbolic([(pa, a), (pb, b), (pc, c), (pv, v)]) {
            Orientation::POSITIVE => InCircle::INSIDE,
            _ => InCircle::OUTSIDE,
        }
    }

    /// Raw in-circle determinant of vertex `v` against `tri`, used only as
    /// a flip-priority tiebreaker. Ghost triangles report their orientation
    /// determinant instead.
    #[must_use]
    pub fn incircle_det(&self, tri: [u32; 3], v: u32) -> f64 {
        if self.is_inf(v) {
            return 0.0;
        }
        if let Some((x, y)) = self.finite_edge_of_ghost(tri) {
            return orient2d_det(self.point(x), self.point(y), self.point(v));
        }
        let [a, b, c] = tri;
        predicates::incircle_det(self.point(a), self.point(b), self.point(c), self.point(v))
    }

    /// The finite edge `(x, y)` of a triangle containing the infinity
    /// vertex, in the cyclic order that puts the infinity vertex last.
    /// `None` when all three vertices are finite.
    #[must_use]
    pub fn finite_edge_of_ghost(&self, tri: [u32; 3]) -> Option<(u32, u32)> {
        for (i, &v) in tri.iter().enumerate() {
            if self.is_inf(v) {
                return Some((tri[(i + 1) % 3], tri[(i + 2) % 3]));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kernel_points() -> Vec<Point> {
        vec![
            Point::new(0.0, 0.0),  // 0
            Point::new(1.0, 0.0),  // 1
            Point::new(1.0, 1.0),  // 2
            Point::new(0.0, 1.0),  // 3
            Point::new(2.0, 0.0),  // 4 (collinear with 0, 1)
            Point::new(9.0, 9.0),  // 5 = infinity stand-in
        ]
    }

    #[test]
    fn orient_chain_and_antisymmetry() {
        let pts = kernel_points();
        let k = PredicateKernel::new(&pts, 5);
        assert_eq!(k.orient2d(0, 1, 2), Orientation::POSITIVE);
        assert_eq!(k.orient2d(1, 0, 2), Orientation::NEGATIVE);
        // Exactly collinear without SoS: degenerate is legal.
        assert_eq!(k.orient2d(0, 1, 4), Orientation::DEGENERATE);
        // With SoS: decided, antisymmetric, repeatable.
        let s = k.orient2d_sos(0, 1, 4);
        assert_ne!(s, Orientation::DEGENERATE);
        assert_eq!(k.orient2d_sos(1, 0, 4), s.reversed());
        assert_eq!(k.orient2d_sos(0, 1, 4), s);
    }

    #[test]
    fn ideal_orientation_follows_east_turn_rule() {
        let pts = kernel_points();
        let k = PredicateKernel::new(&pts, 5);
        // (0,0) -> (1,1): upward turn from east.
        assert_eq!(k.orient2d_sos(0, 2, 5), Orientation::POSITIVE);
        assert_eq!(k.orient2d_sos(2, 0, 5), Orientation::NEGATIVE);
        // Horizontal pair: tie broken by x.
        assert_eq!(k.orient2d_sos(1, 0, 5), Orientation::POSITIVE);
        // Cyclic rotations agree.
        assert_eq!(k.orient2d_sos(5, 0, 2), k.orient2d_sos(0, 2, 5));
        assert_eq!(k.orient2d_sos(0, 5, 2), k.orient2d_sos(2, 0, 5));
    }

    #[test]
    fn incircle_finite_cases() {
        let pts = vec![
            Point::new(0.0, 0.0),
            Point::new(2.0, 0.0),
            Point::new(0.0, 2.0),
            Point::new(0.5, 0.5),
            Point::new(5.0, 5.0),
            Point::new(99.0, 99.0), // infinity stand-in
        ];
        let k = PredicateKernel::new(&pts, 5);
        assert_eq!(k.incircle([0, 1, 2], 3), InCircle::INSIDE);
        assert_eq!(k.incircle([0, 1, 2], 4), InCircle::OUTSIDE);
        // Infinity is outside every finite circumcircle.
        assert_eq!(k.incircle([0, 1, 2], 5), InCircle::OUTSIDE);
        assert_eq!(k.incircle_sos([0, 1, 2], 5), InCircle::OUTSIDE);
    }

    #[test]
    fn incircle_cocircular_boundary_vs_sos() {
        let pts = kernel_points();
        let k = PredicateKernel::new(&pts, 5);
        // Unit square is cocircular: the non-SoS tier must say BOUNDARY and
        // the SoS tier must decide, consistently across calls.
        assert_eq!(k.incircle([0, 1, 2], 3), InCircle::BOUNDARY);
        let s = k.incircle_sos([0, 1, 2], 3);
        assert_ne!(s, InCircle::BOUNDARY);
        assert_eq!(k.incircle_sos([0, 1, 2], 3), s);
    }

    #[test]
    fn ghost_circumdisk_is_the_half_plane() {
        let pts = kernel_points();
        let k = PredicateKernel::new(&pts, 5);
        // Ghost (1, 0, inf): circumdisk is the half-plane left of 1 -> 0,
        // which is y < 0.
        let below = Point::new(0.5, -1.0);
        let pts2 = {
            let mut v = pts.clone();
            v.push(below);
            v
        };
        let k2 = PredicateKernel::new(&pts2, 5);
        assert_eq!(k2.incircle_sos([1, 0, 5], 6), InCircle::INSIDE);
        assert_eq!(k2.incircle_sos([1, 0, 5], 2), InCircle::OUTSIDE);
        // Rotated storage of the same ghost answers identically.
        assert_eq!(k2.incircle_sos([5, 1, 0], 6), InCircle::INSIDE);
        assert_eq!(k2.incircle_sos([0, 5, 1], 6), InCircle::INSIDE);
    }
}
