//! Fast geometric predicates with a-priori error bounds.
//!
//! These are the first tier of the predicate hierarchy: plain
//! double-precision evaluation guarded by the classical forward error bound.
//! A result inside the bound is reported as [`Orientation::DEGENERATE`] /
//! [`InCircle::BOUNDARY`], which is a fallthrough signal for the exact tier,
//! not a statement of geometric truth.
//!
//! The machine-epsilon-derived bound constants are computed once per process
//! behind a lazily-initialized singleton; [`init`] forces the computation up
//! front and is idempotent and thread-safe.

use once_cell::sync::Lazy;

use crate::geometry::point::Point;

/// Result of an orientation test.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Orientation {
    /// Negative signed area (clockwise turn).
    NEGATIVE,
    /// Zero, or too small to classify at the current tier.
    DEGENERATE,
    /// Positive signed area (counter-clockwise turn).
    POSITIVE,
}

impl Orientation {
    /// The opposite sign; `DEGENERATE` is its own opposite.
    #[must_use]
    #[inline]
    pub const fn reversed(self) -> Self {
        match self {
            Self::NEGATIVE => Self::POSITIVE,
            Self::DEGENERATE => Self::DEGENERATE,
            Self::POSITIVE => Self::NEGATIVE,
        }
    }

    /// Classify a determinant sign.
    #[must_use]
    #[inline]
    pub fn from_det(det: f64) -> Self {
        if det > 0.0 {
            Self::POSITIVE
        } else if det < 0.0 {
            Self::NEGATIVE
        } else {
            Self::DEGENERATE
        }
    }
}

impl std::fmt::Display for Orientation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NEGATIVE => write!(f, "NEGATIVE"),
            Self::DEGENERATE => write!(f, "DEGENERATE"),
            Self::POSITIVE => write!(f, "POSITIVE"),
        }
    }
}

/// Result of an in-circle test.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InCircle {
    /// The query point is outside the circumcircle.
    OUTSIDE,
    /// On the circumcircle, or too close to classify at the current tier.
    BOUNDARY,
    /// Strictly inside the circumcircle.
    INSIDE,
}

impl std::fmt::Display for InCircle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OUTSIDE => write!(f, "OUTSIDE"),
            Self::BOUNDARY => write!(f, "BOUNDARY"),
            Self::INSIDE => write!(f, "INSIDE"),
        }
    }
}

/// Error-bound constants derived from the machine epsilon.
///
/// The derivation follows Shewchuk's `exactinit`: `epsilon` is the largest
/// power of two such that `1.0 + epsilon == 1.0` in double precision, and
/// the per-predicate bounds scale it by the operation counts of the
/// corresponding determinants.
#[derive(Clone, Copy, Debug)]
pub struct PredicateConsts {
    /// Machine epsilon as used by the bound formulas.
    pub epsilon: f64,
    /// A-priori bound coefficient for the 2D orientation determinant.
    pub ccw_err_bound: f64,
    /// A-priori bound coefficient for the 2D in-circle determinant.
    pub icc_err_bound: f64,
}

impl PredicateConsts {
    fn compute() -> Self {
        let mut epsilon = 1.0f64;
        let mut check = 1.0f64;
        // Repeatedly halve until adding to one is absorbed.
        loop {
            let last = check;
            epsilon *= 0.5;
            check = 1.0 + epsilon;
            if check == 1.0 || check == last {
                break;
            }
        }
        Self {
            epsilon,
            ccw_err_bound: (3.0 + 16.0 * epsilon) * epsilon,
            icc_err_bound: (10.0 + 96.0 * epsilon) * epsilon,
        }
    }
}

static CONSTS: Lazy<PredicateConsts> = Lazy::new(PredicateConsts::compute);

/// Force computation of the error-bound constants. Idempotent.
pub fn init() {
    Lazy::force(&CONSTS);
}

/// The process-wide predicate constants.
#[must_use]
#[inline]
pub fn consts() -> &'static PredicateConsts {
    &CONSTS
}

/// Signed-area orientation of `(a, b, c)`, fast tier.
///
/// Returns [`Orientation::DEGENERATE`] whenever the determinant magnitude is
/// within the rounding-error bound of zero; callers fall through to the
/// exact tier in that case.
#[must_use]
pub fn orient2d_fast(a: &Point, b: &Point, c: &Point) -> Orientation {
    let det_left = (a.x - c.x) * (b.y - c.y);
    let det_right = (a.y - c.y) * (b.x - c.x);
    let det = det_left - det_right;

    let det_sum = if det_left > 0.0 {
        if det_right <= 0.0 {
            return Orientation::from_det(det);
        }
        det_left + det_right
    } else if det_left < 0.0 {
        if det_right >= 0.0 {
            return Orientation::from_det(det);
        }
        -det_left - det_right
    } else {
        return Orientation::from_det(det);
    };

    let err_bound = consts().ccw_err_bound * det_sum;
    if det >= err_bound || -det >= err_bound {
        Orientation::from_det(det)
    } else {
        Orientation::DEGENERATE
    }
}

/// Raw floating-point orientation determinant of `(a, b, c)`.
#[must_use]
#[inline]
pub fn orient2d_det(a: &Point, b: &Point, c: &Point) -> f64 {
    (a.x - c.x) * (b.y - c.y) - (a.y - c.y) * (b.x - c.x)
}

/// In-circle test of `d` against the circumcircle of CCW `(a, b, c)`,
/// fast tier.
///
/// Returns [`InCircle::BOUNDARY`] whenever the determinant magnitude is
/// within the rounding-error bound of zero.
#[must_use]
pub fn incircle_fast(a: &Point, b: &Point, c: &Point, d: &Point) -> InCircle {
    let (det, permanent) = incircle_det_and_permanent(a, b, c, d);
    let err_bound = consts().icc_err_bound * permanent;
    if det > err_bound {
        InCircle::INSIDE
    } else if -det > err_bound {
        InCircle::OUTSIDE
    } else {
        InCircle::BOUNDARY
    }
}

/// Raw floating-point in-circle determinant.
///
/// Positive means `d` is inside the circumcircle of CCW `(a, b, c)`. Used as
/// a flip-priority tiebreaker, never as a truth value.
#[must_use]
#[inline]
pub fn incircle_det(a: &Point, b: &Point, c: &Point, d: &Point) -> f64 {
    incircle_det_and_permanent(a, b, c, d).0
}

fn incircle_det_and_permanent(a: &Point, b: &Point, c: &Point, d: &Point) -> (f64, f64) {
    let adx = a.x - d.x;
    let ady = a.y - d.y;
    let bdx = b.x - d.x;
    let bdy = b.y - d.y;
    let cdx = c.x - d.x;
    let cdy = c.y - d.y;

    let bdx_cdy = bdx * cdy;
    let cdx_bdy = cdx * bdy;
    let a_lift = adx * adx + ady * ady;

    let cdx_ady = cdx * ady;
    let adx_cdy = adx * cdy;
    let b_lift = bdx * bdx + bdy * bdy;

    let adx_bdy = adx * bdy;
    let bdx_ady = bdx * ady;
    let c_lift = cdx * cdx + cdy * cdy;

    let det = a_lift * (bdx_cdy - cdx_bdy)
        + b_lift * (cdx_ady - adx_cdy)
        + c_lift * (adx_bdy - bdx_ady);

    let permanent = (bdx_cdy.abs() + cdx_bdy.abs()) * a_lift
        + (cdx_ady.abs() + adx_cdy.abs()) * b_lift
        + (adx_bdy.abs() + bdx_ady.abs()) * c_lift;

    (det, permanent)
}
