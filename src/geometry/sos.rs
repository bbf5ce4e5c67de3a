//! Simulation of Simplicity symbolic perturbation towers.
//!
//! When the exact tier reports an exactly degenerate configuration, these
//! routines decide a sign anyway by simulating an infinitesimal perturbation
//! of the points, ordered by their global vertex indices. The result is a
//! deterministic non-zero sign that is antisymmetric under argument swaps
//! and identical across repeated queries, which is what makes flip decisions
//! on degenerate inputs well-defined.
//!
//! Two towers are implemented:
//!
//! - **Orientation** follows the Edelsbrunner–Mücke ε-expansion for the 2D
//!   orientation determinant: rows are sorted by vertex index (tracking the
//!   permutation parity) and the first non-vanishing minor decides. For
//!   distinct points the expansion always terminates at a coordinate
//!   comparison; the constant term is the final fallback.
//! - **In-circle** perturbs only the lifted coordinate `x² + y²` of each
//!   point, by an amount that decreases strictly with the vertex index.
//!   The expansion of the 4×4 lifted determinant then reduces to signed
//!   orientation tests of the complementary triples, taken in ascending
//!   index order. Because the perturbation is a consistent weighted lift,
//!   Lawson flipping remains convergent under it.

use robust::{orient2d as robust_orient2d, Coord};

use crate::geometry::point::Point;
use crate::geometry::predicates::{orient2d_fast, Orientation};

#[inline]
fn coord(p: &Point) -> Coord<f64> {
    Coord { x: p.x, y: p.y }
}

/// Exact orientation sign via the adaptive expansion.
#[must_use]
#[inline]
pub fn orient2d_exact(a: &Point, b: &Point, c: &Point) -> Orientation {
    Orientation::from_det(robust_orient2d(coord(a), coord(b), coord(c)))
}

/// Orientation with the full fast → exact → symbolic chain over explicit
/// `(point, index)` pairs. Never returns [`Orientation::DEGENERATE`].
#[must_use]
pub fn orient2d_sos(a: (&Point, u32), b: (&Point, u32), c: (&Point, u32)) -> Orientation {
    match orient2d_fast(a.0, b.0, c.0) {
        Orientation::DEGENERATE => match orient2d_exact(a.0, b.0, c.0) {
            Orientation::DEGENERATE => orient2d_symbolic(a, b, c),
            sign => sign,
        },
        sign => sign,
    }
}

/// The orientation ε-tower, for inputs known to be exactly collinear.
///
/// Distinct coordinate pairs always resolve within the first two terms;
/// coordinate-identical points (which a deduplicated input never produces)
/// fall through to deeper minors and finally to the constant term, keeping
/// the function total and antisymmetric even on malformed input.
#[must_use]
pub fn orient2d_symbolic(a: (&Point, u32), b: (&Point, u32), c: (&Point, u32)) -> Orientation {
    debug_assert!(a.1 != b.1 && b.1 != c.1 && a.1 != c.1, "indices must be distinct");

    // Sort rows by vertex index, counting swaps for the permutation parity.
    let mut rows = [a, b, c];
    let mut swaps = 0u32;
    for i in 0..2 {
        for j in 0..2 - i {
            if rows[j].1 > rows[j + 1].1 {
                rows.swap(j, j + 1);
                swaps += 1;
            }
        }
    }
    let (p1, p2, p3) = (rows[0].0, rows[1].0, rows[2].0);

    // First non-vanishing term of the ε-expansion. Each term's sign is a
    // plain coordinate comparison, which is exact.
    let terms = [
        p3.x - p2.x, // coefficient of ε(1, y)
        p2.y - p3.y, // coefficient of ε(1, x)
        p1.x - p3.x, // coefficient of ε(2, y)
    ];
    let mut sign = Orientation::POSITIVE; // constant term ε(1,x)·ε(2,y)
    for &t in &terms {
        if t != 0.0 {
            sign = Orientation::from_det(t);
            break;
        }
    }

    if swaps % 2 == 1 {
        sign.reversed()
    } else {
        sign
    }
}

/// The in-circle lifted-coordinate tower, for four exactly cocircular
/// points given in the caller's argument order.
///
/// The perturbed determinant expands to cofactor terms, one per row; row
/// parity fixes the signs `(-, +, -, +)` and the row with the smallest
/// vertex index carries the dominant perturbation. For cocircular but not
/// collinear points the dominant row's orientation minor is exactly
/// non-zero; the all-collinear tail composes with the orientation tower of
/// that same row.
#[must_use]
pub fn incircle_symbolic(rows: [(&Point, u32); 4]) -> Orientation {
    // Complementary triple of each row, in argument order, with the
    // cofactor sign of the lifted column.
    let complement = |skip: usize| -> [(&Point, u32); 3] {
        let mut out = [rows[0]; 3];
        let mut k = 0;
        for (i, r) in rows.iter().enumerate() {
            if i != skip {
                out[k] = *r;
                k += 1;
            }
        }
        out
    };
    let row_sign = |skip: usize| -> bool { skip % 2 == 1 }; // true = keep, false = negate

    // Rows in ascending vertex-index order.
    let mut order = [0usize, 1, 2, 3];
    order.sort_by_key(|&i| rows[i].1);

    for &i in &order {
        let [x, y, z] = complement(i);
        let minor = orient2d_exact(x.0, y.0, z.0);
        if minor != Orientation::DEGENERATE {
            return if row_sign(i) { minor } else { minor.reversed() };
        }
    }

    // Every complementary triple is collinear: perturb the lowest-index
    // row's coordinates as well, through the orientation tower.
    let i = order[0];
    let [x, y, z] = complement(i);
    let minor = orient2d_sos(x, y, z);
    if row_sign(i) {
        minor
    } else {
        minor.reversed()
    }
}
