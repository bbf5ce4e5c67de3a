//! Property tests: random point clouds must always triangulate into a
//! checker-clean mesh, and the SoS predicates must stay antisymmetric and
//! repeatable for arbitrary index triples.

use proptest::prelude::*;

use del2d::core::checker::DelaunayChecker;
use del2d::core::triangulator::{
    InvalidInputError, TriangulateOptions, TriangulationError, Triangulator,
};
use del2d::geometry::kernel::PredicateKernel;
use del2d::geometry::point::Point;
use del2d::geometry::predicates::Orientation;
use del2d::input::Input;

/// Coordinates on a coarse lattice so that duplicates, collinear runs, and
/// cocircular quadruples all actually occur.
fn lattice_points(max_len: usize) -> impl Strategy<Value = Vec<Point>> {
    prop::collection::vec((0i32..32, 0i32..32), 3..max_len).prop_map(|coords| {
        coords
            .into_iter()
            .map(|(x, y)| Point::new(f64::from(x) * 0.25, f64::from(y) * 0.25))
            .collect()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn random_clouds_triangulate_cleanly(points in lattice_points(80)) {
        let mut input = Input::default();
        input.point_vec = points;
        input.remove_duplicates();
        prop_assume!(input.point_vec.len() >= 3);

        match Triangulator::new(TriangulateOptions::default()).compute(&input) {
            Ok(output) => {
                let report = DelaunayChecker::new(&input, &output).check_all();
                prop_assert!(report.pass(), "checker failed:\n{report}");

                let mut perm = output.org_point_idx.clone();
                perm.sort_unstable();
                let expected: Vec<u32> = (0..input.point_vec.len() as u32).collect();
                prop_assert_eq!(perm, expected);
            }
            Err(TriangulationError::InvalidInput {
                source: InvalidInputError::AllCollinear,
            }) => {
                // Legal outcome for a degenerate draw.
            }
            Err(other) => return Err(TestCaseError::fail(format!("{other}"))),
        }
    }

    #[test]
    fn sos_orientation_is_antisymmetric_and_stable(
        points in lattice_points(24),
        picks in prop::collection::vec(any::<prop::sample::Index>(), 3),
    ) {
        let mut input = Input::default();
        input.point_vec = points;
        input.remove_duplicates();
        prop_assume!(input.point_vec.len() >= 3);

        let mut pts = input.point_vec.clone();
        pts.push(Point::new(1e6, 1e6));
        let inf_idx = (pts.len() - 1) as u32;
        let kernel = PredicateKernel::new(&pts, inf_idx);

        let n = input.point_vec.len();
        let i = picks[0].index(n) as u32;
        let j = picks[1].index(n) as u32;
        let k = picks[2].index(n) as u32;
        prop_assume!(i != j && j != k && i != k);

        let fwd = kernel.orient2d_sos(i, j, k);
        prop_assert_ne!(fwd, Orientation::DEGENERATE);
        prop_assert_eq!(kernel.orient2d_sos(j, i, k), fwd.reversed());
        prop_assert_eq!(kernel.orient2d_sos(i, k, j), fwd.reversed());
        // Cyclic rotations preserve the sign.
        prop_assert_eq!(kernel.orient2d_sos(j, k, i), fwd);
        // Repeated calls agree.
        for _ in 0..4 {
            prop_assert_eq!(kernel.orient2d_sos(i, j, k), fwd);
        }
        // The infinity vertex is symbolic and still antisymmetric.
        let ideal = kernel.orient2d_sos(i, j, inf_idx);
        prop_assert_ne!(ideal, Orientation::DEGENERATE);
        prop_assert_eq!(kernel.orient2d_sos(j, i, inf_idx), ideal.reversed());
    }

    #[test]
    fn incircle_sos_decides_and_repeats(points in lattice_points(24)) {
        let mut input = Input::default();
        input.point_vec = points;
        input.remove_duplicates();
        prop_assume!(input.point_vec.len() >= 4);

        let mut pts = input.point_vec.clone();
        pts.push(Point::new(1e6, 1e6));
        let inf_idx = (pts.len() - 1) as u32;
        let kernel = PredicateKernel::new(&pts, inf_idx);

        // Use the first CCW triple as the triangle.
        let mut tri = None;
        'outer: for a in 0..4u32 {
            for b in 0..4u32 {
                for c in 0..4u32 {
                    if a != b && b != c && a != c
                        && kernel.orient2d_sos(a, b, c) == Orientation::POSITIVE
                    {
                        tri = Some([a, b, c]);
                        break 'outer;
                    }
                }
            }
        }
        let tri = tri.expect("some CCW triple exists among distinct points");

        for v in 0..input.point_vec.len() as u32 {
            if tri.contains(&v) {
                continue;
            }
            let first = kernel.incircle_sos(tri, v);
            prop_assert_ne!(first, del2d::geometry::predicates::InCircle::BOUNDARY);
            for _ in 0..3 {
                prop_assert_eq!(kernel.incircle_sos(tri, v), first);
            }
        }
    }
}
