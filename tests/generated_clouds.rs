//! End-to-end runs over every synthetic distribution, including the
//! degenerate ones (lattice grids, exact circles, two collinear segments),
//! validated through the checker.

use std::collections::HashSet;

use del2d::core::checker::DelaunayChecker;
use del2d::core::triangulator::{TriangulateOptions, Triangulator};
use del2d::input::generate::{generate_input, GenerateOptions, PointDistribution};

fn run_distribution(distribution: PointDistribution, point_num: usize, seed: u64) {
    let input = generate_input(&GenerateOptions {
        distribution,
        point_num,
        seed,
    });
    assert_eq!(input.point_vec.len(), point_num);

    let output = Triangulator::new(TriangulateOptions::default())
        .compute(&input)
        .unwrap_or_else(|e| panic!("{distribution:?}: {e}"));

    let report = DelaunayChecker::new(&input, &output).check_all();
    assert!(report.pass(), "{distribution:?} failed checks:\n{report}");

    let mut covered: HashSet<u32> = HashSet::new();
    for tri in &output.tri_vec {
        covered.extend(tri.v);
    }
    assert_eq!(
        covered.len(),
        point_num,
        "{distribution:?}: not every vertex is covered"
    );
}

#[test]
fn uniform_cloud() {
    run_distribution(PointDistribution::Uniform, 500, 1);
}

#[test]
fn gaussian_cloud() {
    run_distribution(PointDistribution::Gaussian, 500, 2);
}

#[test]
fn disk_cloud() {
    run_distribution(PointDistribution::Disk, 400, 3);
}

#[test]
fn thin_circle_cloud() {
    run_distribution(PointDistribution::ThinCircle, 300, 4);
}

#[test]
fn exact_circle_cloud() {
    // Every point on one circle: everything is cocircular with everything.
    run_distribution(PointDistribution::Circle, 200, 5);
}

#[test]
fn lattice_grid_cloud() {
    // Snapped to a fine lattice: dense cocircular quadruples.
    run_distribution(PointDistribution::Grid, 400, 6);
}

#[test]
fn ellipse_cloud() {
    run_distribution(PointDistribution::Ellipse, 200, 7);
}

#[test]
fn two_lines_cloud() {
    // Mass collinearity along two segments.
    run_distribution(PointDistribution::TwoLines, 200, 8);
}

#[test]
fn seeds_change_the_cloud_but_not_validity() {
    for seed in 10..14 {
        run_distribution(PointDistribution::Uniform, 150, seed);
    }
}
