//! Point-cloud synthesis for the eight supported distributions.
//!
//! Generation rejects exact duplicates as it goes, so the requested count
//! is the count of distinct points delivered. The carried coordinate is
//! `z = cos(x)` throughout, matching the file format the writers emit.

use std::str::FromStr;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution as _, Normal};
use rustc_hash::FxHashSet;
use thiserror::Error;

use crate::geometry::point::Point;
use crate::input::Input;

/// Disk and circle radius within the unit square.
const RADIUS: f64 = 0.45;
/// Radial width of the thin-circle ring.
const RING_WIDTH: f64 = 0.001;
/// Lattice resolution of the grid distribution.
const GRID_SIZE: f64 = 8192.0;
/// The two segments of the two-lines distribution.
const LINES: [[(f64, f64); 2]; 2] = [[(0.0, 0.0), (0.3, 0.5)], [(0.7, 0.5), (1.0, 1.0)]];

/// Supported point distributions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PointDistribution {
    /// Uniform over the unit square.
    #[default]
    Uniform,
    /// Normal around the square center.
    Gaussian,
    /// Uniform over a disk.
    Disk,
    /// A narrow annulus.
    ThinCircle,
    /// Exactly on a circle.
    Circle,
    /// Snapped to a fine lattice (mass cocircular degeneracies).
    Grid,
    /// On an axis-aligned ellipse.
    Ellipse,
    /// On two disjoint segments (mass collinear degeneracies).
    TwoLines,
}

/// Unrecognized distribution name.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("cannot find the distribution specified: {name}")]
pub struct UnknownDistribution {
    /// The rejected name.
    pub name: String,
}

impl FromStr for PointDistribution {
    type Err = UnknownDistribution;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Uniform" => Ok(Self::Uniform),
            "Gaussian" => Ok(Self::Gaussian),
            "Disk" => Ok(Self::Disk),
            "ThinCircle" => Ok(Self::ThinCircle),
            "Circle" => Ok(Self::Circle),
            "Grid" => Ok(Self::Grid),
            "Ellipse" => Ok(Self::Ellipse),
            "TwoLines" => Ok(Self::TwoLines),
            _ => Err(UnknownDistribution {
                name: s.to_owned(),
            }),
        }
    }
}

/// Options for one generation run.
#[derive(Clone, Copy, Debug)]
pub struct GenerateOptions {
    /// Which distribution to draw from.
    pub distribution: PointDistribution,
    /// Number of distinct points to produce.
    pub point_num: usize,
    /// RNG seed; equal seeds reproduce equal clouds.
    pub seed: u64,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            distribution: PointDistribution::Uniform,
            point_num: 1000,
            seed: 0,
        }
    }
}

/// Generate `opts.point_num` distinct points.
///
/// Distributions over small discrete supports (a coarse grid, short
/// segments) may saturate; generation stops with a warning once the
/// rejection loop exceeds a generous attempt budget.
#[must_use]
pub fn generate_points(opts: &GenerateOptions) -> Vec<Point> {
    let mut rng = StdRng::seed_from_u64(opts.seed);
    let normal = Normal::new(0.5, 0.15).expect("finite std dev");
    let mut seen: FxHashSet<(u64, u64)> =
        FxHashSet::with_capacity_and_hasher(opts.point_num, Default::default());
    let mut points = Vec::with_capacity(opts.point_num);

    let mut attempts = 0usize;
    let budget = opts.point_num.saturating_mul(100).saturating_add(1000);
    while points.len() < opts.point_num {
        attempts += 1;
        if attempts > budget {
            log::warn!(
                "generator saturated after {attempts} attempts; delivering {} of {} points",
                points.len(),
                opts.point_num,
            );
            break;
        }
        let (x, y) = sample(opts.distribution, &mut rng, &normal);
        let p = Point::with_z(x, y, x.cos());
        if seen.insert(p.xy_bits()) {
            points.push(p);
        }
    }
    points
}

/// Generate a cloud and wrap it in an [`Input`] with no constraints.
#[must_use]
pub fn generate_input(opts: &GenerateOptions) -> Input {
    Input {
        point_vec: generate_points(opts),
        constraint_vec: Vec::new(),
    }
}

fn sample(dist: PointDistribution, rng: &mut StdRng, normal: &Normal<f64>) -> (f64, f64) {
    match dist {
        PointDistribution::Uniform => (rng.random::<f64>(), rng.random::<f64>()),
        PointDistribution::Gaussian => (normal.sample(rng), normal.sample(rng)),
        PointDistribution::Disk => loop {
            let x = rng.random::<f64>() - 0.5;
            let y = rng.random::<f64>() - 0.5;
            if x * x + y * y <= RADIUS * RADIUS {
                break (x + 0.5, y + 0.5);
            }
        },
        PointDistribution::ThinCircle => {
            let d = rng.random::<f64>() * RING_WIDTH;
            let a = rng.random::<f64>() * std::f64::consts::TAU;
            ((RADIUS + d) * a.cos() + 0.5, (RADIUS + d) * a.sin() + 0.5)
        }
        PointDistribution::Circle => {
            let (x, y) = circle_point(rng);
            (x + 0.5, y + 0.5)
        }
        PointDistribution::Grid => {
            let snap = |v: f64| {
                let val = v * GRID_SIZE;
                let frac = val - val.floor();
                (if frac < 0.5 { val.floor() } else { val.ceil() }) / GRID_SIZE
            };
            (snap(rng.random::<f64>()), snap(rng.random::<f64>()))
        }
        PointDistribution::Ellipse => {
            let (x, y) = circle_point(rng);
            (x / 3.0 + 0.5, y * 2.0 / 3.0 + 0.5)
        }
        PointDistribution::TwoLines => {
            let line = &LINES[usize::from(rng.random::<f64>() >= 0.5)];
            let t = rng.random::<f64>();
            let x = (line[1].0 - line[0].0) * t + line[0].0;
            let y = (line[1].1 - line[0].1) * t + line[0].1;
            (x, y)
        }
    }
}

fn circle_point(rng: &mut StdRng) -> (f64, f64) {
    let a = rng.random::<f64>() * std::f64::consts::TAU;
    (RADIUS * a.cos(), RADIUS * a.sin())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distribution_names_match_the_file_format() {
        for (name, expected) in [
            ("Uniform", PointDistribution::Uniform),
            ("Gaussian", PointDistribution::Gaussian),
            ("Disk", PointDistribution::Disk),
            ("ThinCircle", PointDistribution::ThinCircle),
            ("Circle", PointDistribution::Circle),
            ("Grid", PointDistribution::Grid),
            ("Ellipse", PointDistribution::Ellipse),
            ("TwoLines", PointDistribution::TwoLines),
        ] {
            assert_eq!(name.parse::<PointDistribution>().unwrap(), expected);
        }
        assert!("Lattice".parse::<PointDistribution>().is_err());
    }

    #[test]
    fn generation_is_seeded_and_distinct() {
        let opts = GenerateOptions {
            distribution: PointDistribution::Uniform,
            point_num: 200,
            seed: 42,
        };
        let a = generate_points(&opts);
        let b = generate_points(&opts);
        assert_eq!(a.len(), 200);
        assert_eq!(a, b);

        let mut seen = FxHashSet::default();
        for p in &a {
            assert!(seen.insert(p.xy_bits()), "duplicate point generated");
        }
    }

    #[test]
    fn grid_points_sit_on_the_lattice() {
        let opts = GenerateOptions {
            distribution: PointDistribution::Grid,
            point_num: 100,
            seed: 7,
        };
        for p in generate_points(&opts) {
            let gx = p.x * GRID_SIZE;
            let gy = p.y * GRID_SIZE;
            assert_eq!(gx, gx.round());
            assert_eq!(gy, gy.round());
        }
    }

    #[test]
    fn carried_coordinate_is_cos_x() {
        let opts = GenerateOptions {
            distribution: PointDistribution::Circle,
            point_num: 16,
            seed: 3,
        };
        for p in generate_points(&opts) {
            assert_eq!(p.z, p.x.cos());
        }
    }

    #[test]
    fn disk_points_stay_inside_the_disk() {
        let opts = GenerateOptions {
            distribution: PointDistribution::Disk,
            point_num: 100,
            seed: 11,
        };
        for p in generate_points(&opts) {
            let dx = p.x - 0.5;
            let dy = p.y - 0.5;
            let r2 = dx * dx + dy * dy;
            assert!(
                r2 <= RADIUS * RADIUS || approx::relative_eq!(r2, RADIUS * RADIUS),
                "point ({}, {}) outside the disk",
                p.x,
                p.y
            );
        }
    }
}
