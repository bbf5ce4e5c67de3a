//! The orchestrator: input validation, phase sequencing, output assembly.
//!
//! [`Triangulator::compute`] owns every phase: validate, permute the input
//! along a Hilbert curve for walk locality, bootstrap the seed triangle and
//! the infinity fan, run the bulk engine to quiescence, repair residual
//! edges with the serial fixer, carve in the constraints, strip every
//! triangle touching the infinity vertex, and compact and translate the
//! result back to the caller's indexing.

use rayon::prelude::*;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::constraint::ConstraintInserter;
use crate::core::engine::{Engine, MAX_TRIS};
use crate::core::fixer;
use crate::core::mesh::{make_negative, Mesh, OppEdge, Tri, TriOpp, TRI_ALIVE};
use crate::core::pool::BufferPool;
use crate::geometry::kernel::PredicateKernel;
use crate::geometry::point::{bounding_box, Point};
use crate::geometry::predicates::{orient2d_det, Orientation};
use crate::geometry::sos::orient2d_exact;
use crate::input::{Edge, Input};

// =============================================================================
// Errors
// =============================================================================

/// Reasons an input is rejected before any work happens.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InvalidInputError {
    /// A triangulation needs at least three points.
    #[error("at least 3 points are required, got {count}")]
    TooFewPoints {
        /// Number of points supplied.
        count: usize,
    },
    /// Two points share exact coordinates; deduplicate first.
    #[error("points {first} and {second} have identical coordinates")]
    DuplicatePoint {
        /// Index of the first occurrence.
        first: u32,
        /// Index of the duplicate.
        second: u32,
    },
    /// Every input point lies on one line; no triangle has positive area.
    #[error("all input points are collinear")]
    AllCollinear,
    /// A constraint references a vertex that does not exist.
    #[error("constraint {constraint} references vertex {endpoint}, but there are {count} points")]
    ConstraintOutOfRange {
        /// Index of the offending constraint.
        constraint: usize,
        /// The out-of-range endpoint.
        endpoint: u32,
        /// Number of points supplied.
        count: usize,
    },
}

/// Everything `compute` can fail with. All failures abort the whole call;
/// no partially built mesh escapes.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TriangulationError {
    /// The input failed validation.
    #[error("invalid input: {source}")]
    InvalidInput {
        /// What was wrong with it.
        #[from]
        source: InvalidInputError,
    },
    /// A walk exceeded its step cap or a round made no progress. Should be
    /// unreachable on valid input; detection exists to catch bugs.
    #[error("engine stuck during {phase}: triangle {tri}, point {point:?}")]
    EngineStuck {
        /// The phase that stalled.
        phase: &'static str,
        /// The triangle involved.
        tri: u32,
        /// The point involved, if any.
        point: Option<u32>,
    },
    /// A coordinate was outside the predicates' domain (NaN or infinite).
    #[error("predicate domain violation: point {point} has a non-finite coordinate")]
    PredicateDomain {
        /// The offending point index.
        point: u32,
    },
    /// The triangle array outgrew the vote encoding.
    #[error("mesh capacity exceeded: {requested} triangle slots, cap is {cap}")]
    CapacityExceeded {
        /// Requested number of slots.
        requested: usize,
        /// The hard cap.
        cap: usize,
    },
}

// =============================================================================
// Options and output
// =============================================================================

/// Configuration for one `compute` call.
#[derive(Clone, Debug)]
pub struct TriangulateOptions {
    /// Insert every point, even one lying exactly on an existing edge
    /// (resolved by symbolic perturbation). When off, such points are
    /// skipped with a counter.
    pub insert_all: bool,
    /// Skip the Hilbert permutation of the input (deterministic debugging).
    pub no_sort: bool,
    /// Keep the engine's triangle order instead of sorting the output by
    /// vertex triple.
    pub no_reorder: bool,
    /// Log per-phase statistics at info level.
    pub verbose: bool,
    /// Step cap for point-location walks, star walks, and constraint flip
    /// sweeps. The default suits any non-adversarial input; raise it for
    /// pathological vertex degrees.
    pub max_walk_steps: usize,
}

impl Default for TriangulateOptions {
    fn default() -> Self {
        Self {
            insert_all: true,
            no_sort: false,
            no_reorder: false,
            verbose: false,
            max_walk_steps: 1_000_000,
        }
    }
}

/// The finished triangulation.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Output {
    /// Triangles over the caller's original point indices, CCW under SoS.
    pub tri_vec: Vec<Tri>,
    /// Parallel opposite-edge records; `-1` on hull boundaries.
    pub tri_opp_vec: Vec<TriOpp>,
    /// The synthetic far point used during construction.
    pub inf_pt: Point,
    /// `org_point_idx[i]` is the original index of internally-permuted
    /// point `i`; always a permutation of `0..N`.
    pub org_point_idx: Vec<u32>,
}

// =============================================================================
// The orchestrator
// =============================================================================

/// Owns the option set and the scratch-buffer pool across `compute` calls.
#[derive(Debug, Default)]
pub struct Triangulator {
    opts: TriangulateOptions,
    pool: BufferPool,
}

impl Triangulator {
    /// Create a triangulator with the given options.
    #[must_use]
    pub fn new(opts: TriangulateOptions) -> Self {
        Self {
            opts,
            pool: BufferPool::new(),
        }
    }

    /// The active options.
    #[must_use]
    pub const fn options(&self) -> &TriangulateOptions {
        &self.opts
    }

    /// Compute the (constrained) Delaunay triangulation of `input`.
    ///
    /// # Errors
    ///
    /// See [`TriangulationError`]; all failures discard the partial mesh.
    pub fn compute(&mut self, input: &Input) -> Result<Output, TriangulationError> {
        validate(input)?;
        let opts = &self.opts;
        let pool = &mut self.pool;
        let n = input.point_vec.len();
        if 2 * n + 16 > MAX_TRIS {
            return Err(TriangulationError::CapacityExceeded {
                requested: 2 * n + 16,
                cap: MAX_TRIS,
            });
        }

        // Permute for walk locality; `perm[i]` is the original index of
        // internal point i.
        let perm: Vec<u32> = if opts.no_sort {
            (0..n as u32).collect()
        } else {
            hilbert_order(&input.point_vec)
        };
        let mut points: Vec<Point> = perm
            .iter()
            .map(|&i| input.point_vec[i as usize])
            .collect();

        let (s0, s1, s2) = seed_triangle(&points)?;

        // The synthetic far point. Its coordinates are reported in the
        // output but every predicate involving it is symbolic.
        let (min, max) = bounding_box(&points).expect("validated non-empty");
        let span = (max.x - min.x).max(max.y - min.y).max(1.0);
        let inf_pt = Point::new(max.x + span, max.y + span);
        points.push(inf_pt);
        let inf_idx = n as u32;

        let pred = PredicateKernel::new(&points, inf_idx);
        let mut mesh = bootstrap(s0, s1, s2, inf_idx, n);

        // Initial locations: the three seed vertices are already in; every
        // other point starts round-robin over the four seed-fan triangles.
        let mut point_loc: Vec<i32> = pool.allocate(n);
        point_loc.resize(n, -1);
        let mut rr = 0u32;
        for (p, slot) in point_loc.iter_mut().enumerate() {
            let p = p as u32;
            if p == s0 || p == s1 || p == s2 {
                *slot = make_negative(0);
            } else {
                *slot = (rr % 4) as i32;
                rr += 1;
            }
        }

        let anchor = {
            let (a, b, c) = (
                pred.point(s0),
                pred.point(s1),
                pred.point(s2),
            );
            Point::new((a.x + b.x + c.x) / 3.0, (a.y + b.y + c.y) / 3.0)
        };

        let engine = Engine::new(&pred, opts, anchor);
        let (mut flip_log, stats) = engine.run(&mut mesh, &mut point_loc, pool)?;
        pool.release(point_loc);

        mesh.rebuild_vert_tri();
        let fixed = fixer::fix_stars(&pred, &mut mesh, &mut flip_log);
        let flattened = fixer::flatten_hull_slivers(&pred, &mut mesh, &mut flip_log);

        if !input.constraint_vec.is_empty() {
            // Constraints arrive in original indices; the mesh speaks
            // permuted ones until the final translation.
            let mut inv = vec![0u32; n];
            for (new_idx, &orig) in perm.iter().enumerate() {
                inv[orig as usize] = new_idx as u32;
            }
            let constraints: Vec<Edge> = input
                .constraint_vec
                .iter()
                .map(|e| Edge::new(inv[e.v[0] as usize], inv[e.v[1] as usize]))
                .collect();
            let inserter = ConstraintInserter::new(&pred, opts);
            let cstats = inserter.insert_all(&mut mesh, &constraints, &mut flip_log);
            if opts.verbose {
                log::info!(
                    "constraints: {} present, {} inserted, {} split, {} skipped",
                    cstats.already_present,
                    cstats.inserted,
                    cstats.split,
                    cstats.skipped,
                );
            }
        }

        // Strip the infinity fan, then translate to original indices.
        mesh.compact(|_, tri| !tri.has(inf_idx));
        for tri in &mut mesh.tris {
            for v in &mut tri.v {
                *v = perm[*v as usize];
            }
        }
        if !opts.no_reorder {
            reorder_triangles(&mut mesh);
        }

        if opts.verbose {
            let (allocs, hits) = pool.stats();
            log::info!(
                "compute: {} triangles, {} rounds, {} engine flips, {} fixer flips, \
                 {} slivers flattened, {} flips logged, pool {allocs} allocations / {hits} reuses",
                mesh.len(),
                stats.rounds,
                stats.flips,
                fixed,
                flattened,
                flip_log.len(),
            );
        }

        Ok(Output {
            tri_vec: mesh.tris,
            tri_opp_vec: mesh.opps,
            inf_pt,
            org_point_idx: perm,
        })
    }
}

// =============================================================================
// Validation and bootstrap helpers
// =============================================================================

fn validate(input: &Input) -> Result<(), TriangulationError> {
    let n = input.point_vec.len();
    if n < 3 {
        return Err(InvalidInputError::TooFewPoints { count: n }.into());
    }
    for (i, p) in input.point_vec.iter().enumerate() {
        if !p.is_finite() {
            return Err(TriangulationError::PredicateDomain { point: i as u32 });
        }
    }
    let mut seen: FxHashMap<(u64, u64), u32> =
        FxHashMap::with_capacity_and_hasher(n, Default::default());
    for (i, p) in input.point_vec.iter().enumerate() {
        if let Some(&first) = seen.get(&p.xy_bits()) {
            return Err(InvalidInputError::DuplicatePoint {
                first,
                second: i as u32,
            }
            .into());
        }
        seen.insert(p.xy_bits(), i as u32);
    }
    for (ci, e) in input.constraint_vec.iter().enumerate() {
        for &v in &e.v {
            if v as usize >= n {
                return Err(InvalidInputError::ConstraintOutOfRange {
                    constraint: ci,
                    endpoint: v,
                    count: n,
                }
                .into());
            }
        }
    }
    Ok(())
}

/// Choose the seed triangle: the lexicographic extremes plus the point with
/// the largest exactly-nonzero area against them, oriented CCW.
fn seed_triangle(points: &[Point]) -> Result<(u32, u32, u32), TriangulationError> {
    let lex = |p: &Point| (p.x, p.y);
    let mut v0 = 0usize;
    let mut v1 = 0usize;
    for (i, p) in points.iter().enumerate() {
        if lex(p) < lex(&points[v0]) {
            v0 = i;
        }
        if lex(p) > lex(&points[v1]) {
            v1 = i;
        }
    }
    debug_assert_ne!(v0, v1);

    let (a, b) = (&points[v0], &points[v1]);
    let mut v2: Option<(f64, usize)> = None;
    for (i, p) in points.iter().enumerate() {
        if i == v0 || i == v1 {
            continue;
        }
        if orient2d_exact(a, b, p) == Orientation::DEGENERATE {
            continue;
        }
        let det = orient2d_det(a, b, p).abs();
        if v2.map_or(true, |(best, _)| det > best) {
            v2 = Some((det, i));
        }
    }
    let Some((_, v2)) = v2 else {
        return Err(InvalidInputError::AllCollinear.into());
    };

    let (v0, v1, v2) = (v0 as u32, v1 as u32, v2 as u32);
    if orient2d_exact(a, b, &points[v2 as usize]) == Orientation::NEGATIVE {
        Ok((v1, v0, v2))
    } else {
        Ok((v0, v1, v2))
    }
}

/// The four-triangle seed mesh: the CCW seed triangle plus the closed fan
/// of ghost triangles to the infinity vertex. Every edge is shared.
fn bootstrap(s0: u32, s1: u32, s2: u32, inf: u32, n: usize) -> Mesh {
    let mut mesh = Mesh::with_capacity(2 * n + 16, n + 1);
    let t0 = mesh.push(Tri::new(s0, s1, s2), TriOpp::default());
    let t1 = mesh.push(Tri::new(s1, s0, inf), TriOpp::default());
    let t2 = mesh.push(Tri::new(s2, s1, inf), TriOpp::default());
    let t3 = mesh.push(Tri::new(s0, s2, inf), TriOpp::default());

    mesh.opps[t0 as usize] = TriOpp {
        e: [
            OppEdge::new(t2, 2),
            OppEdge::new(t3, 2),
            OppEdge::new(t1, 2),
        ],
    };
    mesh.opps[t1 as usize] = TriOpp {
        e: [
            OppEdge::new(t3, 1),
            OppEdge::new(t2, 0),
            OppEdge::new(t0, 2),
        ],
    };
    mesh.opps[t2 as usize] = TriOpp {
        e: [
            OppEdge::new(t1, 1),
            OppEdge::new(t3, 0),
            OppEdge::new(t0, 0),
        ],
    };
    mesh.opps[t3 as usize] = TriOpp {
        e: [
            OppEdge::new(t2, 1),
            OppEdge::new(t1, 0),
            OppEdge::new(t0, 1),
        ],
    };

    for &v in &[s0, s1, s2] {
        mesh.vert_tri[v as usize] = t0;
    }
    mesh
}

// =============================================================================
// Hilbert ordering and output reordering
// =============================================================================

const HILBERT_BITS: u32 = 16;

/// Order point indices along a Hilbert curve over the bounding box.
fn hilbert_order(points: &[Point]) -> Vec<u32> {
    let (min, max) = bounding_box(points).expect("non-empty");
    let side = 1u32 << HILBERT_BITS;
    let ex = (max.x - min.x).max(f64::MIN_POSITIVE);
    let ey = (max.y - min.y).max(f64::MIN_POSITIVE);
    let scale = f64::from(side - 1);

    let keys: Vec<u64> = points
        .par_iter()
        .map(|p| {
            let qx = (((p.x - min.x) / ex * scale) as u32).min(side - 1);
            let qy = (((p.y - min.y) / ey * scale) as u32).min(side - 1);
            hilbert_index(qx, qy, HILBERT_BITS)
        })
        .collect();

    let mut order: Vec<u32> = (0..points.len() as u32).collect();
    order.par_sort_unstable_by_key(|&i| (keys[i as usize], i));
    order
}

/// Hilbert curve index of a grid cell (Gray-code walk with quadrant
/// rotations).
fn hilbert_index(mut x: u32, mut y: u32, bits: u32) -> u64 {
    let n = 1u32 << bits;
    let mut d = 0u64;
    let mut s = n >> 1;
    while s > 0 {
        let rx = u32::from(x & s > 0);
        let ry = u32::from(y & s > 0);
        d += u64::from(s) * u64::from(s) * u64::from((3 * rx) ^ ry);
        if ry == 0 {
            if rx == 1 {
                x = n - 1 - x;
                y = n - 1 - y;
            }
            std::mem::swap(&mut x, &mut y);
        }
        s >>= 1;
    }
    d
}

/// Sort the output triangles by vertex triple and rewire the opposites.
fn reorder_triangles(mesh: &mut Mesh) {
    let m = mesh.len();
    let mut order: Vec<u32> = (0..m as u32).collect();
    order.sort_unstable_by_key(|&t| mesh.tris[t as usize].v);
    let mut new_of = vec![0u32; m];
    for (new_idx, &old) in order.iter().enumerate() {
        new_of[old as usize] = new_idx as u32;
    }

    let tris: Vec<Tri> = order.iter().map(|&o| mesh.tris[o as usize]).collect();
    let opps: Vec<TriOpp> = order
        .iter()
        .map(|&o| {
            let mut opp = mesh.opps[o as usize];
            for e in &mut opp.e {
                if !e.is_none() {
                    *e = e.redirected(new_of[e.tri() as usize], e.vi());
                }
            }
            opp
        })
        .collect();

    mesh.tris = tris;
    mesh.opps = opps;
    mesh.info = vec![TRI_ALIVE; m];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_short_and_duplicate_input() {
        let mut input = Input::default();
        input.point_vec = vec![Point::new(0.0, 0.0), Point::new(1.0, 0.0)];
        assert!(matches!(
            validate(&input),
            Err(TriangulationError::InvalidInput {
                source: InvalidInputError::TooFewPoints { count: 2 }
            })
        ));

        input.point_vec.push(Point::new(0.5, 0.5));
        input.point_vec.push(Point::new(0.5, 0.5));
        assert!(matches!(
            validate(&input),
            Err(TriangulationError::InvalidInput {
                source: InvalidInputError::DuplicatePoint {
                    first: 2,
                    second: 3
                }
            })
        ));
    }

    #[test]
    fn validate_rejects_out_of_range_constraint() {
        let mut input = Input::default();
        input.point_vec = vec![
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(0.0, 1.0),
        ];
        input.constraint_vec.push(Edge::new(0, 7));
        assert!(matches!(
            validate(&input),
            Err(TriangulationError::InvalidInput {
                source: InvalidInputError::ConstraintOutOfRange { endpoint: 7, .. }
            })
        ));
    }

    #[test]
    fn validate_rejects_non_finite_coordinates() {
        let mut input = Input::default();
        input.point_vec = vec![
            Point::new(0.0, 0.0),
            Point::new(f64::NAN, 0.0),
            Point::new(0.0, 1.0),
        ];
        assert!(matches!(
            validate(&input),
            Err(TriangulationError::PredicateDomain { point: 1 })
        ));
    }

    #[test]
    fn seed_rejects_collinear_cloud() {
        let points: Vec<Point> = (0..5).map(|i| Point::new(f64::from(i), 0.0)).collect();
        assert!(matches!(
            seed_triangle(&points),
            Err(TriangulationError::InvalidInput {
                source: InvalidInputError::AllCollinear
            })
        ));
    }

    #[test]
    fn seed_is_ccw() {
        let points = vec![
            Point::new(0.0, 0.0),
            Point::new(2.0, 0.1),
            Point::new(1.0, -3.0),
            Point::new(0.5, 0.2),
        ];
        let (a, b, c) = seed_triangle(&points).unwrap();
        assert_eq!(
            orient2d_exact(
                &points[a as usize],
                &points[b as usize],
                &points[c as usize]
            ),
            Orientation::POSITIVE
        );
    }

    #[test]
    fn bootstrap_mesh_is_a_closed_sphere() {
        let mesh = bootstrap(0, 1, 2, 3, 3);
        assert_eq!(mesh.len(), 4);
        for t in 0..4u32 {
            for e in 0..3 {
                let fwd = mesh.opp(t).e[e];
                assert!(!fwd.is_none());
                let back = mesh.opp(fwd.tri()).e[fwd.vi()];
                assert_eq!(back.tri(), t, "edge ({t},{e}) not mutual");
                assert_eq!(back.vi(), e, "edge ({t},{e}) slot mismatch");
            }
        }
    }

    #[test]
    fn hilbert_neighbors_are_close() {
        // Successive cells along the curve differ by one grid step.
        assert_eq!(hilbert_index(0, 0, 4), 0);
        assert_eq!(hilbert_index(1, 0, 4), 1);
        assert_eq!(hilbert_index(1, 1, 4), 2);
        assert_eq!(hilbert_index(0, 1, 4), 3);
        // Distinct cells get distinct indices.
        assert_ne!(hilbert_index(5, 9, 4), hilbert_index(9, 5, 4));
    }
}
