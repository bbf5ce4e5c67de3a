//! Post-hoc validation of a finished triangulation.
//!
//! The checker consumes an `(Input, Output)` pair and re-derives every
//! invariant the triangulator promises: Euler characteristic over unique
//! edges, adjacency symmetry with matching constraint bits, positive
//! orientation under SoS, the local Delaunay property across non-constraint
//! edges, and the presence of every requested constraint. It never mutates
//! anything and reports failures instead of aborting.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::core::triangulator::Output;
use crate::geometry::kernel::PredicateKernel;
use crate::geometry::point::Point;
use crate::geometry::predicates::{InCircle, Orientation};
use crate::input::Input;

/// Walk cap for the constraint-presence check.
const MAX_WALKING: usize = 1_000_000;

/// Result of the Euler-characteristic computation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EulerCheck {
    /// Distinct vertices referenced by the triangle list.
    pub vertices: usize,
    /// Unique undirected edges.
    pub edges: usize,
    /// Triangles.
    pub triangles: usize,
    /// `V - E + F`.
    pub euler: i64,
}

impl EulerCheck {
    /// A triangulated disk has characteristic 1.
    #[must_use]
    pub const fn pass(&self) -> bool {
        self.euler == 1
    }
}

/// Aggregated results of all five checks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CheckReport {
    /// Euler-characteristic computation.
    pub euler: EulerCheck,
    /// Asymmetric or bit-mismatched adjacency records.
    pub adjacency_failures: usize,
    /// Triangles that are not CCW under SoS.
    pub orientation_failures: usize,
    /// Non-constraint edges whose opposite vertex is strictly inside the
    /// owning circumcircle.
    pub delaunay_failures: usize,
    /// Constraints missing from the mesh or missing their bits.
    pub constraint_failures: usize,
}

impl CheckReport {
    /// Whether every check passed.
    #[must_use]
    pub const fn pass(&self) -> bool {
        self.euler.pass()
            && self.adjacency_failures == 0
            && self.orientation_failures == 0
            && self.delaunay_failures == 0
            && self.constraint_failures == 0
    }
}

impl std::fmt::Display for CheckReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Vertex: {} Edge: {} Triangle: {} Euler: {}",
            self.euler.vertices, self.euler.edges, self.euler.triangles, self.euler.euler
        )?;
        writeln!(
            f,
            "Euler check: {}",
            if self.euler.pass() { "Pass" } else { "***Fail***" }
        )?;
        if self.adjacency_failures == 0 {
            writeln!(f, "Adjacency check: Pass")?;
        } else {
            writeln!(
                f,
                "Adjacency check: ***Fail*** Mismatches: {}",
                self.adjacency_failures
            )?;
        }
        if self.orientation_failures == 0 {
            writeln!(f, "Orient check: Pass")?;
        } else {
            writeln!(
                f,
                "Orient check: ***Fail*** Wrong orient: {}",
                self.orientation_failures
            )?;
        }
        if self.delaunay_failures == 0 {
            writeln!(f, "Delaunay check: Pass")?;
        } else {
            writeln!(
                f,
                "Delaunay check: ***Fail*** Failed faces: {}",
                self.delaunay_failures
            )?;
        }
        if self.constraint_failures == 0 {
            writeln!(f, "Constraint check: Pass")
        } else {
            writeln!(
                f,
                "Constraint check: ***Fail*** Missing constraints: {}",
                self.constraint_failures
            )
        }
    }
}

/// Read-only validator over an `(Input, Output)` pair.
pub struct DelaunayChecker<'a> {
    input: &'a Input,
    output: &'a Output,
    points: Vec<Point>,
}

impl<'a> DelaunayChecker<'a> {
    /// Build a checker. Clones the input points once to append the
    /// infinity point reported by the output.
    #[must_use]
    pub fn new(input: &'a Input, output: &'a Output) -> Self {
        let mut points = input.point_vec.clone();
        points.push(output.inf_pt);
        Self {
            input,
            output,
            points,
        }
    }

    fn kernel(&self) -> PredicateKernel<'_> {
        PredicateKernel::new(&self.points, (self.points.len() - 1) as u32)
    }

    /// Distinct vertices referenced by the triangle list.
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        let mut verts: FxHashSet<u32> = FxHashSet::default();
        for tri in &self.output.tri_vec {
            verts.extend(tri.v.iter().copied());
        }
        verts.len()
    }

    /// Unique undirected edges. The original counted nothing here and its
    /// Euler line could never balance; counting explicitly is the fix.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        let mut edges: FxHashSet<(u32, u32)> = FxHashSet::default();
        for tri in &self.output.tri_vec {
            for e in 0..3 {
                let a = tri.v[(e + 1) % 3];
                let b = tri.v[(e + 2) % 3];
                edges.insert((a.min(b), a.max(b)));
            }
        }
        edges.len()
    }

    /// Number of triangles.
    #[must_use]
    pub fn triangle_count(&self) -> usize {
        self.output.tri_vec.len()
    }

    /// `V - E + F` over the finite triangulation.
    #[must_use]
    pub fn check_euler(&self) -> EulerCheck {
        let vertices = self.vertex_count();
        let edges = self.edge_count();
        let triangles = self.triangle_count();
        EulerCheck {
            vertices,
            edges,
            triangles,
            euler: vertices as i64 - edges as i64 + triangles as i64,
        }
    }

    /// Count asymmetric adjacency records and constraint-bit mismatches.
    #[must_use]
    pub fn check_adjacency(&self) -> usize {
        let opps = &self.output.tri_opp_vec;
        let mut failures = 0usize;
        for (t0, opp0) in opps.iter().enumerate() {
            for vi in 0..3 {
                let fwd = opp0.e[vi];
                if fwd.is_none() {
                    continue;
                }
                let (t1, vi1) = (fwd.tri() as usize, fwd.vi());
                let Some(opp1) = opps.get(t1) else {
                    failures += 1;
                    continue;
                };
                let back = opp1.e[vi1];
                if back.is_none()
                    || back.tri() as usize != t0
                    || back.vi() != vi
                    || back.is_constraint() != fwd.is_constraint()
                {
                    failures += 1;
                }
            }
        }
        failures
    }

    /// Count triangles that are not CCW under SoS.
    #[must_use]
    pub fn check_orientation(&self) -> usize {
        let kernel = self.kernel();
        self.output
            .tri_vec
            .iter()
            .filter(|t| kernel.orient2d_sos(t.v[0], t.v[1], t.v[2]) == Orientation::NEGATIVE)
            .count()
    }

    /// Count non-constraint interior edges whose opposite vertex lies
    /// strictly inside the owning circumcircle. `BOUNDARY` (cocircular)
    /// passes.
    #[must_use]
    pub fn check_delaunay(&self) -> usize {
        let kernel = self.kernel();
        let tris = &self.output.tri_vec;
        let opps = &self.output.tri_opp_vec;
        let mut failures = 0usize;
        for (bot_ti, bot_opp) in opps.iter().enumerate() {
            for bot_vi in 0..3 {
                let fwd = bot_opp.e[bot_vi];
                if fwd.is_none() || fwd.is_constraint() {
                    continue;
                }
                let top_ti = fwd.tri() as usize;
                if top_ti < bot_ti {
                    continue; // the neighbor checks this edge
                }
                let top_vert = tris[top_ti].v[fwd.vi()];
                if kernel.incircle(tris[bot_ti].v, top_vert) == InCircle::INSIDE {
                    failures += 1;
                }
            }
        }
        failures
    }

    /// Verify every constraint is present with its bits set on both sides.
    #[must_use]
    pub fn check_constraints(&self) -> usize {
        if self.input.constraint_vec.is_empty() {
            return 0;
        }
        let tris = &self.output.tri_vec;
        let opps = &self.output.tri_opp_vec;

        // One containing triangle per vertex.
        let mut vert_tri: FxHashMap<u32, u32> = FxHashMap::default();
        for (t, tri) in tris.iter().enumerate() {
            for &v in &tri.v {
                vert_tri.insert(v, t as u32);
            }
        }

        let mut failures = 0usize;
        for con in &self.input.constraint_vec {
            let [u, v] = con.v;
            let Some(&start) = vert_tri.get(&u) else {
                failures += 1;
                continue;
            };

            let mut found: Option<(usize, usize)> = None;
            let mut steps = 0usize;

            // CCW walk around u.
            let mut t = start as usize;
            let mut vi = tris[t].index_of(u).unwrap_or(0);
            while steps < MAX_WALKING {
                steps += 1;
                if tris[t].v[(vi + 2) % 3] == v {
                    found = Some((t, (vi + 1) % 3));
                    break;
                }
                let e = opps[t].e[(vi + 1) % 3];
                if e.is_none() {
                    break;
                }
                t = e.tri() as usize;
                vi = (e.vi() + 1) % 3;
                if t == start as usize {
                    break;
                }
            }

            // CW walk if the CCW one stopped at a boundary.
            if found.is_none() {
                t = start as usize;
                vi = tris[t].index_of(u).unwrap_or(0);
                while steps < MAX_WALKING {
                    steps += 1;
                    if tris[t].v[(vi + 1) % 3] == v {
                        found = Some((t, (vi + 2) % 3));
                        break;
                    }
                    let e = opps[t].e[(vi + 2) % 3];
                    if e.is_none() {
                        break;
                    }
                    t = e.tri() as usize;
                    vi = (e.vi() + 2) % 3;
                    if t == start as usize {
                        break;
                    }
                }
            }

            match found {
                Some((t, slot)) => {
                    let fwd = opps[t].e[slot];
                    let marked = if fwd.is_none() {
                        fwd.is_constraint()
                    } else {
                        fwd.is_constraint()
                            && opps[fwd.tri() as usize].e[fwd.vi()].is_constraint()
                    };
                    if !marked {
                        failures += 1;
                    }
                }
                None => {
                    if steps >= MAX_WALKING {
                        log::warn!("checker: vertex degree too high; skipping constraint");
                    }
                    failures += 1;
                }
            }
        }
        failures
    }

    /// Run every check.
    #[must_use]
    pub fn check_all(&self) -> CheckReport {
        CheckReport {
            euler: self.check_euler(),
            adjacency_failures: self.check_adjacency(),
            orientation_failures: self.check_orientation(),
            delaunay_failures: self.check_delaunay(),
            constraint_failures: self.check_constraints(),
        }
    }
}

/// Convenience wrapper: run all checks and log the report.
#[must_use]
pub fn check_and_log(input: &Input, output: &Output) -> CheckReport {
    let report = DelaunayChecker::new(input, output).check_all();
    log::info!("\n{report}");
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::mesh::{OppEdge, Tri, TriOpp};
    use crate::input::Input;

    /// A hand-built two-triangle square with correct adjacency.
    fn square_output() -> (Input, Output) {
        let mut input = Input::default();
        input.point_vec = vec![
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(1.0, 1.0),
            Point::new(0.0, 1.0),
        ];
        let tri_vec = vec![Tri::new(0, 1, 2), Tri::new(0, 2, 3)];
        let mut o0 = TriOpp::default();
        let mut o1 = TriOpp::default();
        // Shared diagonal (0, 2): slot 1 of tri 0, slot 2 of tri 1.
        o0.e[1] = OppEdge::new(1, 2);
        o1.e[2] = OppEdge::new(0, 1);
        let output = Output {
            tri_vec,
            tri_opp_vec: vec![o0, o1],
            inf_pt: Point::new(9.0, 9.0),
            org_point_idx: vec![0, 1, 2, 3],
        };
        (input, output)
    }

    #[test]
    fn hand_built_square_passes() {
        let (input, output) = square_output();
        let report = DelaunayChecker::new(&input, &output).check_all();
        assert_eq!(report.euler.vertices, 4);
        assert_eq!(report.euler.edges, 5);
        assert_eq!(report.euler.triangles, 2);
        assert!(report.pass(), "{report}");
    }

    #[test]
    fn corrupted_adjacency_is_reported_not_panicked() {
        let (input, mut output) = square_output();
        // Break one side of the shared edge.
        output.tri_opp_vec[1].e[2] = OppEdge::new(0, 0);
        let report = DelaunayChecker::new(&input, &output).check_all();
        assert!(report.adjacency_failures > 0);
        assert!(!report.pass());
    }

    #[test]
    fn flipped_orientation_is_reported() {
        let (input, mut output) = square_output();
        output.tri_vec[0] = Tri::new(0, 2, 1);
        let report = DelaunayChecker::new(&input, &output).check_all();
        assert_eq!(report.orientation_failures, 1);
    }

    #[test]
    fn missing_constraint_is_reported() {
        let (mut input, output) = square_output();
        // The diagonal (1, 3) is not an edge of this triangulation.
        input.constraint_vec.push(crate::input::Edge::new(1, 3));
        let report = DelaunayChecker::new(&input, &output).check_all();
        assert_eq!(report.constraint_failures, 1);
    }

    #[test]
    fn present_but_unmarked_constraint_fails() {
        let (mut input, output) = square_output();
        // The diagonal (0, 2) is an edge but carries no constraint bit.
        input.constraint_vec.push(crate::input::Edge::new(0, 2));
        let report = DelaunayChecker::new(&input, &output).check_all();
        assert_eq!(report.constraint_failures, 1);
    }
}
