//! Constraint-edge insertion.
//!
//! Runs after the engine and the fixer, while the mesh is still a closed
//! sphere (ghost triangles present). For each constraint `(u, v)`:
//!
//! 1. Walk around `u` counter-clockwise, then clockwise, looking for `v`
//!    as a star neighbor; if found, the edge already exists and only needs
//!    its constraint bits set. The walks use an explicit `found` flag.
//! 2. Otherwise collect the chain of edges the open segment `u→v` crosses,
//!    then flip crossed edges whose quad is strictly convex, deferring the
//!    rest to the back of the queue, until the segment survives as an
//!    edge. A vertex lying exactly on the segment splits the constraint at
//!    that vertex; both halves are realized and marked.
//!
//! Walks and flip sweeps are capped by `max_walk_steps`; exceeding the cap
//! logs a "degree too high" warning and skips the constraint, which is
//! observable but not fatal.

use std::collections::VecDeque;

use crate::core::mesh::{FlipItem, Mesh};
use crate::core::triangulator::TriangulateOptions;
use crate::geometry::kernel::PredicateKernel;
use crate::geometry::predicates::Orientation;
use crate::input::Edge;

/// Outcome counters for one insertion run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConstraintStats {
    /// Constraints found already present in the Delaunay mesh.
    pub already_present: usize,
    /// Constraints realized by chain flips.
    pub inserted: usize,
    /// Constraints split at vertices lying exactly on the segment.
    pub split: usize,
    /// Constraints skipped (walk cap, crossing constraints, degenerate).
    pub skipped: usize,
}

/// The constraint inserter. Borrows the kernel and options for the run.
pub struct ConstraintInserter<'a> {
    pred: &'a PredicateKernel<'a>,
    opts: &'a TriangulateOptions,
}

impl<'a> ConstraintInserter<'a> {
    /// Create an inserter.
    #[must_use]
    pub const fn new(pred: &'a PredicateKernel<'a>, opts: &'a TriangulateOptions) -> Self {
        Self { pred, opts }
    }

    /// Realize every constraint, marking bits on both sides of each
    /// realized edge. `mesh.vert_tri` must be valid on entry and stays
    /// valid (serial flips maintain it).
    pub fn insert_all(
        &self,
        mesh: &mut Mesh,
        constraints: &[Edge],
        flip_log: &mut Vec<FlipItem>,
    ) -> ConstraintStats {
        let mut stats = ConstraintStats::default();
        for (i, con) in constraints.iter().enumerate() {
            let [u, v] = con.v;
            if u == v {
                log::warn!("constraint {i} is degenerate ({u} -> {v}); skipping");
                stats.skipped += 1;
                continue;
            }
            self.insert_one(mesh, i, u, v, flip_log, &mut stats);
        }
        stats
    }

    /// Realize one constraint, splitting at on-segment vertices.
    fn insert_one(
        &self,
        mesh: &mut Mesh,
        idx: usize,
        u: u32,
        v: u32,
        flip_log: &mut Vec<FlipItem>,
        stats: &mut ConstraintStats,
    ) {
        let mut start = u;
        let mut splits = 0usize;
        loop {
            if let Some((t, slot)) = self.find_edge(mesh, start, v) {
                mesh.mark_constraint(t, slot);
                if splits == 0 && start == u {
                    stats.already_present += 1;
                } else {
                    stats.split += 1;
                }
                return;
            }

            // A star neighbor lying exactly on the segment splits the
            // constraint right here; the connecting edge already exists.
            // Without this, the chain walk could skirt the vertex and try
            // to carve an edge through it.
            if let Some(w) = self.on_segment_star_neighbor(mesh, start, v) {
                let Some((t, slot)) = self.find_edge(mesh, start, w) else {
                    log::warn!("constraint {idx}: star neighbor {w} unreachable; skipping");
                    stats.skipped += 1;
                    return;
                };
                mesh.mark_constraint(t, slot);
                splits += 1;
                start = w;
                continue;
            }

            let Some((chain, stop)) = self.collect_crossings(mesh, idx, start, v) else {
                stats.skipped += 1;
                return;
            };
            if !self.resolve_chain(mesh, idx, start, stop, chain, flip_log) {
                stats.skipped += 1;
                return;
            }
            let Some((t, slot)) = self.find_edge(mesh, start, stop) else {
                log::warn!("constraint {idx}: segment lost after chain resolution; skipping");
                stats.skipped += 1;
                return;
            };
            mesh.mark_constraint(t, slot);

            if stop == v {
                if splits == 0 {
                    stats.inserted += 1;
                } else {
                    stats.split += 1;
                }
                return;
            }
            // The segment passed exactly through `stop`; continue with the
            // remaining half.
            splits += 1;
            start = stop;
        }
    }

    // =========================================================================
    // Vertex walks
    // =========================================================================

    /// Find the star edge from `u` to `v`, walking CCW and then CW around
    /// `u`. Returns the `(triangle, slot)` of the edge when present.
    fn find_edge(&self, mesh: &Mesh, u: u32, v: u32) -> Option<(u32, usize)> {
        let start_tri = mesh.vert_tri[u as usize];
        let mut found = None;
        let mut steps = 0usize;

        // CCW rotation around u.
        let mut t = start_tri;
        let mut vi = mesh.triangle(t).index_of(u)?;
        while steps < self.opts.max_walk_steps {
            steps += 1;
            let tri = mesh.triangle(t);
            if tri.v[(vi + 2) % 3] == v {
                found = Some((t, (vi + 1) % 3));
                break;
            }
            let e = mesh.opp(t).e[(vi + 1) % 3];
            if e.is_none() {
                break;
            }
            t = e.tri();
            vi = (e.vi() + 1) % 3;
            debug_assert_eq!(mesh.triangle(t).v[vi], u);
            if t == start_tri {
                break;
            }
        }

        // CW rotation, in case the CCW walk stopped at a boundary.
        if found.is_none() {
            t = start_tri;
            vi = mesh.triangle(t).index_of(u)?;
            while steps < self.opts.max_walk_steps {
                steps += 1;
                let tri = mesh.triangle(t);
                if tri.v[(vi + 1) % 3] == v {
                    found = Some((t, (vi + 2) % 3));
                    break;
                }
                let e = mesh.opp(t).e[(vi + 2) % 3];
                if e.is_none() {
                    break;
                }
                t = e.tri();
                vi = (e.vi() + 2) % 3;
                debug_assert_eq!(mesh.triangle(t).v[vi], u);
                if t == start_tri {
                    break;
                }
            }
        }

        found
    }

    // =========================================================================
    // Crossed-edge chain
    // =========================================================================

    /// Collect the vertex pairs of every edge the open segment `u→v`
    /// crosses, stopping at `v` or at the first vertex lying exactly on
    /// the segment. Returns the chain and the stopping vertex, or `None`
    /// when a cap was hit or a constraint edge blocks the channel.
    fn collect_crossings(
        &self,
        mesh: &Mesh,
        idx: usize,
        u: u32,
        v: u32,
    ) -> Option<(VecDeque<(u32, u32)>, u32)> {
        let pred = self.pred;
        let (mut t, mut cross_slot) = self.wedge_at(mesh, idx, u, v)?;
        let mut chain = VecDeque::new();
        {
            let tri = mesh.triangle(t);
            chain.push_back((tri.v[(cross_slot + 1) % 3], tri.v[(cross_slot + 2) % 3]));
        }

        for _ in 0..self.opts.max_walk_steps {
            let fwd = mesh.opp(t).e[cross_slot];
            debug_assert!(!fwd.is_none(), "segment cannot exit the sphere");
            if fwd.is_constraint() {
                log::warn!("constraint {idx}: crosses an existing constraint edge; skipping");
                return None;
            }
            let (t2, vi2) = (fwd.tri(), fwd.vi());
            let apex = mesh.triangle(t2).v[vi2];

            if apex == v {
                return Some((chain, v));
            }
            if pred.is_inf(apex) {
                // The segment left the hull, which valid inputs cannot do.
                log::warn!("constraint {idx}: chain reached the hull; skipping");
                return None;
            }
            if pred.orient2d(u, v, apex) == Orientation::DEGENERATE
                && self.between(u, v, apex)
            {
                return Some((chain, apex));
            }

            // The entering edge of t2 carries the previous (right, left)
            // pair reversed; the segment exits through the edge on the far
            // side of the apex.
            let left = mesh.triangle(t2).v[(vi2 + 1) % 3];
            let right = mesh.triangle(t2).v[(vi2 + 2) % 3];
            let (next_left, next_right) =
                if pred.orient2d_sos(u, v, apex) == Orientation::POSITIVE {
                    (apex, right)
                } else {
                    (left, apex)
                };
            chain.push_back((next_left, next_right));
            // The exit edge's slot is the one opposite the vertex that
            // stayed behind.
            let exit_slot = mesh
                .triangle(t2)
                .v
                .iter()
                .position(|&x| x != next_left && x != next_right)
                .unwrap_or(0);
            t = t2;
            cross_slot = exit_slot;
        }

        log::warn!("constraint {idx}: vertex degree too high; skipping constraint");
        None
    }

    /// The star triangle of `u` whose wedge contains the direction to `v`,
    /// and the slot of its far edge. Ghost triangles never qualify.
    fn wedge_at(&self, mesh: &Mesh, idx: usize, u: u32, v: u32) -> Option<(u32, usize)> {
        let pred = self.pred;
        let start_tri = mesh.vert_tri[u as usize];
        let mut t = start_tri;
        let mut vi = mesh.triangle(t).index_of(u)?;
        for _ in 0..self.opts.max_walk_steps {
            let tri = mesh.triangle(t);
            let a = tri.v[(vi + 1) % 3];
            let b = tri.v[(vi + 2) % 3];
            if !pred.is_inf(a)
                && !pred.is_inf(b)
                && pred.orient2d_sos(u, a, v) == Orientation::POSITIVE
                && pred.orient2d_sos(u, b, v) == Orientation::NEGATIVE
            {
                return Some((t, vi));
            }
            let e = mesh.opp(t).e[(vi + 1) % 3];
            if e.is_none() {
                break;
            }
            t = e.tri();
            vi = (e.vi() + 1) % 3;
            if t == start_tri {
                break;
            }
        }
        log::warn!("constraint {idx}: no wedge at vertex {u} contains the segment; skipping");
        None
    }

    /// A star neighbor of `u` lying exactly on the open segment `u→v`,
    /// if any. Rotates the full star; ghosts never qualify.
    fn on_segment_star_neighbor(&self, mesh: &Mesh, u: u32, v: u32) -> Option<u32> {
        let pred = self.pred;
        let start_tri = mesh.vert_tri[u as usize];
        let mut t = start_tri;
        let mut vi = mesh.triangle(t).index_of(u)?;
        for _ in 0..self.opts.max_walk_steps {
            let w = mesh.triangle(t).v[(vi + 2) % 3];
            if w != v
                && !pred.is_inf(w)
                && pred.orient2d(u, v, w) == Orientation::DEGENERATE
                && self.between(u, v, w)
            {
                return Some(w);
            }
            let e = mesh.opp(t).e[(vi + 1) % 3];
            if e.is_none() {
                break;
            }
            t = e.tri();
            vi = (e.vi() + 1) % 3;
            if t == start_tri {
                break;
            }
        }
        None
    }

    /// Whether `m` lies within the closed bounding box of the segment
    /// `(u, v)`; used only after an exact collinearity test.
    fn between(&self, u: u32, v: u32, m: u32) -> bool {
        let (pu, pv, pm) = (self.pred.point(u), self.pred.point(v), self.pred.point(m));
        let x_ok = (pu.x.min(pv.x)..=pu.x.max(pv.x)).contains(&pm.x);
        let y_ok = (pu.y.min(pv.y)..=pu.y.max(pv.y)).contains(&pm.y);
        x_ok && y_ok
    }

    // =========================================================================
    // Chain resolution by flips
    // =========================================================================

    /// Flip crossed edges until the segment `u→v` survives as an edge.
    /// Convex quads flip immediately; reflex ones are deferred to the back
    /// of the queue and revisited after their neighborhood changes.
    fn resolve_chain(
        &self,
        mesh: &mut Mesh,
        idx: usize,
        u: u32,
        v: u32,
        mut chain: VecDeque<(u32, u32)>,
        flip_log: &mut Vec<FlipItem>,
    ) -> bool {
        let pred = self.pred;
        let mut budget = self.opts.max_walk_steps;
        while let Some((a, b)) = chain.pop_front() {
            if budget == 0 {
                log::warn!("constraint {idx}: flip budget exhausted; skipping constraint");
                return false;
            }
            budget -= 1;

            // The edge may already be gone, or may no longer cross the
            // segment after earlier flips.
            let Some((t, slot)) = self.find_edge(mesh, a, b) else {
                continue;
            };
            if pred.orient2d_sos(u, v, a) == pred.orient2d_sos(u, v, b) {
                continue;
            }

            // Quad apexes on either side of (a, b).
            let x = mesh.triangle(t).v[slot];
            let fwd = mesh.opp(t).e[slot];
            debug_assert!(!fwd.is_none());
            if fwd.is_constraint() {
                log::warn!("constraint {idx}: channel blocked by a constraint edge; skipping");
                return false;
            }
            let y = mesh.triangle(fwd.tri()).v[fwd.vi()];

            // Strictly convex exactly when a and b straddle the line x–y.
            if pred.orient2d_sos(x, y, a) != pred.orient2d_sos(x, y, b) {
                let item = mesh.flip_edge(t, slot);
                flip_log.push(item);
                let [nx, ny] = item.v;
                // Re-enqueue the new edge while it still crosses the segment.
                if nx != u && nx != v && ny != u && ny != v
                    && pred.orient2d_sos(u, v, nx) != pred.orient2d_sos(u, v, ny)
                {
                    chain.push_back((nx, ny));
                }
            } else {
                chain.push_back((a, b));
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::mesh::{Mesh, OppEdge, Tri, TriOpp};
    use crate::geometry::point::Point;

    fn inserter_over<'a>(
        points: &'a [Point],
        opts: &'a TriangulateOptions,
    ) -> (PredicateKernel<'a>, &'a TriangulateOptions) {
        let inf_idx = (points.len() - 1) as u32;
        (PredicateKernel::new(points, inf_idx), opts)
    }

    /// The `(triangle, slot)` of the undirected edge `(a, b)`, if present.
    fn edge_slot(mesh: &Mesh, a: u32, b: u32) -> Option<(u32, usize)> {
        for t in 0..mesh.len() as u32 {
            let tri = mesh.triangle(t);
            for e in 0..3 {
                let x = tri.v[(e + 1) % 3];
                let y = tri.v[(e + 2) % 3];
                if (x == a && y == b) || (x == b && y == a) {
                    return Some((t, e));
                }
            }
        }
        None
    }

    fn assert_marked_both_sides(mesh: &Mesh, a: u32, b: u32) {
        let (t, e) = edge_slot(mesh, a, b).unwrap_or_else(|| panic!("edge ({a},{b}) missing"));
        let fwd = mesh.opp(t).e[e];
        assert!(fwd.is_constraint(), "edge ({a},{b}) missing its bit");
        if !fwd.is_none() {
            let back = mesh.opp(fwd.tri()).e[fwd.vi()];
            assert!(back.is_constraint(), "edge ({a},{b}) bit not mirrored");
        }
    }

    /// Convex quad 0-1-2-3 triangulated with the (1, 3) diagonal; the
    /// (0, 2) constraint crosses exactly that edge.
    fn quad_fixture() -> (Vec<Point>, Mesh) {
        let points = vec![
            Point::new(0.0, 0.0),   // 0
            Point::new(1.0, -1.0),  // 1
            Point::new(2.0, 0.0),   // 2
            Point::new(1.0, 1.0),   // 3
            Point::new(99.0, 99.0), // 4 = infinity stand-in
        ];
        let mut mesh = Mesh::with_capacity(2, 5);
        let t0 = mesh.push(Tri::new(0, 1, 3), TriOpp::default());
        let t1 = mesh.push(Tri::new(1, 2, 3), TriOpp::default());
        mesh.set_opp(t0, 0, OppEdge::new(t1, 1));
        mesh.set_opp(t1, 1, OppEdge::new(t0, 0));
        mesh.rebuild_vert_tri();
        (points, mesh)
    }

    #[test]
    fn existing_edge_is_only_marked() {
        let (points, mut mesh) = quad_fixture();
        let opts = TriangulateOptions::default();
        let (pred, opts) = inserter_over(&points, &opts);
        let inserter = ConstraintInserter::new(&pred, opts);

        let mut log = Vec::new();
        let stats = inserter.insert_all(&mut mesh, &[Edge::new(1, 3)], &mut log);
        assert_eq!(stats.already_present, 1);
        assert_eq!(stats.inserted, 0);
        assert!(log.is_empty());
        assert_marked_both_sides(&mesh, 1, 3);
    }

    #[test]
    fn convex_crossing_flips_once() {
        let (points, mut mesh) = quad_fixture();
        let opts = TriangulateOptions::default();
        let (pred, opts) = inserter_over(&points, &opts);
        let inserter = ConstraintInserter::new(&pred, opts);

        let mut log = Vec::new();
        let stats = inserter.insert_all(&mut mesh, &[Edge::new(0, 2)], &mut log);
        assert_eq!(stats.inserted, 1);
        assert_eq!(stats.skipped, 0);
        assert_eq!(log.len(), 1);
        let mut new_edge = log[0].v;
        new_edge.sort_unstable();
        assert_eq!(new_edge, [0, 2]);
        assert_marked_both_sides(&mesh, 0, 2);
        assert!(edge_slot(&mesh, 1, 3).is_none(), "old diagonal survived");
    }

    #[test]
    fn vertex_on_segment_splits_the_constraint() {
        // Vertex 1 sits exactly on the (0, 2) segment, with both halves
        // already present as edges.
        let points = vec![
            Point::new(0.0, 0.0),   // 0
            Point::new(1.0, 0.0),   // 1
            Point::new(2.0, 0.0),   // 2
            Point::new(1.0, 1.0),   // 3
            Point::new(1.0, -1.0),  // 4
            Point::new(99.0, 99.0), // 5 = infinity stand-in
        ];
        let mut mesh = Mesh::with_capacity(4, 6);
        let t0 = mesh.push(Tri::new(0, 1, 3), TriOpp::default());
        let t1 = mesh.push(Tri::new(1, 2, 3), TriOpp::default());
        let t2 = mesh.push(Tri::new(0, 4, 1), TriOpp::default());
        let t3 = mesh.push(Tri::new(4, 2, 1), TriOpp::default());
        mesh.set_opp(t0, 0, OppEdge::new(t1, 1));
        mesh.set_opp(t1, 1, OppEdge::new(t0, 0));
        mesh.set_opp(t0, 2, OppEdge::new(t2, 1));
        mesh.set_opp(t2, 1, OppEdge::new(t0, 2));
        mesh.set_opp(t1, 2, OppEdge::new(t3, 0));
        mesh.set_opp(t3, 0, OppEdge::new(t1, 2));
        mesh.set_opp(t2, 0, OppEdge::new(t3, 1));
        mesh.set_opp(t3, 1, OppEdge::new(t2, 0));
        mesh.rebuild_vert_tri();

        let opts = TriangulateOptions::default();
        let (pred, opts) = inserter_over(&points, &opts);
        let inserter = ConstraintInserter::new(&pred, opts);

        let mut log = Vec::new();
        let stats = inserter.insert_all(&mut mesh, &[Edge::new(0, 2)], &mut log);
        assert_eq!(stats.split, 1);
        assert_eq!(stats.skipped, 0);
        assert!(log.is_empty(), "no flips needed for existing halves");
        assert_marked_both_sides(&mesh, 0, 1);
        assert_marked_both_sides(&mesh, 1, 2);
        assert!(edge_slot(&mesh, 0, 2).is_none(), "no edge through vertex 1");
    }

    /// Fan from a low vertex under a tall spike: the (0, 4) segment crosses
    /// three fan edges, and the quad of the first crossed edge is reflex
    /// until its neighborhood has been flipped.
    fn spike_fixture() -> (Vec<Point>, Mesh) {
        let points = vec![
            Point::new(0.0, 0.0),   // 0
            Point::new(1.0, 1.0),   // 1
            Point::new(2.0, 4.0),   // 2 (the spike)
            Point::new(3.0, 1.0),   // 3
            Point::new(4.0, 0.0),   // 4
            Point::new(2.0, -2.0),  // 5 (fan apex below)
            Point::new(99.0, 99.0), // 6 = infinity stand-in
        ];
        let mut mesh = Mesh::with_capacity(4, 7);
        let t0 = mesh.push(Tri::new(0, 5, 1), TriOpp::default());
        let t1 = mesh.push(Tri::new(1, 5, 2), TriOpp::default());
        let t2 = mesh.push(Tri::new(2, 5, 3), TriOpp::default());
        let t3 = mesh.push(Tri::new(3, 5, 4), TriOpp::default());
        mesh.set_opp(t0, 0, OppEdge::new(t1, 2));
        mesh.set_opp(t1, 2, OppEdge::new(t0, 0));
        mesh.set_opp(t1, 0, OppEdge::new(t2, 2));
        mesh.set_opp(t2, 2, OppEdge::new(t1, 0));
        mesh.set_opp(t2, 0, OppEdge::new(t3, 2));
        mesh.set_opp(t3, 2, OppEdge::new(t2, 0));
        mesh.rebuild_vert_tri();
        (points, mesh)
    }

    #[test]
    fn chain_collection_walks_the_channel() {
        let (points, mesh) = spike_fixture();
        let opts = TriangulateOptions::default();
        let (pred, opts) = inserter_over(&points, &opts);
        let inserter = ConstraintInserter::new(&pred, opts);

        assert_eq!(inserter.wedge_at(&mesh, 0, 0, 4), Some((0, 0)));

        let (chain, stop) = inserter.collect_crossings(&mesh, 0, 0, 4).unwrap();
        assert_eq!(stop, 4);
        let pairs: Vec<(u32, u32)> = chain.into_iter().collect();
        assert_eq!(pairs, vec![(5, 1), (2, 5), (3, 5)]);
    }

    #[test]
    fn blocked_quad_is_deferred_until_freed() {
        let (points, mut mesh) = spike_fixture();
        let opts = TriangulateOptions::default();
        let (pred, opts) = inserter_over(&points, &opts);
        let inserter = ConstraintInserter::new(&pred, opts);

        let mut log = Vec::new();
        let stats = inserter.insert_all(&mut mesh, &[Edge::new(0, 4)], &mut log);
        assert_eq!(stats.inserted, 1);
        assert_eq!(stats.skipped, 0);

        // The first crossed edge (5, 1) has a reflex quad (its apexes 0 and
        // 2 do not straddle it), so it is deferred; the flips behind it run
        // first and the deferred edge goes last.
        let new_edges: Vec<[u32; 2]> = log
            .iter()
            .map(|item| {
                let mut v = item.v;
                v.sort_unstable();
                v
            })
            .collect();
        assert_eq!(new_edges, vec![[1, 3], [1, 4], [0, 4]]);
        assert_marked_both_sides(&mesh, 0, 4);
    }
}
