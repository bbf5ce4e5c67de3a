//! Serial Lawson repair queue for residual non-Delaunay edges.
//!
//! The bulk engine's voting protocol can starve a flip in rare corners of
//! the mesh (a candidate that keeps losing to rotating neighbors until the
//! round ends). The fixer runs after the engine: one serial scan seeds a
//! FIFO with every locally non-Delaunay edge, each flip re-enqueues the
//! four disturbed neighbor edges, and the loop drains. Termination follows
//! from the lifted-surface argument: every flip strictly decreases the
//! number of circumcircle inversions, symbolic perturbation included.

use std::collections::VecDeque;

use crate::core::mesh::{FlipItem, Mesh, Tri};
use crate::geometry::kernel::PredicateKernel;
use crate::geometry::predicates::{InCircle, Orientation};

/// Scan once, flip to quiescence, append every flip to `flip_log`.
///
/// Returns the number of flips performed.
pub fn fix_stars(pred: &PredicateKernel<'_>, mesh: &mut Mesh, flip_log: &mut Vec<FlipItem>) -> usize {
    let mut queue: VecDeque<(u32, usize)> = VecDeque::new();
    for t in 0..mesh.len() as u32 {
        if !mesh.is_alive(t) {
            continue;
        }
        for e in 0..3 {
            queue.push_back((t, e));
        }
    }

    let mut flips = 0usize;
    while let Some((t, e)) = queue.pop_front() {
        if !mesh.is_alive(t) {
            continue;
        }
        let fwd = mesh.opp(t).e[e];
        if fwd.is_none() || fwd.is_constraint() {
            continue;
        }
        let apex = mesh.triangle(fwd.tri()).v[fwd.vi()];
        if pred.incircle_sos(mesh.triangle(t).v, apex) != InCircle::INSIDE {
            continue;
        }

        let item = mesh.flip_edge(t, e);
        flip_log.push(item);
        flips += 1;

        // The four outer edges of the rewritten pair may have been
        // disturbed; their slots after the flip are fixed by construction.
        let [bot, top] = item.t;
        queue.push_back((bot, 0));
        queue.push_back((bot, 2));
        queue.push_back((top, 0));
        queue.push_back((top, 1));
    }

    if flips > 0 {
        log::debug!("fixer: {flips} residual flips");
    }
    flips
}

/// Flip away exactly-zero-area triangles whose long edge lies on the hull.
///
/// A point that symbolic perturbation placed infinitesimally inside a hull
/// edge ends up as the apex of a sliver the Lawson criterion will never
/// remove (the sliver is Delaunay in the perturbed world). Flipping the
/// sliver's long edge against its ghost neighbor moves the apex onto the
/// hull instead, which is where a point collinear with the hull belongs.
/// Interior slivers need no such treatment: their long-edge neighbor's
/// circumcircle strictly contains the apex, so [`fix_stars`] removes them.
///
/// Runs after the Lawson pass and must not be followed by another one
/// (the perturbed world would put the sliver back). Returns flip count.
pub fn flatten_hull_slivers(
    pred: &PredicateKernel<'_>,
    mesh: &mut Mesh,
    flip_log: &mut Vec<FlipItem>,
) -> usize {
    let mut flips = 0usize;
    loop {
        let mut progressed = false;
        for t in 0..mesh.len() as u32 {
            if !mesh.is_alive(t) {
                continue;
            }
            let tri = mesh.triangle(t);
            if tri.v.iter().any(|&v| pred.is_inf(v)) {
                continue;
            }
            if pred.orient2d(tri.v[0], tri.v[1], tri.v[2]) != Orientation::DEGENERATE {
                continue;
            }
            let Some(mid) = middle_slot(pred, &tri) else {
                continue;
            };
            let fwd = mesh.opp(t).e[mid];
            if fwd.is_none() || fwd.is_constraint() {
                continue;
            }
            let top = mesh.triangle(fwd.tri());
            if !top.v.iter().any(|&v| pred.is_inf(v)) {
                continue;
            }
            flip_log.push(mesh.flip_edge(t, mid));
            flips += 1;
            progressed = true;
        }
        if !progressed {
            break;
        }
    }
    if flips > 0 {
        log::debug!("fixer: {flips} hull slivers flattened");
    }
    flips
}

/// Slot of the vertex lying between the other two of an exactly collinear
/// triangle; its opposite edge is the long one.
fn middle_slot(pred: &PredicateKernel<'_>, tri: &Tri) -> Option<usize> {
    (0..3).find(|&s| {
        let m = pred.point(tri.v[s]);
        let a = pred.point(tri.v[(s + 1) % 3]);
        let b = pred.point(tri.v[(s + 2) % 3]);
        (a.x.min(b.x)..=a.x.max(b.x)).contains(&m.x)
            && (a.y.min(b.y)..=a.y.max(b.y)).contains(&m.y)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::mesh::{OppEdge, Tri, TriOpp};
    use crate::geometry::point::Point;

    /// Two triangles over a convex quad triangulated the wrong way: the
    /// fixer must flip exactly once and stop.
    #[test]
    fn fixer_restores_delaunay_on_a_quad() {
        // A thin quad where the (0,2) diagonal violates the circumcircle
        // test and the (1,3) diagonal satisfies it.
        let points = vec![
            Point::new(0.0, 0.0),   // 0
            Point::new(1.0, -0.2),  // 1
            Point::new(2.0, 0.0),   // 2
            Point::new(1.0, 0.2),   // 3
            Point::new(99.0, 99.0), // 4 = unused infinity stand-in
        ];
        let pred = PredicateKernel::new(&points, 4);

        let mut mesh = Mesh::with_capacity(2, 5);
        let t0 = mesh.push(Tri::new(0, 1, 2), TriOpp::default());
        let t1 = mesh.push(Tri::new(0, 2, 3), TriOpp::default());
        // Shared edge (0, 2): slot 1 of t0 is (2, 0); slot 2 of t1 is (0, 2).
        mesh.set_opp(t0, 1, OppEdge::new(t1, 2));
        mesh.set_opp(t1, 2, OppEdge::new(t0, 1));
        mesh.rebuild_vert_tri();

        let mut log = Vec::new();
        let flips = fix_stars(&pred, &mut mesh, &mut log);
        assert_eq!(flips, 1);
        assert_eq!(log.len(), 1);
        // The new diagonal is (1, 3).
        let mut sorted = log[0].v;
        sorted.sort_unstable();
        assert_eq!(sorted, [1, 3]);
        // Both triangles now contain the new diagonal.
        assert!(mesh.triangle(t0).has(1) && mesh.triangle(t0).has(3));
        assert!(mesh.triangle(t1).has(1) && mesh.triangle(t1).has(3));
    }
}
