//! The bulk-synchronous star splay / flip engine.
//!
//! The engine runs rounds of barrier-separated phases until quiescent:
//!
//! 1. **Locate** – every uninserted point walks, in parallel, from its
//!    current triangle guess to the triangle that contains it under SoS
//!    orientation. Walks through the exterior use the ghost ring and a
//!    fixed interior anchor (see below).
//! 2. **Pick** – at most one point per triangle wins insertion rights this
//!    round, by atomic minimum over point indices.
//! 3. **Splay** – every winning triangle splits into three around its
//!    point. Splits are planned in parallel against the pre-round mesh and
//!    applied at the barrier, so concurrent splits never observe each
//!    other's half-written state.
//! 4. **Flip** – non-Delaunay edges are detected per triangle in parallel,
//!    conflicts are resolved by the atomic-minimum vote over encoded
//!    `(triangle, edge)` pairs, and winning flips are applied in a second
//!    barrier-separated sub-phase. Passes repeat until no candidate edge
//!    remains.
//!
//! A round that locates nothing and flips nothing terminates the loop.
//!
//! # Ghost triangles and the exterior
//!
//! Before the final strip the mesh is a combinatorial sphere: every edge
//! has a neighbor, and the triangles containing the infinity vertex (ghost
//! triangles) tile the exterior of the current hull. A point beyond the
//! hull is located by walking the ghost ring toward the hull edge crossed
//! by the segment from the point to a fixed interior anchor; that
//! partition is disjoint under SoS, so simultaneous exterior insertions
//! cannot overlap. Splits and flips treat ghosts like any other triangle –
//! all the special-casing lives in the predicate kernel.

use std::sync::atomic::{AtomicI32, AtomicU32, AtomicUsize, Ordering};

use rayon::prelude::*;
use smallvec::SmallVec;

use crate::core::mesh::{
    encode, make_negative, FlipItem, Mesh, OppEdge, Tri, TriOpp, TRI_ALIVE,
};
use crate::core::pool::BufferPool;
use crate::core::triangulator::{TriangulateOptions, TriangulationError};
use crate::geometry::kernel::PredicateKernel;
use crate::geometry::point::Point;
use crate::geometry::predicates::{InCircle, Orientation};

/// Largest triangle id the vote encoding can carry.
pub const MAX_TRIS: usize = (i32::MAX >> 2) as usize;

/// Counters reported after a run.
#[derive(Clone, Copy, Debug, Default)]
pub struct EngineStats {
    /// Insertion rounds executed.
    pub rounds: usize,
    /// Points inserted by splay.
    pub inserted: usize,
    /// Points skipped because `insert_all` is off and they sit on an edge.
    pub skipped: usize,
    /// Completed 2-2 flips.
    pub flips: usize,
    /// Flip passes across all rounds.
    pub flip_passes: usize,
}

/// A candidate flip: the bottom triangle's chosen edge, its neighbor, and
/// the determinant magnitude used as priority.
#[derive(Clone, Copy, Debug)]
struct FlipCandidate {
    bot: u32,
    vi: u8,
    top: u32,
    top_vi: u8,
}

/// Planned split of one host triangle around one point.
struct SplayPlan {
    host: u32,
    n1: u32,
    n2: u32,
    point: u32,
    tris: [Tri; 3],
    opps: [TriOpp; 3],
    outer_writes: SmallVec<[(u32, usize, OppEdge); 3]>,
    outer_clear: SmallVec<[u32; 3]>,
}

/// Planned application of one winning flip.
struct FlipPlan {
    bot: u32,
    top: u32,
    tris: [Tri; 2],
    opps: [TriOpp; 2],
    outer_writes: SmallVec<[(u32, usize, OppEdge); 4]>,
    clear: SmallVec<[u32; 6]>,
    item: FlipItem,
}

/// The engine. Borrows the kernel and options for the duration of the run.
pub struct Engine<'a> {
    pred: &'a PredicateKernel<'a>,
    opts: &'a TriangulateOptions,
    /// Fixed interior anchor for exterior wedge walks.
    anchor: Point,
    anchor_idx: u32,
    flip_log: Vec<FlipItem>,
    stats: EngineStats,
}

impl<'a> Engine<'a> {
    /// Create an engine with the given exterior-walk anchor, which must lie
    /// strictly inside the seed triangle (and therefore inside every later
    /// hull).
    #[must_use]
    pub fn new(pred: &'a PredicateKernel<'a>, opts: &'a TriangulateOptions, anchor: Point) -> Self {
        let anchor_idx = pred.inf_idx() + 2;
        Self {
            pred,
            opts,
            anchor,
            anchor_idx,
            flip_log: Vec::new(),
            stats: EngineStats::default(),
        }
    }

    /// Run rounds to quiescence. `point_loc[p]` must hold a live triangle
    /// guess for every uninserted point, `-1` for points outside the run,
    /// and negative-escaped markers for already-inserted ones.
    ///
    /// Returns the flip log.
    ///
    /// # Errors
    ///
    /// `EngineStuck` when a walk exceeds the step cap or a round stops
    /// making progress with work remaining; `CapacityExceeded` when the
    /// triangle array would outgrow the vote encoding.
    pub fn run(
        mut self,
        mesh: &mut Mesh,
        point_loc: &mut [i32],
        pool: &mut BufferPool,
    ) -> Result<(Vec<FlipItem>, EngineStats), TriangulationError> {
        loop {
            self.stats.rounds += 1;
            let located = self.locate_phase(mesh, point_loc)?;
            if located == 0 {
                break;
            }

            let winners = self.pick_phase(mesh, point_loc);
            if winners.is_empty() {
                // Legitimate when every located point was just skipped
                // (insert_all off); otherwise the minimum-vote guarantee
                // was violated, which is a bug.
                if let Some(p) = point_loc.iter().position(|&l| l >= 0) {
                    return Err(TriangulationError::EngineStuck {
                        phase: "pick",
                        tri: point_loc[p] as u32,
                        point: Some(p as u32),
                    });
                }
                continue;
            }

            self.splay_phase(mesh, point_loc, &winners, pool)?;
            self.flip_phase(mesh)?;

            if self.opts.verbose {
                log::info!(
                    "round {}: located {}, inserted {}, {} flips in {} passes so far",
                    self.stats.rounds,
                    located,
                    winners.len(),
                    self.stats.flips,
                    self.stats.flip_passes,
                );
            }
        }
        Ok((self.flip_log, self.stats))
    }

    // =========================================================================
    // Phase A: point location
    // =========================================================================

    fn locate_phase(
        &self,
        mesh: &Mesh,
        point_loc: &mut [i32],
    ) -> Result<usize, TriangulationError> {
        let located = AtomicUsize::new(0);
        point_loc
            .par_iter_mut()
            .enumerate()
            .try_for_each(|(p, slot)| -> Result<(), TriangulationError> {
                if *slot < 0 {
                    return Ok(());
                }
                let t = self.walk(mesh, p as u32, *slot as u32)?;
                *slot = t as i32;
                located.fetch_add(1, Ordering::Relaxed);
                Ok(())
            })?;
        Ok(located.into_inner())
    }

    /// Walk from `start` to the triangle containing `p` under SoS.
    fn walk(&self, mesh: &Mesh, p: u32, start: u32) -> Result<u32, TriangulationError> {
        let pred = self.pred;
        let mut t = start;
        for _ in 0..self.opts.max_walk_steps {
            let tri = mesh.triangle(t);
            if let Some(inf_slot) = tri.v.iter().position(|&v| pred.is_inf(v)) {
                // Ghost triangle (x, y, inf) in cyclic order; its hull edge
                // is (y, x) with the finite mesh on the left. Walk the ghost
                // ring toward the hull edge crossed by the line through p
                // and the interior anchor: going CCW, that is the edge whose
                // start vertex is left of the line and whose end vertex is
                // right of it. The signs make the ring walk monotone, so it
                // terminates within one revolution.
                let x = tri.v[(inf_slot + 1) % 3];
                let y = tri.v[(inf_slot + 2) % 3];
                let su = self.side_of_anchor_ray(p, y);
                let sw = self.side_of_anchor_ray(p, x);
                if su == Orientation::POSITIVE && sw == Orientation::NEGATIVE {
                    if pred.orient2d_sos(x, y, p) == Orientation::POSITIVE {
                        // Beyond the hull edge: this wedge is p's home.
                        return Ok(t);
                    }
                    // Inside the hull: enter the finite mesh here.
                    t = mesh.opp(t).e[inf_slot].tri();
                } else if sw == Orientation::NEGATIVE {
                    // Both endpoints right of the line: step clockwise,
                    // across the infinity edge at y.
                    t = mesh.opp(t).e[(inf_slot + 1) % 3].tri();
                } else {
                    // Step counter-clockwise, across the infinity edge at x.
                    t = mesh.opp(t).e[(inf_slot + 2) % 3].tri();
                }
                continue;
            }

            // Finite triangle: cross the first edge p lies strictly outside.
            let mut next = None;
            for e in 0..3 {
                let u = tri.v[(e + 1) % 3];
                let w = tri.v[(e + 2) % 3];
                if pred.orient2d_sos(u, w, p) == Orientation::NEGATIVE {
                    next = Some(mesh.opp(t).e[e].tri());
                    break;
                }
            }
            match next {
                Some(n) => t = n,
                None => return Ok(t),
            }
        }
        Err(TriangulationError::EngineStuck {
            phase: "locate",
            tri: start,
            point: Some(p),
        })
    }

    /// Which side of the directed pseudo-line `p → anchor` vertex `v` is on.
    fn side_of_anchor_ray(&self, p: u32, v: u32) -> Orientation {
        self.pred.orient2d_sos_pts(
            (self.pred.point(p), p),
            (&self.anchor, self.anchor_idx),
            (self.pred.point(v), v),
        )
    }

    // =========================================================================
    // Phase B: pick one point per triangle
    // =========================================================================

    fn pick_phase(&mut self, mesh: &Mesh, point_loc: &mut [i32]) -> Vec<(u32, u32)> {
        let votes: Vec<AtomicU32> = (0..mesh.len())
            .into_par_iter()
            .map(|_| AtomicU32::new(u32::MAX))
            .collect();

        let skipped = AtomicUsize::new(0);
        point_loc.par_iter_mut().enumerate().for_each(|(p, slot)| {
            if *slot < 0 {
                return;
            }
            let t = *slot as u32;
            if !self.opts.insert_all && self.lies_on_edge(mesh, t, p as u32) {
                *slot = -1;
                skipped.fetch_add(1, Ordering::Relaxed);
                return;
            }
            votes[t as usize].fetch_min(p as u32, Ordering::Relaxed);
        });
        self.stats.skipped += skipped.into_inner();

        point_loc
            .par_iter()
            .enumerate()
            .filter_map(|(p, &slot)| {
                if slot < 0 {
                    return None;
                }
                let t = slot as u32;
                (votes[t as usize].load(Ordering::Relaxed) == p as u32).then_some((t, p as u32))
            })
            .collect()
    }

    /// Whether `p` lies exactly on one of the edges of triangle `t`.
    fn lies_on_edge(&self, mesh: &Mesh, t: u32, p: u32) -> bool {
        let tri = mesh.triangle(t);
        (0..3).any(|e| {
            let u = tri.v[(e + 1) % 3];
            let w = tri.v[(e + 2) % 3];
            self.pred.orient2d(u, w, p) == Orientation::DEGENERATE
        })
    }

    // =========================================================================
    // Phase C: star splay
    // =========================================================================

    fn splay_phase(
        &mut self,
        mesh: &mut Mesh,
        point_loc: &mut [i32],
        winners: &[(u32, u32)],
        pool: &mut BufferPool,
    ) -> Result<(), TriangulationError> {
        let base = mesh.len();
        let new_len = base + 2 * winners.len();
        if new_len > MAX_TRIS {
            return Err(TriangulationError::CapacityExceeded {
                requested: new_len,
                cap: MAX_TRIS,
            });
        }

        // Which hosts split this round, and their winner ordinals.
        let mut split_of: Vec<i32> = pool.allocate(base);
        split_of.resize(base, -1);
        for (k, &(t, _)) in winners.iter().enumerate() {
            split_of[t as usize] = k as i32;
        }

        // Children of split host `x` that own its original edge `j`:
        // edge 0 -> first new slot, edge 1 -> second, edge 2 -> x itself,
        // always at slot 2 of the child.
        let child_for_edge = |x: u32, j: usize, ordinal: usize| -> u32 {
            let nx1 = (base + 2 * ordinal) as u32;
            match j {
                0 => nx1,
                1 => nx1 + 1,
                _ => x,
            }
        };

        let plans: Vec<SplayPlan> = winners
            .par_iter()
            .enumerate()
            .map(|(k, &(t, p))| {
                let host = mesh.triangle(t);
                let [a, b, c] = host.v;
                let old_opp = mesh.opp(t);
                let n1 = (base + 2 * k) as u32;
                let n2 = n1 + 1;

                let tris = [Tri::new(a, b, p), Tri::new(b, c, p), Tri::new(c, a, p)];
                let mut opps = [
                    TriOpp {
                        e: [OppEdge::new(n1, 1), OppEdge::new(n2, 0), OppEdge::NONE],
                    },
                    TriOpp {
                        e: [OppEdge::new(n2, 1), OppEdge::new(t, 0), OppEdge::NONE],
                    },
                    TriOpp {
                        e: [OppEdge::new(t, 1), OppEdge::new(n1, 0), OppEdge::NONE],
                    },
                ];

                let mut outer_writes = SmallVec::new();
                let mut outer_clear = SmallVec::new();
                // Child owning host edge j, in the same (child, slot 2)
                // convention as `child_for_edge`.
                let own_child = [n1, n2, t];
                for j in 0..3 {
                    let outer = old_opp.e[j];
                    debug_assert!(!outer.is_none(), "no boundary edges before the strip");
                    let x = outer.tri();
                    let target = match split_of[x as usize] {
                        ordinal if ordinal >= 0 => {
                            // The neighbor splits too; point straight at the
                            // child that inherits the shared edge.
                            let child = child_for_edge(x, outer.vi(), ordinal as usize);
                            OppEdge::new(child, 2).with_constraint(outer.is_constraint())
                        }
                        _ => {
                            outer_writes.push((
                                x,
                                outer.vi(),
                                OppEdge::new(own_child[j], 2)
                                    .with_constraint(outer.is_constraint()),
                            ));
                            outer_clear.push(x);
                            outer
                        }
                    };
                    // Slot 2 of each child faces the host's original edge.
                    let child_idx = match j {
                        0 => 1,
                        1 => 2,
                        _ => 0,
                    };
                    opps[child_idx].e[2] = target;
                }

                SplayPlan {
                    host: t,
                    n1,
                    n2,
                    point: p,
                    tris,
                    opps,
                    outer_writes,
                    outer_clear,
                }
            })
            .collect();

        // Barrier: apply every plan. Writes are disjoint by construction.
        mesh.reserve_slots(2 * winners.len());
        for plan in &plans {
            let slots = [plan.host, plan.n1, plan.n2];
            for (i, &s) in slots.iter().enumerate() {
                mesh.tris[s as usize] = plan.tris[i];
                mesh.opps[s as usize] = plan.opps[i];
                mesh.info[s as usize] = TRI_ALIVE;
            }
            for &(t, e, v) in &plan.outer_writes {
                mesh.set_opp(t, e, v);
            }
            for &t in &plan.outer_clear {
                mesh.set_checked(t, false);
            }
            point_loc[plan.point as usize] = make_negative(plan.host as i32);
        }
        self.stats.inserted += plans.len();

        pool.release(split_of);
        Ok(())
    }

    // =========================================================================
    // Phase D: flip passes
    // =========================================================================

    fn flip_phase(&mut self, mesh: &mut Mesh) -> Result<(), TriangulationError> {
        loop {
            self.stats.flip_passes += 1;

            // D1: per-triangle candidate selection.
            let raw: Vec<Option<FlipCandidate>> = (0..mesh.len() as u32)
                .into_par_iter()
                .map(|t| self.select_candidate(mesh, t))
                .collect();

            let mut candidates = Vec::new();
            for (t, cand) in raw.into_iter().enumerate() {
                match cand {
                    Some(c) => candidates.push(c),
                    None => {
                        let t = t as u32;
                        if mesh.is_alive(t) && !mesh.is_checked(t) {
                            mesh.set_checked(t, true);
                        }
                    }
                }
            }
            if candidates.is_empty() {
                return Ok(());
            }

            // D2: voting. Both affected triangles receive the encoded pair;
            // the minimum over the total order wins.
            let votes: Vec<AtomicI32> = (0..mesh.len())
                .into_par_iter()
                .map(|_| AtomicI32::new(i32::MAX))
                .collect();
            candidates.par_iter().for_each(|c| {
                let vote = encode(c.bot, c.vi as usize);
                votes[c.bot as usize].fetch_min(vote, Ordering::Relaxed);
                votes[c.top as usize].fetch_min(vote, Ordering::Relaxed);
            });

            let winners: Vec<FlipCandidate> = candidates
                .par_iter()
                .copied()
                .filter(|c| {
                    let vote = encode(c.bot, c.vi as usize);
                    votes[c.bot as usize].load(Ordering::Relaxed) == vote
                        && votes[c.top as usize].load(Ordering::Relaxed) == vote
                })
                .collect();

            if winners.is_empty() {
                // A minimum over a non-empty candidate set always has a
                // winner; reaching this is an implementation bug.
                return Err(TriangulationError::EngineStuck {
                    phase: "flip-vote",
                    tri: candidates[0].bot,
                    point: None,
                });
            }

            let mut flipped_of = vec![-1i32; mesh.len()];
            for (i, w) in winners.iter().enumerate() {
                flipped_of[w.bot as usize] = i as i32;
                flipped_of[w.top as usize] = i as i32;
            }

            // D3: plan against the pre-flip mesh, then apply at the barrier.
            let plans: Vec<FlipPlan> = winners
                .par_iter()
                .map(|w| self.plan_flip(mesh, w, &winners, &flipped_of))
                .collect();

            for plan in &plans {
                mesh.tris[plan.bot as usize] = plan.tris[0];
                mesh.tris[plan.top as usize] = plan.tris[1];
                mesh.opps[plan.bot as usize] = plan.opps[0];
                mesh.opps[plan.top as usize] = plan.opps[1];
                for &(t, e, v) in &plan.outer_writes {
                    mesh.set_opp(t, e, v);
                }
                for &t in &plan.clear {
                    mesh.set_checked(t, false);
                }
                self.flip_log.push(plan.item);
            }
            self.stats.flips += plans.len();
        }
    }

    /// The flip candidate of triangle `t`: its non-Delaunay edge with the
    /// largest in-circle determinant magnitude, ties to the lower edge slot.
    fn select_candidate(&self, mesh: &Mesh, t: u32) -> Option<FlipCandidate> {
        if !mesh.is_alive(t) || mesh.is_checked(t) {
            return None;
        }
        let tri = mesh.triangle(t);
        let opp = mesh.opp(t);
        let mut best: Option<(f64, FlipCandidate)> = None;
        for vi in 0..3 {
            let e = opp.e[vi];
            if e.is_none() || e.is_constraint() {
                continue;
            }
            let top = e.tri();
            let top_vi = e.vi();
            let apex = mesh.triangle(top).v[top_vi];
            if self.pred.incircle_sos(tri.v, apex) != InCircle::INSIDE {
                continue;
            }
            let det = self.pred.incircle_det(tri.v, apex).abs();
            let cand = FlipCandidate {
                bot: t,
                vi: vi as u8,
                top,
                top_vi: top_vi as u8,
            };
            // Strictly-greater keeps the lower edge slot on equal priority.
            if best.map_or(true, |(d, _)| det > d) {
                best = Some((det, cand));
            }
        }
        best.map(|(_, c)| c)
    }

    /// The two triangles a winning flip writes, as a pure function of the
    /// pre-flip mesh. Shared with neighbor resolution.
    fn flip_new_tris(mesh: &Mesh, w: &FlipCandidate) -> [Tri; 2] {
        let bot = mesh.triangle(w.bot);
        let vi = w.vi as usize;
        let a = bot.v[vi];
        let b = bot.v[(vi + 1) % 3];
        let c = bot.v[(vi + 2) % 3];
        let d = mesh.triangle(w.top).v[w.top_vi as usize];
        [Tri::new(a, b, d), Tri::new(a, d, c)]
    }

    fn plan_flip(
        &self,
        mesh: &Mesh,
        w: &FlipCandidate,
        winners: &[FlipCandidate],
        flipped_of: &[i32],
    ) -> FlipPlan {
        let vi = w.vi as usize;
        let top_vi = w.top_vi as usize;
        let bot = mesh.triangle(w.bot);
        let a = bot.v[vi];
        let b = bot.v[(vi + 1) % 3];
        let c = bot.v[(vi + 2) % 3];
        let d = mesh.triangle(w.top).v[top_vi];
        debug_assert_eq!(mesh.triangle(w.top).v[(top_vi + 1) % 3], c);
        debug_assert_eq!(mesh.triangle(w.top).v[(top_vi + 2) % 3], b);

        let bot_opp = mesh.opp(w.bot);
        let top_opp = mesh.opp(w.top);
        let outer_cb = bot_opp.e[(vi + 1) % 3]; // across (c, a)
        let outer_ab = bot_opp.e[(vi + 2) % 3]; // across (a, b)
        let outer_bd = top_opp.e[(top_vi + 1) % 3]; // across (b, d)
        let outer_dc = top_opp.e[(top_vi + 2) % 3]; // across (d, c)

        let mut outer_writes: SmallVec<[(u32, usize, OppEdge); 4]> = SmallVec::new();
        let mut clear: SmallVec<[u32; 6]> = SmallVec::new();
        clear.push(w.bot);
        clear.push(w.top);

        // Resolve an outer reference: if the neighbor flips this pass too,
        // find which of its new triangles owns our shared edge (it runs the
        // same resolution toward us); otherwise redirect its back pointer.
        let mut resolve = |outer: OppEdge, own_tri: u32, own_slot: usize, u: u32, v: u32| {
            let x = outer.tri();
            let ordinal = flipped_of[x as usize];
            if ordinal >= 0 {
                let other = &winners[ordinal as usize];
                let news = Self::flip_new_tris(mesh, other);
                let ids = [other.bot, other.top];
                for (tri, &id) in news.iter().zip(ids.iter()) {
                    if let Some(s) = slot_of_directed(tri, v, u) {
                        return OppEdge::new(id, s).with_constraint(outer.is_constraint());
                    }
                }
                unreachable!("shared edge lost by a concurrent flip");
            }
            outer_writes.push((
                x,
                outer.vi(),
                OppEdge::new(own_tri, own_slot).with_constraint(outer.is_constraint()),
            ));
            clear.push(x);
            outer
        };

        // New bot at `bot`: (a, b, d); new top at `top`: (a, d, c).
        let e_bd = resolve(outer_bd, w.bot, 0, b, d);
        let e_ab = resolve(outer_ab, w.bot, 2, a, b);
        let e_dc = resolve(outer_dc, w.top, 0, d, c);
        let e_ca = resolve(outer_cb, w.top, 1, c, a);

        let tris = Self::flip_new_tris(mesh, w);
        let opps = [
            TriOpp {
                e: [e_bd, OppEdge::new(w.top, 2), e_ab],
            },
            TriOpp {
                e: [e_dc, e_ca, OppEdge::new(w.bot, 1)],
            },
        ];

        FlipPlan {
            bot: w.bot,
            top: w.top,
            tris,
            opps,
            outer_writes,
            clear,
            item: FlipItem {
                v: [a, d],
                t: [w.bot, w.top],
            },
        }
    }
}

/// Slot of the directed edge `(u, w)` within a triangle, if present.
#[inline]
fn slot_of_directed(tri: &Tri, u: u32, w: u32) -> Option<usize> {
    (0..3).find(|&s| tri.v[(s + 1) % 3] == u && tri.v[(s + 2) % 3] == w)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_of_directed_finds_each_edge() {
        let tri = Tri::new(10, 20, 30);
        assert_eq!(slot_of_directed(&tri, 20, 30), Some(0));
        assert_eq!(slot_of_directed(&tri, 30, 10), Some(1));
        assert_eq!(slot_of_directed(&tri, 10, 20), Some(2));
        assert_eq!(slot_of_directed(&tri, 30, 20), None);
    }
}
