//! Index-based mesh store and bit-level encodings.
//!
//! Triangles and their adjacency are flat, growable arrays indexed by `u32`
//! triangle ids; there is no pointer graph. Edge `e` of a triangle is the
//! edge opposite vertex `v[e]`, lying between `v[(e+1)%3]` and `v[(e+2)%3]`
//! in CCW order.
//!
//! Two packed encodings are load-bearing here and used verbatim elsewhere:
//!
//! - [`encode`]`(tri, vi) = tri << 2 | vi` turns a triangle-edge pair into
//!   one comparable integer, which is what makes flip voting a single
//!   atomic-minimum.
//! - The negative-escape mapping [`make_negative`] / [`make_positive`]
//!   (`x ↔ -(x + 2)`) stores a non-negative payload in a negative value
//!   while keeping `-1` reserved as "none". This is the one place that
//!   mapping is defined; scratch arrays that look like they hold negative
//!   triangle ids hold escaped ones.

use serde::{Deserialize, Serialize};

/// A triangle as three vertex indices, CCW under symbolic perturbation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tri {
    /// Vertex indices.
    pub v: [u32; 3],
}

impl Tri {
    /// Construct from three vertex indices.
    #[must_use]
    #[inline]
    pub const fn new(v0: u32, v1: u32, v2: u32) -> Self {
        Self { v: [v0, v1, v2] }
    }

    /// Whether `vert` is one of the three vertices.
    #[must_use]
    #[inline]
    pub fn has(&self, vert: u32) -> bool {
        self.v[0] == vert || self.v[1] == vert || self.v[2] == vert
    }

    /// Slot of `vert` within the triangle, if present.
    #[must_use]
    #[inline]
    pub fn index_of(&self, vert: u32) -> Option<usize> {
        self.v.iter().position(|&x| x == vert)
    }
}

/// Packed record of what lies across one edge of a triangle.
///
/// `-1` means the edge has no neighbor (a boundary edge of the finished
/// triangulation); `-2` is a boundary edge that is also a constraint, so
/// the bit survives the ghost strip. Otherwise the value packs the
/// neighbor triangle id, the neighbor's slot for the shared edge, and the
/// constraint bit: `tri << 3 | constraint << 2 | vi`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OppEdge(i32);

impl OppEdge {
    /// The "no neighbor" sentinel.
    pub const NONE: Self = Self(-1);

    /// Boundary edge carrying the constraint bit.
    const NONE_CONSTRAINT: i32 = -2;

    /// Pack a neighbor reference with the constraint bit clear.
    #[must_use]
    #[inline]
    pub fn new(tri: u32, vi: usize) -> Self {
        debug_assert!(vi < 3);
        debug_assert!(tri <= (i32::MAX as u32) >> 3);
        Self(((tri as i32) << 3) | (vi as i32))
    }

    /// Whether this edge has no neighbor.
    #[must_use]
    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 < 0
    }

    /// Neighbor triangle id. Must not be called on `NONE`.
    #[must_use]
    #[inline]
    pub const fn tri(self) -> u32 {
        debug_assert!(self.0 >= 0);
        (self.0 >> 3) as u32
    }

    /// Neighbor's slot for the shared edge. Must not be called on `NONE`.
    #[must_use]
    #[inline]
    pub const fn vi(self) -> usize {
        debug_assert!(self.0 >= 0);
        (self.0 & 3) as usize
    }

    /// Whether the shared edge is a constraint edge.
    #[must_use]
    #[inline]
    pub const fn is_constraint(self) -> bool {
        self.0 == Self::NONE_CONSTRAINT || (self.0 >= 0 && (self.0 & 4) != 0)
    }

    /// The same reference with the constraint bit set or cleared.
    #[must_use]
    #[inline]
    pub const fn with_constraint(self, constraint: bool) -> Self {
        if self.0 < 0 {
            return if constraint {
                Self(Self::NONE_CONSTRAINT)
            } else {
                Self(-1)
            };
        }
        if constraint {
            Self(self.0 | 4)
        } else {
            Self(self.0 & !4)
        }
    }

    /// The same reference pointing at a different triangle slot, keeping
    /// the constraint bit.
    #[must_use]
    #[inline]
    pub fn redirected(self, tri: u32, vi: usize) -> Self {
        Self::new(tri, vi).with_constraint(self.is_constraint())
    }
}

impl Default for OppEdge {
    fn default() -> Self {
        Self::NONE
    }
}

/// Opposite-edge records for one triangle, indexed by edge slot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriOpp {
    /// One packed record per edge.
    pub e: [OppEdge; 3],
}

// Per-triangle status flags.
/// The triangle is live (not yet stripped or superseded).
pub const TRI_ALIVE: u8 = 1;
/// All three edges passed the Delaunay check against current neighbors.
pub const TRI_CHECKED: u8 = 2;

/// Record of one completed 2-2 flip: the two endpoints of the edge the flip
/// created and the two triangle slots that were rewritten. Enough to replay
/// or invert the edit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlipItem {
    /// Endpoints of the newly created edge.
    pub v: [u32; 2],
    /// The two triangles rewritten by the flip.
    pub t: [u32; 2],
}

/// Encode a triangle-edge pair into one comparable integer.
#[must_use]
#[inline]
pub fn encode(tri: u32, vi: usize) -> i32 {
    debug_assert!(vi < 3);
    debug_assert!(tri <= (i32::MAX as u32) >> 2);
    ((tri as i32) << 2) | (vi as i32)
}

/// Invert [`encode`].
#[must_use]
#[inline]
pub const fn decode(code: i32) -> (u32, usize) {
    ((code >> 2) as u32, (code & 3) as usize)
}

/// Escape a non-negative value into the negative range, keeping `-1` free.
#[must_use]
#[inline]
pub const fn make_negative(x: i32) -> i32 {
    debug_assert!(x >= 0);
    -(x + 2)
}

/// Recover a value escaped by [`make_negative`].
#[must_use]
#[inline]
pub const fn make_positive(x: i32) -> i32 {
    debug_assert!(x < -1);
    -(x + 2)
}

/// The growable triangulation store.
///
/// Pure data with accessors; all geometric decisions live in the engine and
/// the predicate kernel. `vert_tri` maps each vertex to one triangle that
/// contains it and is rebuilt at phase boundaries rather than maintained
/// continuously.
#[derive(Clone, Debug, Default)]
pub struct Mesh {
    /// Triangle vertex triples.
    pub tris: Vec<Tri>,
    /// Parallel opposite-edge records.
    pub opps: Vec<TriOpp>,
    /// Parallel per-triangle flags.
    pub info: Vec<u8>,
    /// One containing triangle per vertex; star-walk seed.
    pub vert_tri: Vec<u32>,
}

impl Mesh {
    /// An empty mesh with room for `tri_capacity` triangles and
    /// `vert_count` vertices.
    #[must_use]
    pub fn with_capacity(tri_capacity: usize, vert_count: usize) -> Self {
        Self {
            tris: Vec::with_capacity(tri_capacity),
            opps: Vec::with_capacity(tri_capacity),
            info: Vec::with_capacity(tri_capacity),
            vert_tri: vec![0; vert_count],
        }
    }

    /// Number of triangle slots, live or not.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.tris.len()
    }

    /// Whether the mesh holds no triangles.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tris.is_empty()
    }

    /// The triangle at `t`.
    #[must_use]
    #[inline]
    pub fn triangle(&self, t: u32) -> Tri {
        self.tris[t as usize]
    }

    /// The opposite-edge records of `t`.
    #[must_use]
    #[inline]
    pub fn opp(&self, t: u32) -> TriOpp {
        self.opps[t as usize]
    }

    /// Overwrite one opposite-edge record.
    #[inline]
    pub fn set_opp(&mut self, t: u32, e: usize, value: OppEdge) {
        self.opps[t as usize].e[e] = value;
    }

    /// Whether triangle `t` is live.
    #[must_use]
    #[inline]
    pub fn is_alive(&self, t: u32) -> bool {
        self.info[t as usize] & TRI_ALIVE != 0
    }

    /// Set or clear the per-triangle `CHECKED` flag.
    #[inline]
    pub fn set_checked(&mut self, t: u32, checked: bool) {
        if checked {
            self.info[t as usize] |= TRI_CHECKED;
        } else {
            self.info[t as usize] &= !TRI_CHECKED;
        }
    }

    /// Whether triangle `t` carries the `CHECKED` flag.
    #[must_use]
    #[inline]
    pub fn is_checked(&self, t: u32) -> bool {
        self.info[t as usize] & TRI_CHECKED != 0
    }

    /// Append a live triangle and return its id.
    pub fn push(&mut self, tri: Tri, opp: TriOpp) -> u32 {
        let t = self.tris.len() as u32;
        self.tris.push(tri);
        self.opps.push(opp);
        self.info.push(TRI_ALIVE);
        t
    }

    /// Append `n` uninitialized (dead) slots and return the first new id.
    /// The caller is responsible for filling them and raising `TRI_ALIVE`.
    pub fn reserve_slots(&mut self, n: usize) -> u32 {
        let t = self.tris.len() as u32;
        self.tris.resize(self.tris.len() + n, Tri::default());
        self.opps.resize(self.opps.len() + n, TriOpp::default());
        self.info.resize(self.info.len() + n, 0);
        t
    }

    /// Mark both sides of the edge `(t, e)` as a constraint edge.
    pub fn mark_constraint(&mut self, t: u32, e: usize) {
        let fwd = self.opps[t as usize].e[e];
        self.opps[t as usize].e[e] = fwd.with_constraint(true);
        if !fwd.is_none() {
            let (u, f) = (fwd.tri(), fwd.vi());
            let back = self.opps[u as usize].e[f];
            self.opps[u as usize].e[f] = back.with_constraint(true);
        }
    }

    /// Perform a 2-2 flip of edge `(t, e)` serially, rewiring the four
    /// outer opposite records and keeping `vert_tri` valid for the four
    /// quad vertices. The edge must have a neighbor.
    ///
    /// With `bot = (a, b, c)` and the neighbor's apex `d` across edge
    /// `(b, c)`, the flip writes `(a, b, d)` into `bot` and `(a, d, c)`
    /// into the neighbor, creating edge `(a, d)`. Constraint bits on the
    /// four outer edges are preserved; the new edge carries none.
    ///
    /// Geometric admissibility (strict convexity of the quad) is the
    /// caller's responsibility.
    pub fn flip_edge(&mut self, t: u32, e: usize) -> FlipItem {
        let fwd = self.opps[t as usize].e[e];
        debug_assert!(!fwd.is_none(), "cannot flip a boundary edge");
        let (top, top_vi) = (fwd.tri(), fwd.vi());

        let bot_tri = self.tris[t as usize];
        let a = bot_tri.v[e];
        let b = bot_tri.v[(e + 1) % 3];
        let c = bot_tri.v[(e + 2) % 3];
        let d = self.tris[top as usize].v[top_vi];
        debug_assert_eq!(self.tris[top as usize].v[(top_vi + 1) % 3], c);
        debug_assert_eq!(self.tris[top as usize].v[(top_vi + 2) % 3], b);

        let bot_opp = self.opps[t as usize];
        let top_opp = self.opps[top as usize];
        let outer_cb = bot_opp.e[(e + 1) % 3]; // across (c, a)
        let outer_ab = bot_opp.e[(e + 2) % 3]; // across (a, b)
        let outer_bd = top_opp.e[(top_vi + 1) % 3]; // across (b, d)
        let outer_dc = top_opp.e[(top_vi + 2) % 3]; // across (d, c)

        self.tris[t as usize] = Tri::new(a, b, d);
        self.tris[top as usize] = Tri::new(a, d, c);
        self.opps[t as usize] = TriOpp {
            e: [outer_bd, OppEdge::new(top, 2), outer_ab],
        };
        self.opps[top as usize] = TriOpp {
            e: [outer_dc, outer_cb, OppEdge::new(t, 1)],
        };

        // Redirect the four outer neighbors' back pointers.
        for (outer, tri, slot) in [
            (outer_bd, t, 0usize),
            (outer_ab, t, 2),
            (outer_dc, top, 0),
            (outer_cb, top, 1),
        ] {
            if !outer.is_none() {
                let back = OppEdge::new(tri, slot).with_constraint(outer.is_constraint());
                self.opps[outer.tri() as usize].e[outer.vi()] = back;
            }
        }

        for (v, tri) in [(a, t), (b, t), (d, t), (c, top)] {
            self.vert_tri[v as usize] = tri;
        }
        self.set_checked(t, false);
        self.set_checked(top, false);

        FlipItem {
            v: [a, d],
            t: [t, top],
        }
    }

    /// Rebuild `vert_tri` from the live triangles.
    pub fn rebuild_vert_tri(&mut self) {
        for (t, tri) in self.tris.iter().enumerate() {
            if self.info[t] & TRI_ALIVE == 0 {
                continue;
            }
            for &v in &tri.v {
                self.vert_tri[v as usize] = t as u32;
            }
        }
    }

    /// Stable compaction: keep exactly the triangles `keep` approves of,
    /// renumber them in order, and rewire every surviving opposite-edge
    /// record. References to dropped triangles become boundary (`NONE`)
    /// while keeping nothing else of the record.
    ///
    /// Returns the old-to-new index map (`-1` for dropped slots, escaped
    /// through nothing – plain `i32` since compaction is a phase boundary).
    pub fn compact(&mut self, keep: impl Fn(u32, &Tri) -> bool) -> Vec<i32> {
        let mut remap = vec![-1i32; self.tris.len()];
        let mut next = 0u32;
        for t in 0..self.tris.len() {
            let alive = self.info[t] & TRI_ALIVE != 0 && keep(t as u32, &self.tris[t]);
            if alive {
                remap[t] = next as i32;
                next += 1;
            }
        }

        let mut tris = Vec::with_capacity(next as usize);
        let mut opps = Vec::with_capacity(next as usize);
        for t in 0..self.tris.len() {
            if remap[t] < 0 {
                continue;
            }
            tris.push(self.tris[t]);
            let mut opp = self.opps[t];
            for e in &mut opp.e {
                if e.is_none() {
                    continue;
                }
                let target = remap[e.tri() as usize];
                *e = if target < 0 {
                    // Keep the constraint bit even when the neighbor goes.
                    OppEdge::NONE.with_constraint(e.is_constraint())
                } else {
                    e.redirected(target as u32, e.vi())
                };
            }
            opps.push(opp);
        }

        self.tris = tris;
        self.opps = opps;
        self.info = vec![TRI_ALIVE; next as usize];
        remap
    }
}
