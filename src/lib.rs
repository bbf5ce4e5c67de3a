//! # del2d
//!
//! Parallel flip-based 2D Delaunay triangulation with optional constraint
//! edges (a constrained Delaunay triangulation, CDT).
//!
//! The triangulator consumes up to millions of double-precision points and
//! produces an indexed triangle mesh together with, for every triangle, the
//! opposite triangle across each edge and a per-edge bit marking constraint
//! edges. Degenerate inputs (four co-circular points, collinear triples,
//! points exactly on edges) are resolved consistently through a hierarchy of
//! predicates: floating-point with an a-priori error bound, exact adaptive
//! signs, and Simulation of Simplicity symbolic perturbation on vertex
//! indices.
//!
//! # Basic usage
//!
//! ```rust
//! use del2d::core::triangulator::{TriangulateOptions, Triangulator};
//! use del2d::geometry::point::Point;
//! use del2d::input::Input;
//!
//! let mut input = Input::default();
//! input.point_vec = vec![
//!     Point::new(0.0, 0.0),
//!     Point::new(1.0, 0.0),
//!     Point::new(0.0, 1.0),
//!     Point::new(1.0, 1.0),
//! ];
//!
//! let output = Triangulator::new(TriangulateOptions::default())
//!     .compute(&input)
//!     .unwrap();
//!
//! // Four points triangulate into two triangles sharing one diagonal.
//! assert_eq!(output.tri_vec.len(), 2);
//! ```
//!
//! # Constrained triangulation
//!
//! ```rust
//! use del2d::core::triangulator::{TriangulateOptions, Triangulator};
//! use del2d::geometry::point::Point;
//! use del2d::input::{Edge, Input};
//!
//! let mut input = Input::default();
//! for y in 0..3 {
//!     for x in 0..3 {
//!         input.point_vec.push(Point::new(f64::from(x), f64::from(y)));
//!     }
//! }
//! // Force the anti-diagonal of the lower-left cell to appear as an edge.
//! input.constraint_vec.push(Edge::new(1, 3));
//!
//! let output = Triangulator::new(TriangulateOptions::default())
//!     .compute(&input)
//!     .unwrap();
//!
//! let realized = output.tri_vec.iter().any(|t| t.has(1) && t.has(3));
//! assert!(realized);
//! ```
//!
//! # Architecture
//!
//! The crate is organized the way the data flows:
//!
//! 1. [`geometry`] – the predicate kernel: tiered orientation and in-circle
//!    tests ending in symbolic perturbation, plus the raw determinant used
//!    as a flip-priority tiebreaker.
//! 2. [`core::mesh`] – the index-based mesh store: triangles, packed
//!    opposite-edge records, per-triangle flags, and the bit encodings the
//!    voting protocol relies on.
//! 3. [`core::engine`] – the bulk-synchronous star splay / flip engine:
//!    parallel point location, one insertion per triangle per round,
//!    atomic-minimum flip voting, and barrier-separated flip application.
//! 4. [`core::fixer`] – a serial Lawson queue that clears any residual
//!    non-Delaunay edges after the bulk loop.
//! 5. [`core::constraint`] – the constraint inserter: vertex walks and
//!    crossed-edge chain flips that carve each constraint in.
//! 6. [`core::triangulator`] – the orchestrator owning all phases, the
//!    synthetic point at infinity, and the final strip-and-compact pass.
//!
//! Collaborators around the core: [`input`] (point synthesis for eight
//! distributions, file I/O, deduplication), [`core::checker`] (post-hoc
//! validation of a finished triangulation), and [`core::pool`] (a best-fit
//! freelist of reusable scratch buffers).
//!
//! # Determinism
//!
//! Conflict resolution is an atomic minimum over a total order on encoded
//! `(triangle, edge)` pairs, so the winner of every flip vote is independent
//! of thread scheduling. Predicates are deterministic functions of
//! coordinates and vertex indices, including under symbolic perturbation.
//! Triangle *indices* are still allowed to differ across runs with different
//! thread counts; the triangulation itself is not.

// Forbid unsafe code throughout the entire crate.
#![forbid(unsafe_code)]

/// Primary data structures and algorithms for building the triangulation.
pub mod core {
    /// Post-hoc validation of a finished triangulation.
    pub mod checker;
    /// Constraint-edge insertion by vertex walks and chain flips.
    pub mod constraint;
    /// The bulk-synchronous star splay / flip engine.
    pub mod engine;
    /// Serial Lawson repair queue for residual non-Delaunay edges.
    pub mod fixer;
    /// Index-based mesh store and bit-level encodings.
    pub mod mesh;
    /// Best-fit freelist of reusable typed scratch buffers.
    pub mod pool;
    /// The orchestrator: input validation, phases, output assembly.
    pub mod triangulator;

    pub use checker::*;
    pub use mesh::*;
    pub use triangulator::*;
}

/// Geometric predicates: fast, exact, and symbolically perturbed tiers.
pub mod geometry {
    /// The predicate kernel combining all tiers behind one interface.
    pub mod kernel;
    /// The `Point` type.
    pub mod point;
    /// Fast predicates with a-priori error bounds and result enums.
    pub mod predicates;
    /// Simulation of Simplicity symbolic perturbation towers.
    pub mod sos;

    pub use kernel::*;
    pub use point::*;
    pub use predicates::*;
}

/// Input container, point synthesis, and ASCII file I/O.
pub mod input {
    mod container;
    /// Point-cloud synthesis for the eight supported distributions.
    pub mod generate;
    /// ASCII readers and writers for points, constraints, and triangles.
    pub mod io;

    pub use container::*;
}

/// Re-exports of the commonly used surface.
pub mod prelude {
    pub use crate::core::checker::{CheckReport, DelaunayChecker};
    pub use crate::core::mesh::{FlipItem, Mesh, OppEdge, Tri, TriOpp};
    pub use crate::core::triangulator::{
        Output, TriangulateOptions, TriangulationError, Triangulator,
    };
    pub use crate::geometry::kernel::PredicateKernel;
    pub use crate::geometry::point::Point;
    pub use crate::geometry::predicates::{InCircle, Orientation};
    pub use crate::input::{Edge, Input};
}
