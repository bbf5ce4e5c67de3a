//! The input container: points, constraints, and deduplication.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::geometry::point::Point;

/// A constraint edge between two vertex indices.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    /// The two endpoints.
    pub v: [u32; 2],
}

impl Edge {
    /// Construct from two vertex indices.
    #[must_use]
    #[inline]
    pub const fn new(a: u32, b: u32) -> Self {
        Self { v: [a, b] }
    }
}

/// Caller-populated input to [`crate::core::triangulator::Triangulator`].
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Input {
    /// The point set. Must be free of exact coordinate duplicates when
    /// handed to `compute`; see [`Input::remove_duplicates`].
    pub point_vec: Vec<Point>,
    /// Constraint edges over point indices.
    pub constraint_vec: Vec<Edge>,
}

impl Input {
    /// Drop points whose `(x, y)` coordinates exactly repeat an earlier
    /// point, keeping first occurrences, and remap constraint endpoints
    /// accordingly. Constraints that collapse onto a single vertex are
    /// dropped.
    ///
    /// Returns the number of points removed.
    pub fn remove_duplicates(&mut self) -> usize {
        let before = self.point_vec.len();
        let mut first_of: FxHashMap<(u64, u64), u32> =
            FxHashMap::with_capacity_and_hasher(before, Default::default());
        let mut remap: Vec<u32> = Vec::with_capacity(before);
        let mut kept: Vec<Point> = Vec::with_capacity(before);

        for p in &self.point_vec {
            match first_of.get(&p.xy_bits()) {
                Some(&idx) => remap.push(idx),
                None => {
                    let idx = kept.len() as u32;
                    first_of.insert(p.xy_bits(), idx);
                    kept.push(*p);
                    remap.push(idx);
                }
            }
        }

        self.point_vec = kept;
        self.constraint_vec.retain_mut(|e| {
            e.v = [remap[e.v[0] as usize], remap[e.v[1] as usize]];
            e.v[0] != e.v[1]
        });
        let removed = before - self.point_vec.len();
        if removed > 0 {
            log::debug!("removed {removed} duplicate points");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_keeps_first_and_remaps_constraints() {
        let mut input = Input::default();
        input.point_vec = vec![
            Point::new(0.0, 0.0),
            Point::with_z(0.5, 0.5, 1.0),
            Point::new(1.0, 0.0),
            Point::with_z(0.5, 0.5, 2.0), // duplicate of index 1 (z ignored)
            Point::new(0.0, 1.0),
        ];
        input.constraint_vec = vec![Edge::new(3, 4), Edge::new(1, 3)];

        let removed = input.remove_duplicates();
        assert_eq!(removed, 1);
        assert_eq!(input.point_vec.len(), 4);
        // First occurrence kept its payload.
        assert_eq!(input.point_vec[1].z, 1.0);
        // (3, 4) now references the surviving indices (1, 3); (1, 3)
        // collapsed onto vertex 1 and was dropped.
        assert_eq!(input.constraint_vec, vec![Edge::new(1, 3)]);
    }

    #[test]
    fn dedup_on_clean_input_is_a_no_op() {
        let mut input = Input::default();
        input.point_vec = vec![Point::new(0.0, 0.0), Point::new(1.0, 0.0)];
        assert_eq!(input.remove_duplicates(), 0);
        assert_eq!(input.point_vec.len(), 2);
    }
}
