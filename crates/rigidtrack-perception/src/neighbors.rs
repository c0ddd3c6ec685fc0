//! Nearest-neighbour queries over an observed point cloud.
//!
//! [`NearestNeighbors`] is the contract the tracker and the registration
//! engine consume; [`KdIndex`] implements it with a `kiddo` k-d tree.  An
//! index is built once per frame and shared read-only by every object update
//! in that frame.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use kiddo::{ImmutableKdTree, SquaredEuclidean};

use crate::transform::Vec3;

/// One query result: position of the hit in the indexed slice and its
/// squared distance to the query point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub index: usize,
    pub squared_distance: f32,
}

/// k-nearest-neighbour lookups against a fixed point set.
pub trait NearestNeighbors {
    /// Number of indexed points.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The `k` indexed points closest to `query`, nearest first.
    ///
    /// Returns `min(k, len)` entries.
    fn nearest_k(&self, query: Vec3, k: usize) -> Vec<Neighbor>;

    /// The single closest indexed point, or `None` for an empty index.
    fn nearest(&self, query: Vec3) -> Option<Neighbor> {
        self.nearest_k(query, 1).into_iter().next()
    }
}

/// 3-D k-d tree over one frame's point cloud.
///
/// Points with a non-finite coordinate are left out.  Exact duplicates are
/// stored once in the tree and expanded back to every slice position on
/// query, so a cloud may repeat one position any number of times.
pub struct KdIndex {
    tree: Option<ImmutableKdTree<f32, 3>>,
    /// Slice positions sharing each distinct tree entry, in input order.
    positions: Vec<Vec<usize>>,
    len: usize,
}

impl std::fmt::Debug for KdIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KdIndex")
            .field("len", &self.len)
            .field("distinct", &self.positions.len())
            .finish()
    }
}

impl KdIndex {
    /// Index every finite point of `points`; query results refer back to
    /// positions in this slice.
    pub fn build(points: &[Vec3]) -> Self {
        let mut distinct: Vec<[f32; 3]> = Vec::new();
        let mut positions: Vec<Vec<usize>> = Vec::new();
        let mut seen: HashMap<[u32; 3], usize> = HashMap::new();
        let mut len = 0;

        for (i, p) in points.iter().enumerate() {
            let coords = p.to_array();
            if !coords.iter().all(|c| c.is_finite()) {
                continue;
            }
            len += 1;
            // +0.0 folds -0.0 onto 0.0
            let key = coords.map(|c| (c + 0.0).to_bits());
            match seen.entry(key) {
                Entry::Occupied(slot) => positions[*slot.get()].push(i),
                Entry::Vacant(slot) => {
                    slot.insert(distinct.len());
                    distinct.push(coords);
                    positions.push(vec![i]);
                }
            }
        }

        let tree = (!distinct.is_empty()).then(|| ImmutableKdTree::new_from_slice(&distinct));
        Self {
            tree,
            positions,
            len,
        }
    }

    /// Number of distinct positions in the tree.
    pub fn distinct_len(&self) -> usize {
        self.positions.len()
    }
}

impl NearestNeighbors for KdIndex {
    fn len(&self) -> usize {
        self.len
    }

    fn nearest_k(&self, query: Vec3, k: usize) -> Vec<Neighbor> {
        let Some(tree) = &self.tree else {
            return Vec::new();
        };
        if k == 0 {
            return Vec::new();
        }
        let mut hits: Vec<Neighbor> = Vec::with_capacity(k.min(self.len));
        for n in tree.nearest_n::<SquaredEuclidean>(&query.to_array(), k.min(self.positions.len())) {
            let Some(slots) = self.positions.get(n.item as usize) else {
                continue;
            };
            hits.extend(slots.iter().map(|&index| Neighbor {
                index,
                squared_distance: n.distance,
            }));
        }
        hits.sort_by(|a, b| a.squared_distance.total_cmp(&b.squared_distance));
        hits.truncate(k);
        hits
    }

    fn nearest(&self, query: Vec3) -> Option<Neighbor> {
        let tree = self.tree.as_ref()?;
        let n = tree.nearest_one::<SquaredEuclidean>(&query.to_array());
        let index = *self.positions.get(n.item as usize)?.first()?;
        Some(Neighbor {
            index,
            squared_distance: n.distance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_cloud() -> Vec<Vec3> {
        (0..10).map(|i| Vec3::new(i as f32, 0.5 * i as f32, 0.1)).collect()
    }

    #[test]
    fn nearest_finds_exact_match() {
        let cloud = line_cloud();
        let index = KdIndex::build(&cloud);
        let hit = index.nearest(Vec3::new(3.0, 1.5, 0.1)).unwrap();
        assert_eq!(hit.index, 3);
        assert!(hit.squared_distance < 1e-9);
    }

    #[test]
    fn nearest_k_is_ordered_nearest_first() {
        let cloud = line_cloud();
        let index = KdIndex::build(&cloud);
        let hits = index.nearest_k(Vec3::new(4.1, 2.05, 0.1), 3);
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].index, 4);
        assert!(hits[0].squared_distance <= hits[1].squared_distance);
        assert!(hits[1].squared_distance <= hits[2].squared_distance);
    }

    #[test]
    fn nearest_k_is_capped_at_cloud_size() {
        let cloud = vec![Vec3::new(0.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0)];
        let index = KdIndex::build(&cloud);
        assert_eq!(index.nearest_k(Vec3::zero(), 5).len(), 2);
    }

    #[test]
    fn empty_index_returns_nothing() {
        let index = KdIndex::build(&[]);
        assert!(index.is_empty());
        assert!(index.nearest(Vec3::zero()).is_none());
        assert!(index.nearest_k(Vec3::zero(), 4).is_empty());
    }

    #[test]
    fn squared_distance_is_squared() {
        let index = KdIndex::build(&[Vec3::new(0.0, 0.0, 0.0)]);
        let hit = index.nearest(Vec3::new(0.0, 3.0, 4.0)).unwrap();
        assert!((hit.squared_distance - 25.0).abs() < 1e-4);
    }

    // ------ degenerate clouds

    fn square_markers() -> Vec<Vec3> {
        vec![
            Vec3::new(0.1, 0.1, 0.0),
            Vec3::new(-0.1, 0.1, 0.0),
            Vec3::new(-0.1, -0.1, 0.0),
            Vec3::new(0.1, -0.1, 0.0),
        ]
    }

    #[test]
    fn many_identical_points_are_indexed() {
        let mut cloud = square_markers();
        cloud.extend(std::iter::repeat_n(Vec3::new(5.0, 5.0, 0.0), 40));
        let index = KdIndex::build(&cloud);
        assert_eq!(index.len(), 44);
        assert_eq!(index.distinct_len(), 5);

        let hit = index.nearest(Vec3::new(0.1, 0.1, 0.01)).unwrap();
        assert_eq!(hit.index, 0);

        // Every copy is a separate neighbour, reported in input order.
        let hits = index.nearest_k(Vec3::new(5.0, 5.0, 0.0), 6);
        assert_eq!(hits.len(), 6);
        assert_eq!(hits.iter().map(|h| h.index).collect::<Vec<_>>(), vec![4, 5, 6, 7, 8, 9]);
        assert!(hits.iter().all(|h| h.squared_distance < 1e-9));
    }

    #[test]
    fn planar_grid_is_indexed() {
        let mut cloud: Vec<Vec3> = (0..100)
            .map(|i| Vec3::new((i % 10) as f32 * 0.5 + 2.0, (i / 10) as f32 * 0.5 + 2.0, 0.0))
            .collect();
        cloud.extend(square_markers());
        let index = KdIndex::build(&cloud);
        assert_eq!(index.len(), 104);

        let hits = index.nearest_k(Vec3::zero(), 4);
        let mut found: Vec<usize> = hits.iter().map(|h| h.index).collect();
        found.sort_unstable();
        assert_eq!(found, vec![100, 101, 102, 103]);

        let hit = index.nearest(Vec3::new(3.01, 4.49, 0.0)).unwrap();
        assert_eq!(hit.index, 52);
    }

    #[test]
    fn non_finite_points_are_skipped() {
        let cloud = vec![
            Vec3::new(f32::NAN, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, f32::INFINITY, 0.0),
        ];
        let index = KdIndex::build(&cloud);
        assert_eq!(index.len(), 1);
        assert_eq!(index.nearest(Vec3::zero()).unwrap().index, 1);
        assert_eq!(index.nearest_k(Vec3::zero(), 3).len(), 1);
    }

    #[test]
    fn signed_zero_is_one_position() {
        let cloud = vec![Vec3::new(0.0, 0.0, 0.0), Vec3::new(-0.0, 0.0, 0.0)];
        let index = KdIndex::build(&cloud);
        assert_eq!(index.distinct_len(), 1);
        assert_eq!(index.nearest_k(Vec3::zero(), 2).len(), 2);
    }
}
