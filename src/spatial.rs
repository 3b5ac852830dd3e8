//! Nearest-neighbor queries over one frame's marker cloud.
//!
//! The initializer consumes markers as it assigns them to bodies, so the
//! index supports logical deletion: removed points keep their original
//! indices but stop appearing in query results. The backing k-d tree is
//! rebuilt from the surviving points after each removal batch.

use kiddo::{KdTree, SquaredEuclidean};

use crate::geometry::{Cloud, Point};

/// k-NN index over a point cloud with stable indices and logical deletion.
pub struct SpatialIndex {
    points: Cloud,
    alive: Vec<bool>,
    alive_count: usize,
    tree: KdTree<f32, 3>,
}

impl SpatialIndex {
    /// Build an index over a snapshot of the given cloud.
    pub fn build(cloud: &[Point]) -> Self {
        let points: Cloud = cloud.to_vec();
        let alive = vec![true; points.len()];
        let tree = Self::build_tree(&points, &alive);
        Self {
            alive_count: points.len(),
            points,
            alive,
            tree,
        }
    }

    fn build_tree(points: &[Point], alive: &[bool]) -> KdTree<f32, 3> {
        let mut tree: KdTree<f32, 3> = KdTree::new();
        for (i, p) in points.iter().enumerate() {
            if alive[i] {
                tree.add(&[p.x, p.y, p.z], i as u64);
            }
        }
        tree
    }

    /// The `k` nearest surviving points to `query`.
    ///
    /// Returns (index, squared distance) pairs ordered by ascending distance,
    /// ties broken by ascending index. Fewer than `k` results are returned
    /// when the index holds fewer surviving points.
    pub fn k_nearest(&self, query: &Point, k: usize) -> Vec<(usize, f32)> {
        if self.alive_count == 0 {
            return Vec::new();
        }
        let mut found: Vec<(usize, f32)> = self
            .tree
            .nearest_n::<SquaredEuclidean>(&[query.x, query.y, query.z], k)
            .into_iter()
            .map(|nn| (nn.item as usize, nn.distance))
            .collect();
        found.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        found
    }

    /// The single nearest surviving point, or `None` if the index is empty.
    pub fn nearest(&self, query: &Point) -> Option<(usize, f32)> {
        if self.alive_count == 0 {
            return None;
        }
        let nn = self
            .tree
            .nearest_one::<SquaredEuclidean>(&[query.x, query.y, query.z]);
        Some((nn.item as usize, nn.distance))
    }

    /// Logically delete the given points and rebuild the tree.
    ///
    /// Indices refer to the original cloud; duplicates and already-removed
    /// indices are ignored.
    pub fn remove_points(&mut self, indices: &[usize]) {
        for &i in indices {
            if self.alive[i] {
                self.alive[i] = false;
                self.alive_count -= 1;
            }
        }
        self.tree = Self::build_tree(&self.points, &self.alive);
    }

    /// Position of the point with the given original index.
    pub fn point(&self, index: usize) -> &Point {
        &self.points[index]
    }

    /// Surviving points, in original order.
    pub fn surviving_points(&self) -> Cloud {
        self.points
            .iter()
            .zip(&self.alive)
            .filter(|(_, alive)| **alive)
            .map(|(p, _)| *p)
            .collect()
    }

    /// Number of surviving points.
    pub fn len(&self) -> usize {
        self.alive_count
    }

    pub fn is_empty(&self) -> bool {
        self.alive_count == 0
    }
}
