/////////////////////////////////////////////////////////////////////////////////////////////
//
// Provides a KD-tree for nearest-neighbour and radius queries over point sets.
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

use crate::zip_sort::zip_sort;
use faer::{Mat, RowRef};
use scatterfit_kernels::get_distance_sq;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Neighbour queries over a fixed point set.
///
/// Both queries return `(indices, distances)` sorted by ascending Euclidean distance,
/// ties broken by index. Indices are unique row indices into the indexed point set.
pub trait SpatialIndex {
    /// The `min(k, n)` points closest to `point`.
    fn knn_search(&self, point: RowRef<f64>, k: usize) -> (Vec<usize>, Vec<f64>);

    /// All points within distance `radius` of `point`, boundary included.
    /// A negative radius gives no points.
    fn radius_search(&self, point: RowRef<f64>, radius: f64) -> (Vec<usize>, Vec<f64>);
}

/// A node in the KdTree
#[derive(Debug)]
struct Node {
    /// Row index of the splitting point.
    index: usize,
    axis: usize,
    left: Option<usize>,
    right: Option<usize>,
}

#[derive(Debug, PartialEq)]
struct Neighbour {
    distance_sq: f64,
    index: usize,
}

impl Eq for Neighbour {}

impl PartialOrd for Neighbour {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Neighbour {
    // Max-heap on distance, so the worst candidate sits on top.
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance_sq
            .total_cmp(&other.distance_sq)
            .then(self.index.cmp(&other.index))
    }
}

/// The KdTree structure
#[derive(Debug)]
pub struct KdTree {
    points: Mat<f64>,
    nodes: Vec<Node>,
    root: Option<usize>,
}

impl KdTree {
    /// Constructs a new KdTree from a Mat of points, one point per row.
    pub fn new(points: &Mat<f64>) -> Self {
        let mut indices: Vec<usize> = (0..points.nrows()).collect();

        let mut tree = KdTree {
            points: points.clone(),
            nodes: Vec::with_capacity(points.nrows()),
            root: None,
        };
        tree.root = tree.build_tree(&mut indices, 0);
        tree
    }

    pub fn num_points(&self) -> usize {
        self.points.nrows()
    }

    /// Recursively builds the KdTree and stores nodes in a flat vector.
    fn build_tree(&mut self, indices: &mut [usize], depth: usize) -> Option<usize> {
        if indices.is_empty() || self.points.ncols() == 0 {
            return None;
        }

        let axis = depth % self.points.ncols();

        // Choose the median along the current axis as the pivot
        let mid = indices.len() / 2;
        let points = &self.points;
        indices.select_nth_unstable_by(mid, |&a, &b| {
            points[(a, axis)].total_cmp(&points[(b, axis)])
        });

        let node_index = self.nodes.len();
        self.nodes.push(Node {
            index: indices[mid],
            axis,
            left: None,
            right: None,
        });

        let (lower, upper) = indices.split_at_mut(mid);
        self.nodes[node_index].left = self.build_tree(lower, depth + 1);
        self.nodes[node_index].right = self.build_tree(&mut upper[1..], depth + 1);

        Some(node_index)
    }

    fn k_nearest_impl(
        &self,
        node_index: usize,
        target: RowRef<f64>,
        k: usize,
        heap: &mut BinaryHeap<Neighbour>,
    ) {
        let node = &self.nodes[node_index];
        let distance_sq = get_distance_sq(target, self.points.row(node.index));

        let candidate = Neighbour {
            distance_sq,
            index: node.index,
        };
        if heap.len() < k {
            heap.push(candidate);
        } else if heap.peek().is_some_and(|worst| candidate < *worst) {
            heap.pop();
            heap.push(candidate);
        }

        let diff = target[node.axis] - self.points[(node.index, node.axis)];
        let (near, far) = match diff < 0.0 {
            true => (node.left, node.right),
            false => (node.right, node.left),
        };

        if let Some(near) = near {
            self.k_nearest_impl(near, target, k, heap);
        }

        if let Some(far) = far {
            let crosses = heap.len() < k
                || heap.peek().is_some_and(|worst| diff * diff <= worst.distance_sq);
            if crosses {
                self.k_nearest_impl(far, target, k, heap);
            }
        }
    }

    fn radius_search_impl(
        &self,
        node_index: usize,
        target: RowRef<f64>,
        radius: f64,
        indices: &mut Vec<usize>,
        distances: &mut Vec<f64>,
    ) {
        let node = &self.nodes[node_index];
        let distance_sq = get_distance_sq(target, self.points.row(node.index));

        if distance_sq <= radius * radius {
            indices.push(node.index);
            distances.push(distance_sq.sqrt());
        }

        // |diff| <= radius means the sphere intersects the splitting plane
        let diff = target[node.axis] - self.points[(node.index, node.axis)];

        if diff <= radius {
            if let Some(left) = node.left {
                self.radius_search_impl(left, target, radius, indices, distances);
            }
        }
        if diff >= -radius {
            if let Some(right) = node.right {
                self.radius_search_impl(right, target, radius, indices, distances);
            }
        }
    }
}

fn sort_by_distance(indices: &mut [usize], distances: &mut [f64]) {
    zip_sort(indices, distances, |a, b| a.1.total_cmp(b.1).then(a.0.cmp(b.0)));
}

impl SpatialIndex for KdTree {
    fn knn_search(&self, point: RowRef<f64>, k: usize) -> (Vec<usize>, Vec<f64>) {
        let Some(root) = self.root else {
            return (Vec::new(), Vec::new());
        };
        if k == 0 {
            return (Vec::new(), Vec::new());
        }

        let mut heap = BinaryHeap::with_capacity(k + 1);
        self.k_nearest_impl(root, point, k, &mut heap);

        let (mut indices, mut distances): (Vec<usize>, Vec<f64>) = heap
            .into_vec()
            .into_iter()
            .map(|n| (n.index, n.distance_sq.sqrt()))
            .unzip();

        sort_by_distance(&mut indices, &mut distances);
        (indices, distances)
    }

    fn radius_search(&self, point: RowRef<f64>, radius: f64) -> (Vec<usize>, Vec<f64>) {
        let mut indices = Vec::new();
        let mut distances = Vec::new();

        let Some(root) = self.root else {
            return (indices, distances);
        };
        if !(radius >= 0.0) {
            return (indices, distances);
        }

        self.radius_search_impl(root, point, radius, &mut indices, &mut distances);

        sort_by_distance(&mut indices, &mut distances);
        (indices, distances)
    }
}
