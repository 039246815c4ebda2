/////////////////////////////////////////////////////////////////////////////////////////////
//
// Builds the uniform octree cell hierarchy and its near-field and interaction lists.
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # uniform_tree
//!
//! A uniform (non-adaptive) octree over a fixed bounding box. The geometry is fixed
//! when the tree is created; only the occupied cells and their lists depend on the
//! attached points, so the lists can be rebuilt for a new point set without touching
//! anything derived from the geometry.
//!
//! Level `0` is the root cell, level `height` holds the leaves. Cells are addressed by
//! their integer coordinates `[i, j, k]` within a level.

use crate::{FmmError, geometry::BoundingBox3};
use faer::{Mat, RowRef};
use itertools::iproduct;
use std::collections::HashMap;

pub(crate) type CellCoords = [i64; 3];

/// Occupied cells of a single tree level.
#[derive(Debug, Default, Clone)]
pub(crate) struct Level {
    /// Coordinates of each occupied cell, sorted.
    pub cells: Vec<CellCoords>,

    /// Maps cell coordinates back to the cell's position in `cells`.
    pub lookup: HashMap<CellCoords, usize>,

    /// Index of each cell's parent in the level above. Empty on the root level.
    pub parents: Vec<usize>,

    /// Indices of each cell's occupied children in the level below. Empty on the leaf level.
    pub children: Vec<Vec<usize>>,

    /// M2L sources for each cell: the source cell index and the offset of the
    /// source from the target in cell widths.
    pub interactions: Vec<Vec<(usize, CellCoords)>>,
}

/// Everything that depends on the attached points.
#[derive(Debug, Default, Clone)]
pub(crate) struct TreeLists {
    /// Levels from the root (index 0) to the leaves (index `height`).
    pub levels: Vec<Level>,

    /// Point indices held by each leaf, in ascending order.
    pub leaf_points: Vec<Vec<usize>>,

    /// Adjacent occupied leaves of each leaf, including the leaf itself (P2P).
    pub near: Vec<Vec<usize>>,
}

/// Octant of a cell within its parent. Bit `d` is set for the upper half along axis `d`.
#[inline(always)]
pub(crate) fn octant(cell: CellCoords) -> usize {
    ((cell[0] & 1) | ((cell[1] & 1) << 1) | ((cell[2] & 1) << 2)) as usize
}

#[inline(always)]
fn is_adjacent(a: CellCoords, b: CellCoords) -> bool {
    (0..3).all(|axis| (a[axis] - b[axis]).abs() <= 1)
}

/// Fixed geometry of a uniform octree.
#[derive(Debug, Clone, Copy)]
pub(crate) struct UniformTree {
    pub bbox: BoundingBox3,
    pub height: usize,
}

impl UniformTree {
    #[inline(always)]
    pub fn cells_per_axis(&self, level: usize) -> i64 {
        1i64 << level
    }

    /// Side lengths of a cell at `level`.
    pub fn cell_width(&self, level: usize) -> [f64; 3] {
        let width = self.bbox.width();
        let divisions = self.cells_per_axis(level) as f64;
        [width[0] / divisions, width[1] / divisions, width[2] / divisions]
    }

    pub fn cell_center(&self, level: usize, cell: CellCoords) -> [f64; 3] {
        let width = self.cell_width(level);
        [
            self.bbox.min[0] + (cell[0] as f64 + 0.5) * width[0],
            self.bbox.min[1] + (cell[1] as f64 + 0.5) * width[1],
            self.bbox.min[2] + (cell[2] as f64 + 0.5) * width[2],
        ]
    }

    /// Leaf containing `point`, or `None` if it is outside the bounding box.
    pub fn leaf_of(&self, point: RowRef<f64>) -> Option<CellCoords> {
        if !self.bbox.contains(point) {
            return None;
        }

        let width = self.cell_width(self.height);
        let last = self.cells_per_axis(self.height) - 1;

        let mut cell = [0i64; 3];
        for axis in 0..3 {
            let idx = ((point[axis] - self.bbox.min[axis]) / width[axis]).floor() as i64;
            cell[axis] = idx.clamp(0, last);
        }
        Some(cell)
    }

    /// Maps the points of a leaf onto the reference cell `[-1, 1]^3`.
    pub fn to_reference(&self, points: &Mat<f64>, indices: &[usize], leaf: CellCoords) -> Mat<f64> {
        let center = self.cell_center(self.height, leaf);
        let width = self.cell_width(self.height);

        Mat::from_fn(indices.len(), 3, |i, axis| {
            let t = 2.0 * (points[(indices[i], axis)] - center[axis]) / width[axis];
            t.clamp(-1.0, 1.0)
        })
    }

    /// Assigns points to leaves and builds the hierarchy, near lists and interaction lists.
    pub fn build_lists(&self, points: &Mat<f64>) -> Result<TreeLists, FmmError> {
        let mut leaf_map: HashMap<CellCoords, Vec<usize>> = HashMap::new();

        for (point_index, row) in points.row_iter().enumerate() {
            let leaf = self
                .leaf_of(row)
                .ok_or(FmmError::PointOutsideTree { point_index })?;
            leaf_map.entry(leaf).or_default().push(point_index);
        }

        let mut leaf_cells: Vec<CellCoords> = leaf_map.keys().cloned().collect();
        leaf_cells.sort();

        let mut levels = vec![Level::default(); self.height + 1];
        levels[self.height] = Level::from_cells(leaf_cells);

        // Occupied cells of each level are the parents of the occupied cells below.
        for level in (0..self.height).rev() {
            let mut parent_cells: Vec<CellCoords> = levels[level + 1]
                .cells
                .iter()
                .map(|c| [c[0] >> 1, c[1] >> 1, c[2] >> 1])
                .collect();
            parent_cells.sort();
            parent_cells.dedup();

            let mut parent_level = Level::from_cells(parent_cells);
            parent_level.children = vec![Vec::new(); parent_level.cells.len()];

            let child_level = &mut levels[level + 1];
            child_level.parents = child_level
                .cells
                .iter()
                .enumerate()
                .map(|(child_idx, c)| {
                    let parent_idx = parent_level.lookup[&[c[0] >> 1, c[1] >> 1, c[2] >> 1]];
                    parent_level.children[parent_idx].push(child_idx);
                    parent_idx
                })
                .collect();

            levels[level] = parent_level;
        }

        // Interaction lists: children of the parent's neighbours that are not adjacent.
        for level in 2..=self.height {
            let interactions: Vec<Vec<(usize, CellCoords)>> = levels[level]
                .cells
                .iter()
                .map(|&cell| {
                    let parent = [cell[0] >> 1, cell[1] >> 1, cell[2] >> 1];
                    let mut list = Vec::new();

                    for (dx, dy, dz) in iproduct!(-1i64..=1, -1i64..=1, -1i64..=1) {
                        let neighbour = [parent[0] + dx, parent[1] + dy, parent[2] + dz];
                        let Some(&neighbour_idx) = levels[level - 1].lookup.get(&neighbour) else {
                            continue;
                        };

                        for &child_idx in &levels[level - 1].children[neighbour_idx] {
                            let source = levels[level].cells[child_idx];
                            if !is_adjacent(cell, source) {
                                let offset = [
                                    source[0] - cell[0],
                                    source[1] - cell[1],
                                    source[2] - cell[2],
                                ];
                                list.push((child_idx, offset));
                            }
                        }
                    }
                    list
                })
                .collect();

            levels[level].interactions = interactions;
        }

        let leaf_level = &levels[self.height];

        let near = leaf_level
            .cells
            .iter()
            .map(|&cell| {
                iproduct!(-1i64..=1, -1i64..=1, -1i64..=1)
                    .filter_map(|(dx, dy, dz)| {
                        leaf_level
                            .lookup
                            .get(&[cell[0] + dx, cell[1] + dy, cell[2] + dz])
                            .copied()
                    })
                    .collect()
            })
            .collect();

        let leaf_points = leaf_level
            .cells
            .iter()
            .map(|cell| leaf_map.remove(cell).unwrap_or_default())
            .collect();

        Ok(TreeLists {
            levels,
            leaf_points,
            near,
        })
    }
}

impl Level {
    fn from_cells(cells: Vec<CellCoords>) -> Self {
        let lookup = cells.iter().enumerate().map(|(idx, c)| (*c, idx)).collect();
        Self {
            cells,
            lookup,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng, rngs::StdRng};
    use std::collections::HashSet;

    fn unit_tree(height: usize) -> UniformTree {
        UniformTree {
            bbox: BoundingBox3::new([0.0; 3], [1.0; 3]),
            height,
        }
    }

    fn random_points(n: usize, seed: u64) -> Mat<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        Mat::from_fn(n, 3, |_, _| rng.random_range(0.0..1.0))
    }

    #[test]
    fn every_point_lands_in_exactly_one_leaf() {
        let points = random_points(500, 7);
        let lists = unit_tree(3).build_lists(&points).unwrap();

        let mut seen: Vec<usize> = lists.leaf_points.iter().flatten().cloned().collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..500).collect::<Vec<_>>());
    }

    #[test]
    fn upper_corner_is_clamped_into_last_leaf() {
        let points = faer::mat![[1.0, 1.0, 1.0f64]];
        let tree = unit_tree(2);
        assert_eq!(tree.leaf_of(points.row(0)), Some([3, 3, 3]));
    }

    #[test]
    fn outside_point_is_reported() {
        let points = faer::mat![[0.5, 0.5, 0.5], [1.5, 0.5, 0.5f64]];
        let err = unit_tree(2).build_lists(&points).unwrap_err();
        assert_eq!(err, FmmError::PointOutsideTree { point_index: 1 });
    }

    #[test]
    fn near_and_far_lists_cover_all_leaves_once() {
        // For every target leaf, the near leaves plus the far cells (projected down to
        // leaves) must cover every occupied leaf exactly once.
        let points = random_points(800, 11);
        let tree = unit_tree(3);
        let lists = tree.build_lists(&points).unwrap();
        let leaves = &lists.levels[3];

        for (leaf_idx, &leaf) in leaves.cells.iter().enumerate() {
            let mut covered: Vec<CellCoords> = lists.near[leaf_idx]
                .iter()
                .map(|&n| leaves.cells[n])
                .collect();

            // Walk up the ancestors and collect the leaves under each far cell.
            let mut idx = leaf_idx;
            for level in (2..=3).rev() {
                for &(source_idx, _) in &lists.levels[level].interactions[idx] {
                    let source = lists.levels[level].cells[source_idx];
                    let shift = 3 - level;
                    for &c in &leaves.cells {
                        if [c[0] >> shift, c[1] >> shift, c[2] >> shift] == source {
                            covered.push(c);
                        }
                    }
                }
                idx = lists.levels[level].parents[idx];
            }

            let unique: HashSet<CellCoords> = covered.iter().cloned().collect();
            assert_eq!(unique.len(), covered.len(), "leaf {:?} covered twice", leaf);
            assert_eq!(unique.len(), leaves.cells.len());
        }
    }

    #[test]
    fn interaction_offsets_are_well_separated() {
        let points = random_points(600, 19);
        let lists = unit_tree(4).build_lists(&points).unwrap();

        let mut distinct = HashSet::new();
        for level in 2..=4 {
            for &(_, offset) in lists.levels[level].interactions.iter().flatten() {
                assert!(offset.iter().all(|c| c.abs() <= 3));
                assert!(offset.iter().any(|c| c.abs() > 1));
                distinct.insert((level, offset));
            }
        }
        assert!(distinct.len() <= 3 * (7 * 7 * 7 - 27));
    }

    #[test]
    fn empty_point_set_gives_empty_lists() {
        let lists = unit_tree(2).build_lists(&Mat::<f64>::zeros(0, 3)).unwrap();
        assert!(lists.leaf_points.is_empty());
        assert!(lists.levels.iter().all(|l| l.cells.is_empty()));
    }
}
