/////////////////////////////////////////////////////////////////////////////////////////////
//
// Builds Chebyshev interpolation weights and parent/child transfer operators for the octree.
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

use faer::Mat;

// # References
// [1] W. Fong, E. Darve, The black-box fast multipole method, Journal of Computational Physics 228 (23) (2009) 8712-8725.

/// Number of children of an octree cell.
pub(crate) const NUM_CHILDREN: usize = 8;

/// Chebyshev nodes of T_n(x) on [-1, 1] in ascending order.
pub(crate) fn generate_chebyshev_nodes(interpolation_order: usize) -> Vec<f64> {
    (0..interpolation_order)
        .rev()
        .map(|i| {
            let theta = std::f64::consts::PI * (i as f64 + 0.5) / interpolation_order as f64;
            theta.cos()
        })
        .collect()
}

/// Calculates T_k(x) for k in `0..interpolation_order`, one row per value of `x`.
///
/// Uses the recurrence relation:
///  T_0(x) = 1
///  T_1(x) = x
///  T_{n+1}(x) = 2xT_n(x) - T_{n-1}(x)
pub(crate) fn evaluate_chebyshev_polynomials(interpolation_order: usize, x: &[f64]) -> Mat<f64> {
    let mut tn_x = Mat::<f64>::zeros(x.len(), interpolation_order);

    for i in 0..x.len() {
        for k in 0..interpolation_order {
            tn_x[(i, k)] = match k {
                0 => 1.0,
                1 => x[i],
                _ => 2.0 * x[i] * tn_x[(i, k - 1)] - tn_x[(i, k - 2)],
            };
        }
    }

    tn_x
}

/// Precomputed one dimensional Chebyshev data shared by every cell of the tree.
#[derive(Debug, Clone)]
pub(crate) struct ChebyshevBasis {
    pub order: usize,

    /// Nodes on [-1, 1].
    pub nodes: Vec<f64>,

    /// T_k evaluated at the nodes, `order x order`.
    node_polynomials: Mat<f64>,

    /// Tensor product nodes on [-1, 1]^3, `order^3 x 3`, first axis varying slowest.
    pub tensor_nodes: Mat<f64>,

    /// Parent-to-child transfer operators, one per octant, `order^3 x order^3`
    /// with rows indexed by parent nodes and columns by child nodes.
    pub m2m: Vec<Mat<f64>>,
}

impl ChebyshevBasis {
    pub fn new(order: usize) -> Self {
        let nodes = generate_chebyshev_nodes(order);
        let node_polynomials = evaluate_chebyshev_polynomials(order, &nodes);

        let tensor_nodes = Mat::from_fn(order.pow(3), 3, |row, axis| {
            let idx = match axis {
                0 => row / (order * order),
                1 => (row / order) % order,
                _ => row % order,
            };
            nodes[idx]
        });

        let mut basis = Self {
            order,
            nodes,
            node_polynomials,
            tensor_nodes,
            m2m: Vec::new(),
        };

        basis.m2m = basis.m2m_transfer_matrices();
        basis
    }

    /// Number of tensor product nodes in a cell.
    #[inline(always)]
    pub fn num_nodes(&self) -> usize {
        self.order.pow(3)
    }

    /// S_n(x, node) for each `x` (rows) and each node (columns).
    ///
    /// S_n(x, t_m) = 1/n + 2/n * sum_{k=1}^{n-1} T_k(x) T_k(t_m)
    pub fn interpolation_weights(&self, x: &[f64]) -> Mat<f64> {
        let tn_x = evaluate_chebyshev_polynomials(self.order, x);
        let mut sn = tn_x * &self.node_polynomials.transpose();

        let inv_order = 1.0 / self.order as f64;
        sn.col_iter_mut().for_each(|col| {
            col.iter_mut().for_each(|element| {
                *element = (*element * 2.0 - 1.0) * inv_order;
            });
        });

        sn
    }

    /// Anterpolation matrix for a set of points already mapped to the reference cell,
    /// `order^3 x n`. Entry `(a, j)` is the tensor product weight of node `a` at point `j`.
    pub fn tensor_weights(&self, local: &Mat<f64>) -> Mat<f64> {
        let p = self.order;
        let n = local.nrows();

        let per_axis: Vec<Mat<f64>> = (0..3)
            .map(|axis| {
                let coords: Vec<f64> = local.col(axis).iter().copied().collect();
                self.interpolation_weights(&coords)
            })
            .collect();

        Mat::from_fn(p * p * p, n, |a, j| {
            let (a0, a1, a2) = (a / (p * p), (a / p) % p, a % p);
            per_axis[0][(j, a0)] * per_axis[1][(j, a1)] * per_axis[2][(j, a2)]
        })
    }

    /// Builds the parent-to-child transfer operators. Octant bit `d` set means the
    /// child occupies the upper half of the parent along axis `d`.
    fn m2m_transfer_matrices(&self) -> Vec<Mat<f64>> {
        let p = self.order;

        // Child nodes expressed in the parent's reference coordinates, lower child first.
        let lower: Vec<f64> = self.nodes.iter().map(|t| 0.5 * (t - 1.0)).collect();
        let upper: Vec<f64> = self.nodes.iter().map(|t| 0.5 * (t + 1.0)).collect();

        // Rows are child nodes, columns are parent nodes.
        let halves = [
            self.interpolation_weights(&lower),
            self.interpolation_weights(&upper),
        ];

        (0..NUM_CHILDREN)
            .map(|octant| {
                let t = [
                    &halves[octant & 1],
                    &halves[(octant >> 1) & 1],
                    &halves[(octant >> 2) & 1],
                ];

                Mat::from_fn(p * p * p, p * p * p, |parent, child| {
                    let (pa, pb, pc) = (parent / (p * p), (parent / p) % p, parent % p);
                    let (ca, cb, cc) = (child / (p * p), (child / p) % p, child % p);
                    t[0][(ca, pa)] * t[1][(cb, pb)] * t[2][(cc, pc)]
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nodes_are_ascending_and_symmetric() {
        let nodes = generate_chebyshev_nodes(5);
        assert_eq!(nodes.len(), 5);
        assert!(nodes.windows(2).all(|w| w[0] < w[1]));
        for (a, b) in nodes.iter().zip(nodes.iter().rev()) {
            assert!((a + b).abs() < 1e-14);
        }
    }

    #[test]
    fn interpolation_weights_are_cardinal_at_nodes() {
        let basis = ChebyshevBasis::new(6);
        let sn = basis.interpolation_weights(&basis.nodes);
        for i in 0..6 {
            for j in 0..6 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((sn[(i, j)] - expected).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn tensor_weights_reproduce_quadratic() {
        // A degree two polynomial is reproduced exactly by an order four interpolant.
        let basis = ChebyshevBasis::new(4);
        let f = |x: f64, y: f64, z: f64| 1.0 + x - 2.0 * y * z + 0.5 * x * x;

        let local = faer::mat![[0.3, -0.7, 0.1], [-0.9, 0.2, 0.55]];
        let s = basis.tensor_weights(&local);

        for j in 0..local.nrows() {
            let interpolated: f64 = (0..basis.num_nodes())
                .map(|a| {
                    let node = basis.tensor_nodes.row(a);
                    s[(a, j)] * f(node[0], node[1], node[2])
                })
                .sum();
            let exact = f(local[(j, 0)], local[(j, 1)], local[(j, 2)]);
            assert!((interpolated - exact).abs() < 1e-12);
        }
    }

    #[test]
    fn m2m_rows_partition_unity() {
        // Each child node is fully represented by the parent nodes, so the
        // column sums of every transfer operator are one.
        let basis = ChebyshevBasis::new(3);
        for m2m in &basis.m2m {
            for child in 0..m2m.ncols() {
                let sum: f64 = m2m.col(child).iter().sum();
                assert!((sum - 1.0).abs() < 1e-12);
            }
        }
    }
}
