/////////////////////////////////////////////////////////////////////////////////////////////
//
// Implements flexible GMRES as an explicit state machine for large RBF linear systems.
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

use faer::linalg::triangular_solve::solve_upper_triangular_in_place;
use faer::{Mat, MatRef, Par, unzip, zip};
use log::debug;

/// Anything that can be applied to a column vector.
pub trait LinearOperator {
    fn apply(&self, x: MatRef<f64>) -> Mat<f64>;
}

impl<F> LinearOperator for F
where
    F: Fn(MatRef<f64>) -> Mat<f64>,
{
    fn apply(&self, x: MatRef<f64>) -> Mat<f64> {
        self(x)
    }
}

/// New basis vectors shorter than this fraction of their norm before orthogonalisation
/// are treated as zero.
const STALL_TOLERANCE: f64 = 1e-14;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FgmresState {
    /// Created, [`Fgmres::setup`] not called yet.
    Initialized,
    Iterating,
    /// The relative residual reached the tolerance, or the right-hand side was zero.
    Converged,
    /// `max_iterations` iterations were run.
    Exhausted,
    /// The Krylov basis could not be extended.
    Stalled,
}

/// Flexible GMRES with a right preconditioner, following Saad's algorithm.
///
/// The preconditioner may change between iterations: its image of every basis vector
/// is stored, and the solution is rebuilt from those images as `x0 + Z y`.
///
/// The caller drives the iteration:
///
/// ```
/// use faer::{Mat, MatRef};
/// use scatterfit::iterative_solvers::{Fgmres, FgmresState};
///
/// let a = Mat::<f64>::from_fn(4, 4, |i, j| if i == j { 2.0 + i as f64 } else { 0.1 });
/// let b = Mat::<f64>::from_fn(4, 1, |i, _| i as f64 + 1.0);
///
/// let mut solver = Fgmres::new(|x: MatRef<f64>| &a * x, b.clone(), 10);
/// solver.set_tolerance(1e-12);
///
/// let mut state = solver.setup();
/// while state == FgmresState::Iterating {
///     state = solver.iterate_process();
/// }
///
/// assert_eq!(state, FgmresState::Converged);
/// let x = solver.solution_vector();
/// assert!((&a * &x - &b).norm_l2() < 1e-10);
/// ```
pub struct Fgmres<'a, A: LinearOperator> {
    op: A,
    precon: Option<Box<dyn Fn(MatRef<f64>) -> Mat<f64> + 'a>>,
    rhs: Mat<f64>,
    x0: Mat<f64>,
    max_iterations: usize,
    restart: Option<usize>,
    tolerance: f64,

    /// Orthonormal basis `V` of the current cycle.
    v: Vec<Mat<f64>>,

    /// Preconditioned basis vectors `Z`.
    z: Vec<Mat<f64>>,

    /// Columns of the rotated Hessenberg matrix, column `j` holds `j + 1` entries.
    r: Vec<Vec<f64>>,

    /// Rotated right-hand side of the least squares problem.
    g: Vec<f64>,
    cs: Vec<f64>,
    sn: Vec<f64>,

    initial_norm: f64,
    iterations: usize,
    state: FgmresState,
}

impl<'a, A: LinearOperator> Fgmres<'a, A> {
    /// Creates a solver for `op x = rhs` with a zero initial solution.
    pub fn new(op: A, rhs: Mat<f64>, max_iterations: usize) -> Self {
        let n = rhs.nrows();
        Self {
            op,
            precon: None,
            rhs,
            x0: Mat::zeros(n, 1),
            max_iterations,
            restart: None,
            tolerance: 0.0,
            v: Vec::new(),
            z: Vec::new(),
            r: Vec::new(),
            g: Vec::new(),
            cs: Vec::new(),
            sn: Vec::new(),
            initial_norm: 0.0,
            iterations: 0,
            state: FgmresState::Initialized,
        }
    }

    /// # Panics
    /// If `x0` does not have the length of the right-hand side.
    pub fn set_initial_solution(&mut self, x0: Mat<f64>) {
        assert_eq!(x0.nrows(), self.rhs.nrows(), "initial solution has the wrong length");
        self.x0 = x0;
    }

    pub fn set_right_preconditioner<M>(&mut self, precon: M)
    where
        M: Fn(MatRef<f64>) -> Mat<f64> + 'a,
    {
        self.precon = Some(Box::new(precon));
    }

    /// Relative residual at which the solver stops by itself. Zero, the default, never
    /// stops early.
    pub fn set_tolerance(&mut self, tolerance: f64) {
        self.tolerance = tolerance;
    }

    /// Rebuilds the basis from the current residual every `restart` iterations.
    pub fn set_restart(&mut self, restart: Option<usize>) {
        self.restart = restart.filter(|&k| k > 0);
    }

    /// Computes the initial residual and the first basis vector.
    pub fn setup(&mut self) -> FgmresState {
        self.iterations = 0;

        if self.rhs.norm_l2() == 0.0 {
            self.x0 = Mat::zeros(self.rhs.nrows(), 1);
            self.reset_basis(0.0);
            self.initial_norm = 0.0;
            self.state = FgmresState::Converged;
            return self.state;
        }

        let residual = &self.rhs - self.op.apply(self.x0.as_ref());
        let norm = residual.norm_l2();
        self.initial_norm = norm;

        if norm == 0.0 {
            self.reset_basis(0.0);
            self.state = FgmresState::Converged;
            return self.state;
        }

        self.reset_basis(norm);
        self.v.push(scaled(&residual, 1.0 / norm));
        self.state = if self.max_iterations == 0 {
            FgmresState::Exhausted
        } else {
            FgmresState::Iterating
        };

        self.state
    }

    fn reset_basis(&mut self, residual_norm: f64) {
        self.v.clear();
        self.z.clear();
        self.r.clear();
        self.cs.clear();
        self.sn.clear();
        self.g = vec![residual_norm];
    }

    /// Runs one iteration. Does nothing unless the state is [`FgmresState::Iterating`].
    pub fn iterate_process(&mut self) -> FgmresState {
        if self.state != FgmresState::Iterating {
            return self.state;
        }

        let j = self.z.len();

        let vj = self.v[j].as_ref();
        let zj = match &self.precon {
            Some(precon) => precon(vj),
            None => vj.to_owned(),
        };
        let mut w = self.op.apply(zj.as_ref());
        self.z.push(zj);

        // Classical Gram-Schmidt with one reorthogonalisation pass.
        let start_norm = w.norm_l2();
        let mut h = vec![0.0; j + 2];
        for _ in 0..2 {
            let coefficients: Vec<f64> = self.v.iter().map(|vi| dot(vi, &w)).collect();
            for (i, (vi, c)) in self.v.iter().zip(coefficients).enumerate() {
                zip!(w.as_mut(), vi.as_ref()).for_each(|unzip!(w, v)| *w -= c * *v);
                h[i] += c;
            }
        }
        let norm = w.norm_l2();
        h[j + 1] = norm;

        // Apply previous Givens rotations.
        for i in 0..j {
            let temp = self.cs[i] * h[i] + self.sn[i] * h[i + 1];
            h[i + 1] = -self.sn[i] * h[i] + self.cs[i] * h[i + 1];
            h[i] = temp;
        }

        // Compute and apply the new rotation.
        let (c, s, rjj) = givens_rotation(h[j], h[j + 1]);
        h[j] = rjj;
        h.truncate(j + 1);
        self.r.push(h);
        self.cs.push(c);
        self.sn.push(s);

        let gj = self.g[j];
        self.g[j] = c * gj;
        self.g.push(-s * gj);

        self.iterations += 1;

        let stalled = norm <= STALL_TOLERANCE * start_norm || norm == 0.0;
        if !stalled {
            self.v.push(scaled(&w, 1.0 / norm));
        }

        let relative = self.relative_residual();
        debug!(
            "FGMRES iteration {}: relative residual {relative:.3e}",
            self.iterations
        );

        self.state = if self.tolerance > 0.0 && relative <= self.tolerance {
            FgmresState::Converged
        } else if stalled {
            FgmresState::Stalled
        } else if self.iterations >= self.max_iterations {
            FgmresState::Exhausted
        } else {
            FgmresState::Iterating
        };

        if self.state == FgmresState::Iterating && self.restart == Some(self.z.len()) {
            self.restart_cycle();
        }

        self.state
    }

    /// Folds the current cycle into `x0` and restarts from the true residual.
    fn restart_cycle(&mut self) {
        self.x0 = self.solution_vector();
        let residual = &self.rhs - self.op.apply(self.x0.as_ref());
        let norm = residual.norm_l2();

        debug!("FGMRES restart after {} iterations, residual {norm:.3e}", self.iterations);

        self.reset_basis(norm);
        if norm == 0.0 {
            self.state = FgmresState::Converged;
            return;
        }
        self.v.push(scaled(&residual, 1.0 / norm));
    }

    /// Current solution `x0 + Z y`, with `y` solving the rotated least squares problem.
    pub fn solution_vector(&self) -> Mat<f64> {
        // Columns after a zero pivot do not contribute.
        let k = self
            .r
            .iter()
            .enumerate()
            .position(|(j, column)| column[j] == 0.0)
            .unwrap_or(self.r.len());

        if k == 0 {
            return self.x0.clone();
        }

        let r = Mat::from_fn(k, k, |i, j| if i <= j { self.r[j][i] } else { 0.0 });
        let mut y = Mat::from_fn(k, 1, |i, _| self.g[i]);
        solve_upper_triangular_in_place(r.as_ref(), y.as_mut(), Par::Seq);

        let mut x = self.x0.clone();
        for (zj, &yj) in self.z.iter().zip(y.col(0).iter()) {
            zip!(x.as_mut(), zj.as_ref()).for_each(|unzip!(x, z)| *x += yj * *z);
        }
        x
    }

    /// Residual estimate of the least squares problem relative to the initial residual.
    pub fn relative_residual(&self) -> f64 {
        if self.initial_norm == 0.0 {
            return 0.0;
        }
        self.g.last().map_or(0.0, |g| g.abs()) / self.initial_norm
    }

    pub fn iteration_count(&self) -> usize {
        self.iterations
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    pub fn state(&self) -> FgmresState {
        self.state
    }
}

fn dot(a: &Mat<f64>, b: &Mat<f64>) -> f64 {
    a.col(0).transpose() * b.col(0)
}

fn scaled(a: &Mat<f64>, factor: f64) -> Mat<f64> {
    Mat::from_fn(a.nrows(), 1, |i, _| a[(i, 0)] * factor)
}

/// Compute a Givens rotation: given scalars `f` and `g`,
/// returns (c, s, r) such that
///
///   [  c   s ] [ f ] = [ r ]
///   [ –s   c ] [ g ]   [ 0 ]
///
/// A port of LAPACK's dlartg.
pub fn givens_rotation(f: f64, g: f64) -> (f64, f64, f64) {
    let safmin = f64::MIN_POSITIVE;
    let safmax = f64::MAX;

    let rtmin = safmin.sqrt();
    let rtmax = (safmax / 2.0).sqrt();

    if g == 0.0 {
        return (1.0, 0.0, f);
    }
    if f == 0.0 {
        return (0.0, g.signum(), g.abs());
    }

    let f1 = f.abs();
    let g1 = g.abs();

    if (rtmin..rtmax).contains(&f1) && (rtmin..rtmax).contains(&g1) {
        // r carries the sign of f
        let r = (f * f + g * g).sqrt().copysign(f);
        (f1 / r.abs(), g / r, r)
    } else {
        let u = f1.max(g1).clamp(safmin, safmax);
        let fs = f / u;
        let gs = g / u;
        let mag = (fs * fs + gs * gs).sqrt();
        (fs.abs() / mag, gs / mag, mag.copysign(f) * u)
    }
}
