/////////////////////////////////////////////////////////////////////////////////////////////
//
// Orchestrates the operator, preconditioner and residual check into the public solve.
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

use crate::{
    SolverError,
    config::SolverParams,
    direct_evaluator::DirectEvaluator,
    iterative_solvers::{Fgmres, FgmresState},
    polynomials::{OrthonormalBasis, orthogonalise, validate_degree},
    preconditioning::RasPreconditioner,
    progress::{ProgressMsg, ProgressSink, progress_from_rel},
    rbf_operator::RbfOperator,
    residual_evaluator::ResidualEvaluator,
};
use faer::{Mat, MatRef};
use log::{debug, warn};
use scatterfit_fmm::BoundingBox3;
use scatterfit_kernels::RbfKernel;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

/// How a solve ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    /// The absolute residual at every point is within the tolerance.
    Converged,

    /// The iteration budget ran out. The best solution found is returned.
    MaxIterations,

    /// The Krylov basis could not be extended before reaching the tolerance.
    Stalled,

    /// The interrupt flag was raised between iterations.
    Interrupted,
}

/// Outcome of [`InterpolantSolver::solve`].
#[derive(Debug, Clone)]
pub struct SolveReport {
    /// Point weights followed by trend coefficients, `(N + M) x 1`.
    pub solution: Mat<f64>,
    pub status: SolveStatus,
    pub iterations: usize,

    /// Krylov residual relative to the initial residual.
    pub relative_residual: f64,

    /// Largest absolute misfit at the sample points, as measured by the residual evaluator.
    pub absolute_residual: f64,

    /// Estimated summation error of the residual evaluator at the solution. The misfit
    /// against exact kernel sums may exceed `absolute_residual` by about this much. Zero
    /// for direct summation.
    pub summation_error: f64,

    num_points: usize,
}

impl SolveReport {
    pub fn is_converged(&self) -> bool {
        self.status == SolveStatus::Converged
    }

    /// Weights of the sample points.
    pub fn weights(&self) -> MatRef<'_, f64> {
        self.solution.subrows(0, self.num_points)
    }

    /// Coefficients of the orthonormal trend basis, see [`InterpolantSolver::trend_basis`].
    pub fn trend_coefficients(&self) -> MatRef<'_, f64> {
        let num_trend = self.solution.nrows() - self.num_points;
        self.solution.subrows(self.num_points, num_trend)
    }
}

/// Solves the RBF interpolation system
///
/// ```text
/// | K + nugget I   P | | w |   | values |
/// | P^T            0 | | c | = | 0      |
/// ```
///
/// with FGMRES, right preconditioned by a multilevel restricted additive Schwarz
/// preconditioner. After every iteration the true misfit at the sample points is
/// measured, and the solve stops as soon as it is within the absolute tolerance.
///
/// # Examples
///
/// ```
/// use scatterfit::{InterpolantSolver, SolveStatus, SolverParams, generate_random_points};
/// use scatterfit_kernels::kernels::LinearVariogram;
///
/// let points = generate_random_points(200, 2, Some(7));
/// let values = faer::Mat::from_fn(200, 1, |i, _| points[(i, 0)].sin() + points[(i, 1)]);
///
/// let solver =
///     InterpolantSolver::new(LinearVariogram::new(1.0), 2, 1, &points, SolverParams::default())
///         .unwrap();
/// let report = solver.solve(&values, 1e-8).unwrap();
///
/// assert_eq!(report.status, SolveStatus::Converged);
/// assert_eq!(report.trend_coefficients().nrows(), 3);
/// ```
#[derive(Debug)]
pub struct InterpolantSolver<K: RbfKernel + Clone> {
    params: SolverParams,
    operator: RbfOperator<K>,
    evaluator: ResidualEvaluator<K>,
    preconditioner: RasPreconditioner,
    progress: Option<Arc<dyn ProgressSink>>,
    interrupt: Option<Arc<AtomicBool>>,
}

fn validate_kernel_degree<K: RbfKernel>(kernel: &K, degree: i32) -> Result<(), SolverError> {
    validate_degree(degree)?;
    let minimum = kernel.cpd_order() - 1;
    if degree < minimum {
        return Err(SolverError::TrendDegreeTooLow { degree, minimum });
    }
    Ok(())
}

fn build_preconditioner<K: RbfKernel + Clone>(
    operator: &RbfOperator<K>,
    params: &SolverParams,
) -> RasPreconditioner {
    RasPreconditioner::new(
        operator.points(),
        operator.kernel(),
        operator.design_matrix(),
        &params.ddm_params,
    )
}

/// Maps the end state of the last Krylov run to the reported status.
fn solve_status(
    converged: bool,
    interrupted: bool,
    state: FgmresState,
    budget_left: bool,
) -> SolveStatus {
    match (converged, interrupted, state) {
        (true, _, _) => SolveStatus::Converged,
        (false, true, _) => SolveStatus::Interrupted,
        (false, false, FgmresState::Exhausted | FgmresState::Iterating) => {
            SolveStatus::MaxIterations
        }
        (false, false, _) if !budget_left => SolveStatus::MaxIterations,
        // The basis broke down, or a fresh misfit no longer reduced the true residual.
        (false, false, _) => SolveStatus::Stalled,
    }
}

impl<K: RbfKernel + Clone> InterpolantSolver<K> {
    /// Builds the operator, residual evaluator and preconditioner on `points`.
    ///
    /// # Arguments
    /// * `kernel` - RBF kernel, nugget included.
    /// * `dimension` - Dimension of the trend, 1 to 3. The trend is a polynomial in the
    ///   first `dimension` point coordinates.
    /// * `degree` - Total degree of the trend, -1 for none.
    /// * `points` - Sample locations, one per row, with `dimension` to 3 coordinates.
    /// * `params` - Solver options.
    pub fn new(
        kernel: K,
        dimension: usize,
        degree: i32,
        points: &Mat<f64>,
        params: SolverParams,
    ) -> Result<Self, SolverError> {
        validate_kernel_degree(&kernel, degree)?;

        let operator = RbfOperator::new(
            kernel.clone(),
            dimension,
            degree,
            points,
            &params.fmm_params,
            params.direct_threshold,
        )?;
        let evaluator = ResidualEvaluator::new(
            kernel,
            dimension,
            degree,
            points,
            &params.fmm_params,
            params.direct_threshold,
        )?;
        let preconditioner = build_preconditioner(&operator, &params);

        Ok(Self {
            params,
            operator,
            evaluator,
            preconditioner,
            progress: None,
            interrupt: None,
        })
    }

    /// Builds a tree-mode solver over `bbox` without points. Attach points with
    /// [`InterpolantSolver::set_points`]; the tree geometry is reused for every point set.
    pub fn with_tree(
        kernel: K,
        dimension: usize,
        degree: i32,
        tree_height: usize,
        bbox: BoundingBox3,
        params: SolverParams,
    ) -> Result<Self, SolverError> {
        validate_kernel_degree(&kernel, degree)?;

        let operator = RbfOperator::with_tree(
            kernel.clone(),
            dimension,
            degree,
            tree_height,
            bbox,
            &params.fmm_params,
        )?;
        let evaluator = ResidualEvaluator::with_tree(
            kernel,
            dimension,
            degree,
            tree_height,
            bbox,
            &params.fmm_params,
        )?;
        let preconditioner = build_preconditioner(&operator, &params);

        Ok(Self {
            params,
            operator,
            evaluator,
            preconditioner,
            progress: None,
            interrupt: None,
        })
    }

    /// Replaces the points and rebuilds everything that depends on them.
    ///
    /// On error the solver keeps its previous points and stays usable with them.
    pub fn set_points(&mut self, points: &Mat<f64>) -> Result<(), SolverError> {
        let previous = self.operator.points().clone();
        self.operator.set_points(points)?;

        if let Err(err) = self.evaluator.set_points(points) {
            // The previous points were accepted before, so reattaching them succeeds.
            self.operator.set_points(&previous)?;
            return Err(err);
        }

        self.preconditioner = build_preconditioner(&self.operator, &self.params);
        Ok(())
    }

    pub fn set_progress_sink(&mut self, sink: Arc<dyn ProgressSink>) {
        self.progress = Some(sink);
    }

    /// Flag checked before every iteration. Raising it stops the solve with
    /// [`SolveStatus::Interrupted`] and the best solution so far.
    pub fn set_interrupt(&mut self, flag: Arc<AtomicBool>) {
        self.interrupt = Some(flag);
    }

    pub fn num_points(&self) -> usize {
        self.operator.num_points()
    }

    pub fn num_polynomials(&self) -> usize {
        self.operator.num_polynomials()
    }

    pub fn params(&self) -> &SolverParams {
        &self.params
    }

    pub fn operator(&self) -> &RbfOperator<K> {
        &self.operator
    }

    /// Orthonormal trend basis the trend coefficients refer to.
    pub fn trend_basis(&self) -> Option<&OrthonormalBasis> {
        self.operator.trend_basis()
    }

    pub fn preconditioner(&self) -> &RasPreconditioner {
        &self.preconditioner
    }

    /// Solves for `values` (`N x 1`) until the misfit at every point is at most
    /// `absolute_tolerance`.
    pub fn solve(
        &self,
        values: &Mat<f64>,
        absolute_tolerance: f64,
    ) -> Result<SolveReport, SolverError> {
        self.solve_impl(values, absolute_tolerance, None)
    }

    /// Like [`InterpolantSolver::solve`], starting from `initial` (`(N + M) x 1`). The
    /// weights of `initial` are first made orthogonal to the trend basis.
    pub fn solve_with_initial(
        &self,
        values: &Mat<f64>,
        absolute_tolerance: f64,
        initial: &Mat<f64>,
    ) -> Result<SolveReport, SolverError> {
        self.solve_impl(values, absolute_tolerance, Some(initial))
    }

    fn emit(&self, msg: ProgressMsg) {
        if let Some(sink) = &self.progress {
            sink.emit(msg);
        }
    }

    fn interrupted(&self) -> bool {
        self.interrupt
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    fn finish(&self, report: SolveReport) -> SolveReport {
        match report.status {
            SolveStatus::Converged => debug!(
                "solve converged after {} iterations, residual {:.3e}",
                report.iterations, report.absolute_residual
            ),
            status => warn!(
                "solve stopped ({status:?}) after {} iterations, residual {:.3e}",
                report.iterations, report.absolute_residual
            ),
        }

        self.emit(ProgressMsg::SolverFinished {
            status: report.status,
            iterations: report.iterations,
            absolute_residual: report.absolute_residual,
        });

        report
    }

    /// Right-hand side of the correction system at `solution`: the sample misfit
    /// measured by the residual evaluator, followed by the negated trend moments.
    fn defect(&self, values: &Mat<f64>, solution: MatRef<f64>) -> Mat<f64> {
        let n = self.num_points();
        let m = self.num_polynomials();

        let reproduced = self.evaluator.reproduce(solution);
        let moments = self.operator.design_matrix().transpose() * solution.subrows(0, n);

        Mat::from_fn(n + m, 1, |i, _| match i < n {
            true => values[(i, 0)] - reproduced[(i, 0)],
            false => -moments[(i - n, 0)],
        })
    }

    fn solve_impl(
        &self,
        values: &Mat<f64>,
        absolute_tolerance: f64,
        initial: Option<&Mat<f64>>,
    ) -> Result<SolveReport, SolverError> {
        let n = self.num_points();
        let m = self.num_polynomials();

        if values.nrows() != n || values.ncols() != 1 {
            return Err(SolverError::ValueCountMismatch {
                expected: n,
                found: values.nrows() * values.ncols(),
            });
        }
        if let Some(x0) = initial {
            if x0.nrows() != n + m || x0.ncols() != 1 {
                return Err(SolverError::InitialSolutionLength {
                    expected: n + m,
                    found: x0.nrows() * x0.ncols(),
                });
            }
        }

        if n == 0 {
            return Ok(self.finish(SolveReport {
                solution: Mat::zeros(m, 1),
                status: SolveStatus::Converged,
                iterations: 0,
                relative_residual: 0.0,
                absolute_residual: 0.0,
                summation_error: 0.0,
                num_points: 0,
            }));
        }

        let mut solution = initial.cloned().unwrap_or_else(|| Mat::zeros(n + m, 1));
        if m > 0 {
            orthogonalise(solution.subrows_mut(0, n), self.operator.design_matrix().as_ref());
        }

        let (mut converged, mut absolute_residual) =
            self.evaluator.converged(values.as_ref(), solution.as_ref(), absolute_tolerance);
        let start_residual = absolute_residual;

        // Direct sums are exact, so only tree mode benefits from a fresh misfit.
        let inner_tolerance = match self.operator.is_tree_mode() {
            true => self.params.refresh_tolerance,
            false => 0.0,
        };

        let max_iterations = self.params.max_iterations;
        let operator = &self.operator;
        let preconditioner = &self.preconditioner;

        let mut iterations = 0;
        let mut relative_residual = 1.0;
        let mut first_defect_norm = None;
        let mut state = FgmresState::Initialized;
        let mut interrupted = false;

        while !converged {
            let defect = self.defect(values, solution.as_ref());
            let defect_norm = defect.norm_l2();
            let reference_norm = *first_defect_norm.get_or_insert(defect_norm);
            let scale = match reference_norm > 0.0 {
                true => defect_norm / reference_norm,
                false => 0.0,
            };
            let cycle_start_residual = absolute_residual;
            let base = solution.clone();

            let mut fgmres = Fgmres::new(
                |x: MatRef<f64>| operator.apply(x),
                defect,
                max_iterations - iterations,
            );
            fgmres.set_restart(self.params.restart);
            fgmres.set_tolerance(inner_tolerance);
            fgmres.set_right_preconditioner(move |v: MatRef<f64>| {
                preconditioner.apply(v, |w, targets| operator.apply_partial(w, targets))
            });

            state = fgmres.setup();
            while !converged && state == FgmresState::Iterating {
                if self.interrupted() {
                    interrupted = true;
                    break;
                }

                state = fgmres.iterate_process();
                solution = &base + fgmres.solution_vector();
                (converged, absolute_residual) = self.evaluator.converged(
                    values.as_ref(),
                    solution.as_ref(),
                    absolute_tolerance,
                );
                relative_residual = scale * fgmres.relative_residual();

                self.emit(ProgressMsg::SolverIteration {
                    iter: iterations + fgmres.iteration_count(),
                    relative_residual,
                    absolute_residual,
                    converged,
                    progress: progress_from_rel(
                        absolute_residual,
                        start_residual,
                        absolute_tolerance,
                    ),
                });
            }
            iterations += fgmres.iteration_count();

            let refresh = matches!(state, FgmresState::Converged | FgmresState::Stalled)
                && absolute_residual < cycle_start_residual
                && iterations < max_iterations;
            if interrupted || !refresh {
                break;
            }
            debug!(
                "refreshing misfit after {iterations} iterations, residual {absolute_residual:.3e}"
            );
        }

        let status = solve_status(converged, interrupted, state, iterations < max_iterations);

        let summation_error = self.evaluator.summation_error(solution.as_ref());
        if summation_error > absolute_tolerance {
            warn!(
                "residual summation error {summation_error:.3e} exceeds the tolerance \
                 {absolute_tolerance:.3e}, raise the evaluator interpolation order"
            );
        }

        Ok(self.finish(SolveReport {
            solution,
            status,
            iterations,
            relative_residual,
            absolute_residual,
            summation_error,
            num_points: n,
        }))
    }

    /// Evaluates a solution at `targets` by direct summation.
    pub fn evaluate(
        &self,
        solution: MatRef<f64>,
        targets: &Mat<f64>,
    ) -> Result<Mat<f64>, SolverError> {
        let expected = self.num_points() + self.num_polynomials();
        if solution.nrows() != expected {
            return Err(SolverError::SolutionLength {
                expected,
                found: solution.nrows(),
            });
        }
        if self.num_points() == 0 {
            return Ok(Mat::zeros(targets.nrows(), solution.ncols()));
        }

        DirectEvaluator::new(
            self.operator.kernel().clone(),
            self.operator.points().clone(),
            self.operator.trend_basis().cloned(),
        )
        .evaluate(solution, targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{DDMParams, FmmParams},
        generate_random_points, generate_spherical_points,
        progress::closure_sink,
    };
    use scatterfit_kernels::{
        kernels::{CovExponential, CubicVariogram, LinearVariogram},
        symmetric_kernel_matrix,
    };
    use std::sync::Mutex;

    fn small_ddm_params() -> SolverParams {
        SolverParams::builder()
            .max_iterations(80)
            .ddm_params(DDMParams {
                leaf_threshold: 64,
                overlap_quota: 0.5,
                coarse_ratio: 0.25,
                coarse_threshold: 64,
            })
            .build()
    }

    fn smooth_values(points: &Mat<f64>) -> Mat<f64> {
        Mat::from_fn(points.nrows(), 1, |i, _| {
            let x = points.row(i);
            (3.0 * x[0]).sin() + x.iter().skip(1).map(|v| v * v).sum::<f64>()
        })
    }

    fn direct_fit<K: RbfKernel + Clone>(
        solver: &InterpolantSolver<K>,
        report: &SolveReport,
    ) -> Mat<f64> {
        let evaluator = DirectEvaluator::new(
            solver.operator().kernel().clone(),
            solver.operator().points().clone(),
            solver.trend_basis().cloned(),
        );
        evaluator.evaluate_at_sources(report.solution.as_ref(), true).unwrap()
    }

    #[test]
    fn reproduces_known_weights_on_the_sphere() {
        let points = generate_spherical_points(1024, Some(61));
        let kernel = CovExponential::new(1.0, 0.2);
        let known_weights = generate_random_points(1024, 1, Some(62));
        let values = symmetric_kernel_matrix(&points, &kernel) * &known_weights;

        let solver =
            InterpolantSolver::new(kernel, 3, -1, &points, SolverParams::default()).unwrap();
        let report = solver.solve(&values, 5e-7).unwrap();

        assert!(report.is_converged());
        assert_eq!(report.trend_coefficients().nrows(), 0);

        let fitted = direct_fit(&solver, &report);
        assert!((&fitted - &values).norm_max() <= 5e-7);
    }

    #[test]
    fn multilevel_preconditioner_converges() {
        let points = generate_random_points(600, 3, Some(63));
        let kernel = CovExponential::new(1.0, 0.3).with_nugget(1e-6);
        let values = smooth_values(&points);

        let solver = InterpolantSolver::new(kernel, 3, -1, &points, small_ddm_params()).unwrap();
        assert!(solver.preconditioner().ddm_tree().num_levels() > 1);

        let report = solver.solve(&values, 1e-6).unwrap();
        assert_eq!(report.status, SolveStatus::Converged);
        assert!(report.iterations > 0);

        let fitted = direct_fit(&solver, &report);
        assert!((&fitted - &values).norm_max() <= 1e-6 * 1.01);
    }

    fn run_variogram_case(degree: i32) {
        let points = generate_random_points(400, 2, Some(64));
        let values = smooth_values(&points);

        let kernel = LinearVariogram::new(1.0);
        let solver =
            InterpolantSolver::new(kernel, 2, degree, &points, small_ddm_params()).unwrap();
        let report = solver.solve(&values, 1e-6).unwrap();
        assert_eq!(report.status, SolveStatus::Converged, "degree {degree}");
        assert_eq!(report.trend_coefficients().nrows(), if degree == 0 { 1 } else { 3 });

        let fitted = direct_fit(&solver, &report);
        assert!((&fitted - &values).norm_max() <= 1e-6 * 1.01);

        let moments = solver.operator().design_matrix().transpose() * report.weights();
        assert!(moments.norm_max() < 1e-8, "degree {degree}: moments {}", moments.norm_max());
    }

    #[test]
    fn linear_variogram_with_constant_trend() {
        run_variogram_case(0);
    }

    #[test]
    fn linear_variogram_with_linear_trend() {
        run_variogram_case(1);
    }

    #[test]
    fn warm_start_from_a_solution_needs_no_iterations() {
        let points = generate_random_points(300, 2, Some(65));
        let values = smooth_values(&points);
        let solver =
            InterpolantSolver::new(LinearVariogram::new(1.0), 2, 1, &points, small_ddm_params())
                .unwrap();

        let first = solver.solve(&values, 1e-7).unwrap();
        let second = solver.solve_with_initial(&values, 1e-6, &first.solution).unwrap();

        assert_eq!(second.status, SolveStatus::Converged);
        assert_eq!(second.iterations, 0);
    }

    #[test]
    fn iteration_budget_is_reported() {
        let points = generate_random_points(600, 3, Some(66));
        let values = smooth_values(&points);
        let params = SolverParams {
            max_iterations: 1,
            ..small_ddm_params()
        };

        let solver =
            InterpolantSolver::new(CovExponential::new(1.0, 0.3), 3, -1, &points, params).unwrap();
        let report = solver.solve(&values, 1e-14).unwrap();

        assert_eq!(report.status, SolveStatus::MaxIterations);
        assert_eq!(report.iterations, 1);
        assert_eq!(report.solution.nrows(), 600);
        assert!(report.absolute_residual > 0.0);
    }

    #[test]
    fn interrupt_stops_before_iterating() {
        let points = generate_random_points(200, 2, Some(67));
        let values = smooth_values(&points);
        let mut solver =
            InterpolantSolver::new(LinearVariogram::new(1.0), 2, 0, &points, small_ddm_params())
                .unwrap();
        solver.set_interrupt(Arc::new(AtomicBool::new(true)));

        let report = solver.solve(&values, 1e-6).unwrap();
        assert_eq!(report.status, SolveStatus::Interrupted);
        assert_eq!(report.iterations, 0);
    }

    #[test]
    fn progress_messages_are_emitted() {
        let points = generate_random_points(300, 3, Some(68));
        let values = smooth_values(&points);
        let received = Arc::new(Mutex::new(Vec::new()));
        let store = received.clone();

        let kernel = CovExponential::new(1.0, 0.3);
        let mut solver =
            InterpolantSolver::new(kernel, 3, -1, &points, small_ddm_params()).unwrap();
        let (sink, handle) = closure_sink(1024, move |msg| store.lock().unwrap().push(msg));
        solver.set_progress_sink(sink);

        let report = solver.solve(&values, 1e-6).unwrap();
        drop(solver);
        handle.join().unwrap();

        let received = received.lock().unwrap();
        let iterations = received
            .iter()
            .filter(|msg| matches!(msg, ProgressMsg::SolverIteration { .. }))
            .count();
        assert_eq!(iterations, report.iterations);
        assert!(matches!(
            received.last(),
            Some(ProgressMsg::SolverFinished { status: SolveStatus::Converged, .. })
        ));
    }

    #[test]
    fn tree_mode_solver_reuses_its_geometry() {
        let params = SolverParams::default();
        let bbox = BoundingBox3::new([-1.01; 3], [1.01; 3]);
        let kernel = CovExponential::new(1.0, 0.3).with_nugget(1e-4);
        let mut solver = InterpolantSolver::with_tree(kernel, 3, 0, 3, bbox, params).unwrap();

        let empty = solver.solve(&Mat::zeros(0, 1), 1e-6).unwrap();
        assert_eq!(empty.status, SolveStatus::Converged);
        assert_eq!(empty.solution.nrows(), 1);

        for seed in [69, 70] {
            let points = generate_spherical_points(1500, Some(seed));
            let values = smooth_values(&points);
            solver.set_points(&points).unwrap();
            assert!(solver.operator().is_tree_mode());

            let report = solver.solve(&values, 1e-4).unwrap();
            assert_eq!(report.status, SolveStatus::Converged);
            assert!(report.summation_error < 1e-4);

            let fitted = direct_fit(&solver, &report);
            assert!((&fitted - &values).norm_max() <= 1e-4);
        }
    }

    #[test]
    fn tree_mode_reaches_tolerances_below_the_operator_accuracy() {
        // A coarse operator forces the solve to continue from the evaluator's misfit.
        let params = SolverParams::builder()
            .max_iterations(100)
            .fmm_params(FmmParams {
                interpolation_order: 4,
                ..FmmParams::default()
            })
            .build();
        let bbox = BoundingBox3::new([-1.01; 3], [1.01; 3]);
        let kernel = CovExponential::new(1.0, 0.3).with_nugget(1e-3);
        let mut solver = InterpolantSolver::with_tree(kernel, 3, -1, 3, bbox, params).unwrap();

        let points = generate_spherical_points(1500, Some(77));
        let values = smooth_values(&points);
        solver.set_points(&points).unwrap();

        let report = solver.solve(&values, 1e-5).unwrap();
        assert_eq!(report.status, SolveStatus::Converged);

        let fitted = direct_fit(&solver, &report);
        assert!((&fitted - &values).norm_max() <= 1e-5);
    }

    #[test]
    fn failed_set_points_keeps_the_previous_points() {
        let points = generate_random_points(50, 2, Some(73));
        let values = smooth_values(&points);
        let mut solver =
            InterpolantSolver::new(LinearVariogram::new(1.0), 2, 1, &points, small_ddm_params())
                .unwrap();

        let err = solver.set_points(&generate_random_points(50, 1, Some(74))).unwrap_err();
        assert_eq!(err, SolverError::UnsupportedDimension(1));

        let mut collinear = generate_random_points(40, 2, Some(75));
        collinear.col_mut(1).fill(0.5);
        let err = solver.set_points(&collinear).unwrap_err();
        assert_eq!(err, SolverError::DegeneratePointSet { degree: 1, num_points: 40 });

        assert_eq!(solver.num_points(), 50);
        assert_eq!(solver.preconditioner().ddm_tree().coarse_domain().num_points(), 50);

        let report = solver.solve(&values, 1e-6).unwrap();
        assert_eq!(report.status, SolveStatus::Converged);
        assert_eq!(report.weights().nrows(), 50);

        let fitted = direct_fit(&solver, &report);
        assert!((&fitted - &values).norm_max() <= 1e-6 * 1.01);
    }

    #[test]
    fn failed_tree_set_points_keeps_the_previous_points() {
        let bbox = BoundingBox3::new([-1.01; 3], [1.01; 3]);
        let kernel = CovExponential::new(1.0, 0.3).with_nugget(1e-4);
        let mut solver =
            InterpolantSolver::with_tree(kernel, 3, 0, 2, bbox, small_ddm_params()).unwrap();

        let points = generate_spherical_points(300, Some(78));
        let values = smooth_values(&points);
        solver.set_points(&points).unwrap();

        let mut outside = points.clone();
        outside[(0, 0)] = 5.0;
        let err = solver.set_points(&outside).unwrap_err();
        assert!(matches!(err, SolverError::Fmm(_)));
        assert_eq!(solver.num_points(), 300);

        let report = solver.solve(&values, 1e-4).unwrap();
        assert_eq!(report.status, SolveStatus::Converged);
        assert_eq!(report.weights().nrows(), 300);
    }

    #[test]
    fn planar_trend_on_spherical_points() {
        let points = generate_spherical_points(500, Some(76));
        let values = smooth_values(&points);

        let solver =
            InterpolantSolver::new(LinearVariogram::new(1.0), 2, 1, &points, small_ddm_params())
                .unwrap();
        assert_eq!(solver.num_polynomials(), 3);

        let report = solver.solve(&values, 1e-6).unwrap();
        assert_eq!(report.status, SolveStatus::Converged);
        assert_eq!(report.trend_coefficients().nrows(), 3);

        let fitted = direct_fit(&solver, &report);
        assert!((&fitted - &values).norm_max() <= 1e-6 * 1.01);

        let moments = solver.operator().design_matrix().transpose() * report.weights();
        assert!(moments.norm_max() < 1e-8);
    }

    #[test]
    fn end_states_map_to_statuses() {
        let cases = [
            (true, false, FgmresState::Stalled, true, SolveStatus::Converged),
            (true, true, FgmresState::Exhausted, false, SolveStatus::Converged),
            (false, true, FgmresState::Iterating, true, SolveStatus::Interrupted),
            (false, false, FgmresState::Exhausted, false, SolveStatus::MaxIterations),
            (false, false, FgmresState::Converged, false, SolveStatus::MaxIterations),
            (false, false, FgmresState::Stalled, true, SolveStatus::Stalled),
            (false, false, FgmresState::Converged, true, SolveStatus::Stalled),
        ];

        for (converged, interrupted, state, budget_left, expected) in cases {
            assert_eq!(
                solve_status(converged, interrupted, state, budget_left),
                expected,
                "{converged} {interrupted} {state:?} {budget_left}"
            );
        }
    }

    #[test]
    fn empty_point_set_gives_an_empty_solution() {
        let points = Mat::<f64>::zeros(0, 2);
        let kernel = LinearVariogram::new(1.0);
        let solver =
            InterpolantSolver::new(kernel, 2, 0, &points, SolverParams::default()).unwrap();

        let report = solver.solve(&Mat::zeros(0, 1), 1e-6).unwrap();
        assert_eq!(report.status, SolveStatus::Converged);
        assert_eq!(report.weights().nrows(), 0);
        assert_eq!(report.solution.nrows(), 1);
        assert_eq!(report.solution[(0, 0)], 0.0);

        let values = solver.evaluate(report.solution.as_ref(), &Mat::zeros(0, 2)).unwrap();
        assert_eq!(values.nrows(), 0);
    }

    #[test]
    fn value_count_mismatch_is_rejected_every_time() {
        let points = generate_random_points(50, 2, Some(71));
        let kernel = LinearVariogram::new(1.0);
        let solver =
            InterpolantSolver::new(kernel, 2, 0, &points, SolverParams::default()).unwrap();

        for _ in 0..3 {
            let err = solver.solve(&Mat::zeros(49, 1), 1e-6).unwrap_err();
            assert_eq!(err, SolverError::ValueCountMismatch { expected: 50, found: 49 });
        }

        let err = solver
            .solve_with_initial(&Mat::zeros(50, 1), 1e-6, &Mat::zeros(50, 1))
            .unwrap_err();
        assert_eq!(err, SolverError::InitialSolutionLength { expected: 51, found: 50 });
    }

    #[test]
    fn trend_degree_must_cover_the_kernel_order() {
        let points = generate_random_points(50, 3, Some(72));

        let params = SolverParams::default();

        let err = InterpolantSolver::new(LinearVariogram::new(1.0), 3, -1, &points, params)
            .unwrap_err();
        assert_eq!(err, SolverError::TrendDegreeTooLow { degree: -1, minimum: 0 });

        let err =
            InterpolantSolver::new(CubicVariogram::new(1.0), 3, 0, &points, params).unwrap_err();
        assert_eq!(err, SolverError::TrendDegreeTooLow { degree: 0, minimum: 1 });

        let err =
            InterpolantSolver::new(LinearVariogram::new(1.0), 3, 3, &points, params).unwrap_err();
        assert_eq!(err, SolverError::UnsupportedTrendDegree(3));
    }
}
