//! Iterative perturbation solver (MHPM) on a Bernstein collocation grid.
//!
//! The linear part of the equation is collocated once at `x_i = i / degree`:
//! `A = s_a Phi M_a^T + sum(nu_l s_l Phi M_l^T) + k Phi` with `Phi_ij = B_j(x_i)`,
//! row 0 replaced by the initial condition. Each iteration solves
//! `A c_new = -N(u_old)` and stops once `max |c_new - c_old| <= tolerance`.

use crate::basis::{generate_basis, BernsteinBasis};
use crate::engine::SolveContext;
use crate::error::{Result, SolverError};
use crate::operational::{time_scale, Variable};
use crate::params::FractionalEquation;
use crate::traits::Solver;
use crate::types::SolutionCurve;
use nalgebra::linalg::LU;
use nalgebra::{DMatrix, DVector, Dyn};
use serde::Serialize;

/// Relative pivot size below which the collocation matrix counts as singular.
const PIVOT_TOLERANCE: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MhpmPhase {
    Initialized,
    Iterating,
    Converged,
    Exhausted,
    Failed,
}

impl MhpmPhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            MhpmPhase::Converged | MhpmPhase::Exhausted | MhpmPhase::Failed
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConvergenceState {
    pub coefficients: DVector<f64>,
    pub iteration: usize,
    pub error: f64,
}

impl ConvergenceState {
    fn new(len: usize) -> Self {
        Self {
            coefficients: DVector::zeros(len),
            iteration: 0,
            error: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MhpmReport {
    pub curve: SolutionCurve,
    pub coefficients: Vec<f64>,
    pub iterations: usize,
    pub error_history: Vec<f64>,
    pub phase: MhpmPhase,
}

/// One MHPM solve, advanced with [`MhpmIteration::step`].
pub struct MhpmIteration<'a> {
    equation: &'a FractionalEquation,
    ctx: &'a SolveContext,
    basis: BernsteinBasis,
    collocation: Vec<f64>,
    system: Option<LU<f64, Dyn, Dyn>>,
    initial_value: f64,
    state: ConvergenceState,
    phase: MhpmPhase,
    error_history: Vec<f64>,
}

impl<'a> MhpmIteration<'a> {
    pub fn new(equation: &'a FractionalEquation, ctx: &'a SolveContext) -> Result<Self> {
        equation.validate()?;
        let params = &equation.params;
        let degree = params.polynomial_degree;
        if degree == 0 {
            return Err(SolverError::out_of_range(
                "polynomial_degree",
                0.0,
                "[1, 20] for mhpm",
            ));
        }
        let initial_value = params
            .initial_condition
            .call(0.0)
            .map_err(|err| SolverError::computation(0, 0.0, err))?;

        let basis = generate_basis(degree)?;
        let collocation: Vec<f64> = (0..=degree).map(|i| i as f64 / degree as f64).collect();
        let phi = basis.collocation_matrix(&collocation);
        let matrix = collocation_system(equation, ctx, &phi)?;
        let system = factor(matrix);
        if system.is_none() {
            log::warn!("mhpm: collocation matrix is singular");
        }

        Ok(Self {
            equation,
            ctx,
            state: ConvergenceState::new(basis.len()),
            basis,
            collocation,
            system,
            initial_value,
            phase: MhpmPhase::Initialized,
            error_history: Vec::new(),
        })
    }

    pub fn phase(&self) -> MhpmPhase {
        self.phase
    }

    pub fn state(&self) -> &ConvergenceState {
        &self.state
    }

    pub fn error_history(&self) -> &[f64] {
        &self.error_history
    }

    /// Runs one iteration; a no-op once the phase is terminal.
    pub fn step(&mut self) -> Result<MhpmPhase> {
        if self.phase.is_terminal() {
            return Ok(self.phase);
        }
        self.phase = MhpmPhase::Iterating;
        match self.advance() {
            Ok(phase) => {
                self.phase = phase;
                Ok(phase)
            }
            Err(err) => {
                self.phase = MhpmPhase::Failed;
                Err(err)
            }
        }
    }

    fn advance(&mut self) -> Result<MhpmPhase> {
        let params = &self.equation.params;
        let iteration = self.state.iteration + 1;
        let Some(system) = &self.system else {
            return Err(SolverError::SingularSystem { iteration });
        };

        let basis = &self.basis;
        let coefficients = &self.state.coefficients;
        let nonlinear = &params.nonlinear_term;
        let time_end = params.time_end;
        let tasks: Vec<_> = self
            .collocation
            .iter()
            .map(|&x| {
                move || -> Result<f64> {
                    let previous = basis.evaluate_expansion(coefficients.as_slice(), x);
                    let value = nonlinear
                        .call(previous)
                        .map_err(|err| SolverError::computation(iteration, x * time_end, err))?;
                    Ok(-value)
                }
            })
            .collect();
        let mut rhs = DVector::from_vec(self.ctx.execute(tasks)?);
        rhs[0] = self.initial_value;

        let next = system
            .solve(&rhs)
            .ok_or(SolverError::SingularSystem { iteration })?;
        if next.iter().any(|c| !c.is_finite()) {
            return Err(SolverError::computation(
                iteration,
                0.0,
                "collocation solve produced non-finite coefficients",
            ));
        }
        let error = (&next - &self.state.coefficients).amax();

        self.state.coefficients = next;
        self.state.iteration = iteration;
        self.state.error = error;
        self.error_history.push(error);
        log::debug!("mhpm iteration {}: error {:e}", iteration, error);

        Ok(if error <= params.tolerance {
            MhpmPhase::Converged
        } else if iteration >= params.max_iterations {
            MhpmPhase::Exhausted
        } else {
            MhpmPhase::Iterating
        })
    }

    /// Iterates to a terminal phase. Exhaustion is reported in the phase, not
    /// as an error.
    pub fn run(mut self) -> Result<MhpmReport> {
        while !self.phase.is_terminal() {
            self.step()?;
        }
        let curve = self.curve()?;
        log::info!(
            "mhpm: {:?} after {} iterations (error {:e})",
            self.phase,
            self.state.iteration,
            self.state.error
        );
        Ok(MhpmReport {
            curve,
            coefficients: self.state.coefficients.iter().copied().collect(),
            iterations: self.state.iteration,
            error_history: self.error_history,
            phase: self.phase,
        })
    }

    /// `sum_k c_k B_k(t / time_end)` on the output grid.
    pub fn curve(&self) -> Result<SolutionCurve> {
        let params = &self.equation.params;
        let time_end = params.time_end;
        let basis = &self.basis;
        let coefficients = self.state.coefficients.as_slice();
        let tasks: Vec<_> = SolutionCurve::grid(time_end, params.time_steps)
            .into_iter()
            .map(|t| move || Ok(basis.evaluate_expansion(coefficients, t / time_end)))
            .collect();
        let values = self.ctx.execute(tasks)?;
        Ok(SolutionCurve::from_values(time_end, values))
    }
}

fn collocation_system(
    equation: &FractionalEquation,
    ctx: &SolveContext,
    phi: &DMatrix<f64>,
) -> Result<DMatrix<f64>> {
    let params = &equation.params;
    let degree = params.polynomial_degree;
    let fractal_exponent = params.fractal_exponent();
    let derivative = |order: f64, coefficient: f64| -> Result<DMatrix<f64>> {
        let matrix =
            ctx.operational_matrix(Variable::Time, order, params.fractal_dimension, degree)?;
        let scale = coefficient * time_scale(order, fractal_exponent, params.time_end);
        Ok(phi * matrix.matrix().transpose() * scale)
    };

    let mut system = derivative(params.alpha, 1.0)?;
    for term in &equation.linear_terms {
        system += derivative(term.order, term.coefficient)?;
    }
    system += phi * equation.reaction;
    system.set_row(0, &phi.row(0));
    Ok(system)
}

fn factor(matrix: DMatrix<f64>) -> Option<LU<f64, Dyn, Dyn>> {
    let scale = matrix.amax();
    let lu = matrix.lu();
    let smallest_pivot = lu
        .u()
        .diagonal()
        .iter()
        .fold(f64::INFINITY, |acc, p| acc.min(p.abs()));
    (scale > 0.0 && smallest_pivot > PIVOT_TOLERANCE * scale).then_some(lu)
}

/// Solver for the `mhpm` method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MhpmSolver;

impl MhpmSolver {
    pub fn run(&self, equation: &FractionalEquation, ctx: &SolveContext) -> Result<MhpmReport> {
        MhpmIteration::new(equation, ctx)?.run()
    }
}

impl Solver for MhpmSolver {
    fn name(&self) -> &'static str {
        "mhpm"
    }

    fn solve(&self, equation: &FractionalEquation, ctx: &SolveContext) -> Result<SolutionCurve> {
        let report = self.run(equation, ctx)?;
        match report.phase {
            MhpmPhase::Converged => Ok(report.curve),
            _ => Err(SolverError::ConvergenceExhausted {
                iterations: report.iterations,
                error: report.error_history.last().copied().unwrap_or(f64::INFINITY),
                tolerance: equation.params.tolerance,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::params::{ScalarFunction, SolverParameters};

    fn equation(alpha: f64, nonlinear: ScalarFunction, degree: usize) -> FractionalEquation {
        let mut params = SolverParameters::new(ScalarFunction::constant(1.0), nonlinear);
        params.alpha = alpha;
        params.polynomial_degree = degree;
        params.time_steps = 20;
        FractionalEquation::new(params)
    }

    #[test]
    fn starts_initialized_with_zero_coefficients() {
        let ctx = SolveContext::default();
        let eq = equation(0.8, ScalarFunction::new("sin", f64::sin), 5);
        let machine = MhpmIteration::new(&eq, &ctx).expect("machine");
        assert_eq!(machine.phase(), MhpmPhase::Initialized);
        assert_eq!(machine.state().iteration, 0);
        assert_eq!(machine.state().coefficients, DVector::zeros(6));
    }

    #[test]
    fn linear_contraction_decreases_error_monotonically() {
        let ctx = SolveContext::default();
        let eq = equation(0.8, ScalarFunction::new("0.1u", |u| 0.1 * u), 4);
        let report = MhpmSolver.run(&eq, &ctx).expect("run");
        assert_eq!(report.phase, MhpmPhase::Converged);
        assert!(report.error_history.len() >= 2);
        for pair in report.error_history.windows(2) {
            assert!(pair[1] < pair[0], "{:?}", report.error_history);
        }
        assert!(report.error_history.last().copied().unwrap_or(1.0) <= 1e-6);
    }

    #[test]
    fn reproduces_exponential_decay_for_first_order_equation() {
        let ctx = SolveContext::default();
        let eq = equation(1.0, ScalarFunction::new("u", |u| u), 8);
        let curve = MhpmSolver.solve(&eq, &ctx).expect("solve");
        assert_eq!(curve.len(), 21);
        for sample in curve.samples() {
            let exact = (-sample.x).exp();
            assert!((sample.y - exact).abs() < 1e-4, "t {}: {}", sample.x, sample.y);
        }
    }

    #[test]
    fn exhaustion_is_reported_with_history() {
        let ctx = SolveContext::default();
        let mut eq = equation(0.9, ScalarFunction::new("sin", f64::sin), 5);
        eq.params.max_iterations = 2;
        eq.params.tolerance = 1e-14;
        let report = MhpmSolver.run(&eq, &ctx).expect("run");
        assert_eq!(report.phase, MhpmPhase::Exhausted);
        assert_eq!(report.iterations, 2);
        assert_eq!(report.error_history.len(), 2);

        let err = MhpmSolver.solve(&eq, &ctx).expect_err("exhausted");
        assert_eq!(err.kind(), ErrorKind::ConvergenceExhausted);
        assert!(matches!(
            err,
            SolverError::ConvergenceExhausted { iterations: 2, .. }
        ));
    }

    #[test]
    fn singular_collocation_matrix_fails_the_machine() {
        // u' - u = 0 at degree 1: the collocated operator loses rank.
        let ctx = SolveContext::default();
        let eq = equation(1.0, ScalarFunction::constant(0.0), 1).with_reaction(-1.0);
        let mut machine = MhpmIteration::new(&eq, &ctx).expect("machine");
        let err = machine.step().expect_err("singular");
        assert_eq!(err, SolverError::SingularSystem { iteration: 1 });
        assert_eq!(err.kind(), ErrorKind::ComputationError);
        assert_eq!(machine.phase(), MhpmPhase::Failed);
        assert_eq!(machine.step().expect("terminal"), MhpmPhase::Failed);
    }

    #[test]
    fn requires_a_non_constant_basis() {
        let ctx = SolveContext::default();
        let eq = equation(0.5, ScalarFunction::new("sin", f64::sin), 0);
        let err = MhpmSolver.solve(&eq, &ctx).expect_err("degree 0");
        assert_eq!(err.kind(), ErrorKind::ParameterRangeError);
        assert_eq!(ctx.tasks_dispatched(), 0);
    }
}
