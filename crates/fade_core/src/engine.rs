//! Request-level entry points: configuration, the per-request context and the
//! model / method registry.

use crate::decomposition::{AdomianSolver, DecompositionSettings, Scheme};
use crate::error::{ErrorKind, Result, SolverError};
use crate::executor::{CancellationToken, Executor, ExecutorConfig};
use crate::mhpm::MhpmSolver;
use crate::operational::{OperationalCache, OperationalMatrix, Variable};
use crate::params::{FractionalEquation, ScalarFunction, SolverParameters};
use crate::traits::Solver;
use crate::transform::{InversionSettings, QuadratureSettings};
use crate::types::SolutionCurve;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    pub executor: ExecutorConfig,
    pub quadrature: QuadratureSettings,
    pub inversion: InversionSettings,
    pub decomposition: DecompositionSettings,
}

/// State owned by one solve request.
///
/// Holds a handle on the executor, the configuration, the operational matrix
/// cache and dispatch counters. Dropping the context releases the executor
/// handle; nothing process-wide is mutated.
#[derive(Debug)]
pub struct SolveContext {
    executor: Arc<Executor>,
    config: EngineConfig,
    matrices: OperationalCache,
    cancellation: Option<CancellationToken>,
    tasks_dispatched: AtomicUsize,
    batches_dispatched: AtomicUsize,
}

impl SolveContext {
    /// Uses the shared executor unless `config.executor` asks for a dedicated one.
    pub fn new(config: EngineConfig) -> Self {
        let executor = if config.executor == ExecutorConfig::default() {
            Executor::shared()
        } else {
            Arc::new(Executor::new(&config.executor))
        };
        Self::with_executor(executor, config)
    }

    pub fn with_executor(executor: Arc<Executor>, config: EngineConfig) -> Self {
        Self {
            executor,
            config,
            matrices: OperationalCache::new(),
            cancellation: None,
            tasks_dispatched: AtomicUsize::new(0),
            batches_dispatched: AtomicUsize::new(0),
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    pub fn operational_matrix(
        &self,
        variable: Variable,
        order: f64,
        fractal_dimension: f64,
        degree: usize,
    ) -> Result<Arc<OperationalMatrix>> {
        self.matrices
            .get_or_build(variable, order, fractal_dimension, degree)
    }

    pub fn cached_matrices(&self) -> usize {
        self.matrices.len()
    }

    /// Runs a batch on the executor, honouring the request's cancellation token.
    pub fn execute<T, F>(&self, tasks: Vec<F>) -> Result<Vec<T>>
    where
        T: Send,
        F: FnOnce() -> Result<T> + Send,
    {
        self.tasks_dispatched
            .fetch_add(tasks.len(), Ordering::Relaxed);
        self.batches_dispatched.fetch_add(1, Ordering::Relaxed);
        self.executor
            .execute_tasks_with_cancellation(tasks, self.cancellation.as_ref())
    }

    pub fn tasks_dispatched(&self) -> usize {
        self.tasks_dispatched.load(Ordering::Relaxed)
    }

    pub fn batches_dispatched(&self) -> usize {
        self.batches_dispatched.load(Ordering::Relaxed)
    }
}

impl Default for SolveContext {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

/// Supported equations, in the canonical form
/// `D^a u + sum(nu_l D^b_l u) + k u + N(u) = 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Model {
    /// `D^a u + N(u) = 0`
    SineGordon,
    /// `D^a u + D^b u + u + N(u) = 0`
    AdvectionDiffusionReaction,
    /// `D^a u + D^g u + N(u) = 0`
    Schrodinger,
}

impl Model {
    pub fn name(self) -> &'static str {
        match self {
            Model::SineGordon => "sine-gordon",
            Model::AdvectionDiffusionReaction => "advection-diffusion-reaction",
            Model::Schrodinger => "schrodinger",
        }
    }

    /// Nonlinear term used when a request does not supply one.
    pub fn default_nonlinear_term(self) -> &'static str {
        match self {
            Model::SineGordon => "sin(u)",
            Model::AdvectionDiffusionReaction => "u^2",
            Model::Schrodinger => "u^3",
        }
    }

    pub fn equation(self, params: SolverParameters) -> FractionalEquation {
        match self {
            Model::SineGordon => FractionalEquation::new(params),
            Model::AdvectionDiffusionReaction => {
                let beta = params.beta();
                FractionalEquation::new(params)
                    .with_linear_term(1.0, beta)
                    .with_reaction(1.0)
            }
            Model::Schrodinger => {
                let gamma = params.gamma();
                FractionalEquation::new(params).with_linear_term(1.0, gamma)
            }
        }
    }
}

impl FromStr for Model {
    type Err = SolverError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sine-gordon" | "sine_gordon" => Ok(Model::SineGordon),
            "advection-diffusion-reaction" | "advection_diffusion_reaction" | "adr" => {
                Ok(Model::AdvectionDiffusionReaction)
            }
            "schrodinger" | "nls" => Ok(Model::Schrodinger),
            _ => Err(SolverError::UnknownSelector {
                selector: "model",
                name: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Method {
    Adomian,
    LaplaceAdomian,
    Mhpm,
}

impl Method {
    pub fn name(self) -> &'static str {
        match self {
            Method::Adomian => "adomian",
            Method::LaplaceAdomian => "laplace-adomian",
            Method::Mhpm => "mhpm",
        }
    }

    pub fn solve(self, equation: &FractionalEquation, ctx: &SolveContext) -> Result<SolutionCurve> {
        match self {
            Method::Adomian => AdomianSolver::new(Scheme::Adomian).solve(equation, ctx),
            Method::LaplaceAdomian => {
                AdomianSolver::new(Scheme::LaplaceAdomian).solve(equation, ctx)
            }
            Method::Mhpm => MhpmSolver.solve(equation, ctx),
        }
    }
}

impl FromStr for Method {
    type Err = SolverError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "adomian" | "adm" => Ok(Method::Adomian),
            "laplace-adomian" | "laplace_adomian" | "ladm" => Ok(Method::LaplaceAdomian),
            "mhpm" => Ok(Method::Mhpm),
            _ => Err(SolverError::UnknownSelector {
                selector: "method",
                name: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Solves `model` with `method`; parameters are validated before any work.
pub fn solve(
    model: Model,
    method: Method,
    params: SolverParameters,
    ctx: &SolveContext,
) -> Result<SolutionCurve> {
    let equation = model.equation(params);
    equation.validate()?;
    method.solve(&equation, ctx)
}

/// Request bag accepted from collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolveRequest {
    pub model: String,
    pub method: String,
    pub alpha: f64,
    pub beta: Option<f64>,
    pub gamma: Option<f64>,
    pub fractal_dimension: Option<f64>,
    pub polynomial_degree: Option<usize>,
    pub max_terms: Option<usize>,
    pub max_iterations: Option<usize>,
    pub tolerance: Option<f64>,
    pub time_steps: usize,
    pub time_end: f64,
    /// Expression in `t`.
    pub initial_condition: String,
    /// Expression in `u` (or `y`); the model default when absent.
    pub nonlinear_term: Option<String>,
}

impl SolveRequest {
    /// Resolves selectors and compiles the callbacks.
    pub fn resolve(&self) -> Result<(Model, Method, SolverParameters)> {
        let model: Model = self.model.parse()?;
        let method: Method = self.method.parse()?;
        let initial_condition = ScalarFunction::parse(&self.initial_condition, &["t", "x"])?;
        let nonlinear_source = self
            .nonlinear_term
            .as_deref()
            .unwrap_or(model.default_nonlinear_term());
        let nonlinear_term = ScalarFunction::parse(nonlinear_source, &["u", "y"])?;

        let mut params = SolverParameters::new(initial_condition, nonlinear_term);
        params.alpha = self.alpha;
        params.beta = self.beta;
        params.gamma = self.gamma;
        params.time_steps = self.time_steps;
        params.time_end = self.time_end;
        if let Some(dimension) = self.fractal_dimension {
            params.fractal_dimension = dimension;
        }
        if let Some(degree) = self.polynomial_degree {
            params.polynomial_degree = degree;
        }
        if let Some(terms) = self.max_terms {
            params.max_terms = terms;
        }
        if let Some(iterations) = self.max_iterations {
            params.max_iterations = iterations;
        }
        if let Some(tolerance) = self.tolerance {
            params.tolerance = tolerance;
        }
        Ok((model, method, params))
    }
}

/// Success is the bare sample array; failures carry the error kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SolveResponse {
    Success(SolutionCurve),
    Failure {
        success: bool,
        kind: ErrorKind,
        message: String,
    },
}

impl SolveResponse {
    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        SolveResponse::Failure {
            success: false,
            kind,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, SolveResponse::Success(_))
    }
}

/// Failures are classified by their root cause; the message keeps the
/// executor context.
impl From<Result<SolutionCurve>> for SolveResponse {
    fn from(result: Result<SolutionCurve>) -> Self {
        match result {
            Ok(curve) => SolveResponse::Success(curve),
            Err(err) => SolveResponse::failure(err.root_cause().kind(), err.to_string()),
        }
    }
}

pub fn solve_request(request: &SolveRequest, ctx: &SolveContext) -> Result<SolutionCurve> {
    let (model, method, params) = request.resolve()?;
    log::info!(
        "solving {} with {} (alpha {}, {} steps to t = {})",
        model,
        method,
        params.alpha,
        params.time_steps,
        params.time_end
    );
    solve(model, method, params, ctx)
}

pub fn handle_request(request: &SolveRequest, ctx: &SolveContext) -> SolveResponse {
    let result = solve_request(request, ctx);
    if let Err(err) = &result {
        log::warn!("{} request failed: {}", err.root_cause().kind().as_str(), err);
    }
    result.into()
}
