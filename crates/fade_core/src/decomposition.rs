//! Adomian decomposition series for
//! `D^a u + sum(nu_l D^b_l u) + k u + N(u) = 0`, `u(0) = u_0`.
//!
//! Term `n >= 1` is `u_n = -I^a[A_{n-1} + k u_{n-1} + sum(nu_l D^b_l u_{n-1})]`
//! where `A_m` is the Adomian polynomial of `N`. The integrand is sampled at
//! the projection nodes, projected onto the Bernstein basis, and integrated
//! either in closed form on monomials (`Scheme::Adomian`) or through the
//! Laplace domain (`Scheme::LaplaceAdomian`).
//!
//! Long horizons are covered by consecutive stages. Each stage restarts the
//! series from `u_0(t) - memory(t)`, where the memory is the fractional
//! integral of the integrands already accepted on earlier stages.

use crate::basis::{generate_basis, BernsteinBasis, Projector};
use crate::engine::SolveContext;
use crate::error::{Result, SolverError};
use crate::operational::{integral_weight, time_scale, OperationalMatrix, Variable};
use crate::params::{FractionalEquation, ScalarFunction, SolverParameters};
use crate::quadrature::GaussLegendre;
use crate::special::recip_gamma;
use crate::traits::{Solver, TransformFunction};
use crate::transform::{forward_transform, InversionRule};
use crate::types::SolutionCurve;
use anyhow::bail;
use nalgebra::DVector;
use num_complex::Complex;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DecompositionSettings {
    /// Half-width of the Chebyshev stencil used to extract Taylor coefficients of `N`.
    pub taylor_radius: f64,
    /// Lower bound on the Chebyshev interpolation degree.
    pub min_chebyshev_degree: usize,
    /// Projection node count; `max(2 * (degree + 1), 16)` when `None`.
    pub projection_nodes: Option<usize>,
    /// Largest accepted `|u_last| / max(|u_0|, 1)` for a stage.
    pub term_ratio: f64,
    /// Number of times the step may be halved before the series is declared divergent.
    pub max_splits: usize,
}

impl Default for DecompositionSettings {
    fn default() -> Self {
        Self {
            taylor_radius: 1.0,
            min_chebyshev_degree: 16,
            projection_nodes: None,
            term_ratio: 1e-3,
            max_splits: 8,
        }
    }
}

impl DecompositionSettings {
    pub fn validate(&self) -> Result<()> {
        if !(self.taylor_radius.is_finite() && self.taylor_radius > 0.0) {
            return Err(SolverError::out_of_range(
                "taylor_radius",
                self.taylor_radius,
                "(0, inf)",
            ));
        }
        if !(self.term_ratio.is_finite() && self.term_ratio > 0.0) {
            return Err(SolverError::out_of_range(
                "term_ratio",
                self.term_ratio,
                "(0, inf)",
            ));
        }
        Ok(())
    }

    /// Whether the node magnitudes `|u_0|, |u_1|, ..` of a stage describe a
    /// series that has settled. A single term always has.
    pub fn settled(&self, magnitudes: &[f64], tolerance: f64) -> bool {
        let [.., previous, last] = magnitudes else {
            return true;
        };
        if !last.is_finite() {
            return false;
        }
        if *last <= tolerance {
            return true;
        }
        let scale = magnitudes[0].max(1.0);
        last < previous && *last <= self.term_ratio * scale
    }
}

/// Chebyshev weights mapping samples of `N(c + r xi_j)` to the Taylor
/// coefficients of `N` around `c`.
#[derive(Debug, Clone)]
pub struct AdomianWeights {
    radius: f64,
    points: Vec<f64>,
    // table[k][j]: weight of sample j in the coefficient of xi^k.
    table: Vec<Vec<f64>>,
}

impl AdomianWeights {
    pub fn new(degree: usize, radius: f64) -> Self {
        let count = degree + 1;
        let cf = count as f64;
        let points = (0..count)
            .map(|j| (PI * (j as f64 + 0.5) / cf).cos())
            .collect();

        // Monomial coefficients of T_0..T_degree.
        let mut chebyshev: Vec<Vec<f64>> = Vec::with_capacity(count);
        chebyshev.push({
            let mut t0 = vec![0.0; count];
            t0[0] = 1.0;
            t0
        });
        if degree >= 1 {
            let mut t1 = vec![0.0; count];
            t1[1] = 1.0;
            chebyshev.push(t1);
        }
        for i in 2..count {
            let mut next = vec![0.0; count];
            for k in 0..count {
                if k > 0 {
                    next[k] += 2.0 * chebyshev[i - 1][k - 1];
                }
                next[k] -= chebyshev[i - 2][k];
            }
            chebyshev.push(next);
        }

        let mut table = vec![vec![0.0; count]; count];
        for (i, poly) in chebyshev.iter().enumerate() {
            let half = if i == 0 { 0.5 } else { 1.0 };
            for j in 0..count {
                let projection =
                    half * 2.0 / cf * (i as f64 * PI * (j as f64 + 0.5) / cf).cos();
                for (k, &coefficient) in poly.iter().enumerate() {
                    if coefficient != 0.0 {
                        table[k][j] += coefficient * projection;
                    }
                }
            }
        }

        Self {
            radius,
            points,
            table,
        }
    }

    /// Highest Taylor order available.
    pub fn max_order(&self) -> usize {
        self.points.len() - 1
    }

    /// `N^(k)(center) / k!` for `k = 0..=order`.
    pub fn taylor_coefficients(
        &self,
        f: &ScalarFunction,
        center: f64,
        order: usize,
    ) -> anyhow::Result<Vec<f64>> {
        if order > self.max_order() {
            bail!(
                "Taylor order {} exceeds the stencil degree {}",
                order,
                self.max_order()
            );
        }
        let samples = self
            .points
            .iter()
            .map(|xi| f.call(center + self.radius * xi))
            .collect::<anyhow::Result<Vec<f64>>>()?;
        Ok((0..=order)
            .map(|k| {
                let sum: f64 = self.table[k].iter().zip(&samples).map(|(w, s)| w * s).sum();
                sum / self.radius.powi(k as i32)
            })
            .collect())
    }
}

/// Coefficient of `L^m` in `(sum_j tail[j-1] L^j)^k` for `k = 0..=m`, with
/// `m = tail.len()`.
pub fn composition_coefficients(tail: &[f64]) -> Vec<f64> {
    let m = tail.len();
    let mut out = vec![0.0; m + 1];
    if m == 0 {
        out[0] = 1.0;
        return out;
    }
    let mut power = vec![0.0; m + 1];
    power[0] = 1.0;
    for slot in out.iter_mut().skip(1) {
        let mut next = vec![0.0; m + 1];
        for (a, &p) in power.iter().enumerate() {
            if p == 0.0 {
                continue;
            }
            for j in 1..=m - a {
                next[a + j] += p * tail[j - 1];
            }
        }
        power = next;
        *slot = power[m];
    }
    out
}

/// `A_m` for the series values `values = [v_0, .., v_m]` at one point.
pub fn adomian_polynomial(
    weights: &AdomianWeights,
    nonlinear: &ScalarFunction,
    values: &[f64],
) -> anyhow::Result<f64> {
    let Some((&base, tail)) = values.split_first() else {
        bail!("Adomian polynomial needs at least one series value");
    };
    if tail.is_empty() {
        return nonlinear.call(base);
    }
    let m = tail.len();
    let taylor = weights.taylor_coefficients(nonlinear, base, m)?;
    let compositions = composition_coefficients(tail);
    Ok((1..=m).map(|k| taylor[k] * compositions[k]).sum())
}

pub type TermFn = Arc<dyn Fn(f64) -> Result<f64> + Send + Sync>;

/// One term of the series, with its values at the projection nodes when known.
#[derive(Clone)]
pub struct SeriesTerm {
    function: TermFn,
    samples: Option<Arc<[f64]>>,
}

impl SeriesTerm {
    pub fn new(function: TermFn) -> Self {
        Self {
            function,
            samples: None,
        }
    }

    pub fn sampled(function: TermFn, samples: Vec<f64>) -> Self {
        Self {
            function,
            samples: Some(samples.into()),
        }
    }

    pub fn evaluate(&self, t: f64) -> Result<f64> {
        (self.function)(t)
    }

    pub fn samples(&self) -> Option<&[f64]> {
        self.samples.as_deref()
    }

    /// Value at projection node `q` (time `t`), from the cache when present.
    pub fn sample(&self, q: usize, t: f64) -> Result<f64> {
        match self.samples.as_ref().and_then(|s| s.get(q)) {
            Some(&value) => Ok(value),
            None => self.evaluate(t),
        }
    }

    pub fn max_abs_sample(&self) -> Option<f64> {
        self.samples()
            .map(|s| s.iter().fold(0.0_f64, |acc, v| acc.max(v.abs())))
    }
}

impl std::fmt::Debug for SeriesTerm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeriesTerm")
            .field("samples", &self.samples)
            .finish_non_exhaustive()
    }
}

/// Append-only sequence `u_0, u_1, ...`.
#[derive(Debug, Clone, Default)]
pub struct DecompositionSeries {
    terms: Vec<SeriesTerm>,
}

impl DecompositionSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, term: SeriesTerm) {
        self.terms.push(term);
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn terms(&self) -> &[SeriesTerm] {
        &self.terms
    }

    /// Partial sum at `t`.
    pub fn evaluate(&self, t: f64) -> Result<f64> {
        self.terms.iter().map(|term| term.evaluate(t)).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scheme {
    Adomian,
    LaplaceAdomian,
}

/// `-s^(-order) F(s)`: the Laplace image of `-I^order f`.
pub struct ScaledTransform<T> {
    inner: T,
    order: f64,
}

impl<T: TransformFunction> TransformFunction for ScaledTransform<T> {
    fn evaluate(&self, s: Complex<f64>) -> Result<Complex<f64>> {
        Ok(-s.powf(-self.order) * self.inner.evaluate(s)?)
    }
}

enum Integrator {
    ClosedForm,
    Laplace(Arc<InversionRule>),
}

/// Gauss–Legendre order of the memory integrals.
const MEMORY_ORDER: usize = 16;
/// Panels used when the memory kernel is close to its singularity.
const MEMORY_PANELS: usize = 8;

/// Integrand of an accepted stage, as monomial coefficients in
/// `(r - start) / length`.
#[derive(Debug, Clone)]
struct Segment {
    start: f64,
    length: f64,
    forcing: Arc<[f64]>,
}

impl Segment {
    fn forcing_at(&self, x: f64) -> f64 {
        self.forcing.iter().rev().fold(0.0, |acc, c| acc * x + c)
    }

    /// `int_start^end (t - r)^(a-1) f(r) dr` for `lag = t - end >= 0`.
    ///
    /// With `z = (t - r)^a` the kernel becomes `dz / a` and the integrand is
    /// smooth away from `lag = 0`.
    fn integrate(&self, lag: f64, alpha: f64, rule: &GaussLegendre) -> Result<f64> {
        let exponent = 1.0 / alpha;
        let lower = lag.powf(alpha);
        let upper = (lag + self.length).powf(alpha);
        let panels = if lag >= self.length { 1 } else { MEMORY_PANELS };
        let integral = rule.integrate_composite(lower, upper, panels, |z| {
            let w = (z.powf(exponent) - lag) / self.length;
            Ok(self.forcing_at(1.0 - w))
        })?;
        Ok(integral * exponent)
    }
}

/// Fractional memory `(1/Gamma(a)) int_0^start (t - r)^(a-1) f(r) dr` of the
/// stages accepted so far.
#[derive(Debug, Clone)]
struct Memory {
    alpha: f64,
    rule: Arc<GaussLegendre>,
    segments: Vec<Segment>,
}

impl Memory {
    fn new(alpha: f64) -> Result<Self> {
        Ok(Self {
            alpha,
            rule: Arc::new(GaussLegendre::new(MEMORY_ORDER)?),
            segments: Vec::new(),
        })
    }

    fn push(&mut self, start: f64, length: f64, forcing: &[f64]) {
        self.segments.push(Segment {
            start,
            length,
            forcing: forcing.into(),
        });
    }

    fn evaluate(&self, t: f64) -> Result<f64> {
        let mut total = 0.0;
        for segment in &self.segments {
            let lag = (t - segment.start - segment.length).max(0.0);
            total += segment.integrate(lag, self.alpha, &self.rule)?;
        }
        Ok(total * recip_gamma(self.alpha))
    }
}

/// `u_0(start + tau) - memory(start + tau)`, as a function of `tau`.
fn leading_term(initial: ScalarFunction, start: f64, memory: Arc<Memory>) -> TermFn {
    Arc::new(move |tau| {
        let t = start + tau;
        let value = initial
            .call(t)
            .map_err(|err| SolverError::computation(0, t, err))?
            - memory.evaluate(t)?;
        if value.is_finite() {
            Ok(value)
        } else {
            Err(SolverError::computation(0, t, "memory integral is not finite"))
        }
    })
}

/// Produces successive series terms for one equation on one window
/// `[start, start + length]`. Terms are functions of `t - start`.
pub struct DecompositionGenerator<'a> {
    ctx: &'a SolveContext,
    integrator: Integrator,
    alpha: f64,
    fractal_exponent: f64,
    start: f64,
    length: f64,
    reaction: f64,
    basis: BernsteinBasis,
    projector: Projector,
    times: Vec<f64>,
    linear: Vec<(f64, Arc<OperationalMatrix>)>,
    weights: AdomianWeights,
    leading: TermFn,
}

impl<'a> DecompositionGenerator<'a> {
    /// Generator for the whole horizon `[0, time_end]`.
    pub fn new(
        equation: &FractionalEquation,
        scheme: Scheme,
        ctx: &'a SolveContext,
    ) -> Result<Self> {
        let params = &equation.params;
        let memory = Arc::new(Memory::new(params.alpha)?);
        let leading = leading_term(params.initial_condition.clone(), 0.0, memory);
        Self::on_window(equation, scheme, ctx, 0.0, params.time_end, leading)
    }

    fn on_window(
        equation: &FractionalEquation,
        scheme: Scheme,
        ctx: &'a SolveContext,
        start: f64,
        length: f64,
        leading: TermFn,
    ) -> Result<Self> {
        let params = &equation.params;
        let settings = ctx.config().decomposition;
        settings.validate()?;
        let basis = generate_basis(params.polynomial_degree)?;
        let node_count = settings
            .projection_nodes
            .unwrap_or_else(|| (2 * basis.len()).max(16));
        let projector = Projector::new(&basis, node_count)?;
        let times = projector.nodes().iter().map(|x| x * length).collect();

        let fractal_exponent = params.fractal_exponent();
        let linear = equation
            .linear_terms
            .iter()
            .map(|term| -> Result<(f64, Arc<OperationalMatrix>)> {
                let matrix = ctx.operational_matrix(
                    Variable::Time,
                    term.order,
                    params.fractal_dimension,
                    params.polynomial_degree,
                )?;
                let scale = time_scale(term.order, fractal_exponent, length);
                Ok((term.coefficient * scale, matrix))
            })
            .collect::<Result<Vec<_>>>()?;

        let integrator = match scheme {
            Scheme::Adomian => Integrator::ClosedForm,
            Scheme::LaplaceAdomian => {
                Integrator::Laplace(Arc::new(InversionRule::new(&ctx.config().inversion)?))
            }
        };
        let stencil = settings.min_chebyshev_degree.max(params.max_terms);

        Ok(Self {
            ctx,
            integrator,
            alpha: params.alpha,
            fractal_exponent,
            start,
            length,
            reaction: equation.reaction,
            basis,
            projector,
            times,
            linear,
            weights: AdomianWeights::new(stencil, settings.taylor_radius),
            leading,
        })
    }

    /// Term `n`, reading only `series.terms()[..n]`.
    pub fn next_term(
        &self,
        series: &DecompositionSeries,
        nonlinear: &ScalarFunction,
        n: usize,
    ) -> Result<SeriesTerm> {
        self.term_and_integrand(series, nonlinear, n)
            .map(|(term, _)| term)
    }

    /// Term `n` with the monomial coefficients of the integrand it was built
    /// from (empty for the leading term).
    fn term_and_integrand(
        &self,
        series: &DecompositionSeries,
        nonlinear: &ScalarFunction,
        n: usize,
    ) -> Result<(SeriesTerm, Vec<f64>)> {
        if n > series.len() {
            return Err(SolverError::out_of_range(
                "term index",
                n as f64,
                "[0, number of generated terms]",
            ));
        }
        if n == 0 {
            return Ok((self.initial_term()?, Vec::new()));
        }
        if n - 1 > self.weights.max_order() {
            return Err(SolverError::out_of_range(
                "term index",
                n as f64,
                "[0, Chebyshev stencil degree + 1]",
            ));
        }

        let prior = &series.terms()[..n];
        let tasks: Vec<_> = self
            .times
            .iter()
            .enumerate()
            .map(|(q, &t)| {
                move || -> Result<(f64, f64)> {
                    let values = prior
                        .iter()
                        .map(|term| term.sample(q, t))
                        .collect::<Result<Vec<f64>>>()?;
                    let adomian = adomian_polynomial(&self.weights, nonlinear, &values)
                        .map_err(|err| SolverError::computation(n, self.start + t, err))?;
                    Ok((adomian, values[n - 1]))
                }
            })
            .collect();
        let (adomian, previous): (Vec<f64>, Vec<f64>) =
            self.ctx.execute(tasks)?.into_iter().unzip();

        let integrand = self.integrand(&adomian, &previous);
        if let Some(q) = integrand.iter().position(|v| !v.is_finite()) {
            return Err(SolverError::computation(
                n,
                self.start + self.times[q],
                "integrand is not finite",
            ));
        }
        let coefficients = self.projector.project(integrand.as_slice());
        let monomial = self.basis.to_monomial(coefficients.as_slice());

        let term = match &self.integrator {
            Integrator::ClosedForm => self.closed_form_term(&monomial),
            Integrator::Laplace(rule) => self.laplace_term(monomial.clone(), Arc::clone(rule))?,
        };
        Ok((term, monomial))
    }

    /// Generates up to `max_terms` terms, stopping after the first term
    /// `n >= 1` whose node magnitude is within `tolerance`.
    fn expand(
        &self,
        nonlinear: &ScalarFunction,
        max_terms: usize,
        tolerance: f64,
    ) -> Result<Stage> {
        let mut series = DecompositionSeries::new();
        let mut term_magnitudes = Vec::with_capacity(max_terms);
        let mut forcing: Vec<f64> = Vec::new();
        for n in 0..max_terms {
            let (term, integrand) = self.term_and_integrand(&series, nonlinear, n)?;
            let magnitude = term.max_abs_sample().unwrap_or(f64::INFINITY);
            if forcing.len() < integrand.len() {
                forcing.resize(integrand.len(), 0.0);
            }
            for (sum, c) in forcing.iter_mut().zip(&integrand) {
                *sum += c;
            }
            series.push(term);
            term_magnitudes.push(magnitude);
            log::debug!(
                "[{}, {}]: term {} max |u_n| = {:e}",
                self.start,
                self.start + self.length,
                n,
                magnitude
            );
            if n > 0 && magnitude <= tolerance {
                break;
            }
        }
        Ok(Stage {
            start: self.start,
            length: self.length,
            term_magnitudes,
            series,
            forcing,
        })
    }

    fn initial_term(&self) -> Result<SeriesTerm> {
        let function = Arc::clone(&self.leading);
        let tasks: Vec<_> = self
            .times
            .iter()
            .map(|&t| {
                let function = &function;
                move || function(t)
            })
            .collect();
        let samples = self.ctx.execute(tasks)?;
        Ok(SeriesTerm::sampled(function, samples))
    }

    /// `A + k u_prev + sum(nu_l D^b_l u_prev)` at the nodes.
    fn integrand(&self, adomian: &[f64], previous: &[f64]) -> DVector<f64> {
        let mut integrand = DVector::from_column_slice(adomian);
        integrand.axpy(self.reaction, &DVector::from_column_slice(previous), 1.0);
        if !self.linear.is_empty() {
            let coefficients = self.projector.project(previous);
            for (scale, matrix) in &self.linear {
                let derivative = self
                    .projector
                    .evaluate_at_nodes(&matrix.apply(&coefficients));
                integrand.axpy(*scale, &derivative, 1.0);
            }
        }
        integrand
    }

    fn closed_form_term(&self, monomial: &[f64]) -> SeriesTerm {
        let offset = self.alpha + self.fractal_exponent - 1.0;
        let scale = -self.length.powf(offset);
        let coefficients: Vec<f64> = monomial
            .iter()
            .enumerate()
            .map(|(k, a)| scale * a * integral_weight(self.alpha, self.fractal_exponent, k))
            .collect();
        let length = self.length;
        let evaluate = move |t: f64| -> f64 {
            if t <= 0.0 {
                return 0.0;
            }
            let x = t / length;
            coefficients
                .iter()
                .enumerate()
                .map(|(k, c)| c * x.powf(k as f64 + offset))
                .sum()
        };
        let samples = self.times.iter().map(|&t| evaluate(t)).collect();
        SeriesTerm::sampled(Arc::new(move |t| Ok(evaluate(t))), samples)
    }

    fn laplace_term(&self, monomial: Vec<f64>, rule: Arc<InversionRule>) -> Result<SeriesTerm> {
        let length = self.length;
        let polynomial = move |t: f64| -> Result<f64> {
            let x = t / length;
            Ok(monomial.iter().rev().fold(0.0, |acc, a| acc * x + a))
        };
        let transform = Arc::new(ScaledTransform {
            inner: forward_transform(polynomial, self.ctx.config().quadrature)?,
            order: self.alpha,
        });
        let function: TermFn = Arc::new(move |t| {
            if t <= 0.0 {
                Ok(0.0)
            } else {
                rule.invert(transform.as_ref(), t)
            }
        });
        let tasks: Vec<_> = self
            .times
            .iter()
            .map(|&t| {
                let function = &function;
                move || function(t)
            })
            .collect();
        let samples = self.ctx.execute(tasks)?;
        Ok(SeriesTerm::sampled(function, samples))
    }
}

/// Series accepted on `[start, start + length]`, in the local time `t - start`.
#[derive(Debug, Clone)]
pub struct Stage {
    pub start: f64,
    pub length: f64,
    /// Largest node magnitude of each generated term.
    pub term_magnitudes: Vec<f64>,
    series: DecompositionSeries,
    // Summed integrand of terms 1.., in (t - start) / length.
    forcing: Vec<f64>,
}

impl Stage {
    pub fn end(&self) -> f64 {
        self.start + self.length
    }

    pub fn series(&self) -> &DecompositionSeries {
        &self.series
    }

    pub fn evaluate(&self, t: f64) -> Result<f64> {
        self.series.evaluate((t - self.start).max(0.0))
    }
}

/// Consecutive stages covering `[0, time_end]`.
#[derive(Debug, Clone, Default)]
pub struct StagedSeries {
    stages: Vec<Stage>,
}

impl StagedSeries {
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Value at `t`, from the stage with `start < t <= end` (the first one at `t = 0`).
    pub fn evaluate(&self, t: f64) -> Result<f64> {
        let index = self.stages.partition_point(|stage| stage.end() < t);
        match self.stages.get(index).or(self.stages.last()) {
            Some(stage) => stage.evaluate(t),
            None => Err(SolverError::computation(0, t, "no stage covers this time")),
        }
    }
}

/// Outcome of a decomposition solve.
#[derive(Debug, Clone)]
pub struct DecompositionReport {
    pub curve: SolutionCurve,
    pub series: StagedSeries,
}

/// Decomposition solver for the `adomian` and `laplace-adomian` methods.
///
/// A series whose terms stop shrinking is discarded and the step halved;
/// later stages start from the solution at the end of the previous one plus
/// the fractional memory of everything before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdomianSolver {
    scheme: Scheme,
}

impl AdomianSolver {
    pub fn new(scheme: Scheme) -> Self {
        Self { scheme }
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// Scheme-specific restrictions on top of the parameter domain.
    pub fn check_domain(&self, params: &SolverParameters) -> Result<()> {
        let lift = params.alpha + params.fractal_dimension - 2.0;
        if !(lift > 0.0) {
            return Err(SolverError::out_of_range(
                "alpha + fractal_dimension - 2",
                lift,
                "(0, inf)",
            ));
        }
        if self.scheme == Scheme::LaplaceAdomian && params.fractal_dimension != 2.0 {
            return Err(SolverError::out_of_range(
                "fractal_dimension",
                params.fractal_dimension,
                "{2} for the Laplace scheme",
            ));
        }
        Ok(())
    }

    /// Covers `[0, time_end]` with settled series.
    ///
    /// Splitting needs a memory term for every operator in the equation, so it
    /// is only available for the plain Caputo form without linear terms.
    pub fn expand(&self, equation: &FractionalEquation, ctx: &SolveContext) -> Result<StagedSeries> {
        let params = &equation.params;
        let settings = ctx.config().decomposition;
        settings.validate()?;
        let time_end = params.time_end;
        let splittable = params.fractal_dimension == 2.0 && equation.linear_terms.is_empty();

        let mut memory = Memory::new(params.alpha)?;
        let mut stages = Vec::new();
        let mut start = 0.0;
        let mut step = time_end;
        let mut splits = 0;
        while start < time_end {
            let remaining = time_end - start;
            let last = remaining - step <= 1e-9 * time_end;
            let length = if last { remaining } else { step };
            let leading = leading_term(
                params.initial_condition.clone(),
                start,
                Arc::new(memory.clone()),
            );
            let generator =
                DecompositionGenerator::on_window(equation, self.scheme, ctx, start, length, leading)?;
            let stage = generator.expand(&params.nonlinear_term, params.max_terms, params.tolerance)?;

            if !settings.settled(&stage.term_magnitudes, params.tolerance) {
                let magnitude = stage.term_magnitudes.last().copied().unwrap_or(f64::NAN);
                if !splittable || splits >= settings.max_splits {
                    return Err(SolverError::SeriesDivergence {
                        start,
                        end: start + length,
                        magnitude,
                    });
                }
                splits += 1;
                step = length / 2.0;
                log::debug!(
                    "{}: series on [{}, {}] not settled (last term {:e}), step {}",
                    self.name(),
                    start,
                    start + length,
                    magnitude,
                    step
                );
                continue;
            }

            memory.push(start, length, &stage.forcing);
            start = if last { time_end } else { start + length };
            stages.push(stage);
        }
        Ok(StagedSeries { stages })
    }

    pub fn run(&self, equation: &FractionalEquation, ctx: &SolveContext) -> Result<DecompositionReport> {
        equation.validate()?;
        let params = &equation.params;
        self.check_domain(params)?;

        let series = self.expand(equation, ctx)?;
        let grid = SolutionCurve::grid(params.time_end, params.time_steps);
        let tasks: Vec<_> = grid
            .iter()
            .map(|&t| {
                let series = &series;
                move || series.evaluate(t)
            })
            .collect();
        let curve = SolutionCurve::from_values(params.time_end, ctx.execute(tasks)?);
        log::info!(
            "{}: summed {} stage(s) on {} samples",
            self.name(),
            series.stages().len(),
            curve.len()
        );
        Ok(DecompositionReport { curve, series })
    }
}

impl Solver for AdomianSolver {
    fn name(&self) -> &'static str {
        match self.scheme {
            Scheme::Adomian => "adomian",
            Scheme::LaplaceAdomian => "laplace-adomian",
        }
    }

    fn solve(&self, equation: &FractionalEquation, ctx: &SolveContext) -> Result<SolutionCurve> {
        self.run(equation, ctx).map(|report| report.curve)
    }
}
