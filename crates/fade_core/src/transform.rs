//! Laplace transform pair.
//!
//! The forward transform integrates `e^{-st} f(t)` with composite
//! Gauss–Legendre quadrature. Every inversion rule shares the weighted-sum
//! form `f(t) = (1/t) sum_k Re(w_k F(a_k / t))`, with nodes and weights built
//! once per rule.

use crate::combinatorics::CombinatorialTable;
use crate::error::{Result, SolverError};
use crate::quadrature::GaussLegendre;
use crate::traits::TransformFunction;
use num_complex::Complex;
use serde::{Deserialize, Serialize};
use std::f64::consts::{LN_10, LN_2, PI};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct QuadratureSettings {
    /// Gauss–Legendre points per panel.
    pub order: usize,
    /// Integration cut-off; derived from the kernel decay when `None`.
    pub upper_bound: Option<f64>,
    /// Exponential growth rate of `f`; the transform exists for `Re s > growth_rate`.
    pub growth_rate: f64,
    /// Kernel decay `(Re s - growth_rate) * U` at the default cut-off.
    pub tail_exponent: f64,
    pub min_panels: usize,
    pub max_panels: usize,
}

impl Default for QuadratureSettings {
    fn default() -> Self {
        Self {
            order: 16,
            upper_bound: None,
            growth_rate: 0.0,
            tail_exponent: 36.0,
            min_panels: 8,
            max_panels: 4096,
        }
    }
}

/// Numerical Laplace transform of a real function.
pub struct LaplaceTransform<F> {
    f: F,
    settings: QuadratureSettings,
    rule: GaussLegendre,
}

pub fn forward_transform<F>(f: F, settings: QuadratureSettings) -> Result<LaplaceTransform<F>>
where
    F: Fn(f64) -> Result<f64> + Send + Sync,
{
    LaplaceTransform::new(f, settings)
}

impl<F> LaplaceTransform<F>
where
    F: Fn(f64) -> Result<f64> + Send + Sync,
{
    pub fn new(f: F, settings: QuadratureSettings) -> Result<Self> {
        if settings.min_panels == 0 || settings.max_panels < settings.min_panels {
            return Err(SolverError::out_of_range(
                "max_panels",
                settings.max_panels as f64,
                "[min_panels, inf) with min_panels >= 1",
            ));
        }
        if !(settings.tail_exponent.is_finite() && settings.tail_exponent > 0.0) {
            return Err(SolverError::out_of_range(
                "tail_exponent",
                settings.tail_exponent,
                "(0, inf)",
            ));
        }
        if let Some(upper) = settings.upper_bound {
            if !(upper.is_finite() && upper > 0.0) {
                return Err(SolverError::out_of_range("upper_bound", upper, "(0, inf)"));
            }
        }
        let rule = GaussLegendre::new(settings.order)?;
        Ok(Self { f, settings, rule })
    }

    pub fn settings(&self) -> &QuadratureSettings {
        &self.settings
    }
}

impl<F> TransformFunction for LaplaceTransform<F>
where
    F: Fn(f64) -> Result<f64> + Send + Sync,
{
    fn evaluate(&self, s: Complex<f64>) -> Result<Complex<f64>> {
        let decay = s.re - self.settings.growth_rate;
        if !(decay > 0.0) || !s.im.is_finite() {
            return Err(SolverError::TransformDomain {
                re: s.re,
                im: s.im,
                growth_rate: self.settings.growth_rate,
            });
        }
        let upper = self
            .settings
            .upper_bound
            .unwrap_or(self.settings.tail_exponent / decay);
        // Resolve both the oscillation of e^{-i Im(s) t} and the decay rate.
        let panels = (upper * (s.im.abs() + decay) / PI).ceil();
        let panels = if panels.is_finite() {
            (panels as usize).clamp(self.settings.min_panels, self.settings.max_panels)
        } else {
            self.settings.max_panels
        };
        self.rule
            .integrate_composite(0.0, upper, panels, |t| Ok((-s * t).exp() * (self.f)(t)?))
    }
}

/// A transform known in closed form.
pub struct ClosedForm<F>(pub F);

impl<F> TransformFunction for ClosedForm<F>
where
    F: Fn(Complex<f64>) -> Complex<f64> + Send + Sync,
{
    fn evaluate(&self, s: Complex<f64>) -> Result<Complex<f64>> {
        Ok((self.0)(s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InversionScheme {
    /// Gaver–Stehfest; real-axis evaluations only.
    Stehfest,
    /// Fixed Talbot contour; needs `F` analytic in the left half plane, so it
    /// suits closed-form transforms but not numerical forward transforms.
    Talbot,
    /// Bromwich line with Euler summation; keeps `Re s > 0`.
    #[default]
    Euler,
}

impl InversionScheme {
    pub fn default_nodes(self) -> usize {
        match self {
            InversionScheme::Stehfest => 14,
            InversionScheme::Talbot | InversionScheme::Euler => 24,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InversionSettings {
    pub scheme: InversionScheme,
    /// Node count; the scheme's default when `None`.
    pub nodes: Option<usize>,
    /// Largest tolerated rounding noise in the weighted sum.
    pub noise_tolerance: f64,
    /// Relative precision assumed for each transform value.
    pub precision: f64,
}

impl Default for InversionSettings {
    fn default() -> Self {
        Self {
            scheme: InversionScheme::Euler,
            nodes: None,
            noise_tolerance: 1e-3,
            precision: 1e-13,
        }
    }
}

/// Nodes and weights of one inversion scheme.
#[derive(Debug, Clone, PartialEq)]
pub struct InversionRule {
    scheme: InversionScheme,
    nodes: Vec<Complex<f64>>,
    weights: Vec<Complex<f64>>,
    noise_tolerance: f64,
    precision: f64,
}

impl InversionRule {
    pub fn new(settings: &InversionSettings) -> Result<Self> {
        let m = settings
            .nodes
            .unwrap_or_else(|| settings.scheme.default_nodes());
        if m < 12 || m % 2 != 0 {
            return Err(SolverError::out_of_range(
                "inversion nodes",
                m as f64,
                "even integers >= 12",
            ));
        }
        let (nodes, weights) = match settings.scheme {
            InversionScheme::Stehfest => stehfest(m)?,
            InversionScheme::Talbot => talbot(m),
            InversionScheme::Euler => euler(m),
        };
        Ok(Self {
            scheme: settings.scheme,
            nodes,
            weights,
            noise_tolerance: settings.noise_tolerance,
            precision: settings.precision,
        })
    }

    pub fn scheme(&self) -> InversionScheme {
        self.scheme
    }

    /// Number of transform evaluations per inversion.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn invert(&self, transform: &dyn TransformFunction, t: f64) -> Result<f64> {
        if !(t > 0.0 && t.is_finite()) {
            return Err(SolverError::TransformInversion {
                time: t,
                message: "inversion needs t > 0".to_string(),
            });
        }
        let mut sum = 0.0;
        let mut magnitude = 0.0;
        for (node, weight) in self.nodes.iter().zip(&self.weights) {
            let value = transform.evaluate(*node / t).map_err(|err| match err {
                SolverError::TransformDomain { .. } => SolverError::TransformInversion {
                    time: t,
                    message: err.to_string(),
                },
                other => other,
            })?;
            let term = *weight * value;
            sum += term.re;
            magnitude += term.norm();
        }
        if !sum.is_finite() || !magnitude.is_finite() {
            return Err(SolverError::TransformInversion {
                time: t,
                message: "weighted sum is not finite".to_string(),
            });
        }
        let noise = magnitude * self.precision / t;
        if noise > self.noise_tolerance {
            return Err(SolverError::TransformInversion {
                time: t,
                message: format!(
                    "cancellation noise {:e} exceeds tolerance {:e}",
                    noise, self.noise_tolerance
                ),
            });
        }
        Ok(sum / t)
    }
}

pub fn inverse_transform(
    transform: &dyn TransformFunction,
    rule: &InversionRule,
    t: f64,
) -> Result<f64> {
    rule.invert(transform, t)
}

type Rule = (Vec<Complex<f64>>, Vec<Complex<f64>>);

fn stehfest(m: usize) -> Result<Rule> {
    if m > 20 {
        return Err(SolverError::out_of_range(
            "inversion nodes",
            m as f64,
            "[12, 20] for Stehfest",
        ));
    }
    let half = m / 2;
    let table = CombinatorialTable::new(m);
    let mut nodes = Vec::with_capacity(m);
    let mut weights = Vec::with_capacity(m);
    for k in 1..=m {
        let mut v = 0.0;
        for j in (k + 1) / 2..=k.min(half) {
            v += (j as f64).powi(half as i32) * table.factorial(2 * j)
                / (table.factorial(half - j)
                    * table.factorial(j)
                    * table.factorial(j - 1)
                    * table.factorial(k - j)
                    * table.factorial(2 * j - k));
        }
        if (k + half) % 2 == 1 {
            v = -v;
        }
        nodes.push(Complex::new(k as f64 * LN_2, 0.0));
        weights.push(Complex::new(LN_2 * v, 0.0));
    }
    Ok((nodes, weights))
}

fn talbot(m: usize) -> Rule {
    let mf = m as f64;
    let r = 2.0 * mf / 5.0;
    let mut nodes = Vec::with_capacity(m);
    let mut weights = Vec::with_capacity(m);
    nodes.push(Complex::new(r, 0.0));
    weights.push(Complex::new(0.5 * r.exp() * r / mf, 0.0));
    for k in 1..m {
        let theta = k as f64 * PI / mf;
        let cot = theta.cos() / theta.sin();
        let node = Complex::new(r * theta * cot, r * theta);
        let sigma = theta + (theta * cot - 1.0) * cot;
        nodes.push(node);
        weights.push(node.exp() * Complex::new(1.0, sigma) * (r / mf));
    }
    (nodes, weights)
}

fn euler(m: usize) -> Rule {
    let half = m / 2;
    let table = CombinatorialTable::new(half);
    let scale = 2f64.powi(-(half as i32));
    let mut xi = vec![1.0; 2 * half + 1];
    xi[0] = 0.5;
    xi[2 * half] = scale;
    for k in 1..half {
        xi[2 * half - k] = xi[2 * half - k + 1] + scale * table.binomial(half, k);
    }
    let shift = half as f64 * LN_10 / 3.0;
    let amplitude = 10f64.powf(half as f64 / 3.0);
    let nodes = (0..=2 * half)
        .map(|k| Complex::new(shift, PI * k as f64))
        .collect();
    let weights = xi
        .iter()
        .enumerate()
        .map(|(k, x)| {
            let sign = if k % 2 == 0 { 1.0 } else { -1.0 };
            Complex::new(amplitude * sign * x, 0.0)
        })
        .collect();
    (nodes, weights)
}
