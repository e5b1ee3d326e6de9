//! Solver inputs: user callbacks, numeric parameters and the canonical equation.

use crate::basis::MAX_DEGREE;
use crate::equation_engine::CompiledExpression;
use crate::error::{Result, SolverError};
use anyhow::bail;
use std::fmt;
use std::sync::Arc;

/// Largest number of decomposition terms a solve may request.
pub const MAX_TERMS: usize = 24;

type Callback = Arc<dyn Fn(f64) -> anyhow::Result<f64> + Send + Sync>;

/// A real function of one real variable supplied by the caller.
///
/// Calls are checked: a callback error or a non-finite result is reported as
/// an error, never replaced by a default.
#[derive(Clone)]
pub struct ScalarFunction {
    label: String,
    callback: Callback,
}

impl ScalarFunction {
    pub fn new<F>(label: impl Into<String>, f: F) -> Self
    where
        F: Fn(f64) -> f64 + Send + Sync + 'static,
    {
        Self::fallible(label, move |x| Ok(f(x)))
    }

    pub fn fallible<F>(label: impl Into<String>, f: F) -> Self
    where
        F: Fn(f64) -> anyhow::Result<f64> + Send + Sync + 'static,
    {
        Self {
            label: label.into(),
            callback: Arc::new(f),
        }
    }

    pub fn constant(value: f64) -> Self {
        Self::new(format!("{value}"), move |_| value)
    }

    /// Compiles an expression string; every name in `var_names` is the argument.
    pub fn parse(source: &str, var_names: &[&str]) -> Result<Self> {
        let compiled = CompiledExpression::compile(source, var_names)?;
        Ok(Self::fallible(source, move |x| compiled.evaluate(x)))
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn call(&self, x: f64) -> anyhow::Result<f64> {
        let value = (self.callback)(x)?;
        if !value.is_finite() {
            bail!("`{}` evaluated to {} at {}", self.label, value, x);
        }
        Ok(value)
    }
}

impl fmt::Debug for ScalarFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ScalarFunction").field(&self.label).finish()
    }
}

/// Numeric parameters of one solve. Immutable once validated.
#[derive(Debug, Clone)]
pub struct SolverParameters {
    pub alpha: f64,
    pub beta: Option<f64>,
    pub gamma: Option<f64>,
    pub fractal_dimension: f64,
    pub polynomial_degree: usize,
    pub max_terms: usize,
    pub max_iterations: usize,
    pub time_end: f64,
    pub time_steps: usize,
    pub tolerance: f64,
    pub initial_condition: ScalarFunction,
    pub nonlinear_term: ScalarFunction,
}

impl SolverParameters {
    pub fn new(initial_condition: ScalarFunction, nonlinear_term: ScalarFunction) -> Self {
        Self {
            alpha: 1.0,
            beta: None,
            gamma: None,
            fractal_dimension: 2.0,
            polynomial_degree: 5,
            max_terms: 10,
            max_iterations: 100,
            time_end: 1.0,
            time_steps: 100,
            tolerance: 1e-6,
            initial_condition,
            nonlinear_term,
        }
    }

    /// Order of the secondary derivative; defaults to `alpha`.
    pub fn beta(&self) -> f64 {
        self.beta.unwrap_or(self.alpha)
    }

    /// Order of the dispersive derivative; defaults to `alpha`.
    pub fn gamma(&self) -> f64 {
        self.gamma.unwrap_or(self.alpha)
    }

    /// `fractal_dimension - 1`, the exponent of the fractal time derivative.
    pub fn fractal_exponent(&self) -> f64 {
        self.fractal_dimension - 1.0
    }

    pub fn validate(&self) -> Result<()> {
        validate_order("alpha", self.alpha)?;
        validate_order("beta", self.beta())?;
        validate_order("gamma", self.gamma())?;
        validate_fractal_dimension(self.fractal_dimension)?;
        if self.polynomial_degree > MAX_DEGREE {
            return Err(SolverError::out_of_range(
                "polynomial_degree",
                self.polynomial_degree as f64,
                "[0, 20]",
            ));
        }
        if self.max_terms == 0 || self.max_terms > MAX_TERMS {
            return Err(SolverError::out_of_range(
                "max_terms",
                self.max_terms as f64,
                "[1, 24]",
            ));
        }
        if self.max_iterations == 0 {
            return Err(SolverError::out_of_range(
                "max_iterations",
                0.0,
                "positive integers",
            ));
        }
        if !(self.time_end.is_finite() && self.time_end > 0.0) {
            return Err(SolverError::out_of_range(
                "time_end",
                self.time_end,
                "(0, inf)",
            ));
        }
        if self.time_steps == 0 {
            return Err(SolverError::out_of_range("time_steps", 0.0, "[1, inf)"));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(SolverError::out_of_range(
                "tolerance",
                self.tolerance,
                "(0, inf)",
            ));
        }
        Ok(())
    }
}

pub(crate) fn validate_order(name: &'static str, order: f64) -> Result<()> {
    if order > 0.0 && order <= 1.0 {
        Ok(())
    } else {
        Err(SolverError::out_of_range(name, order, "(0, 1]"))
    }
}

pub(crate) fn validate_fractal_dimension(dimension: f64) -> Result<()> {
    if dimension > 1.0 && dimension <= 2.0 {
        Ok(())
    } else {
        Err(SolverError::out_of_range(
            "fractal_dimension",
            dimension,
            "(1, 2]",
        ))
    }
}

/// `coefficient * D^order u` in the canonical equation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearTerm {
    pub coefficient: f64,
    pub order: f64,
}

/// `D^alpha u + sum(nu_l D^order_l u) + reaction * u + N(u) = 0`, `u(0) = u_0`.
#[derive(Debug, Clone)]
pub struct FractionalEquation {
    pub params: SolverParameters,
    pub linear_terms: Vec<LinearTerm>,
    pub reaction: f64,
}

impl FractionalEquation {
    pub fn new(params: SolverParameters) -> Self {
        Self {
            params,
            linear_terms: Vec::new(),
            reaction: 0.0,
        }
    }

    pub fn with_linear_term(mut self, coefficient: f64, order: f64) -> Self {
        self.linear_terms.push(LinearTerm { coefficient, order });
        self
    }

    pub fn with_reaction(mut self, reaction: f64) -> Self {
        self.reaction = reaction;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.params.validate()?;
        for term in &self.linear_terms {
            validate_order("linear term order", term.order)?;
            if !term.coefficient.is_finite() {
                return Err(SolverError::out_of_range(
                    "linear term coefficient",
                    term.coefficient,
                    "finite reals",
                ));
            }
        }
        if !self.reaction.is_finite() {
            return Err(SolverError::out_of_range(
                "reaction",
                self.reaction,
                "finite reals",
            ));
        }
        Ok(())
    }
}
