use crate::engine::SolveContext;
use crate::error::Result;
use crate::params::FractionalEquation;
use crate::types::SolutionCurve;
use num_complex::Complex;
use num_traits::{Float, FromPrimitive};
use std::fmt::Debug;

/// A trait for types the expression VM can evaluate over.
/// Must support basic arithmetic, debug printing, and conversion from f64.
pub trait Scalar: Float + FromPrimitive + Debug + 'static {}

impl<T: Float + FromPrimitive + Debug + 'static> Scalar for T {}

/// Common capability of every solver in the method table.
pub trait Solver {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Solves `equation` and samples the result on its uniform output grid.
    fn solve(&self, equation: &FractionalEquation, ctx: &SolveContext) -> Result<SolutionCurve>;
}

/// A function of the Laplace variable.
pub trait TransformFunction: Send + Sync {
    fn evaluate(&self, s: Complex<f64>) -> Result<Complex<f64>>;
}
