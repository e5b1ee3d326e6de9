//! Error taxonomy shared by every engine component.

use serde::Serialize;
use thiserror::Error;

/// Coarse classification reported to request collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    ParameterRangeError,
    ComputationError,
    TransformInversionError,
    ConvergenceExhausted,
    ExecutorAggregateError,
    InvalidRequest,
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::ParameterRangeError => "ParameterRangeError",
            ErrorKind::ComputationError => "ComputationError",
            ErrorKind::TransformInversionError => "TransformInversionError",
            ErrorKind::ConvergenceExhausted => "ConvergenceExhausted",
            ErrorKind::ExecutorAggregateError => "ExecutorAggregateError",
            ErrorKind::InvalidRequest => "InvalidRequest",
            ErrorKind::Cancelled => "Cancelled",
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SolverError {
    /// A fractional order, degree, step count or tolerance is outside its domain.
    #[error("parameter `{name}` = {value} is outside its domain {domain}")]
    ParameterRange {
        name: &'static str,
        value: f64,
        domain: &'static str,
    },

    /// A user callback failed or produced a non-finite value.
    #[error("computation failed in term {term} at t = {time}: {message}")]
    Computation {
        term: usize,
        time: f64,
        message: String,
    },

    /// An executor unit panicked instead of returning.
    #[error("task panicked: {message}")]
    Panicked { message: String },

    #[error("linear system is singular at iteration {iteration}")]
    SingularSystem { iteration: usize },

    /// The Laplace integral does not converge at the requested point.
    #[error("Laplace integral diverges at s = {re} + {im}i (growth rate {growth_rate})")]
    TransformDomain { re: f64, im: f64, growth_rate: f64 },

    #[error("transform inversion failed at t = {time}: {message}")]
    TransformInversion { time: f64, message: String },

    #[error(
        "no convergence after {iterations} iterations (error {error:e} > tolerance {tolerance:e})"
    )]
    ConvergenceExhausted {
        iterations: usize,
        error: f64,
        tolerance: f64,
    },

    /// Decomposition terms kept growing even on the shortest allowed step.
    #[error("decomposition series diverges on [{start}, {end}] (last term {magnitude:e})")]
    SeriesDivergence { start: f64, end: f64, magnitude: f64 },

    #[error("task {index} failed: {source}")]
    ExecutorAggregate {
        index: usize,
        source: Box<SolverError>,
    },

    #[error("invalid expression `{expression}`: {message}")]
    InvalidExpression { expression: String, message: String },

    #[error("unknown {selector} `{name}`")]
    UnknownSelector { selector: &'static str, name: String },

    #[error("task batch cancelled")]
    Cancelled,
}

impl SolverError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SolverError::ParameterRange { .. } => ErrorKind::ParameterRangeError,
            SolverError::Computation { .. }
            | SolverError::Panicked { .. }
            | SolverError::SingularSystem { .. } => ErrorKind::ComputationError,
            SolverError::TransformDomain { .. } | SolverError::TransformInversion { .. } => {
                ErrorKind::TransformInversionError
            }
            SolverError::ConvergenceExhausted { .. } | SolverError::SeriesDivergence { .. } => {
                ErrorKind::ConvergenceExhausted
            }
            SolverError::ExecutorAggregate { .. } => ErrorKind::ExecutorAggregateError,
            SolverError::InvalidExpression { .. } | SolverError::UnknownSelector { .. } => {
                ErrorKind::InvalidRequest
            }
            SolverError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Innermost error, looking through executor aggregation.
    pub fn root_cause(&self) -> &SolverError {
        match self {
            SolverError::ExecutorAggregate { source, .. } => source.root_cause(),
            other => other,
        }
    }

    pub(crate) fn out_of_range(name: &'static str, value: f64, domain: &'static str) -> Self {
        SolverError::ParameterRange {
            name,
            value,
            domain,
        }
    }

    pub(crate) fn computation(term: usize, time: f64, cause: impl std::fmt::Display) -> Self {
        SolverError::Computation {
            term,
            time,
            message: cause.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SolverError>;
