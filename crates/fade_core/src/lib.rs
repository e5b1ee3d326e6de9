//! The `fade_core` crate is the numerical engine behind the FADE solver.
//! It approximates fractional differential equations of the form
//! `D^a u + sum(nu_l D^b_l u) + k u + N(u) = 0` over a uniform time grid.
//!
//! Key components:
//! - **Basis**: Bernstein polynomials, their Gram matrix and least-squares projection.
//! - **Operational matrices**: fractal-fractional derivatives in the Bernstein basis, cached per request.
//! - **Transform**: numerical Laplace transform and Stehfest, Talbot and Euler inversion.
//! - **Decomposition**: Adomian and Laplace-Adomian series.
//! - **MHPM**: collocation with a fixed-point correction loop.
//! - **Executor**: ordered, fail-fast parallel batches on a rayon pool.
//! - **Engine**: request parsing, the model and method tables and the response shape.

pub mod basis;
pub mod combinatorics;
pub mod decomposition;
pub mod engine;
pub mod equation_engine;
pub mod error;
pub mod executor;
pub mod mhpm;
pub mod operational;
pub mod params;
pub mod quadrature;
pub mod special;
pub mod traits;
pub mod transform;
pub mod types;

pub use engine::{
    handle_request, solve, solve_request, EngineConfig, Method, Model, SolveContext,
    SolveRequest, SolveResponse,
};
pub use error::{ErrorKind, Result, SolverError};
pub use params::{FractionalEquation, ScalarFunction, SolverParameters};
pub use types::{Sample, SolutionCurve};
