//! Fractional operational matrices of the Bernstein basis.
//!
//! With `b = fractal_dimension - 1`, the fractal-fractional derivative of a
//! monomial is `D x^k = g_k x^(k + 1 - order - b)`. Each basis function is
//! expanded in monomials, differentiated exactly, and projected back onto the
//! basis in L2: `D = P G^-1` where `P_ij = <D B_i, B_j>` uses closed-form Beta
//! moments and `G` is the Gram matrix. Row `i` of `D` holds the Bernstein
//! coefficients of `D B_i`.

use crate::basis::{generate_basis, BernsteinBasis, MAX_DEGREE};
use crate::error::{Result, SolverError};
use crate::params::{validate_fractal_dimension, validate_order};
use crate::special::{beta, gamma, recip_gamma};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variable {
    /// Caputo type; annihilates constants.
    Time,
    /// Riemann–Liouville type.
    Space,
}

/// Exact parameter tuple a matrix was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperationalKey {
    pub variable: Variable,
    order_bits: u64,
    fractal_bits: u64,
    pub degree: usize,
}

impl OperationalKey {
    pub fn new(variable: Variable, order: f64, fractal_dimension: f64, degree: usize) -> Self {
        Self {
            variable,
            order_bits: order.to_bits(),
            fractal_bits: fractal_dimension.to_bits(),
            degree,
        }
    }

    pub fn order(&self) -> f64 {
        f64::from_bits(self.order_bits)
    }

    pub fn fractal_dimension(&self) -> f64 {
        f64::from_bits(self.fractal_bits)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OperationalMatrix {
    key: OperationalKey,
    matrix: DMatrix<f64>,
}

impl OperationalMatrix {
    pub fn key(&self) -> OperationalKey {
        self.key
    }

    pub fn variable(&self) -> Variable {
        self.key.variable
    }

    pub fn order(&self) -> f64 {
        self.key.order()
    }

    pub fn fractal_dimension(&self) -> f64 {
        self.key.fractal_dimension()
    }

    pub fn degree(&self) -> usize {
        self.key.degree
    }

    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    /// Bernstein coefficients of `D u` for `u = sum_i coefficients[i] B_i`.
    pub fn apply(&self, coefficients: &DVector<f64>) -> DVector<f64> {
        self.matrix.tr_mul(coefficients)
    }
}

/// `g_k` in `D x^k = g_k x^(k + 1 - order - b)`.
pub fn derivative_weight(variable: Variable, order: f64, fractal_exponent: f64, k: usize) -> f64 {
    let kf = k as f64;
    let b = fractal_exponent;
    match variable {
        Variable::Time if k == 0 => 0.0,
        Variable::Time => kf * gamma(kf - b + 1.0) * recip_gamma(kf - b + 2.0 - order) / b,
        Variable::Space => gamma(kf + 1.0) * recip_gamma(kf + 1.0 - order) / b,
    }
}

/// `h_k` in `I x^k = h_k x^(k + order + b - 1)`, the left inverse of the time
/// derivative on monomials.
pub fn integral_weight(order: f64, fractal_exponent: f64, k: usize) -> f64 {
    let kf = k as f64;
    let b = fractal_exponent;
    b * gamma(kf + 1.0) / ((kf + order + b - 1.0) * gamma(kf + order))
}

/// Multiplier for a derivative taken on `[0, time_end]` instead of `[0, 1]`.
pub fn time_scale(order: f64, fractal_exponent: f64, time_end: f64) -> f64 {
    time_end.powf(1.0 - order - fractal_exponent)
}

pub fn generate_operational_matrix(
    variable: Variable,
    order: f64,
    fractal_dimension: f64,
    degree: usize,
) -> Result<OperationalMatrix> {
    validate_order("order", order)?;
    validate_fractal_dimension(fractal_dimension)?;
    if degree > MAX_DEGREE {
        return Err(SolverError::out_of_range(
            "polynomial_degree",
            degree as f64,
            "[0, 20]",
        ));
    }
    let basis = generate_basis(degree)?;
    let fractal_exponent = fractal_dimension - 1.0;
    let moments = projection_moments(&basis, variable, order, fractal_exponent);
    let gram = basis
        .gram_matrix()
        .cholesky()
        .ok_or(SolverError::out_of_range(
            "polynomial_degree",
            degree as f64,
            "degrees with a positive definite Gram matrix",
        ))?;
    // G symmetric: D^T = G^-1 P^T.
    let matrix = gram.solve(&moments.transpose()).transpose();

    Ok(OperationalMatrix {
        key: OperationalKey::new(variable, order, fractal_dimension, degree),
        matrix,
    })
}

fn projection_moments(
    basis: &BernsteinBasis,
    variable: Variable,
    order: f64,
    fractal_exponent: f64,
) -> DMatrix<f64> {
    let n = basis.degree();
    let table = basis.table();
    let weights: Vec<f64> = (0..=n)
        .map(|k| derivative_weight(variable, order, fractal_exponent, k))
        .collect();

    DMatrix::from_fn(n + 1, n + 1, |i, j| {
        let mut sum = 0.0;
        for k in i..=n {
            if weights[k] == 0.0 {
                continue;
            }
            let exponent = k as f64 + 1.0 - order - fractal_exponent;
            sum += basis.power_coefficient(i, k)
                * weights[k]
                * table.binomial(n, j)
                * beta(exponent + j as f64 + 1.0, (n - j) as f64 + 1.0);
        }
        sum
    })
}

/// Per-request store of operational matrices keyed by their parameter tuple.
#[derive(Debug, Default)]
pub struct OperationalCache {
    entries: Mutex<HashMap<OperationalKey, Arc<OperationalMatrix>>>,
}

impl OperationalCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_build(
        &self,
        variable: Variable,
        order: f64,
        fractal_dimension: f64,
        degree: usize,
    ) -> Result<Arc<OperationalMatrix>> {
        let key = OperationalKey::new(variable, order, fractal_dimension, degree);
        if let Some(found) = self.lock().get(&key) {
            return Ok(Arc::clone(found));
        }
        let built = Arc::new(generate_operational_matrix(
            variable,
            order,
            fractal_dimension,
            degree,
        )?);
        log::debug!(
            "built {:?} operational matrix (order {}, dimension {}, degree {})",
            variable,
            order,
            fractal_dimension,
            degree
        );
        Ok(Arc::clone(self.lock().entry(key).or_insert(built)))
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<OperationalKey, Arc<OperationalMatrix>>> {
        // Entries are only ever inserted whole, so a poisoned map is still valid.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basis::Projector;

    fn apply_to(matrix: &OperationalMatrix, f: impl Fn(f64) -> f64, x: f64) -> f64 {
        let basis = generate_basis(matrix.degree()).expect("basis");
        let projector = Projector::new(&basis, 2 * basis.len() + 8).expect("projector");
        let samples: Vec<f64> = projector.nodes().iter().map(|&t| f(t)).collect();
        let coefficients = projector.project(&samples);
        basis.evaluate_expansion(matrix.apply(&coefficients).as_slice(), x)
    }

    #[test]
    fn classical_first_derivative_is_exact_on_polynomials() {
        let matrix = generate_operational_matrix(Variable::Time, 1.0, 2.0, 6).expect("matrix");
        for &x in &[0.1, 0.4, 0.8] {
            let value = apply_to(&matrix, |t| t.powi(3) - 2.0 * t, x);
            assert!((value - (3.0 * x * x - 2.0)).abs() < 1e-8, "x {x}: {value}");
        }
    }

    #[test]
    fn caputo_derivative_annihilates_constants() {
        let matrix = generate_operational_matrix(Variable::Time, 0.6, 2.0, 5).expect("matrix");
        let coefficients = DVector::from_element(6, 2.5);
        let derivative = matrix.apply(&coefficients);
        assert!(derivative.amax() < 1e-8);
    }

    #[test]
    fn half_derivative_of_linear_function_is_close_to_closed_form() {
        // D^1/2 t = t^(1/2) / Gamma(3/2)
        let matrix = generate_operational_matrix(Variable::Time, 0.5, 2.0, 12).expect("matrix");
        let x = 0.5;
        let value = apply_to(&matrix, |t| t, x);
        let exact = x.sqrt() / gamma(1.5);
        assert!((value - exact).abs() < 1e-2, "{value} vs {exact}");
    }

    #[test]
    fn space_derivative_of_constant_matches_riemann_liouville() {
        // D^a 1 = x^-a / Gamma(1 - a) for Riemann–Liouville.
        assert!(
            (derivative_weight(Variable::Space, 0.4, 1.0, 0) - 1.0 / gamma(0.6)).abs() < 1e-12
        );
        assert_eq!(derivative_weight(Variable::Space, 1.0, 1.0, 0), 0.0);
        assert_eq!(derivative_weight(Variable::Time, 0.4, 1.0, 0), 0.0);
    }

    #[test]
    fn integral_weights_invert_derivative_weights() {
        for &(order, b) in &[(1.0, 1.0), (0.5, 1.0), (0.8, 0.7)] {
            for k in 0..6 {
                let h = integral_weight(order, b, k);
                let m = k as f64 + order + b - 1.0;
                let g = m * gamma(m - b + 1.0) / (b * gamma(m - b + 2.0 - order));
                assert!((g * h - 1.0).abs() < 1e-10, "order {order}, b {b}, k {k}");
            }
        }
        assert!((integral_weight(1.0, 1.0, 3) - 0.25).abs() < 1e-14);
    }

    #[test]
    fn construction_is_deterministic_and_validated() {
        let a = generate_operational_matrix(Variable::Space, 0.7, 1.6, 8).expect("a");
        let b = generate_operational_matrix(Variable::Space, 0.7, 1.6, 8).expect("b");
        assert_eq!(a, b);
        assert!(generate_operational_matrix(Variable::Time, 1.2, 2.0, 4).is_err());
        assert!(generate_operational_matrix(Variable::Time, 0.5, 2.5, 4).is_err());
        assert!(generate_operational_matrix(Variable::Time, 0.5, 2.0, MAX_DEGREE + 1).is_err());
    }

    #[test]
    fn cache_returns_the_same_matrix_for_identical_keys() {
        let cache = OperationalCache::new();
        let a = cache.get_or_build(Variable::Time, 0.9, 2.0, 5).expect("a");
        let b = cache.get_or_build(Variable::Time, 0.9, 2.0, 5).expect("b");
        let c = cache.get_or_build(Variable::Time, 0.9, 1.9, 5).expect("c");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(cache.len(), 2);
    }
}
