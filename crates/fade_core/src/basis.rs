//! Bernstein polynomial basis on `[0, 1]` and its L2 projector.

use crate::combinatorics::CombinatorialTable;
use crate::error::{Result, SolverError};
use crate::quadrature::GaussLegendre;
use nalgebra::linalg::Cholesky;
use nalgebra::{DMatrix, DVector, Dyn};

/// Highest supported degree. The Bernstein Gram matrix becomes too
/// ill-conditioned for a stable Cholesky solve beyond this.
pub const MAX_DEGREE: usize = 20;

/// `B_k(x) = C(n,k) x^k (1-x)^(n-k)`, `k = 0..=n`.
#[derive(Debug, Clone)]
pub struct BernsteinBasis {
    degree: usize,
    table: CombinatorialTable,
}

pub fn generate_basis(degree: usize) -> Result<BernsteinBasis> {
    if degree > MAX_DEGREE {
        return Err(SolverError::out_of_range(
            "polynomial_degree",
            degree as f64,
            "[0, 20]",
        ));
    }
    Ok(BernsteinBasis {
        degree,
        table: CombinatorialTable::new(2 * degree),
    })
}

impl BernsteinBasis {
    pub fn degree(&self) -> usize {
        self.degree
    }

    pub fn len(&self) -> usize {
        self.degree + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn table(&self) -> &CombinatorialTable {
        &self.table
    }

    pub fn evaluate(&self, k: usize, x: f64) -> f64 {
        let n = self.degree;
        if k > n {
            return 0.0;
        }
        self.table.binomial(n, k) * x.powi(k as i32) * (1.0 - x).powi((n - k) as i32)
    }

    pub fn evaluate_all(&self, x: f64) -> Vec<f64> {
        (0..=self.degree).map(|k| self.evaluate(k, x)).collect()
    }

    /// `sum_k coefficients[k] * B_k(x)`.
    pub fn evaluate_expansion(&self, coefficients: &[f64], x: f64) -> f64 {
        coefficients
            .iter()
            .enumerate()
            .map(|(k, c)| c * self.evaluate(k, x))
            .sum()
    }

    /// `Phi[i][j] = B_j(points[i])`.
    pub fn collocation_matrix(&self, points: &[f64]) -> DMatrix<f64> {
        DMatrix::from_fn(points.len(), self.len(), |i, j| self.evaluate(j, points[i]))
    }

    /// Monomial coefficient `c_ik` of `x^k` in `B_i`.
    pub fn power_coefficient(&self, i: usize, k: usize) -> f64 {
        let n = self.degree;
        if k < i || k > n {
            return 0.0;
        }
        let sign = if (k - i) % 2 == 0 { 1.0 } else { -1.0 };
        sign * self.table.binomial(n, i) * self.table.binomial(n - i, k - i)
    }

    /// Monomial coefficients of `sum_i coefficients[i] * B_i`.
    pub fn to_monomial(&self, coefficients: &[f64]) -> Vec<f64> {
        (0..=self.degree)
            .map(|k| {
                coefficients
                    .iter()
                    .enumerate()
                    .take(k + 1)
                    .map(|(i, c)| c * self.power_coefficient(i, k))
                    .sum()
            })
            .collect()
    }

    /// `G_ij = integral of B_i B_j over [0, 1]`.
    pub fn gram_matrix(&self) -> DMatrix<f64> {
        let n = self.degree;
        let t = &self.table;
        DMatrix::from_fn(n + 1, n + 1, |i, j| {
            t.binomial(n, i) * t.binomial(n, j) / ((2 * n + 1) as f64 * t.binomial(2 * n, i + j))
        })
    }
}

/// Least-squares projection of sampled functions onto a Bernstein basis.
///
/// Samples are taken at Gauss–Legendre nodes on `[0, 1]`; the moments
/// `<f, B_j>` are formed by quadrature and the Gram system is solved with a
/// Cholesky factor built once.
#[derive(Debug, Clone)]
pub struct Projector {
    nodes: Vec<f64>,
    weighted_basis: DMatrix<f64>,
    basis_at_nodes: DMatrix<f64>,
    gram: Cholesky<f64, Dyn>,
}

impl Projector {
    pub fn new(basis: &BernsteinBasis, node_count: usize) -> Result<Self> {
        let rule = GaussLegendre::new(node_count.max(basis.len()))?;
        let (nodes, weights) = rule.mapped(0.0, 1.0);
        let basis_at_nodes = basis.collocation_matrix(&nodes);
        let mut weighted_basis = basis_at_nodes.transpose();
        for (q, w) in weights.iter().enumerate() {
            weighted_basis.column_mut(q).scale_mut(*w);
        }
        let gram = basis
            .gram_matrix()
            .cholesky()
            .ok_or(SolverError::out_of_range(
                "polynomial_degree",
                basis.degree() as f64,
                "degrees with a positive definite Gram matrix",
            ))?;
        Ok(Self {
            nodes,
            weighted_basis,
            basis_at_nodes,
            gram,
        })
    }

    /// Sampling nodes on `[0, 1]`, ascending.
    pub fn nodes(&self) -> &[f64] {
        &self.nodes
    }

    /// Bernstein coefficients of the best L2 approximation to the samples.
    pub fn project(&self, samples: &[f64]) -> DVector<f64> {
        let samples = DVector::from_column_slice(samples);
        let moments = &self.weighted_basis * samples;
        self.gram.solve(&moments)
    }

    /// Values at the nodes of `sum_j coefficients[j] * B_j`.
    pub fn evaluate_at_nodes(&self, coefficients: &DVector<f64>) -> DVector<f64> {
        &self.basis_at_nodes * coefficients
    }
}
