//! Gauss–Legendre quadrature rules.

use crate::error::{Result, SolverError};
use std::f64::consts::PI;

/// Nodes and weights of an `order`-point Gauss–Legendre rule on [-1, 1].
#[derive(Debug, Clone)]
pub struct GaussLegendre {
    nodes: Vec<f64>,
    weights: Vec<f64>,
}

impl GaussLegendre {
    pub fn new(order: usize) -> Result<Self> {
        if order == 0 || order > 256 {
            return Err(SolverError::out_of_range(
                "quadrature order",
                order as f64,
                "[1, 256]",
            ));
        }
        let n = order;
        let m = (n + 1) / 2;
        let mut nodes = vec![0.0; n];
        let mut weights = vec![0.0; n];
        for i in 0..m {
            let mut x = f64::cos(PI * (i as f64 + 0.75) / (n as f64 + 0.5));
            let mut dp = 1.0;
            for _ in 0..100 {
                let (p, d) = legendre_eval(n, x);
                dp = d;
                let dx = -p / d;
                x += dx;
                if dx.abs() < 1e-15 {
                    break;
                }
            }
            let (_, d) = legendre_eval(n, x);
            if d.is_finite() {
                dp = d;
            }
            let w = 2.0 / ((1.0 - x * x) * dp * dp);
            // Roots come out descending from +1; store ascending.
            nodes[n - 1 - i] = x;
            nodes[i] = -x;
            weights[n - 1 - i] = w;
            weights[i] = w;
        }
        Ok(Self { nodes, weights })
    }

    pub fn order(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> &[f64] {
        &self.nodes
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Nodes and weights mapped onto [a, b].
    pub fn mapped(&self, a: f64, b: f64) -> (Vec<f64>, Vec<f64>) {
        let half = 0.5 * (b - a);
        let mid = 0.5 * (b + a);
        let nodes = self.nodes.iter().map(|&x| mid + half * x).collect();
        let weights = self.weights.iter().map(|&w| half * w).collect();
        (nodes, weights)
    }

    /// ∫_a^b f over `panels` equal sub-intervals.
    pub fn integrate_composite<T, F>(&self, a: f64, b: f64, panels: usize, mut f: F) -> Result<T>
    where
        T: Copy + std::ops::Add<Output = T> + std::ops::Mul<f64, Output = T> + Default,
        F: FnMut(f64) -> Result<T>,
    {
        let panels = panels.max(1);
        let width = (b - a) / panels as f64;
        let half = 0.5 * width;
        let mut total = T::default();
        for p in 0..panels {
            let mid = a + (p as f64 + 0.5) * width;
            for (x, w) in self.nodes.iter().zip(&self.weights) {
                total = total + f(mid + half * x)? * (half * w);
            }
        }
        Ok(total)
    }
}

fn legendre_eval(n: usize, x: f64) -> (f64, f64) {
    if n == 0 {
        return (1.0, 0.0);
    }
    let mut p0 = 1.0;
    let mut p1 = x;
    if n == 1 {
        return (p1, 1.0);
    }
    for k in 2..=n {
        let kf = k as f64;
        let pn = ((2.0 * kf - 1.0) * x * p1 - (kf - 1.0) * p0) / kf;
        p0 = p1;
        p1 = pn;
    }
    let dp = (n as f64) * (x * p1 - p0) / (x * x - 1.0);
    (p1, dp)
}

#[cfg(test)]
mod tests {
    use super::GaussLegendre;

    #[test]
    fn weights_sum_to_interval_length_and_nodes_ascend() {
        for order in [1, 2, 5, 16, 33] {
            let rule = GaussLegendre::new(order).expect("rule");
            let sum: f64 = rule.weights().iter().sum();
            assert!((sum - 2.0).abs() < 1e-13, "order {order}: {sum}");
            assert!(rule.nodes().windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn integrates_polynomials_exactly_up_to_degree_2n_minus_1() {
        let rule = GaussLegendre::new(6).expect("rule");
        let (nodes, weights) = rule.mapped(0.0, 2.0);
        let integral: f64 = nodes
            .iter()
            .zip(&weights)
            .map(|(x, w)| w * x.powi(11))
            .sum();
        let exact = 2f64.powi(12) / 12.0;
        assert!((integral - exact).abs() < 1e-10 * exact);
    }

    #[test]
    fn composite_rule_handles_oscillation() {
        let rule = GaussLegendre::new(16).expect("rule");
        let value = rule
            .integrate_composite(0.0, 40.0, 40, |x| Ok(x.sin()))
            .expect("integral");
        assert!((value - (1.0 - 40f64.cos())).abs() < 1e-12);
    }

    #[test]
    fn rejects_zero_order() {
        assert!(GaussLegendre::new(0).is_err());
    }
}
