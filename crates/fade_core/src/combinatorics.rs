//! Memoized factorial and binomial tables.
//!
//! Built once per solve, sized to the largest degree or term count the solve
//! needs, and passed down by reference.

#[derive(Debug, Clone)]
pub struct CombinatorialTable {
    factorials: Vec<f64>,
    // Row n holds C(n, 0..=n).
    binomials: Vec<Vec<f64>>,
}

impl CombinatorialTable {
    pub fn new(size: usize) -> Self {
        let mut factorials = Vec::with_capacity(size + 1);
        factorials.push(1.0);
        for n in 1..=size {
            let prev = factorials[n - 1];
            factorials.push(prev * n as f64);
        }

        let mut binomials: Vec<Vec<f64>> = Vec::with_capacity(size + 1);
        for n in 0..=size {
            let mut row = vec![1.0; n + 1];
            for k in 1..n {
                row[k] = binomials[n - 1][k - 1] + binomials[n - 1][k];
            }
            binomials.push(row);
        }

        Self {
            factorials,
            binomials,
        }
    }

    /// Largest `n` covered by the table.
    pub fn size(&self) -> usize {
        self.factorials.len() - 1
    }

    /// n! (panics if `n` exceeds the table size).
    pub fn factorial(&self, n: usize) -> f64 {
        self.factorials[n]
    }

    /// C(n, k); zero when `k > n`.
    pub fn binomial(&self, n: usize, k: usize) -> f64 {
        if k > n {
            0.0
        } else {
            self.binomials[n][k]
        }
    }
}
