use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub x: f64,
    pub y: f64,
}

/// Samples of a solution on a uniform grid over `[0, time_end]`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SolutionCurve {
    samples: Vec<Sample>,
}

impl SolutionCurve {
    /// `steps + 1` points `j * time_end / steps`; the last one is exactly `time_end`.
    pub fn grid(time_end: f64, steps: usize) -> Vec<f64> {
        let steps = steps.max(1);
        let dt = time_end / steps as f64;
        let mut xs: Vec<f64> = (0..=steps).map(|j| j as f64 * dt).collect();
        xs[steps] = time_end;
        xs
    }

    /// Pairs `values` with [`SolutionCurve::grid`].
    pub fn from_values(time_end: f64, values: Vec<f64>) -> Self {
        let steps = values.len().saturating_sub(1);
        let samples = Self::grid(time_end, steps)
            .into_iter()
            .zip(values)
            .map(|(x, y)| Sample { x, y })
            .collect();
        Self { samples }
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn xs(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.x).collect()
    }

    pub fn ys(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.y).collect()
    }

    pub fn into_samples(self) -> Vec<Sample> {
        self.samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_ends_exactly_at_time_end() {
        let xs = SolutionCurve::grid(0.3, 7);
        assert_eq!(xs.len(), 8);
        assert_eq!(xs[0], 0.0);
        assert_eq!(xs[7], 0.3);
        assert!(xs.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn serializes_as_plain_array_of_points() {
        let curve = SolutionCurve::from_values(1.0, vec![1.0, 0.5]);
        let json = serde_json::to_string(&curve).expect("serialize");
        assert_eq!(json, r#"[{"x":0.0,"y":1.0},{"x":1.0,"y":0.5}]"#);
    }
}
