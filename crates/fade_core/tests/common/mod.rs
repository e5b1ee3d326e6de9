//! Common utilities for integration tests

use fade_core::special::gamma;
use fade_core::{ScalarFunction, SolutionCurve, SolveRequest, SolverParameters};

/// Parameters of the reference sine-Gordon run.
pub fn sine_gordon_parameters() -> SolverParameters {
    let mut params = SolverParameters::new(
        ScalarFunction::constant(1.0),
        ScalarFunction::new("sin(y)", f64::sin),
    );
    params.alpha = 0.9;
    params.polynomial_degree = 5;
    params.max_terms = 10;
    params.time_steps = 100;
    params.time_end = 10.0;
    params
}

pub fn request(model: &str, method: &str) -> SolveRequest {
    SolveRequest {
        model: model.to_string(),
        method: method.to_string(),
        alpha: 0.9,
        beta: None,
        gamma: None,
        fractal_dimension: None,
        polynomial_degree: Some(5),
        max_terms: Some(10),
        max_iterations: None,
        tolerance: None,
        time_steps: 100,
        time_end: 10.0,
        initial_condition: "1".to_string(),
        nonlinear_term: Some("sin(y)".to_string()),
    }
}

/// Checks the grid shape shared by every successful solve.
pub fn assert_uniform_curve(curve: &SolutionCurve, time_end: f64, steps: usize) {
    assert_eq!(curve.len(), steps + 1, "sample count");
    let xs = curve.xs();
    assert_eq!(xs[0], 0.0);
    assert_eq!(xs[steps], time_end);
    let dt = time_end / steps as f64;
    for (j, pair) in xs.windows(2).enumerate() {
        assert!(pair[1] > pair[0], "x not increasing at {}", j);
        assert!(((pair[1] - pair[0]) - dt).abs() < 1e-9, "uneven step at {}", j);
    }
    for (j, y) in curve.ys().iter().enumerate() {
        assert!(y.is_finite(), "y[{}] = {}", j, y);
    }
}

/// Fractional Adams–Bashforth–Moulton solution of `D^a y = f(y)`, `y(0) = y0`,
/// on `steps + 1` uniform points of `[0, time_end]`.
pub fn predictor_corrector<F>(alpha: f64, y0: f64, f: F, time_end: f64, steps: usize) -> Vec<f64>
where
    F: Fn(f64) -> f64,
{
    let h = time_end / steps as f64;
    let predictor_scale = h.powf(alpha) / gamma(alpha + 1.0);
    let corrector_scale = h.powf(alpha) / gamma(alpha + 2.0);
    let b: Vec<f64> = (0..=steps)
        .map(|k| {
            let k = k as f64;
            (k + 1.0).powf(alpha) - k.powf(alpha)
        })
        .collect();
    let a: Vec<f64> = (0..=steps)
        .map(|k| {
            let k = k as f64;
            (k + 2.0).powf(alpha + 1.0) + k.powf(alpha + 1.0) - 2.0 * (k + 1.0).powf(alpha + 1.0)
        })
        .collect();

    let mut y = vec![y0; steps + 1];
    let mut rhs = vec![f(y0); steps + 1];
    for n in 0..steps {
        let nf = n as f64;
        let mut predictor = 0.0;
        let mut corrector = (nf.powf(alpha + 1.0) - (nf - alpha) * (nf + 1.0).powf(alpha)) * rhs[0];
        for j in 0..=n {
            predictor += b[n - j] * rhs[j];
            if j > 0 {
                corrector += a[n - j] * rhs[j];
            }
        }
        let predicted = y0 + predictor_scale * predictor;
        y[n + 1] = y0 + corrector_scale * (corrector + f(predicted));
        rhs[n + 1] = f(y[n + 1]);
    }
    y
}
