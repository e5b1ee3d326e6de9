//! Request-level scenarios run through the public engine API.

use fade_core::decomposition::{AdomianSolver, Scheme};
use fade_core::executor::{CancellationToken, ExecutorConfig};
use fade_core::{
    handle_request, solve, solve_request, EngineConfig, ErrorKind, Method, Model, SolveContext,
    SolveRequest, SolveResponse, SolverError,
};

mod common;
use common::{assert_uniform_curve, predictor_corrector, request, sine_gordon_parameters};

/// `D^0.9 y = -sin(y)`, `y(0) = 1` on `[0, 10]` with step 0.005.
fn sine_gordon_reference() -> Vec<f64> {
    predictor_corrector(0.9, 1.0, |y| -y.sin(), 10.0, 2000)
}

#[test]
fn sine_gordon_decomposition_spans_the_requested_grid() {
    let ctx = SolveContext::default();
    let curve = solve(
        Model::SineGordon,
        Method::Adomian,
        sine_gordon_parameters(),
        &ctx,
    )
    .expect("solve");
    assert_uniform_curve(&curve, 10.0, 100);
    assert!((curve.samples()[0].y - 1.0).abs() < 1e-9);
    assert!(ctx.tasks_dispatched() > 0);

    let reference = sine_gordon_reference();
    assert!((reference[20] - 0.89427).abs() < 5e-3, "{}", reference[20]);
    assert!((reference[200] - 0.3999).abs() < 5e-3, "{}", reference[200]);
    for (j, sample) in curve.samples().iter().enumerate() {
        let expected = reference[20 * j];
        assert!(
            (sample.y - expected).abs() < 2e-2,
            "t {}: {} vs {}",
            sample.x,
            sample.y,
            expected
        );
    }
}

#[test]
fn long_horizon_decomposition_is_staged() {
    let ctx = SolveContext::default();
    let equation = Model::SineGordon.equation(sine_gordon_parameters());
    let report = AdomianSolver::new(Scheme::Adomian)
        .run(&equation, &ctx)
        .expect("solve");
    let stages = report.series.stages();
    assert!(stages.len() > 1, "{} stages", stages.len());
    assert_eq!(stages[0].start, 0.0);
    assert!(stages[0].length < 10.0);
    assert!((stages[stages.len() - 1].end() - 10.0).abs() < 1e-9);
    for pair in stages.windows(2) {
        assert_eq!(pair[0].end(), pair[1].start);
        assert!(pair[1].length <= pair[0].length + 1e-9);
    }

    let t_end = report.curve.samples()[100].y;
    let expected = sine_gordon_reference()[2000];
    assert!((t_end - expected).abs() < 2e-2, "{t_end} vs {expected}");
}

#[test]
fn out_of_range_order_fails_before_any_work() {
    let ctx = SolveContext::default();
    let mut params = sine_gordon_parameters();
    params.alpha = 1.5;
    let err = solve(Model::SineGordon, Method::Adomian, params, &ctx).expect_err("alpha");
    assert_eq!(err.kind(), ErrorKind::ParameterRangeError);
    assert_eq!(ctx.tasks_dispatched(), 0);
    assert_eq!(ctx.batches_dispatched(), 0);
    assert_eq!(ctx.cached_matrices(), 0);
}

#[test]
fn out_of_range_order_is_rejected_for_every_method() {
    for method in ["adomian", "laplace-adomian", "mhpm"] {
        let ctx = SolveContext::default();
        let mut bad = request("sine-gordon", method);
        bad.alpha = 0.0;
        let err = solve_request(&bad, &ctx).expect_err(method);
        assert_eq!(err.kind(), ErrorKind::ParameterRangeError, "{method}");
        assert_eq!(ctx.tasks_dispatched(), 0, "{method}");
    }
}

#[test]
fn unknown_model_is_an_invalid_request() {
    let ctx = SolveContext::default();
    let response = handle_request(&request("navier-stokes", "adomian"), &ctx);
    match response {
        SolveResponse::Failure {
            success,
            kind,
            message,
        } => {
            assert!(!success);
            assert_eq!(kind, ErrorKind::InvalidRequest);
            assert!(message.contains("navier-stokes"));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn json_request_produces_a_json_sample_array() {
    let body = r#"{
        "model": "sine-gordon",
        "method": "adm",
        "alpha": 0.9,
        "polynomialDegree": 5,
        "maxTerms": 6,
        "timeSteps": 20,
        "timeEnd": 2.0,
        "initialCondition": "1",
        "nonlinearTerm": "sin(y)"
    }"#;
    let request: SolveRequest = serde_json::from_str(body).expect("request");
    let ctx = SolveContext::default();
    let response = handle_request(&request, &ctx);
    assert!(response.is_success());
    let json = serde_json::to_value(&response).expect("json");
    let samples = json.as_array().expect("array");
    assert_eq!(samples.len(), 21);
    assert_eq!(samples[0]["x"], 0.0);
    assert_eq!(samples[20]["x"], 2.0);
    assert!(samples.iter().all(|s| s["y"].as_f64().is_some()));
}

#[test]
fn mhpm_and_decomposition_agree_on_short_horizons() {
    let ctx = SolveContext::default();
    let mut adm = request("sine-gordon", "adomian");
    adm.time_end = 1.0;
    adm.time_steps = 10;
    adm.polynomial_degree = Some(8);
    let mut mhpm = adm.clone();
    mhpm.method = "mhpm".to_string();

    let series = solve_request(&adm, &ctx).expect("adomian");
    let collocation = solve_request(&mhpm, &ctx).expect("mhpm");
    for (a, b) in series.ys().iter().zip(collocation.ys()) {
        assert!((a - b).abs() < 1e-2, "{a} vs {b}");
    }
}

#[test]
fn sequential_executor_gives_identical_curves() {
    let parallel = SolveContext::default();
    let sequential = SolveContext::new(EngineConfig {
        executor: ExecutorConfig {
            threads: None,
            sequential: true,
        },
        ..EngineConfig::default()
    });
    assert!(!sequential.executor().is_parallel());
    let mut short = request("sine-gordon", "adomian");
    short.time_end = 1.0;
    short.time_steps = 10;
    let a = solve_request(&short, &parallel).expect("parallel");
    let b = solve_request(&short, &sequential).expect("sequential");
    assert_eq!(a, b);
}

#[test]
fn cancelled_context_reports_cancellation() {
    let token = CancellationToken::new();
    token.cancel();
    let ctx = SolveContext::default().with_cancellation(token);
    let err = solve_request(&request("sine-gordon", "adomian"), &ctx).expect_err("cancelled");
    assert!(matches!(err, SolverError::Cancelled), "{err:?}");
    assert_eq!(err.kind(), ErrorKind::Cancelled);
}
