//! Property-based tests for emodyn_solver.
//!
//! Both solver paths must agree wherever both apply, and the numerical path
//! must keep its grid and determinism guarantees for any valid step size.

use emodyn_core::{
    CouplingMatrix, CouplingResponse, Forcing, IntegratorConfig, Method, ModelSpec,
    SolverPreference,
};
use emodyn_solver::{integrate, simulate, solve_analytic, steady_state_response, time_grid, RunPlan};
use proptest::prelude::*;

// ============================================================================
// Strategies
// ============================================================================

fn arb_method() -> impl Strategy<Value = Method> {
    prop_oneof![Just(Method::Euler), Just(Method::Heun), Just(Method::Rk4)]
}

/// Stable driven pair with well-separated rates.
fn arb_driven_pair() -> impl Strategy<Value = ModelSpec> {
    (0.1f64..=1.0, -1.0f64..=1.0, 1.5f64..=3.0).prop_map(|(a, b, c)| {
        let w = CouplingMatrix::from_rows(vec![vec![-a, b], vec![0.0, -c]]).unwrap();
        ModelSpec::coupled(
            "pair",
            vec!["x".to_string(), "y".to_string()],
            w,
            CouplingResponse::Linear,
        )
        .unwrap()
    })
}

// ============================================================================
// Numerical path
// ============================================================================

proptest! {
    /// RK4 tracks the closed-form decay for any rate, start and horizon.
    #[test]
    fn rk4_matches_decay_closed_form(
        k in 0.05f64..=2.0,
        x0 in -10.0f64..=10.0,
        t_end in 0.1f64..=10.0,
    ) {
        let model = ModelSpec::decay("decay", "x", k).unwrap();
        let config = IntegratorConfig::new(0.01, t_end, Method::Rk4);
        let traj = integrate(&model, &[x0], &config).unwrap();
        let exact = x0 * (-k * t_end).exp();
        prop_assert!((traj.final_state()[0] - exact).abs() <= 1e-8 * (1.0 + x0.abs()));
    }

    /// Sample times start at 0, increase strictly and end exactly at t_end.
    #[test]
    fn grid_always_ends_on_horizon(
        h in 0.001f64..=1.0,
        t_end in 0.0f64..=20.0,
        method in arb_method(),
    ) {
        let model = ModelSpec::decay("decay", "x", 0.5).unwrap();
        let config = IntegratorConfig::new(h, t_end, method);
        let traj = integrate(&model, &[1.0], &config).unwrap();
        let times = traj.times();
        prop_assert_eq!(times[0], 0.0);
        prop_assert_eq!(*times.last().unwrap(), t_end);
        prop_assert!(times.windows(2).all(|w| w[1] > w[0]));
        prop_assert!(times.windows(2).all(|w| w[1] - w[0] <= h * (1.0 + 1e-9)));
    }

    /// Identical inputs give bit-identical trajectories.
    #[test]
    fn integration_is_deterministic(
        k in 0.0f64..=2.0,
        level in -5.0f64..=5.0,
        x0 in -5.0f64..=5.0,
        method in arb_method(),
    ) {
        let model = ModelSpec::forced("forced", "x", k, Forcing::Constant { level }).unwrap();
        let config = IntegratorConfig::new(0.05, 5.0, method);
        let a = integrate(&model, &[x0], &config).unwrap();
        let b = integrate(&model, &[x0], &config).unwrap();
        prop_assert_eq!(a, b);
    }
}

// ============================================================================
// Analytic path
// ============================================================================

proptest! {
    /// Modal closed form and RK4 agree on the same output grid.
    #[test]
    fn coupled_paths_agree(model in arb_driven_pair(), x0 in -5.0f64..=5.0, y0 in -5.0f64..=5.0) {
        let plan = RunPlan::new(IntegratorConfig::new(0.01, 10.0, Method::Rk4)).with_samples(50);
        let analytic = simulate(&model, &[x0, y0], &plan).unwrap();
        let numerical = simulate(
            &model,
            &[x0, y0],
            &plan.clone().with_preference(SolverPreference::Numerical),
        )
        .unwrap();
        prop_assert!(analytic.path.is_analytic());
        let diff = analytic.trajectory.max_abs_difference(&numerical.trajectory).unwrap();
        prop_assert!(diff < 1e-6, "max difference {}", diff);
    }

    /// Once the transient has died out, the response never exceeds A/√(k²+ω²).
    #[test]
    fn sinusoidal_response_bounded_by_resonance_amplitude(
        k in 0.2f64..=2.0,
        omega in 0.1f64..=5.0,
        amplitude in 0.1f64..=3.0,
        x0 in -3.0f64..=3.0,
    ) {
        let model = ModelSpec::forced(
            "wave",
            "x",
            k,
            Forcing::Sinusoidal { offset: 0.0, amplitude, frequency: omega, phase: 0.0 },
        )
        .unwrap();
        let bound = steady_state_response(k, omega, amplitude).unwrap().amplitude;
        let t_end = 60.0 / k;
        let traj = solve_analytic(&model, &[x0], &time_grid(t_end, 400).unwrap()).unwrap();
        let late = traj
            .iter()
            .filter(|(t, _)| *t >= 40.0 / k)
            .fold(0.0f64, |m, (_, s)| m.max(s[0].abs()));
        prop_assert!(late <= bound + 1e-9, "late peak {} above bound {}", late, bound);
    }
}
