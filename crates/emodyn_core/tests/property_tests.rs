//! Property-based tests for emodyn_core.
//!
//! Model and trajectory invariants that must hold for all valid inputs.

use emodyn_core::{
    CouplingMatrix, CouplingResponse, Linearity, ModelSpec, Regulation, SimulationError,
    Trajectory,
};
use proptest::prelude::*;

// ============================================================================
// Strategies
// ============================================================================

/// Strictly increasing times starting at 0, with matching scalar states.
fn arb_samples() -> impl Strategy<Value = (Vec<f64>, Vec<Vec<f64>>)> {
    prop::collection::vec((0.001f64..=1.0, -100.0f64..=100.0), 0..50).prop_map(|steps| {
        let mut t = 0.0;
        let mut times = vec![0.0];
        let mut states = vec![vec![1.0]];
        for (dt, x) in steps {
            t += dt;
            times.push(t);
            states.push(vec![x]);
        }
        (times, states)
    })
}

fn arb_matrix(n: usize) -> impl Strategy<Value = Vec<Vec<f64>>> {
    prop::collection::vec(prop::collection::vec(-2.0f64..=2.0, n), n)
}

// ============================================================================
// Trajectory
// ============================================================================

proptest! {
    /// Every sample is retrievable by index and series match `at()`.
    #[test]
    fn trajectory_accessors_agree((times, states) in arb_samples()) {
        let traj = Trajectory::new(vec!["x".to_string()], times.clone(), states.clone()).unwrap();
        prop_assert_eq!(traj.len(), times.len());
        let series = traj.state_series("x").unwrap();
        for i in 0..traj.len() {
            let (t, state) = traj.at(i).unwrap();
            prop_assert_eq!(t, times[i]);
            prop_assert_eq!(state[0], series[i]);
            prop_assert_eq!(state, states[i].as_slice());
        }
        prop_assert!(traj.at(traj.len()).is_none());
    }

    /// Swapping two distinct times always breaks monotonicity and is rejected.
    #[test]
    fn trajectory_rejects_out_of_order((mut times, states) in arb_samples()) {
        prop_assume!(times.len() >= 3);
        let last = times.len() - 1;
        times.swap(1, last);
        let err = Trajectory::new(vec!["x".to_string()], times, states).unwrap_err();
        prop_assert!(matches!(err, SimulationError::InvalidTimePoints(_)));
    }
}

// ============================================================================
// Models
// ============================================================================

proptest! {
    /// Linear coupling: f(x + y) = f(x) + f(y) for every matrix.
    #[test]
    fn linear_coupling_is_additive(
        rows in arb_matrix(3),
        x in prop::collection::vec(-5.0f64..=5.0, 3),
        y in prop::collection::vec(-5.0f64..=5.0, 3),
    ) {
        let w = CouplingMatrix::from_rows(rows).unwrap();
        let vars = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let model = ModelSpec::coupled("net", vars, w, CouplingResponse::Linear).unwrap();
        prop_assert!(model.is_linear());

        let sum: Vec<f64> = x.iter().zip(&y).map(|(a, b)| a + b).collect();
        let fx = model.derivative(0.0, &x).unwrap();
        let fy = model.derivative(0.0, &y).unwrap();
        let fsum = model.derivative(0.0, &sum).unwrap();
        for i in 0..3 {
            prop_assert!((fsum[i] - fx[i] - fy[i]).abs() < 1e-9);
        }
    }

    /// Regulated families can never be declared linear.
    #[test]
    fn regulation_cannot_be_declared_linear(k in 0.0f64..=2.0, gain in 0.01f64..=2.0) {
        let model = ModelSpec::regulated("reg", "x", k, Regulation::Logistic { gain }).unwrap();
        let err = model.with_linearity(Linearity::Linear).unwrap_err();
        let is_classification = matches!(err, SimulationError::ModelClassification { .. });
        prop_assert!(is_classification);
    }

    /// The logistic fixed point 1 - k/a really has zero rate.
    #[test]
    fn logistic_equilibria_have_zero_rate(k in 0.0f64..=1.0, gain in 0.1f64..=2.0) {
        let model = ModelSpec::regulated("reg", "x", k, Regulation::Logistic { gain }).unwrap();
        for eq in model.equilibria() {
            let rate = model.derivative(0.0, &[eq.value]).unwrap()[0];
            prop_assert!(rate.abs() < 1e-12, "rate {} at {}", rate, eq.value);
        }
    }

    /// Changing one coefficient leaves the original spec untouched.
    #[test]
    fn with_parameter_returns_new_spec(k in 0.01f64..=2.0, new_k in 0.01f64..=2.0) {
        let model = ModelSpec::decay("decay", "x", k).unwrap();
        let changed = model.with_parameter("decay_rate", new_k).unwrap();
        prop_assert_eq!(model.params().get("decay_rate"), Some(k));
        prop_assert_eq!(changed.params().get("decay_rate"), Some(new_k));
    }
}
