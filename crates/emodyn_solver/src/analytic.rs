//! Analytic Solver: closed-form trajectories for linear models
//!
//! - Decay:          x(t) = x0·e^{-k·t}
//! - Forced:         x(t) = x_p(t) + (x0 - x_p(0))·e^{-k·t}   (superposition)
//! - Linear coupling: x(t) = exp(W·t)·x0                      (modal decomposition)
//!
//! Nonlinear models and defective coupling matrices have no closed form here
//! and are rejected with `UnsupportedModel`.

use crate::grid::{push_sample, validate_time_points};
use crate::modal::ModalDecomposition;
use emodyn_core::model::PROBE_TIMES;
use emodyn_core::{
    param, validate_initial_condition, AnalyticConfig, CouplingResponse, Family, ForcingShape,
    ModelSpec, Result, SimulationError, Trajectory, TrajectoryBuilder,
};
use nalgebra::DMatrix;
use serde::Serialize;

/// Steady-state oscillation of a sinusoidally forced decay.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SteadyState {
    /// `A / √(k² + ω²)`
    pub amplitude: f64,
    /// Lag behind the forcing, `atan2(ω, k)` radians
    pub phase_lag: f64,
}

/// Linear resonance response of `dx/dt = -k·x + A·sin(ω·t)`.
///
/// `None` when `k <= 0`: the homogeneous part never dies out.
pub fn steady_state_response(decay_rate: f64, frequency: f64, amplitude: f64) -> Option<SteadyState> {
    if decay_rate <= 0.0 {
        return None;
    }
    Some(SteadyState {
        amplitude: amplitude / decay_rate.hypot(frequency),
        phase_lag: frequency.atan2(decay_rate),
    })
}

/// Closed-form trajectory sampled at `time_points`, with default tolerances.
pub fn solve_analytic(model: &ModelSpec, initial: &[f64], time_points: &[f64]) -> Result<Trajectory> {
    solve_analytic_with(model, initial, time_points, &AnalyticConfig::default())
}

/// Closed-form trajectory sampled at `time_points`.
///
/// `time_points` must start at 0 and increase strictly; the first sample is
/// the initial condition itself.
pub fn solve_analytic_with(
    model: &ModelSpec,
    initial: &[f64],
    time_points: &[f64],
    options: &AnalyticConfig,
) -> Result<Trajectory> {
    let closed_form = ClosedForm::for_model(model, options)?;
    validate_initial_condition(model.variables(), initial)?;
    validate_time_points(time_points)?;

    let states = closed_form.evaluate(model, initial, &time_points[1..]);
    let mut builder = TrajectoryBuilder::new(model.variables().to_vec(), initial)?
        .with_capacity(time_points.len());
    for (&t, state) in time_points[1..].iter().zip(&states) {
        push_sample(&mut builder, model.name(), model.variables(), t, state)?;
    }

    tracing::debug!(
        model = model.name(),
        samples = time_points.len(),
        "analytic solution computed"
    );
    Ok(builder.finish())
}

/// Whether the analytic path can solve this model, without solving it.
pub fn check_closed_form(model: &ModelSpec, options: &AnalyticConfig) -> Result<()> {
    ClosedForm::for_model(model, options).map(|_| ())
}

enum ClosedForm {
    Decay { rate: f64 },
    Forced(ForcingShape),
    Modal(ModalDecomposition),
}

impl ClosedForm {
    fn for_model(model: &ModelSpec, options: &AnalyticConfig) -> Result<Self> {
        if !model.is_linear() {
            return Err(unsupported(model, "model is declared nonlinear"));
        }
        match model.family() {
            Family::Decay => Ok(ClosedForm::Decay {
                rate: model.params().get_or(param::DECAY_RATE, 0.0),
            }),
            Family::Forced(shape) => Ok(ClosedForm::Forced(*shape)),
            Family::Coupled(CouplingResponse::Linear) => {
                let Some(coupling) = model.params().coupling() else {
                    return Err(unsupported(model, "coupled model without a coupling matrix"));
                };
                let n = coupling.dim();
                let w = DMatrix::from_row_slice(n, n, coupling.as_row_major());
                modal(model, &w, options)
            }
            Family::Custom(_) => {
                let w = extract_matrix(model, options)?;
                modal(model, &w, options)
            }
            Family::Regulated(_) | Family::Coupled(CouplingResponse::Tanh) => {
                Err(unsupported(model, "rate law is nonlinear in the state"))
            }
        }
    }

    fn evaluate(&self, model: &ModelSpec, initial: &[f64], times: &[f64]) -> Vec<Vec<f64>> {
        match self {
            ClosedForm::Decay { rate } => times
                .iter()
                .map(|&t| vec![initial[0] * (-rate * t).exp()])
                .collect(),
            ClosedForm::Forced(shape) => times
                .iter()
                .map(|&t| vec![forced_response(model, *shape, initial[0], t)])
                .collect(),
            ClosedForm::Modal(modal) => modal.propagate(initial, times),
        }
    }
}

/// x(t) of a forced decay, by superposition of homogeneous and particular parts.
fn forced_response(model: &ModelSpec, shape: ForcingShape, x0: f64, t: f64) -> f64 {
    let p = model.params();
    let k = p.get_or(param::DECAY_RATE, 0.0);

    // Particular solution of x' = -k·x + c with x_p(0) = 0 when k = 0.
    let constant = |c: f64, t: f64| if k != 0.0 { c / k } else { c * t };

    match shape {
        ForcingShape::Constant => {
            let c = p.get_or(param::LEVEL, 0.0);
            constant(c, t) + (x0 - constant(c, 0.0)) * (-k * t).exp()
        }
        ForcingShape::Sinusoidal => {
            let offset = p.get_or(param::OFFSET, 0.0);
            let amplitude = p.get_or(param::AMPLITUDE, 0.0);
            let omega = p.get_or(param::FREQUENCY, 0.0);
            let phase = p.get_or(param::PHASE, 0.0);

            let particular = |t: f64| {
                let oscillation = if omega == 0.0 {
                    // sin(φ) is a constant input
                    constant(amplitude * phase.sin(), t)
                } else {
                    let theta = omega * t + phase;
                    amplitude / (k * k + omega * omega) * (k * theta.sin() - omega * theta.cos())
                };
                constant(offset, t) + oscillation
            };
            particular(t) + (x0 - particular(0.0)) * (-k * t).exp()
        }
        ForcingShape::Step => {
            let level = p.get_or(param::LEVEL, 0.0);
            let onset = p.get_or(param::ONSET, 0.0);
            if t < onset {
                return x0 * (-k * t).exp();
            }
            let at_onset = x0 * (-k * onset).exp();
            let elapsed = t - onset;
            at_onset * (-k * elapsed).exp() + constant(level, elapsed)
                - constant(level, 0.0) * (-k * elapsed).exp()
        }
    }
}

fn modal(model: &ModelSpec, w: &DMatrix<f64>, options: &AnalyticConfig) -> Result<ClosedForm> {
    ModalDecomposition::new(w, options.tolerance)
        .map(ClosedForm::Modal)
        .map_err(|e| unsupported(model, &e.to_string()))
}

/// Coefficient matrix of a custom linear rate law, probed column by column.
///
/// Only homogeneous, time-invariant laws `dx/dt = W·x` have a closed form
/// on this path.
fn extract_matrix(model: &ModelSpec, options: &AnalyticConfig) -> Result<DMatrix<f64>> {
    let n = model.dimension();
    let zero = vec![0.0; n];
    let mut probed: Vec<DMatrix<f64>> = Vec::with_capacity(PROBE_TIMES.len());

    for &t in &PROBE_TIMES {
        let f0 = model.derivative(t, &zero)?;
        let mut w = DMatrix::<f64>::zeros(n, n);
        for j in 0..n {
            let mut basis = zero.clone();
            basis[j] = 1.0;
            let column = model.derivative(t, &basis)?;
            for i in 0..n {
                w[(i, j)] = column[i] - f0[i];
            }
        }
        let scale = w.amax().max(1.0);
        let tolerance = options.tolerance * scale;

        if let Some(bad) = f0.iter().find(|v| v.abs() > tolerance) {
            return Err(unsupported(
                model,
                &format!("rate law has an input term ({} at t={})", bad, t),
            ));
        }
        if let Some(first) = probed.first() {
            if (first - &w).amax() > tolerance {
                return Err(unsupported(model, "rate law has time-varying coefficients"));
            }
        }
        probed.push(w);
    }
    probed
        .into_iter()
        .next()
        .ok_or_else(|| unsupported(model, "no probe times"))
}

fn unsupported(model: &ModelSpec, reason: &str) -> SimulationError {
    SimulationError::UnsupportedModel {
        model: model.name().to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::time_grid;
    use emodyn_core::{CouplingMatrix, Forcing, Linearity, ModelParameters, Regulation};

    fn close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol
    }

    #[test]
    fn test_decay_closed_form() {
        let model = ModelSpec::decay("decay", "intensity", 0.5).unwrap();
        let grid = time_grid(20.0, 100).unwrap();
        let traj = solve_analytic(&model, &[10.0], &grid).unwrap();
        assert_eq!(traj.len(), 100);
        assert_eq!(traj.initial_state(), &[10.0]);
        for (t, state) in traj.iter() {
            assert!(close(state[0], 10.0 * (-0.5 * t).exp(), 1e-12));
        }
    }

    #[test]
    fn test_constant_forcing_approaches_equilibrium() {
        // Model II: k = 0.5, c = 2 → equilibrium c/k = 4
        let model =
            ModelSpec::forced("stimuli", "intensity", 0.5, Forcing::Constant { level: 2.0 }).unwrap();
        let traj = solve_analytic(&model, &[0.0], &time_grid(20.0, 100).unwrap()).unwrap();
        let (_, last) = traj.at(traj.len() - 1).unwrap();
        assert!(close(last[0], 4.0 * (1.0 - (-10.0_f64).exp()), 1e-12));
    }

    #[test]
    fn test_constant_forcing_without_decay_integrates() {
        let model =
            ModelSpec::forced("drift", "intensity", 0.0, Forcing::Constant { level: 0.5 }).unwrap();
        let traj = solve_analytic(&model, &[1.0], &[0.0, 2.0]).unwrap();
        assert!(close(traj.final_state()[0], 2.0, 1e-12));
    }

    #[test]
    fn test_sinusoidal_solution_satisfies_ode() {
        let model = ModelSpec::forced(
            "wave",
            "arousal",
            0.7,
            Forcing::Sinusoidal {
                offset: 0.3,
                amplitude: 1.2,
                frequency: 2.0,
                phase: 0.4,
            },
        )
        .unwrap();
        // Central difference of the closed form must match the rate law.
        let h = 1e-5;
        for &t in &[0.5, 1.7, 6.0] {
            let x = |t: f64| forced_response(&model, ForcingShape::Sinusoidal, 1.5, t);
            let slope = (x(t + h) - x(t - h)) / (2.0 * h);
            let rate = model.derivative(t, &[x(t)]).unwrap()[0];
            assert!(close(slope, rate, 1e-6), "t={} slope={} rate={}", t, slope, rate);
        }
        assert!(close(
            forced_response(&model, ForcingShape::Sinusoidal, 1.5, 0.0),
            1.5,
            1e-12
        ));
    }

    #[test]
    fn test_steady_state_amplitude_matches_resonance_formula() {
        // Late-time oscillation of the closed form must have amplitude A/√(k²+ω²).
        for &(k, omega) in &[(0.5, 1.0), (2.0, 0.3), (0.1, 4.0)] {
            let amplitude = 1.0;
            let model = ModelSpec::forced(
                "wave",
                "x",
                k,
                Forcing::Sinusoidal {
                    offset: 0.0,
                    amplitude,
                    frequency: omega,
                    phase: 0.0,
                },
            )
            .unwrap();
            let expected = steady_state_response(k, omega, amplitude).unwrap();
            let t_start = 40.0 / k;
            let period = 2.0 * std::f64::consts::PI / omega;
            let grid: Vec<f64> = std::iter::once(0.0)
                .chain((0..2000).map(|i| t_start + period * i as f64 / 2000.0))
                .collect();
            let traj = solve_analytic(&model, &[0.0], &grid).unwrap();
            let peak = traj
                .state_series("x")
                .unwrap()
                .iter()
                .skip(1)
                .fold(0.0_f64, |m, v| m.max(v.abs()));
            assert!(
                close(peak, expected.amplitude, 1e-4),
                "k={} ω={} peak={} expected={}",
                k,
                omega,
                peak,
                expected.amplitude
            );
        }
    }

    #[test]
    fn test_near_zero_frequency_reduces_to_constant_offset() {
        // ω ≈ 0 with φ = π/2: forcing ≈ A, so x → A/k like pure decay plus offset
        let (k, amplitude) = (0.5, 2.0);
        let model = ModelSpec::forced(
            "slow",
            "x",
            k,
            Forcing::Sinusoidal {
                offset: 0.0,
                amplitude,
                frequency: 1e-9,
                phase: std::f64::consts::FRAC_PI_2,
            },
        )
        .unwrap();
        let steady = steady_state_response(k, 1e-9, amplitude).unwrap();
        assert!(close(steady.amplitude, amplitude / k, 1e-9));
        assert!(close(steady.phase_lag, 0.0, 1e-8));

        let traj = solve_analytic(&model, &[1.0], &[0.0, 3.0]).unwrap();
        let expected = amplitude / k + (1.0 - amplitude / k) * (-k * 3.0_f64).exp();
        assert!(close(traj.final_state()[0], expected, 1e-6));

        // Exactly zero frequency takes the constant branch
        let exact = ModelSpec::forced(
            "still",
            "x",
            k,
            Forcing::Sinusoidal {
                offset: 0.0,
                amplitude,
                frequency: 0.0,
                phase: std::f64::consts::FRAC_PI_2,
            },
        )
        .unwrap();
        let traj = solve_analytic(&exact, &[1.0], &[0.0, 3.0]).unwrap();
        assert!(close(traj.final_state()[0], expected, 1e-12));
    }

    #[test]
    fn test_steady_state_requires_decay() {
        assert!(steady_state_response(0.0, 1.0, 1.0).is_none());
        let s = steady_state_response(1.0, 1.0, 2.0).unwrap();
        assert!(close(s.amplitude, 2.0 / 2.0_f64.sqrt(), 1e-12));
        assert!(close(s.phase_lag, std::f64::consts::FRAC_PI_4, 1e-12));
    }

    #[test]
    fn test_step_forcing_piecewise() {
        let model = ModelSpec::forced(
            "step",
            "x",
            1.0,
            Forcing::Step {
                level: 2.0,
                onset: 1.0,
            },
        )
        .unwrap();
        let traj = solve_analytic(&model, &[1.0], &[0.0, 0.5, 1.0, 3.0]).unwrap();
        let series = traj.state_series("x").unwrap();
        assert!(close(series[1], (-0.5_f64).exp(), 1e-12));
        assert!(close(series[2], (-1.0_f64).exp(), 1e-12));
        let expected = (-3.0_f64).exp() + 2.0 * (1.0 - (-2.0_f64).exp());
        assert!(close(series[3], expected, 1e-12));
    }

    #[test]
    fn test_linear_coupling_closed_form() {
        let w = CouplingMatrix::from_rows(vec![vec![-0.5, 0.5], vec![0.0, -0.2]]).unwrap();
        let model = ModelSpec::coupled(
            "lag",
            vec!["fatigue".to_string(), "anxiety".to_string()],
            w,
            CouplingResponse::Linear,
        )
        .unwrap();
        let traj = solve_analytic(&model, &[5.0, 5.0], &time_grid(30.0, 100).unwrap()).unwrap();
        let anxiety = traj.state_series("anxiety").unwrap();
        for ((t, _), y) in traj.iter().zip(&anxiety) {
            assert!(close(*y, 5.0 * (-0.2 * t).exp(), 1e-9));
        }
    }

    #[test]
    fn test_defective_coupling_is_unsupported() {
        let w = CouplingMatrix::from_rows(vec![vec![-1.0, 1.0], vec![0.0, -1.0]]).unwrap();
        let model = ModelSpec::coupled(
            "jordan",
            vec!["a".to_string(), "b".to_string()],
            w,
            CouplingResponse::Linear,
        )
        .unwrap();
        let err = solve_analytic(&model, &[1.0, 1.0], &[0.0, 1.0]).unwrap_err();
        match err {
            SimulationError::UnsupportedModel { model, reason } => {
                assert_eq!(model, "jordan");
                assert!(reason.contains("defective"), "reason: {}", reason);
            }
            other => panic!("expected UnsupportedModel, got {:?}", other),
        }
    }

    #[test]
    fn test_coupling_with_separated_rates() {
        // A fast mode at -200 alongside slow modes at -0.01 and -0.02.
        let w = CouplingMatrix::from_rows(vec![
            vec![-200.0, 0.0, 0.0],
            vec![0.0, -0.01, 0.01],
            vec![0.0, 0.0, -0.02],
        ])
        .unwrap();
        let model = ModelSpec::coupled(
            "stiff",
            vec!["startle".to_string(), "mood".to_string(), "grief".to_string()],
            w,
            CouplingResponse::Linear,
        )
        .unwrap();
        let traj = solve_analytic(&model, &[1.0, 1.0, 1.0], &[0.0, 50.0, 100.0]).unwrap();
        for (t, state) in traj.iter() {
            let grief = (-0.02 * t).exp();
            let mood = 2.0 * (-0.01 * t).exp() - grief;
            assert!(close(state[1], mood, 1e-9), "mood at t={}: {}", t, state[1]);
            assert!(close(state[2], grief, 1e-9), "grief at t={}: {}", t, state[2]);
        }
        assert!(close(traj.final_state()[0], 0.0, 1e-12));
    }

    #[test]
    fn test_nonlinear_model_is_unsupported() {
        let model = ModelSpec::regulated(
            "regulation",
            "x",
            0.2,
            Regulation::Logistic { gain: 0.8 },
        )
        .unwrap();
        assert!(matches!(
            solve_analytic(&model, &[0.5], &[0.0, 1.0]),
            Err(SimulationError::UnsupportedModel { .. })
        ));

        let forced_numerical = ModelSpec::decay("decay", "x", 0.5)
            .unwrap()
            .with_linearity(Linearity::Nonlinear)
            .unwrap();
        assert!(solve_analytic(&forced_numerical, &[1.0], &[0.0, 1.0]).is_err());
    }

    #[test]
    fn test_custom_linear_model_uses_probed_matrix() {
        let model = ModelSpec::custom(
            "rotation",
            vec!["x".to_string(), "y".to_string()],
            ModelParameters::new().with("omega", 2.0).unwrap(),
            |_t: f64, s: &[f64], p: &ModelParameters| {
                let w = p.get_or("omega", 0.0);
                vec![-w * s[1], w * s[0]]
            },
        )
        .unwrap()
        .with_linearity(Linearity::Linear)
        .unwrap();
        let t = std::f64::consts::FRAC_PI_4;
        let traj = solve_analytic(&model, &[1.0, 0.0], &[0.0, t]).unwrap();
        // Rotation by ω·t = π/2
        assert!(close(traj.final_state()[0], 0.0, 1e-10));
        assert!(close(traj.final_state()[1], 1.0, 1e-10));
    }

    #[test]
    fn test_custom_affine_model_is_unsupported() {
        let model = ModelSpec::custom(
            "driven",
            vec!["x".to_string()],
            ModelParameters::new(),
            |t: f64, s: &[f64], _p: &ModelParameters| vec![-s[0] + t.sin()],
        )
        .unwrap()
        .with_linearity(Linearity::Linear)
        .unwrap();
        assert!(matches!(
            solve_analytic(&model, &[1.0], &[0.0, 1.0]),
            Err(SimulationError::UnsupportedModel { .. })
        ));
    }

    #[test]
    fn test_custom_model_with_small_input_is_unsupported() {
        let model = ModelSpec::custom(
            "biased",
            vec!["x".to_string()],
            ModelParameters::new(),
            |_t: f64, s: &[f64], _p: &ModelParameters| vec![-s[0] + 5e-5],
        )
        .unwrap()
        .with_linearity(Linearity::Linear)
        .unwrap();
        match solve_analytic(&model, &[1.0], &[0.0, 1.0]) {
            Err(SimulationError::UnsupportedModel { reason, .. }) => {
                assert!(reason.contains("input term"), "reason: {}", reason)
            }
            other => panic!("expected UnsupportedModel, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_bad_inputs() {
        let model = ModelSpec::decay("decay", "x", 0.5).unwrap();
        assert!(matches!(
            solve_analytic(&model, &[1.0, 2.0], &[0.0, 1.0]),
            Err(SimulationError::InvalidInitialCondition(_))
        ));
        assert!(matches!(
            solve_analytic(&model, &[1.0], &[0.5, 1.0]),
            Err(SimulationError::InvalidTimePoints(_))
        ));
        assert!(matches!(
            solve_analytic(&model, &[1.0], &[0.0, 2.0, 1.0]),
            Err(SimulationError::InvalidTimePoints(_))
        ));
    }

    #[test]
    fn test_overflow_is_reported_not_returned() {
        // Growth at rate 100 overflows f64 long before t = 10
        let model = ModelSpec::decay("explosive", "x", -100.0).unwrap();
        assert!(matches!(
            solve_analytic(&model, &[1.0], &[0.0, 10.0]),
            Err(SimulationError::NumericalInstability { .. })
        ));
    }
}
