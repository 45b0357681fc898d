//! emodyn_bench: long-horizon scenario tests for the reference experiments.
//!
//! Validates qualitative behavior over full runs:
//! - Decay toward zero and forced approach to c/k
//! - Logistic regulation converging to 1 - k/a from every start
//! - Lag of a driven emotion behind its source
//! - Observed order of accuracy of each integrator

use emodyn_core::{EmodynConfig, ExperimentConfig, IntegratorConfig, Method, ModelSpec, Result};
use emodyn_solver::{integrate, simulate, Run, RunPlan};

/// Run one experiment of the reference suite with default settings.
pub fn run_reference(name: &str) -> Option<Result<Run>> {
    let config = EmodynConfig::default();
    let exp = ExperimentConfig::reference_suite()
        .into_iter()
        .find(|e| e.name == name)?;
    Some(run_experiment(&config, &exp))
}

pub fn run_experiment(config: &EmodynConfig, exp: &ExperimentConfig) -> Result<Run> {
    let model = exp.model.build(&exp.name)?;
    let plan = RunPlan {
        integrator: exp.integrator(&config.integrator),
        analytic: config.analytic.clone(),
        samples: exp.samples,
        preference: exp.solver,
    };
    simulate(&model, &exp.initial, &plan)
}

/// Successive error ratios `e(h) / e(h/2)` of the final state of a scalar
/// model against `exact`, starting from `h` and halving `halvings` times.
pub fn convergence_ratios(
    model: &ModelSpec,
    initial: f64,
    exact: f64,
    t_end: f64,
    method: Method,
    h: f64,
    halvings: usize,
) -> Result<Vec<f64>> {
    let mut errors = Vec::with_capacity(halvings + 1);
    let mut step = h;
    for _ in 0..=halvings {
        let traj = integrate(model, &[initial], &IntegratorConfig::new(step, t_end, method))?;
        errors.push((traj.final_state()[0] - exact).abs());
        step /= 2.0;
    }
    Ok(errors.windows(2).map(|w| w[0] / w[1]).collect())
}
