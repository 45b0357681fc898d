//! Numerical Integrator: fixed-step explicit Runge-Kutta
//!
//! Advances any model (linear or not) from `t = 0` in steps of `h`, with the
//! final step shortened so the last sample lands exactly on `t_end`.
//! Every new state is checked; the first NaN or infinity aborts the run with
//! `NumericalInstability` instead of returning a poisoned trajectory.
//!
//! | Method | Stages | Global error |
//! |--------|--------|--------------|
//! | Euler  | 1      | O(h)         |
//! | Heun   | 2      | O(h²)        |
//! | RK4    | 4      | O(h⁴)        |

use crate::grid::{push_sample, step_grid, validate_time_points, SNAP_FRACTION};
use emodyn_core::{
    validate_initial_condition, IntegratorConfig, Method, ModelSpec, Result, SimulationError,
    Trajectory, TrajectoryBuilder,
};

/// Integrate `model` from `initial` over `[0, config.t_end]`.
///
/// Samples are taken at every step: `0, h, 2h, …, t_end`.
pub fn integrate(model: &ModelSpec, initial: &[f64], config: &IntegratorConfig) -> Result<Trajectory> {
    config.validate()?;
    validate_initial_condition(model.variables(), initial)?;
    let grid = step_grid(config.t_end, config.step_size, config.max_steps)?;

    let mut builder =
        TrajectoryBuilder::new(model.variables().to_vec(), initial)?.with_capacity(grid.len());
    let mut state = initial.to_vec();
    for pair in grid.windows(2) {
        let (t, next) = (pair[0], pair[1]);
        state = step(config.method, model, t, &state, next - t)?;
        push_sample(&mut builder, model.name(), model.variables(), next, &state)?;
    }

    tracing::debug!(
        model = model.name(),
        method = %config.method,
        steps = grid.len() - 1,
        "integration finished"
    );
    Ok(builder.finish())
}

/// Integrate and report the state only at `time_points`.
///
/// Each interval between consecutive output times is split into equal
/// sub-steps no longer than `config.step_size`. `config.t_end` is ignored;
/// the horizon is the last time point.
pub fn integrate_at(
    model: &ModelSpec,
    initial: &[f64],
    config: &IntegratorConfig,
    time_points: &[f64],
) -> Result<Trajectory> {
    config.validate_stepping()?;
    validate_initial_condition(model.variables(), initial)?;
    validate_time_points(time_points)?;

    let h = config.step_size;
    let plan: Vec<usize> = time_points
        .windows(2)
        .map(|pair| substeps(pair[1] - pair[0], h))
        .collect();
    let total: f64 = plan.iter().map(|&n| n as f64).sum();
    if total > config.max_steps as f64 {
        return Err(SimulationError::IterationCapExceeded {
            required: total as usize,
            max_steps: config.max_steps,
        });
    }

    let mut builder = TrajectoryBuilder::new(model.variables().to_vec(), initial)?
        .with_capacity(time_points.len());
    let mut state = initial.to_vec();
    for (pair, &n) in time_points.windows(2).zip(&plan) {
        let (start, end) = (pair[0], pair[1]);
        let dt = (end - start) / n as f64;
        for i in 0..n {
            let t = start + i as f64 * dt;
            state = step(config.method, model, t, &state, dt)?;
            if let Some((j, v)) = state.iter().enumerate().find(|(_, v)| !v.is_finite()) {
                return Err(SimulationError::NumericalInstability {
                    model: model.name().to_string(),
                    time: t + dt,
                    variable: model.variables()[j].clone(),
                    value: *v,
                });
            }
        }
        push_sample(&mut builder, model.name(), model.variables(), end, &state)?;
    }

    tracing::debug!(
        model = model.name(),
        method = %config.method,
        samples = time_points.len(),
        steps = total as usize,
        "integration at requested times finished"
    );
    Ok(builder.finish())
}

fn substeps(interval: f64, h: f64) -> usize {
    let full = (interval / h).floor();
    let n = if interval - full * h > SNAP_FRACTION * h {
        full + 1.0
    } else {
        full
    };
    n.max(1.0) as usize
}

/// One step of size `h` from `(t, state)`.
pub fn step(method: Method, model: &ModelSpec, t: f64, state: &[f64], h: f64) -> Result<Vec<f64>> {
    match method {
        Method::Euler => euler_step(model, t, state, h),
        Method::Heun => heun_step(model, t, state, h),
        Method::Rk4 => rk4_step(model, t, state, h),
    }
}

/// y + a·k
fn axpy(y: &[f64], a: f64, k: &[f64]) -> Vec<f64> {
    y.iter().zip(k).map(|(y, k)| y + a * k).collect()
}

fn euler_step(model: &ModelSpec, t: f64, y: &[f64], h: f64) -> Result<Vec<f64>> {
    let k1 = model.derivative(t, y)?;
    Ok(axpy(y, h, &k1))
}

/// Explicit trapezoid (improved Euler).
fn heun_step(model: &ModelSpec, t: f64, y: &[f64], h: f64) -> Result<Vec<f64>> {
    let k1 = model.derivative(t, y)?;
    let k2 = model.derivative(t + h, &axpy(y, h, &k1))?;
    Ok(y
        .iter()
        .zip(k1.iter().zip(&k2))
        .map(|(y, (a, b))| y + 0.5 * h * (a + b))
        .collect())
}

fn rk4_step(model: &ModelSpec, t: f64, y: &[f64], h: f64) -> Result<Vec<f64>> {
    let k1 = model.derivative(t, y)?;
    let k2 = model.derivative(t + 0.5 * h, &axpy(y, 0.5 * h, &k1))?;
    let k3 = model.derivative(t + 0.5 * h, &axpy(y, 0.5 * h, &k2))?;
    let k4 = model.derivative(t + h, &axpy(y, h, &k3))?;
    Ok((0..y.len())
        .map(|i| y[i] + h / 6.0 * (k1[i] + 2.0 * k2[i] + 2.0 * k3[i] + k4[i]))
        .collect())
}
