//! Output time grids shared by both solver paths.

use emodyn_core::{Result, SimulationError, TrajectoryBuilder};

/// Remainders shorter than this fraction of a step are absorbed into the
/// previous sample instead of producing a sliver step.
pub const SNAP_FRACTION: f64 = 1e-9;

/// `samples` evenly spaced points from 0 to `t_end` inclusive.
///
/// A zero horizon always yields the single point `[0.0]`.
pub fn time_grid(t_end: f64, samples: usize) -> Result<Vec<f64>> {
    if !t_end.is_finite() || t_end < 0.0 {
        return Err(SimulationError::InvalidTimePoints(format!(
            "t_end must be finite and >= 0, got {}",
            t_end
        )));
    }
    if t_end == 0.0 {
        return Ok(vec![0.0]);
    }
    if samples < 2 {
        return Err(SimulationError::InvalidTimePoints(format!(
            "need at least 2 samples to cover (0, {}], got {}",
            t_end, samples
        )));
    }
    let last = (samples - 1) as f64;
    let mut grid: Vec<f64> = (0..samples - 1).map(|i| t_end * i as f64 / last).collect();
    grid.push(t_end);
    validate_time_points(&grid)?;
    Ok(grid)
}

/// Sample times of a fixed-step run: `i·h`, with the final step shortened so
/// the last sample lands exactly on `t_end`.
///
/// Fails with `IterationCapExceeded` before allocating when the run would
/// need more than `max_steps` steps.
pub fn step_grid(t_end: f64, step_size: f64, max_steps: usize) -> Result<Vec<f64>> {
    if !step_size.is_finite() || step_size <= 0.0 || !t_end.is_finite() || t_end < 0.0 {
        return Err(SimulationError::InvalidStepSize(format!(
            "cannot build a step grid with step_size={} and t_end={}",
            step_size, t_end
        )));
    }
    if t_end == 0.0 {
        return Ok(vec![0.0]);
    }
    let full = (t_end / step_size).floor();
    let remainder = t_end - full * step_size;
    let steps = if remainder > SNAP_FRACTION * step_size {
        full + 1.0
    } else {
        full
    }
    .max(1.0);
    if steps > max_steps as f64 {
        return Err(SimulationError::IterationCapExceeded {
            required: steps as usize,
            max_steps,
        });
    }
    let steps = steps as usize;
    let mut grid: Vec<f64> = (0..steps).map(|i| i as f64 * step_size).collect();
    grid.push(t_end);
    Ok(grid)
}

/// Non-empty, finite, strictly increasing and starting at exactly 0.
pub fn validate_time_points(time_points: &[f64]) -> Result<()> {
    let first = *time_points.first().ok_or_else(|| {
        SimulationError::InvalidTimePoints("at least one time point is required".to_string())
    })?;
    if first != 0.0 {
        return Err(SimulationError::InvalidTimePoints(format!(
            "time points must start at 0, got {}",
            first
        )));
    }
    for pair in time_points.windows(2) {
        if !pair[1].is_finite() || pair[1] <= pair[0] {
            return Err(SimulationError::InvalidTimePoints(format!(
                "time points must be finite and strictly increasing ({} then {})",
                pair[0], pair[1]
            )));
        }
    }
    Ok(())
}

/// Append a sample, reporting the first non-finite value against the model.
pub(crate) fn push_sample(
    builder: &mut TrajectoryBuilder,
    model: &str,
    variables: &[String],
    t: f64,
    state: &[f64],
) -> Result<()> {
    if let Some((i, v)) = state.iter().enumerate().find(|(_, v)| !v.is_finite()) {
        return Err(SimulationError::NumericalInstability {
            model: model.to_string(),
            time: t,
            variable: variables[i].clone(),
            value: *v,
        });
    }
    builder.push(t, state)
}
