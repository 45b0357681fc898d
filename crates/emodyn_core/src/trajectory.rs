//! Trajectory Container: the sampled solution of a run
//!
//! Both solver paths produce the same shape, so consumers never need to know
//! which one ran. A trajectory is validated once at construction and exposes
//! no mutators afterwards.

use crate::error::{Result, SimulationError};
use serde::Serialize;

/// Ordered `(time, state)` samples of one simulation run.
///
/// Invariants:
/// - at least one sample; the first is at `t = 0`
/// - times strictly increasing
/// - every state has one finite value per variable
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trajectory {
    variables: Vec<String>,
    times: Vec<f64>,
    /// Row-major: sample `i` occupies `states[i*dim..(i+1)*dim]`
    states: Vec<f64>,
}

impl Trajectory {
    /// Build from explicit samples, validating every invariant.
    pub fn new(variables: Vec<String>, times: Vec<f64>, states: Vec<Vec<f64>>) -> Result<Self> {
        if times.len() != states.len() {
            return Err(SimulationError::InvalidTimePoints(format!(
                "{} time points for {} states",
                times.len(),
                states.len()
            )));
        }
        let mut iter = times.into_iter().zip(states);
        let (t0, x0) = iter.next().ok_or_else(|| {
            SimulationError::InvalidTimePoints("a trajectory needs at least one sample".to_string())
        })?;
        if t0 != 0.0 {
            return Err(SimulationError::InvalidTimePoints(format!(
                "first sample must be at t=0, got {}",
                t0
            )));
        }
        let mut builder = TrajectoryBuilder::new(variables, &x0)?;
        for (t, x) in iter {
            builder.push(t, &x)?;
        }
        Ok(builder.finish())
    }

    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn dimension(&self) -> usize {
        self.variables.len()
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.times.len()
    }

    /// Always false: a trajectory holds at least the initial sample.
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    /// Sample `index` as `(time, state)`.
    pub fn at(&self, index: usize) -> Option<(f64, &[f64])> {
        let t = *self.times.get(index)?;
        let dim = self.dimension();
        Some((t, &self.states[index * dim..(index + 1) * dim]))
    }

    /// Values of one variable across all samples, in time order.
    pub fn state_series(&self, variable: &str) -> Option<Vec<f64>> {
        let col = self.variables.iter().position(|v| v == variable)?;
        Some(
            self.states
                .chunks_exact(self.dimension())
                .map(|row| row[col])
                .collect(),
        )
    }

    pub fn initial_state(&self) -> &[f64] {
        &self.states[..self.dimension()]
    }

    pub fn final_time(&self) -> f64 {
        self.times[self.times.len() - 1]
    }

    pub fn final_state(&self) -> &[f64] {
        let dim = self.dimension();
        &self.states[self.states.len() - dim..]
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, &[f64])> + '_ {
        self.times
            .iter()
            .copied()
            .zip(self.states.chunks_exact(self.dimension()))
    }

    /// Largest absolute difference between two trajectories on the same grid.
    pub fn max_abs_difference(&self, other: &Trajectory) -> Option<f64> {
        if self.times != other.times || self.variables != other.variables {
            return None;
        }
        Some(
            self.states
                .iter()
                .zip(&other.states)
                .fold(0.0_f64, |m, (a, b)| m.max((a - b).abs())),
        )
    }
}

/// Incremental construction used by the solvers.
///
/// Samples are checked as they arrive, so a run that fails midway never
/// produces a `Trajectory`.
#[derive(Debug)]
pub struct TrajectoryBuilder {
    variables: Vec<String>,
    times: Vec<f64>,
    states: Vec<f64>,
}

impl TrajectoryBuilder {
    /// Start a trajectory at `t = 0` with the initial condition.
    pub fn new(variables: Vec<String>, initial: &[f64]) -> Result<Self> {
        if variables.is_empty() {
            return Err(SimulationError::InvalidModel(
                "a trajectory needs at least one variable".to_string(),
            ));
        }
        validate_initial_condition(&variables, initial)?;
        Ok(Self {
            variables,
            times: vec![0.0],
            states: initial.to_vec(),
        })
    }

    pub fn with_capacity(mut self, samples: usize) -> Self {
        self.times.reserve(samples);
        self.states.reserve(samples * self.variables.len());
        self
    }

    pub fn last_time(&self) -> f64 {
        self.times[self.times.len() - 1]
    }

    /// Append a sample; `t` must exceed the previous time and `state` must be finite.
    pub fn push(&mut self, t: f64, state: &[f64]) -> Result<()> {
        if state.len() != self.variables.len() {
            return Err(SimulationError::InvalidInitialCondition(format!(
                "sample at t={} has {} values for {} variables",
                t,
                state.len(),
                self.variables.len()
            )));
        }
        if !t.is_finite() || t <= self.last_time() {
            return Err(SimulationError::InvalidTimePoints(format!(
                "sample time {} does not follow {}",
                t,
                self.last_time()
            )));
        }
        if let Some((i, v)) = state.iter().enumerate().find(|(_, v)| !v.is_finite()) {
            return Err(SimulationError::NumericalInstability {
                model: String::new(),
                time: t,
                variable: self.variables[i].clone(),
                value: *v,
            });
        }
        self.times.push(t);
        self.states.extend_from_slice(state);
        Ok(())
    }

    pub fn finish(self) -> Trajectory {
        Trajectory {
            variables: self.variables,
            times: self.times,
            states: self.states,
        }
    }
}

/// One finite value per variable.
pub fn validate_initial_condition(variables: &[String], initial: &[f64]) -> Result<()> {
    if initial.len() != variables.len() {
        return Err(SimulationError::InvalidInitialCondition(format!(
            "expected {} values ({}), got {}",
            variables.len(),
            variables.join(", "),
            initial.len()
        )));
    }
    if let Some((i, v)) = initial.iter().enumerate().find(|(_, v)| !v.is_finite()) {
        return Err(SimulationError::InvalidInitialCondition(format!(
            "'{}' must be finite, got {}",
            variables[i], v
        )));
    }
    Ok(())
}
