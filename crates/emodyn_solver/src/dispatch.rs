//! Solver selection: closed form when the model admits one, numerical otherwise.
//!
//! The choice depends only on the linearity tag and the structural check in
//! [`crate::analytic::check_closed_form`], so it is made before any run starts.

use crate::analytic::{check_closed_form, solve_analytic_with};
use crate::grid::{step_grid, time_grid};
use crate::integrator::{integrate, integrate_at};
use emodyn_core::{
    AnalyticConfig, IntegratorConfig, ModelSpec, Result, SimulationError, SolverPreference,
    Trajectory,
};
use serde::Serialize;

/// Which path produced (or will produce) a trajectory.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "path", rename_all = "snake_case")]
pub enum SolverPath {
    Analytic,
    Numerical,
    /// Declared linear but without a closed form here (e.g. defective coupling).
    NumericalFallback { reason: String },
}

impl SolverPath {
    pub fn is_analytic(&self) -> bool {
        matches!(self, SolverPath::Analytic)
    }
}

/// Decide the solver path for `model`.
///
/// `Analytic` preference fails with `UnsupportedModel` instead of falling
/// back; `Numerical` always integrates.
pub fn select_path(
    model: &ModelSpec,
    preference: SolverPreference,
    options: &AnalyticConfig,
) -> Result<SolverPath> {
    match preference {
        SolverPreference::Numerical => Ok(SolverPath::Numerical),
        SolverPreference::Analytic => {
            check_closed_form(model, options)?;
            Ok(SolverPath::Analytic)
        }
        SolverPreference::Auto => {
            if !model.is_linear() {
                return Ok(SolverPath::Numerical);
            }
            match check_closed_form(model, options) {
                Ok(()) => Ok(SolverPath::Analytic),
                Err(SimulationError::UnsupportedModel { reason, .. }) => {
                    Ok(SolverPath::NumericalFallback { reason })
                }
                Err(e) => Err(e),
            }
        }
    }
}

/// Everything a run needs besides the model and initial condition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunPlan {
    pub integrator: IntegratorConfig,
    pub analytic: AnalyticConfig,
    /// Output on `samples` evenly spaced points instead of every step.
    pub samples: Option<usize>,
    pub preference: SolverPreference,
}

impl RunPlan {
    pub fn new(integrator: IntegratorConfig) -> Self {
        Self {
            integrator,
            ..Default::default()
        }
    }

    pub fn with_samples(mut self, samples: usize) -> Self {
        self.samples = Some(samples);
        self
    }

    pub fn with_preference(mut self, preference: SolverPreference) -> Self {
        self.preference = preference;
        self
    }

    /// Output times of this plan: the linspace grid when `samples` is set,
    /// otherwise every integrator step.
    pub fn output_grid(&self) -> Result<Vec<f64>> {
        match self.samples {
            Some(samples) => time_grid(self.integrator.t_end, samples),
            None => step_grid(
                self.integrator.t_end,
                self.integrator.step_size,
                self.integrator.max_steps,
            ),
        }
    }
}

/// A finished run and the path that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Run {
    #[serde(flatten)]
    pub path: SolverPath,
    pub trajectory: Trajectory,
}

/// Run `model` from `initial` according to `plan`.
pub fn simulate(model: &ModelSpec, initial: &[f64], plan: &RunPlan) -> Result<Run> {
    plan.integrator.validate()?;
    let path = select_path(model, plan.preference, &plan.analytic)?;

    let trajectory = match &path {
        SolverPath::Analytic => {
            let grid = plan.output_grid()?;
            solve_analytic_with(model, initial, &grid, &plan.analytic)?
        }
        SolverPath::Numerical | SolverPath::NumericalFallback { .. } => {
            if let SolverPath::NumericalFallback { reason } = &path {
                tracing::warn!(
                    model = model.name(),
                    reason = %reason,
                    "no closed form, falling back to numerical integration"
                );
            }
            match plan.samples {
                Some(_) => integrate_at(model, initial, &plan.integrator, &plan.output_grid()?)?,
                None => integrate(model, initial, &plan.integrator)?,
            }
        }
    };

    tracing::debug!(
        model = model.name(),
        path = ?path,
        samples = trajectory.len(),
        "run complete"
    );
    Ok(Run { path, trajectory })
}
