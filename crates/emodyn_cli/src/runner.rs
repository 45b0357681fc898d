//! Experiment execution: one run per experiment, one per value for sweeps.
//!
//! Runs are CPU-bound and independent, so each goes to tokio's blocking pool
//! and results are reassembled in configuration order.

use anyhow::{Context, Result};
use emodyn_core::{EmodynConfig, ExperimentConfig, ModelSpec, SimulationError};
use emodyn_render::{figure, FigureStyle};
use emodyn_solver::{simulate, Run, RunPlan};
use serde::Serialize;
use tokio::task::JoinSet;

/// Outcome of one run.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub experiment: String,
    /// `(parameter, value)` when the run is part of a sweep.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sweep: Option<(String, f64)>,
    #[serde(flatten)]
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub figure: Option<emodyn_render::Figure>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Run(Run),
    Error(String),
}

impl RunReport {
    pub fn is_ok(&self) -> bool {
        matches!(self.outcome, Outcome::Run(_))
    }
}

struct Job {
    experiment: String,
    sweep: Option<(String, f64)>,
    model: ModelSpec,
    initial: Vec<f64>,
    plan: RunPlan,
}

/// Pick the experiments to run; `only` selects one by name.
pub fn select(config: &EmodynConfig, only: Option<&str>) -> Result<Vec<ExperimentConfig>> {
    let experiments = config.experiments_or_reference();
    match only {
        None => Ok(experiments),
        Some(name) => {
            let picked: Vec<_> = experiments.into_iter().filter(|e| e.name == name).collect();
            if picked.is_empty() {
                anyhow::bail!("No experiment named '{}'", name);
            }
            Ok(picked)
        }
    }
}

/// Run every experiment (and every sweep value) concurrently.
///
/// Model errors are reported per run; only invalid experiment definitions
/// abort the whole batch.
pub async fn run_all(
    config: &EmodynConfig,
    experiments: &[ExperimentConfig],
    figures: bool,
) -> Result<Vec<RunReport>> {
    let jobs = plan_jobs(config, experiments)?;
    tracing::info!("Running {} job(s) from {} experiment(s)", jobs.len(), experiments.len());

    let mut set = JoinSet::new();
    for (index, job) in jobs.into_iter().enumerate() {
        set.spawn_blocking(move || (index, execute(job, figures)));
    }

    let mut reports = Vec::with_capacity(set.len());
    while let Some(joined) = set.join_next().await {
        reports.push(joined.context("Simulation task panicked")?);
    }
    reports.sort_by_key(|(index, _)| *index);
    Ok(reports.into_iter().map(|(_, report)| report).collect())
}

fn plan_jobs(config: &EmodynConfig, experiments: &[ExperimentConfig]) -> Result<Vec<Job>> {
    let mut jobs = Vec::new();
    for exp in experiments {
        let model = exp
            .model
            .build(&exp.name)
            .with_context(|| format!("Invalid model in experiment '{}'", exp.name))?;
        let plan = RunPlan {
            integrator: exp.integrator(&config.integrator),
            analytic: config.analytic.clone(),
            samples: exp.samples,
            preference: exp.solver,
        };

        match &exp.sweep {
            None => jobs.push(Job {
                experiment: exp.name.clone(),
                sweep: None,
                model,
                initial: exp.initial.clone(),
                plan,
            }),
            Some(sweep) => {
                for &value in &sweep.values {
                    let swept = model.with_parameter(&sweep.parameter, value).with_context(|| {
                        format!(
                            "Experiment '{}': cannot set {} = {}",
                            exp.name, sweep.parameter, value
                        )
                    })?;
                    jobs.push(Job {
                        experiment: exp.name.clone(),
                        sweep: Some((sweep.parameter.clone(), value)),
                        model: swept,
                        initial: exp.initial.clone(),
                        plan: plan.clone(),
                    });
                }
            }
        }
    }
    Ok(jobs)
}

fn execute(job: Job, figures: bool) -> RunReport {
    let result: Result<Run, SimulationError> = simulate(&job.model, &job.initial, &job.plan);
    let (outcome, fig) = match result {
        Ok(run) => {
            let fig = figures.then(|| {
                let mut style = FigureStyle::for_model(&job.model);
                if let Some((parameter, value)) = &job.sweep {
                    style.title = format!("{} ({} = {})", style.title, parameter, value);
                }
                figure(&run.trajectory, &style)
            });
            (Outcome::Run(run), fig)
        }
        Err(e) => {
            tracing::error!(experiment = %job.experiment, "Run failed: {}", e);
            (Outcome::Error(e.to_string()), None)
        }
    };
    RunReport {
        experiment: job.experiment,
        sweep: job.sweep,
        outcome,
        figure: fig,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emodyn_core::SweepConfig;

    #[tokio::test]
    async fn test_reference_suite_runs() {
        let config = EmodynConfig::default();
        let experiments = select(&config, None).unwrap();
        let reports = run_all(&config, &experiments, true).await.unwrap();
        assert_eq!(reports.len(), 6);
        assert_eq!(reports[0].experiment, "decay");
        assert_eq!(reports[5].experiment, "coupled");
        assert!(reports.iter().all(|r| r.is_ok()));
        assert!(reports.iter().all(|r| r.figure.is_some()));
    }

    #[tokio::test]
    async fn test_sweep_expands_in_order() {
        let config = EmodynConfig::default();
        let mut experiments = select(&config, Some("decay")).unwrap();
        experiments[0].sweep = Some(SweepConfig {
            parameter: "decay_rate".to_string(),
            values: vec![0.1, 0.5, 1.0],
        });
        let reports = run_all(&config, &experiments, false).await.unwrap();
        let values: Vec<f64> = reports.iter().filter_map(|r| r.sweep.as_ref().map(|s| s.1)).collect();
        assert_eq!(values, vec![0.1, 0.5, 1.0]);
    }

    #[tokio::test]
    async fn test_run_error_is_reported_not_fatal() {
        let config = EmodynConfig::default();
        let mut experiments = select(&config, Some("decay")).unwrap();
        experiments[0].initial = vec![1.0, 2.0];
        let reports = run_all(&config, &experiments, false).await.unwrap();
        assert_eq!(reports.len(), 1);
        assert!(matches!(reports[0].outcome, Outcome::Error(_)));
    }

    #[tokio::test]
    async fn test_sample_config_runs() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../emodyn.toml");
        let config = EmodynConfig::load(path).unwrap();
        let experiments = select(&config, None).unwrap();
        assert_eq!(experiments.len(), 4);
        let reports = run_all(&config, &experiments, false).await.unwrap();
        // mood-cycle sweeps four frequencies
        assert_eq!(reports.len(), 7);
        assert!(reports.iter().all(|r| r.is_ok()));
    }

    #[test]
    fn test_unknown_experiment() {
        let config = EmodynConfig::default();
        assert!(select(&config, Some("nope")).is_err());
    }
}
