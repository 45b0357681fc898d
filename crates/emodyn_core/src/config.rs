use crate::error::{Result as SimResult, SimulationError};
use crate::model::{CouplingResponse, Family, ForcingShape, Linearity, ModelSpec, RegulationShape};
use crate::params::{CouplingMatrix, ModelParameters};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

// ============================================================================
// Top-level config
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EmodynConfig {
    pub integrator: IntegratorConfig,
    pub analytic: AnalyticConfig,
    pub experiments: Vec<ExperimentConfig>,
}

impl EmodynConfig {
    /// Load config from a TOML file, falling back to defaults for missing fields.
    /// After loading, env var overrides are applied.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let mut config: EmodynConfig =
            toml::from_str(&content).with_context(|| "Failed to parse TOML config")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Try to load from path; if the file is missing or invalid, return defaults with env overrides.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::info!("Config file not found or invalid ({:#}), using defaults", e);
                let mut cfg = Self::default();
                cfg.apply_env_overrides();
                cfg
            }
        }
    }

    /// Experiments to run: the configured ones, or the reference suite when none are given.
    pub fn experiments_or_reference(&self) -> Vec<ExperimentConfig> {
        if self.experiments.is_empty() {
            ExperimentConfig::reference_suite()
        } else {
            self.experiments.clone()
        }
    }

    /// Apply environment variable overrides on top of file-based config.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("EMODYN_STEP_SIZE") {
            if let Ok(n) = v.parse() {
                self.integrator.step_size = n;
            }
        }
        if let Ok(v) = std::env::var("EMODYN_T_END") {
            if let Ok(n) = v.parse() {
                self.integrator.t_end = n;
            }
        }
        if let Ok(v) = std::env::var("EMODYN_METHOD") {
            match v.parse() {
                Ok(m) => self.integrator.method = m,
                Err(e) => tracing::warn!("Ignoring EMODYN_METHOD: {}", e),
            }
        }
        if let Ok(v) = std::env::var("EMODYN_MAX_STEPS") {
            if let Ok(n) = v.parse() {
                self.integrator.max_steps = n;
            }
        }
    }
}

// ============================================================================
// Sub-configs
// ============================================================================

/// Fixed-step explicit integration scheme.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    /// Forward Euler: local truncation error O(h²), global O(h)
    Euler,
    /// Heun (explicit trapezoid): local O(h³), global O(h²)
    Heun,
    /// Classic Runge-Kutta: local O(h⁵), global O(h⁴)
    #[default]
    Rk4,
}

impl Method {
    /// Global order of accuracy: halving h divides the error by `2^order`.
    pub fn order(self) -> u32 {
        match self {
            Method::Euler => 1,
            Method::Heun => 2,
            Method::Rk4 => 4,
        }
    }

    /// Derivative evaluations per step.
    pub fn stages(self) -> usize {
        match self {
            Method::Euler => 1,
            Method::Heun => 2,
            Method::Rk4 => 4,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Method::Euler => "euler",
            Method::Heun => "heun",
            Method::Rk4 => "rk4",
        };
        f.write_str(s)
    }
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "euler" => Ok(Method::Euler),
            "heun" => Ok(Method::Heun),
            "rk4" => Ok(Method::Rk4),
            other => Err(format!("unknown integration method '{}'", other)),
        }
    }
}

/// Numerical-path run configuration: `{step_size, t_end, method}` plus a step cap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegratorConfig {
    /// Time increment per step.
    pub step_size: f64,
    /// Total simulation horizon.
    pub t_end: f64,
    pub method: Method,
    /// Safety bound against runaway loops from tiny step sizes.
    pub max_steps: usize,
}

impl Default for IntegratorConfig {
    fn default() -> Self {
        Self {
            step_size: 0.01,
            t_end: 10.0,
            method: Method::Rk4,
            max_steps: 10_000_000,
        }
    }
}

impl IntegratorConfig {
    pub fn new(step_size: f64, t_end: f64, method: Method) -> Self {
        Self {
            step_size,
            t_end,
            method,
            ..Default::default()
        }
    }

    /// `step_size` must be finite and > 0, `t_end` finite and >= 0.
    pub fn validate(&self) -> SimResult<()> {
        self.validate_stepping()?;
        if !self.t_end.is_finite() || self.t_end < 0.0 {
            return Err(SimulationError::InvalidStepSize(format!(
                "t_end must be finite and >= 0, got {}",
                self.t_end
            )));
        }
        Ok(())
    }

    /// Check `step_size` and `max_steps` only, for callers that supply
    /// their own horizon.
    pub fn validate_stepping(&self) -> SimResult<()> {
        if !self.step_size.is_finite() || self.step_size <= 0.0 {
            return Err(SimulationError::InvalidStepSize(format!(
                "step_size must be finite and > 0, got {}",
                self.step_size
            )));
        }
        if self.max_steps == 0 {
            return Err(SimulationError::InvalidStepSize(
                "max_steps must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticConfig {
    /// Relative tolerance of the diagonalizability checks.
    pub tolerance: f64,
}

impl Default for AnalyticConfig {
    fn default() -> Self {
        Self { tolerance: 1e-8 }
    }
}

/// Which solver path an experiment asks for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverPreference {
    /// Closed form when the model admits one, numerical otherwise.
    #[default]
    Auto,
    /// Closed form only; unsupported models fail.
    Analytic,
    Numerical,
}

// ============================================================================
// Experiments
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ExperimentConfig {
    pub name: String,
    pub model: ModelConfig,
    pub initial: Vec<f64>,
    #[serde(default)]
    pub solver: SolverPreference,
    /// Output grid size (`linspace(0, t_end, samples)`); the step grid when absent.
    #[serde(default)]
    pub samples: Option<usize>,
    #[serde(default)]
    pub t_end: Option<f64>,
    #[serde(default)]
    pub step_size: Option<f64>,
    #[serde(default)]
    pub method: Option<Method>,
    #[serde(default)]
    pub sweep: Option<SweepConfig>,
}

impl ExperimentConfig {
    /// Experiment-level overrides applied on top of the global integrator config.
    pub fn integrator(&self, base: &IntegratorConfig) -> IntegratorConfig {
        IntegratorConfig {
            step_size: self.step_size.unwrap_or(base.step_size),
            t_end: self.t_end.unwrap_or(base.t_end),
            method: self.method.unwrap_or(base.method),
            max_steps: base.max_steps,
        }
    }

    /// The four reference experiments: decay, constant stimuli, logistic
    /// regulation from three starting intensities, and a driven pair.
    pub fn reference_suite() -> Vec<ExperimentConfig> {
        let scalar = |name: &str, family: FamilyConfig, coefficients: &[(&str, f64)], y0: f64, t_end: f64| {
            ExperimentConfig {
                name: name.to_string(),
                model: ModelConfig {
                    family,
                    variables: vec!["intensity".to_string()],
                    coefficients: coefficients
                        .iter()
                        .map(|(k, v)| (k.to_string(), *v))
                        .collect(),
                    coupling: None,
                    linear: None,
                },
                initial: vec![y0],
                solver: SolverPreference::Auto,
                samples: Some(100),
                t_end: Some(t_end),
                step_size: None,
                method: None,
                sweep: None,
            }
        };

        let mut suite = vec![
            scalar("decay", FamilyConfig::Decay, &[("decay_rate", 0.5)], 10.0, 20.0),
            scalar(
                "stimuli",
                FamilyConfig::Forced {
                    shape: ForcingShape::Constant,
                },
                &[("decay_rate", 0.5), ("level", 2.0)],
                0.0,
                20.0,
            ),
        ];
        for y0 in [0.1, 0.5, 1.2] {
            suite.push(scalar(
                &format!("regulation-y0-{}", y0),
                FamilyConfig::Regulated {
                    shape: RegulationShape::Logistic,
                },
                &[("decay_rate", 0.2), ("gain", 0.8)],
                y0,
                30.0,
            ));
        }
        suite.push(ExperimentConfig {
            name: "coupled".to_string(),
            model: ModelConfig {
                family: FamilyConfig::Coupled {
                    response: CouplingResponse::Linear,
                },
                variables: vec!["fatigue".to_string(), "anxiety".to_string()],
                coefficients: BTreeMap::new(),
                coupling: Some(vec![vec![-0.5, 0.5], vec![0.0, -0.2]]),
                linear: None,
            },
            initial: vec![5.0, 5.0],
            solver: SolverPreference::Auto,
            samples: Some(100),
            t_end: Some(30.0),
            step_size: None,
            method: None,
            sweep: None,
        });
        suite
    }
}

/// Model definition as written in the experiment file.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    pub family: FamilyConfig,
    pub variables: Vec<String>,
    #[serde(default)]
    pub coefficients: BTreeMap<String, f64>,
    #[serde(default)]
    pub coupling: Option<Vec<Vec<f64>>>,
    /// Declared linearity; the family's structural linearity when absent.
    #[serde(default)]
    pub linear: Option<bool>,
}

impl ModelConfig {
    pub fn build(&self, name: &str) -> SimResult<ModelSpec> {
        let mut params = ModelParameters::from_map(self.coefficients.clone())?;
        if let Some(rows) = &self.coupling {
            params = params.with_coupling(CouplingMatrix::from_rows(rows.clone())?);
        }
        let family = match self.family {
            FamilyConfig::Decay => Family::Decay,
            FamilyConfig::Forced { shape } => Family::Forced(shape),
            FamilyConfig::Regulated { shape } => Family::Regulated(shape),
            FamilyConfig::Coupled { response } => Family::Coupled(response),
        };
        let spec = ModelSpec::new(name, self.variables.clone(), params, family)?;
        match self.linear {
            Some(true) => spec.with_linearity(Linearity::Linear),
            Some(false) => spec.with_linearity(Linearity::Nonlinear),
            None => Ok(spec),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FamilyConfig {
    Decay,
    Forced { shape: ForcingShape },
    Regulated { shape: RegulationShape },
    Coupled { response: CouplingResponse },
}

/// Run the experiment once per value of one parameter.
#[derive(Debug, Clone, Deserialize)]
pub struct SweepConfig {
    /// Coefficient name, or `coupling.<row>.<col>`.
    pub parameter: String,
    pub values: Vec<f64>,
}

// ============================================================================
// Tests
// ============================================================================
