//! Model Definition: the rate laws governing emotional state evolution
//!
//! dx/dt = F(t, x; θ) where:
//! - x = state vector (one intensity per emotion)
//! - θ = named coefficients (plus a coupling matrix for multi-state models)
//! - t = time
//!
//! Four built-in families cover the reference experiments:
//! - Decay:      dx/dt = -k·x
//! - Forced:     dx/dt = -k·x + F(t)
//! - Regulated:  dx/dt = -k·x + R(x)        (nonlinear)
//! - Coupled:    dx/dt = W·x  or  W·tanh(x)
//!
//! Each spec carries an explicit [`Linearity`] tag. Solver selection reads the
//! tag; it never inspects the rate law at run time.

use crate::error::{Result, SimulationError};
use crate::params::{CouplingMatrix, ModelParameters};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Canonical parameter names read by the built-in families.
pub mod param {
    pub const DECAY_RATE: &str = "decay_rate";
    pub const LEVEL: &str = "level";
    pub const OFFSET: &str = "offset";
    pub const AMPLITUDE: &str = "amplitude";
    pub const FREQUENCY: &str = "frequency";
    pub const PHASE: &str = "phase";
    pub const ONSET: &str = "onset";
    pub const GAIN: &str = "gain";
    pub const THRESHOLD: &str = "threshold";
    pub const EXPONENT: &str = "exponent";
}

/// Trait for caller-supplied rate laws.
///
/// Must return exactly one rate per state variable.
pub trait Dynamics: Send + Sync {
    fn rate(&self, t: f64, state: &[f64], params: &ModelParameters) -> Vec<f64>;
}

impl<F> Dynamics for F
where
    F: Fn(f64, &[f64], &ModelParameters) -> Vec<f64> + Send + Sync,
{
    fn rate(&self, t: f64, state: &[f64], params: &ModelParameters) -> Vec<f64> {
        self(t, state, params)
    }
}

/// Whether the rate law is linear (affine) in the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Linearity {
    Linear,
    Nonlinear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForcingShape {
    /// F = level
    Constant,
    /// F = offset + amplitude·sin(frequency·t + phase)
    Sinusoidal,
    /// F = level for t >= onset, 0 before
    Step,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegulationShape {
    /// R = gain·x·(1 - x)
    Logistic,
    /// R = gain·sign(x)·|x|^n / (threshold^n + |x|^n)
    Saturating,
    /// R = -gain·max(0, x - threshold)
    Threshold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CouplingResponse {
    /// dx/dt = W·x
    Linear,
    /// dx/dt = W·tanh(x)
    Tanh,
}

/// Structure of the rate law.
#[derive(Clone)]
pub enum Family {
    Decay,
    Forced(ForcingShape),
    Regulated(RegulationShape),
    Coupled(CouplingResponse),
    Custom(Arc<dyn Dynamics>),
}

impl fmt::Debug for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Family::Decay => write!(f, "Decay"),
            Family::Forced(shape) => write!(f, "Forced({:?})", shape),
            Family::Regulated(shape) => write!(f, "Regulated({:?})", shape),
            Family::Coupled(response) => write!(f, "Coupled({:?})", response),
            Family::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

impl Family {
    /// Linearity implied by the structure; `None` for custom rate laws.
    pub fn structural_linearity(&self) -> Option<Linearity> {
        match self {
            Family::Decay | Family::Forced(_) => Some(Linearity::Linear),
            Family::Coupled(CouplingResponse::Linear) => Some(Linearity::Linear),
            Family::Regulated(_) | Family::Coupled(CouplingResponse::Tanh) => {
                Some(Linearity::Nonlinear)
            }
            Family::Custom(_) => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Family::Decay => "decay",
            Family::Forced(_) => "forced",
            Family::Regulated(_) => "regulated",
            Family::Coupled(_) => "coupled",
            Family::Custom(_) => "custom",
        }
    }

    fn is_scalar(&self) -> bool {
        matches!(
            self,
            Family::Decay | Family::Forced(_) | Family::Regulated(_)
        )
    }
}

/// Typed forcing description for [`ModelSpec::forced`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Forcing {
    Constant {
        level: f64,
    },
    Sinusoidal {
        offset: f64,
        amplitude: f64,
        frequency: f64,
        phase: f64,
    },
    Step {
        level: f64,
        onset: f64,
    },
}

/// Typed regulation description for [`ModelSpec::regulated`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Regulation {
    Logistic { gain: f64 },
    Saturating { gain: f64, threshold: f64, exponent: f64 },
    Threshold { gain: f64, threshold: f64 },
}

/// Fixed point of a single-variable model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Equilibrium {
    pub value: f64,
    /// `f'(x*) < 0`
    pub stable: bool,
}

/// A named emotional-dynamics model: variables, parameters, rate law, linearity tag.
#[derive(Debug, Clone)]
pub struct ModelSpec {
    name: String,
    variables: Vec<String>,
    params: ModelParameters,
    family: Family,
    linearity: Linearity,
}

impl ModelSpec {
    /// Build and validate a model. Built-in families take their structural
    /// linearity; custom rate laws start as [`Linearity::Nonlinear`].
    pub fn new(
        name: impl Into<String>,
        variables: Vec<String>,
        params: ModelParameters,
        family: Family,
    ) -> Result<Self> {
        let linearity = family
            .structural_linearity()
            .unwrap_or(Linearity::Nonlinear);
        let spec = Self {
            name: name.into(),
            variables,
            params,
            family,
            linearity,
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Pure decay: dx/dt = -k·x
    pub fn decay(name: impl Into<String>, variable: impl Into<String>, decay_rate: f64) -> Result<Self> {
        let params = ModelParameters::new().with(param::DECAY_RATE, decay_rate)?;
        Self::new(name, vec![variable.into()], params, Family::Decay)
    }

    /// Decay plus an external forcing term.
    pub fn forced(
        name: impl Into<String>,
        variable: impl Into<String>,
        decay_rate: f64,
        forcing: Forcing,
    ) -> Result<Self> {
        let params = ModelParameters::new().with(param::DECAY_RATE, decay_rate)?;
        let (shape, params) = match forcing {
            Forcing::Constant { level } => (ForcingShape::Constant, params.with(param::LEVEL, level)?),
            Forcing::Sinusoidal {
                offset,
                amplitude,
                frequency,
                phase,
            } => (
                ForcingShape::Sinusoidal,
                params
                    .with(param::OFFSET, offset)?
                    .with(param::AMPLITUDE, amplitude)?
                    .with(param::FREQUENCY, frequency)?
                    .with(param::PHASE, phase)?,
            ),
            Forcing::Step { level, onset } => (
                ForcingShape::Step,
                params.with(param::LEVEL, level)?.with(param::ONSET, onset)?,
            ),
        };
        Self::new(name, vec![variable.into()], params, Family::Forced(shape))
    }

    /// Decay plus a nonlinear self-regulation term.
    pub fn regulated(
        name: impl Into<String>,
        variable: impl Into<String>,
        decay_rate: f64,
        regulation: Regulation,
    ) -> Result<Self> {
        let params = ModelParameters::new().with(param::DECAY_RATE, decay_rate)?;
        let (shape, params) = match regulation {
            Regulation::Logistic { gain } => (RegulationShape::Logistic, params.with(param::GAIN, gain)?),
            Regulation::Saturating {
                gain,
                threshold,
                exponent,
            } => (
                RegulationShape::Saturating,
                params
                    .with(param::GAIN, gain)?
                    .with(param::THRESHOLD, threshold)?
                    .with(param::EXPONENT, exponent)?,
            ),
            Regulation::Threshold { gain, threshold } => (
                RegulationShape::Threshold,
                params.with(param::GAIN, gain)?.with(param::THRESHOLD, threshold)?,
            ),
        };
        Self::new(name, vec![variable.into()], params, Family::Regulated(shape))
    }

    /// N interacting states weighted by a coupling matrix.
    pub fn coupled(
        name: impl Into<String>,
        variables: Vec<String>,
        coupling: CouplingMatrix,
        response: CouplingResponse,
    ) -> Result<Self> {
        let params = ModelParameters::new().with_coupling(coupling);
        Self::new(name, variables, params, Family::Coupled(response))
    }

    /// Caller-supplied rate law. Declared nonlinear until
    /// [`with_linearity`](Self::with_linearity) says otherwise.
    pub fn custom(
        name: impl Into<String>,
        variables: Vec<String>,
        params: ModelParameters,
        dynamics: impl Dynamics + 'static,
    ) -> Result<Self> {
        Self::new(name, variables, params, Family::Custom(Arc::new(dynamics)))
    }

    /// Declare the linearity of this model.
    ///
    /// Declaring a nonlinear rate law linear fails with
    /// [`SimulationError::ModelClassification`]. Declaring a linear model
    /// nonlinear is accepted and only forces the numerical path.
    pub fn with_linearity(mut self, declared: Linearity) -> Result<Self> {
        if declared == Linearity::Linear {
            match self.family.structural_linearity() {
                Some(Linearity::Nonlinear) => {
                    return Err(SimulationError::ModelClassification {
                        model: self.name.clone(),
                        reason: format!("{:?} models are nonlinear in the state", self.family),
                    });
                }
                Some(Linearity::Linear) => {}
                None => {
                    if let Err(reason) = self.probe_affine()? {
                        return Err(SimulationError::ModelClassification {
                            model: self.name.clone(),
                            reason,
                        });
                    }
                }
            }
        }
        self.linearity = declared;
        Ok(self)
    }

    /// Copy of this model with one coefficient replaced.
    ///
    /// `coupling.<row>.<col>` addresses a coupling-matrix entry.
    pub fn with_parameter(&self, name: &str, value: f64) -> Result<Self> {
        let params = match parse_coupling_key(name) {
            Some((row, col)) => {
                let coupling = self.params.coupling().ok_or_else(|| {
                    SimulationError::InvalidModel(format!(
                        "model '{}' has no coupling matrix to set '{}'",
                        self.name, name
                    ))
                })?;
                if row >= coupling.dim() || col >= coupling.dim() {
                    return Err(SimulationError::InvalidModel(format!(
                        "'{}' is outside the {}x{} coupling matrix",
                        name,
                        coupling.dim(),
                        coupling.dim()
                    )));
                }
                let mut rows = coupling.to_rows();
                rows[row][col] = value;
                self.params
                    .clone()
                    .with_coupling(CouplingMatrix::from_rows(rows)?)
            }
            None => self.params.clone().with(name, value)?,
        };
        let spec = Self {
            params,
            ..self.clone()
        };
        spec.validate()?;
        // Re-run the classification probe: a new coefficient can break linearity.
        if matches!(spec.family, Family::Custom(_)) && spec.linearity == Linearity::Linear {
            let declared = spec.linearity;
            return spec.with_linearity(declared);
        }
        Ok(spec)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn dimension(&self) -> usize {
        self.variables.len()
    }

    pub fn params(&self) -> &ModelParameters {
        &self.params
    }

    pub fn family(&self) -> &Family {
        &self.family
    }

    pub fn linearity(&self) -> Linearity {
        self.linearity
    }

    pub fn is_linear(&self) -> bool {
        self.linearity == Linearity::Linear
    }

    /// Rate of change of every state variable at `(t, state)`.
    pub fn derivative(&self, t: f64, state: &[f64]) -> Result<Vec<f64>> {
        if state.len() != self.dimension() {
            return Err(SimulationError::InvalidInitialCondition(format!(
                "model '{}' has {} variables but the state has {} values",
                self.name,
                self.dimension(),
                state.len()
            )));
        }

        let p = &self.params;
        let rates = match &self.family {
            Family::Decay => vec![-p.get_or(param::DECAY_RATE, 0.0) * state[0]],
            Family::Forced(shape) => {
                let k = p.get_or(param::DECAY_RATE, 0.0);
                vec![-k * state[0] + self.forcing_at(*shape, t)]
            }
            Family::Regulated(shape) => {
                let k = p.get_or(param::DECAY_RATE, 0.0);
                vec![-k * state[0] + self.regulation_at(*shape, state[0])]
            }
            Family::Coupled(response) => {
                // Validated at construction: coupled models always carry a matrix.
                let Some(w) = p.coupling() else {
                    return Err(SimulationError::InvalidModel(format!(
                        "coupled model '{}' has no coupling matrix",
                        self.name
                    )));
                };
                match response {
                    CouplingResponse::Linear => w.apply(state),
                    CouplingResponse::Tanh => {
                        let activated: Vec<f64> = state.iter().map(|x| x.tanh()).collect();
                        w.apply(&activated)
                    }
                }
            }
            Family::Custom(dynamics) => dynamics.rate(t, state, p),
        };

        if rates.len() != self.dimension() {
            return Err(SimulationError::DimensionMismatch {
                model: self.name.clone(),
                expected: self.dimension(),
                got: rates.len(),
            });
        }
        Ok(rates)
    }

    /// External input F(t) of a forced model.
    pub fn forcing_at(&self, shape: ForcingShape, t: f64) -> f64 {
        let p = &self.params;
        match shape {
            ForcingShape::Constant => p.get_or(param::LEVEL, 0.0),
            ForcingShape::Sinusoidal => {
                p.get_or(param::OFFSET, 0.0)
                    + p.get_or(param::AMPLITUDE, 0.0)
                        * (p.get_or(param::FREQUENCY, 0.0) * t + p.get_or(param::PHASE, 0.0)).sin()
            }
            ForcingShape::Step => {
                if t >= p.get_or(param::ONSET, 0.0) {
                    p.get_or(param::LEVEL, 0.0)
                } else {
                    0.0
                }
            }
        }
    }

    fn regulation_at(&self, shape: RegulationShape, x: f64) -> f64 {
        let p = &self.params;
        let gain = p.get_or(param::GAIN, 0.0);
        match shape {
            RegulationShape::Logistic => gain * x * (1.0 - x),
            RegulationShape::Saturating => {
                let n = p.get_or(param::EXPONENT, 1.0);
                let theta = p.get_or(param::THRESHOLD, 1.0);
                let xn = x.abs().powf(n);
                gain * x.signum() * xn / (theta.powf(n) + xn)
            }
            RegulationShape::Threshold => {
                -gain * (x - p.get_or(param::THRESHOLD, 0.0)).max(0.0)
            }
        }
    }

    /// Fixed points of single-variable models, where they have a closed form.
    ///
    /// Sinusoidal forcing reports `offset/k`, the level the steady
    /// oscillation is centred on.
    pub fn equilibria(&self) -> Vec<Equilibrium> {
        let p = &self.params;
        let k = p.get_or(param::DECAY_RATE, 0.0);
        let decaying = |value: f64| Equilibrium {
            value,
            stable: k > 0.0,
        };
        match &self.family {
            Family::Decay if k != 0.0 => vec![decaying(0.0)],
            Family::Forced(ForcingShape::Constant | ForcingShape::Step) if k != 0.0 => {
                vec![decaying(p.get_or(param::LEVEL, 0.0) / k)]
            }
            Family::Forced(ForcingShape::Sinusoidal) if k != 0.0 => {
                vec![decaying(p.get_or(param::OFFSET, 0.0) / k)]
            }
            Family::Regulated(RegulationShape::Logistic) => {
                // x·(a - k - a·x) = 0,  f'(x) = a - k - 2a·x
                let a = p.get_or(param::GAIN, 0.0);
                let slope_at_zero = a - k;
                let mut points = vec![Equilibrium {
                    value: 0.0,
                    stable: slope_at_zero < 0.0,
                }];
                if a != 0.0 && slope_at_zero != 0.0 {
                    points.push(Equilibrium {
                        value: 1.0 - k / a,
                        stable: -slope_at_zero < 0.0,
                    });
                }
                points
            }
            _ => Vec::new(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(SimulationError::InvalidModel(
                "model name must not be empty".to_string(),
            ));
        }
        if self.variables.is_empty() {
            return Err(SimulationError::InvalidModel(format!(
                "model '{}' declares no state variables",
                self.name
            )));
        }
        let mut seen = HashSet::new();
        for v in &self.variables {
            if v.trim().is_empty() {
                return Err(SimulationError::InvalidModel(format!(
                    "model '{}' has an empty variable name",
                    self.name
                )));
            }
            if !seen.insert(v.as_str()) {
                return Err(SimulationError::InvalidModel(format!(
                    "model '{}' declares variable '{}' twice",
                    self.name, v
                )));
            }
        }
        if self.family.is_scalar() && self.variables.len() != 1 {
            return Err(SimulationError::InvalidModel(format!(
                "{} model '{}' takes exactly one variable, got {}",
                self.family.label(),
                self.name,
                self.variables.len()
            )));
        }

        let p = &self.params;
        match &self.family {
            Family::Decay => {
                p.require(param::DECAY_RATE)?;
            }
            Family::Forced(shape) => {
                p.require(param::DECAY_RATE)?;
                match shape {
                    ForcingShape::Constant => {
                        p.require(param::LEVEL)?;
                    }
                    ForcingShape::Sinusoidal => {
                        p.require(param::AMPLITUDE)?;
                        p.require(param::FREQUENCY)?;
                    }
                    ForcingShape::Step => {
                        p.require(param::LEVEL)?;
                        if p.require(param::ONSET)? < 0.0 {
                            return Err(SimulationError::InvalidModel(format!(
                                "model '{}': onset must be >= 0",
                                self.name
                            )));
                        }
                    }
                }
            }
            Family::Regulated(shape) => {
                p.require(param::DECAY_RATE)?;
                p.require(param::GAIN)?;
                match shape {
                    RegulationShape::Logistic => {}
                    RegulationShape::Saturating => {
                        if p.require(param::THRESHOLD)? <= 0.0 || p.require(param::EXPONENT)? <= 0.0
                        {
                            return Err(SimulationError::InvalidModel(format!(
                                "model '{}': saturating regulation needs threshold > 0 and exponent > 0",
                                self.name
                            )));
                        }
                    }
                    RegulationShape::Threshold => {
                        p.require(param::THRESHOLD)?;
                    }
                }
            }
            Family::Coupled(_) => {
                let coupling = p.coupling().ok_or_else(|| {
                    SimulationError::InvalidModel(format!(
                        "coupled model '{}' needs a coupling matrix",
                        self.name
                    ))
                })?;
                if coupling.dim() != self.variables.len() {
                    return Err(SimulationError::InvalidModel(format!(
                        "model '{}': coupling matrix is {}x{} but there are {} variables",
                        self.name,
                        coupling.dim(),
                        coupling.dim(),
                        self.variables.len()
                    )));
                }
            }
            Family::Custom(_) => {}
        }
        Ok(())
    }

    /// Check affine superposition of the rate law at a handful of probe
    /// points. The outer `Result` carries evaluation errors, the inner one
    /// the reason the rate law is not affine.
    fn probe_affine(&self) -> Result<std::result::Result<(), String>> {
        let n = self.dimension();
        let x: Vec<f64> = (0..n).map(|i| 0.3 + 0.17 * i as f64).collect();
        let y: Vec<f64> = (0..n).map(|i| -0.45 + 0.11 * i as f64).collect();
        let x_plus_y: Vec<f64> = x.iter().zip(&y).map(|(a, b)| a + b).collect();
        let two_x: Vec<f64> = x.iter().map(|a| 2.0 * a).collect();
        let zero = vec![0.0; n];

        for &t in &PROBE_TIMES {
            let f0 = self.derivative(t, &zero)?;
            let fx = self.derivative(t, &x)?;
            let fy = self.derivative(t, &y)?;
            let fxy = self.derivative(t, &x_plus_y)?;
            let f2x = self.derivative(t, &two_x)?;

            let scale = 1.0
                + [&f0, &fx, &fy, &fxy, &f2x]
                    .iter()
                    .flat_map(|v| v.iter())
                    .fold(0.0_f64, |m, v| m.max(v.abs()));
            if !scale.is_finite() {
                return Ok(Err(format!("rate law is not finite at probe time t={}", t)));
            }

            for i in 0..n {
                let additivity = fxy[i] - fx[i] - fy[i] + f0[i];
                let homogeneity = f2x[i] - f0[i] - 2.0 * (fx[i] - f0[i]);
                if additivity.abs() > PROBE_TOLERANCE * scale {
                    return Ok(Err(format!(
                        "rate of '{}' violates additivity at t={} (residual {:.3e})",
                        self.variables[i], t, additivity
                    )));
                }
                if homogeneity.abs() > PROBE_TOLERANCE * scale {
                    return Ok(Err(format!(
                        "rate of '{}' violates homogeneity at t={} (residual {:.3e})",
                        self.variables[i], t, homogeneity
                    )));
                }
            }
        }
        Ok(Ok(()))
    }
}

/// Times at which custom rate laws are probed for linearity.
pub const PROBE_TIMES: [f64; 3] = [0.0, 0.73, 2.9];
const PROBE_TOLERANCE: f64 = 1e-8;

fn parse_coupling_key(name: &str) -> Option<(usize, usize)> {
    let rest = name.strip_prefix("coupling.")?;
    let (row, col) = rest.split_once('.')?;
    Some((row.parse().ok()?, col.parse().ok()?))
}
