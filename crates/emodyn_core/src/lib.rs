//! # emodyn core
//!
//! Emotional states as solutions of ordinary differential equations.
//!
//! This crate holds what every solver path shares:
//! - [`ModelSpec`]: variables, [`ModelParameters`], rate law and [`Linearity`] tag
//! - [`Trajectory`]: the validated, immutable output of a run
//! - [`SimulationError`]: the error taxonomy
//! - [`EmodynConfig`]: TOML experiment files with env overrides

pub mod config;
pub mod error;
pub mod model;
pub mod params;
pub mod trajectory;

pub use config::{
    AnalyticConfig, EmodynConfig, ExperimentConfig, IntegratorConfig, Method, ModelConfig,
    SolverPreference, SweepConfig,
};
pub use error::{Result, SimulationError};
pub use model::{
    param, CouplingResponse, Dynamics, Equilibrium, Family, Forcing, ForcingShape, Linearity,
    ModelSpec, Regulation, RegulationShape,
};
pub use params::{CouplingMatrix, ModelParameters};
pub use trajectory::{validate_initial_condition, Trajectory, TrajectoryBuilder};
