//! # emodyn solver
//!
//! Two ways to turn a [`ModelSpec`](emodyn_core::ModelSpec) into a
//! [`Trajectory`](emodyn_core::Trajectory):
//! - [`analytic`]: closed forms for linear models
//! - [`integrator`]: Euler / Heun / RK4 for everything
//!
//! [`dispatch::simulate`] picks between them.

pub mod analytic;
pub mod dispatch;
pub mod grid;
pub mod integrator;
pub mod modal;

pub use analytic::{
    check_closed_form, solve_analytic, solve_analytic_with, steady_state_response, SteadyState,
};
pub use dispatch::{select_path, simulate, Run, RunPlan, SolverPath};
pub use grid::{step_grid, time_grid, validate_time_points};
pub use integrator::{integrate, integrate_at, step};
pub use modal::{ModalDecomposition, ModalError};
