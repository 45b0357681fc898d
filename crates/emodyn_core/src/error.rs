//! Error taxonomy shared by every solver path.
//!
//! Errors are raised at the point of detection and never retried internally.
//! A failed run never yields a partial trajectory.

/// Errors produced while defining or solving an emotional-dynamics model.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SimulationError {
    /// The caller declared a model linear but its rate law is not.
    #[error("model '{model}' is declared linear but its derivative is nonlinear: {reason}")]
    ModelClassification { model: String, reason: String },

    /// The closed-form path cannot handle this model.
    #[error("no closed-form solution for model '{model}': {reason}")]
    UnsupportedModel { model: String, reason: String },

    /// Malformed integrator configuration (step size or horizon).
    #[error("invalid integrator configuration: {0}")]
    InvalidStepSize(String),

    /// A state value became NaN or infinite during integration.
    #[error(
        "numerical instability in model '{model}' at t={time}: '{variable}' became {value}; \
         reduce step_size or check parameters"
    )]
    NumericalInstability {
        model: String,
        time: f64,
        variable: String,
        value: f64,
    },

    /// The model definition itself is malformed (missing or non-finite parameter, bad names).
    #[error("invalid model definition: {0}")]
    InvalidModel(String),

    /// The derivative produced the wrong number of rates.
    #[error("model '{model}' returned {got} rates for {expected} state variables")]
    DimensionMismatch {
        model: String,
        expected: usize,
        got: usize,
    },

    #[error("invalid initial condition: {0}")]
    InvalidInitialCondition(String),

    #[error("invalid time points: {0}")]
    InvalidTimePoints(String),

    /// The run would need more steps than the configured safety cap.
    #[error("run needs {required} steps but max_steps is {max_steps}")]
    IterationCapExceeded { required: usize, max_steps: usize },
}

pub type Result<T> = std::result::Result<T, SimulationError>;
