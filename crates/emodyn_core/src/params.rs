//! Model parameters: named coefficients plus an optional coupling matrix.

use crate::error::{Result, SimulationError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Named real-valued coefficients of a model.
///
/// Values are guaranteed finite. A spec owns its parameters; runs only read
/// them, and sweeps derive a fresh spec per value instead of mutating.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ModelParameters {
    coefficients: BTreeMap<String, f64>,
    coupling: Option<CouplingMatrix>,
}

impl ModelParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a name → value map, rejecting non-finite values.
    pub fn from_map(coefficients: BTreeMap<String, f64>) -> Result<Self> {
        let mut params = Self::new();
        for (name, value) in coefficients {
            params = params.with(name, value)?;
        }
        Ok(params)
    }

    /// Add or replace a coefficient.
    pub fn with(mut self, name: impl Into<String>, value: f64) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(SimulationError::InvalidModel(
                "parameter name must not be empty".to_string(),
            ));
        }
        if !value.is_finite() {
            return Err(SimulationError::InvalidModel(format!(
                "parameter '{}' must be finite, got {}",
                name, value
            )));
        }
        self.coefficients.insert(name, value);
        Ok(self)
    }

    pub fn with_coupling(mut self, coupling: CouplingMatrix) -> Self {
        self.coupling = Some(coupling);
        self
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.coefficients.get(name).copied()
    }

    /// Value of an optional coefficient, `default` when absent.
    pub fn get_or(&self, name: &str, default: f64) -> f64 {
        self.get(name).unwrap_or(default)
    }

    /// Value of a coefficient the model cannot do without.
    pub fn require(&self, name: &str) -> Result<f64> {
        self.get(name).ok_or_else(|| {
            SimulationError::InvalidModel(format!("missing required parameter '{}'", name))
        })
    }

    pub fn coupling(&self) -> Option<&CouplingMatrix> {
        self.coupling.as_ref()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.coefficients.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.coefficients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coefficients.is_empty() && self.coupling.is_none()
    }
}

/// Square matrix of coupling strengths, row-major.
///
/// Entry `(i, j)` is the influence of state `j` on the rate of state `i`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<f64>>", into = "Vec<Vec<f64>>")]
pub struct CouplingMatrix {
    dim: usize,
    entries: Vec<f64>,
}

impl CouplingMatrix {
    /// Build from rows; every row must have as many entries as there are rows.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self> {
        let dim = rows.len();
        if dim == 0 {
            return Err(SimulationError::InvalidModel(
                "coupling matrix must not be empty".to_string(),
            ));
        }
        let mut entries = Vec::with_capacity(dim * dim);
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != dim {
                return Err(SimulationError::InvalidModel(format!(
                    "coupling matrix must be square: row {} has {} entries, expected {}",
                    i,
                    row.len(),
                    dim
                )));
            }
            if let Some(bad) = row.iter().find(|v| !v.is_finite()) {
                return Err(SimulationError::InvalidModel(format!(
                    "coupling matrix row {} contains non-finite value {}",
                    i, bad
                )));
            }
            entries.extend(row);
        }
        Ok(Self { dim, entries })
    }

    /// Diagonal matrix with the given entries.
    pub fn diagonal(values: &[f64]) -> Result<Self> {
        let rows = (0..values.len())
            .map(|i| {
                let mut row = vec![0.0; values.len()];
                row[i] = values[i];
                row
            })
            .collect();
        Self::from_rows(rows)
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.entries[row * self.dim + col]
    }

    pub fn row(&self, row: usize) -> &[f64] {
        &self.entries[row * self.dim..(row + 1) * self.dim]
    }

    /// Row-major entries, suitable for `DMatrix::from_row_slice`.
    pub fn as_row_major(&self) -> &[f64] {
        &self.entries
    }

    /// `W·x`
    pub fn apply(&self, x: &[f64]) -> Vec<f64> {
        (0..self.dim)
            .map(|i| self.row(i).iter().zip(x).map(|(w, v)| w * v).sum())
            .collect()
    }

    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        (0..self.dim).map(|i| self.row(i).to_vec()).collect()
    }
}

impl TryFrom<Vec<Vec<f64>>> for CouplingMatrix {
    type Error = SimulationError;

    fn try_from(rows: Vec<Vec<f64>>) -> Result<Self> {
        Self::from_rows(rows)
    }
}

impl From<CouplingMatrix> for Vec<Vec<f64>> {
    fn from(m: CouplingMatrix) -> Self {
        m.to_rows()
    }
}
