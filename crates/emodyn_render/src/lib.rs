//! # emodyn render
//!
//! Trajectories in, figure descriptions out. Nothing here draws: a
//! [`Figure`] is plain data (serializable) that any plotting frontend can
//! turn into a line chart.

use emodyn_core::{Equilibrium, ModelSpec, Trajectory};
use serde::Serialize;

/// Default series colors, assigned in order.
pub const PALETTE: [&str; 5] = ["navy", "firebrick", "purple", "orange", "teal"];

const EQUILIBRIUM_COLOR: &str = "teal";
const GRID_ALPHA: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LineStyle {
    Solid,
    Dashed,
}

/// One plotted line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub label: String,
    pub color: String,
    pub line_style: LineStyle,
    pub times: Vec<f64>,
    pub values: Vec<f64>,
    /// Shade the area under the line with this opacity.
    pub fill_alpha: Option<f64>,
}

/// Horizontal marker, e.g. an equilibrium.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferenceLine {
    pub y: f64,
    pub label: String,
    pub color: String,
    pub line_style: LineStyle,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Figure {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub grid_alpha: f64,
    pub series: Vec<Series>,
    pub reference_lines: Vec<ReferenceLine>,
}

/// Presentation choices for [`figure`].
#[derive(Debug, Clone, PartialEq)]
pub struct FigureStyle {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub palette: Vec<String>,
    /// Applied to the first series only.
    pub fill_alpha: Option<f64>,
    /// Every variable after the first is drawn dashed.
    pub dash_secondary: bool,
    pub reference_lines: Vec<ReferenceLine>,
}

impl Default for FigureStyle {
    fn default() -> Self {
        Self {
            title: String::new(),
            x_label: "Time".to_string(),
            y_label: "Emotional Intensity".to_string(),
            palette: PALETTE.iter().map(|c| c.to_string()).collect(),
            fill_alpha: None,
            dash_secondary: false,
            reference_lines: Vec::new(),
        }
    }
}

impl FigureStyle {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Style for a model's run: titled after the model, with its stable
    /// equilibria as dashed reference lines.
    pub fn for_model(model: &ModelSpec) -> Self {
        let mut style = Self::titled(model.name());
        style.dash_secondary = model.dimension() > 1;
        style.reference_lines = equilibrium_lines(&model.equilibria());
        style
    }

    pub fn with_fill(mut self, alpha: f64) -> Self {
        self.fill_alpha = Some(alpha.clamp(0.0, 1.0));
        self
    }

    fn color(&self, index: usize) -> String {
        if self.palette.is_empty() {
            return PALETTE[index % PALETTE.len()].to_string();
        }
        self.palette[index % self.palette.len()].clone()
    }
}

/// One series per state variable of `trajectory`.
pub fn figure(trajectory: &Trajectory, style: &FigureStyle) -> Figure {
    let times = trajectory.times().to_vec();
    let series = trajectory
        .variables()
        .iter()
        .enumerate()
        .map(|(i, name)| Series {
            label: name.clone(),
            color: style.color(i),
            line_style: if style.dash_secondary && i > 0 {
                LineStyle::Dashed
            } else {
                LineStyle::Solid
            },
            times: times.clone(),
            values: trajectory.state_series(name).unwrap_or_default(),
            fill_alpha: if i == 0 { style.fill_alpha } else { None },
        })
        .collect();
    build(style, series)
}

/// One series per labelled run, plotting `variable` (e.g. several initial
/// conditions of the same model). Runs without that variable are skipped.
pub fn overlay(runs: &[(String, &Trajectory)], variable: &str, style: &FigureStyle) -> Figure {
    let series = runs
        .iter()
        .filter_map(|(label, trajectory)| {
            trajectory
                .state_series(variable)
                .map(|values| (label, trajectory, values))
        })
        .enumerate()
        .map(|(i, (label, trajectory, values))| Series {
            label: label.clone(),
            color: style.color(i),
            line_style: LineStyle::Solid,
            times: trajectory.times().to_vec(),
            values,
            fill_alpha: None,
        })
        .collect();
    build(style, series)
}

/// Dashed lines at the stable fixed points.
pub fn equilibrium_lines(equilibria: &[Equilibrium]) -> Vec<ReferenceLine> {
    equilibria
        .iter()
        .filter(|eq| eq.stable)
        .map(|eq| ReferenceLine {
            y: eq.value,
            label: format!("Equilibrium (y={:.2})", eq.value),
            color: EQUILIBRIUM_COLOR.to_string(),
            line_style: LineStyle::Dashed,
        })
        .collect()
}

fn build(style: &FigureStyle, series: Vec<Series>) -> Figure {
    Figure {
        title: style.title.clone(),
        x_label: style.x_label.clone(),
        y_label: style.y_label.clone(),
        grid_alpha: GRID_ALPHA,
        series,
        reference_lines: style.reference_lines.clone(),
    }
}
