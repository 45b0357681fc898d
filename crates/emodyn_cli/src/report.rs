//! Output formatting. Everything here writes to stdout; logs go to stderr.

use crate::runner::{Outcome, RunReport};
use anyhow::Result;
use emodyn_solver::SolverPath;
use std::io::Write;

/// Pretty-printed JSON array of all reports.
pub fn write_json<W: Write>(out: &mut W, reports: &[RunReport]) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, reports)?;
    writeln!(out)?;
    Ok(())
}

/// One line per run: name, path, sample count and final state.
pub fn write_summary<W: Write>(out: &mut W, reports: &[RunReport]) -> Result<()> {
    for report in reports {
        let name = match &report.sweep {
            Some((parameter, value)) => format!("{} [{}={}]", report.experiment, parameter, value),
            None => report.experiment.clone(),
        };
        match &report.outcome {
            Outcome::Run(run) => {
                let traj = &run.trajectory;
                let last: Vec<String> = traj
                    .variables()
                    .iter()
                    .zip(traj.final_state())
                    .map(|(v, x)| format!("{}={:.6}", v, x))
                    .collect();
                writeln!(
                    out,
                    "{:<28} {:<10} samples={:<6} t={:<8} {}",
                    name,
                    path_label(&run.path),
                    traj.len(),
                    traj.final_time(),
                    last.join(" ")
                )?;
                if let SolverPath::NumericalFallback { reason } = &run.path {
                    writeln!(out, "  fallback: {}", reason)?;
                }
            }
            Outcome::Error(e) => writeln!(out, "{:<28} error: {}", name, e)?,
        }
        if let Some(fig) = &report.figure {
            writeln!(
                out,
                "  figure: \"{}\" ({} series, {} reference lines)",
                fig.title,
                fig.series.len(),
                fig.reference_lines.len()
            )?;
        }
    }
    Ok(())
}

fn path_label(path: &SolverPath) -> &'static str {
    match path {
        SolverPath::Analytic => "analytic",
        SolverPath::Numerical => "numerical",
        SolverPath::NumericalFallback { .. } => "fallback",
    }
}
