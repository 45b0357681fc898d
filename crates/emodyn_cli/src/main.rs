use clap::{Parser, ValueEnum};
use emodyn_core::EmodynConfig;
use std::io::{self, Write};
use tracing_subscriber::{fmt, EnvFilter};

mod report;
mod runner;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Json,
    Summary,
}

#[derive(Parser, Debug)]
#[command(name = "emodyn", author, version, about, long_about = None)]
struct Args {
    /// Path to the experiment file
    #[arg(short, long, default_value = "emodyn.toml", env = "EMODYN_CONFIG")]
    config: String,

    /// Run only the experiment with this name
    #[arg(short, long)]
    experiment: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = Format::Summary)]
    format: Format,

    /// Attach figure descriptions to every run
    #[arg(long)]
    figures: bool,

    /// List experiment names and exit
    #[arg(long)]
    list: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let config = EmodynConfig::load_or_default(&args.config);
    let experiments = runner::select(&config, args.experiment.as_deref())?;

    let stdout = io::stdout();
    let mut out = stdout.lock();

    if args.list {
        for exp in &experiments {
            writeln!(out, "{}", exp.name)?;
        }
        return Ok(());
    }

    let reports = runner::run_all(&config, &experiments, args.figures).await?;
    match args.format {
        Format::Json => report::write_json(&mut out, &reports)?,
        Format::Summary => report::write_summary(&mut out, &reports)?,
    }
    out.flush()?;

    let failed = reports.iter().filter(|r| !r.is_ok()).count();
    if failed > 0 {
        anyhow::bail!("{} of {} run(s) failed", failed, reports.len());
    }
    Ok(())
}
