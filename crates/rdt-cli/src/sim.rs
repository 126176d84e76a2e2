use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use rdt_simulator::{SimulationReport, block_on_simulated, run_scenario_file};

#[derive(Parser, Debug)]
#[command(name = "rdt-sim", author, version, about = "Run an RDT scenario in simulated time")]
pub struct SimArgs {
    /// Scenario TOML file.
    #[arg(long)]
    pub scenario: PathBuf,

    /// Write a JSON trace of the finished simulation.
    #[arg(long)]
    pub trace_out: Option<PathBuf>,

    /// Where the simulated receiver writes; a temp directory by default.
    #[arg(long)]
    pub output_dir: Option<PathBuf>,
}

pub fn run(args: SimArgs) -> anyhow::Result<SimulationReport> {
    let output_dir = args.output_dir.clone().unwrap_or_else(|| {
        std::env::temp_dir().join(format!("rdt-sim-{}", std::process::id()))
    });
    let report = block_on_simulated(run_scenario_file(&args.scenario, &output_dir))
        .context("Failed to start simulation runtime")??;

    if let Some(path) = &args.trace_out {
        report.write_json(path)?;
    }
    if args.output_dir.is_none() {
        let _ = std::fs::remove_dir_all(&output_dir);
    }
    Ok(report)
}
