use clap::Parser;
use rdt_cli::sim::{self, SimArgs};
use tracing::info;

fn main() -> anyhow::Result<()> {
    let args = SimArgs::parse();
    rdt_cli::init_logging();

    let report = sim::run(args)?;
    info!(
        "{} ({}): {} bytes delivered intact={} in {} simulated ms, {} packets sent",
        report.scenario,
        report.protocol,
        report.delivered_len,
        report.delivered_intact,
        report.duration_ms,
        report.sender.packets_transmitted
    );
    Ok(())
}
