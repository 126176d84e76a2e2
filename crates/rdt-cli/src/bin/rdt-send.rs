use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use rdt_cli::send::{self, SendArgs};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = SendArgs::parse();
    rdt_cli::init_logging();

    let source = args.source_path();
    if !source.is_file() {
        SendArgs::command()
            .error(
                ErrorKind::ValueValidation,
                format!("file {} does not exist", source.display()),
            )
            .exit();
    }

    let stats = send::run(args).await?;
    info!(
        "Done: {} packets transmitted, {} retransmitted, {} timeouts, {} ms",
        stats.packets_transmitted, stats.retransmissions, stats.timeouts, stats.elapsed_ms
    );
    Ok(())
}
