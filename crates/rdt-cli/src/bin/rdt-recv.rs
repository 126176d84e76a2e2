use clap::Parser;
use rdt_cli::recv::{self, RecvArgs};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = RecvArgs::parse();
    rdt_cli::init_logging();
    recv::run(args).await
}
