use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use rdt_abstract::Protocol;
use rdt_core::{DropPolicy, Receiver, UdpTransport, UnreliableChannel};
use tracing::{info, warn};

use crate::{ChannelArgs, parse_protocol};

#[derive(Parser, Debug)]
#[command(name = "rdt-recv", author, version, about = "Receive files over a lossy UDP channel")]
pub struct RecvArgs {
    /// Port to listen on.
    #[arg(short = 'p', long)]
    pub port: u16,

    /// 0 = Stop-and-Wait, 1 = Go-Back-N.
    #[arg(short = 'r', long, value_parser = parse_protocol)]
    pub protocol: Protocol,

    /// Accepted for symmetry with the sender; the receiver window is always 1.
    #[arg(short = 'n', long = "window")]
    pub window_size: Option<usize>,

    #[arg(long, default_value = "127.0.0.1")]
    pub host: IpAddr,

    #[arg(long, default_value = "ServerCache")]
    pub output_dir: PathBuf,

    /// Exit after the first session ends.
    #[arg(long, default_value_t = false)]
    pub once: bool,

    #[command(flatten)]
    pub channel: ChannelArgs,
}

pub async fn run(args: RecvArgs) -> anyhow::Result<()> {
    let config = args.channel.resolve(args.window_size)?;
    let addr = SocketAddr::new(args.host, args.port);
    let transport = UdpTransport::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    let channel = UnreliableChannel::new(transport, DropPolicy::from_config(config.loss, config.seed));
    let mut receiver = Receiver::new(channel, args.protocol, &args.output_dir);

    let limit = args.once.then_some(1);
    tokio::select! {
        result = receiver.run(limit) => result?,
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
    }

    for path in receiver.shutdown().await? {
        warn!("Left unfinished: {}", path.display());
    }
    info!("{} session(s) completed", receiver.completed());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_is_well_formed() {
        RecvArgs::command().debug_assert();
    }

    #[test]
    fn parses_short_flags() {
        let args = RecvArgs::try_parse_from(["rdt-recv", "-p", "9000", "-r", "snw", "--once"]).unwrap();
        assert_eq!(args.protocol, Protocol::StopAndWait);
        assert!(args.once);
        assert_eq!(args.output_dir, PathBuf::from("ServerCache"));
    }
}
