use std::fs;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use rdt_abstract::Protocol;
use rdt_core::{
    ChunkSequence, DropPolicy, TransferStats, UdpTransport, UnreliableChannel, send_file,
};
use tracing::info;

use crate::{ChannelArgs, parse_protocol};

#[derive(Parser, Debug)]
#[command(name = "rdt-send", author, version, about = "Send a file over a lossy UDP channel")]
pub struct SendArgs {
    /// Receiver port.
    #[arg(short = 'p', long)]
    pub port: u16,

    /// 0 = Stop-and-Wait, 1 = Go-Back-N.
    #[arg(short = 'r', long, value_parser = parse_protocol)]
    pub protocol: Protocol,

    /// File name, resolved under --cache-dir.
    #[arg(short = 'f', long)]
    pub file: PathBuf,

    /// Go-Back-N window size.
    #[arg(short = 'n', long = "window")]
    pub window_size: Option<usize>,

    #[arg(long, default_value = "127.0.0.1")]
    pub host: IpAddr,

    #[arg(long, default_value = "ClientCache")]
    pub cache_dir: PathBuf,

    /// Write transfer statistics as JSON.
    #[arg(long)]
    pub report_out: Option<PathBuf>,

    #[command(flatten)]
    pub channel: ChannelArgs,
}

impl SendArgs {
    pub fn source_path(&self) -> PathBuf {
        self.cache_dir.join(&self.file)
    }
}

pub async fn run(args: SendArgs) -> anyhow::Result<TransferStats> {
    let config = args.channel.resolve(args.window_size)?;
    let path = args.source_path();
    let chunks = ChunkSequence::load(&path, config.mss, args.protocol)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    info!(
        "Sending {} ({} data packets) with {}",
        path.display(),
        chunks.data_chunks(),
        args.protocol
    );

    let local = match args.host {
        IpAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
        IpAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
    };
    let transport = UdpTransport::bind(local)
        .await
        .context("Failed to bind UDP socket")?;
    let mut channel = UnreliableChannel::new(transport, DropPolicy::from_config(config.loss, config.seed));
    let peer = SocketAddr::new(args.host, args.port);

    let stats = send_file(&mut channel, peer, &chunks, &config).await?;

    if let Some(out) = &args.report_out {
        let data = serde_json::to_vec_pretty(&stats).context("Failed to serialize report")?;
        fs::write(out, &data)
            .with_context(|| format!("Failed to write report {}", out.display()))?;
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_is_well_formed() {
        SendArgs::command().debug_assert();
    }

    #[test]
    fn parses_short_flags() {
        let args = SendArgs::try_parse_from(["rdt-send", "-p", "9000", "-r", "1", "-f", "a.txt", "-n", "8"])
            .unwrap();
        assert_eq!(args.port, 9000);
        assert_eq!(args.protocol, Protocol::GoBackN);
        assert_eq!(args.window_size, Some(8));
        assert_eq!(args.source_path(), PathBuf::from("ClientCache").join("a.txt"));
    }

    #[test]
    fn missing_or_bad_flags_fail() {
        assert!(SendArgs::try_parse_from(["rdt-send", "-p", "9000", "-r", "0"]).is_err());
        assert!(SendArgs::try_parse_from(["rdt-send", "-p", "9000", "-r", "7", "-f", "x"]).is_err());
        assert!(
            SendArgs::try_parse_from([
                "rdt-send", "-p", "1", "-r", "0", "-f", "x", "--lossless", "--drop-every", "3"
            ])
            .is_err()
        );
    }
}
