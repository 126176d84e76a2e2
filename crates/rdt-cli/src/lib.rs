use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use rdt_abstract::{ConfigOverride, LossConfig, Protocol, TransferConfig};
use tracing_subscriber::EnvFilter;

pub mod recv;
pub mod send;
pub mod sim;

/// Channel and timer flags shared by `rdt-send` and `rdt-recv`.
#[derive(Args, Debug, Clone, Default)]
pub struct ChannelArgs {
    /// TOML file with transfer settings; the flags below override it.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Retransmission timeout in milliseconds.
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Drop an outbound packet unless a draw in [0, 10] exceeds this.
    #[arg(long, conflicts_with_all = ["lossless", "drop_every"])]
    pub drop_threshold: Option<u8>,

    /// Drop every n-th outbound packet instead of drawing at random.
    #[arg(long, conflicts_with = "lossless")]
    pub drop_every: Option<u32>,

    /// Never drop outbound packets.
    #[arg(long, default_value_t = false)]
    pub lossless: bool,

    /// Seed for the drop RNG.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Give up after this many timeouts in a row (0 = never).
    #[arg(long)]
    pub max_timeouts: Option<u32>,
}

impl ChannelArgs {
    pub fn overrides(&self, window_size: Option<usize>) -> ConfigOverride {
        let loss = if self.lossless {
            Some(LossConfig::None)
        } else if let Some(n) = self.drop_every {
            Some(LossConfig::EveryNth { n })
        } else {
            self.drop_threshold
                .map(|threshold| LossConfig::Random { threshold })
        };
        ConfigOverride {
            mss: None,
            timeout_ms: self.timeout_ms,
            window_size,
            loss,
            seed: self.seed,
            max_consecutive_timeouts: self.max_timeouts.filter(|&n| n > 0),
        }
    }

    /// Config file (or defaults), then flags, then validation.
    pub fn resolve(&self, window_size: Option<usize>) -> anyhow::Result<TransferConfig> {
        let mut config = match &self.config {
            Some(path) => TransferConfig::load(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => TransferConfig::default(),
        };
        self.overrides(window_size).apply_to(&mut config);
        if self.max_timeouts == Some(0) {
            config.max_consecutive_timeouts = None;
        }
        config.validate().context("Invalid transfer settings")?;
        Ok(config)
    }
}

pub fn parse_protocol(s: &str) -> Result<Protocol, String> {
    s.parse()
}

/// `RUST_LOG` if set, `info` otherwise.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
