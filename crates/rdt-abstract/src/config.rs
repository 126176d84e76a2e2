use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Largest chunk a data packet may carry; the 10-bit checksum tops out at 1023.
pub const MAX_MSS: usize = 1000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("mss must be between 1 and {MAX_MSS}, got {0}")]
    InvalidMss(usize),

    #[error("window_size must be at least 1")]
    InvalidWindow,

    #[error("timeout_ms must be at least 1")]
    InvalidTimeout,

    #[error("drop threshold {0} would never deliver a packet (must be below 10)")]
    InvalidThreshold(u8),

    #[error("drop_every must be at least 2, got {0}")]
    InvalidDropEvery(u32),

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loss model applied to outbound datagrams by the unreliable channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LossConfig {
    /// Every datagram reaches the socket.
    None,
    /// Draw a uniform integer in `[0, 10]`; deliver only if it exceeds `threshold`.
    Random { threshold: u8 },
    /// Drop every `n`-th outbound datagram.
    EveryNth { n: u32 },
}

impl Default for LossConfig {
    fn default() -> Self {
        LossConfig::Random { threshold: 5 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Maximum segment size used to split the source file.
    pub mss: usize,
    /// Retransmission timer interval in milliseconds.
    pub timeout_ms: u64,
    /// GBN window size (ignored by SnW).
    pub window_size: usize,
    pub loss: LossConfig,
    /// Seed for the channel RNG; OS entropy when absent.
    pub seed: Option<u64>,
    /// Give up after this many timer expiries in a row without progress.
    pub max_consecutive_timeouts: Option<u32>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            mss: MAX_MSS,
            timeout_ms: 1000,
            window_size: 4,
            loss: LossConfig::default(),
            seed: None,
            max_consecutive_timeouts: Some(64),
        }
    }
}

impl TransferConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: TransferConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mss == 0 || self.mss > MAX_MSS {
            return Err(ConfigError::InvalidMss(self.mss));
        }
        if self.window_size == 0 {
            return Err(ConfigError::InvalidWindow);
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout);
        }
        match self.loss {
            LossConfig::Random { threshold } if threshold >= 10 => {
                Err(ConfigError::InvalidThreshold(threshold))
            }
            LossConfig::EveryNth { n } if n < 2 => Err(ConfigError::InvalidDropEvery(n)),
            _ => Ok(()),
        }
    }
}

/// Partial config layered on top of a [`TransferConfig`] (CLI flags, scenarios).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigOverride {
    pub mss: Option<usize>,
    pub timeout_ms: Option<u64>,
    pub window_size: Option<usize>,
    pub loss: Option<LossConfig>,
    pub seed: Option<u64>,
    pub max_consecutive_timeouts: Option<u32>,
}

impl ConfigOverride {
    pub fn apply_to(&self, config: &mut TransferConfig) {
        if let Some(v) = self.mss {
            config.mss = v;
        }
        if let Some(v) = self.timeout_ms {
            config.timeout_ms = v;
        }
        if let Some(v) = self.window_size {
            config.window_size = v;
        }
        if let Some(v) = self.loss {
            config.loss = v;
        }
        if let Some(v) = self.seed {
            config.seed = Some(v);
        }
        if let Some(v) = self.max_consecutive_timeouts {
            config.max_consecutive_timeouts = Some(v);
        }
    }
}
