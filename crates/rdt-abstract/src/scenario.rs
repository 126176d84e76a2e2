use crate::config::{ConfigOverride, LossConfig};
use crate::protocol::Protocol;
use serde::Deserialize;

/// A self-contained transfer experiment, usually loaded from TOML.
#[derive(Deserialize, Debug, Clone)]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub protocol: Protocol,
    /// Overrides applied to the sender's config.
    #[serde(default)]
    pub config: ConfigOverride,
    /// Loss model for the receiver's outbound acks (lossless when absent).
    #[serde(default)]
    pub receiver_loss: Option<LossConfig>,
    pub payload: ScenarioPayload,
    #[serde(default = "default_extension")]
    pub extension: String,
    #[serde(default)]
    pub assertions: Vec<ScenarioAssertion>,
}

fn default_extension() -> String {
    "bin".to_string()
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScenarioPayload {
    /// `size` bytes of a repeating byte pattern.
    Generated { size: usize },
    /// Literal text.
    Text { data: String },
}

impl ScenarioPayload {
    pub fn bytes(&self) -> Vec<u8> {
        match self {
            ScenarioPayload::Generated { size } => (0..*size).map(|i| (i % 251) as u8).collect(),
            ScenarioPayload::Text { data } => data.as_bytes().to_vec(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScenarioAssertion {
    /// Receiver output is byte-identical to the payload.
    DeliveredIntact,
    /// Total packets the sender put through its channel is within range.
    SenderPacketCount { min: u64, max: Option<u64> },
    /// The receiver saw `DONE` and dropped the session.
    SessionClosed,
    /// Transfer finishes within this many (simulated) milliseconds.
    MaxDuration { ms: u64 },
}
