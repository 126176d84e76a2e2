use std::fs;
use std::path::Path;

use anyhow::Context;
use rdt_abstract::{Protocol, TransferConfig};
use rdt_core::{ChannelStats, TransferStats};
use serde::Serialize;

use crate::network::LinkEvent;

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub scenario: String,
    pub protocol: Protocol,
    pub config: TransferConfig,
    /// Simulated wall time from first send to receiver shutdown.
    pub duration_ms: u64,
    pub sender: TransferStats,
    pub receiver_channel: ChannelStats,
    /// The receiver saw `DONE` and removed the session.
    pub session_closed: bool,
    pub delivered_len: usize,
    pub delivered_intact: bool,
    #[serde(skip)]
    pub delivered: Vec<u8>,
    pub link_events: Vec<LinkEvent>,
}

impl SimulationReport {
    pub fn write_json(&self, path: &Path) -> anyhow::Result<()> {
        let data =
            serde_json::to_vec_pretty(self).context("Failed to serialize simulation trace")?;
        fs::write(path, &data)
            .with_context(|| format!("Failed to write trace file {}", path.display()))?;
        Ok(())
    }
}
