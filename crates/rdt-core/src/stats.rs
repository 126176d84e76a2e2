use rdt_abstract::Protocol;
use serde::{Deserialize, Serialize};

/// Per-transfer figures collected by the sender engines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferStats {
    pub protocol: Protocol,
    pub window_size: usize,
    /// Chunks including the bootstrap header.
    pub chunks: usize,
    /// Every packet offered to the channel, the final `DONE` included.
    pub packets_transmitted: u64,
    pub retransmissions: u64,
    pub timeouts: u64,
    pub acks_received: u64,
    pub corrupt_acks: u64,
    /// Packets from other peers or with unexpected control fields.
    pub stray_packets: u64,
    pub channel_drops: u64,
    pub elapsed_ms: u64,
}

impl TransferStats {
    pub fn new(protocol: Protocol, window_size: usize, chunks: usize) -> Self {
        Self {
            protocol,
            window_size,
            chunks,
            packets_transmitted: 0,
            retransmissions: 0,
            timeouts: 0,
            acks_received: 0,
            corrupt_acks: 0,
            stray_packets: 0,
            channel_drops: 0,
            elapsed_ms: 0,
        }
    }
}
