//! Sender front-end and the plumbing both ARQ engines share.

use std::net::SocketAddr;

use rdt_abstract::{Protocol, TransferConfig};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::channel::UnreliableChannel;
use crate::checksum;
use crate::chunk::ChunkSequence;
use crate::error::SendError;
use crate::gbn::GoBackNSender;
use crate::packet::Packet;
use crate::snw::StopAndWaitSender;
use crate::stats::TransferStats;
use crate::transport::Datagram;

/// Push `chunks` to `peer` with the protocol they were cut for.
pub async fn send_file<T: Datagram>(
    channel: &mut UnreliableChannel<T>,
    peer: SocketAddr,
    chunks: &ChunkSequence,
    config: &TransferConfig,
) -> Result<TransferStats, SendError> {
    info!(
        protocol = %chunks.protocol(),
        %peer,
        chunks = chunks.total(),
        window = config.window_size,
        "starting transfer"
    );
    let stats = match chunks.protocol() {
        Protocol::StopAndWait => StopAndWaitSender::new(channel, peer, config).run(chunks).await?,
        Protocol::GoBackN => GoBackNSender::new(channel, peer, config).run(chunks).await?,
    };
    info!(
        transmitted = stats.packets_transmitted,
        retransmissions = stats.retransmissions,
        timeouts = stats.timeouts,
        elapsed_ms = stats.elapsed_ms,
        "transfer complete"
    );
    Ok(stats)
}

/// Frame every chunk once up front: index 0 under `FIRST`, the rest as data.
pub(crate) fn frame_chunks(
    chunks: &ChunkSequence,
    seq_of: impl Fn(usize) -> i32,
) -> Result<Vec<Packet>, SendError> {
    chunks
        .iter()
        .enumerate()
        .map(|(index, chunk)| {
            let seq = seq_of(index);
            if index == 0 {
                Ok(Packet::first(seq, chunk.clone()))
            } else {
                Ok(Packet::data(seq, chunk.clone())?)
            }
        })
        .collect()
}

/// Counts timer expiries that made no progress.
#[derive(Debug)]
pub(crate) struct RetryBudget {
    limit: Option<u32>,
    consecutive: u32,
}

impl RetryBudget {
    pub(crate) fn new(limit: Option<u32>) -> Self {
        Self {
            limit,
            consecutive: 0,
        }
    }

    pub(crate) fn progress(&mut self) {
        self.consecutive = 0;
    }

    /// Record an expiry while waiting on `seq`; errors once the limit is hit.
    pub(crate) fn expired(&mut self, seq: u32) -> Result<(), SendError> {
        self.consecutive += 1;
        match self.limit {
            Some(limit) if self.consecutive >= limit => Err(SendError::PeerUnresponsive {
                timeouts: self.consecutive,
                seq,
            }),
            _ => Ok(()),
        }
    }
}

/// One sender's view of the channel: a fixed peer plus the running stats.
pub(crate) struct SenderLink<'a, T> {
    channel: &'a mut UnreliableChannel<T>,
    peer: SocketAddr,
    stats: TransferStats,
    started: Instant,
    drops_at_start: u64,
}

impl<'a, T: Datagram> SenderLink<'a, T> {
    pub(crate) fn new(
        channel: &'a mut UnreliableChannel<T>,
        peer: SocketAddr,
        stats: TransferStats,
    ) -> Self {
        let drops_at_start = channel.stats().dropped;
        Self {
            channel,
            peer,
            stats,
            started: Instant::now(),
            drops_at_start,
        }
    }

    pub(crate) async fn transmit(
        &mut self,
        packet: &Packet,
        retransmission: bool,
    ) -> Result<(), SendError> {
        let delivered = self.channel.send(packet, self.peer).await?;
        self.stats.packets_transmitted += 1;
        if retransmission {
            self.stats.retransmissions += 1;
        }
        debug!(seq = packet.seq, retransmission, delivered, "sent");
        Ok(())
    }

    /// Wait for a checksum-valid ack from the peer until `deadline`.
    /// Returns the carried sequence, or `None` when the deadline passed.
    pub(crate) async fn next_ack(&mut self, deadline: Instant) -> Result<Option<i32>, SendError> {
        loop {
            let Some((packet, from)) = self.channel.recv_until(deadline).await? else {
                return Ok(None);
            };
            if from != self.peer || !checksum::is_checksum_shaped(&packet.control) {
                self.stats.stray_packets += 1;
                debug!(%from, seq = packet.seq, "ignoring stray packet");
                continue;
            }
            if !packet.has_valid_checksum() {
                self.stats.corrupt_acks += 1;
                debug!(seq = packet.seq, "ack failed checksum");
                continue;
            }
            self.stats.acks_received += 1;
            return Ok(Some(packet.seq));
        }
    }

    pub(crate) fn on_timeout(&mut self) {
        self.stats.timeouts += 1;
    }

    /// Best-effort `DONE` before bailing out so the receiver can drop the session.
    pub(crate) async fn abandon(&mut self, done: Packet, error: SendError) -> SendError {
        warn!(peer = %self.peer, "giving up: {error}");
        if let Err(e) = self.transmit(&done, false).await {
            debug!("could not send DONE while giving up: {e}");
        }
        error
    }

    /// Send `DONE` once, without waiting for an ack, and close the books.
    pub(crate) async fn finish(mut self, done: Packet) -> Result<TransferStats, SendError> {
        self.transmit(&done, false).await?;
        self.stats.elapsed_ms = self.started.elapsed().as_millis() as u64;
        self.stats.channel_drops = self.channel.stats().dropped - self.drops_at_start;
        Ok(self.stats)
    }
}
