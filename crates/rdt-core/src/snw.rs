//! Stop-and-Wait sender.
//!
//! One packet in flight. Chunk `i` travels with sequence `i mod 2` and is
//! released by an ack carrying the receiver's next expected sequence,
//! `(i + 1) mod 2`. On expiry the same packet is resent unchanged.

use std::net::SocketAddr;

use rdt_abstract::{Protocol, TransferConfig};
use tracing::debug;

use crate::channel::UnreliableChannel;
use crate::chunk::ChunkSequence;
use crate::error::SendError;
use crate::packet::Packet;
use crate::sender::{RetryBudget, SenderLink, frame_chunks};
use crate::stats::TransferStats;
use crate::timer::Timer;
use crate::transport::Datagram;

pub const SNW_MODULUS: u32 = 2;

fn snw_seq(index: usize) -> i32 {
    (index % SNW_MODULUS as usize) as i32
}

pub struct StopAndWaitSender<'a, T> {
    link: SenderLink<'a, T>,
    timer: Timer,
    budget: RetryBudget,
}

impl<'a, T: Datagram> StopAndWaitSender<'a, T> {
    pub fn new(
        channel: &'a mut UnreliableChannel<T>,
        peer: SocketAddr,
        config: &TransferConfig,
    ) -> Self {
        // Window size is reported as 1: only one packet is ever outstanding.
        let stats = TransferStats::new(Protocol::StopAndWait, 1, 0);
        Self {
            link: SenderLink::new(channel, peer, stats),
            timer: Timer::new(config.timeout()),
            budget: RetryBudget::new(config.max_consecutive_timeouts),
        }
    }

    pub async fn run(mut self, chunks: &ChunkSequence) -> Result<TransferStats, SendError> {
        let packets = frame_chunks(chunks, snw_seq)?;
        let done = Packet::done(snw_seq(packets.len()));

        for (index, packet) in packets.iter().enumerate() {
            let expected_ack = snw_seq(index + 1);
            let mut retransmission = false;
            loop {
                self.link.transmit(packet, retransmission).await?;
                self.timer.start();
                if self.await_ack(expected_ack).await? {
                    self.timer.stop();
                    self.budget.progress();
                    break;
                }
                self.timer.stop();
                self.link.on_timeout();
                if let Err(e) = self.budget.expired(packet.seq as u32) {
                    return Err(self.link.abandon(done, e).await);
                }
                debug!(index, seq = packet.seq, "timeout, resending");
                retransmission = true;
            }
        }

        let mut stats = self.link.finish(done).await?;
        stats.chunks = chunks.total();
        Ok(stats)
    }

    /// True once the matching ack arrives, false on expiry.
    async fn await_ack(&mut self, expected: i32) -> Result<bool, SendError> {
        while let Some(deadline) = self.timer.deadline() {
            match self.link.next_ack(deadline).await? {
                None => return Ok(false),
                Some(ack) if ack == expected => return Ok(true),
                Some(ack) => debug!(ack, expected, "stale ack"),
            }
        }
        Ok(false)
    }
}
