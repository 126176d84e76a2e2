//! Go-Back-N sender.
//!
//! Packets carry their absolute chunk index as sequence number, and the
//! session modulus is the total packet count (header included), so no index
//! ever wraps. Acks are cumulative and carry the receiver's next expected
//! sequence: an ack `a` retires every in-flight packet up to and including
//! the one whose successor is `a`.
//!
//! A single [`Timer`] covers the whole window. On expiry the window is
//! rewound to `base` and every outstanding packet goes out again.

use std::collections::VecDeque;
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

/// Sender-side window over absolute sequence numbers.
///
/// Invariant: `base <= next`, `next - base <= size`, and `in_flight` is
/// exactly `base..next`.
#[derive(Debug, Clone)]
pub struct SendWindow {
    base: u32,
    next: u32,
    size: usize,
    in_flight: VecDeque<u32>,
}

impl SendWindow {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            base: 0,
            next: 0,
            size,
            in_flight: VecDeque::with_capacity(size),
        }
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    pub fn next(&self) -> u32 {
        self.next
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn in_flight(&self) -> impl Iterator<Item = u32> + '_ {
        self.in_flight.iter().copied()
    }

    pub fn has_room(&self) -> bool {
        self.in_flight.len() < self.size
    }

    pub fn is_empty(&self) -> bool {
        self.in_flight.is_empty()
    }

    /// Mark `next` as transmitted and advance it. Returns the sequence sent.
    pub fn record_sent(&mut self) -> u32 {
        debug_assert!(self.has_room());
        let seq = self.next;
        self.in_flight.push_back(seq);
        self.next += 1;
        seq
    }

    /// Apply cumulative ack `ack` (next expected, mod `modulus`).
    /// Returns how many packets were retired; 0 for duplicate or stale acks.
    pub fn acknowledge(&mut self, ack: i32, modulus: u32) -> usize {
        let modulus = modulus.max(1);
        let ack = ack.rem_euclid(modulus as i32) as u32;
        let Some(pos) = self
            .in_flight
            .iter()
            .position(|&seq| (seq + 1) % modulus == ack)
        else {
            return 0;
        };
        let retired = pos + 1;
        self.in_flight.drain(..retired);
        self.base += retired as u32;
        retired
    }

    /// Forget everything outstanding; the next fill resends from `base`.
    pub fn rewind(&mut self) {
        self.next = self.base;
        self.in_flight.clear();
    }
}

pub struct GoBackNSender<'a, T> {
    link: SenderLink<'a, T>,
    timer: Timer,
    budget: RetryBudget,
    window: SendWindow,
}

impl<'a, T: Datagram> GoBackNSender<'a, T> {
    pub fn new(
        channel: &'a mut UnreliableChannel<T>,
        peer: SocketAddr,
        config: &TransferConfig,
    ) -> Self {
        let stats = TransferStats::new(Protocol::GoBackN, config.window_size, 0);
        Self {
            link: SenderLink::new(channel, peer, stats),
            timer: Timer::new(config.timeout()),
            budget: RetryBudget::new(config.max_consecutive_timeouts),
            window: SendWindow::new(config.window_size),
        }
    }

    pub async fn run(mut self, chunks: &ChunkSequence) -> Result<TransferStats, SendError> {
        let total = chunks.total();
        let modulus = u32::try_from(total)
            .ok()
            .filter(|&m| m <= i32::MAX as u32)
            .ok_or(SendError::TooManyChunks(total))?;
        let packets = frame_chunks(chunks, |index| index as i32)?;
        let done = Packet::done((total as u32 % modulus) as i32);

        // Highest sequence sent so far; anything below it is a resend.
        let mut high_water = 0u32;

        while self.window.base() < modulus {
            while self.window.has_room() && self.window.next() < modulus {
                let seq = self.window.next();
                self.link
                    .transmit(&packets[seq as usize], seq < high_water)
                    .await?;
                self.window.record_sent();
                high_water = high_water.max(seq + 1);
            }
            if !self.timer.running() {
                self.timer.start();
            }
            let Some(deadline) = self.timer.deadline() else {
                continue;
            };

            match self.link.next_ack(deadline).await? {
                Some(ack) => {
                    let retired = self.window.acknowledge(ack, modulus);
                    if retired == 0 {
                        debug!(ack, base = self.window.base(), "duplicate ack");
                        continue;
                    }
                    self.budget.progress();
                    if self.window.is_empty() {
                        self.timer.stop();
                    } else {
                        self.timer.start();
                    }
                    debug!(ack, retired, base = self.window.base(), "window slid");
                }
                None => {
                    self.timer.stop();
                    self.link.on_timeout();
                    if let Err(e) = self.budget.expired(self.window.base()) {
                        return Err(self.link.abandon(done, e).await);
                    }
                    debug!(
                        base = self.window.base(),
                        next = self.window.next(),
                        "timeout, going back"
                    );
                    self.window.rewind();
                }
            }
        }

        let mut stats = self.link.finish(done).await?;
        stats.chunks = total;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::DropPolicy;
    use crate::transport::UdpTransport;
    use proptest::prelude::*;

    #[test]
    fn fills_to_window_size() {
        let mut window = SendWindow::new(3);
        assert_eq!(window.record_sent(), 0);
        assert_eq!(window.record_sent(), 1);
        assert_eq!(window.record_sent(), 2);
        assert!(!window.has_room());
        assert_eq!(window.in_flight().collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn cumulative_ack_retires_prefix() {
        let mut window = SendWindow::new(4);
        for _ in 0..4 {
            window.record_sent();
        }
        // Ack 3 means 0, 1 and 2 all arrived.
        assert_eq!(window.acknowledge(3, 10), 3);
        assert_eq!(window.base(), 3);
        assert_eq!(window.in_flight().collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn stale_and_duplicate_acks_retire_nothing() {
        let mut window = SendWindow::new(4);
        for _ in 0..3 {
            window.record_sent();
        }
        assert_eq!(window.acknowledge(1, 10), 1);
        assert_eq!(window.acknowledge(1, 10), 0);
        assert_eq!(window.acknowledge(0, 10), 0);
        assert_eq!(window.acknowledge(-4, 10), 0);
        assert_eq!(window.base(), 1);
    }

    #[test]
    fn last_packet_ack_wraps_to_zero() {
        let mut window = SendWindow::new(4);
        for _ in 0..3 {
            window.record_sent();
        }
        assert_eq!(window.acknowledge(0, 3), 3);
        assert!(window.is_empty());
        assert_eq!(window.base(), 3);
    }

    #[test]
    fn rewind_restarts_from_base() {
        let mut window = SendWindow::new(4);
        for _ in 0..4 {
            window.record_sent();
        }
        window.acknowledge(2, 10);
        window.rewind();
        assert_eq!(window.next(), 2);
        assert!(window.is_empty());
        assert_eq!(window.record_sent(), 2);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Send,
        Ack(i32),
        Rewind,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            3 => Just(Op::Send),
            2 => (-2i32..40).prop_map(Op::Ack),
            1 => Just(Op::Rewind),
        ]
    }

    proptest! {
        #[test]
        fn window_invariant_holds(size in 1usize..8, ops in proptest::collection::vec(op(), 0..200)) {
            let modulus = 32u32;
            let mut window = SendWindow::new(size);
            for op in ops {
                match op {
                    Op::Send if window.has_room() && window.next() < modulus => {
                        window.record_sent();
                    }
                    Op::Send => {}
                    Op::Ack(ack) => {
                        window.acknowledge(ack, modulus);
                    }
                    Op::Rewind => window.rewind(),
                }
                prop_assert!(window.base() <= window.next());
                prop_assert!((window.next() - window.base()) as usize <= window.size());
                let expected: Vec<u32> = (window.base()..window.next()).collect();
                prop_assert_eq!(window.in_flight().collect::<Vec<_>>(), expected);
            }
        }
    }

    /// Drops the first copy of sequence 2, then acks in order.
    async fn lossy_peer(peer: UdpTransport, total: i32) {
        let mut channel = UnreliableChannel::new(peer, DropPolicy::Lossless);
        let mut expected = 0i32;
        let mut dropped_two = false;
        loop {
            let (packet, from) = channel.recv().await.unwrap();
            if packet.control.as_ref() == crate::packet::DONE {
                return;
            }
            if packet.seq == 2 && !dropped_two {
                dropped_two = true;
                continue;
            }
            if packet.seq == expected {
                expected += 1;
            }
            let ack = Packet::ack(expected % total).unwrap();
            channel.send(&ack, from).await.unwrap();
        }
    }

    #[tokio::test]
    async fn goes_back_after_loss() {
        let peer = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let peer_addr = peer.local_addr().unwrap();
        let data = vec![3u8; 4 * 1000];
        let chunks = ChunkSequence::from_bytes("bin", data, 1000, Protocol::GoBackN);
        let total = chunks.total() as i32;
        let peer_task = tokio::spawn(lossy_peer(peer, total));

        let config = TransferConfig {
            timeout_ms: 100,
            window_size: 4,
            ..Default::default()
        };
        let sender = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let mut channel = UnreliableChannel::new(sender, DropPolicy::Lossless);
        let stats = GoBackNSender::new(&mut channel, peer_addr, &config)
            .run(&chunks)
            .await
            .unwrap();
        peer_task.await.unwrap();

        assert_eq!(stats.chunks, 5);
        assert_eq!(stats.timeouts, 1);
        // 2 and 3 went out twice; 4 may or may not have been in the window yet.
        assert!(stats.retransmissions >= 2);
        assert!(stats.packets_transmitted >= 5 + 2 + 1);
    }
}
