//! Unreliable channel adapter.
//!
//! Wraps a [`Datagram`] transport and silently discards a share of outbound
//! packets according to a [`DropPolicy`]. Nothing is reported to the caller
//! when a packet is dropped; the engines find out through their timers.

use std::io;
use std::net::SocketAddr;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rdt_abstract::LossConfig;
use serde::Serialize;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, warn};

use crate::error::ChannelError;
use crate::packet::Packet;
use crate::transport::Datagram;

/// Receive buffer; larger than any valid datagram so oversize frames are
/// detected instead of truncated.
const RECV_BUFFER: usize = 2048;

/// Upper bound of the uniform draw used by [`DropPolicy::Random`].
pub const DRAW_MAX: u8 = 10;

pub enum DropPolicy {
    Lossless,
    /// Deliver only when a uniform draw in `[0, DRAW_MAX]` exceeds `threshold`.
    Random { threshold: u8, rng: StdRng },
    /// Drop the `n`-th, `2n`-th, ... packet.
    EveryNth { n: u32, seen: u32 },
}

impl DropPolicy {
    pub fn from_config(loss: LossConfig, seed: Option<u64>) -> Self {
        match loss {
            LossConfig::None => DropPolicy::Lossless,
            LossConfig::Random { threshold } => DropPolicy::random(threshold, seed),
            LossConfig::EveryNth { n } => DropPolicy::every_nth(n),
        }
    }

    pub fn random(threshold: u8, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        DropPolicy::Random { threshold, rng }
    }

    pub fn every_nth(n: u32) -> Self {
        DropPolicy::EveryNth { n, seen: 0 }
    }

    /// Decide the fate of the next outbound packet.
    pub fn should_deliver(&mut self) -> bool {
        match self {
            DropPolicy::Lossless => true,
            DropPolicy::Random { threshold, rng } => rng.random_range(0..=DRAW_MAX) > *threshold,
            DropPolicy::EveryNth { n, seen } => {
                *seen += 1;
                *n == 0 || *seen % *n != 0
            }
        }
    }
}

impl std::fmt::Debug for DropPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DropPolicy::Lossless => write!(f, "Lossless"),
            DropPolicy::Random { threshold, .. } => write!(f, "Random(threshold={threshold})"),
            DropPolicy::EveryNth { n, .. } => write!(f, "EveryNth({n})"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChannelStats {
    /// Packets handed to `send`.
    pub offered: u64,
    /// Packets the drop policy discarded.
    pub dropped: u64,
    /// Decoded packets returned to the caller.
    pub received: u64,
    /// Datagrams that failed to decode.
    pub malformed: u64,
}

pub struct UnreliableChannel<T> {
    transport: T,
    policy: DropPolicy,
    stats: ChannelStats,
    buf: Vec<u8>,
}

impl<T: Datagram> UnreliableChannel<T> {
    pub fn new(transport: T, policy: DropPolicy) -> Self {
        Self {
            transport,
            policy,
            stats: ChannelStats::default(),
            buf: vec![0u8; RECV_BUFFER],
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn stats(&self) -> ChannelStats {
        self.stats
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    /// Encode and (maybe) send `packet`. Returns whether it reached the socket.
    pub async fn send(&mut self, packet: &Packet, dest: SocketAddr) -> Result<bool, ChannelError> {
        let bytes = packet.encode()?;
        self.stats.offered += 1;
        if !self.policy.should_deliver() {
            self.stats.dropped += 1;
            debug!(seq = packet.seq, %dest, "channel dropped packet");
            return Ok(false);
        }
        self.transport.send_to(&bytes, dest).await?;
        Ok(true)
    }

    /// Block until a decodable packet arrives.
    pub async fn recv(&mut self) -> Result<(Packet, SocketAddr), ChannelError> {
        loop {
            let read = self.transport.recv_from(&mut self.buf).await;
            if let Some(received) = self.accept(read)? {
                return Ok(received);
            }
        }
    }

    /// Wait for a decodable packet until `deadline`. `None` means the deadline passed.
    pub async fn recv_until(
        &mut self,
        deadline: Instant,
    ) -> Result<Option<(Packet, SocketAddr)>, ChannelError> {
        loop {
            let read = match timeout_at(deadline, self.transport.recv_from(&mut self.buf)).await {
                Ok(read) => read,
                Err(_) => return Ok(None),
            };
            if let Some(received) = self.accept(read)? {
                return Ok(Some(received));
            }
        }
    }

    /// Return a packet only if one is already waiting.
    pub async fn try_recv(&mut self) -> Result<Option<(Packet, SocketAddr)>, ChannelError> {
        self.recv_until(Instant::now()).await
    }

    fn accept(
        &mut self,
        read: io::Result<(usize, SocketAddr)>,
    ) -> Result<Option<(Packet, SocketAddr)>, ChannelError> {
        let (len, from) = match read {
            Ok(read) => read,
            // ICMP port-unreachable surfacing on some platforms.
            Err(e) if matches!(
                e.kind(),
                io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionRefused
            ) =>
            {
                debug!("ignoring transient receive error: {e}");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        match Packet::decode(&self.buf[..len]) {
            Ok(packet) => {
                self.stats.received += 1;
                Ok(Some((packet, from)))
            }
            Err(e) => {
                self.stats.malformed += 1;
                warn!(%from, "dropping malformed datagram: {e}");
                Ok(None)
            }
        }
    }
}
