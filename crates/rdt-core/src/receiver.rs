//! Receiver loop serving any number of senders from one socket.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rdt_abstract::Protocol;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::channel::UnreliableChannel;
use crate::checksum;
use crate::error::ReceiveError;
use crate::packet::{DONE, FIRST, Packet};
use crate::session::{Bootstrap, Session, SessionTable};
use crate::transport::Datagram;

/// What the control field of a decoded packet turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKind {
    First,
    Done,
    Checksum,
}

impl ControlKind {
    pub fn of(control: &[u8]) -> Self {
        if control == FIRST {
            ControlKind::First
        } else if control == DONE {
            ControlKind::Done
        } else {
            ControlKind::Checksum
        }
    }
}

/// Result of handling one datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    SessionOpened,
    Delivered { seq: i32 },
    Duplicate { seq: i32 },
    Corrupt,
    SessionClosed { path: PathBuf },
    Ignored,
}

/// How long a peer is remembered after its `DONE`. A `FIRST` from it in
/// that window is a stale copy and must not reopen (and truncate) its file.
pub const FINISHED_LINGER: Duration = Duration::from_secs(60);

pub struct Receiver<T> {
    channel: UnreliableChannel<T>,
    protocol: Protocol,
    output_dir: PathBuf,
    sessions: SessionTable,
    finished: HashMap<SocketAddr, Instant>,
    linger: Duration,
    completed: usize,
}

impl<T: Datagram> Receiver<T> {
    pub fn new(channel: UnreliableChannel<T>, protocol: Protocol, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            channel,
            protocol,
            output_dir: output_dir.into(),
            sessions: SessionTable::new(),
            finished: HashMap::new(),
            linger: FINISHED_LINGER,
            completed: 0,
        }
    }

    /// Override [`FINISHED_LINGER`].
    pub fn with_linger(mut self, linger: Duration) -> Self {
        self.linger = linger;
        self
    }

    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    /// Sessions closed by `DONE` so far.
    pub fn completed(&self) -> usize {
        self.completed
    }

    pub fn channel(&self) -> &UnreliableChannel<T> {
        &self.channel
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Serve datagrams until `session_limit` sessions have ended, or forever.
    ///
    /// An output-file failure ends only the offending peer's session; socket
    /// errors end the loop.
    pub async fn run(&mut self, session_limit: Option<usize>) -> Result<(), ReceiveError> {
        info!(
            protocol = %self.protocol,
            addr = ?self.channel.local_addr().ok(),
            output_dir = %self.output_dir.display(),
            "receiver listening"
        );
        while session_limit.is_none_or(|limit| self.completed < limit) {
            let (packet, from) = self.channel.recv().await?;
            match self.handle(packet, from).await {
                Ok(_) => {}
                Err(ReceiveError::Output { path, source }) => {
                    warn!(%from, path = %path.display(), "dropping session: {source}");
                    self.sessions.remove(&from);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Flush and drop every open session. Returns the output paths that
    /// flushed cleanly.
    pub async fn shutdown(&mut self) -> Result<Vec<PathBuf>, ReceiveError> {
        let peers: Vec<SocketAddr> = self.sessions.peers().copied().collect();
        let mut paths = Vec::with_capacity(peers.len());
        for peer in peers {
            if let Some(session) = self.sessions.remove(&peer) {
                warn!(%peer, bytes = session.delivered_bytes(), "closing unfinished session");
                match session.finish().await {
                    Ok(path) => paths.push(path),
                    Err(e) => warn!(%peer, "{e}"),
                }
            }
        }
        Ok(paths)
    }

    /// Process exactly one decoded datagram from `from`.
    pub async fn handle(&mut self, packet: Packet, from: SocketAddr) -> Result<Outcome, ReceiveError> {
        match ControlKind::of(&packet.control) {
            ControlKind::First => self.on_first(packet, from).await,
            ControlKind::Done => self.on_done(from).await,
            ControlKind::Checksum => self.on_data(packet, from).await,
        }
    }

    async fn on_first(&mut self, packet: Packet, from: SocketAddr) -> Result<Outcome, ReceiveError> {
        if self.sessions.contains(&from) {
            debug!(%from, "repeated FIRST, re-acking");
            self.acknowledge(from).await?;
            return Ok(Outcome::Duplicate { seq: packet.seq });
        }
        if self.recently_finished(from) {
            debug!(%from, "FIRST after DONE, ignoring");
            return Ok(Outcome::Ignored);
        }

        let bootstrap = match Bootstrap::parse(&packet.payload, self.protocol) {
            Ok(bootstrap) => bootstrap,
            Err(e) => {
                warn!(%from, "rejecting session: {e}");
                return Ok(Outcome::Ignored);
            }
        };
        let session = Session::create(from, &bootstrap, &self.output_dir).await?;
        info!(
            %from,
            extension = %bootstrap.extension,
            modulus = bootstrap.modulus,
            path = %session.path().display(),
            "session opened"
        );
        self.sessions.insert(session);
        self.acknowledge(from).await?;
        Ok(Outcome::SessionOpened)
    }

    async fn on_data(&mut self, packet: Packet, from: SocketAddr) -> Result<Outcome, ReceiveError> {
        let Some(session) = self.sessions.get_mut(&from) else {
            debug!(%from, seq = packet.seq, "data from unknown peer");
            return Ok(Outcome::Ignored);
        };

        let outcome = if !checksum::verify(&packet.control, &packet.payload) {
            warn!(%from, seq = packet.seq, "checksum mismatch");
            Outcome::Corrupt
        } else if session.is_expected(packet.seq) {
            session.deliver(&packet.payload).await?;
            debug!(%from, seq = packet.seq, "delivered");
            Outcome::Delivered { seq: packet.seq }
        } else {
            debug!(%from, seq = packet.seq, expected = session.ack_sequence(), "out of order");
            Outcome::Duplicate { seq: packet.seq }
        };

        self.acknowledge(from).await?;
        Ok(outcome)
    }

    async fn on_done(&mut self, from: SocketAddr) -> Result<Outcome, ReceiveError> {
        let Some(session) = self.sessions.remove(&from) else {
            debug!(%from, "DONE from unknown peer");
            return Ok(Outcome::Ignored);
        };
        let bytes = session.delivered_bytes();
        self.finished.insert(from, Instant::now());
        let path = session.finish().await?;
        self.completed += 1;
        info!(%from, bytes, path = %path.display(), "session closed");
        Ok(Outcome::SessionClosed { path })
    }

    fn recently_finished(&mut self, peer: SocketAddr) -> bool {
        let linger = self.linger;
        self.finished.retain(|_, at| at.elapsed() < linger);
        self.finished.contains_key(&peer)
    }

    /// Ack `peer` with its session's next expected sequence.
    async fn acknowledge(&mut self, peer: SocketAddr) -> Result<(), ReceiveError> {
        let Some(session) = self.sessions.get(&peer) else {
            return Ok(());
        };
        let ack = Packet::ack(session.ack_sequence())?;
        self.channel.send(&ack, peer).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::DropPolicy;
    use crate::transport::UdpTransport;
    use std::time::Duration;
    use tokio::time::Instant;

    struct Harness {
        receiver: Receiver<UdpTransport>,
        peer: UnreliableChannel<UdpTransport>,
        peer_addr: SocketAddr,
        dir: PathBuf,
    }

    impl Harness {
        async fn new(protocol: Protocol, tag: &str) -> Self {
            let dir = std::env::temp_dir().join(format!("rdt-recv-{tag}-{}", std::process::id()));
            let rx = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
            let tx = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
            let peer_addr = tx.local_addr().unwrap();
            Self {
                receiver: Receiver::new(UnreliableChannel::new(rx, DropPolicy::Lossless), protocol, &dir),
                peer: UnreliableChannel::new(tx, DropPolicy::Lossless),
                peer_addr,
                dir,
            }
        }

        async fn feed(&mut self, packet: Packet) -> Outcome {
            self.receiver.handle(packet, self.peer_addr).await.unwrap()
        }

        async fn next_ack(&mut self) -> Option<i32> {
            let deadline = Instant::now() + Duration::from_millis(200);
            self.peer
                .recv_until(deadline)
                .await
                .unwrap()
                .map(|(packet, _)| {
                    assert!(packet.has_valid_checksum());
                    assert_eq!(packet.payload, format!("ACK - {}", packet.seq).into_bytes());
                    packet.seq
                })
        }

        async fn cleanup(self) {
            let _ = tokio::fs::remove_dir_all(&self.dir).await;
        }
    }

    #[test]
    fn control_kinds() {
        assert_eq!(ControlKind::of(b"FIRST"), ControlKind::First);
        assert_eq!(ControlKind::of(b"DONE"), ControlKind::Done);
        assert_eq!(ControlKind::of(b"1111111100"), ControlKind::Checksum);
    }

    #[tokio::test]
    async fn snw_session_lifecycle() {
        let mut h = Harness::new(Protocol::StopAndWait, "snw").await;

        assert_eq!(h.feed(Packet::first(0, "txt")).await, Outcome::SessionOpened);
        assert_eq!(h.next_ack().await, Some(1));

        assert_eq!(h.feed(Packet::data(1, "abc").unwrap()).await, Outcome::Delivered { seq: 1 });
        assert_eq!(h.next_ack().await, Some(0));

        // Retransmitted copy: not re-delivered, prior ack repeated.
        assert_eq!(h.feed(Packet::data(1, "abc").unwrap()).await, Outcome::Duplicate { seq: 1 });
        assert_eq!(h.next_ack().await, Some(0));

        assert_eq!(h.feed(Packet::data(0, "def").unwrap()).await, Outcome::Delivered { seq: 0 });
        assert_eq!(h.next_ack().await, Some(1));

        let Outcome::SessionClosed { path } = h.feed(Packet::done(1)).await else {
            panic!("expected session to close");
        };
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"abcdef");
        assert!(h.receiver.sessions().is_empty());
        assert_eq!(h.receiver.completed(), 1);
        // No ack for DONE.
        assert_eq!(h.next_ack().await, None);

        h.cleanup().await;
    }

    #[tokio::test]
    async fn gbn_acks_are_cumulative() {
        let mut h = Harness::new(Protocol::GoBackN, "gbn").await;

        h.feed(Packet::first(0, "bin:5")).await;
        assert_eq!(h.next_ack().await, Some(1));

        h.feed(Packet::data(1, "a").unwrap()).await;
        assert_eq!(h.next_ack().await, Some(2));

        // 2 is lost; 3 and 4 arrive out of order and are not stored.
        assert_eq!(h.feed(Packet::data(3, "c").unwrap()).await, Outcome::Duplicate { seq: 3 });
        assert_eq!(h.next_ack().await, Some(2));
        assert_eq!(h.feed(Packet::data(4, "d").unwrap()).await, Outcome::Duplicate { seq: 4 });
        assert_eq!(h.next_ack().await, Some(2));

        for (seq, data) in [(2, "b"), (3, "c"), (4, "d")] {
            assert_eq!(h.feed(Packet::data(seq, data).unwrap()).await, Outcome::Delivered { seq });
        }
        assert_eq!(h.next_ack().await, Some(3));
        assert_eq!(h.next_ack().await, Some(4));
        assert_eq!(h.next_ack().await, Some(0));

        let Outcome::SessionClosed { path } = h.feed(Packet::done(0)).await else {
            panic!("expected session to close");
        };
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"abcd");

        h.cleanup().await;
    }

    #[tokio::test]
    async fn corrupt_data_is_reacked_not_stored() {
        let mut h = Harness::new(Protocol::GoBackN, "corrupt").await;
        h.feed(Packet::first(0, "txt:3")).await;
        h.next_ack().await;

        // Checksum claims 4 bytes, payload has 3.
        let forged = Packet::new(1, checksum::compute(b"four").unwrap().to_vec(), "abc");
        assert_eq!(h.feed(forged).await, Outcome::Corrupt);
        assert_eq!(h.next_ack().await, Some(1));
        assert_eq!(h.receiver.sessions().get(&h.peer_addr).unwrap().delivered_bytes(), 0);

        h.cleanup().await;
    }

    #[tokio::test]
    async fn repeated_first_keeps_progress() {
        let mut h = Harness::new(Protocol::StopAndWait, "refirst").await;
        h.feed(Packet::first(0, "txt")).await;
        h.next_ack().await;
        h.feed(Packet::data(1, "x").unwrap()).await;
        h.next_ack().await;

        assert_eq!(h.feed(Packet::first(0, "txt")).await, Outcome::Duplicate { seq: 0 });
        assert_eq!(h.next_ack().await, Some(0));
        let session = h.receiver.sessions().get(&h.peer_addr).unwrap();
        assert_eq!(session.expected_sequence(), 2);

        h.cleanup().await;
    }

    #[tokio::test]
    async fn late_first_does_not_reopen_finished_file() {
        let mut h = Harness::new(Protocol::StopAndWait, "late-first").await;
        h.feed(Packet::first(0, "txt")).await;
        h.next_ack().await;
        h.feed(Packet::data(1, "hello").unwrap()).await;
        h.next_ack().await;
        let Outcome::SessionClosed { path } = h.feed(Packet::done(0)).await else {
            panic!("expected session to close");
        };

        // A delayed copy of the bootstrap shows up after DONE.
        assert_eq!(h.feed(Packet::first(0, "txt")).await, Outcome::Ignored);
        assert_eq!(h.next_ack().await, None);
        assert!(h.receiver.sessions().is_empty());
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"hello");

        h.cleanup().await;
    }

    #[tokio::test]
    async fn finished_peer_may_start_again_after_linger() {
        let mut h = Harness::new(Protocol::StopAndWait, "relinger").await;
        h.receiver = h.receiver.with_linger(Duration::ZERO);
        h.feed(Packet::first(0, "txt")).await;
        h.feed(Packet::done(1)).await;

        assert_eq!(h.feed(Packet::first(0, "txt")).await, Outcome::SessionOpened);
        assert_eq!(h.receiver.sessions().len(), 1);

        h.cleanup().await;
    }

    #[tokio::test]
    async fn output_failure_drops_only_that_peer() {
        let mut h = Harness::new(Protocol::StopAndWait, "io-fail").await;
        let dest = h.receiver.channel().local_addr().unwrap();

        // A directory squats on the first peer's output path.
        let blocked = crate::session::output_path(&h.dir, h.peer_addr, "txt");
        tokio::fs::create_dir_all(&blocked).await.unwrap();
        h.peer.send(&Packet::first(0, "txt"), dest).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let other = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let other_addr = other.local_addr().unwrap();
        let mut other = UnreliableChannel::new(other, DropPolicy::Lossless);
        for packet in [
            Packet::first(0, "txt"),
            Packet::data(1, "fine").unwrap(),
            Packet::done(0),
        ] {
            other.send(&packet, dest).await.unwrap();
        }

        tokio::time::timeout(Duration::from_secs(5), h.receiver.run(Some(1)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(h.receiver.completed(), 1);
        assert!(h.receiver.sessions().is_empty());
        let served = crate::session::output_path(&h.dir, other_addr, "txt");
        assert_eq!(tokio::fs::read(&served).await.unwrap(), b"fine");

        h.cleanup().await;
    }

    #[tokio::test]
    async fn strangers_get_nothing() {
        let mut h = Harness::new(Protocol::GoBackN, "stranger").await;

        assert_eq!(h.feed(Packet::data(1, "x").unwrap()).await, Outcome::Ignored);
        assert_eq!(h.feed(Packet::done(0)).await, Outcome::Ignored);
        // GBN receiver refuses a SnW-style bootstrap.
        assert_eq!(h.feed(Packet::first(0, "txt")).await, Outcome::Ignored);
        assert_eq!(h.next_ack().await, None);
        assert!(h.receiver.sessions().is_empty());

        h.cleanup().await;
    }

    #[tokio::test]
    async fn shutdown_flushes_open_sessions() {
        let mut h = Harness::new(Protocol::StopAndWait, "shutdown").await;
        h.feed(Packet::first(0, "log")).await;
        h.feed(Packet::data(1, "partial").unwrap()).await;

        let paths = h.receiver.shutdown().await.unwrap();
        assert_eq!(paths.len(), 1);
        assert_eq!(tokio::fs::read(&paths[0]).await.unwrap(), b"partial");
        assert!(h.receiver.sessions().is_empty());
        assert_eq!(h.receiver.completed(), 0);

        h.cleanup().await;
    }

    #[tokio::test]
    async fn run_stops_after_session_limit() {
        let mut h = Harness::new(Protocol::StopAndWait, "run").await;
        let dest = h.receiver.channel().local_addr().unwrap();

        for packet in [
            Packet::first(0, "txt"),
            Packet::data(1, "hi").unwrap(),
            Packet::done(0),
        ] {
            h.peer.send(&packet, dest).await.unwrap();
        }

        tokio::time::timeout(Duration::from_secs(5), h.receiver.run(Some(1)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(h.receiver.completed(), 1);

        h.cleanup().await;
    }
}
