//! In-process datagram network.
//!
//! Sockets are mailboxes in a shared hub. Delivery is instant and in order;
//! loss is left to the [`rdt_core::UnreliableChannel`] on top, exactly as on
//! a real socket. A datagram to an address nobody bound vanishes like UDP.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use rdt_core::Datagram;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::Instant;

type Mailbox = mpsc::UnboundedSender<(Bytes, SocketAddr)>;

/// One datagram handed to the network.
#[derive(Debug, Clone, Serialize)]
pub struct LinkEvent {
    pub at_ms: u64,
    pub from: SocketAddr,
    pub to: SocketAddr,
    pub len: usize,
    /// False when nothing was bound at `to`.
    pub delivered: bool,
}

struct Hub {
    mailboxes: HashMap<SocketAddr, Mailbox>,
    events: Vec<LinkEvent>,
    started: Instant,
}

#[derive(Clone)]
pub struct MemoryNetwork {
    hub: Arc<Mutex<Hub>>,
}

impl Default for MemoryNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self {
            hub: Arc::new(Mutex::new(Hub {
                mailboxes: HashMap::new(),
                events: Vec::new(),
                started: Instant::now(),
            })),
        }
    }

    /// Bind `addr`. A later bind of the same address takes over its traffic.
    pub fn socket(&self, addr: SocketAddr) -> MemorySocket {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.hub).mailboxes.insert(addr, tx);
        MemorySocket {
            addr,
            hub: Arc::clone(&self.hub),
            inbox: tokio::sync::Mutex::new(rx),
        }
    }

    pub fn events(&self) -> Vec<LinkEvent> {
        lock(&self.hub).events.clone()
    }
}

fn lock(hub: &Mutex<Hub>) -> MutexGuard<'_, Hub> {
    hub.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct MemorySocket {
    addr: SocketAddr,
    hub: Arc<Mutex<Hub>>,
    inbox: tokio::sync::Mutex<mpsc::UnboundedReceiver<(Bytes, SocketAddr)>>,
}

impl Datagram for MemorySocket {
    async fn send_to(&self, buf: &[u8], dest: SocketAddr) -> io::Result<usize> {
        let mut hub = lock(&self.hub);
        let delivered = match hub.mailboxes.get(&dest) {
            Some(mailbox) => mailbox
                .send((Bytes::copy_from_slice(buf), self.addr))
                .is_ok(),
            None => false,
        };
        let at_ms = hub.started.elapsed().as_millis() as u64;
        hub.events.push(LinkEvent {
            at_ms,
            from: self.addr,
            to: dest,
            len: buf.len(),
            delivered,
        });
        Ok(buf.len())
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        let mut inbox = self.inbox.lock().await;
        match inbox.recv().await {
            Some((data, from)) => {
                let len = data.len().min(buf.len());
                buf[..len].copy_from_slice(&data[..len]);
                Ok((len, from))
            }
            None => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "memory network shut down",
            )),
        }
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.addr)
    }
}
