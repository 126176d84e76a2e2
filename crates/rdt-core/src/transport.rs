//! Datagram transport seam.
//!
//! The channel adapter and both engines only ever talk to a [`Datagram`];
//! production code plugs in [`UdpTransport`], tests plug in an in-memory
//! network.

use std::future::Future;
use std::io;
use std::net::SocketAddr;

use tokio::net::UdpSocket;

/// A connectionless, message-oriented transport.
pub trait Datagram {
    /// Send one datagram to `dest`.
    fn send_to(
        &self,
        buf: &[u8],
        dest: SocketAddr,
    ) -> impl Future<Output = io::Result<usize>> + Send;

    /// Wait for the next datagram. Returns `(len, source)`.
    fn recv_from(
        &self,
        buf: &mut [u8],
    ) -> impl Future<Output = io::Result<(usize, SocketAddr)>> + Send;

    fn local_addr(&self) -> io::Result<SocketAddr>;
}

/// Thin wrapper around a tokio UDP socket.
#[derive(Debug)]
pub struct UdpTransport {
    inner: UdpSocket,
    local_addr: SocketAddr,
}

impl UdpTransport {
    /// Bind to `addr`; port 0 picks an ephemeral port.
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        let inner = UdpSocket::bind(addr).await?;
        let local_addr = inner.local_addr()?;
        Ok(Self { inner, local_addr })
    }
}

impl Datagram for UdpTransport {
    async fn send_to(&self, buf: &[u8], dest: SocketAddr) -> io::Result<usize> {
        self.inner.send_to(buf, dest).await
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.inner.recv_from(buf).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.local_addr)
    }
}
