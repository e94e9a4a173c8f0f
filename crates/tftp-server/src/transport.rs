//! Per-peer transport.
//!
//! Every transfer talks to its client over a dedicated endpoint, never over
//! the shared listening socket. The [`PeerChannel`] trait is the only view a
//! session has of that endpoint, which lets unit tests drive the state
//! machine with scripted peers.

use async_trait::async_trait;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;

/// Datagram channel bound to a single peer.
///
/// All async methods must be `Send` so sessions can run on Tokio's
/// work-stealing runtime.
#[async_trait]
pub trait PeerChannel: Send {
    /// Send one datagram to the peer.
    async fn send(&mut self, datagram: &[u8]) -> io::Result<()>;

    /// Receive one datagram from the peer into `buf`, returning its length.
    ///
    /// An elapsed `timeout` is reported as [`io::ErrorKind::TimedOut`].
    async fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize>;
}

/// UDP socket connected to one peer on an ephemeral local port.
#[derive(Debug)]
pub struct UdpPeerChannel {
    socket: UdpSocket,
}

impl UdpPeerChannel {
    /// Bind an ephemeral socket of the peer's address family and connect it to `peer`.
    ///
    /// A connected socket only delivers datagrams coming from `peer`, so
    /// strays from other hosts never reach the session.
    pub async fn connect(peer: SocketAddr) -> io::Result<Self> {
        let local: SocketAddr = match peer {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(peer).await?;
        Ok(Self { socket })
    }

    /// Local address of the dedicated endpoint.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

#[async_trait]
impl PeerChannel for UdpPeerChannel {
    async fn send(&mut self, datagram: &[u8]) -> io::Result<()> {
        self.socket.send(datagram).await.map(|_| ())
    }

    async fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        match tokio::time::timeout(timeout, self.socket.recv(buf)).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "timed out waiting for acknowledgement",
            )),
        }
    }
}
