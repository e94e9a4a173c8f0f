//! Request dispatcher.
//!
//! The dispatcher owns the shared listening socket. It only ever decodes
//! read requests; every accepted request gets its own Tokio task and its own
//! UDP endpoint, so the listening socket is never used for data transfer.
//!
//! There is no cap on concurrently running sessions: a burst of requests
//! produces one task per request.

use crate::config::TransferSettings;
use crate::error::TftpError;
use crate::packet::{DATAGRAM_SIZE, ReadRequest, decode_read_request};
use crate::session::TransferSession;
use crate::transport::UdpPeerChannel;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{ToSocketAddrs, UdpSocket};
use tracing::{error, info, warn};

/// Read-only TFTP server for a single in-memory payload.
#[derive(Debug, Clone)]
pub struct TftpServer {
    payload: Arc<[u8]>,
    settings: TransferSettings,
}

impl TftpServer {
    /// Create a server for `payload` with resolved transfer settings.
    pub fn new(payload: impl Into<Arc<[u8]>>, settings: TransferSettings) -> Self {
        Self {
            payload: payload.into(),
            settings,
        }
    }

    /// Settings every session of this server runs with.
    pub fn settings(&self) -> TransferSettings {
        self.settings
    }

    /// Bind `addr` and serve until the listening socket fails.
    pub async fn listen_and_serve<A: ToSocketAddrs>(&self, addr: A) -> Result<(), TftpError> {
        let socket = UdpSocket::bind(addr).await?;
        info!("Listening on {}", socket.local_addr()?);
        self.serve(socket).await
    }

    /// Run the dispatch loop on an already bound socket.
    ///
    /// Undecodable datagrams are logged and skipped. The loop only ends when
    /// receiving from `socket` fails; sessions already running are left to
    /// finish on their own.
    pub async fn serve(&self, socket: UdpSocket) -> Result<(), TftpError> {
        let mut buf = [0u8; DATAGRAM_SIZE];

        loop {
            let (n, peer) = socket.recv_from(&mut buf).await.map_err(|e| {
                error!("Receive on listening socket failed: {}", e);
                TftpError::Io(e)
            })?;

            match decode_read_request(&buf[..n]) {
                Ok(request) => self.spawn_session(peer, request),
                Err(e) => warn!("[{}] bad request: {}", peer, e),
            }
        }
    }

    fn spawn_session(&self, peer: SocketAddr, request: ReadRequest) {
        info!("[{}] file requested: {}", peer, request.filename);

        let payload = Arc::clone(&self.payload);
        let settings = self.settings;
        tokio::spawn(async move {
            let mut channel = match UdpPeerChannel::connect(peer).await {
                Ok(channel) => channel,
                Err(e) => {
                    warn!("[{}] connect: {}", peer, e);
                    return;
                }
            };

            let mut session = TransferSession::new(peer, payload, settings);
            match session.run(&mut channel).await {
                Ok(report) => info!(
                    "[{}] transfer complete: {} blocks, {} bytes",
                    report.peer, report.blocks_sent, report.bytes_sent
                ),
                Err(e) => warn!("[{}] transfer failed: {}", peer, e),
            }
        });
    }
}
