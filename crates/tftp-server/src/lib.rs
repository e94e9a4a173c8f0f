//! Read-only TFTP server
//!
//! Serves one in-memory payload to any client over TFTP (RFC 1350), octet
//! mode only. Built on `tokio` for I/O and `tracing` for structured logs.
//!
//! The crate is layered bottom-up:
//! - [`packet`]: pure codec for read request, data, ack and error packets
//! - [`session`]: per-peer state machine driving send, ack, retransmit
//! - [`transport`]: the per-peer datagram channel sessions talk through
//! - [`server`]: dispatcher owning the listening socket
//! - [`config`]: configuration loading, resolved once before serving
//!
//! # Example
//!
//! ```no_run
//! use tftp_server::{ServerConfig, TftpServer};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ServerConfig::from_env()?;
//! let payload = tokio::fs::read(&config.payload_path).await?;
//!
//! let server = TftpServer::new(payload, config.transfer_settings());
//! server.listen_and_serve(config.listen_addr.as_str()).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod packet;
pub mod server;
pub mod session;
pub mod transport;

pub use config::{ServerConfig, TransferSettings};
pub use error::*;
pub use packet::{DataPacket, ErrorCode, ErrorPacket, Packet, ReadRequest};
pub use server::TftpServer;
pub use session::{SessionState, TransferReport, TransferSession};
pub use transport::{PeerChannel, UdpPeerChannel};
