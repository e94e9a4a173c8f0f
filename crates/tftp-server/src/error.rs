//! TFTP server errors
//!
//! Errors are split by scope: decoding a single datagram, running one
//! transfer session, and running the server itself.

use crate::packet::ErrorCode;
use thiserror::Error;

/// Errors produced when a datagram cannot be decoded into a packet.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// Structural violation: wrong opcode, truncated header, missing terminator
    #[error("invalid packet: {0}")]
    InvalidPacket(&'static str),

    /// Read request asked for a transfer mode other than octet
    #[error("unsupported transfer mode: {0}")]
    UnsupportedMode(String),
}

/// Terminal failures of a single transfer session.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Reading the next block from the payload failed
    #[error("failed to read payload: {0}")]
    Payload(#[source] std::io::Error),

    /// Sending to or receiving from the peer failed for a reason other than a timeout
    #[error("transport error: {0}")]
    Transport(#[source] std::io::Error),

    /// The peer aborted the transfer with an error packet
    #[error("peer reported {code:?}: {message}")]
    PeerReported {
        /// Error code sent by the peer
        code: ErrorCode,
        /// Human readable message sent by the peer
        message: String,
    },

    /// The block was retransmitted until the retry budget ran out
    #[error("retries exhausted for block {block}")]
    RetriesExhausted {
        /// Block number that was never acknowledged
        block: u16,
    },
}

/// Server-level errors.
#[derive(Debug, Error)]
pub enum TftpError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),
}
