//! Transfer session state machine.
//!
//! One [`TransferSession`] serves the payload to one peer. It alternates
//! between sending a block and waiting for the matching acknowledgement,
//! retransmitting the same datagram whenever an attempt is wasted (timeout,
//! corrupt datagram, stale acknowledgement) until the retry budget for that
//! block runs out.
//!
//! ```text
//!                 send ok                    ack == block, full block
//! SendingBlock ------------> AwaitingAck ----------------------------> SendingBlock
//!      |                       |   ^  \
//!      | read/send error       |   |   \ ack == block, short block
//!      v                       |   |    `------------------------> Completed
//!    Failed <------------------'   |
//!   error packet, retries          | timeout / bad packet / stale ack:
//!   exhausted, transport error     | consume one retry, resend
//!                                  '------'
//! ```

use crate::config::TransferSettings;
use crate::error::TransferError;
use crate::packet::{DATAGRAM_SIZE, DataStream, Packet};
use crate::transport::PeerChannel;
use std::io::{self, Cursor};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, warn};

/// Position of a session in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Next block has to be produced and sent
    SendingBlock,
    /// Last block is in flight, waiting for its acknowledgement
    AwaitingAck,
    /// Final block acknowledged
    Completed,
    /// Transfer abandoned
    Failed,
}

impl SessionState {
    /// Whether the session can make no further progress.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Summary of a completed transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferReport {
    /// Peer that received the payload
    pub peer: SocketAddr,
    /// Number of distinct data blocks sent (retransmissions not counted)
    pub blocks_sent: u64,
    /// Payload bytes delivered
    pub bytes_sent: u64,
}

/// Serves the shared payload to a single peer.
#[derive(Debug)]
pub struct TransferSession {
    peer: SocketAddr,
    settings: TransferSettings,
    blocks: DataStream<Cursor<Arc<[u8]>>>,
    state: SessionState,
    retries_left: u8,
    last_packet: Vec<u8>,
    blocks_sent: u64,
    bytes_sent: u64,
}

impl TransferSession {
    /// Create a session at block 0 with a fresh cursor over `payload`.
    pub fn new(peer: SocketAddr, payload: Arc<[u8]>, settings: TransferSettings) -> Self {
        Self {
            peer,
            settings,
            blocks: DataStream::new(Cursor::new(payload)),
            state: SessionState::SendingBlock,
            retries_left: settings.retries,
            last_packet: Vec::with_capacity(DATAGRAM_SIZE),
            blocks_sent: 0,
            bytes_sent: 0,
        }
    }

    /// Peer this session serves.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Block number of the last data packet sent (0 before the first).
    pub fn block(&self) -> u16 {
        self.blocks.block()
    }

    /// Attempts left for the block currently in flight.
    pub fn retries_left(&self) -> u8 {
        self.retries_left
    }

    /// Drive the session until it completes or fails.
    pub async fn run<C>(&mut self, channel: &mut C) -> Result<TransferReport, TransferError>
    where
        C: PeerChannel + ?Sized,
    {
        while !self.state.is_terminal() {
            self.step(channel).await?;
        }

        Ok(TransferReport {
            peer: self.peer,
            blocks_sent: self.blocks_sent,
            bytes_sent: self.bytes_sent,
        })
    }

    /// Perform a single transition and return the resulting state.
    ///
    /// Any error moves the session to [`SessionState::Failed`]. Stepping a
    /// terminal session is a no-op.
    pub async fn step<C>(&mut self, channel: &mut C) -> Result<SessionState, TransferError>
    where
        C: PeerChannel + ?Sized,
    {
        let outcome = match self.state {
            SessionState::SendingBlock => self.send_next_block(channel).await,
            SessionState::AwaitingAck => self.await_ack(channel).await,
            SessionState::Completed | SessionState::Failed => return Ok(self.state),
        };

        match outcome {
            Ok(next) => {
                self.state = next;
                Ok(next)
            }
            Err(e) => {
                self.state = SessionState::Failed;
                Err(e)
            }
        }
    }

    async fn send_next_block<C>(&mut self, channel: &mut C) -> Result<SessionState, TransferError>
    where
        C: PeerChannel + ?Sized,
    {
        self.last_packet = self.blocks.next_packet().map_err(TransferError::Payload)?;
        channel
            .send(&self.last_packet)
            .await
            .map_err(TransferError::Transport)?;

        self.retries_left = self.settings.retries;
        self.blocks_sent += 1;
        self.bytes_sent += (self.last_packet.len() - 4) as u64;
        debug!(
            "[{}] sent block {} ({} bytes)",
            self.peer,
            self.block(),
            self.last_packet.len() - 4
        );

        Ok(SessionState::AwaitingAck)
    }

    async fn await_ack<C>(&mut self, channel: &mut C) -> Result<SessionState, TransferError>
    where
        C: PeerChannel + ?Sized,
    {
        let mut buf = [0u8; DATAGRAM_SIZE];
        let received = channel.recv(&mut buf, self.settings.timeout).await;

        match received {
            Ok(n) => match Packet::decode(&buf[..n]) {
                Ok(Packet::Ack(block)) if block == self.block() => {
                    if self.last_packet.len() < DATAGRAM_SIZE {
                        Ok(SessionState::Completed)
                    } else {
                        Ok(SessionState::SendingBlock)
                    }
                }
                Ok(Packet::Ack(block)) => {
                    debug!(
                        "[{}] ack for block {} while waiting for {}",
                        self.peer,
                        block,
                        self.block()
                    );
                    self.retransmit(channel).await
                }
                Ok(Packet::Error(error)) => {
                    warn!("[{}] error received: {}", self.peer, error.message);
                    Err(TransferError::PeerReported {
                        code: error.code,
                        message: error.message,
                    })
                }
                Ok(_) => {
                    debug!("[{}] bad packet: unexpected packet kind", self.peer);
                    self.retransmit(channel).await
                }
                Err(e) => {
                    debug!("[{}] bad packet: {}", self.peer, e);
                    self.retransmit(channel).await
                }
            },
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                debug!("[{}] timed out waiting for block {} ack", self.peer, self.block());
                self.retransmit(channel).await
            }
            Err(e) => {
                warn!("[{}] waiting for acknowledgement: {}", self.peer, e);
                Err(TransferError::Transport(e))
            }
        }
    }

    /// Spend one attempt and resend the block in flight, or give up.
    async fn retransmit<C>(&mut self, channel: &mut C) -> Result<SessionState, TransferError>
    where
        C: PeerChannel + ?Sized,
    {
        self.retries_left = self.retries_left.saturating_sub(1);
        if self.retries_left == 0 {
            warn!("[{}] too many retries for block {}", self.peer, self.block());
            return Err(TransferError::RetriesExhausted {
                block: self.block(),
            });
        }

        channel
            .send(&self.last_packet)
            .await
            .map_err(TransferError::Transport)?;
        Ok(SessionState::AwaitingAck)
    }
}
