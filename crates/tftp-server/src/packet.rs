//! TFTP packet codec.
//!
//! Pure encode/decode functions for the packet kinds a read-only server
//! needs. Nothing here holds state or touches a socket; decoding is the
//! boundary where untrusted datagrams enter the server, so every decoder
//! returns a [`DecodeError`] instead of panicking on malformed input.
//!
//! Wire layout (all integers big-endian, strings terminated by one zero byte):
//!
//! | Packet      | Opcode | Layout                                   |
//! |-------------|--------|------------------------------------------|
//! | ReadRequest | 1      | opcode(2) filename 0x00 mode 0x00        |
//! | (write)     | 2      | reserved, never produced or accepted     |
//! | Data        | 3      | opcode(2) block(2) payload(0..=512)      |
//! | Ack         | 4      | opcode(2) block(2)                       |
//! | Error       | 5      | opcode(2) errcode(2) message 0x00        |

use crate::error::DecodeError;
use std::io::{self, Read};

/// Largest datagram exchanged by the protocol.
pub const DATAGRAM_SIZE: usize = 516;

/// Payload bytes carried by a full data packet.
pub const BLOCK_SIZE: usize = DATAGRAM_SIZE - 4;

/// The only transfer mode the server accepts.
pub const OCTET_MODE: &str = "octet";

/// Packet kind identifier carried in the first two bytes of every datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Opcode {
    /// Read request (RRQ)
    ReadRequest = 1,
    /// Write request (WRQ), reserved
    WriteRequest = 2,
    /// Data block
    Data = 3,
    /// Acknowledgement
    Ack = 4,
    /// Error
    Error = 5,
}

impl Opcode {
    /// Map a wire value to an opcode, `None` for anything outside 1..=5.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(Self::ReadRequest),
            2 => Some(Self::WriteRequest),
            3 => Some(Self::Data),
            4 => Some(Self::Ack),
            5 => Some(Self::Error),
            _ => None,
        }
    }

    /// Wire value of the opcode.
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

/// Error codes carried by error packets.
///
/// The eight RFC 1350 codes are named; anything else a peer sends (for
/// example 8, the RFC 2347 option refusal) is kept as [`ErrorCode::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Not defined, see message
    Unknown,
    /// File not found
    NotFound,
    /// Access violation
    AccessViolation,
    /// Disk full or allocation exceeded
    DiskFull,
    /// Illegal TFTP operation
    IllegalOperation,
    /// Unknown transfer ID
    UnknownTransferId,
    /// File already exists
    FileAlreadyExists,
    /// No such user
    NoSuchUser,
    /// Code outside 0..=7
    Other(u16),
}

impl ErrorCode {
    /// Map a wire value to an error code. Every value maps to something.
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => Self::Unknown,
            1 => Self::NotFound,
            2 => Self::AccessViolation,
            3 => Self::DiskFull,
            4 => Self::IllegalOperation,
            5 => Self::UnknownTransferId,
            6 => Self::FileAlreadyExists,
            7 => Self::NoSuchUser,
            other => Self::Other(other),
        }
    }

    /// Wire value of the error code.
    pub fn as_u16(self) -> u16 {
        match self {
            Self::Unknown => 0,
            Self::NotFound => 1,
            Self::AccessViolation => 2,
            Self::DiskFull => 3,
            Self::IllegalOperation => 4,
            Self::UnknownTransferId => 5,
            Self::FileAlreadyExists => 6,
            Self::NoSuchUser => 7,
            Self::Other(code) => code,
        }
    }
}

/// A decoded read request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRequest {
    /// Requested file name, never empty
    pub filename: String,
    /// Transfer mode as sent by the client (case preserved)
    pub mode: String,
}

/// A decoded data packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPacket {
    /// Block number, starting at 1 and wrapping at 65536
    pub block: u16,
    /// Between 0 and [`BLOCK_SIZE`] bytes of payload
    pub payload: Vec<u8>,
}

impl DataPacket {
    /// A short (or empty) block ends the transfer.
    pub fn is_final(&self) -> bool {
        self.payload.len() < BLOCK_SIZE
    }
}

/// A decoded error packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorPacket {
    /// Error code
    pub code: ErrorCode,
    /// Human readable message
    pub message: String,
}

/// Any packet the server is willing to decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// Read request
    ReadRequest(ReadRequest),
    /// Data block
    Data(DataPacket),
    /// Acknowledged block number
    Ack(u16),
    /// Error reported by the peer
    Error(ErrorPacket),
}

impl Packet {
    /// Decode a datagram by dispatching on its opcode.
    ///
    /// Write requests and unknown opcodes are rejected as invalid.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        match read_u16(bytes, 0).and_then(Opcode::from_u16) {
            Some(Opcode::ReadRequest) => decode_read_request(bytes).map(Packet::ReadRequest),
            Some(Opcode::Data) => decode_data(bytes).map(Packet::Data),
            Some(Opcode::Ack) => decode_ack(bytes).map(Packet::Ack),
            Some(Opcode::Error) => decode_error(bytes).map(Packet::Error),
            Some(Opcode::WriteRequest) => {
                Err(DecodeError::InvalidPacket("write requests are not supported"))
            }
            None => Err(DecodeError::InvalidPacket("unknown opcode")),
        }
    }
}

fn read_u16(bytes: &[u8], offset: usize) -> Option<u16> {
    let field = bytes.get(offset..offset + 2)?;
    Some(u16::from_be_bytes([field[0], field[1]]))
}

fn check_opcode(bytes: &[u8], expected: Opcode, context: &'static str) -> Result<(), DecodeError> {
    match read_u16(bytes, 0) {
        Some(code) if code == expected.as_u16() => Ok(()),
        _ => Err(DecodeError::InvalidPacket(context)),
    }
}

/// Split a zero-terminated field off the front of `bytes`.
/// Returns the field without its terminator and the remaining bytes.
fn split_terminated(bytes: &[u8]) -> Option<(&[u8], &[u8])> {
    let end = bytes.iter().position(|&b| b == 0)?;
    Some((&bytes[..end], &bytes[end + 1..]))
}

/// Encode a read request. An empty `mode` is sent as `octet`.
pub fn encode_read_request(filename: &str, mode: &str) -> Vec<u8> {
    let mode = if mode.is_empty() { OCTET_MODE } else { mode };

    let mut out = Vec::with_capacity(2 + filename.len() + 1 + mode.len() + 1);
    out.extend_from_slice(&Opcode::ReadRequest.as_u16().to_be_bytes());
    out.extend_from_slice(filename.as_bytes());
    out.push(0);
    out.extend_from_slice(mode.as_bytes());
    out.push(0);
    out
}

/// Decode a read request, accepting octet mode only.
///
/// Anything after the mode terminator (RFC 2347 options) is ignored.
pub fn decode_read_request(bytes: &[u8]) -> Result<ReadRequest, DecodeError> {
    check_opcode(bytes, Opcode::ReadRequest, "not a read request")?;

    let (filename, rest) = split_terminated(&bytes[2..])
        .ok_or(DecodeError::InvalidPacket("filename is not terminated"))?;
    if filename.is_empty() {
        return Err(DecodeError::InvalidPacket("empty filename"));
    }

    let (mode, _) =
        split_terminated(rest).ok_or(DecodeError::InvalidPacket("mode is not terminated"))?;
    if mode.is_empty() {
        return Err(DecodeError::InvalidPacket("empty mode"));
    }

    let filename = std::str::from_utf8(filename)
        .map_err(|_| DecodeError::InvalidPacket("filename is not valid UTF-8"))?;
    let mode = String::from_utf8_lossy(mode).into_owned();
    if mode.to_lowercase() != OCTET_MODE {
        return Err(DecodeError::UnsupportedMode(mode));
    }

    Ok(ReadRequest {
        filename: filename.to_owned(),
        mode,
    })
}

/// Encode the data packet following `block`.
///
/// The block number is incremented (wrapping) before it is written, then up
/// to [`BLOCK_SIZE`] bytes are copied from `payload`. An exhausted reader
/// yields an empty block, which is how a transfer whose length is a multiple
/// of 512 signals its end. Returns the packet and the block number it carries.
pub fn encode_data<R: Read>(block: u16, payload: &mut R) -> io::Result<(Vec<u8>, u16)> {
    let block = block.wrapping_add(1);

    let mut out = Vec::with_capacity(DATAGRAM_SIZE);
    out.extend_from_slice(&Opcode::Data.as_u16().to_be_bytes());
    out.extend_from_slice(&block.to_be_bytes());
    payload.take(BLOCK_SIZE as u64).read_to_end(&mut out)?;

    Ok((out, block))
}

/// Decode a data packet.
pub fn decode_data(bytes: &[u8]) -> Result<DataPacket, DecodeError> {
    if bytes.len() < 4 || bytes.len() > DATAGRAM_SIZE {
        return Err(DecodeError::InvalidPacket("data packet length out of range"));
    }
    check_opcode(bytes, Opcode::Data, "not a data packet")?;
    let block =
        read_u16(bytes, 2).ok_or(DecodeError::InvalidPacket("truncated block number"))?;

    Ok(DataPacket {
        block,
        payload: bytes[4..].to_vec(),
    })
}

/// Encode an acknowledgement for `block`.
pub fn encode_ack(block: u16) -> Vec<u8> {
    let mut out = Vec::with_capacity(4);
    out.extend_from_slice(&Opcode::Ack.as_u16().to_be_bytes());
    out.extend_from_slice(&block.to_be_bytes());
    out
}

/// Decode an acknowledgement, returning the acknowledged block number.
pub fn decode_ack(bytes: &[u8]) -> Result<u16, DecodeError> {
    check_opcode(bytes, Opcode::Ack, "not an ack")?;
    read_u16(bytes, 2).ok_or(DecodeError::InvalidPacket("truncated block number"))
}

/// Encode an error packet.
pub fn encode_error(code: ErrorCode, message: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + 2 + message.len() + 1);
    out.extend_from_slice(&Opcode::Error.as_u16().to_be_bytes());
    out.extend_from_slice(&code.as_u16().to_be_bytes());
    out.extend_from_slice(message.as_bytes());
    out.push(0);
    out
}

/// Decode an error packet.
///
/// A message without its terminating zero byte is accepted as-is.
pub fn decode_error(bytes: &[u8]) -> Result<ErrorPacket, DecodeError> {
    check_opcode(bytes, Opcode::Error, "not an error packet")?;
    let raw = read_u16(bytes, 2).ok_or(DecodeError::InvalidPacket("truncated error code"))?;
    let code = ErrorCode::from_u16(raw);

    let body = &bytes[4..];
    let message = match split_terminated(body) {
        Some((message, _)) => message,
        None => body,
    };

    Ok(ErrorPacket {
        code,
        message: String::from_utf8_lossy(message).into_owned(),
    })
}

/// Stateful data packet producer over a payload reader.
///
/// Tracks the last block number handed out so callers only ever ask for
/// "the next packet".
#[derive(Debug)]
pub struct DataStream<R> {
    block: u16,
    reader: R,
}

impl<R: Read> DataStream<R> {
    /// Start a stream at block 0; the first packet carries block 1.
    pub fn new(reader: R) -> Self {
        Self { block: 0, reader }
    }

    /// Block number of the most recently produced packet (0 before the first).
    pub fn block(&self) -> u16 {
        self.block
    }

    /// Produce the next data packet.
    pub fn next_packet(&mut self) -> io::Result<Vec<u8>> {
        let (packet, block) = encode_data(self.block, &mut self.reader)?;
        self.block = block;
        Ok(packet)
    }
}
