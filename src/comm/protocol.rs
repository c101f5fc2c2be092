//! Worker protocol
//!
//! Messages exchanged between the coordinator (rank 0) and the other
//! workers. The in-process transport passes these values over channels
//! directly; the TCP transport frames them with MessagePack (rmp-serde).
//!
//! # Message Flow
//!
//! ```text
//! Coordinator (rank 0)                Worker (rank r)
//!     |                                  |
//!     |<------- HELLO(rank?) ------------|
//!     |-------- WELCOME(rank, config) -->|
//!     |                                  |
//!     |   per round:                     |
//!     |<------- CONTRIBUTE(seq, k_r) ----|   (global-min election)
//!     |-------- BROADCAST(seq, k) ------>|
//!     |                                  |
//!     |<------- CONTRIBUTE(seq, count) --|   (final reduction)
//! ```
//!
//! # Message Framing
//!
//! Each message is prefixed with a 4-byte length field (little-endian u32):
//!
//! ```text
//! [4 bytes: message length][N bytes: MessagePack-serialized message]
//! ```

use crate::config::Config;
use crate::error::{SieveError, SieveResult};
use serde::{Deserialize, Serialize};

/// Protocol version
///
/// Coordinator and workers must have matching protocol versions.
pub const PROTOCOL_VERSION: u32 = 1;

/// Largest frame accepted from the wire
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Protocol message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    /// Join request (Worker → Coordinator)
    Hello(HelloMessage),

    /// Join acceptance carrying the run configuration (Coordinator → Worker)
    Welcome(WelcomeMessage),

    /// Join refusal (Coordinator → Worker)
    Reject(RejectMessage),

    /// One-to-all value from the coordinator
    Broadcast(BroadcastMessage),

    /// All-to-root value from a worker
    Contribute(ContributeMessage),
}

impl Message {
    /// Short name used in protocol errors
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Hello(_) => "HELLO",
            Message::Welcome(_) => "WELCOME",
            Message::Reject(_) => "REJECT",
            Message::Broadcast(_) => "BROADCAST",
            Message::Contribute(_) => "CONTRIBUTE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelloMessage {
    pub protocol_version: u32,
    /// Rank the worker asks for; the coordinator picks one when absent
    pub requested_rank: Option<usize>,
    /// Host name of the worker, for logs
    pub host: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WelcomeMessage {
    pub protocol_version: u32,
    /// Rank assigned to the worker
    pub rank: usize,
    /// Total number of workers including the coordinator
    pub world_size: usize,
    /// Configuration every worker runs with
    pub config: Config,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectMessage {
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastMessage {
    /// Collective sequence number
    pub seq: u64,
    pub value: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributeMessage {
    /// Collective sequence number
    pub seq: u64,
    /// Rank of the sender
    pub rank: usize,
    pub value: Option<u64>,
}

/// Serialize a message to bytes with its length prefix
pub fn serialize_message(msg: &Message) -> SieveResult<Vec<u8>> {
    let msg_bytes = rmp_serde::to_vec_named(msg)
        .map_err(|e| SieveError::Codec(format!("Failed to serialize {}: {}", msg.kind(), e)))?;

    let msg_len = u32::try_from(msg_bytes.len())
        .map_err(|_| SieveError::Codec(format!("{} too large to frame", msg.kind())))?;
    let mut framed = Vec::with_capacity(4 + msg_bytes.len());
    framed.extend_from_slice(&msg_len.to_le_bytes());
    framed.extend_from_slice(&msg_bytes);

    Ok(framed)
}

/// Deserialize a message from bytes
///
/// Returns (message, bytes_consumed) where bytes_consumed includes the length prefix.
#[cfg(test)]
pub(crate) fn deserialize_message(buf: &[u8]) -> SieveResult<(Message, usize)> {
    if buf.len() < 4 {
        return Err(SieveError::Codec(format!(
            "Buffer too small for message length (need 4 bytes, got {})",
            buf.len()
        )));
    }

    let msg_len = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    if buf.len() < 4 + msg_len {
        return Err(SieveError::Codec(format!(
            "Incomplete message (need {} bytes, got {})",
            4 + msg_len,
            buf.len()
        )));
    }

    let msg = decode_body(&buf[4..4 + msg_len])?;
    Ok((msg, 4 + msg_len))
}

fn decode_body(body: &[u8]) -> SieveResult<Message> {
    rmp_serde::from_slice(body)
        .map_err(|e| SieveError::Codec(format!("Failed to deserialize message: {}", e)))
}

/// Read a complete message from a TCP stream
pub async fn read_message(stream: &mut tokio::net::TcpStream) -> SieveResult<Message> {
    use tokio::io::AsyncReadExt;

    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await
        .map_err(|e| SieveError::transport("Failed to read message length", e))?;

    let msg_len = u32::from_le_bytes(len_buf) as usize;
    if msg_len > MAX_FRAME_LEN {
        return Err(SieveError::Codec(format!(
            "Message too large: {} bytes (max {})",
            msg_len, MAX_FRAME_LEN
        )));
    }

    let mut msg_buf = vec![0u8; msg_len];
    stream.read_exact(&mut msg_buf).await
        .map_err(|e| SieveError::transport("Failed to read message body", e))?;

    decode_body(&msg_buf)
}

/// Write a message to a TCP stream
pub async fn write_message(stream: &mut tokio::net::TcpStream, msg: &Message) -> SieveResult<()> {
    use tokio::io::AsyncWriteExt;

    let framed = serialize_message(msg)?;

    stream.write_all(&framed).await
        .map_err(|e| SieveError::transport(format!("Failed to write {}", msg.kind()), e))?;
    stream.flush().await
        .map_err(|e| SieveError::transport("Failed to flush stream", e))?;

    Ok(())
}
