// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Hello / Acknowledge / Error connection-protocol messages.
//!
//! ```text
//! HEL  ProtocolVersion u32 | ReceiveBufferSize u32 | SendBufferSize u32
//!      MaxMessageSize u32  | MaxChunkCount u32     | EndpointUrl String
//! ACK  ProtocolVersion u32 | ReceiveBufferSize u32 | SendBufferSize u32
//!      MaxMessageSize u32  | MaxChunkCount u32
//! ERR  Error u32           | Reason String
//! ```
//!
//! Strings are an `i32` length prefix followed by UTF-8 bytes; `-1` is null.
//! All integers are little-endian.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::config::{ChannelConfig, MIN_CHUNK_SIZE};
use crate::error::{ConnectionError, StatusCode, TransportError, UaResult};
use crate::pipeline::codec::{MessageType, UascFrame};

/// Longest endpoint URL allowed in a Hello message.
pub const MAX_ENDPOINT_URL_LEN: usize = 4096;

// =============================================================================
// HelloMessage
// =============================================================================

/// Client hello.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelloMessage {
    /// Protocol version.
    pub protocol_version: u32,
    /// Largest chunk the client can receive.
    pub receive_buffer_size: u32,
    /// Largest chunk the client will send.
    pub send_buffer_size: u32,
    /// Largest message the client accepts, 0 for no limit.
    pub max_message_size: u32,
    /// Most chunks per message the client accepts, 0 for no limit.
    pub max_chunk_count: u32,
    /// Endpoint URL the client wants to reach.
    pub endpoint_url: String,
}

impl HelloMessage {
    /// Builds a hello announcing the limits in `config`.
    pub fn new(endpoint_url: impl Into<String>, config: &ChannelConfig) -> Self {
        Self {
            protocol_version: config.protocol_version,
            receive_buffer_size: config.max_chunk_size,
            send_buffer_size: config.max_chunk_size,
            max_message_size: config.max_message_size,
            max_chunk_count: config.max_chunk_count,
            endpoint_url: endpoint_url.into(),
        }
    }

    /// Encodes the message as a single final chunk.
    pub fn encode(&self) -> UaResult<UascFrame> {
        if self.endpoint_url.len() > MAX_ENDPOINT_URL_LEN {
            return Err(TransportError::invalid_frame(format!(
                "endpoint url of {} bytes exceeds {}",
                self.endpoint_url.len(),
                MAX_ENDPOINT_URL_LEN
            ))
            .into());
        }

        let mut body = BytesMut::with_capacity(24 + self.endpoint_url.len());
        body.put_u32_le(self.protocol_version);
        body.put_u32_le(self.receive_buffer_size);
        body.put_u32_le(self.send_buffer_size);
        body.put_u32_le(self.max_message_size);
        body.put_u32_le(self.max_chunk_count);
        put_string(&mut body, Some(&self.endpoint_url));
        Ok(UascFrame::final_chunk(MessageType::Hello, body.freeze()))
    }

    /// Decodes a hello body.
    pub fn decode(mut body: Bytes) -> UaResult<Self> {
        let protocol_version = get_u32(&mut body, "ProtocolVersion")?;
        let receive_buffer_size = get_u32(&mut body, "ReceiveBufferSize")?;
        let send_buffer_size = get_u32(&mut body, "SendBufferSize")?;
        let max_message_size = get_u32(&mut body, "MaxMessageSize")?;
        let max_chunk_count = get_u32(&mut body, "MaxChunkCount")?;
        let endpoint_url = get_string(&mut body, MAX_ENDPOINT_URL_LEN)?.unwrap_or_default();
        Ok(Self {
            protocol_version,
            receive_buffer_size,
            send_buffer_size,
            max_message_size,
            max_chunk_count,
            endpoint_url,
        })
    }
}

// =============================================================================
// AcknowledgeMessage
// =============================================================================

/// Server acknowledge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcknowledgeMessage {
    /// Protocol version.
    pub protocol_version: u32,
    /// Largest chunk the server can receive.
    pub receive_buffer_size: u32,
    /// Largest chunk the server will send.
    pub send_buffer_size: u32,
    /// Largest message the server accepts, 0 for no limit.
    pub max_message_size: u32,
    /// Most chunks per message the server accepts, 0 for no limit.
    pub max_chunk_count: u32,
}

impl AcknowledgeMessage {
    /// Encodes the message as a single final chunk.
    pub fn encode(&self) -> UascFrame {
        let mut body = BytesMut::with_capacity(20);
        body.put_u32_le(self.protocol_version);
        body.put_u32_le(self.receive_buffer_size);
        body.put_u32_le(self.send_buffer_size);
        body.put_u32_le(self.max_message_size);
        body.put_u32_le(self.max_chunk_count);
        UascFrame::final_chunk(MessageType::Acknowledge, body.freeze())
    }

    /// Decodes an acknowledge body.
    pub fn decode(mut body: Bytes) -> UaResult<Self> {
        Ok(Self {
            protocol_version: get_u32(&mut body, "ProtocolVersion")?,
            receive_buffer_size: get_u32(&mut body, "ReceiveBufferSize")?,
            send_buffer_size: get_u32(&mut body, "SendBufferSize")?,
            max_message_size: get_u32(&mut body, "MaxMessageSize")?,
            max_chunk_count: get_u32(&mut body, "MaxChunkCount")?,
        })
    }
}

// =============================================================================
// ErrorMessage
// =============================================================================

/// Transport error reported by the server before closing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorMessage {
    /// Status code.
    pub status: StatusCode,
    /// Human-readable reason.
    pub reason: String,
}

impl ErrorMessage {
    /// Creates an error message.
    pub fn new(status: StatusCode, reason: impl Into<String>) -> Self {
        Self {
            status,
            reason: reason.into(),
        }
    }

    /// Encodes the message as a single final chunk.
    pub fn encode(&self) -> UascFrame {
        let mut body = BytesMut::with_capacity(8 + self.reason.len());
        body.put_u32_le(self.status.value());
        put_string(&mut body, Some(&self.reason));
        UascFrame::final_chunk(MessageType::Error, body.freeze())
    }

    /// Decodes an error body.
    pub fn decode(mut body: Bytes) -> UaResult<Self> {
        let status = StatusCode(get_u32(&mut body, "Error")?);
        let reason = get_string(&mut body, usize::MAX)?.unwrap_or_default();
        Ok(Self { status, reason })
    }
}

impl From<ErrorMessage> for ConnectionError {
    fn from(message: ErrorMessage) -> Self {
        ConnectionError::server_error(message.status, message.reason)
    }
}

// =============================================================================
// NegotiatedLimits
// =============================================================================

/// Limits in effect after the Hello/Acknowledge exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiatedLimits {
    /// Protocol version both sides speak.
    pub protocol_version: u32,
    /// Largest chunk this side accepts.
    pub receive_chunk_size: u32,
    /// Largest chunk this side may send.
    pub send_chunk_size: u32,
    /// Largest message in either direction.
    pub max_message_size: u32,
    /// Most chunks per message in either direction.
    pub max_chunk_count: u32,
}

impl NegotiatedLimits {
    /// Limits used before negotiation, straight from configuration.
    pub fn from_config(config: &ChannelConfig) -> Self {
        Self {
            protocol_version: config.protocol_version,
            receive_chunk_size: config.max_chunk_size,
            send_chunk_size: config.max_chunk_size,
            max_message_size: config.max_message_size,
            max_chunk_count: config.max_chunk_count,
        }
    }

    /// Reconciles the local hello with the server acknowledge.
    ///
    /// Fails when the server would send chunks larger than we accept or
    /// announces buffers below the protocol minimum.
    pub fn negotiate(local: &HelloMessage, ack: &AcknowledgeMessage) -> UaResult<Self> {
        if ack.send_buffer_size > local.receive_buffer_size {
            return Err(TransportError::negotiation(format!(
                "server send buffer {} exceeds receive buffer {}",
                ack.send_buffer_size, local.receive_buffer_size
            ))
            .into());
        }
        if ack.receive_buffer_size < MIN_CHUNK_SIZE || ack.send_buffer_size < MIN_CHUNK_SIZE {
            return Err(TransportError::negotiation(format!(
                "server buffers {}/{} are below the minimum of {}",
                ack.receive_buffer_size, ack.send_buffer_size, MIN_CHUNK_SIZE
            ))
            .into());
        }

        Ok(Self {
            protocol_version: local.protocol_version.min(ack.protocol_version),
            receive_chunk_size: ack.send_buffer_size,
            send_chunk_size: local.send_buffer_size.min(ack.receive_buffer_size),
            max_message_size: min_limit(local.max_message_size, ack.max_message_size),
            max_chunk_count: min_limit(local.max_chunk_count, ack.max_chunk_count),
        })
    }
}

/// A remote 0 means "no limit".
fn min_limit(local: u32, remote: u32) -> u32 {
    match (local, remote) {
        (l, 0) => l,
        (0, r) => r,
        (l, r) => l.min(r),
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn get_u32(buf: &mut Bytes, field: &str) -> UaResult<u32> {
    if buf.remaining() < 4 {
        return Err(TransportError::invalid_frame(format!("truncated field {}", field)).into());
    }
    Ok(buf.get_u32_le())
}

fn get_string(buf: &mut Bytes, max_len: usize) -> UaResult<Option<String>> {
    if buf.remaining() < 4 {
        return Err(TransportError::invalid_frame("truncated string length").into());
    }
    let len = buf.get_i32_le();
    if len < 0 {
        return Ok(None);
    }
    let len = len as usize;
    if len > max_len {
        return Err(TransportError::invalid_frame(format!(
            "string of {} bytes exceeds {}",
            len, max_len
        ))
        .into());
    }
    if buf.remaining() < len {
        return Err(TransportError::invalid_frame("truncated string").into());
    }
    let raw = buf.split_to(len);
    String::from_utf8(raw.to_vec())
        .map(Some)
        .map_err(|_| TransportError::invalid_frame("string is not valid UTF-8").into())
}

fn put_string(buf: &mut BytesMut, value: Option<&str>) {
    match value {
        Some(s) => {
            buf.put_i32_le(s.len() as i32);
            buf.put_slice(s.as_bytes());
        }
        None => buf.put_i32_le(-1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UaError;

    fn hello() -> HelloMessage {
        HelloMessage::new("opc.tcp://localhost:4840", &ChannelConfig::default())
    }

    fn ack(receive: u32, send: u32) -> AcknowledgeMessage {
        AcknowledgeMessage {
            protocol_version: 0,
            receive_buffer_size: receive,
            send_buffer_size: send,
            max_message_size: 0,
            max_chunk_count: 0,
        }
    }

    #[test]
    fn test_hello_wire_layout() {
        let frame = hello().encode().unwrap();
        assert_eq!(frame.message_type, MessageType::Hello);
        let bytes = frame.to_bytes();
        assert_eq!(&bytes[0..4], b"HELF");
        let size = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
        assert_eq!(size, bytes.len());
        // receive buffer follows the protocol version
        assert_eq!(&bytes[12..16], &65_535u32.to_le_bytes());

        let decoded = HelloMessage::decode(frame.body).unwrap();
        assert_eq!(decoded, hello());
    }

    #[test]
    fn test_hello_rejects_long_url() {
        let mut message = hello();
        message.endpoint_url = "x".repeat(MAX_ENDPOINT_URL_LEN + 1);
        assert!(message.encode().is_err());
    }

    #[test]
    fn test_truncated_acknowledge() {
        let err = AcknowledgeMessage::decode(Bytes::from_static(&[0, 0, 0, 0, 1])).unwrap_err();
        assert!(matches!(
            err,
            UaError::Transport(TransportError::InvalidFrame { .. })
        ));
    }

    #[test]
    fn test_error_message_into_connection_error() {
        let frame = ErrorMessage::new(StatusCode::BAD_TCP_ENDPOINT_URL_INVALID, "unknown path").encode();
        let decoded = ErrorMessage::decode(frame.body).unwrap();
        let err = ConnectionError::from(decoded);
        assert!(matches!(
            err,
            ConnectionError::ServerError { status, .. } if status == StatusCode::BAD_TCP_ENDPOINT_URL_INVALID
        ));
    }

    #[test]
    fn test_negotiate_takes_minimum() {
        let ack = AcknowledgeMessage {
            protocol_version: 0,
            receive_buffer_size: 16_384,
            send_buffer_size: 8192,
            max_message_size: 1_048_576,
            max_chunk_count: 0,
        };
        let limits = NegotiatedLimits::negotiate(&hello(), &ack).unwrap();
        assert_eq!(limits.receive_chunk_size, 8192);
        assert_eq!(limits.send_chunk_size, 16_384);
        assert_eq!(limits.max_message_size, 1_048_576);
        assert_eq!(limits.max_chunk_count, 64);
    }

    #[test]
    fn test_negotiate_rejects_oversized_server_send_buffer() {
        assert!(NegotiatedLimits::negotiate(&hello(), &ack(65_535, 131_072)).is_err());
    }

    #[test]
    fn test_negotiate_rejects_tiny_buffers() {
        assert!(NegotiatedLimits::negotiate(&hello(), &ack(4096, 8192)).is_err());
    }
}
