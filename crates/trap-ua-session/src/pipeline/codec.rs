// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! UASC chunk framing.
//!
//! Every UASC chunk starts with an 8-byte header:
//!
//! ```text
//! +---------+---------+---------+---------+----------------------+
//! |  'M'    |  'S'    |  'G'    |  'F'    |  size (u32, LE)      |
//! +---------+---------+---------+---------+----------------------+
//!  message type (3 bytes)        chunk     total chunk size
//!                                type      including header
//! ```
//!
//! [`UascFrameCodec`] enforces the maximum chunk size in both directions and
//! [`ChunkAssembler`] enforces the message size and chunk count limits.
//! Oversized input is rejected with a typed error; nothing is truncated.

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{TransportError, UaError, UaResult};

/// Length of the chunk header.
pub const HEADER_LEN: usize = 8;

// =============================================================================
// MessageType
// =============================================================================

/// UASC message type carried in the first three header bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// `HEL` - client hello.
    Hello,
    /// `ACK` - server acknowledge.
    Acknowledge,
    /// `ERR` - transport error, followed by connection close.
    Error,
    /// `RHE` - reverse hello.
    ReverseHello,
    /// `OPN` - open secure channel.
    OpenChannel,
    /// `CLO` - close secure channel.
    CloseChannel,
    /// `MSG` - service message.
    Message,
}

impl MessageType {
    /// Returns the three-byte code.
    pub const fn code(&self) -> &'static [u8; 3] {
        match self {
            Self::Hello => b"HEL",
            Self::Acknowledge => b"ACK",
            Self::Error => b"ERR",
            Self::ReverseHello => b"RHE",
            Self::OpenChannel => b"OPN",
            Self::CloseChannel => b"CLO",
            Self::Message => b"MSG",
        }
    }

    /// Parses a three-byte code.
    pub fn from_code(code: &[u8]) -> Option<Self> {
        match code {
            b"HEL" => Some(Self::Hello),
            b"ACK" => Some(Self::Acknowledge),
            b"ERR" => Some(Self::Error),
            b"RHE" => Some(Self::ReverseHello),
            b"OPN" => Some(Self::OpenChannel),
            b"CLO" => Some(Self::CloseChannel),
            b"MSG" => Some(Self::Message),
            _ => None,
        }
    }

    /// Returns `true` for the connection protocol messages that are always
    /// a single final chunk.
    pub const fn is_connection_protocol(&self) -> bool {
        matches!(
            self,
            Self::Hello | Self::Acknowledge | Self::Error | Self::ReverseHello
        )
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(self.code()))
    }
}

// =============================================================================
// ChunkType
// =============================================================================

/// Chunk type carried in the fourth header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkType {
    /// `F` - final chunk of a message.
    Final,
    /// `C` - intermediate chunk.
    Intermediate,
    /// `A` - abort; the message is discarded.
    Abort,
}

impl ChunkType {
    /// Returns the wire byte.
    pub const fn byte(&self) -> u8 {
        match self {
            Self::Final => b'F',
            Self::Intermediate => b'C',
            Self::Abort => b'A',
        }
    }

    /// Parses the wire byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'F' => Some(Self::Final),
            b'C' => Some(Self::Intermediate),
            b'A' => Some(Self::Abort),
            _ => None,
        }
    }
}

// =============================================================================
// UascFrame
// =============================================================================

/// A single UASC chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UascFrame {
    /// Message type.
    pub message_type: MessageType,
    /// Chunk type.
    pub chunk_type: ChunkType,
    /// Chunk body after the header.
    pub body: Bytes,
}

impl UascFrame {
    /// Creates a chunk.
    pub fn new(message_type: MessageType, chunk_type: ChunkType, body: impl Into<Bytes>) -> Self {
        Self {
            message_type,
            chunk_type,
            body: body.into(),
        }
    }

    /// Creates a final chunk.
    pub fn final_chunk(message_type: MessageType, body: impl Into<Bytes>) -> Self {
        Self::new(message_type, ChunkType::Final, body)
    }

    /// Returns the encoded size including the header.
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.body.len()
    }

    /// Encodes the chunk into a contiguous buffer.
    pub fn to_bytes(&self) -> Bytes {
        let mut dst = BytesMut::with_capacity(self.encoded_len());
        self.write_to(&mut dst);
        dst.freeze()
    }

    fn write_to(&self, dst: &mut BytesMut) {
        dst.put_slice(self.message_type.code());
        dst.put_u8(self.chunk_type.byte());
        dst.put_u32_le(self.encoded_len() as u32);
        dst.put_slice(&self.body);
    }

    /// Decodes exactly one chunk from `data`.
    ///
    /// Used for WebSocket messages, which carry one chunk each.
    pub fn decode_single(data: &[u8], max_chunk_size: usize) -> UaResult<Self> {
        let mut buf = BytesMut::from(data);
        let mut codec = UascFrameCodec::new(max_chunk_size);
        match codec.decode(&mut buf)? {
            Some(frame) if buf.is_empty() => Ok(frame),
            Some(_) => Err(TransportError::invalid_frame(format!(
                "{} trailing bytes after chunk",
                buf.len()
            ))
            .into()),
            None => Err(TransportError::invalid_frame(format!(
                "incomplete chunk of {} bytes",
                data.len()
            ))
            .into()),
        }
    }
}

// =============================================================================
// UascFrameCodec
// =============================================================================

/// Chunk codec with independent receive and send limits.
#[derive(Debug, Clone)]
pub struct UascFrameCodec {
    max_receive_chunk: usize,
    max_send_chunk: usize,
}

impl UascFrameCodec {
    /// Creates a codec using the same limit in both directions.
    pub fn new(max_chunk_size: usize) -> Self {
        Self::with_limits(max_chunk_size, max_chunk_size)
    }

    /// Creates a codec with separate receive and send limits.
    pub fn with_limits(max_receive_chunk: usize, max_send_chunk: usize) -> Self {
        Self {
            max_receive_chunk,
            max_send_chunk,
        }
    }

    /// Returns the receive limit.
    pub fn max_receive_chunk(&self) -> usize {
        self.max_receive_chunk
    }

    /// Returns the send limit.
    pub fn max_send_chunk(&self) -> usize {
        self.max_send_chunk
    }

    /// Replaces both limits, typically after Hello/Acknowledge negotiation.
    pub fn set_limits(&mut self, max_receive_chunk: usize, max_send_chunk: usize) {
        self.max_receive_chunk = max_receive_chunk;
        self.max_send_chunk = max_send_chunk;
    }
}

impl Decoder for UascFrameCodec {
    type Item = UascFrame;
    type Error = UaError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let message_type = MessageType::from_code(&src[0..3]).ok_or_else(|| {
            TransportError::invalid_frame(format!(
                "unknown message type {:?}",
                String::from_utf8_lossy(&src[0..3])
            ))
        })?;
        let chunk_type = ChunkType::from_byte(src[3]).ok_or_else(|| {
            TransportError::invalid_frame(format!("unknown chunk type 0x{:02X}", src[3]))
        })?;
        let size = u32::from_le_bytes([src[4], src[5], src[6], src[7]]) as usize;

        if size < HEADER_LEN {
            return Err(TransportError::invalid_frame(format!(
                "chunk size {} is smaller than the header",
                size
            ))
            .into());
        }
        if size > self.max_receive_chunk {
            return Err(TransportError::frame_too_large(size, self.max_receive_chunk).into());
        }

        if src.len() < size {
            src.reserve(size - src.len());
            return Ok(None);
        }

        let mut chunk = src.split_to(size);
        chunk.advance(HEADER_LEN);

        Ok(Some(UascFrame {
            message_type,
            chunk_type,
            body: chunk.freeze(),
        }))
    }
}

impl Encoder<UascFrame> for UascFrameCodec {
    type Error = UaError;

    fn encode(&mut self, item: UascFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let size = item.encoded_len();
        if size > self.max_send_chunk {
            return Err(TransportError::frame_too_large(size, self.max_send_chunk).into());
        }
        dst.reserve(size);
        item.write_to(dst);
        Ok(())
    }
}

// =============================================================================
// ChunkAssembler
// =============================================================================

/// A complete message assembled from one or more chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UascMessage {
    /// Message type shared by all chunks.
    pub message_type: MessageType,
    /// Chunk bodies in arrival order.
    pub chunks: Vec<Bytes>,
    /// `true` if the sender aborted the message; `chunks` then holds the
    /// abort chunk body only.
    pub aborted: bool,
}

impl UascMessage {
    /// Returns the total body size.
    pub fn len(&self) -> usize {
        self.chunks.iter().map(Bytes::len).sum()
    }

    /// Returns `true` if no body bytes were received.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Collects chunks into messages while enforcing message limits.
#[derive(Debug)]
pub struct ChunkAssembler {
    max_message_size: usize,
    max_chunk_count: usize,
    pending_type: Option<MessageType>,
    pending: Vec<Bytes>,
    pending_size: usize,
}

impl ChunkAssembler {
    /// Creates an assembler.
    pub fn new(max_message_size: usize, max_chunk_count: usize) -> Self {
        Self {
            max_message_size,
            max_chunk_count,
            pending_type: None,
            pending: Vec::new(),
            pending_size: 0,
        }
    }

    /// Returns the number of buffered chunks.
    pub fn pending_chunks(&self) -> usize {
        self.pending.len()
    }

    /// Feeds one chunk. Returns a message once its final or abort chunk arrives.
    pub fn push(&mut self, frame: UascFrame) -> UaResult<Option<UascMessage>> {
        if frame.message_type.is_connection_protocol() {
            if frame.chunk_type != ChunkType::Final {
                return Err(TransportError::invalid_frame(format!(
                    "{} must be sent as a single final chunk",
                    frame.message_type
                ))
                .into());
            }
            return Ok(Some(UascMessage {
                message_type: frame.message_type,
                chunks: vec![frame.body],
                aborted: false,
            }));
        }

        if let Some(pending_type) = self.pending_type {
            if pending_type != frame.message_type {
                self.reset();
                return Err(TransportError::unexpected_message(
                    pending_type.to_string(),
                    frame.message_type.to_string(),
                )
                .into());
            }
        }

        if frame.chunk_type == ChunkType::Abort {
            self.reset();
            return Ok(Some(UascMessage {
                message_type: frame.message_type,
                chunks: vec![frame.body],
                aborted: true,
            }));
        }

        let count = self.pending.len() + 1;
        if count > self.max_chunk_count {
            self.reset();
            return Err(TransportError::too_many_chunks(count, self.max_chunk_count).into());
        }

        let size = self.pending_size + frame.body.len();
        if size > self.max_message_size {
            self.reset();
            return Err(TransportError::message_too_large(size, self.max_message_size).into());
        }

        self.pending_type = Some(frame.message_type);
        self.pending_size = size;
        self.pending.push(frame.body);

        if frame.chunk_type == ChunkType::Final {
            let message_type = frame.message_type;
            let chunks = std::mem::take(&mut self.pending);
            self.reset();
            return Ok(Some(UascMessage {
                message_type,
                chunks,
                aborted: false,
            }));
        }

        Ok(None)
    }

    fn reset(&mut self) {
        self.pending_type = None;
        self.pending.clear();
        self.pending_size = 0;
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_chunk(code: &[u8; 3], chunk: u8, body: &[u8]) -> BytesMut {
        let mut buf = BytesMut::new();
        buf.put_slice(code);
        buf.put_u8(chunk);
        buf.put_u32_le((HEADER_LEN + body.len()) as u32);
        buf.put_slice(body);
        buf
    }

    #[test]
    fn test_decode_waits_for_complete_chunk() {
        let mut codec = UascFrameCodec::new(8192);
        let full = raw_chunk(b"MSG", b'F', &[1, 2, 3, 4]);

        let mut partial = BytesMut::from(&full[..10]);
        assert!(codec.decode(&mut partial).unwrap().is_none());

        partial.extend_from_slice(&full[10..]);
        let frame = codec.decode(&mut partial).unwrap().unwrap();
        assert_eq!(frame.message_type, MessageType::Message);
        assert_eq!(frame.chunk_type, ChunkType::Final);
        assert_eq!(&frame.body[..], &[1, 2, 3, 4]);
        assert!(partial.is_empty());
    }

    #[test]
    fn test_decode_rejects_oversized_chunk_from_header() {
        let mut codec = UascFrameCodec::new(8192);
        let mut buf = BytesMut::new();
        buf.put_slice(b"MSGF");
        buf.put_u32_le(70_000);

        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(
            err,
            UaError::Transport(TransportError::FrameTooLarge { size: 70_000, max: 8192 })
        ));
    }

    #[test]
    fn test_decode_rejects_unknown_type() {
        let mut codec = UascFrameCodec::new(8192);
        let mut buf = raw_chunk(b"XYZ", b'F', &[]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(UaError::Transport(TransportError::InvalidFrame { .. }))
        ));

        let mut buf = raw_chunk(b"MSG", b'Q', &[]);
        assert!(codec.decode(&mut buf).is_err());
    }

    #[test]
    fn test_decode_rejects_size_below_header() {
        let mut codec = UascFrameCodec::new(8192);
        let mut buf = BytesMut::new();
        buf.put_slice(b"ACKF");
        buf.put_u32_le(4);
        assert!(codec.decode(&mut buf).is_err());
    }

    #[test]
    fn test_encode_rejects_oversized_chunk() {
        let mut codec = UascFrameCodec::with_limits(65_535, 8192);
        let frame = UascFrame::final_chunk(MessageType::Message, vec![0u8; 8192]);
        let mut dst = BytesMut::new();

        let err = codec.encode(frame, &mut dst).unwrap_err();
        assert!(matches!(
            err,
            UaError::Transport(TransportError::FrameTooLarge { size: 8200, max: 8192 })
        ));
        assert!(dst.is_empty());
    }

    #[test]
    fn test_encode_writes_header() {
        let mut codec = UascFrameCodec::new(8192);
        let mut dst = BytesMut::new();
        codec
            .encode(UascFrame::final_chunk(MessageType::Hello, vec![9u8; 4]), &mut dst)
            .unwrap();
        assert_eq!(&dst[..4], b"HELF");
        assert_eq!(u32::from_le_bytes([dst[4], dst[5], dst[6], dst[7]]), 12);
    }

    #[test]
    fn test_decode_single_rejects_trailing_bytes() {
        let mut data = raw_chunk(b"MSG", b'F', &[1]);
        data.put_u8(0xFF);
        assert!(UascFrame::decode_single(&data, 8192).is_err());

        let data = raw_chunk(b"MSG", b'F', &[1]);
        assert!(UascFrame::decode_single(&data, 8192).is_ok());
    }

    #[test]
    fn test_assembler_joins_chunks() {
        let mut assembler = ChunkAssembler::new(1024, 4);
        let c1 = UascFrame::new(MessageType::Message, ChunkType::Intermediate, vec![1u8; 10]);
        let c2 = UascFrame::new(MessageType::Message, ChunkType::Final, vec![2u8; 5]);

        assert!(assembler.push(c1).unwrap().is_none());
        assert_eq!(assembler.pending_chunks(), 1);

        let message = assembler.push(c2).unwrap().unwrap();
        assert_eq!(message.chunks.len(), 2);
        assert_eq!(message.len(), 15);
        assert!(!message.aborted);
        assert_eq!(assembler.pending_chunks(), 0);
    }

    #[test]
    fn test_assembler_enforces_message_size() {
        let mut assembler = ChunkAssembler::new(16, 10);
        let c1 = UascFrame::new(MessageType::Message, ChunkType::Intermediate, vec![0u8; 10]);
        let c2 = UascFrame::new(MessageType::Message, ChunkType::Final, vec![0u8; 10]);

        assembler.push(c1).unwrap();
        let err = assembler.push(c2).unwrap_err();
        assert!(matches!(
            err,
            UaError::Transport(TransportError::MessageTooLarge { size: 20, max: 16 })
        ));
        assert_eq!(assembler.pending_chunks(), 0);
    }

    #[test]
    fn test_assembler_enforces_chunk_count() {
        let mut assembler = ChunkAssembler::new(1024, 2);
        for _ in 0..2 {
            let chunk = UascFrame::new(MessageType::Message, ChunkType::Intermediate, vec![0u8; 1]);
            assembler.push(chunk).unwrap();
        }
        let chunk = UascFrame::new(MessageType::Message, ChunkType::Final, vec![0u8; 1]);
        assert!(matches!(
            assembler.push(chunk),
            Err(UaError::Transport(TransportError::TooManyChunks { count: 3, max: 2 }))
        ));
    }

    #[test]
    fn test_assembler_abort_discards_pending() {
        let mut assembler = ChunkAssembler::new(1024, 4);
        let c1 = UascFrame::new(MessageType::Message, ChunkType::Intermediate, vec![1u8; 10]);
        let abort = UascFrame::new(MessageType::Message, ChunkType::Abort, vec![7u8; 8]);

        assembler.push(c1).unwrap();
        let message = assembler.push(abort).unwrap().unwrap();
        assert!(message.aborted);
        assert_eq!(message.chunks, vec![Bytes::from(vec![7u8; 8])]);
        assert_eq!(assembler.pending_chunks(), 0);
    }

    #[test]
    fn test_assembler_connection_messages_single_chunk() {
        let mut assembler = ChunkAssembler::new(1024, 4);
        let ack = UascFrame::final_chunk(MessageType::Acknowledge, vec![0u8; 20]);
        assert!(assembler.push(ack).unwrap().is_some());

        let split_hello = UascFrame::new(MessageType::Hello, ChunkType::Intermediate, vec![]);
        assert!(assembler.push(split_hello).is_err());
    }
}
