// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Test Builders
//!
//! Builders describing how the loopback UASC server answers a Hello, over
//! raw TCP or behind a WebSocket upgrade.

use bytes::{BufMut, Bytes, BytesMut};

use trap_ua_session::channel::{AcknowledgeMessage, ErrorMessage};
use trap_ua_session::pipeline::MessageType;
use trap_ua_session::{StatusCode, UascFrame};

// =============================================================================
// Hello Reply
// =============================================================================

/// What the loopback server sends after receiving a Hello.
#[derive(Debug, Clone)]
pub enum HelloReply {
    /// Send an `ACK`.
    Acknowledge(AcknowledgeMessage),
    /// Send an `ERR` and close.
    Error(ErrorMessage),
    /// Never answer, keep the connection open.
    Silent,
    /// Close the connection without answering.
    Close,
    /// Write raw bytes.
    Raw(Bytes),
}

/// Something the loopback server sends once the Hello is answered.
#[derive(Debug, Clone)]
pub enum ServerSend {
    /// Raw chunk bytes. Carried in a binary message over WebSocket.
    Chunk(Bytes),
    /// A WebSocket text message. Written as raw bytes over TCP.
    Text(String),
}

/// How the loopback server answers a WebSocket upgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeReply {
    /// Complete the upgrade, echoing the requested subprotocol.
    Accept,
    /// Refuse the upgrade with this HTTP status.
    Reject(u16),
}

// =============================================================================
// Loopback Server Builder
// =============================================================================

/// Builder for [`LoopbackServer`](crate::common::harness::LoopbackServer)
/// behaviour.
#[derive(Debug, Clone)]
pub struct LoopbackServerBuilder {
    pub(crate) reply: HelloReply,
    pub(crate) after_reply: Vec<ServerSend>,
    pub(crate) max_chunk_size: usize,
    pub(crate) upgrade: Option<UpgradeReply>,
    pub(crate) hang_up: bool,
}

impl Default for LoopbackServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackServerBuilder {
    /// Create a builder that acknowledges with 64 KiB buffers.
    pub fn new() -> Self {
        Self {
            reply: HelloReply::Acknowledge(Self::default_ack()),
            after_reply: Vec::new(),
            max_chunk_size: 65_535,
            upgrade: None,
            hang_up: false,
        }
    }

    /// The acknowledge sent by default.
    pub fn default_ack() -> AcknowledgeMessage {
        AcknowledgeMessage {
            protocol_version: 0,
            receive_buffer_size: 65_535,
            send_buffer_size: 65_535,
            max_message_size: 0,
            max_chunk_count: 0,
        }
    }

    /// Acknowledge with the given message.
    pub fn acknowledge(mut self, ack: AcknowledgeMessage) -> Self {
        self.reply = HelloReply::Acknowledge(ack);
        self
    }

    /// Acknowledge announcing the given buffer sizes.
    pub fn buffers(self, receive: u32, send: u32) -> Self {
        self.acknowledge(AcknowledgeMessage {
            receive_buffer_size: receive,
            send_buffer_size: send,
            ..Self::default_ack()
        })
    }

    /// Reject the hello with an `ERR`.
    pub fn error(mut self, status: StatusCode, reason: impl Into<String>) -> Self {
        self.reply = HelloReply::Error(ErrorMessage::new(status, reason));
        self
    }

    /// Never answer.
    pub fn silent(mut self) -> Self {
        self.reply = HelloReply::Silent;
        self
    }

    /// Close without answering.
    pub fn close(mut self) -> Self {
        self.reply = HelloReply::Close;
        self
    }

    /// Answer with a chunk header announcing `size` bytes.
    pub fn oversized_reply(mut self, size: u32) -> Self {
        self.reply = HelloReply::Raw(oversized_header(MessageType::Acknowledge, size));
        self
    }

    /// Send `frame` after the reply.
    pub fn then_send(mut self, frame: UascFrame) -> Self {
        self.after_reply.push(ServerSend::Chunk(frame.to_bytes()));
        self
    }

    /// Send a chunk header announcing `size` bytes after the reply.
    pub fn then_send_oversized(mut self, size: u32) -> Self {
        self.after_reply
            .push(ServerSend::Chunk(oversized_header(MessageType::Message, size)));
        self
    }

    /// Send a complete `MSG` chunk of `size` bytes after the reply.
    pub fn then_send_large(self, size: usize) -> Self {
        let body = vec![0u8; size.saturating_sub(8)];
        self.then_send(UascFrame::final_chunk(MessageType::Message, body))
    }

    /// Send a WebSocket text message after the reply.
    pub fn then_send_text(mut self, text: impl Into<String>) -> Self {
        self.after_reply.push(ServerSend::Text(text.into()));
        self
    }

    /// Close the connection once everything has been sent.
    pub fn then_hang_up(mut self) -> Self {
        self.hang_up = true;
        self
    }

    /// Serve behind a WebSocket upgrade.
    pub fn websocket(mut self) -> Self {
        self.upgrade = Some(UpgradeReply::Accept);
        self
    }

    /// Refuse the WebSocket upgrade with `status`.
    pub fn reject_upgrade(mut self, status: u16) -> Self {
        self.upgrade = Some(UpgradeReply::Reject(status));
        self
    }
}

/// Header of a final chunk claiming `size` bytes, followed by a short body.
pub fn oversized_header(message_type: MessageType, size: u32) -> Bytes {
    let mut buf = BytesMut::with_capacity(16);
    buf.put_slice(message_type.code());
    buf.put_u8(b'F');
    buf.put_u32_le(size);
    buf.put_slice(&[0u8; 8]);
    buf.freeze()
}
