// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Secure channel bootstrap.
//!
//! ```text
//! open(endpoint, config)
//!   │
//!   ├─ resolve profile + URL          (configuration errors, no I/O)
//!   ├─ PipelineBuilder::build         (pure)
//!   └─ spawn ──▶ connect ─▶ HEL ─▶ ACK/ERR ─▶ negotiate ─▶ handshake
//!                                                             │
//!        HandshakeSignal::complete(outcome) ◀────────────────┘
//!                 ▲
//!        timeout ─┘  (first completion wins, the other is a no-op)
//! ```

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, info, instrument, warn};

use super::hello::{AcknowledgeMessage, ErrorMessage, HelloMessage, NegotiatedLimits};
use super::SecureChannel;
use crate::config::ChannelConfig;
use crate::error::{ConnectionError, TransportError, UaError, UaResult};
use crate::pipeline::codec::MessageType;
use crate::pipeline::{connect, PipelineBuilder, TransportPipeline};
use crate::types::EndpointDescription;

// =============================================================================
// HandshakeSignal
// =============================================================================

/// Outcome of a channel bootstrap.
pub type ChannelOutcome = UaResult<Arc<SecureChannel>>;

/// Single-use completion signal for a channel bootstrap.
///
/// The first call to [`complete`](Self::complete) delivers its outcome;
/// later calls are ignored and return `false`.
pub struct HandshakeSignal {
    sender: Mutex<Option<oneshot::Sender<ChannelOutcome>>>,
}

impl HandshakeSignal {
    /// Creates a signal and the receiver its outcome is delivered to.
    pub fn new() -> (Arc<Self>, oneshot::Receiver<ChannelOutcome>) {
        let (tx, rx) = oneshot::channel();
        (
            Arc::new(Self {
                sender: Mutex::new(Some(tx)),
            }),
            rx,
        )
    }

    /// Delivers `outcome` if nothing was delivered yet.
    pub fn complete(&self, outcome: ChannelOutcome) -> bool {
        let sender = self.sender.lock().take();
        match sender {
            Some(sender) => {
                if let Err(Ok(channel)) = sender.send(outcome) {
                    // receiver gone; don't leak the connection
                    tokio::spawn(async move { channel.close().await });
                }
                true
            }
            None => false,
        }
    }

    /// Returns `true` once an outcome was delivered.
    pub fn is_completed(&self) -> bool {
        self.sender.lock().is_none()
    }
}

impl fmt::Debug for HandshakeSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandshakeSignal")
            .field("completed", &self.is_completed())
            .finish()
    }
}

// =============================================================================
// SecureChannelHandshake
// =============================================================================

/// The secure-channel handshake run after Hello/Acknowledge.
///
/// OpenSecureChannel key exchange and message security live behind this
/// trait.
#[async_trait]
pub trait SecureChannelHandshake: Send + Sync {
    /// Runs the handshake on a freshly acknowledged channel.
    async fn handshake(&self, channel: &SecureChannel) -> UaResult<()>;
}

/// Handshake that stops after the Acknowledge.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcknowledgeOnly;

#[async_trait]
impl SecureChannelHandshake for AcknowledgeOnly {
    async fn handshake(&self, _channel: &SecureChannel) -> UaResult<()> {
        Ok(())
    }
}

// =============================================================================
// ChannelOpener
// =============================================================================

/// Opens secure channels for the session FSM.
#[async_trait]
pub trait ChannelOpener: Send + Sync {
    /// Opens a channel to `endpoint`.
    async fn open(
        &self,
        endpoint: &EndpointDescription,
        config: &ChannelConfig,
    ) -> UaResult<Arc<SecureChannel>>;
}

// =============================================================================
// SecureChannelBootstrap
// =============================================================================

/// Builds the transport pipeline, runs Hello/Acknowledge and the secure
/// channel handshake, all under `handshake_timeout`.
#[derive(Clone)]
pub struct SecureChannelBootstrap {
    builder: PipelineBuilder,
    handshake: Arc<dyn SecureChannelHandshake>,
}

impl SecureChannelBootstrap {
    /// Creates a bootstrap using `builder` and no further handshake.
    pub fn new(builder: PipelineBuilder) -> Self {
        Self {
            builder,
            handshake: Arc::new(AcknowledgeOnly),
        }
    }

    /// Sets the secure channel handshake.
    pub fn with_handshake(mut self, handshake: Arc<dyn SecureChannelHandshake>) -> Self {
        self.handshake = handshake;
        self
    }

    /// Opens a channel.
    ///
    /// Configuration errors are returned before any I/O. Transport and
    /// handshake failures, including the timeout, complete the attempt
    /// exactly once.
    #[instrument(skip(self, endpoint, config), fields(endpoint = %endpoint.endpoint_url))]
    pub async fn open(
        &self,
        endpoint: &EndpointDescription,
        config: &ChannelConfig,
    ) -> UaResult<Arc<SecureChannel>> {
        let (profile, url) = endpoint.validate()?;
        let pipeline = self.builder.build(url.as_str(), profile, config)?;

        let (signal, mut completion) = HandshakeSignal::new();
        let task = {
            let signal = Arc::clone(&signal);
            let handshake = Arc::clone(&self.handshake);
            let config = config.clone();
            tokio::spawn(async move {
                let outcome = establish(pipeline, &config, handshake.as_ref()).await;
                if !signal.complete(outcome) {
                    debug!("Handshake finished after the attempt was already completed");
                }
            })
        };

        let timeout = config.handshake_timeout;
        let received = tokio::select! {
            received = &mut completion => received,
            _ = tokio::time::sleep(timeout) => {
                if signal.complete(Err(UaError::handshake_timeout(timeout))) {
                    warn!(timeout_ms = timeout.as_millis() as u64, "Secure channel handshake timed out");
                    task.abort();
                }
                (&mut completion).await
            }
        };

        let channel = received
            .map_err(|_| UaError::connection_closed("bootstrap task ended without an outcome"))??;
        info!(
            channel_id = %channel.id(),
            profile = %channel.profile(),
            tls = channel.is_secure(),
            "Secure channel open"
        );
        Ok(channel)
    }
}

#[async_trait]
impl ChannelOpener for SecureChannelBootstrap {
    async fn open(
        &self,
        endpoint: &EndpointDescription,
        config: &ChannelConfig,
    ) -> UaResult<Arc<SecureChannel>> {
        SecureChannelBootstrap::open(self, endpoint, config).await
    }
}

impl fmt::Debug for SecureChannelBootstrap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureChannelBootstrap")
            .field("builder", &self.builder)
            .finish_non_exhaustive()
    }
}

/// Connects, exchanges Hello/Acknowledge and runs the handshake.
async fn establish(
    pipeline: TransportPipeline,
    config: &ChannelConfig,
    handshake: &dyn SecureChannelHandshake,
) -> ChannelOutcome {
    let (mut reader, mut writer) = connect(&pipeline, config.connect_timeout).await?;

    let hello = HelloMessage::new(pipeline.endpoint().as_str(), config);
    writer.send_frame(hello.encode()?).await?;

    let frame = reader
        .next_frame()
        .await?
        .ok_or_else(|| UaError::connection_closed("server closed before acknowledge"))?;

    let limits = match frame.message_type {
        MessageType::Acknowledge => {
            let ack = AcknowledgeMessage::decode(frame.body)?;
            NegotiatedLimits::negotiate(&hello, &ack)?
        }
        MessageType::Error => {
            let error = ErrorMessage::decode(frame.body)?;
            warn!(status = %error.status, reason = %error.reason, "Server rejected hello");
            return Err(ConnectionError::from(error).into());
        }
        other => {
            return Err(TransportError::unexpected_message("ACK", other.to_string()).into());
        }
    };

    reader.set_max_chunk_size(limits.receive_chunk_size as usize);
    writer.set_max_chunk_size(limits.send_chunk_size as usize);
    debug!(?limits, "Hello/Acknowledge complete");

    let channel = Arc::new(SecureChannel::new(
        pipeline.endpoint().as_str(),
        pipeline.profile(),
        pipeline.is_secure(),
        limits,
        reader,
        writer,
    ));

    if let Err(e) = handshake.handshake(&channel).await {
        channel.close().await;
        return Err(e);
    }
    Ok(channel)
}
