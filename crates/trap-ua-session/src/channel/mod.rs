// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Secure channels and their bootstrap.
//!
//! A [`SecureChannel`] is one established, framed connection to a server. It
//! is created by [`SecureChannelBootstrap`] after the Hello/Acknowledge
//! exchange and is owned by at most one session at a time.
//!
//! # Status
//!
//! ```text
//!            mark_lost()            close()
//!   Open ───────────────▶ Lost    Open ─────────▶ Closed
//! ```
//!
//! Status only ever leaves `Open` once. The session FSM watches it and
//! raises `ChannelInactive` when a bound channel becomes `Lost`; a deliberate
//! `close()` does not.
//!
//! A connected channel runs a reader task that keeps reading ahead of
//! [`SecureChannel::recv_frame`], so a peer close or a broken transport is
//! noticed even while nobody is receiving.

pub mod bootstrap;
pub mod hello;

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::config::ChannelConfig;
use crate::error::{UaError, UaResult};
use crate::pipeline::{ChunkAssembler, FrameReader, FrameWriter, UascFrame, UascMessage};
use crate::types::TransportProfile;

pub use bootstrap::{
    AcknowledgeOnly, ChannelOpener, HandshakeSignal, SecureChannelBootstrap, SecureChannelHandshake,
};
pub use hello::{AcknowledgeMessage, ErrorMessage, HelloMessage, NegotiatedLimits};

/// Channel status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelStatus {
    /// Usable.
    Open,
    /// The transport failed underneath.
    Lost,
    /// Closed on purpose.
    Closed,
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Lost => write!(f, "lost"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Chunks the reader task may buffer ahead of the receiver.
const READ_AHEAD_CHUNKS: usize = 16;

type ReadResult = UaResult<Option<UascFrame>>;

struct ChannelReader {
    frames: mpsc::Receiver<ReadResult>,
    assembler: ChunkAssembler,
}

/// An established channel to one server endpoint.
pub struct SecureChannel {
    id: Uuid,
    endpoint_url: String,
    profile: TransportProfile,
    limits: NegotiatedLimits,
    tls: bool,
    opened_at: DateTime<Utc>,
    reader: Mutex<Option<ChannelReader>>,
    writer: Mutex<Option<FrameWriter>>,
    status: Arc<watch::Sender<ChannelStatus>>,
    pump: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl SecureChannel {
    /// Wraps connected reader/writer halves and starts the reader task.
    ///
    /// Must be called within a Tokio runtime.
    pub fn new(
        endpoint_url: impl Into<String>,
        profile: TransportProfile,
        tls: bool,
        limits: NegotiatedLimits,
        reader: FrameReader,
        writer: FrameWriter,
    ) -> Self {
        let assembler = ChunkAssembler::new(
            limits.max_message_size as usize,
            limits.max_chunk_count as usize,
        );
        let (tx, rx) = mpsc::channel(READ_AHEAD_CHUNKS);
        let channel = Self::build(
            endpoint_url.into(),
            profile,
            tls,
            limits,
            Some(ChannelReader {
                frames: rx,
                assembler,
            }),
            Some(writer),
        );
        let pump = tokio::spawn(pump(
            reader,
            tx,
            Arc::clone(&channel.status),
            channel.id,
            channel.endpoint_url.clone(),
        ));
        *channel.pump.lock() = Some(pump);
        channel
    }

    /// Creates a channel without a connection.
    ///
    /// Used by external transports and tests. Frame I/O on a detached channel
    /// fails with a connection-closed error; status handling works as usual.
    pub fn detached(endpoint_url: impl Into<String>, profile: TransportProfile) -> Self {
        let limits = NegotiatedLimits::from_config(&ChannelConfig::default());
        Self::build(endpoint_url.into(), profile, false, limits, None, None)
    }

    fn build(
        endpoint_url: String,
        profile: TransportProfile,
        tls: bool,
        limits: NegotiatedLimits,
        reader: Option<ChannelReader>,
        writer: Option<FrameWriter>,
    ) -> Self {
        let (status, _) = watch::channel(ChannelStatus::Open);
        Self {
            pump: parking_lot::Mutex::new(None),
            id: Uuid::new_v4(),
            endpoint_url,
            profile,
            limits,
            tls,
            opened_at: Utc::now(),
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            status: Arc::new(status),
        }
    }

    /// Returns the local channel id.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the endpoint URL.
    pub fn endpoint_url(&self) -> &str {
        &self.endpoint_url
    }

    /// Returns the transport profile.
    pub fn profile(&self) -> TransportProfile {
        self.profile
    }

    /// Returns the negotiated limits.
    pub fn limits(&self) -> NegotiatedLimits {
        self.limits
    }

    /// Returns `true` if the transport runs over TLS.
    pub fn is_secure(&self) -> bool {
        self.tls
    }

    /// Returns when the channel was established.
    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    /// Returns the current status.
    pub fn status(&self) -> ChannelStatus {
        *self.status.borrow()
    }

    /// Returns `true` while the channel is open.
    pub fn is_open(&self) -> bool {
        self.status() == ChannelStatus::Open
    }

    /// Subscribes to status changes.
    pub fn subscribe(&self) -> watch::Receiver<ChannelStatus> {
        self.status.subscribe()
    }

    /// Waits until the channel leaves `Open` and returns the new status.
    pub async fn wait_inactive(&self) -> ChannelStatus {
        let mut rx = self.status.subscribe();
        let status = match rx.wait_for(|status| *status != ChannelStatus::Open).await {
            Ok(status) => *status,
            Err(_) => ChannelStatus::Closed,
        };
        status
    }

    /// Marks the channel lost. Returns `false` if it had already left `Open`.
    pub fn mark_lost(&self) -> bool {
        mark_lost(&self.status, self.id, &self.endpoint_url)
    }

    /// Closes the channel and its transport.
    pub async fn close(&self) {
        if leave_open(&self.status, ChannelStatus::Closed) {
            debug!(channel_id = %self.id, "Closing secure channel");
        }
        if let Some(pump) = self.pump.lock().take() {
            pump.abort();
        }
        if let Some(writer) = self.writer.lock().await.as_mut() {
            writer.close().await;
        }
    }

    /// Sends one chunk. A connection failure marks the channel lost; an
    /// oversized chunk is rejected without touching the status.
    pub async fn send_frame(&self, frame: UascFrame) -> UaResult<()> {
        self.ensure_open()?;
        let mut guard = self.writer.lock().await;
        let writer = guard
            .as_mut()
            .ok_or_else(|| UaError::connection_closed("channel has no transport"))?;
        let result = writer.send_frame(frame).await;
        if let Err(UaError::Connection(_)) = &result {
            self.mark_lost();
        }
        result
    }

    /// Receives one chunk. `None` means the peer closed the transport, which
    /// marks the channel lost, as does a broken connection. Chunks and errors
    /// read before the channel left `Open` are still delivered.
    pub async fn recv_frame(&self) -> UaResult<Option<UascFrame>> {
        let mut guard = self.reader.lock().await;
        let reader = guard
            .as_mut()
            .ok_or_else(|| UaError::connection_closed("channel has no transport"))?;
        next_read(&mut reader.frames).await
    }

    /// Receives chunks until a complete message is assembled.
    pub async fn recv_message(&self) -> UaResult<Option<UascMessage>> {
        let mut guard = self.reader.lock().await;
        let reader = guard
            .as_mut()
            .ok_or_else(|| UaError::connection_closed("channel has no transport"))?;
        loop {
            let frame = match next_read(&mut reader.frames).await? {
                Some(frame) => frame,
                None => return Ok(None),
            };
            if let Some(message) = reader.assembler.push(frame)? {
                return Ok(Some(message));
            }
        }
    }

    fn ensure_open(&self) -> UaResult<()> {
        match self.status() {
            ChannelStatus::Open => Ok(()),
            other => Err(UaError::connection_closed(format!("secure channel is {}", other))),
        }
    }
}

impl Drop for SecureChannel {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.get_mut().take() {
            pump.abort();
        }
    }
}

impl fmt::Debug for SecureChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureChannel")
            .field("id", &self.id)
            .field("endpoint_url", &self.endpoint_url)
            .field("profile", &self.profile)
            .field("tls", &self.tls)
            .field("status", &self.status())
            .field("opened_at", &self.opened_at)
            .finish_non_exhaustive()
    }
}

fn leave_open(status: &watch::Sender<ChannelStatus>, next: ChannelStatus) -> bool {
    status.send_if_modified(|status| {
        if *status == ChannelStatus::Open {
            *status = next;
            true
        } else {
            false
        }
    })
}

fn mark_lost(status: &watch::Sender<ChannelStatus>, id: Uuid, endpoint_url: &str) -> bool {
    let changed = leave_open(status, ChannelStatus::Lost);
    if changed {
        warn!(channel_id = %id, endpoint = %endpoint_url, "Secure channel lost");
    }
    changed
}

async fn next_read(frames: &mut mpsc::Receiver<ReadResult>) -> ReadResult {
    match frames.recv().await {
        Some(result) => result,
        None => Err(UaError::connection_closed("secure channel reader stopped")),
    }
}

/// Reads chunks ahead of the receiver until the transport ends, fails, or the
/// channel goes away. End of stream and connection errors mark it lost.
async fn pump(
    mut reader: FrameReader,
    frames: mpsc::Sender<ReadResult>,
    status: Arc<watch::Sender<ChannelStatus>>,
    id: Uuid,
    endpoint_url: String,
) {
    loop {
        let result = tokio::select! {
            result = reader.next_frame() => result,
            _ = frames.closed() => break,
        };
        let last = match &result {
            Ok(Some(_)) => false,
            Ok(None) => {
                mark_lost(&status, id, &endpoint_url);
                true
            }
            Err(e) => {
                if e.is_connection_error() {
                    mark_lost(&status, id, &endpoint_url);
                }
                true
            }
        };
        if frames.send(result).await.is_err() || last {
            break;
        }
    }
    trace!(channel_id = %id, "Secure channel reader stopped");
}
