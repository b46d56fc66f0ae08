// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Serialized event submission for the session FSM.
//!
//! Any number of producers hold an [`EventQueue`]; exactly one driver owns
//! the [`EventReceiver`]. Events are delivered in submission order.
//!
//! The queue is unbounded: the driver itself submits follow-up events
//! (transfer outcomes, close completions) from tasks it spawns, and must never
//! wait on its own queue.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::state::Event;
use crate::error::{SessionError, UaResult};

#[derive(Debug, Default)]
struct AtomicQueueStats {
    events_submitted: AtomicU64,
    events_processed: AtomicU64,
    events_rejected: AtomicU64,
}

/// Queue statistics.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Events accepted.
    pub events_submitted: u64,
    /// Events handed to the driver.
    pub events_processed: u64,
    /// Events refused because the driver stopped.
    pub events_rejected: u64,
}

impl AtomicQueueStats {
    fn snapshot(&self) -> QueueStats {
        QueueStats {
            events_submitted: self.events_submitted.load(Ordering::Relaxed),
            events_processed: self.events_processed.load(Ordering::Relaxed),
            events_rejected: self.events_rejected.load(Ordering::Relaxed),
        }
    }
}

// =============================================================================
// EventQueue
// =============================================================================

/// Producer side.
#[derive(Clone)]
pub struct EventQueue {
    sender: mpsc::UnboundedSender<Event>,
    stats: Arc<AtomicQueueStats>,
}

impl EventQueue {
    /// Creates a queue and its receiver.
    pub fn channel() -> (Self, EventReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let stats = Arc::new(AtomicQueueStats::default());
        (
            Self {
                sender,
                stats: Arc::clone(&stats),
            },
            EventReceiver { receiver, stats },
        )
    }

    /// Enqueues an event. Fails once the driver has stopped.
    pub fn submit(&self, event: Event) -> UaResult<()> {
        match self.sender.send(event) {
            Ok(()) => {
                self.stats.events_submitted.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(rejected) => {
                self.stats.events_rejected.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(event = rejected.0.name(), "Event rejected, FSM stopped");
                Err(SessionError::FsmStopped.into())
            }
        }
    }

    /// Returns `true` once the driver has stopped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Returns current statistics.
    pub fn stats(&self) -> QueueStats {
        self.stats.snapshot()
    }
}

impl std::fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventQueue")
            .field("events_submitted", &self.stats.events_submitted.load(Ordering::Relaxed))
            .field("closed", &self.is_closed())
            .finish()
    }
}

// =============================================================================
// EventReceiver
// =============================================================================

/// Consumer side, owned by the FSM driver.
pub struct EventReceiver {
    receiver: mpsc::UnboundedReceiver<Event>,
    stats: Arc<AtomicQueueStats>,
}

impl EventReceiver {
    /// Receives the next event. Returns `None` when all producers are gone.
    pub async fn recv(&mut self) -> Option<Event> {
        let event = self.receiver.recv().await;
        if event.is_some() {
            self.stats.events_processed.fetch_add(1, Ordering::Relaxed);
        }
        event
    }

    /// Receives an event without waiting.
    pub fn try_recv(&mut self) -> Option<Event> {
        let event = self.receiver.try_recv().ok();
        if event.is_some() {
            self.stats.events_processed.fetch_add(1, Ordering::Relaxed);
        }
        event
    }

    /// Stops accepting events. Already queued events can still be received.
    pub fn close(&mut self) {
        self.receiver.close();
    }

    /// Returns current statistics.
    pub fn stats(&self) -> QueueStats {
        self.stats.snapshot()
    }
}

impl std::fmt::Debug for EventReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventReceiver")
            .field("events_processed", &self.stats.events_processed.load(Ordering::Relaxed))
            .finish()
    }
}
