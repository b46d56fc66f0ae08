// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Session lifecycle.
//!
//! # Architecture
//!
//! ```text
//!   create_session()   close_session()   channel watcher   channel tasks
//!          │                  │                 │                │
//!          └──────────────────┴────────┬────────┴────────────────┘
//!                                      ▼
//!                           EventQueue (mpsc, N:1)
//!                                      │
//!                                      ▼
//!                        FsmDriver: transition(state, event)
//!                                      │
//!                    ┌─────────────────┼──────────────────┐
//!                    ▼                 ▼                  ▼
//!             ChannelOpener     SessionServices   CompletionExecutor
//!             (bootstrap)       (create/transfer/  (resolves futures,
//!                                close)             notifies listeners)
//! ```
//!
//! Events are processed one at a time. Work that may block runs on spawned
//! tasks that report back by submitting another event.

pub mod fsm;
pub mod future;
pub mod queue;
pub mod state;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::channel::SecureChannel;
use crate::error::UaResult;

pub use fsm::{CompletionExecutor, SessionFsm, SessionFsmBuilder, TokioExecutor};
pub use future::{SessionFuture, SessionOutcome, SessionPromise};
pub use queue::{EventQueue, EventReceiver, QueueStats};
pub use state::{transition, Effect, Event, FsmState, StateKind, Transition};

// =============================================================================
// Session
// =============================================================================

/// An authenticated session with the server.
///
/// Sessions are immutable; binding a session to a new channel produces a
/// new value with the same identity.
#[derive(Clone)]
pub struct Session {
    session_id: String,
    authentication_token: String,
    channel: Option<Arc<SecureChannel>>,
    created_at: DateTime<Utc>,
}

impl Session {
    /// Creates a session.
    pub fn new(
        session_id: impl Into<String>,
        authentication_token: impl Into<String>,
        channel: Option<Arc<SecureChannel>>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            authentication_token: authentication_token.into(),
            channel,
            created_at: Utc::now(),
        }
    }

    /// Returns the server-assigned session id.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Returns the authentication token.
    pub fn authentication_token(&self) -> &str {
        &self.authentication_token
    }

    /// Returns the bound channel, if any.
    pub fn channel(&self) -> Option<&Arc<SecureChannel>> {
        self.channel.as_ref()
    }

    /// Returns when the session was first created.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns this session bound to `channel`.
    pub fn bound_to(&self, channel: Arc<SecureChannel>) -> Self {
        Self {
            channel: Some(channel),
            ..self.clone()
        }
    }

    /// Returns `true` if both values denote the same server session.
    pub fn same_identity(&self, other: &Session) -> bool {
        self.session_id == other.session_id && self.authentication_token == other.authentication_token
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("session_id", &self.session_id)
            .field("channel_id", &self.channel.as_ref().map(|c| c.id()))
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// SessionServices
// =============================================================================

/// Session service calls the FSM drives.
///
/// Each call is bounded by the session request timeout.
#[async_trait]
pub trait SessionServices: Send + Sync {
    /// Creates and activates a new session on `channel`.
    async fn create_session(&self, channel: Arc<SecureChannel>) -> UaResult<Session>;

    /// Activates `session` on a new `channel`.
    async fn transfer_session(
        &self,
        session: Arc<Session>,
        channel: Arc<SecureChannel>,
    ) -> UaResult<Session>;

    /// Closes `session` on the server.
    async fn close_session(&self, session: Arc<Session>) -> UaResult<()>;
}

// =============================================================================
// SessionListener
// =============================================================================

/// Observer of session activity. Callbacks run on the completion executor.
pub trait SessionListener: Send + Sync {
    /// A session became usable.
    fn on_session_active(&self, session: &Arc<Session>) {
        let _ = session;
    }

    /// A session stopped being usable.
    fn on_session_inactive(&self, session: &Arc<Session>) {
        let _ = session;
    }
}

// =============================================================================
// SessionStats
// =============================================================================

/// Lifecycle counters.
#[derive(Debug, Default)]
pub struct SessionStats {
    /// Sessions created.
    pub creations: AtomicU64,
    /// Sessions moved to a new channel.
    pub transfers: AtomicU64,
    /// Session futures failed.
    pub failures: AtomicU64,
    /// Channels opened.
    pub channel_opens: AtomicU64,
    /// Bound channels lost.
    pub channel_losses: AtomicU64,
    /// Orderly closes started.
    pub closes: AtomicU64,
}

impl SessionStats {
    /// Creates a snapshot of the current counters.
    pub fn snapshot(&self) -> SessionStatsSnapshot {
        SessionStatsSnapshot {
            creations: self.creations.load(Ordering::Relaxed),
            transfers: self.transfers.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            channel_opens: self.channel_opens.load(Ordering::Relaxed),
            channel_losses: self.channel_losses.load(Ordering::Relaxed),
            closes: self.closes.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Snapshot of [`SessionStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStatsSnapshot {
    /// Sessions created.
    pub creations: u64,
    /// Sessions moved to a new channel.
    pub transfers: u64,
    /// Session futures failed.
    pub failures: u64,
    /// Channels opened.
    pub channel_opens: u64,
    /// Bound channels lost.
    pub channel_losses: u64,
    /// Orderly closes started.
    pub closes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TransportProfile;

    #[test]
    fn test_bound_to_keeps_identity() {
        let session = Session::new("ns=1;i=7", "tok", None);
        let channel = Arc::new(SecureChannel::detached(
            "opc.tcp://localhost:4840",
            TransportProfile::TcpUascBinary,
        ));
        let bound = session.bound_to(Arc::clone(&channel));

        assert!(bound.same_identity(&session));
        assert_eq!(bound.channel().unwrap().id(), channel.id());
        assert!(session.channel().is_none());
    }

    #[test]
    fn test_stats_snapshot() {
        let stats = SessionStats::default();
        SessionStats::incr(&stats.creations);
        SessionStats::incr(&stats.channel_opens);
        SessionStats::incr(&stats.channel_opens);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.creations, 1);
        assert_eq!(snapshot.channel_opens, 2);
        assert_eq!(snapshot.failures, 0);
    }
}
