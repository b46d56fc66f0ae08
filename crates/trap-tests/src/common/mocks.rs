// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Mock Implementations
//!
//! Mock collaborators of the session FSM.
//!
//! - Configurable failures and a gate that holds channel opens
//! - Recording of interactions for verification
//! - Thread-safe for concurrent testing

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;

use trap_ua_session::{
    ChannelConfig, ChannelOpener, CompletionExecutor, ConnectionError, EndpointDescription,
    SecureChannel, Session, SessionListener, SessionServices, TransportProfile, UaError, UaResult,
};

// =============================================================================
// Mock Channel Opener
// =============================================================================

/// Channel opener handing out detached channels.
#[derive(Debug)]
pub struct MockChannelOpener {
    /// Gate; opens wait while it is `false`.
    gate: watch::Sender<bool>,

    /// Force the next open to fail.
    fail_next: AtomicBool,

    /// Force all opens to fail.
    fail_all: AtomicBool,

    /// Open calls (1-based) that fail.
    fail_calls: Mutex<HashSet<u64>>,

    /// Open calls, including failed ones.
    open_count: AtomicU64,

    /// Channels handed out, in order.
    channels: Mutex<Vec<Arc<SecureChannel>>>,
}

impl Default for MockChannelOpener {
    fn default() -> Self {
        Self::new()
    }
}

impl MockChannelOpener {
    /// Create an opener whose gate is open.
    pub fn new() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            gate,
            fail_next: AtomicBool::new(false),
            fail_all: AtomicBool::new(false),
            fail_calls: Mutex::new(HashSet::new()),
            open_count: AtomicU64::new(0),
            channels: Mutex::new(Vec::new()),
        }
    }

    /// Make subsequent opens wait until [`release`](Self::release).
    pub fn hold(&self) {
        self.gate.send_replace(false);
    }

    /// Let waiting and future opens proceed.
    pub fn release(&self) {
        self.gate.send_replace(true);
    }

    /// Fail the next open.
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Fail the `call`-th open (1-based), whenever it completes.
    pub fn fail_call(&self, call: u64) {
        self.fail_calls.lock().insert(call);
    }

    /// Fail every open until cleared.
    pub fn set_fail_all(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::SeqCst);
    }

    /// Number of open calls.
    pub fn open_count(&self) -> u64 {
        self.open_count.load(Ordering::SeqCst)
    }

    /// Channels handed out so far.
    pub fn channels(&self) -> Vec<Arc<SecureChannel>> {
        self.channels.lock().clone()
    }

    /// The most recent channel.
    pub fn last_channel(&self) -> Option<Arc<SecureChannel>> {
        self.channels.lock().last().cloned()
    }
}

#[async_trait]
impl ChannelOpener for MockChannelOpener {
    async fn open(
        &self,
        endpoint: &EndpointDescription,
        _config: &ChannelConfig,
    ) -> UaResult<Arc<SecureChannel>> {
        let call = self.open_count.fetch_add(1, Ordering::SeqCst) + 1;

        let mut gate = self.gate.subscribe();
        if gate.wait_for(|open| *open).await.is_err() {
            return Err(UaError::connection_closed("opener dropped"));
        }

        if self.fail_calls.lock().remove(&call)
            || self.fail_all.load(Ordering::SeqCst)
            || self.fail_next.swap(false, Ordering::SeqCst)
        {
            return Err(ConnectionError::refused(endpoint.endpoint_url.clone()).into());
        }

        let profile = endpoint
            .transport_profile()
            .unwrap_or(TransportProfile::TcpUascBinary);
        let channel = Arc::new(SecureChannel::detached(endpoint.endpoint_url.clone(), profile));
        self.channels.lock().push(Arc::clone(&channel));
        Ok(channel)
    }
}

// =============================================================================
// Mock Session Services
// =============================================================================

/// A service call observed by [`MockSessionServices`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceCall {
    /// `create_session`.
    Create,
    /// `transfer_session` for the given session id.
    Transfer(String),
    /// `close_session` for the given session id.
    Close(String),
}

/// Session services backed by counters.
#[derive(Debug, Default)]
pub struct MockSessionServices {
    next_id: AtomicU64,
    fail_create: AtomicBool,
    fail_transfer: AtomicBool,
    latency: Mutex<Duration>,
    calls: Mutex<Vec<ServiceCall>>,
}

impl MockSessionServices {
    /// Create services that always succeed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `create_session` fail.
    pub fn set_fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    /// Make `transfer_session` fail.
    pub fn set_fail_transfer(&self, fail: bool) {
        self.fail_transfer.store(fail, Ordering::SeqCst);
    }

    /// Delay every call, including `close_session`.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    /// Calls observed so far.
    pub fn calls(&self) -> Vec<ServiceCall> {
        self.calls.lock().clone()
    }

    /// Number of `create_session` calls.
    pub fn create_count(&self) -> usize {
        self.count(|call| matches!(call, ServiceCall::Create))
    }

    /// Number of `transfer_session` calls.
    pub fn transfer_count(&self) -> usize {
        self.count(|call| matches!(call, ServiceCall::Transfer(_)))
    }

    /// Number of `close_session` calls.
    pub fn close_count(&self) -> usize {
        self.count(|call| matches!(call, ServiceCall::Close(_)))
    }

    fn count(&self, predicate: impl Fn(&ServiceCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|call| predicate(call)).count()
    }

    async fn delay(&self) {
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl SessionServices for MockSessionServices {
    async fn create_session(&self, channel: Arc<SecureChannel>) -> UaResult<Session> {
        self.calls.lock().push(ServiceCall::Create);
        self.delay().await;
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(UaError::connection_closed("create rejected"));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Session::new(
            format!("ns=1;i={id}"),
            format!("token-{id}"),
            Some(channel),
        ))
    }

    async fn transfer_session(
        &self,
        session: Arc<Session>,
        channel: Arc<SecureChannel>,
    ) -> UaResult<Session> {
        self.calls
            .lock()
            .push(ServiceCall::Transfer(session.session_id().to_string()));
        self.delay().await;
        if self.fail_transfer.load(Ordering::SeqCst) {
            return Err(UaError::connection_closed("transfer rejected"));
        }
        Ok(session.bound_to(channel))
    }

    async fn close_session(&self, session: Arc<Session>) -> UaResult<()> {
        self.calls
            .lock()
            .push(ServiceCall::Close(session.session_id().to_string()));
        self.delay().await;
        Ok(())
    }
}

// =============================================================================
// Recording Listener
// =============================================================================

/// Session activity seen by a [`RecordingListener`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerEvent {
    /// Session with this id became active.
    Active(String),
    /// Session with this id became inactive.
    Inactive(String),
}

/// Listener recording every callback.
#[derive(Debug, Default)]
pub struct RecordingListener {
    events: Mutex<Vec<ListenerEvent>>,
}

impl RecordingListener {
    /// Create an empty listener.
    pub fn new() -> Self {
        Self::default()
    }

    /// Events seen so far.
    pub fn events(&self) -> Vec<ListenerEvent> {
        self.events.lock().clone()
    }

    /// Number of activations.
    pub fn active_count(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| matches!(e, ListenerEvent::Active(_)))
            .count()
    }

    /// Number of deactivations.
    pub fn inactive_count(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| matches!(e, ListenerEvent::Inactive(_)))
            .count()
    }
}

impl SessionListener for RecordingListener {
    fn on_session_active(&self, session: &Arc<Session>) {
        self.events
            .lock()
            .push(ListenerEvent::Active(session.session_id().to_string()));
    }

    fn on_session_inactive(&self, session: &Arc<Session>) {
        self.events
            .lock()
            .push(ListenerEvent::Inactive(session.session_id().to_string()));
    }
}

// =============================================================================
// Inline Executor
// =============================================================================

/// Executor running every task on the calling thread and counting them.
#[derive(Debug, Default)]
pub struct InlineExecutor {
    executed: AtomicU64,
}

impl InlineExecutor {
    /// Create an executor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tasks run.
    pub fn executed(&self) -> u64 {
        self.executed.load(Ordering::SeqCst)
    }
}

impl CompletionExecutor for InlineExecutor {
    fn execute(&self, task: Box<dyn FnOnce() + Send + 'static>) {
        self.executed.fetch_add(1, Ordering::SeqCst);
        task();
    }
}
