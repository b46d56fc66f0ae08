// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Session FSM driver and its public handle.
//!
//! [`SessionFsm`] is the handle callers hold. It owns the producer side of
//! the event queue; the driver task owns the state and runs
//! [`transition`](super::state::transition) for one event at a time, then
//! applies the returned effects. Effects that wait on I/O run on spawned
//! tasks and report back through the queue, so the driver itself only ever
//! awaits its next event.
//!
//! # Example
//!
//! ```rust,ignore
//! let fsm = SessionFsm::builder(endpoint, opener, services).build()?;
//! let session = fsm.create_session().await?.await?;
//! fsm.close_session().await?;
//! ```

use std::fmt;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::future::SessionFuture;
use super::queue::{EventQueue, EventReceiver, QueueStats};
use super::state::{transition, Effect, Event, FsmState, StateKind, Transition};
use super::{Session, SessionListener, SessionServices, SessionStats, SessionStatsSnapshot};
use crate::channel::{ChannelOpener, ChannelStatus, SecureChannel, SecureChannelBootstrap};
use crate::config::{ChannelConfig, ClientConfig, SessionConfig};
use crate::error::{ConfigurationError, SessionError, TimeoutError, UaError, UaResult};
use crate::pipeline::PipelineBuilder;
use crate::types::EndpointDescription;

// =============================================================================
// CompletionExecutor
// =============================================================================

/// Runs future completions and listener callbacks off the driver.
pub trait CompletionExecutor: Send + Sync {
    /// Runs `task`.
    fn execute(&self, task: Box<dyn FnOnce() + Send + 'static>);
}

/// Executor that spawns each task on a tokio runtime.
#[derive(Debug, Clone)]
pub struct TokioExecutor {
    handle: Handle,
}

impl TokioExecutor {
    /// Creates an executor on `handle`.
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Creates an executor on the current runtime.
    pub fn current() -> UaResult<Self> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|_| missing_runtime())
    }
}

impl CompletionExecutor for TokioExecutor {
    fn execute(&self, task: Box<dyn FnOnce() + Send + 'static>) {
        self.handle.spawn(async move { task() });
    }
}

fn missing_runtime() -> UaError {
    ConfigurationError::invalid_value("runtime", "no tokio runtime is running").into()
}

// =============================================================================
// SessionFsm
// =============================================================================

/// Handle to a running session FSM.
///
/// Dropping the handle stops the driver; pending session futures then fail
/// with [`SessionError::Abandoned`].
pub struct SessionFsm {
    queue: EventQueue,
    state: watch::Receiver<StateKind>,
    current: watch::Receiver<Option<SessionFuture>>,
    stats: Arc<SessionStats>,
    shutdown: Arc<Notify>,
    task: Option<JoinHandle<()>>,
}

impl SessionFsm {
    /// Creates a builder.
    pub fn builder(
        endpoint: EndpointDescription,
        opener: Arc<dyn ChannelOpener>,
        services: Arc<dyn SessionServices>,
    ) -> SessionFsmBuilder {
        SessionFsmBuilder::new(endpoint, opener, services)
    }

    /// Starts an FSM for `config` that opens channels with the default
    /// transport pipeline.
    pub fn from_config(
        config: &ClientConfig,
        services: Arc<dyn SessionServices>,
    ) -> UaResult<Self> {
        config.validate()?;
        let opener = SecureChannelBootstrap::new(PipelineBuilder::with_default_tls()?);
        SessionFsmBuilder::new(config.endpoint.clone(), Arc::new(opener), services)
            .config(config)
            .build()
    }

    /// Submits a raw event.
    pub fn submit(&self, event: Event) -> UaResult<()> {
        self.queue.submit(event)
    }

    /// Requests a session.
    ///
    /// Returns the future of the session that is current once the request is
    /// processed; concurrent callers receive clones of the same future.
    pub async fn create_session(&self) -> UaResult<SessionFuture> {
        let (event, reply) = Event::create();
        self.submit(event)?;
        reply.await.map_err(|_| SessionError::FsmStopped.into())
    }

    /// Closes the current session and waits until the close has finished.
    pub async fn close_session(&self) -> UaResult<()> {
        let (event, done) = Event::close();
        self.submit(event)?;
        done.await.map_err(|_| SessionError::FsmStopped.into())
    }

    /// Reports that the channel under the current session became inactive.
    pub fn channel_inactive(&self) -> UaResult<()> {
        self.submit(Event::ChannelInactive)
    }

    /// Returns the future of the current session, if one exists.
    pub fn current_session_future(&self) -> Option<SessionFuture> {
        self.current.borrow().clone()
    }

    /// Returns the current state.
    pub fn state(&self) -> StateKind {
        *self.state.borrow()
    }

    /// Waits until the FSM reaches `kind`.
    pub async fn wait_for_state(&self, kind: StateKind) -> UaResult<()> {
        let mut state = self.state.clone();
        state
            .wait_for(|current| *current == kind)
            .await
            .map(|_| ())
            .map_err(|_| SessionError::FsmStopped.into())
    }

    /// Returns lifecycle counters.
    pub fn stats(&self) -> SessionStatsSnapshot {
        self.stats.snapshot()
    }

    /// Returns event queue counters.
    pub fn queue_stats(&self) -> QueueStats {
        self.queue.stats()
    }

    /// Stops the driver and waits for it to exit.
    pub async fn shutdown(mut self) {
        self.shutdown.notify_one();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Session FSM driver ended abnormally");
            }
        }
    }
}

impl Drop for SessionFsm {
    fn drop(&mut self) {
        self.shutdown.notify_one();
    }
}

impl fmt::Debug for SessionFsm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionFsm")
            .field("state", &self.state())
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// SessionFsmBuilder
// =============================================================================

/// Builder for [`SessionFsm`].
pub struct SessionFsmBuilder {
    endpoint: EndpointDescription,
    opener: Arc<dyn ChannelOpener>,
    services: Arc<dyn SessionServices>,
    channel_config: ChannelConfig,
    session_config: SessionConfig,
    executor: Option<Arc<dyn CompletionExecutor>>,
    listeners: Vec<Arc<dyn SessionListener>>,
}

impl SessionFsmBuilder {
    /// Creates a builder with default channel and session settings.
    pub fn new(
        endpoint: EndpointDescription,
        opener: Arc<dyn ChannelOpener>,
        services: Arc<dyn SessionServices>,
    ) -> Self {
        Self {
            endpoint,
            opener,
            services,
            channel_config: ChannelConfig::default(),
            session_config: SessionConfig::default(),
            executor: None,
            listeners: Vec::new(),
        }
    }

    /// Sets the channel settings.
    pub fn channel_config(mut self, config: ChannelConfig) -> Self {
        self.channel_config = config;
        self
    }

    /// Sets the session settings.
    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    /// Takes endpoint, channel and session settings from `config`.
    pub fn config(mut self, config: &ClientConfig) -> Self {
        self.endpoint = config.endpoint.clone();
        self.channel_config = config.channel.clone();
        self.session_config = config.session.clone();
        self
    }

    /// Sets the completion executor. Defaults to [`TokioExecutor`].
    pub fn executor(mut self, executor: Arc<dyn CompletionExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Adds a session listener.
    pub fn listener(mut self, listener: Arc<dyn SessionListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Validates the settings and starts the driver on the current runtime.
    pub fn build(self) -> UaResult<SessionFsm> {
        self.endpoint.validate()?;
        self.channel_config.validate()?;
        self.session_config.validate()?;

        let handle = Handle::try_current().map_err(|_| missing_runtime())?;
        let executor = match self.executor {
            Some(executor) => executor,
            None => Arc::new(TokioExecutor::new(handle.clone())),
        };

        let stats = Arc::new(SessionStats::default());
        let shutdown = Arc::new(Notify::new());
        let (queue, receiver) = EventQueue::channel();
        let (state_tx, state_rx) = watch::channel(StateKind::Inactive);
        let (current_tx, current_rx) = watch::channel(None);

        let context = Arc::new(FsmContext {
            endpoint: self.endpoint,
            channel_config: self.channel_config,
            session_config: self.session_config,
            opener: self.opener,
            services: self.services,
            executor,
            listeners: self.listeners,
            stats: Arc::clone(&stats),
        });

        let driver = FsmDriver {
            context,
            queue: queue.clone(),
            receiver,
            state: FsmState::Inactive,
            state_tx,
            current_tx,
            watcher: None,
            shutdown: Arc::clone(&shutdown),
        };
        let task = handle.spawn(driver.run());

        Ok(SessionFsm {
            queue,
            state: state_rx,
            current: current_rx,
            stats,
            shutdown,
            task: Some(task),
        })
    }
}

impl fmt::Debug for SessionFsmBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionFsmBuilder")
            .field("endpoint", &self.endpoint.endpoint_url)
            .field("channel_config", &self.channel_config)
            .field("session_config", &self.session_config)
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// FsmContext
// =============================================================================

/// Collaborators shared by the driver and the tasks it spawns.
struct FsmContext {
    endpoint: EndpointDescription,
    channel_config: ChannelConfig,
    session_config: SessionConfig,
    opener: Arc<dyn ChannelOpener>,
    services: Arc<dyn SessionServices>,
    executor: Arc<dyn CompletionExecutor>,
    listeners: Vec<Arc<dyn SessionListener>>,
    stats: Arc<SessionStats>,
}

impl FsmContext {
    /// Opens a channel, then creates a session on it or transfers `session`.
    /// The returned outcome carries `attempt`.
    async fn establish(&self, attempt: u64, session: Option<Arc<Session>>) -> Event {
        let channel = match self
            .opener
            .open(&self.endpoint, &self.channel_config)
            .await
        {
            Ok(channel) => channel,
            Err(e) => {
                e.log("secure channel bootstrap");
                return Event::TransferFailed {
                    attempt,
                    session,
                    channel: None,
                    reason: Arc::new(e),
                };
            }
        };
        SessionStats::incr(&self.stats.channel_opens);

        let timeout = self.session_config.request_timeout;
        let call = async {
            match &session {
                None => self.services.create_session(Arc::clone(&channel)).await,
                Some(existing) => {
                    self.services
                        .transfer_session(Arc::clone(existing), Arc::clone(&channel))
                        .await
                }
            }
        };
        let result = match tokio::time::timeout(timeout, call).await {
            Ok(result) => result.map_err(|e| service_failure(session.as_deref(), e)),
            Err(_) => Err(TimeoutError::request(timeout).into()),
        };

        match result {
            Ok(created) => Event::TransferSucceeded {
                attempt,
                session: Arc::new(created.bound_to(channel)),
            },
            Err(e) => {
                e.log(if session.is_some() {
                    "transfer session"
                } else {
                    "create session"
                });
                Event::TransferFailed {
                    attempt,
                    session,
                    channel: Some(channel),
                    reason: Arc::new(e),
                }
            }
        }
    }

    /// Closes `session` on the server, then closes its channel and `channel`.
    async fn teardown(&self, session: Option<Arc<Session>>, channel: Option<Arc<SecureChannel>>) {
        if let Some(session) = session {
            let timeout = self.session_config.request_timeout;
            match tokio::time::timeout(timeout, self.services.close_session(Arc::clone(&session)))
                .await
            {
                Ok(Ok(())) => debug!(session_id = session.session_id(), "Session closed"),
                Ok(Err(e)) => e.log("close session"),
                Err(_) => warn!(
                    session_id = session.session_id(),
                    timeout_ms = timeout.as_millis() as u64,
                    "Close session timed out"
                ),
            }

            if let Some(bound) = session.channel() {
                let shared = channel.as_ref().is_some_and(|c| c.id() == bound.id());
                if !shared {
                    bound.close().await;
                }
            }
        }
        if let Some(channel) = channel {
            channel.close().await;
        }
    }

    fn notify_listeners(&self, session: Arc<Session>, active: bool) {
        if self.listeners.is_empty() {
            return;
        }
        let listeners = self.listeners.clone();
        self.executor.execute(Box::new(move || {
            for listener in &listeners {
                if active {
                    listener.on_session_active(&session);
                } else {
                    listener.on_session_inactive(&session);
                }
            }
        }));
    }
}

// =============================================================================
// FsmDriver
// =============================================================================

struct FsmDriver {
    context: Arc<FsmContext>,
    queue: EventQueue,
    receiver: EventReceiver,
    state: FsmState,
    state_tx: watch::Sender<StateKind>,
    current_tx: watch::Sender<Option<SessionFuture>>,
    /// Watches the channel of the active session.
    watcher: Option<JoinHandle<()>>,
    shutdown: Arc<Notify>,
}

impl FsmDriver {
    async fn run(mut self) {
        info!(endpoint = %self.context.endpoint.endpoint_url, "Session FSM started");

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.notified() => {
                    info!("Session FSM received shutdown signal");
                    break;
                }

                event = self.receiver.recv() => {
                    match event {
                        Some(event) => self.handle(event),
                        None => break,
                    }
                }
            }
        }

        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
        // pending promises drop here and resolve as abandoned
        self.state = FsmState::Inactive;
        self.current_tx.send_replace(None);
        self.state_tx.send_replace(StateKind::Inactive);
        self.receiver.close();

        let stats = self.context.stats.snapshot();
        info!(
            creations = stats.creations,
            transfers = stats.transfers,
            failures = stats.failures,
            closes = stats.closes,
            "Session FSM stopped"
        );
    }

    fn handle(&mut self, event: Event) {
        let from = self.state.kind();
        let name = event.name();
        let Transition { next, effects } = transition(std::mem::take(&mut self.state), event);
        let to = next.kind();

        match (from, to) {
            (StateKind::CreatingSession, StateKind::Active) => {
                SessionStats::incr(&self.context.stats.creations)
            }
            (StateKind::Transferring, StateKind::Active) => {
                SessionStats::incr(&self.context.stats.transfers)
            }
            _ => {}
        }

        if from != to {
            info!(%from, %to, event = name, "Session state changed");
        } else {
            debug!(state = %to, event = name, effects = effects.len(), "Event handled");
        }

        self.state = next;
        self.state_tx.send_replace(to);
        let current = self.state.current_future().cloned();
        self.current_tx.send_if_modified(|published| {
            let changed = match (published.as_ref(), current.as_ref()) {
                (Some(a), Some(b)) => !a.same_as(b),
                (None, None) => false,
                _ => true,
            };
            if changed {
                *published = current;
            }
            changed
        });

        for effect in effects {
            self.apply(effect);
        }
    }

    fn apply(&mut self, effect: Effect) {
        match effect {
            Effect::Attach { reply, future } => {
                // requester may have given up
                let _ = reply.send(future);
            }
            Effect::OpenChannel { attempt, session } => {
                debug!(attempt, transfer = session.is_some(), "Opening secure channel");
                let context = Arc::clone(&self.context);
                let queue = self.queue.clone();
                tokio::spawn(async move {
                    let event = context.establish(attempt, session).await;
                    if queue.submit(event).is_err() {
                        debug!("Channel outcome dropped, FSM stopped");
                    }
                });
            }
            Effect::Complete { promise, outcome } => {
                if let Err(e) = &outcome {
                    SessionStats::incr(&self.context.stats.failures);
                    warn!(request_id = promise.request_id(), error = %e, "Session request failed");
                }
                self.context
                    .executor
                    .execute(Box::new(move || promise.complete(outcome)));
            }
            Effect::Close { session, channel } => {
                SessionStats::incr(&self.context.stats.closes);
                let context = Arc::clone(&self.context);
                let queue = self.queue.clone();
                tokio::spawn(async move {
                    context.teardown(session, channel).await;
                    let _ = queue.submit(Event::CloseCompleted);
                });
            }
            Effect::Discard { session, channel } => {
                debug!(
                    session_id = session.as_ref().map(|s| s.session_id().to_string()),
                    "Discarding stale transfer outcome"
                );
                let context = Arc::clone(&self.context);
                tokio::spawn(async move { context.teardown(session, channel).await });
            }
            Effect::NotifyClosed(waiters) => {
                self.context.executor.execute(Box::new(move || {
                    for waiter in waiters {
                        let _ = waiter.send(());
                    }
                }));
            }
            Effect::SessionActive(session) => {
                self.watch_channel(&session);
                self.context.notify_listeners(session, true);
            }
            Effect::SessionInactive(session) => {
                if let Some(watcher) = self.watcher.take() {
                    watcher.abort();
                }
                self.context.notify_listeners(session, false);
            }
        }
    }

    /// Submits `ChannelInactive` once the session's channel is lost.
    fn watch_channel(&mut self, session: &Arc<Session>) {
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
        let Some(channel) = session.channel().cloned() else {
            return;
        };
        let queue = self.queue.clone();
        let stats = Arc::clone(&self.context.stats);
        self.watcher = Some(tokio::spawn(async move {
            if channel.wait_inactive().await == ChannelStatus::Lost {
                SessionStats::incr(&stats.channel_losses);
                warn!(channel_id = %channel.id(), "Session channel lost");
                let _ = queue.submit(Event::ChannelInactive);
            }
        }));
    }
}

/// Reports a rejected create or transfer as a session error.
///
/// Connection-level failures pass through so callers can still tell a lost
/// channel from a server that refused the session.
fn service_failure(session: Option<&Session>, error: UaError) -> UaError {
    if error.is_connection_error() {
        return error;
    }
    match session {
        None => SessionError::creation_failed(error.to_string()).into(),
        Some(existing) => {
            SessionError::transfer_failed(existing.session_id(), error.to_string()).into()
        }
    }
}
