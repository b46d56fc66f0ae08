// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Session FSM states, events and the transition function.
//!
//! [`transition`] is pure: it consumes the current state and one event and
//! returns the next state plus the effects the driver must carry out. It
//! never touches the network, spawns tasks or resolves futures itself.
//!
//! # Transition Table
//!
//! | State            | Event            | Effects                          | Next              |
//! |------------------|------------------|----------------------------------|-------------------|
//! | Inactive         | Create           | attach, open channel             | CreatingSession   |
//! | Inactive         | Close            | acknowledge                      | Inactive          |
//! | CreatingSession  | Create           | attach to in-flight future       | CreatingSession   |
//! | CreatingSession  | TransferSucceeded| complete Ok, activity            | Active            |
//! | CreatingSession  | TransferFailed   | close new channel                | Closing           |
//! | CreatingSession  | ChannelInactive  | complete Err(closed)             | Inactive          |
//! | CreatingSession  | Close            | wait for the transfer outcome    | Closing           |
//! | Active           | Create           | attach resolved future           | Active            |
//! | Active           | ChannelInactive  | activity, open channel (transfer)| Transferring      |
//! | Active           | Close            | activity, close session+channel  | Closing           |
//! | Transferring     | Create           | attach to in-flight future       | Transferring      |
//! | Transferring     | TransferSucceeded| complete Ok, activity            | Active            |
//! | Transferring     | TransferFailed   | close new channel                | Closing           |
//! | Transferring     | ChannelInactive  | complete Err(closed)             | Inactive          |
//! | Transferring     | Close            | wait for the transfer outcome    | Closing           |
//! | Closing          | transfer outcome | close it (if awaited)            | Closing           |
//! | Closing          | Create           | defer                            | Closing           |
//! | Closing          | Close            | join                             | Closing           |
//! | Closing          | CloseCompleted   | complete pending failure, ack    | Inactive / Creating|
//!
//! Every channel attempt carries the id of the request it serves. An outcome
//! whose attempt is not the one the current state awaits is discarded: its
//! session and channel are closed without touching state.

use std::fmt;
use std::sync::Arc;

use tokio::sync::oneshot;

use super::future::{SessionFuture, SessionOutcome, SessionPromise};
use super::Session;
use crate::channel::SecureChannel;
use crate::error::{SessionError, UaError};

// =============================================================================
// Event
// =============================================================================

/// Input to the session FSM.
pub enum Event {
    /// A caller wants a session. The FSM replies with the future to await.
    CreateSessionRequested {
        /// Receives the session future.
        reply: oneshot::Sender<SessionFuture>,
    },
    /// The bound channel, or the channel being set up, went away.
    ChannelInactive,
    /// A caller wants the session closed.
    CloseSessionRequested {
        /// Signalled once the close has completed.
        reply: Option<oneshot::Sender<()>>,
    },
    /// A channel was opened and a session created or transferred onto it.
    TransferSucceeded {
        /// Attempt that produced the outcome.
        attempt: u64,
        /// The session, bound to its new channel.
        session: Arc<Session>,
    },
    /// Opening a channel or creating/transferring the session failed.
    TransferFailed {
        /// Attempt that produced the outcome.
        attempt: u64,
        /// The session whose transfer failed; `None` for a creation.
        session: Option<Arc<Session>>,
        /// The newly opened channel, if one was established.
        channel: Option<Arc<SecureChannel>>,
        /// Why it failed.
        reason: Arc<UaError>,
    },
    /// A close started by the FSM finished.
    CloseCompleted,
}

impl Event {
    /// Creates a create request and the receiver for its future.
    pub fn create() -> (Self, oneshot::Receiver<SessionFuture>) {
        let (reply, rx) = oneshot::channel();
        (Self::CreateSessionRequested { reply }, rx)
    }

    /// Creates a close request and the receiver signalled on completion.
    pub fn close() -> (Self, oneshot::Receiver<()>) {
        let (reply, rx) = oneshot::channel();
        (Self::CloseSessionRequested { reply: Some(reply) }, rx)
    }

    /// Returns the event name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateSessionRequested { .. } => "CreateSessionRequested",
            Self::ChannelInactive => "ChannelInactive",
            Self::CloseSessionRequested { .. } => "CloseSessionRequested",
            Self::TransferSucceeded { .. } => "TransferSucceeded",
            Self::TransferFailed { .. } => "TransferFailed",
            Self::CloseCompleted => "CloseCompleted",
        }
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TransferSucceeded { attempt, session } => f
                .debug_struct("TransferSucceeded")
                .field("attempt", attempt)
                .field("session_id", &session.session_id())
                .finish(),
            Self::TransferFailed {
                attempt, reason, ..
            } => f
                .debug_struct("TransferFailed")
                .field("attempt", attempt)
                .field("reason", &reason.to_string())
                .finish_non_exhaustive(),
            other => write!(f, "{}", other.name()),
        }
    }
}

// =============================================================================
// FsmState
// =============================================================================

/// State discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKind {
    /// No session.
    Inactive,
    /// First channel and session being created.
    CreatingSession,
    /// Session usable.
    Active,
    /// Session being moved to a new channel.
    Transferring,
    /// Session and channel being torn down.
    Closing,
}

impl fmt::Display for StateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// An unresolved creation request.
pub struct Pending {
    promise: SessionPromise,
    future: SessionFuture,
}

impl Pending {
    fn new() -> Self {
        let (promise, future) = SessionPromise::new();
        Self { promise, future }
    }

    /// Returns the future callers attach to.
    pub fn future(&self) -> &SessionFuture {
        &self.future
    }

    /// Returns the id of the channel attempt serving this request.
    pub fn attempt(&self) -> u64 {
        self.future.request_id()
    }
}

/// Data of the `Closing` state.
#[derive(Default)]
pub struct Closing {
    /// Attempt whose outcome must be torn down before the close can finish.
    awaiting: Option<u64>,
    failure: Option<(SessionPromise, Arc<UaError>)>,
    waiters: Vec<oneshot::Sender<()>>,
    deferred: Vec<oneshot::Sender<SessionFuture>>,
}

impl Closing {
    /// Returns `true` while a transfer outcome is still expected.
    pub fn awaiting_transfer(&self) -> bool {
        self.awaiting.is_some()
    }

    /// Returns the number of create requests deferred until the close ends.
    pub fn deferred_requests(&self) -> usize {
        self.deferred.len()
    }

    /// Returns the number of close requests waiting for completion.
    pub fn close_waiters(&self) -> usize {
        self.waiters.len()
    }
}

/// FSM state. Each transition replaces the value.
#[derive(Default)]
pub enum FsmState {
    /// No session.
    #[default]
    Inactive,
    /// First channel and session being created.
    CreatingSession(Pending),
    /// Session usable.
    Active {
        /// The session.
        session: Arc<Session>,
        /// Its resolved future.
        future: SessionFuture,
    },
    /// Session being moved to a new channel.
    Transferring {
        /// The session as bound to its lost channel.
        session: Arc<Session>,
        /// The request the transfer resolves.
        pending: Pending,
    },
    /// Session and channel being torn down.
    Closing(Closing),
}

impl FsmState {
    /// Returns the state kind.
    pub fn kind(&self) -> StateKind {
        match self {
            Self::Inactive => StateKind::Inactive,
            Self::CreatingSession(_) => StateKind::CreatingSession,
            Self::Active { .. } => StateKind::Active,
            Self::Transferring { .. } => StateKind::Transferring,
            Self::Closing(_) => StateKind::Closing,
        }
    }

    /// Returns the future a create request would attach to right now.
    pub fn current_future(&self) -> Option<&SessionFuture> {
        match self {
            Self::CreatingSession(pending) | Self::Transferring { pending, .. } => {
                Some(&pending.future)
            }
            Self::Active { future, .. } => Some(future),
            Self::Inactive | Self::Closing(_) => None,
        }
    }

    /// Returns the channel attempt whose outcome this state expects.
    pub fn awaited_attempt(&self) -> Option<u64> {
        match self {
            Self::CreatingSession(pending) | Self::Transferring { pending, .. } => {
                Some(pending.attempt())
            }
            Self::Closing(closing) => closing.awaiting,
            Self::Inactive | Self::Active { .. } => None,
        }
    }

    /// Returns the session, if one is established.
    pub fn session(&self) -> Option<&Arc<Session>> {
        match self {
            Self::Active { session, .. } | Self::Transferring { session, .. } => Some(session),
            _ => None,
        }
    }
}

impl fmt::Debug for FsmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closing(closing) => f
                .debug_struct("Closing")
                .field("awaiting", &closing.awaiting)
                .field("deferred", &closing.deferred.len())
                .finish_non_exhaustive(),
            other => write!(f, "{}", other.kind()),
        }
    }
}

// =============================================================================
// Effect / Transition
// =============================================================================

/// Side effect requested by a transition.
pub enum Effect {
    /// Hand `future` to a create requester.
    Attach {
        /// Requester.
        reply: oneshot::Sender<SessionFuture>,
        /// Future to hand out.
        future: SessionFuture,
    },
    /// Open a channel; create a session on it, or transfer `session` to it.
    OpenChannel {
        /// Attempt id echoed back in the outcome event.
        attempt: u64,
        /// Session to transfer, `None` to create one.
        session: Option<Arc<Session>>,
    },
    /// Resolve a promise on the completion executor.
    Complete {
        /// Promise to resolve.
        promise: SessionPromise,
        /// Outcome to deliver.
        outcome: SessionOutcome,
    },
    /// Close session and channel, then submit `CloseCompleted`.
    Close {
        /// Session to close on the server.
        session: Option<Arc<Session>>,
        /// Channel to close.
        channel: Option<Arc<SecureChannel>>,
    },
    /// Close a stray session and channel without reporting back.
    Discard {
        /// Session to close on the server.
        session: Option<Arc<Session>>,
        /// Channel to close.
        channel: Option<Arc<SecureChannel>>,
    },
    /// Acknowledge close requesters.
    NotifyClosed(Vec<oneshot::Sender<()>>),
    /// A session became active.
    SessionActive(Arc<Session>),
    /// A session stopped being active.
    SessionInactive(Arc<Session>),
}

impl Effect {
    /// Returns the effect name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Attach { .. } => "Attach",
            Self::OpenChannel { .. } => "OpenChannel",
            Self::Complete { .. } => "Complete",
            Self::Close { .. } => "Close",
            Self::Discard { .. } => "Discard",
            Self::NotifyClosed(_) => "NotifyClosed",
            Self::SessionActive(_) => "SessionActive",
            Self::SessionInactive(_) => "SessionInactive",
        }
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of [`transition`].
#[derive(Debug)]
pub struct Transition {
    /// State to install.
    pub next: FsmState,
    /// Effects to perform, in order.
    pub effects: Vec<Effect>,
}

impl Transition {
    fn to(next: FsmState) -> Self {
        Self {
            next,
            effects: Vec::new(),
        }
    }

    fn with(next: FsmState, effects: Vec<Effect>) -> Self {
        Self { next, effects }
    }
}

// =============================================================================
// transition
// =============================================================================

/// Applies one event to the state.
pub fn transition(state: FsmState, event: Event) -> Transition {
    match state {
        FsmState::Inactive => from_inactive(event),
        FsmState::CreatingSession(pending) => from_creating(pending, event),
        FsmState::Active { session, future } => from_active(session, future, event),
        FsmState::Transferring { session, pending } => from_transferring(session, pending, event),
        FsmState::Closing(closing) => from_closing(closing, event),
    }
}

fn from_inactive(event: Event) -> Transition {
    match event {
        Event::CreateSessionRequested { reply } => start_creation(vec![reply]),
        Event::CloseSessionRequested { reply } => Transition::with(
            FsmState::Inactive,
            vec![Effect::NotifyClosed(reply.into_iter().collect())],
        ),
        event @ (Event::TransferSucceeded { .. } | Event::TransferFailed { .. }) => {
            Transition::with(FsmState::Inactive, discard(event))
        }
        Event::ChannelInactive | Event::CloseCompleted => Transition::to(FsmState::Inactive),
    }
}

fn from_creating(pending: Pending, event: Event) -> Transition {
    match event {
        Event::CreateSessionRequested { reply } => {
            let future = pending.future.clone();
            Transition::with(
                FsmState::CreatingSession(pending),
                vec![Effect::Attach { reply, future }],
            )
        }
        Event::TransferSucceeded { attempt, session } if attempt == pending.attempt() => {
            activate(session, pending)
        }
        Event::TransferFailed {
            attempt,
            channel,
            reason,
            ..
        } if attempt == pending.attempt() => fail_transfer(pending, channel, reason),
        event @ (Event::TransferSucceeded { .. } | Event::TransferFailed { .. }) => {
            Transition::with(FsmState::CreatingSession(pending), discard(event))
        }
        Event::ChannelInactive => Transition::with(
            FsmState::Inactive,
            vec![Effect::Complete {
                promise: pending.promise,
                outcome: Err(channel_closed()),
            }],
        ),
        Event::CloseSessionRequested { reply } => preempt_close(pending, reply),
        Event::CloseCompleted => Transition::to(FsmState::CreatingSession(pending)),
    }
}

fn from_active(session: Arc<Session>, future: SessionFuture, event: Event) -> Transition {
    match event {
        Event::CreateSessionRequested { reply } => {
            let attached = future.clone();
            Transition::with(
                FsmState::Active { session, future },
                vec![Effect::Attach {
                    reply,
                    future: attached,
                }],
            )
        }
        Event::ChannelInactive => {
            let pending = Pending::new();
            let attempt = pending.attempt();
            Transition::with(
                FsmState::Transferring {
                    session: Arc::clone(&session),
                    pending,
                },
                vec![
                    Effect::SessionInactive(Arc::clone(&session)),
                    Effect::OpenChannel {
                        attempt,
                        session: Some(session),
                    },
                ],
            )
        }
        Event::CloseSessionRequested { reply } => {
            let channel = session.channel().cloned();
            Transition::with(
                FsmState::Closing(Closing {
                    waiters: reply.into_iter().collect(),
                    ..Closing::default()
                }),
                vec![
                    Effect::SessionInactive(Arc::clone(&session)),
                    Effect::Close {
                        session: Some(session),
                        channel,
                    },
                ],
            )
        }
        event @ (Event::TransferSucceeded { .. } | Event::TransferFailed { .. }) => {
            Transition::with(FsmState::Active { session, future }, discard(event))
        }
        Event::CloseCompleted => Transition::to(FsmState::Active { session, future }),
    }
}

fn from_transferring(session: Arc<Session>, pending: Pending, event: Event) -> Transition {
    match event {
        Event::CreateSessionRequested { reply } => {
            let future = pending.future.clone();
            Transition::with(
                FsmState::Transferring { session, pending },
                vec![Effect::Attach { reply, future }],
            )
        }
        Event::TransferSucceeded {
            attempt,
            session: transferred,
        } if attempt == pending.attempt() => activate(transferred, pending),
        Event::TransferFailed {
            attempt,
            channel,
            reason,
            ..
        } if attempt == pending.attempt() => fail_transfer(pending, channel, reason),
        event @ (Event::TransferSucceeded { .. } | Event::TransferFailed { .. }) => {
            Transition::with(FsmState::Transferring { session, pending }, discard(event))
        }
        Event::ChannelInactive => Transition::with(
            FsmState::Inactive,
            vec![Effect::Complete {
                promise: pending.promise,
                outcome: Err(channel_closed()),
            }],
        ),
        Event::CloseSessionRequested { reply } => preempt_close(pending, reply),
        Event::CloseCompleted => Transition::to(FsmState::Transferring { session, pending }),
    }
}

fn from_closing(mut closing: Closing, event: Event) -> Transition {
    match event {
        Event::CreateSessionRequested { reply } => {
            closing.deferred.push(reply);
            Transition::to(FsmState::Closing(closing))
        }
        Event::CloseSessionRequested { reply } => {
            closing.waiters.extend(reply);
            Transition::to(FsmState::Closing(closing))
        }
        Event::TransferSucceeded { attempt, session } if closing.awaiting == Some(attempt) => {
            closing.awaiting = None;
            let channel = session.channel().cloned();
            Transition::with(
                FsmState::Closing(closing),
                vec![Effect::Close {
                    session: Some(session),
                    channel,
                }],
            )
        }
        Event::TransferFailed {
            attempt, channel, ..
        } if closing.awaiting == Some(attempt) => {
            closing.awaiting = None;
            Transition::with(
                FsmState::Closing(closing),
                vec![Effect::Close {
                    session: None,
                    channel,
                }],
            )
        }
        event @ (Event::TransferSucceeded { .. } | Event::TransferFailed { .. }) => {
            Transition::with(FsmState::Closing(closing), discard(event))
        }
        Event::CloseCompleted if closing.awaiting.is_none() => finish_close(closing),
        Event::CloseCompleted | Event::ChannelInactive => {
            Transition::to(FsmState::Closing(closing))
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn start_creation(requesters: Vec<oneshot::Sender<SessionFuture>>) -> Transition {
    let pending = Pending::new();
    let mut effects: Vec<Effect> = requesters
        .into_iter()
        .map(|reply| Effect::Attach {
            reply,
            future: pending.future.clone(),
        })
        .collect();
    effects.push(Effect::OpenChannel {
        attempt: pending.attempt(),
        session: None,
    });
    Transition::with(FsmState::CreatingSession(pending), effects)
}

fn activate(session: Arc<Session>, pending: Pending) -> Transition {
    let Pending { promise, future } = pending;
    Transition::with(
        FsmState::Active {
            session: Arc::clone(&session),
            future,
        },
        vec![
            Effect::Complete {
                promise,
                outcome: Ok(Arc::clone(&session)),
            },
            Effect::SessionActive(session),
        ],
    )
}

fn fail_transfer(
    pending: Pending,
    channel: Option<Arc<SecureChannel>>,
    reason: Arc<UaError>,
) -> Transition {
    Transition::with(
        FsmState::Closing(Closing {
            failure: Some((pending.promise, reason)),
            ..Closing::default()
        }),
        vec![Effect::Close {
            session: None,
            channel,
        }],
    )
}

fn preempt_close(pending: Pending, reply: Option<oneshot::Sender<()>>) -> Transition {
    Transition::to(FsmState::Closing(Closing {
        awaiting: Some(pending.attempt()),
        failure: Some((pending.promise, Arc::new(SessionError::Closed.into()))),
        waiters: reply.into_iter().collect(),
        deferred: Vec::new(),
    }))
}

fn finish_close(closing: Closing) -> Transition {
    let Closing {
        failure,
        waiters,
        deferred,
        ..
    } = closing;

    let mut effects = Vec::new();
    if let Some((promise, reason)) = failure {
        effects.push(Effect::Complete {
            promise,
            outcome: Err(reason),
        });
    }
    if !waiters.is_empty() {
        effects.push(Effect::NotifyClosed(waiters));
    }

    if deferred.is_empty() {
        return Transition::with(FsmState::Inactive, effects);
    }

    let mut restart = start_creation(deferred);
    effects.append(&mut restart.effects);
    Transition::with(restart.next, effects)
}

fn discard(event: Event) -> Vec<Effect> {
    match event {
        Event::TransferSucceeded { session, .. } => {
            let channel = session.channel().cloned();
            vec![Effect::Discard {
                session: Some(session),
                channel,
            }]
        }
        Event::TransferFailed { channel, .. } => vec![Effect::Discard {
            session: None,
            channel,
        }],
        _ => Vec::new(),
    }
}

fn channel_closed() -> Arc<UaError> {
    Arc::new(UaError::connection_closed("secure channel became inactive"))
}

// =============================================================================
// Tests
// =============================================================================
