// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Single-resolution session futures.
//!
//! A [`SessionPromise`] is owned by exactly one FSM state at a time and is
//! consumed by [`SessionPromise::complete`], so it cannot resolve twice. Its
//! [`SessionFuture`] is cloneable; every clone observes the same outcome.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use tokio::sync::oneshot;

use super::Session;
use crate::error::{SessionError, UaError};

/// Resolved value of a [`SessionFuture`].
pub type SessionOutcome = Result<Arc<Session>, Arc<UaError>>;

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Write side of a session future.
pub struct SessionPromise {
    request_id: u64,
    sender: oneshot::Sender<SessionOutcome>,
}

impl SessionPromise {
    /// Creates a promise and its future.
    pub fn new() -> (Self, SessionFuture) {
        let request_id = NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = oneshot::channel();
        let inner = receiver
            .map(|received| {
                received.unwrap_or_else(|_| Err(Arc::new(SessionError::Abandoned.into())))
            })
            .boxed()
            .shared();
        (
            Self { request_id, sender },
            SessionFuture { request_id, inner },
        )
    }

    /// Returns the creation request this promise belongs to.
    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    /// Resolves the future.
    pub fn complete(self, outcome: SessionOutcome) {
        // every future clone may already be gone
        let _ = self.sender.send(outcome);
    }
}

impl fmt::Debug for SessionPromise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionPromise")
            .field("request_id", &self.request_id)
            .finish()
    }
}

/// Read side of a session creation request.
#[derive(Clone)]
pub struct SessionFuture {
    request_id: u64,
    inner: Shared<BoxFuture<'static, SessionOutcome>>,
}

impl SessionFuture {
    /// Returns the creation request this future belongs to.
    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    /// Returns the outcome if it has already been observed by a poll.
    pub fn peek(&self) -> Option<&SessionOutcome> {
        self.inner.peek()
    }

    /// Returns `true` if both futures resolve from the same promise.
    pub fn same_as(&self, other: &SessionFuture) -> bool {
        self.request_id == other.request_id
    }
}

impl Future for SessionFuture {
    type Output = SessionOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.poll_unpin(cx)
    }
}

impl fmt::Debug for SessionFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.peek() {
            None => "pending",
            Some(Ok(_)) => "resolved",
            Some(Err(_)) => "failed",
        };
        f.debug_struct("SessionFuture")
            .field("request_id", &self.request_id)
            .field("state", &state)
            .finish()
    }
}
