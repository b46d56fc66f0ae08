// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Session Integration Tests
//!
//! Session FSM behaviour against mock channel opener and session services.
//!
//! ## Test Categories
//!
//! - `test_create_*`: Session creation and fan-in
//! - `test_transfer_*`: Channel loss and session transfer
//! - `test_close_*`: Orderly close and preemption
//! - `test_lifecycle_*`: End-to-end scenarios

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;

use trap_tests::prelude::*;
use trap_ua_session::{CompletionExecutor, SessionConfig, StateKind, UaError};

// =============================================================================
// Creation Tests
// =============================================================================

#[tokio::test]
async fn test_create_concurrent_requests_resolve_once() {
    let harness = SessionFsmHarness::new();
    harness.opener.hold();

    let requests = (0..8).map(|_| harness.fsm.create_session());
    let futures: Vec<_> = join_all(requests)
        .await
        .into_iter()
        .map(|f| f.expect("FSM stopped"))
        .collect();

    eventually("channel open started", || harness.opener.open_count() == 1).await;
    assert!(futures.iter().all(|f| f.same_as(&futures[0])));
    for future in &futures {
        assert_pending(future).await;
    }

    harness.opener.release();
    let sessions: Vec<_> = within("sessions resolved", join_all(futures))
        .await
        .into_iter()
        .map(|outcome| outcome.expect("session creation failed"))
        .collect();

    assert!(sessions.iter().all(|s| Arc::ptr_eq(s, &sessions[0])));
    assert_eq!(harness.opener.open_count(), 1);
    assert_eq!(harness.services.create_count(), 1);
    assert_eq!(harness.fsm.stats().creations, 1);
    assert_reaches_state(&harness.fsm, StateKind::Active).await;
}

#[tokio::test]
async fn test_create_while_active_returns_current_future() {
    let harness = SessionFsmHarness::new();
    let first = harness.fsm.create_session().await.unwrap();
    let session = within("session created", first.clone()).await.unwrap();

    let again = harness.fsm.create_session().await.unwrap();
    assert!(again.same_as(&first));
    let same = again.await.unwrap();
    assert!(Arc::ptr_eq(&session, &same));
    assert_eq!(harness.opener.open_count(), 1);
    assert!(harness.fsm.current_session_future().unwrap().same_as(&first));
}

#[tokio::test]
async fn test_create_failure_closes_new_channel() {
    let harness = SessionFsmHarness::new();
    harness.services.set_fail_create(true);

    let future = harness.fsm.create_session().await.unwrap();
    let err = within("creation failed", future).await.unwrap_err();
    assert_connection_closed(&err);
    assert_reaches_state(&harness.fsm, StateKind::Inactive).await;

    let channel = harness.opener.last_channel().unwrap();
    assert!(!channel.is_open());
    assert_eq!(harness.fsm.stats().failures, 1);

    // the next request starts over
    harness.services.set_fail_create(false);
    let future = harness.fsm.create_session().await.unwrap();
    within("retry succeeded", future).await.unwrap();
    assert_eq!(harness.opener.open_count(), 2);
}

#[tokio::test]
async fn test_create_open_failure_fails_future() {
    let harness = SessionFsmHarness::new();
    harness.opener.fail_next();

    let future = harness.fsm.create_session().await.unwrap();
    let err = within("open failed", future).await.unwrap_err();
    assert!(err.is_connection_error(), "unexpected error {err:?}");
    assert_reaches_state(&harness.fsm, StateKind::Inactive).await;
    assert_eq!(harness.services.create_count(), 0);
    assert_eq!(harness.fsm.stats().channel_opens, 0);
}

#[tokio::test]
async fn test_create_request_timeout() {
    let harness = SessionFsmHarness::with_session_config(SessionConfig {
        request_timeout: Duration::from_millis(100),
        ..SessionConfig::default()
    });
    harness.services.set_latency(Duration::from_millis(500));

    let future = harness.fsm.create_session().await.unwrap();
    let err = within("request timed out", future).await.unwrap_err();
    assert!(matches!(*err, UaError::Timeout(_)), "unexpected error {err:?}");
}

#[tokio::test]
async fn test_create_channel_loss_fails_future() {
    let harness = SessionFsmHarness::new();
    harness.opener.hold();

    let future = harness.fsm.create_session().await.unwrap();
    eventually("channel open started", || harness.opener.open_count() == 1).await;

    harness.fsm.channel_inactive().unwrap();
    let err = within("creation aborted", future).await.unwrap_err();
    assert_connection_closed(&err);
    assert_reaches_state(&harness.fsm, StateKind::Inactive).await;

    // the late outcome is torn down without touching state
    harness.opener.release();
    eventually("late session closed", || {
        harness.services.close_count() == 1
            && harness.opener.last_channel().is_some_and(|c| !c.is_open())
    })
    .await;
    assert_eq!(harness.fsm.state(), StateKind::Inactive);
}

#[tokio::test]
async fn test_create_ignores_outcome_of_abandoned_attempt() {
    let harness = SessionFsmHarness::new();
    harness.opener.fail_call(1);
    harness.opener.hold();

    let abandoned = harness.fsm.create_session().await.unwrap();
    eventually("first open started", || harness.opener.open_count() == 1).await;
    harness.fsm.channel_inactive().unwrap();
    assert_connection_closed(&within("first attempt aborted", abandoned).await.unwrap_err());

    let current = harness.fsm.create_session().await.unwrap();
    eventually("second open started", || harness.opener.open_count() == 2).await;

    // the first attempt fails, the second succeeds, in either order
    harness.opener.release();
    let session = within("second attempt resolved", current)
        .await
        .expect("outcome of the abandoned attempt leaked into the new request");
    assert_reaches_state(&harness.fsm, StateKind::Active).await;
    assert_eq!(harness.services.create_count(), 1);
    assert!(session.channel().unwrap().is_open());
    assert_eq!(harness.fsm.stats().creations, 1);
}

// =============================================================================
// Transfer Tests
// =============================================================================

#[tokio::test]
async fn test_transfer_on_channel_loss_while_active() {
    let harness = SessionFsmHarness::new();
    let first = harness.fsm.create_session().await.unwrap();
    let session = within("session created", first.clone()).await.unwrap();
    eventually("listener saw activation", || harness.listener.active_count() == 1).await;

    harness.opener.hold();
    assert!(session.channel().unwrap().mark_lost());
    assert_reaches_state(&harness.fsm, StateKind::Transferring).await;

    // nothing was outstanding, so nothing completes or fails
    assert_eq!(harness.fsm.stats().failures, 0);
    let pending = harness.fsm.create_session().await.unwrap();
    assert!(!pending.same_as(&first));
    assert_pending(&pending).await;
    assert!(Arc::ptr_eq(&first.clone().await.unwrap(), &session));
    eventually("listener saw deactivation", || harness.listener.inactive_count() == 1).await;

    harness.opener.release();
    let transferred = within("transfer completed", pending).await.unwrap();
    assert!(transferred.same_identity(&session));
    assert_ne!(
        transferred.channel().unwrap().id(),
        session.channel().unwrap().id()
    );

    let stats = harness.fsm.stats();
    assert_eq!(stats.transfers, 1);
    assert_eq!(stats.channel_losses, 1);
    assert_eq!(harness.services.transfer_count(), 1);
    assert_eq!(harness.services.create_count(), 1);
}

#[tokio::test]
async fn test_transfer_fan_in_opens_one_channel() {
    let harness = SessionFsmHarness::new();
    let session = within("session created", harness.fsm.create_session().await.unwrap())
        .await
        .unwrap();

    harness.opener.hold();
    session.channel().unwrap().mark_lost();
    assert_reaches_state(&harness.fsm, StateKind::Transferring).await;
    eventually("transfer open started", || harness.opener.open_count() == 2).await;

    let requests = (0..5).map(|_| harness.fsm.create_session());
    let futures: Vec<_> = join_all(requests)
        .await
        .into_iter()
        .map(|f| f.unwrap())
        .collect();
    assert!(futures.iter().all(|f| f.same_as(&futures[0])));
    assert_eq!(harness.opener.open_count(), 2);

    harness.opener.release();
    let sessions = within("transfer resolved", join_all(futures)).await;
    for transferred in &sessions {
        assert!(transferred.as_ref().unwrap().same_identity(&session));
    }
    assert_eq!(harness.opener.open_count(), 2);
    assert_eq!(harness.services.transfer_count(), 1);
}

#[tokio::test]
async fn test_transfer_channel_loss_fails_pending_future() {
    let harness = SessionFsmHarness::new();
    let session = within("session created", harness.fsm.create_session().await.unwrap())
        .await
        .unwrap();

    harness.opener.hold();
    session.channel().unwrap().mark_lost();
    assert_reaches_state(&harness.fsm, StateKind::Transferring).await;
    let pending = harness.fsm.create_session().await.unwrap();

    harness.fsm.channel_inactive().unwrap();
    let err = within("transfer aborted", pending).await.unwrap_err();
    assert_connection_closed(&err);
    assert_reaches_state(&harness.fsm, StateKind::Inactive).await;
    harness.opener.release();
}

#[tokio::test]
async fn test_transfer_failure_closes_new_channel() {
    let harness = SessionFsmHarness::new();
    let session = within("session created", harness.fsm.create_session().await.unwrap())
        .await
        .unwrap();

    harness.services.set_fail_transfer(true);
    harness.opener.hold();
    session.channel().unwrap().mark_lost();
    assert_reaches_state(&harness.fsm, StateKind::Transferring).await;
    let pending = harness.fsm.create_session().await.unwrap();
    assert_pending(&pending).await;

    harness.opener.release();
    let err = within("transfer failed", pending).await.unwrap_err();
    assert_connection_closed(&err);
    assert_reaches_state(&harness.fsm, StateKind::Inactive).await;

    let channels = harness.opener.channels();
    assert_eq!(channels.len(), 2);
    assert!(!channels[1].is_open());
    // the stale session is dropped locally, not closed on the server
    assert_eq!(harness.services.close_count(), 0);
}

// =============================================================================
// Close Tests
// =============================================================================

#[tokio::test]
async fn test_close_when_inactive_is_acknowledged() {
    let harness = SessionFsmHarness::new();
    within("close acknowledged", harness.fsm.close_session())
        .await
        .unwrap();
    assert_eq!(harness.fsm.state(), StateKind::Inactive);
    assert_eq!(harness.services.close_count(), 0);
}

#[tokio::test]
async fn test_close_active_session() {
    let harness = SessionFsmHarness::new();
    let session = within("session created", harness.fsm.create_session().await.unwrap())
        .await
        .unwrap();

    within("session closed", harness.fsm.close_session())
        .await
        .unwrap();

    assert_eq!(harness.fsm.state(), StateKind::Inactive);
    assert!(!session.channel().unwrap().is_open());
    assert_eq!(
        harness.services.calls(),
        vec![
            ServiceCall::Create,
            ServiceCall::Close(session.session_id().to_string())
        ]
    );
    assert!(harness.fsm.current_session_future().is_none());
    eventually("listener saw deactivation", || harness.listener.inactive_count() == 1).await;
    assert_eq!(harness.fsm.stats().channel_losses, 0);
}

#[tokio::test]
async fn test_close_during_transfer_waits_for_outcome() {
    let harness = SessionFsmHarness::new();
    let session = within("session created", harness.fsm.create_session().await.unwrap())
        .await
        .unwrap();

    harness.opener.hold();
    session.channel().unwrap().mark_lost();
    assert_reaches_state(&harness.fsm, StateKind::Transferring).await;
    let pending = harness.fsm.create_session().await.unwrap();

    let fsm = Arc::new(harness.fsm);
    let close = {
        let fsm = Arc::clone(&fsm);
        tokio::spawn(async move { fsm.close_session().await })
    };
    assert_reaches_state(&fsm, StateKind::Closing).await;

    // no teardown before the transfer outcome is handled
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!close.is_finished());
    assert_eq!(harness.services.close_count(), 0);
    assert_eq!(harness.opener.channels().len(), 1);
    assert_pending(&pending).await;

    harness.opener.release();
    within("close finished", close).await.unwrap().unwrap();

    let err = within("pending future failed", pending).await.unwrap_err();
    assert_session_closed(&err);
    assert_eq!(fsm.state(), StateKind::Inactive);
    assert_eq!(
        harness.services.calls(),
        vec![
            ServiceCall::Create,
            ServiceCall::Transfer(session.session_id().to_string()),
            ServiceCall::Close(session.session_id().to_string()),
        ]
    );
    assert!(!harness.opener.last_channel().unwrap().is_open());
}

#[tokio::test]
async fn test_close_during_creation_fails_future() {
    let harness = SessionFsmHarness::new();
    harness.opener.hold();
    let pending = harness.fsm.create_session().await.unwrap();
    eventually("channel open started", || harness.opener.open_count() == 1).await;

    let fsm = Arc::new(harness.fsm);
    let close = {
        let fsm = Arc::clone(&fsm);
        tokio::spawn(async move { fsm.close_session().await })
    };
    assert_reaches_state(&fsm, StateKind::Closing).await;

    harness.opener.release();
    within("close finished", close).await.unwrap().unwrap();
    assert_session_closed(&within("future failed", pending).await.unwrap_err());
    assert_eq!(harness.services.close_count(), 1);
}

#[tokio::test]
async fn test_create_during_close_is_deferred() {
    let harness = SessionFsmHarness::new();
    let first = within("session created", harness.fsm.create_session().await.unwrap())
        .await
        .unwrap();
    harness.services.set_latency(Duration::from_millis(100));

    let fsm = Arc::new(harness.fsm);
    let close = {
        let fsm = Arc::clone(&fsm);
        tokio::spawn(async move { fsm.close_session().await })
    };
    assert_reaches_state(&fsm, StateKind::Closing).await;

    let deferred = {
        let fsm = Arc::clone(&fsm);
        tokio::spawn(async move { fsm.create_session().await })
    };
    within("close finished", close).await.unwrap().unwrap();

    let future = within("deferred request attached", deferred)
        .await
        .unwrap()
        .unwrap();
    let second = within("new session created", future).await.unwrap();
    assert!(!second.same_identity(&first));
    assert_eq!(harness.services.create_count(), 2);
    assert_eq!(harness.opener.open_count(), 2);
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[tokio::test]
async fn test_lifecycle_end_to_end() {
    let executor = Arc::new(InlineExecutor::new());
    let harness = SessionFsmHarness::with_parts(
        Arc::new(MockChannelOpener::new()),
        Arc::new(MockSessionServices::new()),
        Some(Arc::clone(&executor) as Arc<dyn CompletionExecutor>),
    );

    // create
    let session = within("session created", harness.fsm.create_session().await.unwrap())
        .await
        .unwrap();
    assert_reaches_state(&harness.fsm, StateKind::Active).await;

    // lose the channel and transfer
    session.channel().unwrap().mark_lost();
    eventually("session transferred", || harness.fsm.stats().transfers == 1).await;
    let transferred = within(
        "transfer resolved",
        harness.fsm.current_session_future().unwrap(),
    )
    .await
    .unwrap();
    assert!(transferred.same_identity(&session));

    // close
    within("session closed", harness.fsm.close_session())
        .await
        .unwrap();
    assert!(!transferred.channel().unwrap().is_open());

    // a fresh session afterwards
    let fresh = within("fresh session", harness.fsm.create_session().await.unwrap())
        .await
        .unwrap();
    assert!(!fresh.same_identity(&session));

    assert_eq!(
        harness.listener.events(),
        vec![
            ListenerEvent::Active(session.session_id().to_string()),
            ListenerEvent::Inactive(session.session_id().to_string()),
            ListenerEvent::Active(session.session_id().to_string()),
            ListenerEvent::Inactive(session.session_id().to_string()),
            ListenerEvent::Active(fresh.session_id().to_string()),
        ]
    );
    let stats = harness.fsm.stats();
    assert_eq!(stats.creations, 2);
    assert_eq!(stats.transfers, 1);
    assert_eq!(stats.channel_opens, 3);
    assert_eq!(stats.closes, 1);
    assert!(executor.executed() > 0);
    assert!(harness.fsm.queue_stats().events_submitted >= 8);
}

#[tokio::test]
async fn test_lifecycle_shutdown_abandons_pending() {
    let SessionFsmHarness { fsm, opener, .. } = SessionFsmHarness::new();
    opener.hold();
    let pending = fsm.create_session().await.unwrap();

    fsm.shutdown().await;
    let err = within("pending future abandoned", pending).await.unwrap_err();
    assert_abandoned(&err);
}
