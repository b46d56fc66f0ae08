// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Custom Test Assertions
//!
//! Assertion helpers with informative failure messages.

use std::future::Future;
use std::time::Duration;

use trap_ua_session::{
    ConfigurationError, SessionError, SessionFsm, SessionFuture, StateKind, UaError,
};

/// Default deadline for [`eventually`].
pub const EVENTUALLY_TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// Polling
// =============================================================================

/// Poll `condition` every 10ms until it holds or `timeout` elapses.
pub async fn eventually_within(timeout: Duration, description: &str, condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + timeout;
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "Condition not met within {:?}: {}",
            timeout,
            description
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Poll `condition` until it holds or [`EVENTUALLY_TIMEOUT`] elapses.
pub async fn eventually(description: &str, condition: impl Fn() -> bool) {
    eventually_within(EVENTUALLY_TIMEOUT, description, condition).await;
}

/// Await `future`, panicking if it takes longer than [`EVENTUALLY_TIMEOUT`].
pub async fn within<F: Future>(description: &str, future: F) -> F::Output {
    match tokio::time::timeout(EVENTUALLY_TIMEOUT, future).await {
        Ok(output) => output,
        Err(_) => panic!("Timed out after {:?}: {}", EVENTUALLY_TIMEOUT, description),
    }
}

// =============================================================================
// FSM Assertions
// =============================================================================

/// Wait for `fsm` to reach `state`.
pub async fn assert_reaches_state(fsm: &SessionFsm, state: StateKind) {
    let reached = tokio::time::timeout(EVENTUALLY_TIMEOUT, fsm.wait_for_state(state)).await;
    assert!(
        matches!(reached, Ok(Ok(()))),
        "FSM did not reach {}, current state is {}",
        state,
        fsm.state()
    );
}

/// Assert that `future` has not resolved after giving other tasks a chance
/// to run.
pub async fn assert_pending(future: &SessionFuture) {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    let polled = futures::FutureExt::now_or_never(future.clone());
    assert!(
        polled.is_none(),
        "Expected {:?} to be pending, but it resolved",
        future
    );
}

// =============================================================================
// Error Assertions
// =============================================================================

/// Assert that `error` is a connection-closed error.
pub fn assert_connection_closed(error: &UaError) {
    assert!(
        error.is_connection_closed(),
        "Expected a connection closed error, got {:?}",
        error
    );
}

/// Assert that `error` is a configuration error.
pub fn assert_configuration_error(error: &UaError) {
    assert!(
        matches!(error, UaError::Configuration(_)),
        "Expected a configuration error, got {:?}",
        error
    );
}

/// Assert that `error` is an unsupported-profile configuration error.
pub fn assert_unsupported_profile(error: &UaError) {
    assert!(
        matches!(
            error,
            UaError::Configuration(ConfigurationError::UnsupportedProfile { .. })
        ),
        "Expected an unsupported profile error, got {:?}",
        error
    );
}

/// Assert that `error` reports a closed session.
pub fn assert_session_closed(error: &UaError) {
    assert!(
        matches!(error, UaError::Session(SessionError::Closed)),
        "Expected a session closed error, got {:?}",
        error
    );
}

/// Assert that `error` reports an abandoned request.
pub fn assert_abandoned(error: &UaError) {
    assert!(
        matches!(error, UaError::Session(SessionError::Abandoned)),
        "Expected an abandoned error, got {:?}",
        error
    );
}
