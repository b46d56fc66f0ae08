// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Common Test Utilities
//!
//! Shared fixtures, mocks and harnesses for the integration suites.
//!
//! - `fixtures`: Endpoints and configurations
//! - `builders`: Loopback server behaviour
//! - `assertions`: Error and state assertions
//! - `mocks`: Mock collaborators of the session FSM
//! - `harness`: FSM harness and loopback UASC server

pub mod fixtures;
pub mod builders;
pub mod assertions;
pub mod mocks;
pub mod harness;

// Re-exports for convenience
pub use fixtures::*;
pub use builders::*;
pub use assertions::*;
pub use mocks::*;
pub use harness::*;

/// Initialize test logging. Safe to call from every test.
pub fn init_test_logging() {
    trap_ua_session::logging::try_init_test_logging();
}

/// Create a temporary directory for test data.
pub fn temp_test_dir(prefix: &str) -> tempfile::TempDir {
    tempfile::Builder::new()
        .prefix(prefix)
        .tempdir()
        .expect("Failed to create temp directory")
}
