// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # TRAP UA Session Integration Tests
//!
//! Integration tests for the OPC UA session lifecycle and the transport
//! pipeline, with the shared utilities they run on.
//!
//! ## Module Structure
//!
//! - [`common`]: Shared test utilities, fixtures, and helpers
//!   - `fixtures`: Endpoints and configurations used across suites
//!   - `builders`: Builders for loopback server behaviour
//!   - `assertions`: Error and state assertion helpers
//!   - `mocks`: Channel opener, session services and listener mocks
//!   - `harness`: Session FSM harness and loopback UASC server
//!
//! ## Running Tests
//!
//! ```bash
//! # Run all integration tests
//! cargo test -p trap-tests
//!
//! # Run specific test suite
//! cargo test -p trap-tests --test integration_session
//! cargo test -p trap-tests --test integration_pipeline
//! cargo test -p trap-tests --test integration_config
//! ```
//!
//! ## Test Categories
//!
//! ### Session Tests (`integration_session.rs`)
//! - Exactly-once resolution and fan-in of concurrent requests
//! - Close preemption during transfer
//! - Channel loss while active and while creating
//! - Listener notification and statistics
//!
//! ### Pipeline Tests (`integration_pipeline.rs`)
//! - Profile resolution and stage ordering
//! - Hello/Acknowledge against a loopback server
//! - Server error replies, size enforcement, handshake timeout
//!
//! ### Config Tests (`integration_config.rs`)
//! - YAML, TOML and JSON loading
//! - Environment overrides and validation
//!
//! ## Using the Harness
//!
//! ```rust,ignore
//! use trap_tests::common::harness::SessionFsmHarness;
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let harness = SessionFsmHarness::new();
//!     let session = harness.fsm.create_session().await.unwrap().await.unwrap();
//!     assert_eq!(harness.opener.open_count(), 1);
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod common;

/// Re-export commonly used items for convenience.
pub mod prelude {
    pub use crate::common::fixtures::*;
    pub use crate::common::builders::*;
    pub use crate::common::assertions::*;
    pub use crate::common::mocks::*;
    pub use crate::common::harness::*;
}
