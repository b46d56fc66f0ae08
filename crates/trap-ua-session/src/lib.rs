// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # trap-ua-session
//!
//! OPC UA client session lifecycle and secure channel bootstrap for the TRAP
//! gateway.
//!
//! - **Types**: Endpoint URLs, transport profiles, endpoint descriptions
//! - **Pipeline**: Transport pipeline assembly (TLS, WebSocket, UASC framing)
//! - **Channel**: Hello/Acknowledge negotiation and secure channel bootstrap
//! - **Session**: Event-driven session FSM with create, transfer and close
//! - **Config**: Client configuration and file loading
//! - **Error**: Unified error hierarchy
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use trap_ua_session::{ClientConfig, SessionFsm};
//!
//! let config = ClientConfig::new("opc.tcp://plc-01:4840");
//! let fsm = SessionFsm::from_config(&config, Arc::new(my_services))?;
//!
//! let session = fsm.create_session().await?.await?;
//! println!("session {}", session.session_id());
//!
//! fsm.close_session().await?;
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

// =============================================================================
// Core Modules
// =============================================================================

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

// =============================================================================
// Transport & Channel Modules
// =============================================================================

pub mod channel;
pub mod pipeline;

// =============================================================================
// Session Modules
// =============================================================================

pub mod session;

// =============================================================================
// Re-exports for convenience
// =============================================================================

pub use error::*;
pub use types::*;

pub use config::{
    ChannelConfig, ClientConfig, ClientConfigBuilder, ConfigFormat, ConfigLoader, SessionConfig,
};

pub use pipeline::{
    FrameLimits, PipelineBuilder, PipelineStage, StageKind, StaticTlsContext, TlsContextProvider,
    TransportPipeline, UascFrame, UascFrameCodec, WebPkiTlsContext, WebSocketHandshake,
};

pub use channel::{
    AcknowledgeOnly, ChannelOpener, ChannelStatus, HandshakeSignal, NegotiatedLimits,
    SecureChannel, SecureChannelBootstrap, SecureChannelHandshake,
};

pub use session::{
    CompletionExecutor, Event, Session, SessionFsm, SessionFsmBuilder, SessionFuture,
    SessionListener, SessionPromise, SessionServices, SessionStatsSnapshot, StateKind,
    TokioExecutor,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
