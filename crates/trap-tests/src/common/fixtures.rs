// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Test Fixtures
//!
//! Endpoints and configurations shared by the integration suites.

use std::time::Duration;

use trap_ua_session::{
    ChannelConfig, ClientConfig, EndpointDescription, SessionConfig,
    PROFILE_URI_TCP_UASC_UABINARY, PROFILE_URI_WSS_UAJSON, PROFILE_URI_WSS_UASC_UABINARY,
};

// =============================================================================
// Endpoint Fixtures
// =============================================================================

/// Fixture providing endpoint descriptions.
pub struct EndpointFixtures;

impl EndpointFixtures {
    /// Raw TCP endpoint of a local PLC.
    pub fn tcp() -> EndpointDescription {
        EndpointDescription::tcp("opc.tcp://plc-01.local:4840")
    }

    /// Raw TCP endpoint on a loopback port.
    pub fn loopback(port: u16) -> EndpointDescription {
        EndpointDescription::tcp(format!("opc.tcp://127.0.0.1:{port}"))
    }

    /// Plain WebSocket endpoint on a loopback port.
    pub fn websocket_loopback(port: u16) -> EndpointDescription {
        EndpointDescription::new(
            format!("opc.ws://127.0.0.1:{port}/ua"),
            PROFILE_URI_WSS_UASC_UABINARY,
        )
    }

    /// Secure WebSocket endpoint using the binary encoding.
    pub fn wss_binary() -> EndpointDescription {
        EndpointDescription::new("opc.wss://plc-01.local/ua", PROFILE_URI_WSS_UASC_UABINARY)
    }

    /// Secure WebSocket endpoint using the JSON encoding.
    pub fn wss_json() -> EndpointDescription {
        EndpointDescription::new("opc.wss://plc-01.local/ua", PROFILE_URI_WSS_UAJSON)
    }

    /// Endpoint with a profile nobody understands.
    pub fn unknown_profile() -> EndpointDescription {
        EndpointDescription::new(
            "opc.tcp://plc-01.local:4840",
            "http://example.com/UA-Profile/Transport/unknown",
        )
    }

    /// Raw TCP profile paired with a WebSocket URL.
    pub fn scheme_mismatch() -> EndpointDescription {
        EndpointDescription::new("opc.wss://plc-01.local/ua", PROFILE_URI_TCP_UASC_UABINARY)
    }
}

// =============================================================================
// Config Fixtures
// =============================================================================

/// Fixture providing channel and session settings.
pub struct ConfigFixtures;

impl ConfigFixtures {
    /// Channel settings with short timeouts.
    pub fn fast_channel() -> ChannelConfig {
        ChannelConfig {
            connect_timeout: Duration::from_secs(2),
            handshake_timeout: Duration::from_secs(2),
            ..ChannelConfig::default()
        }
    }

    /// Channel settings with the smallest allowed chunk size.
    pub fn small_chunks() -> ChannelConfig {
        ChannelConfig {
            max_chunk_size: 8192,
            max_message_size: 8192 * 4,
            max_chunk_count: 4,
            ..Self::fast_channel()
        }
    }

    /// Session settings with a short request timeout.
    pub fn fast_session() -> SessionConfig {
        SessionConfig {
            request_timeout: Duration::from_secs(2),
            ..SessionConfig::default()
        }
    }

    /// Client configuration for a loopback server.
    pub fn loopback_client(port: u16) -> ClientConfig {
        ClientConfig {
            endpoint: EndpointFixtures::loopback(port),
            channel: Self::fast_channel(),
            session: Self::fast_session(),
            ..ClientConfig::new(format!("opc.tcp://127.0.0.1:{port}"))
        }
    }
}

// =============================================================================
// Config Documents
// =============================================================================

/// Configuration documents in each supported format.
pub struct ConfigDocuments;

impl ConfigDocuments {
    /// YAML document.
    pub const YAML: &'static str = r#"
application_name: Line 3 Gateway
endpoint:
  endpoint_url: opc.wss://plc-01.local/ua
  transport_profile_uri: http://opcfoundation.org/UA-Profile/Transport/wss-uasc-uabinary
channel:
  max_message_size: 1048576
  max_chunk_size: 16384
  handshake_timeout: 5s
session:
  request_timeout: 3s
"#;

    /// TOML document.
    pub const TOML: &'static str = r#"
application_name = "Line 3 Gateway"

[endpoint]
endpoint_url = "opc.tcp://plc-01.local:4840"

[channel]
max_chunk_count = 16
connect_timeout = "2s"
"#;

    /// JSON document.
    pub const JSON: &'static str = r#"{
  "application_name": "Line 3 Gateway",
  "endpoint": {
    "endpoint_url": "opc.wss://plc-01.local/ua",
    "transport_profile_uri": "http://opcfoundation.org/UA-Profile/Transport/wss-uajson"
  }
}"#;
}
