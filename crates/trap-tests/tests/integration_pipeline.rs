// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Pipeline Integration Tests
//!
//! Transport pipeline assembly and secure channel bootstrap against a
//! loopback UASC server.
//!
//! ## Test Categories
//!
//! - `test_profile_*`: Profile resolution and stage ordering
//! - `test_bootstrap_*`: Hello/Acknowledge over raw TCP
//! - `test_websocket_*`: Upgrade and framing over a loopback WebSocket server
//! - `test_limits_*`: Size enforcement
//! - `test_fsm_*`: Session FSM over a real channel

use std::sync::Arc;
use std::time::Duration;

use trap_tests::common::init_test_logging;
use trap_tests::prelude::*;
use trap_ua_session::{
    ChannelConfig, ChannelOpener, ChannelStatus, ConnectionError, EndpointDescription,
    PipelineBuilder, SecureChannelBootstrap, SessionFsm, SessionServices, StageKind, StateKind,
    StatusCode, TimeoutError, TransportError, UaError, PROFILE_URI_WSS_UAJSON,
    PROFILE_URI_WSS_UASC_UABINARY,
};

fn bootstrap() -> SecureChannelBootstrap {
    SecureChannelBootstrap::new(PipelineBuilder::with_default_tls().unwrap())
}

// =============================================================================
// Profile Tests
// =============================================================================

#[test]
fn test_profile_selects_subprotocol() {
    let builder = PipelineBuilder::with_default_tls().unwrap();
    let config = ChannelConfig::default();

    let binary = builder
        .build_for_uri("opc.wss://plc-01.local/ua", PROFILE_URI_WSS_UASC_UABINARY, &config)
        .unwrap();
    let json = builder
        .build_for_uri("opc.wss://plc-01.local/ua", PROFILE_URI_WSS_UAJSON, &config)
        .unwrap();

    assert_eq!(binary.websocket_handshake().unwrap().subprotocol, "opcua+cp");
    assert_eq!(json.websocket_handshake().unwrap().subprotocol, "opcua+uajson");
}

#[test]
fn test_profile_secure_websocket_stage_order() {
    let endpoint = EndpointFixtures::wss_binary();
    let pipeline = PipelineBuilder::with_default_tls()
        .unwrap()
        .build_for_uri(
            &endpoint.endpoint_url,
            &endpoint.transport_profile_uri,
            &ConfigFixtures::small_chunks(),
        )
        .unwrap();

    assert_eq!(
        pipeline.kinds(),
        vec![
            StageKind::Tls,
            StageKind::HttpCodec,
            StageKind::HttpAggregator,
            StageKind::WebSocketHandshake,
            StageKind::WebSocketFrameAggregator,
            StageKind::BinaryFrameCodec,
        ]
    );
    assert!(pipeline.is_secure());
    assert_eq!(pipeline.websocket_message_limit(), Some(8192 * 4));
    assert_eq!(pipeline.frame_limits().max_chunk_size, 8192);
}

#[test]
fn test_profile_raw_tcp_has_only_frame_codec() {
    let endpoint = EndpointFixtures::tcp();
    let pipeline = PipelineBuilder::with_default_tls()
        .unwrap()
        .build_for_uri(
            &endpoint.endpoint_url,
            &endpoint.transport_profile_uri,
            &ChannelConfig::default(),
        )
        .unwrap();

    assert_eq!(pipeline.kinds(), vec![StageKind::BinaryFrameCodec]);
    assert!(pipeline.websocket_handshake().is_none());
    assert!(!pipeline.is_secure());
}

#[test]
fn test_profile_unknown_uri_is_configuration_error() {
    let endpoint = EndpointFixtures::unknown_profile();
    let err = PipelineBuilder::with_default_tls()
        .unwrap()
        .build_for_uri(
            &endpoint.endpoint_url,
            &endpoint.transport_profile_uri,
            &ChannelConfig::default(),
        )
        .unwrap_err();
    assert_unsupported_profile(&err);
}

#[tokio::test]
async fn test_profile_errors_raised_before_connecting() {
    let config = ConfigFixtures::fast_channel();
    for endpoint in [
        EndpointFixtures::unknown_profile(),
        EndpointFixtures::scheme_mismatch(),
    ] {
        let err = bootstrap().open(&endpoint, &config).await.unwrap_err();
        assert_configuration_error(&err);
    }
}

// =============================================================================
// Bootstrap Tests
// =============================================================================

#[tokio::test]
async fn test_bootstrap_hello_acknowledge() {
    init_test_logging();
    let server = LoopbackServer::start(LoopbackServerBuilder::new()).await;
    let endpoint = server.endpoint();

    let channel = bootstrap()
        .open(&endpoint, &ConfigFixtures::fast_channel())
        .await
        .unwrap();

    assert!(channel.is_open());
    assert!(!channel.is_secure());
    assert_eq!(channel.endpoint_url(), endpoint.endpoint_url);

    let hellos = server.hellos();
    assert_eq!(hellos.len(), 1);
    assert_eq!(hellos[0].endpoint_url, endpoint.endpoint_url);
    assert_eq!(hellos[0].receive_buffer_size, 65_535);

    let limits = channel.limits();
    assert_eq!(limits.receive_chunk_size, 65_535);
    assert_eq!(limits.send_chunk_size, 65_535);
    assert_eq!(limits.max_message_size, ChannelConfig::default().max_message_size);

    channel.close().await;
    assert_eq!(channel.status(), ChannelStatus::Closed);
}

#[tokio::test]
async fn test_bootstrap_negotiates_smaller_buffers() {
    let server = LoopbackServer::start(LoopbackServerBuilder::new().buffers(16_384, 8_192)).await;

    let channel = bootstrap()
        .open(&server.endpoint(), &ConfigFixtures::fast_channel())
        .await
        .unwrap();

    let limits = channel.limits();
    assert_eq!(limits.receive_chunk_size, 8_192);
    assert_eq!(limits.send_chunk_size, 16_384);
}

#[tokio::test]
async fn test_bootstrap_server_error_reply() {
    let server = LoopbackServer::start(
        LoopbackServerBuilder::new()
            .error(StatusCode::BAD_TCP_ENDPOINT_URL_INVALID, "unknown endpoint"),
    )
    .await;

    let err = bootstrap()
        .open(&server.endpoint(), &ConfigFixtures::fast_channel())
        .await
        .unwrap_err();

    match err {
        UaError::Connection(ConnectionError::ServerError { status, reason }) => {
            assert_eq!(status, StatusCode::BAD_TCP_ENDPOINT_URL_INVALID);
            assert_eq!(reason, "unknown endpoint");
        }
        other => panic!("Expected a server error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_bootstrap_server_closes_without_reply() {
    let server = LoopbackServer::start(LoopbackServerBuilder::new().close()).await;

    let err = bootstrap()
        .open(&server.endpoint(), &ConfigFixtures::fast_channel())
        .await
        .unwrap_err();
    assert!(err.is_connection_error(), "unexpected error {err:?}");
}

#[tokio::test]
async fn test_bootstrap_rejects_server_send_buffer_above_receive_buffer() {
    let server = LoopbackServer::start(LoopbackServerBuilder::new().buffers(65_535, 131_072)).await;

    let err = bootstrap()
        .open(&server.endpoint(), &ConfigFixtures::fast_channel())
        .await
        .unwrap_err();
    assert!(
        matches!(err, UaError::Transport(TransportError::Negotiation { .. })),
        "unexpected error {err:?}"
    );
}

#[tokio::test]
async fn test_bootstrap_handshake_timeout() {
    let server = LoopbackServer::start(LoopbackServerBuilder::new().silent()).await;
    let config = ChannelConfig {
        handshake_timeout: Duration::from_millis(200),
        ..ConfigFixtures::fast_channel()
    };

    let started = tokio::time::Instant::now();
    let err = within("bootstrap gave up", bootstrap().open(&server.endpoint(), &config))
        .await
        .unwrap_err();

    assert!(
        matches!(err, UaError::Timeout(TimeoutError::Handshake { .. })),
        "unexpected error {err:?}"
    );
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(server.connection_count(), 1);
}

#[tokio::test]
async fn test_bootstrap_connection_refused() {
    let port = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };

    let err = bootstrap()
        .open(&EndpointFixtures::loopback(port), &ConfigFixtures::fast_channel())
        .await
        .unwrap_err();
    assert!(err.is_connection_error(), "unexpected error {err:?}");
}

#[tokio::test]
async fn test_bootstrap_notices_server_hang_up_without_reads() {
    let server = LoopbackServer::start(LoopbackServerBuilder::new().then_hang_up()).await;

    let channel = bootstrap()
        .open(&server.endpoint(), &ConfigFixtures::fast_channel())
        .await
        .unwrap();

    let status = within("hang-up noticed", channel.wait_inactive()).await;
    assert_eq!(status, ChannelStatus::Lost);
    assert!(!channel.is_open());
}

// =============================================================================
// WebSocket Tests
// =============================================================================

#[tokio::test]
async fn test_websocket_hello_acknowledge() {
    init_test_logging();
    let server = LoopbackServer::start(LoopbackServerBuilder::new().websocket()).await;
    let endpoint = server.endpoint();

    let channel = bootstrap()
        .open(&endpoint, &ConfigFixtures::fast_channel())
        .await
        .unwrap();

    assert!(channel.is_open());
    assert!(!channel.is_secure());
    assert_eq!(server.subprotocols(), vec!["opcua+cp".to_string()]);
    let hellos = server.hellos();
    assert_eq!(hellos.len(), 1);
    assert_eq!(hellos[0].endpoint_url, endpoint.endpoint_url);

    channel.close().await;
    assert_eq!(channel.status(), ChannelStatus::Closed);
}

#[tokio::test]
async fn test_websocket_upgrade_rejected() {
    let server = LoopbackServer::start(LoopbackServerBuilder::new().reject_upgrade(403)).await;

    let err = bootstrap()
        .open(&server.endpoint(), &ConfigFixtures::fast_channel())
        .await
        .unwrap_err();

    match err {
        UaError::Transport(TransportError::UpgradeRejected { status, .. }) => {
            assert_eq!(status, Some(403));
        }
        other => panic!("Expected a rejected upgrade, got {other:?}"),
    }
    assert!(server.hellos().is_empty());
}

#[tokio::test]
async fn test_websocket_text_message_rejected() {
    let server = LoopbackServer::start(
        LoopbackServerBuilder::new()
            .websocket()
            .then_send_text("{\"not\":\"binary\"}"),
    )
    .await;

    let channel = bootstrap()
        .open(&server.endpoint(), &ConfigFixtures::fast_channel())
        .await
        .unwrap();

    let err = within("text message rejected", channel.recv_frame())
        .await
        .unwrap_err();
    assert!(
        matches!(err, UaError::Transport(TransportError::InvalidFrame { .. })),
        "unexpected error {err:?}"
    );
}

#[tokio::test]
async fn test_websocket_message_above_limit_rejected() {
    let server = LoopbackServer::start(
        LoopbackServerBuilder::new()
            .websocket()
            .then_send_large(200_000),
    )
    .await;

    let channel = bootstrap()
        .open(&server.endpoint(), &ConfigFixtures::fast_channel())
        .await
        .unwrap();

    let err = within("large message rejected", channel.recv_frame())
        .await
        .unwrap_err();
    assert!(
        matches!(
            err,
            UaError::Transport(
                TransportError::MessageTooLarge { .. } | TransportError::FrameTooLarge { .. }
            )
        ),
        "unexpected error {err:?}"
    );
}

#[tokio::test]
async fn test_websocket_notices_server_close() {
    let server =
        LoopbackServer::start(LoopbackServerBuilder::new().websocket().then_hang_up()).await;

    let channel = bootstrap()
        .open(&server.endpoint(), &ConfigFixtures::fast_channel())
        .await
        .unwrap();

    let status = within("close noticed", channel.wait_inactive()).await;
    assert_eq!(status, ChannelStatus::Lost);
}

// =============================================================================
// Limit Tests
// =============================================================================

#[tokio::test]
async fn test_limits_oversized_acknowledge_rejected() {
    let server = LoopbackServer::start(LoopbackServerBuilder::new().oversized_reply(1_000_000)).await;

    let err = bootstrap()
        .open(&server.endpoint(), &ConfigFixtures::fast_channel())
        .await
        .unwrap_err();
    assert!(
        matches!(err, UaError::Transport(TransportError::FrameTooLarge { .. })),
        "unexpected error {err:?}"
    );
}

#[tokio::test]
async fn test_limits_oversized_chunk_after_acknowledge_rejected() {
    let server =
        LoopbackServer::start(LoopbackServerBuilder::new().then_send_oversized(200_000)).await;

    let channel = bootstrap()
        .open(&server.endpoint(), &ConfigFixtures::fast_channel())
        .await
        .unwrap();

    let err = within("oversized chunk rejected", channel.recv_frame())
        .await
        .unwrap_err();
    assert!(
        matches!(err, UaError::Transport(TransportError::FrameTooLarge { .. })),
        "unexpected error {err:?}"
    );
}

#[tokio::test]
async fn test_limits_outgoing_chunk_above_negotiated_size_rejected() {
    let server = LoopbackServer::start(LoopbackServerBuilder::new().buffers(8_192, 8_192)).await;

    let channel = bootstrap()
        .open(&server.endpoint(), &ConfigFixtures::fast_channel())
        .await
        .unwrap();

    let frame = trap_ua_session::UascFrame::final_chunk(
        trap_ua_session::pipeline::MessageType::Message,
        vec![0u8; 10_000],
    );
    let err = channel.send_frame(frame).await.unwrap_err();
    assert!(
        matches!(err, UaError::Transport(TransportError::FrameTooLarge { .. })),
        "unexpected error {err:?}"
    );
    // a rejected frame does not take the channel down
    assert!(channel.is_open());
}

// =============================================================================
// FSM Tests
// =============================================================================

#[tokio::test]
async fn test_fsm_creates_session_over_loopback() {
    let server = LoopbackServer::start(LoopbackServerBuilder::new()).await;
    let services = Arc::new(MockSessionServices::new());
    let endpoint: EndpointDescription = server.endpoint();

    let fsm = SessionFsm::builder(
        endpoint,
        Arc::new(bootstrap()) as Arc<dyn ChannelOpener>,
        Arc::clone(&services) as Arc<dyn SessionServices>,
    )
    .channel_config(ConfigFixtures::fast_channel())
    .session_config(ConfigFixtures::fast_session())
    .build()
    .unwrap();

    let session = within("session created", fsm.create_session().await.unwrap())
        .await
        .unwrap();
    let channel = Arc::clone(session.channel().unwrap());
    assert!(channel.is_open());
    assert_eq!(server.hellos().len(), 1);

    within("session closed", fsm.close_session()).await.unwrap();
    assert_eq!(fsm.state(), StateKind::Inactive);
    assert_eq!(channel.status(), ChannelStatus::Closed);
    assert_eq!(services.close_count(), 1);
    fsm.shutdown().await;
}

#[tokio::test]
async fn test_fsm_from_config_reports_open_failure() {
    let port = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let config = ConfigFixtures::loopback_client(port);

    let fsm = SessionFsm::from_config(&config, Arc::new(MockSessionServices::new())).unwrap();
    let err = within("creation failed", fsm.create_session().await.unwrap())
        .await
        .unwrap_err();
    assert!(err.is_connection_error(), "unexpected error {err:?}");
    assert_reaches_state(&fsm, StateKind::Inactive).await;
}
