// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Transport pipeline construction.
//!
//! [`PipelineBuilder::build`] is a pure function: it validates the endpoint,
//! profile and limits and returns an ordered list of stage descriptors. No
//! socket is opened. The descriptors are wired to a real connection once, by
//! [`connector::connect`].
//!
//! # Stage Order
//!
//! ```text
//!  WebSocket profiles                         Raw TCP profile
//!  ──────────────────                         ───────────────
//!  [Tls]                (opc.wss / wss only)
//!  HttpCodec
//!  HttpAggregator(max_message_size)
//!  WebSocketHandshake(uri, V13, subprotocol,
//!                     extensions, headers,
//!                     max_chunk_size)
//!  WebSocketFrameAggregator(max_message_size)
//!  BinaryFrameCodec(limits)                   BinaryFrameCodec(limits)
//! ```
//!
//! The terminal [`PipelineStage::BinaryFrameCodec`] speaks UASC chunks and
//! runs the Hello/Acknowledge exchange once the transport is up.
//!
//! # Examples
//!
//! ```
//! use trap_ua_session::config::ChannelConfig;
//! use trap_ua_session::pipeline::{PipelineBuilder, StageKind};
//! use trap_ua_session::types::TransportProfile;
//!
//! let channel = ChannelConfig { max_message_size: 8192, max_chunk_size: 8192, ..Default::default() };
//! let pipeline = PipelineBuilder::with_default_tls()
//!     .unwrap()
//!     .build("opc.wss://plc.local/ua", TransportProfile::WssUascBinary, &channel)
//!     .unwrap();
//!
//! assert_eq!(pipeline.kinds(), vec![
//!     StageKind::Tls,
//!     StageKind::HttpCodec,
//!     StageKind::HttpAggregator,
//!     StageKind::WebSocketHandshake,
//!     StageKind::WebSocketFrameAggregator,
//!     StageKind::BinaryFrameCodec,
//! ]);
//! ```

pub mod codec;
pub mod connector;
pub mod tls;

use std::fmt;
use std::sync::Arc;

use crate::config::ChannelConfig;
use crate::error::{ConfigurationError, UaResult};
use crate::types::{EndpointUrl, TransportProfile};

pub use codec::{ChunkAssembler, ChunkType, MessageType, UascFrame, UascFrameCodec, UascMessage};
pub use connector::{connect, FrameReader, FrameWriter};
pub use tls::{StaticTlsContext, TlsContextProvider, WebPkiTlsContext};

// =============================================================================
// Stage Descriptors
// =============================================================================

/// WebSocket protocol version requested in the upgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WebSocketVersion {
    /// RFC 6455.
    V13,
}

impl WebSocketVersion {
    /// Returns the `Sec-WebSocket-Version` header value.
    pub const fn header_value(&self) -> &'static str {
        match self {
            Self::V13 => "13",
        }
    }
}

/// Parameters of the WebSocket upgrade stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebSocketHandshake {
    /// `ws://` or `wss://` target URI.
    pub uri: String,
    /// Protocol version.
    pub version: WebSocketVersion,
    /// Subprotocol announced in `Sec-WebSocket-Protocol`.
    pub subprotocol: &'static str,
    /// Whether protocol extensions may be negotiated.
    pub allow_extensions: bool,
    /// Extra request headers.
    pub headers: Vec<(String, String)>,
    /// Largest accepted frame payload.
    pub max_frame_size: usize,
}

/// Limits applied by the terminal frame codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLimits {
    /// Largest chunk, header included.
    pub max_chunk_size: usize,
    /// Largest assembled message.
    pub max_message_size: usize,
    /// Most chunks per message.
    pub max_chunk_count: usize,
}

impl From<&ChannelConfig> for FrameLimits {
    fn from(config: &ChannelConfig) -> Self {
        Self {
            max_chunk_size: config.max_chunk_size as usize,
            max_message_size: config.max_message_size as usize,
            max_chunk_count: config.max_chunk_count as usize,
        }
    }
}

/// One stage of a transport pipeline.
#[derive(Clone)]
pub enum PipelineStage {
    /// TLS termination.
    Tls {
        /// Server name used for SNI and certificate verification.
        server_name: String,
        /// Configuration obtained from the TLS context provider.
        config: Arc<rustls::ClientConfig>,
    },
    /// HTTP request/response codec for the upgrade.
    HttpCodec,
    /// Aggregates the HTTP upgrade response.
    HttpAggregator {
        /// Largest accepted response.
        max_content_length: usize,
    },
    /// WebSocket client handshake.
    WebSocketHandshake(WebSocketHandshake),
    /// Reassembles fragmented WebSocket frames.
    WebSocketFrameAggregator {
        /// Largest reassembled message.
        max_message_size: usize,
    },
    /// UASC chunk codec; terminal stage.
    BinaryFrameCodec(FrameLimits),
}

/// Stage discriminant, for inspection and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    /// [`PipelineStage::Tls`]
    Tls,
    /// [`PipelineStage::HttpCodec`]
    HttpCodec,
    /// [`PipelineStage::HttpAggregator`]
    HttpAggregator,
    /// [`PipelineStage::WebSocketHandshake`]
    WebSocketHandshake,
    /// [`PipelineStage::WebSocketFrameAggregator`]
    WebSocketFrameAggregator,
    /// [`PipelineStage::BinaryFrameCodec`]
    BinaryFrameCodec,
}

impl PipelineStage {
    /// Returns the stage kind.
    pub fn kind(&self) -> StageKind {
        match self {
            Self::Tls { .. } => StageKind::Tls,
            Self::HttpCodec => StageKind::HttpCodec,
            Self::HttpAggregator { .. } => StageKind::HttpAggregator,
            Self::WebSocketHandshake(_) => StageKind::WebSocketHandshake,
            Self::WebSocketFrameAggregator { .. } => StageKind::WebSocketFrameAggregator,
            Self::BinaryFrameCodec(_) => StageKind::BinaryFrameCodec,
        }
    }
}

impl fmt::Debug for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tls { server_name, .. } => {
                f.debug_struct("Tls").field("server_name", server_name).finish()
            }
            Self::HttpCodec => write!(f, "HttpCodec"),
            Self::HttpAggregator { max_content_length } => f
                .debug_struct("HttpAggregator")
                .field("max_content_length", max_content_length)
                .finish(),
            Self::WebSocketHandshake(handshake) => handshake.fmt(f),
            Self::WebSocketFrameAggregator { max_message_size } => f
                .debug_struct("WebSocketFrameAggregator")
                .field("max_message_size", max_message_size)
                .finish(),
            Self::BinaryFrameCodec(limits) => {
                f.debug_tuple("BinaryFrameCodec").field(limits).finish()
            }
        }
    }
}

// =============================================================================
// TransportPipeline
// =============================================================================

/// An ordered, validated list of stages for one endpoint.
#[derive(Debug, Clone)]
pub struct TransportPipeline {
    endpoint: EndpointUrl,
    profile: TransportProfile,
    stages: Vec<PipelineStage>,
}

impl TransportPipeline {
    /// Returns the endpoint.
    pub fn endpoint(&self) -> &EndpointUrl {
        &self.endpoint
    }

    /// Returns the transport profile.
    pub fn profile(&self) -> TransportProfile {
        self.profile
    }

    /// Returns the stages in order.
    pub fn stages(&self) -> &[PipelineStage] {
        &self.stages
    }

    /// Returns the stage kinds in order.
    pub fn kinds(&self) -> Vec<StageKind> {
        self.stages.iter().map(PipelineStage::kind).collect()
    }

    /// Returns the TLS configuration, if the pipeline has a TLS stage.
    pub fn tls(&self) -> Option<(&str, Arc<rustls::ClientConfig>)> {
        self.stages.iter().find_map(|stage| match stage {
            PipelineStage::Tls { server_name, config } => {
                Some((server_name.as_str(), Arc::clone(config)))
            }
            _ => None,
        })
    }

    /// Returns `true` if the pipeline terminates TLS.
    pub fn is_secure(&self) -> bool {
        self.tls().is_some()
    }

    /// Returns the WebSocket handshake parameters, if any.
    pub fn websocket_handshake(&self) -> Option<&WebSocketHandshake> {
        self.stages.iter().find_map(|stage| match stage {
            PipelineStage::WebSocketHandshake(handshake) => Some(handshake),
            _ => None,
        })
    }

    /// Returns the WebSocket message bound, if any.
    pub fn websocket_message_limit(&self) -> Option<usize> {
        self.stages.iter().find_map(|stage| match stage {
            PipelineStage::WebSocketFrameAggregator { max_message_size } => Some(*max_message_size),
            _ => None,
        })
    }

    /// Returns the terminal codec limits.
    pub fn frame_limits(&self) -> FrameLimits {
        self.stages
            .iter()
            .rev()
            .find_map(|stage| match stage {
                PipelineStage::BinaryFrameCodec(limits) => Some(*limits),
                _ => None,
            })
            .unwrap_or(FrameLimits {
                max_chunk_size: 0,
                max_message_size: 0,
                max_chunk_count: 0,
            })
    }
}

// =============================================================================
// PipelineBuilder
// =============================================================================

/// Builds [`TransportPipeline`]s.
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    tls: Arc<dyn TlsContextProvider>,
    headers: Vec<(String, String)>,
    allow_extensions: bool,
}

impl PipelineBuilder {
    /// Creates a builder using the given TLS context provider.
    pub fn new(tls: Arc<dyn TlsContextProvider>) -> Self {
        Self {
            tls,
            headers: Vec::new(),
            allow_extensions: true,
        }
    }

    /// Creates a builder verifying servers against the web PKI roots.
    pub fn with_default_tls() -> UaResult<Self> {
        Ok(Self::new(Arc::new(WebPkiTlsContext::new()?)))
    }

    /// Adds a header to the WebSocket upgrade request.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets whether WebSocket extensions may be negotiated.
    pub fn allow_extensions(mut self, allow: bool) -> Self {
        self.allow_extensions = allow;
        self
    }

    /// Resolves `profile_uri` and builds the pipeline.
    ///
    /// An unknown URI fails before any stage is created.
    pub fn build_for_uri(
        &self,
        endpoint_url: &str,
        profile_uri: &str,
        config: &ChannelConfig,
    ) -> UaResult<TransportPipeline> {
        let profile = TransportProfile::from_uri(profile_uri)?;
        self.build(endpoint_url, profile, config)
    }

    /// Builds the ordered stage list for `endpoint_url` and `profile`.
    pub fn build(
        &self,
        endpoint_url: &str,
        profile: TransportProfile,
        config: &ChannelConfig,
    ) -> UaResult<TransportPipeline> {
        config.validate()?;
        let endpoint = EndpointUrl::parse(endpoint_url)?;
        let scheme = endpoint.scheme();
        if !profile.accepts(scheme) {
            return Err(ConfigurationError::scheme_mismatch(scheme.as_str(), profile.name()).into());
        }

        let limits = FrameLimits::from(config);
        let mut stages = Vec::with_capacity(6);

        if profile.is_websocket() {
            let subprotocol = profile
                .subprotocol()
                .ok_or_else(|| ConfigurationError::unsupported_profile(profile.uri()))?;

            if scheme.is_secure() {
                let config = self.tls.client_config(endpoint.host())?;
                stages.push(PipelineStage::Tls {
                    server_name: endpoint.host().to_string(),
                    config,
                });
            }

            stages.push(PipelineStage::HttpCodec);
            stages.push(PipelineStage::HttpAggregator {
                max_content_length: limits.max_message_size,
            });
            stages.push(PipelineStage::WebSocketHandshake(WebSocketHandshake {
                uri: endpoint.websocket_uri(),
                version: WebSocketVersion::V13,
                subprotocol,
                allow_extensions: self.allow_extensions,
                headers: self.headers.clone(),
                max_frame_size: limits.max_chunk_size,
            }));
            stages.push(PipelineStage::WebSocketFrameAggregator {
                max_message_size: limits.max_message_size,
            });
        }

        stages.push(PipelineStage::BinaryFrameCodec(limits));

        tracing::debug!(
            endpoint = %endpoint,
            profile = %profile,
            stages = ?stages.iter().map(PipelineStage::kind).collect::<Vec<_>>(),
            "Transport pipeline built"
        );

        Ok(TransportPipeline {
            endpoint,
            profile,
            stages,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UaError;
    use crate::types::{PROFILE_URI_WSS_UASC_UABINARY, PROFILE_URI_WSS_UAJSON};

    fn builder() -> PipelineBuilder {
        PipelineBuilder::with_default_tls().unwrap()
    }

    fn small_channel() -> ChannelConfig {
        ChannelConfig {
            max_message_size: 8192,
            max_chunk_size: 8192,
            ..Default::default()
        }
    }

    #[test]
    fn test_secure_websocket_stage_order() {
        let pipeline = builder()
            .build_for_uri("opc.wss://plc.local/ua", PROFILE_URI_WSS_UASC_UABINARY, &small_channel())
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
        assert_eq!(pipeline.tls().unwrap().0, "plc.local");

        let handshake = pipeline.websocket_handshake().unwrap();
        assert_eq!(handshake.uri, "wss://plc.local:443/ua");
        assert_eq!(handshake.subprotocol, "opcua+cp");
        assert_eq!(handshake.version, WebSocketVersion::V13);
        assert!(handshake.allow_extensions);
        assert_eq!(handshake.max_frame_size, 8192);

        assert!(matches!(
            pipeline.stages()[2],
            PipelineStage::HttpAggregator { max_content_length: 8192 }
        ));
        assert_eq!(pipeline.websocket_message_limit(), Some(8192));
    }

    #[test]
    fn test_json_profile_subprotocol() {
        let pipeline = builder()
            .build_for_uri("wss://plc.local/ua", PROFILE_URI_WSS_UAJSON, &ChannelConfig::default())
            .unwrap();
        assert_eq!(pipeline.websocket_handshake().unwrap().subprotocol, "opcua+uajson");
    }

    #[test]
    fn test_plain_websocket_has_no_tls() {
        let pipeline = builder()
            .build("opc.ws://plc.local:8080/ua", TransportProfile::WssUascBinary, &ChannelConfig::default())
            .unwrap();
        assert_eq!(pipeline.kinds()[0], StageKind::HttpCodec);
        assert!(!pipeline.is_secure());
        assert_eq!(pipeline.websocket_handshake().unwrap().uri, "ws://plc.local:8080/ua");
    }

    #[test]
    fn test_tcp_profile_only_frame_codec() {
        let config = ChannelConfig::default();
        let pipeline = builder()
            .build("opc.tcp://localhost:4840", TransportProfile::TcpUascBinary, &config)
            .unwrap();
        assert_eq!(pipeline.kinds(), vec![StageKind::BinaryFrameCodec]);
        assert!(pipeline.websocket_handshake().is_none());
        assert_eq!(pipeline.frame_limits(), FrameLimits::from(&config));
    }

    #[test]
    fn test_unknown_profile_uri_fails_before_stages() {
        let result = builder().build_for_uri(
            "opc.wss://plc.local/ua",
            "http://opcfoundation.org/UA-Profile/Transport/https-uabinary",
            &ChannelConfig::default(),
        );
        assert!(matches!(
            result,
            Err(UaError::Configuration(ConfigurationError::UnsupportedProfile { .. }))
        ));
    }

    #[test]
    fn test_scheme_profile_mismatch() {
        let result = builder().build(
            "opc.tcp://localhost:4840",
            TransportProfile::WssUascBinary,
            &ChannelConfig::default(),
        );
        assert!(matches!(
            result,
            Err(UaError::Configuration(ConfigurationError::SchemeMismatch { .. }))
        ));
    }

    #[test]
    fn test_invalid_limits_rejected() {
        let config = ChannelConfig {
            max_chunk_size: 1024,
            ..Default::default()
        };
        assert!(builder()
            .build("opc.tcp://localhost:4840", TransportProfile::TcpUascBinary, &config)
            .is_err());
    }

    #[test]
    fn test_custom_headers_are_carried() {
        let pipeline = builder()
            .header("Authorization", "Bearer token")
            .allow_extensions(false)
            .build("wss://plc.local/ua", TransportProfile::WssUascBinary, &ChannelConfig::default())
            .unwrap();
        let handshake = pipeline.websocket_handshake().unwrap();
        assert_eq!(handshake.headers, vec![("Authorization".to_string(), "Bearer token".to_string())]);
        assert!(!handshake.allow_extensions);
    }
}
