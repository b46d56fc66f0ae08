// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Client configuration.
//!
//! ```text
//! ClientConfig
//! ├── application_name / application_uri
//! ├── endpoint: EndpointDescription   (URL, transport profile, security)
//! ├── channel:  ChannelConfig         (message/chunk limits, timeouts)
//! └── session:  SessionConfig         (session name, timeouts)
//! ```
//!
//! All limits in [`ChannelConfig`] are hard upper bounds: frames or messages
//! exceeding them are rejected, never truncated.
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//! use trap_ua_session::config::ClientConfig;
//! use trap_ua_session::types::PROFILE_URI_WSS_UASC_UABINARY;
//!
//! let config = ClientConfig::builder()
//!     .endpoint_url("opc.wss://plc.local:443/ua")
//!     .transport_profile_uri(PROFILE_URI_WSS_UASC_UABINARY)
//!     .max_message_size(8192)
//!     .max_chunk_size(8192)
//!     .handshake_timeout(Duration::from_secs(5))
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(config.channel.max_message_size, 8192);
//! ```

pub mod loader;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationError, UaError, UaResult};
use crate::types::{EndpointDescription, SecurityMode, SecurityPolicy};

pub use loader::{ConfigFormat, ConfigLoader, ConfigLoaderBuilder};

/// Smallest chunk size a UASC peer may announce.
pub const MIN_CHUNK_SIZE: u32 = 8192;

// =============================================================================
// ChannelConfig
// =============================================================================

/// Secure channel limits and timeouts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// UASC protocol version sent in the Hello message.
    #[serde(default)]
    pub protocol_version: u32,

    /// Maximum size of an assembled message in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: u32,

    /// Maximum size of a single chunk in bytes. Also used as the receive and
    /// send buffer size announced in the Hello message.
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: u32,

    /// Maximum number of chunks per message.
    #[serde(default = "default_max_chunk_count")]
    pub max_chunk_count: u32,

    /// TCP connect timeout.
    #[serde(default = "default_connect_timeout")]
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Deadline for the whole channel bootstrap, from connect to acknowledge.
    #[serde(default = "default_handshake_timeout")]
    #[serde(with = "humantime_serde")]
    pub handshake_timeout: Duration,
}

fn default_max_message_size() -> u32 {
    2 * 1024 * 1024
}

fn default_max_chunk_size() -> u32 {
    65_535
}

fn default_max_chunk_count() -> u32 {
    (default_max_message_size() / default_max_chunk_size()) * 2
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_handshake_timeout() -> Duration {
    Duration::from_secs(10)
}

impl ChannelConfig {
    /// Validates the limits.
    pub fn validate(&self) -> UaResult<()> {
        if self.max_chunk_size < MIN_CHUNK_SIZE {
            return Err(ConfigurationError::invalid_limit(
                "max_chunk_size",
                format!("must be at least {} bytes", MIN_CHUNK_SIZE),
            )
            .into());
        }

        if self.max_message_size == 0 {
            return Err(
                ConfigurationError::invalid_limit("max_message_size", "must be greater than 0")
                    .into(),
            );
        }

        if self.max_message_size < self.max_chunk_size {
            return Err(ConfigurationError::invalid_limit(
                "max_message_size",
                "must not be smaller than max_chunk_size",
            )
            .into());
        }

        if self.max_chunk_count == 0 {
            return Err(
                ConfigurationError::invalid_limit("max_chunk_count", "must be greater than 0")
                    .into(),
            );
        }

        if self.connect_timeout.is_zero() || self.handshake_timeout.is_zero() {
            return Err(ConfigurationError::invalid_value(
                "timeout",
                "connect and handshake timeouts must be greater than 0",
            )
            .into());
        }

        Ok(())
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            protocol_version: 0,
            max_message_size: default_max_message_size(),
            max_chunk_size: default_max_chunk_size(),
            max_chunk_count: default_max_chunk_count(),
            connect_timeout: default_connect_timeout(),
            handshake_timeout: default_handshake_timeout(),
        }
    }
}

// =============================================================================
// SessionConfig
// =============================================================================

/// Session settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Session name sent to the server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_name: Option<String>,

    /// Requested session timeout.
    #[serde(default = "default_session_timeout")]
    #[serde(with = "humantime_serde")]
    pub session_timeout: Duration,

    /// Timeout for create, transfer and close service calls.
    #[serde(default = "default_request_timeout")]
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

fn default_session_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(10)
}

impl SessionConfig {
    /// Validates the settings.
    pub fn validate(&self) -> UaResult<()> {
        if self.session_timeout.is_zero() {
            return Err(ConfigurationError::invalid_value(
                "session_timeout",
                "must be greater than 0",
            )
            .into());
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigurationError::invalid_value(
                "request_timeout",
                "must be greater than 0",
            )
            .into());
        }
        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_name: None,
            session_timeout: default_session_timeout(),
            request_timeout: default_request_timeout(),
        }
    }
}

// =============================================================================
// ClientConfig
// =============================================================================

/// Complete client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Application name.
    #[serde(default = "default_application_name")]
    pub application_name: String,

    /// Application URI.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_uri: Option<String>,

    /// Endpoint to connect to.
    pub endpoint: EndpointDescription,

    /// Channel limits and timeouts.
    #[serde(default)]
    pub channel: ChannelConfig,

    /// Session settings.
    #[serde(default)]
    pub session: SessionConfig,
}

fn default_application_name() -> String {
    "TRAP OPC UA Client".to_string()
}

impl ClientConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Creates a configuration for a raw TCP endpoint with default settings.
    pub fn new(endpoint_url: impl Into<String>) -> Self {
        Self {
            application_name: default_application_name(),
            application_uri: None,
            endpoint: EndpointDescription::tcp(endpoint_url),
            channel: ChannelConfig::default(),
            session: SessionConfig::default(),
        }
    }

    /// Validates this configuration.
    pub fn validate(&self) -> UaResult<()> {
        self.endpoint.validate()?;
        self.channel.validate()?;
        self.session.validate()?;
        Ok(())
    }

    /// Returns the effective application URI.
    pub fn effective_application_uri(&self) -> String {
        self.application_uri
            .clone()
            .unwrap_or_else(|| format!("urn:trap:opcua:{}", self.application_name.replace(' ', "")))
    }

    /// Returns the effective session name.
    pub fn effective_session_name(&self) -> String {
        self.session
            .session_name
            .clone()
            .unwrap_or_else(|| format!("{} Session", self.application_name))
    }
}

// =============================================================================
// ClientConfigBuilder
// =============================================================================

/// Builder for `ClientConfig`.
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    endpoint_url: Option<String>,
    transport_profile_uri: Option<String>,
    security_mode: Option<SecurityMode>,
    security_policy: Option<SecurityPolicy>,
    application_name: Option<String>,
    application_uri: Option<String>,
    channel: ChannelConfig,
    session: SessionConfig,
}

impl ClientConfigBuilder {
    /// Sets the endpoint URL.
    pub fn endpoint_url(mut self, url: impl Into<String>) -> Self {
        self.endpoint_url = Some(url.into());
        self
    }

    /// Sets the advertised transport profile URI.
    pub fn transport_profile_uri(mut self, uri: impl Into<String>) -> Self {
        self.transport_profile_uri = Some(uri.into());
        self
    }

    /// Sets the full endpoint description.
    pub fn endpoint(mut self, endpoint: EndpointDescription) -> Self {
        self.endpoint_url = Some(endpoint.endpoint_url);
        self.transport_profile_uri = Some(endpoint.transport_profile_uri);
        self.security_mode = Some(endpoint.security_mode);
        self.security_policy = Some(endpoint.security_policy);
        self
    }

    /// Sets the security mode.
    pub fn security_mode(mut self, mode: SecurityMode) -> Self {
        self.security_mode = Some(mode);
        self
    }

    /// Sets the security policy.
    pub fn security_policy(mut self, policy: SecurityPolicy) -> Self {
        self.security_policy = Some(policy);
        self
    }

    /// Sets the application name.
    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = Some(name.into());
        self
    }

    /// Sets the application URI.
    pub fn application_uri(mut self, uri: impl Into<String>) -> Self {
        self.application_uri = Some(uri.into());
        self
    }

    /// Sets the maximum message size.
    pub fn max_message_size(mut self, size: u32) -> Self {
        self.channel.max_message_size = size;
        self
    }

    /// Sets the maximum chunk size.
    pub fn max_chunk_size(mut self, size: u32) -> Self {
        self.channel.max_chunk_size = size;
        self
    }

    /// Sets the maximum chunk count.
    pub fn max_chunk_count(mut self, count: u32) -> Self {
        self.channel.max_chunk_count = count;
        self
    }

    /// Sets the TCP connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.channel.connect_timeout = timeout;
        self
    }

    /// Sets the channel handshake timeout.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.channel.handshake_timeout = timeout;
        self
    }

    /// Replaces all channel settings.
    pub fn channel(mut self, channel: ChannelConfig) -> Self {
        self.channel = channel;
        self
    }

    /// Sets the session name.
    pub fn session_name(mut self, name: impl Into<String>) -> Self {
        self.session.session_name = Some(name.into());
        self
    }

    /// Sets the session timeout.
    pub fn session_timeout(mut self, timeout: Duration) -> Self {
        self.session.session_timeout = timeout;
        self
    }

    /// Sets the service request timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.session.request_timeout = timeout;
        self
    }

    /// Builds and validates the configuration.
    pub fn build(self) -> Result<ClientConfig, UaError> {
        let endpoint_url = self
            .endpoint_url
            .ok_or_else(|| UaError::configuration(ConfigurationError::missing_field("endpoint_url")))?;

        let mut endpoint = EndpointDescription::tcp(endpoint_url);
        if let Some(uri) = self.transport_profile_uri {
            endpoint.transport_profile_uri = uri;
        }
        endpoint.security_mode = self.security_mode.unwrap_or_default();
        endpoint.security_policy = self.security_policy.unwrap_or_default();

        let config = ClientConfig {
            application_name: self.application_name.unwrap_or_else(default_application_name),
            application_uri: self.application_uri,
            endpoint,
            channel: self.channel,
            session: self.session,
        };

        config.validate()?;
        Ok(config)
    }
}

// =============================================================================
// humantime_serde helper
// =============================================================================

mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        humantime::format_duration(*duration)
            .to_string()
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PROFILE_URI_WSS_UASC_UABINARY, PROFILE_URI_WSS_UAJSON};

    #[test]
    fn test_channel_defaults() {
        let config = ChannelConfig::default();
        assert_eq!(config.max_message_size, 2_097_152);
        assert_eq!(config.max_chunk_size, 65_535);
        assert_eq!(config.max_chunk_count, 64);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_minimal() {
        let config = ClientConfig::builder()
            .endpoint_url("opc.tcp://localhost:4840")
            .build()
            .unwrap();

        assert_eq!(config.endpoint.endpoint_url, "opc.tcp://localhost:4840");
        assert_eq!(config.application_name, "TRAP OPC UA Client");
        assert_eq!(config.effective_application_uri(), "urn:trap:opcua:TRAPOPCUAClient");
        assert_eq!(config.effective_session_name(), "TRAP OPC UA Client Session");
    }

    #[test]
    fn test_builder_missing_endpoint() {
        let result = ClientConfig::builder().build();
        assert!(matches!(
            result,
            Err(UaError::Configuration(ConfigurationError::MissingField { .. }))
        ));
    }

    #[test]
    fn test_builder_rejects_unknown_profile() {
        let result = ClientConfig::builder()
            .endpoint_url("opc.wss://localhost/ua")
            .transport_profile_uri("http://example.com/not-a-profile")
            .build();
        assert!(matches!(
            result,
            Err(UaError::Configuration(ConfigurationError::UnsupportedProfile { .. }))
        ));
    }

    #[test]
    fn test_builder_websocket_endpoint() {
        let config = ClientConfig::builder()
            .endpoint_url("opc.wss://localhost/ua")
            .transport_profile_uri(PROFILE_URI_WSS_UAJSON)
            .build()
            .unwrap();
        assert!(config.endpoint.transport_profile().unwrap().is_websocket());
    }

    #[test]
    fn test_chunk_size_lower_bound() {
        let result = ClientConfig::builder()
            .endpoint_url("opc.tcp://localhost:4840")
            .max_chunk_size(1024)
            .build();
        assert!(matches!(
            result,
            Err(UaError::Configuration(ConfigurationError::InvalidLimit { .. }))
        ));
    }

    #[test]
    fn test_message_smaller_than_chunk_rejected() {
        let result = ClientConfig::builder()
            .endpoint_url("opc.wss://localhost/ua")
            .transport_profile_uri(PROFILE_URI_WSS_UASC_UABINARY)
            .max_message_size(8192)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_security_mode_policy_must_agree() {
        let result = ClientConfig::builder()
            .endpoint_url("opc.tcp://localhost:4840")
            .security_mode(SecurityMode::Sign)
            .build();
        assert!(result.is_err());

        let result = ClientConfig::builder()
            .endpoint_url("opc.tcp://localhost:4840")
            .security_mode(SecurityMode::Sign)
            .security_policy(SecurityPolicy::Basic256Sha256)
            .build();
        assert!(result.is_ok());
    }

    #[test]
    fn test_serde_humantime() {
        let config = ClientConfig::new("opc.tcp://localhost:4840");
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"10s\""));

        let parsed: ClientConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }
}
