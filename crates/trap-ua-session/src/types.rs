// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Endpoint and transport types.
//!
//! - **TransportProfile**: the three supported transport profiles and their
//!   advertised URIs
//! - **UrlScheme / EndpointUrl**: parsed endpoint URLs with default ports
//! - **SecurityMode/Policy**: message security settings advertised by an
//!   endpoint
//! - **EndpointDescription**: the endpoint a channel is opened against
//!
//! # Examples
//!
//! ```
//! use trap_ua_session::types::{EndpointUrl, TransportProfile};
//!
//! let profile = TransportProfile::from_uri(
//!     "http://opcfoundation.org/UA-Profile/Transport/wss-uasc-uabinary",
//! ).unwrap();
//! assert_eq!(profile.subprotocol(), Some("opcua+cp"));
//!
//! let url = EndpointUrl::parse("opc.wss://plc.local/ua").unwrap();
//! assert_eq!(url.port(), 443);
//! assert!(url.scheme().is_secure());
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ConfigurationError, UaError, UaResult};

// =============================================================================
// TransportProfile
// =============================================================================

/// URI of the raw TCP binary profile.
pub const PROFILE_URI_TCP_UASC_UABINARY: &str =
    "http://opcfoundation.org/UA-Profile/Transport/uatcp-uasc-uabinary";

/// URI of the WebSocket binary profile.
pub const PROFILE_URI_WSS_UASC_UABINARY: &str =
    "http://opcfoundation.org/UA-Profile/Transport/wss-uasc-uabinary";

/// URI of the WebSocket JSON profile.
pub const PROFILE_URI_WSS_UAJSON: &str =
    "http://opcfoundation.org/UA-Profile/Transport/wss-uajson";

/// Transport profile selecting the framing stages of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransportProfile {
    /// UASC binary messages directly over TCP.
    #[default]
    TcpUascBinary,

    /// UASC binary messages inside WebSocket binary frames.
    WssUascBinary,

    /// UA JSON messages inside WebSocket frames.
    WssUaJson,
}

impl TransportProfile {
    /// All supported profiles.
    pub const ALL: [TransportProfile; 3] =
        [Self::TcpUascBinary, Self::WssUascBinary, Self::WssUaJson];

    /// Returns the advertised profile URI.
    pub const fn uri(&self) -> &'static str {
        match self {
            Self::TcpUascBinary => PROFILE_URI_TCP_UASC_UABINARY,
            Self::WssUascBinary => PROFILE_URI_WSS_UASC_UABINARY,
            Self::WssUaJson => PROFILE_URI_WSS_UAJSON,
        }
    }

    /// Resolves a profile from its advertised URI.
    ///
    /// Unknown URIs are a configuration error.
    pub fn from_uri(uri: &str) -> UaResult<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.uri() == uri.trim())
            .ok_or_else(|| UaError::unsupported_profile(uri))
    }

    /// Returns the WebSocket subprotocol for this profile.
    pub const fn subprotocol(&self) -> Option<&'static str> {
        match self {
            Self::TcpUascBinary => None,
            Self::WssUascBinary => Some("opcua+cp"),
            Self::WssUaJson => Some("opcua+uajson"),
        }
    }

    /// Returns `true` if this profile is carried over WebSocket.
    #[inline]
    pub const fn is_websocket(&self) -> bool {
        matches!(self, Self::WssUascBinary | Self::WssUaJson)
    }

    /// Returns `true` if `scheme` can carry this profile.
    pub fn accepts(&self, scheme: UrlScheme) -> bool {
        self.is_websocket() == scheme.is_websocket()
    }

    /// Returns the display name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::TcpUascBinary => "TCP_UASC_UABINARY",
            Self::WssUascBinary => "WSS_UASC_UABINARY",
            Self::WssUaJson => "WSS_UAJSON",
        }
    }
}

impl fmt::Display for TransportProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for TransportProfile {
    type Err = UaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.contains("://") {
            return Self::from_uri(s);
        }
        match s.to_lowercase().replace(['-', '_'], "").as_str() {
            "tcpuascuabinary" | "uatcpuascuabinary" | "tcp" => Ok(Self::TcpUascBinary),
            "wssuascuabinary" | "wss" => Ok(Self::WssUascBinary),
            "wssuajson" | "json" => Ok(Self::WssUaJson),
            _ => Err(UaError::unsupported_profile(s)),
        }
    }
}

// =============================================================================
// UrlScheme
// =============================================================================

/// Endpoint URL scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UrlScheme {
    /// `opc.tcp`
    OpcTcp,
    /// `opc.ws`
    OpcWs,
    /// `opc.wss`
    OpcWss,
    /// `ws`
    Ws,
    /// `wss`
    Wss,
}

impl UrlScheme {
    /// Parses a scheme, ignoring case.
    pub fn parse(scheme: &str) -> Option<Self> {
        match scheme.to_ascii_lowercase().as_str() {
            "opc.tcp" => Some(Self::OpcTcp),
            "opc.ws" => Some(Self::OpcWs),
            "opc.wss" => Some(Self::OpcWss),
            "ws" => Some(Self::Ws),
            "wss" => Some(Self::Wss),
            _ => None,
        }
    }

    /// Returns the scheme string.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::OpcTcp => "opc.tcp",
            Self::OpcWs => "opc.ws",
            Self::OpcWss => "opc.wss",
            Self::Ws => "ws",
            Self::Wss => "wss",
        }
    }

    /// Returns `true` if the transport must be wrapped in TLS.
    #[inline]
    pub const fn is_secure(&self) -> bool {
        matches!(self, Self::OpcWss | Self::Wss)
    }

    /// Returns `true` for WebSocket schemes.
    #[inline]
    pub const fn is_websocket(&self) -> bool {
        !matches!(self, Self::OpcTcp)
    }

    /// Returns the port used when the URL has none.
    pub const fn default_port(&self) -> u16 {
        match self {
            Self::OpcTcp => 4840,
            Self::OpcWs | Self::Ws => 80,
            Self::OpcWss | Self::Wss => 443,
        }
    }

    /// Returns the scheme used on the wire for the HTTP upgrade.
    pub const fn websocket_scheme(&self) -> &'static str {
        if self.is_secure() {
            "wss"
        } else {
            "ws"
        }
    }
}

impl fmt::Display for UrlScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// EndpointUrl
// =============================================================================

/// A parsed endpoint URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointUrl {
    raw: String,
    scheme: UrlScheme,
    host: String,
    port: u16,
    path: String,
}

impl EndpointUrl {
    /// Parses an endpoint URL such as `opc.tcp://host:4840/path`.
    pub fn parse(raw: &str) -> UaResult<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ConfigurationError::missing_field("endpoint_url").into());
        }

        let url = Url::parse(raw).map_err(|e| UaError::invalid_endpoint(raw, e.to_string()))?;

        let scheme = UrlScheme::parse(url.scheme()).ok_or_else(|| {
            UaError::invalid_endpoint(raw, format!("unsupported scheme '{}'", url.scheme()))
        })?;

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| UaError::invalid_endpoint(raw, "missing host"))?
            .to_string();

        let port = url.port().unwrap_or(scheme.default_port());
        let path = match url.path() {
            "" => "/".to_string(),
            p => p.to_string(),
        };

        Ok(Self {
            raw: raw.to_string(),
            scheme,
            host,
            port,
            path,
        })
    }

    /// Returns the URL as given.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Returns the scheme.
    pub fn scheme(&self) -> UrlScheme {
        self.scheme
    }

    /// Returns the host.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the port, falling back to the scheme default.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns the path, `/` if empty.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns `host:port` for socket connection.
    pub fn authority(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Returns the `ws://` / `wss://` URI used for the HTTP upgrade.
    pub fn websocket_uri(&self) -> String {
        format!(
            "{}://{}{}",
            self.scheme.websocket_scheme(),
            self.authority(),
            self.path
        )
    }
}

impl fmt::Display for EndpointUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl FromStr for EndpointUrl {
    type Err = UaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// =============================================================================
// SecurityMode
// =============================================================================

/// OPC UA message security mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SecurityMode {
    /// No security (messages are neither signed nor encrypted).
    #[default]
    None,

    /// Messages are signed but not encrypted.
    Sign,

    /// Messages are signed and encrypted.
    SignAndEncrypt,
}

impl SecurityMode {
    /// Returns the OPC UA security mode value.
    pub const fn value(&self) -> u32 {
        match self {
            Self::None => 1,
            Self::Sign => 2,
            Self::SignAndEncrypt => 3,
        }
    }

    /// Returns `true` if this mode provides no security.
    #[inline]
    pub const fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Returns the display name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Sign => "Sign",
            Self::SignAndEncrypt => "SignAndEncrypt",
        }
    }
}

impl fmt::Display for SecurityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// =============================================================================
// SecurityPolicy
// =============================================================================

/// OPC UA security policy advertised by an endpoint.
///
/// The policy is carried through to the secure channel handshake; this crate
/// does not implement the cryptography itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SecurityPolicy {
    /// No security policy.
    #[default]
    None,
    /// Basic256Sha256.
    Basic256Sha256,
    /// Aes128Sha256RsaOaep.
    Aes128Sha256RsaOaep,
    /// Aes256Sha256RsaPss.
    Aes256Sha256RsaPss,
}

impl SecurityPolicy {
    /// Returns the OPC UA policy URI.
    pub const fn uri(&self) -> &'static str {
        match self {
            Self::None => "http://opcfoundation.org/UA/SecurityPolicy#None",
            Self::Basic256Sha256 => "http://opcfoundation.org/UA/SecurityPolicy#Basic256Sha256",
            Self::Aes128Sha256RsaOaep => {
                "http://opcfoundation.org/UA/SecurityPolicy#Aes128_Sha256_RsaOaep"
            }
            Self::Aes256Sha256RsaPss => {
                "http://opcfoundation.org/UA/SecurityPolicy#Aes256_Sha256_RsaPss"
            }
        }
    }

    /// Creates from URI.
    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            s if s.ends_with("#None") => Some(Self::None),
            s if s.ends_with("#Basic256Sha256") => Some(Self::Basic256Sha256),
            s if s.ends_with("#Aes128_Sha256_RsaOaep") => Some(Self::Aes128Sha256RsaOaep),
            s if s.ends_with("#Aes256_Sha256_RsaPss") => Some(Self::Aes256Sha256RsaPss),
            _ => Option::None,
        }
    }
}

impl fmt::Display for SecurityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.uri().rsplit('#').next().unwrap_or("None");
        write!(f, "{}", name)
    }
}

// =============================================================================
// EndpointDescription
// =============================================================================

/// The endpoint a secure channel is opened against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointDescription {
    /// Endpoint URL (e.g., "opc.tcp://localhost:4840").
    pub endpoint_url: String,

    /// Advertised transport profile URI.
    #[serde(default = "default_transport_profile_uri")]
    pub transport_profile_uri: String,

    /// Security mode.
    #[serde(default)]
    pub security_mode: SecurityMode,

    /// Security policy.
    #[serde(default)]
    pub security_policy: SecurityPolicy,
}

fn default_transport_profile_uri() -> String {
    PROFILE_URI_TCP_UASC_UABINARY.to_string()
}

impl EndpointDescription {
    /// Creates an endpoint with the given URL and profile URI and no security.
    pub fn new(endpoint_url: impl Into<String>, transport_profile_uri: impl Into<String>) -> Self {
        Self {
            endpoint_url: endpoint_url.into(),
            transport_profile_uri: transport_profile_uri.into(),
            security_mode: SecurityMode::None,
            security_policy: SecurityPolicy::None,
        }
    }

    /// Creates an endpoint using the raw TCP binary profile.
    pub fn tcp(endpoint_url: impl Into<String>) -> Self {
        Self::new(endpoint_url, PROFILE_URI_TCP_UASC_UABINARY)
    }

    /// Resolves the transport profile.
    pub fn transport_profile(&self) -> UaResult<TransportProfile> {
        TransportProfile::from_uri(&self.transport_profile_uri)
    }

    /// Parses the endpoint URL.
    pub fn url(&self) -> UaResult<EndpointUrl> {
        EndpointUrl::parse(&self.endpoint_url)
    }

    /// Validates URL, profile and their combination without touching the network.
    pub fn validate(&self) -> UaResult<(TransportProfile, EndpointUrl)> {
        let profile = self.transport_profile()?;
        let url = self.url()?;
        if !profile.accepts(url.scheme()) {
            return Err(
                ConfigurationError::scheme_mismatch(url.scheme().as_str(), profile.name()).into(),
            );
        }
        if self.security_mode.is_none() != matches!(self.security_policy, SecurityPolicy::None) {
            return Err(ConfigurationError::invalid_value(
                "security_policy",
                "security mode and policy must both be None or both be set",
            )
            .into());
        }
        Ok((profile, url))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_from_uri() {
        for profile in TransportProfile::ALL {
            assert_eq!(TransportProfile::from_uri(profile.uri()).unwrap(), profile);
        }
    }

    #[test]
    fn test_profile_subprotocols() {
        assert_eq!(TransportProfile::WssUascBinary.subprotocol(), Some("opcua+cp"));
        assert_eq!(TransportProfile::WssUaJson.subprotocol(), Some("opcua+uajson"));
        assert_eq!(TransportProfile::TcpUascBinary.subprotocol(), None);
    }

    #[test]
    fn test_unknown_profile_is_configuration_error() {
        let err = TransportProfile::from_uri(
            "http://opcfoundation.org/UA-Profile/Transport/https-uabinary",
        )
        .unwrap_err();
        assert!(err.is_configuration_error());
        assert!(matches!(
            err,
            UaError::Configuration(ConfigurationError::UnsupportedProfile { .. })
        ));
    }

    #[test]
    fn test_profile_from_str() {
        assert_eq!(
            "wss_uasc_uabinary".parse::<TransportProfile>().unwrap(),
            TransportProfile::WssUascBinary
        );
        assert_eq!(
            PROFILE_URI_WSS_UAJSON.parse::<TransportProfile>().unwrap(),
            TransportProfile::WssUaJson
        );
        assert!("https".parse::<TransportProfile>().is_err());
    }

    #[test]
    fn test_endpoint_url_defaults() {
        let url = EndpointUrl::parse("opc.tcp://localhost").unwrap();
        assert_eq!(url.scheme(), UrlScheme::OpcTcp);
        assert_eq!(url.port(), 4840);
        assert_eq!(url.path(), "/");
        assert_eq!(url.authority(), "localhost:4840");

        let url = EndpointUrl::parse("opc.ws://10.0.0.5/ua").unwrap();
        assert_eq!(url.port(), 80);
        assert!(!url.scheme().is_secure());

        let url = EndpointUrl::parse("WSS://plc.example.com:8443/ua/server").unwrap();
        assert_eq!(url.scheme(), UrlScheme::Wss);
        assert_eq!(url.port(), 8443);
        assert_eq!(url.websocket_uri(), "wss://plc.example.com:8443/ua/server");
    }

    #[test]
    fn test_opc_wss_maps_to_wss() {
        let url = EndpointUrl::parse("opc.wss://plc.local:4843/ua").unwrap();
        assert!(url.scheme().is_secure());
        assert_eq!(url.websocket_uri(), "wss://plc.local:4843/ua");
    }

    #[test]
    fn test_endpoint_url_invalid() {
        assert!(EndpointUrl::parse("").is_err());
        assert!(EndpointUrl::parse("http://localhost:4840").is_err());
        assert!(EndpointUrl::parse("not a url").is_err());
    }

    #[test]
    fn test_endpoint_description_validate() {
        let endpoint = EndpointDescription::tcp("opc.tcp://localhost:4840");
        let (profile, url) = endpoint.validate().unwrap();
        assert_eq!(profile, TransportProfile::TcpUascBinary);
        assert_eq!(url.port(), 4840);

        let mismatch = EndpointDescription::new("opc.tcp://localhost:4840", PROFILE_URI_WSS_UAJSON);
        assert!(matches!(
            mismatch.validate(),
            Err(UaError::Configuration(ConfigurationError::SchemeMismatch { .. }))
        ));
    }

    #[test]
    fn test_security_policy_uri_roundtrip() {
        let policy = SecurityPolicy::from_uri(SecurityPolicy::Basic256Sha256.uri()).unwrap();
        assert_eq!(policy, SecurityPolicy::Basic256Sha256);
        assert_eq!(policy.to_string(), "Basic256Sha256");
        assert_eq!(SecurityMode::SignAndEncrypt.value(), 3);
    }
}
