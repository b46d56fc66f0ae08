// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Error types for the session lifecycle and channel bootstrap.
//!
//! Every failure below the session state machine is converted into a
//! [`UaError`] and, once it crosses the event queue, shared as
//! `Arc<UaError>` so that all callers attached to one session future
//! observe the identical error value.
//!
//! # Error Categories
//!
//! ```text
//! UaError
//! ├── Connection    - TCP connect, server ERR replies, connection loss
//! ├── Transport     - TLS, WebSocket upgrade, framing and size limits
//! ├── Session       - Session creation, transfer and teardown
//! ├── Configuration - Profiles, endpoint URLs and limits (fail fast)
//! └── Timeout       - Connect, handshake and service request deadlines
//! ```
//!
//! # Examples
//!
//! ```
//! use trap_ua_session::error::{UaError, ConnectionError, StatusCode};
//!
//! let error = UaError::connection(ConnectionError::closed(None));
//!
//! assert!(error.is_connection_closed());
//! assert_eq!(error.status_code(), StatusCode::BAD_CONNECTION_CLOSED);
//!
//! for hint in error.recovery_hints() {
//!     println!("Hint: {}", hint);
//! }
//! ```

use std::fmt;
use std::io;
use std::time::Duration;
use thiserror::Error;
use tracing::Level;

// =============================================================================
// UaError - Main Error Type
// =============================================================================

/// The main error type for session and channel operations.
#[derive(Debug, Error)]
pub enum UaError {
    /// Connection-related errors.
    #[error("{0}")]
    Connection(#[from] ConnectionError),

    /// Transport pipeline errors.
    #[error("{0}")]
    Transport(#[from] TransportError),

    /// Session lifecycle errors.
    #[error("{0}")]
    Session(#[from] SessionError),

    /// Configuration errors.
    #[error("{0}")]
    Configuration(#[from] ConfigurationError),

    /// Timeout errors.
    #[error("{0}")]
    Timeout(#[from] TimeoutError),
}

impl UaError {
    // =========================================================================
    // Factory Methods
    // =========================================================================

    /// Creates a connection error.
    #[inline]
    pub fn connection(error: ConnectionError) -> Self {
        Self::Connection(error)
    }

    /// Creates a transport error.
    #[inline]
    pub fn transport(error: TransportError) -> Self {
        Self::Transport(error)
    }

    /// Creates a session error.
    #[inline]
    pub fn session(error: SessionError) -> Self {
        Self::Session(error)
    }

    /// Creates a configuration error.
    #[inline]
    pub fn configuration(error: ConfigurationError) -> Self {
        Self::Configuration(error)
    }

    /// Creates a timeout error.
    #[inline]
    pub fn timeout(error: TimeoutError) -> Self {
        Self::Timeout(error)
    }

    // =========================================================================
    // Convenience Factory Methods
    // =========================================================================

    /// Creates a connection closed error.
    pub fn connection_closed(reason: impl Into<String>) -> Self {
        Self::Connection(ConnectionError::closed(Some(reason.into())))
    }

    /// Creates an unsupported transport profile error.
    pub fn unsupported_profile(uri: impl Into<String>) -> Self {
        Self::Configuration(ConfigurationError::unsupported_profile(uri))
    }

    /// Creates an invalid endpoint URL error.
    pub fn invalid_endpoint(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Configuration(ConfigurationError::invalid_endpoint(url, reason))
    }

    /// Creates a handshake timeout error.
    pub fn handshake_timeout(duration: Duration) -> Self {
        Self::Timeout(TimeoutError::handshake(duration))
    }

    /// Creates a frame too large error.
    pub fn frame_too_large(size: usize, max: usize) -> Self {
        Self::Transport(TransportError::frame_too_large(size, max))
    }

    // =========================================================================
    // Error Properties
    // =========================================================================

    /// Returns `true` if this error is retryable.
    ///
    /// Configuration errors are never retryable; they must be fixed before
    /// another channel is attempted.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection(e) => e.is_retryable(),
            Self::Transport(e) => e.is_retryable(),
            Self::Session(e) => e.is_retryable(),
            Self::Timeout(_) => true,
            Self::Configuration(_) => false,
        }
    }

    /// Returns `true` if this is a connection-related failure.
    ///
    /// Transport and timeout failures count as connection failures: they
    /// all mean the channel could not be established or was lost.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Transport(_) | Self::Timeout(_)
        )
    }

    /// Returns `true` if the connection was closed or lost.
    pub fn is_connection_closed(&self) -> bool {
        matches!(self, Self::Connection(ConnectionError::Closed { .. }))
    }

    /// Returns `true` if this is a configuration error.
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Returns the severity level of this error.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Connection(e) => e.severity(),
            Self::Transport(e) => e.severity(),
            Self::Session(e) => e.severity(),
            Self::Timeout(_) => ErrorSeverity::Warning,
            Self::Configuration(_) => ErrorSeverity::Critical,
        }
    }

    /// Returns the error category for logging.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection",
            Self::Transport(_) => "transport",
            Self::Session(_) => "session",
            Self::Configuration(_) => "configuration",
            Self::Timeout(_) => "timeout",
        }
    }

    /// Returns a unique error code for this error.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Connection(e) => e.error_code(),
            Self::Transport(e) => e.error_code(),
            Self::Session(e) => e.error_code(),
            Self::Configuration(e) => e.error_code(),
            Self::Timeout(e) => e.error_code(),
        }
    }

    /// Returns the OPC UA status code this error maps to.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Connection(e) => e.status_code(),
            Self::Transport(e) => e.status_code(),
            Self::Session(e) => e.status_code(),
            Self::Configuration(e) => e.status_code(),
            Self::Timeout(_) => StatusCode::BAD_TIMEOUT,
        }
    }

    /// Returns recovery hints for this error.
    pub fn recovery_hints(&self) -> Vec<&'static str> {
        match self {
            Self::Connection(e) => e.recovery_hints(),
            Self::Transport(e) => e.recovery_hints(),
            Self::Session(e) => e.recovery_hints(),
            Self::Configuration(e) => e.recovery_hints(),
            Self::Timeout(e) => e.recovery_hints(),
        }
    }

    /// Returns a user-friendly error message.
    pub fn user_message(&self) -> String {
        match self {
            Self::Connection(e) => e.user_message(),
            Self::Transport(e) => e.user_message(),
            Self::Session(e) => e.user_message(),
            Self::Configuration(e) => e.user_message(),
            Self::Timeout(e) => e.user_message(),
        }
    }

    /// Returns the tracing level for this error.
    pub fn tracing_level(&self) -> Level {
        self.severity().to_tracing_level()
    }

    /// Logs this error with appropriate level and context.
    pub fn log(&self, context: &str) {
        let level = self.tracing_level();
        let code = self.error_code();
        let status = self.status_code();

        match level {
            Level::ERROR => tracing::error!(
                error_code = %code,
                status = %status,
                category = self.category(),
                context = context,
                retryable = self.is_retryable(),
                "{self}"
            ),
            Level::WARN => tracing::warn!(
                error_code = %code,
                status = %status,
                category = self.category(),
                context = context,
                retryable = self.is_retryable(),
                "{self}"
            ),
            _ => tracing::debug!(
                error_code = %code,
                status = %status,
                category = self.category(),
                context = context,
                retryable = self.is_retryable(),
                "{self}"
            ),
        }
    }
}

impl From<io::Error> for UaError {
    fn from(error: io::Error) -> Self {
        Self::Connection(ConnectionError::from(error))
    }
}

// =============================================================================
// ConnectionError
// =============================================================================

/// Connection-level errors.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Connection refused.
    #[error("Connection refused to '{endpoint}'")]
    Refused {
        /// Target endpoint.
        endpoint: String,
        /// Underlying error.
        #[source]
        source: Option<io::Error>,
    },

    /// Host name could not be resolved.
    #[error("Could not resolve host '{host}'")]
    UnresolvedHost {
        /// Host name.
        host: String,
    },

    /// The server answered with an `ERR` message.
    #[error("Server rejected the connection with {status}: {reason}")]
    ServerError {
        /// Status code carried in the `ERR` message.
        status: StatusCode,
        /// Reason text carried in the `ERR` message.
        reason: String,
    },

    /// Connection closed or lost.
    #[error("Connection closed{}", .reason.as_deref().map(|r| format!(": {r}")).unwrap_or_default())]
    Closed {
        /// Reason for closure.
        reason: Option<String>,
    },

    /// Generic I/O error.
    #[error("I/O error: {message}")]
    Io {
        /// Error message.
        message: String,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
}

impl ConnectionError {
    /// Creates a connection refused error.
    pub fn refused(endpoint: impl Into<String>) -> Self {
        Self::Refused {
            endpoint: endpoint.into(),
            source: None,
        }
    }

    /// Creates a connection refused error with source.
    pub fn refused_with(endpoint: impl Into<String>, source: io::Error) -> Self {
        Self::Refused {
            endpoint: endpoint.into(),
            source: Some(source),
        }
    }

    /// Creates an unresolved host error.
    pub fn unresolved_host(host: impl Into<String>) -> Self {
        Self::UnresolvedHost { host: host.into() }
    }

    /// Creates a server error from an `ERR` message.
    pub fn server_error(status: StatusCode, reason: impl Into<String>) -> Self {
        Self::ServerError {
            status,
            reason: reason.into(),
        }
    }

    /// Creates a connection closed error.
    pub fn closed(reason: Option<String>) -> Self {
        Self::Closed { reason }
    }

    /// Creates an I/O error.
    pub fn io(message: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }

    /// Returns `true` if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Refused { .. } => true,
            Self::Closed { .. } => true,
            Self::UnresolvedHost { .. } => false,
            Self::ServerError { status, .. } => !matches!(
                *status,
                StatusCode::BAD_TCP_ENDPOINT_URL_INVALID
                    | StatusCode::BAD_PROTOCOL_VERSION_UNSUPPORTED
            ),
            Self::Io { source, .. } => matches!(
                source.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::TimedOut
                    | io::ErrorKind::Interrupted
                    | io::ErrorKind::UnexpectedEof
            ),
        }
    }

    /// Returns the severity level.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Closed { .. } => ErrorSeverity::Warning,
            _ => ErrorSeverity::Error,
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Refused { .. } => ErrorCode::new(1, 1),
            Self::UnresolvedHost { .. } => ErrorCode::new(1, 2),
            Self::ServerError { .. } => ErrorCode::new(1, 3),
            Self::Closed { .. } => ErrorCode::new(1, 4),
            Self::Io { .. } => ErrorCode::new(1, 5),
        }
    }

    /// Returns the OPC UA status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::ServerError { status, .. } => *status,
            Self::Closed { .. } => StatusCode::BAD_CONNECTION_CLOSED,
            Self::Refused { .. } | Self::UnresolvedHost { .. } => StatusCode::BAD_CONNECTION_REJECTED,
            Self::Io { .. } => StatusCode::BAD_COMMUNICATION_ERROR,
        }
    }

    /// Returns recovery hints.
    pub fn recovery_hints(&self) -> Vec<&'static str> {
        match self {
            Self::Refused { .. } => vec![
                "Check if the OPC UA server is running",
                "Verify the endpoint URL is correct",
                "Check firewall rules allow the connection",
            ],
            Self::UnresolvedHost { .. } => vec![
                "Verify the host name in the endpoint URL",
                "Check DNS configuration",
            ],
            Self::ServerError { .. } => vec![
                "Check server logs for the rejection reason",
                "Compare the configured buffer and message limits with the server's",
            ],
            Self::Closed { .. } => vec![
                "The connection was closed by the server or the network",
                "Request a new session to reconnect",
            ],
            Self::Io { .. } => vec!["Check network connectivity", "Retry the operation"],
        }
    }

    /// Returns a user-friendly error message.
    pub fn user_message(&self) -> String {
        match self {
            Self::Refused { endpoint, .. } => {
                format!("OPC UA 서버({})에 연결할 수 없습니다", endpoint)
            }
            Self::UnresolvedHost { host } => format!("호스트를 찾을 수 없음: {}", host),
            Self::ServerError { status, .. } => {
                format!("서버가 연결을 거부했습니다 ({})", status)
            }
            Self::Closed { .. } => "연결이 끊어졌습니다".to_string(),
            Self::Io { .. } => "네트워크 오류가 발생했습니다".to_string(),
        }
    }
}

impl From<io::Error> for ConnectionError {
    fn from(error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::ConnectionRefused => Self::Refused {
                endpoint: "unknown".to_string(),
                source: Some(error),
            },
            io::ErrorKind::UnexpectedEof | io::ErrorKind::ConnectionReset => Self::Closed {
                reason: Some(error.to_string()),
            },
            _ => Self::Io {
                message: error.to_string(),
                source: error,
            },
        }
    }
}

// =============================================================================
// TransportError
// =============================================================================

/// Errors raised by the transport pipeline stages.
#[derive(Debug, Error)]
pub enum TransportError {
    /// TLS negotiation failed.
    #[error("TLS negotiation failed: {message}")]
    Tls {
        /// Error message.
        message: String,
    },

    /// The WebSocket upgrade was rejected by the server.
    #[error("WebSocket upgrade rejected: {reason}")]
    UpgradeRejected {
        /// HTTP status returned by the server, if any.
        status: Option<u16>,
        /// Rejection reason.
        reason: String,
    },

    /// A frame exceeded the maximum chunk size.
    #[error("Frame of {size} bytes exceeds the maximum chunk size of {max} bytes")]
    FrameTooLarge {
        /// Frame size.
        size: usize,
        /// Configured limit.
        max: usize,
    },

    /// An assembled message exceeded the maximum message size.
    #[error("Message of {size} bytes exceeds the maximum message size of {max} bytes")]
    MessageTooLarge {
        /// Message size.
        size: usize,
        /// Configured limit.
        max: usize,
    },

    /// A message was split into more chunks than allowed.
    #[error("Message uses {count} chunks, the limit is {max}")]
    TooManyChunks {
        /// Chunk count.
        count: usize,
        /// Configured limit.
        max: usize,
    },

    /// A frame could not be decoded.
    #[error("Invalid frame: {reason}")]
    InvalidFrame {
        /// Reason.
        reason: String,
    },

    /// A well-formed frame arrived that the current step does not accept.
    #[error("Unexpected message: expected {expected}, got {actual}")]
    UnexpectedMessage {
        /// Expected message type.
        expected: String,
        /// Received message type.
        actual: String,
    },

    /// Limits announced by the server are incompatible with local limits.
    #[error("Negotiation failed: {reason}")]
    Negotiation {
        /// Reason.
        reason: String,
    },

    /// WebSocket protocol failure after the upgrade.
    #[error("WebSocket error: {message}")]
    WebSocket {
        /// Error message.
        message: String,
    },
}

impl TransportError {
    /// Creates a TLS error.
    pub fn tls(message: impl Into<String>) -> Self {
        Self::Tls {
            message: message.into(),
        }
    }

    /// Creates an upgrade rejected error.
    pub fn upgrade_rejected(status: Option<u16>, reason: impl Into<String>) -> Self {
        Self::UpgradeRejected {
            status,
            reason: reason.into(),
        }
    }

    /// Creates a frame too large error.
    pub fn frame_too_large(size: usize, max: usize) -> Self {
        Self::FrameTooLarge { size, max }
    }

    /// Creates a message too large error.
    pub fn message_too_large(size: usize, max: usize) -> Self {
        Self::MessageTooLarge { size, max }
    }

    /// Creates a too many chunks error.
    pub fn too_many_chunks(count: usize, max: usize) -> Self {
        Self::TooManyChunks { count, max }
    }

    /// Creates an invalid frame error.
    pub fn invalid_frame(reason: impl Into<String>) -> Self {
        Self::InvalidFrame {
            reason: reason.into(),
        }
    }

    /// Creates an unexpected message error.
    pub fn unexpected_message(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::UnexpectedMessage {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Creates a negotiation error.
    pub fn negotiation(reason: impl Into<String>) -> Self {
        Self::Negotiation {
            reason: reason.into(),
        }
    }

    /// Creates a WebSocket error.
    pub fn websocket(message: impl Into<String>) -> Self {
        Self::WebSocket {
            message: message.into(),
        }
    }

    /// Returns `true` if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::WebSocket { .. } | Self::UpgradeRejected { status: Some(503), .. })
    }

    /// Returns the severity level.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Tls { .. } | Self::Negotiation { .. } => ErrorSeverity::Critical,
            _ => ErrorSeverity::Error,
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Tls { .. } => ErrorCode::new(2, 1),
            Self::UpgradeRejected { .. } => ErrorCode::new(2, 2),
            Self::FrameTooLarge { .. } => ErrorCode::new(2, 3),
            Self::MessageTooLarge { .. } => ErrorCode::new(2, 4),
            Self::TooManyChunks { .. } => ErrorCode::new(2, 5),
            Self::InvalidFrame { .. } => ErrorCode::new(2, 6),
            Self::UnexpectedMessage { .. } => ErrorCode::new(2, 7),
            Self::Negotiation { .. } => ErrorCode::new(2, 8),
            Self::WebSocket { .. } => ErrorCode::new(2, 9),
        }
    }

    /// Returns the OPC UA status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Tls { .. } => StatusCode::BAD_SECURITY_CHECKS_FAILED,
            Self::UpgradeRejected { .. } => StatusCode::BAD_CONNECTION_REJECTED,
            Self::FrameTooLarge { .. } | Self::MessageTooLarge { .. } | Self::TooManyChunks { .. } => {
                StatusCode::BAD_TCP_MESSAGE_TOO_LARGE
            }
            Self::InvalidFrame { .. } | Self::UnexpectedMessage { .. } => {
                StatusCode::BAD_TCP_MESSAGE_TYPE_INVALID
            }
            Self::Negotiation { .. } => StatusCode::BAD_TCP_NOT_ENOUGH_RESOURCES,
            Self::WebSocket { .. } => StatusCode::BAD_COMMUNICATION_ERROR,
        }
    }

    /// Returns recovery hints.
    pub fn recovery_hints(&self) -> Vec<&'static str> {
        match self {
            Self::Tls { .. } => vec![
                "Verify the server certificate is issued by a trusted authority",
                "Check that the host name matches the certificate",
            ],
            Self::UpgradeRejected { .. } => vec![
                "Check that the server supports the requested WebSocket subprotocol",
                "Verify the endpoint path",
            ],
            Self::FrameTooLarge { .. } | Self::MessageTooLarge { .. } | Self::TooManyChunks { .. } => {
                vec![
                    "Increase max_chunk_size / max_message_size if the peer is trusted",
                    "Reduce the size of requests sent to the server",
                ]
            }
            Self::InvalidFrame { .. } | Self::UnexpectedMessage { .. } => {
                vec!["Check that the endpoint speaks the configured transport profile"]
            }
            Self::Negotiation { .. } => vec![
                "Compare local buffer sizes with the server's announced limits",
            ],
            Self::WebSocket { .. } => vec!["Retry the connection"],
        }
    }

    /// Returns a user-friendly error message.
    pub fn user_message(&self) -> String {
        match self {
            Self::Tls { .. } => "TLS 협상에 실패했습니다".to_string(),
            Self::UpgradeRejected { .. } => "WebSocket 업그레이드가 거부되었습니다".to_string(),
            Self::FrameTooLarge { size, max } | Self::MessageTooLarge { size, max } => {
                format!("메시지 크기 초과 ({} > {} 바이트)", size, max)
            }
            Self::TooManyChunks { count, max } => {
                format!("청크 수 초과 ({} > {})", count, max)
            }
            Self::InvalidFrame { .. } | Self::UnexpectedMessage { .. } => {
                "잘못된 프레임을 수신했습니다".to_string()
            }
            Self::Negotiation { .. } => "버퍼 크기 협상에 실패했습니다".to_string(),
            Self::WebSocket { .. } => "WebSocket 오류가 발생했습니다".to_string(),
        }
    }
}

// =============================================================================
// SessionError
// =============================================================================

/// Session lifecycle errors.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Session creation failed.
    #[error("Failed to create session: {message}")]
    CreationFailed {
        /// Error message.
        message: String,
    },

    /// Session transfer to a new channel failed.
    #[error("Failed to transfer session '{session_id}': {message}")]
    TransferFailed {
        /// Session ID.
        session_id: String,
        /// Error message.
        message: String,
    },

    /// The session was closed by the client while a request was pending.
    #[error("Session closed")]
    Closed,

    /// The promise for the session was dropped without a result.
    #[error("Session request abandoned before completion")]
    Abandoned,

    /// The session state machine is no longer running.
    #[error("Session state machine is not running")]
    FsmStopped,
}

impl SessionError {
    /// Creates a session creation failed error.
    pub fn creation_failed(message: impl Into<String>) -> Self {
        Self::CreationFailed {
            message: message.into(),
        }
    }

    /// Creates a session transfer failed error.
    pub fn transfer_failed(session_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TransferFailed {
            session_id: session_id.into(),
            message: message.into(),
        }
    }

    /// Returns `true` if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::CreationFailed { .. } | Self::TransferFailed { .. })
    }

    /// Returns the severity level.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Closed => ErrorSeverity::Info,
            Self::Abandoned | Self::FsmStopped => ErrorSeverity::Warning,
            _ => ErrorSeverity::Error,
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::CreationFailed { .. } => ErrorCode::new(3, 1),
            Self::TransferFailed { .. } => ErrorCode::new(3, 2),
            Self::Closed => ErrorCode::new(3, 3),
            Self::Abandoned => ErrorCode::new(3, 4),
            Self::FsmStopped => ErrorCode::new(3, 5),
        }
    }

    /// Returns the OPC UA status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::CreationFailed { .. } | Self::TransferFailed { .. } => {
                StatusCode::BAD_SESSION_ID_INVALID
            }
            Self::Closed => StatusCode::BAD_SESSION_CLOSED,
            Self::Abandoned | Self::FsmStopped => StatusCode::BAD_SHUTDOWN,
        }
    }

    /// Returns recovery hints.
    pub fn recovery_hints(&self) -> Vec<&'static str> {
        match self {
            Self::CreationFailed { .. } => vec![
                "Check the server's session limits",
                "Verify the user identity token",
            ],
            Self::TransferFailed { .. } => vec![
                "The server may have discarded the session; request a new one",
            ],
            Self::Closed => vec!["Request a new session"],
            Self::Abandoned | Self::FsmStopped => {
                vec!["The client is shutting down; create a new client"]
            }
        }
    }

    /// Returns a user-friendly error message.
    pub fn user_message(&self) -> String {
        match self {
            Self::CreationFailed { .. } => "세션 생성에 실패했습니다".to_string(),
            Self::TransferFailed { session_id, .. } => {
                format!("세션({}) 전환에 실패했습니다", session_id)
            }
            Self::Closed => "세션이 종료되었습니다".to_string(),
            Self::Abandoned => "세션 요청이 취소되었습니다".to_string(),
            Self::FsmStopped => "세션 관리자가 중지되었습니다".to_string(),
        }
    }
}

// =============================================================================
// ConfigurationError
// =============================================================================

/// Configuration errors. Always raised before any network I/O.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// Transport profile URI is not supported.
    #[error("Unsupported transport profile: '{uri}'")]
    UnsupportedProfile {
        /// The profile URI.
        uri: String,
    },

    /// Endpoint URL is malformed.
    #[error("Invalid endpoint URL: '{url}' - {reason}")]
    InvalidEndpoint {
        /// The invalid URL.
        url: String,
        /// Reason.
        reason: String,
    },

    /// URL scheme does not match the transport profile.
    #[error("Scheme '{scheme}' cannot be used with transport profile '{profile}'")]
    SchemeMismatch {
        /// URL scheme.
        scheme: String,
        /// Profile name.
        profile: String,
    },

    /// A size or count limit is invalid.
    #[error("Invalid limit '{field}': {reason}")]
    InvalidLimit {
        /// Field name.
        field: String,
        /// Reason.
        reason: String,
    },

    /// Required field missing.
    #[error("Missing required field: '{field}'")]
    MissingField {
        /// Field name.
        field: String,
    },

    /// Invalid value.
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue {
        /// Field name.
        field: String,
        /// Reason.
        reason: String,
    },

    /// Configuration file could not be read.
    #[error("Failed to read configuration file '{path}': {message}")]
    Load {
        /// File path.
        path: String,
        /// Error message.
        message: String,
    },

    /// Configuration content could not be parsed.
    #[error("Failed to parse {format} configuration: {message}")]
    Parse {
        /// Format name.
        format: String,
        /// Error message.
        message: String,
    },
}

impl ConfigurationError {
    /// Creates an unsupported profile error.
    pub fn unsupported_profile(uri: impl Into<String>) -> Self {
        Self::UnsupportedProfile { uri: uri.into() }
    }

    /// Creates an invalid endpoint error.
    pub fn invalid_endpoint(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidEndpoint {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates a scheme mismatch error.
    pub fn scheme_mismatch(scheme: impl Into<String>, profile: impl Into<String>) -> Self {
        Self::SchemeMismatch {
            scheme: scheme.into(),
            profile: profile.into(),
        }
    }

    /// Creates an invalid limit error.
    pub fn invalid_limit(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidLimit {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates a missing field error.
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    /// Creates an invalid value error.
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates a load error.
    pub fn load(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Load {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a parse error.
    pub fn parse(format: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            format: format.into(),
            message: message.into(),
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::UnsupportedProfile { .. } => ErrorCode::new(4, 1),
            Self::InvalidEndpoint { .. } => ErrorCode::new(4, 2),
            Self::SchemeMismatch { .. } => ErrorCode::new(4, 3),
            Self::InvalidLimit { .. } => ErrorCode::new(4, 4),
            Self::MissingField { .. } => ErrorCode::new(4, 5),
            Self::InvalidValue { .. } => ErrorCode::new(4, 6),
            Self::Load { .. } => ErrorCode::new(4, 7),
            Self::Parse { .. } => ErrorCode::new(4, 8),
        }
    }

    /// Returns the OPC UA status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidEndpoint { .. } | Self::SchemeMismatch { .. } => {
                StatusCode::BAD_TCP_ENDPOINT_URL_INVALID
            }
            _ => StatusCode::BAD_CONFIGURATION_ERROR,
        }
    }

    /// Returns recovery hints.
    pub fn recovery_hints(&self) -> Vec<&'static str> {
        match self {
            Self::UnsupportedProfile { .. } => vec![
                "Use one of the uatcp-uasc-uabinary, wss-uasc-uabinary or wss-uajson profiles",
            ],
            Self::InvalidEndpoint { .. } => vec![
                "Use format: opc.tcp://hostname:port/path",
                "WebSocket endpoints use opc.wss://hostname:port/path",
            ],
            Self::SchemeMismatch { .. } => vec![
                "opc.tcp endpoints require the uatcp-uasc-uabinary profile",
                "WebSocket profiles require an opc.ws(s) or ws(s) endpoint",
            ],
            Self::InvalidLimit { .. } => vec![
                "Chunk sizes must be at least 8192 bytes",
                "max_message_size must not be smaller than max_chunk_size",
            ],
            Self::MissingField { .. } | Self::InvalidValue { .. } => {
                vec!["Check the configuration file against the documented schema"]
            }
            Self::Load { .. } => vec!["Check that the file exists and is readable"],
            Self::Parse { .. } => vec!["Check the file syntax matches its extension"],
        }
    }

    /// Returns a user-friendly error message.
    pub fn user_message(&self) -> String {
        match self {
            Self::UnsupportedProfile { uri } => format!("지원하지 않는 전송 프로파일: {}", uri),
            Self::InvalidEndpoint { url, .. } => format!("잘못된 엔드포인트 URL: {}", url),
            Self::SchemeMismatch { scheme, .. } => {
                format!("전송 프로파일과 맞지 않는 스킴: {}", scheme)
            }
            Self::InvalidLimit { field, .. } => format!("잘못된 크기 제한: {}", field),
            Self::MissingField { field } => format!("필수 설정 누락: {}", field),
            Self::InvalidValue { field, .. } => format!("잘못된 설정 값: {}", field),
            Self::Load { path, .. } => format!("설정 파일을 읽을 수 없습니다: {}", path),
            Self::Parse { format, .. } => format!("{} 설정 파싱 실패", format),
        }
    }
}

// =============================================================================
// TimeoutError
// =============================================================================

/// Timeout errors.
#[derive(Debug, Error)]
pub enum TimeoutError {
    /// TCP connect timeout.
    #[error("Connection timed out after {duration:?}")]
    Connect {
        /// Timeout duration.
        duration: Duration,
    },

    /// Channel handshake timeout.
    #[error("Channel handshake timed out after {duration:?}")]
    Handshake {
        /// Timeout duration.
        duration: Duration,
    },

    /// Session service request timeout.
    #[error("Request timed out after {duration:?}")]
    Request {
        /// Timeout duration.
        duration: Duration,
    },
}

impl TimeoutError {
    /// Creates a connect timeout.
    pub fn connect(duration: Duration) -> Self {
        Self::Connect { duration }
    }

    /// Creates a handshake timeout.
    pub fn handshake(duration: Duration) -> Self {
        Self::Handshake { duration }
    }

    /// Creates a request timeout.
    pub fn request(duration: Duration) -> Self {
        Self::Request { duration }
    }

    /// Returns the timeout duration.
    pub fn duration(&self) -> Duration {
        match self {
            Self::Connect { duration }
            | Self::Handshake { duration }
            | Self::Request { duration } => *duration,
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Connect { .. } => ErrorCode::new(5, 1),
            Self::Handshake { .. } => ErrorCode::new(5, 2),
            Self::Request { .. } => ErrorCode::new(5, 3),
        }
    }

    /// Returns recovery hints.
    pub fn recovery_hints(&self) -> Vec<&'static str> {
        vec![
            "Check network connectivity",
            "Increase the timeout value",
            "Verify the server is responding",
        ]
    }

    /// Returns a user-friendly error message.
    pub fn user_message(&self) -> String {
        let secs = self.duration().as_secs_f64();
        match self {
            Self::Connect { .. } => format!("연결 시간 초과 ({:.1}초)", secs),
            Self::Handshake { .. } => format!("채널 핸드셰이크 시간 초과 ({:.1}초)", secs),
            Self::Request { .. } => format!("요청 시간 초과 ({:.1}초)", secs),
        }
    }
}

// =============================================================================
// StatusCode
// =============================================================================

/// OPC UA status code as carried in `ERR` messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusCode(pub u32);

impl StatusCode {
    /// Good.
    pub const GOOD: Self = Self(0x0000_0000);
    /// Bad_InternalError.
    pub const BAD_INTERNAL_ERROR: Self = Self(0x8002_0000);
    /// Bad_CommunicationError.
    pub const BAD_COMMUNICATION_ERROR: Self = Self(0x8005_0000);
    /// Bad_Timeout.
    pub const BAD_TIMEOUT: Self = Self(0x800A_0000);
    /// Bad_Shutdown.
    pub const BAD_SHUTDOWN: Self = Self(0x800C_0000);
    /// Bad_SecurityChecksFailed.
    pub const BAD_SECURITY_CHECKS_FAILED: Self = Self(0x8013_0000);
    /// Bad_SessionIdInvalid.
    pub const BAD_SESSION_ID_INVALID: Self = Self(0x8025_0000);
    /// Bad_SessionClosed.
    pub const BAD_SESSION_CLOSED: Self = Self(0x8026_0000);
    /// Bad_TcpMessageTypeInvalid.
    pub const BAD_TCP_MESSAGE_TYPE_INVALID: Self = Self(0x807E_0000);
    /// Bad_TcpSecureChannelUnknown.
    pub const BAD_TCP_SECURE_CHANNEL_UNKNOWN: Self = Self(0x807F_0000);
    /// Bad_TcpMessageTooLarge.
    pub const BAD_TCP_MESSAGE_TOO_LARGE: Self = Self(0x8080_0000);
    /// Bad_TcpNotEnoughResources.
    pub const BAD_TCP_NOT_ENOUGH_RESOURCES: Self = Self(0x8081_0000);
    /// Bad_TcpInternalError.
    pub const BAD_TCP_INTERNAL_ERROR: Self = Self(0x8082_0000);
    /// Bad_TcpEndpointUrlInvalid.
    pub const BAD_TCP_ENDPOINT_URL_INVALID: Self = Self(0x8083_0000);
    /// Bad_SecureChannelClosed.
    pub const BAD_SECURE_CHANNEL_CLOSED: Self = Self(0x8086_0000);
    /// Bad_ConfigurationError.
    pub const BAD_CONFIGURATION_ERROR: Self = Self(0x8089_0000);
    /// Bad_ConnectionRejected.
    pub const BAD_CONNECTION_REJECTED: Self = Self(0x80AC_0000);
    /// Bad_ConnectionClosed.
    pub const BAD_CONNECTION_CLOSED: Self = Self(0x80AE_0000);
    /// Bad_ProtocolVersionUnsupported.
    pub const BAD_PROTOCOL_VERSION_UNSUPPORTED: Self = Self(0x80BE_0000);

    /// Returns the raw value.
    pub fn value(&self) -> u32 {
        self.0
    }

    /// Returns `true` if the severity bits mark this code as bad.
    pub fn is_bad(&self) -> bool {
        self.0 & 0x8000_0000 != 0
    }

    /// Returns the symbolic name, if known.
    pub fn name(&self) -> Option<&'static str> {
        let name = match *self {
            Self::GOOD => "Good",
            Self::BAD_INTERNAL_ERROR => "Bad_InternalError",
            Self::BAD_COMMUNICATION_ERROR => "Bad_CommunicationError",
            Self::BAD_TIMEOUT => "Bad_Timeout",
            Self::BAD_SHUTDOWN => "Bad_Shutdown",
            Self::BAD_SECURITY_CHECKS_FAILED => "Bad_SecurityChecksFailed",
            Self::BAD_SESSION_ID_INVALID => "Bad_SessionIdInvalid",
            Self::BAD_SESSION_CLOSED => "Bad_SessionClosed",
            Self::BAD_TCP_MESSAGE_TYPE_INVALID => "Bad_TcpMessageTypeInvalid",
            Self::BAD_TCP_SECURE_CHANNEL_UNKNOWN => "Bad_TcpSecureChannelUnknown",
            Self::BAD_TCP_MESSAGE_TOO_LARGE => "Bad_TcpMessageTooLarge",
            Self::BAD_TCP_NOT_ENOUGH_RESOURCES => "Bad_TcpNotEnoughResources",
            Self::BAD_TCP_INTERNAL_ERROR => "Bad_TcpInternalError",
            Self::BAD_TCP_ENDPOINT_URL_INVALID => "Bad_TcpEndpointUrlInvalid",
            Self::BAD_SECURE_CHANNEL_CLOSED => "Bad_SecureChannelClosed",
            Self::BAD_CONFIGURATION_ERROR => "Bad_ConfigurationError",
            Self::BAD_CONNECTION_REJECTED => "Bad_ConnectionRejected",
            Self::BAD_CONNECTION_CLOSED => "Bad_ConnectionClosed",
            Self::BAD_PROTOCOL_VERSION_UNSUPPORTED => "Bad_ProtocolVersionUnsupported",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} (0x{:08X})", name, self.0),
            None => write!(f, "0x{:08X}", self.0),
        }
    }
}

// =============================================================================
// ErrorSeverity
// =============================================================================

/// Error severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorSeverity {
    /// Informational - no action required.
    Info,
    /// Warning - action may be required.
    Warning,
    /// Error - action required, but recoverable.
    Error,
    /// Critical - immediate action required.
    Critical,
}

impl ErrorSeverity {
    /// Converts to tracing level.
    pub fn to_tracing_level(self) -> Level {
        match self {
            Self::Info => Level::INFO,
            Self::Warning => Level::WARN,
            Self::Error | Self::Critical => Level::ERROR,
        }
    }

    /// Returns the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// ErrorCode
// =============================================================================

/// Structured error code for categorization.
///
/// Format: `UA-XXYY` where XX is category and YY is specific error.
///
/// Categories:
/// - 1: Connection
/// - 2: Transport
/// - 3: Session
/// - 4: Configuration
/// - 5: Timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode {
    /// Category (1-5).
    pub category: u8,
    /// Specific error within category.
    pub code: u8,
}

impl ErrorCode {
    /// Creates a new error code.
    pub const fn new(category: u8, code: u8) -> Self {
        Self { category, code }
    }

    /// Returns the full error code as a u16.
    pub fn as_u16(&self) -> u16 {
        ((self.category as u16) << 8) | (self.code as u16)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UA-{:02X}{:02X}", self.category, self.code)
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// A Result type with UaError.
pub type UaResult<T> = Result<T, UaError>;

// =============================================================================
// Error Context Extension
// =============================================================================

/// Extension trait for adding context to errors.
pub trait UaErrorContext<T> {
    /// Adds endpoint context to errors.
    fn with_endpoint(self, endpoint: &str) -> Result<T, UaError>;

    /// Adds session context to errors.
    fn with_session(self, session_id: &str) -> Result<T, UaError>;
}

impl<T> UaErrorContext<T> for Result<T, UaError> {
    fn with_endpoint(self, endpoint: &str) -> Result<T, UaError> {
        self.map_err(|e| {
            tracing::debug!(endpoint = endpoint, error = %e, "Channel error with endpoint context");
            e
        })
    }

    fn with_session(self, session_id: &str) -> Result<T, UaError> {
        self.map_err(|e| {
            tracing::debug!(session_id = session_id, error = %e, "Session error with session context");
            e
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_closed_is_connection_error() {
        let error = UaError::connection_closed("server went away");
        assert!(error.is_connection_error());
        assert!(error.is_connection_closed());
        assert!(error.is_retryable());
        assert_eq!(error.status_code(), StatusCode::BAD_CONNECTION_CLOSED);
        assert!(error.to_string().contains("server went away"));
    }

    #[test]
    fn test_transport_errors_are_connection_errors() {
        assert!(UaError::frame_too_large(70_000, 65_535).is_connection_error());
        assert!(UaError::handshake_timeout(Duration::from_secs(5)).is_connection_error());
        assert!(!UaError::unsupported_profile("urn:nope").is_connection_error());
    }

    #[test]
    fn test_configuration_error_not_retryable() {
        let error = UaError::unsupported_profile("http://example.com/profile");
        assert!(!error.is_retryable());
        assert_eq!(error.severity(), ErrorSeverity::Critical);
        assert!(error.is_configuration_error());
    }

    #[test]
    fn test_frame_too_large_status() {
        let error = UaError::frame_too_large(70_000, 65_535);
        assert_eq!(error.status_code(), StatusCode::BAD_TCP_MESSAGE_TOO_LARGE);
        assert!(error.to_string().contains("70000"));
        assert!(error.to_string().contains("65535"));
    }

    #[test]
    fn test_server_error_keeps_status() {
        let error = ConnectionError::server_error(
            StatusCode::BAD_TCP_ENDPOINT_URL_INVALID,
            "unknown endpoint",
        );
        assert!(!error.is_retryable());
        assert_eq!(error.status_code(), StatusCode::BAD_TCP_ENDPOINT_URL_INVALID);
    }

    #[test]
    fn test_io_error_conversion() {
        let eof = io::Error::new(io::ErrorKind::UnexpectedEof, "eof");
        assert!(UaError::from(eof).is_connection_closed());

        let refused = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
        assert!(matches!(
            ConnectionError::from(refused),
            ConnectionError::Refused { .. }
        ));
    }

    #[test]
    fn test_status_code_display() {
        assert_eq!(
            StatusCode::BAD_CONNECTION_CLOSED.to_string(),
            "Bad_ConnectionClosed (0x80AE0000)"
        );
        assert_eq!(StatusCode(0x8123_0000).to_string(), "0x81230000");
        assert!(StatusCode::BAD_TIMEOUT.is_bad());
        assert!(!StatusCode::GOOD.is_bad());
    }

    #[test]
    fn test_error_code() {
        let code = ErrorCode::new(2, 3);
        assert_eq!(code.to_string(), "UA-0203");
        assert_eq!(code.as_u16(), 0x0203);
        assert_eq!(UaError::frame_too_large(1, 0).error_code(), code);
    }

    #[test]
    fn test_error_category() {
        assert_eq!(UaError::connection_closed("x").category(), "connection");
        assert_eq!(UaError::frame_too_large(1, 0).category(), "transport");
        assert_eq!(UaError::session(SessionError::Closed).category(), "session");
        assert_eq!(
            UaError::handshake_timeout(Duration::from_secs(1)).category(),
            "timeout"
        );
    }

    #[test]
    fn test_recovery_hints() {
        let error = ConnectionError::refused("opc.tcp://localhost:4840");
        assert!(error.recovery_hints().iter().any(|h| h.contains("running")));

        let error = ConfigurationError::invalid_limit("max_chunk_size", "too small");
        assert!(error.recovery_hints().iter().any(|h| h.contains("8192")));
    }

    #[test]
    fn test_user_messages() {
        let error = UaError::connection(ConnectionError::refused("opc.tcp://192.168.1.100:4840"));
        assert!(error.user_message().contains("192.168.1.100"));
    }

    #[test]
    fn test_timeout_duration() {
        let timeout = TimeoutError::handshake(Duration::from_secs(4));
        assert_eq!(timeout.duration(), Duration::from_secs(4));
        assert_eq!(timeout.error_code().to_string(), "UA-0502");
    }
}
