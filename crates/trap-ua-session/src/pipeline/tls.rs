// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! TLS context providers.
//!
//! The pipeline builder never decides trust on its own. It asks a
//! [`TlsContextProvider`] for a `rustls` client configuration and installs
//! whatever it gets.

use std::fmt;
use std::sync::Arc;

use rustls::{ClientConfig, RootCertStore};

use crate::error::{TransportError, UaResult};

/// Supplies trust and identity material for secure WebSocket endpoints.
pub trait TlsContextProvider: Send + Sync + fmt::Debug {
    /// Returns the client configuration to use for `server_name`.
    fn client_config(&self, server_name: &str) -> UaResult<Arc<ClientConfig>>;
}

// =============================================================================
// WebPkiTlsContext
// =============================================================================

/// Verifies servers against the Mozilla root program.
pub struct WebPkiTlsContext {
    config: Arc<ClientConfig>,
}

impl WebPkiTlsContext {
    /// Builds a context using the `ring` provider and `webpki-roots`.
    pub fn new() -> UaResult<Self> {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let config = ClientConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .map_err(|e| TransportError::tls(e.to_string()))?
        .with_root_certificates(roots)
        .with_no_client_auth();

        Ok(Self {
            config: Arc::new(config),
        })
    }
}

impl fmt::Debug for WebPkiTlsContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebPkiTlsContext")
            .field("roots", &webpki_roots::TLS_SERVER_ROOTS.len())
            .finish()
    }
}

impl TlsContextProvider for WebPkiTlsContext {
    fn client_config(&self, _server_name: &str) -> UaResult<Arc<ClientConfig>> {
        Ok(Arc::clone(&self.config))
    }
}

// =============================================================================
// StaticTlsContext
// =============================================================================

/// Hands out a caller-supplied configuration, e.g. one trusting a private CA.
#[derive(Debug, Clone)]
pub struct StaticTlsContext {
    config: Arc<ClientConfig>,
}

impl StaticTlsContext {
    /// Wraps an existing configuration.
    pub fn new(config: Arc<ClientConfig>) -> Self {
        Self { config }
    }
}

impl TlsContextProvider for StaticTlsContext {
    fn client_config(&self, _server_name: &str) -> UaResult<Arc<ClientConfig>> {
        Ok(Arc::clone(&self.config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_webpki_context_builds() {
        let context = WebPkiTlsContext::new().unwrap();
        let a = context.client_config("plc.example.com").unwrap();
        let b = context.client_config("other.example.com").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_static_context_returns_given_config() {
        let base = WebPkiTlsContext::new().unwrap().client_config("x").unwrap();
        let context = StaticTlsContext::new(Arc::clone(&base));
        assert!(Arc::ptr_eq(&context.client_config("y").unwrap(), &base));
    }
}
