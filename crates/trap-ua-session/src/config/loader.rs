// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Loading `ClientConfig` from files.
//!
//! # Loading Pipeline
//!
//! 1. Detect format from the file extension (YAML, TOML or JSON)
//! 2. Parse into [`ClientConfig`]
//! 3. Apply environment variable overrides
//! 4. Validate
//!
//! # Environment Variable Override
//!
//! ```text
//! TRAP_UA_ENDPOINT_URL=opc.tcp://plc-02:4840
//! TRAP_UA_TRANSPORT_PROFILE_URI=http://opcfoundation.org/UA-Profile/Transport/wss-uasc-uabinary
//! TRAP_UA_MAX_MESSAGE_SIZE=4194304
//! TRAP_UA_MAX_CHUNK_SIZE=65535
//! ```

use std::env;
use std::fs;
use std::path::Path;

use tracing::{debug, info};

use super::ClientConfig;
use crate::error::{ConfigurationError, UaResult};

// =============================================================================
// ConfigLoader
// =============================================================================

/// Loader for [`ClientConfig`] files.
///
/// # Examples
///
/// ```no_run
/// use trap_ua_session::config::ConfigLoader;
///
/// let config = ConfigLoader::new().load("client.yaml").unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Environment variable prefix.
    env_prefix: String,

    /// Whether to apply environment overrides.
    apply_env: bool,
}

impl ConfigLoader {
    /// Creates a loader with the `TRAP_UA` prefix and overrides enabled.
    pub fn new() -> Self {
        Self {
            env_prefix: "TRAP_UA".to_string(),
            apply_env: true,
        }
    }

    /// Creates a builder for configuring the loader.
    pub fn builder() -> ConfigLoaderBuilder {
        ConfigLoaderBuilder::default()
    }

    /// Sets the environment variable prefix.
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Enables or disables environment overrides.
    pub fn with_env_overrides(mut self, enabled: bool) -> Self {
        self.apply_env = enabled;
        self
    }

    /// Loads configuration from a file. The format follows the extension.
    pub fn load(&self, path: impl AsRef<Path>) -> UaResult<ClientConfig> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading client configuration");

        let format = ConfigFormat::from_path(path)?;
        let content = fs::read_to_string(path)
            .map_err(|e| ConfigurationError::load(path.display().to_string(), e.to_string()))?;

        let config = self.load_from_str(&content, format)?;

        debug!(
            endpoint = %config.endpoint.endpoint_url,
            profile = %config.endpoint.transport_profile_uri,
            "Client configuration loaded"
        );
        Ok(config)
    }

    /// Loads configuration from a string.
    pub fn load_from_str(&self, content: &str, format: ConfigFormat) -> UaResult<ClientConfig> {
        let mut config = parse_str(content, format)?;

        if self.apply_env {
            self.apply_env_overrides(&mut config)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&self, config: &mut ClientConfig) -> UaResult<()> {
        if let Ok(value) = env::var(self.var("ENDPOINT_URL")) {
            config.endpoint.endpoint_url = value;
        }
        if let Ok(value) = env::var(self.var("TRANSPORT_PROFILE_URI")) {
            config.endpoint.transport_profile_uri = value;
        }
        if let Some(value) = self.numeric_var("MAX_MESSAGE_SIZE")? {
            config.channel.max_message_size = value;
        }
        if let Some(value) = self.numeric_var("MAX_CHUNK_SIZE")? {
            config.channel.max_chunk_size = value;
        }
        Ok(())
    }

    fn var(&self, name: &str) -> String {
        format!("{}_{}", self.env_prefix, name)
    }

    fn numeric_var(&self, name: &str) -> UaResult<Option<u32>> {
        let key = self.var(name);
        match env::var(&key) {
            Ok(value) => value
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| ConfigurationError::invalid_value(key, "expected a number").into()),
            Err(_) => Ok(None),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// ConfigLoaderBuilder
// =============================================================================

/// Builder for ConfigLoader.
#[derive(Debug, Default)]
pub struct ConfigLoaderBuilder {
    env_prefix: Option<String>,
    apply_env: Option<bool>,
}

impl ConfigLoaderBuilder {
    /// Sets the environment prefix.
    pub fn env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    /// Enables or disables environment overrides.
    pub fn env_overrides(mut self, enabled: bool) -> Self {
        self.apply_env = Some(enabled);
        self
    }

    /// Builds the ConfigLoader.
    pub fn build(self) -> ConfigLoader {
        let mut loader = ConfigLoader::new();
        if let Some(prefix) = self.env_prefix {
            loader.env_prefix = prefix;
        }
        if let Some(apply_env) = self.apply_env {
            loader.apply_env = apply_env;
        }
        loader
    }
}

// =============================================================================
// ConfigFormat
// =============================================================================

/// Supported configuration file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// YAML format.
    Yaml,
    /// TOML format.
    Toml,
    /// JSON format.
    Json,
}

impl ConfigFormat {
    /// Determines the format from a file path.
    pub fn from_path(path: &Path) -> UaResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());

        match ext.as_deref() {
            Some("yaml") | Some("yml") => Ok(ConfigFormat::Yaml),
            Some("toml") => Ok(ConfigFormat::Toml),
            Some("json") => Ok(ConfigFormat::Json),
            other => Err(ConfigurationError::load(
                path.display().to_string(),
                format!("unsupported extension '{}'", other.unwrap_or("(none)")),
            )
            .into()),
        }
    }

    /// Returns the format name.
    pub fn name(&self) -> &'static str {
        match self {
            ConfigFormat::Yaml => "YAML",
            ConfigFormat::Toml => "TOML",
            ConfigFormat::Json => "JSON",
        }
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn parse_str(content: &str, format: ConfigFormat) -> UaResult<ClientConfig> {
    let parsed = match format {
        ConfigFormat::Yaml => parse_yaml(content),
        ConfigFormat::Toml => toml::from_str(content).map_err(|e| e.to_string()),
        ConfigFormat::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
    };
    parsed.map_err(|message| ConfigurationError::parse(format.name(), message).into())
}

/// YAML is parsed through the `config` crate.
fn parse_yaml(content: &str) -> Result<ClientConfig, String> {
    ::config::Config::builder()
        .add_source(::config::File::from_str(content, ::config::FileFormat::Yaml))
        .build()
        .and_then(|c| c.try_deserialize())
        .map_err(|e| e.to_string())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UaError;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    fn yaml() -> &'static str {
        r#"
application_name: Line 3 Client
endpoint:
  endpoint_url: opc.wss://plc.local:443/ua
  transport_profile_uri: http://opcfoundation.org/UA-Profile/Transport/wss-uasc-uabinary
channel:
  max_message_size: 4194304
  max_chunk_size: 65535
  max_chunk_count: 128
  connect_timeout: 3s
  handshake_timeout: 5s
session:
  session_name: line-3
  session_timeout: 2m
  request_timeout: 15s
"#
    }

    #[test]
    fn test_load_yaml() {
        let mut file = NamedTempFile::with_suffix(".yaml").unwrap();
        file.write_all(yaml().as_bytes()).unwrap();

        let config = ConfigLoader::new().with_env_overrides(false).load(file.path()).unwrap();

        assert_eq!(config.application_name, "Line 3 Client");
        assert_eq!(config.endpoint.endpoint_url, "opc.wss://plc.local:443/ua");
        assert_eq!(config.channel.max_message_size, 4_194_304);
        assert_eq!(config.channel.handshake_timeout, Duration::from_secs(5));
        assert_eq!(config.session.session_timeout, Duration::from_secs(120));
    }

    #[test]
    fn test_load_toml() {
        let toml = r#"
[endpoint]
endpoint_url = "opc.tcp://localhost:4840"

[channel]
max_chunk_size = 16384
max_message_size = 65536
max_chunk_count = 4
"#;
        let mut file = NamedTempFile::with_suffix(".toml").unwrap();
        file.write_all(toml.as_bytes()).unwrap();

        let config = ConfigLoader::new().with_env_overrides(false).load(file.path()).unwrap();
        assert_eq!(config.channel.max_chunk_size, 16_384);
        assert_eq!(config.channel.connect_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_load_json_from_str() {
        let json = r#"{"endpoint": {"endpoint_url": "opc.tcp://localhost:4840"}}"#;
        let config = ConfigLoader::new()
            .with_env_overrides(false)
            .load_from_str(json, ConfigFormat::Json)
            .unwrap();
        assert_eq!(config.channel.max_chunk_size, 65_535);
    }

    #[test]
    fn test_invalid_profile_fails_validation() {
        let json = r#"{"endpoint": {"endpoint_url": "opc.tcp://localhost:4840",
                        "transport_profile_uri": "urn:unknown"}}"#;
        let result = ConfigLoader::new()
            .with_env_overrides(false)
            .load_from_str(json, ConfigFormat::Json);
        assert!(matches!(
            result,
            Err(UaError::Configuration(ConfigurationError::UnsupportedProfile { .. }))
        ));
    }

    #[test]
    fn test_parse_error() {
        let result = ConfigLoader::new().load_from_str("{ not json", ConfigFormat::Json);
        assert!(matches!(
            result,
            Err(UaError::Configuration(ConfigurationError::Parse { .. }))
        ));
    }

    #[test]
    fn test_env_override() {
        let loader = ConfigLoader::builder().env_prefix("TRAP_UA_LOADER_TEST").build();
        env::set_var("TRAP_UA_LOADER_TEST_MAX_CHUNK_SIZE", "32768");

        let json = r#"{"endpoint": {"endpoint_url": "opc.tcp://localhost:4840"}}"#;
        let config = loader.load_from_str(json, ConfigFormat::Json).unwrap();
        env::remove_var("TRAP_UA_LOADER_TEST_MAX_CHUNK_SIZE");

        assert_eq!(config.channel.max_chunk_size, 32_768);
    }

    #[test]
    fn test_config_format_from_path() {
        assert_eq!(ConfigFormat::from_path(Path::new("a.yml")).unwrap(), ConfigFormat::Yaml);
        assert_eq!(ConfigFormat::from_path(Path::new("a.TOML")).unwrap(), ConfigFormat::Toml);
        assert_eq!(ConfigFormat::from_path(Path::new("a.json")).unwrap(), ConfigFormat::Json);
        assert!(ConfigFormat::from_path(Path::new("a.ini")).is_err());
    }

    #[test]
    fn test_file_not_found() {
        let result = ConfigLoader::new().load("/nonexistent/client.yaml");
        assert!(matches!(
            result,
            Err(UaError::Configuration(ConfigurationError::Load { .. }))
        ));
    }
}
