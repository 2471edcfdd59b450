// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Client configuration.
//!
//! Supports both programmatic and file-based configuration.
//!
//! ```toml
//! endpoint = "ws://localhost:9000"
//! auth_token = "secret"
//! domain_id = 0
//! request_timeout_ms = 5000
//!
//! [paths]
//! control = "/vortex/controller/"
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Server endpoint, e.g. `ws://localhost:9000`.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Authorization token appended to the control path.
    #[serde(default)]
    pub auth_token: String,

    /// DDS domain the session operates in.
    #[serde(default)]
    pub domain_id: u32,

    /// Per-request deadline (milliseconds).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// How long `disconnect` waits for the orderly close (milliseconds).
    #[serde(default = "default_close_timeout")]
    pub close_timeout_ms: u64,

    /// Lifecycle event buffer size.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Samples a reader holds before it stops reading its socket.
    #[serde(default = "default_reader_buffer")]
    pub reader_buffer: usize,

    /// Path segments agreed with the server.
    #[serde(default)]
    pub paths: PathConfig,

    /// Log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_endpoint() -> String {
    "ws://localhost:9000".to_string()
}

fn default_request_timeout() -> u64 {
    10_000
}

fn default_close_timeout() -> u64 {
    2_000
}

fn default_event_capacity() -> usize {
    256
}

fn default_reader_buffer() -> usize {
    64
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            auth_token: String::new(),
            domain_id: 0,
            request_timeout_ms: default_request_timeout(),
            close_timeout_ms: default_close_timeout(),
            event_capacity: default_event_capacity(),
            reader_buffer: default_reader_buffer(),
            paths: PathConfig::default(),
            log_level: default_log_level(),
        }
    }
}

impl ClientConfig {
    /// Create a configuration for the given endpoint and token.
    pub fn new(endpoint: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            auth_token: auth_token.into(),
            ..Default::default()
        }
    }

    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the domain ID.
    pub fn domain(mut self, domain_id: u32) -> Self {
        self.domain_id = domain_id;
        self
    }

    /// Set the per-request deadline.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set how long `disconnect` waits for the server to acknowledge the close.
    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the per-reader sample buffer.
    pub fn reader_buffer(mut self, samples: usize) -> Self {
        self.reader_buffer = samples;
        self
    }

    /// Set the path segments.
    pub fn paths(mut self, paths: PathConfig) -> Self {
        self.paths = paths;
        self
    }

    /// Per-request deadline.
    pub fn request_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Close wait.
    pub fn close_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.endpoint.starts_with("ws://") || self.endpoint.starts_with("wss://")) {
            return Err(ConfigError::Invalid(format!(
                "Endpoint must be a ws:// or wss:// URL, got '{}'",
                self.endpoint
            )));
        }
        if self.endpoint.ends_with('/') {
            return Err(ConfigError::Invalid(
                "Endpoint must not end with '/'".into(),
            ));
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid("request_timeout_ms must be > 0".into()));
        }
        if self.close_timeout_ms == 0 {
            return Err(ConfigError::Invalid("close_timeout_ms must be > 0".into()));
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::Invalid("event_capacity must be > 0".into()));
        }
        if self.reader_buffer == 0 {
            return Err(ConfigError::Invalid("reader_buffer must be > 0".into()));
        }
        self.paths.validate()
    }
}

/// Fixed path segments for the control and data channels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathConfig {
    /// Control channel path, followed by the auth token.
    #[serde(default = "default_control_path")]
    pub control: String,

    /// Reader data channel path, followed by the entity id.
    #[serde(default = "default_reader_path")]
    pub reader: String,

    /// Writer data channel path, followed by the entity id.
    #[serde(default = "default_writer_path")]
    pub writer: String,
}

fn default_control_path() -> String {
    "/vortex/controller/".to_string()
}

fn default_reader_path() -> String {
    "/vortex/reader/".to_string()
}

fn default_writer_path() -> String {
    "/vortex/writer/".to_string()
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            control: default_control_path(),
            reader: default_reader_path(),
            writer: default_writer_path(),
        }
    }
}

impl PathConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        for (name, segment) in [
            ("control", &self.control),
            ("reader", &self.reader),
            ("writer", &self.writer),
        ] {
            if !segment.starts_with('/') || !segment.ends_with('/') {
                return Err(ConfigError::Invalid(format!(
                    "Path '{}' ({}) must start and end with '/'",
                    name, segment
                )));
            }
        }
        Ok(())
    }
}
