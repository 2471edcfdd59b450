// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types for the Vortex client.
//!
//! Channel-level failures are fanned out to every outstanding request, so
//! [`VortexError`] is `Clone`; foreign errors are carried as strings.

use crate::config::ConfigError;
use crate::protocol::{CorrelationId, EntityKind};
use std::sync::Arc;
use thiserror::Error;

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, VortexError>;

/// Errors surfaced by the control channel, provisioner, session and data channels.
#[derive(Debug, Clone, Error)]
pub enum VortexError {
    /// Operation requires an open control channel.
    #[error("not connected to Vortex")]
    NotConnected,

    /// `connect` called while the channel is connecting or open.
    #[error("already connected to Vortex")]
    AlreadyConnected,

    /// The session was closed; it cannot be used again.
    #[error("session is closed")]
    SessionClosed,

    /// The server replied `Error` to a create command.
    #[error("{kind} creation failed: {message}")]
    EntityCreationFailed { kind: EntityKind, message: String },

    /// Outstanding requests failed because the receive loop terminated.
    #[error("control channel closed")]
    ChannelClosed,

    /// Data channel is not alive; the payload was not sent.
    #[error("data channel unavailable")]
    ChannelUnavailable,

    /// Correlation id is already pending.
    #[error("correlation id {0} is already pending")]
    DuplicateCorrelation(CorrelationId),

    /// Reply references a correlation id nobody is waiting for.
    #[error("reply for unknown correlation id {0}")]
    UnrecognizedReply(CorrelationId),

    /// No reply arrived before the request deadline.
    #[error("request {0} timed out")]
    Timeout(CorrelationId),

    /// The server sent something the protocol does not allow.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// JSON encoding or decoding failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// WebSocket transport failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Invalid client configuration.
    #[error("configuration error: {0}")]
    Config(Arc<ConfigError>),
}

impl From<serde_json::Error> for VortexError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for VortexError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

impl From<ConfigError> for VortexError {
    fn from(e: ConfigError) -> Self {
        Self::Config(Arc::new(e))
    }
}

impl VortexError {
    /// Whether this error was raised for the whole channel rather than one request.
    pub fn is_channel_level(&self) -> bool {
        matches!(self, Self::ChannelClosed | Self::Transport(_))
    }
}
