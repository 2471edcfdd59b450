// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Control-channel wire protocol.
//!
//! One JSON object per text frame:
//!
//! ```json
//! { "h": { "cid": 2, "ek": 0, "sn": 17 },
//!   "b": { "did": 0, "tn": "Chat", "tt": "...", "trt": "...", "qos": [] } }
//! ```
//!
//! `cid` and `ek` are closed integer enumerations shared with the server;
//! do not renumber them.

use crate::qos::QosPolicy;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Command carried by a header (`cid`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum CommandKind {
    Ok = 0,
    Error = 1,
    Create = 2,
    Connect = 3,
    Disconnect = 4,
    Close = 5,
    Write = 6,
    Log = 7,
}

impl From<CommandKind> for u8 {
    fn from(kind: CommandKind) -> Self {
        kind as u8
    }
}

impl TryFrom<u8> for CommandKind {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, String> {
        Ok(match code {
            0 => CommandKind::Ok,
            1 => CommandKind::Error,
            2 => CommandKind::Create,
            3 => CommandKind::Connect,
            4 => CommandKind::Disconnect,
            5 => CommandKind::Close,
            6 => CommandKind::Write,
            7 => CommandKind::Log,
            other => return Err(format!("unknown command kind {}", other)),
        })
    }
}

/// Entity a command targets (`ek`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum EntityKind {
    Topic = 0,
    DataReader = 1,
    DataWriter = 2,
    Runtime = 3,
    Worker = 4,
}

impl From<EntityKind> for u8 {
    fn from(kind: EntityKind) -> Self {
        kind as u8
    }
}

impl TryFrom<u8> for EntityKind {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, String> {
        Ok(match code {
            0 => Self::Topic,
            1 => Self::DataReader,
            2 => Self::DataWriter,
            3 => Self::Runtime,
            4 => Self::Worker,
            other => return Err(format!("unknown entity kind {}", other)),
        })
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Topic => "Topic",
            Self::DataReader => "DataReader",
            Self::DataWriter => "DataWriter",
            Self::Runtime => "Runtime",
            Self::Worker => "Worker",
        };
        f.write_str(name)
    }
}

/// Request/reply correlation tag (`sn`).
///
/// The client only ever issues positive ids, but replies may carry any
/// integer (the server uses `-1` for errors it cannot correlate).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(i64);

impl CorrelationId {
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    pub const fn value(self) -> i64 {
        self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    #[serde(rename = "cid")]
    pub command: CommandKind,
    #[serde(rename = "ek")]
    pub entity: EntityKind,
    #[serde(rename = "sn")]
    pub correlation_id: CorrelationId,
}

impl Header {
    pub fn new(command: CommandKind, entity: EntityKind, correlation_id: CorrelationId) -> Self {
        Self {
            command,
            entity,
            correlation_id,
        }
    }

    /// Header of a create command for `entity`.
    pub fn create(entity: EntityKind, correlation_id: CorrelationId) -> Self {
        Self::new(CommandKind::Create, entity, correlation_id)
    }
}

/// `{h, b}` envelope shared by commands and replies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<B> {
    #[serde(rename = "h")]
    pub header: Header,
    #[serde(rename = "b")]
    pub body: B,
}

impl<B: Serialize> Envelope<B> {
    pub fn new(header: Header, body: B) -> Self {
        Self { header, body }
    }

    /// Encode as one text frame.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Body of a create-topic command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicInfo {
    #[serde(rename = "did")]
    pub domain_id: u32,
    #[serde(rename = "tn")]
    pub topic_name: String,
    #[serde(rename = "tt")]
    pub data_type: String,
    #[serde(rename = "trt")]
    pub registration_type: String,
    #[serde(rename = "qos")]
    pub qos: Vec<QosPolicy>,
}

/// Body of a create-reader or create-writer command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointInfo {
    #[serde(rename = "did")]
    pub domain_id: u32,
    #[serde(rename = "tn")]
    pub topic_name: String,
    #[serde(rename = "qos")]
    pub qos: Vec<QosPolicy>,
}

/// Body of a reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyBody {
    /// Entity id, populated only on `Ok`.
    #[serde(rename = "eid", default)]
    pub entity_id: String,
    /// Human readable detail, meaningful on `Error`.
    #[serde(rename = "msg", default)]
    pub message: String,
}

/// A reply read from the control channel.
pub type CommandReply = Envelope<ReplyBody>;

impl CommandReply {
    /// Parse one text frame.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// `Ok` reply.
    pub fn ok(entity: EntityKind, correlation_id: CorrelationId, entity_id: impl Into<String>) -> Self {
        Self {
            header: Header::new(CommandKind::Ok, entity, correlation_id),
            body: ReplyBody {
                entity_id: entity_id.into(),
                message: String::new(),
            },
        }
    }

    /// `Error` reply.
    pub fn error(entity: EntityKind, correlation_id: CorrelationId, message: impl Into<String>) -> Self {
        Self {
            header: Header::new(CommandKind::Error, entity, correlation_id),
            body: ReplyBody {
                entity_id: String::new(),
                message: message.into(),
            },
        }
    }

    pub fn is_ok(&self) -> bool {
        self.header.command == CommandKind::Ok
    }

    /// Entity id of a successful reply, `None` otherwise or when empty.
    pub fn entity_id(&self) -> Option<&str> {
        if self.is_ok() && !self.body.entity_id.trim().is_empty() {
            Some(self.body.entity_id.as_str())
        } else {
            None
        }
    }
}
