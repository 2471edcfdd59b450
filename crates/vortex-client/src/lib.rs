// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Vortex client
//!
//! Client access layer for a DDS data space fronted by WebSockets. A single
//! control channel multiplexes entity-creation commands from any number of
//! concurrent callers; each successful reader or writer creation opens a
//! dedicated data channel.
//!
//! # Features
//!
//! - **Correlated control channel**: replies are routed by correlation id,
//!   whatever order they arrive in
//! - **Per-request deadlines**: a request without a reply times out cleanly
//! - **Typed data channels**: `DataReader<T>` is a `Stream`, `DataWriter<T>`
//!   reports an unavailable channel instead of dropping samples
//! - **Lifecycle events**: connect, disconnect and entity events on a
//!   broadcast channel
//!
//! # Quick Start
//!
//! ```no_run
//! use futures::StreamExt;
//! use vortex_client::{ClientConfig, QosPolicy, Session};
//!
//! # async fn run() -> vortex_client::Result<()> {
//! let session = Session::open(ClientConfig::new("ws://localhost:9000", "token")).await?;
//! let topic = session.create_topic::<serde_json::Value>("Chat", vec![]).await?;
//!
//! let mut reader = session
//!     .create_reader::<serde_json::Value>(&topic, vec![QosPolicy::reliable()])
//!     .await?;
//! while let Some(sample) = reader.next().await {
//!     println!("{}", sample?);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration File
//!
//! ```toml
//! endpoint = "ws://localhost:9000"
//! auth_token = "secret"
//! domain_id = 0
//! request_timeout_ms = 10000
//!
//! [paths]
//! control = "/vortex/controller/"
//! ```

pub mod config;
pub mod control;
pub mod data;
pub mod error;
pub mod logging;
pub mod pending;
pub mod protocol;
pub mod provisioner;
pub mod qos;
pub mod sequence;
pub mod session;
pub mod topic;

pub use config::{ClientConfig, ConfigError, PathConfig};
pub use control::{ChannelState, ControlChannel};
pub use data::{DataHolder, DataReader, DataWriter};
pub use error::{Result, VortexError};
pub use pending::{PendingRequestTable, ReplyWaiter};
pub use protocol::{CommandKind, CommandReply, CorrelationId, EntityKind};
pub use provisioner::EntityProvisioner;
pub use qos::{DurabilityKind, HistoryKind, QosPolicy, ReliabilityKind};
pub use sequence::SequenceAllocator;
pub use session::{Session, SessionEvent, SessionState};
pub use topic::{KeyHash, PayloadEncoding, Topic, TopicType, TypeRegistration};
