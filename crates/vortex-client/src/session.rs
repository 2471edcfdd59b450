// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! User-facing session: one control channel, typed entity creation and
//! lifecycle events.
//!
//! # Example
//!
//! ```no_run
//! use vortex_client::{ClientConfig, Session};
//!
//! # async fn run() -> vortex_client::Result<()> {
//! let session = Session::new(ClientConfig::new("ws://localhost:9000", "token"));
//! session.connect().await?;
//!
//! let topic = session.create_topic::<serde_json::Value>("Chat", vec![]).await?;
//! let writer = session.create_writer::<serde_json::Value>(&topic, vec![]).await?;
//! writer.write(&serde_json::json!({"user": "ann", "msg": "hi"})).await?;
//!
//! session.close().await?;
//! # Ok(())
//! # }
//! ```

use crate::config::ClientConfig;
use crate::control::ControlChannel;
use crate::data::{DataReader, DataWriter};
use crate::error::{Result, VortexError};
use crate::provisioner::EntityProvisioner;
use crate::qos::{default_reader_qos, default_topic_qos, default_writer_qos, QosPolicy};
use crate::sequence::SequenceAllocator;
use crate::topic::{Topic, TopicType, TypeRegistration};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Lifecycle notification published by a [`Session`].
///
/// Events of one session are sent in the order the transitions happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Connected { url: String },
    Disconnected { url: String },
    Closed,
    TopicCreated { name: String },
    ReaderCreated { entity_id: String, topic: String },
    WriterCreated { entity_id: String, topic: String },
    ReaderClosed { entity_id: String },
    WriterClosed { entity_id: String },
}

/// Observable session state. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NotConnected,
    Connected,
    Closed,
}

struct Link {
    control: Arc<ControlChannel>,
    provisioner: Arc<EntityProvisioner>,
}

pub struct Session {
    config: ClientConfig,
    sequence: Arc<SequenceAllocator>,
    events: broadcast::Sender<SessionEvent>,
    link: Mutex<Option<Link>>,
    closed: AtomicBool,
    // Serializes connect/disconnect/close.
    lifecycle: tokio::sync::Mutex<()>,
}

impl Session {
    pub fn new(config: ClientConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            config,
            sequence: Arc::new(SequenceAllocator::new()),
            events,
            link: Mutex::new(None),
            closed: AtomicBool::new(false),
            lifecycle: tokio::sync::Mutex::new(()),
        }
    }

    /// Create a session and connect it.
    pub async fn open(config: ClientConfig) -> Result<Self> {
        let session = Self::new(config);
        session.connect().await?;
        Ok(session)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn domain_id(&self) -> u32 {
        self.config.domain_id
    }

    /// Receive lifecycle events published from now on.
    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> SessionState {
        if self.closed.load(Ordering::Acquire) {
            return SessionState::Closed;
        }
        match self.link.lock().as_ref() {
            Some(link) if link.control.is_open() => SessionState::Connected,
            _ => SessionState::NotConnected,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    pub fn is_closed(&self) -> bool {
        self.state() == SessionState::Closed
    }

    /// Open the control channel.
    ///
    /// A session whose control channel was dropped by the server may connect
    /// again; a closed session never does.
    pub async fn connect(&self) -> Result<()> {
        let _guard = self.lifecycle.lock().await;
        self.ensure_open()?;
        self.config.validate()?;

        if let Some(link) = self.link.lock().as_ref() {
            if link.control.is_open() {
                return Err(VortexError::AlreadyConnected);
            }
        }

        let control = Arc::new(ControlChannel::with_parts(
            &self.config,
            Arc::clone(&self.sequence),
            Some(self.events.clone()),
        ));
        control
            .connect(&self.config.endpoint, &self.config.auth_token)
            .await?;

        let provisioner = Arc::new(
            EntityProvisioner::new(Arc::clone(&control), &self.config)
                .with_events(self.events.clone()),
        );
        *self.link.lock() = Some(Link {
            control,
            provisioner,
        });
        info!("Session connected to {}", self.config.endpoint);
        Ok(())
    }

    /// Close the control channel. Data channels already open are unaffected.
    ///
    /// Disconnecting a session that is not connected is a no-op.
    pub async fn disconnect(&self) -> Result<()> {
        let _guard = self.lifecycle.lock().await;
        self.ensure_open()?;
        self.shutdown_link().await
    }

    /// Disconnect and mark the session closed for good. Idempotent.
    pub async fn close(&self) -> Result<()> {
        let _guard = self.lifecycle.lock().await;
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.shutdown_link().await?;
        let _ = self.events.send(SessionEvent::Closed);
        info!("Session closed");
        Ok(())
    }

    /// Create a topic whose type registration is derived from `T`.
    ///
    /// An empty `qos` uses [`default_topic_qos`].
    pub async fn create_topic<T: TopicType>(
        &self,
        name: &str,
        qos: Vec<QosPolicy>,
    ) -> Result<Topic> {
        let qos = or_default(qos, default_topic_qos);
        self.provisioner()?
            .create_registered_topic(self.domain_id(), name, TypeRegistration::of::<T>(), qos)
            .await
    }

    /// Create a topic with explicit type names.
    pub async fn create_topic_with_types(
        &self,
        name: &str,
        data_type: &str,
        registration_type: &str,
        qos: Vec<QosPolicy>,
    ) -> Result<Topic> {
        let qos = or_default(qos, default_topic_qos);
        self.provisioner()?
            .create_topic(self.domain_id(), name, data_type, registration_type, qos)
            .await
    }

    /// Create a reader on `topic`. An empty `qos` uses [`default_reader_qos`].
    pub async fn create_reader<T: TopicType>(
        &self,
        topic: &Topic,
        qos: Vec<QosPolicy>,
    ) -> Result<DataReader<T>> {
        let qos = or_default(qos, default_reader_qos);
        self.provisioner()?.create_reader(topic, qos).await
    }

    /// Create a writer on `topic`. An empty `qos` uses [`default_writer_qos`].
    pub async fn create_writer<T: TopicType>(
        &self,
        topic: &Topic,
        qos: Vec<QosPolicy>,
    ) -> Result<DataWriter<T>> {
        let qos = or_default(qos, default_writer_qos);
        self.provisioner()?.create_writer(topic, qos).await
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(VortexError::SessionClosed)
        } else {
            Ok(())
        }
    }

    fn provisioner(&self) -> Result<Arc<EntityProvisioner>> {
        self.ensure_open()?;
        self.link
            .lock()
            .as_ref()
            .map(|link| Arc::clone(&link.provisioner))
            .ok_or(VortexError::NotConnected)
    }

    async fn shutdown_link(&self) -> Result<()> {
        let link = self.link.lock().take();
        match link {
            Some(link) => {
                debug!("Disconnecting control channel");
                link.control.disconnect().await
            }
            None => Ok(()),
        }
    }
}

fn or_default(qos: Vec<QosPolicy>, default: fn() -> Vec<QosPolicy>) -> Vec<QosPolicy> {
    if qos.is_empty() {
        default()
    } else {
        qos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn new_session_is_not_connected() {
        let session = Session::new(ClientConfig::default());
        assert_eq!(session.state(), SessionState::NotConnected);
        let err = session
            .create_topic::<serde_json::Value>("Chat", vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, VortexError::NotConnected));
    }

    #[tokio::test]
    async fn close_is_terminal_and_idempotent() {
        let session = Session::new(ClientConfig::default());
        let mut events = session.subscribe_events();

        session.close().await.unwrap();
        session.close().await.unwrap();

        assert!(session.is_closed());
        assert_eq!(events.try_recv().unwrap(), SessionEvent::Closed);
        assert!(events.try_recv().is_err());
        assert!(matches!(
            session.connect().await,
            Err(VortexError::SessionClosed)
        ));
        assert!(matches!(
            session.disconnect().await,
            Err(VortexError::SessionClosed)
        ));
    }

    #[tokio::test]
    async fn connect_rejects_invalid_config() {
        let session = Session::new(ClientConfig::new("http://host", "T"));
        assert!(matches!(
            session.connect().await,
            Err(VortexError::Config(_))
        ));
        assert_eq!(session.state(), SessionState::NotConnected);
    }

    #[tokio::test]
    async fn disconnect_without_connect_is_noop() {
        let session = Session::new(ClientConfig::default());
        session.disconnect().await.unwrap();
        assert_eq!(session.state(), SessionState::NotConnected);
    }

    #[test]
    fn empty_qos_falls_back_to_defaults() {
        assert_eq!(or_default(vec![], default_writer_qos), default_writer_qos());
        let explicit = vec![QosPolicy::keep_all()];
        assert_eq!(or_default(explicit.clone(), default_writer_qos), explicit);
    }
}
