// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Entity creation over the control channel.
//!
//! Every creation follows the same path: build the body, send a `Create`
//! command, await the correlated reply, then branch on its command kind.
//! Readers and writers additionally open their data channel at the address
//! derived from the server-assigned entity id. A rejected creation never
//! opens a data channel.

use crate::config::{ClientConfig, PathConfig};
use crate::control::ControlChannel;
use crate::data::{DataReader, DataWriter};
use crate::error::{Result, VortexError};
use crate::protocol::{CommandKind, CommandReply, EndpointInfo, EntityKind, TopicInfo};
use crate::qos::QosPolicy;
use crate::session::SessionEvent;
use crate::topic::{Topic, TopicType, TypeRegistration};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Accept `Ok`, turn `Error` into [`VortexError::EntityCreationFailed`].
fn check_reply(kind: EntityKind, reply: CommandReply) -> Result<CommandReply> {
    match reply.header.command {
        CommandKind::Ok => Ok(reply),
        CommandKind::Error => {
            warn!("{} creation rejected: {}", kind, reply.body.message);
            Err(VortexError::EntityCreationFailed {
                kind,
                message: reply.body.message,
            })
        }
        other => Err(VortexError::Protocol(format!(
            "unexpected {:?} reply to {} creation",
            other, kind
        ))),
    }
}

fn assigned_entity_id(kind: EntityKind, reply: &CommandReply) -> Result<String> {
    reply
        .entity_id()
        .map(str::to_string)
        .ok_or_else(|| VortexError::Protocol(format!("{} created without an entity id", kind)))
}

/// Drives topic, reader and writer creation.
pub struct EntityProvisioner {
    control: Arc<ControlChannel>,
    endpoint: String,
    paths: PathConfig,
    close_timeout: Duration,
    reader_buffer: usize,
    events: Option<broadcast::Sender<SessionEvent>>,
}

impl EntityProvisioner {
    pub fn new(control: Arc<ControlChannel>, config: &ClientConfig) -> Self {
        Self {
            control,
            endpoint: config.endpoint.clone(),
            paths: config.paths.clone(),
            close_timeout: config.close_timeout_duration(),
            reader_buffer: config.reader_buffer,
            events: None,
        }
    }

    /// Publish creation events on `events`.
    pub fn with_events(mut self, events: broadcast::Sender<SessionEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Data channel address of reader `entity_id`.
    pub fn reader_url(&self, entity_id: &str) -> String {
        format!("{}{}{}", self.endpoint, self.paths.reader, entity_id)
    }

    /// Data channel address of writer `entity_id`.
    pub fn writer_url(&self, entity_id: &str) -> String {
        format!("{}{}{}", self.endpoint, self.paths.writer, entity_id)
    }

    /// Create a topic from explicit type names.
    ///
    /// `registration_type` is canonicalized to its `::` form.
    pub async fn create_topic(
        &self,
        domain_id: u32,
        name: &str,
        data_type: &str,
        registration_type: &str,
        qos: Vec<QosPolicy>,
    ) -> Result<Topic> {
        let registration = TypeRegistration::explicit(data_type, registration_type);
        self.create_registered_topic(domain_id, name, registration, qos)
            .await
    }

    /// Create a topic with a prepared type registration.
    pub async fn create_registered_topic(
        &self,
        domain_id: u32,
        name: &str,
        registration: TypeRegistration,
        qos: Vec<QosPolicy>,
    ) -> Result<Topic> {
        let body = TopicInfo {
            domain_id,
            topic_name: name.to_string(),
            data_type: registration.data_type.clone(),
            registration_type: registration.registration_type.clone(),
            qos: qos.clone(),
        };
        debug!(
            "Creating topic '{}' ({}) in domain {}",
            name, registration.data_type, domain_id
        );

        let reply = self
            .control
            .request(CommandKind::Create, EntityKind::Topic, &body)
            .await?;
        check_reply(EntityKind::Topic, reply)?;

        info!("Topic '{}' created in domain {}", name, domain_id);
        if let Some(events) = &self.events {
            let _ = events.send(SessionEvent::TopicCreated {
                name: name.to_string(),
            });
        }
        Ok(Topic::new(domain_id, name, registration, qos))
    }

    /// Create a reader on `topic` and open its data channel.
    pub async fn create_reader<T: TopicType>(
        &self,
        topic: &Topic,
        qos: Vec<QosPolicy>,
    ) -> Result<DataReader<T>> {
        let entity_id = self
            .create_endpoint(EntityKind::DataReader, topic, qos)
            .await?;
        DataReader::open(
            &self.reader_url(&entity_id),
            entity_id,
            topic,
            self.reader_buffer,
            self.events.clone(),
        )
        .await
    }

    /// Create a writer on `topic` and open its data channel.
    pub async fn create_writer<T: TopicType>(
        &self,
        topic: &Topic,
        qos: Vec<QosPolicy>,
    ) -> Result<DataWriter<T>> {
        let entity_id = self
            .create_endpoint(EntityKind::DataWriter, topic, qos)
            .await?;
        DataWriter::open(
            &self.writer_url(&entity_id),
            entity_id,
            topic,
            self.close_timeout,
            self.events.clone(),
        )
        .await
    }

    async fn create_endpoint(
        &self,
        kind: EntityKind,
        topic: &Topic,
        qos: Vec<QosPolicy>,
    ) -> Result<String> {
        let body = EndpointInfo {
            domain_id: topic.domain_id,
            topic_name: topic.name.clone(),
            qos,
        };
        debug!("Creating {} on topic '{}'", kind, topic.name);

        let reply = self.control.request(CommandKind::Create, kind, &body).await?;
        let reply = check_reply(kind, reply)?;
        let entity_id = assigned_entity_id(kind, &reply)?;
        debug!("{} {} created on topic '{}'", kind, entity_id, topic.name);
        Ok(entity_id)
    }
}
