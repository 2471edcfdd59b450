// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Control channel: the one persistent WebSocket to the control endpoint.
//!
//! Any number of tasks may issue commands concurrently. Each command is
//! registered in the [`PendingRequestTable`] before it is queued for
//! transmission; a single writer task owns the sink so frames never
//! interleave, and a single receive loop resolves replies by correlation id.
//!
//! ```text
//! caller --request()--> register(id) --> outbound queue --> writer task --> server
//! caller <--waiter----- resolve(id)  <-- receive loop   <------------------ server
//! ```
//!
//! When the receive loop ends (orderly close, transport error, malformed
//! reply) the channel tears down: state goes to `Disconnected` and every
//! outstanding waiter fails with [`VortexError::ChannelClosed`].

use crate::config::{ClientConfig, PathConfig};
use crate::error::{Result, VortexError};
use crate::pending::{PendingRequestTable, ReplyWaiter};
use crate::protocol::{CommandKind, CommandReply, EntityKind, Envelope, Header};
use crate::sequence::SequenceAllocator;
use crate::session::SessionEvent;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
pub(crate) type WsSink = SplitSink<WsStream, Message>;
pub(crate) type WsSource = SplitStream<WsStream>;

/// Open a WebSocket at `url`.
pub(crate) async fn open_socket(url: &str) -> Result<WsStream> {
    let (ws, _response) = tokio_tungstenite::connect_async(url).await?;
    Ok(ws)
}

/// Close frame sent on an orderly client-side close.
pub(crate) fn client_close() -> CloseFrame<'static> {
    CloseFrame {
        code: CloseCode::Normal,
        reason: "Closed by client".into(),
    }
}

pub(crate) fn client_close_frame() -> Message {
    Message::Close(Some(client_close()))
}

/// Connection state of a [`ControlChannel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Open,
}

/// State shared between the channel handle, the writer task and the receive loop.
struct Shared {
    state: Mutex<ChannelState>,
    pending: PendingRequestTable,
    sequence: Arc<SequenceAllocator>,
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    endpoint: Mutex<Option<String>>,
    events: Option<broadcast::Sender<SessionEvent>>,
    // Bumped by every connect; tasks of an older connection carry a stale value.
    generation: AtomicU64,
}

impl Shared {
    fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Move `Disconnected -> Connecting` and return the new connection's generation.
    fn begin_connect(&self) -> Result<u64> {
        let mut state = self.state.lock();
        if *state != ChannelState::Disconnected {
            return Err(VortexError::AlreadyConnected);
        }
        *state = ChannelState::Connecting;
        Ok(self.generation.fetch_add(1, Ordering::AcqRel) + 1)
    }

    fn abandon_connect(&self) {
        *self.state.lock() = ChannelState::Disconnected;
    }

    /// Install the outbound queue and move `Connecting -> Open`.
    fn mark_open(&self, endpoint: &str, outbound: mpsc::UnboundedSender<Message>) {
        let mut state = self.state.lock();
        *self.outbound.lock() = Some(outbound);
        *self.endpoint.lock() = Some(endpoint.to_string());
        *state = ChannelState::Open;
    }

    /// Resolve one inbound text frame against the pending table.
    ///
    /// Only a frame that is not a valid reply is an error; unknown ids are
    /// logged and dropped.
    fn dispatch(&self, text: &str) -> Result<()> {
        let reply = CommandReply::from_json(text)
            .map_err(|e| VortexError::Protocol(format!("malformed reply: {}", e)))?;
        let id = reply.header.correlation_id;
        if self.pending.resolve(id, reply) {
            debug!("Resolved reply sn={}", id);
        } else {
            warn!("{}, dropping", VortexError::UnrecognizedReply(id));
        }
        Ok(())
    }

    /// Tear down connection `generation`.
    ///
    /// Idempotent: the first call after the channel went live emits
    /// `Disconnected`. A call for a superseded connection does nothing.
    fn teardown(&self, generation: u64, reason: &str) {
        let (was_live, failed) = {
            let mut state = self.state.lock();
            if self.current_generation() != generation {
                debug!("Ignoring teardown of superseded connection ({})", reason);
                return;
            }
            let was_live = *state != ChannelState::Disconnected;
            *state = ChannelState::Disconnected;

            // Dropping the sender ends the writer task, which closes the sink.
            self.outbound.lock().take();
            (was_live, self.pending.fail_all(VortexError::ChannelClosed))
        };

        if was_live {
            let url = self.endpoint.lock().clone().unwrap_or_default();
            info!(
                "Control channel to {} closed ({}), {} request(s) failed",
                url, reason, failed
            );
            if let Some(events) = &self.events {
                let _ = events.send(SessionEvent::Disconnected { url });
            }
        }
    }
}

struct ChannelTasks {
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

/// Client side of the control protocol.
pub struct ControlChannel {
    paths: PathConfig,
    request_timeout: Duration,
    close_timeout: Duration,
    shared: Arc<Shared>,
    tasks: Mutex<Option<ChannelTasks>>,
}

impl ControlChannel {
    /// Create a disconnected channel using the paths and timeouts from `config`.
    pub fn new(config: &ClientConfig) -> Self {
        Self::with_parts(config, Arc::new(SequenceAllocator::new()), None)
    }

    /// Create a channel that draws ids from `sequence` and reports
    /// connect/disconnect transitions on `events`.
    pub fn with_parts(
        config: &ClientConfig,
        sequence: Arc<SequenceAllocator>,
        events: Option<broadcast::Sender<SessionEvent>>,
    ) -> Self {
        Self {
            paths: config.paths.clone(),
            request_timeout: config.request_timeout_duration(),
            close_timeout: config.close_timeout_duration(),
            shared: Arc::new(Shared {
                state: Mutex::new(ChannelState::Disconnected),
                pending: PendingRequestTable::new(),
                sequence,
                outbound: Mutex::new(None),
                endpoint: Mutex::new(None),
                events,
                generation: AtomicU64::new(0),
            }),
            tasks: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ChannelState {
        *self.shared.state.lock()
    }

    pub fn is_open(&self) -> bool {
        self.state() == ChannelState::Open
    }

    /// Number of requests awaiting a reply.
    pub fn pending_requests(&self) -> usize {
        self.shared.pending.len()
    }

    /// Endpoint of the current (or last) connection.
    pub fn endpoint(&self) -> Option<String> {
        self.shared.endpoint.lock().clone()
    }

    /// Open the transport at `{endpoint}{control path}{auth_token}` and start
    /// the receive loop.
    pub async fn connect(&self, endpoint: &str, auth_token: &str) -> Result<()> {
        let generation = self.shared.begin_connect()?;
        if let Some(stale) = self.tasks.lock().take() {
            stale.reader.abort();
            stale.writer.abort();
        }

        info!("Connecting control channel to {}", endpoint);
        let url = format!("{}{}{}", endpoint, self.paths.control, auth_token);
        let ws = match open_socket(&url).await {
            Ok(ws) => ws,
            Err(e) => {
                self.shared.abandon_connect();
                error!("Control channel connect to {} failed: {}", endpoint, e);
                return Err(e);
            }
        };

        let (sink, stream) = ws.split();
        let (tx, rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(write_loop(Arc::clone(&self.shared), generation, sink, rx));

        // Open before the receive loop exists, so an immediate server close
        // is observed as Open -> Disconnected.
        self.shared.mark_open(endpoint, tx);
        if let Some(events) = &self.shared.events {
            let _ = events.send(SessionEvent::Connected {
                url: endpoint.to_string(),
            });
        }
        info!("Control channel to {} open", endpoint);

        let reader = tokio::spawn(receive_loop(Arc::clone(&self.shared), generation, stream));
        *self.tasks.lock() = Some(ChannelTasks { reader, writer });
        Ok(())
    }

    /// Register a command and queue it for transmission.
    ///
    /// The returned waiter resolves with the reply carrying the same
    /// correlation id, or with `ChannelClosed` if the channel fails first.
    pub fn send_command<B: Serialize>(
        &self,
        command: CommandKind,
        entity: EntityKind,
        body: &B,
    ) -> Result<ReplyWaiter> {
        if !self.is_open() {
            return Err(VortexError::NotConnected);
        }

        let id = self.shared.sequence.next();
        let frame = Envelope::new(Header::new(command, entity, id), body).to_json()?;

        // Registered strictly before the frame can reach the server.
        let waiter = self.shared.pending.register(id)?;

        let queued = match self.shared.outbound.lock().as_ref() {
            Some(tx) => tx.send(Message::Text(frame)).is_ok(),
            None => false,
        };
        if !queued {
            // Teardown raced us; it has already dropped the queue.
            self.shared.pending.cancel(id);
            return Err(VortexError::ChannelClosed);
        }

        debug!("Sent {:?} {} sn={}", command, entity, id);
        Ok(waiter)
    }

    /// Send a command and wait for its reply with the configured deadline.
    pub async fn request<B: Serialize>(
        &self,
        command: CommandKind,
        entity: EntityKind,
        body: &B,
    ) -> Result<CommandReply> {
        self.request_with_timeout(command, entity, body, self.request_timeout)
            .await
    }

    /// Send a command and wait at most `deadline` for its reply.
    ///
    /// On expiry the request is removed from the pending table; a reply that
    /// arrives later is treated as unrecognized.
    pub async fn request_with_timeout<B: Serialize>(
        &self,
        command: CommandKind,
        entity: EntityKind,
        body: &B,
        deadline: Duration,
    ) -> Result<CommandReply> {
        let mut waiter = self.send_command(command, entity, body)?;
        let id = waiter.id();
        match tokio::time::timeout(deadline, &mut waiter).await {
            Ok(result) => result,
            Err(_) => {
                if self.shared.pending.cancel(id) {
                    warn!("Request sn={} timed out after {:?}", id, deadline);
                    Err(VortexError::Timeout(id))
                } else {
                    // Resolved between expiry and cancel: the slot is already filled.
                    waiter.await
                }
            }
        }
    }

    /// Request an orderly close and wait for the receive loop to finish.
    ///
    /// Disconnecting a channel that is not connected is a no-op.
    pub async fn disconnect(&self) -> Result<()> {
        let generation = self.shared.current_generation();
        let tasks = self.tasks.lock().take();
        let Some(mut tasks) = tasks else {
            return Ok(());
        };

        if let Some(tx) = self.shared.outbound.lock().as_ref() {
            debug!("Requesting control channel close");
            let _ = tx.send(client_close_frame());
        }

        if tokio::time::timeout(self.close_timeout, &mut tasks.reader)
            .await
            .is_err()
        {
            warn!(
                "Server did not acknowledge close within {:?}, forcing teardown",
                self.close_timeout
            );
            tasks.reader.abort();
        }
        self.shared.teardown(generation, "disconnect");

        if tokio::time::timeout(self.close_timeout, &mut tasks.writer)
            .await
            .is_err()
        {
            tasks.writer.abort();
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn shared_pending(&self) -> &PendingRequestTable {
        &self.shared.pending
    }
}

impl Drop for ControlChannel {
    fn drop(&mut self) {
        if let Some(tasks) = self.tasks.get_mut().take() {
            tasks.reader.abort();
            tasks.writer.abort();
        }
        self.shared.teardown(self.shared.current_generation(), "dropped");
    }
}

/// Sole owner of the sink: frames are written one at a time in queue order.
async fn write_loop(
    shared: Arc<Shared>,
    generation: u64,
    mut sink: WsSink,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(msg) = rx.recv().await {
        if let Err(e) = sink.send(msg).await {
            error!("Control channel send failed: {}", e);
            shared.teardown(generation, "send failure");
            break;
        }
    }
    let _ = sink.close().await;
    debug!("Control channel writer stopped");
}

/// Runs for the lifetime of the open channel.
async fn receive_loop(shared: Arc<Shared>, generation: u64, mut stream: WsSource) {
    let reason = loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                if let Err(e) = shared.dispatch(&text) {
                    warn!("{}", e);
                    break "malformed reply";
                }
            }
            Some(Ok(Message::Binary(bytes))) => {
                let dispatched = String::from_utf8(bytes)
                    .map_err(|e| VortexError::Protocol(format!("non UTF-8 reply: {}", e)))
                    .and_then(|text| shared.dispatch(&text));
                if let Err(e) = dispatched {
                    warn!("{}", e);
                    break "malformed reply";
                }
            }
            Some(Ok(Message::Close(frame))) => {
                debug!("Control channel close frame: {:?}", frame);
                break "closed by peer";
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                warn!("Control channel receive error: {}", e);
                break "transport error";
            }
            None => break "end of stream",
        }
    };
    shared.teardown(generation, reason);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{CorrelationId, EndpointInfo};

    #[tokio::test]
    async fn send_requires_open_channel() {
        let channel = ControlChannel::new(&ClientConfig::default());
        let body = EndpointInfo {
            domain_id: 0,
            topic_name: "Chat".into(),
            qos: vec![],
        };
        let err = channel
            .send_command(CommandKind::Create, EntityKind::DataReader, &body)
            .unwrap_err();
        assert!(matches!(err, VortexError::NotConnected));
        assert!(channel.shared_pending().is_empty());
    }

    #[tokio::test]
    async fn disconnect_when_disconnected_is_noop() {
        let channel = ControlChannel::new(&ClientConfig::default());
        channel.disconnect().await.unwrap();
        channel.disconnect().await.unwrap();
        assert_eq!(channel.state(), ChannelState::Disconnected);
    }

    #[tokio::test]
    async fn failed_connect_returns_to_disconnected() {
        let channel = ControlChannel::new(&ClientConfig::default());
        // Port 1 on loopback refuses connections.
        let err = channel.connect("ws://127.0.0.1:1", "T").await.unwrap_err();
        assert!(matches!(err, VortexError::Transport(_)));
        assert_eq!(channel.state(), ChannelState::Disconnected);
    }

    #[test]
    fn dispatch_reports_only_malformed_frames() {
        let channel = ControlChannel::new(&ClientConfig::default());
        assert!(channel.shared.dispatch("{not json").is_err());
        // Unknown id: logged, not an error.
        assert!(channel
            .shared
            .dispatch(r#"{"h":{"cid":0,"ek":0,"sn":99},"b":{"eid":"","msg":""}}"#)
            .is_ok());
    }

    fn open_by_hand(channel: &ControlChannel) -> (u64, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let generation = channel.shared.begin_connect().unwrap();
        channel.shared.mark_open("ws://x", tx);
        (generation, rx)
    }

    #[test]
    fn teardown_emits_disconnected_once() {
        let (tx, mut rx) = broadcast::channel(8);
        let channel = ControlChannel::with_parts(
            &ClientConfig::default(),
            Arc::new(SequenceAllocator::new()),
            Some(tx),
        );
        let (generation, _outbound) = open_by_hand(&channel);
        let waiter = channel.shared.pending.register(CorrelationId::new(1)).unwrap();

        channel.shared.teardown(generation, "test");
        channel.shared.teardown(generation, "again");

        assert!(matches!(rx.try_recv(), Ok(SessionEvent::Disconnected { url }) if url == "ws://x"));
        assert!(rx.try_recv().is_err());
        assert!(channel.shared.pending.is_empty());
        drop(waiter);
    }

    #[test]
    fn late_teardown_of_previous_connection_is_ignored() {
        let (tx, mut events) = broadcast::channel(8);
        let channel = ControlChannel::with_parts(
            &ClientConfig::default(),
            Arc::new(SequenceAllocator::new()),
            Some(tx),
        );

        // First connection dies on a send failure while its receive loop lives on.
        let (first, _first_outbound) = open_by_hand(&channel);
        channel.shared.teardown(first, "send failure");
        assert_eq!(channel.state(), ChannelState::Disconnected);

        let (second, mut outbound) = open_by_hand(&channel);
        assert_ne!(first, second);
        let body = EndpointInfo {
            domain_id: 0,
            topic_name: "Chat".into(),
            qos: vec![],
        };
        let waiter = channel
            .send_command(CommandKind::Create, EntityKind::Topic, &body)
            .unwrap();

        // The first connection's receive loop finally sees end of stream.
        channel.shared.teardown(first, "end of stream");

        assert!(channel.is_open());
        assert_eq!(channel.pending_requests(), 1);
        assert!(matches!(outbound.try_recv(), Ok(Message::Text(_))));
        assert!(matches!(events.try_recv(), Ok(SessionEvent::Disconnected { .. })));
        assert!(events.try_recv().is_err());
        drop(waiter);
    }

    #[test]
    fn wrapped_id_colliding_with_pending_request_fails_only_that_caller() {
        let channel = ControlChannel::with_parts(
            &ClientConfig::default(),
            Arc::new(SequenceAllocator::starting_after(i32::MAX as u32)),
            None,
        );
        let (_generation, mut outbound) = open_by_hand(&channel);
        let body = EndpointInfo {
            domain_id: 0,
            topic_name: "Chat".into(),
            qos: vec![],
        };

        // Request 1 is still outstanding when the counter wraps back to 1.
        let _oldest = channel.shared.pending.register(CorrelationId::new(1)).unwrap();

        let err = channel
            .send_command(CommandKind::Create, EntityKind::DataWriter, &body)
            .unwrap_err();
        assert!(
            matches!(err, VortexError::DuplicateCorrelation(id) if id == CorrelationId::new(1))
        );
        assert!(outbound.try_recv().is_err());

        let waiter = channel
            .send_command(CommandKind::Create, EntityKind::DataWriter, &body)
            .unwrap();
        assert_eq!(waiter.id(), CorrelationId::new(2));
        assert!(matches!(outbound.try_recv(), Ok(Message::Text(_))));
        assert!(channel.is_open());
        assert_eq!(channel.pending_requests(), 2);
    }
}
