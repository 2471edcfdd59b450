// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Data channels: one WebSocket per reader or writer entity.
//!
//! The payload framing is fixed when the topic is created. Unkeyed types
//! travel wrapped in a [`DataHolder`], keyed types as bare JSON.

use crate::control::{client_close, client_close_frame, open_socket, WsSink, WsStream};
use crate::error::{Result, VortexError};
use crate::session::SessionEvent;
use crate::topic::{PayloadEncoding, Topic, TopicType};
use futures::{SinkExt, Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// One-field wrapper carrying a sample's JSON text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataHolder {
    pub value: String,
}

/// Serialize a sample into one data frame.
pub fn encode_sample<T: Serialize>(sample: &T, encoding: PayloadEncoding) -> Result<String> {
    let json = serde_json::to_string(sample)?;
    match encoding {
        PayloadEncoding::Raw => Ok(json),
        PayloadEncoding::Holder => Ok(serde_json::to_string(&DataHolder { value: json })?),
    }
}

/// Decode one data frame into a sample.
pub fn decode_sample<T: DeserializeOwned>(frame: &str, encoding: PayloadEncoding) -> Result<T> {
    match encoding {
        PayloadEncoding::Raw => Ok(serde_json::from_str(frame)?),
        PayloadEncoding::Holder => {
            let holder: DataHolder = serde_json::from_str(frame)?;
            Ok(serde_json::from_str(&holder.value)?)
        }
    }
}

fn emit(events: &Option<broadcast::Sender<SessionEvent>>, event: SessionEvent) {
    if let Some(events) = events {
        let _ = events.send(event);
    }
}

/// Receiving end of a reader entity.
///
/// Yields one item per inbound frame. A frame that fails to decode yields a
/// single `Err` and the stream carries on; the stream ends when the data
/// channel closes.
pub struct DataReader<T> {
    entity_id: String,
    topic: String,
    samples: mpsc::Receiver<Result<T>>,
    close_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl<T: TopicType> DataReader<T> {
    /// Open the data channel at `url` for reader `entity_id` on `topic`.
    ///
    /// At most `buffer` decoded samples are held; once they are all unread
    /// the socket is no longer read and the server is pushed back by TCP.
    pub(crate) async fn open(
        url: &str,
        entity_id: impl Into<String>,
        topic: &Topic,
        buffer: usize,
        events: Option<broadcast::Sender<SessionEvent>>,
    ) -> Result<Self> {
        let entity_id = entity_id.into();
        let ws = open_socket(url).await?;
        info!("Reader {} attached to topic '{}'", entity_id, topic.name);
        emit(
            &events,
            SessionEvent::ReaderCreated {
                entity_id: entity_id.clone(),
                topic: topic.name.clone(),
            },
        );

        let (tx, samples) = mpsc::channel(buffer.max(1));
        let (close_tx, close_rx) = oneshot::channel();
        let task = tokio::spawn(read_loop::<T>(
            ws,
            PayloadEncoding::of::<T>(),
            tx,
            close_rx,
            entity_id.clone(),
            events,
        ));

        Ok(Self {
            entity_id,
            topic: topic.name.clone(),
            samples,
            close_tx: Some(close_tx),
            task: Some(task),
        })
    }
}

impl<T> DataReader<T> {
    /// Server-assigned entity id.
    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn topic_name(&self) -> &str {
        &self.topic
    }

    /// Next sample, or `None` once the channel has closed.
    pub async fn recv(&mut self) -> Option<Result<T>> {
        self.samples.recv().await
    }

    /// Close the data channel. Samples already received stay readable.
    pub async fn close(&mut self) {
        if let Some(close_tx) = self.close_tx.take() {
            let _ = close_tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl<T> Stream for DataReader<T> {
    type Item = Result<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().samples.poll_recv(cx)
    }
}

async fn read_loop<T: TopicType>(
    mut ws: WsStream,
    encoding: PayloadEncoding,
    tx: mpsc::Sender<Result<T>>,
    mut close_rx: oneshot::Receiver<()>,
    entity_id: String,
    events: Option<broadcast::Sender<SessionEvent>>,
) {
    // A dropped reader also resolves `close_rx`.
    let local_close = loop {
        let item = tokio::select! {
            _ = &mut close_rx => break true,
            msg = ws.next() => match msg {
                Some(Ok(Message::Text(text))) => decode_sample(&text, encoding),
                Some(Ok(Message::Binary(bytes))) => String::from_utf8(bytes)
                    .map_err(|e| VortexError::Serialization(e.to_string()))
                    .and_then(|text| decode_sample(&text, encoding)),
                Some(Ok(Message::Close(frame))) => {
                    debug!("Reader {} close frame: {:?}", entity_id, frame);
                    break false;
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    warn!("Reader {} receive error: {}", entity_id, e);
                    break false;
                }
                None => break false,
            }
        };

        // The socket is not read again until the consumer makes room.
        tokio::select! {
            sent = tx.send(item) => {
                if sent.is_err() {
                    break true;
                }
            }
            _ = &mut close_rx => break true,
        }
    };

    // Sends our close frame, or flushes the reply to the server's one.
    let frame = if local_close { Some(client_close()) } else { None };
    let _ = ws.close(frame).await;
    info!("Reader {} data channel closed", entity_id);
    emit(&events, SessionEvent::ReaderClosed { entity_id });
}

/// Liveness flag shared by a writer and its close watcher.
struct WriterLink {
    entity_id: String,
    alive: AtomicBool,
    events: Option<broadcast::Sender<SessionEvent>>,
}

impl WriterLink {
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// First call publishes `WriterClosed`; later calls do nothing.
    fn mark_closed(&self) {
        if self.alive.swap(false, Ordering::AcqRel) {
            info!("Writer {} data channel closed", self.entity_id);
            emit(
                &self.events,
                SessionEvent::WriterClosed {
                    entity_id: self.entity_id.clone(),
                },
            );
        }
    }
}

/// Sending end of a writer entity.
pub struct DataWriter<T> {
    topic: String,
    encoding: PayloadEncoding,
    sink: Arc<Mutex<WsSink>>,
    link: Arc<WriterLink>,
    watcher: JoinHandle<()>,
    close_timeout: Duration,
    _marker: PhantomData<fn(&T)>,
}

impl<T: TopicType> DataWriter<T> {
    /// Open the data channel at `url` for writer `entity_id` on `topic`.
    pub(crate) async fn open(
        url: &str,
        entity_id: impl Into<String>,
        topic: &Topic,
        close_timeout: Duration,
        events: Option<broadcast::Sender<SessionEvent>>,
    ) -> Result<Self> {
        let entity_id = entity_id.into();
        let ws = open_socket(url).await?;
        info!("Writer {} attached to topic '{}'", entity_id, topic.name);
        emit(
            &events,
            SessionEvent::WriterCreated {
                entity_id: entity_id.clone(),
                topic: topic.name.clone(),
            },
        );

        let (sink, mut source) = ws.split();
        let sink = Arc::new(Mutex::new(sink));
        let link = Arc::new(WriterLink {
            entity_id,
            alive: AtomicBool::new(true),
            events,
        });

        // The server never sends data to a writer; the source only reports close.
        let watch = Arc::clone(&link);
        let reply_sink = Arc::clone(&sink);
        let watcher = tokio::spawn(async move {
            while let Some(msg) = source.next().await {
                match msg {
                    Ok(Message::Close(frame)) => {
                        debug!("Writer {} close frame: {:?}", watch.entity_id, frame);
                        watch.mark_closed();
                        // Flush the queued close reply.
                        let _ = reply_sink.lock().await.close().await;
                        break;
                    }
                    Err(_) => break,
                    Ok(_) => {}
                }
            }
            watch.mark_closed();
        });

        Ok(Self {
            topic: topic.name.clone(),
            encoding: PayloadEncoding::of::<T>(),
            sink,
            link,
            watcher,
            close_timeout,
            _marker: PhantomData,
        })
    }

    /// Publish one sample.
    ///
    /// Fails with [`VortexError::ChannelUnavailable`] once the channel is closed.
    pub async fn write(&self, sample: &T) -> Result<()> {
        if !self.link.is_alive() {
            return Err(VortexError::ChannelUnavailable);
        }
        let frame = encode_sample(sample, self.encoding)?;
        if let Some(key) = sample.key_hash() {
            debug!("Writer {} sample key {:?}", self.link.entity_id, key);
        }

        let mut sink = self.sink.lock().await;
        if let Err(e) = sink.send(Message::Text(frame)).await {
            warn!("Writer {} send failed: {}", self.link.entity_id, e);
            self.link.mark_closed();
            return Err(VortexError::ChannelUnavailable);
        }
        Ok(())
    }

    /// Publish samples in order, stopping at the first failure.
    pub async fn write_batch(&self, samples: &[T]) -> Result<()> {
        for sample in samples {
            self.write(sample).await?;
        }
        Ok(())
    }
}

impl<T> DataWriter<T> {
    pub fn entity_id(&self) -> &str {
        &self.link.entity_id
    }

    pub fn topic_name(&self) -> &str {
        &self.topic
    }

    pub fn is_alive(&self) -> bool {
        self.link.is_alive()
    }

    /// Close the data channel. Closing twice is a no-op.
    pub async fn close(&mut self) {
        if !self.link.is_alive() {
            return;
        }
        {
            let mut sink = self.sink.lock().await;
            let _ = sink.send(client_close_frame()).await;
        }
        self.link.mark_closed();
        if tokio::time::timeout(self.close_timeout, &mut self.watcher)
            .await
            .is_err()
        {
            self.watcher.abort();
        }
    }
}

impl<T> Drop for DataWriter<T> {
    fn drop(&mut self) {
        self.watcher.abort();
        self.link.mark_closed();
    }
}
