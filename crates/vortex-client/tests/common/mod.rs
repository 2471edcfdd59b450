// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Loopback WebSocket server standing in for a Vortex endpoint.

#![allow(dead_code)]

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

pub type ServerConn = WebSocketStream<TcpStream>;

const WAIT: Duration = Duration::from_secs(5);

pub struct MockServer {
    pub url: String,
    conns: mpsc::UnboundedReceiver<(String, ServerConn)>,
}

impl MockServer {
    /// Bind on an ephemeral port and accept WebSocket upgrades in the background.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, conns) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let tx = tx.clone();
                tokio::spawn(async move {
                    let path = Arc::new(Mutex::new(String::new()));
                    let seen = Arc::clone(&path);
                    let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                        *seen.lock().unwrap() = req.uri().path().to_string();
                        Ok(resp)
                    };
                    if let Ok(ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await {
                        let path = path.lock().unwrap().clone();
                        let _ = tx.send((path, ws));
                    }
                });
            }
        });

        Self {
            url: format!("ws://{}", addr),
            conns,
        }
    }

    /// Next accepted connection and the request path it was opened on.
    pub async fn accept(&mut self) -> (String, ServerConn) {
        tokio::time::timeout(WAIT, self.conns.recv())
            .await
            .expect("no connection within deadline")
            .expect("listener stopped")
    }

    /// Like `accept`, but `None` if nothing connects within `wait`.
    pub async fn try_accept(&mut self, wait: Duration) -> Option<(String, ServerConn)> {
        tokio::time::timeout(wait, self.conns.recv())
            .await
            .ok()
            .flatten()
    }
}

/// Next text frame parsed as JSON, skipping control frames.
pub async fn next_json(ws: &mut ServerConn) -> Value {
    loop {
        let msg = tokio::time::timeout(WAIT, ws.next())
            .await
            .expect("no frame within deadline")
            .expect("connection ended")
            .expect("receive error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

/// Read one command and return it with its correlation id.
pub async fn next_command(ws: &mut ServerConn) -> (i64, Value) {
    let cmd = next_json(ws).await;
    let sn = cmd["h"]["sn"].as_i64().unwrap();
    (sn, cmd)
}

pub async fn send_json(ws: &mut ServerConn, value: Value) {
    ws.send(Message::Text(value.to_string())).await.unwrap();
}

pub async fn reply_ok(ws: &mut ServerConn, ek: i64, sn: i64, eid: &str) {
    send_json(
        ws,
        json!({"h": {"cid": 0, "ek": ek, "sn": sn}, "b": {"eid": eid, "msg": ""}}),
    )
    .await;
}

pub async fn reply_error(ws: &mut ServerConn, ek: i64, sn: i64, msg: &str) {
    send_json(
        ws,
        json!({"h": {"cid": 1, "ek": ek, "sn": sn}, "b": {"eid": "", "msg": msg}}),
    )
    .await;
}

/// Keep reading until the peer goes away, answering its close handshake.
pub async fn drain(mut ws: ServerConn) {
    while let Some(Ok(_)) = ws.next().await {}
}

/// Read to the end, asserting the peer completed the close handshake
/// instead of dropping the connection.
pub async fn expect_clean_close(ws: &mut ServerConn) {
    loop {
        let msg = tokio::time::timeout(WAIT, ws.next())
            .await
            .expect("connection not closed within deadline");
        match msg {
            None => return,
            Some(Ok(_)) => {}
            Some(Err(e)) => panic!("connection dropped without close handshake: {}", e),
        }
    }
}
