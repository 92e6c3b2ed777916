//! WebSocket client with scheduler-driven lifecycle.
//!
//! A [`WsClient`] owns one outbound connection. Construction is cheap;
//! [`WsClient::start`] schedules the initial connect and registers a
//! health-check loop task (default every 10 s) that re-establishes the
//! connection whenever the socket is found closed. Reconnection is
//! serialized through a named locker with `wait = false`, so overlapping
//! health checks collapse into a single attempt.
//!
//! Incoming frames dispatch by type to the [`WsHandler`]: text frames are
//! JSON-decoded first (a body that fails to decode is delivered as a plain
//! JSON string), binary frames are handed over raw. The write half lives
//! behind an async mutex so concurrent sends are serialized.

use std::sync::Arc;
use std::sync::Weak;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::constants::intervals::WS_CHECK_SECS;
use crate::error::{QuantError, Result};
use crate::locker;
use crate::tasks::{self, Heartbeat};
use crate::util;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Callbacks fired by a [`WsClient`]. Implemented by adapters.
#[async_trait]
pub trait WsHandler: Send + Sync {
    /// Fired once per successful handshake (including reconnects).
    async fn on_connected(&self) {}

    /// Fired for every text frame, JSON-decoded. A frame that is not valid
    /// JSON arrives as `Value::String` with the raw text.
    async fn on_text(&self, value: Value) {
        let _ = value;
    }

    /// Fired for every binary frame.
    async fn on_binary(&self, data: Vec<u8>) {
        let _ = data;
    }
}

struct WsInner {
    url: String,
    check_interval: u64,
    reconnect_locker: String,
    connected: AtomicBool,
    /// Bumped on every successful connect so a stale read loop cannot mark
    /// a newer connection as closed.
    generation: AtomicU64,
    writer: Mutex<Option<WsSink>>,
    handler: std::sync::Mutex<Option<Weak<dyn WsHandler>>>,
}

/// A reconnecting WebSocket connection. Cheap to clone; clones share the
/// underlying connection.
#[derive(Clone)]
pub struct WsClient {
    inner: Arc<WsInner>,
}

impl WsClient {
    /// Create a client for `url` with the default health-check interval.
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_check_interval(url, WS_CHECK_SECS)
    }

    /// Create a client with a custom health-check interval in seconds.
    pub fn with_check_interval(url: impl Into<String>, check_interval: u64) -> Self {
        Self {
            inner: Arc::new(WsInner {
                url: url.into(),
                check_interval,
                reconnect_locker: format!("ws.reconnect.{}", util::uuid1()),
                connected: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                writer: Mutex::new(None),
                handler: std::sync::Mutex::new(None),
            }),
        }
    }

    /// The connection URL.
    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// Whether the socket is currently open.
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    /// Attach the handler, register the health-check loop task, and
    /// schedule the initial connect.
    pub fn start(&self, handler: Weak<dyn WsHandler>, heartbeat: &Heartbeat) {
        *self.inner.handler.lock().expect("ws handler slot poisoned") = Some(handler);

        let client = self.clone();
        heartbeat.register(self.inner.check_interval, move |_, _| {
            let client = client.clone();
            async move {
                client.check_connection().await;
            }
        });

        let client = self.clone();
        tasks::spawn(async move {
            client.reconnect(false).await;
        });
    }

    /// Serialize `value` as JSON and send it as a text frame.
    pub async fn send_json<T: Serialize>(&self, value: &T) -> Result<()> {
        let text = serde_json::to_string(value)?;
        self.send_message(Message::Text(text.into())).await
    }

    /// Send a plain text frame.
    pub async fn send_text(&self, text: &str) -> Result<()> {
        self.send_message(Message::Text(text.to_owned().into())).await
    }

    /// Send a WebSocket protocol ping.
    pub async fn ping(&self) -> Result<()> {
        self.send_message(Message::Ping(Bytes::new())).await
    }

    /// Send a WebSocket protocol pong.
    pub async fn pong(&self) -> Result<()> {
        self.send_message(Message::Pong(Bytes::new())).await
    }

    /// Close the connection.
    pub async fn close(&self) {
        self.inner.connected.store(false, Ordering::SeqCst);
        let mut guard = self.inner.writer.lock().await;
        if let Some(mut writer) = guard.take() {
            let _ = writer.send(Message::Close(None)).await;
        }
    }

    async fn send_message(&self, message: Message) -> Result<()> {
        let mut guard = self.inner.writer.lock().await;
        match guard.as_mut() {
            Some(writer) => {
                writer.send(message).await?;
                Ok(())
            }
            None => {
                tracing::warn!(url = %self.inner.url, "send on closed WebSocket");
                Err(QuantError::WsNotConnected)
            }
        }
    }

    /// Health-check loop body: reconnect when the socket is closed.
    async fn check_connection(&self) {
        if self.is_connected() {
            return;
        }
        self.reconnect(true).await;
    }

    /// (Re-)establish the connection. Collapses overlapping attempts via
    /// the per-client reconnect locker.
    async fn reconnect(&self, close_first: bool) {
        let client = self.clone();
        locker::run(&self.inner.reconnect_locker, false, async move {
            if close_first {
                tracing::warn!(url = %client.inner.url, "reconnecting WebSocket");
                client.close().await;
            }
            client.connect().await;
        })
        .await;
    }

    fn connect(&self) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            tracing::info!(url = %self.inner.url, "connecting WebSocket");
            let (stream, _response) = match connect_async(self.inner.url.as_str()).await {
                Ok(ok) => ok,
                Err(e) => {
                    tracing::error!(url = %self.inner.url, error = %e, "WebSocket connect failed");
                    return;
                }
            };
            let (writer, reader) = stream.split();
            *self.inner.writer.lock().await = Some(writer);
            let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
            self.inner.connected.store(true, Ordering::SeqCst);

            if let Some(handler) = self.handler() {
                tasks::spawn(async move {
                    handler.on_connected().await;
                });
            }

            let client = self.clone();
            tasks::spawn(async move {
                client.read_loop(reader, generation).await;
            });
        })
    }

    async fn read_loop(&self, mut reader: WsSource, generation: u64) {
        while let Some(message) = reader.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    let Some(handler) = self.handler() else { break };
                    let value = serde_json::from_str::<Value>(&text)
                        .unwrap_or_else(|_| Value::String(text.to_string()));
                    handler.on_text(value).await;
                }
                Ok(Message::Binary(data)) => {
                    let Some(handler) = self.handler() else { break };
                    handler.on_binary(data.to_vec()).await;
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
                Ok(Message::Close(frame)) => {
                    tracing::warn!(url = %self.inner.url, ?frame, "WebSocket closed by peer");
                    self.mark_closed(generation);
                    let client = self.clone();
                    tasks::spawn(async move {
                        client.reconnect(true).await;
                    });
                    return;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(url = %self.inner.url, error = %e, "WebSocket receive error");
                    break;
                }
            }
        }
        // Stream ended; the health-check loop drives reconnection.
        self.mark_closed(generation);
    }

    /// Mark the connection closed, unless a newer connection has already
    /// replaced the one this read loop belonged to.
    fn mark_closed(&self, generation: u64) {
        if self.inner.generation.load(Ordering::SeqCst) == generation {
            self.inner.connected.store(false, Ordering::SeqCst);
        }
    }

    fn handler(&self) -> Option<Arc<dyn WsHandler>> {
        self.inner
            .handler
            .lock()
            .expect("ws handler slot poisoned")
            .as_ref()
            .and_then(Weak::upgrade)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_fails_when_not_connected() {
        let client = WsClient::new("wss://example.invalid/ws");
        let err = client.send_text("ping").await.unwrap_err();
        assert!(matches!(err, QuantError::WsNotConnected));
    }

    #[tokio::test]
    async fn handler_slot_empty_before_start() {
        let client = WsClient::new("wss://example.invalid/ws");
        assert!(client.handler().is_none());
        assert!(!client.is_connected());
    }
}
