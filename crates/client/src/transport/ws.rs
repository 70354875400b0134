// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Realtime WebSocket connection.
//!
//! One persistent connection per login session. Reconnects indefinitely
//! on transport-level disconnects with a fixed short backoff, requests a
//! presence snapshot on every (re)connect, and fans inbound events out
//! on a broadcast channel. Transport and protocol errors go to the log,
//! never to subscribers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::session::claims;
use crate::transport::event::{parse_server_event, ClientEvent, ServerEvent};

/// Handle to the realtime channel.
pub struct RealtimeConnection {
    event_tx: broadcast::Sender<ServerEvent>,
    out_tx: mpsc::UnboundedSender<ClientEvent>,
    live: Arc<AtomicBool>,
    local_id: Option<u64>,
    cancel: CancellationToken,
}

impl RealtimeConnection {
    /// Open the connection and start the reconnect loop.
    ///
    /// `ws_url` is the upgrade endpoint without credentials; the bearer
    /// token (scheme prefix stripped) is passed as a query parameter.
    pub fn connect(ws_url: &str, token: &str, reconnect: Duration) -> Self {
        let token = claims::strip_bearer(token).to_owned();
        // Advisory identity from the unverified payload segment; absence
        // only disables self-filtering.
        let local_id = claims::decode_claims(&token).and_then(|c| c.user_id);

        let (event_tx, _) = broadcast::channel(256);
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let live = Arc::new(AtomicBool::new(false));
        let cancel = CancellationToken::new();

        let url = format!("{ws_url}?token={token}");
        spawn_connection_loop(
            url,
            reconnect,
            event_tx.clone(),
            out_rx,
            Arc::clone(&live),
            cancel.clone(),
        );

        Self { event_tx, out_tx, live, local_id, cancel }
    }

    /// Subscribe to inbound events. Per-subscriber order matches arrival
    /// order on the connection.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.event_tx.subscribe()
    }

    /// Queue an outbound event. Returns false when the connection is not
    /// live (the event is not queued).
    pub fn send(&self, event: ClientEvent) -> bool {
        if !self.is_live() {
            return false;
        }
        self.out_tx.send(event).is_ok()
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    /// Local numeric identity derived at connect time, when the token
    /// payload was decodable.
    pub fn local_id(&self) -> Option<u64> {
        self.local_id
    }

    /// Tear the connection down. Idempotent.
    pub fn disconnect(&self) {
        self.cancel.cancel();
    }
}

impl Drop for RealtimeConnection {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn spawn_connection_loop(
    url: String,
    reconnect: Duration,
    event_tx: broadcast::Sender<ServerEvent>,
    mut out_rx: mpsc::UnboundedReceiver<ClientEvent>,
    live: Arc<AtomicBool>,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        loop {
            if cancel.is_cancelled() {
                break;
            }

            match tokio_tungstenite::connect_async(&url).await {
                Ok((stream, _)) => {
                    tracing::debug!("realtime channel connected");
                    live.store(true, Ordering::Release);

                    let (mut ws_tx, mut ws_rx) = stream.split();

                    // Ask for the roster before anything else so presence
                    // converges immediately after every reconnect.
                    if send_event(&mut ws_tx, &ClientEvent::PresenceGet).await.is_err() {
                        live.store(false, Ordering::Release);
                        continue;
                    }

                    loop {
                        tokio::select! {
                            _ = cancel.cancelled() => break,

                            outbound = out_rx.recv() => {
                                match outbound {
                                    Some(event) => {
                                        if let Err(e) = send_event(&mut ws_tx, &event).await {
                                            tracing::debug!(err = %e, "realtime send failed");
                                            break;
                                        }
                                    }
                                    None => break,
                                }
                            }

                            inbound = ws_rx.next() => {
                                match inbound {
                                    Some(Ok(Message::Text(text))) => {
                                        dispatch_frame(&event_tx, text.as_str());
                                    }
                                    Some(Ok(Message::Close(_))) | None => {
                                        tracing::debug!("realtime channel closed");
                                        break;
                                    }
                                    Some(Err(e)) => {
                                        tracing::debug!(err = %e, "realtime channel error");
                                        break;
                                    }
                                    _ => {} // ping/pong/binary ignored
                                }
                            }
                        }
                    }

                    live.store(false, Ordering::Release);
                }
                Err(e) => {
                    tracing::debug!(err = %e, "realtime connect failed, retrying");
                }
            }

            // Fixed short backoff before reconnect.
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(reconnect) => {}
            }
        }

        live.store(false, Ordering::Release);
    });
}

async fn send_event<S>(ws_tx: &mut S, event: &ClientEvent) -> anyhow::Result<()>
where
    S: SinkExt<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    let text = serde_json::to_string(event)?;
    ws_tx.send(Message::Text(text.into())).await.map_err(|e| anyhow::anyhow!("ws send: {e}"))
}

/// Normalize one inbound frame and broadcast it. Unknown events and
/// malformed payloads are dropped here.
fn dispatch_frame(event_tx: &broadcast::Sender<ServerEvent>, text: &str) {
    let raw: serde_json::Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(err = %e, "undecodable realtime frame dropped");
            return;
        }
    };
    match parse_server_event(&raw) {
        // Send errors mean no subscribers; that is fine.
        Some(event) => {
            let _ = event_tx.send(event);
        }
        None => {
            let event = raw.get("event").and_then(|v| v.as_str()).unwrap_or("?");
            tracing::debug!(event, "unhandled realtime frame dropped");
        }
    }
}
