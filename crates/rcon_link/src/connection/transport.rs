//! One control-channel link to one remote server.
//!
//! A [`Transport`] correlates requests with responses and republishes every
//! other frame as a raw line. It never reconnects by itself: the supervisor
//! in [`ConnectionManager`](super::ConnectionManager) calls [`Transport::connect`]
//! and [`Transport::pump`] in a loop.

use super::LinkState;
use crate::config::LinkConfig;
use crate::error::LinkError;
use crate::messaging::{decode_envelope, encode_request, FIRST_REQUEST_ID};
use dashmap::DashMap;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, oneshot, watch, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace, warn};
use warden_event_system::{CommandError, RawLine, RemoteServer};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Reply = Result<String, CommandError>;

const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Read half of an established link, consumed by [`Transport::pump`].
pub struct Inbound(SplitStream<WsStream>);

/// Control-channel link to a single [`RemoteServer`].
pub struct Transport {
    server: RemoteServer,
    command_timeout: Duration,
    connect_timeout: Duration,
    state: watch::Sender<LinkState>,
    lines: broadcast::Sender<RawLine>,
    pending: DashMap<i64, oneshot::Sender<Reply>>,
    next_id: AtomicI64,
    writer: Mutex<Option<SplitSink<WsStream, Message>>>,
}

impl Transport {
    pub fn new(server: RemoteServer, config: &LinkConfig) -> Self {
        let (state, _) = watch::channel(LinkState::Disconnected);
        let (lines, _) = broadcast::channel(config.event_buffer.max(1));
        Self {
            server,
            command_timeout: config.command_timeout,
            connect_timeout: config.connect_timeout,
            state,
            lines,
            pending: DashMap::new(),
            next_id: AtomicI64::new(FIRST_REQUEST_ID),
            writer: Mutex::new(None),
        }
    }

    pub fn server(&self) -> &RemoteServer {
        &self.server
    }

    pub fn state(&self) -> LinkState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<LinkState> {
        self.state.subscribe()
    }

    /// Every broadcast line from the server. Survives reconnects.
    pub fn subscribe(&self) -> broadcast::Receiver<RawLine> {
        self.lines.subscribe()
    }

    fn set_state(&self, state: LinkState) {
        self.state.send_if_modified(|current| {
            // Closed is terminal.
            if *current == state || *current == LinkState::Closed {
                return false;
            }
            *current = state;
            true
        });
    }

    /// Opens the WebSocket and moves to `Connected`.
    pub async fn connect(&self) -> Result<Inbound, LinkError> {
        if self.state() == LinkState::Closed {
            return Err(LinkError::Transport("link is closed".to_string()));
        }
        self.set_state(LinkState::Connecting);

        let attempt = tokio::time::timeout(self.connect_timeout, connect_async(self.server.url())).await;
        let ws_stream = match attempt {
            Ok(Ok((ws_stream, _response))) => ws_stream,
            Ok(Err(e)) => {
                self.set_state(LinkState::Disconnected);
                return Err(LinkError::from_handshake(e));
            }
            Err(_) => {
                self.set_state(LinkState::Disconnected);
                return Err(LinkError::Transport(format!(
                    "connect timed out after {:?}",
                    self.connect_timeout
                )));
            }
        };

        let (sink, stream) = ws_stream.split();
        *self.writer.lock().await = Some(sink);
        self.set_state(LinkState::Connected);
        Ok(Inbound(stream))
    }

    /// Reads frames until the link drops, then fails in-flight requests.
    ///
    /// Returns `Ok(())` when the server closed the connection cleanly and the
    /// read error otherwise.
    pub async fn pump(&self, inbound: Inbound) -> Result<(), LinkError> {
        let Inbound(mut stream) = inbound;
        let result = loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => self.route(text.as_str()),
                Some(Ok(Message::Close(frame))) => {
                    debug!(server = %self.server.id, "Close frame received: {:?}", frame);
                    break Ok(());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => break Err(LinkError::from(e)),
                None => break Ok(()),
            }
        };
        self.disconnect(LinkState::Disconnected).await;
        result
    }

    fn route(&self, text: &str) {
        let envelope = match decode_envelope(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(server = %self.server.id, "⚠️ {}", e);
                return;
            }
        };

        if let Some(id) = envelope.response_id() {
            if let Some((_, reply)) = self.pending.remove(&id) {
                trace!(server = %self.server.id, id, "Response received");
                // The caller may have given up already.
                let _ = reply.send(Ok(envelope.message));
                return;
            }
        }

        // No subscribers yet is fine; lines are only buffered for live receivers.
        let _ = self.lines.send(envelope.into_raw_line());
    }

    /// Sends `command` and waits for the matching response.
    pub async fn send(&self, command: &str) -> Result<String, CommandError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let frame = encode_request(id, command)?;
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);
        let _slot = PendingSlot {
            pending: &self.pending,
            id,
        };

        {
            let mut writer = self.writer.lock().await;
            let Some(sink) = writer.as_mut() else {
                return Err(CommandError::Disconnected);
            };
            sink.send(Message::Text(frame.into()))
                .await
                .map_err(|e| CommandError::Transport(e.to_string()))?;
        }
        trace!(server = %self.server.id, id, "➡️ {}", command);

        match tokio::time::timeout(self.command_timeout, rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => Err(CommandError::Disconnected),
            Err(_) => Err(CommandError::Timeout(self.command_timeout)),
        }
    }

    /// Drops the write half, fails every in-flight request and moves to `state`.
    async fn disconnect(&self, state: LinkState) {
        let sink = self.writer.lock().await.take();
        if let Some(mut sink) = sink {
            let _ = tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await;
        }
        self.set_state(state);

        let ids: Vec<i64> = self.pending.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            if let Some((_, reply)) = self.pending.remove(&id) {
                let _ = reply.send(Err(CommandError::Disconnected));
            }
        }
    }

    /// Moves to the terminal `Closed` state. Used when the server is removed.
    pub async fn close(&self) {
        self.disconnect(LinkState::Closed).await;
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("server", &self.server)
            .field("state", &self.state())
            .field("pending", &self.pending.len())
            .finish()
    }
}

/// Removes a pending entry when its request finishes or is cancelled.
struct PendingSlot<'a> {
    pending: &'a DashMap<i64, oneshot::Sender<Reply>>,
    id: i64,
}

impl Drop for PendingSlot<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.id);
    }
}
