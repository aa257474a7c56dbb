//! In-process WebRCON server for link tests.
//!
//! Answers every request with `ok: <command>` under the same identifier,
//! except `silent`, which is never answered. Broadcasts and forced
//! disconnects are driven from the test.

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use warden_event_system::{RemoteServer, ServerId};

#[derive(Debug, Clone)]
enum Control {
    Line { kind: String, message: String },
    DropAll,
}

pub(crate) struct TestRcon {
    addr: SocketAddr,
    password: String,
    control: broadcast::Sender<Control>,
    received: Arc<Mutex<Vec<(i64, String)>>>,
    connections: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl TestRcon {
    pub(crate) async fn start(password: &str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (control, _) = broadcast::channel(64);
        let received = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));

        let task = {
            let password = password.to_string();
            let control = control.clone();
            let received = received.clone();
            let connections = connections.clone();
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    tokio::spawn(serve(
                        stream,
                        password.clone(),
                        control.subscribe(),
                        received.clone(),
                        connections.clone(),
                    ));
                }
            })
        };

        Self {
            addr,
            password: password.to_string(),
            control,
            received,
            connections,
            task,
        }
    }

    /// Connection details for this server under `id`.
    pub(crate) fn remote(&self, id: &str) -> RemoteServer {
        self.remote_with_password(id, &self.password)
    }

    pub(crate) fn remote_with_password(&self, id: &str, password: &str) -> RemoteServer {
        RemoteServer {
            id: ServerId::new("test", id),
            name: id.to_uppercase(),
            host: self.addr.ip().to_string(),
            port: self.addr.port(),
            password: password.to_string(),
        }
    }

    /// Pushes a broadcast envelope to every open connection.
    pub(crate) fn broadcast(&self, kind: &str, message: &str) {
        let _ = self.control.send(Control::Line {
            kind: kind.to_string(),
            message: message.to_string(),
        });
    }

    /// Drops every open connection without a close handshake.
    pub(crate) fn drop_connections(&self) {
        let _ = self.control.send(Control::DropAll);
    }

    /// (identifier, command) of every request received, in order.
    pub(crate) fn received(&self) -> Vec<(i64, String)> {
        self.received.lock().unwrap().clone()
    }

    /// Number of accepted WebSocket sessions so far.
    pub(crate) fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

impl Drop for TestRcon {
    fn drop(&mut self) {
        self.task.abort();
        let _ = self.control.send(Control::DropAll);
    }
}

async fn serve(
    stream: TcpStream,
    password: String,
    mut control: broadcast::Receiver<Control>,
    received: Arc<Mutex<Vec<(i64, String)>>>,
    connections: Arc<AtomicUsize>,
) {
    let expected_path = format!("/{password}");
    let check_password = move |request: &Request, response: Response| {
        if request.uri().path() == expected_path {
            return Ok(response);
        }
        let mut rejection = ErrorResponse::new(Some("invalid password".to_string()));
        *rejection.status_mut() = StatusCode::UNAUTHORIZED;
        Err(rejection)
    };

    let Ok(ws_stream) = accept_hdr_async(stream, check_password).await else {
        return;
    };
    connections.fetch_add(1, Ordering::SeqCst);
    let (mut sink, mut frames) = ws_stream.split();

    loop {
        tokio::select! {
            frame = frames.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let request: Value = serde_json::from_str(text.as_str()).unwrap_or_default();
                    let id = request["Identifier"].as_i64().unwrap_or_default();
                    let command = request["Message"].as_str().unwrap_or_default().to_string();
                    received.lock().unwrap().push((id, command.clone()));
                    if command == "silent" {
                        continue;
                    }
                    let reply = json!({
                        "Identifier": id,
                        "Message": format!("ok: {command}"),
                        "Type": "Generic",
                        "Stacktrace": "",
                    });
                    if sink.send(Message::Text(reply.to_string().into())).await.is_err() {
                        break;
                    }
                }
                Some(Ok(_)) => {}
                _ => break,
            },
            control = control.recv() => match control {
                Ok(Control::Line { kind, message }) => {
                    let envelope = json!({
                        "Identifier": 0,
                        "Message": message,
                        "Type": kind,
                        "Stacktrace": null,
                    });
                    if sink.send(Message::Text(envelope.to_string().into())).await.is_err() {
                        break;
                    }
                }
                Ok(Control::DropAll) | Err(_) => break,
            },
        }
    }
}

/// An address nothing listens on.
pub(crate) async fn unreachable_remote(id: &str) -> RemoteServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    RemoteServer {
        id: ServerId::new("test", id),
        name: id.to_uppercase(),
        host: addr.ip().to_string(),
        port: addr.port(),
        password: "secret".to_string(),
    }
}
