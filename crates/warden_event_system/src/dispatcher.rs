//! Per-server event fan-out.
//!
//! A [`Dispatcher`] pulls decoded events from one server's [`EventStream`]
//! and hands each one to every registered handler. Each handler owns an
//! unbounded queue drained by its own worker task, so a slow or failing
//! handler never holds up another handler or the next event.

use crate::events::{EventHandler, InboundEvent};
use crate::parser::EventStream;
use crate::types::ServerId;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Running fan-out for one server.
#[derive(Debug)]
pub struct Dispatcher {
    server: ServerId,
    pump: JoinHandle<()>,
    workers: Vec<JoinHandle<()>>,
}

impl Dispatcher {
    /// Starts one worker per handler plus the task reading `stream`.
    pub fn spawn(mut stream: EventStream, handlers: Vec<Arc<dyn EventHandler>>) -> Self {
        let server = stream.server().clone();
        let mut queues = Vec::with_capacity(handlers.len());
        let mut workers = Vec::with_capacity(handlers.len());

        for handler in handlers {
            let (tx, rx) = mpsc::unbounded_channel();
            queues.push(tx);
            workers.push(tokio::spawn(run_worker(server.clone(), handler, rx)));
        }

        let pump_server = server.clone();
        let pump = tokio::spawn(async move {
            while let Some(event) = stream.next().await {
                debug!(server = %pump_server, kind = event.kind(), "📨 {}", event);
                for queue in &queues {
                    // A closed queue means its worker was aborted; nothing to deliver to.
                    let _ = queue.send(event.clone());
                }
            }
            info!(server = %pump_server, "📭 Event stream closed");
        });

        info!(server = %server, handlers = workers.len(), "🔀 Dispatcher started");

        Self {
            server,
            pump,
            workers,
        }
    }

    pub fn server(&self) -> &ServerId {
        &self.server
    }

    /// Whether the stream has ended and every handler has drained its queue.
    pub fn is_finished(&self) -> bool {
        self.pump.is_finished() && self.workers.iter().all(JoinHandle::is_finished)
    }

    /// Stops reading and drops whatever is still queued.
    pub fn abort(&self) {
        self.pump.abort();
        for worker in &self.workers {
            worker.abort();
        }
        debug!(server = %self.server, "Dispatcher aborted");
    }
}

async fn run_worker(
    server: ServerId,
    handler: Arc<dyn EventHandler>,
    mut queue: mpsc::UnboundedReceiver<InboundEvent>,
) {
    while let Some(event) = queue.recv().await {
        if let Err(e) = handler.handle(&server, &event).await {
            warn!(
                server = %server,
                handler = handler.name(),
                kind = event.kind(),
                "❌ Handler failed: {}", e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::HandlerError;
    use crate::notify::CommandError;
    use crate::parser::RawLine;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::{broadcast, Notify};

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl EventHandler for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        async fn handle(&self, _server: &ServerId, event: &InboundEvent) -> Result<(), HandlerError> {
            self.seen.lock().unwrap().push(event.to_string());
            if self.fail {
                return Err(CommandError::Disconnected.into());
            }
            Ok(())
        }
    }

    /// Blocks on its first event until released.
    struct Gate {
        release: Notify,
    }

    #[async_trait]
    impl EventHandler for Gate {
        fn name(&self) -> &str {
            "gate"
        }

        async fn handle(&self, _server: &ServerId, _event: &InboundEvent) -> Result<(), HandlerError> {
            self.release.notified().await;
            Ok(())
        }
    }

    fn join(name: &str) -> RawLine {
        RawLine::generic(format!("{name}[1] has entered the game"))
    }

    #[tokio::test]
    async fn test_events_reach_every_handler_in_order() {
        let (tx, rx) = broadcast::channel(16);
        let first = Arc::new(Recorder::default());
        let failing = Arc::new(Recorder {
            fail: true,
            ..Default::default()
        });
        let dispatcher = Dispatcher::spawn(
            EventStream::new(ServerId::new("acme", "eu"), rx),
            vec![first.clone() as Arc<dyn EventHandler>, failing.clone()],
        );

        for name in ["A", "B", "C"] {
            tx.send(join(name)).unwrap();
        }
        drop(tx);

        tokio::time::timeout(Duration::from_secs(5), async {
            while !dispatcher.is_finished() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("dispatcher should drain");

        let expected = vec!["A joined", "B joined", "C joined"];
        assert_eq!(*first.seen.lock().unwrap(), expected);
        // Failures do not stop the worker.
        assert_eq!(*failing.seen.lock().unwrap(), expected);
    }

    #[tokio::test]
    async fn test_blocked_handler_does_not_block_others() {
        let (tx, rx) = broadcast::channel(16);
        let gate = Arc::new(Gate {
            release: Notify::new(),
        });
        let recorder = Arc::new(Recorder::default());
        let dispatcher = Dispatcher::spawn(
            EventStream::new(ServerId::new("acme", "eu"), rx),
            vec![gate.clone() as Arc<dyn EventHandler>, recorder.clone()],
        );

        tx.send(join("A")).unwrap();
        tx.send(join("B")).unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while recorder.seen.lock().unwrap().len() < 2 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("recorder should not wait for the gate");

        gate.release.notify_waiters();
        dispatcher.abort();
    }
}
