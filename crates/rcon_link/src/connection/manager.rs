//! Connection manager supervising one link per remote server.
//!
//! Every configured server gets a [`Transport`] and a supervisor task that
//! connects, pumps frames until the link drops and reconnects after a capped
//! exponential backoff, forever. Supervisors are independent tasks, so a
//! server that is down never delays another.

use super::{LinkState, Transport};
use crate::backoff::Backoff;
use crate::config::LinkConfig;
use crate::error::LinkError;
use crate::health::{LinkHealthReport, LinkStatus};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use warden_event_system::{CommandError, CommandSender, EventStream, RemoteServer, ServerId};

#[derive(Debug)]
struct ManagedLink {
    transport: Arc<Transport>,
    supervisor: JoinHandle<()>,
}

/// Central registry of remote links, keyed by server identity.
#[derive(Debug)]
pub struct ConnectionManager {
    config: LinkConfig,
    links: RwLock<HashMap<ServerId, ManagedLink>>,
}

impl ConnectionManager {
    pub fn new(config: LinkConfig) -> Self {
        Self {
            config,
            links: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Starts supervising `server`. Returns `false` if it is already managed.
    pub async fn add_server(&self, server: RemoteServer) -> bool {
        let mut links = self.links.write().await;
        if links.contains_key(&server.id) {
            warn!("⚠️ Server {} is already managed", server.id);
            return false;
        }

        let id = server.id.clone();
        info!("🔗 Managing {} ({}) at {}", id, server.name, server.address());
        let transport = Arc::new(Transport::new(server, &self.config));
        let supervisor = tokio::spawn(supervise(
            transport.clone(),
            Backoff::new(self.config.backoff_initial, self.config.backoff_max),
        ));
        links.insert(
            id,
            ManagedLink {
                transport,
                supervisor,
            },
        );
        true
    }

    /// Stops supervising `server` and closes its link for good.
    pub async fn remove_server(&self, server: &ServerId) -> bool {
        let removed = self.links.write().await.remove(server);
        match removed {
            Some(link) => {
                link.supervisor.abort();
                link.transport.close().await;
                info!("🔌 Stopped managing {}", server);
                true
            }
            None => false,
        }
    }

    async fn transport(&self, server: &ServerId) -> Option<Arc<Transport>> {
        self.links
            .read()
            .await
            .get(server)
            .map(|link| link.transport.clone())
    }

    /// Managed servers, sorted by identity.
    pub async fn servers(&self) -> Vec<RemoteServer> {
        let mut servers: Vec<RemoteServer> = self
            .links
            .read()
            .await
            .values()
            .map(|link| link.transport.server().clone())
            .collect();
        servers.sort_by(|a, b| a.id.cmp(&b.id));
        servers
    }

    pub async fn state(&self, server: &ServerId) -> Option<LinkState> {
        self.transport(server).await.map(|t| t.state())
    }

    pub async fn watch_state(&self, server: &ServerId) -> Option<watch::Receiver<LinkState>> {
        self.transport(server).await.map(|t| t.watch_state())
    }

    /// Parsed event stream of `server`, or `None` if it is not managed.
    ///
    /// The stream outlives reconnects and ends when the server is removed.
    pub async fn events(&self, server: &ServerId) -> Option<EventStream> {
        self.transport(server)
            .await
            .map(|t| EventStream::new(server.clone(), t.subscribe()))
    }

    /// Snapshot of every link, for periodic reporting.
    pub async fn health(&self) -> LinkHealthReport {
        let links = self.links.read().await;
        let mut statuses: Vec<LinkStatus> = links
            .values()
            .map(|link| {
                let server = link.transport.server();
                LinkStatus {
                    server: server.id.clone(),
                    name: server.name.clone(),
                    address: server.address(),
                    state: link.transport.state(),
                }
            })
            .collect();
        statuses.sort_by(|a, b| a.server.cmp(&b.server));
        LinkHealthReport { links: statuses }
    }

    /// Closes every link.
    pub async fn shutdown(&self) {
        let links: Vec<(ServerId, ManagedLink)> = self.links.write().await.drain().collect();
        info!("🛑 Closing {} RCON links", links.len());
        for (server, link) in links {
            link.supervisor.abort();
            link.transport.close().await;
            debug!("Closed link to {}", server);
        }
    }
}

#[async_trait]
impl CommandSender for ConnectionManager {
    async fn send_command(&self, server: &ServerId, command: &str) -> Result<String, CommandError> {
        let transport = self
            .transport(server)
            .await
            .ok_or_else(|| CommandError::ServerUnknown(server.clone()))?;
        if transport.state() != LinkState::Connected {
            return Err(CommandError::ServerUnreachable(server.clone()));
        }
        transport.send(command).await
    }
}

/// Keeps one link up for as long as the server is managed.
async fn supervise(transport: Arc<Transport>, mut backoff: Backoff) {
    let id = transport.server().id.clone();
    let address = transport.server().address();

    loop {
        match transport.connect().await {
            Ok(inbound) => {
                backoff.reset();
                info!("✅ Connected to {} at {}", id, address);
                match transport.pump(inbound).await {
                    Ok(()) => info!("🔌 {} closed the connection", id),
                    Err(e) => warn!("🔌 Lost connection to {}: {}", id, e),
                }
            }
            Err(LinkError::AuthRejected(status)) => {
                error!(
                    "🔐 {} rejected the RCON password (HTTP {}), check the configured credential",
                    id, status
                );
            }
            Err(e) => {
                warn!("❌ Failed to connect to {} at {}: {}", id, address, e);
            }
        }

        if transport.state() == LinkState::Closed {
            return;
        }
        let delay = backoff.next_delay();
        debug!("🔁 Reconnecting to {} in {:?}", id, delay);
        tokio::time::sleep(delay).await;
    }
}
