//! # RCON Link
//!
//! Supervised WebRCON control channels to many independent game servers.
//!
//! ## Overview
//!
//! * **Transport** ([`Transport`]) - one WebSocket link with request/response
//!   correlation by `Identifier` and a broadcast stream of everything else
//! * **Connection Manager** ([`ConnectionManager`]) - one supervisor task per
//!   server, reconnecting forever with capped exponential backoff
//! * **Notifier** ([`RconNotifier`]) - in-game player messages plus feed
//!   channel posts
//!
//! ## Usage
//!
//! ```rust,no_run
//! use rcon_link::{ConnectionManager, LinkConfig};
//! use warden_event_system::{CommandSender, RemoteServer, ServerId};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConnectionManager::new(LinkConfig::default());
//! let id = ServerId::new("acme", "eu-main");
//! manager
//!     .add_server(RemoteServer {
//!         id: id.clone(),
//!         name: "EU Main".to_string(),
//!         host: "127.0.0.1".to_string(),
//!         port: 28016,
//!         password: "secret".to_string(),
//!     })
//!     .await;
//!
//! let mut events = manager.events(&id).await.expect("server is managed");
//! let status = manager.send_command(&id, "status").await?;
//! println!("{status}");
//! while let Some(event) = events.next().await {
//!     println!("{event}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Link failures ([`LinkError`]) stay inside the supervisor, which logs and
//! retries them. Command failures surface as
//! [`CommandError`](warden_event_system::CommandError) to the caller and are
//! never retried here.

pub mod backoff;
pub mod config;
pub mod connection;
pub mod error;
pub mod health;
pub mod messaging;
pub mod notify;

#[cfg(test)]
mod test_server;

pub use backoff::Backoff;
pub use config::LinkConfig;
pub use connection::{ConnectionManager, LinkState, Transport};
pub use error::LinkError;
pub use health::{LinkHealthReport, LinkStatus};
pub use notify::{RconNotifier, DEFAULT_PLAYER_TEMPLATE};
