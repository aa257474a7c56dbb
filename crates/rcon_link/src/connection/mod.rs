//! Control-channel connections and their supervision.
//!
//! This module owns the lifecycle of every remote link: one [`Transport`] per
//! configured server, each driven by its own supervisor task inside the
//! [`ConnectionManager`].

pub mod manager;
pub mod transport;

pub use manager::ConnectionManager;
pub use transport::Transport;

use serde::Serialize;
use std::fmt;

/// Lifecycle of one link.
///
/// `Disconnected → Connecting → Connected → Disconnected`, repeated by the
/// supervisor. `Closed` is terminal and only reached when the server is
/// removed from the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
    Closed,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LinkState::Disconnected => "disconnected",
            LinkState::Connecting => "connecting",
            LinkState::Connected => "connected",
            LinkState::Closed => "closed",
        };
        f.write_str(name)
    }
}
