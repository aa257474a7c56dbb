//! Link tuning shared by every connection of a manager.

use std::time::Duration;

/// Timeouts, reconnect backoff and buffering for control-channel links.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkConfig {
    /// How long a command waits for its response
    pub command_timeout: Duration,

    /// How long a connection attempt may take, handshake included
    pub connect_timeout: Duration,

    /// First reconnect delay; doubles on every consecutive failure
    pub backoff_initial: Duration,

    /// Upper bound for the reconnect delay
    pub backoff_max: Duration,

    /// Raw lines buffered per server for slow event subscribers
    pub event_buffer: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(10),
            backoff_initial: Duration::from_secs(1),
            backoff_max: Duration::from_secs(60),
            event_buffer: 1024,
        }
    }
}
