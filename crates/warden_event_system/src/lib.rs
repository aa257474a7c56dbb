//! # Warden Event System
//!
//! Shared contracts for the Warden RCON supervisor: the types every crate
//! speaks, the inbound event model, the console log parser and per-server
//! dispatcher, and the narrow storage and notification interfaces the
//! subsystems are written against.
//!
//! ## Architecture Overview
//!
//! ```text
//! remote server ──► rcon_link ──► RawLine ──► parser ──► InboundEvent
//!                                                      │
//!                                  ┌───────────────────┴──────────────────┐
//!                                  ▼                                      ▼
//!                           kits handler                           zones handler
//!                                  │                                      │
//!                                  └──► CommandSender / NotificationSink ◄┘
//!                                                 Storage
//! ```
//!
//! - **Types** ([`types`]): server identity, rewards, cooldowns, zones
//! - **Events** ([`events`]): the typed inbound events and the [`EventHandler`] trait
//! - **Parser** ([`parser`]): ordered line-shape matchers over raw console lines
//! - **Dispatcher** ([`dispatcher`]): fan-out with one queue and worker per handler
//! - **Storage** ([`storage`]): durable state contract plus memory and JSON file backends
//! - **Notify** ([`notify`]): outbound commands, player messages and feed channels
//!
//! ## Quick Start
//!
//! ```rust
//! use warden_event_system::*;
//!
//! let line = RawLine::generic("Carl[76561198000000001] has entered the game");
//! assert_eq!(
//!     parse_line(&line),
//!     ParsedLine::Event(InboundEvent::PlayerJoined { name: "Carl".to_string() })
//! );
//! ```

pub mod clock;
pub mod dispatcher;
pub mod events;
pub mod notify;
pub mod parser;
pub mod shutdown;
pub mod storage;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use clock::{Clock, SystemClock, TokioClock};
pub use dispatcher::Dispatcher;
pub use events::{EventHandler, HandlerError, InboundEvent};
pub use notify::{
    CommandError, CommandSender, FeedMessage, FeedPublisher, NotificationSink, NotifyError,
};
pub use parser::{parse_line, EventStream, LineKind, ParsedLine, RawLine};
pub use shutdown::ShutdownState;
pub use storage::{JsonFileStorage, MemoryStorage, Storage, StorageError, StorageSnapshot};
pub use types::*;

// External dependencies that plugins commonly need
pub use async_trait::async_trait;
pub use chrono::{DateTime, Utc};
