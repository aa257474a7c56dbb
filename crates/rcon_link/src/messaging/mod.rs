//! Wire encoding and envelope classification.

pub mod types;

pub use types::{RconEnvelope, RconRequest, CLIENT_NAME, FIRST_REQUEST_ID};

use crate::error::LinkError;
use warden_event_system::{LineKind, RawLine};

/// Encodes a request frame.
pub fn encode_request(identifier: i64, command: &str) -> Result<String, LinkError> {
    serde_json::to_string(&RconRequest::new(identifier, command))
        .map_err(|e| LinkError::Protocol(format!("Failed to encode request: {e}")))
}

/// Decodes an inbound text frame.
pub fn decode_envelope(text: &str) -> Result<RconEnvelope, LinkError> {
    serde_json::from_str(text).map_err(|e| LinkError::Protocol(format!("Malformed envelope: {e}")))
}

impl RconEnvelope {
    /// Correlation id of the request this answers, if it can be one.
    ///
    /// Ids at or below zero are reserved for broadcasts.
    pub fn response_id(&self) -> Option<i64> {
        (self.identifier > 0).then_some(self.identifier)
    }

    /// The envelope as a raw console line for the event stream.
    pub fn into_raw_line(self) -> RawLine {
        RawLine::new(LineKind::from_wire(&self.kind), self.message)
    }
}
