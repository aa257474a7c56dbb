//! WebRCON wire envelopes.
//!
//! Requests and responses are JSON text frames:
//!
//! ```json
//! { "Identifier": 1001, "Message": "status", "Name": "Warden" }
//! { "Identifier": 1001, "Message": "...", "Type": "Generic", "Stacktrace": "" }
//! ```

use serde::{Deserialize, Serialize};

/// Name this client announces in every request.
pub const CLIENT_NAME: &str = "Warden";

/// First correlation id handed out by a link. Ids are always positive.
pub const FIRST_REQUEST_ID: i64 = 1000;

/// A command sent to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct RconRequest<'a> {
    pub identifier: i64,
    pub message: &'a str,
    pub name: &'a str,
}

impl<'a> RconRequest<'a> {
    pub fn new(identifier: i64, message: &'a str) -> Self {
        Self {
            identifier,
            message,
            name: CLIENT_NAME,
        }
    }
}

/// Anything the server sends: a command response or a broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RconEnvelope {
    #[serde(default)]
    pub identifier: i64,
    #[serde(default)]
    pub message: String,
    /// `Generic`, `Chat`, `Warning`, `Error`, ...
    #[serde(rename = "Type", default)]
    pub kind: String,
    #[serde(default)]
    pub stacktrace: Option<String>,
}
