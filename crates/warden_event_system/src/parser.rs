//! Console log parser.
//!
//! Raw lines arrive tagged with the envelope type they travelled in. `Chat`
//! envelopes carry a JSON chat payload; every other type carries a console
//! text line, matched against an ordered list of line shapes. The first shape
//! that matches wins and anything else is [`ParsedLine::Unrecognized`], which
//! is expected noise rather than a fault.

use crate::events::InboundEvent;
use crate::types::{ChatChannel, ServerId};
use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::{trace, warn};

/// Envelope type a raw line was delivered in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind {
    Generic,
    Chat,
    Warning,
    Error,
    /// Any envelope type this crate has no special handling for
    Other(String),
}

impl LineKind {
    /// Maps the wire `Type` field onto a kind.
    pub fn from_wire(kind: &str) -> Self {
        match kind {
            "Generic" => LineKind::Generic,
            "Chat" => LineKind::Chat,
            "Warning" => LineKind::Warning,
            "Error" => LineKind::Error,
            other => LineKind::Other(other.to_string()),
        }
    }
}

/// One broadcast line from a remote server, before interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLine {
    pub kind: LineKind,
    pub text: String,
}

impl RawLine {
    pub fn new(kind: LineKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }

    /// A plain console line.
    pub fn generic(text: impl Into<String>) -> Self {
        Self::new(LineKind::Generic, text)
    }

    /// A structured chat payload.
    pub fn chat(payload: impl Into<String>) -> Self {
        Self::new(LineKind::Chat, payload)
    }
}

/// Result of decoding one raw line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedLine {
    Event(InboundEvent),
    Unrecognized,
}

impl From<Option<InboundEvent>> for ParsedLine {
    fn from(event: Option<InboundEvent>) -> Self {
        event.map_or(ParsedLine::Unrecognized, ParsedLine::Event)
    }
}

/// Decodes one raw line into at most one event.
pub fn parse_line(line: &RawLine) -> ParsedLine {
    match line.kind {
        LineKind::Chat => parse_chat_payload(&line.text).into(),
        _ => parse_console_line(line.text.trim()),
    }
}

type Matcher = fn(&str) -> Option<InboundEvent>;

/// Console line shapes, in priority order.
const CONSOLE_MATCHERS: [Matcher; 4] = [match_tagged_chat, match_kill, match_join, match_leave];

fn parse_console_line(line: &str) -> ParsedLine {
    CONSOLE_MATCHERS
        .iter()
        .find_map(|matcher| matcher(line))
        .into()
}

const CHAT_TAGS: [(&str, ChatChannel); 3] = [
    ("[CHAT] ", ChatChannel::Global),
    ("[TEAM CHAT] ", ChatChannel::Team),
    ("[LOCAL CHAT] ", ChatChannel::Local),
];

/// `[CHAT] name : text`, `[TEAM CHAT] name : text`, `[LOCAL CHAT] name : text`
fn match_tagged_chat(line: &str) -> Option<InboundEvent> {
    let (rest, channel) = CHAT_TAGS
        .iter()
        .find_map(|(tag, channel)| line.strip_prefix(tag).map(|rest| (rest, *channel)))?;
    let (speaker, text) = rest.split_once(" : ")?;
    let speaker = strip_player_id(speaker);
    if speaker.is_empty() {
        return None;
    }
    Some(InboundEvent::ChatLine {
        speaker: speaker.to_string(),
        text: text.to_string(),
        channel,
    })
}

/// `victim[id] was killed by killer[id]`
fn match_kill(line: &str) -> Option<InboundEvent> {
    let (victim, killer) = line.split_once(" was killed by ")?;
    let victim = strip_player_id(victim);
    let killer = strip_player_id(killer);
    if victim.is_empty() || killer.is_empty() {
        return None;
    }
    Some(InboundEvent::Kill {
        killer: killer.to_string(),
        victim: victim.to_string(),
    })
}

/// `name[id] has entered the game`
fn match_join(line: &str) -> Option<InboundEvent> {
    let name = strip_player_id(line.strip_suffix(" has entered the game")?);
    if name.is_empty() {
        return None;
    }
    Some(InboundEvent::PlayerJoined {
        name: name.to_string(),
    })
}

/// `ip:port/steamid/name disconnecting: reason`
fn match_leave(line: &str) -> Option<InboundEvent> {
    let (who, _reason) = line.split_once(" disconnecting: ")?;
    let mut parts = who.splitn(3, '/');
    let address = parts.next()?;
    let steam_id = parts.next()?;
    let name = parts.next()?;
    if !address.contains(':') || steam_id.is_empty() || name.is_empty() {
        return None;
    }
    Some(InboundEvent::PlayerLeft {
        name: name.to_string(),
    })
}

/// Drops a trailing `[id]` from a player reference, if present.
fn strip_player_id(reference: &str) -> &str {
    let reference = reference.trim();
    if reference.ends_with(']') {
        if let Some(open) = reference.rfind('[') {
            return reference[..open].trim_end();
        }
    }
    reference
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ChatPayload {
    channel: i64,
    message: String,
    username: String,
}

fn parse_chat_payload(payload: &str) -> Option<InboundEvent> {
    let chat: ChatPayload = match serde_json::from_str(payload) {
        Ok(chat) => chat,
        Err(e) => {
            trace!("Ignoring malformed chat payload: {}", e);
            return None;
        }
    };
    let channel = match chat.channel {
        0 => ChatChannel::Global,
        1 => ChatChannel::Team,
        4 => ChatChannel::Local,
        _ => return None,
    };
    if chat.username.is_empty() {
        return None;
    }
    Some(InboundEvent::ChatLine {
        speaker: chat.username,
        text: chat.message,
        channel,
    })
}

/// Typed event stream for one server, decoding raw broadcast lines lazily.
///
/// Unrecognized lines are skipped. A receiver that falls behind the broadcast
/// buffer logs how many lines it lost and keeps going.
#[derive(Debug)]
pub struct EventStream {
    server: ServerId,
    lines: broadcast::Receiver<RawLine>,
}

impl EventStream {
    pub fn new(server: ServerId, lines: broadcast::Receiver<RawLine>) -> Self {
        Self { server, lines }
    }

    pub fn server(&self) -> &ServerId {
        &self.server
    }

    /// Next decoded event, or `None` once the line source is gone.
    pub async fn next(&mut self) -> Option<InboundEvent> {
        loop {
            match self.lines.recv().await {
                Ok(line) => match parse_line(&line) {
                    ParsedLine::Event(event) => return Some(event),
                    ParsedLine::Unrecognized => {
                        trace!(server = %self.server, "Unrecognized line: {}", line.text);
                    }
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(
                        server = %self.server,
                        skipped,
                        "⚠️ Event stream lagged, {} lines dropped", skipped
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
