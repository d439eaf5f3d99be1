//! Engine.IO v4 / Socket.IO v4 text packets for the default namespace.
//!
//! Only the text transport is spoken. Binary attachments and custom
//! namespaces are not supported.

use serde::Deserialize;
use serde_json::{Value, json};

use fieldsync_core::error::Error;
use fieldsync_core::{AccessToken, Result};

/// Engine.IO pong, sent in reply to a server ping.
pub(crate) const PONG: &str = "3";

/// Socket.IO disconnect for the default namespace.
pub(crate) const DISCONNECT: &str = "41";

/// A decoded packet received from the server.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Packet {
    /// Engine.IO open handshake.
    Open(OpenHandshake),
    /// Engine.IO close.
    Close,
    /// Engine.IO ping; must be answered with [`PONG`].
    Ping,
    Pong,
    /// Engine.IO noop.
    Noop,
    /// Socket.IO namespace connect accepted.
    Connected { sid: Option<String> },
    /// Socket.IO namespace disconnect.
    Disconnect,
    /// Socket.IO event.
    Event { event: String, data: Value },
    /// Socket.IO acknowledgement of an event this client emitted.
    Ack { id: u64, data: Value },
    /// Socket.IO namespace connect refused.
    ConnectError { message: String },
}

/// Parameters of the Engine.IO open packet.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct OpenHandshake {
    pub sid: String,
    #[serde(default)]
    pub ping_interval: u64,
    #[serde(default)]
    pub ping_timeout: u64,
}

fn malformed(text: &str, reason: impl std::fmt::Display) -> Error {
    Error::UnexpectedResponse {
        message: format!("malformed socket packet {:?}: {}", truncate(text), reason),
    }
}

fn truncate(text: &str) -> &str {
    match text.char_indices().nth(64) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Decode one text frame.
pub(crate) fn decode(text: &str) -> Result<Packet> {
    let mut chars = text.chars();
    let engine = chars.next().ok_or_else(|| malformed(text, "empty frame"))?;
    let rest = chars.as_str();

    match engine {
        '0' => serde_json::from_str(rest)
            .map(Packet::Open)
            .map_err(|e| malformed(text, e)),
        '1' => Ok(Packet::Close),
        '2' => Ok(Packet::Ping),
        '3' => Ok(Packet::Pong),
        '4' => decode_message(text, rest),
        '6' => Ok(Packet::Noop),
        other => Err(malformed(text, format!("unknown packet type '{}'", other))),
    }
}

fn decode_message(text: &str, body: &str) -> Result<Packet> {
    let mut chars = body.chars();
    let kind = chars.next().ok_or_else(|| malformed(text, "empty message"))?;
    let payload = chars.as_str();

    match kind {
        '0' => {
            let sid = serde_json::from_str::<Value>(payload)
                .ok()
                .and_then(|v| v.get("sid").and_then(Value::as_str).map(str::to_string));
            Ok(Packet::Connected { sid })
        }
        '1' => Ok(Packet::Disconnect),
        '2' => decode_event(text, payload),
        '3' => decode_ack(text, payload),
        '4' => {
            let message = serde_json::from_str::<Value>(payload)
                .ok()
                .and_then(|v| match v {
                    Value::String(s) => Some(s),
                    v => v.get("message").and_then(Value::as_str).map(str::to_string),
                })
                .unwrap_or_else(|| "connection refused".to_string());
            Ok(Packet::ConnectError { message })
        }
        other => Err(malformed(text, format!("unknown message type '{}'", other))),
    }
}

fn decode_event(text: &str, payload: &str) -> Result<Packet> {
    // An optional ack id precedes the argument array.
    let args = payload.trim_start_matches(|c: char| c.is_ascii_digit());
    let mut args: Vec<Value> = serde_json::from_str(args).map_err(|e| malformed(text, e))?;

    if args.is_empty() {
        return Err(malformed(text, "event without a name"));
    }
    let event = match args.remove(0) {
        Value::String(name) => name,
        _ => return Err(malformed(text, "event name is not a string")),
    };

    Ok(Packet::Event {
        event,
        data: collapse(args),
    })
}

fn decode_ack(text: &str, payload: &str) -> Result<Packet> {
    let args = payload.trim_start_matches(|c: char| c.is_ascii_digit());
    let id = payload[..payload.len() - args.len()]
        .parse()
        .map_err(|_| malformed(text, "acknowledgement without an id"))?;
    let args: Vec<Value> = serde_json::from_str(args).map_err(|e| malformed(text, e))?;

    Ok(Packet::Ack {
        id,
        data: collapse(args),
    })
}

/// No arguments become null, one is passed through, several stay an array.
fn collapse(mut args: Vec<Value>) -> Value {
    match args.len() {
        0 => Value::Null,
        1 => args.remove(0),
        _ => Value::Array(args),
    }
}

/// Namespace connect carrying the handshake credential.
pub(crate) fn encode_connect(token: &AccessToken) -> String {
    format!("40{}", json!({ "token": token.as_str() }))
}

/// Event emitted to the server.
pub(crate) fn encode_event(event: &str, data: &Value) -> String {
    format!("42{}", json!([event, data]))
}

/// Event the server must acknowledge with a `43<id>` packet.
pub(crate) fn encode_event_with_ack(id: u64, event: &str, data: &Value) -> String {
    format!("42{}{}", id, json!([event, data]))
}
