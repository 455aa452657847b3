//! Socket.io framing (engine.io protocol v4) over a websocket.
//!
//! Every text frame starts with an engine.io packet type. Type `4` carries a
//! socket.io packet, whose own type follows: `40` joins the default
//! namespace, `42["name", data]` is an event. The server pings with `2` and
//! expects `3` back.

use reqwest::Url;
use serde_json::{json, Value};
use thiserror::Error;

use crate::domain::{
    events::{InboundEvent, OutboundEvent},
    normalize::resolve_id,
};

pub const GET_ONLINE_USERS: &str = "getOnlineUsers";
pub const SEND_MESSAGE: &str = "sendMessage";

const USER_ONLINE: &str = "userOnline";
const USER_OFFLINE: &str = "userOffline";
const ONLINE_USERS: &str = "onlineUsers";
const RECEIVE_MESSAGE: &str = "receiveMessage";
const NEW_MESSAGE_NOTIFICATION: &str = "newMessageNotification";
const NOTIFICATION_NEW: &str = "notification:new";
const NOTIFICATION_READ: &str = "notification:read";
const NOTIFICATION_DELETED: &str = "notification:deleted";
const ADMIN_NOTIFICATION: &str = "admin:notification";

/// Joins the default namespace.
pub const CONNECT_FRAME: &str = "40";
pub const PONG_FRAME: &str = "3";

const SOCKET_PATH: &str = "socket.io";
const SOCKET_QUERY: &str = "EIO=4&transport=websocket";

const DEFAULT_PING_INTERVAL_MS: u64 = 25_000;
const DEFAULT_PING_TIMEOUT_MS: u64 = 20_000;

/// Liveness settings announced by the server in its open packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handshake {
    pub ping_interval_ms: u64,
    pub ping_timeout_ms: u64,
}

impl Default for Handshake {
    fn default() -> Self {
        Self {
            ping_interval_ms: DEFAULT_PING_INTERVAL_MS,
            ping_timeout_ms: DEFAULT_PING_TIMEOUT_MS,
        }
    }
}

impl Handshake {
    /// Longest silence tolerated before the link counts as dead.
    pub fn idle_limit_ms(&self) -> u64 {
        self.ping_interval_ms + self.ping_timeout_ms
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Open(Handshake),
    Ping,
    Connected,
    ConnectRefused(String),
    /// Engine close or socket.io disconnect.
    Disconnected,
    Event { name: String, data: Value },
    Ignored,
}

#[derive(Debug, Error)]
pub enum WireError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unsupported frame {0:?}")]
    Unsupported(String),
    #[error("unknown event {0}")]
    UnknownEvent(String),
}

/// Websocket endpoint served next to the REST api: `ws(s)://host/socket.io/`.
pub fn socket_url(api_url: &Url) -> Option<Url> {
    let mut url = api_url.clone();
    let scheme = match url.scheme() {
        "http" => "ws",
        "https" => "wss",
        _ => return None,
    };
    url.set_scheme(scheme).ok()?;
    {
        let mut path = url.path_segments_mut().ok()?;
        path.pop_if_empty().push(SOCKET_PATH).push("");
    }
    url.set_query(Some(SOCKET_QUERY));
    url.set_fragment(None);
    Some(url)
}

pub fn encode_event(event: &OutboundEvent) -> String {
    let packet = match event {
        OutboundEvent::RequestOnlineSnapshot => json!([GET_ONLINE_USERS]),
        OutboundEvent::SendMessage {
            to,
            message,
            temp_id,
        } => json!([
            SEND_MESSAGE,
            { "to": to, "message": message, "tempId": temp_id }
        ]),
    };

    format!("42{packet}")
}

pub fn decode_frame(text: &str) -> Result<Frame, WireError> {
    let Some(kind) = text.chars().next() else {
        return Err(WireError::Unsupported(String::new()));
    };
    let rest = &text[kind.len_utf8()..];

    match kind {
        '0' => {
            let open: Value = serde_json::from_str(rest)?;
            let defaults = Handshake::default();
            Ok(Frame::Open(Handshake {
                ping_interval_ms: open
                    .get("pingInterval")
                    .and_then(Value::as_u64)
                    .unwrap_or(defaults.ping_interval_ms),
                ping_timeout_ms: open
                    .get("pingTimeout")
                    .and_then(Value::as_u64)
                    .unwrap_or(defaults.ping_timeout_ms),
            }))
        }
        '1' => Ok(Frame::Disconnected),
        '2' => Ok(Frame::Ping),
        '3' | '6' => Ok(Frame::Ignored),
        '4' => decode_packet(rest),
        _ => Err(WireError::Unsupported(text.to_owned())),
    }
}

fn decode_packet(packet: &str) -> Result<Frame, WireError> {
    let Some(kind) = packet.chars().next() else {
        return Err(WireError::Unsupported(packet.to_owned()));
    };
    let rest = &packet[kind.len_utf8()..];

    // Only the default namespace is joined.
    if rest.starts_with('/') {
        return Ok(Frame::Ignored);
    }

    match kind {
        '0' => Ok(Frame::Connected),
        '1' => Ok(Frame::Disconnected),
        '2' => decode_event_packet(rest),
        '4' => {
            let reason = serde_json::from_str::<Value>(rest)
                .ok()
                .and_then(|body| body.get("message").and_then(Value::as_str).map(str::to_owned))
                .unwrap_or_else(|| rest.to_owned());
            Ok(Frame::ConnectRefused(reason))
        }
        _ => Ok(Frame::Ignored),
    }
}

fn decode_event_packet(rest: &str) -> Result<Frame, WireError> {
    let args = rest.trim_start_matches(|c: char| c.is_ascii_digit());
    let args: Vec<Value> = serde_json::from_str(args)?;

    let Some(name) = args.first().and_then(Value::as_str) else {
        return Err(WireError::Unsupported(rest.to_owned()));
    };

    Ok(Frame::Event {
        name: name.to_owned(),
        data: args.get(1).cloned().unwrap_or(Value::Null),
    })
}

pub fn decode_event(name: String, data: Value) -> Result<InboundEvent, WireError> {
    let inbound = match name.as_str() {
        USER_ONLINE => InboundEvent::UserOnline(presence_user_id(&data)),
        USER_OFFLINE => InboundEvent::UserOffline(presence_user_id(&data)),
        ONLINE_USERS => InboundEvent::OnlineSnapshot(data),
        RECEIVE_MESSAGE => InboundEvent::MessageReceived(data),
        NEW_MESSAGE_NOTIFICATION => InboundEvent::NewMessageNotification(data),
        NOTIFICATION_NEW | ADMIN_NOTIFICATION => InboundEvent::NotificationCreated(data),
        NOTIFICATION_READ => InboundEvent::NotificationRead(data),
        NOTIFICATION_DELETED => InboundEvent::NotificationDeleted(data),
        _ => return Err(WireError::UnknownEvent(name)),
    };

    Ok(inbound)
}

fn presence_user_id(data: &Value) -> String {
    match data.get("userId") {
        Some(user_id) => resolve_id(Some(user_id)),
        None => resolve_id(Some(data)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(text: &str) -> Result<InboundEvent, WireError> {
        match decode_frame(text)? {
            Frame::Event { name, data } => decode_event(name, data),
            other => panic!("expected an event frame, got {other:?}"),
        }
    }

    #[test]
    fn socket_url_follows_api_url() {
        let api = Url::parse("https://market.example/backend").expect("url must parse");

        let url = socket_url(&api).expect("https maps to wss");

        assert_eq!(
            url.as_str(),
            "wss://market.example/backend/socket.io/?EIO=4&transport=websocket"
        );
        assert_eq!(
            socket_url(&Url::parse("http://localhost:5001").expect("url must parse"))
                .map(|url| url.to_string()),
            Some("ws://localhost:5001/socket.io/?EIO=4&transport=websocket".to_owned())
        );
    }

    #[test]
    fn open_packet_carries_ping_settings() {
        let frame = decode_frame(r#"0{"sid":"abc","upgrades":[],"pingInterval":300,"pingTimeout":200}"#)
            .expect("must decode");

        assert_eq!(
            frame,
            Frame::Open(Handshake {
                ping_interval_ms: 300,
                ping_timeout_ms: 200,
            })
        );
    }

    #[test]
    fn control_frames_decode() {
        assert_eq!(decode_frame("2").expect("ping"), Frame::Ping);
        assert_eq!(decode_frame(r#"40{"sid":"s1"}"#).expect("connect"), Frame::Connected);
        assert_eq!(decode_frame("41").expect("disconnect"), Frame::Disconnected);
        assert_eq!(
            decode_frame(r#"44{"message":"not authorized"}"#).expect("refused"),
            Frame::ConnectRefused("not authorized".to_owned())
        );
        assert_eq!(
            decode_frame(r#"42/admin,["x",1]"#).expect("other namespace"),
            Frame::Ignored
        );
    }

    #[test]
    fn decodes_presence_with_bare_and_wrapped_ids() {
        assert_eq!(
            event(r#"42["userOnline","u1"]"#).expect("must decode"),
            InboundEvent::UserOnline("u1".to_owned())
        );
        assert_eq!(
            event(r#"42["userOffline",{"userId":"u2"}]"#).expect("must decode"),
            InboundEvent::UserOffline("u2".to_owned())
        );
    }

    #[test]
    fn ack_ids_and_missing_data_are_tolerated() {
        assert_eq!(
            event(r#"4212["onlineUsers"]"#).expect("must decode"),
            InboundEvent::OnlineSnapshot(Value::Null)
        );
        assert!(matches!(
            event(r#"42["admin:notification",{"_id":"n1"}]"#),
            Ok(InboundEvent::NotificationCreated(_))
        ));
    }

    #[test]
    fn rejects_unknown_events_and_garbage() {
        assert!(matches!(
            event(r#"42["typing",{}]"#),
            Err(WireError::UnknownEvent(name)) if name == "typing"
        ));
        assert!(matches!(decode_frame("42not json"), Err(WireError::Malformed(_))));
        assert!(matches!(decode_frame("x"), Err(WireError::Unsupported(_))));
    }

    #[test]
    fn outbound_events_are_socket_io_packets() {
        assert_eq!(
            encode_event(&OutboundEvent::RequestOnlineSnapshot),
            r#"42["getOnlineUsers"]"#
        );

        let frame = encode_event(&OutboundEvent::SendMessage {
            to: "u1".to_owned(),
            message: "hi".to_owned(),
            temp_id: "tmp-1".to_owned(),
        });
        let args: Vec<Value> =
            serde_json::from_str(frame.trim_start_matches("42")).expect("payload must be json");

        assert_eq!(args[0], SEND_MESSAGE);
        assert_eq!(args[1]["tempId"], "tmp-1");
        assert_eq!(args[1]["to"], "u1");
    }
}
