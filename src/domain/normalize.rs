//! Tolerant decoding of backend message records.
//!
//! The backend is inconsistent about record shapes: a sender may arrive as a
//! bare id, as a number, as an object carrying `_id` or `id`, or not at all.
//! Everything here resolves to best-effort plain values and never fails.
//! Missing or unparseable timestamps collapse to the supplied `now`.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;

use super::message::{ChatMessage, MessageKey, Participant};

const ID_FIELDS: [&str; 2] = ["_id", "id"];
const BODY_FIELDS: [&str; 2] = ["message", "text"];
const TIMESTAMP_FIELDS: [&str; 2] = ["createdAt", "timestamp"];

/// Normalizes a raw message record, substituting `now` for a missing timestamp.
pub fn normalize_message(raw: &Value, now: DateTime<Utc>) -> ChatMessage {
    let sender = resolve_participant(raw.get("sender"));
    let receiver = resolve_participant(raw.get("receiver"));
    let body = first_string(raw, &BODY_FIELDS).unwrap_or_default();
    let parsed_at = first_timestamp(raw, &TIMESTAMP_FIELDS);
    let created_at = parsed_at.unwrap_or(now);
    let temp_id = non_empty(raw.get("tempId").map(|value| resolve_id(Some(value))));

    let key = match first_id(raw) {
        Some(id) => MessageKey::Confirmed(id),
        None => match &temp_id {
            Some(temp_id) => MessageKey::Temporary(temp_id.clone()),
            None => MessageKey::Confirmed(synthetic_id(&sender, &receiver, &body, parsed_at)),
        },
    };

    ChatMessage {
        key,
        temp_id,
        sender,
        receiver,
        body,
        created_at,
    }
}

/// Resolves an identifier from a bare string, number, or nested object.
///
/// Returns an empty string when nothing usable is present.
pub fn resolve_id(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(id)) => id.clone(),
        Some(Value::Number(id)) => id.to_string(),
        Some(Value::Object(fields)) => ID_FIELDS
            .iter()
            .filter_map(|field| fields.get(*field))
            .map(|nested| match nested {
                Value::String(id) => id.clone(),
                Value::Number(id) => id.to_string(),
                _ => String::new(),
            })
            .find(|id| !id.is_empty())
            .unwrap_or_default(),
        _ => String::new(),
    }
}

pub fn resolve_participant(value: Option<&Value>) -> Participant {
    let name = value
        .and_then(|value| value.get("name"))
        .and_then(Value::as_str)
        .map(ToOwned::to_owned);

    Participant {
        id: resolve_id(value),
        name,
    }
}

/// Record id from `_id` or `id`, when present and non-empty.
pub fn first_id(raw: &Value) -> Option<String> {
    ID_FIELDS
        .iter()
        .filter_map(|field| raw.get(*field))
        .map(|value| resolve_id(Some(value)))
        .find(|id| !id.is_empty())
}

pub fn first_string(raw: &Value, fields: &[&str]) -> Option<String> {
    fields
        .iter()
        .filter_map(|field| raw.get(*field))
        .find_map(|value| match value {
            Value::String(text) => Some(text.clone()),
            Value::Number(number) => Some(number.to_string()),
            _ => None,
        })
}

pub fn first_timestamp(raw: &Value, fields: &[&str]) -> Option<DateTime<Utc>> {
    fields
        .iter()
        .filter_map(|field| raw.get(*field))
        .find_map(parse_timestamp)
}

/// Parses RFC 3339 strings, naive ISO strings (read as UTC) and epoch millis.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(text) => {
            let text = text.trim();
            DateTime::parse_from_rfc3339(text)
                .map(|parsed| parsed.with_timezone(&Utc))
                .ok()
                .or_else(|| {
                    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
                        .ok()
                        .map(|naive| naive.and_utc())
                })
        }
        Value::Number(number) => number
            .as_i64()
            .and_then(DateTime::<Utc>::from_timestamp_millis),
        _ => None,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|text| !text.is_empty())
}

// Records without any id still need a stable key so redeliveries collapse.
// The substituted `now` differs per delivery, so only a parsed time may take part.
fn synthetic_id(
    sender: &Participant,
    receiver: &Participant,
    body: &str,
    created_at: Option<DateTime<Utc>>,
) -> String {
    match created_at {
        Some(created_at) => format!(
            "synthetic:{}:{}:{}",
            sender.id,
            receiver.id,
            created_at.timestamp_millis()
        ),
        None => format!("synthetic:{}:{}:{}", sender.id, receiver.id, body),
    }
}
