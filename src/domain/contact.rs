use chrono::{DateTime, Utc};
use serde_json::Value;

use super::{
    message::Participant,
    normalize::{first_id, first_string, first_timestamp},
};

/// A chat counterpart as listed in the inbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub unread_count: u32,
    pub last_message: Option<String>,
    pub last_message_time: Option<DateTime<Utc>>,
}

impl Contact {
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.id)
    }

    /// Case-insensitive substring match on name or email. An empty query matches.
    pub fn matches_search(&self, query: &str) -> bool {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return true;
        }

        [self.name.as_deref(), self.email.as_deref()]
            .into_iter()
            .flatten()
            .any(|field| field.to_lowercase().contains(&query))
    }

    pub fn as_participant(&self) -> Participant {
        Participant::new(self.id.clone(), self.name.clone())
    }
}

pub fn normalize_contact(raw: &Value) -> Contact {
    let unread_count = raw
        .get("unreadCount")
        .and_then(Value::as_u64)
        .map(|count| u32::try_from(count).unwrap_or(u32::MAX))
        .unwrap_or(0);

    Contact {
        id: first_id(raw).unwrap_or_default(),
        name: first_string(raw, &["name"]),
        email: first_string(raw, &["email"]),
        unread_count,
        last_message: first_string(raw, &["lastMessage"]),
        last_message_time: first_timestamp(raw, &["lastMessageTime"]),
    }
}

/// Reads the signed-in user from `{ "user": {...} }` or a bare user record.
pub fn normalize_current_user(raw: &Value) -> Option<Participant> {
    let record = raw.get("user").unwrap_or(raw);
    let id = first_id(record)?;

    Some(Participant::new(id, first_string(record, &["name"])))
}
