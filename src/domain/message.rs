use chrono::{DateTime, Utc};

/// Canonical identity of a message inside a conversation.
///
/// A message is keyed by its client-generated temporary id until the backend
/// confirms it, after which the server id takes over. Never both.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageKey {
    Temporary(String),
    Confirmed(String),
}

impl MessageKey {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Temporary(id) | Self::Confirmed(id) => id,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Participant {
    pub id: String,
    pub name: Option<String>,
}

impl Participant {
    pub fn new(id: impl Into<String>, name: Option<String>) -> Self {
        Self {
            id: id.into(),
            name,
        }
    }

    /// Returns the display name, falling back to the identifier.
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub key: MessageKey,
    /// Temporary id echoed by the backend, kept until reconciliation consumes it.
    pub temp_id: Option<String>,
    pub sender: Participant,
    pub receiver: Participant,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    /// Builds an unconfirmed message for an optimistic local send.
    pub fn placeholder(
        temp_id: impl Into<String>,
        sender: Participant,
        receiver: Participant,
        body: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let temp_id = temp_id.into();
        Self {
            key: MessageKey::Temporary(temp_id.clone()),
            temp_id: Some(temp_id),
            sender,
            receiver,
            body: body.into(),
            created_at,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.key.is_confirmed()
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn confirmed_id(&self) -> Option<&str> {
        match &self.key {
            MessageKey::Confirmed(id) => Some(id),
            MessageKey::Temporary(_) => None,
        }
    }

    pub fn is_from(&self, user_id: &str) -> bool {
        self.sender.id == user_id
    }

    /// True when `user_id` is either side of the message.
    pub fn involves(&self, user_id: &str) -> bool {
        self.sender.id == user_id || self.receiver.id == user_id
    }
}
