use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::domain::{message::ChatMessage, normalize::normalize_message};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadHistoryQuery {
    pub partner_id: String,
}

impl LoadHistoryQuery {
    pub fn new(partner_id: impl Into<String>) -> Self {
        Self {
            partner_id: partner_id.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadHistoryOutput {
    /// Partner the history was requested for; checked again at apply time.
    pub partner_id: String,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistorySourceError {
    Unauthorized,
    Unavailable,
    InvalidData,
    NotFound,
}

pub trait HistorySource {
    fn fetch_history(&self, partner_id: &str) -> Result<Vec<Value>, HistorySourceError>;
}

impl<T> HistorySource for &T
where
    T: HistorySource + ?Sized,
{
    fn fetch_history(&self, partner_id: &str) -> Result<Vec<Value>, HistorySourceError> {
        (*self).fetch_history(partner_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadHistoryError {
    MissingPartner,
    Unauthorized,
    TemporarilyUnavailable,
    DataContractViolation,
    PartnerNotFound,
}

impl LoadHistoryError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::MissingPartner => "No conversation partner selected.",
            Self::Unauthorized => "Session expired. Please sign in again.",
            Self::TemporarilyUnavailable => "Could not load messages. Try again later.",
            Self::DataContractViolation => "The server returned unreadable messages.",
            Self::PartnerNotFound => "This user no longer exists.",
        }
    }
}

/// Fetches and normalizes a conversation's history, oldest first.
pub fn load_history(
    source: &dyn HistorySource,
    query: LoadHistoryQuery,
    now: DateTime<Utc>,
) -> Result<LoadHistoryOutput, LoadHistoryError> {
    let partner_id = query.partner_id.trim().to_owned();
    if partner_id.is_empty() {
        return Err(LoadHistoryError::MissingPartner);
    }

    let raw = source
        .fetch_history(&partner_id)
        .map_err(map_source_error)?;

    let mut messages: Vec<ChatMessage> = raw
        .iter()
        .map(|record| normalize_message(record, now))
        .collect();
    messages.sort_by_key(|message| message.created_at);

    tracing::debug!(
        partner_id = %partner_id,
        message_count = messages.len(),
        "conversation history loaded"
    );

    Ok(LoadHistoryOutput {
        partner_id,
        messages,
    })
}

fn map_source_error(error: HistorySourceError) -> LoadHistoryError {
    match error {
        HistorySourceError::Unauthorized => LoadHistoryError::Unauthorized,
        HistorySourceError::Unavailable => LoadHistoryError::TemporarilyUnavailable,
        HistorySourceError::InvalidData => LoadHistoryError::DataContractViolation,
        HistorySourceError::NotFound => LoadHistoryError::PartnerNotFound,
    }
}
