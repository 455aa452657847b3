use serde_json::Value;

use crate::domain::contact::{normalize_contact, Contact};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ListContactsQuery {
    pub current_user_id: String,
    pub search: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListContactsOutput {
    pub contacts: Vec<Contact>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContactsSourceError {
    Unauthorized,
    Unavailable,
    InvalidData,
}

pub trait ContactsSource {
    fn list_contacts(&self) -> Result<Vec<Value>, ContactsSourceError>;
}

impl<T: ContactsSource + ?Sized> ContactsSource for &T {
    fn list_contacts(&self) -> Result<Vec<Value>, ContactsSourceError> {
        (*self).list_contacts()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListContactsError {
    Unauthorized,
    TemporarilyUnavailable,
    DataContractViolation,
}

impl ListContactsError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Unauthorized => "Session expired. Please sign in again.",
            Self::TemporarilyUnavailable => "Could not load conversations.",
            Self::DataContractViolation => "The server returned an unreadable contact list.",
        }
    }
}

/// Lists chat counterparts, excluding the current user, in backend order.
pub fn list_contacts(
    source: &dyn ContactsSource,
    query: ListContactsQuery,
) -> Result<ListContactsOutput, ListContactsError> {
    let search = query.search.unwrap_or_default();

    let contacts = source
        .list_contacts()
        .map_err(map_source_error)?
        .iter()
        .map(normalize_contact)
        .filter(|contact| !contact.id.is_empty() && contact.id != query.current_user_id)
        .filter(|contact| contact.matches_search(&search))
        .collect();

    Ok(ListContactsOutput { contacts })
}

fn map_source_error(error: ContactsSourceError) -> ListContactsError {
    match error {
        ContactsSourceError::Unauthorized => ListContactsError::Unauthorized,
        ContactsSourceError::Unavailable => ListContactsError::TemporarilyUnavailable,
        ContactsSourceError::InvalidData => ListContactsError::DataContractViolation,
    }
}
