use serde_json::Value;

use crate::{
    domain::{contact::normalize_current_user, message::Participant},
    infra::config::SessionConfig,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CurrentUserSourceError {
    Unauthorized,
    Unavailable,
    InvalidData,
}

pub trait CurrentUserSource {
    fn current_user(&self) -> Result<Value, CurrentUserSourceError>;
}

impl<T: CurrentUserSource + ?Sized> CurrentUserSource for &T {
    fn current_user(&self) -> Result<Value, CurrentUserSourceError> {
        (*self).current_user()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CurrentUserError {
    /// No signed-in user; the session cookie is missing or expired.
    NotSignedIn,
    TemporarilyUnavailable,
}

impl CurrentUserError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::NotSignedIn => "Not signed in. Run dmchat login or set session.cookie in the config file.",
            Self::TemporarilyUnavailable => "Could not reach the marketplace backend.",
        }
    }
}

/// Resolves the signed-in user.
///
/// A `user_id` pinned in config wins and skips the backend round trip.
pub fn resolve_current_user(
    source: &dyn CurrentUserSource,
    session: &SessionConfig,
) -> Result<Participant, CurrentUserError> {
    if let Some(user_id) = session.user_id.as_deref().filter(|id| !id.trim().is_empty()) {
        return Ok(Participant::new(user_id.trim(), session.user_name.clone()));
    }

    let raw = source.current_user().map_err(|error| match error {
        CurrentUserSourceError::Unauthorized | CurrentUserSourceError::InvalidData => {
            CurrentUserError::NotSignedIn
        }
        CurrentUserSourceError::Unavailable => CurrentUserError::TemporarilyUnavailable,
    })?;

    normalize_current_user(&raw).ok_or(CurrentUserError::NotSignedIn)
}
