use serde_json::Value;

use crate::domain::notification::{
    normalize_notification, normalize_notification_page, Notification, NotificationPage,
};

const DEFAULT_NOTIFICATIONS_PAGE_SIZE: u32 = 20;
const MAX_NOTIFICATIONS_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListNotificationsQuery {
    pub page: u32,
    pub limit: u32,
}

impl Default for ListNotificationsQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_NOTIFICATIONS_PAGE_SIZE,
        }
    }
}

impl ListNotificationsQuery {
    fn normalized_page(&self) -> u32 {
        self.page.max(1)
    }

    fn normalized_limit(&self) -> u32 {
        match self.limit {
            0 => DEFAULT_NOTIFICATIONS_PAGE_SIZE,
            value if value > MAX_NOTIFICATIONS_PAGE_SIZE => MAX_NOTIFICATIONS_PAGE_SIZE,
            value => value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListNotificationsOutput {
    pub page: NotificationPage,
    pub unread_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationsSourceError {
    Unauthorized,
    Unavailable,
    InvalidData,
    NotFound,
}

pub trait NotificationsSource {
    fn list_notifications(&self, page: u32, limit: u32) -> Result<Value, NotificationsSourceError>;

    /// Returns the updated record when the backend sends one back.
    fn mark_notification_read(&self, id: &str) -> Result<Option<Value>, NotificationsSourceError>;

    fn delete_notification(&self, id: &str) -> Result<(), NotificationsSourceError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationsError {
    MissingId,
    Unauthorized,
    TemporarilyUnavailable,
    DataContractViolation,
    NotFound,
}

impl NotificationsError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::MissingId => "Notification id is required.",
            Self::Unauthorized => "Session expired. Please sign in again.",
            Self::TemporarilyUnavailable => "Could not load notifications.",
            Self::DataContractViolation => "The server returned unreadable notifications.",
            Self::NotFound => "Notification not found.",
        }
    }
}

pub fn list_notifications(
    source: &dyn NotificationsSource,
    query: ListNotificationsQuery,
) -> Result<ListNotificationsOutput, NotificationsError> {
    let page = query.normalized_page();
    let raw = source
        .list_notifications(page, query.normalized_limit())
        .map_err(map_source_error)?;

    let page = normalize_notification_page(&raw, page);
    let unread_count = page.notifications.iter().filter(|n| !n.read).count();

    Ok(ListNotificationsOutput { page, unread_count })
}

/// Marks one notification read; returns the server's copy when provided.
pub fn mark_notification_read(
    source: &dyn NotificationsSource,
    id: &str,
) -> Result<Option<Notification>, NotificationsError> {
    let id = require_id(id)?;
    let updated = source
        .mark_notification_read(id)
        .map_err(map_source_error)?;

    Ok(updated.map(|raw| {
        let record = raw.get("notification").unwrap_or(&raw);
        normalize_notification(record)
    }))
}

pub fn delete_notification(
    source: &dyn NotificationsSource,
    id: &str,
) -> Result<(), NotificationsError> {
    let id = require_id(id)?;
    source.delete_notification(id).map_err(map_source_error)
}

fn require_id(id: &str) -> Result<&str, NotificationsError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(NotificationsError::MissingId);
    }

    Ok(id)
}

fn map_source_error(error: NotificationsSourceError) -> NotificationsError {
    match error {
        NotificationsSourceError::Unauthorized => NotificationsError::Unauthorized,
        NotificationsSourceError::Unavailable => NotificationsError::TemporarilyUnavailable,
        NotificationsSourceError::InvalidData => NotificationsError::DataContractViolation,
        NotificationsSourceError::NotFound => NotificationsError::NotFound,
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use serde_json::json;

    use super::*;

    struct StubSource {
        page: Result<Value, NotificationsSourceError>,
        read: Result<Option<Value>, NotificationsSourceError>,
        captured_query: RefCell<Option<(u32, u32)>>,
        deleted: RefCell<Vec<String>>,
    }

    impl StubSource {
        fn new() -> Self {
            Self {
                page: Ok(json!({
                    "notifications": [
                        { "_id": "n1", "message": "new requirement", "read": false },
                        { "_id": "n2", "message": "accepted", "read": true },
                    ],
                    "page": 1,
                    "totalPages": 2,
                })),
                read: Ok(None),
                captured_query: RefCell::new(None),
                deleted: RefCell::new(Vec::new()),
            }
        }
    }

    impl NotificationsSource for StubSource {
        fn list_notifications(
            &self,
            page: u32,
            limit: u32,
        ) -> Result<Value, NotificationsSourceError> {
            *self.captured_query.borrow_mut() = Some((page, limit));
            self.page.clone()
        }

        fn mark_notification_read(
            &self,
            _id: &str,
        ) -> Result<Option<Value>, NotificationsSourceError> {
            self.read.clone()
        }

        fn delete_notification(&self, id: &str) -> Result<(), NotificationsSourceError> {
            self.deleted.borrow_mut().push(id.to_owned());
            Ok(())
        }
    }

    #[test]
    fn clamps_page_and_limit() {
        let source = StubSource::new();

        let _ = list_notifications(&source, ListNotificationsQuery { page: 0, limit: 500 })
            .expect("list must succeed");

        assert_eq!(*source.captured_query.borrow(), Some((1, 100)));
    }

    #[test]
    fn zero_limit_uses_default_page_size() {
        let source = StubSource::new();

        let _ = list_notifications(&source, ListNotificationsQuery { page: 2, limit: 0 })
            .expect("list must succeed");

        assert_eq!(*source.captured_query.borrow(), Some((2, 20)));
    }

    #[test]
    fn counts_unread_notifications() {
        let source = StubSource::new();

        let output = list_notifications(&source, ListNotificationsQuery::default())
            .expect("list must succeed");

        assert_eq!(output.unread_count, 1);
        assert_eq!(output.page.total_pages, 2);
    }

    #[test]
    fn mark_read_unwraps_notification_envelope() {
        let mut source = StubSource::new();
        source.read = Ok(Some(json!({ "notification": { "_id": "n1", "read": true } })));

        let updated = mark_notification_read(&source, "n1").expect("must succeed");

        assert_eq!(updated.map(|n| n.read), Some(true));
    }

    #[test]
    fn rejects_blank_ids() {
        let source = StubSource::new();

        assert_eq!(
            delete_notification(&source, "  "),
            Err(NotificationsError::MissingId)
        );
        assert!(source.deleted.borrow().is_empty());
    }

    #[test]
    fn maps_not_found_on_read() {
        let mut source = StubSource::new();
        source.read = Err(NotificationsSourceError::NotFound);

        let err = mark_notification_read(&source, "n1").expect_err("must fail");

        assert_eq!(err, NotificationsError::NotFound);
    }
}
