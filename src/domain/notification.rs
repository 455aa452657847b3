use chrono::{DateTime, Utc};
use serde_json::Value;

use super::normalize::{first_id, first_string, first_timestamp, resolve_id};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub id: String,
    pub message: String,
    pub user_email: Option<String>,
    pub link: Option<String>,
    pub read: bool,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationPage {
    pub notifications: Vec<Notification>,
    pub page: u32,
    pub total_pages: u32,
}

pub fn normalize_notification(raw: &Value) -> Notification {
    Notification {
        id: first_id(raw).unwrap_or_default(),
        message: first_string(raw, &["message"]).unwrap_or_default(),
        user_email: first_string(raw, &["userEmail"]),
        link: first_string(raw, &["link"]),
        read: raw.get("read").and_then(Value::as_bool).unwrap_or(false),
        created_at: first_timestamp(raw, &["createdAt"]),
    }
}

/// Decodes `{ notifications, page, totalPages }`, defaulting missing paging fields.
pub fn normalize_notification_page(raw: &Value, requested_page: u32) -> NotificationPage {
    let notifications = raw
        .get("notifications")
        .and_then(Value::as_array)
        .map(|items| items.iter().map(normalize_notification).collect())
        .unwrap_or_default();

    NotificationPage {
        notifications,
        page: positive_u32(raw.get("page")).unwrap_or(requested_page),
        total_pages: positive_u32(raw.get("totalPages")).unwrap_or(1),
    }
}

/// Id carried by a `notification:deleted` payload (`{ id }` or a bare id).
pub fn deleted_notification_id(raw: &Value) -> String {
    match raw.get("id") {
        Some(id) => resolve_id(Some(id)),
        None => resolve_id(Some(raw)),
    }
}

fn positive_u32(value: Option<&Value>) -> Option<u32> {
    value
        .and_then(Value::as_u64)
        .filter(|value| *value > 0)
        .and_then(|value| u32::try_from(value).ok())
}

/// Newest-first notification list kept current by realtime events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationFeed {
    items: Vec<Notification>,
}

impl NotificationFeed {
    pub fn replace(&mut self, items: Vec<Notification>) {
        self.items = items;
    }

    /// Puts a new notification on top. Known ids are ignored.
    pub fn push_new(&mut self, notification: Notification) -> bool {
        if self.items.iter().any(|item| item.id == notification.id) {
            return false;
        }

        self.items.insert(0, notification);
        true
    }

    /// Replaces a stored notification with the server's updated copy.
    pub fn apply_update(&mut self, notification: Notification) -> bool {
        match self.items.iter_mut().find(|item| item.id == notification.id) {
            Some(item) => {
                *item = notification;
                true
            }
            None => false,
        }
    }

    pub fn mark_read(&mut self, id: &str) -> bool {
        match self.items.iter_mut().find(|item| item.id == id) {
            Some(item) if !item.read => {
                item.read = true;
                true
            }
            _ => false,
        }
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|item| item.id != id);
        self.items.len() != before
    }

    pub fn unread_count(&self) -> usize {
        self.items.iter().filter(|item| !item.read).count()
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn items(&self) -> &[Notification] {
        &self.items
    }
}
