//! Ordered message buffer for one open conversation.
//!
//! Entries live in a map ordered by `(created_at, insertion sequence)` with a
//! side index from [`MessageKey`] to that slot. Confirming an optimistic send
//! rewrites the entry's key and keeps its sequence number, so it stays put
//! relative to messages that share its timestamp.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};

use super::message::{ChatMessage, MessageKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Slot {
    created_at: DateTime<Utc>,
    seq: u64,
}

/// What [`ConversationBuffer::reconcile`] did with an incoming message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// A pending placeholder was replaced by its confirmed version.
    Promoted,
    /// The message was already present; nothing changed.
    Duplicate,
    /// A new message was inserted.
    Inserted,
}

impl ReconcileOutcome {
    pub fn changed(self) -> bool {
        !matches!(self, Self::Duplicate)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConversationBuffer {
    entries: BTreeMap<Slot, ChatMessage>,
    index: HashMap<MessageKey, Slot>,
    next_seq: u64,
}

impl ConversationBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole buffer with a history snapshot.
    ///
    /// Duplicate confirmed ids keep their first occurrence.
    pub fn load_history(&mut self, messages: Vec<ChatMessage>) {
        self.clear();

        for mut message in messages {
            if self.index.contains_key(&message.key) {
                continue;
            }
            if message.is_confirmed() {
                message.temp_id = None;
            }
            self.insert(message);
        }
    }

    /// Appends an optimistic, not yet confirmed message.
    ///
    /// Returns `false` when a message with the same key is already buffered.
    pub fn push_pending(&mut self, message: ChatMessage) -> bool {
        if self.index.contains_key(&message.key) {
            return false;
        }

        self.insert(message);
        true
    }

    /// Removes a pending placeholder, e.g. after its send failed.
    pub fn discard_pending(&mut self, temp_id: &str) -> Option<ChatMessage> {
        let slot = self
            .index
            .remove(&MessageKey::Temporary(temp_id.to_owned()))?;
        self.entries.remove(&slot)
    }

    /// Merges a message delivered by the backend into the buffer.
    pub fn reconcile(&mut self, mut message: ChatMessage) -> ReconcileOutcome {
        if !message.is_confirmed() {
            // An echo without a server id cannot confirm anything.
            return if self.push_pending(message) {
                ReconcileOutcome::Inserted
            } else {
                ReconcileOutcome::Duplicate
            };
        }

        let temp_id = message.temp_id.take();

        if let Some(temp_id) = temp_id {
            if let Some(slot) = self.index.remove(&MessageKey::Temporary(temp_id)) {
                self.entries.remove(&slot);

                if self.index.contains_key(&message.key) {
                    // Confirmed copy arrived first; the placeholder just goes away.
                    return ReconcileOutcome::Promoted;
                }

                let promoted = Slot {
                    created_at: message.created_at,
                    seq: slot.seq,
                };
                self.index.insert(message.key.clone(), promoted);
                self.entries.insert(promoted, message);
                return ReconcileOutcome::Promoted;
            }
        }

        if self.index.contains_key(&message.key) {
            return ReconcileOutcome::Duplicate;
        }

        self.insert(message);
        ReconcileOutcome::Inserted
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
        self.next_seq = 0;
    }

    /// Messages in ascending creation order.
    pub fn iter(&self) -> impl Iterator<Item = &ChatMessage> {
        self.entries.values()
    }

    pub fn to_vec(&self) -> Vec<ChatMessage> {
        self.iter().cloned().collect()
    }

    pub fn get(&self, key: &MessageKey) -> Option<&ChatMessage> {
        self.index.get(key).and_then(|slot| self.entries.get(slot))
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn contains(&self, key: &MessageKey) -> bool {
        self.index.contains_key(key)
    }

    pub fn pending_count(&self) -> usize {
        self.index.keys().filter(|key| !key.is_confirmed()).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn insert(&mut self, message: ChatMessage) {
        let slot = Slot {
            created_at: message.created_at,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.index.insert(message.key.clone(), slot);
        self.entries.insert(slot, message);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::domain::{message::Participant, normalize::normalize_message};

    fn at(rfc3339: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(rfc3339)
            .expect("fixture timestamp must parse")
            .with_timezone(&Utc)
    }

    fn now() -> DateTime<Utc> {
        at("2026-03-01T12:00:00Z")
    }

    fn confirmed(id: &str, created_at: &str) -> ChatMessage {
        normalize_message(
            &json!({
                "_id": id,
                "sender": "u1",
                "receiver": "u2",
                "message": id,
                "createdAt": created_at,
            }),
            now(),
        )
    }

    fn pending(temp_id: &str, created_at: &str) -> ChatMessage {
        ChatMessage::placeholder(
            temp_id,
            Participant::new("u2", None),
            Participant::new("u1", None),
            "yo",
            at(created_at),
        )
    }

    fn is_sorted(buffer: &ConversationBuffer) -> bool {
        let times: Vec<_> = buffer.iter().map(|message| message.created_at).collect();
        times.windows(2).all(|pair| pair[0] <= pair[1])
    }

    #[test]
    fn load_history_replaces_contents_in_time_order() {
        let mut buffer = ConversationBuffer::new();
        buffer.push_pending(pending("tmp-old", "2024-01-01T00:00:00Z"));

        buffer.load_history(vec![
            confirmed("m2", "2024-01-02T00:00:00Z"),
            confirmed("m1", "2024-01-01T00:00:00Z"),
        ]);

        let ids: Vec<_> = buffer.iter().map(|m| m.key.as_str().to_owned()).collect();
        assert_eq!(ids, vec!["m1", "m2"]);
        assert_eq!(buffer.pending_count(), 0);
    }

    #[test]
    fn load_history_drops_duplicate_ids() {
        let mut buffer = ConversationBuffer::new();

        buffer.load_history(vec![
            confirmed("m1", "2024-01-01T00:00:00Z"),
            confirmed("m1", "2024-01-01T00:00:00Z"),
        ]);

        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn confirmation_collapses_placeholder_into_one_entry() {
        let mut buffer = ConversationBuffer::new();
        buffer.push_pending(pending("tmp-1", "2024-01-01T00:00:30Z"));

        let mut echo = confirmed("m2", "2024-01-01T00:00:30Z");
        echo.temp_id = Some("tmp-1".to_owned());
        let outcome = buffer.reconcile(echo);

        assert_eq!(outcome, ReconcileOutcome::Promoted);
        assert_eq!(buffer.len(), 1);
        assert!(!buffer.contains(&MessageKey::Temporary("tmp-1".to_owned())));
        let stored = buffer
            .get(&MessageKey::Confirmed("m2".to_owned()))
            .expect("confirmed entry must exist");
        assert_eq!(stored.temp_id, None);
    }

    #[test]
    fn promotion_keeps_position_among_equal_timestamps() {
        let mut buffer = ConversationBuffer::new();
        buffer.push_pending(pending("tmp-1", "2024-01-01T00:00:00Z"));
        buffer.reconcile(confirmed("m9", "2024-01-01T00:00:00Z"));

        let mut echo = confirmed("m2", "2024-01-01T00:00:00Z");
        echo.temp_id = Some("tmp-1".to_owned());
        buffer.reconcile(echo);

        let ids: Vec<_> = buffer.iter().map(|m| m.key.as_str().to_owned()).collect();
        assert_eq!(ids, vec!["m2", "m9"]);
    }

    #[test]
    fn promotion_resorts_when_server_time_differs() {
        let mut buffer = ConversationBuffer::new();
        buffer.push_pending(pending("tmp-1", "2024-01-03T00:00:00Z"));
        buffer.reconcile(confirmed("m2", "2024-01-02T00:00:00Z"));

        let mut echo = confirmed("m1", "2024-01-01T00:00:00Z");
        echo.temp_id = Some("tmp-1".to_owned());
        buffer.reconcile(echo);

        let ids: Vec<_> = buffer.iter().map(|m| m.key.as_str().to_owned()).collect();
        assert_eq!(ids, vec!["m1", "m2"]);
        assert!(is_sorted(&buffer));
    }

    #[test]
    fn placeholder_is_dropped_when_confirmed_copy_already_exists() {
        let mut buffer = ConversationBuffer::new();
        buffer.push_pending(pending("tmp-1", "2024-01-01T00:00:00Z"));
        buffer.reconcile(confirmed("m2", "2024-01-01T00:00:01Z"));

        let mut echo = confirmed("m2", "2024-01-01T00:00:01Z");
        echo.temp_id = Some("tmp-1".to_owned());
        buffer.reconcile(echo);

        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.pending_count(), 0);
    }

    #[test]
    fn repeated_delivery_is_idempotent() {
        let mut buffer = ConversationBuffer::new();

        let outcomes: Vec<_> = (0..3)
            .map(|_| buffer.reconcile(confirmed("m1", "2024-01-01T00:00:00Z")))
            .collect();

        assert_eq!(
            outcomes,
            vec![
                ReconcileOutcome::Inserted,
                ReconcileOutcome::Duplicate,
                ReconcileOutcome::Duplicate
            ]
        );
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn inserts_out_of_order_delivery_in_time_order() {
        let mut buffer = ConversationBuffer::new();

        buffer.reconcile(confirmed("m3", "2024-01-03T00:00:00Z"));
        buffer.reconcile(confirmed("m1", "2024-01-01T00:00:00Z"));
        buffer.reconcile(confirmed("m2", "2024-01-02T00:00:00Z"));

        let ids: Vec<_> = buffer.iter().map(|m| m.key.as_str().to_owned()).collect();
        assert_eq!(ids, vec!["m1", "m2", "m3"]);
    }

    #[test]
    fn discard_pending_removes_only_that_placeholder() {
        let mut buffer = ConversationBuffer::new();
        buffer.reconcile(confirmed("m1", "2024-01-01T00:00:00Z"));
        buffer.push_pending(pending("tmp-1", "2024-01-01T00:00:01Z"));

        let removed = buffer.discard_pending("tmp-1");

        assert!(removed.is_some());
        assert_eq!(buffer.len(), 1);
        assert!(buffer.discard_pending("tmp-1").is_none());
    }

    #[test]
    fn unconfirmed_echo_does_not_duplicate_placeholder() {
        let mut buffer = ConversationBuffer::new();
        buffer.push_pending(pending("tmp-1", "2024-01-01T00:00:00Z"));

        let echo = normalize_message(&json!({ "tempId": "tmp-1", "sender": "u2" }), now());

        assert_eq!(buffer.reconcile(echo), ReconcileOutcome::Duplicate);
        assert_eq!(buffer.len(), 1);
    }
}
