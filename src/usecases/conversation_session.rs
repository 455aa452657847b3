//! State of one open conversation: its message buffer, the presence set, and
//! the rules for applying history loads, local sends and realtime events.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::domain::{
    conversation::{ConversationBuffer, ReconcileOutcome},
    events::{ConnectivityStatus, InboundEvent},
    message::{ChatMessage, Participant},
    normalize::normalize_message,
    presence::PresenceSet,
};

use super::{
    load_history::{LoadHistoryError, LoadHistoryOutput},
    send_message::{
        dispatch_send, prepare_send, MessageDispatcher, SendMessageCommand, SendMessageError,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Loading,
    Ready,
    Error,
}

/// What changed after feeding something into the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionUpdate {
    Unchanged,
    HistoryLoaded { count: usize },
    HistoryFailed(LoadHistoryError),
    /// History arrived for a conversation that is no longer open.
    StaleHistoryIgnored,
    Message {
        outcome: ReconcileOutcome,
        message: ChatMessage,
    },
    /// A message for another conversation, from someone else.
    Background(ChatMessage),
    PartnerPresence { online: bool },
    Connectivity(ConnectivityStatus),
    /// A placeholder whose send never went out was removed.
    SendFailed(ChatMessage),
}

#[derive(Debug, Clone)]
pub struct ConversationSession {
    me: Participant,
    partner: Participant,
    buffer: ConversationBuffer,
    presence: PresenceSet,
    phase: SessionPhase,
}

impl ConversationSession {
    pub fn open(me: Participant, partner: Participant) -> Self {
        tracing::debug!(partner_id = %partner.id, "conversation opened");

        Self {
            me,
            partner,
            buffer: ConversationBuffer::new(),
            presence: PresenceSet::new(),
            phase: SessionPhase::Loading,
        }
    }

    pub fn me(&self) -> &Participant {
        &self.me
    }

    pub fn partner(&self) -> &Participant {
        &self.partner
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn buffer(&self) -> &ConversationBuffer {
        &self.buffer
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.buffer.to_vec()
    }

    pub fn presence(&self) -> &PresenceSet {
        &self.presence
    }

    pub fn is_partner_online(&self) -> bool {
        self.presence.is_online(&self.partner.id)
    }

    /// Applies a history result, ignoring results for any other partner.
    ///
    /// A failed load keeps whatever is already buffered.
    pub fn apply_history(
        &mut self,
        result: Result<LoadHistoryOutput, LoadHistoryError>,
        requested_partner_id: &str,
    ) -> SessionUpdate {
        if requested_partner_id != self.partner.id {
            tracing::debug!(
                requested_partner_id,
                open_partner_id = %self.partner.id,
                "ignoring history for a conversation that is no longer open"
            );
            return SessionUpdate::StaleHistoryIgnored;
        }

        match result {
            Ok(output) if output.partner_id != self.partner.id => {
                SessionUpdate::StaleHistoryIgnored
            }
            Ok(output) => {
                self.buffer.load_history(output.messages);
                self.phase = SessionPhase::Ready;
                SessionUpdate::HistoryLoaded {
                    count: self.buffer.len(),
                }
            }
            Err(error) => {
                tracing::warn!(
                    partner_id = %self.partner.id,
                    error = ?error,
                    "conversation history load failed"
                );
                self.phase = SessionPhase::Error;
                SessionUpdate::HistoryFailed(error)
            }
        }
    }

    /// Optimistically appends `text` and dispatches it; returns the temporary id.
    pub fn send_local(
        &mut self,
        dispatcher: &dyn MessageDispatcher,
        text: &str,
    ) -> Result<String, SendMessageError> {
        self.send_local_at(dispatcher, text, Utc::now())
    }

    pub fn send_local_at(
        &mut self,
        dispatcher: &dyn MessageDispatcher,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<String, SendMessageError> {
        let prepared = prepare_send(
            dispatcher,
            SendMessageCommand {
                to: self.partner.id.clone(),
                text: text.to_owned(),
            },
        )?;
        let temp_id = prepared.temp_id.clone();

        self.buffer.push_pending(ChatMessage::placeholder(
            temp_id.clone(),
            self.me.clone(),
            self.partner.clone(),
            prepared.body.clone(),
            now,
        ));

        if let Err(error) = dispatch_send(dispatcher, prepared) {
            self.buffer.discard_pending(&temp_id);
            tracing::warn!(temp_id = %temp_id, error = ?error, "optimistic send rolled back");
            return Err(error);
        }

        Ok(temp_id)
    }

    pub fn handle_event(&mut self, event: &InboundEvent) -> SessionUpdate {
        self.handle_event_at(event, Utc::now())
    }

    pub fn handle_event_at(&mut self, event: &InboundEvent, now: DateTime<Utc>) -> SessionUpdate {
        match event {
            InboundEvent::UserOnline(id) => {
                let changed = self.presence.mark_online(id.clone());
                self.partner_presence_update(changed, id)
            }
            InboundEvent::UserOffline(id) => {
                let changed = self.presence.mark_offline(id);
                self.partner_presence_update(changed, id)
            }
            InboundEvent::OnlineSnapshot(snapshot) => {
                let was_online = self.is_partner_online();
                self.presence.replace_all(snapshot);
                if was_online == self.is_partner_online() {
                    SessionUpdate::Unchanged
                } else {
                    SessionUpdate::PartnerPresence {
                        online: self.is_partner_online(),
                    }
                }
            }
            InboundEvent::MessageReceived(raw) => self.reconcile_incoming_at(raw, now),
            InboundEvent::Connectivity(status) => SessionUpdate::Connectivity(*status),
            InboundEvent::SendFailed { temp_id } => match self.buffer.discard_pending(temp_id) {
                Some(placeholder) => {
                    tracing::warn!(temp_id = %temp_id, "unsent message rolled back");
                    SessionUpdate::SendFailed(placeholder)
                }
                None => SessionUpdate::Unchanged,
            },
            InboundEvent::NewMessageNotification(_)
            | InboundEvent::NotificationCreated(_)
            | InboundEvent::NotificationRead(_)
            | InboundEvent::NotificationDeleted(_) => SessionUpdate::Unchanged,
        }
    }

    /// Normalizes and merges a delivered message, if it belongs to this conversation.
    pub fn reconcile_incoming_at(&mut self, raw: &Value, now: DateTime<Utc>) -> SessionUpdate {
        let message = normalize_message(raw, now);

        if !message.involves(&self.partner.id) {
            if message.is_from(&self.me.id) {
                return SessionUpdate::Unchanged;
            }
            return SessionUpdate::Background(message);
        }

        let outcome = self.buffer.reconcile(message.clone());
        tracing::debug!(
            partner_id = %self.partner.id,
            outcome = ?outcome,
            "incoming message reconciled"
        );

        if outcome.changed() {
            SessionUpdate::Message { outcome, message }
        } else {
            SessionUpdate::Unchanged
        }
    }

    fn partner_presence_update(&self, changed: bool, id: &str) -> SessionUpdate {
        if changed && id == self.partner.id {
            SessionUpdate::PartnerPresence {
                online: self.is_partner_online(),
            }
        } else {
            SessionUpdate::Unchanged
        }
    }
}
