//! Transcript rendering for the line-based chat view.
//!
//! Handles:
//! - Date separators between messages from different days (`Today`,
//!   `Yesterday`, or `14 February 2026`)
//! - Sender grouping (consecutive messages from the same sender show the name once)
//! - A pending marker on messages the backend has not confirmed yet

use std::fmt::Display;

use chrono::{DateTime, Days, NaiveDate, TimeZone, Utc};

use crate::domain::message::ChatMessage;

const YOU: &str = "You";
const PENDING_MARKER: &str = " (sending)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageListElement {
    DateSeparator(String),
    Message {
        time: String,
        sender: Option<String>,
        content: String,
        pending: bool,
    },
}

/// Knows who "you" are and which local calendar day is today.
#[derive(Debug, Clone)]
pub struct TranscriptRenderer<Tz: TimeZone> {
    me_id: String,
    today: NaiveDate,
    tz: Tz,
    prev_date: Option<NaiveDate>,
    prev_sender: Option<String>,
}

impl<Tz> TranscriptRenderer<Tz>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    pub fn new(me_id: impl Into<String>, now: DateTime<Utc>, tz: Tz) -> Self {
        let today = now.with_timezone(&tz).date_naive();
        Self {
            me_id: me_id.into(),
            today,
            tz,
            prev_date: None,
            prev_sender: None,
        }
    }

    /// Forgets grouping state so the next message starts a fresh block.
    pub fn reset(&mut self) {
        self.prev_date = None;
        self.prev_sender = None;
    }

    pub fn build_elements(&mut self, messages: &[ChatMessage]) -> Vec<MessageListElement> {
        self.reset();
        messages
            .iter()
            .flat_map(|message| self.push_message(message))
            .collect()
    }

    /// Elements for one more message appended below what was already shown.
    pub fn push_message(&mut self, message: &ChatMessage) -> Vec<MessageListElement> {
        let mut elements = Vec::with_capacity(2);
        let local = message.created_at.with_timezone(&self.tz);
        let msg_date = local.date_naive();

        if self.prev_date != Some(msg_date) {
            elements.push(MessageListElement::DateSeparator(date_label(
                msg_date, self.today,
            )));
            self.prev_sender = None;
        }

        let sender_name = if message.is_from(&self.me_id) {
            YOU.to_owned()
        } else {
            message.sender.display_name().to_owned()
        };

        let sender = (self.prev_sender.as_deref() != Some(sender_name.as_str()))
            .then(|| sender_name.clone());

        elements.push(MessageListElement::Message {
            time: local.format("%H:%M").to_string(),
            sender,
            content: message.body.clone(),
            pending: !message.is_confirmed(),
        });

        self.prev_date = Some(msg_date);
        self.prev_sender = Some(sender_name);
        elements
    }
}

pub fn date_label(date: NaiveDate, today: NaiveDate) -> String {
    if date == today {
        return "Today".to_owned();
    }

    if today.checked_sub_days(Days::new(1)) == Some(date) {
        return "Yesterday".to_owned();
    }

    date.format("%-d %B %Y").to_string()
}

pub fn element_to_line(element: &MessageListElement) -> String {
    match element {
        MessageListElement::DateSeparator(label) => format!("—— {label} ——"),
        MessageListElement::Message {
            time,
            sender,
            content,
            pending,
        } => {
            let marker = if *pending { PENDING_MARKER } else { "" };
            match sender {
                Some(sender) => format!("{time} {sender}: {content}{marker}"),
                None => format!("{time}   {content}{marker}"),
            }
        }
    }
}
