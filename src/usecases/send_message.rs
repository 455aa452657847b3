//! Sending a chat message over the realtime channel.
//!
//! `MessageDispatcher` is the outbound side of the shared realtime
//! connection. Validation happens here; the optimistic placeholder is managed
//! by the conversation session around these calls.

use uuid::Uuid;

use crate::domain::events::OutboundEvent;

const TEMP_ID_PREFIX: &str = "tmp-";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendMessageCommand {
    pub to: String,
    pub text: String,
}

/// Errors reported by the outbound channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    NotConnected,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendMessageError {
    /// Message text is empty after trimming whitespace.
    EmptyMessage,
    MissingRecipient,
    /// The realtime channel is not connected.
    NotConnected,
    /// The realtime channel went away while sending.
    ChannelClosed,
}

impl SendMessageError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::EmptyMessage => "Nothing to send.",
            Self::MissingRecipient => "No conversation partner selected.",
            Self::NotConnected => "Still connecting. Message not sent.",
            Self::ChannelClosed => "Connection lost. Message not sent.",
        }
    }
}

pub trait MessageDispatcher {
    fn is_ready(&self) -> bool;

    fn dispatch(&self, event: OutboundEvent) -> Result<(), DispatchError>;
}

impl<T: MessageDispatcher + ?Sized> MessageDispatcher for &T {
    fn is_ready(&self) -> bool {
        (*self).is_ready()
    }

    fn dispatch(&self, event: OutboundEvent) -> Result<(), DispatchError> {
        (*self).dispatch(event)
    }
}

/// A validated send, ready for optimistic insertion and dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedSend {
    pub to: String,
    pub body: String,
    pub temp_id: String,
}

impl PreparedSend {
    pub fn into_event(self) -> OutboundEvent {
        OutboundEvent::SendMessage {
            to: self.to,
            message: self.body,
            temp_id: self.temp_id,
        }
    }
}

/// Validates the command and assigns a fresh temporary id.
///
/// Requires non-blank text, a recipient, and a ready outbound channel.
pub fn prepare_send(
    dispatcher: &dyn MessageDispatcher,
    command: SendMessageCommand,
) -> Result<PreparedSend, SendMessageError> {
    let body = command.text.trim();
    if body.is_empty() {
        return Err(SendMessageError::EmptyMessage);
    }

    let to = command.to.trim();
    if to.is_empty() {
        return Err(SendMessageError::MissingRecipient);
    }

    if !dispatcher.is_ready() {
        return Err(SendMessageError::NotConnected);
    }

    Ok(PreparedSend {
        to: to.to_owned(),
        body: body.to_owned(),
        temp_id: new_temp_id(),
    })
}

pub fn dispatch_send(
    dispatcher: &dyn MessageDispatcher,
    prepared: PreparedSend,
) -> Result<(), SendMessageError> {
    dispatcher
        .dispatch(prepared.into_event())
        .map_err(map_dispatch_error)
}

pub fn new_temp_id() -> String {
    format!("{TEMP_ID_PREFIX}{}", Uuid::new_v4())
}

fn map_dispatch_error(error: DispatchError) -> SendMessageError {
    match error {
        DispatchError::NotConnected => SendMessageError::NotConnected,
        DispatchError::Closed => SendMessageError::ChannelClosed,
    }
}
