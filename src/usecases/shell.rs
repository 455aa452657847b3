use anyhow::Result;

use crate::domain::{
    conversation::ReconcileOutcome,
    events::{AppEvent, ConnectivityStatus, InboundEvent, OutboundEvent},
    message::MessageKey,
    shell_state::{ShellOutput, ShellState},
};

use super::{
    contracts::ShellOrchestrator,
    conversation_session::{ConversationSession, SessionUpdate},
    mark_read::{mark_conversation_read, ReadMarker},
    send_message::MessageDispatcher,
};

const SHELL_SNAPSHOT_REQUEST_FAILED: &str = "SHELL_SNAPSHOT_REQUEST_FAILED";
const SHELL_MARK_READ_FAILED: &str = "SHELL_MARK_READ_FAILED";

const QUIT_COMMAND: &str = "/quit";
const HISTORY_COMMAND: &str = "/history";
const WHO_COMMAND: &str = "/who";

/// Drives one interactive conversation from user input and realtime events.
pub struct ChatShellOrchestrator<D, R>
where
    D: MessageDispatcher,
    R: ReadMarker,
{
    state: ShellState,
    session: ConversationSession,
    dispatcher: D,
    read_marker: R,
}

impl<D, R> ChatShellOrchestrator<D, R>
where
    D: MessageDispatcher,
    R: ReadMarker,
{
    pub fn new(session: ConversationSession, dispatcher: D, read_marker: R) -> Self {
        Self {
            state: ShellState::default(),
            session,
            dispatcher,
            read_marker,
        }
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn session(&self) -> &ConversationSession {
        &self.session
    }

    /// Shows the loaded transcript and asks for a fresh presence snapshot.
    pub fn start(&mut self) {
        if self.dispatcher.is_ready() {
            self.state.set_connectivity_status(ConnectivityStatus::Connected);
        }

        self.state
            .push_output(ShellOutput::Transcript(self.session.messages()));
        self.request_presence_snapshot();
    }

    fn handle_input(&mut self, line: &str) {
        let line = line.trim();
        match line {
            "" => {}
            QUIT_COMMAND => {
                let pending = self.session.buffer().pending_count();
                if pending > 0 {
                    self.state.push_notice(format!(
                        "{pending} message(s) were not confirmed before leaving."
                    ));
                }
                self.state.stop();
            }
            HISTORY_COMMAND => self
                .state
                .push_output(ShellOutput::Transcript(self.session.messages())),
            WHO_COMMAND => {
                self.state.push_output(ShellOutput::PartnerPresence {
                    online: self.session.is_partner_online(),
                });
                self.state.push_notice(format!(
                    "{} user(s) online",
                    self.session.presence().len()
                ));
            }
            command if command.starts_with('/') => {
                self.state.push_notice(format!(
                    "Unknown command {command}. Use {HISTORY_COMMAND}, {WHO_COMMAND} or {QUIT_COMMAND}."
                ));
            }
            text => match self.session.send_local(&self.dispatcher, text) {
                Ok(temp_id) => {
                    let key = MessageKey::Temporary(temp_id);
                    if let Some(placeholder) = self.session.buffer().get(&key) {
                        self.state
                            .push_output(ShellOutput::Message(placeholder.clone()));
                    }
                }
                Err(error) => self.state.push_notice(error.user_message()),
            },
        }
    }

    fn handle_realtime(&mut self, event: InboundEvent) {
        match self.session.handle_event(&event) {
            SessionUpdate::Message {
                outcome: ReconcileOutcome::Promoted,
                message,
            } => {
                if let Some(temp_id) = message.temp_id {
                    self.state.push_output(ShellOutput::Delivered { temp_id });
                }
            }
            SessionUpdate::Message { message, .. } => {
                let from_partner = message.is_from(&self.session.partner().id);
                self.state.push_output(ShellOutput::Message(message));
                if from_partner {
                    self.mark_read();
                }
            }
            SessionUpdate::Background(message) => {
                self.state.push_notice(format!(
                    "New message from {}: {}",
                    message.sender.display_name(),
                    message.body
                ));
            }
            SessionUpdate::PartnerPresence { online } => {
                self.state
                    .push_output(ShellOutput::PartnerPresence { online });
            }
            SessionUpdate::Connectivity(status) => {
                let previous = self.state.connectivity_status();
                self.state.set_connectivity_status(status);
                match status {
                    ConnectivityStatus::Connected if previous != status => {
                        self.state.push_notice("Connected.");
                    }
                    ConnectivityStatus::Disconnected if previous != status => {
                        self.state
                            .push_notice("Connection lost. Reconnecting...");
                    }
                    _ => {}
                }
            }
            SessionUpdate::SendFailed(message) => {
                self.state.push_notice(format!(
                    "Message could not be sent: {}",
                    message.body
                ));
            }
            SessionUpdate::Unchanged
            | SessionUpdate::HistoryLoaded { .. }
            | SessionUpdate::HistoryFailed(_)
            | SessionUpdate::StaleHistoryIgnored => {}
        }
    }

    fn request_presence_snapshot(&self) {
        if !self.dispatcher.is_ready() {
            return;
        }

        if let Err(error) = self
            .dispatcher
            .dispatch(OutboundEvent::RequestOnlineSnapshot)
        {
            tracing::warn!(
                code = SHELL_SNAPSHOT_REQUEST_FAILED,
                error = ?error,
                "presence snapshot request failed"
            );
        }
    }

    fn mark_read(&self) {
        if let Err(error) = mark_conversation_read(
            &self.read_marker,
            &self.session.me().id,
            &self.session.partner().id,
        ) {
            tracing::warn!(
                code = SHELL_MARK_READ_FAILED,
                error = ?error,
                "mark-as-read failed; conversation stays usable"
            );
        }
    }
}

impl<D, R> ShellOrchestrator for ChatShellOrchestrator<D, R>
where
    D: MessageDispatcher,
    R: ReadMarker,
{
    fn state(&self) -> &ShellState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ShellState {
        &mut self.state
    }

    fn handle_event(&mut self, event: AppEvent) -> Result<()> {
        match event {
            AppEvent::Tick => {}
            AppEvent::QuitRequested => self.state.stop(),
            AppEvent::InputLine(line) => self.handle_input(&line),
            AppEvent::Realtime(event) => self.handle_realtime(event),
        }

        Ok(())
    }
}
