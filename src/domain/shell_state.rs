use super::{events::ConnectivityStatus, message::ChatMessage, notification::Notification};

/// Something the interactive shell should show the user next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellOutput {
    Notice(String),
    Message(ChatMessage),
    /// An optimistic send was confirmed by the backend.
    Delivered { temp_id: String },
    PartnerPresence { online: bool },
    Transcript(Vec<ChatMessage>),
    Notification(Notification),
    NotificationRead { id: String },
    NotificationRemoved { id: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellState {
    running: bool,
    connectivity_status: ConnectivityStatus,
    output: Vec<ShellOutput>,
}

impl Default for ShellState {
    fn default() -> Self {
        Self {
            running: true,
            connectivity_status: ConnectivityStatus::Connecting,
            output: Vec::new(),
        }
    }
}

impl ShellState {
    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn connectivity_status(&self) -> ConnectivityStatus {
        self.connectivity_status
    }

    pub fn set_connectivity_status(&mut self, status: ConnectivityStatus) {
        self.connectivity_status = status;
    }

    pub fn push_output(&mut self, output: ShellOutput) {
        self.output.push(output);
    }

    pub fn push_notice(&mut self, notice: impl Into<String>) {
        self.output.push(ShellOutput::Notice(notice.into()));
    }

    pub fn take_output(&mut self) -> Vec<ShellOutput> {
        std::mem::take(&mut self.output)
    }
}
