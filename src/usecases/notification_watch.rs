use anyhow::Result;
use serde_json::Value;

use crate::domain::{
    events::{AppEvent, ConnectivityStatus, InboundEvent},
    notification::{deleted_notification_id, normalize_notification, Notification, NotificationFeed},
    shell_state::{ShellOutput, ShellState},
};

use super::contracts::ShellOrchestrator;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedChange {
    Added(Notification),
    Read(String),
    Removed(String),
}

/// Applies one realtime notification event to the feed.
pub fn apply_live_event(feed: &mut NotificationFeed, event: &InboundEvent) -> Option<FeedChange> {
    match event {
        InboundEvent::NotificationCreated(raw) => {
            let notification = normalize_notification(unwrap_envelope(raw));
            if notification.id.is_empty() {
                return None;
            }
            feed.push_new(notification.clone())
                .then_some(FeedChange::Added(notification))
        }
        InboundEvent::NotificationRead(raw) => {
            let mut notification = normalize_notification(unwrap_envelope(raw));
            if notification.id.is_empty() {
                let id = deleted_notification_id(raw);
                return feed.mark_read(&id).then_some(FeedChange::Read(id));
            }

            let id = notification.id.clone();
            if notification.message.is_empty() {
                return feed.mark_read(&id).then_some(FeedChange::Read(id));
            }

            notification.read = true;
            feed.apply_update(notification).then_some(FeedChange::Read(id))
        }
        InboundEvent::NotificationDeleted(raw) => {
            let id = deleted_notification_id(raw);
            feed.remove(&id).then_some(FeedChange::Removed(id))
        }
        _ => None,
    }
}

fn unwrap_envelope(raw: &Value) -> &Value {
    raw.get("notification").unwrap_or(raw)
}

/// Follows live notification events until the user quits.
pub struct NotificationWatchOrchestrator {
    state: ShellState,
    feed: NotificationFeed,
}

impl NotificationWatchOrchestrator {
    pub fn new(initial: Vec<Notification>) -> Self {
        let mut feed = NotificationFeed::default();
        feed.replace(initial);

        Self {
            state: ShellState::default(),
            feed,
        }
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn feed(&self) -> &NotificationFeed {
        &self.feed
    }

    fn handle_realtime(&mut self, event: &InboundEvent) {
        if let InboundEvent::Connectivity(status) = event {
            self.state.set_connectivity_status(*status);
            if *status == ConnectivityStatus::Disconnected {
                self.state.push_notice("Connection lost. Reconnecting...");
            }
            return;
        }

        let Some(change) = apply_live_event(&mut self.feed, event) else {
            return;
        };

        let output = match change {
            FeedChange::Added(notification) => ShellOutput::Notification(notification),
            FeedChange::Read(id) => ShellOutput::NotificationRead { id },
            FeedChange::Removed(id) => ShellOutput::NotificationRemoved { id },
        };
        self.state.push_output(output);
        self.state
            .push_notice(format!("{} unread", self.feed.unread_count()));
    }
}

impl ShellOrchestrator for NotificationWatchOrchestrator {
    fn state(&self) -> &ShellState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ShellState {
        &mut self.state
    }

    fn handle_event(&mut self, event: AppEvent) -> Result<()> {
        match event {
            AppEvent::QuitRequested => self.state.stop(),
            AppEvent::InputLine(line) if line.trim() == "/quit" => self.state.stop(),
            AppEvent::Realtime(event) => self.handle_realtime(&event),
            AppEvent::Tick | AppEvent::InputLine(_) => {}
        }

        Ok(())
    }
}
