//! UI layer: line-based rendering and interaction entry points.

mod event_source;
mod message_rendering;
pub mod shell;
mod view;

pub(crate) use event_source::{spawn_realtime_forwarder, spawn_stdin_reader, ChannelEventSource};
pub(crate) use view::{
    render_contacts, render_notification, render_notification_page, render_requirements,
};

/// Returns the UI module name for smoke checks.
pub fn module_name() -> &'static str {
    "ui"
}
