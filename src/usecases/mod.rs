//! Use case layer: application workflows and orchestration.

pub mod bootstrap;
pub mod context;
pub mod contracts;
pub mod conversation_session;
pub mod current_user;
pub mod list_contacts;
pub mod load_history;
pub mod login;
pub mod mark_read;
pub mod notification_watch;
pub mod notifications;
pub mod requirements;
pub mod send_message;
pub mod shell;

/// Returns the usecases module name for smoke checks.
pub fn module_name() -> &'static str {
    "usecases"
}
