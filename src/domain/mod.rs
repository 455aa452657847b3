//! Domain layer: chat entities, reconciliation and presence rules.

pub mod contact;
pub mod conversation;
pub mod events;
pub mod message;
pub mod normalize;
pub mod notification;
pub mod presence;
pub mod requirement;
pub mod shell_state;

/// Returns the domain module name for smoke checks.
pub fn module_name() -> &'static str {
    "domain"
}
