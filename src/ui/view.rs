//! Plain-text views for the inbox, notifications and requirements.

use std::fmt::Display;

use chrono::{DateTime, TimeZone, Utc};

use crate::domain::{
    contact::Contact, notification::Notification, presence::PresenceSet,
    requirement::Requirement, shell_state::ShellOutput,
};

use super::message_rendering::date_label;

const ONLINE_DOT: &str = "●";
const OFFLINE_DOT: &str = "○";
const PREVIEW_CHARS: usize = 40;

pub fn render_contacts<Tz>(
    contacts: &[Contact],
    presence: &PresenceSet,
    now: DateTime<Utc>,
    tz: &Tz,
) -> Vec<String>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    if contacts.is_empty() {
        return vec!["No conversations yet.".to_owned()];
    }

    let today = now.with_timezone(tz).date_naive();

    contacts
        .iter()
        .map(|contact| {
            let dot = if presence.is_online(&contact.id) {
                ONLINE_DOT
            } else {
                OFFLINE_DOT
            };

            let mut line = format!("{dot} {} [{}]", contact.display_name(), contact.id);

            if contact.unread_count > 0 {
                line.push_str(&format!(" ({} unread)", contact.unread_count));
            }

            if let Some(preview) = contact.last_message.as_deref() {
                line.push_str(&format!(" - {}", truncate(preview, PREVIEW_CHARS)));
            }

            if let Some(at) = contact.last_message_time {
                let local = at.with_timezone(tz);
                let day = local.date_naive();
                if day == today {
                    line.push_str(&format!(" · {}", local.format("%H:%M")));
                } else {
                    line.push_str(&format!(" · {}", date_label(day, today)));
                }
            }

            line
        })
        .collect()
}

pub fn render_notification(notification: &Notification) -> String {
    let marker = if notification.read { " " } else { "*" };
    let mut line = format!("{marker} [{}] {}", notification.id, notification.message);

    if let Some(at) = notification.created_at {
        line.push_str(&format!(" ({})", at.format("%Y-%m-%d %H:%M")));
    }

    if let Some(link) = notification.link.as_deref() {
        line.push_str(&format!(" -> {link}"));
    }

    line
}

pub fn render_notification_page(
    notifications: &[Notification],
    page: u32,
    total_pages: u32,
    unread_count: usize,
) -> Vec<String> {
    let mut lines = vec![format!(
        "Notifications - page {page}/{total_pages}, {unread_count} unread"
    )];

    if notifications.is_empty() {
        lines.push("No notifications.".to_owned());
    } else {
        lines.extend(notifications.iter().map(render_notification));
    }

    lines
}

pub fn render_requirements(requirements: &[Requirement]) -> Vec<String> {
    if requirements.is_empty() {
        return vec!["No requirements.".to_owned()];
    }

    requirements
        .iter()
        .map(|requirement| {
            let title = if requirement.title.trim().is_empty() {
                "(untitled)"
            } else {
                requirement.title.as_str()
            };
            let mut line = format!(
                "[{}] {} - {}",
                requirement.id,
                title,
                requirement.status.label()
            );

            if let Some(charges) = requirement.charges {
                line.push_str(&format!(" · ${charges:.2}"));
            }
            if let Some(deadline) = requirement.deadline {
                line.push_str(&format!(" · due {}", deadline.format("%Y-%m-%d")));
            }
            if let Some(client) = requirement.client_name.as_deref() {
                line.push_str(&format!(" · by {client}"));
            }
            if let Some(description) = requirement.description.as_deref() {
                line.push_str(&format!("\n    {}", truncate(description, PREVIEW_CHARS * 2)));
            }

            line
        })
        .collect()
}

/// Lines for non-message shell output; messages are handled by the transcript renderer.
pub fn render_status_output(output: &ShellOutput, partner_name: &str) -> Option<String> {
    match output {
        ShellOutput::Notice(text) => Some(format!("* {text}")),
        ShellOutput::Delivered { .. } => Some("  ✓ delivered".to_owned()),
        ShellOutput::PartnerPresence { online: true } => Some(format!("* {partner_name} is online")),
        ShellOutput::PartnerPresence { online: false } => {
            Some(format!("* {partner_name} is offline"))
        }
        ShellOutput::Notification(notification) => Some(render_notification(notification)),
        ShellOutput::NotificationRead { id } => Some(format!("* notification {id} marked read")),
        ShellOutput::NotificationRemoved { id } => Some(format!("* notification {id} removed")),
        ShellOutput::Message(_) | ShellOutput::Transcript(_) => None,
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    let single_line = text.replace('\n', " ");
    if single_line.chars().count() <= max_chars {
        return single_line;
    }

    let mut cut: String = single_line.chars().take(max_chars).collect();
    cut.push('…');
    cut
}
