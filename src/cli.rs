use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "dmchat",
    about = "Developer marketplace chat client: inbox, conversations, notifications"
)]
pub struct Cli {
    /// Path to config file (default: ./config.toml, then the user config dir)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// List conversations with presence and unread counts
    Inbox {
        /// Case-insensitive filter on name or email
        #[arg(short, long)]
        search: Option<String>,
    },
    /// Open an interactive conversation
    Chat {
        /// Id of the conversation partner
        partner_id: String,
    },
    /// Sign in with email and password and save the session
    Login {
        /// Account email; prompted for when omitted
        #[arg(short, long)]
        email: Option<String>,
    },
    /// List project requirements, or accept or reject one
    Requirements {
        /// Only requirements posted by the signed-in user
        #[arg(long)]
        mine: bool,
        #[arg(long, value_name = "ID", conflicts_with = "reject")]
        accept: Option<String>,
        #[arg(long, value_name = "ID")]
        reject: Option<String>,
    },
    /// List, mark read, delete or follow notifications
    Notifications {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 20)]
        limit: u32,
        /// Mark this notification as read before listing
        #[arg(long, value_name = "ID")]
        read: Option<String>,
        /// Delete this notification before listing
        #[arg(long, value_name = "ID")]
        delete: Option<String>,
        /// Keep running and print notifications as they arrive
        #[arg(long)]
        watch: bool,
    },
}

impl Cli {
    pub fn command_or_default(&self) -> Command {
        self.command
            .clone()
            .unwrap_or(Command::Inbox { search: None })
    }
}
