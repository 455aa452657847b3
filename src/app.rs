use std::{
    io::Write,
    sync::mpsc,
    time::{Duration, Instant},
};

use anyhow::{anyhow, bail, Context, Result};
use chrono::{Local, Utc};

use crate::{
    backend::{self, realtime::RealtimeHub},
    cli::{Cli, Command},
    domain::{
        self,
        events::{ConnectivityStatus, InboundEvent},
        message::Participant,
        presence::PresenceSet,
        requirement::RequirementDecision,
    },
    infra::{self, storage_layout::StorageLayout},
    ui,
    usecases::{
        self, bootstrap,
        context::AppContext,
        contracts::ShellOrchestrator,
        conversation_session::{ConversationSession, SessionUpdate},
        current_user::resolve_current_user,
        list_contacts::{list_contacts, ListContactsQuery},
        load_history::{load_history, LoadHistoryQuery},
        login::{run_login, LoginOutcome, StdTerminal, LOGIN_ATTEMPTS},
        mark_read::mark_conversation_read,
        notification_watch::NotificationWatchOrchestrator,
        notifications::{
            delete_notification, list_notifications, mark_notification_read,
            ListNotificationsQuery,
        },
        requirements::{decide_requirement, list_requirements},
        shell::ChatShellOrchestrator,
    },
};

const PRESENCE_WAIT: Duration = Duration::from_millis(1_500);

const CHAT_MARK_READ_FAILED: &str = "CHAT_MARK_READ_FAILED";
const CHAT_PARTNER_LOOKUP_FAILED: &str = "CHAT_PARTNER_LOOKUP_FAILED";

pub fn run(cli: Cli) -> Result<()> {
    tracing::debug!(
        ui = ui::module_name(),
        domain = domain::module_name(),
        backend = backend::module_name(),
        usecases = usecases::module_name(),
        infra = infra::module_name(),
        "module boundaries loaded"
    );

    let context = bootstrap::bootstrap(cli.config.as_deref())?;

    match cli.command_or_default() {
        Command::Inbox { search } => run_inbox(&context, search),
        Command::Chat { partner_id } => run_chat(&context, &partner_id),
        Command::Login { email } => run_login_command(&context, email.as_deref()),
        Command::Requirements {
            mine,
            accept,
            reject,
        } => {
            let decision = accept
                .map(|id| (id, RequirementDecision::Accept))
                .or(reject.map(|id| (id, RequirementDecision::Reject)));
            run_requirements(&context, mine, decision)
        }
        Command::Notifications {
            page,
            limit,
            read,
            delete,
            watch,
        } => run_notifications(&context, NotificationsArgs {
            query: ListNotificationsQuery { page, limit },
            read,
            delete,
            watch,
        }),
    }
}

fn current_user(context: &AppContext) -> Result<Participant> {
    resolve_current_user(&context.backend, &context.config.session)
        .map_err(|error| anyhow!(error.user_message()))
}

fn run_inbox(context: &AppContext, search: Option<String>) -> Result<()> {
    let me = current_user(context)?;
    let output = list_contacts(
        &context.backend,
        ListContactsQuery {
            current_user_id: me.id.clone(),
            search,
        },
    )
    .map_err(|error| anyhow!(error.user_message()))?;

    let hub = context.backend.realtime();
    let presence = collect_presence(&hub, PRESENCE_WAIT);
    hub.shutdown();

    let mut out = std::io::stdout().lock();
    writeln!(out, "Inbox for {}", me.display_name())?;
    for line in ui::render_contacts(&output.contacts, &presence, Utc::now(), &Local) {
        writeln!(out, "{line}")?;
    }

    Ok(())
}

fn run_login_command(context: &AppContext, email: Option<&str>) -> Result<()> {
    let session_file = StorageLayout::resolve()?.session_file();

    match run_login(
        &mut StdTerminal,
        &context.backend,
        email,
        &session_file,
        LOGIN_ATTEMPTS,
    )? {
        LoginOutcome::SignedIn(_) => Ok(()),
        LoginOutcome::ExitWithGuidance => bail!("login did not complete"),
    }
}

fn run_requirements(
    context: &AppContext,
    mine: bool,
    decision: Option<(String, RequirementDecision)>,
) -> Result<()> {
    let mut out = std::io::stdout().lock();

    if let Some((id, decision)) = decision {
        let confirmation = decide_requirement(&context.backend, &id, decision)
            .map_err(|error| anyhow!(error.user_message()))?;
        writeln!(out, "{confirmation}")?;
    }

    let owner = if mine { Some(current_user(context)?) } else { None };
    let requirements = list_requirements(&context.backend, owner.as_ref().map(|me| me.id.as_str()))
        .map_err(|error| anyhow!(error.user_message()))?;
    for line in ui::render_requirements(&requirements) {
        writeln!(out, "{line}")?;
    }

    Ok(())
}

fn require_partner_id(raw: &str) -> Result<&str> {
    let partner_id = raw.trim();
    if partner_id.is_empty() {
        bail!("Partner id is required.");
    }

    Ok(partner_id)
}

fn run_chat(context: &AppContext, partner_id: &str) -> Result<()> {
    let partner_id = require_partner_id(partner_id)?;
    let me = current_user(context)?;
    let partner = lookup_partner(context, &me, partner_id);

    let mut session = ConversationSession::open(me.clone(), partner.clone());
    let history = load_history(&context.backend, LoadHistoryQuery::new(partner_id), Utc::now());
    let history_update = session.apply_history(history, partner_id);

    if let Err(error) = mark_conversation_read(&context.backend, &me.id, partner_id) {
        tracing::warn!(
            code = CHAT_MARK_READ_FAILED,
            partner_id,
            error = ?error,
            "mark-as-read failed on open"
        );
    }

    let hub = context.backend.realtime();
    let (listener, events) = hub.attach();
    let (tx, rx) = mpsc::channel();
    ui::spawn_stdin_reader(tx.clone()).context("failed to start input reader")?;
    ui::spawn_realtime_forwarder(events, tx).context("failed to start realtime forwarder")?;

    let mut orchestrator = ChatShellOrchestrator::new(session, hub.clone(), &context.backend);
    if let SessionUpdate::HistoryFailed(error) = history_update {
        orchestrator.state_mut().push_notice(error.user_message());
    }

    let mut out = std::io::stdout().lock();
    writeln!(
        out,
        "Chatting with {}. Type a message, /history, /who or /quit.",
        partner.display_name()
    )?;
    orchestrator.start();

    let mut source = ui::ChannelEventSource::new(rx);
    let mut printer =
        ui::shell::ShellPrinter::new(me.id.clone(), partner.display_name(), Utc::now(), Local);
    let result = ui::shell::start(context, &mut source, &mut orchestrator, &mut printer, &mut out);

    hub.detach(listener);
    hub.shutdown();
    result
}

/// Finds the partner's display name in the contact list; falls back to the bare id.
fn lookup_partner(context: &AppContext, me: &Participant, partner_id: &str) -> Participant {
    let query = ListContactsQuery {
        current_user_id: me.id.clone(),
        search: None,
    };

    match list_contacts(&context.backend, query) {
        Ok(output) => output
            .contacts
            .iter()
            .find(|contact| contact.id == partner_id)
            .map(|contact| contact.as_participant())
            .unwrap_or_else(|| Participant::new(partner_id, None)),
        Err(error) => {
            tracing::warn!(
                code = CHAT_PARTNER_LOOKUP_FAILED,
                partner_id,
                error = ?error,
                "partner lookup failed; showing raw id"
            );
            Participant::new(partner_id, None)
        }
    }
}

struct NotificationsArgs {
    query: ListNotificationsQuery,
    read: Option<String>,
    delete: Option<String>,
    watch: bool,
}

fn run_notifications(context: &AppContext, args: NotificationsArgs) -> Result<()> {
    let mut out = std::io::stdout().lock();

    if let Some(id) = args.read.as_deref() {
        let updated = mark_notification_read(&context.backend, id)
            .map_err(|error| anyhow!(error.user_message()))?;
        match updated {
            Some(notification) => writeln!(out, "{}", ui::render_notification(&notification))?,
            None => writeln!(out, "Marked {id} as read.")?,
        }
    }

    if let Some(id) = args.delete.as_deref() {
        delete_notification(&context.backend, id)
            .map_err(|error| anyhow!(error.user_message()))?;
        writeln!(out, "Deleted {id}.")?;
    }

    let listed = list_notifications(&context.backend, args.query)
        .map_err(|error| anyhow!(error.user_message()))?;
    for line in ui::render_notification_page(
        &listed.page.notifications,
        listed.page.page,
        listed.page.total_pages,
        listed.unread_count,
    ) {
        writeln!(out, "{line}")?;
    }

    if !args.watch {
        return Ok(());
    }

    writeln!(out, "Watching for new notifications. Type /quit to stop.")?;

    let hub = context.backend.realtime();
    let (listener, events) = hub.attach();
    let (tx, rx) = mpsc::channel();
    ui::spawn_stdin_reader(tx.clone()).context("failed to start input reader")?;
    ui::spawn_realtime_forwarder(events, tx).context("failed to start realtime forwarder")?;

    let mut orchestrator = NotificationWatchOrchestrator::new(listed.page.notifications);
    let mut source = ui::ChannelEventSource::new(rx);
    let mut printer = ui::shell::ShellPrinter::new("", "", Utc::now(), Local);
    let result = ui::shell::start(context, &mut source, &mut orchestrator, &mut printer, &mut out);

    hub.detach(listener);
    hub.shutdown();
    result
}

/// Waits briefly for the online snapshot that follows each connect.
fn collect_presence(hub: &RealtimeHub, wait: Duration) -> PresenceSet {
    let (listener, events) = hub.attach();
    let deadline = Instant::now() + wait;
    let mut presence = PresenceSet::new();

    while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
        let Ok(event) = events.recv_timeout(remaining) else {
            break;
        };
        if apply_presence_event(&mut presence, &event) {
            break;
        }
    }

    hub.detach(listener);
    presence
}

/// Returns true once no further presence is expected.
fn apply_presence_event(presence: &mut PresenceSet, event: &InboundEvent) -> bool {
    match event {
        InboundEvent::OnlineSnapshot(snapshot) => {
            presence.replace_all(snapshot);
            true
        }
        InboundEvent::UserOnline(id) => {
            presence.mark_online(id.clone());
            false
        }
        InboundEvent::UserOffline(id) => {
            presence.mark_offline(id);
            false
        }
        InboundEvent::Connectivity(ConnectivityStatus::Disconnected) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn snapshot_completes_presence_collection() {
        let mut presence = PresenceSet::new();

        assert!(!apply_presence_event(
            &mut presence,
            &InboundEvent::UserOnline("u9".to_owned())
        ));
        assert!(apply_presence_event(
            &mut presence,
            &InboundEvent::OnlineSnapshot(json!(["u1", "u2"]))
        ));

        assert!(presence.is_online("u1"));
        assert!(!presence.is_online("u9"));
    }

    #[test]
    fn lost_connection_ends_presence_collection() {
        let mut presence = PresenceSet::new();

        assert!(apply_presence_event(
            &mut presence,
            &InboundEvent::Connectivity(ConnectivityStatus::Disconnected)
        ));
        assert!(presence.is_empty());
    }

    #[test]
    fn unreachable_hub_yields_empty_presence() {
        let api = reqwest::Url::parse("http://127.0.0.1:9").expect("url must parse");
        let url = backend::wire::socket_url(&api).expect("socket url must build");
        let hub = RealtimeHub::new(url, infra::config::RealtimeConfig::default(), "");

        let presence = collect_presence(&hub, Duration::from_millis(20));

        assert!(presence.is_empty());
        assert_eq!(hub.listener_count(), 0);
    }

    #[test]
    fn blank_partner_id_is_rejected() {
        assert!(require_partner_id("   ").is_err());
        assert_eq!(require_partner_id(" u42 ").expect("must accept"), "u42");
    }
}
