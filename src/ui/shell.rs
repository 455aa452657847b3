use std::{fmt::Display, io::Write};

use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};

use crate::{
    domain::shell_state::ShellOutput,
    usecases::{
        context::AppContext,
        contracts::{AppEventSource, ShellOrchestrator},
    },
};

use super::{
    message_rendering::{element_to_line, TranscriptRenderer},
    view::render_status_output,
};

/// Turns shell output into terminal lines.
pub struct ShellPrinter<Tz: TimeZone> {
    renderer: TranscriptRenderer<Tz>,
    partner_name: String,
}

impl<Tz> ShellPrinter<Tz>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    pub fn new(
        me_id: impl Into<String>,
        partner_name: impl Into<String>,
        now: DateTime<Utc>,
        tz: Tz,
    ) -> Self {
        Self {
            renderer: TranscriptRenderer::new(me_id, now, tz),
            partner_name: partner_name.into(),
        }
    }

    pub fn print(&mut self, output: &ShellOutput, out: &mut dyn Write) -> std::io::Result<()> {
        let lines: Vec<String> = match output {
            ShellOutput::Transcript(messages) if messages.is_empty() => {
                self.renderer.reset();
                vec!["No messages yet. Say hello!".to_owned()]
            }
            ShellOutput::Transcript(messages) => self
                .renderer
                .build_elements(messages)
                .iter()
                .map(element_to_line)
                .collect(),
            ShellOutput::Message(message) => self
                .renderer
                .push_message(message)
                .iter()
                .map(element_to_line)
                .collect(),
            other => render_status_output(other, &self.partner_name)
                .into_iter()
                .collect(),
        };

        for line in lines {
            writeln!(out, "{line}")?;
        }
        out.flush()
    }
}

pub fn start<Tz>(
    context: &AppContext,
    event_source: &mut dyn AppEventSource,
    orchestrator: &mut dyn ShellOrchestrator,
    printer: &mut ShellPrinter<Tz>,
    out: &mut dyn Write,
) -> Result<()>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    tracing::info!(
        log_level = %context.config.logging.level,
        api_url = %context.config.backend.api_url,
        "starting chat shell"
    );

    run(event_source, orchestrator, printer, out)
}

fn run<Tz>(
    event_source: &mut dyn AppEventSource,
    orchestrator: &mut dyn ShellOrchestrator,
    printer: &mut ShellPrinter<Tz>,
    out: &mut dyn Write,
) -> Result<()>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    loop {
        for output in orchestrator.state_mut().take_output() {
            printer.print(&output, out)?;
        }

        if !orchestrator.state().is_running() {
            break;
        }

        match event_source.next_event()? {
            Some(event) => orchestrator.handle_event(event)?,
            None => break,
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use chrono::TimeZone;
    use serde_json::json;

    use super::*;
    use crate::{
        domain::{
            events::{AppEvent, InboundEvent, OutboundEvent},
            message::Participant,
        },
        ui::event_source::MockEventSource,
        usecases::{
            conversation_session::ConversationSession,
            mark_read::{ReadMarker, ReadMarkerError},
            send_message::{DispatchError, MessageDispatcher},
            shell::ChatShellOrchestrator,
        },
    };

    #[derive(Default)]
    struct LoopbackDispatcher {
        sent: RefCell<Vec<OutboundEvent>>,
    }

    impl MessageDispatcher for LoopbackDispatcher {
        fn is_ready(&self) -> bool {
            true
        }

        fn dispatch(&self, event: OutboundEvent) -> Result<(), DispatchError> {
            self.sent.borrow_mut().push(event);
            Ok(())
        }
    }

    struct NoopMarker;

    impl ReadMarker for NoopMarker {
        fn mark_read(&self, _partner_id: &str) -> Result<(), ReadMarkerError> {
            Ok(())
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 15, 18, 0, 0)
            .single()
            .expect("valid test timestamp")
    }

    fn orchestrator() -> ChatShellOrchestrator<LoopbackDispatcher, NoopMarker> {
        let session = ConversationSession::open(
            Participant::new("me", None),
            Participant::new("u1", Some("Ada".to_owned())),
        );
        ChatShellOrchestrator::new(session, LoopbackDispatcher::default(), NoopMarker)
    }

    #[test]
    fn mock_source_produces_quit_event() {
        let mut source = MockEventSource::from(vec![AppEvent::QuitRequested]);
        let event = source.next_event().expect("must read mock event");

        assert_eq!(event, Some(AppEvent::QuitRequested));
    }

    #[test]
    fn loop_prints_transcript_and_incoming_message_then_quits() {
        let mut orchestrator = orchestrator();
        orchestrator.start();
        let mut source = MockEventSource::from(vec![
            AppEvent::Realtime(InboundEvent::MessageReceived(json!({
                "_id": "m1",
                "sender": { "_id": "u1", "name": "Ada" },
                "receiver": "me",
                "message": "hello there",
                "createdAt": "2026-02-15T17:45:00Z",
            }))),
            AppEvent::InputLine("/quit".to_owned()),
        ]);
        let mut printer = ShellPrinter::new("me", "Ada", now(), Utc);
        let mut out = Vec::new();

        run(&mut source, &mut orchestrator, &mut printer, &mut out).expect("loop must finish");

        let printed = String::from_utf8(out).expect("output must be utf-8");
        assert_eq!(
            printed,
            "No messages yet. Say hello!\n—— Today ——\n17:45 Ada: hello there\n"
        );
        assert!(!orchestrator.state().is_running());
    }

    #[test]
    fn loop_ends_when_source_is_exhausted() {
        let mut orchestrator = orchestrator();
        let mut source = MockEventSource::from(vec![AppEvent::Tick]);
        let mut printer = ShellPrinter::new("me", "Ada", now(), Utc);
        let mut out = Vec::new();

        run(&mut source, &mut orchestrator, &mut printer, &mut out).expect("loop must finish");

        assert!(out.is_empty());
        assert!(orchestrator.state().is_running());
    }

    #[test]
    fn presence_output_names_partner() {
        let mut printer = ShellPrinter::new("me", "Ada", now(), Utc);
        let mut out = Vec::new();

        printer
            .print(&ShellOutput::PartnerPresence { online: true }, &mut out)
            .expect("must print");

        assert_eq!(String::from_utf8(out).expect("utf-8"), "* Ada is online\n");
    }
}
