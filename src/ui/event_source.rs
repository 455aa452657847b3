use std::{
    io::BufRead,
    sync::mpsc::{Receiver, RecvTimeoutError, Sender},
    thread,
    time::Duration,
};

use anyhow::Result;

use crate::{
    domain::events::{AppEvent, InboundEvent},
    usecases::contracts::AppEventSource,
};

const EVENT_POLL_TIMEOUT: Duration = Duration::from_millis(100);
const STDIN_READER_FAILED: &str = "UI_STDIN_READER_FAILED";

/// Feeds the shell from one channel merging stdin lines and realtime events.
pub struct ChannelEventSource {
    rx: Receiver<AppEvent>,
}

impl ChannelEventSource {
    pub fn new(rx: Receiver<AppEvent>) -> Self {
        Self { rx }
    }
}

impl AppEventSource for ChannelEventSource {
    fn next_event(&mut self) -> Result<Option<AppEvent>> {
        match self.rx.recv_timeout(EVENT_POLL_TIMEOUT) {
            Ok(event) => Ok(Some(event)),
            Err(RecvTimeoutError::Timeout) => Ok(Some(AppEvent::Tick)),
            Err(RecvTimeoutError::Disconnected) => Ok(Some(AppEvent::QuitRequested)),
        }
    }
}

/// Reads stdin on a background thread; end of input requests quit.
pub fn spawn_stdin_reader(tx: Sender<AppEvent>) -> std::io::Result<()> {
    thread::Builder::new()
        .name("dmchat-stdin".to_owned())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.send(AppEvent::InputLine(line)).is_err() {
                            return;
                        }
                    }
                    Err(error) => {
                        tracing::warn!(code = STDIN_READER_FAILED, error = %error, "stdin read failed");
                        break;
                    }
                }
            }
            let _ = tx.send(AppEvent::QuitRequested);
        })
        .map(|_| ())
}

/// Forwards realtime events into the shell channel until either side closes.
pub fn spawn_realtime_forwarder(
    events: Receiver<InboundEvent>,
    tx: Sender<AppEvent>,
) -> std::io::Result<()> {
    thread::Builder::new()
        .name("dmchat-realtime".to_owned())
        .spawn(move || forward_realtime(&events, &tx))
        .map(|_| ())
}

fn forward_realtime(events: &Receiver<InboundEvent>, tx: &Sender<AppEvent>) {
    for event in events.iter() {
        if tx.send(AppEvent::Realtime(event)).is_err() {
            return;
        }
    }
}

#[cfg(test)]
pub struct MockEventSource {
    queue: std::collections::VecDeque<AppEvent>,
}

#[cfg(test)]
impl MockEventSource {
    pub fn from(events: Vec<AppEvent>) -> Self {
        Self {
            queue: events.into(),
        }
    }
}

#[cfg(test)]
impl AppEventSource for MockEventSource {
    fn next_event(&mut self) -> Result<Option<AppEvent>> {
        Ok(self.queue.pop_front())
    }
}
