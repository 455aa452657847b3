//! The process-wide realtime connection.
//!
//! One socket.io link over a websocket, served next to the REST api and
//! authenticated by the session cookie on the upgrade request. Screens attach
//! listeners for inbound events and emit outbound events through the same
//! handle; the link itself outlives any single listener.

use std::{
    sync::{
        mpsc::{self, Receiver, Sender},
        Arc, Mutex, OnceLock,
    },
    time::Duration,
};

use futures::{SinkExt, StreamExt};
use reqwest::Url;
use thiserror::Error;
use tokio::{
    net::TcpStream,
    runtime::Handle,
    sync::{mpsc as async_mpsc, watch},
    time::Instant,
};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        self,
        client::IntoClientRequest,
        http::{header, HeaderValue},
        Message,
    },
    MaybeTlsStream, WebSocketStream,
};

use crate::{
    backend::wire::{self, Frame, Handshake, WireError},
    domain::events::{ConnectivityStatus, InboundEvent, OutboundEvent},
    infra::config::RealtimeConfig,
    usecases::send_message::{DispatchError, MessageDispatcher},
};

const REALTIME_CONNECTED: &str = "REALTIME_CONNECTED";
const REALTIME_CONNECT_FAILED: &str = "REALTIME_CONNECT_FAILED";
const REALTIME_DISCONNECTED: &str = "REALTIME_DISCONNECTED";
const REALTIME_GAVE_UP: &str = "REALTIME_RECONNECT_GAVE_UP";
const REALTIME_STOPPED: &str = "REALTIME_STOPPED";
const REALTIME_UNKNOWN_EVENT: &str = "REALTIME_UNKNOWN_EVENT";
const REALTIME_MALFORMED_FRAME: &str = "REALTIME_MALFORMED_FRAME";
const REALTIME_PING_TIMEOUT: &str = "REALTIME_PING_TIMEOUT";
const REALTIME_WRITE_FAILED: &str = "REALTIME_WRITE_FAILED";
const REALTIME_SEND_LOST: &str = "REALTIME_SEND_LOST";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

static SHARED_HUB: OnceLock<RealtimeHub> = OnceLock::new();

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Debug, Clone)]
pub struct RealtimeHub {
    inner: Arc<HubInner>,
}

#[derive(Debug)]
struct HubInner {
    url: Url,
    config: RealtimeConfig,
    cookie: String,
    state: Mutex<HubState>,
}

#[derive(Debug, Default)]
struct HubState {
    listeners: Vec<(ListenerId, Sender<InboundEvent>)>,
    next_listener: u64,
    connected: bool,
    outbound_tx: Option<async_mpsc::UnboundedSender<OutboundEvent>>,
    stop_tx: Option<watch::Sender<bool>>,
}

enum LinkEnd {
    Dropped,
    Stopped,
}

#[derive(Debug, Error)]
enum LinkError {
    #[error("websocket: {0}")]
    Socket(#[from] tungstenite::Error),
    #[error("{0}")]
    Wire(#[from] WireError),
    #[error("server refused the namespace: {0}")]
    Refused(String),
    #[error("connection closed during handshake")]
    Closed,
    #[error("handshake timed out")]
    TimedOut,
}

impl RealtimeHub {
    /// Returns the process-wide hub, starting its connection on first use.
    pub fn acquire(runtime: &Handle, url: &Url, config: &RealtimeConfig, cookie: &str) -> Self {
        SHARED_HUB
            .get_or_init(|| {
                let hub = Self::new(url.clone(), config.clone(), cookie);
                hub.start(runtime);
                hub
            })
            .clone()
    }

    pub fn new(url: Url, config: RealtimeConfig, cookie: &str) -> Self {
        Self {
            inner: Arc::new(HubInner {
                url,
                config,
                cookie: cookie.to_owned(),
                state: Mutex::new(HubState::default()),
            }),
        }
    }

    /// Spawns the connection task. Calling it again while running is a no-op.
    pub fn start(&self, runtime: &Handle) {
        let Ok(mut state) = self.inner.state.lock() else {
            return;
        };
        if state.stop_tx.is_some() {
            return;
        }

        let (outbound_tx, outbound_rx) = async_mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = watch::channel(false);
        state.outbound_tx = Some(outbound_tx);
        state.stop_tx = Some(stop_tx);
        drop(state);

        runtime.spawn(run_connection(Arc::clone(&self.inner), outbound_rx, stop_rx));
    }

    pub fn attach(&self) -> (ListenerId, Receiver<InboundEvent>) {
        let (tx, rx) = mpsc::channel();
        let mut id = ListenerId(0);
        if let Ok(mut state) = self.inner.state.lock() {
            state.next_listener += 1;
            id = ListenerId(state.next_listener);
            let status = if state.connected {
                ConnectivityStatus::Connected
            } else {
                ConnectivityStatus::Connecting
            };
            let _ = tx.send(InboundEvent::Connectivity(status));
            state.listeners.push((id, tx));
        }
        (id, rx)
    }

    pub fn detach(&self, id: ListenerId) {
        if let Ok(mut state) = self.inner.state.lock() {
            state.listeners.retain(|(listener, _)| *listener != id);
        }
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn listener_count(&self) -> usize {
        self.inner
            .state
            .lock()
            .map(|state| state.listeners.len())
            .unwrap_or_default()
    }

    pub fn is_connected(&self) -> bool {
        self.inner
            .state
            .lock()
            .map(|state| state.connected)
            .unwrap_or(false)
    }

    pub fn emit(&self, event: OutboundEvent) -> Result<(), DispatchError> {
        let state = self
            .inner
            .state
            .lock()
            .map_err(|_| DispatchError::Closed)?;
        if !state.connected {
            return Err(DispatchError::NotConnected);
        }

        let outbound_tx = state.outbound_tx.as_ref().ok_or(DispatchError::Closed)?;
        outbound_tx.send(event).map_err(|_| DispatchError::Closed)
    }

    /// Closes the link and stops reconnecting.
    pub fn shutdown(&self) {
        if let Ok(mut state) = self.inner.state.lock() {
            if let Some(stop_tx) = state.stop_tx.take() {
                let _ = stop_tx.send(true);
            }
            state.outbound_tx = None;
            state.connected = false;
        }
    }
}

impl MessageDispatcher for RealtimeHub {
    fn is_ready(&self) -> bool {
        self.is_connected()
    }

    fn dispatch(&self, event: OutboundEvent) -> Result<(), DispatchError> {
        self.emit(event)
    }
}

impl HubInner {
    fn publish(&self, event: InboundEvent) {
        if let Ok(mut state) = self.state.lock() {
            state
                .listeners
                .retain(|(_, listener)| listener.send(event.clone()).is_ok());
        }
    }

    fn set_connected(&self, connected: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.connected = connected;
        }

        let status = if connected {
            ConnectivityStatus::Connected
        } else {
            ConnectivityStatus::Disconnected
        };
        self.publish(InboundEvent::Connectivity(status));
    }

    /// Tells listeners that an accepted message never reached the server.
    fn report_unsent(&self, event: &OutboundEvent) {
        if let OutboundEvent::SendMessage { temp_id, .. } = event {
            tracing::warn!(code = REALTIME_SEND_LOST, temp_id = %temp_id, "message was not sent");
            self.publish(InboundEvent::SendFailed {
                temp_id: temp_id.clone(),
            });
        }
    }
}

async fn run_connection(
    hub: Arc<HubInner>,
    mut outbound_rx: async_mpsc::UnboundedReceiver<OutboundEvent>,
    mut stop_rx: watch::Receiver<bool>,
) {
    let delay = Duration::from_millis(hub.config.reconnect_delay_ms);
    let mut failures: u32 = 0;

    loop {
        hub.publish(InboundEvent::Connectivity(ConnectivityStatus::Connecting));

        match connect(&hub).await {
            Ok((socket, handshake)) => {
                failures = 0;
                match drive_link(&hub, socket, handshake, &mut outbound_rx, &mut stop_rx).await {
                    LinkEnd::Stopped => break,
                    LinkEnd::Dropped => {
                        tracing::info!(
                            code = REALTIME_DISCONNECTED,
                            url = %hub.url,
                            "realtime link dropped"
                        );
                    }
                }
            }
            Err(error) => {
                failures += 1;
                tracing::warn!(
                    code = REALTIME_CONNECT_FAILED,
                    url = %hub.url,
                    attempt = failures,
                    error = %error,
                    "realtime connect failed"
                );
                if failures > hub.config.reconnect_attempts {
                    tracing::warn!(
                        code = REALTIME_GAVE_UP,
                        attempts = failures,
                        "realtime reconnect attempts exhausted"
                    );
                    hub.set_connected(false);
                    return;
                }
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }
        }
    }

    hub.set_connected(false);
    tracing::info!(code = REALTIME_STOPPED, "realtime hub stopped");
}

/// Opens the websocket and joins the default namespace.
async fn connect(hub: &HubInner) -> Result<(Socket, Handshake), LinkError> {
    tokio::time::timeout(CONNECT_TIMEOUT, async {
        let mut request = hub.url.as_str().into_client_request()?;
        if !hub.cookie.trim().is_empty() {
            if let Ok(cookie) = HeaderValue::from_str(hub.cookie.trim()) {
                request.headers_mut().insert(header::COOKIE, cookie);
            }
        }

        let (mut socket, _response) = connect_async(request).await?;
        let handshake = join_namespace(&mut socket).await?;
        Ok::<_, LinkError>((socket, handshake))
    })
    .await
    .unwrap_or(Err(LinkError::TimedOut))
}

async fn join_namespace(socket: &mut Socket) -> Result<Handshake, LinkError> {
    let handshake = loop {
        match next_frame(socket).await? {
            Frame::Open(handshake) => break handshake,
            Frame::Disconnected => return Err(LinkError::Closed),
            _ => {}
        }
    };

    socket.send(Message::Text(wire::CONNECT_FRAME.to_owned())).await?;

    loop {
        match next_frame(socket).await? {
            Frame::Connected => return Ok(handshake),
            Frame::ConnectRefused(reason) => return Err(LinkError::Refused(reason)),
            Frame::Disconnected => return Err(LinkError::Closed),
            Frame::Ping => socket.send(Message::Text(wire::PONG_FRAME.to_owned())).await?,
            _ => {}
        }
    }
}

async fn next_frame(socket: &mut Socket) -> Result<Frame, LinkError> {
    loop {
        match socket.next().await {
            Some(Ok(Message::Text(text))) => return Ok(wire::decode_frame(&text)?),
            Some(Ok(Message::Close(_))) | None => return Err(LinkError::Closed),
            Some(Ok(_)) => {}
            Some(Err(error)) => return Err(error.into()),
        }
    }
}

async fn drive_link(
    hub: &HubInner,
    socket: Socket,
    handshake: Handshake,
    outbound_rx: &mut async_mpsc::UnboundedReceiver<OutboundEvent>,
    stop_rx: &mut watch::Receiver<bool>,
) -> LinkEnd {
    let (mut sink, mut stream) = socket.split();
    let idle_limit = Duration::from_millis(handshake.idle_limit_ms());

    let snapshot = wire::encode_event(&OutboundEvent::RequestOnlineSnapshot);
    if let Err(error) = sink.send(Message::Text(snapshot)).await {
        tracing::warn!(code = REALTIME_WRITE_FAILED, error = %error, "realtime write failed");
        return LinkEnd::Dropped;
    }

    tracing::info!(code = REALTIME_CONNECTED, url = %hub.url, "realtime link established");
    hub.set_connected(true);

    let idle = tokio::time::sleep(idle_limit);
    tokio::pin!(idle);

    let end = loop {
        tokio::select! {
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break LinkEnd::Stopped;
                }
            }
            _ = &mut idle => {
                tracing::warn!(code = REALTIME_PING_TIMEOUT, "realtime server went silent");
                break LinkEnd::Dropped;
            }
            incoming = stream.next() => {
                let text = match incoming {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break LinkEnd::Dropped,
                    Some(Ok(_)) => continue,
                };
                idle.as_mut().reset(Instant::now() + idle_limit);

                match wire::decode_frame(&text) {
                    Ok(Frame::Ping) => {
                        if sink.send(Message::Text(wire::PONG_FRAME.to_owned())).await.is_err() {
                            break LinkEnd::Dropped;
                        }
                    }
                    Ok(Frame::Event { name, data }) => handle_event(hub, name, data),
                    Ok(Frame::Disconnected) => break LinkEnd::Dropped,
                    Ok(_) => {}
                    Err(error) => {
                        tracing::warn!(code = REALTIME_MALFORMED_FRAME, error = %error, "dropping realtime frame");
                    }
                }
            }
            outbound = outbound_rx.recv() => match outbound {
                Some(event) => {
                    if let Err(error) = sink.send(Message::Text(wire::encode_event(&event))).await {
                        tracing::warn!(code = REALTIME_WRITE_FAILED, error = %error, "realtime write failed");
                        hub.report_unsent(&event);
                        break LinkEnd::Dropped;
                    }
                }
                None => break LinkEnd::Stopped,
            },
        }
    };

    if let LinkEnd::Dropped = end {
        hub.set_connected(false);
        fail_queued(hub, outbound_rx);
    }
    let _ = sink.close().await;
    end
}

/// Fails whatever was accepted for sending but is still queued for a link that is gone.
fn fail_queued(hub: &HubInner, outbound_rx: &mut async_mpsc::UnboundedReceiver<OutboundEvent>) {
    while let Ok(event) = outbound_rx.try_recv() {
        hub.report_unsent(&event);
    }
}

fn handle_event(hub: &HubInner, name: String, data: serde_json::Value) {
    match wire::decode_event(name, data) {
        Ok(event) => hub.publish(event),
        Err(WireError::UnknownEvent(name)) => {
            tracing::debug!(code = REALTIME_UNKNOWN_EVENT, event = %name, "ignoring realtime event");
        }
        Err(error) => {
            tracing::warn!(code = REALTIME_MALFORMED_FRAME, error = %error, "dropping realtime event");
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::{net::TcpListener, runtime::Runtime};
    use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

    use super::*;

    const WAIT: Duration = Duration::from_secs(5);
    const OPEN_PACKET: &str =
        r#"0{"sid":"s1","upgrades":[],"pingInterval":25000,"pingTimeout":20000}"#;

    fn runtime() -> Runtime {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .expect("runtime must build")
    }

    fn config() -> RealtimeConfig {
        RealtimeConfig {
            reconnect_attempts: 0,
            reconnect_delay_ms: 10,
        }
    }

    fn url_for(address: &str) -> Url {
        let api = Url::parse(&format!("http://{address}")).expect("api url must parse");
        wire::socket_url(&api).expect("socket url must build")
    }

    fn wait_for(rx: &Receiver<InboundEvent>, wanted: ConnectivityStatus) {
        loop {
            let event = rx.recv_timeout(WAIT).expect("must receive connectivity");
            if event == InboundEvent::Connectivity(wanted) {
                return;
            }
        }
    }

    /// Minimal socket.io server for one client. Every text frame the client
    /// sends is forwarded to `seen`, preceded by the cookie of the upgrade.
    async fn serve_one(listener: TcpListener, seen: mpsc::Sender<String>, refuse: bool) {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };

        let cookie_seen = seen.clone();
        let callback = move |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
            let cookie = request
                .headers()
                .get(header::COOKIE)
                .and_then(|value| value.to_str().ok())
                .unwrap_or_default();
            let _ = cookie_seen.send(format!("cookie:{cookie}"));
            Ok(response)
        };
        let Ok(mut socket) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
            return;
        };

        let _ = socket.send(Message::Text(OPEN_PACKET.to_owned())).await;

        while let Some(Ok(message)) = socket.next().await {
            let Message::Text(text) = message else {
                continue;
            };
            let _ = seen.send(text.clone());

            let replies: &[&str] = if text == wire::CONNECT_FRAME {
                if refuse {
                    &[r#"44{"message":"not authorized"}"#]
                } else {
                    &[r#"40{"sid":"c1"}"#]
                }
            } else if text.starts_with(r#"42["getOnlineUsers""#) {
                &[r#"42["userOnline","u1"]"#, "2"]
            } else {
                &[]
            };

            for reply in replies {
                let _ = socket.send(Message::Text((*reply).to_owned())).await;
            }
        }
    }

    #[test]
    fn emit_before_connect_reports_not_connected() {
        let hub = RealtimeHub::new(url_for("127.0.0.1:9"), RealtimeConfig::default(), "");

        assert_eq!(
            hub.emit(OutboundEvent::RequestOnlineSnapshot),
            Err(DispatchError::NotConnected)
        );
        assert!(!hub.is_ready());
    }

    #[test]
    fn detach_keeps_other_listeners() {
        let hub = RealtimeHub::new(url_for("127.0.0.1:9"), RealtimeConfig::default(), "");
        let (first, _first_rx) = hub.attach();
        let (_second, _second_rx) = hub.attach();

        hub.detach(first);

        assert_eq!(hub.listener_count(), 1);
    }

    #[test]
    fn joins_namespace_then_relays_events_both_ways() {
        let runtime = runtime();
        let listener = runtime
            .block_on(TcpListener::bind("127.0.0.1:0"))
            .expect("listener must bind");
        let address = listener.local_addr().expect("must have address").to_string();

        let (seen_tx, seen) = mpsc::channel::<String>();
        runtime.spawn(serve_one(listener, seen_tx, false));

        let hub = RealtimeHub::new(url_for(&address), config(), "token=abc");
        let (_id, events) = hub.attach();
        hub.start(runtime.handle());

        assert_eq!(seen.recv_timeout(WAIT).expect("upgrade must arrive"), "cookie:token=abc");
        assert_eq!(seen.recv_timeout(WAIT).expect("join must arrive"), wire::CONNECT_FRAME);
        assert_eq!(
            seen.recv_timeout(WAIT).expect("snapshot request must arrive"),
            r#"42["getOnlineUsers"]"#
        );

        wait_for(&events, ConnectivityStatus::Connected);
        assert_eq!(
            events.recv_timeout(WAIT).expect("presence must arrive"),
            InboundEvent::UserOnline("u1".to_owned())
        );
        assert_eq!(seen.recv_timeout(WAIT).expect("pong must arrive"), wire::PONG_FRAME);

        hub.emit(OutboundEvent::SendMessage {
            to: "u1".to_owned(),
            message: "hi".to_owned(),
            temp_id: "tmp-1".to_owned(),
        })
        .expect("emit must succeed while connected");
        let sent = seen.recv_timeout(WAIT).expect("message must arrive");
        assert!(sent.starts_with(r#"42["sendMessage""#) && sent.contains("tmp-1"));

        hub.shutdown();
        assert!(!hub.is_connected());
    }

    #[test]
    fn refused_namespace_counts_as_failed_attempt() {
        let runtime = runtime();
        let listener = runtime
            .block_on(TcpListener::bind("127.0.0.1:0"))
            .expect("listener must bind");
        let address = listener.local_addr().expect("must have address").to_string();

        let (seen_tx, _seen) = mpsc::channel::<String>();
        runtime.spawn(serve_one(listener, seen_tx, true));

        let hub = RealtimeHub::new(url_for(&address), config(), "");
        let (_id, events) = hub.attach();
        hub.start(runtime.handle());

        wait_for(&events, ConnectivityStatus::Disconnected);
        assert!(!hub.is_connected());
    }

    #[test]
    fn gives_up_after_configured_attempts() {
        let runtime = runtime();
        let listener = runtime
            .block_on(TcpListener::bind("127.0.0.1:0"))
            .expect("listener must bind");
        let address = listener.local_addr().expect("must have address").to_string();
        drop(listener);

        let hub = RealtimeHub::new(url_for(&address), config(), "");
        let (_id, events) = hub.attach();
        hub.start(runtime.handle());

        wait_for(&events, ConnectivityStatus::Disconnected);
        assert!(!hub.is_connected());
    }

    #[test]
    fn queued_sends_fail_when_link_is_gone() {
        let hub = RealtimeHub::new(url_for("127.0.0.1:9"), config(), "");
        let (_id, events) = hub.attach();
        let _ = events.recv_timeout(WAIT);

        let (tx, mut rx) = async_mpsc::unbounded_channel();
        tx.send(OutboundEvent::SendMessage {
            to: "u1".to_owned(),
            message: "lost".to_owned(),
            temp_id: "tmp-9".to_owned(),
        })
        .expect("queue must accept");
        tx.send(OutboundEvent::RequestOnlineSnapshot)
            .expect("queue must accept");

        fail_queued(&hub.inner, &mut rx);

        assert_eq!(
            events.try_recv().expect("failure must be published"),
            InboundEvent::SendFailed {
                temp_id: "tmp-9".to_owned()
            }
        );
        assert!(events.try_recv().is_err());
    }
}
