use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityStatus {
    Connecting,
    Connected,
    Disconnected,
}

/// Events delivered by the realtime channel. Payloads stay raw until a
/// consumer normalizes them.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    Connectivity(ConnectivityStatus),
    UserOnline(String),
    UserOffline(String),
    OnlineSnapshot(Value),
    MessageReceived(Value),
    NewMessageNotification(Value),
    NotificationCreated(Value),
    NotificationRead(Value),
    NotificationDeleted(Value),
    /// An accepted send never reached the wire; its placeholder must go.
    SendFailed { temp_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundEvent {
    RequestOnlineSnapshot,
    SendMessage {
        to: String,
        message: String,
        temp_id: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    Tick,
    QuitRequested,
    InputLine(String),
    Realtime(InboundEvent),
}
