// Connection status shown by the dashboard header

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Connecting,
    Connected,
    Reconnecting,
    Error,
}

impl ConnectionStatus {
    pub fn is_connected(self) -> bool {
        self == ConnectionStatus::Connected
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionStatus::Connecting => "Connecting...",
            ConnectionStatus::Connected => "Connected",
            ConnectionStatus::Reconnecting => "Disconnected - Reconnecting...",
            ConnectionStatus::Error => "Error",
        };
        f.write_str(s)
    }
}

/// Published on every status transition.
///
/// `transport_error` is set by a transport error and stays set through the
/// following `Reconnecting` phase until the next successful open, so a consumer
/// can keep showing the error during a reconnect countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusUpdate {
    pub status: ConnectionStatus,
    pub transport_error: bool,
}
