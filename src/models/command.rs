// Outbound container commands and their optimistic pending state

use serde::{Deserialize, Serialize};
use std::fmt;

/// The three container verbs the dashboard offers. The server interprets the
/// command string; the client never validates it on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerAction {
    Start,
    Stop,
    Restart,
}

impl ContainerAction {
    pub const ALL: [ContainerAction; 3] = [Self::Start, Self::Stop, Self::Restart];

    /// Command string sent in the `command` field.
    pub fn command(self) -> &'static str {
        match self {
            ContainerAction::Start => "docker-start",
            ContainerAction::Stop => "docker-stop",
            ContainerAction::Restart => "docker-restart",
        }
    }

    /// Parse a user-facing verb ("start") or a wire command ("docker-start").
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_ascii_lowercase();
        let verb = s.strip_prefix("docker-").unwrap_or(&s);
        match verb {
            "start" => Some(ContainerAction::Start),
            "stop" => Some(ContainerAction::Stop),
            "restart" => Some(ContainerAction::Restart),
            _ => None,
        }
    }
}

impl fmt::Display for ContainerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.command())
    }
}

/// Outbound frame: `{"command": "...", "id": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandMessage {
    pub command: String,
    pub id: String,
}

/// A dispatched command not yet confirmed by a state change or timed out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCommand {
    pub command: String,
    pub dispatched_at_ms: u64,
    pub was_running_at_dispatch: bool,
}
