// Session state: everything the dashboard knows about the stream, with no I/O.
// The connection task feeds socket events in; tests feed them in directly.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::history::{DEFAULT_HISTORY_CAPACITY, HistorySample, MetricHistory};
use crate::models::{CommandMessage, ConnectionStatus, PendingCommand, Snapshot, StatusUpdate};
use crate::tracker::{CommandTracker, DEFAULT_COMMAND_TIMEOUT_MS};

/// Delay between a close and the next connection attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("failed to decode snapshot: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("failed to encode command: {0}")]
    Encode(#[source] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub history_capacity: usize,
    pub command_timeout_ms: u64,
    pub reconnect_delay: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            command_timeout_ms: DEFAULT_COMMAND_TIMEOUT_MS,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

/// State published after every accepted snapshot.
#[derive(Debug, Clone)]
pub struct SnapshotUpdate {
    pub snapshot: Arc<Snapshot>,
    /// GPU monitor unavailable for this reading.
    pub degraded: bool,
    pub sample: HistorySample,
    pub history: MetricHistory,
    pub pending: HashMap<String, PendingCommand>,
    /// Containers whose pending command was cleared by this snapshot.
    pub resolved: Vec<String>,
}

/// Events observers receive from a running connection.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Status(StatusUpdate),
    Snapshot(Arc<SnapshotUpdate>),
    /// A command was sent; carries the full pending map after recording it.
    CommandSent {
        container_id: String,
        pending: HashMap<String, PendingCommand>,
    },
}

#[derive(Debug)]
pub struct Session {
    status: ConnectionStatus,
    transport_error: bool,
    open: bool,
    torn_down: bool,
    snapshot: Option<Arc<Snapshot>>,
    history: MetricHistory,
    tracker: CommandTracker,
    reconnect_delay: Duration,
    snapshots_received: u64,
    decode_failures: u64,
    last_decode_error: Option<String>,
}

impl Session {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            status: ConnectionStatus::Connecting,
            transport_error: false,
            open: false,
            torn_down: false,
            snapshot: None,
            history: MetricHistory::new(config.history_capacity),
            tracker: CommandTracker::new(config.command_timeout_ms),
            reconnect_delay: config.reconnect_delay,
            snapshots_received: 0,
            decode_failures: 0,
            last_decode_error: None,
        }
    }

    pub fn status(&self) -> StatusUpdate {
        StatusUpdate {
            status: self.status,
            transport_error: self.transport_error,
        }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    pub fn snapshot(&self) -> Option<&Arc<Snapshot>> {
        self.snapshot.as_ref()
    }

    /// GPU monitor unavailable in the latest snapshot. False before the first one.
    pub fn is_degraded(&self) -> bool {
        self.snapshot.as_ref().is_some_and(|s| s.is_degraded())
    }

    pub fn history(&self) -> &MetricHistory {
        &self.history
    }

    pub fn pending(&self) -> &HashMap<String, PendingCommand> {
        self.tracker.pending()
    }

    pub fn snapshots_received(&self) -> u64 {
        self.snapshots_received
    }

    pub fn decode_failures(&self) -> u64 {
        self.decode_failures
    }

    pub fn last_decode_error(&self) -> Option<&str> {
        self.last_decode_error.as_deref()
    }

    /// The socket opened. Clears the transport error flag.
    pub fn on_open(&mut self) -> StatusUpdate {
        self.open = true;
        self.transport_error = false;
        self.status = ConnectionStatus::Connected;
        self.status()
    }

    /// Transport-level error. Does not schedule a reconnect; the close that
    /// follows does.
    pub fn on_error(&mut self) -> StatusUpdate {
        self.transport_error = true;
        self.status = ConnectionStatus::Error;
        self.status()
    }

    /// The socket closed for any reason. Returns the delay before the single next
    /// connection attempt, or `None` once the session has been torn down.
    pub fn on_close(&mut self) -> Option<Duration> {
        self.open = false;
        if self.torn_down {
            return None;
        }
        self.status = ConnectionStatus::Reconnecting;
        Some(self.reconnect_delay)
    }

    /// Decode one inbound frame and fan it out to history and the command tracker.
    /// A frame that fails to decode leaves all state untouched.
    pub fn on_frame(&mut self, text: &str, now_ms: u64) -> Result<SnapshotUpdate, SessionError> {
        let snapshot = match Snapshot::from_json(text) {
            Ok(s) => Arc::new(s),
            Err(e) => {
                self.decode_failures += 1;
                self.last_decode_error = Some(e.to_string());
                return Err(SessionError::Decode(e));
            }
        };
        Ok(self.accept(snapshot, now_ms))
    }

    /// Admit an already decoded snapshot.
    pub fn accept(&mut self, snapshot: Arc<Snapshot>, now_ms: u64) -> SnapshotUpdate {
        self.snapshots_received += 1;
        let sample = self.history.record(&snapshot);
        let resolved = self.tracker.reconcile(&snapshot, now_ms);
        self.snapshot = Some(snapshot.clone());
        SnapshotUpdate {
            degraded: snapshot.is_degraded(),
            snapshot,
            sample,
            history: self.history.clone(),
            pending: self.tracker.pending().clone(),
            resolved,
        }
    }

    /// Serialize a command for sending, or `None` when the socket is not open.
    /// Commands issued while closed are dropped, not queued.
    pub fn encode_command(
        &self,
        command: &str,
        container_id: &str,
    ) -> Result<Option<String>, SessionError> {
        if !self.open {
            return Ok(None);
        }
        let message = CommandMessage {
            command: command.to_string(),
            id: container_id.to_string(),
        };
        serde_json::to_string(&message)
            .map(Some)
            .map_err(SessionError::Encode)
    }

    /// Track a command after `encode_command` produced it and the frame was sent.
    /// Overwrites any earlier pending command for the same container.
    pub fn record_command(
        &mut self,
        command: &str,
        container_id: &str,
        was_running: bool,
        now_ms: u64,
    ) {
        self.tracker.record(container_id, command, now_ms, was_running);
    }

    /// The owner is gone: no more reconnects.
    pub fn teardown(&mut self) {
        self.torn_down = true;
        self.open = false;
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(&SessionConfig::default())
    }
}
