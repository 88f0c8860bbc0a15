// Pending container commands, reconciled against each incoming snapshot.
// There is no explicit acknowledgement from the server: a command is considered
// done once the container's running state flips, or dropped after a timeout.

use std::collections::HashMap;

use crate::models::{PendingCommand, Snapshot};

/// How long a command may stay pending without an observed state change.
pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone)]
pub struct CommandTracker {
    pending: HashMap<String, PendingCommand>,
    timeout_ms: u64,
}

impl CommandTracker {
    pub fn new(timeout_ms: u64) -> Self {
        Self {
            pending: HashMap::new(),
            timeout_ms,
        }
    }

    /// Record a dispatched command. Replaces any pending command for the same container.
    pub fn record(
        &mut self,
        container_id: &str,
        command: &str,
        dispatched_at_ms: u64,
        was_running: bool,
    ) -> Option<PendingCommand> {
        self.pending.insert(
            container_id.to_string(),
            PendingCommand {
                command: command.to_string(),
                dispatched_at_ms,
                was_running_at_dispatch: was_running,
            },
        )
    }

    /// Drop every pending command whose container changed running state or whose
    /// timeout elapsed. Containers missing from `snapshot` are left alone until a
    /// later snapshot lists them again. Returns the ids that were removed.
    pub fn reconcile(&mut self, snapshot: &Snapshot, now_ms: u64) -> Vec<String> {
        if self.pending.is_empty() {
            return Vec::new();
        }
        let mut resolved = Vec::new();
        for container in &snapshot.docker {
            let Some(pending) = self.pending.get(&container.id) else {
                continue;
            };
            let elapsed_ms = now_ms.saturating_sub(pending.dispatched_at_ms);
            let state_changed = container.is_running() != pending.was_running_at_dispatch;
            if elapsed_ms >= self.timeout_ms || state_changed {
                tracing::debug!(
                    container_id = %container.id,
                    command = %pending.command,
                    elapsed_ms,
                    timed_out = !state_changed,
                    "pending command resolved"
                );
                self.pending.remove(&container.id);
                resolved.push(container.id.clone());
            }
        }
        resolved
    }

    pub fn get(&self, container_id: &str) -> Option<&PendingCommand> {
        self.pending.get(container_id)
    }

    pub fn is_pending(&self, container_id: &str) -> bool {
        self.pending.contains_key(container_id)
    }

    pub fn pending(&self) -> &HashMap<String, PendingCommand> {
        &self.pending
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }
}

impl Default for CommandTracker {
    fn default() -> Self {
        Self::new(DEFAULT_COMMAND_TIMEOUT_MS)
    }
}
