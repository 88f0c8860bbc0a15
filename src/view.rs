// Presentation values derived from the latest snapshot (no stored state).

use std::fmt;

use crate::history::round_to_tenth;
use crate::models::{ContainerAction, ContainerState, PendingCommand, Snapshot};

/// Marker that identifies the dashboard's own container in names or images.
pub const DEFAULT_SELF_CONTAINER_MARKER: &str = "dgx_dashboard";

/// Window title summary: used memory, hottest usage, hottest temperature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TitleSummary {
    pub used_memory_gb: u64,
    pub max_usage_percent: i64,
    pub max_temperature_c: i64,
}

impl TitleSummary {
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let max_usage = snapshot
            .gpu_usage_percent()
            .max(snapshot.cpu.usage_percent);
        let max_temp = snapshot
            .gpu_temperature_c()
            .max(snapshot.temperature.system_temperature_c);
        Self {
            used_memory_gb: snapshot.memory.used_gb().trunc() as u64,
            max_usage_percent: max_usage.round() as i64,
            max_temperature_c: max_temp.round() as i64,
        }
    }
}

impl fmt::Display for TitleSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DGX {}GB {}% {}°",
            self.used_memory_gb, self.max_usage_percent, self.max_temperature_c
        )
    }
}

/// Values consumed by the memory gauge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemoryGauge {
    pub used_gb: f64,
    pub total_gb: u64,
}

impl MemoryGauge {
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        Self {
            used_gb: snapshot.memory.used_gb(),
            total_gb: snapshot.memory.total_gb().trunc() as u64,
        }
    }

    /// Used memory as displayed (one decimal).
    pub fn used_gb_display(&self) -> f64 {
        round_to_tenth(self.used_gb)
    }
}

/// Which action a container row offers. A stopped container can be started; a
/// running one stopped, except the dashboard's own container, which is restarted
/// instead so the dashboard never stops itself.
pub fn available_action(container: &ContainerState, self_marker: &str) -> ContainerAction {
    if !container.is_running() {
        ContainerAction::Start
    } else if container.matches(self_marker) {
        ContainerAction::Restart
    } else {
        ContainerAction::Stop
    }
}

/// One container row: its offered action and whether that action is in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerRow<'a> {
    pub container: &'a ContainerState,
    pub running: bool,
    pub action: ContainerAction,
    /// Some command is pending for this container; controls are disabled.
    pub busy: bool,
    /// The pending command is this row's own action.
    pub in_progress: bool,
}

impl<'a> ContainerRow<'a> {
    pub fn new(
        container: &'a ContainerState,
        pending: Option<&PendingCommand>,
        self_marker: &str,
    ) -> Self {
        let action = available_action(container, self_marker);
        Self {
            container,
            running: container.is_running(),
            action,
            busy: pending.is_some(),
            in_progress: pending.is_some_and(|p| p.command == action.command()),
        }
    }
}

/// Everything the dashboard derives from one snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewState {
    pub title: TitleSummary,
    pub memory: MemoryGauge,
    pub gpu_unavailable: bool,
}

impl ViewState {
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        Self {
            title: TitleSummary::from_snapshot(snapshot),
            memory: MemoryGauge::from_snapshot(snapshot),
            gpu_unavailable: snapshot.is_degraded(),
        }
    }
}
