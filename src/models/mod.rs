// Wire and session models for the dashboard telemetry stream

mod command;
mod container;
mod snapshot;
mod status;

pub use command::{CommandMessage, ContainerAction, PendingCommand};
pub use container::ContainerState;
pub use snapshot::{CpuMetrics, GpuMetrics, MemoryMetrics, Snapshot, TemperatureMetrics};
pub use status::{ConnectionStatus, StatusUpdate};
