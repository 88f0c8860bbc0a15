// Telemetry snapshot: one decoded reading of GPU, CPU, memory, temperature and containers

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::ContainerState;

/// KB per GB. The server reports kilobytes and the dashboard shows decimal gigabytes.
pub const KB_PER_GB: f64 = 1_000_000.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GpuMetrics {
    pub usage_percent: f64,
    pub temperature_c: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power_w: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuMetrics {
    pub usage_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemperatureMetrics {
    pub system_temperature_c: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryMetrics {
    #[serde(rename = "totalKB")]
    pub total_kb: u64,
    #[serde(rename = "usedKB")]
    pub used_kb: u64,
    #[serde(rename = "freeKB")]
    pub free_kb: u64,
}

impl MemoryMetrics {
    pub fn used_gb(&self) -> f64 {
        self.used_kb as f64 / KB_PER_GB
    }

    pub fn total_gb(&self) -> f64 {
        self.total_kb as f64 / KB_PER_GB
    }
}

/// One telemetry payload as pushed by the server. Replaced wholesale on every frame.
///
/// `gpu` is `None` when the server's GPU monitor failed; that snapshot is still valid
/// and is reported as degraded rather than as a protocol error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub gpu: Option<GpuMetrics>,
    pub cpu: CpuMetrics,
    pub temperature: TemperatureMetrics,
    pub memory: MemoryMetrics,
    #[serde(default)]
    pub docker: Vec<ContainerState>,
    pub next_poll_seconds: f64,
}

impl Snapshot {
    /// Decode one inbound frame.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// True when GPU metrics are missing from this reading.
    pub fn is_degraded(&self) -> bool {
        self.gpu.is_none()
    }

    pub fn gpu_usage_percent(&self) -> f64 {
        self.gpu.as_ref().map_or(0.0, |g| g.usage_percent)
    }

    pub fn gpu_temperature_c(&self) -> f64 {
        self.gpu.as_ref().map_or(0.0, |g| g.temperature_c)
    }

    pub fn container(&self, id: &str) -> Option<&ContainerState> {
        self.docker.iter().find(|c| c.id == id)
    }

    /// Pacing hint for the next reading; `None` when the server sent nothing usable.
    pub fn next_poll(&self) -> Option<Duration> {
        Duration::try_from_secs_f64(self.next_poll_seconds)
            .ok()
            .filter(|d| !d.is_zero())
    }
}
