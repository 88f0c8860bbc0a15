// Shared test helpers
#![allow(dead_code)]

use dashboard_sync::models::*;

pub fn container(id: &str, status: &str) -> ContainerState {
    ContainerState {
        id: id.into(),
        names: format!("{}-name", id),
        image: "nginx:latest".into(),
        status: status.into(),
        ports: String::new(),
        cpu: "0.00%".into(),
        memory: "10MiB / 1GiB".into(),
    }
}

pub fn snapshot(cpu: f64, used_kb: u64, containers: Vec<ContainerState>) -> Snapshot {
    Snapshot {
        gpu: Some(GpuMetrics {
            usage_percent: 50.0,
            temperature_c: 60.0,
            power_w: Some(120.5),
        }),
        cpu: CpuMetrics { usage_percent: cpu },
        temperature: TemperatureMetrics {
            system_temperature_c: 45.0,
        },
        memory: MemoryMetrics {
            total_kb: 128_000_000,
            used_kb,
            free_kb: 128_000_000u64.saturating_sub(used_kb),
        },
        docker: containers,
        next_poll_seconds: 2.0,
    }
}

pub fn snapshot_json(cpu: f64, used_kb: u64, containers: Vec<ContainerState>) -> String {
    serde_json::to_string(&snapshot(cpu, used_kb, containers)).unwrap()
}

/// Frame as the server sends it, including a field the client does not model.
pub const SERVER_FRAME: &str = r#"{
    "gpu": {"usagePercent": 37.5, "temperatureC": 61.2, "powerW": 88.1},
    "cpu": {"usagePercent": 12.25},
    "temperature": {"systemTemperatureC": 48.4},
    "memory": {"totalKB": 128000000, "usedKB": 64250000, "freeKB": 63750000},
    "docker": [
        {"id": "a1", "names": "web", "image": "nginx", "status": "Up 2 hours",
         "ports": "0.0.0.0:80->80/tcp", "cpu": "0.10%", "memory": "20MiB / 1GiB"},
        {"id": "b2", "names": "dgx_dashboard", "image": "dgx_dashboard:latest",
         "status": "Exited (0) 5 minutes ago", "ports": "", "cpu": "0.00%", "memory": "0B / 0B"}
    ],
    "nextPollSeconds": 2.5,
    "hostname": "dgx-01"
}"#;

pub const DEGRADED_FRAME: &str = r#"{
    "gpu": null,
    "cpu": {"usagePercent": 5.0},
    "temperature": {"systemTemperatureC": 40.0},
    "memory": {"totalKB": 128000000, "usedKB": 1000000, "freeKB": 127000000},
    "docker": [],
    "nextPollSeconds": 2
}"#;
