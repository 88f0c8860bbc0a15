// Rolling history: fixed-capacity FIFO series feeding the trend charts.

use std::collections::VecDeque;

use crate::models::Snapshot;

/// Samples kept per series when no capacity is configured.
pub const DEFAULT_HISTORY_CAPACITY: usize = 10;

/// Fixed-capacity sample sequence. Appends at the back and evicts from the front.
#[derive(Debug, Clone, PartialEq)]
pub struct HistorySeries {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl HistorySeries {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    pub fn push(&mut self, sample: f64) {
        self.samples.push_back(sample);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<f64> {
        self.samples.back().copied()
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().copied()
    }

    pub fn to_vec(&self) -> Vec<f64> {
        self.samples.iter().copied().collect()
    }
}

/// Scalar readings derived from one snapshot, one per tracked series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistorySample {
    pub gpu_percent: f64,
    pub cpu_percent: f64,
    pub gpu_temp_c: f64,
    pub sys_temp_c: f64,
    pub memory_used_gb: f64,
}

impl HistorySample {
    /// Missing GPU metrics read as 0. Memory is decimal GB rounded to one place.
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        Self {
            gpu_percent: snapshot.gpu_usage_percent(),
            cpu_percent: snapshot.cpu.usage_percent,
            gpu_temp_c: snapshot.gpu_temperature_c(),
            sys_temp_c: snapshot.temperature.system_temperature_c,
            memory_used_gb: round_to_tenth(snapshot.memory.used_gb()),
        }
    }
}

pub(crate) fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// The five trend series of the dashboard. Lives as long as the session and is
/// not reset on reconnect.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricHistory {
    pub gpu_percent: HistorySeries,
    pub cpu_percent: HistorySeries,
    pub gpu_temp_c: HistorySeries,
    pub sys_temp_c: HistorySeries,
    pub memory_used_gb: HistorySeries,
}

impl MetricHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            gpu_percent: HistorySeries::new(capacity),
            cpu_percent: HistorySeries::new(capacity),
            gpu_temp_c: HistorySeries::new(capacity),
            sys_temp_c: HistorySeries::new(capacity),
            memory_used_gb: HistorySeries::new(capacity),
        }
    }

    /// Append one sample per series derived from `snapshot`.
    pub fn record(&mut self, snapshot: &Snapshot) -> HistorySample {
        let sample = HistorySample::from_snapshot(snapshot);
        self.gpu_percent.push(sample.gpu_percent);
        self.cpu_percent.push(sample.cpu_percent);
        self.gpu_temp_c.push(sample.gpu_temp_c);
        self.sys_temp_c.push(sample.sys_temp_c);
        self.memory_used_gb.push(sample.memory_used_gb);
        sample
    }

    /// Number of samples held; all series advance together.
    pub fn len(&self) -> usize {
        self.cpu_percent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cpu_percent.is_empty()
    }
}

impl Default for MetricHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
