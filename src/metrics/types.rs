//! Snapshot data types
//!
//! Mirrors the JSON report emitted by the metrics server:
//! - `SystemMetrics`: one complete snapshot with a timestamp
//! - `CpuMetrics`, `MemoryMetrics`, `DiskMetrics`, `NetworkMetrics`,
//!   `ProcessMetrics`: the nested sections
//!
//! All fields are required. Fields the server adds later are ignored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One system metrics report
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SystemMetrics {
    /// Unix timestamp in seconds (fractional)
    pub timestamp: f64,
    pub cpu: CpuMetrics,
    pub memory: MemoryMetrics,
    pub disk: DiskMetrics,
    pub network: NetworkMetrics,
    pub process: ProcessMetrics,
}

/// CPU usage
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CpuMetrics {
    pub percent_total: f64,
    pub percent_per_core: Vec<f64>,
    /// Logical core count
    pub count: u32,
    pub frequency_mhz: f64,
}

/// Physical memory usage
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryMetrics {
    pub percent: f64,
    pub total_mb: f64,
    pub available_mb: f64,
    pub used_mb: f64,
}

/// Disk usage of the monitored volume
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiskMetrics {
    pub percent: f64,
    pub total_gb: f64,
    pub used_gb: f64,
    pub free_gb: f64,
}

/// Cumulative network counters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkMetrics {
    pub bytes_sent_mb: f64,
    pub bytes_recv_mb: f64,
}

/// Resource usage of the reporting process itself
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessMetrics {
    pub memory_mb: f64,
    pub cpu_percent: f64,
}

impl SystemMetrics {
    /// Parse a snapshot from a wire payload
    ///
    /// Only structural validity is checked; values are taken as reported.
    pub fn from_json(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }

    /// The report timestamp as a UTC datetime
    ///
    /// Returns `None` if the timestamp is not finite or out of range.
    pub fn recorded_at(&self) -> Option<DateTime<Utc>> {
        if !self.timestamp.is_finite() {
            return None;
        }
        let millis = (self.timestamp * 1000.0).round() as i64;
        DateTime::from_timestamp_millis(millis)
    }
}

impl fmt::Display for SystemMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cpu={:.1}% ({} cores) mem={:.1}% ({:.0}/{:.0} MB) disk={:.1}% net=↑{:.1}MB ↓{:.1}MB",
            self.cpu.percent_total,
            self.cpu.count,
            self.memory.percent,
            self.memory.used_mb,
            self.memory.total_mb,
            self.disk.percent,
            self.network.bytes_sent_mb,
            self.network.bytes_recv_mb,
        )
    }
}
