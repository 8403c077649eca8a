//! Metrics Snapshot Types
//!
//! The wire format pushed by the metrics feed. Each text frame carries one
//! complete [`SystemMetrics`] report.

pub(crate) mod types;

pub use types::{
    CpuMetrics, DiskMetrics, MemoryMetrics, NetworkMetrics, ProcessMetrics, SystemMetrics,
};
