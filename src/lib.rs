//! # metrics-feed
//!
//! Resilient client for a server-pushed system metrics stream.
//!
//! ## Features
//!
//! - **Latest snapshot**: every valid message replaces the previous one
//! - **Automatic recovery**: fixed-delay reconnect after unexpected loss
//! - **Explicit intent**: `disconnect` keeps the client down until `connect`
//! - **Testable transport**: the network sits behind a trait
//!
//! ## Modules
//!
//! - [`client`]: state machine, handle and WebSocket transport
//! - [`metrics`]: snapshot wire types
//! - [`config`]: TOML and environment configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use metrics_feed::{Config, MetricsClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (config, _origin) = Config::load_default();
//!     let client = MetricsClient::websocket(&config.stream);
//!
//!     let mut snapshots = client.watch_snapshot();
//!     snapshots.changed().await?;
//!     if let Some(metrics) = snapshots.borrow().as_ref() {
//!         println!("{}", metrics);
//!     }
//!
//!     client.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod metrics;

pub use client::{
    ClientCore, ClientError, ClientState, ConnectionStatus, Connector, DesiredState,
    MetricsClient, SharedSnapshot, Transport, TransportError, TransportEvent, WsConnector,
};

pub use config::{Config, ConfigError, ConfigOrigin, LoggingConfig, StreamConfig};

pub use metrics::{
    CpuMetrics, DiskMetrics, MemoryMetrics, NetworkMetrics, ProcessMetrics, SystemMetrics,
};
