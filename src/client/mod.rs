//! Streaming Metrics Client
//!
//! Keeps one subscription to a push-based metrics feed alive and exposes the
//! latest snapshot.
//!
//! ## Architecture
//!
//! - **ClientCore**: the state machine (status, intent, transport, retry)
//! - **MetricsClient**: handle plus the driver task that owns the core
//! - **Transport / Connector**: the seam between the core and the network
//! - **WsConnector**: the WebSocket implementation of that seam
//!
//! ## Reconnect policy
//!
//! When the transport closes while the caller still wants a connection, one
//! retry is scheduled after a fixed delay. The retry is a plain `connect`,
//! which schedules another retry if it fails. An explicit `disconnect`
//! cancels the pending retry and stops the loop.
//!
//! ## Example
//!
//! ```rust,no_run
//! use metrics_feed::{MetricsClient, StreamConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = MetricsClient::websocket(&StreamConfig::default());
//!     let mut state = client.watch_state();
//!
//!     while state.changed().await.is_ok() {
//!         println!("status: {}", state.borrow().observed);
//!     }
//! }
//! ```

mod handle;
mod machine;
mod status;
mod transport;
mod websocket;

pub use handle::{ClientError, MetricsClient};
pub use machine::{ClientCore, SharedSnapshot};
pub use status::{ClientState, ConnectionStatus, DesiredState};
pub use transport::{
    CloseReason, Connector, EventReceiver, EventSender, EventSink, ReadyState, Transport,
    TransportError, TransportEvent, TransportId,
};
pub use websocket::{WsConnector, WsTransport};
