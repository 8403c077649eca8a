//! Client Handle
//!
//! `MetricsClient` is the long-lived handle presentation code holds. It spawns
//! a driver task that owns the [`ClientCore`] and multiplexes:
//! - commands from the handle (`connect`, `disconnect`, shutdown)
//! - tagged events from the current transport
//! - the reconnect deadline
//!
//! Each input is handled to completion before the next one is polled.
//! Dropping the handle tears the client down as if `disconnect` were called.

use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::machine::{ClientCore, SharedSnapshot};
use super::status::{ClientState, ConnectionStatus};
use super::transport::{Connector, EventReceiver};
use super::websocket::WsConnector;
use crate::config::StreamConfig;

#[derive(Debug)]
enum Command {
    Connect,
    Disconnect,
    Shutdown,
}

/// Handle to a running metrics stream client
pub struct MetricsClient {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ClientState>,
    snapshot: watch::Receiver<SharedSnapshot>,
    driver: JoinHandle<()>,
}

impl MetricsClient {
    /// Spawn a client that opens transports through `connector`
    ///
    /// Connects right away when `config.auto_connect` is set.
    pub fn spawn<C: Connector>(config: &StreamConfig, connector: C) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (commands, commands_rx) = mpsc::unbounded_channel();

        let core = ClientCore::new(connector, config, events_tx);
        let state = core.subscribe_state();
        let snapshot = core.subscribe_snapshot();

        let driver = tokio::spawn(drive(core, commands_rx, events_rx, config.auto_connect));

        Self {
            commands,
            state,
            snapshot,
            driver,
        }
    }

    /// Spawn a client backed by the WebSocket transport
    pub fn websocket(config: &StreamConfig) -> Self {
        Self::spawn(config, WsConnector::new())
    }

    /// Request the stream to be opened. Returns immediately.
    pub fn connect(&self) -> Result<(), ClientError> {
        self.send(Command::Connect)
    }

    /// Request the stream to be closed and kept closed. Returns immediately.
    pub fn disconnect(&self) -> Result<(), ClientError> {
        self.send(Command::Disconnect)
    }

    pub fn status(&self) -> ConnectionStatus {
        self.state.borrow().observed
    }

    pub fn state(&self) -> ClientState {
        *self.state.borrow()
    }

    /// Latest snapshot, possibly from an earlier connection
    pub fn snapshot(&self) -> SharedSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn watch_state(&self) -> watch::Receiver<ClientState> {
        self.state.clone()
    }

    pub fn watch_snapshot(&self) -> watch::Receiver<SharedSnapshot> {
        self.snapshot.clone()
    }

    /// Disconnect and wait for the driver to finish
    pub async fn shutdown(self) -> Result<(), ClientError> {
        let _ = self.commands.send(Command::Shutdown);
        self.driver
            .await
            .map_err(|e| ClientError::Driver(e.to_string()))
    }

    fn send(&self, command: Command) -> Result<(), ClientError> {
        self.commands
            .send(command)
            .map_err(|_| ClientError::Stopped)
    }
}

async fn drive<C: Connector>(
    mut core: ClientCore<C>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    mut events: EventReceiver,
    auto_connect: bool,
) {
    if auto_connect {
        core.connect();
    }

    loop {
        let deadline = core.reconnect_deadline();

        tokio::select! {
            biased;

            command = commands.recv() => match command {
                Some(Command::Connect) => core.connect(),
                Some(Command::Disconnect) => core.disconnect(),
                Some(Command::Shutdown) | None => break,
            },
            Some((id, event)) = events.recv() => core.handle_event(id, event),
            _ = wait_until(deadline) => core.on_reconnect_timer(),
        }
    }

    core.disconnect();
    tracing::debug!("Metrics client stopped");
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Errors returned by the handle
#[derive(Debug, Error)]
pub enum ClientError {
    /// The driver task is no longer running
    #[error("Metrics client has stopped")]
    Stopped,

    #[error("Metrics client driver failed: {0}")]
    Driver(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::status::DesiredState;
    use crate::client::transport::fake::FakeConnector;
    use crate::metrics::types::tests::SAMPLE;
    use std::time::Duration;

    fn config(auto_connect: bool) -> StreamConfig {
        StreamConfig {
            url: "ws://metrics.test/stream".to_string(),
            reconnect_delay_ms: 3000,
            auto_connect,
        }
    }

    /// Let the driver drain everything that is ready
    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_connect_on_spawn() {
        let connector = FakeConnector::default();
        let client = MetricsClient::spawn(&config(true), connector.clone());
        settle().await;

        assert_eq!(client.status(), ConnectionStatus::Connecting);
        assert_eq!(connector.opened(), 1);

        connector.emit_open(0);
        settle().await;
        assert_eq!(client.status(), ConnectionStatus::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_auto_connect() {
        let connector = FakeConnector::default();
        let client = MetricsClient::spawn(&config(false), connector.clone());
        settle().await;

        assert_eq!(client.status(), ConnectionStatus::Disconnected);
        assert_eq!(connector.attempts(), 0);

        client.connect().unwrap();
        settle().await;
        assert_eq!(client.status(), ConnectionStatus::Connecting);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnects_after_fixed_delay() {
        let connector = FakeConnector::default();
        let client = MetricsClient::spawn(&config(true), connector.clone());
        settle().await;
        connector.emit_open(0);
        settle().await;

        connector.emit_close(0);
        settle().await;
        assert_eq!(client.status(), ConnectionStatus::Disconnected);

        tokio::time::sleep(Duration::from_millis(2900)).await;
        settle().await;
        assert_eq!(connector.attempts(), 1);

        tokio::time::sleep(Duration::from_millis(200)).await;
        settle().await;
        assert_eq!(client.status(), ConnectionStatus::Connecting);
        assert_eq!(connector.attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_then_close_retries_once() {
        let connector = FakeConnector::default();
        let client = MetricsClient::spawn(&config(true), connector.clone());
        let mut state = client.watch_state();
        settle().await;
        connector.emit_open(0);
        settle().await;

        connector.emit_error(0);
        settle().await;
        assert_eq!(state.borrow_and_update().observed, ConnectionStatus::Error);

        connector.emit_close(0);
        settle().await;
        assert_eq!(
            state.borrow_and_update().observed,
            ConnectionStatus::Disconnected
        );

        tokio::time::sleep(Duration::from_secs(10)).await;
        settle().await;
        assert_eq!(client.status(), ConnectionStatus::Connecting);
        assert_eq!(connector.attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_loop_until_success() {
        let connector = FakeConnector::default();
        connector.fail_next(3);
        let client = MetricsClient::spawn(&config(true), connector.clone());
        settle().await;
        assert_eq!(client.status(), ConnectionStatus::Error);

        for expected in 2..=4 {
            tokio::time::sleep(Duration::from_millis(3000)).await;
            settle().await;
            assert_eq!(connector.attempts(), expected);
        }

        assert_eq!(client.status(), ConnectionStatus::Connecting);
        tokio::time::sleep(Duration::from_secs(30)).await;
        settle().await;
        assert_eq!(connector.attempts(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_before_open_never_retries() {
        let connector = FakeConnector::default();
        let client = MetricsClient::spawn(&config(false), connector.clone());

        client.connect().unwrap();
        client.disconnect().unwrap();
        settle().await;

        tokio::time::sleep(Duration::from_secs(30)).await;
        settle().await;

        assert_eq!(client.status(), ConnectionStatus::Disconnected);
        assert_eq!(client.state().desired, DesiredState::Disconnect);
        assert_eq!(connector.attempts(), 1);
        assert!(connector.closed_by_client(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_cancels_pending_retry() {
        let connector = FakeConnector::default();
        let client = MetricsClient::spawn(&config(true), connector.clone());
        settle().await;
        connector.emit_open(0);
        connector.emit_close(0);
        settle().await;

        client.disconnect().unwrap();
        settle().await;
        tokio::time::sleep(Duration::from_secs(30)).await;
        settle().await;

        assert_eq!(client.status(), ConnectionStatus::Disconnected);
        assert_eq!(connector.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_observable() {
        let connector = FakeConnector::default();
        let client = MetricsClient::spawn(&config(true), connector.clone());
        let mut snapshots = client.watch_snapshot();
        settle().await;
        assert!(client.snapshot().is_none());

        connector.emit_open(0);
        connector.emit_message(0, SAMPLE);
        snapshots.changed().await.unwrap();

        let snapshot = snapshots.borrow_and_update().clone().unwrap();
        assert_eq!(snapshot.cpu.count, 2);
        assert_eq!(client.snapshot().unwrap().timestamp, snapshot.timestamp);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_closes_transport() {
        let connector = FakeConnector::default();
        let client = MetricsClient::spawn(&config(true), connector.clone());
        settle().await;
        connector.emit_open(0);
        settle().await;

        client.shutdown().await.unwrap();
        assert!(connector.closed_by_client(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_tears_down() {
        let connector = FakeConnector::default();
        let client = MetricsClient::spawn(&config(true), connector.clone());
        settle().await;
        connector.emit_open(0);
        connector.emit_close(0);
        settle().await;

        drop(client);
        settle().await;
        tokio::time::sleep(Duration::from_secs(30)).await;
        settle().await;

        // Pending retry cancelled along with the driver
        assert_eq!(connector.attempts(), 1);
    }
}
