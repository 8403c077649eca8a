//! Client State Machine
//!
//! `ClientCore` owns the transport, the desired/observed state pair, the
//! pending reconnect deadline and the latest snapshot. It is synchronous:
//! every method handles one event to completion. The driver in
//! [`super::handle`] feeds it commands, transport events and timer expiries.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

use super::status::{ClientState, ConnectionStatus, DesiredState};
use super::transport::{Connector, EventSender, EventSink, Transport, TransportEvent, TransportId};
use crate::config::StreamConfig;
use crate::metrics::SystemMetrics;

/// Latest snapshot as seen by consumers
pub type SharedSnapshot = Option<Arc<SystemMetrics>>;

struct LiveTransport<T> {
    id: TransportId,
    transport: T,
}

/// Reconnecting subscription to a metrics stream
pub struct ClientCore<C: Connector> {
    connector: C,
    url: String,
    reconnect_delay: Duration,
    state: watch::Sender<ClientState>,
    snapshot: watch::Sender<SharedSnapshot>,
    /// At most one transport; cleared on close
    transport: Option<LiveTransport<C::Transport>>,
    /// Pending retry. Never set while `transport` is `Some`.
    reconnect_at: Option<Instant>,
    next_id: TransportId,
    events: EventSender,
}

impl<C: Connector> ClientCore<C> {
    /// Create a disconnected core. Transports report into `events`.
    pub fn new(connector: C, config: &StreamConfig, events: EventSender) -> Self {
        let (state, _) = watch::channel(ClientState::default());
        let (snapshot, _) = watch::channel(None);

        Self {
            connector,
            url: config.url.clone(),
            reconnect_delay: config.reconnect_delay(),
            state,
            snapshot,
            transport: None,
            reconnect_at: None,
            next_id: 1,
            events,
        }
    }

    /// Open the stream unless a transport is already open or opening
    pub fn connect(&mut self) {
        let ready = self
            .transport
            .as_ref()
            .map(|live| live.transport.ready_state());
        match ready {
            Some(ready) if ready.is_live() => {
                tracing::debug!(state = ?ready, "Transport already active, ignoring connect");
                return;
            }
            Some(_) => {
                // Errored but its close has not arrived yet
                if let Some(mut dying) = self.transport.take() {
                    tracing::debug!(transport_id = dying.id, "Releasing dying transport");
                    dying.transport.close();
                }
            }
            None => {}
        }

        self.cancel_reconnect();
        self.update(|state| {
            state.desired = DesiredState::Connect;
            state.observed = ConnectionStatus::Connecting;
        });

        let id = self.next_id;
        self.next_id += 1;
        let sink = EventSink::new(id, self.events.clone());

        match self.connector.open(&self.url, sink) {
            Ok(transport) => {
                tracing::info!(transport_id = id, url = %self.url, "Opening metrics stream");
                self.transport = Some(LiveTransport { id, transport });
            }
            Err(e) => {
                tracing::error!(url = %self.url, error = %e, "Failed to create transport");
                self.set_status(ConnectionStatus::Error);
                self.schedule_reconnect();
            }
        }
    }

    /// Close the stream and stay closed until the next `connect`
    pub fn disconnect(&mut self) {
        self.cancel_reconnect();

        if let Some(mut live) = self.transport.take() {
            tracing::info!(transport_id = live.id, "Closing metrics stream");
            live.transport.close();
        }

        self.update(|state| {
            state.desired = DesiredState::Disconnect;
            state.observed = ConnectionStatus::Disconnected;
        });
    }

    /// Apply one event reported by a transport
    pub fn handle_event(&mut self, id: TransportId, event: TransportEvent) {
        if self.transport.as_ref().map(|live| live.id) != Some(id) {
            tracing::debug!(
                transport_id = id,
                event = ?event,
                "Ignoring event from released transport"
            );
            return;
        }

        match event {
            TransportEvent::Open => {
                tracing::info!(transport_id = id, "Metrics stream connected");
                self.set_status(ConnectionStatus::Connected);
            }
            TransportEvent::Message(payload) => self.apply_payload(id, &payload),
            TransportEvent::Error(e) => {
                // The close that follows schedules the retry
                tracing::warn!(transport_id = id, error = %e, "Metrics stream error");
                self.set_status(ConnectionStatus::Error);
            }
            TransportEvent::Close(reason) => {
                tracing::info!(
                    transport_id = id,
                    code = ?reason.code,
                    reason = %reason.reason,
                    "Metrics stream closed"
                );
                self.transport = None;
                self.set_status(ConnectionStatus::Disconnected);
                self.schedule_reconnect();
            }
        }
    }

    /// Fire the pending reconnect, if any
    pub fn on_reconnect_timer(&mut self) {
        if self.reconnect_at.take().is_some() {
            tracing::info!("Reconnecting to metrics stream");
            self.connect();
        }
    }

    pub fn reconnect_deadline(&self) -> Option<Instant> {
        self.reconnect_at
    }

    pub fn state(&self) -> ClientState {
        *self.state.borrow()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.state.borrow().observed
    }

    pub fn snapshot(&self) -> SharedSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn has_transport(&self) -> bool {
        self.transport.is_some()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ClientState> {
        self.state.subscribe()
    }

    pub fn subscribe_snapshot(&self) -> watch::Receiver<SharedSnapshot> {
        self.snapshot.subscribe()
    }

    fn apply_payload(&mut self, id: TransportId, payload: &str) {
        match SystemMetrics::from_json(payload) {
            Ok(metrics) => {
                tracing::trace!(
                    transport_id = id,
                    timestamp = metrics.timestamp,
                    "Snapshot received"
                );
                self.snapshot.send_replace(Some(Arc::new(metrics)));
            }
            Err(e) => {
                tracing::warn!(
                    transport_id = id,
                    error = %e,
                    len = payload.len(),
                    "Discarding malformed metrics payload"
                );
            }
        }
    }

    fn schedule_reconnect(&mut self) {
        if !self.state().wants_reconnect() {
            return;
        }

        let deadline = Instant::now() + self.reconnect_delay;
        if self.reconnect_at.replace(deadline).is_some() {
            tracing::debug!("Replaced pending reconnect");
        }
        tracing::info!(
            delay_ms = self.reconnect_delay.as_millis() as u64,
            "Scheduling reconnect"
        );
    }

    fn cancel_reconnect(&mut self) {
        if self.reconnect_at.take().is_some() {
            tracing::debug!("Cancelled pending reconnect");
        }
    }

    fn set_status(&self, status: ConnectionStatus) {
        self.update(|state| state.observed = status);
    }

    fn update(&self, apply: impl FnOnce(&mut ClientState)) {
        self.state.send_modify(apply);
    }
}

impl<C: Connector> Drop for ClientCore<C> {
    fn drop(&mut self) {
        self.reconnect_at = None;
        if let Some(mut live) = self.transport.take() {
            live.transport.close();
        }
    }
}
