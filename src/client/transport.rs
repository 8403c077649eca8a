//! Transport abstraction
//!
//! A transport is a receive-only push connection. It reports its lifecycle
//! through an [`EventSink`] rather than callbacks, so the client can own the
//! transport while the events arrive on a channel it drains itself.
//!
//! Every transport is tagged with a [`TransportId`]. Events from a transport
//! the client no longer owns are dropped by the client.

use thiserror::Error;
use tokio::sync::mpsc;

/// Generation tag for a transport instance
pub type TransportId = u64;

/// Channel carrying tagged transport events to the client
pub type EventSender = mpsc::UnboundedSender<(TransportId, TransportEvent)>;
pub type EventReceiver = mpsc::UnboundedReceiver<(TransportId, TransportEvent)>;

/// Lifecycle state of a transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReadyState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl ReadyState {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => ReadyState::Connecting,
            1 => ReadyState::Open,
            2 => ReadyState::Closing,
            _ => ReadyState::Closed,
        }
    }

    /// Open, or on its way there
    pub fn is_live(&self) -> bool {
        matches!(self, ReadyState::Connecting | ReadyState::Open)
    }
}

/// Events a transport reports, in order: `Open`, any number of `Message`s,
/// an optional `Error`, and exactly one final `Close`.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Open,
    Message(String),
    Error(TransportError),
    Close(CloseReason),
}

/// Why a transport closed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloseReason {
    /// Close code from the peer, if one was received
    pub code: Option<u16>,
    pub reason: String,
}

impl CloseReason {
    pub fn new(code: Option<u16>, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Connection lost without a close handshake
    pub fn abnormal(reason: impl Into<String>) -> Self {
        Self::new(Some(1006), reason)
    }
}

/// Errors raised by transports
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Endpoint rejected before any I/O happened
    #[error("Invalid endpoint: {0}")]
    InvalidUrl(String),

    /// Handshake or TCP connect failed
    #[error("Connection failed: {0}")]
    Connect(String),

    /// Failure on an established connection
    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Tagged sender handed to each transport at open time
#[derive(Debug, Clone)]
pub struct EventSink {
    id: TransportId,
    tx: EventSender,
}

impl EventSink {
    pub fn new(id: TransportId, tx: EventSender) -> Self {
        Self { id, tx }
    }

    pub fn id(&self) -> TransportId {
        self.id
    }

    /// Report an event. Returns false once the client is gone.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.tx.send((self.id, event)).is_ok()
    }
}

/// A live push connection owned by the client
pub trait Transport: Send {
    fn ready_state(&self) -> ReadyState;

    /// Begin closing. A `Close` event follows asynchronously.
    fn close(&mut self);
}

/// Opens transports to an endpoint
///
/// `open` must not block: it validates its input, starts the connection in
/// the background, and returns immediately. An `Err` is a synchronous
/// construction failure; no events are emitted for that transport.
pub trait Connector: Send + 'static {
    type Transport: Transport + 'static;

    fn open(&mut self, url: &str, events: EventSink) -> Result<Self::Transport, TransportError>;
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_state_roundtrip() {
        for state in [
            ReadyState::Connecting,
            ReadyState::Open,
            ReadyState::Closing,
            ReadyState::Closed,
        ] {
            assert_eq!(ReadyState::from_u8(state as u8), state);
        }
        assert!(ReadyState::Open.is_live());
        assert!(!ReadyState::Closing.is_live());
    }

    #[test]
    fn test_sink_tags_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = EventSink::new(7, tx);

        assert!(sink.emit(TransportEvent::Open));
        assert_eq!(rx.try_recv().unwrap(), (7, TransportEvent::Open));

        drop(rx);
        assert!(!sink.emit(TransportEvent::Open));
    }

    #[test]
    fn test_error_display() {
        let err = TransportError::InvalidUrl("http://x".to_string());
        assert_eq!(err.to_string(), "Invalid endpoint: http://x");
    }
}
