//! Connection status and intent
//!
//! `ConnectionStatus` is what the client observes; `DesiredState` is what the
//! caller asked for. A close only leads to a reconnect when the caller still
//! wants to be connected.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Observed state of the metrics stream
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// No transport, or the last one closed
    #[default]
    Disconnected,
    /// A transport is being opened
    Connecting,
    /// The transport is open and snapshots may arrive
    Connected,
    /// The transport failed; a close and a retry follow
    Error,
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Disconnected => write!(f, "disconnected"),
            ConnectionStatus::Connecting => write!(f, "connecting"),
            ConnectionStatus::Connected => write!(f, "connected"),
            ConnectionStatus::Error => write!(f, "error"),
        }
    }
}

/// The caller's last explicit intent
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DesiredState {
    Connect,
    #[default]
    Disconnect,
}

/// Intent and observation side by side
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientState {
    pub desired: DesiredState,
    pub observed: ConnectionStatus,
}

impl ClientState {
    /// Whether a transport close should be followed by a retry
    pub fn wants_reconnect(&self) -> bool {
        self.desired == DesiredState::Connect
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let state = ClientState::default();
        assert_eq!(state.observed, ConnectionStatus::Disconnected);
        assert_eq!(state.desired, DesiredState::Disconnect);
        assert!(!state.wants_reconnect());
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&ConnectionStatus::Connecting).unwrap();
        assert_eq!(json, "\"connecting\"");

        let status: ConnectionStatus = serde_json::from_str("\"error\"").unwrap();
        assert_eq!(status, ConnectionStatus::Error);
        assert_eq!(status.to_string(), "error");
    }

    #[test]
    fn test_only_connected_is_connected() {
        assert!(ConnectionStatus::Connected.is_connected());
        for status in [
            ConnectionStatus::Disconnected,
            ConnectionStatus::Connecting,
            ConnectionStatus::Error,
        ] {
            assert!(!status.is_connected());
        }
    }
}
