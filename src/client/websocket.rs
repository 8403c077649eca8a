//! WebSocket Transport
//!
//! `WsConnector` opens transports backed by `tokio-tungstenite`. Each
//! transport runs on its own task: it performs the handshake, forwards text
//! frames as `Message` events and finishes with exactly one `Close`.
//!
//! Closing is requested through a oneshot. Dropping the transport drops the
//! sender, which the task treats the same as an explicit close.

use futures_util::StreamExt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::protocol::Message;

use super::transport::{
    CloseReason, Connector, EventSink, ReadyState, Transport, TransportError, TransportEvent,
};

/// Opens WebSocket transports. Must be used from within a tokio runtime.
#[derive(Debug, Clone, Default)]
pub struct WsConnector;

impl WsConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Connector for WsConnector {
    type Transport = WsTransport;

    fn open(&mut self, url: &str, events: EventSink) -> Result<WsTransport, TransportError> {
        let request = build_request(url)?;

        let state = Arc::new(AtomicU8::new(ReadyState::Connecting as u8));
        let (close_tx, close_rx) = oneshot::channel();
        tokio::spawn(run_socket(request, events, Arc::clone(&state), close_rx));

        Ok(WsTransport {
            state,
            close_tx: Some(close_tx),
        })
    }
}

/// Validate the endpoint the way a browser socket constructor would
fn build_request(url: &str) -> Result<Request, TransportError> {
    let request = url
        .into_client_request()
        .map_err(|e| TransportError::InvalidUrl(format!("{}: {}", url, e)))?;

    match request.uri().scheme_str() {
        Some("ws") | Some("wss") => Ok(request),
        other => Err(TransportError::InvalidUrl(format!(
            "{}: unsupported scheme {:?}",
            url, other
        ))),
    }
}

/// A WebSocket connection running on a background task
pub struct WsTransport {
    state: Arc<AtomicU8>,
    close_tx: Option<oneshot::Sender<()>>,
}

impl Transport for WsTransport {
    fn ready_state(&self) -> ReadyState {
        ReadyState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn close(&mut self) {
        if let Some(tx) = self.close_tx.take() {
            if self.ready_state().is_live() {
                self.state.store(ReadyState::Closing as u8, Ordering::Release);
            }
            let _ = tx.send(());
        }
    }
}

async fn run_socket(
    request: Request,
    events: EventSink,
    state: Arc<AtomicU8>,
    mut close_rx: oneshot::Receiver<()>,
) {
    let id = events.id();
    let set_state = |ready: ReadyState| state.store(ready as u8, Ordering::Release);

    let connect = tokio_tungstenite::connect_async(request);
    let mut ws = tokio::select! {
        result = connect => match result {
            Ok((ws, _response)) => ws,
            Err(e) => {
                tracing::debug!(transport_id = id, error = %e, "WebSocket handshake failed");
                set_state(ReadyState::Closed);
                let error = TransportError::Connect(e.to_string());
                events.emit(TransportEvent::Error(error));
                events.emit(TransportEvent::Close(CloseReason::abnormal("handshake failed")));
                return;
            }
        },
        _ = &mut close_rx => {
            set_state(ReadyState::Closed);
            events.emit(TransportEvent::Close(CloseReason::new(None, "closed before open")));
            return;
        }
    };

    set_state(ReadyState::Open);
    events.emit(TransportEvent::Open);

    let reason = loop {
        tokio::select! {
            frame = ws.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    events.emit(TransportEvent::Message(text.to_string()));
                }
                Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => {
                        events.emit(TransportEvent::Message(text));
                    }
                    Err(e) => {
                        tracing::warn!(
                            transport_id = id,
                            error = %e,
                            "Dropping non UTF-8 binary frame"
                        );
                    }
                },
                Some(Ok(Message::Close(frame))) => {
                    break match frame {
                        Some(f) => CloseReason::new(Some(u16::from(f.code)), f.reason.to_string()),
                        None => CloseReason::new(None, "closed by server"),
                    };
                }
                // Ping replies are queued by tungstenite itself
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    set_state(ReadyState::Closed);
                    let error = TransportError::Protocol(e.to_string());
                    events.emit(TransportEvent::Error(error));
                    break CloseReason::abnormal(e.to_string());
                }
                None => break CloseReason::abnormal("stream ended"),
            },
            _ = &mut close_rx => {
                set_state(ReadyState::Closing);
                if let Err(e) = ws.close(None).await {
                    tracing::debug!(transport_id = id, error = %e, "Close handshake failed");
                }
                break CloseReason::new(Some(1000), "closed by client");
            }
        }
    };

    set_state(ReadyState::Closed);
    events.emit(TransportEvent::Close(reason));
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn test_build_request_accepts_ws() {
        assert!(build_request("ws://localhost:4000/api/ws/metrics").is_ok());
        assert!(build_request("wss://metrics.example.com/stream").is_ok());
    }

    #[test]
    fn test_build_request_rejects_bad_urls() {
        assert!(matches!(
            build_request("http://localhost:4000/"),
            Err(TransportError::InvalidUrl(_))
        ));
        assert!(matches!(
            build_request("not a url"),
            Err(TransportError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_refused_connection_reports_error_then_close() {
        // Bind then drop to get a port nobody listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut connector = WsConnector::new();
        let transport = connector
            .open(&format!("ws://{}/metrics", addr), EventSink::new(1, tx))
            .unwrap();

        let (id, first) = rx.recv().await.unwrap();
        assert_eq!(id, 1);
        assert!(matches!(
            first,
            TransportEvent::Error(TransportError::Connect(_))
        ));
        let (_, second) = rx.recv().await.unwrap();
        assert!(matches!(second, TransportEvent::Close(_)));
        assert_eq!(transport.ready_state(), ReadyState::Closed);
    }

    #[tokio::test]
    async fn test_invalid_url_fails_synchronously() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut connector = WsConnector::new();

        let result = connector.open("ftp://localhost/metrics", EventSink::new(1, tx));
        assert!(result.is_err());
        assert!(rx.try_recv().is_err());
    }
}
