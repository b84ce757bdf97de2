use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::TransportError;

use super::events::{ClientEvent, ServerEvent};

/// Handshake deadline for the initial connect.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(20);
/// Bounded queues between the session and the pump tasks.
const EVENT_QUEUE: usize = 256;
const OUTBOUND_QUEUE: usize = 64;

/// Why a live link went away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The server sent a clean close frame.
    ServerClosed,
    /// The connection dropped with an error.
    Error(String),
}

/// Frames delivered from a live link to the session.
#[derive(Debug)]
pub enum LinkEvent {
    Inbound(ServerEvent),
    Closed(CloseReason),
}

/// One live connection: an inbound event stream, an outbound signal
/// queue, and a cancellation token that tears both pumps down.
pub struct TransportLink {
    pub events: mpsc::Receiver<LinkEvent>,
    pub outbound: mpsc::Sender<ClientEvent>,
    cancel: CancellationToken,
}

impl TransportLink {
    pub fn new(
        events: mpsc::Receiver<LinkEvent>,
        outbound: mpsc::Sender<ClientEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            events,
            outbound,
            cancel,
        }
    }

    /// Queue an outbound signal. Best-effort — a full queue or closed
    /// pump drops the signal rather than blocking the session.
    pub fn send(&self, event: ClientEvent) {
        if let Err(e) = self.outbound.try_send(event) {
            warn!(error = %e, "dropping outbound signal: transport queue unavailable");
        }
    }

    /// Stop both pump tasks and close the underlying connection.
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

impl Drop for TransportLink {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// The real-time transport seam. The production implementation dials a
/// WebSocket; tests script a link directly.
pub trait Transport: Send + Sync + 'static {
    fn connect(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<TransportLink, TransportError>> + Send;
}

/// WebSocket transport over tokio-tungstenite. The auth token rides in
/// the handshake as a bearer header.
pub struct WsTransport {
    url: String,
}

impl WsTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl Transport for WsTransport {
    async fn connect(&self, token: &str) -> Result<TransportLink, TransportError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        let (ws, _) = timeout(CONNECT_TIMEOUT, connect_async(request))
            .await
            .map_err(|_| TransportError::HandshakeTimeout)?
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;

        debug!(url = %self.url, "websocket connected");

        let (mut sink, mut stream) = ws.split();
        let (event_tx, event_rx) = mpsc::channel::<LinkEvent>(EVENT_QUEUE);
        let (out_tx, mut out_rx) = mpsc::channel::<ClientEvent>(OUTBOUND_QUEUE);
        let cancel = CancellationToken::new();

        // Write pump: serialize outbound signals onto the socket. On
        // cancel the queue is drained first so signals sent just before
        // close (the leave notification) still go out.
        let write_cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = write_cancel.cancelled() => {
                        while let Ok(event) = out_rx.try_recv() {
                            if let Ok(json) = serde_json::to_string(&event) {
                                let _ = sink.send(Message::text(json)).await;
                            }
                        }
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                    event = out_rx.recv() => {
                        let Some(event) = event else { break };
                        let json = match serde_json::to_string(&event) {
                            Ok(json) => json,
                            Err(e) => {
                                warn!(error = %e, "failed to serialize outbound signal");
                                continue;
                            }
                        };
                        if sink.send(Message::text(json)).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        // Read pump: parse inbound frames into server events. Frames
        // that don't decode are logged and skipped, never surfaced.
        let read_cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = read_cancel.cancelled() => break,
                    frame = stream.next() => {
                        let close = match frame {
                            Some(Ok(Message::Text(text))) => {
                                match serde_json::from_str::<ServerEvent>(text.as_str()) {
                                    Ok(event) => {
                                        if event_tx.send(LinkEvent::Inbound(event)).await.is_err() {
                                            break;
                                        }
                                        continue;
                                    }
                                    Err(e) => {
                                        warn!(error = %e, "ignoring undecodable frame");
                                        continue;
                                    }
                                }
                            }
                            // Binary frames and protocol pings are not
                            // part of the event contract
                            Some(Ok(Message::Binary(_)))
                            | Some(Ok(Message::Ping(_)))
                            | Some(Ok(Message::Pong(_)))
                            | Some(Ok(Message::Frame(_))) => continue,
                            Some(Ok(Message::Close(_))) => CloseReason::ServerClosed,
                            Some(Err(e)) => CloseReason::Error(e.to_string()),
                            None => CloseReason::Error("stream ended".into()),
                        };
                        let _ = event_tx.send(LinkEvent::Closed(close)).await;
                        break;
                    }
                }
            }
        });

        Ok(TransportLink::new(event_rx, out_tx, cancel))
    }
}
