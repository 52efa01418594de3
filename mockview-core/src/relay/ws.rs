//! WebSocket transport (tokio-tungstenite).
//!
//! A background task owns the socket. Outbound frames reach it through an
//! unbounded channel so `send` never awaits; inbound frames are parsed and
//! forwarded as `RelayEvent`s. The transport becomes ready once the agent
//! answers `StartConversation` with `ConversationStarted`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use super::messages::{ClientMessage, ServerMessage};
use super::{OutboundFrame, RelayEvent, RelayTransport};
use crate::client::ConnectionParams;
use crate::error::{MockviewError, Result};

pub struct WsTransport {
    outbound: Option<mpsc::UnboundedSender<OutboundFrame>>,
    ready: Arc<AtomicBool>,
}

impl WsTransport {
    /// Open the socket, request a conversation, and start the I/O task.
    ///
    /// Connection failures map to `ConnectionUnavailable`.
    pub async fn connect(
        params: &ConnectionParams,
        events: mpsc::UnboundedSender<RelayEvent>,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let mut request = params.ws_url.as_str().into_client_request().map_err(|e| {
            MockviewError::ConnectionUnavailable(format!("invalid relay url {}: {e}", params.ws_url))
        })?;
        if let Some(api_key) = params.api_key.as_deref() {
            if let Ok(value) = HeaderValue::from_str(&format!("Bearer {api_key}")) {
                request.headers_mut().insert(AUTHORIZATION, value);
            }
        }

        info!(url = %params.ws_url, template_id = %params.template_id, "connecting relay");
        let (stream, _response) =
            tokio::time::timeout(connect_timeout, tokio_tungstenite::connect_async(request))
                .await
                .map_err(|_| {
                    MockviewError::ConnectionUnavailable(format!(
                        "relay connect timed out after {connect_timeout:?}"
                    ))
                })?
                .map_err(|e| MockviewError::ConnectionUnavailable(e.to_string()))?;

        let (mut sink, source) = stream.split();
        let start = ClientMessage::start_conversation(params.template_id.clone()).to_json()?;
        sink.send(Message::Text(start.into()))
            .await
            .map_err(|e| MockviewError::ConnectionUnavailable(e.to_string()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let ready = Arc::new(AtomicBool::new(false));
        tokio::spawn(run_connection(sink, source, rx, events, Arc::clone(&ready)));

        Ok(Self {
            outbound: Some(tx),
            ready,
        })
    }
}

impl RelayTransport for WsTransport {
    fn is_ready(&self) -> bool {
        self.outbound.is_some() && self.ready.load(Ordering::Acquire)
    }

    fn send(&mut self, frame: OutboundFrame) -> Result<()> {
        let tx = self
            .outbound
            .as_ref()
            .ok_or_else(|| MockviewError::ConnectionUnavailable("relay closed".into()))?;
        tx.send(frame)
            .map_err(|_| MockviewError::ConnectionUnavailable("relay task stopped".into()))
    }

    fn close(&mut self) {
        // Dropping the sender lets the task flush queued frames, then close.
        if self.outbound.take().is_some() {
            debug!("relay close requested");
        }
    }
}

impl std::fmt::Debug for WsTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsTransport")
            .field("open", &self.outbound.is_some())
            .field("ready", &self.ready.load(Ordering::Relaxed))
            .finish()
    }
}

async fn run_connection<S, R>(
    mut sink: S,
    mut source: R,
    mut outbound: mpsc::UnboundedReceiver<OutboundFrame>,
    events: mpsc::UnboundedSender<RelayEvent>,
    ready: Arc<AtomicBool>,
) where
    S: futures_util::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
    R: futures_util::Stream<Item = std::result::Result<Message, tokio_tungstenite::tungstenite::Error>>
        + Unpin,
{
    let reason = loop {
        tokio::select! {
            frame = outbound.recv() => match frame {
                Some(frame) => {
                    let msg = match frame {
                        OutboundFrame::Binary(bytes) => Message::Binary(bytes),
                        OutboundFrame::Text(text) => Message::Text(text.into()),
                    };
                    if let Err(e) = sink.send(msg).await {
                        break format!("send failed: {e}");
                    }
                }
                None => {
                    if let Err(e) = sink.send(Message::Close(None)).await {
                        debug!(error = %e, "close frame not delivered");
                    }
                    break "closed by client".to_string();
                }
            },
            incoming = source.next() => match incoming {
                Some(Ok(Message::Text(text))) => match ServerMessage::parse(text.as_str()) {
                    Ok(msg) => {
                        if matches!(msg, ServerMessage::ConversationStarted { .. }) {
                            ready.store(true, Ordering::Release);
                            info!("conversation started; relay ready");
                        }
                        if events.send(RelayEvent::Control(msg)).is_err() {
                            break "session dropped".to_string();
                        }
                    }
                    Err(e) => warn!(error = %e, "ignoring malformed control message"),
                },
                Some(Ok(Message::Binary(data))) => {
                    if events.send(RelayEvent::Audio(data)).is_err() {
                        break "session dropped".to_string();
                    }
                }
                Some(Ok(Message::Ping(payload))) => {
                    if let Err(e) = sink.send(Message::Pong(payload)).await {
                        break format!("pong failed: {e}");
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    break frame
                        .map(|f| f.reason.as_str().to_owned())
                        .filter(|r| !r.is_empty())
                        .unwrap_or_else(|| "closed by agent".to_string());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => break e.to_string(),
                None => break "stream ended".to_string(),
            },
        }
    };

    ready.store(false, Ordering::Release);
    info!(%reason, "relay connection closed");
    let _ = events.send(RelayEvent::Closed { reason });
}
