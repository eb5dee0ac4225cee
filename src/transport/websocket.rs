//! WebSocket transport over `tokio-tungstenite`.

use bytes::Bytes;
use futures::future;
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use super::{BoxFuture, Connector, Handshake, TransportPair};
use crate::error::{DialogError, Result};

/// Connects to the dialogue endpoint over WebSocket.
///
/// Only binary messages carry frames. Text messages are logged and dropped;
/// ping/pong is answered by tungstenite.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    pub fn new() -> Self {
        Self
    }
}

/// Build the upgrade request with the handshake headers attached.
pub(crate) fn build_request(handshake: &Handshake) -> Result<Request> {
    let mut request = handshake.endpoint.as_str().into_client_request()?;
    let headers = request.headers_mut();
    for (name, value) in handshake.headers() {
        let value = HeaderValue::from_str(value)
            .map_err(|e| DialogError::Config(format!("invalid {name} header: {e}")))?;
        headers.insert(name, value);
    }
    Ok(request)
}

impl Connector for WebSocketConnector {
    fn connect<'a>(&'a self, handshake: &'a Handshake) -> BoxFuture<'a, Result<TransportPair>> {
        Box::pin(async move {
            let request = build_request(handshake)?;
            let (ws, response) = connect_async(request).await?;
            debug!(
                endpoint = %handshake.endpoint,
                status = %response.status(),
                logid = ?response.headers().get("X-Tt-Logid"),
                "WebSocket connected"
            );

            let (sink, stream) = ws.split();

            let sink = sink
                .sink_map_err(DialogError::from)
                .with(|bytes: Bytes| future::ready(Ok::<_, DialogError>(Message::Binary(bytes.to_vec()))));

            let stream = stream.filter_map(|message| {
                future::ready(match message {
                    Ok(Message::Binary(data)) => Some(Ok(Bytes::from(data))),
                    Ok(Message::Text(text)) => {
                        warn!(len = text.len(), "Ignoring text message");
                        None
                    }
                    Ok(Message::Close(frame)) => {
                        debug!(?frame, "WebSocket close received");
                        None
                    }
                    Ok(_) => None,
                    Err(e) => Some(Err(DialogError::from(e))),
                })
            });

            Ok(TransportPair {
                sink: Box::pin(sink),
                stream: Box::pin(stream),
            })
        })
    }
}
