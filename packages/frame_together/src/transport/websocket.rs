//! Tokio-tungstenite WebSocket connector.

use futures::future::{self, BoxFuture};
use futures::{FutureExt, SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::debug;

use super::{Connector, FrameSink, FrameStream};
use crate::error::TransportError;

/// Connects with `tokio_tungstenite::connect_async`; `wss://` goes through rustls.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl Connector for WebSocketConnector {
    fn connect(
        &self,
        url: &str,
    ) -> BoxFuture<'static, Result<(FrameSink, FrameStream), TransportError>> {
        let url = url.to_string();
        async move {
            let (ws_stream, _response) = tokio_tungstenite::connect_async(url.as_str())
                .await
                .map_err(|e| TransportError::Connect(e.to_string()))?;
            debug!(%url, "websocket handshake complete");

            let (ws_write, ws_read) = ws_stream.split();

            let sink: FrameSink = Box::pin(
                ws_write
                    .with(|text: String| {
                        future::ready(Ok::<_, tungstenite::Error>(Message::Text(text.into())))
                    })
                    .sink_map_err(|e| TransportError::Send(e.to_string())),
            );

            let stream: FrameStream = ws_read
                .filter_map(|msg| future::ready(inbound_frame(msg)))
                .boxed();

            Ok((sink, stream))
        }
        .boxed()
    }
}

/// Map a tungstenite message to an inbound text frame. Binary and control
/// frames carry nothing for this protocol and are skipped.
fn inbound_frame(
    msg: Result<Message, tungstenite::Error>,
) -> Option<Result<String, TransportError>> {
    match msg {
        Ok(Message::Text(text)) => Some(Ok(text.to_string())),
        Ok(Message::Close(frame)) => Some(Err(TransportError::Closed(
            frame
                .map(|f| f.reason.to_string())
                .filter(|reason| !reason.is_empty()),
        ))),
        Ok(Message::Binary(_)) => {
            debug!("ignoring binary frame");
            None
        }
        Ok(_) => None,
        Err(tungstenite::Error::ConnectionClosed) => Some(Err(TransportError::Closed(None))),
        Err(e) => Some(Err(TransportError::Receive(e.to_string()))),
    }
}
