use futures::FutureExt;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::transport::{Connector, FrameSink, FrameStream};

/// Channel-backed `Connector`. Every successful connect hands the test a
/// `MockPeer` standing in for the relay end of that connection.
pub struct MockConnector {
    peers: mpsc::UnboundedSender<MockPeer>,
    refusing: AtomicBool,
    attempts: AtomicUsize,
}

impl MockConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<MockPeer>) {
        let (peers, accepted) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            peers,
            refusing: AtomicBool::new(false),
            attempts: AtomicUsize::new(0),
        });
        (connector, accepted)
    }

    /// Make subsequent connects fail as if the relay were unreachable.
    pub fn set_refusing(&self, refusing: bool) {
        self.refusing.store(refusing, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Connector for MockConnector {
    fn connect(
        &self,
        url: &str,
    ) -> BoxFuture<'static, Result<(FrameSink, FrameStream), TransportError>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.refusing.load(Ordering::SeqCst) {
            return futures::future::ready(Err(TransportError::Connect(
                "connection refused".into(),
            )))
            .boxed();
        }

        let (to_client, from_peer) = mpsc::unbounded_channel::<Result<String, TransportError>>();
        let (to_peer, from_client) = mpsc::unbounded_channel::<String>();

        let sink: FrameSink = Box::pin(futures::sink::unfold(
            to_peer,
            |to_peer, frame: String| async move {
                to_peer
                    .send(frame)
                    .map_err(|_| TransportError::Send("peer went away".into()))?;
                Ok::<_, TransportError>(to_peer)
            },
        ));
        let stream: FrameStream = Box::pin(futures::stream::unfold(
            from_peer,
            |mut from_peer| async move { from_peer.recv().await.map(|item| (item, from_peer)) },
        ));

        let _ = self.peers.send(MockPeer {
            url: url.to_string(),
            to_client,
            from_client,
        });
        futures::future::ready(Ok((sink, stream))).boxed()
    }
}

/// The relay side of one mock connection.
pub struct MockPeer {
    pub url: String,
    to_client: mpsc::UnboundedSender<Result<String, TransportError>>,
    from_client: mpsc::UnboundedReceiver<String>,
}

impl MockPeer {
    pub fn send(&self, message: &ServerMessage) {
        let frame = serde_json::to_string(message).expect("serialize server message");
        self.send_raw(&frame);
    }

    pub fn send_raw(&self, frame: &str) {
        let _ = self.to_client.send(Ok(frame.to_string()));
    }

    /// Next raw frame from the client, `None` once the client closed.
    pub async fn next_frame(&mut self) -> Option<String> {
        self.from_client.recv().await
    }

    pub async fn next_message(&mut self) -> Option<ClientMessage> {
        let frame = self.next_frame().await?;
        Some(serde_json::from_str(&frame).expect("client sent malformed frame"))
    }

    /// Frames already sent by the client, without waiting.
    pub fn drain_messages(&mut self) -> Vec<ClientMessage> {
        let mut messages = Vec::new();
        while let Ok(frame) = self.from_client.try_recv() {
            messages.push(serde_json::from_str(&frame).expect("client sent malformed frame"));
        }
        messages
    }

    /// Close from the relay side.
    pub fn disconnect(self) {
        drop(self);
    }

    /// Close with a close frame carrying `reason`.
    pub fn close_with(self, reason: &str) {
        let _ = self
            .to_client
            .send(Err(TransportError::Closed(Some(reason.to_string()))));
    }
}
