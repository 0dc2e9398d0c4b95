use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{Connector, LinkEvent, LinkId, LinkUpdate};
use crate::error::TransportError;

/// Owner's side of a running link task.
pub struct LinkHandle {
    link: LinkId,
    outbound: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
}

impl LinkHandle {
    pub fn id(&self) -> LinkId {
        self.link
    }

    /// Queue a text frame. Returns `false` if the link task has already ended.
    pub fn send(&self, frame: String) -> bool {
        self.outbound.send(frame).is_ok()
    }

    /// Close the connection. No `Closed` update is reported for a link closed
    /// this way.
    pub fn close(self) {
        self.cancel.cancel();
    }
}

/// Spawn a task that connects to `url` and shuttles frames until the
/// connection ends or the handle closes it.
pub fn spawn_link(
    link: LinkId,
    connector: Arc<dyn Connector>,
    url: String,
    events: mpsc::UnboundedSender<LinkUpdate>,
) -> LinkHandle {
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    tokio::spawn(drive(
        link,
        connector,
        url,
        outbound_rx,
        events,
        cancel.clone(),
    ));
    LinkHandle {
        link,
        outbound: outbound_tx,
        cancel,
    }
}

async fn drive(
    link: LinkId,
    connector: Arc<dyn Connector>,
    url: String,
    mut outbound: mpsc::UnboundedReceiver<String>,
    events: mpsc::UnboundedSender<LinkUpdate>,
    cancel: CancellationToken,
) {
    let connected = tokio::select! {
        _ = cancel.cancelled() => {
            debug!(%link, "connect abandoned");
            return;
        }
        result = connector.connect(&url) => result,
    };

    let (mut sink, mut stream) = match connected {
        Ok(halves) => halves,
        Err(e) => {
            warn!(%link, %url, error = %e, "relay connection failed");
            let _ = events.send(LinkUpdate::new(
                link,
                LinkEvent::Closed {
                    reason: Some(e.to_string()),
                },
            ));
            return;
        }
    };

    if events.send(LinkUpdate::new(link, LinkEvent::Opened)).is_err() {
        // Session actor is gone
        let _ = sink.close().await;
        return;
    }

    let reason = loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                if let Err(e) = sink.close().await {
                    debug!(%link, error = %e, "error while closing link");
                }
                debug!(%link, "link closed by owner");
                return;
            }
            frame = outbound.recv() => match frame {
                Some(text) => {
                    if let Err(e) = sink.send(text).await {
                        break Some(e.to_string());
                    }
                }
                None => {
                    // Handle dropped without an explicit close
                    let _ = sink.close().await;
                    return;
                }
            },
            inbound = stream.next() => match inbound {
                Some(Ok(text)) => {
                    if events.send(LinkUpdate::new(link, LinkEvent::Frame(text))).is_err() {
                        let _ = sink.close().await;
                        return;
                    }
                }
                Some(Err(TransportError::Closed(reason))) => break reason,
                Some(Err(e)) => break Some(e.to_string()),
                None => break None,
            },
        }
    };

    info!(%link, reason = reason.as_deref().unwrap_or("none"), "relay connection closed");
    let _ = events.send(LinkUpdate::new(link, LinkEvent::Closed { reason }));
}
