//! Relay transport.
//!
//! - `Connector`: seam between the session actor and the network
//! - `websocket`: tokio-tungstenite implementation of `Connector`
//! - `link`: per-connection driver task feeding `LinkUpdate`s to the actor

mod link;
pub mod websocket;

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::Sink;
use std::fmt;
use std::pin::Pin;

use crate::error::TransportError;

pub use link::{LinkHandle, spawn_link};
pub use websocket::WebSocketConnector;

/// Outbound half of an open connection; accepts text frames.
pub type FrameSink = Pin<Box<dyn Sink<String, Error = TransportError> + Send>>;

/// Inbound half of an open connection; yields text frames. A peer close is
/// reported as `TransportError::Closed` or as the end of the stream.
pub type FrameStream = BoxStream<'static, Result<String, TransportError>>;

/// Opens connections to the relay.
pub trait Connector: Send + Sync + 'static {
    fn connect(
        &self,
        url: &str,
    ) -> BoxFuture<'static, Result<(FrameSink, FrameStream), TransportError>>;
}

/// Identifies one connection attempt. Never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId(pub u64);

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Opened,
    Frame(String),
    /// The connection ended, or never opened.
    Closed { reason: Option<String> },
}

/// A `LinkEvent` tagged with the link it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkUpdate {
    pub link: LinkId,
    pub event: LinkEvent,
}

impl LinkUpdate {
    pub fn new(link: LinkId, event: LinkEvent) -> Self {
        Self { link, event }
    }
}
