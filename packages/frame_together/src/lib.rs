//! FrameTogether session manager.
//!
//! Keeps one relay connection per process, tracks room membership and
//! routes playback state between local video observers and the relay:
//! only the host's reports go out, and `Sync` from the relay comes back as
//! apply-state commands for viewers.

pub mod bridge;
pub mod config;
pub mod error;
pub mod local;
pub mod protocol;
pub mod session;
pub mod store;
pub mod transport;
pub mod types;

#[cfg(test)]
mod test_helpers;

pub use error::{BridgeError, ConfigError, SessionError, StoreError, TransportError};
pub use session::SessionManager;
pub use types::{ApplyState, Status, SyncConfig, TabId, VideoState};
