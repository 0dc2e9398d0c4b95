use std::path::PathBuf;

/// Failures of the relay connection itself.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("failed to connect: {0}")]
    Connect(String),

    #[error("failed to send frame: {0}")]
    Send(String),

    #[error("failed to receive frame: {0}")]
    Receive(String),

    /// The peer closed the connection, optionally with a reason.
    #[error("connection closed{}", .0.as_deref().map(|r| format!(": {r}")).unwrap_or_default())]
    Closed(Option<String>),
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to access settings file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings: {0}")]
    Decode(#[from] toml::de::Error),

    #[error("failed to encode settings: {0}")]
    Encode(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid server URL {url:?}: {reason}")]
    InvalidServerUrl { url: String, reason: String },

    #[error("could not determine the home directory")]
    NoHomeDir,

    #[error("failed to create data directory {path:?}: {reason}")]
    DataDir { path: PathBuf, reason: String },
}

/// Errors surfaced by the `SessionManager` handle.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session manager is not running")]
    Stopped,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Reasons the local bridge stops.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("local channel I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Session(#[from] SessionError),
}
