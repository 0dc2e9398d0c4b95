//! Local message types exchanged with UI surfaces and video observers.
//!
//! Tags are SCREAMING_SNAKE_CASE and fields camelCase, e.g.
//! `{"type":"JOIN_ROOM","roomId":"ABC123"}`.

use serde::{Deserialize, Serialize};

use crate::types::{ApplyState, Status, SyncConfig, TabId, VideoState};

/// Requests into the session manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum LocalRequest {
    CreateRoom,
    JoinRoom { room_id: String },
    LeaveRoom,
    /// Answered with `STATUS` to the requester only.
    GetStatus,
    SetServer { url: String },
    /// Playback report from the observer in `tab_id`.
    VideoState { tab_id: TabId, state: VideoState },
    /// Readiness probe, answered with `ACK`.
    Test,
}

/// Events out of the session manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum LocalEvent {
    Status {
        connected: bool,
        config: Option<SyncConfig>,
    },
    ConnectionStatus {
        connected: bool,
        config: Option<SyncConfig>,
    },
    ApplyState {
        tab_id: TabId,
        state: VideoState,
    },
    Ack {
        status: String,
    },
    Error {
        message: String,
    },
}

impl LocalEvent {
    pub fn status_reply(status: Status) -> Self {
        Self::Status {
            connected: status.connected,
            config: status.config,
        }
    }

    pub fn connection_status(status: Status) -> Self {
        Self::ConnectionStatus {
            connected: status.connected,
            config: status.config,
        }
    }

    pub fn apply(apply: ApplyState) -> Self {
        Self::ApplyState {
            tab_id: apply.tab,
            state: apply.state,
        }
    }

    pub fn ack() -> Self {
        Self::Ack {
            status: "ok".to_string(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}
