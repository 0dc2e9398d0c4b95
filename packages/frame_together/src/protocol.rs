//! Relay wire protocol
//!
//! Every frame is a single JSON object whose `type` field names the variant.

use serde::{Deserialize, Serialize};

use crate::types::VideoState;

/// Messages sent FROM this client TO the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Ask the relay to open a new room; answered with `RoomCreated`.
    Create,
    /// Join (or re-join after a reconnect) an existing room.
    Join { room_id: String },
    /// Authoritative playback state. Only ever sent by the host.
    State { time: f64, paused: bool },
    /// Keep-alive.
    Heartbeat,
}

impl ClientMessage {
    pub fn join(room_id: impl Into<String>) -> Self {
        Self::Join {
            room_id: room_id.into(),
        }
    }

    pub fn state(state: VideoState) -> Self {
        Self::State {
            time: state.time,
            paused: state.paused,
        }
    }

    pub fn to_frame(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Messages sent FROM the relay TO this client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    RoomCreated {
        room_id: String,
    },
    RoomJoined {
        room_id: String,
        is_host: bool,
        your_name: String,
    },
    /// Host playback state relayed to viewers.
    Sync {
        time: f64,
        paused: bool,
    },
    Error {
        message: String,
    },
    /// Any `type` this client does not know about.
    #[serde(other)]
    Unknown,
}

impl ServerMessage {
    pub fn from_frame(frame: &str) -> serde_json::Result<Self> {
        serde_json::from_str(frame)
    }
}
