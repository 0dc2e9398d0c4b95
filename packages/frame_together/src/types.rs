//! Core data model shared by the session manager, the wire codec and the
//! local interface.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Playback position reported by (or applied to) a video observer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VideoState {
    /// Seconds from the start of the media.
    pub time: f64,
    pub paused: bool,
}

impl VideoState {
    pub fn new(time: f64, paused: bool) -> Self {
        Self { time, paused }
    }
}

/// Identifier of the browser tab hosting a video observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(pub u32);

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role and display name assigned by the relay once it confirms membership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Membership {
    pub is_host: bool,
    pub user_name: String,
}

/// An active room session. Created optimistically on join/create and
/// confirmed when the relay answers with `RoomJoined`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSession {
    pub room_id: String,
    pub membership: Option<Membership>,
}

impl RoomSession {
    /// A session the relay has not confirmed yet.
    pub fn pending(room_id: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
            membership: None,
        }
    }

    pub fn joined(room_id: impl Into<String>, is_host: bool, user_name: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
            membership: Some(Membership {
                is_host,
                user_name: user_name.into(),
            }),
        }
    }
}

/// Durable server URL plus the (in-memory only) room session.
///
/// Room id, host flag and user name live in a single `Option<RoomSession>`
/// so they are always cleared together. On the wire the config is the flat
/// `{serverUrl, roomId?, isHost?, userName?}` object the UI surfaces expect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "SyncConfigRepr", from = "SyncConfigRepr")]
pub struct SyncConfig {
    pub server_url: String,
    pub room: Option<RoomSession>,
}

impl SyncConfig {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            room: None,
        }
    }

    pub fn room_id(&self) -> Option<&str> {
        self.room.as_ref().map(|room| room.room_id.as_str())
    }

    /// `true` only once the relay has confirmed this client as host.
    pub fn is_host(&self) -> bool {
        self.membership().is_some_and(|m| m.is_host)
    }

    pub fn user_name(&self) -> Option<&str> {
        self.membership().map(|m| m.user_name.as_str())
    }

    fn membership(&self) -> Option<&Membership> {
        self.room.as_ref().and_then(|room| room.membership.as_ref())
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SyncConfigRepr {
    server_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    room_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    is_host: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user_name: Option<String>,
}

impl From<SyncConfig> for SyncConfigRepr {
    fn from(config: SyncConfig) -> Self {
        let (room_id, membership) = match config.room {
            Some(room) => (Some(room.room_id), room.membership),
            None => (None, None),
        };
        let (is_host, user_name) = match membership {
            Some(m) => (Some(m.is_host), Some(m.user_name)),
            None => (None, None),
        };
        Self {
            server_url: config.server_url,
            room_id,
            is_host,
            user_name,
        }
    }
}

impl From<SyncConfigRepr> for SyncConfig {
    fn from(repr: SyncConfigRepr) -> Self {
        // Role fields without a room id are meaningless and get dropped.
        let room = repr.room_id.map(|room_id| {
            let membership = match (repr.is_host, repr.user_name) {
                (Some(is_host), Some(user_name)) => Some(Membership { is_host, user_name }),
                _ => None,
            };
            RoomSession {
                room_id,
                membership,
            }
        });
        Self {
            server_url: repr.server_url,
            room,
        }
    }
}

/// Snapshot delivered to UI surfaces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    /// Whether the relay connection is open.
    pub connected: bool,
    /// `None` until a server URL has been configured.
    pub config: Option<SyncConfig>,
}

/// Command for the observer in `tab` to seek/play/pause to `state`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ApplyState {
    pub tab: TabId,
    pub state: VideoState,
}
