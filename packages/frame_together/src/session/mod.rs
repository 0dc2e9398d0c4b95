//! Session manager: relay connection, room state, heartbeat and reconnection.
//!
//! - `machine`: pure state machine (inputs in, effects out)
//! - `timers`: one deadline per timer purpose
//! - `actor`: event loop that owns the link, timers and store
//!
//! `SessionManager` is the cloneable handle UI surfaces and observers talk to.

mod actor;
pub mod machine;
pub mod timers;

use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::warn;

use crate::config::SessionTimings;
use crate::error::SessionError;
use crate::store::SettingsStore;
use crate::transport::Connector;
use crate::types::{ApplyState, Status, TabId, VideoState};
use actor::{SessionActor, SessionMessage};

pub use machine::{ConnectionPhase, SessionCommand, SessionMachine, TimerKind};

const COMMAND_CAPACITY: usize = 64;
const FEED_CAPACITY: usize = 64;

/// Handle to the running session manager.
#[derive(Clone)]
pub struct SessionManager {
    sender: mpsc::Sender<SessionMessage>,
    status_tx: broadcast::Sender<Status>,
    apply_tx: broadcast::Sender<ApplyState>,
}

impl SessionManager {
    /// Load the persisted server URL and spawn the session actor.
    ///
    /// A store that fails to load is logged and treated as empty.
    pub fn start(
        store: impl SettingsStore,
        connector: Arc<dyn Connector>,
        timings: SessionTimings,
    ) -> Self {
        let server_url = match store.load() {
            Ok(settings) => settings.server_url.filter(|url| !url.is_empty()),
            Err(e) => {
                warn!(error = %e, "failed to load settings, starting unconfigured");
                None
            }
        };

        let (msg_tx, msg_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (status_tx, _) = broadcast::channel(FEED_CAPACITY);
        let (apply_tx, _) = broadcast::channel(FEED_CAPACITY);

        let actor = SessionActor::new(
            SessionMachine::new(timings, server_url),
            connector,
            Box::new(store),
            msg_rx,
            status_tx.clone(),
            apply_tx.clone(),
        );
        tokio::spawn(actor.run());

        Self {
            sender: msg_tx,
            status_tx,
            apply_tx,
        }
    }

    pub async fn create_room(&self) -> Result<(), SessionError> {
        self.command(SessionCommand::CreateRoom).await
    }

    pub async fn join_room(&self, room_id: impl Into<String>) -> Result<(), SessionError> {
        self.command(SessionCommand::JoinRoom {
            room_id: room_id.into(),
        })
        .await
    }

    pub async fn leave_room(&self) -> Result<(), SessionError> {
        self.command(SessionCommand::LeaveRoom).await
    }

    /// Switch relays: persist `url`, then drop any session on the old one.
    ///
    /// A persistence failure is returned, but the switch still takes effect
    /// in memory.
    pub async fn set_server(&self, url: impl Into<String>) -> Result<(), SessionError> {
        self.command(SessionCommand::SetServer { url: url.into() })
            .await
    }

    /// Video-state report from the observer in `tab`.
    pub async fn report_video_state(
        &self,
        tab: TabId,
        state: VideoState,
    ) -> Result<(), SessionError> {
        self.command(SessionCommand::ReportVideoState { tab, state })
            .await
    }

    /// Current `{connected, config}`, answered to this caller only.
    pub async fn get_status(&self) -> Result<Status, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SessionMessage::GetStatus { respond_to: tx })
            .await
            .map_err(|_| SessionError::Stopped)?;
        rx.await.map_err(|_| SessionError::Stopped)
    }

    /// Status broadcasts, one per connection or room change.
    pub fn subscribe_status(&self) -> broadcast::Receiver<Status> {
        self.status_tx.subscribe()
    }

    /// Apply-state commands for video observers.
    pub fn subscribe_apply(&self) -> broadcast::Receiver<ApplyState> {
        self.apply_tx.subscribe()
    }

    /// Cancel all timers, close the link and stop the actor. Later calls on
    /// any clone of this handle return `SessionError::Stopped`.
    pub async fn shutdown(&self) -> Result<(), SessionError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SessionMessage::Shutdown { respond_to: tx })
            .await
            .map_err(|_| SessionError::Stopped)?;
        rx.await.map_err(|_| SessionError::Stopped)
    }

    async fn command(&self, command: SessionCommand) -> Result<(), SessionError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SessionMessage::Command {
                command,
                respond_to: tx,
            })
            .await
            .map_err(|_| SessionError::Stopped)?;
        rx.await.map_err(|_| SessionError::Stopped)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::protocol::{ClientMessage, ServerMessage};
    use crate::store::{MemorySettingsStore, Settings};
    use crate::test_helpers::{MockConnector, MockPeer};
    use std::time::Duration;
    use tokio::time::Instant;

    const OLD: &str = "wss://old.example";

    fn start(
        store: MemorySettingsStore,
    ) -> (
        SessionManager,
        Arc<MockConnector>,
        mpsc::UnboundedReceiver<MockPeer>,
    ) {
        let (connector, peers) = MockConnector::new();
        let manager = SessionManager::start(store, connector.clone(), SessionTimings::default());
        (manager, connector, peers)
    }

    /// Wait for the next status broadcast matching `pred`.
    async fn wait_status(
        rx: &mut broadcast::Receiver<Status>,
        pred: impl Fn(&Status) -> bool,
    ) -> Status {
        loop {
            let status = rx.recv().await.unwrap();
            if pred(&status) {
                return status;
            }
        }
    }

    /// Join `room_id`, accept the connection and consume the delayed `Join`.
    async fn join_and_open(
        manager: &SessionManager,
        peers: &mut mpsc::UnboundedReceiver<MockPeer>,
        room_id: &str,
    ) -> MockPeer {
        manager.join_room(room_id).await.unwrap();
        let mut peer = peers.recv().await.unwrap();
        assert_eq!(peer.next_message().await, Some(ClientMessage::join(room_id)));
        peer
    }

    #[tokio::test(start_paused = true)]
    async fn test_guest_receives_sync_as_apply_command() {
        let (manager, _connector, mut peers) = start(MemorySettingsStore::with_server_url(OLD));
        let mut apply = manager.subscribe_apply();
        let mut status = manager.subscribe_status();

        let mut peer = join_and_open(&manager, &mut peers, "ABC123").await;
        assert_eq!(peer.url, "wss://old.example/sync");

        manager
            .report_video_state(TabId(4), VideoState::new(3.0, false))
            .await
            .unwrap();

        peer.send(&ServerMessage::RoomJoined {
            room_id: "ABC123".into(),
            is_host: false,
            your_name: "Guest1".into(),
        });
        let joined = wait_status(&mut status, |s| {
            s.config.as_ref().and_then(|c| c.user_name()) == Some("Guest1")
        })
        .await;
        assert!(joined.connected);
        assert!(!joined.config.unwrap().is_host());

        peer.send(&ServerMessage::Sync {
            time: 42.0,
            paused: true,
        });
        assert_eq!(
            apply.recv().await.unwrap(),
            ApplyState {
                tab: TabId(4),
                state: VideoState::new(42.0, true),
            }
        );

        // A guest's own reports never reach the wire.
        manager
            .report_video_state(TabId(4), VideoState::new(42.0, true))
            .await
            .unwrap();
        manager.get_status().await.unwrap();
        assert!(
            peer.drain_messages()
                .iter()
                .all(|m| !matches!(m, ClientMessage::State { .. }))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_host_reports_go_out_as_state() {
        let (manager, _connector, mut peers) = start(MemorySettingsStore::with_server_url(OLD));
        let mut status = manager.subscribe_status();
        let mut peer = join_and_open(&manager, &mut peers, "ABC123").await;

        peer.send(&ServerMessage::RoomJoined {
            room_id: "ABC123".into(),
            is_host: true,
            your_name: "Host".into(),
        });
        wait_status(&mut status, |s| s.config.as_ref().is_some_and(|c| c.is_host())).await;

        manager
            .report_video_state(TabId(1), VideoState::new(10.0, false))
            .await
            .unwrap();
        let frame = peer.next_frame().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(
            value,
            serde_json::json!({ "type": "State", "time": 10.0, "paused": false })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_room_created_joins_after_delay() {
        let (manager, _connector, mut peers) = start(MemorySettingsStore::with_server_url(OLD));
        manager.create_room().await.unwrap();
        let mut peer = peers.recv().await.unwrap();
        assert_eq!(peer.next_message().await, Some(ClientMessage::Create));

        let sent_at = Instant::now();
        peer.send(&ServerMessage::RoomCreated {
            room_id: "XYZ789".into(),
        });
        assert_eq!(peer.next_message().await, Some(ClientMessage::join("XYZ789")));
        assert!(sent_at.elapsed() >= Duration::from_millis(100));

        let status = manager.get_status().await.unwrap();
        assert_eq!(status.config.unwrap().room_id(), Some("XYZ789"));

        // Exactly once: the next frame is a heartbeat, 15s after connect.
        assert_eq!(peer.next_message().await, Some(ClientMessage::Heartbeat));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_create_flushed_on_open() {
        let (manager, _connector, mut peers) = start(MemorySettingsStore::with_server_url(OLD));
        let started = Instant::now();
        manager.create_room().await.unwrap();
        let mut peer = peers.recv().await.unwrap();
        assert_eq!(peer.next_message().await, Some(ClientMessage::Create));
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_server_switches_relay() {
        let store = MemorySettingsStore::with_server_url(OLD);
        let (manager, _connector, mut peers) = start(store.clone());
        let mut old_peer = join_and_open(&manager, &mut peers, "ABC123").await;

        manager.set_server("wss://new.example").await.unwrap();
        assert_eq!(old_peer.next_frame().await, None);

        assert_eq!(
            store.snapshot(),
            Settings {
                server_url: Some("wss://new.example".into())
            }
        );
        let status = manager.get_status().await.unwrap();
        assert!(!status.connected);
        let config = status.config.unwrap();
        assert_eq!(config.server_url, "wss://new.example");
        assert!(config.room.is_none());

        manager.create_room().await.unwrap();
        let new_peer = peers.recv().await.unwrap();
        assert_eq!(new_peer.url, "wss://new.example/sync");
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnects_while_room_configured() {
        let (manager, connector, mut peers) = start(MemorySettingsStore::with_server_url(OLD));
        let peer = join_and_open(&manager, &mut peers, "ABC123").await;

        let closed_at = Instant::now();
        peer.disconnect();

        let mut peer = peers.recv().await.unwrap();
        assert!(closed_at.elapsed() >= Duration::from_secs(3));
        assert_eq!(connector.attempts(), 2);
        assert_eq!(peer.next_message().await, Some(ClientMessage::join("ABC123")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refused_reconnect_keeps_retrying() {
        let (manager, connector, mut peers) = start(MemorySettingsStore::with_server_url(OLD));
        let peer = join_and_open(&manager, &mut peers, "ABC123").await;

        connector.set_refusing(true);
        peer.disconnect();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(connector.attempts(), 4);

        connector.set_refusing(false);
        let mut peer = peers.recv().await.unwrap();
        assert_eq!(peer.next_message().await, Some(ClientMessage::join("ABC123")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_leave_stops_reconnecting() {
        let (manager, connector, mut peers) = start(MemorySettingsStore::with_server_url(OLD));
        let mut peer = join_and_open(&manager, &mut peers, "ABC123").await;

        manager.leave_room().await.unwrap();
        assert_eq!(peer.next_frame().await, None);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(connector.attempts(), 1);
        let status = manager.get_status().await.unwrap();
        assert_eq!(status.config.unwrap().room_id(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_every_interval() {
        let (manager, _connector, mut peers) = start(MemorySettingsStore::with_server_url(OLD));
        let mut peer = join_and_open(&manager, &mut peers, "ABC123").await;

        let start = Instant::now();
        assert_eq!(peer.next_message().await, Some(ClientMessage::Heartbeat));
        assert_eq!(peer.next_message().await, Some(ClientMessage::Heartbeat));
        assert!(start.elapsed() >= Duration::from_secs(29));
        drop(manager);
    }

    #[tokio::test]
    async fn test_get_status_is_idempotent() {
        let (manager, _connector, _peers) = start(MemorySettingsStore::with_server_url(OLD));
        let first = manager.get_status().await.unwrap();
        let second = manager.get_status().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(
            first,
            Status {
                connected: false,
                config: Some(crate::types::SyncConfig::new(OLD)),
            }
        );
    }

    #[tokio::test]
    async fn test_unconfigured_start_ignores_room_commands() {
        let (manager, connector, _peers) = start(MemorySettingsStore::new());
        manager.create_room().await.unwrap();
        manager.join_room("ABC123").await.unwrap();
        assert_eq!(connector.attempts(), 0);
        assert_eq!(manager.get_status().await.unwrap().config, None);
    }

    struct FailingStore;

    impl SettingsStore for FailingStore {
        fn load(&self) -> Result<Settings, StoreError> {
            Ok(Settings {
                server_url: Some(OLD.into()),
            })
        }

        fn save(&mut self, _settings: &Settings) -> Result<(), StoreError> {
            Err(StoreError::Io {
                path: "settings.toml".into(),
                source: std::io::Error::other("read-only"),
            })
        }
    }

    #[tokio::test]
    async fn test_set_server_reports_persist_failure_but_switches() {
        let (connector, _peers) = MockConnector::new();
        let manager = SessionManager::start(FailingStore, connector, SessionTimings::default());

        let result = manager.set_server("wss://new.example").await;
        assert!(matches!(result, Err(SessionError::Store(_))));

        let config = manager.get_status().await.unwrap().config.unwrap();
        assert_eq!(config.server_url, "wss://new.example");
    }

    #[tokio::test]
    async fn test_shutdown_stops_handles() {
        let (manager, _connector, mut peers) = start(MemorySettingsStore::with_server_url(OLD));
        manager.join_room("ABC123").await.unwrap();
        let mut peer = peers.recv().await.unwrap();

        let other = manager.clone();
        manager.shutdown().await.unwrap();

        assert!(matches!(other.get_status().await, Err(SessionError::Stopped)));
        // Drain until the link closes; a delayed join may or may not have fired.
        while peer.next_frame().await.is_some() {}
    }
}
