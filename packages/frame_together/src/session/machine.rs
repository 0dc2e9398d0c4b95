//! I/O-free core of the session manager.
//!
//! `SessionMachine::handle` takes one `Input` (a local command, a link event
//! or a timer expiry) and returns the `Effect`s to carry out, in order. The
//! actor in `session::actor` owns the sockets, timers and store that those
//! effects touch.

use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{SessionTimings, sync_endpoint};
use crate::protocol::{ClientMessage, ServerMessage};
use crate::transport::{LinkEvent, LinkId, LinkUpdate};
use crate::types::{RoomSession, Status, SyncConfig, TabId, VideoState};

/// What a scheduled timer is for. At most one timer per purpose is pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    Heartbeat,
    Reconnect,
    /// `Join` sent shortly after the link opens or a room is created.
    DelayedJoin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Disconnected,
    Connecting,
    Connected,
    /// Link closed while a room is configured; a reconnect is scheduled.
    AwaitingReconnect,
}

impl std::fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::AwaitingReconnect => "awaiting_reconnect",
        };
        f.write_str(name)
    }
}

/// Commands from UI surfaces and video observers.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    CreateRoom,
    JoinRoom { room_id: String },
    LeaveRoom,
    SetServer { url: String },
    ReportVideoState { tab: TabId, state: VideoState },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Command(SessionCommand),
    Link(LinkUpdate),
    TimerFired(TimerKind),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Open a new link to `url`.
    Connect { link: LinkId, url: String },
    /// Close `link` without expecting a `Closed` event back.
    Close { link: LinkId },
    Send { link: LinkId, message: ClientMessage },
    /// Arm `timer`; replaces a pending timer of the same kind.
    Schedule { timer: TimerKind, after: Duration },
    Cancel { timer: TimerKind },
    PublishStatus(Status),
    ApplyState { tab: TabId, state: VideoState },
    PersistServerUrl(String),
}

pub struct SessionMachine {
    timings: SessionTimings,
    config: Option<SyncConfig>,
    phase: ConnectionPhase,
    /// The link currently connecting or open. Events from any other link are stale.
    link: Option<LinkId>,
    last_link: u64,
    pending_timers: HashSet<TimerKind>,
    /// A `Create` waiting for the link to open.
    pending_create: bool,
    /// Tab of the observer that last reported state; receives `Sync`.
    active_tab: Option<TabId>,
}

impl SessionMachine {
    pub fn new(timings: SessionTimings, server_url: Option<String>) -> Self {
        Self {
            timings,
            config: server_url.map(SyncConfig::new),
            phase: ConnectionPhase::Disconnected,
            link: None,
            last_link: 0,
            pending_timers: HashSet::new(),
            pending_create: false,
            active_tab: None,
        }
    }

    pub fn handle(&mut self, input: Input) -> Vec<Effect> {
        let mut effects = Vec::new();
        match input {
            Input::Command(command) => self.on_command(command, &mut effects),
            Input::Link(update) => self.on_link(update, &mut effects),
            Input::TimerFired(timer) => self.on_timer(timer, &mut effects),
        }
        effects
    }

    /// `{connected, config}` snapshot for UI surfaces.
    pub fn status(&self) -> Status {
        Status {
            connected: self.is_open(),
            config: self.config.clone(),
        }
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    pub fn config(&self) -> Option<&SyncConfig> {
        self.config.as_ref()
    }

    pub fn link(&self) -> Option<LinkId> {
        self.link
    }

    pub fn is_open(&self) -> bool {
        self.phase == ConnectionPhase::Connected
    }

    pub fn is_pending(&self, timer: TimerKind) -> bool {
        self.pending_timers.contains(&timer)
    }

    /// Teardown: cancel every timer and close the link. Config is kept.
    pub fn shutdown(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        for timer in [TimerKind::Reconnect, TimerKind::Heartbeat, TimerKind::DelayedJoin] {
            self.cancel(timer, &mut effects);
        }
        if let Some(link) = self.link.take() {
            effects.push(Effect::Close { link });
        }
        self.pending_create = false;
        self.phase = ConnectionPhase::Disconnected;
        effects
    }

    // ── commands ────────────────────────────────────────────────────────

    fn on_command(&mut self, command: SessionCommand, effects: &mut Vec<Effect>) {
        match command {
            SessionCommand::CreateRoom => self.create_room(effects),
            SessionCommand::JoinRoom { room_id } => self.join_room(room_id, effects),
            SessionCommand::LeaveRoom => self.disconnect(effects),
            SessionCommand::SetServer { url } => {
                info!(%url, "switching relay server");
                self.config = Some(SyncConfig::new(url.clone()));
                effects.push(Effect::PersistServerUrl(url));
                self.disconnect(effects);
            }
            SessionCommand::ReportVideoState { tab, state } => {
                self.active_tab = Some(tab);
                let is_host = self.config.as_ref().is_some_and(SyncConfig::is_host);
                match self.open_link() {
                    Some(link) if is_host => effects.push(Effect::Send {
                        link,
                        message: ClientMessage::state(state),
                    }),
                    _ => {}
                }
            }
        }
    }

    fn create_room(&mut self, effects: &mut Vec<Effect>) {
        if let Some(link) = self.open_link() {
            effects.push(Effect::Send {
                link,
                message: ClientMessage::Create,
            });
            return;
        }
        if self.config.is_none() {
            warn!("create room ignored: no server configured");
            return;
        }

        self.pending_create = true;
        self.connect(effects);
        if self.link.is_none() {
            self.drop_pending_create("connection could not be started");
        }
    }

    fn join_room(&mut self, room_id: String, effects: &mut Vec<Effect>) {
        let Some(config) = self.config.as_mut() else {
            warn!(%room_id, "join room ignored: no server configured");
            return;
        };
        config.room = Some(RoomSession::pending(room_id.clone()));
        self.publish(effects);

        match self.open_link() {
            Some(link) => {
                self.cancel(TimerKind::DelayedJoin, effects);
                effects.push(Effect::Send {
                    link,
                    message: ClientMessage::join(room_id),
                });
            }
            // The open handler joins the configured room.
            None => self.connect(effects),
        }
    }

    // ── connection lifecycle ────────────────────────────────────────────

    fn connect(&mut self, effects: &mut Vec<Effect>) {
        let Some(config) = &self.config else {
            debug!("connect skipped: no server configured");
            return;
        };
        if let Some(link) = self.link {
            debug!(%link, phase = %self.phase, "connect skipped: link already active");
            return;
        }

        let url = match sync_endpoint(&config.server_url) {
            Ok(url) => url,
            Err(e) => {
                warn!(error = %e, "cannot build relay endpoint");
                self.phase = ConnectionPhase::Disconnected;
                return;
            }
        };

        self.cancel(TimerKind::Reconnect, effects);
        self.last_link += 1;
        let link = LinkId(self.last_link);
        info!(%link, %url, "connecting to relay");
        self.link = Some(link);
        self.phase = ConnectionPhase::Connecting;
        effects.push(Effect::Connect { link, url });
    }

    /// The single intentional end of a room session.
    fn disconnect(&mut self, effects: &mut Vec<Effect>) {
        self.cancel(TimerKind::Reconnect, effects);
        self.cancel(TimerKind::Heartbeat, effects);
        self.cancel(TimerKind::DelayedJoin, effects);
        if let Some(link) = self.link.take() {
            debug!(%link, "closing relay link");
            effects.push(Effect::Close { link });
        }
        self.drop_pending_create("disconnected");
        self.phase = ConnectionPhase::Disconnected;
        if let Some(config) = self.config.as_mut() {
            config.room = None;
        }
        self.publish(effects);
    }

    fn on_link(&mut self, update: LinkUpdate, effects: &mut Vec<Effect>) {
        if self.link != Some(update.link) {
            debug!(link = %update.link, "ignoring event from stale link");
            return;
        }
        match update.event {
            LinkEvent::Opened => self.on_opened(update.link, effects),
            LinkEvent::Frame(text) => self.on_frame(&text, effects),
            LinkEvent::Closed { reason } => self.on_closed(update.link, reason, effects),
        }
    }

    fn on_opened(&mut self, link: LinkId, effects: &mut Vec<Effect>) {
        if self.phase != ConnectionPhase::Connecting {
            debug!(%link, phase = %self.phase, "duplicate open ignored");
            return;
        }
        info!(%link, "connected to relay");
        self.phase = ConnectionPhase::Connected;
        self.publish(effects);
        self.schedule(TimerKind::Heartbeat, self.timings.heartbeat_interval, effects);
        if self.room_id().is_some() {
            self.schedule(TimerKind::DelayedJoin, self.timings.join_delay, effects);
        }
        if self.pending_create {
            self.pending_create = false;
            effects.push(Effect::Send {
                link,
                message: ClientMessage::Create,
            });
        }
    }

    fn on_closed(&mut self, link: LinkId, reason: Option<String>, effects: &mut Vec<Effect>) {
        info!(
            %link,
            reason = reason.as_deref().unwrap_or("none"),
            "relay link closed"
        );
        self.link = None;
        self.cancel(TimerKind::Heartbeat, effects);
        self.cancel(TimerKind::DelayedJoin, effects);
        self.drop_pending_create("link closed before opening");
        self.phase = ConnectionPhase::Disconnected;
        self.publish(effects);

        if let Some(room_id) = self.room_id() {
            if !self.is_pending(TimerKind::Reconnect) {
                info!(%room_id, delay = ?self.timings.reconnect_delay, "scheduling reconnect");
                self.schedule(TimerKind::Reconnect, self.timings.reconnect_delay, effects);
            }
            self.phase = ConnectionPhase::AwaitingReconnect;
        }
    }

    // ── wire dispatch ───────────────────────────────────────────────────

    fn on_frame(&mut self, text: &str, effects: &mut Vec<Effect>) {
        let message = match ServerMessage::from_frame(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, frame = %text, "dropping malformed relay frame");
                return;
            }
        };

        match message {
            ServerMessage::RoomCreated { room_id } => {
                let Some(config) = self.config.as_mut() else {
                    return;
                };
                info!(%room_id, "room created");
                config.room = Some(RoomSession::pending(room_id));
                self.publish(effects);
                if self.is_open() {
                    self.schedule(TimerKind::DelayedJoin, self.timings.join_delay, effects);
                }
            }
            ServerMessage::RoomJoined {
                room_id,
                is_host,
                your_name,
            } => {
                if let Some(config) = self.config.as_mut() {
                    info!(%room_id, is_host, user_name = %your_name, "joined room");
                    config.room = Some(RoomSession::joined(room_id, is_host, your_name));
                }
                self.publish(effects);
            }
            ServerMessage::Sync { time, paused } => {
                let is_host = self.config.as_ref().is_some_and(SyncConfig::is_host);
                match self.active_tab {
                    Some(tab) if !is_host => effects.push(Effect::ApplyState {
                        tab,
                        state: VideoState::new(time, paused),
                    }),
                    Some(_) => debug!("host ignores sync"),
                    None => debug!("sync dropped: no video tab known"),
                }
            }
            ServerMessage::Error { message } => {
                warn!(%message, "relay reported an error");
                self.publish(effects);
            }
            ServerMessage::Unknown => debug!(frame = %text, "ignoring unknown message type"),
        }
    }

    // ── timers ──────────────────────────────────────────────────────────

    fn on_timer(&mut self, timer: TimerKind, effects: &mut Vec<Effect>) {
        if !self.pending_timers.remove(&timer) {
            debug!(?timer, "ignoring expiry of cancelled timer");
            return;
        }
        match timer {
            TimerKind::Heartbeat => {
                if let Some(link) = self.open_link() {
                    effects.push(Effect::Send {
                        link,
                        message: ClientMessage::Heartbeat,
                    });
                    self.schedule(TimerKind::Heartbeat, self.timings.heartbeat_interval, effects);
                }
            }
            TimerKind::Reconnect => {
                debug!("reconnect timer fired");
                self.connect(effects);
            }
            TimerKind::DelayedJoin => {
                if let (Some(link), Some(room_id)) = (self.open_link(), self.room_id()) {
                    effects.push(Effect::Send {
                        link,
                        message: ClientMessage::join(room_id),
                    });
                }
            }
        }
    }

    // ── helpers ─────────────────────────────────────────────────────────

    fn schedule(&mut self, timer: TimerKind, after: Duration, effects: &mut Vec<Effect>) {
        if !self.pending_timers.insert(timer) {
            effects.push(Effect::Cancel { timer });
        }
        effects.push(Effect::Schedule { timer, after });
    }

    fn cancel(&mut self, timer: TimerKind, effects: &mut Vec<Effect>) {
        if self.pending_timers.remove(&timer) {
            effects.push(Effect::Cancel { timer });
        }
    }

    fn publish(&self, effects: &mut Vec<Effect>) {
        effects.push(Effect::PublishStatus(self.status()));
    }

    fn open_link(&self) -> Option<LinkId> {
        self.link.filter(|_| self.is_open())
    }

    fn room_id(&self) -> Option<String> {
        self.config
            .as_ref()
            .and_then(|config| config.room_id())
            .map(str::to_string)
    }

    fn drop_pending_create(&mut self, why: &str) {
        if std::mem::take(&mut self.pending_create) {
            warn!(reason = why, "pending create room request dropped");
        }
    }
}
