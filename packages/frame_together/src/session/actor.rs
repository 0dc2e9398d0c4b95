use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use super::machine::{Effect, Input, SessionCommand, SessionMachine};
use super::timers::Timers;
use crate::error::SessionError;
use crate::store::{Settings, SettingsStore};
use crate::transport::{Connector, LinkEvent, LinkHandle, LinkUpdate, spawn_link};
use crate::types::{ApplyState, Status};

/// Messages that can be sent to the session actor
pub(crate) enum SessionMessage {
    Command {
        command: SessionCommand,
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },
    GetStatus {
        respond_to: oneshot::Sender<Status>,
    },
    Shutdown {
        respond_to: oneshot::Sender<()>,
    },
}

/// Sole owner of the state machine, the relay link, the timers and the
/// settings store. Runs until shut down or until every handle is dropped.
pub(crate) struct SessionActor {
    machine: SessionMachine,
    connector: Arc<dyn Connector>,
    store: Box<dyn SettingsStore>,
    timers: Timers,
    link: Option<LinkHandle>,
    link_tx: mpsc::UnboundedSender<LinkUpdate>,
    link_rx: mpsc::UnboundedReceiver<LinkUpdate>,
    receiver: mpsc::Receiver<SessionMessage>,
    status_tx: broadcast::Sender<Status>,
    apply_tx: broadcast::Sender<ApplyState>,
}

impl SessionActor {
    pub(crate) fn new(
        machine: SessionMachine,
        connector: Arc<dyn Connector>,
        store: Box<dyn SettingsStore>,
        receiver: mpsc::Receiver<SessionMessage>,
        status_tx: broadcast::Sender<Status>,
        apply_tx: broadcast::Sender<ApplyState>,
    ) -> Self {
        let (link_tx, link_rx) = mpsc::unbounded_channel();
        Self {
            machine,
            connector,
            store,
            timers: Timers::new(),
            link: None,
            link_tx,
            link_rx,
            receiver,
            status_tx,
            apply_tx,
        }
    }

    pub(crate) async fn run(mut self) {
        info!(
            server_url = self
                .machine
                .config()
                .map(|c| c.server_url.as_str())
                .unwrap_or("<unset>"),
            "session manager started"
        );

        loop {
            tokio::select! {
                msg = self.receiver.recv() => match msg {
                    Some(SessionMessage::Command { command, respond_to }) => {
                        let result = self.dispatch(Input::Command(command));
                        let _ = respond_to.send(result);
                    }
                    Some(SessionMessage::GetStatus { respond_to }) => {
                        let _ = respond_to.send(self.machine.status());
                    }
                    Some(SessionMessage::Shutdown { respond_to }) => {
                        self.teardown();
                        let _ = respond_to.send(());
                        return;
                    }
                    None => {
                        debug!("all session handles dropped");
                        break;
                    }
                },
                Some(update) = self.link_rx.recv() => self.on_link_update(update),
                timer = self.timers.expired() => {
                    debug!(?timer, "timer expired");
                    let _ = self.dispatch(Input::TimerFired(timer));
                }
            }
        }

        self.teardown();
    }

    fn on_link_update(&mut self, update: LinkUpdate) {
        // The link task has already exited; release the handle without
        // cancelling so the machine sees the close.
        if matches!(update.event, LinkEvent::Closed { .. })
            && self.link.as_ref().is_some_and(|h| h.id() == update.link)
        {
            self.link = None;
        }
        let _ = self.dispatch(Input::Link(update));
    }

    /// Feed one input to the machine and carry out the resulting effects.
    /// Only persistence can fail; every other effect is best-effort.
    fn dispatch(&mut self, input: Input) -> Result<(), SessionError> {
        let effects = self.machine.handle(input);
        debug!(phase = %self.machine.phase(), effects = effects.len(), "input handled");
        self.execute(effects)
    }

    fn execute(&mut self, effects: Vec<Effect>) -> Result<(), SessionError> {
        let mut result = Ok(());
        for effect in effects {
            match effect {
                Effect::Connect { link, url } => {
                    if let Some(previous) = self.link.take() {
                        warn!(link = %previous.id(), "replacing link that was still active");
                        previous.close();
                    }
                    self.link = Some(spawn_link(
                        link,
                        Arc::clone(&self.connector),
                        url,
                        self.link_tx.clone(),
                    ));
                }
                Effect::Close { link } => match self.link.take() {
                    Some(handle) if handle.id() == link => handle.close(),
                    other => self.link = other,
                },
                Effect::Send { link, message } => {
                    let frame = match message.to_frame() {
                        Ok(frame) => frame,
                        Err(e) => {
                            warn!(error = %e, ?message, "failed to encode message");
                            continue;
                        }
                    };
                    match &self.link {
                        Some(handle) if handle.id() == link => {
                            if !handle.send(frame) {
                                debug!(%link, "send dropped: link task gone");
                            }
                        }
                        _ => debug!(%link, "send dropped: link no longer current"),
                    }
                }
                Effect::Schedule { timer, after } => self.timers.schedule(timer, after),
                Effect::Cancel { timer } => {
                    self.timers.cancel(timer);
                }
                Effect::PublishStatus(status) => {
                    // No subscribers is fine
                    let _ = self.status_tx.send(status);
                }
                Effect::ApplyState { tab, state } => {
                    let _ = self.apply_tx.send(ApplyState { tab, state });
                }
                Effect::PersistServerUrl(url) => {
                    let settings = Settings {
                        server_url: Some(url),
                    };
                    if let Err(e) = self.store.save(&settings) {
                        warn!(error = %e, "failed to persist server URL");
                        result = Err(SessionError::Store(e));
                    }
                }
            }
        }
        result
    }

    fn teardown(&mut self) {
        let effects = self.machine.shutdown();
        let _ = self.execute(effects);
        self.timers.cancel_all();
        info!("session manager stopped");
    }
}
