//! Newline-delimited JSON bridge between local clients and the session
//! manager. One `LocalRequest` per input line, one `LocalEvent` per output
//! line.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast;
use tracing::{debug, error, warn};

use crate::config::validate_server_url;
use crate::error::{BridgeError, SessionError};
use crate::local::{LocalEvent, LocalRequest};
use crate::session::SessionManager;

/// Serve requests from `reader` and forward status and apply-state feeds to
/// `writer` until the reader hits EOF or the manager stops.
pub async fn run_bridge<R, W>(
    manager: SessionManager,
    reader: R,
    mut writer: W,
) -> Result<(), BridgeError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    let mut status_rx = manager.subscribe_status();
    let mut apply_rx = manager.subscribe_apply();

    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => {
                    if let Some(reply) = handle_line(&manager, &line).await? {
                        write_event(&mut writer, &reply).await?;
                    }
                }
                None => {
                    debug!("local input closed");
                    break;
                }
            },
            status = status_rx.recv() => match status {
                Ok(status) => {
                    write_event(&mut writer, &LocalEvent::connection_status(status)).await?;
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("status feed lagged by {} messages", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            apply = apply_rx.recv() => match apply {
                Ok(apply) => write_event(&mut writer, &LocalEvent::apply(apply)).await?,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("apply feed lagged by {} messages", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    writer.flush().await?;
    Ok(())
}

/// Handle one input line. `Ok(None)` means nothing to answer; a stopped
/// manager ends the bridge.
async fn handle_line(
    manager: &SessionManager,
    line: &str,
) -> Result<Option<LocalEvent>, SessionError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let request = match serde_json::from_str::<LocalRequest>(line) {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "malformed local request");
            return Ok(Some(LocalEvent::error(format!("malformed request: {e}"))));
        }
    };
    debug!(?request, "local request");

    let outcome = match request {
        LocalRequest::CreateRoom => manager.create_room().await,
        LocalRequest::JoinRoom { room_id } => {
            let room_id = room_id.trim();
            if room_id.is_empty() {
                return Ok(Some(LocalEvent::error("room id must not be empty")));
            }
            manager.join_room(room_id).await
        }
        LocalRequest::LeaveRoom => manager.leave_room().await,
        LocalRequest::GetStatus => {
            let status = manager.get_status().await?;
            return Ok(Some(LocalEvent::status_reply(status)));
        }
        LocalRequest::SetServer { url } => match validate_server_url(&url) {
            Ok(url) => manager.set_server(url).await,
            Err(e) => return Ok(Some(LocalEvent::error(e.to_string()))),
        },
        LocalRequest::VideoState { tab_id, state } => {
            manager.report_video_state(tab_id, state).await
        }
        LocalRequest::Test => return Ok(Some(LocalEvent::ack())),
    };

    match outcome {
        Ok(()) => Ok(None),
        Err(SessionError::Stopped) => Err(SessionError::Stopped),
        Err(e) => Ok(Some(LocalEvent::error(e.to_string()))),
    }
}

async fn write_event<W: AsyncWrite + Unpin>(
    writer: &mut W,
    event: &LocalEvent,
) -> Result<(), std::io::Error> {
    let mut json = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to serialize local event: {}", e);
            return Ok(());
        }
    };
    json.push('\n');
    writer.write_all(json.as_bytes()).await?;
    writer.flush().await
}
