// Connection manager: one task owns the WebSocket and the session.
// Frames, dispatch requests, the reconnect timer and shutdown are all handled in a
// single select loop, so session state is never touched concurrently.

use crate::session::{Session, SessionConfig, SessionEvent};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::Instrument;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("connection task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// A command the UI asked to send.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub command: String,
    pub container_id: String,
    pub was_running: bool,
    /// Wall-clock time of the dispatch call; becomes the pending command's start.
    pub requested_at_ms: u64,
}

pub struct ConnectionConfig {
    pub url: String,
    pub session: SessionConfig,
    /// Capacity of the observer event channel (slow observers lag and skip events).
    pub event_capacity: usize,
    /// Capacity of the dispatch request queue into the connection task.
    pub command_capacity: usize,
}

/// Owner's side of a running connection. Dropping it tears the session down.
pub struct ConnectionHandle {
    events_tx: broadcast::Sender<SessionEvent>,
    command_tx: mpsc::Sender<DispatchRequest>,
    shutdown_tx: oneshot::Sender<()>,
    task: tokio::task::JoinHandle<Session>,
}

impl ConnectionHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events_tx.subscribe()
    }

    /// Ask the connection task to send `command` for `container_id`. The task drops
    /// it unless the socket is open when the request is taken off the queue;
    /// requests made while connecting are never flushed on open. Returns false only
    /// when the request queue is full or the task is gone.
    pub fn dispatch(
        &self,
        command: impl Into<String>,
        container_id: impl Into<String>,
        was_running: bool,
    ) -> bool {
        let request = DispatchRequest {
            command: command.into(),
            container_id: container_id.into(),
            was_running,
            requested_at_ms: now_ms(),
        };
        match self.command_tx.try_send(request) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, operation = "dispatch", "dispatch request not queued");
                false
            }
        }
    }

    /// Close the socket, cancel any pending reconnect and return the final session.
    pub async fn shutdown(self) -> Result<Session, ConnectionError> {
        let _ = self.shutdown_tx.send(());
        Ok(self.task.await?)
    }
}

/// Start the connection task. The returned receiver is subscribed before the task
/// runs, so it sees the initial `Connecting` status.
pub fn spawn(config: ConnectionConfig) -> (ConnectionHandle, broadcast::Receiver<SessionEvent>) {
    let (events_tx, events_rx) = broadcast::channel(config.event_capacity.max(1));
    let (command_tx, command_rx) = mpsc::channel(config.command_capacity.max(1));
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    let session = Session::new(&config.session);
    let span = tracing::span!(tracing::Level::DEBUG, "connection", url = %config.url);
    let task = tokio::spawn(
        run(
            session,
            config.url,
            events_tx.clone(),
            command_rx,
            shutdown_rx,
        )
        .instrument(span),
    );

    (
        ConnectionHandle {
            events_tx,
            command_tx,
            shutdown_tx,
            task,
        },
        events_rx,
    )
}

enum SessionEnd {
    Closed,
    Shutdown,
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, operation = "get_timestamp", "system time error");
            0
        })
}

fn publish(events_tx: &broadcast::Sender<SessionEvent>, event: SessionEvent) {
    // No observers is fine; the session keeps its own state.
    let _ = events_tx.send(event);
}

async fn run(
    mut session: Session,
    url: String,
    events_tx: broadcast::Sender<SessionEvent>,
    mut command_rx: mpsc::Receiver<DispatchRequest>,
    mut shutdown_rx: oneshot::Receiver<()>,
) -> Session {
    publish(&events_tx, SessionEvent::Status(session.status()));

    'session: loop {
        tracing::debug!("connecting");
        let connect = connect_async(url.as_str());
        tokio::pin!(connect);
        let attempt = loop {
            tokio::select! {
                result = &mut connect => break result,
                _ = &mut shutdown_rx => break 'session,
                Some(request) = command_rx.recv() => {
                    drop_closed_dispatch(&session, &request);
                }
            }
        };

        match attempt {
            Ok((ws, _response)) => {
                // Anything still queued was requested before the socket opened.
                while let Ok(request) = command_rx.try_recv() {
                    drop_closed_dispatch(&session, &request);
                }
                let update = session.on_open();
                tracing::info!(status = %update.status, "websocket connected");
                publish(&events_tx, SessionEvent::Status(update));
                let end = drive(
                    &mut session,
                    ws,
                    &events_tx,
                    &mut command_rx,
                    &mut shutdown_rx,
                )
                .await;
                if let SessionEnd::Shutdown = end {
                    break 'session;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, operation = "connect", "websocket connect failed");
                publish(&events_tx, SessionEvent::Status(session.on_error()));
            }
        }

        let Some(delay) = session.on_close() else {
            break 'session;
        };
        tracing::info!(
            delay_ms = delay.as_millis() as u64,
            snapshots_received = session.snapshots_received(),
            decode_failures = session.decode_failures(),
            "websocket closed, reconnect scheduled"
        );
        publish(&events_tx, SessionEvent::Status(session.status()));

        if wait_reconnect(&session, delay, &mut command_rx, &mut shutdown_rx).await {
            break 'session;
        }
    }

    session.teardown();
    tracing::debug!("connection task shutting down");
    session
}

/// Sleep until the next attempt, dropping any dispatch that arrives meanwhile.
/// Returns true when shutdown was requested.
async fn wait_reconnect(
    session: &Session,
    delay: Duration,
    command_rx: &mut mpsc::Receiver<DispatchRequest>,
    shutdown_rx: &mut oneshot::Receiver<()>,
) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return false,
            _ = &mut *shutdown_rx => return true,
            Some(request) = command_rx.recv() => {
                drop_closed_dispatch(session, &request);
            }
        }
    }
}

fn drop_closed_dispatch(session: &Session, request: &DispatchRequest) {
    tracing::debug!(
        container_id = %request.container_id,
        command = %request.command,
        status = %session.status().status,
        "socket not open, command dropped"
    );
}

async fn drive(
    session: &mut Session,
    ws: WsStream,
    events_tx: &broadcast::Sender<SessionEvent>,
    command_rx: &mut mpsc::Receiver<DispatchRequest>,
    shutdown_rx: &mut oneshot::Receiver<()>,
) -> SessionEnd {
    let (mut sink, mut stream) = ws.split();
    loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => handle_frame(session, text.as_str(), events_tx),
                Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                    Ok(text) => handle_frame(session, text, events_tx),
                    Err(e) => {
                        tracing::warn!(error = %e, operation = "decode_frame", "binary frame is not UTF-8, ignored");
                    }
                },
                Some(Ok(Message::Close(frame))) => {
                    tracing::debug!(?frame, "close frame received");
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!(error = %e, operation = "read_frame", "websocket error");
                    publish(events_tx, SessionEvent::Status(session.on_error()));
                    return SessionEnd::Closed;
                }
                None => return SessionEnd::Closed,
            },
            Some(request) = command_rx.recv() => {
                let frame = match session.encode_command(&request.command, &request.container_id) {
                    Ok(Some(frame)) => frame,
                    Ok(None) => {
                        drop_closed_dispatch(session, &request);
                        continue;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, operation = "encode_command", "command not sent");
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(frame.into())).await {
                    tracing::warn!(error = %e, operation = "send_command", "websocket send failed");
                    publish(events_tx, SessionEvent::Status(session.on_error()));
                    return SessionEnd::Closed;
                }
                session.record_command(
                    &request.command,
                    &request.container_id,
                    request.was_running,
                    request.requested_at_ms,
                );
                tracing::info!(
                    container_id = %request.container_id,
                    command = %request.command,
                    "command sent"
                );
                publish(events_tx, SessionEvent::CommandSent {
                    container_id: request.container_id,
                    pending: session.pending().clone(),
                });
            }
            _ = &mut *shutdown_rx => {
                if let Err(e) = sink.send(Message::Close(None)).await {
                    tracing::debug!(error = %e, "close frame not sent");
                }
                return SessionEnd::Shutdown;
            }
        }
    }
}

fn handle_frame(session: &mut Session, text: &str, events_tx: &broadcast::Sender<SessionEvent>) {
    match session.on_frame(text, now_ms()) {
        Ok(update) => {
            if update.degraded {
                tracing::debug!("snapshot without GPU metrics");
            }
            tracing::debug!(
                containers = update.snapshot.docker.len(),
                pending = update.pending.len(),
                resolved = update.resolved.len(),
                "snapshot accepted"
            );
            publish(events_tx, SessionEvent::Snapshot(Arc::new(update)));
        }
        Err(e) => {
            tracing::warn!(error = %e, operation = "decode_snapshot", "frame discarded");
        }
    }
}
