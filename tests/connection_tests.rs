// Connection manager tests against an in-process WebSocket server

mod common;

use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use common::{DEGRADED_FRAME, SERVER_FRAME};
use dashboard_sync::connection::{self, ConnectionConfig, ConnectionHandle};
use dashboard_sync::models::ConnectionStatus;
use dashboard_sync::session::{SessionConfig, SessionEvent};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc};

#[derive(Clone)]
struct TestServer {
    frames: Arc<Vec<String>>,
    close_after_frames: bool,
    received_tx: mpsc::UnboundedSender<String>,
    connections: Arc<Mutex<Vec<Instant>>>,
    /// Hold the HTTP upgrade this long, keeping the client in `Connecting`.
    upgrade_delay: Duration,
}

async fn ws_handler(ws: WebSocketUpgrade, State(server): State<TestServer>) -> impl IntoResponse {
    if !server.upgrade_delay.is_zero() {
        tokio::time::sleep(server.upgrade_delay).await;
    }
    ws.on_upgrade(move |socket| serve_socket(socket, server))
}

async fn serve_socket(mut socket: WebSocket, server: TestServer) {
    server.connections.lock().unwrap().push(Instant::now());
    for frame in server.frames.iter() {
        if socket.send(Message::Text(frame.clone().into())).await.is_err() {
            return;
        }
    }
    if server.close_after_frames {
        let _ = socket.send(Message::Close(None)).await;
        return;
    }
    while let Some(Ok(msg)) = socket.recv().await {
        if let Message::Text(text) = msg {
            let _ = server.received_tx.send(text.as_str().to_string());
        }
    }
}

type ServerParts = (
    String,
    mpsc::UnboundedReceiver<String>,
    Arc<Mutex<Vec<Instant>>>,
);

/// Start a server on an ephemeral port; returns its ws:// URL.
async fn start_server(frames: Vec<&str>, close_after_frames: bool) -> ServerParts {
    start_server_with_delay(frames, close_after_frames, Duration::ZERO).await
}

async fn start_server_with_delay(
    frames: Vec<&str>,
    close_after_frames: bool,
    upgrade_delay: Duration,
) -> ServerParts {
    let (received_tx, received_rx) = mpsc::unbounded_channel();
    let connections = Arc::new(Mutex::new(Vec::new()));
    let server = TestServer {
        frames: Arc::new(frames.into_iter().map(String::from).collect()),
        close_after_frames,
        received_tx,
        connections: connections.clone(),
        upgrade_delay,
    };
    let app = Router::new()
        .route("/ws", get(ws_handler))
        .with_state(server);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("ws://{}/ws", addr), received_rx, connections)
}

/// A ws:// URL nothing listens on.
async fn dead_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("ws://{}/ws", addr)
}

fn start_client(
    url: String,
    reconnect_delay: Duration,
) -> (ConnectionHandle, broadcast::Receiver<SessionEvent>) {
    connection::spawn(ConnectionConfig {
        url,
        session: SessionConfig {
            reconnect_delay,
            ..SessionConfig::default()
        },
        event_capacity: 256,
        command_capacity: 8,
    })
}

async fn next_matching<T>(
    rx: &mut broadcast::Receiver<SessionEvent>,
    mut f: impl FnMut(SessionEvent) -> Option<T>,
) -> T {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Some(v) = f(event) {
                        return v;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(e) => panic!("event channel closed: {}", e),
            }
        }
    })
    .await
    .expect("timed out waiting for session event")
}

async fn wait_for_status(rx: &mut broadcast::Receiver<SessionEvent>, wanted: ConnectionStatus) {
    next_matching(rx, |event| match event {
        SessionEvent::Status(update) if update.status == wanted => Some(()),
        _ => None,
    })
    .await
}

#[tokio::test]
async fn test_receives_snapshots_and_reports_connected() {
    let (url, _received, _conns) = start_server(vec![SERVER_FRAME, DEGRADED_FRAME], false).await;
    let (handle, mut events) = start_client(url, Duration::from_millis(100));

    wait_for_status(&mut events, ConnectionStatus::Connecting).await;
    wait_for_status(&mut events, ConnectionStatus::Connected).await;

    let first = next_matching(&mut events, |event| match event {
        SessionEvent::Snapshot(update) => Some(update),
        _ => None,
    })
    .await;
    assert!(!first.degraded);
    assert_eq!(first.snapshot.docker.len(), 2);

    let second = next_matching(&mut events, |event| match event {
        SessionEvent::Snapshot(update) => Some(update),
        _ => None,
    })
    .await;
    assert!(second.degraded);
    assert_eq!(second.history.gpu_percent.to_vec(), vec![37.5, 0.0]);

    let session = handle.shutdown().await.unwrap();
    assert_eq!(session.snapshots_received(), 2);
    assert!(session.is_torn_down());
}

#[tokio::test]
async fn test_dispatch_sends_command_and_tracks_pending() {
    let (url, mut received, _conns) = start_server(vec![SERVER_FRAME], false).await;
    let (handle, mut events) = start_client(url, Duration::from_millis(100));

    next_matching(&mut events, |event| match event {
        SessionEvent::Snapshot(_) => Some(()),
        _ => None,
    })
    .await;

    assert!(handle.dispatch("docker-stop", "a1", true));
    let frame = tokio::time::timeout(Duration::from_secs(5), received.recv())
        .await
        .expect("server did not receive command")
        .unwrap();
    let wire: serde_json::Value = serde_json::from_str(&frame).unwrap();
    assert_eq!(
        wire,
        serde_json::json!({ "command": "docker-stop", "id": "a1" })
    );

    let pending = next_matching(&mut events, |event| match event {
        SessionEvent::CommandSent { pending, .. } => Some(pending),
        _ => None,
    })
    .await;
    assert_eq!(pending["a1"].command, "docker-stop");
    assert!(pending["a1"].was_running_at_dispatch);

    let session = handle.shutdown().await.unwrap();
    assert!(session.pending().contains_key("a1"));
}

#[tokio::test]
async fn test_malformed_frame_is_skipped() {
    let (url, _received, _conns) =
        start_server(vec!["{\"cpu\": oops", SERVER_FRAME], false).await;
    let (handle, mut events) = start_client(url, Duration::from_millis(100));

    let update = next_matching(&mut events, |event| match event {
        SessionEvent::Snapshot(update) => Some(update),
        _ => None,
    })
    .await;
    assert_eq!(update.history.len(), 1);

    let session = handle.shutdown().await.unwrap();
    assert_eq!(session.decode_failures(), 1);
    assert_eq!(session.snapshots_received(), 1);
}

#[tokio::test]
async fn test_reconnects_after_close_with_fixed_delay() {
    let delay = Duration::from_millis(200);
    let (url, _received, connections) = start_server(vec![SERVER_FRAME], true).await;
    let (handle, mut events) = start_client(url, delay);

    wait_for_status(&mut events, ConnectionStatus::Connected).await;
    wait_for_status(&mut events, ConnectionStatus::Reconnecting).await;
    wait_for_status(&mut events, ConnectionStatus::Connected).await;

    let deadline = Instant::now() + Duration::from_secs(5);
    while connections.lock().unwrap().len() < 3 {
        assert!(Instant::now() < deadline, "client did not keep reconnecting");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let times = connections.lock().unwrap().clone();
    for pair in times.windows(2).take(2) {
        let gap = pair[1] - pair[0];
        assert!(gap >= delay, "reconnected after {:?}, before the delay", gap);
        assert!(gap < Duration::from_secs(2), "reconnect gap grew to {:?}", gap);
    }

    let session = handle.shutdown().await.unwrap();
    // History is kept across reconnects.
    assert!(session.history().len() >= 2);
}

#[tokio::test]
async fn test_connect_failure_reports_error_then_reconnecting() {
    let (handle, mut events) = start_client(dead_url().await, Duration::from_millis(50));

    let error = next_matching(&mut events, |event| match event {
        SessionEvent::Status(update) if update.status == ConnectionStatus::Error => Some(update),
        _ => None,
    })
    .await;
    assert!(error.transport_error);

    let reconnecting = next_matching(&mut events, |event| match event {
        SessionEvent::Status(update) => Some(update),
        _ => None,
    })
    .await;
    assert_eq!(reconnecting.status, ConnectionStatus::Reconnecting);
    assert!(reconnecting.transport_error);

    // It keeps trying.
    wait_for_status(&mut events, ConnectionStatus::Error).await;

    let session = handle.shutdown().await.unwrap();
    assert!(!session.is_open());
}

#[tokio::test]
async fn test_dispatch_while_disconnected_is_dropped() {
    let (handle, mut events) = start_client(dead_url().await, Duration::from_secs(60));

    wait_for_status(&mut events, ConnectionStatus::Reconnecting).await;
    assert!(handle.dispatch("docker-start", "c1", false));

    // Shutdown cancels the long reconnect wait.
    let started = Instant::now();
    let session = tokio::time::timeout(Duration::from_secs(5), handle.shutdown())
        .await
        .expect("shutdown did not cancel the reconnect timer")
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(session.pending().is_empty());
}

#[tokio::test]
async fn test_dispatch_while_connecting_is_not_sent_on_open() {
    let (url, mut received, _conns) =
        start_server_with_delay(vec![SERVER_FRAME], false, Duration::from_millis(800)).await;
    let (handle, mut events) = start_client(url, Duration::from_millis(100));

    wait_for_status(&mut events, ConnectionStatus::Connecting).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(handle.dispatch("docker-start", "c1", false));

    wait_for_status(&mut events, ConnectionStatus::Connected).await;
    next_matching(&mut events, |event| match event {
        SessionEvent::Snapshot(update) => Some(update),
        _ => None,
    })
    .await;
    assert!(
        tokio::time::timeout(Duration::from_millis(300), received.recv())
            .await
            .is_err(),
        "command issued while connecting reached the server"
    );

    // The first command sent after opening is the first one the server sees.
    assert!(handle.dispatch("docker-stop", "a1", true));
    let frame = tokio::time::timeout(Duration::from_secs(5), received.recv())
        .await
        .expect("server did not receive command")
        .unwrap();
    let wire: serde_json::Value = serde_json::from_str(&frame).unwrap();
    assert_eq!(wire["id"], "a1");

    let pending = next_matching(&mut events, |event| match event {
        SessionEvent::CommandSent { pending, .. } => Some(pending),
        _ => None,
    })
    .await;
    assert!(!pending.contains_key("c1"));

    let session = handle.shutdown().await.unwrap();
    assert!(!session.pending().contains_key("c1"));
    assert_eq!(session.pending().len(), 1);
}

#[tokio::test]
async fn test_dispatch_while_connecting_leaves_pending_empty() {
    let (url, mut received, _conns) =
        start_server_with_delay(vec![], false, Duration::from_millis(800)).await;
    let (handle, mut events) = start_client(url, Duration::from_millis(100));

    wait_for_status(&mut events, ConnectionStatus::Connecting).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(handle.dispatch("docker-restart", "c1", true));

    wait_for_status(&mut events, ConnectionStatus::Connected).await;
    assert!(
        tokio::time::timeout(Duration::from_millis(300), received.recv())
            .await
            .is_err()
    );

    let session = handle.shutdown().await.unwrap();
    assert!(session.pending().is_empty());
}
