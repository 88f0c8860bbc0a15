use anyhow::Result;
use dashboard_sync::models::{ContainerAction, Snapshot};
use dashboard_sync::session::SessionEvent;
use dashboard_sync::view::{ContainerRow, ViewState};
use dashboard_sync::*;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    let app_config = config::AppConfig::load()?;
    tracing::info!(
        package = env!("CARGO_PKG_NAME"),
        version = env!("CARGO_PKG_VERSION"),
        endpoint = %app_config.connection.endpoint_url(),
        "starting"
    );

    let (handle, mut events) = connection::spawn(app_config.connection_config());
    let marker = app_config.commands.self_container_marker.clone();
    let mut latest: Option<Arc<Snapshot>> = None;
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    tokio::select! {
        _ = async {
            loop {
                tokio::select! {
                    event = events.recv() => match event {
                        Ok(event) => on_event(event, &mut latest, &marker),
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!("session observer lagged, skipped {} events", n);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    line = stdin.next_line(), if stdin_open => match line {
                        Ok(Some(line)) => on_command_line(&handle, &line, latest.as_deref(), &marker),
                        Ok(None) => stdin_open = false,
                        Err(e) => {
                            tracing::warn!(error = %e, operation = "read_stdin", "stdin closed");
                            stdin_open = false;
                        }
                    },
                }
            }
        } => {}
        _ = shutdown_signal() => {
            tracing::info!("Received shutdown signal");
        }
    }

    let session = handle.shutdown().await?;
    tracing::info!(
        snapshots_received = session.snapshots_received(),
        decode_failures = session.decode_failures(),
        "session closed"
    );
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = match tokio::signal::unix::signal(
            tokio::signal::unix::SignalKind::terminate(),
        ) {
            Ok(s) => s,
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

fn on_event(event: SessionEvent, latest: &mut Option<Arc<Snapshot>>, marker: &str) {
    match event {
        SessionEvent::Status(update) => {
            tracing::info!(
                status = %update.status,
                transport_error = update.transport_error,
                "connection status"
            );
        }
        SessionEvent::Snapshot(update) => {
            let view = ViewState::from_snapshot(&update.snapshot);
            if view.gpu_unavailable {
                tracing::warn!("GPU monitor unavailable");
            }
            tracing::info!(
                title = %view.title,
                memory_used_gb = view.memory.used_gb_display(),
                memory_total_gb = view.memory.total_gb,
                next_poll_secs = update.snapshot.next_poll().map(|d| d.as_secs_f64()),
                "snapshot"
            );
            for container in &update.snapshot.docker {
                let row = ContainerRow::new(container, update.pending.get(&container.id), marker);
                tracing::debug!(
                    id = %container.id,
                    names = %container.names,
                    running = row.running,
                    action = %row.action,
                    busy = row.busy,
                    "container"
                );
            }
            *latest = Some(update.snapshot.clone());
        }
        SessionEvent::CommandSent {
            container_id,
            pending,
        } => {
            tracing::debug!(container_id = %container_id, pending = pending.len(), "command pending");
        }
    }
}

/// `<start|stop|restart> <container id or name>`; only the action the container
/// currently offers is sent.
fn on_command_line(
    handle: &connection::ConnectionHandle,
    line: &str,
    latest: Option<&Snapshot>,
    marker: &str,
) {
    let mut parts = line.split_whitespace();
    let (Some(verb), Some(wanted)) = (parts.next(), parts.next()) else {
        return;
    };
    let Some(action) = ContainerAction::parse(verb) else {
        tracing::warn!(verb, "unknown command, expected start, stop or restart");
        return;
    };
    let Some(container) = latest.and_then(|s| {
        s.container(wanted)
            .or_else(|| s.docker.iter().find(|c| c.names == wanted))
    }) else {
        tracing::warn!(wanted, "no such container in the latest snapshot");
        return;
    };
    let offered = view::available_action(container, marker);
    if offered != action {
        tracing::warn!(
            id = %container.id,
            requested = %action,
            offered = %offered,
            "action not available for this container"
        );
        return;
    }
    handle.dispatch(action.command(), container.id.clone(), container.is_running());
}
