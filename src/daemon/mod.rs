//! Daemon module for Zen.
//!
//! This module contains the long-running blocker:
//! - `monitor`: Foreground-app watcher that triggers the block overlay
//! - `break_timer`: One-shot timers that end a granted break
//! - `ipc`: Unix socket server used by the CLI
//!
//! [`run_daemon`] wires them together. Every task shares one
//! cancellation token, so they stop as a unit.

pub mod break_timer;
pub mod ipc;
pub mod monitor;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::config::ZenConfig;
use crate::detector::{EventLogDetector, JsonLinesEventSource};
use crate::platform::{ConfigAppCatalog, PermissionSet};
use crate::store::{JsonFileStore, SettingsService};
use crate::types::OverlayInfo;

pub use break_timer::{BreakError, BreakTimer};
pub use ipc::{IpcError, IpcServer, RequestHandler};
pub use monitor::{Evaluation, Monitor, MonitorSignal, MonitorStatus, OverlayEvent};

/// Overlay currently presented to the user, shared with the IPC handler.
pub type OverlaySlot = Arc<Mutex<Option<OverlayInfo>>>;

/// Runs the daemon until SIGINT, SIGTERM or a `shutdown` request.
///
/// # Errors
///
/// Returns an error if a path cannot be resolved or the socket cannot be bound.
pub async fn run_daemon(config: ZenConfig) -> Result<()> {
    let settings_path = config.settings_path()?;
    let socket_path = config.socket_path()?;
    let events_path = config.events_path()?;

    let cancel = CancellationToken::new();

    let settings = SettingsService::spawn(JsonFileStore::new(&settings_path), cancel.clone());
    let permissions = Arc::new(PermissionSet::new(
        config.granted_permissions.iter().copied(),
    ));
    let catalog = Arc::new(ConfigAppCatalog::new(config.app_names.clone()));
    let detector = EventLogDetector::new(JsonLinesEventSource::new(&events_path))
        .with_window(config.event_window());

    let (overlay_tx, overlay_rx) = mpsc::unbounded_channel();
    let (monitor_tx, monitor_rx) = mpsc::unbounded_channel();

    let monitor = Monitor::new(detector, settings.clone(), overlay_tx)
        .with_permissions(permissions.clone())
        .with_catalog(catalog)
        .with_poll_interval(config.poll_interval())
        .with_self_app_id(config.self_app_id.clone());
    let monitor_status = monitor.subscribe_status();

    let break_timer = BreakTimer::new(
        settings.clone(),
        permissions.clone(),
        monitor_tx.clone(),
        config.break_duration(),
        cancel.child_token(),
    );
    match break_timer.clear_stale_breaks().await {
        Ok(0) => {}
        Ok(n) => tracing::info!("前回から残っていた休憩を{}件解除しました", n),
        Err(e) => tracing::warn!("休憩状態の確認に失敗しました: {}", e),
    }

    let overlay: OverlaySlot = Arc::new(Mutex::new(None));
    let handler = Arc::new(
        RequestHandler::new(
            settings,
            break_timer.clone(),
            monitor_tx,
            monitor_status,
            overlay.clone(),
            cancel.clone(),
        )
        .with_permissions(permissions)
        .with_poll_interval(config.poll_interval()),
    );

    let server = IpcServer::new(&socket_path).context("IPCサーバーを起動できませんでした")?;

    tracing::info!(
        settings = ?settings_path,
        events = ?events_path,
        "デーモンを起動しました"
    );

    let monitor_task = tokio::spawn(monitor.run(monitor_rx, cancel.clone()));
    let overlay_task = tokio::spawn(present_overlays(overlay_rx, overlay, cancel.clone()));
    let server_task = tokio::spawn(server.serve(handler, cancel.clone()));

    tokio::select! {
        result = wait_for_signal() => {
            result?;
            tracing::info!("終了シグナルを受信しました");
        }
        _ = cancel.cancelled() => {}
    }

    break_timer.shutdown();
    cancel.cancel();

    let (monitor_result, overlay_result, server_result) =
        tokio::join!(monitor_task, overlay_task, server_task);
    for result in [monitor_result, overlay_result, server_result] {
        if let Err(e) = result {
            tracing::warn!("タスクが異常終了しました: {}", e);
        }
    }

    tracing::info!("デーモンを停止しました");
    Ok(())
}

/// Records overlay events as the current overlay until `cancel` fires.
///
/// This is the presentation layer of the daemon: the overlay stays current
/// until the user grants a break or dismisses it over IPC.
pub async fn present_overlays(
    mut events: mpsc::UnboundedReceiver<OverlayEvent>,
    overlay: OverlaySlot,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv() => {
                let Some(OverlayEvent::Show { app_id, display_name }) = event else {
                    break;
                };
                tracing::info!("オーバーレイを表示します: {} ({})", display_name, app_id);
                *overlay.lock().await = Some(OverlayInfo {
                    app_id,
                    display_name,
                });
            }
        }
    }
}

async fn wait_for_signal() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm =
        signal(SignalKind::terminate()).context("SIGTERMハンドラを登録できませんでした")?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Ctrl+Cハンドラを登録できませんでした")?;
        }
        _ = sigterm.recv() => {}
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
