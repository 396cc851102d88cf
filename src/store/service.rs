//! Single-writer settings service.
//!
//! [`SettingsService`] is a cheap, cloneable handle to a task that owns the
//! [`SettingsStore`]. Reads and read-modify-write updates are queued and
//! executed one at a time, so two updates to different apps can never
//! overwrite each other. Reads always hit the store: nothing is cached
//! between requests.

use std::collections::BTreeSet;

use chrono::NaiveTime;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

use crate::blocking::effectively_blocked_app_set;
use crate::types::{AppId, BlockedAppSettings, Schedule, SettingsMap};

use super::{SettingsStore, StoreError};

type UpdateFn = Box<dyn FnOnce(BlockedAppSettings) -> BlockedAppSettings + Send>;

/// Commands processed by the settings task.
enum StoreCommand {
    Snapshot {
        reply: oneshot::Sender<Result<SettingsMap, StoreError>>,
    },
    Update {
        app_id: AppId,
        update: UpdateFn,
        reply: oneshot::Sender<Result<BlockedAppSettings, StoreError>>,
    },
    Remove {
        app_id: AppId,
        reply: oneshot::Sender<Result<bool, StoreError>>,
    },
}

// ============================================================================
// SettingsService
// ============================================================================

/// Handle to the settings task.
#[derive(Debug, Clone)]
pub struct SettingsService {
    tx: mpsc::UnboundedSender<StoreCommand>,
    snapshots: watch::Receiver<SettingsMap>,
}

impl std::fmt::Debug for StoreCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreCommand::Snapshot { .. } => f.write_str("Snapshot"),
            StoreCommand::Update { app_id, .. } => write!(f, "Update({app_id})"),
            StoreCommand::Remove { app_id, .. } => write!(f, "Remove({app_id})"),
        }
    }
}

impl SettingsService {
    /// Spawns the settings task on the current tokio runtime.
    ///
    /// The task stops when `cancel` fires or every handle is dropped.
    pub fn spawn<S: SettingsStore>(store: S, cancel: CancellationToken) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshots) = watch::channel(SettingsMap::new());

        tokio::spawn(run_settings_task(store, rx, snapshot_tx, cancel));

        Self { tx, snapshots }
    }

    /// Subscribes to map snapshots, one per committed write.
    ///
    /// The receiver starts with the map read at startup.
    pub fn subscribe(&self) -> watch::Receiver<SettingsMap> {
        self.snapshots.clone()
    }

    /// Reads the whole map.
    pub async fn snapshot(&self) -> Result<SettingsMap, StoreError> {
        let (reply, rx) = oneshot::channel();
        self.send(StoreCommand::Snapshot { reply })?;
        rx.await.map_err(|_| StoreError::ServiceClosed)?
    }

    /// Reads the settings of one app, `None` if it is not configured.
    pub async fn get(&self, app_id: &str) -> Result<Option<BlockedAppSettings>, StoreError> {
        Ok(self.snapshot().await?.remove(app_id))
    }

    /// Applies `update` to one app's settings and persists the result.
    ///
    /// An unconfigured app starts from an empty schedule with no break.
    pub async fn update_app<F>(&self, app_id: &str, update: F) -> Result<BlockedAppSettings, StoreError>
    where
        F: FnOnce(BlockedAppSettings) -> BlockedAppSettings + Send + 'static,
    {
        let app_id = validate_app_id(app_id)?;
        let (reply, rx) = oneshot::channel();
        self.send(StoreCommand::Update {
            app_id,
            update: Box::new(update),
            reply,
        })?;
        rx.await.map_err(|_| StoreError::ServiceClosed)?
    }

    /// Replaces the schedule of an app.
    pub async fn set_schedule(
        &self,
        app_id: &str,
        schedule: Schedule,
    ) -> Result<BlockedAppSettings, StoreError> {
        self.update_app(app_id, move |settings| settings.with_schedule(schedule))
            .await
    }

    /// Blocks an app all day and clears any break.
    pub async fn set_always_blocked(&self, app_id: &str) -> Result<BlockedAppSettings, StoreError> {
        self.update_app(app_id, |settings| {
            settings
                .with_schedule(Schedule::AlwaysBlocked)
                .with_break(false)
        })
        .await
    }

    /// Empties the schedule of an app and clears any break.
    ///
    /// The app stays configured; use [`remove_app`](Self::remove_app) to drop it.
    pub async fn set_unrestricted(&self, app_id: &str) -> Result<BlockedAppSettings, StoreError> {
        self.update_app(app_id, |settings| {
            settings
                .with_schedule(Schedule::Unrestricted)
                .with_break(false)
        })
        .await
    }

    /// Starts a break for an app. The schedule is preserved.
    pub async fn set_on_break(&self, app_id: &str) -> Result<BlockedAppSettings, StoreError> {
        self.update_app(app_id, |settings| settings.with_break(true))
            .await
    }

    /// Ends a break for an app.
    pub async fn clear_break(&self, app_id: &str) -> Result<BlockedAppSettings, StoreError> {
        self.update_app(app_id, |settings| settings.with_break(false))
            .await
    }

    /// Removes an app's configuration entirely.
    ///
    /// Returns false if the app was not configured.
    pub async fn remove_app(&self, app_id: &str) -> Result<bool, StoreError> {
        let app_id = validate_app_id(app_id)?;
        let (reply, rx) = oneshot::channel();
        self.send(StoreCommand::Remove { app_id, reply })?;
        rx.await.map_err(|_| StoreError::ServiceClosed)?
    }

    /// Apps effectively blocked at `now`, from a fresh read.
    pub async fn blocked_now(&self, now: NaiveTime) -> Result<BTreeSet<AppId>, StoreError> {
        Ok(effectively_blocked_app_set(&self.snapshot().await?, now))
    }

    fn send(&self, command: StoreCommand) -> Result<(), StoreError> {
        self.tx.send(command).map_err(|_| StoreError::ServiceClosed)
    }
}

fn validate_app_id(app_id: &str) -> Result<AppId, StoreError> {
    let app_id = app_id.trim();
    if app_id.is_empty() {
        tracing::warn!("アプリIDなしで設定を更新しようとしました");
        return Err(StoreError::MissingAppId);
    }
    Ok(app_id.to_string())
}

// ============================================================================
// Settings task
// ============================================================================

async fn run_settings_task<S: SettingsStore>(
    store: S,
    mut rx: mpsc::UnboundedReceiver<StoreCommand>,
    snapshots: watch::Sender<SettingsMap>,
    cancel: CancellationToken,
) {
    match store.read().await {
        Ok(map) => {
            snapshots.send_replace(map);
        }
        Err(e) => tracing::warn!("起動時に設定を読み込めませんでした: {}", e),
    }

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("settings task cancelled");
                break;
            }
            command = rx.recv() => {
                let Some(command) = command else {
                    tracing::debug!("all settings handles dropped");
                    break;
                };
                tracing::trace!(?command, "settings command");
                handle_command(&store, command, &snapshots).await;
            }
        }
    }
}

async fn handle_command<S: SettingsStore>(
    store: &S,
    command: StoreCommand,
    snapshots: &watch::Sender<SettingsMap>,
) {
    match command {
        StoreCommand::Snapshot { reply } => {
            let _ = reply.send(store.read().await);
        }
        StoreCommand::Update {
            app_id,
            update,
            reply,
        } => {
            let _ = reply.send(apply_update(store, app_id, update, snapshots).await);
        }
        StoreCommand::Remove { app_id, reply } => {
            let _ = reply.send(apply_remove(store, app_id, snapshots).await);
        }
    }
}

async fn apply_update<S: SettingsStore>(
    store: &S,
    app_id: AppId,
    update: UpdateFn,
    snapshots: &watch::Sender<SettingsMap>,
) -> Result<BlockedAppSettings, StoreError> {
    let mut map = store.read().await?;
    let current = map
        .get(&app_id)
        .cloned()
        .unwrap_or_else(|| BlockedAppSettings::new(app_id.clone()));

    let mut updated = update(current);
    updated.app_id = Some(app_id.clone());

    map.insert(app_id.clone(), updated.clone());
    store.write(&map).await?;
    snapshots.send_replace(map);

    tracing::debug!(app = %app_id, settings = ?updated, "settings updated");
    Ok(updated)
}

async fn apply_remove<S: SettingsStore>(
    store: &S,
    app_id: AppId,
    snapshots: &watch::Sender<SettingsMap>,
) -> Result<bool, StoreError> {
    let mut map = store.read().await?;
    if map.remove(&app_id).is_none() {
        return Ok(false);
    }
    store.write(&map).await?;
    snapshots.send_replace(map);

    tracing::debug!(app = %app_id, "settings removed");
    Ok(true)
}

// ============================================================================
// Tests
// ============================================================================
