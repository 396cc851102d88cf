//! Break timer.
//!
//! Granting a break suppresses blocking for one app for a fixed period. The
//! timer then clears the break and asks the monitor to look at the app again,
//! so the overlay comes back without waiting for the next poll.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::platform::{Permission, PermissionProbe};
use crate::store::{SettingsService, StoreError};
use crate::types::AppId;

use super::monitor::MonitorSignal;

/// Default break length in minutes
pub const DEFAULT_BREAK_MINUTES: u64 = 5;

// ============================================================================
// BreakError
// ============================================================================

/// Errors returned when a break cannot be granted.
#[derive(Debug, Error)]
pub enum BreakError {
    /// A permission needed to end the break is missing
    #[error("権限がないため休憩を開始できません: {0}")]
    PermissionDenied(Permission),

    /// No app identifier was given
    #[error("アプリIDが不正です")]
    InvalidApp,

    /// The daemon is stopping
    #[error("デーモンが停止処理中です")]
    ShuttingDown,

    /// The break flag could not be stored
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl BreakError {
    /// Returns true if a later attempt may succeed.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::PermissionDenied(_) => true,
            Self::InvalidApp | Self::ShuttingDown => false,
            Self::Store(e) => e.is_recoverable(),
        }
    }
}

// ============================================================================
// BreakTimer
// ============================================================================

/// A scheduled break end for one app.
#[derive(Debug)]
struct PendingBreak {
    id: u64,
    handle: JoinHandle<()>,
}

/// Schedules one-shot break ends.
///
/// At most one break end is pending per app; granting a new break replaces
/// the pending one. Cloning shares the same set of timers.
#[derive(Debug, Clone)]
pub struct BreakTimer {
    /// Settings service
    settings: SettingsService,
    /// Permission checks
    permissions: Arc<dyn PermissionProbe>,
    /// Monitor signal sender
    monitor_tx: mpsc::UnboundedSender<MonitorSignal>,
    /// Break length
    duration: Duration,
    /// Cancels every pending break end
    cancel: CancellationToken,
    /// Pending break ends keyed by app
    pending: Arc<Mutex<HashMap<AppId, PendingBreak>>>,
    /// Source of timer ids
    next_id: Arc<AtomicU64>,
}

impl BreakTimer {
    /// Creates a break timer.
    ///
    /// Pending timers are dropped without firing once `cancel` fires.
    pub fn new(
        settings: SettingsService,
        permissions: Arc<dyn PermissionProbe>,
        monitor_tx: mpsc::UnboundedSender<MonitorSignal>,
        duration: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            settings,
            permissions,
            monitor_tx,
            duration,
            cancel,
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Returns the break length.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Starts a break for `app_id` and schedules its end.
    ///
    /// The exact-alarm permission is checked before the break flag is set,
    /// so a break that cannot end is never started.
    ///
    /// # Errors
    ///
    /// Returns an error if the permission is missing, the app id is empty,
    /// the timer is shutting down, or the settings write fails.
    pub async fn grant_break(&self, app_id: &str) -> Result<(), BreakError> {
        let app_id = app_id.trim();
        if app_id.is_empty() {
            return Err(BreakError::InvalidApp);
        }
        if self.cancel.is_cancelled() {
            return Err(BreakError::ShuttingDown);
        }
        if !self.permissions.is_granted(Permission::ExactAlarm) {
            tracing::warn!("正確なアラームの権限がないため {} の休憩を開始しません", app_id);
            return Err(BreakError::PermissionDenied(Permission::ExactAlarm));
        }

        if let Some(previous) = self.lock_pending().remove(app_id) {
            tracing::debug!(app = %app_id, "superseding pending break end");
            previous.handle.abort();
        }

        self.settings.set_on_break(app_id).await?;
        self.schedule_end(app_id.to_string());

        tracing::info!(
            "{} の休憩を開始しました ({}秒)",
            app_id,
            self.duration.as_secs()
        );
        Ok(())
    }

    /// Returns true if a break end is pending for `app_id`.
    pub fn is_pending(&self, app_id: &str) -> bool {
        self.lock_pending().contains_key(app_id)
    }

    /// Returns the number of pending break ends.
    pub fn pending_count(&self) -> usize {
        self.lock_pending().len()
    }

    /// Cancels every pending break end without firing it.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        for (_, pending) in self.lock_pending().drain() {
            pending.handle.abort();
        }
    }

    /// Clears break flags left over from a previous run.
    ///
    /// A break flag with no pending timer would never be cleared.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings cannot be read or written.
    pub async fn clear_stale_breaks(&self) -> Result<usize, StoreError> {
        let stale: Vec<AppId> = self
            .settings
            .snapshot()
            .await?
            .into_iter()
            .filter(|(app_id, settings)| settings.is_on_break && !self.is_pending(app_id))
            .map(|(app_id, _)| app_id)
            .collect();

        for app_id in &stale {
            self.settings.clear_break(app_id).await?;
            tracing::info!("前回の休憩を解除しました: {}", app_id);
        }
        Ok(stale.len())
    }

    fn schedule_end(&self, app_id: AppId) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let timer = self.clone();

        let mut pending = self.lock_pending();
        let task_app_id = app_id.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = timer.cancel.cancelled() => {
                    tracing::debug!(app = %task_app_id, "break end cancelled");
                }
                _ = tokio::time::sleep(timer.duration) => {
                    timer.end_break(task_app_id, id).await;
                }
            }
        });
        if let Some(previous) = pending.insert(app_id, PendingBreak { id, handle }) {
            tracing::debug!(id = previous.id, "dropping break end of an overlapping grant");
            previous.handle.abort();
        }
    }

    async fn end_break(&self, app_id: AppId, id: u64) {
        {
            let mut pending = self.lock_pending();
            if pending.get(&app_id).is_some_and(|p| p.id == id) {
                pending.remove(&app_id);
            }
        }

        if let Err(e) = self.settings.clear_break(&app_id).await {
            tracing::warn!("休憩の解除に失敗しました ({}): {}", app_id, e);
            return;
        }
        tracing::info!("{} の休憩が終了しました", app_id);

        if self.monitor_tx.send(MonitorSignal::Recheck(app_id)).is_err() {
            tracing::debug!("monitor gone, skipping recheck");
        }
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, HashMap<AppId, PendingBreak>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ============================================================================
// Tests
// ============================================================================
