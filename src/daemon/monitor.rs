//! Foreground-app monitoring loop.
//!
//! This module provides the watcher that decides when to interrupt the user:
//! - Periodic polling of the foreground detector while the display is on
//! - Event-driven evaluation of foreground changes reported by the platform
//! - Overlay events emitted exactly once per blocked foreground session

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::blocking::is_effectively_blocked_now;
use crate::detector::ForegroundDetector;
use crate::platform::{
    display_name_or_id, AppCatalog, Clock, ConfigAppCatalog, Permission, PermissionProbe,
    PermissionSet, SystemClock,
};
use crate::store::SettingsService;
use crate::types::AppId;

// ============================================================================
// Constants
// ============================================================================

/// Default poll interval in seconds
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;

/// Identity of the blocker itself, which is never blocked
pub const DEFAULT_SELF_APP_ID: &str = "xyz.zen";

// ============================================================================
// Events and signals
// ============================================================================

/// Events sent to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverlayEvent {
    /// Show the full-screen block prompt
    Show {
        /// Blocked app
        app_id: AppId,
        /// Human-readable app name (falls back to the identifier)
        display_name: String,
    },
}

/// Inputs the monitor reacts to besides its own poll tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorSignal {
    /// The platform reported a new foreground app
    Foreground(Option<AppId>),
    /// A break ended; evaluate the app again if it is still in front
    Recheck(AppId),
    /// The display was turned on or off
    Display(bool),
    /// The overlay for an app was closed by the user
    OverlayClosed(AppId),
}

/// Snapshot of the monitor state, published after every change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorStatus {
    /// Last known foreground app
    pub foreground: Option<AppId>,
    /// App the overlay was last shown for
    pub overlay_for: Option<AppId>,
    /// Whether the display is on
    pub display_on: bool,
}

impl Default for MonitorStatus {
    fn default() -> Self {
        Self {
            foreground: None,
            overlay_for: None,
            display_on: true,
        }
    }
}

/// Result of one evaluation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Evaluation {
    /// No usable candidate (none, self, or unresolvable)
    Skipped,
    /// The app is blocked and an overlay event was emitted
    OverlayTriggered,
    /// The app is blocked and its overlay is already up
    AlreadyShown,
    /// The app is blocked but the overlay permission is missing
    OverlayPermissionMissing,
    /// The app is no longer blocked; overlay state was reset
    Cleared,
    /// The app is not blocked
    NotBlocked,
}

// ============================================================================
// Monitor
// ============================================================================

/// Watches the foreground app and triggers the block overlay.
pub struct Monitor<D> {
    /// Foreground app source
    detector: D,
    /// Settings, read fresh on every evaluation
    settings: SettingsService,
    /// Overlay event sender
    overlay_tx: mpsc::UnboundedSender<OverlayEvent>,
    /// Permission checks
    permissions: Arc<dyn PermissionProbe>,
    /// Display name lookup
    catalog: Arc<dyn AppCatalog>,
    /// Wall clock
    clock: Arc<dyn Clock>,
    /// Poll interval
    poll_interval: Duration,
    /// Own identity, never blocked
    self_app_id: AppId,
    /// Last app seen in front
    last_known_foreground: Option<AppId>,
    /// App the overlay was last shown for
    last_overlay_for: Option<AppId>,
    /// Whether the display is on
    display_on: bool,
    /// Status publisher
    status_tx: watch::Sender<MonitorStatus>,
}

impl<D: ForegroundDetector> Monitor<D> {
    /// Creates a monitor with default collaborators and a 60 second poll.
    pub fn new(
        detector: D,
        settings: SettingsService,
        overlay_tx: mpsc::UnboundedSender<OverlayEvent>,
    ) -> Self {
        let (status_tx, _) = watch::channel(MonitorStatus::default());
        Self {
            detector,
            settings,
            overlay_tx,
            permissions: Arc::new(PermissionSet::all()),
            catalog: Arc::new(ConfigAppCatalog::default()),
            clock: Arc::new(SystemClock),
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            self_app_id: DEFAULT_SELF_APP_ID.to_string(),
            last_known_foreground: None,
            last_overlay_for: None,
            display_on: true,
            status_tx,
        }
    }

    pub fn with_permissions(mut self, permissions: Arc<dyn PermissionProbe>) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn with_catalog(mut self, catalog: Arc<dyn AppCatalog>) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_self_app_id(mut self, app_id: impl Into<AppId>) -> Self {
        self.self_app_id = app_id.into();
        self
    }

    /// Subscribes to status snapshots.
    pub fn subscribe_status(&self) -> watch::Receiver<MonitorStatus> {
        self.status_tx.subscribe()
    }

    /// Returns the current status.
    pub fn status(&self) -> MonitorStatus {
        MonitorStatus {
            foreground: self.last_known_foreground.clone(),
            overlay_for: self.last_overlay_for.clone(),
            display_on: self.display_on,
        }
    }

    /// Runs the monitor until `cancel` fires.
    ///
    /// The first poll happens immediately. Polling is suspended while the
    /// display is off and restarts with an immediate poll when it turns on.
    pub async fn run(
        mut self,
        mut signals: mpsc::UnboundedReceiver<MonitorSignal>,
        cancel: CancellationToken,
    ) {
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut signals_open = true;

        tracing::info!(
            "監視を開始しました (間隔: {}秒)",
            self.poll_interval.as_secs()
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("monitor cancelled");
                    break;
                }
                _ = ticker.tick(), if self.display_on => {
                    self.poll_once().await;
                }
                signal = signals.recv(), if signals_open => {
                    match signal {
                        Some(signal) => {
                            let resumed = signal == MonitorSignal::Display(true) && !self.display_on;
                            self.handle_signal(signal).await;
                            if resumed {
                                ticker.reset();
                            }
                        }
                        None => {
                            tracing::debug!("monitor signal channel closed");
                            signals_open = false;
                        }
                    }
                }
            }
        }
    }

    /// Polls the detector once and evaluates the foreground app.
    ///
    /// Does nothing while the display is off or usage access is missing.
    pub async fn poll_once(&mut self) -> Evaluation {
        if !self.display_on {
            return Evaluation::Skipped;
        }
        if !self.permissions.is_granted(Permission::UsageStats) {
            tracing::warn!("使用状況へのアクセス権限がないため確認をスキップします");
            return Evaluation::Skipped;
        }

        let candidate = self.query_foreground().await;
        tracing::debug!(foreground = ?candidate, "poll");
        self.last_known_foreground = candidate.clone();
        let outcome = self.evaluate(candidate).await;
        self.publish_status();
        outcome
    }

    /// Applies one signal.
    pub async fn handle_signal(&mut self, signal: MonitorSignal) -> Evaluation {
        let outcome = match signal {
            MonitorSignal::Foreground(app_id) => {
                if !self.permissions.is_granted(Permission::ForegroundDetection) {
                    tracing::warn!("前面アプリの検出権限がないため通知を無視します");
                    return Evaluation::Skipped;
                }
                self.last_known_foreground = app_id.clone();
                self.evaluate(app_id).await
            }
            MonitorSignal::Recheck(app_id) => self.recheck(app_id).await,
            MonitorSignal::Display(on) => {
                let was_on = std::mem::replace(&mut self.display_on, on);
                if on && !was_on {
                    tracing::debug!("display on, polling immediately");
                    self.poll_once().await
                } else {
                    Evaluation::Skipped
                }
            }
            MonitorSignal::OverlayClosed(app_id) => {
                if self.last_overlay_for.as_deref() == Some(app_id.as_str()) {
                    self.last_overlay_for = None;
                }
                Evaluation::Skipped
            }
        };
        self.publish_status();
        outcome
    }

    /// Decides whether `candidate` must be interrupted.
    pub async fn evaluate(&mut self, candidate: Option<AppId>) -> Evaluation {
        let app_id = match candidate {
            Some(app_id) if !app_id.is_empty() && app_id != self.self_app_id => app_id,
            _ => {
                self.last_overlay_for = None;
                return Evaluation::Skipped;
            }
        };

        let settings = match self.settings.get(&app_id).await {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("設定の読み込みに失敗しました ({}): {}", app_id, e);
                None
            }
        };
        let blocked = is_effectively_blocked_now(settings.as_ref(), self.clock.now());

        let already_shown = self.last_overlay_for.as_deref() == Some(app_id.as_str());
        match (blocked, already_shown) {
            (true, true) => Evaluation::AlreadyShown,
            (true, false) => self.trigger_overlay(app_id),
            (false, true) => {
                self.last_overlay_for = None;
                tracing::debug!(app = %app_id, "no longer blocked");
                Evaluation::Cleared
            }
            (false, false) => Evaluation::NotBlocked,
        }
    }

    fn trigger_overlay(&mut self, app_id: AppId) -> Evaluation {
        if !self.permissions.is_granted(Permission::Overlay) {
            tracing::warn!("オーバーレイ表示の権限がないため {} をブロックできません", app_id);
            return Evaluation::OverlayPermissionMissing;
        }

        let display_name = display_name_or_id(self.catalog.as_ref(), &app_id);
        tracing::info!("{} をブロックしました", display_name);

        let event = OverlayEvent::Show {
            app_id: app_id.clone(),
            display_name,
        };
        if self.overlay_tx.send(event).is_err() {
            tracing::warn!("オーバーレイの受信側が終了しています");
        }

        self.last_overlay_for = Some(app_id);
        Evaluation::OverlayTriggered
    }

    /// Re-evaluates `app_id` if it is still in front.
    ///
    /// An overlay already shown for it stays deduplicated; only
    /// `OverlayClosed` re-arms it.
    async fn recheck(&mut self, app_id: AppId) -> Evaluation {
        let current = if self.permissions.is_granted(Permission::UsageStats) {
            self.query_foreground().await
        } else {
            None
        };
        let current = current.or_else(|| self.last_known_foreground.clone());

        if current.as_deref() == Some(app_id.as_str()) {
            tracing::debug!(app = %app_id, "still in front after break");
            self.evaluate(current).await
        } else {
            Evaluation::Skipped
        }
    }

    async fn query_foreground(&self) -> Option<AppId> {
        match self.detector.current_foreground_app().await {
            Ok(app_id) => app_id,
            Err(e) if e.is_permission_denied() => {
                tracing::warn!("前面アプリを取得する権限がありません: {}", e);
                None
            }
            Err(e) => {
                tracing::warn!("前面アプリの取得に失敗しました: {}", e);
                None
            }
        }
    }

    fn publish_status(&self) {
        self.status_tx.send_replace(self.status());
    }
}

// ============================================================================
// Tests
// ============================================================================
