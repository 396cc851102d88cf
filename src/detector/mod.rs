//! Foreground app detection.
//!
//! The platform reports raw activity transitions (RESUMED / PAUSED /
//! STOPPED). This module turns them into a single answer: which app is in
//! the foreground right now.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐     ┌──────────────────────┐
//! │  UsageEventSource    │────▶│  EventLogDetector    │──▶ current_foreground_app()
//! │ (JSON lines on disk) │     │ (pairs transitions)  │
//! └──────────────────────┘     └──────────────────────┘
//! ```
//!
//! All errors are recoverable: the monitor treats a failed lookup as "no
//! foreground app" and tries again on the next tick.

pub mod error;
pub mod events;

use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use chrono::{DateTime, TimeDelta, Utc};

use crate::types::AppId;

pub use error::DetectorError;
pub use events::{foreground_intervals, latest_foreground_app, EventKind, ForegroundInterval, UsageEvent};

/// Source of raw transition events.
pub trait UsageEventSource: Send + Sync + 'static {
    /// Returns the events with `since <= timestamp <= until`.
    fn query_transition_events(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<UsageEvent>, DetectorError>> + Send;
}

/// Answers "which app is in the foreground right now?".
pub trait ForegroundDetector: Send + Sync + 'static {
    /// Returns the current foreground app, or `None` if nothing is.
    fn current_foreground_app(
        &self,
    ) -> impl Future<Output = Result<Option<AppId>, DetectorError>> + Send;
}

// ============================================================================
// JsonLinesEventSource
// ============================================================================

/// Reads transition events appended by the platform shim, one JSON object per
/// line.
///
/// A missing file means no events yet. Malformed lines are skipped.
#[derive(Debug, Clone)]
pub struct JsonLinesEventSource {
    path: PathBuf,
}

impl JsonLinesEventSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl UsageEventSource for JsonLinesEventSource {
    async fn query_transition_events(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<UsageEvent>, DetectorError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut events = Vec::new();
        for (index, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<UsageEvent>(line) {
                Ok(event) if event.timestamp >= since && event.timestamp <= until => {
                    events.push(event)
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(line = index + 1, error = %e, "skipping malformed usage event");
                }
            }
        }
        Ok(events)
    }
}

// ============================================================================
// EventLogDetector
// ============================================================================

/// Default look-back window for foreground queries.
pub const DEFAULT_EVENT_WINDOW_SECS: i64 = 60 * 60;

/// Derives the foreground app from a window of recent transition events.
#[derive(Debug, Clone)]
pub struct EventLogDetector<S> {
    source: S,
    window: TimeDelta,
}

impl<S: UsageEventSource> EventLogDetector<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            window: TimeDelta::seconds(DEFAULT_EVENT_WINDOW_SECS),
        }
    }

    /// Sets the look-back window.
    pub fn with_window(mut self, window: TimeDelta) -> Self {
        self.window = window;
        self
    }

    /// Foreground app as of `now`.
    pub async fn foreground_at(&self, now: DateTime<Utc>) -> Result<Option<AppId>, DetectorError> {
        let events = self
            .source
            .query_transition_events(now - self.window, now)
            .await?;
        let app = latest_foreground_app(&events, now);
        if app.is_none() {
            tracing::debug!(events = events.len(), "no open foreground activity in window");
        }
        Ok(app)
    }
}

impl<S: UsageEventSource> ForegroundDetector for EventLogDetector<S> {
    async fn current_foreground_app(&self) -> Result<Option<AppId>, DetectorError> {
        self.foreground_at(Utc::now()).await
    }
}

// ============================================================================
// MockForegroundDetector
// ============================================================================

/// Mock detector for testing.
#[derive(Debug, Default)]
pub struct MockForegroundDetector {
    foreground: std::sync::Mutex<Option<AppId>>,
    should_fail: AtomicBool,
    query_count: AtomicUsize,
}

impl MockForegroundDetector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_foreground(app_id: impl Into<AppId>) -> Self {
        let mock = Self::new();
        mock.set_foreground(Some(app_id.into()));
        mock
    }

    pub fn set_foreground(&self, app_id: Option<AppId>) {
        *self.foreground.lock().unwrap() = app_id;
    }

    pub fn set_should_fail(&self, should_fail: bool) {
        self.should_fail.store(should_fail, Ordering::SeqCst);
    }

    #[must_use]
    pub fn query_count(&self) -> usize {
        self.query_count.load(Ordering::SeqCst)
    }
}

impl ForegroundDetector for MockForegroundDetector {
    async fn current_foreground_app(&self) -> Result<Option<AppId>, DetectorError> {
        self.query_count.fetch_add(1, Ordering::SeqCst);
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(DetectorError::Source("simulated failure".to_string()));
        }
        Ok(self.foreground.lock().unwrap().clone())
    }
}

impl<D: ForegroundDetector> ForegroundDetector for std::sync::Arc<D> {
    fn current_foreground_app(
        &self,
    ) -> impl Future<Output = Result<Option<AppId>, DetectorError>> + Send {
        D::current_foreground_app(self)
    }
}
