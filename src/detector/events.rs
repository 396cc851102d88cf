//! Usage transition events and their pairing into foreground intervals.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::AppId;

/// Kind of activity transition reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    /// Activity came to the foreground
    Resumed,
    /// Activity left the foreground
    Paused,
    /// Activity was stopped
    Stopped,
}

impl EventKind {
    /// Returns true for transitions that end a foreground period.
    pub fn is_closing(&self) -> bool {
        matches!(self, EventKind::Paused | EventKind::Stopped)
    }
}

/// One raw transition event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageEvent {
    /// App the activity belongs to
    #[serde(rename = "appId")]
    pub app_id: AppId,
    /// Activity (screen) within the app
    #[serde(rename = "activityId", default)]
    pub activity_id: String,
    /// Transition kind
    pub kind: EventKind,
    /// When the transition happened
    pub timestamp: DateTime<Utc>,
}

impl UsageEvent {
    pub fn new(
        app_id: impl Into<AppId>,
        activity_id: impl Into<String>,
        kind: EventKind,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            activity_id: activity_id.into(),
            kind,
            timestamp,
        }
    }
}

/// A period during which one activity was in the foreground.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForegroundInterval {
    pub app_id: AppId,
    pub activity_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// True if no closing event was seen (closed implicitly at `until`)
    pub open: bool,
}

/// Pairs RESUMED events with their PAUSED/STOPPED counterparts.
///
/// Events are matched per (app, activity). A RESUMED with no closing event
/// is closed at `until` and flagged as open. Closing events with no matching
/// RESUMED (the activity came up before the query window) are ignored, as
/// are repeated RESUMED events for an activity that is already open.
pub fn foreground_intervals(events: &[UsageEvent], until: DateTime<Utc>) -> Vec<ForegroundInterval> {
    let mut sorted: Vec<&UsageEvent> = events.iter().collect();
    sorted.sort_by_key(|e| e.timestamp);

    let mut opened: HashMap<(&str, &str), DateTime<Utc>> = HashMap::new();
    let mut intervals = Vec::new();

    for event in sorted {
        let key = (event.app_id.as_str(), event.activity_id.as_str());
        match event.kind {
            EventKind::Resumed => {
                opened.entry(key).or_insert(event.timestamp);
            }
            EventKind::Paused | EventKind::Stopped => {
                if let Some(start) = opened.remove(&key) {
                    intervals.push(ForegroundInterval {
                        app_id: event.app_id.clone(),
                        activity_id: event.activity_id.clone(),
                        start,
                        end: event.timestamp,
                        open: false,
                    });
                }
            }
        }
    }

    let mut still_open: Vec<ForegroundInterval> = opened
        .into_iter()
        .map(|((app_id, activity_id), start)| ForegroundInterval {
            app_id: app_id.to_string(),
            activity_id: activity_id.to_string(),
            start,
            end: until.max(start),
            open: true,
        })
        .collect();
    still_open.sort_by_key(|i| i.start);
    intervals.extend(still_open);
    intervals
}

/// The app whose activity most recently came up and is still open.
pub fn latest_foreground_app(events: &[UsageEvent], until: DateTime<Utc>) -> Option<AppId> {
    foreground_intervals(events, until)
        .into_iter()
        .filter(|interval| interval.open)
        .max_by_key(|interval| interval.start)
        .map(|interval| interval.app_id)
}
