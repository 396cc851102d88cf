//! Blocking decision engine.
//!
//! Pure functions that decide whether an app is blocked at a given time of
//! day. Nothing here performs I/O, so nothing here can fail:
//!
//! - [`is_blocked_by_schedule`]: evaluates a list of windows
//! - [`is_effectively_blocked_now`]: combines the schedule with the break flag
//! - [`effectively_blocked_app_set`]: the blocked-set view over all settings
//! - [`describe_schedule`]: human-readable schedule summary
//!
//! The blocked set is a view. It is computed from a fresh settings read on
//! every query and never stored.

use std::collections::BTreeSet;

use chrono::NaiveTime;

use crate::types::{AppId, BlockedAppSettings, Schedule, SettingsMap, TimeBlock};

/// Returns true if any block covers `now`.
///
/// An empty list never blocks. The whole-day block short-circuits to true.
pub fn is_blocked_by_schedule(blocks: &[TimeBlock], now: NaiveTime) -> bool {
    if blocks.is_empty() {
        return false;
    }
    blocks.iter().any(|block| block.contains(now))
}

impl Schedule {
    /// Returns true if this schedule blocks at `now`.
    pub fn is_blocked_at(&self, now: NaiveTime) -> bool {
        match self {
            Schedule::Unrestricted => false,
            Schedule::AlwaysBlocked => true,
            Schedule::Custom(blocks) => is_blocked_by_schedule(blocks, now),
        }
    }
}

/// Final verdict for one app.
///
/// Unconfigured apps are never blocked and a break always wins over the
/// schedule.
pub fn is_effectively_blocked_now(settings: Option<&BlockedAppSettings>, now: NaiveTime) -> bool {
    match settings {
        None => false,
        Some(settings) if settings.is_on_break => false,
        Some(settings) => settings.schedule.is_blocked_at(now),
    }
}

/// Identifiers of every app that is effectively blocked at `now`.
pub fn effectively_blocked_app_set(all_settings: &SettingsMap, now: NaiveTime) -> BTreeSet<AppId> {
    all_settings
        .iter()
        .filter(|(_, settings)| is_effectively_blocked_now(Some(settings), now))
        .map(|(app_id, _)| app_id.clone())
        .collect()
}

/// Describes a schedule for display.
///
/// Windows are listed in insertion order as `HH:MM - HH:MM`.
pub fn describe_schedule(schedule: &Schedule) -> String {
    let blocks = schedule.blocks();
    if blocks.iter().any(TimeBlock::is_all_day) {
        return "終日ブロック".to_string();
    }
    if blocks.is_empty() {
        return "制限なし".to_string();
    }
    blocks
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

// ============================================================================
// Tests
// ============================================================================
