//! Core data types for Zen.
//!
//! This module defines the data structures used for:
//! - Recurring daily block windows (`TimeBlock`)
//! - Per-app schedules and break state (`Schedule`, `BlockedAppSettings`)
//! - IPC request/response serialization

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::platform::Permission;

/// Platform package / bundle identifier of an app.
pub type AppId = String;

/// Mapping from app identifier to its blocking configuration.
///
/// Persisted as a single document by the settings store.
pub type SettingsMap = BTreeMap<AppId, BlockedAppSettings>;

/// Start of the day (00:00:00).
pub fn day_start() -> NaiveTime {
    NaiveTime::default()
}

/// Largest representable time of day (23:59:59.999999999).
pub fn day_end() -> NaiveTime {
    NaiveTime::from_hms_nano_opt(23, 59, 59, 999_999_999).unwrap_or_default()
}

// ============================================================================
// TimeBlock
// ============================================================================

/// A recurring daily window `[start_time, end_time)`.
///
/// When `start_time > end_time` the window crosses midnight and covers
/// `[start_time, 24:00)` plus `[00:00, end_time)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeBlock {
    /// Inclusive start of the window
    #[serde(rename = "startTime")]
    pub start_time: NaiveTime,
    /// Exclusive end of the window
    #[serde(rename = "endTime")]
    pub end_time: NaiveTime,
}

impl TimeBlock {
    /// Creates a new block from its start and end times.
    pub fn new(start_time: NaiveTime, end_time: NaiveTime) -> Self {
        Self {
            start_time,
            end_time,
        }
    }

    /// Creates the block covering the entire day (00:00 to 23:59:59.999...).
    pub fn all_day() -> Self {
        Self::new(day_start(), day_end())
    }

    /// Returns true if this is the whole-day block.
    pub fn is_all_day(&self) -> bool {
        self.start_time == day_start() && self.end_time == day_end()
    }

    /// Returns true if the window wraps past midnight.
    pub fn crosses_midnight(&self) -> bool {
        self.start_time > self.end_time
    }

    /// Returns true if `now` falls inside this window.
    ///
    /// A block with `start_time == end_time` (other than the whole-day block)
    /// is empty and contains nothing.
    pub fn contains(&self, now: NaiveTime) -> bool {
        if self.is_all_day() {
            return true;
        }
        if self.crosses_midnight() {
            now >= self.start_time || now < self.end_time
        } else {
            self.start_time <= now && now < self.end_time
        }
    }
}

impl fmt::Display for TimeBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {}",
            self.start_time.format("%H:%M"),
            self.end_time.format("%H:%M")
        )
    }
}

/// Parses a time of day written as `HH:MM` or `HH:MM:SS`.
pub fn parse_time_of_day(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .ok()
}

impl FromStr for TimeBlock {
    type Err = String;

    /// Parses `HH:MM-HH:MM` (seconds optional on either side).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (start, end) = s
            .split_once('-')
            .ok_or_else(|| format!("時間帯は HH:MM-HH:MM の形式で指定してください: {s}"))?;

        let start_time = parse_time_of_day(start)
            .ok_or_else(|| format!("開始時刻が不正です: {}", start.trim()))?;
        let end_time =
            parse_time_of_day(end).ok_or_else(|| format!("終了時刻が不正です: {}", end.trim()))?;

        Ok(Self::new(start_time, end_time))
    }
}

// ============================================================================
// Schedule
// ============================================================================

/// Blocking schedule of a single app.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "blocks", rename_all = "snake_case")]
pub enum Schedule {
    /// Never blocked by schedule
    #[default]
    Unrestricted,
    /// Blocked all day, every day
    AlwaysBlocked,
    /// Blocked during any of the listed windows (insertion order kept)
    Custom(Vec<TimeBlock>),
}

impl Schedule {
    /// Builds a schedule from a plain list of blocks.
    ///
    /// An empty list becomes `Unrestricted` and a list holding only the
    /// whole-day block becomes `AlwaysBlocked`.
    pub fn from_blocks(blocks: Vec<TimeBlock>) -> Self {
        match blocks.as_slice() {
            [] => Schedule::Unrestricted,
            [only] if only.is_all_day() => Schedule::AlwaysBlocked,
            _ => Schedule::Custom(blocks),
        }
    }

    /// Returns the schedule as a list of blocks.
    pub fn blocks(&self) -> Vec<TimeBlock> {
        match self {
            Schedule::Unrestricted => Vec::new(),
            Schedule::AlwaysBlocked => vec![TimeBlock::all_day()],
            Schedule::Custom(blocks) => blocks.clone(),
        }
    }

    /// Returns true if the app is blocked for the whole day.
    pub fn is_always_blocked(&self) -> bool {
        matches!(self, Schedule::AlwaysBlocked)
    }

    /// Returns true if there is nothing to block.
    pub fn is_unrestricted(&self) -> bool {
        match self {
            Schedule::Unrestricted => true,
            Schedule::AlwaysBlocked => false,
            Schedule::Custom(blocks) => blocks.is_empty(),
        }
    }
}

// ============================================================================
// BlockedAppSettings
// ============================================================================

/// Blocking configuration for one app.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BlockedAppSettings {
    /// App identifier (may be absent only transiently)
    #[serde(rename = "appId", default)]
    pub app_id: Option<AppId>,
    /// Block schedule
    #[serde(default)]
    pub schedule: Schedule,
    /// Temporary override that suppresses blocking
    #[serde(rename = "isOnBreak", default)]
    pub is_on_break: bool,
}

impl BlockedAppSettings {
    /// Creates settings with an empty schedule for the given app.
    pub fn new(app_id: impl Into<AppId>) -> Self {
        Self {
            app_id: Some(app_id.into()),
            schedule: Schedule::Unrestricted,
            is_on_break: false,
        }
    }

    /// Replaces the schedule.
    pub fn with_schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = schedule;
        self
    }

    /// Sets the break flag.
    pub fn with_break(mut self, is_on_break: bool) -> Self {
        self.is_on_break = is_on_break;
        self
    }

    /// Returns true if the schedule blocks the whole day.
    pub fn is_effectively_always_blocked(&self) -> bool {
        self.schedule.is_always_blocked()
    }
}

// ============================================================================
// IPC Types
// ============================================================================

/// IPC request from client to daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum IpcRequest {
    /// Query daemon status
    Status,
    /// List every configured app
    List,
    /// Replace the schedule of an app (creating its configuration)
    Schedule {
        /// Target app
        #[serde(rename = "appId")]
        app_id: AppId,
        /// New schedule
        schedule: Schedule,
    },
    /// Remove an app from the block list
    Remove {
        /// Target app
        #[serde(rename = "appId")]
        app_id: AppId,
    },
    /// User chose to continue into the app for a while
    GrantBreak {
        /// Target app
        #[serde(rename = "appId")]
        app_id: AppId,
    },
    /// User chose to leave the app
    Dismiss {
        /// Target app
        #[serde(rename = "appId")]
        app_id: AppId,
    },
    /// Foreground app changed (window state notification)
    Foreground {
        /// New foreground app, if known
        #[serde(rename = "appId", default, skip_serializing_if = "Option::is_none")]
        app_id: Option<AppId>,
    },
    /// Display turned on or off
    Display {
        /// Whether the display is on
        on: bool,
    },
    /// The platform granted or revoked a permission
    Permission {
        /// Affected permission
        permission: Permission,
        /// Whether it is granted now
        granted: bool,
    },
    /// Stop the daemon
    Shutdown,
}

/// Overlay currently presented to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlayInfo {
    /// Blocked app
    #[serde(rename = "appId")]
    pub app_id: AppId,
    /// Human-readable app name
    #[serde(rename = "displayName")]
    pub display_name: String,
}

/// Response data for IPC responses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseData {
    /// Configured apps
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apps: Option<SettingsMap>,
    /// Apps blocked right now
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked: Option<Vec<AppId>>,
    /// Overlay currently shown
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overlay: Option<OverlayInfo>,
    /// Last known foreground app
    #[serde(skip_serializing_if = "Option::is_none")]
    pub foreground: Option<AppId>,
    /// Display state
    #[serde(rename = "displayOn", skip_serializing_if = "Option::is_none")]
    pub display_on: Option<bool>,
    /// Break length in seconds
    #[serde(rename = "breakSeconds", skip_serializing_if = "Option::is_none")]
    pub break_seconds: Option<u64>,
    /// Poll interval in seconds
    #[serde(rename = "pollIntervalSeconds", skip_serializing_if = "Option::is_none")]
    pub poll_interval_seconds: Option<u64>,
    /// Permissions currently granted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Vec<Permission>>,
}

/// IPC response from daemon to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpcResponse {
    /// Response status ("success" or "error")
    pub status: String,
    /// Human-readable message
    pub message: String,
    /// Optional response data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ResponseData>,
}

impl IpcResponse {
    /// Creates a success response.
    pub fn success(message: impl Into<String>, data: Option<ResponseData>) -> Self {
        Self {
            status: "success".to_string(),
            message: message.into(),
            data,
        }
    }

    /// Creates an error response.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
            data: None,
        }
    }

    /// Returns true if this is a success response.
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    // ------------------------------------------------------------------------
    // TimeBlock Tests
    // ------------------------------------------------------------------------

    mod time_block_tests {
        use super::*;

        #[test]
        fn test_all_day_bounds() {
            let block = TimeBlock::all_day();
            assert_eq!(block.start_time, t(0, 0));
            assert_eq!(
                block.end_time,
                NaiveTime::from_hms_nano_opt(23, 59, 59, 999_999_999).unwrap()
            );
            assert!(block.is_all_day());
            assert!(!block.crosses_midnight());
        }

        #[test]
        fn test_crosses_midnight() {
            assert!(TimeBlock::new(t(22, 0), t(6, 0)).crosses_midnight());
            assert!(!TimeBlock::new(t(9, 0), t(17, 0)).crosses_midnight());
            assert!(!TimeBlock::new(t(9, 0), t(9, 0)).crosses_midnight());
        }

        #[test]
        fn test_contains_same_day_is_half_open() {
            let block = TimeBlock::new(t(9, 0), t(17, 0));
            assert!(block.contains(t(9, 0)));
            assert!(block.contains(t(16, 59)));
            assert!(!block.contains(t(17, 0)));
            assert!(!block.contains(t(8, 59)));
        }

        #[test]
        fn test_contains_zero_length_matches_nothing() {
            let block = TimeBlock::new(t(9, 0), t(9, 0));
            assert!(!block.contains(t(9, 0)));
            assert!(!block.contains(t(0, 0)));
            assert!(!block.contains(t(23, 59)));
        }

        #[test]
        fn test_display() {
            let block = TimeBlock::new(t(22, 0), t(6, 30));
            assert_eq!(block.to_string(), "22:00 - 06:30");
        }

        #[test]
        fn test_parse_hh_mm() {
            let block: TimeBlock = "22:00-06:00".parse().unwrap();
            assert_eq!(block, TimeBlock::new(t(22, 0), t(6, 0)));
        }

        #[test]
        fn test_parse_with_seconds_and_spaces() {
            let block: TimeBlock = " 09:00:30 - 17:00 ".parse().unwrap();
            assert_eq!(block.start_time, NaiveTime::from_hms_opt(9, 0, 30).unwrap());
            assert_eq!(block.end_time, t(17, 0));
        }

        #[test]
        fn test_parse_invalid() {
            assert!("0900".parse::<TimeBlock>().is_err());
            assert!("25:00-06:00".parse::<TimeBlock>().is_err());
            assert!("09:00-xx".parse::<TimeBlock>().is_err());
        }

        #[test]
        fn test_serialize_midnight_crossing_roundtrip() {
            let block = TimeBlock::new(
                NaiveTime::from_hms_milli_opt(22, 15, 30, 250).unwrap(),
                t(6, 0),
            );
            let settings = BlockedAppSettings::new("com.example.video")
                .with_schedule(Schedule::Custom(vec![block]));

            let json = serde_json::to_string(&settings).unwrap();
            let restored: BlockedAppSettings = serde_json::from_str(&json).unwrap();

            let restored_block = restored.schedule.blocks()[0];
            assert_eq!(restored_block.start_time, block.start_time);
            assert_eq!(restored_block.end_time, block.end_time);
            assert_eq!(restored, settings);
        }

        #[test]
        fn test_serialized_field_names() {
            let block = TimeBlock::new(t(9, 0), t(17, 0));
            let json = serde_json::to_string(&block).unwrap();
            assert_eq!(json, r#"{"startTime":"09:00:00","endTime":"17:00:00"}"#);
        }
    }

    // ------------------------------------------------------------------------
    // Schedule Tests
    // ------------------------------------------------------------------------

    mod schedule_tests {
        use super::*;

        #[test]
        fn test_default_is_unrestricted() {
            assert_eq!(Schedule::default(), Schedule::Unrestricted);
        }

        #[test]
        fn test_from_blocks_normalizes() {
            assert_eq!(Schedule::from_blocks(vec![]), Schedule::Unrestricted);
            assert_eq!(
                Schedule::from_blocks(vec![TimeBlock::all_day()]),
                Schedule::AlwaysBlocked
            );

            let blocks = vec![TimeBlock::new(t(9, 0), t(12, 0))];
            assert_eq!(
                Schedule::from_blocks(blocks.clone()),
                Schedule::Custom(blocks)
            );
        }

        #[test]
        fn test_blocks_view() {
            assert!(Schedule::Unrestricted.blocks().is_empty());
            assert_eq!(Schedule::AlwaysBlocked.blocks(), vec![TimeBlock::all_day()]);
        }

        #[test]
        fn test_insertion_order_preserved() {
            let blocks = vec![
                TimeBlock::new(t(20, 0), t(22, 0)),
                TimeBlock::new(t(8, 0), t(9, 0)),
            ];
            let schedule = Schedule::from_blocks(blocks.clone());
            assert_eq!(schedule.blocks(), blocks);
        }

        #[test]
        fn test_is_unrestricted() {
            assert!(Schedule::Unrestricted.is_unrestricted());
            assert!(Schedule::Custom(vec![]).is_unrestricted());
            assert!(!Schedule::AlwaysBlocked.is_unrestricted());
        }

        #[test]
        fn test_serialize_tags() {
            let json = serde_json::to_string(&Schedule::AlwaysBlocked).unwrap();
            assert_eq!(json, r#"{"kind":"always_blocked"}"#);

            let json = serde_json::to_string(&Schedule::Unrestricted).unwrap();
            assert_eq!(json, r#"{"kind":"unrestricted"}"#);

            let restored: Schedule = serde_json::from_str(
                r#"{"kind":"custom","blocks":[{"startTime":"22:00:00","endTime":"06:00:00"}]}"#,
            )
            .unwrap();
            assert_eq!(
                restored,
                Schedule::Custom(vec![TimeBlock::new(t(22, 0), t(6, 0))])
            );
        }
    }

    // ------------------------------------------------------------------------
    // BlockedAppSettings Tests
    // ------------------------------------------------------------------------

    mod settings_tests {
        use super::*;

        #[test]
        fn test_new_has_empty_schedule() {
            let settings = BlockedAppSettings::new("com.example");
            assert_eq!(settings.app_id.as_deref(), Some("com.example"));
            assert_eq!(settings.schedule, Schedule::Unrestricted);
            assert!(!settings.is_on_break);
        }

        #[test]
        fn test_effectively_always_blocked() {
            let settings =
                BlockedAppSettings::new("com.example").with_schedule(Schedule::AlwaysBlocked);
            assert!(settings.is_effectively_always_blocked());

            let settings = BlockedAppSettings::new("com.example")
                .with_schedule(Schedule::from_blocks(vec![TimeBlock::new(t(0, 0), t(12, 0))]));
            assert!(!settings.is_effectively_always_blocked());
        }

        #[test]
        fn test_deserialize_missing_fields_uses_defaults() {
            let settings: BlockedAppSettings = serde_json::from_str(r#"{"appId":"a"}"#).unwrap();
            assert_eq!(settings.schedule, Schedule::Unrestricted);
            assert!(!settings.is_on_break);
        }

        #[test]
        fn test_deserialize_ignores_unknown_fields() {
            let settings: BlockedAppSettings =
                serde_json::from_str(r#"{"appId":"a","isAlwaysBlocked":true,"isOnBreak":true}"#)
                    .unwrap();
            assert!(settings.is_on_break);
        }
    }

    // ------------------------------------------------------------------------
    // IPC Type Tests
    // ------------------------------------------------------------------------

    mod ipc_tests {
        use super::*;

        #[test]
        fn test_request_status() {
            let request: IpcRequest = serde_json::from_str(r#"{"command":"status"}"#).unwrap();
            assert!(matches!(request, IpcRequest::Status));
        }

        #[test]
        fn test_request_grant_break() {
            let request: IpcRequest =
                serde_json::from_str(r#"{"command":"grantBreak","appId":"com.example"}"#).unwrap();
            match request {
                IpcRequest::GrantBreak { app_id } => assert_eq!(app_id, "com.example"),
                _ => panic!("Expected GrantBreak request"),
            }
        }

        #[test]
        fn test_request_foreground_without_app() {
            let request: IpcRequest = serde_json::from_str(r#"{"command":"foreground"}"#).unwrap();
            assert!(matches!(request, IpcRequest::Foreground { app_id: None }));
        }

        #[test]
        fn test_request_permission() {
            let request: IpcRequest = serde_json::from_str(
                r#"{"command":"permission","permission":"usage_stats","granted":true}"#,
            )
            .unwrap();
            match request {
                IpcRequest::Permission {
                    permission,
                    granted,
                } => {
                    assert_eq!(permission, Permission::UsageStats);
                    assert!(granted);
                }
                _ => panic!("Expected Permission request"),
            }
        }

        #[test]
        fn test_request_schedule_roundtrip() {
            let request = IpcRequest::Schedule {
                app_id: "com.example".to_string(),
                schedule: Schedule::AlwaysBlocked,
            };
            let json = serde_json::to_string(&request).unwrap();
            assert!(json.contains(r#""command":"schedule""#));

            let restored: IpcRequest = serde_json::from_str(&json).unwrap();
            match restored {
                IpcRequest::Schedule { app_id, schedule } => {
                    assert_eq!(app_id, "com.example");
                    assert_eq!(schedule, Schedule::AlwaysBlocked);
                }
                _ => panic!("Expected Schedule request"),
            }
        }

        #[test]
        fn test_response_success() {
            let response = IpcResponse::success("ok", None);
            assert!(response.is_success());
            let json = serde_json::to_string(&response).unwrap();
            assert!(!json.contains("data"));
        }

        #[test]
        fn test_response_error() {
            let response = IpcResponse::error("失敗");
            assert!(!response.is_success());
            assert_eq!(response.message, "失敗");
        }

        #[test]
        fn test_response_data_skips_empty_fields() {
            let data = ResponseData {
                display_on: Some(true),
                ..Default::default()
            };
            let json = serde_json::to_string(&data).unwrap();
            assert_eq!(json, r#"{"displayOn":true}"#);
        }
    }
}
