//! Zen App Blocker Library
//!
//! This library provides the core functionality for the Zen CLI.
//! It includes:
//! - Blocking decision engine for per-app schedules and breaks
//! - Settings store with a single-writer service
//! - Foreground-app detection from usage transition events
//! - Monitoring loop, break timer and IPC server for the daemon
//! - CLI command parsing, IPC client and display utilities
//! - Type definitions for configuration and state

pub mod blocking;
pub mod cli;
pub mod config;
pub mod daemon;
pub mod detector;
pub mod platform;
pub mod store;
pub mod types;

// Re-export commonly used types for convenience
pub use types::{
    AppId, BlockedAppSettings, IpcRequest, IpcResponse, OverlayInfo, ResponseData, Schedule,
    SettingsMap, TimeBlock,
};

// Re-export the decision engine
pub use blocking::{
    describe_schedule, effectively_blocked_app_set, is_blocked_by_schedule,
    is_effectively_blocked_now,
};

// Re-export store types
pub use store::{InMemorySettingsStore, JsonFileStore, SettingsService, SettingsStore, StoreError};

// Re-export detector types
pub use detector::{
    DetectorError, EventKind, EventLogDetector, ForegroundDetector, JsonLinesEventSource,
    MockForegroundDetector, UsageEvent, UsageEventSource,
};

// Re-export platform collaborators
pub use platform::{
    AppCatalog, Clock, ConfigAppCatalog, MockClock, Permission, PermissionProbe, PermissionSet,
    SystemClock,
};

// Re-export daemon types
pub use config::{ConfigError, ZenConfig};
pub use daemon::{
    run_daemon, BreakError, BreakTimer, Monitor, MonitorSignal, MonitorStatus, OverlayEvent,
};
