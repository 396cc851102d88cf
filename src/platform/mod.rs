//! Platform collaborators used by the monitor and the break timer.
//!
//! - [`PermissionProbe`]: which platform permissions are currently granted
//! - [`AppCatalog`]: resolves an app id to a human-readable name
//! - [`Clock`]: current wall-clock time of day
//!
//! Permissions can be granted or revoked at any time by the user, so callers
//! must check them on every cycle instead of caching the answer.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, RwLock};

use chrono::{Local, NaiveTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::AppId;

// ============================================================================
// Permission
// ============================================================================

/// Platform permissions the blocker depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    /// Access to usage statistics (poll-driven foreground detection)
    UsageStats,
    /// Window-state notifications (event-driven foreground detection)
    ForegroundDetection,
    /// Drawing over other apps (the block overlay)
    Overlay,
    /// Scheduling exact one-shot alarms (the break timer)
    ExactAlarm,
}

impl Permission {
    /// All known permissions.
    pub const ALL: [Permission; 4] = [
        Permission::UsageStats,
        Permission::ForegroundDetection,
        Permission::Overlay,
        Permission::ExactAlarm,
    ];

    /// Returns the string representation of the permission.
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::UsageStats => "usage_stats",
            Permission::ForegroundDetection => "foreground_detection",
            Permission::Overlay => "overlay",
            Permission::ExactAlarm => "exact_alarm",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Permission::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("不明な権限です: {s}"))
    }
}

/// Answers whether a permission is currently granted.
pub trait PermissionProbe: Send + Sync {
    /// Returns true if the permission is granted right now.
    fn is_granted(&self, permission: Permission) -> bool;
}

impl fmt::Debug for dyn PermissionProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let granted: Vec<_> = Permission::ALL
            .into_iter()
            .filter(|p| self.is_granted(*p))
            .collect();
        f.debug_struct("PermissionProbe")
            .field("granted", &granted)
            .finish()
    }
}

/// Permission set reported by the platform shim.
///
/// Grants can change while the daemon runs.
#[derive(Debug)]
pub struct PermissionSet {
    granted: RwLock<HashSet<Permission>>,
}

impl PermissionSet {
    /// Creates a set with the given permissions granted.
    pub fn new(granted: impl IntoIterator<Item = Permission>) -> Self {
        Self {
            granted: RwLock::new(granted.into_iter().collect()),
        }
    }

    /// Creates a set with every permission granted.
    pub fn all() -> Self {
        Self::new(Permission::ALL)
    }

    /// Grants or revokes a permission.
    pub fn set(&self, permission: Permission, granted: bool) {
        let mut set = self.granted.write().unwrap_or_else(|e| e.into_inner());
        if granted {
            set.insert(permission);
        } else {
            set.remove(&permission);
        }
    }

    /// Returns the granted permissions in declaration order.
    pub fn granted(&self) -> Vec<Permission> {
        let set = self.granted.read().unwrap_or_else(|e| e.into_inner());
        Permission::ALL
            .into_iter()
            .filter(|p| set.contains(p))
            .collect()
    }
}

impl Default for PermissionSet {
    fn default() -> Self {
        Self::all()
    }
}

impl PermissionProbe for PermissionSet {
    fn is_granted(&self, permission: Permission) -> bool {
        self.granted
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&permission)
    }
}

// ============================================================================
// AppCatalog
// ============================================================================

/// App lookup errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// The app is not installed (or was uninstalled mid-session).
    #[error("アプリ '{0}' が見つかりません")]
    NotFound(AppId),
}

/// Resolves app ids to display names.
pub trait AppCatalog: Send + Sync {
    /// Returns the display name of the app.
    fn display_name(&self, app_id: &str) -> Result<String, CatalogError>;
}

/// Catalog backed by the `app_names` table of the config file.
#[derive(Debug, Default)]
pub struct ConfigAppCatalog {
    names: Mutex<HashMap<AppId, String>>,
}

impl ConfigAppCatalog {
    /// Creates a catalog from an id → name table.
    pub fn new(names: HashMap<AppId, String>) -> Self {
        Self {
            names: Mutex::new(names),
        }
    }

    /// Registers or renames an app.
    pub fn insert(&self, app_id: impl Into<AppId>, name: impl Into<String>) {
        self.names
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(app_id.into(), name.into());
    }

    /// Forgets an app, as if it had been uninstalled.
    pub fn remove(&self, app_id: &str) {
        self.names
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(app_id);
    }
}

impl AppCatalog for ConfigAppCatalog {
    fn display_name(&self, app_id: &str) -> Result<String, CatalogError> {
        self.names
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(app_id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(app_id.to_string()))
    }
}

/// Resolves a display name, falling back to the raw identifier.
pub fn display_name_or_id(catalog: &dyn AppCatalog, app_id: &str) -> String {
    match catalog.display_name(app_id) {
        Ok(name) => name,
        Err(e) => {
            tracing::warn!("{}。パッケージ名を表示に使用します", e);
            app_id.to_string()
        }
    }
}

// ============================================================================
// Clock
// ============================================================================

/// Source of the current time of day.
pub trait Clock: Send + Sync {
    /// Current local wall-clock time, without a date.
    fn now(&self) -> NaiveTime;
}

/// Local system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveTime {
        Local::now().time()
    }
}

/// Settable clock for tests.
#[derive(Debug)]
pub struct MockClock {
    now: Mutex<NaiveTime>,
}

impl MockClock {
    #[must_use]
    pub fn new(now: NaiveTime) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: NaiveTime) {
        *self.now.lock().unwrap() = now;
    }
}

impl Clock for MockClock {
    fn now(&self) -> NaiveTime {
        *self.now.lock().unwrap()
    }
}
