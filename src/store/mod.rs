//! Persistence of per-app blocking settings.
//!
//! The settings map is the only shared mutable state in the blocker. It is
//! written by the CLI (schedule edits), the overlay response (break start)
//! and the break timer (break end), and read by the monitor.
//!
//! # Architecture
//!
//! ```text
//!  CLI / IPC ──┐
//!  BreakTimer ─┼──▶ SettingsService ──(one command at a time)──▶ SettingsStore
//!  Monitor ────┘     (single writer)                              (JSON file)
//!                          │
//!                          └──▶ watch::Receiver<SettingsMap> (snapshots)
//! ```
//!
//! Every mutation is a read-modify-write of the whole map. Routing them all
//! through one task avoids lost updates between concurrent writers.

pub mod error;
pub mod json_file;
pub mod memory;
pub mod service;

use std::future::Future;
use std::sync::Arc;

use crate::types::SettingsMap;

pub use error::StoreError;
pub use json_file::JsonFileStore;
pub use memory::InMemorySettingsStore;
pub use service::SettingsService;

/// Durable storage for the settings map.
///
/// A store reads and writes the whole document; it does not need to
/// provide transactions. [`SettingsService`] serializes writers.
pub trait SettingsStore: Send + Sync + 'static {
    /// Reads the latest committed map.
    fn read(&self) -> impl Future<Output = Result<SettingsMap, StoreError>> + Send;

    /// Replaces the stored map.
    fn write(&self, map: &SettingsMap) -> impl Future<Output = Result<(), StoreError>> + Send;
}

impl<S: SettingsStore> SettingsStore for Arc<S> {
    fn read(&self) -> impl Future<Output = Result<SettingsMap, StoreError>> + Send {
        S::read(self)
    }

    fn write(&self, map: &SettingsMap) -> impl Future<Output = Result<(), StoreError>> + Send {
        S::write(self, map)
    }
}
