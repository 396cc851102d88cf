//! In-memory settings store for tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::types::SettingsMap;

use super::{SettingsStore, StoreError};

/// Settings store that keeps the map in memory.
#[derive(Debug, Default)]
pub struct InMemorySettingsStore {
    map: Mutex<SettingsMap>,
    write_count: AtomicUsize,
    should_fail_write: AtomicBool,
}

impl InMemorySettingsStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_map(map: SettingsMap) -> Self {
        Self {
            map: Mutex::new(map),
            ..Self::default()
        }
    }

    /// Returns a copy of the stored map.
    #[must_use]
    pub fn contents(&self) -> SettingsMap {
        self.map.lock().unwrap().clone()
    }

    #[must_use]
    pub fn write_count(&self) -> usize {
        self.write_count.load(Ordering::SeqCst)
    }

    pub fn set_should_fail_write(&self, should_fail: bool) {
        self.should_fail_write.store(should_fail, Ordering::SeqCst);
    }
}

impl SettingsStore for InMemorySettingsStore {
    async fn read(&self) -> Result<SettingsMap, StoreError> {
        Ok(self.map.lock().unwrap().clone())
    }

    async fn write(&self, map: &SettingsMap) -> Result<(), StoreError> {
        if self.should_fail_write.load(Ordering::SeqCst) {
            return Err(StoreError::Io(std::io::Error::other("simulated failure")));
        }
        *self.map.lock().unwrap() = map.clone();
        self.write_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
