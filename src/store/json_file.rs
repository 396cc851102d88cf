//! File-backed settings store.
//!
//! The whole settings map is stored as one JSON document. Writes go to a
//! sibling temporary file first and are then renamed over the original, so a
//! crash mid-write never leaves a truncated document behind.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::types::SettingsMap;

use super::{SettingsStore, StoreError};

/// Settings store persisted as a JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// Creates a store for the given file. The file is created on first write.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Returns the document path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "settings.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

/// Decodes a settings document.
///
/// A corrupted document decodes to an empty map. The file itself is left
/// untouched until the next write.
pub fn decode_settings(content: &str) -> SettingsMap {
    if content.trim().is_empty() {
        return SettingsMap::new();
    }
    match serde_json::from_str(content) {
        Ok(map) => map,
        Err(e) => {
            tracing::warn!("設定ファイルの解析に失敗しました。空の設定として扱います: {}", e);
            SettingsMap::new()
        }
    }
}

impl SettingsStore for JsonFileStore {
    async fn read(&self) -> Result<SettingsMap, StoreError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => Ok(decode_settings(&content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(SettingsMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, map: &SettingsMap) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(map)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let temp = self.temp_path();
        tokio::fs::write(&temp, &json).await?;
        tokio::fs::rename(&temp, &self.path).await?;

        tracing::debug!(path = ?self.path, apps = map.len(), "settings written");
        Ok(())
    }
}
