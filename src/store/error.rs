//! Settings store error types.

use thiserror::Error;

/// Errors that can occur while reading or writing the settings map.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying file I/O failed.
    #[error("設定ファイルの入出力に失敗しました: {0}")]
    Io(#[from] std::io::Error),

    /// The settings map could not be encoded.
    #[error("設定のシリアライズに失敗しました: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An operation was attempted without an app identifier.
    #[error("アプリIDが指定されていません")]
    MissingAppId,

    /// The settings service has shut down.
    #[error("設定サービスは停止しています")]
    ServiceClosed,
}

impl StoreError {
    /// Returns true if a later attempt may succeed.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::ServiceClosed | Self::MissingAppId)
    }
}
