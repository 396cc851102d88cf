//! Foreground detection error types.

use thiserror::Error;

/// Errors that can occur while resolving the foreground app.
///
/// None of these are fatal to the monitor: a failed lookup is treated as
/// "no foreground app" and retried on the next tick.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DetectorError {
    /// Usage access was revoked or never granted.
    #[error("使用状況へのアクセス権限がありません")]
    PermissionDenied,

    /// The event source could not be read.
    #[error("使用状況イベントを読み込めません: {0}")]
    Source(String),
}

impl DetectorError {
    /// Returns true if this error is due to a missing permission.
    #[must_use]
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied)
    }

    /// Returns true if the monitor may keep running.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        true
    }
}

impl From<std::io::Error> for DetectorError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied,
            _ => Self::Source(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_io_permission_denied() {
        let err: DetectorError =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into();
        assert!(err.is_permission_denied());
    }

    #[test]
    fn test_from_io_other() {
        let err: DetectorError = std::io::Error::other("disk gone").into();
        assert!(!err.is_permission_denied());
        assert!(err.to_string().contains("disk gone"));
    }

    #[test]
    fn test_all_recoverable() {
        assert!(DetectorError::PermissionDenied.is_recoverable());
        assert!(DetectorError::Source("x".into()).is_recoverable());
    }
}
