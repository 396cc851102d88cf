//! IPC server for the Zen daemon.
//!
//! This module provides Unix Domain Socket IPC functionality:
//! - Server that listens on a Unix socket
//! - Request/response handling for blocker commands
//! - Dispatch to the settings service, break timer and monitor

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, watch};
use tokio::time::{timeout, Duration};
use tokio_util::sync::CancellationToken;

use crate::blocking::is_effectively_blocked_now;
use crate::platform::{Clock, Permission, PermissionSet, SystemClock};
use crate::store::SettingsService;
use crate::types::{AppId, IpcRequest, IpcResponse, ResponseData, Schedule};

use super::break_timer::BreakTimer;
use super::monitor::{MonitorSignal, MonitorStatus, DEFAULT_POLL_INTERVAL_SECS};
use super::OverlaySlot;

// ============================================================================
// Constants
// ============================================================================

/// Default socket path
pub const DEFAULT_SOCKET_PATH: &str = "~/.zen/zen.sock";

/// Maximum request size in bytes (64KB)
const MAX_REQUEST_SIZE: usize = 65536;

/// Read timeout in seconds
const READ_TIMEOUT_SECS: u64 = 5;

// ============================================================================
// IpcError
// ============================================================================

/// IPC-specific error types.
#[derive(Debug, thiserror::Error)]
pub enum IpcError {
    /// Read error
    #[error("Failed to read request: {0}")]
    ReadError(String),

    /// Timeout error
    #[error("Operation timed out")]
    Timeout,

    /// Request too large
    #[error("Request too large (max {MAX_REQUEST_SIZE} bytes)")]
    RequestTooLarge,

    /// Empty request
    #[error("Connection closed by client")]
    EmptyRequest,
}

impl IpcError {
    /// Returns true if the client may retry with the same request.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::ReadError(_) | Self::Timeout)
    }
}

// ============================================================================
// IpcServer
// ============================================================================

/// Unix Domain Socket IPC server.
pub struct IpcServer {
    /// Unix socket listener
    listener: UnixListener,
    /// Socket path (for cleanup)
    socket_path: PathBuf,
}

impl IpcServer {
    /// Creates a new IPC server bound to the specified socket path.
    ///
    /// If the socket file already exists, it will be removed before binding.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot be bound.
    pub fn new(socket_path: &Path) -> Result<Self> {
        if socket_path.exists() {
            std::fs::remove_file(socket_path)
                .with_context(|| format!("Failed to remove existing socket: {:?}", socket_path))?;
        }

        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create socket directory: {:?}", parent))?;
        }

        let listener = UnixListener::bind(socket_path)
            .with_context(|| format!("Failed to bind Unix socket: {:?}", socket_path))?;

        Ok(Self {
            listener,
            socket_path: socket_path.to_path_buf(),
        })
    }

    /// Accepts an incoming client connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be accepted.
    pub async fn accept(&self) -> Result<UnixStream> {
        let (stream, _addr) = self
            .listener
            .accept()
            .await
            .context("Failed to accept connection")?;
        Ok(stream)
    }

    /// Receives and deserializes an IPC request from the stream.
    ///
    /// Reads until the client shuts down its write half, with a timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if reading or deserialization fails.
    pub async fn receive_request(stream: &mut UnixStream) -> Result<IpcRequest> {
        let mut buffer = Vec::new();
        let limit = (MAX_REQUEST_SIZE + 1) as u64;

        let read_result = timeout(
            Duration::from_secs(READ_TIMEOUT_SECS),
            (&mut *stream).take(limit).read_to_end(&mut buffer),
        )
        .await;

        match read_result {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(IpcError::ReadError(e.to_string()).into()),
            Err(_) => return Err(IpcError::Timeout.into()),
        }

        if buffer.is_empty() {
            return Err(IpcError::EmptyRequest.into());
        }
        if buffer.len() > MAX_REQUEST_SIZE {
            return Err(IpcError::RequestTooLarge.into());
        }

        let request: IpcRequest = serde_json::from_slice(&buffer)
            .with_context(|| "Failed to deserialize IPC request")?;

        Ok(request)
    }

    /// Serializes and sends an IPC response to the stream.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub async fn send_response(stream: &mut UnixStream, response: &IpcResponse) -> Result<()> {
        let json = serde_json::to_vec(response).context("Failed to serialize IPC response")?;

        stream
            .write_all(&json)
            .await
            .context("Failed to write response")?;
        stream.flush().await.context("Failed to flush response")?;

        Ok(())
    }

    /// Serves requests until `cancel` fires.
    ///
    /// Each connection carries one request and is handled on its own task.
    pub async fn serve(self, handler: Arc<RequestHandler>, cancel: CancellationToken) {
        tracing::info!("IPCサーバーを起動しました: {:?}", self.socket_path);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("ipc server cancelled");
                    break;
                }
                accepted = self.accept() => {
                    let mut stream = match accepted {
                        Ok(stream) => stream,
                        Err(e) => {
                            tracing::warn!("接続の受け付けに失敗しました: {:#}", e);
                            continue;
                        }
                    };
                    let handler = handler.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(&mut stream, &handler).await {
                            tracing::warn!("リクエストの処理に失敗しました: {:#}", e);
                        }
                    });
                }
            }
        }
    }

    /// Returns the socket path.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

async fn handle_connection(stream: &mut UnixStream, handler: &RequestHandler) -> Result<()> {
    let response = match IpcServer::receive_request(stream).await {
        Ok(request) => {
            tracing::debug!(?request, "ipc request");
            handler.handle(request).await
        }
        Err(e) => IpcResponse::error(format!("不正なリクエストです: {:#}", e)),
    };
    IpcServer::send_response(stream, &response).await
}

// ============================================================================
// RequestHandler
// ============================================================================

/// Handles IPC requests by dispatching to the daemon components.
pub struct RequestHandler {
    /// Settings service
    settings: SettingsService,
    /// Break timer
    break_timer: BreakTimer,
    /// Monitor signal sender
    monitor_tx: mpsc::UnboundedSender<MonitorSignal>,
    /// Monitor status snapshots
    monitor_status: watch::Receiver<MonitorStatus>,
    /// Overlay currently shown
    overlay: OverlaySlot,
    /// Permissions shared with the monitor and break timer
    permissions: Arc<PermissionSet>,
    /// Wall clock for the blocked set
    clock: Arc<dyn Clock>,
    /// Poll interval reported by `status`
    poll_interval: Duration,
    /// Daemon shutdown trigger
    shutdown: CancellationToken,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(
        settings: SettingsService,
        break_timer: BreakTimer,
        monitor_tx: mpsc::UnboundedSender<MonitorSignal>,
        monitor_status: watch::Receiver<MonitorStatus>,
        overlay: OverlaySlot,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            settings,
            break_timer,
            monitor_tx,
            monitor_status,
            overlay,
            permissions: Arc::new(PermissionSet::all()),
            clock: Arc::new(SystemClock),
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            shutdown,
        }
    }

    pub fn with_permissions(mut self, permissions: Arc<PermissionSet>) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Handles an IPC request and returns the appropriate response.
    pub async fn handle(&self, request: IpcRequest) -> IpcResponse {
        match request {
            IpcRequest::Status => self.handle_status().await,
            IpcRequest::List => self.handle_list().await,
            IpcRequest::Schedule { app_id, schedule } => {
                self.handle_schedule(app_id, schedule).await
            }
            IpcRequest::Remove { app_id } => self.handle_remove(app_id).await,
            IpcRequest::GrantBreak { app_id } => self.handle_grant_break(app_id).await,
            IpcRequest::Dismiss { app_id } => self.handle_dismiss(app_id).await,
            IpcRequest::Foreground { app_id } => self.handle_foreground(app_id),
            IpcRequest::Display { on } => self.handle_display(on),
            IpcRequest::Permission {
                permission,
                granted,
            } => self.handle_permission(permission, granted),
            IpcRequest::Shutdown => self.handle_shutdown(),
        }
    }

    /// Handles the status command.
    async fn handle_status(&self) -> IpcResponse {
        let blocked = match self.settings.blocked_now(self.clock.now()).await {
            Ok(blocked) => blocked.into_iter().collect(),
            Err(e) => return IpcResponse::error(e.to_string()),
        };
        let status = self.monitor_status.borrow().clone();

        IpcResponse::success(
            "",
            Some(ResponseData {
                blocked: Some(blocked),
                overlay: self.overlay.lock().await.clone(),
                foreground: status.foreground,
                display_on: Some(status.display_on),
                break_seconds: Some(self.break_timer.duration().as_secs()),
                poll_interval_seconds: Some(self.poll_interval.as_secs()),
                permissions: Some(self.permissions.granted()),
                ..Default::default()
            }),
        )
    }

    /// Handles the list command.
    async fn handle_list(&self) -> IpcResponse {
        match self.settings.snapshot().await {
            Ok(apps) => IpcResponse::success(
                "",
                Some(ResponseData {
                    apps: Some(apps),
                    ..Default::default()
                }),
            ),
            Err(e) => IpcResponse::error(e.to_string()),
        }
    }

    /// Handles the schedule command.
    async fn handle_schedule(&self, app_id: AppId, schedule: Schedule) -> IpcResponse {
        let result = match schedule {
            Schedule::AlwaysBlocked => self.settings.set_always_blocked(&app_id).await,
            Schedule::Unrestricted => self.settings.set_unrestricted(&app_id).await,
            custom => self.settings.set_schedule(&app_id, custom).await,
        };

        match result {
            Ok(settings) => {
                if !is_effectively_blocked_now(Some(&settings), self.clock.now()) {
                    self.close_overlay(&app_id).await;
                }
                self.notify_monitor(MonitorSignal::Recheck(app_id.clone()));
                let mut apps = crate::types::SettingsMap::new();
                apps.insert(app_id.clone(), settings);
                IpcResponse::success(
                    format!("{} のスケジュールを更新しました", app_id),
                    Some(ResponseData {
                        apps: Some(apps),
                        ..Default::default()
                    }),
                )
            }
            Err(e) => IpcResponse::error(e.to_string()),
        }
    }

    /// Handles the remove command.
    async fn handle_remove(&self, app_id: AppId) -> IpcResponse {
        match self.settings.remove_app(&app_id).await {
            Ok(true) => {
                self.close_overlay(&app_id).await;
                IpcResponse::success(format!("{} をブロックリストから削除しました", app_id), None)
            }
            Ok(false) => IpcResponse::success(format!("{} は設定されていません", app_id), None),
            Err(e) => IpcResponse::error(e.to_string()),
        }
    }

    /// Handles the grant-break command (the user chose to continue).
    async fn handle_grant_break(&self, app_id: AppId) -> IpcResponse {
        if let Err(e) = self.break_timer.grant_break(&app_id).await {
            return IpcResponse::error(e.to_string());
        }
        self.close_overlay(&app_id).await;

        IpcResponse::success(
            format!("{} の休憩を開始しました", app_id),
            Some(ResponseData {
                break_seconds: Some(self.break_timer.duration().as_secs()),
                ..Default::default()
            }),
        )
    }

    /// Handles the dismiss command (the user chose to leave).
    async fn handle_dismiss(&self, app_id: AppId) -> IpcResponse {
        if self.close_overlay(&app_id).await {
            IpcResponse::success("オーバーレイを閉じました", None)
        } else {
            IpcResponse::success(format!("{} のオーバーレイは表示されていません", app_id), None)
        }
    }

    /// Handles the foreground notification.
    fn handle_foreground(&self, app_id: Option<AppId>) -> IpcResponse {
        if !self.notify_monitor(MonitorSignal::Foreground(app_id)) {
            return IpcResponse::error("監視ループが停止しています");
        }
        IpcResponse::success("", None)
    }

    /// Handles the display notification.
    fn handle_display(&self, on: bool) -> IpcResponse {
        if !self.notify_monitor(MonitorSignal::Display(on)) {
            return IpcResponse::error("監視ループが停止しています");
        }
        let message = if on {
            "画面がオンになりました"
        } else {
            "画面がオフになりました"
        };
        IpcResponse::success(message, None)
    }

    /// Handles a permission change reported by the platform.
    fn handle_permission(&self, permission: Permission, granted: bool) -> IpcResponse {
        self.permissions.set(permission, granted);
        let message = if granted {
            format!("{} の権限が許可されました", permission)
        } else {
            format!("{} の権限が取り消されました", permission)
        };
        tracing::info!("{}", message);

        IpcResponse::success(
            message,
            Some(ResponseData {
                permissions: Some(self.permissions.granted()),
                ..Default::default()
            }),
        )
    }

    /// Handles the shutdown command.
    fn handle_shutdown(&self) -> IpcResponse {
        tracing::info!("停止リクエストを受信しました");
        self.shutdown.cancel();
        IpcResponse::success("デーモンを停止します", None)
    }

    /// Clears the overlay of `app_id`. Returns true if it was shown.
    async fn close_overlay(&self, app_id: &str) -> bool {
        let mut overlay = self.overlay.lock().await;
        let shown = overlay.as_ref().is_some_and(|o| o.app_id == app_id);
        if shown {
            *overlay = None;
        }
        drop(overlay);

        self.notify_monitor(MonitorSignal::OverlayClosed(app_id.to_string()));
        shown
    }

    fn notify_monitor(&self, signal: MonitorSignal) -> bool {
        if self.monitor_tx.send(signal).is_err() {
            tracing::warn!("監視ループが停止しています");
            return false;
        }
        true
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::NaiveTime;
    use tokio::sync::Mutex;

    use crate::platform::{MockClock, Permission, PermissionProbe, PermissionSet};
    use crate::store::InMemorySettingsStore;
    use crate::types::{OverlayInfo, TimeBlock};

    // ------------------------------------------------------------------------
    // Helper functions
    // ------------------------------------------------------------------------

    fn create_temp_socket_path() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.sock");
        (dir, path)
    }

    struct Fixture {
        handler: RequestHandler,
        settings: SettingsService,
        permissions: Arc<PermissionSet>,
        overlay: OverlaySlot,
        monitor_rx: mpsc::UnboundedReceiver<MonitorSignal>,
        status_tx: watch::Sender<MonitorStatus>,
        shutdown: CancellationToken,
    }

    fn fixture() -> Fixture {
        let shutdown = CancellationToken::new();
        let settings =
            SettingsService::spawn(Arc::new(InMemorySettingsStore::new()), shutdown.clone());
        let permissions = Arc::new(PermissionSet::all());
        let (monitor_tx, monitor_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(MonitorStatus::default());
        let overlay: OverlaySlot = Arc::new(Mutex::new(None));
        let break_timer = BreakTimer::new(
            settings.clone(),
            permissions.clone(),
            monitor_tx.clone(),
            Duration::from_secs(300),
            shutdown.child_token(),
        );
        let handler = RequestHandler::new(
            settings.clone(),
            break_timer,
            monitor_tx,
            status_rx,
            overlay.clone(),
            shutdown.clone(),
        )
        .with_permissions(permissions.clone())
        .with_clock(Arc::new(MockClock::new(
            NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
        )));

        Fixture {
            handler,
            settings,
            permissions,
            overlay,
            monitor_rx,
            status_tx,
            shutdown,
        }
    }

    async fn send_raw(path: &Path, payload: &str) -> IpcResponse {
        let mut stream = UnixStream::connect(path).await.unwrap();
        stream.write_all(payload.as_bytes()).await.unwrap();
        stream.shutdown().await.unwrap();
        let mut buffer = Vec::new();
        stream.read_to_end(&mut buffer).await.unwrap();
        serde_json::from_slice(&buffer).unwrap()
    }

    // ------------------------------------------------------------------------
    // IpcServer Tests
    // ------------------------------------------------------------------------

    mod ipc_server_tests {
        use super::*;

        #[tokio::test]
        async fn test_server_creation() {
            let (_dir, socket_path) = create_temp_socket_path();
            let server = IpcServer::new(&socket_path);

            assert!(server.is_ok());
            assert!(socket_path.exists());
        }

        #[tokio::test]
        async fn test_server_removes_existing_socket() {
            let (_dir, socket_path) = create_temp_socket_path();
            std::fs::write(&socket_path, "dummy").unwrap();

            assert!(IpcServer::new(&socket_path).is_ok());
        }

        #[tokio::test]
        async fn test_server_creates_parent_directory() {
            let dir = tempfile::tempdir().unwrap();
            let socket_path = dir.path().join("subdir").join("test.sock");

            assert!(IpcServer::new(&socket_path).is_ok());
            assert!(socket_path.parent().unwrap().exists());
        }

        #[tokio::test]
        async fn test_receive_request_grant_break() {
            let (_dir, socket_path) = create_temp_socket_path();
            let server = IpcServer::new(&socket_path).unwrap();

            let client_path = socket_path.clone();
            let client_handle = tokio::spawn(async move {
                let mut stream = UnixStream::connect(&client_path).await.unwrap();
                let request = r#"{"command":"grantBreak","appId":"com.video"}"#;
                stream.write_all(request.as_bytes()).await.unwrap();
                stream.shutdown().await.unwrap();
            });

            let mut stream = server.accept().await.unwrap();
            let request = IpcServer::receive_request(&mut stream).await.unwrap();

            match request {
                IpcRequest::GrantBreak { app_id } => assert_eq!(app_id, "com.video"),
                other => panic!("Expected GrantBreak request, got {:?}", other),
            }
            client_handle.await.unwrap();
        }

        #[tokio::test]
        async fn test_receive_request_invalid_json() {
            let (_dir, socket_path) = create_temp_socket_path();
            let server = IpcServer::new(&socket_path).unwrap();

            let client_path = socket_path.clone();
            let _client = tokio::spawn(async move {
                let mut stream = UnixStream::connect(&client_path).await.unwrap();
                stream.write_all(b"not valid json").await.unwrap();
                stream.shutdown().await.unwrap();
            });

            let mut stream = server.accept().await.unwrap();
            assert!(IpcServer::receive_request(&mut stream).await.is_err());
        }

        #[tokio::test]
        async fn test_connection_closed_without_request() {
            let (_dir, socket_path) = create_temp_socket_path();
            let server = IpcServer::new(&socket_path).unwrap();

            let client_path = socket_path.clone();
            let _client = tokio::spawn(async move {
                let stream = UnixStream::connect(&client_path).await.unwrap();
                drop(stream);
            });

            let mut stream = server.accept().await.unwrap();
            let err = IpcServer::receive_request(&mut stream).await.unwrap_err();
            assert!(err.downcast_ref::<IpcError>().is_some());
        }

        #[tokio::test]
        async fn test_server_drop_cleanup() {
            let (_dir, socket_path) = create_temp_socket_path();
            {
                let _server = IpcServer::new(&socket_path).unwrap();
                assert!(socket_path.exists());
            }
            assert!(!socket_path.exists());
        }

        #[tokio::test]
        async fn test_serve_until_cancelled() {
            let (_dir, socket_path) = create_temp_socket_path();
            let f = fixture();
            let server = IpcServer::new(&socket_path).unwrap();
            let cancel = CancellationToken::new();
            let serve = tokio::spawn(server.serve(Arc::new(f.handler), cancel.clone()));

            let response = send_raw(&socket_path, r#"{"command":"list"}"#).await;
            assert!(response.is_success());

            let response = send_raw(&socket_path, "garbage").await;
            assert_eq!(response.status, "error");

            cancel.cancel();
            serve.await.unwrap();
            assert!(!socket_path.exists());
        }
    }

    // ------------------------------------------------------------------------
    // RequestHandler Tests
    // ------------------------------------------------------------------------

    mod request_handler_tests {
        use super::*;

        #[tokio::test]
        async fn test_handle_status() {
            let f = fixture();
            f.settings.set_always_blocked("com.video").await.unwrap();
            f.status_tx.send_replace(MonitorStatus {
                foreground: Some("com.video".into()),
                overlay_for: None,
                display_on: true,
            });

            let response = f.handler.handle(IpcRequest::Status).await;

            assert!(response.is_success());
            let data = response.data.unwrap();
            assert_eq!(data.blocked, Some(vec!["com.video".to_string()]));
            assert_eq!(data.foreground.as_deref(), Some("com.video"));
            assert_eq!(data.display_on, Some(true));
            assert_eq!(data.break_seconds, Some(300));
            assert_eq!(data.poll_interval_seconds, Some(60));
        }

        #[tokio::test]
        async fn test_handle_schedule_custom() {
            let mut f = fixture();
            let block = TimeBlock::new(
                NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
            );

            let response = f
                .handler
                .handle(IpcRequest::Schedule {
                    app_id: "com.video".into(),
                    schedule: Schedule::Custom(vec![block]),
                })
                .await;

            assert!(response.is_success());
            assert!(response.message.contains("com.video"));
            let stored = f.settings.get("com.video").await.unwrap().unwrap();
            assert_eq!(stored.schedule, Schedule::Custom(vec![block]));
            assert_eq!(
                f.monitor_rx.try_recv().unwrap(),
                MonitorSignal::Recheck("com.video".into())
            );
        }

        #[tokio::test]
        async fn test_handle_schedule_always_clears_break() {
            let f = fixture();
            f.settings.set_on_break("com.video").await.unwrap();

            f.handler
                .handle(IpcRequest::Schedule {
                    app_id: "com.video".into(),
                    schedule: Schedule::AlwaysBlocked,
                })
                .await;

            let stored = f.settings.get("com.video").await.unwrap().unwrap();
            assert!(!stored.is_on_break);
        }

        #[tokio::test]
        async fn test_handle_remove() {
            let f = fixture();
            f.settings.set_always_blocked("com.video").await.unwrap();

            let response = f
                .handler
                .handle(IpcRequest::Remove {
                    app_id: "com.video".into(),
                })
                .await;
            assert!(response.is_success());
            assert!(f.settings.get("com.video").await.unwrap().is_none());

            let response = f
                .handler
                .handle(IpcRequest::Remove {
                    app_id: "com.video".into(),
                })
                .await;
            assert!(response.is_success());
            assert!(response.message.contains("設定されていません"));
        }

        #[tokio::test]
        async fn test_handle_remove_closes_overlay() {
            let mut f = fixture();
            f.settings.set_always_blocked("com.video").await.unwrap();
            *f.overlay.lock().await = Some(OverlayInfo {
                app_id: "com.video".into(),
                display_name: "Video".into(),
            });

            f.handler
                .handle(IpcRequest::Remove {
                    app_id: "com.video".into(),
                })
                .await;

            assert!(f.overlay.lock().await.is_none());
            assert_eq!(
                f.monitor_rx.try_recv().unwrap(),
                MonitorSignal::OverlayClosed("com.video".into())
            );
        }

        #[tokio::test]
        async fn test_handle_schedule_unblocking_closes_overlay() {
            let mut f = fixture();
            f.settings.set_always_blocked("com.video").await.unwrap();
            *f.overlay.lock().await = Some(OverlayInfo {
                app_id: "com.video".into(),
                display_name: "Video".into(),
            });

            f.handler
                .handle(IpcRequest::Schedule {
                    app_id: "com.video".into(),
                    schedule: Schedule::Unrestricted,
                })
                .await;

            assert!(f.overlay.lock().await.is_none());
            assert_eq!(
                f.monitor_rx.try_recv().unwrap(),
                MonitorSignal::OverlayClosed("com.video".into())
            );
            assert_eq!(
                f.monitor_rx.try_recv().unwrap(),
                MonitorSignal::Recheck("com.video".into())
            );
        }

        #[tokio::test]
        async fn test_handle_schedule_still_blocked_keeps_overlay() {
            let mut f = fixture();
            *f.overlay.lock().await = Some(OverlayInfo {
                app_id: "com.video".into(),
                display_name: "Video".into(),
            });
            let block = TimeBlock::new(
                NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
            );

            f.handler
                .handle(IpcRequest::Schedule {
                    app_id: "com.video".into(),
                    schedule: Schedule::Custom(vec![block]),
                })
                .await;

            assert!(f.overlay.lock().await.is_some());
            assert_eq!(
                f.monitor_rx.try_recv().unwrap(),
                MonitorSignal::Recheck("com.video".into())
            );
            assert!(f.monitor_rx.try_recv().is_err());
        }

        #[tokio::test]
        async fn test_handle_permission_updates_shared_set() {
            let f = fixture();
            f.settings.set_always_blocked("com.video").await.unwrap();

            let response = f
                .handler
                .handle(IpcRequest::Permission {
                    permission: Permission::ExactAlarm,
                    granted: false,
                })
                .await;
            assert!(response.is_success());
            assert!(!f.permissions.is_granted(Permission::ExactAlarm));
            let denied = f
                .handler
                .handle(IpcRequest::GrantBreak {
                    app_id: "com.video".into(),
                })
                .await;
            assert_eq!(denied.status, "error");

            f.handler
                .handle(IpcRequest::Permission {
                    permission: Permission::ExactAlarm,
                    granted: true,
                })
                .await;
            let granted = f
                .handler
                .handle(IpcRequest::GrantBreak {
                    app_id: "com.video".into(),
                })
                .await;
            assert!(granted.is_success());

            let status = f.handler.handle(IpcRequest::Status).await;
            assert_eq!(status.data.unwrap().permissions, Some(Permission::ALL.to_vec()));
        }

        #[tokio::test]
        async fn test_handle_list() {
            let f = fixture();
            f.settings.set_always_blocked("com.video").await.unwrap();

            let response = f.handler.handle(IpcRequest::List).await;

            let apps = response.data.unwrap().apps.unwrap();
            assert!(apps.contains_key("com.video"));
        }

        #[tokio::test]
        async fn test_handle_grant_break_closes_overlay() {
            let mut f = fixture();
            f.settings.set_always_blocked("com.video").await.unwrap();
            *f.overlay.lock().await = Some(OverlayInfo {
                app_id: "com.video".into(),
                display_name: "Video".into(),
            });

            let response = f
                .handler
                .handle(IpcRequest::GrantBreak {
                    app_id: "com.video".into(),
                })
                .await;

            assert!(response.is_success());
            assert!(f.overlay.lock().await.is_none());
            assert!(f.settings.get("com.video").await.unwrap().unwrap().is_on_break);
            assert_eq!(
                f.monitor_rx.try_recv().unwrap(),
                MonitorSignal::OverlayClosed("com.video".into())
            );
        }

        #[tokio::test]
        async fn test_handle_grant_break_without_permission() {
            let f = fixture();
            f.permissions.set(Permission::ExactAlarm, false);

            let response = f
                .handler
                .handle(IpcRequest::GrantBreak {
                    app_id: "com.video".into(),
                })
                .await;

            assert_eq!(response.status, "error");
            assert!(response.message.contains("exact_alarm"));
        }

        #[tokio::test]
        async fn test_handle_dismiss_has_no_settings_effect() {
            let f = fixture();
            f.settings.set_always_blocked("com.video").await.unwrap();
            *f.overlay.lock().await = Some(OverlayInfo {
                app_id: "com.video".into(),
                display_name: "Video".into(),
            });

            let response = f
                .handler
                .handle(IpcRequest::Dismiss {
                    app_id: "com.video".into(),
                })
                .await;

            assert_eq!(response.message, "オーバーレイを閉じました");
            assert!(f.overlay.lock().await.is_none());
            let stored = f.settings.get("com.video").await.unwrap().unwrap();
            assert!(!stored.is_on_break);
        }

        #[tokio::test]
        async fn test_handle_foreground_and_display_forward_signals() {
            let mut f = fixture();

            f.handler
                .handle(IpcRequest::Foreground {
                    app_id: Some("com.video".into()),
                })
                .await;
            f.handler.handle(IpcRequest::Display { on: false }).await;

            assert_eq!(
                f.monitor_rx.try_recv().unwrap(),
                MonitorSignal::Foreground(Some("com.video".into()))
            );
            assert_eq!(f.monitor_rx.try_recv().unwrap(), MonitorSignal::Display(false));
        }

        #[tokio::test]
        async fn test_handle_foreground_when_monitor_stopped() {
            let f = fixture();
            drop(f.monitor_rx);

            let response = f
                .handler
                .handle(IpcRequest::Foreground { app_id: None })
                .await;
            assert_eq!(response.status, "error");
        }

        #[tokio::test]
        async fn test_handle_shutdown() {
            let f = fixture();
            let response = f.handler.handle(IpcRequest::Shutdown).await;

            assert!(response.is_success());
            assert!(f.shutdown.is_cancelled());
        }
    }

    mod error_tests {
        use super::*;

        #[test]
        fn test_ipc_error_display() {
            assert_eq!(IpcError::Timeout.to_string(), "Operation timed out");
            assert!(IpcError::RequestTooLarge.to_string().contains("65536"));
        }

        #[test]
        fn test_ipc_error_recoverable() {
            assert!(IpcError::Timeout.is_recoverable());
            assert!(!IpcError::RequestTooLarge.is_recoverable());
        }
    }
}
