//! IPC Client for communicating with the Zen daemon.
//!
//! This module provides:
//! - Unix Domain Socket client
//! - Request/response handling
//! - Connection retry logic
//! - Timeout handling

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::time::timeout;

use crate::config::ZenConfig;
use crate::platform::Permission;
use crate::types::{AppId, IpcRequest, IpcResponse, Schedule};

// ============================================================================
// Constants
// ============================================================================

/// Connection timeout in seconds
const CONNECTION_TIMEOUT_SECS: u64 = 5;

/// Read/write timeout in seconds
const IO_TIMEOUT_SECS: u64 = 5;

/// Maximum response size in bytes (1MB)
const MAX_RESPONSE_SIZE: u64 = 1024 * 1024;

/// Maximum retry attempts
const MAX_RETRIES: u32 = 3;

/// Retry delay in milliseconds (base delay, multiplied by attempt number)
const RETRY_DELAY_MS: u64 = 500;

// ============================================================================
// IpcClient
// ============================================================================

/// IPC client for daemon communication.
#[derive(Debug, Clone)]
pub struct IpcClient {
    /// Socket path
    socket_path: PathBuf,
    /// Connection timeout
    timeout: Duration,
}

impl IpcClient {
    /// Creates a new IPC client for the socket named in the default config.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be loaded.
    pub fn new() -> Result<Self> {
        let config = ZenConfig::load().context("設定を読み込めませんでした")?;
        Self::from_config(&config)
    }

    /// Creates a new IPC client for the socket named in `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket path cannot be resolved.
    pub fn from_config(config: &ZenConfig) -> Result<Self> {
        Ok(Self::with_socket_path(config.socket_path()?))
    }

    /// Creates a new IPC client with a custom socket path.
    pub fn with_socket_path(socket_path: PathBuf) -> Self {
        Self {
            socket_path,
            timeout: Duration::from_secs(CONNECTION_TIMEOUT_SECS),
        }
    }

    /// Returns the socket path.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Sends a status query to the daemon.
    pub async fn status(&self) -> Result<IpcResponse> {
        self.send_request_with_retry(&IpcRequest::Status).await
    }

    /// Lists configured apps.
    pub async fn list(&self) -> Result<IpcResponse> {
        self.send_request_with_retry(&IpcRequest::List).await
    }

    /// Replaces the schedule of an app.
    pub async fn schedule(&self, app_id: &str, schedule: Schedule) -> Result<IpcResponse> {
        let request = IpcRequest::Schedule {
            app_id: app_id.to_string(),
            schedule,
        };
        self.send_request_with_retry(&request).await
    }

    /// Removes an app from the block list.
    pub async fn remove(&self, app_id: &str) -> Result<IpcResponse> {
        let request = IpcRequest::Remove {
            app_id: app_id.to_string(),
        };
        self.send_request_with_retry(&request).await
    }

    /// Starts a break for an app.
    pub async fn grant_break(&self, app_id: &str) -> Result<IpcResponse> {
        let request = IpcRequest::GrantBreak {
            app_id: app_id.to_string(),
        };
        self.send_request_with_retry(&request).await
    }

    /// Dismisses the overlay of an app.
    pub async fn dismiss(&self, app_id: &str) -> Result<IpcResponse> {
        let request = IpcRequest::Dismiss {
            app_id: app_id.to_string(),
        };
        self.send_request_with_retry(&request).await
    }

    /// Reports the foreground app.
    pub async fn foreground(&self, app_id: Option<AppId>) -> Result<IpcResponse> {
        self.send_request_with_retry(&IpcRequest::Foreground { app_id })
            .await
    }

    /// Reports the display state.
    pub async fn display(&self, on: bool) -> Result<IpcResponse> {
        self.send_request_with_retry(&IpcRequest::Display { on })
            .await
    }

    /// Reports a permission grant or revocation.
    pub async fn permission(&self, permission: Permission, granted: bool) -> Result<IpcResponse> {
        self.send_request_with_retry(&IpcRequest::Permission {
            permission,
            granted,
        })
        .await
    }

    /// Asks the daemon to stop.
    pub async fn shutdown(&self) -> Result<IpcResponse> {
        self.send_request_with_retry(&IpcRequest::Shutdown).await
    }

    /// Sends a request to the daemon with retry logic.
    ///
    /// Only transport failures are retried. An error reported by the daemon
    /// is returned as is.
    async fn send_request_with_retry(&self, request: &IpcRequest) -> Result<IpcResponse> {
        let mut attempt = 1;
        let response = loop {
            match self.send_request(request).await {
                Ok(response) => break response,
                Err(e) if attempt < MAX_RETRIES => {
                    tracing::warn!("リクエスト失敗 (試行 {}/{}): {:#}", attempt, MAX_RETRIES, e);
                    let delay = Duration::from_millis(RETRY_DELAY_MS * u64::from(attempt));
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::warn!("リクエスト失敗 (試行 {}/{}): {:#}", attempt, MAX_RETRIES, e);
                    return Err(e);
                }
            }
        };

        if !response.is_success() {
            anyhow::bail!("{}", response.message);
        }
        Ok(response)
    }

    /// Sends a single request to the daemon.
    async fn send_request(&self, request: &IpcRequest) -> Result<IpcResponse> {
        let mut stream = timeout(self.timeout, UnixStream::connect(&self.socket_path))
            .await
            .context("接続がタイムアウトしました")?
            .context("Daemonに接続できません。'zen daemon' を起動してください")?;

        let request_json =
            serde_json::to_string(request).context("リクエストのシリアライズに失敗しました")?;

        timeout(
            Duration::from_secs(IO_TIMEOUT_SECS),
            stream.write_all(request_json.as_bytes()),
        )
        .await
        .context("書き込みがタイムアウトしました")?
        .context("リクエストの送信に失敗しました")?;

        timeout(Duration::from_secs(IO_TIMEOUT_SECS), stream.flush())
            .await
            .context("フラッシュがタイムアウトしました")?
            .context("フラッシュに失敗しました")?;

        // Shutdown write side to signal end of request
        stream
            .shutdown()
            .await
            .context("シャットダウンに失敗しました")?;

        let mut buffer = Vec::new();
        timeout(
            Duration::from_secs(IO_TIMEOUT_SECS),
            (&mut stream).take(MAX_RESPONSE_SIZE).read_to_end(&mut buffer),
        )
        .await
        .context("読み込みがタイムアウトしました")?
        .context("レスポンスの受信に失敗しました")?;

        if buffer.is_empty() {
            anyhow::bail!("Daemonからの応答がありませんでした");
        }

        let response: IpcResponse =
            serde_json::from_slice(&buffer).context("レスポンスのパースに失敗しました")?;

        Ok(response)
    }
}

// ============================================================================
// Tests
// ============================================================================
