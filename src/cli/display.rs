//! Display utilities for the Zen CLI.
//!
//! This module provides formatted output for:
//! - Success messages
//! - Error messages
//! - Status display
//! - Block list display

use crate::blocking::describe_schedule;
use crate::types::{IpcResponse, ResponseData};

// ============================================================================
// Display
// ============================================================================

/// Display utilities for CLI output.
pub struct Display;

impl Display {
    /// Shows the daemon status.
    pub fn show_status(response: &IpcResponse) {
        print!("{}", Self::render_status(response.data.as_ref()));
    }

    /// Shows every configured app with its schedule.
    pub fn show_list(response: &IpcResponse) {
        print!("{}", Self::render_list(response.data.as_ref()));
    }

    /// Shows the result of a schedule change.
    pub fn show_schedule_success(response: &IpcResponse) {
        println!("* {}", response.message);

        let apps = response.data.as_ref().and_then(|d| d.apps.as_ref());
        if let Some(apps) = apps {
            for settings in apps.values() {
                println!("  スケジュール: {}", describe_schedule(&settings.schedule));
            }
        }
    }

    /// Shows the result of a break request.
    pub fn show_break_success(response: &IpcResponse) {
        println!("* {}", response.message);

        let seconds = response.data.as_ref().and_then(|d| d.break_seconds);
        if let Some(seconds) = seconds {
            println!("  休憩時間: {}", format_duration(seconds));
        }
    }

    /// Shows a plain success message. Empty messages print nothing.
    pub fn show_message(response: &IpcResponse) {
        if !response.message.is_empty() {
            println!("* {}", response.message);
        }
    }

    /// Shows an error message.
    pub fn show_error(message: &str) {
        eprintln!("エラー: {}", message);
    }

    fn render_status(data: Option<&ResponseData>) -> String {
        let mut out = String::new();
        out.push_str("Zen ステータス\n");
        out.push_str("─────────────────────────────\n");

        let Some(data) = data else {
            out.push_str("デーモンから情報を取得できませんでした\n");
            return out;
        };

        if let Some(on) = data.display_on {
            let state = if on { "オン" } else { "オフ" };
            out.push_str(&format!("画面: {}\n", state));
        }

        let foreground = data.foreground.as_deref().unwrap_or("なし");
        out.push_str(&format!("前面のアプリ: {}\n", foreground));

        match &data.overlay {
            Some(overlay) => out.push_str(&format!(
                "オーバーレイ: {} ({})\n",
                overlay.display_name, overlay.app_id
            )),
            None => out.push_str("オーバーレイ: 非表示\n"),
        }

        match data.blocked.as_deref() {
            Some([]) | None => out.push_str("ブロック中のアプリ: なし\n"),
            Some(blocked) => {
                out.push_str("ブロック中のアプリ:\n");
                for app_id in blocked {
                    out.push_str(&format!("  - {}\n", app_id));
                }
            }
        }

        if let Some(granted) = &data.permissions {
            let names: Vec<&str> = granted.iter().map(|p| p.as_str()).collect();
            let names = if names.is_empty() {
                "なし".to_string()
            } else {
                names.join(", ")
            };
            out.push_str(&format!("許可された権限: {}\n", names));
        }

        if let Some(seconds) = data.poll_interval_seconds {
            out.push_str(&format!("監視間隔: {}\n", format_duration(seconds)));
        }
        if let Some(seconds) = data.break_seconds {
            out.push_str(&format!("休憩時間: {}\n", format_duration(seconds)));
        }
        out
    }

    fn render_list(data: Option<&ResponseData>) -> String {
        let apps = data.and_then(|d| d.apps.as_ref());
        let Some(apps) = apps.filter(|apps| !apps.is_empty()) else {
            return "設定されたアプリはありません\n".to_string();
        };

        let mut out = String::new();
        for (app_id, settings) in apps {
            out.push_str(&format!("{}\n", app_id));
            out.push_str(&format!(
                "  スケジュール: {}\n",
                describe_schedule(&settings.schedule)
            ));
            if settings.is_on_break {
                out.push_str("  休憩中\n");
            }
        }
        out
    }
}

/// Formats a duration in seconds for display.
///
/// `30` → `"30秒"`, `300` → `"5分"`, `3720` → `"1時間 2分"`.
pub fn format_duration(total_seconds: u64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    let mut parts = Vec::new();
    if hours > 0 {
        parts.push(format!("{}時間", hours));
    }
    if minutes > 0 {
        parts.push(format!("{}分", minutes));
    }
    if seconds > 0 || parts.is_empty() {
        parts.push(format!("{}秒", seconds));
    }
    parts.join(" ")
}

// ============================================================================
// Tests
// ============================================================================
