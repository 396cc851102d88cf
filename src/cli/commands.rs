//! Command definitions for the Zen CLI.
//!
//! Uses clap derive macro for argument parsing.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::platform::Permission;
use crate::types::{Schedule, TimeBlock};

// ============================================================================
// CLI Structure
// ============================================================================

/// Zen - schedule-based app blocker
#[derive(Parser, Debug)]
#[command(
    name = "zen",
    version,
    about = "スケジュールに従ってアプリをブロックするスクリーンタイム管理CLI",
    long_about = "前面のアプリを監視し、ブロック時間帯であれば全画面のオーバーレイで中断します。\n\
                  オーバーレイから一定時間の休憩を取ることもできます。",
    propagate_version = true
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Enable verbose output for debugging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the config file (default: ~/.zen/config.json)
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

// ============================================================================
// Subcommands
// ============================================================================

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the blocker daemon in the foreground
    Daemon,

    /// Show blocked apps, the foreground app and the current overlay
    Status,

    /// List every configured app with its schedule
    List,

    /// Block an app all day or during the given windows
    Block(BlockArgs),

    /// Remove an app from the block list
    Unblock {
        /// App identifier
        #[arg(value_parser = validate_app_id)]
        app: String,
    },

    /// Keep an app configured but never block it
    Clear {
        /// App identifier
        #[arg(value_parser = validate_app_id)]
        app: String,
    },

    /// Take a break from blocking for an app
    Break {
        /// App identifier
        #[arg(value_parser = validate_app_id)]
        app: String,
    },

    /// Close the overlay for an app and go back
    Dismiss {
        /// App identifier
        #[arg(value_parser = validate_app_id)]
        app: String,
    },

    /// Report the foreground app to the daemon
    Foreground {
        /// App identifier (omit when no app is in front)
        app: Option<String>,
    },

    /// Report the display state to the daemon
    Display {
        /// Display state
        #[arg(value_enum)]
        state: DisplayState,
    },

    /// Report a granted or revoked platform permission to the daemon
    Permission {
        /// Permission name (usage_stats, foreground_detection, overlay, exact_alarm)
        #[arg(value_parser = parse_permission)]
        permission: Permission,

        /// Whether the permission is now granted
        #[arg(value_enum)]
        state: GrantState,
    },

    /// Stop the daemon
    StopDaemon,

    /// Generate shell completion scripts
    Completions {
        /// Shell type for completion script
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Display state argument
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayState {
    /// Display turned on
    On,
    /// Display turned off
    Off,
}

impl DisplayState {
    /// Returns true for `on`.
    pub fn is_on(self) -> bool {
        self == DisplayState::On
    }
}

/// Permission state argument
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantState {
    /// Permission granted
    Grant,
    /// Permission revoked
    Revoke,
}

impl GrantState {
    /// Returns true for `grant`.
    pub fn is_granted(self) -> bool {
        self == GrantState::Grant
    }
}

// ============================================================================
// Block Command Arguments
// ============================================================================

/// Arguments for the block command
#[derive(Args, Debug, Clone)]
pub struct BlockArgs {
    /// App identifier (package or bundle id)
    #[arg(value_parser = validate_app_id)]
    pub app: String,

    /// Block the app all day
    #[arg(short, long, conflicts_with = "windows")]
    pub always: bool,

    /// Block window as HH:MM-HH:MM (repeatable, may cross midnight)
    #[arg(
        short,
        long = "window",
        value_name = "HH:MM-HH:MM",
        value_parser = parse_window,
        required_unless_present = "always"
    )]
    pub windows: Vec<TimeBlock>,
}

impl BlockArgs {
    /// Builds the schedule described by the arguments.
    pub fn schedule(&self) -> Schedule {
        if self.always {
            Schedule::AlwaysBlocked
        } else {
            Schedule::from_blocks(self.windows.clone())
        }
    }
}

// ============================================================================
// Validation Functions
// ============================================================================

/// Validates an app identifier.
///
/// - Must not be empty
/// - Must not contain whitespace
fn validate_app_id(s: &str) -> Result<String, String> {
    if s.trim().is_empty() {
        return Err("アプリIDは空にできません".to_string());
    }
    if s.chars().any(char::is_whitespace) {
        return Err("アプリIDに空白は使えません".to_string());
    }
    Ok(s.to_string())
}

/// Parses a permission name.
fn parse_permission(s: &str) -> Result<Permission, String> {
    s.parse()
}

/// Parses a block window.
fn parse_window(s: &str) -> Result<TimeBlock, String> {
    s.parse()
}

// ============================================================================
// Tests
// ============================================================================
