//! # Curfew Entities
//!
//! Shared data model for the curfew core process and the guardian:
//! the persisted config document, schedule records, guardian policy,
//! and logging configuration.

use serde::{Deserialize, Serialize};

/// The persisted config document and guardian policy.
pub mod config;
/// [LogConfig][logger::LogConfig] and friends.
pub mod logger;
/// [Schedule][schedule::Schedule] and [PowerAction][schedule::PowerAction].
pub mod schedule;

/// Base name of the main process executable.
/// The guardian locates and restarts the main process by this name.
pub const MAIN_PROCESS_NAME: &str = "curfew";

/// Base name of the guardian executable. Guardian instances recognize
/// each other by this marker in the process name or command line.
pub const GUARDIAN_PROCESS_NAME: &str = "curfew-guardian";

/// Executable file name of the main process on the current platform.
pub fn main_exe_name() -> &'static str {
  if cfg!(windows) { "curfew.exe" } else { "curfew" }
}

/// Executable file name of the guardian on the current platform.
pub fn guardian_exe_name() -> &'static str {
  if cfg!(windows) {
    "curfew-guardian.exe"
  } else {
    "curfew-guardian"
  }
}

/// Unix timestamp in milliseconds.
pub fn curfew_timestamp() -> i64 {
  async_timing_util::unix_timestamp_ms() as i64
}

/// Captured output of one executed power action.
/// Success means the command was issued, not that the OS action
/// completed - the OS may tear down the process first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionLog {
  /// The command line that was executed.
  pub command: String,
  pub stdout: String,
  pub stderr: String,
  pub success: bool,
  /// Whether the elevation fallback path produced this output.
  pub elevated: bool,
  /// Start timestamp in unix ms.
  pub start_ts: i64,
  /// End timestamp in unix ms.
  pub end_ts: i64,
}
