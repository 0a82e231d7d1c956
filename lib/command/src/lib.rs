//! Power action execution.
//!
//! Maps each [PowerAction] to a fixed OS command string and runs it,
//! with a privilege-escalation fallback chain when elevation is
//! requested: direct execution first, then one OS-level "run with
//! elevation" request for the same command. A declined elevation is
//! surfaced as a failed [ActionLog], never retried within the trigger.

use entities::{ActionLog, curfew_timestamp, schedule::PowerAction};
use run_command::{CommandOutput, async_run_command};

/// The fixed command string for a power action on this platform.
#[cfg(windows)]
pub fn action_command(action: PowerAction) -> &'static str {
  match action {
    PowerAction::Shutdown => "shutdown /s /t 0",
    PowerAction::Restart => "shutdown /r /t 0",
    PowerAction::SignOut => "shutdown /l",
    PowerAction::Sleep => {
      "rundll32.exe powrprof.dll,SetSuspendState 0,1,0"
    }
    PowerAction::Hibernate => "shutdown /h",
  }
}

/// The fixed command string for a power action on this platform.
#[cfg(not(windows))]
pub fn action_command(action: PowerAction) -> &'static str {
  match action {
    PowerAction::Shutdown => "systemctl poweroff",
    PowerAction::Restart => "systemctl reboot",
    PowerAction::SignOut => "loginctl terminate-user $USER",
    PowerAction::Sleep => "systemctl suspend",
    PowerAction::Hibernate => "systemctl hibernate",
  }
}

/// Wraps `command` in the platform's "run with elevation" request.
#[cfg(windows)]
fn elevation_command(command: &str) -> String {
  format!(
    "powershell -NoProfile -Command \"Start-Process -Verb RunAs cmd -ArgumentList '/c {command}'\""
  )
}

/// Wraps `command` in the platform's "run with elevation" request.
#[cfg(not(windows))]
fn elevation_command(command: &str) -> String {
  format!("pkexec sh -c '{command}'")
}

/// Executes the power action, returning the captured output.
///
/// `success` means the command was issued; the OS may tear down the
/// calling process before the action itself completes.
pub async fn run_power_action(
  action: PowerAction,
  elevated: bool,
) -> ActionLog {
  let command = action_command(action);
  let start_ts = curfew_timestamp();
  let output = async_run_command(command).await;

  if output.success() || !elevated {
    return output_into_log(
      command.to_string(),
      start_ts,
      false,
      output,
    );
  }

  // Direct privileged execution failed, fall back to requesting
  // elevation for the same command.
  let fallback = elevation_command(command);
  let output = async_run_command(&fallback).await;
  output_into_log(fallback, start_ts, true, output)
}

pub fn output_into_log(
  command: String,
  start_ts: i64,
  elevated: bool,
  output: CommandOutput,
) -> ActionLog {
  let success = output.success();
  ActionLog {
    command,
    stdout: output.stdout,
    stderr: output.stderr,
    success,
    elevated,
    start_ts,
    end_ts: curfew_timestamp(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn every_action_maps_to_a_command() {
    for action in [
      PowerAction::Shutdown,
      PowerAction::Restart,
      PowerAction::SignOut,
      PowerAction::Sleep,
      PowerAction::Hibernate,
    ] {
      assert!(!action_command(action).is_empty());
    }
  }

  #[cfg(not(windows))]
  #[test]
  fn elevation_wraps_the_same_command() {
    let command = action_command(PowerAction::Shutdown);
    let elevated = elevation_command(command);
    assert!(elevated.starts_with("pkexec"));
    assert!(elevated.contains(command));
  }

  #[cfg(windows)]
  #[test]
  fn elevation_wraps_the_same_command() {
    let command = action_command(PowerAction::Shutdown);
    let elevated = elevation_command(command);
    assert!(elevated.contains("RunAs"));
    assert!(elevated.contains(command));
  }
}
