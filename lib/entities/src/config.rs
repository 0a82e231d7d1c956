use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};

use crate::schedule::Schedule;

/// The single persisted config document.
///
/// The core process is the only writer (full-document rewrite on every
/// mutation); the guardian and the external configuration UI read it.
/// Missing or malformed fields fall back to their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
  /// The persisted schedule list.
  #[serde(default)]
  pub schedules: Vec<Schedule>,

  /// Whether power actions use the elevated execution path.
  /// Default: `true`
  #[serde(default = "default_true")]
  pub run_as_admin: bool,

  /// Launch-at-login flag, applied by the external installer / UI.
  #[serde(default)]
  pub auto_start: bool,
  /// External UI field, carried for round-tripping. Default: `true`
  #[serde(default = "default_true")]
  pub minimize_to_tray: bool,
  /// External UI field, carried for round-tripping.
  #[serde(default)]
  pub hide_tray_icon: bool,
  /// Global hotkey of the external UI, carried for round-tripping.
  #[serde(default = "default_hotkey")]
  pub hotkey: String,

  /// Master switch for guardian policy enforcement.
  #[serde(default)]
  pub guardian_enabled: bool,
  /// Guardian restarts the main process when it is absent.
  /// Default: `true`
  #[serde(default = "default_true")]
  pub guardian_autorestart: bool,
  /// Guardian terminates denylisted processes on sight.
  /// Default: `true`
  #[serde(default = "default_true")]
  pub guardian_terminate_taskmgr: bool,
  /// Show the guardian diagnostic window. No effect on core logic.
  #[serde(default)]
  pub guardian_show_window: bool,
  /// Show the guardian diagnostic console. No effect on core logic.
  #[serde(default)]
  pub guardian_show_console: bool,
  /// Process names the guardian terminates when
  /// `guardian_terminate_taskmgr` is set. Compared case-insensitively
  /// against the process name.
  #[serde(default = "default_tool_denylist")]
  pub guardian_tool_denylist: Vec<String>,
}

fn default_true() -> bool {
  true
}

fn default_hotkey() -> String {
  String::from("ctrl+alt+l")
}

fn default_tool_denylist() -> Vec<String> {
  [
    "taskmgr.exe",
    "processhacker.exe",
    "procexp.exe",
    "procexp64.exe",
  ]
  .map(String::from)
  .to_vec()
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      schedules: Default::default(),
      run_as_admin: default_true(),
      auto_start: Default::default(),
      minimize_to_tray: default_true(),
      hide_tray_icon: Default::default(),
      hotkey: default_hotkey(),
      guardian_enabled: Default::default(),
      guardian_autorestart: default_true(),
      guardian_terminate_taskmgr: default_true(),
      guardian_show_window: Default::default(),
      guardian_show_console: Default::default(),
      guardian_tool_denylist: default_tool_denylist(),
    }
  }
}

impl AppConfig {
  /// The guardian-relevant slice of the document.
  pub fn guardian_policy(&self) -> GuardianPolicy {
    GuardianPolicy {
      enabled: self.guardian_enabled,
      autorestart: self.guardian_autorestart,
      terminate_tools: self.guardian_terminate_taskmgr,
      show_window: self.guardian_show_window,
      show_console: self.guardian_show_console,
      tool_denylist: self.guardian_tool_denylist.clone(),
    }
  }

  /// Checks every schedule plus the cross-schedule invariant that
  /// names are unique at save time.
  pub fn validate(&self) -> anyhow::Result<()> {
    for schedule in &self.schedules {
      schedule
        .validate()
        .with_context(|| format!("invalid schedule '{}'", schedule.name))?;
    }
    for (i, schedule) in self.schedules.iter().enumerate() {
      if self.schedules[..i]
        .iter()
        .any(|other| other.name == schedule.name)
      {
        return Err(anyhow!(
          "duplicate schedule name '{}'",
          schedule.name
        ));
      }
    }
    Ok(())
  }
}

/// Supervisor configuration, derived from the config document.
/// Read-only from the guardian's perspective except reload.
#[derive(Debug, Clone, PartialEq)]
pub struct GuardianPolicy {
  pub enabled: bool,
  pub autorestart: bool,
  pub terminate_tools: bool,
  pub show_window: bool,
  pub show_console: bool,
  pub tool_denylist: Vec<String>,
}

#[cfg(test)]
mod tests {
  use std::collections::BTreeSet;

  use chrono::NaiveTime;

  use crate::schedule::PowerAction;

  use super::*;

  #[test]
  fn empty_document_defaults() {
    let config: AppConfig = serde_json::from_str("{}").unwrap();
    assert!(config.schedules.is_empty());
    assert!(config.run_as_admin);
    assert!(!config.guardian_enabled);
    assert!(config.guardian_autorestart);
    assert!(config.guardian_terminate_taskmgr);
    assert_eq!(
      config.guardian_tool_denylist,
      default_tool_denylist()
    );
    assert_eq!(config, AppConfig::default());
  }

  #[test]
  fn document_round_trips() {
    let config = AppConfig {
      schedules: vec![Schedule {
        name: "bedtime".to_string(),
        action: PowerAction::Hibernate,
        time: NaiveTime::from_hms_opt(23, 0, 0).unwrap(),
        days: BTreeSet::from([6, 7]),
        enabled: false,
        one_time: false,
      }],
      guardian_enabled: true,
      ..Default::default()
    };
    let json = serde_json::to_string_pretty(&config).unwrap();
    let back: AppConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(config, back);
  }

  #[test]
  fn rejects_duplicate_schedule_names() {
    let schedule = Schedule {
      name: "same".to_string(),
      action: PowerAction::Shutdown,
      time: NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
      days: BTreeSet::from([1]),
      enabled: true,
      one_time: false,
    };
    let config = AppConfig {
      schedules: vec![schedule.clone(), schedule],
      ..Default::default()
    };
    assert!(config.validate().is_err());
  }
}
