use std::collections::BTreeSet;

use anyhow::{Context, anyhow};
use chrono::{Datelike, Duration, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

/// The system power action a schedule performs.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PowerAction {
  Shutdown,
  Restart,
  SignOut,
  Sleep,
  Hibernate,
}

/// A scheduled power action.
///
/// Persisted inside the config document's `schedules` list. Runtime
/// state (the timer task, cancellation token) lives in the engine and
/// is never serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
  /// Unique human readable name. Acts as the primary key within the
  /// persisted schedule list.
  pub name: String,
  /// The power action to perform at trigger time.
  #[serde(rename = "type")]
  pub action: PowerAction,
  /// Trigger time of day, 24h clock ("HH:MM"). Seconds and below are
  /// truncated to zero.
  #[serde(with = "time_hm")]
  pub time: NaiveTime,
  /// ISO weekday numbers the schedule fires on (Monday = 1).
  /// Empty only for one-time schedules.
  #[serde(default)]
  pub days: BTreeSet<u8>,
  /// Whether the timer is armed.
  #[serde(default = "default_enabled")]
  pub enabled: bool,
  /// Fire at most once, then the schedule is deleted.
  #[serde(default)]
  pub one_time: bool,
}

fn default_enabled() -> bool {
  true
}

impl Schedule {
  pub fn validate(&self) -> anyhow::Result<()> {
    if self.name.trim().is_empty() {
      return Err(anyhow!("schedule name cannot be empty"));
    }
    if let Some(day) = self.days.iter().find(|day| !(1..=7).contains(*day))
    {
      return Err(anyhow!(
        "invalid weekday {day} on schedule '{}' | must be in 1..=7 (Monday = 1)",
        self.name
      ));
    }
    if self.days.is_empty() && !self.one_time {
      return Err(anyhow!(
        "schedule '{}' has no weekdays and is not one-time",
        self.name
      ));
    }
    Ok(())
  }

  /// Derives a one-time copy of this schedule armed for one minute
  /// from `now`, on today's weekday. Used for "fire once more".
  pub fn once_from(&self, now: NaiveDateTime) -> anyhow::Result<Schedule> {
    let at = now + Duration::minutes(1);
    let time = NaiveTime::from_hms_opt(at.hour(), at.minute(), 0)
      .context("failed to truncate trigger time")?;
    Ok(Schedule {
      name: format!("{} (once)", self.name),
      action: self.action,
      time,
      days: BTreeSet::from([at.weekday().number_from_monday() as u8]),
      enabled: true,
      one_time: true,
    })
  }
}

/// Serde for the persisted "HH:MM" trigger time.
pub mod time_hm {
  use chrono::NaiveTime;
  use serde::{
    Deserialize, Deserializer, Serializer, de::Error as DeError,
  };

  const FORMAT: &str = "%H:%M";

  pub fn serialize<S: Serializer>(
    time: &NaiveTime,
    serializer: S,
  ) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&time.format(FORMAT).to_string())
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(
    deserializer: D,
  ) -> Result<NaiveTime, D::Error> {
    let raw = String::deserialize(deserializer)?;
    NaiveTime::parse_from_str(&raw, FORMAT).map_err(DeError::custom)
  }
}

#[cfg(test)]
mod tests {
  use chrono::NaiveDate;

  use super::*;

  fn schedule() -> Schedule {
    Schedule {
      name: "weeknights".to_string(),
      action: PowerAction::Shutdown,
      time: NaiveTime::from_hms_opt(22, 30, 0).unwrap(),
      days: BTreeSet::from([1, 2, 3, 4, 5]),
      enabled: true,
      one_time: false,
    }
  }

  #[test]
  fn round_trips_through_persisted_record() {
    let schedule = schedule();
    let json = serde_json::to_string(&schedule).unwrap();
    let back: Schedule = serde_json::from_str(&json).unwrap();
    assert_eq!(schedule, back);
  }

  #[test]
  fn persisted_record_uses_document_keys() {
    let json = serde_json::to_value(schedule()).unwrap();
    assert_eq!(json["type"], "shutdown");
    assert_eq!(json["time"], "22:30");
    assert_eq!(json["days"], serde_json::json!([1, 2, 3, 4, 5]));
  }

  #[test]
  fn missing_flags_default() {
    let schedule: Schedule = serde_json::from_str(
      r#"{"name":"n","type":"restart","time":"07:05"}"#,
    )
    .unwrap();
    assert!(schedule.enabled);
    assert!(!schedule.one_time);
    assert!(schedule.days.is_empty());
  }

  #[test]
  fn rejects_out_of_range_weekday() {
    let mut schedule = schedule();
    schedule.days.insert(8);
    assert!(schedule.validate().is_err());
  }

  #[test]
  fn rejects_empty_days_unless_one_time() {
    let mut schedule = schedule();
    schedule.days.clear();
    assert!(schedule.validate().is_err());
    schedule.one_time = true;
    assert!(schedule.validate().is_ok());
  }

  #[test]
  fn once_copy_arms_next_minute_today() {
    let now = NaiveDate::from_ymd_opt(2025, 6, 4)
      .unwrap()
      .and_hms_opt(21, 14, 42)
      .unwrap();
    let once = schedule().once_from(now).unwrap();
    assert_eq!(once.name, "weeknights (once)");
    assert_eq!(once.time, NaiveTime::from_hms_opt(21, 15, 0).unwrap());
    // 2025-06-04 is a Wednesday.
    assert_eq!(once.days, BTreeSet::from([3]));
    assert!(once.one_time);
    assert!(once.enabled);
  }
}
