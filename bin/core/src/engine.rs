use std::{collections::HashMap, sync::Arc, time::Duration};

use arc_swap::ArcSwap;
use chrono::{Datelike, Local, NaiveDateTime};
use config::ConfigStore;
use entities::{config::AppConfig, schedule::Schedule};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// How often an off-window timer re-checks the clock. Also bounds how
/// fast a weekday change or an external config edit is picked up.
const COARSE_POLL: Duration = Duration::from_secs(10);
/// Slice width of the fine wait inside the trigger window. Bounds both
/// firing precision and cancellation latency during the wait.
const FINE_SLICE: Duration = Duration::from_millis(500);
/// Remaining-time threshold for switching to the fine wait.
const TRIGGER_WINDOW_SECS: i64 = 60;
/// Post-fire sleep so a recurring timer cannot re-trigger within the
/// same minute.
const COOLDOWN: Duration = Duration::from_secs(60);
/// Backoff after an errored cycle.
const ERROR_BACKOFF: Duration = Duration::from_secs(10);

/// Published by timer tasks, consumed by the coordinator (the single
/// writer of the config document).
#[derive(Debug)]
pub enum ScheduleEvent {
  /// The schedule triggered and its action was issued.
  Fired { name: String, one_time: bool },
  /// A one-time schedule's trigger time had already elapsed when its
  /// timer looked - removed without firing.
  ExpiredUnfired { name: String },
}

/// Owns the in-memory schedule set and one timer task per armed
/// schedule. Timers run independently and never block each other.
pub struct ScheduleEngine {
  config: Arc<ArcSwap<AppConfig>>,
  events: mpsc::UnboundedSender<ScheduleEvent>,
  timers: HashMap<String, CancellationToken>,
}

impl ScheduleEngine {
  pub fn new(
    config: Arc<ArcSwap<AppConfig>>,
    events: mpsc::UnboundedSender<ScheduleEvent>,
  ) -> ScheduleEngine {
    ScheduleEngine {
      config,
      events,
      timers: HashMap::new(),
    }
  }

  /// Arms a timer for the schedule. Idempotent: an already running
  /// timer or a disabled schedule is left untouched.
  pub fn start(&mut self, schedule: &Schedule) {
    if !schedule.enabled || self.timers.contains_key(&schedule.name) {
      return;
    }
    let cancel = CancellationToken::new();
    tokio::spawn(run_schedule(
      schedule.clone(),
      self.config.clone(),
      self.events.clone(),
      cancel.clone(),
    ));
    self.timers.insert(schedule.name.clone(), cancel);
    info!("schedule '{}' armed", schedule.name);
  }

  /// Disarms the schedule's timer. Idempotent.
  pub fn stop(&mut self, name: &str) {
    if let Some(cancel) = self.timers.remove(name) {
      cancel.cancel();
      info!("schedule '{name}' disarmed");
    }
  }

  pub fn stop_all(&mut self) {
    for (name, cancel) in self.timers.drain() {
      cancel.cancel();
      debug!("schedule '{name}' disarmed");
    }
  }

  /// Replaces the running timer set with one timer per enabled
  /// schedule in `schedules`.
  pub fn rebuild(&mut self, schedules: &[Schedule]) {
    self.stop_all();
    for schedule in schedules {
      self.start(schedule);
    }
  }

  #[cfg(test)]
  fn is_armed(&self, name: &str) -> bool {
    self.timers.contains_key(name)
  }
}

/// One timer loop. Lives until the schedule finishes (one-time fired
/// or expired) or the token cancels it; a transient cycle failure only
/// backs the loop off, never kills it.
async fn run_schedule(
  schedule: Schedule,
  config: Arc<ArcSwap<AppConfig>>,
  events: mpsc::UnboundedSender<ScheduleEvent>,
  cancel: CancellationToken,
) {
  loop {
    let now = Local::now().naive_local();
    match schedule_cycle(now, &schedule, &config, &events, &cancel)
      .await
    {
      Ok(CycleOutcome::Continue) => {}
      Ok(CycleOutcome::Finished) => break,
      Err(e) => {
        error!("schedule '{}' cycle failed | {e:#}", schedule.name);
        if sleep_or_cancelled(ERROR_BACKOFF, &cancel).await {
          break;
        }
      }
    }
    if cancel.is_cancelled() {
      break;
    }
  }
}

enum CycleOutcome {
  Continue,
  Finished,
}

/// One pass of the two-phase poll: coarse 10s waits outside the
/// trigger window, 0.5s slices inside it. Repeated short sleeps keep
/// the timer self-correcting across system suspend and clock changes,
/// where a single long sleep-until-deadline would drift.
async fn schedule_cycle(
  now: NaiveDateTime,
  schedule: &Schedule,
  config: &ArcSwap<AppConfig>,
  events: &mpsc::UnboundedSender<ScheduleEvent>,
  cancel: &CancellationToken,
) -> anyhow::Result<CycleOutcome> {
  let today = now.weekday().number_from_monday() as u8;
  if !schedule.one_time && !schedule.days.contains(&today) {
    if sleep_or_cancelled(COARSE_POLL, cancel).await {
      return Ok(CycleOutcome::Finished);
    }
    return Ok(CycleOutcome::Continue);
  }

  let target = match next_trigger(now, schedule) {
    Trigger::ExpiredUnfired => {
      warn!(
        "one-time schedule '{}' trigger time already elapsed, removing without firing",
        schedule.name
      );
      let _ = events.send(ScheduleEvent::ExpiredUnfired {
        name: schedule.name.clone(),
      });
      return Ok(CycleOutcome::Finished);
    }
    Trigger::At(target) => target,
  };

  if (target - now).num_seconds() > TRIGGER_WINDOW_SECS {
    if sleep_or_cancelled(COARSE_POLL, cancel).await {
      return Ok(CycleOutcome::Finished);
    }
    return Ok(CycleOutcome::Continue);
  }

  debug!(
    "schedule '{}' entering trigger window | target: {target}",
    schedule.name
  );

  while Local::now().naive_local() < target {
    if sleep_or_cancelled(FINE_SLICE, cancel).await {
      return Ok(CycleOutcome::Finished);
    }
  }
  if cancel.is_cancelled() {
    return Ok(CycleOutcome::Finished);
  }

  let elevated = config.load().run_as_admin;
  info!(
    "schedule '{}' triggering {} (elevated: {elevated})",
    schedule.name, schedule.action
  );
  let log = command::run_power_action(schedule.action, elevated).await;
  if log.success {
    info!("schedule '{}' issued: {}", schedule.name, log.command);
  } else {
    error!(
      "schedule '{}' action failed | command: {} | stderr: {}",
      schedule.name,
      log.command,
      log.stderr.trim()
    );
  }

  let _ = events.send(ScheduleEvent::Fired {
    name: schedule.name.clone(),
    one_time: schedule.one_time,
  });
  if schedule.one_time {
    return Ok(CycleOutcome::Finished);
  }

  if sleep_or_cancelled(COOLDOWN, cancel).await {
    return Ok(CycleOutcome::Finished);
  }
  Ok(CycleOutcome::Continue)
}

#[derive(Debug, PartialEq)]
enum Trigger {
  /// One-time schedule whose instant has already passed - remove, do
  /// not execute.
  ExpiredUnfired,
  At(NaiveDateTime),
}

/// Next candidate trigger instant relative to `now`.
///
/// A recurring schedule whose time has passed today rolls forward by
/// exactly 24h without re-deriving the weekday; the rolled target is
/// always far outside the trigger window, so the following coarse
/// cycle re-checks weekday eligibility before anything can fire.
fn next_trigger(now: NaiveDateTime, schedule: &Schedule) -> Trigger {
  let target = now.date().and_time(schedule.time);
  if target > now {
    return Trigger::At(target);
  }
  if schedule.one_time {
    return Trigger::ExpiredUnfired;
  }
  Trigger::At(target + chrono::Duration::hours(24))
}

/// Waits out `duration` unless the token fires first. Returns whether
/// the wait was cancelled.
async fn sleep_or_cancelled(
  duration: Duration,
  cancel: &CancellationToken,
) -> bool {
  tokio::select! {
    _ = cancel.cancelled() => true,
    _ = tokio::time::sleep(duration) => false,
  }
}

/// Cadence of the external-change poll on the config document.
const RELOAD_INTERVAL: Duration = Duration::from_secs(10);

/// The single writer of the config document. Applies one-time removal
/// events from timer tasks and picks up document edits written by the
/// external configuration UI.
pub async fn run_coordinator(
  mut engine: ScheduleEngine,
  store: ConfigStore,
  config: Arc<ArcSwap<AppConfig>>,
  mut events: mpsc::UnboundedReceiver<ScheduleEvent>,
  shutdown: CancellationToken,
) {
  loop {
    tokio::select! {
      _ = shutdown.cancelled() => {
        engine.stop_all();
        break;
      }
      event = events.recv() => {
        let Some(event) = event else { break };
        handle_event(event, &mut engine, &store, &config);
      }
      _ = tokio::time::sleep(RELOAD_INTERVAL) => {
        reload_document(&mut engine, &store, &config);
      }
    }
  }
}

fn handle_event(
  event: ScheduleEvent,
  engine: &mut ScheduleEngine,
  store: &ConfigStore,
  config: &ArcSwap<AppConfig>,
) {
  match event {
    ScheduleEvent::Fired {
      one_time: false, ..
    } => {}
    ScheduleEvent::Fired { name, .. }
    | ScheduleEvent::ExpiredUnfired { name } => {
      remove_schedule(&name, engine, store, config);
    }
  }
}

/// Deletes a finished one-time schedule from the document.
fn remove_schedule(
  name: &str,
  engine: &mut ScheduleEngine,
  store: &ConfigStore,
  config: &ArcSwap<AppConfig>,
) {
  engine.stop(name);
  let mut document = AppConfig::clone(&config.load());
  let before = document.schedules.len();
  document.schedules.retain(|schedule| schedule.name != name);
  if document.schedules.len() == before {
    return;
  }
  if let Err(e) = store.save(&document) {
    // Transient write failure: the in-memory set is already updated,
    // the next mutation or reload persists again.
    error!("failed to persist removal of schedule '{name}' | {e}");
  } else {
    info!("schedule '{name}' removed from config document");
  }
  config.store(Arc::new(document));
}

/// Picks up document edits written by the external UI.
fn reload_document(
  engine: &mut ScheduleEngine,
  store: &ConfigStore,
  config: &ArcSwap<AppConfig>,
) {
  let latest = match store.load() {
    Ok(latest) => latest,
    // A missing or malformed document is retried on the next cycle.
    Err(e) => {
      debug!("config document reload skipped | {e}");
      return;
    }
  };
  if let Err(e) = latest.validate() {
    warn!("ignoring invalid config document on disk | {e:#}");
    return;
  }
  let current = config.load();
  if latest == **current {
    return;
  }
  if latest.schedules != current.schedules {
    info!("schedule list changed on disk, rebuilding timers");
    engine.rebuild(&latest.schedules);
  }
  config.store(Arc::new(latest));
}
