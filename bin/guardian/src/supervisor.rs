use std::{
  path::PathBuf,
  time::{Duration, Instant},
};

use anyhow::{Context, anyhow};
use async_timing_util::{Timelength, wait_until_timelength};
use config::ConfigStore;
use entities::config::GuardianPolicy;

use crate::processes::{
  ProcessDirectory, ProcessRecord, is_denylisted, is_guardian_instance,
  is_main_process,
};

/// How often the reloaded policy is re-read from disk.
const POLICY_RELOAD_INTERVAL: Duration = Duration::from_secs(60);
/// Backoff after an errored tick.
const ERROR_BACKOFF: Duration = Duration::from_secs(10);

/// Whether another guardian instance is already running. Checked once
/// at startup, before any side effects, so at most one supervisor is
/// active per host.
pub fn another_instance_running(
  directory: &mut impl ProcessDirectory,
) -> bool {
  let self_pid = std::process::id();
  let self_exe = std::env::current_exe().ok();
  directory.processes().iter().any(|record| {
    is_guardian_instance(record, self_pid, self_exe.as_deref())
  })
}

/// Launches the main process when the supervisor finds it absent.
/// Pluggable so tick logic can count launches in tests.
pub trait MainLauncher {
  fn launch(&mut self) -> anyhow::Result<()>;
  /// Collects an exited child it previously launched, if any.
  fn reap(&mut self) {}
}

/// Launches the main binary sitting next to our own executable,
/// hidden and in background mode.
#[derive(Default)]
pub struct SiblingLauncher {
  child: Option<std::process::Child>,
}

impl MainLauncher for SiblingLauncher {
  fn launch(&mut self) -> anyhow::Result<()> {
    let path = main_exe_path()?;
    if !path.exists() {
      return Err(anyhow!(
        "main executable not found at {}",
        path.display()
      ));
    }
    let mut command = std::process::Command::new(path);
    command.arg("--minimized");
    #[cfg(windows)]
    {
      use std::os::windows::process::CommandExt;
      const CREATE_NO_WINDOW: u32 = 0x0800_0000;
      command.creation_flags(CREATE_NO_WINDOW);
    }
    let child =
      command.spawn().context("failed to spawn main process")?;
    self.child = Some(child);
    Ok(())
  }

  fn reap(&mut self) {
    if let Some(child) = self.child.as_mut()
      && !matches!(child.try_wait(), Ok(None))
    {
      self.child = None;
    }
  }
}

fn main_exe_path() -> anyhow::Result<PathBuf> {
  let own = std::env::current_exe()
    .context("failed to resolve own executable path")?;
  let dir = own
    .parent()
    .context("own executable path has no parent directory")?;
  Ok(dir.join(entities::main_exe_name()))
}

/// The watchdog loop: polls main-process liveness, restarts it under
/// policy, terminates denylisted tools, reloads policy on a slower
/// cadence. Only an interrupt ends the loop.
pub struct Supervisor<D, L> {
  store: ConfigStore,
  policy: GuardianPolicy,
  directory: D,
  launcher: L,
  last_reload: Instant,
}

impl<D: ProcessDirectory, L: MainLauncher> Supervisor<D, L> {
  pub fn new(
    store: ConfigStore,
    policy: GuardianPolicy,
    directory: D,
    launcher: L,
  ) -> Supervisor<D, L> {
    Supervisor {
      store,
      policy,
      directory,
      launcher,
      last_reload: Instant::now(),
    }
  }

  pub async fn run(mut self) {
    info!(
      "guardian running | autorestart: {} | terminate tools: {}",
      self.policy.autorestart, self.policy.terminate_tools
    );
    loop {
      if let Err(e) = self.tick() {
        error!("guardian tick failed | {e:#}");
        tokio::time::sleep(ERROR_BACKOFF).await;
        continue;
      }
      wait_until_timelength(Timelength::FiveSeconds, 0).await;
    }
  }

  fn tick(&mut self) -> anyhow::Result<()> {
    self.launcher.reap();
    if self.last_reload.elapsed() >= POLICY_RELOAD_INTERVAL {
      self.reload_policy();
      self.last_reload = Instant::now();
    }
    if !self.policy.enabled {
      return Ok(());
    }

    let processes = self.directory.processes();
    self.ensure_main_running(&processes);
    if self.policy.terminate_tools {
      self.terminate_denylisted(&processes);
    }
    Ok(())
  }

  fn reload_policy(&mut self) {
    let document = match self.store.load() {
      Ok(document) => document,
      // Transient read failures resolve on a later cadence.
      Err(e) => {
        debug!("policy reload skipped | {e}");
        return;
      }
    };
    let policy = document.guardian_policy();
    if policy != self.policy {
      info!(
        "guardian policy changed | autorestart: {} | terminate tools: {}",
        policy.autorestart, policy.terminate_tools
      );
      self.policy = policy;
    }
  }

  fn ensure_main_running(&mut self, processes: &[ProcessRecord]) {
    if processes.iter().any(is_main_process) {
      return;
    }
    if !self.policy.autorestart {
      debug!("main process absent, autorestart disabled");
      return;
    }
    warn!("main process absent, restarting");
    if let Err(e) = self.launcher.launch() {
      // Retried on the next cadence tick.
      error!("failed to restart main process | {e:#}");
    }
  }

  fn terminate_denylisted(&mut self, processes: &[ProcessRecord]) {
    for record in processes {
      if !is_denylisted(record, &self.policy.tool_denylist) {
        continue;
      }
      // A process that vanished between the scan and the kill is
      // nothing to do, not an error.
      if self.directory.terminate(record.pid) {
        info!("terminated denylisted tool: {}", record.name);
      } else {
        debug!("denylisted tool already gone: {}", record.name);
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use entities::config::AppConfig;

  use super::*;

  struct FakeDirectory {
    records: Vec<ProcessRecord>,
    terminated: Vec<u32>,
  }

  impl FakeDirectory {
    fn new(records: Vec<ProcessRecord>) -> FakeDirectory {
      FakeDirectory {
        records,
        terminated: Vec::new(),
      }
    }
  }

  impl ProcessDirectory for FakeDirectory {
    fn processes(&mut self) -> Vec<ProcessRecord> {
      self.records.clone()
    }
    fn terminate(&mut self, pid: u32) -> bool {
      self.terminated.push(pid);
      self.records.retain(|record| record.pid != pid);
      true
    }
  }

  #[derive(Default)]
  struct FakeLauncher {
    launches: u32,
  }

  impl MainLauncher for FakeLauncher {
    fn launch(&mut self) -> anyhow::Result<()> {
      self.launches += 1;
      Ok(())
    }
  }

  fn record(pid: u32, name: &str) -> ProcessRecord {
    ProcessRecord {
      pid,
      name: name.to_string(),
      exe: None,
      cmdline: Vec::new(),
    }
  }

  fn policy(enabled: bool, autorestart: bool) -> GuardianPolicy {
    GuardianPolicy {
      enabled,
      autorestart,
      ..AppConfig::default().guardian_policy()
    }
  }

  fn supervisor(
    policy: GuardianPolicy,
    records: Vec<ProcessRecord>,
  ) -> Supervisor<FakeDirectory, FakeLauncher> {
    let dir = tempfile::tempdir().unwrap();
    let store = ConfigStore::new(dir.path().join("curfew.json"));
    Supervisor::new(
      store,
      policy,
      FakeDirectory::new(records),
      FakeLauncher::default(),
    )
  }

  #[test]
  fn restarts_absent_main_exactly_once_per_tick() {
    let mut supervisor = supervisor(
      policy(true, true),
      vec![record(1, "init"), record(2, "bash")],
    );
    supervisor.tick().unwrap();
    assert_eq!(supervisor.launcher.launches, 1);

    // Main came up: no further restarts.
    supervisor.directory.records.push(record(9, "curfew"));
    supervisor.tick().unwrap();
    assert_eq!(supervisor.launcher.launches, 1);
  }

  #[test]
  fn retries_restart_on_next_tick_while_absent() {
    let mut supervisor = supervisor(policy(true, true), Vec::new());
    supervisor.tick().unwrap();
    supervisor.tick().unwrap();
    assert_eq!(supervisor.launcher.launches, 2);
  }

  #[test]
  fn never_restarts_with_autorestart_disabled() {
    let mut supervisor = supervisor(policy(true, false), Vec::new());
    for _ in 0..5 {
      supervisor.tick().unwrap();
    }
    assert_eq!(supervisor.launcher.launches, 0);
  }

  #[test]
  fn terminates_denylisted_tools_only() {
    let mut supervisor = supervisor(
      policy(true, true),
      vec![
        record(7, "Taskmgr.exe"),
        record(8, "procexp64.exe"),
        record(9, "curfew"),
        record(10, "explorer.exe"),
      ],
    );
    supervisor.tick().unwrap();
    assert_eq!(supervisor.directory.terminated, vec![7, 8]);
  }

  #[test]
  fn disabled_policy_enforces_nothing() {
    let mut supervisor =
      supervisor(policy(false, true), vec![record(7, "taskmgr.exe")]);
    supervisor.tick().unwrap();
    assert_eq!(supervisor.launcher.launches, 0);
    assert!(supervisor.directory.terminated.is_empty());
  }

  #[test]
  fn reload_picks_up_changed_policy() {
    let mut supervisor = supervisor(policy(true, true), Vec::new());
    let document = AppConfig {
      guardian_enabled: true,
      guardian_autorestart: false,
      ..Default::default()
    };
    supervisor.store.save(&document).unwrap();

    supervisor.reload_policy();
    assert!(!supervisor.policy.autorestart);

    supervisor.tick().unwrap();
    assert_eq!(supervisor.launcher.launches, 0);
  }
}
