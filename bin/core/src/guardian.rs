use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, anyhow};
use arc_swap::ArcSwap;
use entities::config::AppConfig;
use tokio::{
  process::{Child, Command},
  task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

/// How often the child's liveness is checked.
const MONITOR_INTERVAL: Duration = Duration::from_secs(10);

/// Keeps the guardian child process aligned with the document's
/// guardian policy: spawned while enabled, respawned when it dies,
/// relaunched when its CLI-relevant settings change, stopped when
/// disabled. The guardian does the same for this process from the
/// other side.
pub fn spawn_guardian_manager(
  config: Arc<ArcSwap<AppConfig>>,
  shutdown: CancellationToken,
) -> JoinHandle<()> {
  tokio::spawn(async move {
    let mut manager = GuardianManager {
      child: None,
      show_console: false,
    };
    loop {
      tokio::select! {
        _ = shutdown.cancelled() => break,
        _ = tokio::time::sleep(MONITOR_INTERVAL) => {}
      }
      let document = config.load_full();
      manager
        .align(document.guardian_enabled, document.guardian_show_console)
        .await;
    }
  })
}

struct GuardianManager {
  child: Option<Child>,
  /// The flag the running child was launched with.
  show_console: bool,
}

impl GuardianManager {
  async fn align(&mut self, enabled: bool, show_console: bool) {
    if !enabled {
      if self.child.is_some() {
        info!("guardian disabled, stopping watchdog process");
        self.stop().await;
      }
      return;
    }

    if self.child_running() {
      if self.show_console != show_console {
        info!("guardian launch settings changed, restarting watchdog");
        self.stop().await;
        self.start(show_console);
      }
      return;
    }

    if self.child.is_some() {
      warn!("guardian process exited, restarting");
    }
    self.start(show_console);
  }

  fn child_running(&mut self) -> bool {
    match self.child.as_mut() {
      Some(child) => matches!(child.try_wait(), Ok(None)),
      None => false,
    }
  }

  fn start(&mut self, show_console: bool) {
    match launch_guardian(show_console) {
      Ok(child) => {
        info!("guardian process started");
        self.child = Some(child);
        self.show_console = show_console;
      }
      // Retried on the next monitor tick.
      Err(e) => error!("failed to start guardian process | {e:#}"),
    }
  }

  async fn stop(&mut self) {
    let Some(mut child) = self.child.take() else {
      return;
    };
    if let Err(e) = child.kill().await {
      error!("failed to stop guardian process | {e:?}");
    }
  }
}

/// Launches the guardian binary sitting next to our own executable.
fn launch_guardian(show_console: bool) -> anyhow::Result<Child> {
  let path = guardian_exe_path()?;
  if !path.exists() {
    return Err(anyhow!(
      "guardian executable not found at {}",
      path.display()
    ));
  }
  let mut command = Command::new(path);
  command.arg("--minimized");
  if show_console {
    command.arg("--console");
  }
  #[cfg(windows)]
  {
    const CREATE_NO_WINDOW: u32 = 0x0800_0000;
    command.creation_flags(CREATE_NO_WINDOW);
  }
  command.spawn().context("failed to spawn guardian process")
}

fn guardian_exe_path() -> anyhow::Result<PathBuf> {
  let own = std::env::current_exe()
    .context("failed to resolve own executable path")?;
  let dir = own
    .parent()
    .context("own executable path has no parent directory")?;
  Ok(dir.join(entities::guardian_exe_name()))
}
