#[macro_use]
extern crate tracing;

use crate::{
  processes::SysinfoDirectory,
  supervisor::{SiblingLauncher, Supervisor},
};

mod config;
mod processes;
mod supervisor;

async fn app() -> anyhow::Result<()> {
  let context = crate::config::resolve_context()?;
  logger::init(&context.logging, entities::GUARDIAN_PROCESS_NAME)?;

  info!("Curfew guardian version: v{}", env!("CARGO_PKG_VERSION"));
  info!("config document: {}", context.store.path().display());
  if context.minimized {
    debug!("started in background mode");
  }

  let mut directory = SysinfoDirectory::new();
  if supervisor::another_instance_running(&mut directory) {
    info!("another guardian instance is already running, exiting");
    return Ok(());
  }

  Supervisor::new(
    context.store,
    context.policy,
    directory,
    SiblingLauncher::default(),
  )
  .run()
  .await;
  Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tokio::select! {
    res = tokio::spawn(app()) => res?,
    _ = tokio::signal::ctrl_c() => {
      info!("interrupted, guardian exiting");
      Ok(())
    }
  }
}
