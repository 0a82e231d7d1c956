#[macro_use]
extern crate tracing;

use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::engine::ScheduleEngine;

mod config;
mod engine;
mod guardian;

async fn app() -> anyhow::Result<()> {
  let context = crate::config::resolve_context()?;
  logger::init(&context.logging, entities::MAIN_PROCESS_NAME)?;

  info!("Curfew core version: v{}", env!("CARGO_PKG_VERSION"));
  info!("config document: {}", context.store.path().display());
  if context.minimized {
    info!("started in background mode");
  }

  let document = context.store.load_or_default();
  if let Err(e) = document.validate() {
    // A bad document must not keep the engine down. Invalid entries
    // are inert in the engine: an out-of-range weekday never matches.
    warn!("config document failed validation | {e:#}");
  }
  let config = Arc::new(ArcSwap::from_pointee(document));

  // Note: stopping the core does not stop an enabled guardian, which
  // will relaunch the core on its next liveness check.
  let shutdown = CancellationToken::new();
  let interrupt = shutdown.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      info!("interrupt received, stopping schedule timers");
      interrupt.cancel();
    }
  });

  let (events_tx, events_rx) = mpsc::unbounded_channel();

  let mut engine = ScheduleEngine::new(config.clone(), events_tx);
  engine.rebuild(&config.load().schedules);

  guardian::spawn_guardian_manager(config.clone(), shutdown.clone());

  engine::run_coordinator(
    engine,
    context.store,
    config,
    events_rx,
    shutdown,
  )
  .await;
  Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  app().await
}
