use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use config::ConfigStore;
use entities::logger::{
  LogConfig, LogLevel, StdioLogMode, default_log_directory,
};
use serde::Deserialize;

/// Curfew main process.
///
/// Runs the schedule engine and, when enabled, manages the guardian
/// watchdog process.
#[derive(Parser)]
#[command(name = "curfew", version)]
pub struct CliArgs {
  /// Start in background mode without any foreground surface.
  /// Passed by autostart entries and by the guardian on respawn.
  #[arg(long)]
  pub minimized: bool,
  /// Path to the config document.
  /// Default: platform config dir + `curfew/curfew.json`.
  #[arg(long)]
  pub config_path: Option<PathBuf>,
  /// Override the log level.
  #[arg(long)]
  pub log_level: Option<tracing::Level>,
}

/// # Curfew Core Environment Variables
#[derive(Deserialize)]
pub struct Env {
  /// Override the config document path.
  pub curfew_config_path: Option<PathBuf>,
  /// Override `logging.level`
  pub curfew_log_level: Option<LogLevel>,
  /// Override `logging.stdio`
  pub curfew_log_stdio: Option<StdioLogMode>,
  /// Override the log file directory.
  pub curfew_log_directory: Option<PathBuf>,
}

/// Everything the core process needs at startup, resolved once from
/// CLI args, environment and defaults, and passed down explicitly.
pub struct CoreContext {
  pub store: ConfigStore,
  pub logging: LogConfig,
  pub minimized: bool,
}

pub fn resolve_context() -> anyhow::Result<CoreContext> {
  dotenvy::dotenv().ok();
  let env: Env = envy::from_env()
    .context("failed to parse curfew environment")?;
  let args = CliArgs::parse();

  let config_path = args
    .config_path
    .or(env.curfew_config_path)
    .unwrap_or_else(ConfigStore::default_path);

  let logging = LogConfig {
    level: args
      .log_level
      .map(LogLevel::from)
      .or(env.curfew_log_level)
      .unwrap_or_default(),
    stdio: env.curfew_log_stdio.unwrap_or_default(),
    directory: env
      .curfew_log_directory
      .unwrap_or_else(default_log_directory),
    ..Default::default()
  };

  Ok(CoreContext {
    store: ConfigStore::new(config_path),
    logging,
    minimized: args.minimized,
  })
}
