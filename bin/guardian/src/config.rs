use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use colored::Colorize;
use config::ConfigStore;
use entities::{
  config::{AppConfig, GuardianPolicy},
  logger::{LogConfig, LogLevel, StdioLogMode, default_log_directory},
};
use serde::Deserialize;

/// Curfew guardian watchdog.
///
/// Keeps the main curfew process alive and suppresses tools that could
/// be used to kill it. Policy comes from the shared config document.
#[derive(Parser)]
#[command(name = "curfew-guardian", version)]
pub struct CliArgs {
  /// Start in background mode. Passed by the core process on launch.
  #[arg(long)]
  pub minimized: bool,
  /// Force the diagnostic console regardless of the config document.
  #[arg(long)]
  pub console: bool,
  /// Enable verbose logging.
  #[arg(long)]
  pub debug: bool,
  /// Path to the config document.
  /// Default: platform config dir + `curfew/curfew.json`.
  #[arg(long)]
  pub config_path: Option<PathBuf>,
}

/// # Curfew Guardian Environment Variables
#[derive(Deserialize)]
pub struct Env {
  /// Override the config document path.
  pub curfew_config_path: Option<PathBuf>,
  /// Override `logging.level`
  pub curfew_log_level: Option<LogLevel>,
  /// Override the log file directory.
  pub curfew_log_directory: Option<PathBuf>,
}

/// Everything the guardian needs at startup, resolved once and passed
/// down explicitly.
pub struct GuardianContext {
  pub store: ConfigStore,
  pub logging: LogConfig,
  pub policy: GuardianPolicy,
  pub minimized: bool,
}

pub fn resolve_context() -> anyhow::Result<GuardianContext> {
  dotenvy::dotenv().ok();
  let env: Env = envy::from_env()
    .context("failed to parse curfew guardian environment")?;
  let args = CliArgs::parse();

  let config_path = args
    .config_path
    .or(env.curfew_config_path)
    .unwrap_or_else(ConfigStore::default_path);
  let store = ConfigStore::new(config_path);

  // The logger is not up yet, so report on stderr; the run loop
  // reloads the policy on its own cadence anyway.
  let policy = match store.load() {
    Ok(document) => document.guardian_policy(),
    Err(e) => {
      eprintln!(
        "{}: Using default guardian policy | {e}",
        "WARN".yellow()
      );
      AppConfig::default().guardian_policy()
    }
  };

  let show_diagnostics =
    args.console || policy.show_console || policy.show_window;
  let logging = LogConfig {
    level: if args.debug {
      LogLevel::Debug
    } else {
      env.curfew_log_level.unwrap_or_default()
    },
    stdio: if show_diagnostics {
      StdioLogMode::Standard
    } else {
      StdioLogMode::None
    },
    directory: env
      .curfew_log_directory
      .unwrap_or_else(default_log_directory),
    ..Default::default()
  };

  Ok(GuardianContext {
    store,
    logging,
    policy,
    minimized: args.minimized,
  })
}
