use anyhow::Context;
use entities::logger::{LogConfig, StdioLogMode};
use tracing::level_filters::LevelFilter;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
  Registry, layer::SubscriberExt, util::SubscriberInitExt,
};

/// Initializes tracing for this process: optional stdio layer plus the
/// append-only rotating file sink. `file_name` is the per-process log
/// file prefix (rotation appends the date).
pub fn init(config: &LogConfig, file_name: &str) -> anyhow::Result<()> {
  let log_level: tracing::Level = config.level.into();

  let registry =
    Registry::default().with(LevelFilter::from(log_level));

  let appender = file_appender(config, file_name)?;

  match (config.stdio, config.pretty) {
    (StdioLogMode::Standard, true) => registry
      .with(
        tracing_subscriber::fmt::layer()
          .pretty()
          .with_file(false)
          .with_line_number(false),
      )
      .with(
        tracing_subscriber::fmt::layer()
          .with_ansi(false)
          .with_writer(appender),
      )
      .try_init(),
    (StdioLogMode::Standard, false) => registry
      .with(
        tracing_subscriber::fmt::layer()
          .with_file(false)
          .with_line_number(false),
      )
      .with(
        tracing_subscriber::fmt::layer()
          .with_ansi(false)
          .with_writer(appender),
      )
      .try_init(),
    (StdioLogMode::Json, _) => registry
      .with(tracing_subscriber::fmt::layer().json())
      .with(
        tracing_subscriber::fmt::layer()
          .with_ansi(false)
          .with_writer(appender),
      )
      .try_init(),
    (StdioLogMode::None, _) => registry
      .with(
        tracing_subscriber::fmt::layer()
          .with_ansi(false)
          .with_writer(appender),
      )
      .try_init(),
  }
  .context("failed to init logger")
}

fn file_appender(
  config: &LogConfig,
  file_name: &str,
) -> anyhow::Result<RollingFileAppender> {
  RollingFileAppender::builder()
    .rotation(Rotation::DAILY)
    .filename_prefix(file_name)
    .filename_suffix("log")
    .max_log_files(config.max_files)
    .build(&config.directory)
    .context("failed to init rolling log file appender")
}
