//! # Curfew Config
//!
//! Load / save of the single persisted JSON config document. The core
//! process is the sole writer; every write is a full-document rewrite.
//! The guardian and the external configuration UI only read.

use std::{
  fs::File,
  io::Read,
  path::{Path, PathBuf},
};

use entities::config::AppConfig;
use tracing::warn;

mod error;

pub use error::Error;

pub type Result<T> = ::core::result::Result<T, Error>;

/// Handle on the persisted config document.
#[derive(Debug, Clone)]
pub struct ConfigStore {
  path: PathBuf,
}

impl ConfigStore {
  pub fn new(path: impl Into<PathBuf>) -> ConfigStore {
    ConfigStore { path: path.into() }
  }

  /// Platform config dir + `curfew/curfew.json`.
  pub fn default_path() -> PathBuf {
    dirs::config_dir()
      .unwrap_or_else(|| PathBuf::from("."))
      .join("curfew")
      .join("curfew.json")
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// Reads and parses the document.
  pub fn load(&self) -> Result<AppConfig> {
    let mut file = File::open(&self.path).map_err(|e| Error::FileOpen {
      e,
      path: self.path.clone(),
    })?;
    let mut contents = String::new();
    file.read_to_string(&mut contents).map_err(|e| {
      Error::ReadFileContents {
        e,
        path: self.path.clone(),
      }
    })?;
    serde_json::from_str(&contents).map_err(|e| Error::ParseJson {
      e,
      path: self.path.clone(),
    })
  }

  /// Reads the document, falling back to the default document on any
  /// error. A missing document is the expected first-run state; a
  /// malformed one is logged and never crashes the caller.
  pub fn load_or_default(&self) -> AppConfig {
    match self.load() {
      Ok(config) => config,
      Err(e) => {
        warn!("using default config document | {e}");
        AppConfig::default()
      }
    }
  }

  /// Rewrites the whole document, creating parent directories first.
  pub fn save(&self, config: &AppConfig) -> Result<()> {
    if let Some(parent) = self.path.parent() {
      std::fs::create_dir_all(parent).map_err(|e| Error::CreateDir {
        e,
        path: parent.to_path_buf(),
      })?;
    }
    let contents = serde_json::to_string_pretty(config)
      .map_err(|e| Error::SerializeJson { e })?;
    std::fs::write(&self.path, contents).map_err(|e| Error::WriteFile {
      e,
      path: self.path.clone(),
    })
  }
}
