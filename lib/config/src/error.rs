use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
  #[error("Failed to open file at {path} | {e:?}")]
  FileOpen { e: std::io::Error, path: PathBuf },

  #[error("Failed to read contents of file at {path} | {e:?}")]
  ReadFileContents { e: std::io::Error, path: PathBuf },

  #[error("Failed to parse json document at {path} | {e:?}")]
  ParseJson { e: serde_json::Error, path: PathBuf },

  #[error("Failed to serialize document to json | {e:?}")]
  SerializeJson { e: serde_json::Error },

  #[error("Failed to create directory at {path} | {e:?}")]
  CreateDir { e: std::io::Error, path: PathBuf },

  #[error("Failed to write document to {path} | {e:?}")]
  WriteFile { e: std::io::Error, path: PathBuf },
}
