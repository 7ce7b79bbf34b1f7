use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RingLogError {
  #[error("failed to open log file {path}")]
  FileOpen {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to archive rotated file {path}")]
  Archive {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}
