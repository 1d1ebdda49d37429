use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, ServiceError>;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
  #[error("cannot determine executable path: {0}")]
  PathResolution(#[source] std::io::Error),

  #[error("cannot open log file {}: {source}", .path.display())]
  LogOpen {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  /// The host service manager is unreachable or refused access.
  #[error("cannot connect to service manager: {0}")]
  Connection(String),

  #[error("service {0} already exists")]
  AlreadyExists(String),

  #[error("service {0} is not installed")]
  NotFound(String),

  #[error("host error: {0}")]
  Host(String),

  /// Reporting a lifecycle state to the host failed; the host will tear the
  /// process down.
  #[error("failed to report service status: {0}")]
  StatusReport(String),

  #[error("cannot resolve current user: {0}")]
  Identity(String),
}
