use crate::error::{Result, ServiceError};
use std::path::{Path, PathBuf};

pub fn current_exe() -> Result<PathBuf> {
  std::env::current_exe().map_err(ServiceError::PathResolution)
}

pub fn exe_dir(exe: &Path) -> Option<&Path> {
  exe.parent().filter(|p| !p.as_os_str().is_empty())
}

#[derive(Debug)]
pub struct LogPath {
  pub path: PathBuf,
  /// Set when the executable location was unknown and `path` is relative to
  /// the working directory.
  pub degraded: Option<ServiceError>,
}

/// Places `file_name` next to the executable, or in the working directory when
/// the executable path is unavailable.
pub fn resolve_log_path(exe: Result<PathBuf>, file_name: &str) -> LogPath {
  match exe {
    Ok(exe) => LogPath {
      path: exe_dir(&exe)
        .map(|dir| dir.join(file_name))
        .unwrap_or_else(|| PathBuf::from(file_name)),
      degraded: None,
    },
    Err(e) => LogPath {
      path: PathBuf::from(file_name),
      degraded: Some(e),
    },
  }
}
