use crate::config::BootConfig;
use crate::error::{Result, ServiceError};
use crate::paths;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing_appender::non_blocking::{NonBlocking, NonBlockingBuilder, WorkerGuard};
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Layer;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Process-wide append-only log file.
///
/// The sink owns the background writer; dropping it flushes pending lines and
/// closes the file, so callers keep it alive for as long as they log.
pub struct LogSink {
  path: PathBuf,
  writer: NonBlocking,
  echo: Arc<AtomicBool>,
  _guard: WorkerGuard,
}

impl LogSink {
  pub fn open(path: &Path) -> Result<Self> {
    let file = open_append(path).map_err(|source| ServiceError::LogOpen {
      path: path.to_path_buf(),
      source,
    })?;

    // Lossless: a full queue blocks the writer instead of dropping lines.
    let (writer, guard) = NonBlockingBuilder::default()
      .lossy(false)
      .thread_name("svcboot-log")
      .finish(file);

    Ok(Self {
      path: path.to_path_buf(),
      writer,
      echo: Arc::new(AtomicBool::new(false)),
      _guard: guard,
    })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn echoes_stderr(&self) -> bool {
    self.echo.load(Ordering::Relaxed)
  }

  /// Starts copying events to stderr on every subscriber built from this sink,
  /// including one already installed.
  pub fn echo_to_stderr(&self) {
    self.echo.store(true, Ordering::Relaxed);
  }

  pub fn subscriber(
    &self,
    filter: &str,
    echo_stderr: bool,
  ) -> impl tracing::Subscriber + Send + Sync + 'static {
    if echo_stderr {
      self.echo_to_stderr();
    }

    let file_layer = tracing_subscriber::fmt::layer()
      .with_ansi(false)
      .with_writer(self.writer.clone())
      .with_target(true);

    let echo = Arc::clone(&self.echo);
    let stderr_layer = tracing_subscriber::fmt::layer()
      .with_ansi(false)
      .with_writer(io::stderr)
      .with_target(true)
      .with_filter(filter_fn(move |_| echo.load(Ordering::Relaxed)));

    tracing_subscriber::registry()
      .with(env_filter(filter))
      .with(file_layer)
      .with(stderr_layer)
  }

  /// Routes all subsequent `tracing` output of the process into this sink.
  pub fn install(&self, filter: &str, echo_stderr: bool) -> Result<()> {
    self
      .subscriber(filter, echo_stderr)
      .try_init()
      .map_err(|e| ServiceError::Host(format!("logging already initialized: {e}")))
  }
}

/// Opens `<exe dir>/<log file>` and makes it the process log.
///
/// Failures are printed to stderr, since the sink cannot report on itself, and
/// the process keeps logging to stderr instead.
pub fn init(cfg: &BootConfig, echo_stderr: bool) -> Option<LogSink> {
  let log_path = paths::resolve_log_path(paths::current_exe(), &cfg.log_file_name);

  let sink = match LogSink::open(&log_path.path) {
    Ok(sink) => sink,
    Err(e) => {
      eprintln!("{}: {e}", cfg.service_name);
      install_stderr_only(&cfg.log_filter);
      return None;
    }
  };

  if let Err(e) = sink.install(&cfg.log_filter, echo_stderr) {
    eprintln!("{}: {e}", cfg.service_name);
  }
  log_session_start(&cfg.service_name);

  if let Some(e) = &log_path.degraded {
    tracing::warn!(
      error = %e,
      path = %sink.path().display(),
      "executable location unknown; logging relative to working directory"
    );
  }

  Some(sink)
}

/// Used when the log file cannot be opened.
pub fn install_stderr_only(filter: &str) {
  let stderr_layer = tracing_subscriber::fmt::layer()
    .with_ansi(false)
    .with_writer(io::stderr)
    .with_target(true);

  let _ = tracing_subscriber::registry()
    .with(env_filter(filter))
    .with(stderr_layer)
    .try_init();
}

pub fn log_session_start(service_name: &str) {
  tracing::info!("=== Starting {service_name} service ===");
}

fn env_filter(filter: &str) -> EnvFilter {
  EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"))
}

fn open_append(path: &Path) -> io::Result<File> {
  let mut opts = OpenOptions::new();
  opts.create(true).append(true);
  #[cfg(unix)]
  {
    use std::os::unix::fs::OpenOptionsExt;
    opts.mode(0o644);
  }
  opts.open(path)
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::fs;

  #[test]
  fn thousand_sequential_writes_land_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("svcboot.log");

    let sink = LogSink::open(&path).unwrap();
    tracing::subscriber::with_default(sink.subscriber("info", false), || {
      log_session_start("svcboot");
      for i in 0..1000 {
        tracing::info!("sequential write {i}");
      }
    });
    drop(sink);

    let raw = fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = raw.lines().collect();
    assert_eq!(lines.len(), 1001);
    assert!(lines[0].ends_with("=== Starting svcboot service ==="));
    for (i, line) in lines[1..].iter().enumerate() {
      assert!(line.ends_with(&format!("sequential write {i}")), "line {i}: {line}");
    }
  }

  #[test]
  fn existing_content_is_preserved() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("svcboot.log");
    fs::write(&path, "previous session\n").unwrap();

    let sink = LogSink::open(&path).unwrap();
    tracing::subscriber::with_default(sink.subscriber("info", false), || {
      tracing::info!("next session");
    });
    drop(sink);

    let raw = fs::read_to_string(&path).unwrap();
    assert!(raw.starts_with("previous session\n"));
    assert!(raw.trim_end().ends_with("next session"));
  }

  #[test]
  fn filter_suppresses_lower_levels() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("svcboot.log");

    let sink = LogSink::open(&path).unwrap();
    tracing::subscriber::with_default(sink.subscriber("warn", false), || {
      tracing::info!("hidden");
      tracing::warn!("visible");
    });
    drop(sink);

    let raw = fs::read_to_string(&path).unwrap();
    assert!(!raw.contains("hidden"));
    assert!(raw.contains("visible"));
  }

  #[test]
  fn stderr_echo_can_be_enabled_after_install() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("svcboot.log");

    let sink = LogSink::open(&path).unwrap();
    tracing::subscriber::with_default(sink.subscriber("info", false), || {
      assert!(!sink.echoes_stderr());
      tracing::info!("file only");
      sink.echo_to_stderr();
      assert!(sink.echoes_stderr());
      tracing::info!("file and stderr");
    });
    drop(sink);

    let raw = fs::read_to_string(&path).unwrap();
    assert!(raw.contains("file only"));
    assert!(raw.contains("file and stderr"));
  }

  #[test]
  fn missing_directory_is_a_log_open_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("no-such-dir").join("svcboot.log");

    match LogSink::open(&path) {
      Err(ServiceError::LogOpen { path: p, .. }) => assert_eq!(p, path),
      Err(e) => panic!("unexpected error: {e}"),
      Ok(_) => panic!("opening under a missing directory succeeded"),
    }
  }

  #[cfg(unix)]
  #[test]
  fn log_file_is_owner_read_write() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("svcboot.log");
    let sink = LogSink::open(&path).unwrap();
    assert_eq!(sink.path(), path.as_path());

    let mode = fs::metadata(&path).unwrap().permissions().mode();
    assert_eq!(mode & 0o600, 0o600);
  }
}
