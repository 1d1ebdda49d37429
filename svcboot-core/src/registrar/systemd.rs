use super::{ManagerConnection, ServiceDescriptor, ServiceManager};
use crate::error::{Result, ServiceError};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

pub const SYSTEM_UNIT_DIR: &str = "/etc/systemd/system";
pub const SYSTEMD_RUNTIME_DIR: &str = "/run/systemd/system";
/// Units shipped by distribution packages. They are never written, but a name
/// taken there counts as registered.
pub const VENDOR_UNIT_DIRS: [&str; 2] = ["/usr/lib/systemd/system", "/lib/systemd/system"];

/// Registers services as systemd unit files.
pub struct SystemdManager {
  unit_dir: PathBuf,
  runtime_dir: PathBuf,
  vendor_dirs: Vec<PathBuf>,
}

impl Default for SystemdManager {
  fn default() -> Self {
    Self::with_dirs(SYSTEM_UNIT_DIR, SYSTEMD_RUNTIME_DIR)
      .with_vendor_dirs(VENDOR_UNIT_DIRS.iter().map(PathBuf::from))
  }
}

impl SystemdManager {
  pub fn with_dirs(unit_dir: impl Into<PathBuf>, runtime_dir: impl Into<PathBuf>) -> Self {
    Self {
      unit_dir: unit_dir.into(),
      runtime_dir: runtime_dir.into(),
      vendor_dirs: Vec::new(),
    }
  }

  pub fn with_vendor_dirs(mut self, dirs: impl IntoIterator<Item = PathBuf>) -> Self {
    self.vendor_dirs = dirs.into_iter().collect();
    self
  }
}

pub struct SystemdConnection {
  unit_dir: PathBuf,
  vendor_dirs: Vec<PathBuf>,
}

impl ServiceManager for SystemdManager {
  type Connection = SystemdConnection;

  fn connect(&self) -> Result<SystemdConnection> {
    if !self.runtime_dir.is_dir() {
      return Err(ServiceError::Connection(format!(
        "systemd is not running ({} missing)",
        self.runtime_dir.display()
      )));
    }
    if !self.unit_dir.is_dir() {
      return Err(ServiceError::Connection(format!(
        "unit directory {} does not exist",
        self.unit_dir.display()
      )));
    }
    Ok(SystemdConnection {
      unit_dir: self.unit_dir.clone(),
      vendor_dirs: self.vendor_dirs.clone(),
    })
  }
}

impl SystemdConnection {
  fn unit_path(&self, name: &str) -> PathBuf {
    self.unit_dir.join(unit_name(name))
  }

  fn vendor_unit(&self, name: &str) -> Result<Option<PathBuf>> {
    for dir in &self.vendor_dirs {
      let path = dir.join(unit_name(name));
      if unit_exists(dir, &path)? {
        return Ok(Some(path));
      }
    }
    Ok(None)
  }
}

impl ManagerConnection for SystemdConnection {
  fn is_registered(&self, name: &str) -> Result<bool> {
    if unit_exists(&self.unit_dir, &self.unit_path(name))? {
      return Ok(true);
    }
    Ok(self.vendor_unit(name)?.is_some())
  }

  fn create(&self, descriptor: &ServiceDescriptor) -> Result<()> {
    let path = self.unit_path(&descriptor.name);
    fs::write(&path, render_unit(descriptor)).map_err(|e| access_error(&self.unit_dir, e))?;
    daemon_reload();
    Ok(())
  }

  fn delete(&self, name: &str) -> Result<()> {
    match fs::remove_file(self.unit_path(name)) {
      Ok(()) => {}
      Err(e) if e.kind() == io::ErrorKind::NotFound => {
        return Err(match self.vendor_unit(name)? {
          Some(path) => ServiceError::Host(format!(
            "{} is owned by a system package and cannot be removed",
            path.display()
          )),
          None => ServiceError::NotFound(name.to_string()),
        });
      }
      Err(e) => return Err(access_error(&self.unit_dir, e)),
    }
    daemon_reload();
    Ok(())
  }
}

// A missing vendor directory is the same as an empty one.
fn unit_exists(dir: &Path, unit: &Path) -> Result<bool> {
  match fs::symlink_metadata(unit) {
    Ok(_) => Ok(true),
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
    Err(e) => Err(access_error(dir, e)),
  }
}

pub fn unit_name(name: &str) -> String {
  format!("{}.service", name.replace(' ', "-"))
}

pub fn render_unit(descriptor: &ServiceDescriptor) -> String {
  format!(
    "[Unit]\n\
     Description={}\n\
     \n\
     [Service]\n\
     Type=simple\n\
     ExecStart={}\n\
     Restart=on-failure\n\
     \n\
     [Install]\n\
     WantedBy=multi-user.target\n",
    escape_specifiers(&descriptor.display_name),
    quote_exec_path(&descriptor.executable_path)
  )
}

// systemd expands `%` specifiers in every setting; `%%` is a literal percent.
fn escape_specifiers(value: &str) -> String {
  value.replace('%', "%%")
}

// ExecStart splits on whitespace unless the word is double-quoted, and
// unescapes C-style sequences inside the quotes.
fn quote_exec_path(path: &Path) -> String {
  let raw = path.display().to_string();
  let mut quoted = String::with_capacity(raw.len() + 2);
  quoted.push('"');
  for c in raw.chars() {
    match c {
      '\\' => quoted.push_str("\\\\"),
      '"' => quoted.push_str("\\\""),
      '%' => quoted.push_str("%%"),
      c => quoted.push(c),
    }
  }
  quoted.push('"');
  quoted
}

fn access_error(dir: &Path, e: io::Error) -> ServiceError {
  ServiceError::Connection(format!("{}: {e}", dir.display()))
}

// The unit file is the registration record; a failed reload only delays
// systemd noticing it.
fn daemon_reload() {
  match Command::new("systemctl").arg("daemon-reload").status() {
    Ok(status) if status.success() => {}
    Ok(status) => tracing::warn!(%status, "systemctl daemon-reload failed"),
    Err(e) => tracing::warn!(error = %e, "could not run systemctl daemon-reload"),
  }
}
