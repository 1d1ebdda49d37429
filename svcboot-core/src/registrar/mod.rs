//! Registration of this executable with the host service manager.
//!
//! Neither operation is idempotent: installing an existing service or removing
//! a missing one is reported as an error, never silently accepted.

use crate::error::{Result, ServiceError};
use std::path::PathBuf;

#[cfg(test)]
pub(crate) mod memory;
#[cfg(unix)]
pub mod systemd;
#[cfg(windows)]
pub mod windows;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
  pub name: String,
  pub display_name: String,
  pub executable_path: PathBuf,
}

/// Entry point to the host service manager.
pub trait ServiceManager {
  type Connection: ManagerConnection;

  /// Privilege failures surface here as `ServiceError::Connection`.
  fn connect(&self) -> Result<Self::Connection>;
}

/// An open session with the service manager; dropping it disconnects.
pub trait ManagerConnection {
  fn is_registered(&self, name: &str) -> Result<bool>;
  fn create(&self, descriptor: &ServiceDescriptor) -> Result<()>;
  fn delete(&self, name: &str) -> Result<()>;
}

pub fn install<M: ServiceManager>(manager: &M, descriptor: &ServiceDescriptor) -> Result<()> {
  let conn = manager.connect()?;
  if conn.is_registered(&descriptor.name)? {
    return Err(ServiceError::AlreadyExists(descriptor.name.clone()));
  }

  conn.create(descriptor)?;
  tracing::info!(
    service = %descriptor.name,
    path = %descriptor.executable_path.display(),
    "service registered"
  );
  Ok(())
}

pub fn uninstall<M: ServiceManager>(manager: &M, name: &str) -> Result<()> {
  let conn = manager.connect()?;
  if !conn.is_registered(name)? {
    return Err(ServiceError::NotFound(name.to_string()));
  }

  conn.delete(name)?;
  tracing::info!(service = %name, "service deregistered");
  Ok(())
}
