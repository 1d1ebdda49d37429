use super::{ManagerConnection, ServiceDescriptor, ServiceManager};
use crate::error::{Result, ServiceError};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Stand-in service manager keeping registrations in memory.
#[derive(Default)]
pub(crate) struct MemoryManager {
  services: Arc<Mutex<BTreeMap<String, ServiceDescriptor>>>,
  open: Arc<AtomicUsize>,
  unreachable: bool,
}

impl MemoryManager {
  pub(crate) fn unreachable() -> Self {
    Self {
      unreachable: true,
      ..Self::default()
    }
  }

  pub(crate) fn registration(&self, name: &str) -> Option<ServiceDescriptor> {
    self.services.lock().unwrap().get(name).cloned()
  }

  pub(crate) fn open_connections(&self) -> usize {
    self.open.load(Ordering::SeqCst)
  }
}

pub(crate) struct MemoryConnection {
  services: Arc<Mutex<BTreeMap<String, ServiceDescriptor>>>,
  open: Arc<AtomicUsize>,
}

impl ServiceManager for MemoryManager {
  type Connection = MemoryConnection;

  fn connect(&self) -> Result<MemoryConnection> {
    if self.unreachable {
      return Err(ServiceError::Connection("access denied".into()));
    }
    self.open.fetch_add(1, Ordering::SeqCst);
    Ok(MemoryConnection {
      services: Arc::clone(&self.services),
      open: Arc::clone(&self.open),
    })
  }
}

impl ManagerConnection for MemoryConnection {
  fn is_registered(&self, name: &str) -> Result<bool> {
    Ok(self.services.lock().unwrap().contains_key(name))
  }

  fn create(&self, descriptor: &ServiceDescriptor) -> Result<()> {
    self
      .services
      .lock()
      .unwrap()
      .insert(descriptor.name.clone(), descriptor.clone());
    Ok(())
  }

  fn delete(&self, name: &str) -> Result<()> {
    match self.services.lock().unwrap().remove(name) {
      Some(_) => Ok(()),
      None => Err(ServiceError::NotFound(name.to_string())),
    }
  }
}

impl Drop for MemoryConnection {
  fn drop(&mut self) {
    self.open.fetch_sub(1, Ordering::SeqCst);
  }
}
