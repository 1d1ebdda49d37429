use super::{ManagerConnection, ServiceDescriptor, ServiceManager};
use crate::error::{Result, ServiceError};
use std::ffi::OsString;
use windows_service::service::{
  ServiceAccess, ServiceErrorControl, ServiceInfo, ServiceStartType, ServiceType,
};
use windows_service::service_manager::{ServiceManager as Scm, ServiceManagerAccess};

const ERROR_ACCESS_DENIED: i32 = 5;
const ERROR_SERVICE_DOES_NOT_EXIST: i32 = 1060;
const ERROR_SERVICE_EXISTS: i32 = 1073;

/// The local Service Control Manager.
#[derive(Default)]
pub struct ScmManager;

pub struct ScmConnection {
  scm: Scm,
}

impl ServiceManager for ScmManager {
  type Connection = ScmConnection;

  fn connect(&self) -> Result<ScmConnection> {
    let access = ServiceManagerAccess::CONNECT | ServiceManagerAccess::CREATE_SERVICE;
    let scm = Scm::local_computer(None::<&str>, access)
      .map_err(|e| ServiceError::Connection(e.to_string()))?;
    Ok(ScmConnection { scm })
  }
}

impl ManagerConnection for ScmConnection {
  fn is_registered(&self, name: &str) -> Result<bool> {
    match self.scm.open_service(name, ServiceAccess::QUERY_STATUS) {
      Ok(_service) => Ok(true),
      Err(e) if os_error(&e) == Some(ERROR_SERVICE_DOES_NOT_EXIST) => Ok(false),
      Err(e) => Err(map_error(name, e)),
    }
  }

  fn create(&self, descriptor: &ServiceDescriptor) -> Result<()> {
    let info = ServiceInfo {
      name: OsString::from(&descriptor.name),
      display_name: OsString::from(&descriptor.display_name),
      service_type: ServiceType::OWN_PROCESS,
      start_type: ServiceStartType::AutoStart,
      error_control: ServiceErrorControl::Normal,
      executable_path: descriptor.executable_path.clone(),
      launch_arguments: vec![],
      dependencies: vec![],
      account_name: None, // LocalSystem
      account_password: None,
    };
    self
      .scm
      .create_service(&info, ServiceAccess::QUERY_STATUS)
      .map_err(|e| map_error(&descriptor.name, e))?;
    Ok(())
  }

  fn delete(&self, name: &str) -> Result<()> {
    let service = self
      .scm
      .open_service(name, ServiceAccess::DELETE)
      .map_err(|e| map_error(name, e))?;
    service.delete().map_err(|e| map_error(name, e))
  }
}

fn os_error(e: &windows_service::Error) -> Option<i32> {
  match e {
    windows_service::Error::Winapi(io) => io.raw_os_error(),
    _ => None,
  }
}

fn map_error(name: &str, e: windows_service::Error) -> ServiceError {
  match os_error(&e) {
    Some(ERROR_SERVICE_DOES_NOT_EXIST) => ServiceError::NotFound(name.to_string()),
    Some(ERROR_SERVICE_EXISTS) => ServiceError::AlreadyExists(name.to_string()),
    Some(ERROR_ACCESS_DENIED) => {
      ServiceError::Connection(format!("access denied (run as Administrator): {e}"))
    }
    _ => ServiceError::Host(e.to_string()),
  }
}
