use crate::config::BootConfig;
use crate::error::Result;
use crate::mode::AdminCommand;
use crate::registrar::{self, ServiceDescriptor, ServiceManager};
use crate::workload::Workload;
use anyhow::Context;
use std::io::Write;
use std::path::PathBuf;

pub const EXIT_OK: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;

/// Runs `install`/`uninstall`, prints the result for the operator and returns
/// the process exit code.
pub fn run_admin<M: ServiceManager>(
  cmd: AdminCommand,
  cfg: &BootConfig,
  manager: &M,
  exe: Result<PathBuf>,
  out: &mut impl Write,
  err: &mut impl Write,
) -> u8 {
  let name = &cfg.service_name;
  let res = match cmd {
    AdminCommand::Install => exe.and_then(|executable_path| {
      let descriptor = ServiceDescriptor {
        name: name.clone(),
        display_name: cfg.display_name.clone(),
        executable_path,
      };
      registrar::install(manager, &descriptor)
    }),
    AdminCommand::Uninstall => registrar::uninstall(manager, name),
  };

  let verb = match cmd {
    AdminCommand::Install => "install",
    AdminCommand::Uninstall => "uninstall",
  };

  match res {
    Ok(()) => {
      let _ = writeln!(out, "Service {name} {verb}ed successfully.");
      EXIT_OK
    }
    Err(e) => {
      let _ = writeln!(err, "Failed to {verb} service {name}: {e}");
      EXIT_FAILURE
    }
  }
}

pub fn run_console(cfg: &BootConfig, workload: Workload) -> anyhow::Result<()> {
  tracing::info!(service = %cfg.service_name, "running in console mode");
  workload().context("console workload")?;
  tracing::info!("console run finished");
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::ServiceError;
  use crate::registrar::memory::MemoryManager;

  fn cfg() -> BootConfig {
    BootConfig::default().with_service_name("MyGoService")
  }

  fn exe() -> Result<PathBuf> {
    Ok(PathBuf::from("/opt/svcboot/svcboot-core"))
  }

  fn admin(cmd: AdminCommand, mgr: &MemoryManager, exe: Result<PathBuf>) -> (u8, String, String) {
    let mut out = Vec::new();
    let mut err = Vec::new();
    let code = run_admin(cmd, &cfg(), mgr, exe, &mut out, &mut err);
    (
      code,
      String::from_utf8(out).unwrap(),
      String::from_utf8(err).unwrap(),
    )
  }

  #[test]
  fn uninstall_of_unknown_service_exits_one() {
    let mgr = MemoryManager::default();
    let (code, out, err) = admin(AdminCommand::Uninstall, &mgr, exe());
    assert_eq!(code, EXIT_FAILURE);
    assert!(out.is_empty());
    assert!(err.contains("Failed to uninstall service MyGoService"));
    assert!(err.contains("not installed"));
  }

  #[test]
  fn install_twice_reports_already_exists() {
    let mgr = MemoryManager::default();

    let (code, out, _) = admin(AdminCommand::Install, &mgr, exe());
    assert_eq!(code, EXIT_OK);
    assert!(out.contains("Service MyGoService installed successfully."));

    let (code, _, err) = admin(AdminCommand::Install, &mgr, exe());
    assert_eq!(code, EXIT_FAILURE);
    assert!(err.contains("already exists"));
  }

  #[test]
  fn install_then_uninstall_round_trip() {
    let mgr = MemoryManager::default();
    assert_eq!(admin(AdminCommand::Install, &mgr, exe()).0, EXIT_OK);

    let (code, out, _) = admin(AdminCommand::Uninstall, &mgr, exe());
    assert_eq!(code, EXIT_OK);
    assert!(out.contains("uninstalled successfully"));
    assert!(mgr.registration("MyGoService").is_none());
  }

  #[test]
  fn unknown_executable_path_fails_install() {
    let mgr = MemoryManager::default();
    let no_exe = Err(ServiceError::PathResolution(std::io::Error::other("gone")));
    let (code, _, err) = admin(AdminCommand::Install, &mgr, no_exe);
    assert_eq!(code, EXIT_FAILURE);
    assert!(err.contains("cannot determine executable path"));
    assert!(mgr.registration("MyGoService").is_none());
  }

  #[test]
  fn connection_failure_exits_one() {
    let mgr = MemoryManager::unreachable();
    let (code, _, err) = admin(AdminCommand::Install, &mgr, exe());
    assert_eq!(code, EXIT_FAILURE);
    assert!(err.contains("cannot connect to service manager"));
  }

  #[test]
  fn console_run_propagates_workload_error() {
    let failing: Workload = Box::new(|| -> anyhow::Result<()> { anyhow::bail!("no identity") });
    let err = run_console(&cfg(), failing).unwrap_err();
    assert!(format!("{err:#}").contains("no identity"));
    assert!(run_console(&cfg(), Box::new(|| Ok(()))).is_ok());
  }
}
