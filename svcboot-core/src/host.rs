//! Queries against the host environment.

use crate::error::Result;

#[cfg(unix)]
pub type PlatformManager = crate::registrar::systemd::SystemdManager;
#[cfg(windows)]
pub type PlatformManager = crate::registrar::windows::ScmManager;

pub fn service_manager() -> PlatformManager {
  PlatformManager::default()
}

/// Whether the service manager launched this process.
#[cfg(unix)]
pub fn running_as_service() -> Result<bool> {
  let invocation_id = std::env::var_os("INVOCATION_ID").is_some();
  Ok(launched_by_systemd(
    invocation_id,
    nix::unistd::getppid().as_raw(),
  ))
}

#[cfg(windows)]
pub fn running_as_service() -> Result<bool> {
  use crate::error::ServiceError;
  use windows::Win32::System::RemoteDesktop::ProcessIdToSessionId;
  use windows::Win32::System::Threading::GetCurrentProcessId;

  let pid = unsafe { GetCurrentProcessId() };
  let mut session = 0u32;
  unsafe { ProcessIdToSessionId(pid, &mut session) }
    .map_err(|e| ServiceError::Host(format!("ProcessIdToSessionId: {e}")))?;
  if session != 0 {
    return Ok(false);
  }

  let processes = process_table()?;
  Ok(launched_by_scm(session, parent_exe(&processes, pid)))
}

/// One row of the process table: pid, parent pid, executable file name.
#[cfg(any(windows, test))]
type ProcessEntry = (u32, u32, String);

#[cfg(windows)]
fn process_table() -> Result<Vec<ProcessEntry>> {
  use crate::error::ServiceError;
  use windows::Win32::Foundation::CloseHandle;
  use windows::Win32::System::Diagnostics::ToolHelp::{
    CreateToolhelp32Snapshot, Process32FirstW, Process32NextW, PROCESSENTRY32W,
    TH32CS_SNAPPROCESS,
  };

  let snapshot = unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0) }
    .map_err(|e| ServiceError::Host(format!("CreateToolhelp32Snapshot: {e}")))?;

  let mut entry = PROCESSENTRY32W {
    dwSize: std::mem::size_of::<PROCESSENTRY32W>() as u32,
    ..Default::default()
  };
  let mut table = Vec::new();
  let mut more = unsafe { Process32FirstW(snapshot, &mut entry) }.is_ok();
  while more {
    let len = entry
      .szExeFile
      .iter()
      .position(|&c| c == 0)
      .unwrap_or(entry.szExeFile.len());
    table.push((
      entry.th32ProcessID,
      entry.th32ParentProcessID,
      String::from_utf16_lossy(&entry.szExeFile[..len]),
    ));
    more = unsafe { Process32NextW(snapshot, &mut entry) }.is_ok();
  }

  if let Err(e) = unsafe { CloseHandle(snapshot) } {
    tracing::debug!(error = %e, "closing process snapshot failed");
  }
  Ok(table)
}

#[cfg(any(windows, test))]
fn parent_exe(processes: &[ProcessEntry], pid: u32) -> Option<&str> {
  let (_, parent, _) = processes.iter().find(|(p, _, _)| *p == pid)?;
  processes
    .iter()
    .find(|(p, _, _)| p == parent)
    .map(|(_, _, exe)| exe.as_str())
}

// Services run in session 0 as children of the service control manager.
// Session 0 alone also matches OpenSSH and `psexec -s` shells.
#[cfg(any(windows, test))]
fn launched_by_scm(session: u32, parent: Option<&str>) -> bool {
  session == 0 && parent.is_some_and(|exe| exe.eq_ignore_ascii_case("services.exe"))
}

// systemd exports INVOCATION_ID to every unit it starts; system units are
// children of PID 1.
#[cfg(unix)]
fn launched_by_systemd(invocation_id: bool, parent_pid: i32) -> bool {
  invocation_id && parent_pid == 1
}
