//! Host adapters feeding the lifecycle controller.
//!
//! On Windows the Service Control Manager delivers controls through the
//! dispatcher; on Unix termination signals stand in for stop requests and
//! state is reported to systemd over `NOTIFY_SOCKET`.

use crate::config::BootConfig;
use crate::error::Result;
use crate::lifecycle::LifecycleSummary;
use crate::workload::Workload;

pub enum ServiceOutcome {
  Finished(LifecycleSummary),
  /// The host refused to treat this process as a service; the workload is
  /// handed back so the caller can run it in console mode.
  NotUnderServiceManager(Workload),
}

pub fn run(cfg: &BootConfig, workload: Workload) -> Result<ServiceOutcome> {
  #[cfg(windows)]
  {
    scm::run(cfg, workload)
  }
  #[cfg(unix)]
  {
    unix::run(cfg, workload)
  }
}

#[cfg(unix)]
pub use unix::SystemdNotifier;

#[cfg(unix)]
mod unix {
  use super::ServiceOutcome;
  use crate::config::BootConfig;
  use crate::error::{Result, ServiceError};
  use crate::lifecycle::{
    ControlSignal, Controller, ControllerEvent, LifecycleState, StatusReport, StatusReporter,
  };
  use crate::workload::Workload;
  use std::ffi::OsString;
  use std::io;
  use std::os::unix::ffi::OsStrExt;
  use std::os::unix::net::UnixDatagram;
  use std::path::Path;
  use std::sync::mpsc;

  pub(super) fn run(cfg: &BootConfig, workload: Workload) -> Result<ServiceOutcome> {
    let (tx, rx) = mpsc::channel();

    let signal_tx = tx.clone();
    ctrlc::set_handler(move || {
      let _ = signal_tx.send(ControllerEvent::Control(ControlSignal::Stop));
    })
    .map_err(|e| ServiceError::Host(format!("install signal handler: {e}")))?;

    tracing::info!(service = %cfg.service_name, "running under systemd");
    let summary = Controller::new(SystemdNotifier::from_env()).run(tx, rx, workload)?;
    Ok(ServiceOutcome::Finished(summary))
  }

  /// Reports lifecycle states with the sd_notify datagram protocol.
  pub struct SystemdNotifier {
    socket: Option<OsString>,
  }

  impl SystemdNotifier {
    pub fn from_env() -> Self {
      Self::with_socket(std::env::var_os("NOTIFY_SOCKET"))
    }

    pub fn with_socket(socket: Option<OsString>) -> Self {
      Self {
        socket: socket.filter(|s| !s.is_empty()),
      }
    }

    fn send(&self, socket: &OsString, msg: &str) -> io::Result<()> {
      let sock = UnixDatagram::unbound()?;
      let bytes = socket.as_bytes();

      if let Some(name) = bytes.strip_prefix(b"@") {
        #[cfg(target_os = "linux")]
        {
          use std::os::linux::net::SocketAddrExt;
          use std::os::unix::net::SocketAddr;

          let addr = SocketAddr::from_abstract_name(name)?;
          sock.send_to_addr(msg.as_bytes(), &addr)?;
          return Ok(());
        }
        #[cfg(not(target_os = "linux"))]
        {
          let _ = name;
          return Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "abstract notify sockets require Linux",
          ));
        }
      }

      sock.send_to(msg.as_bytes(), Path::new(socket))?;
      Ok(())
    }
  }

  pub(crate) fn notify_message(status: &StatusReport) -> Option<&'static str> {
    match status.state {
      LifecycleState::StartPending => Some("STATUS=starting"),
      LifecycleState::Running => Some("READY=1\nSTATUS=running"),
      LifecycleState::StopPending => Some("STOPPING=1\nSTATUS=stopping"),
      // systemd observes process exit.
      LifecycleState::Stopped => None,
    }
  }

  impl StatusReporter for SystemdNotifier {
    fn report(&self, status: StatusReport) -> Result<()> {
      let (Some(socket), Some(msg)) = (&self.socket, notify_message(&status)) else {
        return Ok(());
      };
      self
        .send(socket, msg)
        .map_err(|e| ServiceError::StatusReport(format!("sd_notify: {e}")))
    }
  }

  #[cfg(test)]
  mod tests {
    use super::*;

    #[test]
    fn running_announces_readiness() {
      let msg = notify_message(&StatusReport::new(LifecycleState::Running)).unwrap();
      assert!(msg.lines().any(|l| l == "READY=1"));
      assert!(notify_message(&StatusReport::new(LifecycleState::Stopped)).is_none());
    }

    #[test]
    fn notifier_without_socket_is_silent() {
      let n = SystemdNotifier::with_socket(None);
      n.report(StatusReport::new(LifecycleState::Running)).unwrap();
    }

    #[test]
    fn notifier_writes_datagrams_to_socket() {
      let dir = tempfile::tempdir().unwrap();
      let path = dir.path().join("notify.sock");
      let listener = UnixDatagram::bind(&path).unwrap();

      let n = SystemdNotifier::with_socket(Some(path.clone().into_os_string()));
      n.report(StatusReport::new(LifecycleState::Running)).unwrap();
      n.report(StatusReport::new(LifecycleState::StopPending)).unwrap();

      let mut buf = [0u8; 256];
      let len = listener.recv(&mut buf).unwrap();
      assert_eq!(&buf[..len], b"READY=1\nSTATUS=running");
      let len = listener.recv(&mut buf).unwrap();
      assert_eq!(&buf[..len], b"STOPPING=1\nSTATUS=stopping");
    }

    #[test]
    fn unreachable_socket_is_a_report_failure() {
      let dir = tempfile::tempdir().unwrap();
      let n = SystemdNotifier::with_socket(Some(dir.path().join("gone.sock").into_os_string()));
      assert!(matches!(
        n.report(StatusReport::new(LifecycleState::Running)),
        Err(ServiceError::StatusReport(_))
      ));
    }
  }
}

#[cfg(windows)]
mod scm {
  use super::ServiceOutcome;
  use crate::config::BootConfig;
  use crate::error::{Result, ServiceError};
  use crate::lifecycle::{
    ControlSignal, Controller, ControllerEvent, LifecycleState, LifecycleSummary, StatusReport,
    StatusReporter,
  };
  use crate::workload::Workload;
  use std::ffi::OsString;
  use std::sync::{mpsc, Mutex};
  use std::time::Duration;
  use windows_service::define_windows_service;
  use windows_service::service::{
    ServiceControl, ServiceControlAccept, ServiceExitCode, ServiceState, ServiceStatus,
    ServiceType,
  };
  use windows_service::service_control_handler::{
    self, ServiceControlHandlerResult, ServiceStatusHandle,
  };
  use windows_service::service_dispatcher;

  const ERROR_FAILED_SERVICE_CONTROLLER_CONNECT: i32 = 1063;
  const START_PENDING_WAIT: Duration = Duration::from_secs(10);
  const STOP_PENDING_WAIT: Duration = Duration::from_secs(30);

  // The dispatcher calls `service_main` through a plain function pointer, so the
  // launch context and the result travel through statics.
  static LAUNCH: Mutex<Option<(BootConfig, Workload)>> = Mutex::new(None);
  static OUTCOME: Mutex<Option<Result<LifecycleSummary>>> = Mutex::new(None);

  define_windows_service!(ffi_service_main, service_main);

  pub(super) fn run(cfg: &BootConfig, workload: Workload) -> Result<ServiceOutcome> {
    put_launch(Some((cfg.clone(), workload)))?;

    match service_dispatcher::start(&cfg.service_name, ffi_service_main) {
      Ok(()) => {
        let outcome = OUTCOME
          .lock()
          .map_err(|_| ServiceError::Host("outcome lock poisoned".into()))?
          .take();
        match outcome {
          Some(res) => res.map(ServiceOutcome::Finished),
          None => Err(ServiceError::Host("service main never ran".into())),
        }
      }
      Err(windows_service::Error::Winapi(e))
        if e.raw_os_error() == Some(ERROR_FAILED_SERVICE_CONTROLLER_CONNECT) =>
      {
        match take_launch()? {
          Some((_, workload)) => Ok(ServiceOutcome::NotUnderServiceManager(workload)),
          None => Err(ServiceError::Host("launch context lost".into())),
        }
      }
      Err(e) => Err(ServiceError::Host(format!("service dispatcher: {e}"))),
    }
  }

  fn put_launch(launch: Option<(BootConfig, Workload)>) -> Result<()> {
    *LAUNCH
      .lock()
      .map_err(|_| ServiceError::Host("launch lock poisoned".into()))? = launch;
    Ok(())
  }

  fn take_launch() -> Result<Option<(BootConfig, Workload)>> {
    Ok(
      LAUNCH
        .lock()
        .map_err(|_| ServiceError::Host("launch lock poisoned".into()))?
        .take(),
    )
  }

  fn service_main(_arguments: Vec<OsString>) {
    let res = match take_launch() {
      Ok(Some((cfg, workload))) => run_controller(&cfg, workload),
      Ok(None) => Err(ServiceError::Host("service started without launch context".into())),
      Err(e) => Err(e),
    };
    if let Err(e) = &res {
      tracing::error!(error = %e, "service lifecycle failed");
    }
    if let Ok(mut slot) = OUTCOME.lock() {
      *slot = Some(res);
    }
  }

  fn run_controller(cfg: &BootConfig, workload: Workload) -> Result<LifecycleSummary> {
    let (tx, rx) = mpsc::channel();

    let control_tx = tx.clone();
    let handler = move |control_event| -> ServiceControlHandlerResult {
      let (signal, answer) = match control_event {
        ServiceControl::Interrogate => {
          (ControlSignal::Interrogate, ServiceControlHandlerResult::NoError)
        }
        ServiceControl::Stop => (ControlSignal::Stop, ServiceControlHandlerResult::NoError),
        ServiceControl::Shutdown => {
          (ControlSignal::Shutdown, ServiceControlHandlerResult::NoError)
        }
        _ => (ControlSignal::Other, ServiceControlHandlerResult::NotImplemented),
      };
      let _ = control_tx.send(ControllerEvent::Control(signal));
      answer
    };

    let handle = service_control_handler::register(&cfg.service_name, handler)
      .map_err(|e| ServiceError::Host(format!("register control handler: {e}")))?;

    Controller::new(ScmReporter { handle }).run(tx, rx, workload)
  }

  struct ScmReporter {
    handle: ServiceStatusHandle,
  }

  impl StatusReporter for ScmReporter {
    fn report(&self, status: StatusReport) -> Result<()> {
      self
        .handle
        .set_service_status(service_status(status))
        .map_err(|e| ServiceError::StatusReport(e.to_string()))
    }
  }

  fn service_status(status: StatusReport) -> ServiceStatus {
    let (current_state, checkpoint, wait_hint) = match status.state {
      LifecycleState::StartPending => (ServiceState::StartPending, 1, START_PENDING_WAIT),
      LifecycleState::Running => (ServiceState::Running, 0, Duration::default()),
      LifecycleState::StopPending => (ServiceState::StopPending, 1, STOP_PENDING_WAIT),
      LifecycleState::Stopped => (ServiceState::Stopped, 0, Duration::default()),
    };

    ServiceStatus {
      service_type: ServiceType::OWN_PROCESS,
      current_state,
      controls_accepted: if status.accepts_stop {
        ServiceControlAccept::STOP | ServiceControlAccept::SHUTDOWN
      } else {
        ServiceControlAccept::empty()
      },
      exit_code: ServiceExitCode::Win32(status.exit_code),
      checkpoint,
      wait_hint,
      process_id: None,
    }
  }
}
