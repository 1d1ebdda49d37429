pub mod config;
pub mod console;
pub mod error;
pub mod host;
pub mod identity;
pub mod lifecycle;
pub mod logging;
pub mod mode;
pub mod paths;
pub mod registrar;
pub mod service;
pub mod workload;

#[cfg(not(any(unix, windows)))]
compile_error!("svcboot-core supports Unix (systemd) and Windows hosts only");

use anyhow::Context;
use config::BootConfig;
use mode::ExecutionMode;
use service::ServiceOutcome;
use std::io;

/// Dispatches one invocation and returns the process exit code. `args`
/// excludes the program name.
pub fn run(args: &[String], cfg: BootConfig) -> anyhow::Result<u8> {
  match mode::detect(args, host::running_as_service()) {
    ExecutionMode::Admin(cmd) => Ok(console::run_admin(
      cmd,
      &cfg,
      &host::service_manager(),
      paths::current_exe(),
      &mut io::stdout(),
      &mut io::stderr(),
    )),
    ExecutionMode::Service => {
      let sink = logging::init(&cfg, false);

      match service::run(&cfg, workload::default_workload()).context("service lifecycle")? {
        ServiceOutcome::Finished(summary) => {
          tracing::info!(workload = ?summary.workload, "service terminated");
        }
        ServiceOutcome::NotUnderServiceManager(workload) => {
          if let Some(sink) = &sink {
            sink.echo_to_stderr();
          }
          tracing::info!("not connected to a service controller; falling back to console mode");
          console::run_console(&cfg, workload)?;
        }
      }
      Ok(console::EXIT_OK)
    }
    ExecutionMode::Console => {
      let _sink = logging::init(&cfg, true);
      console::run_console(&cfg, workload::default_workload())?;
      Ok(console::EXIT_OK)
    }
  }
}
