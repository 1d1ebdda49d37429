//! Service lifecycle state machine.
//!
//! `transition` is a pure function of (state, signal). `Controller` drives it
//! from a single event channel fed by the host adapter (control signals) and by
//! the workload thread (its outcome), and pushes every state change to a
//! `StatusReporter`.

use crate::error::{Result, ServiceError};
use crate::workload::Workload;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{Receiver, Sender};
use std::thread;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
  StartPending,
  Running,
  StopPending,
  Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
  Interrogate,
  Stop,
  Shutdown,
  Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusReport {
  pub state: LifecycleState,
  /// Stop and shutdown requests are accepted.
  pub accepts_stop: bool,
  pub exit_code: u32,
}

impl StatusReport {
  pub fn new(state: LifecycleState) -> Self {
    Self {
      state,
      accepts_stop: state == LifecycleState::Running,
      exit_code: 0,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
  pub next: LifecycleState,
  pub report: Option<StatusReport>,
  pub exit_loop: bool,
}

pub fn transition(state: LifecycleState, signal: ControlSignal) -> Transition {
  use ControlSignal::*;
  use LifecycleState::*;

  match (state, signal) {
    (_, Interrogate) => Transition {
      next: state,
      report: Some(StatusReport::new(state)),
      exit_loop: false,
    },
    (StartPending | Running, Stop | Shutdown) => Transition {
      next: StopPending,
      report: Some(StatusReport::new(StopPending)),
      exit_loop: true,
    },
    (StopPending | Stopped, Stop | Shutdown) => Transition {
      next: state,
      report: None,
      exit_loop: true,
    },
    (_, Other) => Transition {
      next: state,
      report: None,
      exit_loop: false,
    },
  }
}

/// Delivers state changes to the host service manager.
pub trait StatusReporter {
  fn report(&self, status: StatusReport) -> Result<()>;
}

#[derive(Debug)]
pub enum ControllerEvent {
  Control(ControlSignal),
  WorkloadFinished(std::result::Result<(), String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkloadStatus {
  Running,
  Completed,
  Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleSummary {
  pub final_state: LifecycleState,
  pub workload: WorkloadStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
  Continue,
  Exit,
}

pub struct Controller<R> {
  reporter: R,
  state: LifecycleState,
  workload: WorkloadStatus,
}

impl<R: StatusReporter> Controller<R> {
  pub fn new(reporter: R) -> Self {
    Self {
      reporter,
      state: LifecycleState::StartPending,
      workload: WorkloadStatus::Running,
    }
  }

  pub fn state(&self) -> LifecycleState {
    self.state
  }

  /// Runs the whole lifecycle: start, control loop, final report.
  ///
  /// `events` is moved into the workload thread; the loop treats a closed
  /// channel like a stop request.
  pub fn run(
    mut self,
    events: Sender<ControllerEvent>,
    inbox: Receiver<ControllerEvent>,
    workload: Workload,
  ) -> Result<LifecycleSummary> {
    self.start(events, workload)?;

    loop {
      let event = match inbox.recv() {
        Ok(ev) => ev,
        Err(_) => {
          tracing::warn!("control channel closed; stopping");
          ControllerEvent::Control(ControlSignal::Stop)
        }
      };
      if self.handle(event)? == Flow::Exit {
        break;
      }
    }

    self.finish()
  }

  /// Reports StartPending, launches the workload, then reports Running.
  pub fn start(&mut self, events: Sender<ControllerEvent>, workload: Workload) -> Result<()> {
    self.set_state(LifecycleState::StartPending)?;

    let spawned = thread::Builder::new()
      .name("workload".into())
      .spawn(move || {
        let outcome = match panic::catch_unwind(AssertUnwindSafe(workload)) {
          Ok(res) => res.map_err(|e| format!("{e:#}")),
          Err(_) => Err("workload panicked".to_string()),
        };
        let _ = events.send(ControllerEvent::WorkloadFinished(outcome));
      });

    if let Err(e) = spawned {
      tracing::error!(error = %e, "failed to launch workload");
      self.workload = WorkloadStatus::Failed(e.to_string());
      let _ = self.finish_report();
      return Err(ServiceError::Host(format!("spawn workload: {e}")));
    }

    self.set_state(LifecycleState::Running)
  }

  pub fn handle(&mut self, event: ControllerEvent) -> Result<Flow> {
    match event {
      ControllerEvent::Control(signal) => {
        tracing::debug!(?signal, state = ?self.state, "control signal received");
        let t = transition(self.state, signal);
        self.state = t.next;
        if let Some(status) = t.report {
          self.reporter.report(status)?;
        }
        Ok(if t.exit_loop { Flow::Exit } else { Flow::Continue })
      }
      ControllerEvent::WorkloadFinished(Ok(())) => {
        tracing::info!("workload completed");
        self.workload = WorkloadStatus::Completed;
        Ok(Flow::Continue)
      }
      ControllerEvent::WorkloadFinished(Err(e)) => {
        tracing::error!(error = %e, "workload failed");
        self.workload = WorkloadStatus::Failed(e);
        Ok(Flow::Continue)
      }
    }
  }

  /// Reports Stopped, carrying exit code 1 if the workload failed.
  pub fn finish(mut self) -> Result<LifecycleSummary> {
    if self.workload == WorkloadStatus::Running {
      tracing::warn!("workload still running at stop; it is not interrupted");
    }
    self.finish_report()?;
    Ok(LifecycleSummary {
      final_state: self.state,
      workload: self.workload,
    })
  }

  fn finish_report(&mut self) -> Result<()> {
    let mut status = StatusReport::new(LifecycleState::Stopped);
    if matches!(self.workload, WorkloadStatus::Failed(_)) {
      status.exit_code = 1;
    }
    self.state = LifecycleState::Stopped;
    self.reporter.report(status)
  }

  fn set_state(&mut self, state: LifecycleState) -> Result<()> {
    self.state = state;
    tracing::info!(?state, "service state");
    self.reporter.report(StatusReport::new(state))
  }
}
