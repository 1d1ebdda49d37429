#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminCommand {
  Install,
  Uninstall,
}

impl AdminCommand {
  pub fn parse(arg: &str) -> Option<Self> {
    match arg {
      "install" | "--install" => Some(Self::Install),
      "uninstall" | "--uninstall" => Some(Self::Uninstall),
      _ => None,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
  Admin(AdminCommand),
  Service,
  Console,
}

/// Classifies an invocation. `args` excludes the program name; `under_service_manager`
/// is the host's answer to "was this process launched by the service manager".
///
/// An administrative keyword always wins. A failed host query counts as console
/// mode so interactive output is never swallowed.
pub fn detect<E>(args: &[String], under_service_manager: Result<bool, E>) -> ExecutionMode {
  if let Some(cmd) = args.first().and_then(|a| AdminCommand::parse(a)) {
    return ExecutionMode::Admin(cmd);
  }

  match under_service_manager {
    Ok(true) => ExecutionMode::Service,
    Ok(false) | Err(_) => ExecutionMode::Console,
  }
}
