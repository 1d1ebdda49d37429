use crate::identity::{self, UserIdentity};

/// A unit of work launched once per process.
pub type Workload = Box<dyn FnOnce() -> anyhow::Result<()> + Send + 'static>;

pub fn default_workload() -> Workload {
  Box::new(report_identity)
}

/// Logs who the process is running as. Lookup failures are warnings only.
pub fn report_identity() -> anyhow::Result<()> {
  match identity::current_user() {
    Ok(user) => log_identity(&user),
    Err(e) => tracing::warn!(error = %e, "could not resolve current user"),
  }
  Ok(())
}

fn log_identity(user: &UserIdentity) {
  tracing::info!(
    username = %user.username,
    name = user.display_name.as_deref().unwrap_or("-"),
    uid = user.uid.as_deref().unwrap_or("-"),
    gid = user.gid.as_deref().unwrap_or("-"),
    "current user"
  );

  match &user.home {
    Some(home) => tracing::info!(home = %home.display(), "user home directory"),
    None => tracing::warn!("user home directory unknown"),
  }
}
