pub const LOG_FILTER_ENV: &str = "SVCBOOT_LOG";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootConfig {
  pub service_name: String,
  pub display_name: String,
  pub log_file_name: String,
  pub log_filter: String,
}

impl Default for BootConfig {
  fn default() -> Self {
    Self {
      service_name: default_service_name(),
      display_name: format!("{} service", default_service_name()),
      log_file_name: format!("{}.log", default_service_name()),
      log_filter: default_log_filter(),
    }
  }
}

fn default_service_name() -> String {
  "svcboot".to_string()
}

fn default_log_filter() -> String {
  "info".to_string()
}

impl BootConfig {
  /// Defaults, with the log filter taken from `SVCBOOT_LOG` when it is set.
  pub fn from_env() -> Self {
    Self::default().with_log_filter(std::env::var(LOG_FILTER_ENV).ok())
  }

  pub fn with_service_name(mut self, name: &str) -> Self {
    self.service_name = name.to_string();
    self.display_name = format!("{name} service");
    self.log_file_name = format!("{name}.log");
    self
  }

  fn with_log_filter(mut self, filter: Option<String>) -> Self {
    if let Some(f) = filter.map(|f| f.trim().to_string()).filter(|f| !f.is_empty()) {
      self.log_filter = f;
    }
    self
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_derive_from_service_name() {
    let cfg = BootConfig::default();
    assert_eq!(cfg.service_name, "svcboot");
    assert_eq!(cfg.log_file_name, "svcboot.log");
    assert_eq!(cfg.log_filter, "info");
  }

  #[test]
  fn renaming_updates_display_and_log_names() {
    let cfg = BootConfig::default().with_service_name("MyGoService");
    assert_eq!(cfg.display_name, "MyGoService service");
    assert_eq!(cfg.log_file_name, "MyGoService.log");
  }

  #[test]
  fn blank_filter_override_is_ignored() {
    let cfg = BootConfig::default().with_log_filter(Some("   ".into()));
    assert_eq!(cfg.log_filter, "info");

    let cfg = BootConfig::default().with_log_filter(Some("debug".into()));
    assert_eq!(cfg.log_filter, "debug");
  }
}
