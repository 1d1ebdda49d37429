use anyhow::Context;
use std::process::ExitCode;

fn main() -> anyhow::Result<ExitCode> {
  let args: Vec<String> = std::env::args().skip(1).collect();
  let cfg = svcboot_core::config::BootConfig::from_env();

  let code = svcboot_core::run(&args, cfg).context("svcboot")?;
  Ok(ExitCode::from(code))
}
