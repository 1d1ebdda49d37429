use crate::error::{Result, ServiceError};
use std::path::PathBuf;

/// The account this process runs as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
  pub username: String,
  pub display_name: Option<String>,
  /// Numeric uid on Unix; not available on Windows.
  pub uid: Option<String>,
  /// Numeric gid on Unix, logon domain on Windows.
  pub gid: Option<String>,
  pub home: Option<PathBuf>,
}

#[cfg(unix)]
pub fn current_user() -> Result<UserIdentity> {
  use nix::unistd::{Uid, User};

  let uid = Uid::current();
  let user = User::from_uid(uid)
    .map_err(|e| ServiceError::Identity(format!("passwd lookup for uid {uid}: {e}")))?
    .ok_or_else(|| ServiceError::Identity(format!("no passwd entry for uid {uid}")))?;

  Ok(UserIdentity {
    display_name: display_name_from_gecos(&user.gecos.to_string_lossy()),
    username: user.name,
    uid: Some(user.uid.to_string()),
    gid: Some(user.gid.to_string()),
    home: Some(user.dir),
  })
}

#[cfg(windows)]
pub fn current_user() -> Result<UserIdentity> {
  use windows::core::PWSTR;
  use windows::Win32::System::WindowsProgramming::GetUserNameW;

  // UNLEN + 1
  let mut buf = [0u16; 257];
  let mut len = buf.len() as u32;
  unsafe { GetUserNameW(PWSTR(buf.as_mut_ptr()), &mut len) }
    .map_err(|e| ServiceError::Identity(format!("GetUserNameW: {e}")))?;

  // `len` counts the terminating NUL.
  let end = (len as usize).saturating_sub(1).min(buf.len());
  Ok(UserIdentity {
    username: String::from_utf16_lossy(&buf[..end]),
    display_name: None,
    uid: None,
    gid: std::env::var("USERDOMAIN").ok(),
    home: std::env::var_os("USERPROFILE").map(PathBuf::from),
  })
}

/// The full name is the first comma-separated GECOS field.
#[cfg_attr(not(unix), allow(dead_code))]
fn display_name_from_gecos(gecos: &str) -> Option<String> {
  gecos
    .split(',')
    .next()
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .map(str::to_string)
}
