//! Best-effort write protection for the protected file.
//!
//! This is a deterrent against accidental edits. The signature record is the
//! actual integrity boundary, so callers treat every error from here as a
//! warning.

use crate::error::{GuardError, Result};
use serde::Serialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessState {
    Writable,
    ReadOnly,
}

pub trait AccessGuard {
    fn set_readonly(&self, path: &Path) -> Result<()>;
    fn set_writable(&self, path: &Path) -> Result<()>;
    fn state(&self, path: &Path) -> Result<AccessState>;
}

fn permission_error(path: &Path, err: std::io::Error) -> GuardError {
    GuardError::PermissionChangeFailed {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}

/// Unix permission bits. Locking clears every write bit, unlocking restores
/// the owner write bit; read and execute bits are left as they were.
#[cfg(unix)]
#[derive(Debug, Default, Clone, Copy)]
pub struct ModeBitsGuard;

#[cfg(unix)]
impl ModeBitsGuard {
    pub const WRITE_BITS: u32 = 0o222;
    pub const OWNER_WRITE: u32 = 0o200;

    fn update_mode<F: FnOnce(u32) -> u32>(path: &Path, change: F) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(path)
            .map_err(|e| permission_error(path, e))?
            .permissions()
            .mode();
        fs::set_permissions(path, fs::Permissions::from_mode(change(mode) & 0o7777))
            .map_err(|e| permission_error(path, e))
    }
}

#[cfg(unix)]
impl AccessGuard for ModeBitsGuard {
    fn set_readonly(&self, path: &Path) -> Result<()> {
        Self::update_mode(path, |mode| mode & !Self::WRITE_BITS)
    }

    fn set_writable(&self, path: &Path) -> Result<()> {
        Self::update_mode(path, |mode| mode | Self::OWNER_WRITE)
    }

    fn state(&self, path: &Path) -> Result<AccessState> {
        use std::os::unix::fs::PermissionsExt;
        let meta = fs::metadata(path).map_err(|e| GuardError::io(path, e))?;
        if meta.permissions().mode() & 0o222 == 0 {
            Ok(AccessState::ReadOnly)
        } else {
            Ok(AccessState::Writable)
        }
    }
}

/// Platform read-only attribute through `std::fs::Permissions`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReadonlyFlagGuard;

impl ReadonlyFlagGuard {
    fn toggle(path: &Path, readonly: bool) -> Result<()> {
        let mut perms = fs::metadata(path)
            .map_err(|e| permission_error(path, e))?
            .permissions();
        perms.set_readonly(readonly);
        fs::set_permissions(path, perms).map_err(|e| permission_error(path, e))
    }
}

impl AccessGuard for ReadonlyFlagGuard {
    fn set_readonly(&self, path: &Path) -> Result<()> {
        Self::toggle(path, true)
    }

    fn set_writable(&self, path: &Path) -> Result<()> {
        Self::toggle(path, false)
    }

    fn state(&self, path: &Path) -> Result<AccessState> {
        let meta = fs::metadata(path).map_err(|e| GuardError::io(path, e))?;
        if meta.permissions().readonly() {
            Ok(AccessState::ReadOnly)
        } else {
            Ok(AccessState::Writable)
        }
    }
}

pub fn platform_guard() -> Box<dyn AccessGuard> {
    #[cfg(unix)]
    {
        Box::new(ModeBitsGuard)
    }
    #[cfg(not(unix))]
    {
        Box::new(ReadonlyFlagGuard)
    }
}
