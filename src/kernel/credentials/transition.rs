//! Drop set-uid/set-gid privileges back to the invoking user.
//!
//! CRITICAL: setresgid MUST be called BEFORE setresuid; once the UID is
//! dropped the process can no longer change its GID.

use super::validation::verify_cannot_regain;
use crate::config::types::{LockError, Result};

/// Real and effective IDs of the current process.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProcessIds {
    pub uid: u32,
    pub euid: u32,
    pub gid: u32,
    pub egid: u32,
}

impl ProcessIds {
    pub fn current() -> Self {
        // SAFETY: the get*id family cannot fail.
        unsafe {
            Self {
                uid: libc::getuid(),
                euid: libc::geteuid(),
                gid: libc::getgid(),
                egid: libc::getegid(),
            }
        }
    }

    pub fn is_elevated(&self) -> bool {
        self.uid != self.euid || self.gid != self.egid
    }
}

/// 4-step drop: inspect -> setresgid -> setresuid -> verify.
///
/// A process that was not installed set-uid/set-gid is left untouched.
pub fn drop_elevated_privileges() -> Result<()> {
    let ids = ProcessIds::current();
    if !ids.is_elevated() {
        log::debug!("Running without elevated privileges (uid={}, gid={})", ids.uid, ids.gid);
        return Ok(());
    }

    // CRITICAL: GID before UID
    set_gid(ids.gid)?;
    set_uid(ids.uid)?;
    verify_cannot_regain(&ids)?;

    log::info!("Dropped privileges to UID={}, GID={}", ids.uid, ids.gid);
    Ok(())
}

/// MUST be called BEFORE set_uid.
fn set_gid(gid: u32) -> Result<()> {
    // SAFETY: setresgid atomically sets real, effective and saved GIDs.
    let result =
        unsafe { libc::setresgid(gid as libc::gid_t, gid as libc::gid_t, gid as libc::gid_t) };
    if result != 0 {
        let err = std::io::Error::last_os_error();
        return Err(LockError::Privilege(format!(
            "Failed to setresgid({}): {}",
            gid, err
        )));
    }
    Ok(())
}

/// MUST be called AFTER set_gid.
fn set_uid(uid: u32) -> Result<()> {
    // SAFETY: setresuid atomically sets real, effective and saved UIDs.
    let result =
        unsafe { libc::setresuid(uid as libc::uid_t, uid as libc::uid_t, uid as libc::uid_t) };
    if result != 0 {
        let err = std::io::Error::last_os_error();
        return Err(LockError::Privilege(format!(
            "Failed to setresuid({}): {}",
            uid, err
        )));
    }
    Ok(())
}
