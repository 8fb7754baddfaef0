//! Post-drop verification.

use super::transition::ProcessIds;
use crate::config::types::{LockError, Result};

/// Confirm the process now runs as the real IDs and cannot switch back.
pub fn verify_cannot_regain(original: &ProcessIds) -> Result<()> {
    let now = ProcessIds::current();
    if now.euid != original.uid || now.egid != original.gid {
        return Err(LockError::Privilege(format!(
            "Privilege drop incomplete (euid={}, egid={})",
            now.euid, now.egid
        )));
    }

    if original.euid != original.uid {
        // SAFETY: seteuid only changes credentials; success here is the failure case.
        if unsafe { libc::seteuid(original.euid as libc::uid_t) } == 0 {
            return Err(LockError::Privilege(format!(
                "Able to regain effective UID {} after dropping privileges",
                original.euid
            )));
        }
    }

    if original.egid != original.gid {
        // SAFETY: as above, for the group ID.
        if unsafe { libc::setegid(original.egid as libc::gid_t) } == 0 {
            return Err(LockError::Privilege(format!(
                "Able to regain effective GID {} after dropping privileges",
                original.egid
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verification_passes_for_unchanged_process() {
        let ids = ProcessIds::current();
        if ids.is_elevated() {
            return;
        }
        assert!(verify_cannot_regain(&ids).is_ok());
    }

    #[test]
    fn verification_rejects_mismatched_ids() {
        let ids = ProcessIds::current();
        let bogus = ProcessIds {
            uid: ids.euid.wrapping_add(1),
            ..ids
        };
        assert!(verify_cannot_regain(&bogus).is_err());
    }
}
