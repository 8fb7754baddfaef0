//! Credential checks executed inside the verifier subprocess.

use std::path::{Path, PathBuf};

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use zeroize::Zeroizing;

use crate::config::types::{LockError, Result};

/// Decides whether a submitted credential unlocks the session.
pub trait CredentialVerifier {
    fn verify(&self, credential: &[u8]) -> bool;
}

/// Verifies against an Argon2 PHC string (`$argon2id$v=19$...`).
pub struct Argon2Verifier {
    phc: Zeroizing<String>,
}

impl Argon2Verifier {
    /// Validate and keep a PHC hash string.
    pub fn from_phc(phc: &str) -> Result<Self> {
        let phc = phc.trim();
        PasswordHash::new(phc)
            .map_err(|e| LockError::Config(format!("Invalid password hash: {}", e)))?;
        Ok(Self {
            phc: Zeroizing::new(phc.to_string()),
        })
    }

    /// Load the hash from a file containing one PHC string.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = Zeroizing::new(std::fs::read_to_string(path).map_err(|e| {
            LockError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?);
        Self::from_phc(&contents)
    }
}

impl CredentialVerifier for Argon2Verifier {
    fn verify(&self, credential: &[u8]) -> bool {
        // Parsed per call: PasswordHash borrows the string it was built from.
        match PasswordHash::new(&self.phc) {
            Ok(parsed) => Argon2::default().verify_password(credential, &parsed).is_ok(),
            Err(e) => {
                log::error!("Stored password hash became unparsable: {}", e);
                false
            }
        }
    }
}

/// Candidate hash files, most specific first.
pub fn default_hash_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    let config_home = std::env::var_os("XDG_CONFIG_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")));
    if let Some(dir) = config_home {
        paths.push(dir.join("rustlock").join("password-hash"));
    }
    paths.push(PathBuf::from("/etc/rustlock/password-hash"));
    paths
}

/// Resolve the hash file: an explicit path wins, otherwise the first default that exists.
pub fn locate_hash_file(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    default_hash_paths()
        .into_iter()
        .find(|path| path.is_file())
        .ok_or_else(|| {
            LockError::Config(
                "No password hash found; pass --password-hash-file or create \
                 ~/.config/rustlock/password-hash"
                    .to_string(),
            )
        })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use argon2::password_hash::{PasswordHasher, SaltString};
    use argon2::{Algorithm, Params, Version};

    /// Cheap-parameter hash so tests stay fast; verification reads the
    /// parameters back out of the PHC string.
    pub(crate) fn cheap_hash(password: &[u8]) -> String {
        let params = Params::new(8, 1, 1, None).unwrap();
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        let salt = SaltString::encode_b64(b"rustlock-salt-01").unwrap();
        argon2.hash_password(password, &salt).unwrap().to_string()
    }

    #[test]
    fn correct_password_verifies() {
        let verifier = Argon2Verifier::from_phc(&cheap_hash(b"hunter2")).unwrap();
        assert!(verifier.verify(b"hunter2"));
    }

    #[test]
    fn wrong_password_is_rejected() {
        let verifier = Argon2Verifier::from_phc(&cheap_hash(b"hunter2")).unwrap();
        assert!(!verifier.verify(b"hunter3"));
        assert!(!verifier.verify(b""));
    }

    #[test]
    fn garbage_hash_is_a_config_error() {
        assert!(matches!(
            Argon2Verifier::from_phc("not-a-hash"),
            Err(LockError::Config(_))
        ));
    }

    #[test]
    fn hash_file_with_trailing_newline_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("password-hash");
        std::fs::write(&path, format!("{}\n", cheap_hash(b"pw"))).unwrap();
        let verifier = Argon2Verifier::from_file(&path).unwrap();
        assert!(verifier.verify(b"pw"));
    }

    #[test]
    fn explicit_hash_path_wins() {
        let explicit = Path::new("/nonexistent/hash");
        assert_eq!(locate_hash_file(Some(explicit)).unwrap(), explicit);
    }

    #[test]
    fn defaults_end_with_system_path() {
        let paths = default_hash_paths();
        assert_eq!(
            paths.last().unwrap(),
            &PathBuf::from("/etc/rustlock/password-hash")
        );
    }
}
