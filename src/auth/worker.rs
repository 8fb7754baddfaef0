//! Verifier subprocess side of the auth channel.

use std::fs::File;
use std::io::{Read, Write};

use crate::auth::verifier::CredentialVerifier;
use crate::auth::wire::{read_request, write_verdict, AuthVerdict};
use crate::config::types::{Result, DEFAULT_INITIAL_CREDENTIAL_LEN};
use crate::kernel::memlock::SecureBuffer;

/// Serve verification requests until the request stream closes.
///
/// Each frame lands in a pinned buffer that is wiped as soon as the verdict
/// is written.
pub fn serve<R, W, V>(requests: &mut R, replies: &mut W, verifier: &V, max_len: usize) -> Result<()>
where
    R: Read,
    W: Write,
    V: CredentialVerifier + ?Sized,
{
    let mut credential =
        SecureBuffer::with_capacity(DEFAULT_INITIAL_CREDENTIAL_LEN.min(max_len), max_len)?;

    while read_request(requests, &mut credential)? {
        let verdict = if verifier.verify(credential.as_slice()) {
            AuthVerdict::Success
        } else {
            AuthVerdict::Failure
        };
        credential.clear();
        log::debug!("Verifier answering {:?}", verdict);
        write_verdict(replies, verdict)?;
    }

    log::debug!("Request stream closed; verifier exiting");
    Ok(())
}

/// Subprocess entrypoint after fork. Never returns.
pub fn run_worker_main<V>(mut requests: File, mut replies: File, verifier: V, max_len: usize) -> !
where
    V: CredentialVerifier,
{
    let code = match serve(&mut requests, &mut replies, &verifier, max_len) {
        Ok(()) => 0,
        Err(err) => {
            log::error!("Password verifier failed: {}", err);
            1
        }
    };
    drop(verifier);
    // Skip atexit handlers inherited from the parent.
    // SAFETY: _exit is always safe to call.
    unsafe { libc::_exit(code) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::wire::write_request;
    use std::io::Cursor;

    struct Fixed(&'static [u8]);

    impl CredentialVerifier for Fixed {
        fn verify(&self, credential: &[u8]) -> bool {
            credential == self.0
        }
    }

    #[test]
    fn answers_each_request_in_order() {
        let mut stream = Vec::new();
        write_request(&mut stream, b"wrong").unwrap();
        write_request(&mut stream, b"right").unwrap();
        write_request(&mut stream, b"").unwrap();

        let mut replies = Vec::new();
        serve(&mut Cursor::new(stream), &mut replies, &Fixed(b"right"), 64).unwrap();
        assert_eq!(replies, vec![0, 1, 0]);
    }

    #[test]
    fn oversized_request_aborts_without_reply() {
        let mut replies = Vec::new();
        let mut stream = Vec::new();
        write_request(&mut stream, &[b'a'; 65]).unwrap();
        let result = serve(&mut Cursor::new(stream), &mut replies, &Fixed(b"a"), 64);
        assert!(result.is_err());
        assert!(replies.is_empty());
    }
}
