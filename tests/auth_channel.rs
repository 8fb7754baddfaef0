//! Integration tests for the privilege-separated verifier
//!
//! These exercise the real pipes and a real forked verifier subprocess.

use std::thread;
use std::time::Duration;

use argon2::password_hash::{PasswordHasher, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};

use rustlock::auth::worker::serve;
use rustlock::kernel::pipe::cloexec_pipe;
use rustlock::auth::{Argon2Verifier, AuthChannel, AuthVerdict, CredentialVerifier};
use rustlock::{LockError, DEFAULT_MAX_CREDENTIAL_LEN};

fn cheap_phc(password: &[u8]) -> String {
    let params = Params::new(8, 1, 1, None).unwrap();
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
    let salt = SaltString::from_b64("cnVzdGxvY2t0ZXN0").unwrap();
    argon2.hash_password(password, &salt).unwrap().to_string()
}

/// Poll the nonblocking reply end until a verdict shows up.
fn wait_for_verdict(channel: &mut AuthChannel) -> rustlock::Result<AuthVerdict> {
    for _ in 0..500 {
        if let Some(verdict) = channel.poll_reply()? {
            return Ok(verdict);
        }
        thread::sleep(Duration::from_millis(10));
    }
    panic!("no verdict within 5s");
}

struct Exactly(&'static [u8]);

impl CredentialVerifier for Exactly {
    fn verify(&self, credential: &[u8]) -> bool {
        credential == self.0
    }
}

#[test]
fn test_worker_thread_answers_over_real_pipes() {
    let (req_read, req_write) = cloexec_pipe().unwrap();
    let (rep_read, rep_write) = cloexec_pipe().unwrap();
    let verifier = Argon2Verifier::from_phc(&cheap_phc(b"correct horse")).unwrap();

    let worker = thread::spawn(move || {
        let mut requests = std::fs::File::from(req_read);
        let mut replies = std::fs::File::from(rep_write);
        serve(&mut requests, &mut replies, &verifier, DEFAULT_MAX_CREDENTIAL_LEN)
    });

    let mut channel = AuthChannel::from_fds(req_write, rep_read).unwrap();
    channel.submit(b"battery staple").unwrap();
    assert_eq!(wait_for_verdict(&mut channel).unwrap(), AuthVerdict::Failure);
    channel.submit(b"correct horse").unwrap();
    assert_eq!(wait_for_verdict(&mut channel).unwrap(), AuthVerdict::Success);

    drop(channel);
    assert!(worker.join().unwrap().is_ok());
}

#[test]
fn test_forked_verifier_round_trip_and_crash_detection() {
    let mut channel = AuthChannel::spawn(Exactly(b"abc123"), DEFAULT_MAX_CREDENTIAL_LEN).unwrap();
    assert!(channel.child_pid().is_some());

    channel.submit(b"abc12").unwrap();
    assert_eq!(wait_for_verdict(&mut channel).unwrap(), AuthVerdict::Failure);
    channel.submit(b"abc123").unwrap();
    assert_eq!(wait_for_verdict(&mut channel).unwrap(), AuthVerdict::Success);

    // An oversized frame makes the verifier exit without answering.
    let oversized = vec![b'x'; DEFAULT_MAX_CREDENTIAL_LEN + 1];
    let _ = channel.submit(&oversized);
    let err = wait_for_verdict(&mut channel).unwrap_err();
    assert!(matches!(err, LockError::AuthChannelCrash(_)));
    assert_eq!(err.exit_code(), 2);
}
