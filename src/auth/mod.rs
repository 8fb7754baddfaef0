//! Privilege-separated credential verification.

pub mod channel;
pub mod state;
pub mod verifier;
pub mod wire;
pub mod worker;

pub use channel::AuthChannel;
pub use state::{AuthOutcome, AuthPhase, AuthState, CredentialSink, InputEvent};
pub use verifier::{Argon2Verifier, CredentialVerifier};
pub use wire::AuthVerdict;
