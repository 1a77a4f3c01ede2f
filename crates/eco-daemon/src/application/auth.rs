//! Authentication gate for new connections.
//!
//! The first frame on a fresh WebSocket must carry the paired device's
//! `device_id` and `secret`.  [`Authenticator`] compares both against the
//! single configured [`Credential`].  There is no lockout or rate limit: a
//! failed attempt only costs the caller its connection.

use eco_core::Message;
use thiserror::Error;

use crate::domain::Credential;

/// Error returned by [`Authenticator::authenticate`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Device id or secret did not match.  Deliberately carries no detail.
    #[error("invalid credentials")]
    InvalidCredentials,
}

/// Validates presented credentials against the configured pair.
#[derive(Debug, Clone)]
pub struct Authenticator {
    credential: Credential,
}

impl Authenticator {
    pub fn new(credential: Credential) -> Self {
        Self { credential }
    }

    /// Returns `true` iff both fields match exactly.
    ///
    /// The comparison does not short-circuit on the first differing byte.
    /// An unset credential (empty device id or secret) never validates.
    pub fn validate(&self, device_id: &str, secret: &str) -> bool {
        if !self.credential.is_complete() {
            return false;
        }
        let id_ok = constant_time_eq(device_id.as_bytes(), self.credential.device_id.as_bytes());
        let secret_ok = constant_time_eq(secret.as_bytes(), self.credential.secret.as_bytes());
        id_ok & secret_ok
    }

    /// Checks the credentials carried by a first frame.
    ///
    /// Returns the admitted device id on success.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidCredentials`] on any mismatch.
    pub fn authenticate(&self, msg: &Message) -> Result<String, AuthError> {
        if self.validate(&msg.device_id, &msg.secret) {
            Ok(msg.device_id.clone())
        } else {
            Err(AuthError::InvalidCredentials)
        }
    }
}

/// Byte comparison whose running time depends only on the lengths.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

// ── Tests ─────────────────────────────────────────────────────────────────────
