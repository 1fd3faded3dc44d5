//! Bearer-token authentication.
//!
//! # Purpose
//! Issue opaque tokens bound to a bank, resolve them back to that bank, and
//! turn an `Authorization` header into an [`Authenticated`] caller.
//!
//! # Security model
//! - Only the SHA-256 digest of a token is stored; the plaintext leaves the
//!   process once, in the [`IssuedToken`](crate::model::IssuedToken).
//! - Unknown, expired and wrong-scope tokens fail the same way.
mod clock;
mod tokens;

pub use clock::{Clock, ManualClock, SystemClock};
pub use tokens::{AuthError, TokenAuthenticator};

use crate::model::Bank;

/// Who is making a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authenticated {
    /// No `Authorization` header was sent.
    Anonymous,
    Bank(Bank),
}

impl Authenticated {
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Authenticated::Anonymous)
    }

    pub fn bank(&self) -> Option<&Bank> {
        match self {
            Authenticated::Anonymous => None,
            Authenticated::Bank(bank) => Some(bank),
        }
    }
}
