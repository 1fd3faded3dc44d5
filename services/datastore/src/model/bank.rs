use chrono::{DateTime, Utc};
use reserva_crypto::{Password, PasswordHash};
use serde::Serialize;

/// Tenant root. Every account and card hangs off exactly one bank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bank {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub name: String,
    pub email: String,
    #[serde(skip)]
    pub password: PasswordHash,
    pub activated: bool,
    pub frozen: bool,
    pub balance_in_cents: i64,
    #[serde(skip)]
    pub version: i64,
}

/// A bank that has not been persisted yet.
///
/// The password is mandatory; there is no way to register a bank without a
/// credential hash.
#[derive(Debug, Clone)]
pub struct NewBank {
    pub name: String,
    pub email: String,
    pub password: Password,
}

/// Self-service changes to a bank. `None` leaves the field as is.
#[derive(Debug, Clone, Default)]
pub struct BankPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

impl BankPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none() && self.password.is_none()
    }
}
