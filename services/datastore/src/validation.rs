//! Input validation with per-field messages.
//!
//! # Purpose
//! Collect every problem with a request before any storage call is made, keyed
//! by the field that caused it, so callers can report them all at once.
//!
//! # Notes
//! Only the first message recorded for a field is kept.
use regex::Regex;
use reserva_crypto::{MAX_PASSWORD_CHARS, MIN_PASSWORD_CHARS, TOKEN_PLAINTEXT_LEN};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

/// Longest bank name accepted, in characters.
pub const MAX_NAME_CHARS: usize = 500;
/// Longest card lifetime accepted at issue time.
pub const MAX_CARD_EXPIRY_DAYS: i64 = 3650;

/// HTML5 `type=email` grammar: dotted hostname labels, no single-label
/// restriction.
static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
    )
    .expect("email pattern compiles")
});

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    fields: BTreeMap<String, String>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn add(&mut self, field: &str, message: &str) {
        self.fields
            .entry(field.to_string())
            .or_insert_with(|| message.to_string());
    }

    /// Record `message` against `field` unless `ok` holds.
    pub fn check(&mut self, ok: bool, field: &str, message: &str) {
        if !ok {
            self.add(field, message);
        }
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    /// `Ok(())` when nothing was recorded.
    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, message) in &self.fields {
            if !first {
                f.write_str("; ")?;
            }
            write!(f, "{field}: {message}")?;
            first = false;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

pub fn validate_email(v: &mut ValidationErrors, email: &str) {
    v.check(!email.is_empty(), "email", "must be provided");
    v.check(
        email.is_empty() || EMAIL_PATTERN.is_match(email),
        "email",
        "must be a valid email address",
    );
}

pub fn validate_name(v: &mut ValidationErrors, name: &str) {
    v.check(!name.trim().is_empty(), "name", "must be provided");
    v.check(
        name.chars().count() <= MAX_NAME_CHARS,
        "name",
        "must not be more than 500 characters long",
    );
}

pub fn validate_password_plaintext(v: &mut ValidationErrors, field: &str, password: &str) {
    let chars = password.chars().count();
    v.check(!password.is_empty(), field, "must be provided");
    v.check(chars >= MIN_PASSWORD_CHARS, field, "must be at least 8 characters long");
    v.check(chars <= MAX_PASSWORD_CHARS, field, "must not be more than 72 characters long");
}

pub fn validate_token_plaintext(v: &mut ValidationErrors, token: &str) {
    v.check(!token.is_empty(), "token", "must be provided");
    v.check(
        token.len() == TOKEN_PLAINTEXT_LEN,
        "token",
        "must be 22 characters long",
    );
}

pub fn validate_id(v: &mut ValidationErrors, field: &str, id: i64) {
    v.check(id > 0, field, "must be a positive integer");
}

pub fn validate_expiry_days(v: &mut ValidationErrors, days: i64) {
    v.check(days >= 1, "expiry_in_days", "must be at least 1");
    v.check(
        days <= MAX_CARD_EXPIRY_DAYS,
        "expiry_in_days",
        "must not be more than 3650",
    );
}
