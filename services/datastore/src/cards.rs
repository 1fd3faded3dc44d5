//! Card number allocation.
//!
//! # Purpose
//! Pick externally visible card numbers and persist cards under them. Numbers
//! are random, so two issuers can pick the same one; the store's unique
//! constraint is the arbiter and the issuer retries with a fresh candidate.
//!
//! # Key invariants
//! - At most [`CARD_NUMBER_ATTEMPTS`] insert attempts per card.
//! - Only [`StoreError::DuplicateCardNumber`] is retried. Every other failure,
//!   including an account owned by another bank, aborts immediately.
//! - Card numbers are 16 digits: a 6-digit issuer prefix, 9 random digits and
//!   a Luhn check digit.
use crate::model::{Card, NewCard};
use crate::store::{CardStore, StoreError};
use anyhow::bail;
use rand::Rng;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Insert attempts per card before giving up.
pub const CARD_NUMBER_ATTEMPTS: usize = 5;

const ACCOUNT_DIGITS: u32 = 9;

#[derive(Debug, Error)]
pub enum IssueError {
    #[error("no unique card number after {attempts} attempts")]
    Exhausted { attempts: usize },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Six-digit issuer identification number that leads every card number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CardPrefix(u32);

impl CardPrefix {
    pub fn value(&self) -> u32 {
        self.0
    }
}

impl Default for CardPrefix {
    fn default() -> Self {
        Self(400_000)
    }
}

impl FromStr for CardPrefix {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.len() != 6 || !value.bytes().all(|b| b.is_ascii_digit()) {
            bail!("card prefix must be exactly 6 digits");
        }
        if value.starts_with('0') {
            bail!("card prefix must not start with 0");
        }
        Ok(Self(value.parse()?))
    }
}

impl fmt::Display for CardPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Source of candidate card numbers.
pub trait CardNumberGenerator: Send + Sync {
    fn next_number(&self) -> i64;
}

/// Luhn check digit for `partial`, the number without its final digit.
pub fn luhn_check_digit(partial: u64) -> u64 {
    let mut sum = 0;
    let mut double = true;
    let mut rest = partial;
    while rest > 0 {
        let mut digit = rest % 10;
        if double {
            digit *= 2;
            if digit > 9 {
                digit -= 9;
            }
        }
        sum += digit;
        double = !double;
        rest /= 10;
    }
    (10 - sum % 10) % 10
}

pub fn luhn_valid(number: u64) -> bool {
    luhn_check_digit(number / 10) == number % 10
}

/// Uniformly random numbers under a fixed prefix.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomCardNumbers {
    prefix: CardPrefix,
}

impl RandomCardNumbers {
    pub fn new(prefix: CardPrefix) -> Self {
        Self { prefix }
    }

    fn compose(&self, body: u64) -> i64 {
        let partial = u64::from(self.prefix.value()) * 10u64.pow(ACCOUNT_DIGITS) + body;
        (partial * 10 + luhn_check_digit(partial)) as i64
    }
}

impl CardNumberGenerator for RandomCardNumbers {
    fn next_number(&self) -> i64 {
        let body = rand::thread_rng().gen_range(0..10u64.pow(ACCOUNT_DIGITS));
        self.compose(body)
    }
}

/// Persists cards under freshly generated numbers with bounded retry.
pub struct CardIssuer {
    numbers: Box<dyn CardNumberGenerator>,
    attempts: usize,
}

impl CardIssuer {
    pub fn new(numbers: Box<dyn CardNumberGenerator>) -> Self {
        Self {
            numbers,
            attempts: CARD_NUMBER_ATTEMPTS,
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts
    }

    /// Insert `card` for `bank_id`, drawing a new number after every collision.
    ///
    /// # Errors
    /// - [`IssueError::Exhausted`] when every attempt collided.
    /// - [`IssueError::Store`] for any other store failure, unchanged.
    pub async fn issue<S>(
        &self,
        store: &S,
        bank_id: i64,
        card: &NewCard,
    ) -> Result<Card, IssueError>
    where
        S: CardStore + ?Sized,
    {
        for attempt in 1..=self.attempts {
            let candidate = card.with_number(self.numbers.next_number());
            match store.insert_card(bank_id, &candidate).await {
                Ok(stored) => {
                    tracing::debug!(bank_id, account_id = card.account_id, attempt, "card issued");
                    return Ok(stored);
                }
                Err(StoreError::DuplicateCardNumber) => {
                    metrics::counter!("reserva_card_number_collisions_total").increment(1);
                    tracing::warn!(
                        bank_id,
                        account_id = card.account_id,
                        attempt,
                        "card number collision"
                    );
                }
                Err(err) => return Err(IssueError::Store(err)),
            }
        }
        tracing::error!(
            bank_id,
            account_id = card.account_id,
            attempts = self.attempts,
            "card number attempts exhausted"
        );
        Err(IssueError::Exhausted {
            attempts: self.attempts,
        })
    }
}
