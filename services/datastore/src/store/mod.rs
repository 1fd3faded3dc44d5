//! Storage seam for banks, accounts, cards and tokens.
//!
//! # Purpose
//! Defines the store traits the service layer talks to and the error taxonomy
//! every backend maps its failures into.
//!
//! # Key invariants
//! - Every account and card operation is filtered by the owning bank id.
//! - Updates are conditioned on the observed `version` and bump it by one;
//!   a stale version yields [`StoreError::EditConflict`].
//! - Get and delete with a non-positive id return [`StoreError::NotFound`]
//!   without touching the backend.
//!
//! # Backends
//! [`memory::InMemoryStore`] for tests and local runs, [`postgres::PostgresStore`]
//! for durable deployments with a primary/replica pool split.
use crate::model::{Account, Bank, Card, NewBank, Token, TokenScope};
use crate::paging::{Filters, Page};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reserva_crypto::TokenDigest;
use std::time::Duration;
use thiserror::Error;

pub mod memory;
pub mod postgres;

/// Default ceiling for a single storage operation.
pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Upper bound on one storage round trip; expiry is an error, never a retry.
    pub op_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            op_timeout: DEFAULT_OP_TIMEOUT,
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("edit conflict on {0}")]
    EditConflict(&'static str),
    #[error("a bank with this email address already exists")]
    DuplicateEmail,
    #[error("card number already in use")]
    DuplicateCardNumber,
    #[error("storage operation timed out: {0}")]
    Timeout(&'static str),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Unexpected(anyhow::Error::new(err))
    }
}

impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StoreError::Unexpected(anyhow::Error::new(err))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Count and build the conflict error for a stale versioned write.
pub(crate) fn edit_conflict(entity: &'static str) -> StoreError {
    metrics::counter!("reserva_edit_conflicts_total", "entity" => entity).increment(1);
    tracing::debug!(entity, "edit conflict");
    StoreError::EditConflict(entity)
}

#[async_trait]
pub trait BankStore: Send + Sync {
    async fn insert_bank(&self, bank: &NewBank) -> StoreResult<Bank>;
    async fn get_bank(&self, id: i64) -> StoreResult<Bank>;
    async fn get_bank_by_email(&self, email: &str) -> StoreResult<Bank>;
    /// Persist every mutable column of `bank` if its version is still current.
    /// Returns the bank with the bumped version.
    async fn update_bank(&self, bank: &Bank) -> StoreResult<Bank>;
    /// Resolve the bank owning an unexpired token of `scope` with digest `hash`.
    async fn bank_for_token(
        &self,
        scope: TokenScope,
        hash: &TokenDigest,
        now: DateTime<Utc>,
    ) -> StoreResult<Bank>;
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn insert_account(&self, bank_id: i64) -> StoreResult<Account>;
    async fn get_account(&self, bank_id: i64, id: i64) -> StoreResult<Account>;
    async fn update_account(&self, account: &Account) -> StoreResult<Account>;
    async fn delete_account(&self, bank_id: i64, id: i64) -> StoreResult<()>;
    async fn list_accounts(&self, bank_id: i64, filters: &Filters) -> StoreResult<Page<Account>>;
}

#[async_trait]
pub trait CardStore: Send + Sync {
    /// Insert `card` only if its account belongs to `bank_id`.
    ///
    /// # Errors
    /// - [`StoreError::DuplicateCardNumber`] when the number is taken.
    /// - [`StoreError::NotFound`] when the account is missing or owned by
    ///   another bank; nothing is written.
    async fn insert_card(&self, bank_id: i64, card: &Card) -> StoreResult<Card>;
    async fn get_card(&self, bank_id: i64, id: i64) -> StoreResult<Card>;
    /// Rotate the card credential if its version is still current.
    async fn update_card(&self, bank_id: i64, card: &Card) -> StoreResult<Card>;
    async fn delete_card(&self, bank_id: i64, id: i64) -> StoreResult<()>;
    async fn list_cards(
        &self,
        bank_id: i64,
        account_id: Option<i64>,
        filters: &Filters,
    ) -> StoreResult<Page<Card>>;
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn insert_token(&self, token: &Token) -> StoreResult<()>;
    /// Remove all of a bank's tokens for `scope`; returns how many went away.
    async fn delete_tokens_for_bank(&self, scope: TokenScope, bank_id: i64) -> StoreResult<u64>;
}

/// Everything the service layer needs from a backend.
#[async_trait]
pub trait Store: BankStore + AccountStore + CardStore + TokenStore {
    async fn health_check(&self) -> StoreResult<()>;
    fn is_durable(&self) -> bool;
    fn backend_name(&self) -> &'static str;
}
