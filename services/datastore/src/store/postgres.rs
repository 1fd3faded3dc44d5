//! Postgres-backed implementation of the datastore.
//!
//! # What this module is
//! Implements every store trait on top of two `sqlx` pools: a primary that
//! takes all writes, and a replica that serves account and card reads.
//!
//! # Key invariants
//! - Versioned updates are a single `UPDATE ... WHERE version = $n RETURNING
//!   version`; no row back means the version moved (or the row is gone, or it
//!   belongs to another bank) and the caller gets `EditConflict`.
//! - Every account and card statement carries the owning bank id, either
//!   directly or through a join on `accounts`.
//! - Card inserts are `INSERT ... SELECT` from the owning account, so an
//!   account of another bank inserts nothing.
//! - Every statement runs under `StoreConfig::op_timeout`; expiry surfaces as
//!   `StoreError::Timeout` and is never retried here.
//!
//! # Read/write split
//! Replica reads can lag the primary. A stale read followed by a versioned
//! write simply conflicts. Bank and token lookups go to the primary because
//! activation and login immediately follow the writes they depend on.
//!
//! # Security notes
//! - Database URLs may contain credentials; never log them.
//! - Dynamic SQL is limited to `ORDER BY` columns taken from the hard-coded
//!   sort allow-lists in [`crate::paging`].
use super::{
    AccountStore, BankStore, CardStore, Store, StoreConfig, StoreError, StoreResult, TokenStore,
    edit_conflict,
};
use crate::config::PostgresConfig;
use crate::model::{Account, Bank, Card, NewBank, Token, TokenScope};
use crate::paging::{Filters, Page};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reserva_crypto::{CardSigningKey, PasswordHash, TokenDigest};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{FromRow, PgPool};
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

const BANK_EMAIL_KEY: &str = "banks_email_key";
const CARD_ID_KEY: &str = "cards_id_key";

const BANK_COLUMNS: &str = "banks.id, banks.created_at, banks.name, banks.email, \
     banks.password_hash, banks.activated, banks.frozen, banks.balance_in_cents, banks.version";
const ACCOUNT_COLUMNS: &str = "id, bank_id, balance_in_cents, frozen, version";
const CARD_COLUMNS: &str = "cards.id, cards.account_id, cards.private_key, \
     cards.password_hash, cards.expiry, cards.version";

/// Durable store with a primary/replica pool split.
///
/// # Example
/// ```rust,no_run
/// use datastore::config::PostgresConfig;
/// use datastore::store::{StoreConfig, postgres::PostgresStore};
///
/// async fn open(primary: PostgresConfig, replica: PostgresConfig) {
///     let _ = PostgresStore::connect(&primary, &replica, StoreConfig::default()).await;
/// }
/// ```
pub struct PostgresStore {
    primary: PgPool,
    replica: PgPool,
    config: StoreConfig,
}

#[derive(Debug, Clone, FromRow)]
struct DbBank {
    id: i64,
    created_at: DateTime<Utc>,
    name: String,
    email: String,
    password_hash: String,
    activated: bool,
    frozen: bool,
    balance_in_cents: i64,
    version: i64,
}

#[derive(Debug, Clone, FromRow)]
struct DbAccount {
    id: i64,
    bank_id: i64,
    balance_in_cents: i64,
    frozen: bool,
    version: i64,
}

#[derive(Debug, Clone, FromRow)]
struct DbCard {
    id: i64,
    account_id: i64,
    private_key: Vec<u8>,
    password_hash: String,
    expiry: DateTime<Utc>,
    version: i64,
}

/// List rows carry the `count(*) OVER()` window total next to the entity.
#[derive(Debug, Clone, FromRow)]
struct DbAccountListRow {
    total_records: i64,
    #[sqlx(flatten)]
    account: DbAccount,
}

#[derive(Debug, Clone, FromRow)]
struct DbCardListRow {
    total_records: i64,
    #[sqlx(flatten)]
    card: DbCard,
}

impl PostgresStore {
    /// Connect both pools and run embedded migrations on the primary.
    ///
    /// Pass the same config twice when there is no replica.
    ///
    /// # Errors
    /// - Connection, migration or pool setup failures.
    pub async fn connect(
        primary: &PostgresConfig,
        replica: &PostgresConfig,
        config: StoreConfig,
    ) -> StoreResult<Self> {
        Self::connect_internal(primary, replica, config, true).await
    }

    /// Connect without applying migrations, for tests that manage the schema.
    #[cfg(any(test, feature = "pg-tests"))]
    pub async fn connect_without_migrations(
        primary: &PostgresConfig,
        replica: &PostgresConfig,
        config: StoreConfig,
    ) -> StoreResult<Self> {
        Self::connect_internal(primary, replica, config, false).await
    }

    async fn connect_internal(
        primary: &PostgresConfig,
        replica: &PostgresConfig,
        config: StoreConfig,
        run_migrations: bool,
    ) -> StoreResult<Self> {
        let primary_pool = open_pool(primary).await?;
        let replica_pool = if primary == replica {
            primary_pool.clone()
        } else {
            open_pool(replica).await?
        };

        if run_migrations {
            // Only the primary accepts DDL; the replica follows via replication.
            sqlx::migrate!("./migrations").run(&primary_pool).await?;
        }

        tracing::info!(
            primary_max = primary.max_connections,
            replica_max = replica.max_connections,
            shared = primary == replica,
            "postgres pools ready"
        );
        Ok(Self {
            primary: primary_pool,
            replica: replica_pool,
            config,
        })
    }

    /// Run `fut` under the configured operation timeout.
    async fn timed<T>(
        &self,
        op: &'static str,
        fut: impl Future<Output = StoreResult<T>>,
    ) -> StoreResult<T> {
        match tokio::time::timeout(self.config.op_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                metrics::counter!("reserva_store_timeouts_total", "op" => op).increment(1);
                tracing::warn!(
                    op,
                    timeout_ms = self.config.op_timeout.as_millis() as u64,
                    "storage operation timed out"
                );
                Err(StoreError::Timeout(op))
            }
        }
    }
}

async fn open_pool(pg: &PostgresConfig) -> StoreResult<PgPool> {
    let connect_options = PgConnectOptions::from_str(&pg.url)?;
    let pool = PgPoolOptions::new()
        .max_connections(pg.max_connections)
        .min_connections(pg.min_connections)
        .idle_timeout(Duration::from_millis(pg.idle_timeout_ms))
        .acquire_timeout(Duration::from_millis(pg.acquire_timeout_ms))
        .connect_with(connect_options)
        .await?;
    Ok(pool)
}

#[async_trait]
impl BankStore for PostgresStore {
    async fn insert_bank(&self, bank: &NewBank) -> StoreResult<Bank> {
        self.timed("insert_bank", async {
            let query = format!(
                "INSERT INTO banks (name, email, password_hash) VALUES ($1, $2, $3) \
                 RETURNING {BANK_COLUMNS}"
            );
            let row = sqlx::query_as::<_, DbBank>(&query)
                .bind(&bank.name)
                .bind(&bank.email)
                .bind(bank.password.hash().as_str())
                .fetch_one(&self.primary)
                .await
                .map_err(|err| {
                    if is_unique_violation(&err, BANK_EMAIL_KEY) {
                        StoreError::DuplicateEmail
                    } else {
                        err.into()
                    }
                })?;
            Ok(bank_from_db(row))
        })
        .await
    }

    async fn get_bank(&self, id: i64) -> StoreResult<Bank> {
        if id < 1 {
            return Err(StoreError::NotFound("bank"));
        }
        self.timed("get_bank", async {
            let query = format!("SELECT {BANK_COLUMNS} FROM banks WHERE banks.id = $1");
            let row = sqlx::query_as::<_, DbBank>(&query)
                .bind(id)
                .fetch_optional(&self.primary)
                .await?
                .ok_or(StoreError::NotFound("bank"))?;
            Ok(bank_from_db(row))
        })
        .await
    }

    async fn get_bank_by_email(&self, email: &str) -> StoreResult<Bank> {
        self.timed("get_bank_by_email", async {
            let query =
                format!("SELECT {BANK_COLUMNS} FROM banks WHERE LOWER(banks.email) = LOWER($1)");
            let row = sqlx::query_as::<_, DbBank>(&query)
                .bind(email)
                .fetch_optional(&self.primary)
                .await?
                .ok_or(StoreError::NotFound("bank"))?;
            Ok(bank_from_db(row))
        })
        .await
    }

    async fn update_bank(&self, bank: &Bank) -> StoreResult<Bank> {
        self.timed("update_bank", async {
            let version: Option<i64> = sqlx::query_scalar(
                "UPDATE banks SET name = $1, email = $2, password_hash = $3, activated = $4, \
                 frozen = $5, balance_in_cents = $6, version = version + 1 \
                 WHERE id = $7 AND version = $8 RETURNING version",
            )
            .bind(&bank.name)
            .bind(&bank.email)
            .bind(bank.password.as_str())
            .bind(bank.activated)
            .bind(bank.frozen)
            .bind(bank.balance_in_cents)
            .bind(bank.id)
            .bind(bank.version)
            .fetch_optional(&self.primary)
            .await
            .map_err(|err| {
                if is_unique_violation(&err, BANK_EMAIL_KEY) {
                    StoreError::DuplicateEmail
                } else {
                    err.into()
                }
            })?;
            let version = version.ok_or_else(|| edit_conflict("bank"))?;
            Ok(Bank {
                version,
                ..bank.clone()
            })
        })
        .await
    }

    async fn bank_for_token(
        &self,
        scope: TokenScope,
        hash: &TokenDigest,
        now: DateTime<Utc>,
    ) -> StoreResult<Bank> {
        self.timed("bank_for_token", async {
            let query = format!(
                "SELECT {BANK_COLUMNS} FROM banks \
                 INNER JOIN tokens ON banks.id = tokens.bank_id \
                 WHERE tokens.hash = $1 AND tokens.scope = $2 AND tokens.expiry > $3"
            );
            let row = sqlx::query_as::<_, DbBank>(&query)
                .bind(hash.as_bytes().to_vec())
                .bind(scope.as_str())
                .bind(now)
                .fetch_optional(&self.primary)
                .await?
                .ok_or(StoreError::NotFound("bank"))?;
            Ok(bank_from_db(row))
        })
        .await
    }
}

#[async_trait]
impl AccountStore for PostgresStore {
    async fn insert_account(&self, bank_id: i64) -> StoreResult<Account> {
        self.timed("insert_account", async {
            let query =
                format!("INSERT INTO accounts (bank_id) VALUES ($1) RETURNING {ACCOUNT_COLUMNS}");
            let row = sqlx::query_as::<_, DbAccount>(&query)
                .bind(bank_id)
                .fetch_one(&self.primary)
                .await
                .map_err(|err| {
                    if is_foreign_key_violation(&err) {
                        StoreError::NotFound("bank")
                    } else {
                        err.into()
                    }
                })?;
            Ok(account_from_db(row))
        })
        .await
    }

    async fn get_account(&self, bank_id: i64, id: i64) -> StoreResult<Account> {
        if id < 1 {
            return Err(StoreError::NotFound("account"));
        }
        self.timed("get_account", async {
            let query =
                format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1 AND bank_id = $2");
            let row = sqlx::query_as::<_, DbAccount>(&query)
                .bind(id)
                .bind(bank_id)
                .fetch_optional(&self.replica)
                .await?
                .ok_or(StoreError::NotFound("account"))?;
            Ok(account_from_db(row))
        })
        .await
    }

    async fn update_account(&self, account: &Account) -> StoreResult<Account> {
        self.timed("update_account", async {
            let version: Option<i64> = sqlx::query_scalar(
                "UPDATE accounts SET balance_in_cents = $1, frozen = $2, version = version + 1 \
                 WHERE id = $3 AND bank_id = $4 AND version = $5 RETURNING version",
            )
            .bind(account.balance_in_cents)
            .bind(account.frozen)
            .bind(account.id)
            .bind(account.bank_id)
            .bind(account.version)
            .fetch_optional(&self.primary)
            .await?;
            let version = version.ok_or_else(|| edit_conflict("account"))?;
            Ok(Account {
                version,
                ..account.clone()
            })
        })
        .await
    }

    async fn delete_account(&self, bank_id: i64, id: i64) -> StoreResult<()> {
        if id < 1 {
            return Err(StoreError::NotFound("account"));
        }
        self.timed("delete_account", async {
            let result = sqlx::query("DELETE FROM accounts WHERE id = $1 AND bank_id = $2")
                .bind(id)
                .bind(bank_id)
                .execute(&self.primary)
                .await?;
            if result.rows_affected() == 0 {
                return Err(StoreError::NotFound("account"));
            }
            Ok(())
        })
        .await
    }

    async fn list_accounts(&self, bank_id: i64, filters: &Filters) -> StoreResult<Page<Account>> {
        self.timed("list_accounts", async {
            // `column` and `direction` come from ACCOUNT_SORT_SAFELIST via
            // `Filters::parse`; never pass caller text into this format string.
            let query = format!(
                "SELECT count(*) OVER() AS total_records, {ACCOUNT_COLUMNS} FROM accounts \
                 WHERE bank_id = $1 ORDER BY {} {}, id ASC LIMIT $2 OFFSET $3",
                filters.sort.column,
                filters.sort.direction()
            );
            let rows = sqlx::query_as::<_, DbAccountListRow>(&query)
                .bind(bank_id)
                .bind(filters.limit())
                .bind(filters.offset())
                .fetch_all(&self.replica)
                .await?;
            let total = rows.first().map(|row| row.total_records).unwrap_or(0);
            let items = rows.into_iter().map(|row| account_from_db(row.account)).collect();
            Ok(Page::new(items, total, filters))
        })
        .await
    }
}

#[async_trait]
impl CardStore for PostgresStore {
    async fn insert_card(&self, bank_id: i64, card: &Card) -> StoreResult<Card> {
        self.timed("insert_card", async {
            let query = format!(
                "INSERT INTO cards (id, account_id, private_key, password_hash, expiry) \
                 SELECT $1, accounts.id, $3, $4, $5 FROM accounts \
                 WHERE accounts.id = $2 AND accounts.bank_id = $6 \
                 RETURNING {CARD_COLUMNS}"
            );
            let row = sqlx::query_as::<_, DbCard>(&query)
                .bind(card.id)
                .bind(card.account_id)
                .bind(card.signing_key.as_bytes().to_vec())
                .bind(card.password.as_str())
                .bind(card.expiry)
                .bind(bank_id)
                .fetch_optional(&self.primary)
                .await
                .map_err(|err| {
                    if is_unique_violation(&err, CARD_ID_KEY) {
                        StoreError::DuplicateCardNumber
                    } else {
                        err.into()
                    }
                })?
                .ok_or(StoreError::NotFound("account"))?;
            card_from_db(row)
        })
        .await
    }

    async fn get_card(&self, bank_id: i64, id: i64) -> StoreResult<Card> {
        if id < 1 {
            return Err(StoreError::NotFound("card"));
        }
        self.timed("get_card", async {
            let query = format!(
                "SELECT {CARD_COLUMNS} FROM cards \
                 INNER JOIN accounts ON accounts.id = cards.account_id \
                 WHERE cards.id = $1 AND accounts.bank_id = $2"
            );
            let row = sqlx::query_as::<_, DbCard>(&query)
                .bind(id)
                .bind(bank_id)
                .fetch_optional(&self.replica)
                .await?
                .ok_or(StoreError::NotFound("card"))?;
            card_from_db(row)
        })
        .await
    }

    async fn update_card(&self, bank_id: i64, card: &Card) -> StoreResult<Card> {
        self.timed("update_card", async {
            let version: Option<i64> = sqlx::query_scalar(
                "UPDATE cards SET password_hash = $1, version = cards.version + 1 \
                 FROM accounts \
                 WHERE cards.id = $2 AND cards.version = $3 \
                 AND accounts.id = cards.account_id AND accounts.bank_id = $4 \
                 RETURNING cards.version",
            )
            .bind(card.password.as_str())
            .bind(card.id)
            .bind(card.version)
            .bind(bank_id)
            .fetch_optional(&self.primary)
            .await?;
            let version = version.ok_or_else(|| edit_conflict("card"))?;
            Ok(Card {
                version,
                ..card.clone()
            })
        })
        .await
    }

    async fn delete_card(&self, bank_id: i64, id: i64) -> StoreResult<()> {
        if id < 1 {
            return Err(StoreError::NotFound("card"));
        }
        self.timed("delete_card", async {
            let result = sqlx::query(
                "DELETE FROM cards USING accounts \
                 WHERE cards.id = $1 AND accounts.id = cards.account_id AND accounts.bank_id = $2",
            )
            .bind(id)
            .bind(bank_id)
            .execute(&self.primary)
            .await?;
            if result.rows_affected() == 0 {
                return Err(StoreError::NotFound("card"));
            }
            Ok(())
        })
        .await
    }

    async fn list_cards(
        &self,
        bank_id: i64,
        account_id: Option<i64>,
        filters: &Filters,
    ) -> StoreResult<Page<Card>> {
        self.timed("list_cards", async {
            // Sort column is from CARD_SORT_SAFELIST; see `Filters::parse`.
            let query = format!(
                "SELECT count(*) OVER() AS total_records, {CARD_COLUMNS} FROM cards \
                 INNER JOIN accounts ON accounts.id = cards.account_id \
                 WHERE accounts.bank_id = $1 AND ($2::BIGINT IS NULL OR cards.account_id = $2) \
                 ORDER BY cards.{} {}, cards.id ASC LIMIT $3 OFFSET $4",
                filters.sort.column,
                filters.sort.direction()
            );
            let rows = sqlx::query_as::<_, DbCardListRow>(&query)
                .bind(bank_id)
                .bind(account_id)
                .bind(filters.limit())
                .bind(filters.offset())
                .fetch_all(&self.replica)
                .await?;
            let total = rows.first().map(|row| row.total_records).unwrap_or(0);
            let items = rows
                .into_iter()
                .map(|row| card_from_db(row.card))
                .collect::<StoreResult<Vec<_>>>()?;
            Ok(Page::new(items, total, filters))
        })
        .await
    }
}

#[async_trait]
impl TokenStore for PostgresStore {
    async fn insert_token(&self, token: &Token) -> StoreResult<()> {
        self.timed("insert_token", async {
            sqlx::query(
                "INSERT INTO tokens (hash, bank_id, scope, expiry) VALUES ($1, $2, $3, $4)",
            )
            .bind(token.hash.as_bytes().to_vec())
            .bind(token.bank_id)
            .bind(token.scope.as_str())
            .bind(token.expiry)
            .execute(&self.primary)
            .await
            .map_err(|err| {
                if is_foreign_key_violation(&err) {
                    StoreError::NotFound("bank")
                } else {
                    err.into()
                }
            })?;
            Ok(())
        })
        .await
    }

    async fn delete_tokens_for_bank(&self, scope: TokenScope, bank_id: i64) -> StoreResult<u64> {
        self.timed("delete_tokens_for_bank", async {
            let result = sqlx::query("DELETE FROM tokens WHERE scope = $1 AND bank_id = $2")
                .bind(scope.as_str())
                .bind(bank_id)
                .execute(&self.primary)
                .await?;
            Ok(result.rows_affected())
        })
        .await
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn health_check(&self) -> StoreResult<()> {
        self.timed("health_check", async {
            sqlx::query("SELECT 1").execute(&self.primary).await?;
            sqlx::query("SELECT 1").execute(&self.replica).await?;
            Ok(())
        })
        .await
    }

    fn is_durable(&self) -> bool {
        true
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

/// SQLSTATE 23505 on the named constraint or unique index.
fn is_unique_violation(err: &sqlx::Error, constraint: &str) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        return db_err.code().map(|code| code == "23505").unwrap_or(false)
            && db_err.constraint() == Some(constraint);
    }
    false
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        return db_err.code().map(|code| code == "23503").unwrap_or(false);
    }
    false
}

fn bank_from_db(row: DbBank) -> Bank {
    Bank {
        id: row.id,
        created_at: row.created_at,
        name: row.name,
        email: row.email,
        password: PasswordHash::from_phc(row.password_hash),
        activated: row.activated,
        frozen: row.frozen,
        balance_in_cents: row.balance_in_cents,
        version: row.version,
    }
}

fn account_from_db(row: DbAccount) -> Account {
    Account {
        id: row.id,
        bank_id: row.bank_id,
        balance_in_cents: row.balance_in_cents,
        frozen: row.frozen,
        version: row.version,
    }
}

fn card_from_db(row: DbCard) -> StoreResult<Card> {
    let signing_key = CardSigningKey::from_bytes(&row.private_key).map_err(|err| {
        StoreError::Unexpected(anyhow::Error::new(err).context("decode card private_key"))
    })?;
    Ok(Card {
        id: row.id,
        account_id: row.account_id,
        signing_key,
        password: PasswordHash::from_phc(row.password_hash),
        expiry: row.expiry,
        version: row.version,
    })
}
