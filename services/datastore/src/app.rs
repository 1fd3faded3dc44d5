//! Shared application state.
//!
//! # Purpose
//! Bundles the store backend with the hasher, token authenticator and card
//! issuer so service operations take a single `&AppState`.
use crate::auth::{Clock, SystemClock, TokenAuthenticator};
use crate::cards::{CardIssuer, CardNumberGenerator, RandomCardNumbers};
use crate::config::{DatastoreConfig, StorageBackend};
use crate::store::memory::InMemoryStore;
use crate::store::postgres::PostgresStore;
use crate::store::{Store, StoreConfig};
use anyhow::Context;
use reserva_crypto::CredentialHasher;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub hasher: CredentialHasher,
    pub tokens: TokenAuthenticator,
    pub cards: Arc<CardIssuer>,
}

impl AppState {
    /// State with the default hasher cost, system clock and random card numbers.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_parts(
            store,
            CredentialHasher::default(),
            Arc::new(SystemClock),
            Box::new(RandomCardNumbers::default()),
        )
    }

    pub fn with_parts(
        store: Arc<dyn Store>,
        hasher: CredentialHasher,
        clock: Arc<dyn Clock>,
        numbers: Box<dyn CardNumberGenerator>,
    ) -> Self {
        Self {
            store,
            hasher,
            tokens: TokenAuthenticator::new(clock),
            cards: Arc::new(CardIssuer::new(numbers)),
        }
    }

    /// Open the configured backend and build state around it.
    pub async fn from_config(config: &DatastoreConfig) -> anyhow::Result<Self> {
        let store_config = StoreConfig {
            op_timeout: config.op_timeout(),
        };
        let store: Arc<dyn Store> = match config.storage {
            StorageBackend::Memory => Arc::new(InMemoryStore::new()),
            StorageBackend::Postgres => {
                let primary = config
                    .primary
                    .as_ref()
                    .context("postgres configuration missing")?;
                let replica = config.read_pool().unwrap_or(primary);
                Arc::new(PostgresStore::connect(primary, replica, store_config).await?)
            }
        };
        let cost = config.password_cost;
        let hasher = CredentialHasher::with_cost(cost.memory_kib, cost.iterations, cost.parallelism)
            .context("argon2 cost")?;
        Ok(Self::with_parts(
            store,
            hasher,
            Arc::new(SystemClock),
            Box::new(RandomCardNumbers::new(config.card_prefix)),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cards::CardPrefix;
    use crate::config::PasswordCost;

    #[tokio::test]
    async fn memory_backend_from_config() {
        let config = DatastoreConfig {
            storage: StorageBackend::Memory,
            primary: None,
            replica: None,
            op_timeout_ms: 3_000,
            password_cost: PasswordCost {
                memory_kib: 1024,
                iterations: 1,
                parallelism: 1,
            },
            card_prefix: CardPrefix::default(),
        };
        let state = AppState::from_config(&config).await.expect("state");
        assert_eq!(state.store.backend_name(), "memory");
        assert!(!state.store.is_durable());
        state.store.health_check().await.expect("health");
    }

    #[tokio::test]
    async fn invalid_cost_is_rejected() {
        let config = DatastoreConfig {
            storage: StorageBackend::Memory,
            primary: None,
            replica: None,
            op_timeout_ms: 3_000,
            password_cost: PasswordCost {
                memory_kib: 1,
                iterations: 1,
                parallelism: 1,
            },
            card_prefix: CardPrefix::default(),
        };
        assert!(AppState::from_config(&config).await.is_err());
    }
}
