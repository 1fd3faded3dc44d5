//! Reserva datastore entry point.
//!
//! # Purpose
//! Loads configuration, opens the configured backend (running migrations for
//! Postgres), checks both pools, then idles until ctrl-c. The service
//! operations are consumed in-process through the library crate.
use anyhow::Context;
use datastore::AppState;
use datastore::config::DatastoreConfig;
use datastore::observability;
use std::future::Future;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = DatastoreConfig::from_env_or_yaml().context("datastore config")?;
    run_with_shutdown(config, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await
}

async fn run_with_shutdown<F>(config: DatastoreConfig, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    observability::init_tracing("reserva-datastore");
    let state = AppState::from_config(&config).await?;
    state
        .store
        .health_check()
        .await
        .context("initial health check")?;
    tracing::info!(
        backend = state.store.backend_name(),
        durable = state.store.is_durable(),
        op_timeout_ms = config.op_timeout_ms,
        card_prefix = %config.card_prefix,
        "datastore ready"
    );
    shutdown.await;
    tracing::info!("datastore shutting down");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use datastore::cards::CardPrefix;
    use datastore::config::{PasswordCost, StorageBackend};

    #[tokio::test]
    async fn memory_backend_starts_and_stops() {
        let config = DatastoreConfig {
            storage: StorageBackend::Memory,
            primary: None,
            replica: None,
            op_timeout_ms: 3_000,
            password_cost: PasswordCost::default(),
            card_prefix: CardPrefix::default(),
        };
        run_with_shutdown(config, async {}).await.expect("run");
    }
}
