//! Datastore configuration sourced from environment variables, with an
//! optional YAML override file.
//!
//! # Notes
//! Database URLs may carry credentials. `PostgresConfig` therefore has a
//! hand-written `Debug` that omits the URL.
use crate::cards::CardPrefix;
use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_OP_TIMEOUT_MS: u64 = 3_000;
pub const DEFAULT_MAX_CONNECTIONS: u32 = 25;
pub const DEFAULT_MIN_CONNECTIONS: u32 = 2;
pub const DEFAULT_IDLE_TIMEOUT_MS: u64 = 15 * 60 * 1_000;
pub const DEFAULT_ACQUIRE_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_ARGON2_MEMORY_KIB: u32 = 19 * 1024;
pub const DEFAULT_ARGON2_ITERATIONS: u32 = 2;
pub const DEFAULT_ARGON2_PARALLELISM: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    Postgres,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "postgres" => Ok(StorageBackend::Postgres),
            other => bail!("unknown storage backend: {other}"),
        }
    }
}

/// Connection pool settings for one Postgres endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct PostgresConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub idle_timeout_ms: u64,
    pub acquire_timeout_ms: u64,
}

impl PostgresConfig {
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            min_connections: DEFAULT_MIN_CONNECTIONS,
            idle_timeout_ms: DEFAULT_IDLE_TIMEOUT_MS,
            acquire_timeout_ms: DEFAULT_ACQUIRE_TIMEOUT_MS,
        }
    }
}

impl fmt::Debug for PostgresConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresConfig")
            .field("url", &"<redacted>")
            .field("max_connections", &self.max_connections)
            .field("min_connections", &self.min_connections)
            .field("idle_timeout_ms", &self.idle_timeout_ms)
            .field("acquire_timeout_ms", &self.acquire_timeout_ms)
            .finish()
    }
}

/// Argon2id cost used when hashing new credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PasswordCost {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for PasswordCost {
    fn default() -> Self {
        Self {
            memory_kib: DEFAULT_ARGON2_MEMORY_KIB,
            iterations: DEFAULT_ARGON2_ITERATIONS,
            parallelism: DEFAULT_ARGON2_PARALLELISM,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DatastoreConfig {
    pub storage: StorageBackend,
    pub primary: Option<PostgresConfig>,
    /// Read-only endpoint; falls back to `primary` when unset.
    pub replica: Option<PostgresConfig>,
    pub op_timeout_ms: u64,
    pub password_cost: PasswordCost,
    pub card_prefix: CardPrefix,
}

#[derive(Debug, Default, Deserialize)]
struct PostgresOverride {
    url: Option<String>,
    max_connections: Option<u32>,
    min_connections: Option<u32>,
    idle_timeout_ms: Option<u64>,
    acquire_timeout_ms: Option<u64>,
}

impl PostgresOverride {
    fn apply(self, base: Option<PostgresConfig>, label: &str) -> Result<Option<PostgresConfig>> {
        let mut config = match (base, self.url) {
            (_, Some(url)) => PostgresConfig::with_url(url),
            (Some(existing), None) => existing,
            (None, None) => bail!("{label}.url is required when overriding {label} pool settings"),
        };
        if let Some(value) = self.max_connections {
            config.max_connections = value;
        }
        if let Some(value) = self.min_connections {
            config.min_connections = value;
        }
        if let Some(value) = self.idle_timeout_ms {
            config.idle_timeout_ms = value;
        }
        if let Some(value) = self.acquire_timeout_ms {
            config.acquire_timeout_ms = value;
        }
        Ok(Some(config))
    }
}

#[derive(Debug, Deserialize)]
struct DatastoreConfigOverride {
    storage: Option<String>,
    primary: Option<PostgresOverride>,
    replica: Option<PostgresOverride>,
    op_timeout_ms: Option<u64>,
    password_cost: Option<PasswordCost>,
    card_prefix: Option<String>,
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(value) => value.parse().with_context(|| format!("parse {key}")),
        Err(_) => Ok(default),
    }
}

fn pool_from_env(url_key: &str) -> Result<Option<PostgresConfig>> {
    let Ok(url) = std::env::var(url_key) else {
        return Ok(None);
    };
    Ok(Some(PostgresConfig {
        url,
        max_connections: env_or("RESERVA_DB_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?,
        min_connections: env_or("RESERVA_DB_MIN_CONNECTIONS", DEFAULT_MIN_CONNECTIONS)?,
        idle_timeout_ms: env_or("RESERVA_DB_IDLE_TIMEOUT_MS", DEFAULT_IDLE_TIMEOUT_MS)?,
        acquire_timeout_ms: env_or("RESERVA_DB_ACQUIRE_TIMEOUT_MS", DEFAULT_ACQUIRE_TIMEOUT_MS)?,
    }))
}

impl DatastoreConfig {
    pub fn from_env() -> Result<Self> {
        let storage = std::env::var("RESERVA_STORAGE_BACKEND")
            .unwrap_or_else(|_| "memory".to_string())
            .parse()
            .with_context(|| "parse RESERVA_STORAGE_BACKEND")?;
        let primary = pool_from_env("RESERVA_PRIMARY_DATABASE_URL")?;
        let replica = pool_from_env("RESERVA_REPLICA_DATABASE_URL")?;
        let op_timeout_ms = env_or("RESERVA_OP_TIMEOUT_MS", DEFAULT_OP_TIMEOUT_MS)?;
        let password_cost = PasswordCost {
            memory_kib: env_or("RESERVA_ARGON2_MEMORY_KIB", DEFAULT_ARGON2_MEMORY_KIB)?,
            iterations: env_or("RESERVA_ARGON2_ITERATIONS", DEFAULT_ARGON2_ITERATIONS)?,
            parallelism: env_or("RESERVA_ARGON2_PARALLELISM", DEFAULT_ARGON2_PARALLELISM)?,
        };
        let card_prefix = match std::env::var("RESERVA_CARD_PREFIX") {
            Ok(value) => value.parse().with_context(|| "parse RESERVA_CARD_PREFIX")?,
            Err(_) => CardPrefix::default(),
        };
        let config = Self {
            storage,
            primary,
            replica,
            op_timeout_ms,
            password_cost,
            card_prefix,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_env_or_yaml() -> Result<Self> {
        let mut config = Self::from_env()?;
        if let Ok(path) = std::env::var("RESERVA_CONFIG") {
            let contents =
                fs::read_to_string(&path).with_context(|| format!("read RESERVA_CONFIG: {path}"))?;
            config.apply_yaml(&contents)?;
        }
        Ok(config)
    }

    fn apply_yaml(&mut self, contents: &str) -> Result<()> {
        let override_cfg: DatastoreConfigOverride =
            serde_yaml::from_str(contents).with_context(|| "parse datastore config yaml")?;
        if let Some(value) = override_cfg.storage {
            self.storage = value.parse().with_context(|| "parse storage")?;
        }
        if let Some(value) = override_cfg.primary {
            self.primary = value.apply(self.primary.take(), "primary")?;
        }
        if let Some(value) = override_cfg.replica {
            self.replica = value.apply(self.replica.take(), "replica")?;
        }
        if let Some(value) = override_cfg.op_timeout_ms {
            self.op_timeout_ms = value;
        }
        if let Some(value) = override_cfg.password_cost {
            self.password_cost = value;
        }
        if let Some(value) = override_cfg.card_prefix {
            self.card_prefix = value.parse().with_context(|| "parse card_prefix")?;
        }
        self.validate()
    }

    fn validate(&self) -> Result<()> {
        if self.op_timeout_ms == 0 {
            bail!("op_timeout_ms must be greater than zero");
        }
        if self.storage == StorageBackend::Postgres && self.primary.is_none() {
            bail!("postgres storage requires RESERVA_PRIMARY_DATABASE_URL");
        }
        Ok(())
    }

    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }

    /// The pool used for reads: the replica when configured, otherwise the primary.
    pub fn read_pool(&self) -> Option<&PostgresConfig> {
        self.replica.as_ref().or(self.primary.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const KEYS: &[&str] = &[
        "RESERVA_STORAGE_BACKEND",
        "RESERVA_PRIMARY_DATABASE_URL",
        "RESERVA_REPLICA_DATABASE_URL",
        "RESERVA_DB_MAX_CONNECTIONS",
        "RESERVA_OP_TIMEOUT_MS",
        "RESERVA_CARD_PREFIX",
        "RESERVA_CONFIG",
    ];

    struct EnvGuard {
        saved: Vec<(&'static str, Option<String>)>,
    }

    impl EnvGuard {
        fn clean() -> Self {
            let saved = KEYS
                .iter()
                .map(|key| (*key, std::env::var(key).ok()))
                .collect();
            for key in KEYS {
                unsafe {
                    std::env::remove_var(key);
                }
            }
            Self { saved }
        }

        fn set(&self, key: &'static str, value: &str) {
            unsafe {
                std::env::set_var(key, value);
            }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in &self.saved {
                match value {
                    Some(value) => unsafe {
                        std::env::set_var(key, value);
                    },
                    None => unsafe {
                        std::env::remove_var(key);
                    },
                }
            }
        }
    }

    #[test]
    #[serial]
    fn defaults_to_memory() {
        let _env = EnvGuard::clean();
        let config = DatastoreConfig::from_env().expect("config");
        assert_eq!(config.storage, StorageBackend::Memory);
        assert!(config.primary.is_none());
        assert_eq!(config.op_timeout(), Duration::from_secs(3));
        assert_eq!(config.card_prefix, CardPrefix::default());
        assert_eq!(config.password_cost, PasswordCost::default());
    }

    #[test]
    #[serial]
    fn postgres_requires_primary_url() {
        let env = EnvGuard::clean();
        env.set("RESERVA_STORAGE_BACKEND", "postgres");
        assert!(DatastoreConfig::from_env().is_err());

        env.set("RESERVA_PRIMARY_DATABASE_URL", "postgres://localhost/reserva");
        env.set("RESERVA_DB_MAX_CONNECTIONS", "7");
        let config = DatastoreConfig::from_env().expect("config");
        let read = config.read_pool().expect("read pool");
        assert_eq!(read.url, "postgres://localhost/reserva");
        assert_eq!(read.max_connections, 7);
    }

    #[test]
    #[serial]
    fn bad_values_name_the_variable() {
        let env = EnvGuard::clean();
        env.set("RESERVA_OP_TIMEOUT_MS", "soon");
        let err = DatastoreConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("RESERVA_OP_TIMEOUT_MS"));

        env.set("RESERVA_OP_TIMEOUT_MS", "100");
        env.set("RESERVA_CARD_PREFIX", "12");
        assert!(DatastoreConfig::from_env().is_err());
    }

    #[test]
    #[serial]
    fn yaml_overrides_env() {
        let env = EnvGuard::clean();
        env.set("RESERVA_PRIMARY_DATABASE_URL", "postgres://primary/reserva");
        let mut config = DatastoreConfig::from_env().expect("config");
        config
            .apply_yaml(
                r#"
storage: postgres
replica:
  url: postgres://replica/reserva
  max_connections: 4
op_timeout_ms: 1500
card_prefix: "510000"
password_cost:
  memory_kib: 1024
  iterations: 1
  parallelism: 1
"#,
            )
            .expect("yaml");
        assert_eq!(config.storage, StorageBackend::Postgres);
        let replica = config.read_pool().expect("replica");
        assert_eq!(replica.url, "postgres://replica/reserva");
        assert_eq!(replica.max_connections, 4);
        assert_eq!(config.op_timeout_ms, 1500);
        assert_eq!(config.card_prefix.to_string(), "510000");
        assert_eq!(config.password_cost.memory_kib, 1024);
    }

    #[test]
    fn debug_hides_database_url() {
        let rendered = format!("{:?}", PostgresConfig::with_url("postgres://user:secret@db/x"));
        assert!(!rendered.contains("secret"));
    }
}
