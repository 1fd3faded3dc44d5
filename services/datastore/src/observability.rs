//! Tracing setup for the datastore binary and tests.
//!
//! # Notes
//! Initialization is guarded by `OnceLock` so repeated calls (tests, embedders)
//! are harmless. Counters go through the `metrics` facade; with no recorder
//! installed they are no-ops.
use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Install a `fmt` subscriber filtered by `RUST_LOG` (default `info`).
pub fn init_tracing(service_name: &str) {
    TRACING_INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init();
        tracing::debug!(service = service_name, "tracing initialized");
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init_tracing("reserva-datastore");
        init_tracing("reserva-datastore");
        assert!(TRACING_INIT.get().is_some());
    }
}
