//! Observability utilities.

use std::sync::OnceLock;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::types::ObservabilityConfig;

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Initialize tracing subscriber once for the process.
///
/// Logs go to stderr. Format defaults to plain text and can be switched to JSON via
/// `TOOLDOCK_LOG_FORMAT=json`. Filter defaults to `info` if `RUST_LOG` is unset.
pub fn init_tracing() {
    let json = std::env::var("TOOLDOCK_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    install("info", json);
}

/// Initialize tracing from config. `RUST_LOG` still wins over `log_level`.
pub fn init_tracing_with(config: &ObservabilityConfig) {
    install(&config.log_level, config.json_logs);
}

fn install(default_level: &str, json: bool) {
    TRACING_INIT.get_or_init(|| {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_level));

        let result = if json {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .try_init()
        } else {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .try_init()
        };

        if let Err(err) = result {
            eprintln!("tracing init skipped: {err}");
        }
    });
}
