pub mod aggregator;
pub mod config;
pub mod control;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod signals;
pub mod stats;

pub use engine::{EngineSettings, LogEngine, Severity};
pub use error::{Error, Result};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize tracing/logging
///
/// `RUST_LOG` overrides `level`. `format` is `text` or `json`. A second call
/// is a no-op.
pub fn init_tracing(level: &str, format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(filter);
    let _ = if format == "json" {
        registry.with(fmt::layer().json().with_target(true)).try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    };
}
