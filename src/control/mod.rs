//! Local control channels.
//!
//! Each process exposes one endpoint per subsystem in a shared directory.
//! A connection carries one `verb:arg` request and one reply.

pub mod channel;
pub mod client;
pub mod log_handler;
pub mod protocol;
pub mod stats_handler;
pub mod transport;

pub use channel::{CommandHandler, ControlChannel, Reply};
pub use client::ControlClient;
pub use log_handler::LogControl;
pub use protocol::{ControlCommand, Subsystem, RESPONSE_OK};
pub use stats_handler::StatsControl;
pub use transport::{platform_transport, BoxedStream, LocalEndpoint};

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::engine::LogEngine;
use crate::error::Result;
use crate::stats::StatsCollector;

/// Bind `{dir}/log_{module}.sock` for `engine`
pub async fn serve_log_channel(
    engine: &LogEngine,
    dir: &Path,
    transport: Arc<dyn LocalEndpoint>,
    read_timeout: Duration,
) -> Result<ControlChannel> {
    let handler = Arc::new(LogControl::new(engine.clone()));
    ControlChannel::bind(handler, engine.module(), dir, transport, read_timeout).await
}

/// Bind `{dir}/stats_{module}.sock` for `stats`
pub async fn serve_stats_channel(
    stats: Arc<StatsCollector>,
    dir: &Path,
    transport: Arc<dyn LocalEndpoint>,
    read_timeout: Duration,
) -> Result<ControlChannel> {
    let module = stats.module().to_string();
    let handler = Arc::new(StatsControl::new(stats));
    ControlChannel::bind(handler, &module, dir, transport, read_timeout).await
}
