use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

use super::{create_router, AppState, Discovery, MetricsRoute};
use crate::config::Config;
use crate::control::{platform_transport, serve_log_channel, serve_stats_channel, ControlClient};
use crate::engine::LogEngine;
use crate::signals::setup_signal_handlers;
use crate::stats::StatsCollector;

/// Start the aggregator
///
/// This function:
/// 1. Creates the aggregator's own log engine and binds its control endpoints
/// 2. Sets up signal handlers for graceful shutdown and log rotation
/// 3. Binds to the configured address
/// 4. Serves requests until a shutdown signal, then removes its endpoints
pub async fn start_server(config: Config) -> Result<()> {
    crate::init_tracing(&config.server.log_level, &config.server.log_format);
    info!("logctl aggregator starting...");

    let base_dir = config.aggregator.base_dir.clone();
    let module = config.aggregator.module.clone();

    let engine = LogEngine::new(&module, config.engine.settings(&base_dir))
        .context("Failed to create the aggregator log engine")?;
    engine.enable_keys([module.as_str(), "Logger", "Stats"]);
    if config.engine.log_to_file {
        let path = engine
            .open_module_file()
            .context("Failed to open the aggregator log file")?;
        info!(path = ?path, "Aggregator log file opened");
    }

    let stats = Arc::new(StatsCollector::new(&module)?);

    let transport = platform_transport();
    let read_timeout = config.engine.control_read_timeout();
    let log_channel = serve_log_channel(&engine, &base_dir, transport.clone(), read_timeout)
        .await
        .context("Failed to bind the aggregator log endpoint")?;
    let stats_channel = serve_stats_channel(stats.clone(), &base_dir, transport.clone(), read_timeout)
        .await
        .context("Failed to bind the aggregator stats endpoint")?;

    let metrics = if config.metrics.enabled {
        match crate::metrics::init_metrics() {
            Ok(handle) => Some(MetricsRoute {
                path: config.metrics.path.clone(),
                handle,
            }),
            Err(e) => {
                warn!(error = %e, "Metrics disabled");
                None
            }
        }
    } else {
        None
    };

    let state = AppState::new(
        Discovery::new(&base_dir),
        ControlClient::new(transport, config.aggregator.request_timeout()),
        engine.clone(),
        stats,
    )?;
    let app = create_router(state, metrics);

    let (shutdown_tx, signal_handle) = setup_signal_handlers(engine.clone());
    let mut shutdown_rx = shutdown_tx.subscribe();

    let addr = SocketAddr::from((
        config.server.host.parse::<std::net::IpAddr>()?,
        config.server.port,
    ));

    info!("Starting logctl aggregator on {}", addr);
    info!(
        "Configuration: base_dir {}, module {}, request timeout {}ms",
        base_dir.display(),
        module,
        config.aggregator.request_timeout_ms
    );
    engine
        .info("", &module, format!("Aggregator started on {}", addr))
        .await;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
            info!("Shutdown signal received, draining connections...");
        })
        .await?;

    signal_handle.await?;

    log_channel.shutdown().await;
    stats_channel.shutdown().await;
    engine.shutdown().await;
    info!("Aggregator stopped gracefully");

    Ok(())
}
