//! HTTP front end that discovers control endpoints on the host and relays
//! commands to one module or to all of them.

pub mod discovery;
pub mod fanout;
pub mod handlers;
pub mod server;
pub mod stream;

pub use discovery::{Discovery, Endpoint};
pub use fanout::{fan_out, FanOutReport};
pub use server::start_server;

use axum::{routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::control::ControlClient;
use crate::engine::LogEngine;
use crate::error::Result;
use crate::stats::StatsCollector;

/// Shared state of the aggregator handlers
#[derive(Debug, Clone)]
pub struct AppState {
    pub discovery: Discovery,
    pub client: ControlClient,
    /// The aggregator's own log engine
    pub engine: LogEngine,
    pub stats: Arc<StatsCollector>,
}

impl AppState {
    /// Build the state and register the request counters on `stats`
    pub fn new(
        discovery: Discovery,
        client: ControlClient,
        engine: LogEngine,
        stats: Arc<StatsCollector>,
    ) -> Result<Self> {
        for key in ["logger_requests", "stats_requests"] {
            if stats.get(key).is_none() {
                stats.add_key(key, 0i64)?;
            }
        }
        Ok(Self {
            discovery,
            client,
            engine,
            stats,
        })
    }
}

/// Prometheus scrape route
#[derive(Clone)]
pub struct MetricsRoute {
    pub path: String,
    pub handle: PrometheusHandle,
}

pub fn create_router(state: AppState, metrics: Option<MetricsRoute>) -> Router {
    let mut app = Router::new()
        .route("/health", get(handlers::health_check))
        .route(
            "/logger/:module",
            get(handlers::logger_command)
                .put(handlers::logger_command)
                .post(handlers::logger_command),
        )
        .route(
            "/stats/:module",
            get(handlers::stats_command)
                .put(handlers::stats_command)
                .post(handlers::stats_command),
        )
        .with_state(state);

    if let Some(MetricsRoute { path, handle }) = metrics {
        app = app.route(&path, get(move || async move { handle.render() }));
    }

    app.layer(TraceLayer::new_for_http())
}
