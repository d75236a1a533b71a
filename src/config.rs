use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::engine::{EngineSettings, Severity, TraceSettings};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub aggregator: AggregatorConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// `text` or `json`
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AggregatorConfig {
    /// Directory holding control endpoints and log files
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,
    /// Bound on each dial and reply from a control endpoint
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Module name of the aggregator's own log engine
    #[serde(default = "default_module")]
    pub module: String,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            request_timeout_ms: default_request_timeout_ms(),
            module: default_module(),
        }
    }
}

impl AggregatorConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub level: Severity,
    #[serde(default = "default_lock_retries")]
    pub lock_retries: u32,
    #[serde(default = "default_lock_retry_interval_ms")]
    pub lock_retry_interval_ms: u64,
    #[serde(default = "default_reaper_interval_secs")]
    pub reaper_interval_secs: u64,
    /// Messages since a trace entry's last write before it is evicted
    #[serde(default = "default_reaper_idle_threshold")]
    pub reaper_idle_threshold: u64,
    #[serde(default = "default_alarm_queue_capacity")]
    pub alarm_queue_capacity: usize,
    #[serde(default = "default_alarm_timeout_secs")]
    pub alarm_timeout_secs: u64,
    #[serde(default = "default_control_read_timeout_ms")]
    pub control_read_timeout_ms: u64,
    /// Write `{base_dir}/{module}.log` instead of stderr
    #[serde(default = "default_true")]
    pub log_to_file: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            level: Severity::default(),
            lock_retries: default_lock_retries(),
            lock_retry_interval_ms: default_lock_retry_interval_ms(),
            reaper_interval_secs: default_reaper_interval_secs(),
            reaper_idle_threshold: default_reaper_idle_threshold(),
            alarm_queue_capacity: default_alarm_queue_capacity(),
            alarm_timeout_secs: default_alarm_timeout_secs(),
            control_read_timeout_ms: default_control_read_timeout_ms(),
            log_to_file: true,
        }
    }
}

impl EngineConfig {
    /// Engine settings writing into `log_dir`
    pub fn settings(&self, log_dir: &Path) -> EngineSettings {
        EngineSettings {
            level: self.level,
            log_dir: log_dir.to_path_buf(),
            trace: TraceSettings {
                lock_retries: self.lock_retries,
                lock_retry_interval: Duration::from_millis(self.lock_retry_interval_ms),
                reaper_interval: Duration::from_secs(self.reaper_interval_secs),
                idle_threshold: self.reaper_idle_threshold,
            },
            alarm_queue_capacity: self.alarm_queue_capacity,
            alarm_timeout: Duration::from_secs(self.alarm_timeout_secs),
        }
    }

    pub fn control_read_timeout(&self) -> Duration {
        Duration::from_millis(self.control_read_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_metrics_path(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_base_dir() -> PathBuf {
    std::env::temp_dir()
}

fn default_request_timeout_ms() -> u64 {
    5000
}

fn default_module() -> String {
    "Aggregator".to_string()
}

fn default_lock_retries() -> u32 {
    10
}

fn default_lock_retry_interval_ms() -> u64 {
    10
}

fn default_reaper_interval_secs() -> u64 {
    5
}

fn default_reaper_idle_threshold() -> u64 {
    300
}

fn default_alarm_queue_capacity() -> usize {
    1024
}

fn default_alarm_timeout_secs() -> u64 {
    10
}

fn default_control_read_timeout_ms() -> u64 {
    2000
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

fn default_true() -> bool {
    true
}

/// Load `logctl.toml` (or `path`) layered under `LOGCTL__*` environment
/// variables, then validate.
///
/// The default file is optional; an explicit `path` must exist.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let file = match path {
        Some(path) => config::File::from(path).required(true),
        None => config::File::with_name("logctl").required(false),
    };

    let config = config::Config::builder()
        .add_source(file)
        .add_source(config::Environment::with_prefix("LOGCTL").separator("__"))
        .build()?;

    let cfg: Config = config.try_deserialize()?;
    validate_config(&cfg)?;

    Ok(cfg)
}

pub fn validate_config(cfg: &Config) -> anyhow::Result<()> {
    if cfg.aggregator.module.trim().is_empty() {
        anyhow::bail!("aggregator.module cannot be empty");
    }
    if cfg.server.port == 0 {
        anyhow::bail!("server.port must be greater than 0");
    }
    if !matches!(cfg.server.log_format.as_str(), "text" | "json") {
        anyhow::bail!(
            "server.log_format must be 'text' or 'json', got '{}'",
            cfg.server.log_format
        );
    }
    if cfg.aggregator.request_timeout_ms == 0 {
        anyhow::bail!("aggregator.request_timeout_ms must be greater than 0");
    }
    if !cfg.aggregator.base_dir.is_dir() {
        anyhow::bail!(
            "aggregator.base_dir '{}' is not a directory",
            cfg.aggregator.base_dir.display()
        );
    }

    let engine = &cfg.engine;
    if engine.lock_retries == 0 || engine.lock_retry_interval_ms == 0 {
        anyhow::bail!("engine.lock_retries and engine.lock_retry_interval_ms must be greater than 0");
    }
    if engine.reaper_interval_secs == 0 || engine.reaper_idle_threshold == 0 {
        anyhow::bail!("engine.reaper_interval_secs and engine.reaper_idle_threshold must be greater than 0");
    }
    if engine.alarm_queue_capacity == 0 {
        anyhow::bail!("engine.alarm_queue_capacity must be greater than 0");
    }
    if engine.control_read_timeout_ms == 0 {
        anyhow::bail!("engine.control_read_timeout_ms must be greater than 0");
    }

    if cfg.metrics.enabled && !cfg.metrics.path.starts_with('/') {
        anyhow::bail!("metrics.path must start with '/', got '{}'", cfg.metrics.path);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = Config::default();
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.aggregator.module, "Aggregator");
        assert_eq!(cfg.engine.level, Severity::Warn);
        assert_eq!(cfg.engine.lock_retries, 10);
        assert_eq!(cfg.engine.reaper_idle_threshold, 300);
        validate_config(&cfg).unwrap();
    }

    #[test]
    fn test_validation_failures() {
        let mut cfg = Config::default();
        cfg.aggregator.module = " ".to_string();
        assert!(validate_config(&cfg).is_err());

        let mut cfg = Config::default();
        cfg.server.log_format = "xml".to_string();
        assert!(validate_config(&cfg).is_err());

        let mut cfg = Config::default();
        cfg.aggregator.base_dir = PathBuf::from("/definitely/not/here");
        assert!(validate_config(&cfg).is_err());

        let mut cfg = Config::default();
        cfg.engine.lock_retries = 0;
        assert!(validate_config(&cfg).is_err());

        let mut cfg = Config::default();
        cfg.metrics.path = "metrics".to_string();
        assert!(validate_config(&cfg).is_err());
    }

    #[test]
    fn test_engine_settings_conversion() {
        let cfg = EngineConfig {
            lock_retry_interval_ms: 25,
            reaper_interval_secs: 7,
            ..EngineConfig::default()
        };
        let settings = cfg.settings(Path::new("/var/log"));
        assert_eq!(settings.log_dir, PathBuf::from("/var/log"));
        assert_eq!(settings.trace.lock_retry_interval, Duration::from_millis(25));
        assert_eq!(settings.trace.reaper_interval, Duration::from_secs(7));
        assert_eq!(settings.trace.idle_threshold, 300);
    }
}
