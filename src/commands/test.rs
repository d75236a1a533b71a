use anyhow::Result;
use colored::Colorize;
use std::path::Path;

use logctl::config;
use tracing::info;

/// Execute the test command
///
/// This validates the configuration without starting the aggregator
pub fn execute(config_path: Option<&Path>) -> Result<()> {
    println!("{}", "Testing configuration...".bold());
    info!("Loading and validating configuration");

    let cfg = config::load_config(config_path)?;

    println!("{}", "✓ Configuration test successful".green());
    println!();

    println!("{}", "Configuration Summary:".bold());
    println!("  {}: {}:{}", "Server", cfg.server.host, cfg.server.port);
    println!("  {}: {}", "Log Level", cfg.server.log_level);
    println!("  {}: {}", "Log Format", cfg.server.log_format);
    println!();

    println!("{}", "Aggregator:".bold());
    println!("  {}: {}", "Module", cfg.aggregator.module);
    println!("  {}: {}", "Base Directory", cfg.aggregator.base_dir.display());
    println!("  {}: {}ms", "Request Timeout", cfg.aggregator.request_timeout_ms);
    println!();

    let engine = &cfg.engine;
    println!("{}", "Engine:".bold());
    println!("  {}: {}", "Level", engine.level);
    println!(
        "  {}: {} x {}ms",
        "Trace Lock Retries", engine.lock_retries, engine.lock_retry_interval_ms
    );
    println!(
        "  {}: every {}s, idle after {} messages",
        "Reaper", engine.reaper_interval_secs, engine.reaper_idle_threshold
    );
    println!(
        "  {}: queue {}, timeout {}s",
        "Alarms", engine.alarm_queue_capacity, engine.alarm_timeout_secs
    );
    println!(
        "  {}: {}",
        "Output",
        if engine.log_to_file { "file" } else { "stderr" }
    );
    println!();

    println!(
        "  {}: {}",
        "Metrics",
        if cfg.metrics.enabled {
            "enabled".green()
        } else {
            "disabled".yellow()
        }
    );
    if cfg.metrics.enabled {
        println!("    Endpoint: {}", cfg.metrics.path);
    }

    info!("Configuration validation completed successfully");
    Ok(())
}
