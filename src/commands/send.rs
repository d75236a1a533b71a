use anyhow::{anyhow, Context, Result};
use std::path::Path;

use logctl::aggregator::discovery::is_safe_name;
use logctl::config;
use logctl::control::{platform_transport, ControlClient, Subsystem};

/// Execute the send command
///
/// Dials `{base_dir}/{subsystem}_{module}.sock`, sends `request` and prints
/// the reply as received
pub async fn execute(
    config_path: Option<&Path>,
    module: &str,
    request: &str,
    subsystem: &str,
) -> Result<()> {
    let cfg = config::load_config(config_path)?;
    let subsystem: Subsystem = subsystem.parse().map_err(|e: String| anyhow!(e))?;
    if !is_safe_name(module) {
        anyhow::bail!("Invalid module name '{}'", module);
    }

    let marker = subsystem.marker_path(&cfg.aggregator.base_dir, module);
    let client = ControlClient::new(platform_transport(), cfg.aggregator.request_timeout());

    let reply = client
        .send(&marker, request)
        .await
        .with_context(|| format!("Module {} not reachable", module))?;
    println!("{}", reply);
    Ok(())
}
