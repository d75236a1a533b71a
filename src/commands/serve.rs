use anyhow::Result;
use std::path::Path;

use logctl::{aggregator, config};

/// Execute the serve command
pub async fn execute(config_path: Option<&Path>) -> Result<()> {
    let cfg = config::load_config(config_path)?;
    aggregator::start_server(cfg).await
}
