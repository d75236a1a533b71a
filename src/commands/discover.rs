use anyhow::{anyhow, Result};
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use std::path::Path;

use logctl::aggregator::Discovery;
use logctl::config;
use logctl::control::{platform_transport, ControlClient, Subsystem};

/// Execute the discover command
///
/// Lists every control endpoint of `subsystem` in the base directory,
/// optionally dialing each one
pub async fn execute(config_path: Option<&Path>, subsystem: &str, probe: bool) -> Result<()> {
    let cfg = config::load_config(config_path)?;
    let subsystem: Subsystem = subsystem.parse().map_err(|e: String| anyhow!(e))?;

    let discovery = Discovery::new(&cfg.aggregator.base_dir);
    let endpoints = discovery.endpoints(subsystem)?;

    if endpoints.is_empty() {
        println!(
            "{} {}",
            "No endpoints found for pattern".yellow(),
            discovery.pattern(&subsystem.glob("*"))
        );
        return Ok(());
    }

    let client = ControlClient::new(platform_transport(), cfg.aggregator.request_timeout());

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    let mut header = vec![
        Cell::new("MODULE").fg(Color::Cyan),
        Cell::new("ENDPOINT").fg(Color::Cyan),
    ];
    if probe {
        header.push(Cell::new("STATUS").fg(Color::Cyan));
    }
    table.set_header(header);

    for endpoint in &endpoints {
        let mut row = vec![
            Cell::new(&endpoint.module),
            Cell::new(endpoint.marker.display().to_string()),
        ];
        if probe {
            let status = match client.transport().dial(&endpoint.marker).await {
                Ok(_) => Cell::new("live").fg(Color::Green),
                Err(e) => Cell::new(format!("stale: {}", e)).fg(Color::Red),
            };
            row.push(status);
        }
        table.add_row(row);
    }

    println!("{}", table);
    println!("{} endpoint(s)", endpoints.len());
    Ok(())
}
