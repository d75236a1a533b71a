use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;

use logctl::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let config_path = args.config.as_deref();

    // `serve` initializes tracing itself, from the loaded configuration
    if !matches!(args.get_command(), cli::Commands::Serve) {
        init_tracing("warn", "text");
    }

    match args.get_command() {
        cli::Commands::Serve => {
            commands::serve::execute(config_path).await?;
        }
        cli::Commands::Test => {
            commands::test::execute(config_path)?;
        }
        cli::Commands::Discover { subsystem, probe } => {
            commands::discover::execute(config_path, &subsystem, probe).await?;
        }
        cli::Commands::Send {
            module,
            request,
            subsystem,
        } => {
            commands::send::execute(config_path, &module, &request, &subsystem).await?;
        }
        cli::Commands::Version => {
            println!("logctl v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
