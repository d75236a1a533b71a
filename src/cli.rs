use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "logctl", version, about = "Log control plane aggregator")]
pub struct Cli {
    /// Configuration file path (default: ./logctl.toml if present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the aggregator HTTP server (default)
    Serve,

    /// Test configuration file validity
    Test,

    /// List control endpoints found in the base directory
    Discover {
        /// Subsystem to list: log or stats
        #[arg(short, long, default_value = "log")]
        subsystem: String,

        /// Dial each endpoint and report whether it answers
        #[arg(short, long)]
        probe: bool,
    },

    /// Send one raw request to a module's control endpoint
    Send {
        /// Module name
        module: String,

        /// Request text, e.g. `level:debug` or `rotate:`
        request: String,

        /// Subsystem of the endpoint: log or stats
        #[arg(short, long, default_value = "log")]
        subsystem: String,
    },

    /// Show version information
    Version,
}

impl Cli {
    /// Get the command to execute, defaulting to Serve if none provided
    pub fn get_command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Serve)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_command_is_serve() {
        let cli = Cli {
            config: None,
            command: None,
        };
        assert!(matches!(cli.get_command(), Commands::Serve));
    }

    #[test]
    fn test_cli_parsing_discover() {
        let cli = Cli::try_parse_from(["logctl", "discover", "--subsystem", "stats", "--probe"]).unwrap();

        match cli.get_command() {
            Commands::Discover { subsystem, probe } => {
                assert_eq!(subsystem, "stats");
                assert!(probe);
            }
            _ => panic!("Expected Discover command"),
        }
    }

    #[test]
    fn test_cli_parsing_send_with_config() {
        let cli = Cli::try_parse_from(["logctl", "send", "svc", "level:debug", "-c", "custom.toml"]).unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("custom.toml")));
        match cli.get_command() {
            Commands::Send {
                module,
                request,
                subsystem,
            } => {
                assert_eq!(module, "svc");
                assert_eq!(request, "level:debug");
                assert_eq!(subsystem, "log");
            }
            _ => panic!("Expected Send command"),
        }
    }
}
