use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "fleetsim",
    version,
    about = "Fleet Simulator - virtual devices for OTA servers",
    long_about = None
)]
pub struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config/fleetsim.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Run the fleet until SIGINT or SIGTERM (default)
    Run,
    /// Show device counts and deployments still in flight
    Status {
        #[arg(short, long, default_value = "false")]
        json: bool,
    },
    /// Remove a device and its deployment history from the database
    Remove {
        /// Device id, e.g. VIN-automotive-000001
        device_id: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_is_the_default() {
        let cli = Cli::try_parse_from(["fleetsim"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("config/fleetsim.toml"));
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_status_and_remove() {
        let cli = Cli::try_parse_from(["fleetsim", "-c", "/etc/fleetsim.toml", "status", "--json"])
            .unwrap();
        assert_eq!(cli.config, PathBuf::from("/etc/fleetsim.toml"));
        assert_eq!(cli.command, Some(Commands::Status { json: true }));

        let cli = Cli::try_parse_from(["fleetsim", "remove", "DEV-generic-000003"]).unwrap();
        assert_eq!(
            cli.command,
            Some(Commands::Remove {
                device_id: "DEV-generic-000003".to_string()
            })
        );
    }
}
