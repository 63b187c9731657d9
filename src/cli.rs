use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "pincast")]
#[command(about = "Podcast hosting agent for a local IPFS node", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Poll the coordinator and execute jobs until interrupted
    Run(ConfigArgs),
    /// Print node status and repo usage once
    Status(ConfigArgs),
}

#[derive(clap::Args, Debug)]
pub struct ConfigArgs {
    /// Configuration file (defaults to $PINCAST_CONFIG or config/pincast.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_with_config() {
        let cli = Cli::try_parse_from(["pincast", "run", "--config", "/etc/pincast.toml"]).unwrap();
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.config, Some(PathBuf::from("/etc/pincast.toml")))
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_status_defaults() {
        let cli = Cli::try_parse_from(["pincast", "status"]).unwrap();
        assert!(matches!(cli.command, Commands::Status(ConfigArgs { config: None })));
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Cli::try_parse_from(["pincast"]).is_err());
    }
}
