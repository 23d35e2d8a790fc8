//! orthopaint CLI - Command-line interface
//!
//! Colorizes IGN lidar tiles with orthophotos fetched from WMTS, WMS or XYZ
//! tile servers.

mod commands;
mod error;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use commands::cache::CacheAction;
use commands::colorize::ColorizeArgs;
use commands::config::ConfigCommands;
use error::CliError;

#[derive(Parser)]
#[command(name = "orthopaint")]
#[command(version = orthopaint::VERSION)]
#[command(about = "Colorize lidar point clouds with aerial imagery", long_about = None)]
struct Cli {
    /// Configuration file (default: ~/.orthopaint/config.ini)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Colorize lidar tiles with imagery covering each 1 km cell
    Colorize(ColorizeArgs),

    /// Manage the tile cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = dispatch(cli) {
        e.exit();
    }
}

fn dispatch(cli: Cli) -> Result<(), CliError> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Colorize(args) => {
            let config = commands::common::load_config(config_path)?;
            commands::colorize::run(args, config)
        }
        Commands::Cache { action } => {
            let config = commands::common::load_config(config_path)?;
            commands::cache::run(action, &config)
        }
        Commands::Config { command } => commands::config::run(command, config_path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_colorize() {
        let cli = Cli::parse_from([
            "orthopaint",
            "colorize",
            "--zoom",
            "18",
            "--protocol",
            "template",
            "--keep-temp",
            "a_2021_0650_6860_LA93_x.laz",
            "b_2021_0651_6860_LA93_x.laz",
        ]);
        match cli.command {
            Commands::Colorize(args) => {
                assert_eq!(args.files.len(), 2);
                assert_eq!(args.zoom, Some(18));
                assert!(args.keep_temp);
            }
            _ => panic!("expected colorize"),
        }
    }

    #[test]
    fn test_parse_cache_migrate() {
        let cli = Cli::parse_from([
            "orthopaint",
            "--config",
            "/tmp/c.ini",
            "cache",
            "migrate",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.ini")));
        assert!(matches!(
            cli.command,
            Commands::Cache {
                action: CacheAction::Migrate
            }
        ));
    }

    #[test]
    fn test_colorize_requires_files() {
        assert!(Cli::try_parse_from(["orthopaint", "colorize"]).is_err());
    }
}
