//! Configuration management CLI commands.

use std::path::Path;

use clap::Subcommand;
use orthopaint::config::ConfigFile;

use super::common::{config_path, load_config};
use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Write a commented default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration
    Show,

    /// Show the configuration file path
    Path,
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands, cli_path: Option<&Path>) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init { force } => run_init(cli_path, force),
        ConfigCommands::Show => run_show(cli_path),
        ConfigCommands::Path => {
            println!("{}", config_path(cli_path).display());
            Ok(())
        }
    }
}

fn run_init(cli_path: Option<&Path>, force: bool) -> Result<(), CliError> {
    let path = config_path(cli_path);
    if path.exists() && !force {
        return Err(CliError::Config(format!(
            "{} already exists, use --force to overwrite it",
            path.display()
        )));
    }

    ConfigFile::default().save_to(&path)?;

    println!("Configuration file: {}", path.display());
    println!();
    println!("Edit this file to choose the imagery source and tool paths.");
    println!("CLI arguments override config file values when specified.");
    Ok(())
}

fn run_show(cli_path: Option<&Path>) -> Result<(), CliError> {
    let path = config_path(cli_path);
    let config = load_config(cli_path)?;
    let source = if path.exists() {
        path.display().to_string()
    } else {
        format!("defaults ({} not found)", path.display())
    };

    let opt = |v: &Option<String>| v.clone().unwrap_or_else(|| "(not set)".to_string());

    println!("Configuration: {}", source);
    println!();
    println!("[general]");
    println!("  cache_dir       = {}", config.general.cache_dir.display());
    println!("  work_dir        = {}", config.general.work_dir.display());
    println!("  keep_temp_files = {}", config.general.keep_temp_files);
    println!("  target_crs      = {}", config.general.target_crs);
    println!("  workers         = {}", config.general.workers);
    println!("  margin_m        = {}", config.general.margin_m);
    println!();
    println!("[protocol]");
    println!("  type       = {}", config.protocol.kind);
    println!("  url        = {}", config.protocol.url);
    println!("  layer      = {}", config.protocol.layer);
    println!("  style      = {}", opt(&config.protocol.style));
    println!("  matrix_set = {}", config.protocol.matrix_set);
    println!("  zoom       = {}", config.protocol.zoom);
    println!("  format     = {}", opt(&config.protocol.format));
    println!("  crs        = {}", opt(&config.protocol.crs));
    println!("  template   = {}", opt(&config.protocol.template));
    println!();
    println!("[download]");
    println!("  timeout          = {}", config.download.timeout);
    println!("  request_delay_ms = {}", config.download.request_delay_ms);
    println!();
    println!("[tools]");
    println!("  gdal_translate = {}", config.tools.gdal_translate.display());
    println!("  gdalwarp       = {}", config.tools.gdalwarp.display());
    println!("  pdal           = {}", config.tools.pdal.display());
    Ok(())
}
