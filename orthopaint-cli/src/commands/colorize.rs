//! Colorize command - paint lidar tiles with aerial imagery.

use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use orthopaint::cache::TileCache;
use orthopaint::config::{ConfigFile, ProtocolKind};
use orthopaint::coord::MAX_ZOOM;
use orthopaint::crs::default_transform;
use orthopaint::logging::{default_log_dir, default_log_file, init_logging};
use orthopaint::orchestrator::{cell_from_path, Orchestrator, ProcessRunner, RunSummary};
use orthopaint::provider::{ProviderFactory, ReqwestClient};

use super::common::ProtocolArg;
use crate::error::CliError;

/// Arguments of `orthopaint colorize`.
#[derive(Debug, Args)]
pub struct ColorizeArgs {
    /// IGN lidar tiles (`*_XXXX_YYYY_LA93_*.laz`)
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Tile zoom level (wmts, template)
    #[arg(long)]
    pub zoom: Option<u8>,

    /// Imagery protocol
    #[arg(long, value_enum)]
    pub protocol: Option<ProtocolArg>,

    /// Service endpoint (wmts, wms)
    #[arg(long)]
    pub url: Option<String>,

    /// Layer name; also the tile cache namespace
    #[arg(long)]
    pub layer: Option<String>,

    /// URL template with {z} {x} {y} placeholders (template)
    #[arg(long)]
    pub template: Option<String>,

    /// Keep intermediate rasters and PDAL pipelines
    #[arg(long)]
    pub keep_temp: bool,

    /// Cells processed in parallel
    #[arg(long)]
    pub workers: Option<usize>,

    /// Directory for intermediate and output files
    #[arg(long)]
    pub work_dir: Option<PathBuf>,

    /// Send log output to stderr instead of stdout
    #[arg(long)]
    pub quiet: bool,
}

/// Overlay command-line values on the loaded configuration.
pub fn apply_overrides(config: &mut ConfigFile, args: &ColorizeArgs) -> Result<(), CliError> {
    if let Some(protocol) = args.protocol {
        config.protocol.kind = ProtocolKind::from(protocol);
    }
    if let Some(zoom) = args.zoom {
        if zoom > MAX_ZOOM {
            return Err(CliError::Config(format!(
                "zoom {} is out of range (0-{})",
                zoom, MAX_ZOOM
            )));
        }
        config.protocol.zoom = zoom;
    }
    if let Some(url) = &args.url {
        config.protocol.url = url.clone();
    }
    if let Some(layer) = &args.layer {
        config.protocol.layer = layer.clone();
    }
    if let Some(template) = &args.template {
        config.protocol.template = Some(template.clone());
    }
    if let Some(workers) = args.workers {
        if workers == 0 {
            return Err(CliError::Config("--workers must be at least 1".to_string()));
        }
        config.general.workers = workers;
    }
    if let Some(dir) = &args.work_dir {
        config.general.work_dir = dir.clone();
    }
    if args.keep_temp {
        config.general.keep_temp_files = true;
    }
    Ok(())
}

/// Run the colorize command.
pub fn run(args: ColorizeArgs, mut config: ConfigFile) -> Result<(), CliError> {
    apply_overrides(&mut config, &args)?;

    let _logging_guard = init_logging(Path::new(default_log_dir()), default_log_file(), args.quiet)
        .map_err(|e| CliError::LoggingInit(e.to_string()))?;
    info!("orthopaint v{}", orthopaint::VERSION);

    let provider = config.provider_config()?;
    info!(
        protocol = provider.name(),
        layer = provider.layer(),
        zoom = ?provider.zoom(),
        "Imagery source"
    );

    let client =
        ReqwestClient::with_timeout(config.download.timeout).map_err(CliError::HttpClient)?;
    let handler = ProviderFactory::new(
        Arc::new(client),
        Arc::new(TileCache::new(config.general.cache_dir.clone())),
        default_transform(),
        config.fetch_settings(),
    )
    .create(&provider);

    let cells = args
        .files
        .iter()
        .filter(|f| cell_from_path(f).is_some())
        .count();
    let progress = progress_bar(cells as u64);
    let bar = progress.clone();

    let orchestrator = Orchestrator::new(
        handler,
        Arc::new(ProcessRunner),
        config.orchestrator_settings(provider.zoom()),
    )
    .with_progress(move |p| {
        bar.set_message(p.cell.to_string());
        bar.inc(1);
    });

    let cancel = orchestrator.cancel_flag();
    ctrlc::set_handler(move || {
        cancel.store(true, Ordering::SeqCst);
    })
    .map_err(|e| CliError::Config(format!("Failed to set signal handler: {}", e)))?;

    let result = orchestrator.run(&args.files);
    progress.finish_and_clear();
    let summary = result?;

    print_summary(&summary);
    if summary.is_success() {
        Ok(())
    } else {
        Err(CliError::CellsFailed {
            failed: summary.failed.len(),
            total: summary.processed.len() + summary.failed.len(),
        })
    }
}

fn progress_bar(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    let style = ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} cells {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");
    pb.set_style(style);
    pb
}

fn print_summary(summary: &RunSummary) {
    println!();
    println!("Colorized {} cells", summary.processed.len());
    for outcome in &summary.processed {
        if outcome.placeholders > 0 {
            println!(
                "  {} ({} placeholder tiles)",
                outcome.output.display(),
                outcome.placeholders
            );
        } else {
            println!("  {}", outcome.output.display());
        }
    }
    if !summary.skipped.is_empty() {
        println!("Skipped {} files without Lambert-93 cell coordinates:", summary.skipped.len());
        for path in &summary.skipped {
            println!("  {}", path.display());
        }
    }
    if !summary.failed.is_empty() {
        println!("Failed {} cells:", summary.failed.len());
        for failure in &summary.failed {
            println!("  {} ({}): {}", failure.cell, failure.input.display(), failure.error);
        }
    }
}
