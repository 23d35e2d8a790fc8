//! Cell-by-cell colorization runs.
//!
//! For every input point cloud the orchestrator:
//!
//! 1. derives the ground cell from the file name
//! 2. assembles the mosaic covering the cell plus margin
//! 3. georeferences it with `gdal_translate` in the protocol's CRS
//! 4. warps it into the point cloud's CRS with `gdalwarp` when they differ
//! 5. colorizes the point cloud with a PDAL pipeline
//! 6. removes the intermediate files
//!
//! Capabilities are discovered once before any cell runs. Cells run on a
//! rayon pool sharing one handler; a failed cell is recorded and the rest
//! continue.

mod cells;
mod pipeline;
mod tools;
mod types;

pub use cells::cell_from_path;
pub use pipeline::{ColorizationFilter, LasWriter, PdalPipeline, Stage};
pub use tools::{ProcessRunner, ToolPaths, ToolRunner};
pub use types::{
    CellError, CellFailure, CellJob, CellOutcome, CellProgress, OrchestratorError,
    OrchestratorSettings, RunSummary, DEFAULT_MARGIN_M,
};

use std::collections::HashMap;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, error, info, warn};

use crate::coord::GroundCell;
use crate::crs::CrsId;
use crate::mosaic::{Mosaic, MosaicAssembler};
use crate::provider::ProtocolHandler;

type ProgressCallback = Box<dyn Fn(CellProgress<'_>) + Send + Sync>;

/// Drives ground cells through mosaic assembly and the external tools.
pub struct Orchestrator {
    handler: Arc<dyn ProtocolHandler>,
    assembler: MosaicAssembler,
    tools: Arc<dyn ToolRunner>,
    settings: OrchestratorSettings,
    cancel: Arc<AtomicBool>,
    progress: Option<ProgressCallback>,
}

impl Orchestrator {
    pub fn new(
        handler: Arc<dyn ProtocolHandler>,
        tools: Arc<dyn ToolRunner>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            assembler: MosaicAssembler::new(Arc::clone(&handler)),
            handler,
            tools,
            settings,
            cancel: Arc::new(AtomicBool::new(false)),
            progress: None,
        }
    }

    /// Call `callback` after every cell, from the worker that ran it.
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(CellProgress<'_>) + Send + Sync + 'static,
    {
        self.progress = Some(Box::new(callback));
        self
    }

    /// Flag that stops the run before the next cell when set.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Split inputs into cell jobs and names without a ground cell.
    pub fn plan(inputs: &[PathBuf]) -> (Vec<CellJob>, Vec<PathBuf>) {
        let mut jobs = Vec::new();
        let mut skipped = Vec::new();
        let mut seen: HashMap<GroundCell, usize> = HashMap::new();

        for input in inputs {
            match cell_from_path(input) {
                Some(cell) => {
                    let count = seen.entry(cell).or_insert(0);
                    let mut stem = format!("{:04}_{:04}", cell.x_km, cell.y_km);
                    if *count > 0 {
                        warn!(
                            cell = %cell,
                            input = %input.display(),
                            "Cell already listed, output gets a suffix"
                        );
                        stem = format!("{}-{}", stem, count);
                    }
                    *count += 1;
                    jobs.push(CellJob {
                        input: input.clone(),
                        cell,
                        stem,
                    });
                }
                None => {
                    warn!(
                        input = %input.display(),
                        "Cannot extract Lambert-93 coordinates from file name, skipping"
                    );
                    skipped.push(input.clone());
                }
            }
        }
        (jobs, skipped)
    }

    /// Process every input.
    ///
    /// Returns `Err` only for run-level failures; per-cell failures are
    /// collected in [`RunSummary::failed`].
    pub fn run(&self, inputs: &[PathBuf]) -> Result<RunSummary, OrchestratorError> {
        let capabilities = self
            .handler
            .discover()
            .map_err(OrchestratorError::DiscoveryUnavailable)?;
        let native_crs = self
            .handler
            .native_crs()
            .map_err(OrchestratorError::DiscoveryUnavailable)?;
        info!(
            provider = self.handler.name(),
            layers = capabilities.layers.len(),
            crs = %native_crs,
            "Capabilities discovered"
        );

        let (jobs, skipped) = Self::plan(inputs);
        let mut summary = RunSummary {
            skipped,
            ..Default::default()
        };
        if jobs.is_empty() {
            return Ok(summary);
        }

        fs::create_dir_all(&self.settings.work_dir).map_err(|source| {
            OrchestratorError::WorkDir {
                path: self.settings.work_dir.clone(),
                source,
            }
        })?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.settings.workers.max(1))
            .thread_name(|i| format!("orthopaint-cell-{}", i))
            .build()
            .map_err(|e| OrchestratorError::WorkerPool(e.to_string()))?;

        let results: Vec<Option<Result<CellOutcome, CellError>>> = pool.install(|| {
            jobs.par_iter()
                .map(|job| {
                    if self.cancel.load(Ordering::SeqCst) {
                        return None;
                    }
                    let result = self.process_cell(job);
                    if let Some(callback) = &self.progress {
                        callback(CellProgress {
                            cell: &job.cell,
                            succeeded: result.is_ok(),
                        });
                    }
                    Some(result)
                })
                .collect()
        });

        let mut remaining = 0;
        for (job, result) in jobs.into_iter().zip(results) {
            match result {
                Some(Ok(outcome)) => summary.processed.push(outcome),
                Some(Err(error)) => {
                    error!(cell = %job.cell, input = %job.input.display(), error = %error, "Cell failed");
                    summary.failed.push(CellFailure {
                        input: job.input,
                        cell: job.cell,
                        error,
                    });
                }
                None => remaining += 1,
            }
        }

        if remaining > 0 {
            return Err(OrchestratorError::Cancelled {
                completed: summary.processed.len() + summary.failed.len(),
                remaining,
            });
        }

        info!(
            processed = summary.processed.len(),
            failed = summary.failed.len(),
            skipped = summary.skipped.len(),
            "Run complete"
        );
        Ok(summary)
    }

    fn process_cell(&self, job: &CellJob) -> Result<CellOutcome, CellError> {
        info!(cell = %job.cell, input = %job.input.display(), "Processing lidar cell");

        let mut temps = TempFiles::new(self.settings.keep_temp_files);
        let result = self.run_cell(job, &mut temps);
        temps.cleanup();
        result
    }

    fn run_cell(&self, job: &CellJob, temps: &mut TempFiles) -> Result<CellOutcome, CellError> {
        let cell = &job.cell;
        let mosaic = self.assembler.assemble(cell, self.settings.margin_m)?;
        let work = &self.settings.work_dir;
        let prefix = self.image_prefix(job);

        let png = work.join(format!("{}.png", prefix));
        temps.push(&png);
        mosaic
            .image
            .save(&png)
            .map_err(CellError::Image)?;

        let native_tiff = work.join(format!("{}.{}.tiff", prefix, mosaic.crs.file_tag()));
        temps.push(&native_tiff);
        self.georeference(&mosaic, &png, &native_tiff)?;

        let tiff = work.join(format!("{}.tiff", prefix));
        temps.push(&tiff);
        if mosaic.crs == self.settings.target_crs {
            fs::rename(&native_tiff, &tiff).map_err(|e| CellError::io(&native_tiff, e))?;
        } else {
            self.warp(&native_tiff, &tiff, &self.settings.target_crs)?;
        }

        let output = work.join(format!("color-{}.laz", job.stem));
        let pipeline_path = work.join(format!("pdal-{}.json", job.stem));
        temps.push(&pipeline_path);
        PdalPipeline::colorization(&job.input, &tiff, &output).write_to(&pipeline_path)?;
        self.tools.run(
            &self.settings.tools.pdal,
            &[OsString::from("pipeline"), pipeline_path.into_os_string()],
        )?;

        info!(
            cell = %cell,
            output = %output.display(),
            placeholders = mosaic.warnings.len(),
            "Cell colorized"
        );
        Ok(CellOutcome {
            cell: *cell,
            output,
            placeholders: mosaic.warnings.len(),
        })
    }

    fn image_prefix(&self, job: &CellJob) -> String {
        let tag = match self.settings.zoom {
            Some(zoom) => zoom.to_string(),
            None => "bbox".to_string(),
        };
        format!("img-{}-{}", tag, job.stem.replacen('_', "-", 1))
    }

    fn georeference(&self, mosaic: &Mosaic, png: &Path, tiff: &Path) -> Result<(), CellError> {
        let [ulx, uly, lrx, lry] = mosaic.ullr();
        let mut args: Vec<OsString> = [
            "-a_nodata",
            "0",
            "-of",
            "GTiff",
            "-a_srs",
            mosaic.crs.as_str(),
            "-a_ullr",
        ]
        .iter()
        .map(OsString::from)
        .collect();
        for v in [ulx, uly, lrx, lry] {
            args.push(format!("{:.6}", v).into());
        }
        args.push(png.as_os_str().to_owned());
        args.push(tiff.as_os_str().to_owned());

        debug!(crs = %mosaic.crs, ulx, uly, lrx, lry, "Georeferencing mosaic");
        self.tools.run(&self.settings.tools.gdal_translate, &args)
    }

    fn warp(&self, from: &Path, to: &Path, target: &CrsId) -> Result<(), CellError> {
        let args = vec![
            OsString::from("-t_srs"),
            OsString::from(target.as_str()),
            from.as_os_str().to_owned(),
            to.as_os_str().to_owned(),
        ];
        self.tools.run(&self.settings.tools.gdalwarp, &args)
    }
}

/// Intermediate files of one cell, removed unless kept.
struct TempFiles {
    keep: bool,
    paths: Vec<PathBuf>,
}

impl TempFiles {
    fn new(keep: bool) -> Self {
        Self {
            keep,
            paths: Vec::new(),
        }
    }

    fn push(&mut self, path: &Path) {
        self.paths.push(path.to_path_buf());
    }

    fn cleanup(self) {
        if self.keep {
            return;
        }
        for path in self.paths {
            match fs::remove_file(&path) {
                Ok(()) => debug!(path = %path.display(), "Removed intermediate file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove intermediate file"),
            }
        }
    }
}
