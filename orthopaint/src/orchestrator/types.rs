//! Orchestrator types and errors

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::coord::GroundCell;
use crate::crs::CrsId;
use crate::provider::ProviderError;

use super::tools::ToolPaths;

/// Default margin added around every ground cell, in meters.
pub const DEFAULT_MARGIN_M: f64 = 70.0;

/// Errors that stop a whole run.
#[derive(Debug)]
pub enum OrchestratorError {
    /// Capability discovery failed; no cell can be processed
    DiscoveryUnavailable(ProviderError),
    /// The run was interrupted between cells
    Cancelled { completed: usize, remaining: usize },
    /// The rayon worker pool could not be built
    WorkerPool(String),
    /// The work directory could not be prepared
    WorkDir { path: PathBuf, source: io::Error },
}

impl fmt::Display for OrchestratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrchestratorError::DiscoveryUnavailable(e) => write!(f, "{}", e),
            OrchestratorError::Cancelled {
                completed,
                remaining,
            } => write!(
                f,
                "Run cancelled after {} cells, {} not processed",
                completed, remaining
            ),
            OrchestratorError::WorkerPool(msg) => write!(f, "Failed to start workers: {}", msg),
            OrchestratorError::WorkDir { path, source } => {
                write!(f, "Cannot use work directory {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for OrchestratorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            OrchestratorError::DiscoveryUnavailable(e) => Some(e),
            OrchestratorError::WorkDir { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Errors scoped to one ground cell. Other cells keep going.
#[derive(Debug, Error)]
pub enum CellError {
    #[error("Invalid coordinate: {0}")]
    InvalidCoordinate(String),

    #[error("Bounding box image request failed: {0}")]
    BoundingBoxFetchFailed(String),

    #[error(transparent)]
    Provider(ProviderError),

    #[error("{tool} failed ({}): {diagnostic}", status_text(.status))]
    ExternalToolFailed {
        tool: String,
        status: Option<i32>,
        diagnostic: String,
    },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Pipeline document error: {0}")]
    Pipeline(#[from] serde_json::Error),
}

fn status_text(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("exit status {}", code),
        None => "no exit status".to_string(),
    }
}

impl CellError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        CellError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<ProviderError> for CellError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::InvalidCoordinate(msg) => CellError::InvalidCoordinate(msg),
            ProviderError::BoundingBoxFetchFailed(msg) => CellError::BoundingBoxFetchFailed(msg),
            other => CellError::Provider(other),
        }
    }
}

/// Run-wide knobs.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Directory for intermediate rasters and the colorized output
    pub work_dir: PathBuf,
    /// CRS of the point clouds; rasters are warped into it
    pub target_crs: CrsId,
    pub margin_m: f64,
    pub workers: usize,
    pub keep_temp_files: bool,
    /// Zoom used in intermediate file names; `None` for bounding-box sources
    pub zoom: Option<u8>,
    pub tools: ToolPaths,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("."),
            target_crs: CrsId::lambert93(),
            margin_m: DEFAULT_MARGIN_M,
            workers: 1,
            keep_temp_files: false,
            zoom: None,
            tools: ToolPaths::default(),
        }
    }
}

/// One input resolved to a ground cell.
#[derive(Debug, Clone, PartialEq)]
pub struct CellJob {
    pub input: PathBuf,
    pub cell: GroundCell,
    /// Stem of every file written for this job, unique within a run
    pub stem: String,
}

/// A cell that went through the whole pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct CellOutcome {
    pub cell: GroundCell,
    /// Colorized point cloud
    pub output: PathBuf,
    /// Tiles painted with the placeholder color
    pub placeholders: usize,
}

/// A cell that failed.
#[derive(Debug)]
pub struct CellFailure {
    pub input: PathBuf,
    pub cell: GroundCell,
    pub error: CellError,
}

/// What a run did with every input.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub processed: Vec<CellOutcome>,
    /// Inputs whose name carries no ground cell
    pub skipped: Vec<PathBuf>,
    pub failed: Vec<CellFailure>,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Total placeholder tiles across processed cells.
    pub fn placeholders(&self) -> usize {
        self.processed.iter().map(|o| o.placeholders).sum()
    }
}

/// Progress notification sent after each cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellProgress<'a> {
    pub cell: &'a GroundCell,
    pub succeeded: bool,
}
