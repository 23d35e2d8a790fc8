//! PDAL pipeline documents.
//!
//! A colorization pipeline reads the point cloud, samples RGB from the
//! georeferenced raster with `filters.colorization`, and writes compressed
//! LAS 1.2 point format 3 (the first format with RGB plus GPS time).

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use super::types::CellError;

/// Top-level PDAL pipeline document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PdalPipeline {
    pub pipeline: Vec<Stage>,
}

/// One pipeline stage. A bare string is a reader inferred from the file
/// extension.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Stage {
    Reader(String),
    Colorization(ColorizationFilter),
    Writer(LasWriter),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColorizationFilter {
    #[serde(rename = "type")]
    pub kind: String,
    pub raster: String,
}

/// `writers.las` options. PDAL accepts option values as strings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LasWriter {
    #[serde(rename = "type")]
    pub kind: String,
    pub compression: String,
    pub minor_version: String,
    pub dataformat_id: String,
    pub filename: String,
}

impl PdalPipeline {
    /// Colorize `input` from `raster` into a compressed `output`.
    pub fn colorization(input: &Path, raster: &Path, output: &Path) -> Self {
        Self {
            pipeline: vec![
                Stage::Reader(input.display().to_string()),
                Stage::Colorization(ColorizationFilter {
                    kind: "filters.colorization".to_string(),
                    raster: raster.display().to_string(),
                }),
                Stage::Writer(LasWriter {
                    kind: "writers.las".to_string(),
                    compression: "true".to_string(),
                    minor_version: "2".to_string(),
                    dataformat_id: "3".to_string(),
                    filename: output.display().to_string(),
                }),
            ],
        }
    }

    /// Write the document as pretty JSON.
    pub fn write_to(&self, path: &Path) -> Result<(), CellError> {
        let file = File::create(path).map_err(|e| CellError::io(path, e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush().map_err(|e| CellError::io(path, e))
    }
}
