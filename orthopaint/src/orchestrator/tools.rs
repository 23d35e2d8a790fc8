//! External command-line tools (GDAL, PDAL).

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use super::types::CellError;

/// Lines of stderr kept in a failure diagnostic.
const DIAGNOSTIC_LINES: usize = 5;

/// Locations of the external tools. Bare names are looked up on `PATH`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub gdal_translate: PathBuf,
    pub gdalwarp: PathBuf,
    pub pdal: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            gdal_translate: PathBuf::from("gdal_translate"),
            gdalwarp: PathBuf::from("gdalwarp"),
            pdal: PathBuf::from("pdal"),
        }
    }
}

/// Runs an external program to completion.
///
/// The orchestrator only talks to GDAL and PDAL through this trait so tests
/// can record invocations instead of spawning processes.
pub trait ToolRunner: Send + Sync {
    /// Run `program` with `args`. A non-zero exit is
    /// [`CellError::ExternalToolFailed`].
    fn run(&self, program: &Path, args: &[OsString]) -> Result<(), CellError>;
}

/// Spawns real processes and captures their output.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

impl ToolRunner for ProcessRunner {
    fn run(&self, program: &Path, args: &[OsString]) -> Result<(), CellError> {
        let tool = tool_name(program);
        debug!(tool = %tool, args = ?args, "Running external tool");

        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|e| CellError::ExternalToolFailed {
                tool: tool.clone(),
                status: None,
                diagnostic: format!("failed to start: {}", e),
            })?;

        if !output.stdout.is_empty() {
            debug!(tool = %tool, stdout = %String::from_utf8_lossy(&output.stdout).trim(), "Tool output");
        }

        if output.status.success() {
            Ok(())
        } else {
            Err(CellError::ExternalToolFailed {
                tool,
                status: output.status.code(),
                diagnostic: tail(&String::from_utf8_lossy(&output.stderr), DIAGNOSTIC_LINES),
            })
        }
    }
}

pub(crate) fn tool_name(program: &Path) -> String {
    program
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| program.display().to_string())
}

/// Last `lines` non-empty lines of `text`, joined with `; `.
fn tail(text: &str, lines: usize) -> String {
    let kept: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    let start = kept.len().saturating_sub(lines);
    kept[start..].join("; ")
}
