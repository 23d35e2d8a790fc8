//! Ground cells from IGN lidar file names.
//!
//! IGN distributes 1 km lidar tiles named like
//! `Semis_2021_0650_6860_LA93_IGN69.laz`: after the year, the two 4-digit
//! groups are the Lambert-93 kilometer coordinates of the tile's northwest
//! corner.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use crate::coord::GroundCell;

fn ign_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"_\d{4}_(\d{4})_(\d{4})_LA93_").expect("Invalid IGN file name regex")
    })
}

/// Extract the ground cell encoded in a lidar file name.
///
/// Only the final path component is inspected.
pub fn cell_from_path(path: &Path) -> Option<GroundCell> {
    let name = path.file_name()?.to_string_lossy();
    let caps = ign_pattern().captures(&name)?;
    let x_km = caps.get(1)?.as_str().parse().ok()?;
    let y_km = caps.get(2)?.as_str().parse().ok()?;
    Some(GroundCell::new(x_km, y_km))
}
