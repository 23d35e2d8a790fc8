//! PROJ-backed transform for reference systems the builtin math does not know.

use std::collections::HashMap;
use std::sync::Mutex;

use ::proj::Proj;
use tracing::debug;

use super::{BuiltinTransform, CrsError, CrsId, CrsTransform};

/// Transform delegating to libproj, with one compiled pipeline per CRS pair.
///
/// Pipelines are normalized for visualization, so geographic systems take
/// (longitude, latitude) like the rest of the crate. Pairs PROJ cannot build
/// (missing `proj.db`, unknown code) go through [`BuiltinTransform`].
#[derive(Default)]
pub struct ProjTransform {
    pipelines: Mutex<HashMap<(CrsId, CrsId), Proj>>,
    fallback: BuiltinTransform,
}

impl ProjTransform {
    pub fn new() -> Self {
        Self::default()
    }

    fn convert(&self, from: &CrsId, to: &CrsId, x: f64, y: f64) -> Result<(f64, f64), CrsError> {
        let unsupported = || CrsError::Unsupported {
            from: from.to_string(),
            to: to.to_string(),
        };

        let mut pipelines = self.pipelines.lock().unwrap_or_else(|e| e.into_inner());
        let key = (from.clone(), to.clone());
        if !pipelines.contains_key(&key) {
            let proj = Proj::new_known_crs(from.as_str(), to.as_str(), None).map_err(|e| {
                debug!(from = %from, to = %to, error = %e, "PROJ pipeline unavailable");
                unsupported()
            })?;
            pipelines.insert(key.clone(), proj);
        }
        let proj = pipelines.get(&key).ok_or_else(unsupported)?;

        proj.convert((x, y)).map_err(|_| CrsError::InvalidCoordinate {
            x,
            y,
            crs: from.to_string(),
        })
    }
}

impl CrsTransform for ProjTransform {
    fn transform(
        &self,
        from: &CrsId,
        to: &CrsId,
        x: f64,
        y: f64,
    ) -> Result<(f64, f64), CrsError> {
        let invalid = || CrsError::InvalidCoordinate {
            x,
            y,
            crs: from.to_string(),
        };
        if !x.is_finite() || !y.is_finite() {
            return Err(invalid());
        }
        if from == to {
            return Ok((x, y));
        }

        let (tx, ty) = match self.convert(from, to, x, y) {
            Err(CrsError::Unsupported { .. }) => self.fallback.transform(from, to, x, y)?,
            other => other?,
        };
        if !tx.is_finite() || !ty.is_finite() {
            return Err(invalid());
        }
        Ok((tx, ty))
    }

    fn supports(&self, crs: &CrsId) -> bool {
        if self.fallback.supports(crs) {
            return true;
        }
        let wgs84 = CrsId::wgs84();
        let other = if *crs == wgs84 {
            CrsId::web_mercator()
        } else {
            wgs84
        };
        let key = (crs.clone(), other.clone());

        let mut pipelines = self.pipelines.lock().unwrap_or_else(|e| e.into_inner());
        if pipelines.contains_key(&key) {
            return true;
        }
        match Proj::new_known_crs(crs.as_str(), other.as_str(), None) {
            Ok(proj) => {
                pipelines.insert(key, proj);
                true
            }
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agrees_with_builtin_for_lambert93() {
        let proj = ProjTransform::new();
        let builtin = BuiltinTransform::new();
        let l93 = CrsId::lambert93();
        let pm = CrsId::web_mercator();

        for &(x, y) in &[(650000.0, 6860000.0), (1_000_000.0, 6_300_000.0), (200_000.0, 6_700_000.0)] {
            let (px, py) = proj.transform(&l93, &pm, x, y).unwrap();
            let (bx, by) = builtin.transform(&l93, &pm, x, y).unwrap();
            assert!((px - bx).abs() < 2.0, "x {} vs {}", px, bx);
            assert!((py - by).abs() < 2.0, "y {} vs {}", py, by);
        }
    }

    #[test]
    fn test_geographic_is_lon_lat() {
        let proj = ProjTransform::new();
        let (x, y) = proj
            .transform(&CrsId::wgs84(), &CrsId::web_mercator(), 2.35, 48.85)
            .unwrap();
        assert!((x - 261_600.0).abs() < 100.0, "x = {}", x);
        assert!((y - 6_250_000.0).abs() < 1_000.0, "y = {}", y);
    }

    #[test]
    fn test_utm_supported() {
        let proj = ProjTransform::new();
        let utm31 = CrsId::new("EPSG:32631");
        assert!(proj.supports(&utm31));
        assert!(proj.supports(&CrsId::wgs84()));

        let (lon, lat) = proj
            .transform(&utm31, &CrsId::wgs84(), 500_000.0, 5_000_000.0)
            .unwrap();
        assert!((lon - 3.0).abs() < 1e-6, "lon = {}", lon);
        assert!((lat - 45.15).abs() < 0.05, "lat = {}", lat);
    }

    #[test]
    fn test_unknown_crs_unsupported() {
        let proj = ProjTransform::new();
        let bogus = CrsId::new("EPSG:999999");
        assert!(!proj.supports(&bogus));
        assert!(matches!(
            proj.transform(&bogus, &CrsId::wgs84(), 0.0, 0.0),
            Err(CrsError::Unsupported { .. })
        ));
    }

    #[test]
    fn test_identity_and_non_finite() {
        let proj = ProjTransform::new();
        let pm = CrsId::web_mercator();
        assert_eq!(proj.transform(&pm, &pm, 1.0, 2.0).unwrap(), (1.0, 2.0));
        assert!(matches!(
            proj.transform(&pm, &CrsId::wgs84(), f64::INFINITY, 0.0),
            Err(CrsError::InvalidCoordinate { .. })
        ));
    }
}
