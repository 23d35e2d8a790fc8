//! Ellipsoidal Lambert Conformal Conic projection (two standard parallels).
//!
//! Forward and inverse formulas follow the usual ellipsoidal form: the
//! isometric latitude term `t(φ)`, cone constant `n`, scale factor `F` and
//! the polar radius `ρ`. The inverse iterates on latitude until convergence.

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

/// Maximum iterations for the inverse latitude computation.
const MAX_ITERATIONS: usize = 20;

/// Convergence threshold for the inverse latitude, in radians.
const LATITUDE_EPSILON: f64 = 1e-12;

/// Lambert Conformal Conic projection on an ellipsoid.
#[derive(Debug, Clone)]
pub struct LambertConformalConic {
    /// Semi-major axis in meters
    a: f64,
    /// First eccentricity
    e: f64,
    /// Central meridian in radians
    lon0: f64,
    /// False easting
    x0: f64,
    /// False northing
    y0: f64,
    /// Cone constant
    n: f64,
    /// Scale constant `F`
    f: f64,
    /// Radius at the latitude of origin
    rho0: f64,
}

impl LambertConformalConic {
    /// Build a projection from its defining parameters (angles in degrees).
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        semi_major: f64,
        inverse_flattening: f64,
        lat_origin: f64,
        lon_origin: f64,
        parallel_1: f64,
        parallel_2: f64,
        false_easting: f64,
        false_northing: f64,
    ) -> Self {
        let flattening = 1.0 / inverse_flattening;
        let e = (2.0 * flattening - flattening * flattening).sqrt();

        let phi0 = lat_origin.to_radians();
        let phi1 = parallel_1.to_radians();
        let phi2 = parallel_2.to_radians();

        let m1 = m(e, phi1);
        let m2 = m(e, phi2);
        let t1 = t(e, phi1);
        let t2 = t(e, phi2);

        let n = if (phi1 - phi2).abs() < 1e-12 {
            phi1.sin()
        } else {
            (m1.ln() - m2.ln()) / (t1.ln() - t2.ln())
        };
        let f = m1 / (n * t1.powf(n));
        let rho0 = semi_major * f * t(e, phi0).powf(n);

        Self {
            a: semi_major,
            e,
            lon0: lon_origin.to_radians(),
            x0: false_easting,
            y0: false_northing,
            n,
            f,
            rho0,
        }
    }

    /// RGF93 / Lambert-93 (EPSG:2154) on the GRS80 ellipsoid.
    pub fn lambert93() -> Self {
        Self::new(
            6_378_137.0,
            298.257_222_101,
            46.5,
            3.0,
            49.0,
            44.0,
            700_000.0,
            6_600_000.0,
        )
    }

    /// Geographic degrees (lon, lat) to projected meters (x, y).
    pub fn forward(&self, lon: f64, lat: f64) -> (f64, f64) {
        let phi = lat.to_radians();
        let rho = self.a * self.f * t(self.e, phi).powf(self.n);
        let theta = self.n * (lon.to_radians() - self.lon0);

        (
            self.x0 + rho * theta.sin(),
            self.y0 + self.rho0 - rho * theta.cos(),
        )
    }

    /// Projected meters (x, y) to geographic degrees (lon, lat).
    pub fn inverse(&self, x: f64, y: f64) -> (f64, f64) {
        let dx = x - self.x0;
        let dy = self.rho0 - (y - self.y0);
        let rho = (dx * dx + dy * dy).sqrt().copysign(self.n);
        let theta = if self.n >= 0.0 {
            dx.atan2(dy)
        } else {
            (-dx).atan2(-dy)
        };

        let t_prime = (rho / (self.a * self.f)).powf(1.0 / self.n);
        let lon = theta / self.n + self.lon0;

        let mut phi = FRAC_PI_2 - 2.0 * t_prime.atan();
        for _ in 0..MAX_ITERATIONS {
            let es = self.e * phi.sin();
            let next =
                FRAC_PI_2 - 2.0 * (t_prime * ((1.0 - es) / (1.0 + es)).powf(self.e / 2.0)).atan();
            let delta = (next - phi).abs();
            phi = next;
            if delta < LATITUDE_EPSILON {
                break;
            }
        }

        (lon.to_degrees(), phi.to_degrees())
    }
}

fn m(e: f64, phi: f64) -> f64 {
    let es = e * phi.sin();
    phi.cos() / (1.0 - es * es).sqrt()
}

fn t(e: f64, phi: f64) -> f64 {
    let es = e * phi.sin();
    (FRAC_PI_4 - phi / 2.0).tan() / ((1.0 - es) / (1.0 + es)).powf(e / 2.0)
}
