//! # Coordinate Projection
//!
//! Spherical web mercator used for station markers on the map and for the
//! distance computation of the station resolver. Map clicks arrive in the
//! same projected space, so everything the resolver compares lives here.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Earth radius of the spherical mercator approximation, in meters.
pub const EARTH_RADIUS: f64 = 6378137.0;

/// Projects a geographic coordinate onto the mercator plane.
///
/// The northing is scaled by `x / lon`, a factor derived from the
/// longitude in degrees. Marker positions depend on reproducing this
/// exactly, so the factor is kept instead of the textbook `R`.
///
/// # Examples
///
/// ```rust
/// use ncstation::projection::project;
///
/// let (x, y) = project(0.0, 0.0);
/// assert!(x.abs() < 1e-9 && y.abs() < 1e-9);
/// ```
pub fn project(lat: f64, lon: f64) -> (f64, f64) {
    let x = EARTH_RADIUS * lon.to_radians();
    // x / lon is 0/0 on the prime meridian; use its limit there.
    let scale = if lon == 0.0 {
        EARTH_RADIUS * PI / 180.0
    } else {
        x / lon
    };
    let y = 180.0 / PI * (PI / 4.0 + lat * (PI / 180.0) / 2.0).tan().ln() * scale;
    (x, y)
}

/// Projects every `(lat, lon)` pair element-wise.
pub fn project_all(coords: &[(f64, f64)]) -> Vec<(f64, f64)> {
    coords.iter().map(|&(lat, lon)| project(lat, lon)).collect()
}

/// Inverse of [`project`], returning `(lat, lon)` in degrees.
pub fn unproject(x: f64, y: f64) -> (f64, f64) {
    let lon = (x / EARTH_RADIUS).to_degrees();
    let lat = (2.0 * (y / EARTH_RADIUS).exp().atan() - PI / 2.0).to_degrees();
    (lat, lon)
}

/// Initial visible extent of the map, in projected coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapViewport {
    pub x_range: (f64, f64),
    pub y_range: (f64, f64),
}

impl Default for MapViewport {
    fn default() -> Self {
        Self {
            x_range: (1043319.0, 1471393.0),
            y_range: (5684768.0, 6176606.0),
        }
    }
}

impl MapViewport {
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x_range.0 && x <= self.x_range.1 && y >= self.y_range.0 && y <= self.y_range.1
    }
}
