//! Coordinates, distances and bearings.

use geo::{HaversineDistance, Point};
use serde::{Deserialize, Serialize};

/// Fixed-precision factor: coordinates are stored as signed micro-degrees.
pub const COORDINATE_PRECISION: f64 = 1e6;

/// A (longitude, latitude) pair in micro-degrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coordinate {
    pub lon: i32,
    pub lat: i32,
}

impl Coordinate {
    pub fn from_degrees(lon: f64, lat: f64) -> Self {
        Self {
            lon: (lon * COORDINATE_PRECISION).round() as i32,
            lat: (lat * COORDINATE_PRECISION).round() as i32,
        }
    }

    pub fn lon_deg(&self) -> f64 {
        self.lon as f64 / COORDINATE_PRECISION
    }

    pub fn lat_deg(&self) -> f64 {
        self.lat as f64 / COORDINATE_PRECISION
    }
}

/// Great-circle distance in meters.
pub fn haversine(a: Coordinate, b: Coordinate) -> f64 {
    let p1 = Point::new(a.lon_deg(), a.lat_deg());
    let p2 = Point::new(b.lon_deg(), b.lat_deg());
    p1.haversine_distance(&p2)
}

/// Length of a polyline in meters.
pub fn polyline_length(coords: &[Coordinate]) -> f64 {
    coords.windows(2).map(|w| haversine(w[0], w[1])).sum()
}

/// Initial bearing from `from` to `to` in degrees, 0 = north, clockwise,
/// normalized to [0, 360).
pub fn bearing(from: Coordinate, to: Coordinate) -> f64 {
    let lat1 = from.lat_deg().to_radians();
    let lat2 = to.lat_deg().to_radians();
    let delta_lon = (to.lon_deg() - from.lon_deg()).to_radians();

    let y = delta_lon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * delta_lon.cos();
    let deg = y.atan2(x).to_degrees();
    (deg + 360.0) % 360.0
}

/// Deflection between an entry bearing and an exit bearing at an
/// intersection, normalized to (-180, 180]. 0 is straight on, positive is a
/// right turn, ±180 a u-turn.
pub fn turn_angle(entry_bearing: f64, exit_bearing: f64) -> f64 {
    let mut angle = exit_bearing - entry_bearing;
    while angle <= -180.0 {
        angle += 360.0;
    }
    while angle > 180.0 {
        angle -= 360.0;
    }
    angle
}

/// Width of a discretized bearing bin in degrees.
pub const BEARING_BIN_DEG: f64 = 10.0;

/// Quantize a bearing into one of 36 bins for intersection classification.
pub fn discretize_bearing(bearing: f64) -> u16 {
    let normalized = ((bearing % 360.0) + 360.0) % 360.0;
    ((normalized / BEARING_BIN_DEG).round() as u16) % 36
}
