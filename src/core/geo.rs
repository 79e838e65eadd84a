use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// A geographic position in radians.
///
/// All projection math runs in radians; degree constructors exist because
/// scene descriptions and hosts usually speak degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LonLat {
    pub lon: f64,
    pub lat: f64,
}

impl LonLat {
    /// Creates a position from radians
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    /// Creates a position from degrees
    pub fn from_degrees(lon_deg: f64, lat_deg: f64) -> Self {
        Self::new(lon_deg.to_radians(), lat_deg.to_radians())
    }

    pub fn lon_degrees(&self) -> f64 {
        self.lon.to_degrees()
    }

    pub fn lat_degrees(&self) -> f64 {
        self.lat.to_degrees()
    }

    /// Validates that the coordinates are within valid ranges
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && self.lat >= -PI / 2.0
            && self.lat <= PI / 2.0
    }

    /// Wraps longitude to [-π, π)
    pub fn wrap_lon(lon: f64) -> f64 {
        let wrapped = (lon + PI).rem_euclid(2.0 * PI);
        wrapped - PI
    }
}

impl Default for LonLat {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// Represents a point in screen, surface or UCS coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn add(&self, other: &Point) -> Point {
        Point::new(self.x + other.x, self.y + other.y)
    }

    pub fn subtract(&self, other: &Point) -> Point {
        Point::new(self.x - other.x, self.y - other.y)
    }

    pub fn multiply(&self, scalar: f64) -> Point {
        Point::new(self.x * scalar, self.y * scalar)
    }

    pub fn distance_to(&self, other: &Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn floor(&self) -> Point {
        Point::new(self.x.floor(), self.y.floor())
    }
}

impl Default for Point {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// Geographic rectangle in degrees, as written in scene descriptions.
///
/// `west`/`east` are optional: without them longitude wraps and only the
/// north/south limits are enforced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoBorder {
    pub north: f64,
    pub south: f64,
    #[serde(default)]
    pub west: Option<f64>,
    #[serde(default)]
    pub east: Option<f64>,
}

impl GeoBorder {
    pub fn new(north: f64, south: f64) -> Self {
        Self {
            north,
            south,
            west: None,
            east: None,
        }
    }

    pub fn with_longitudes(mut self, west: f64, east: f64) -> Self {
        self.west = Some(west);
        self.east = Some(east);
        self
    }

    pub fn has_longitude_limits(&self) -> bool {
        self.west.is_some() && self.east.is_some()
    }

    /// North-west corner, falling back to the antimeridian when unlimited
    pub fn north_west(&self) -> LonLat {
        LonLat::from_degrees(self.west.unwrap_or(-180.0), self.north)
    }

    /// South-east corner, falling back to the antimeridian when unlimited
    pub fn south_east(&self) -> LonLat {
        LonLat::from_degrees(self.east.unwrap_or(180.0), self.south)
    }
}

/// Integer tile coordinate in the tile grid of one LOD
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileCoord {
    pub x: i64,
    pub y: i64,
    pub lod: i32,
}

impl TileCoord {
    pub fn new(x: i64, y: i64, lod: i32) -> Self {
        Self { x, y, lod }
    }

    /// Number of tiles along one axis of the world at this LOD
    pub fn grid_size(lod: i32) -> i64 {
        1_i64 << lod.clamp(0, 62)
    }

    /// Wraps the column into the world grid (spherical longitude)
    pub fn wrapped(&self) -> TileCoord {
        let n = Self::grid_size(self.lod);
        TileCoord::new(self.x.rem_euclid(n), self.y, self.lod)
    }

    /// Checks if the row is inside the world grid
    pub fn is_valid(&self) -> bool {
        self.lod >= 0 && self.y >= 0 && self.y < Self::grid_size(self.lod)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degree_round_trip() {
        let p = LonLat::from_degrees(-74.0060, 40.7128);
        assert!((p.lon_degrees() + 74.0060).abs() < 1e-12);
        assert!((p.lat_degrees() - 40.7128).abs() < 1e-12);
        assert!(p.is_valid());
    }

    #[test]
    fn test_wrap_lon() {
        let wrapped = LonLat::wrap_lon(3.0 * PI / 2.0);
        assert!((wrapped + PI / 2.0).abs() < 1e-12);
        assert!((LonLat::wrap_lon(0.25) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_tile_wrapping() {
        let t = TileCoord::new(-1, 3, 2).wrapped();
        assert_eq!(t.x, 3);
        assert!(t.is_valid());
        assert!(!TileCoord::new(0, 4, 2).is_valid());
    }

    #[test]
    fn test_border_corners() {
        let border = GeoBorder::new(60.0, -60.0);
        assert!(!border.has_longitude_limits());
        assert!((border.north_west().lon_degrees() + 180.0).abs() < 1e-9);
        let limited = border.with_longitudes(-10.0, 30.0);
        assert!(limited.has_longitude_limits());
        assert!((limited.south_east().lon_degrees() - 30.0).abs() < 1e-9);
    }
}
