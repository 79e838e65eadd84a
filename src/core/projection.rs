//! Coordinate transforms between geographic radians and UCS map pixels.
//!
//! Every projection first maps into a normalized space where the world is
//! `extent()` wide and tall (`u` grows east, `v` grows south), then scales
//! by the tile grid size of the requested LOD. Strategy selection happens
//! once at scene setup through [`ProjectionKind::from_provider_id`].

use crate::core::bounds::Bounds;
use crate::core::constants::WGS84_ECCENTRICITY;
use crate::core::geo::{LonLat, Point};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};

/// Pixel size of the whole world along the u axis at a (fractional) LOD
pub fn world_size(lod: f64, tile_size: u32) -> f64 {
    tile_size as f64 * 2_f64.powf(lod)
}

/// Shifts a UCS x coordinate onto the world copy nearest `anchor`
pub fn nearest_world_copy(x: f64, anchor: f64, world: f64) -> f64 {
    if world <= 0.0 {
        return x;
    }
    x - world * ((x - anchor) / world).round()
}

/// Stateless geographic ↔ UCS transform
pub trait Projection: std::fmt::Debug + Send + Sync {
    fn kind(&self) -> ProjectionKind;

    /// Whether the projection preserves angles (Mercator family)
    fn is_isogonal(&self) -> bool;

    /// Normalized world size `(width, height)`
    fn extent(&self) -> (f64, f64);

    /// Largest latitude (radians) representable without leaving the extent
    fn max_latitude(&self) -> f64;

    fn project_normalized(&self, geo: LonLat) -> Point;

    fn unproject_normalized(&self, point: Point) -> LonLat;

    /// Geographic radians to UCS pixels at `lod`
    fn to_map_space(&self, geo: LonLat, lod: f64, tile_size: u32) -> Point {
        self.project_normalized(geo)
            .multiply(world_size(lod, tile_size))
    }

    /// UCS pixels at `lod` back to geographic radians
    fn to_geo(&self, point: Point, lod: f64, tile_size: u32) -> LonLat {
        self.unproject_normalized(point.multiply(1.0 / world_size(lod, tile_size)))
    }

    /// UCS bounding box of a geographic rectangle given by its NW/SE corners.
    ///
    /// Isogonal projections map meridians and parallels to straight axis
    /// aligned lines, so two opposite corners suffice. Otherwise all four
    /// corners are projected.
    fn map_bounds(&self, north_west: LonLat, south_east: LonLat, lod: f64, tile_size: u32) -> Bounds {
        let nw = self.to_map_space(north_west, lod, tile_size);
        let se = self.to_map_space(south_east, lod, tile_size);
        if self.is_isogonal() {
            return Bounds::from_points([nw, se]);
        }
        let ne = self.to_map_space(LonLat::new(south_east.lon, north_west.lat), lod, tile_size);
        let sw = self.to_map_space(LonLat::new(north_west.lon, south_east.lat), lod, tile_size);
        Bounds::from_points([nw, ne, se, sw])
    }
}

/// Which projection strategy a scene uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProjectionKind {
    Mercator,
    Linear,
    EllipticalMercator,
}

impl ProjectionKind {
    /// Resolves a tile provider's projection id
    pub fn from_provider_id(id: &str) -> Result<Self> {
        match id.trim().to_ascii_lowercase().as_str() {
            "mercator" | "webmercator" | "epsg:3857" => Ok(Self::Mercator),
            "linear" | "equirectangular" | "epsg:4326" => Ok(Self::Linear),
            "ellipticalmercator" | "wgs84mercator" | "epsg:3395" => Ok(Self::EllipticalMercator),
            _ => Err(Error::UnknownProjection(id.to_string())),
        }
    }

    pub fn build(self) -> Box<dyn Projection> {
        match self {
            Self::Mercator => Box::new(MercatorProjection),
            Self::Linear => Box::new(LinearProjection),
            Self::EllipticalMercator => Box::new(EllipticalMercatorProjection::wgs84()),
        }
    }
}

impl Default for ProjectionKind {
    fn default() -> Self {
        Self::Mercator
    }
}

fn u_from_lon(lon: f64) -> f64 {
    (lon + PI) / (2.0 * PI)
}

fn lon_from_u(u: f64) -> f64 {
    u * 2.0 * PI - PI
}

/// Spherical (web) Mercator
#[derive(Debug, Clone, Copy, Default)]
pub struct MercatorProjection;

impl Projection for MercatorProjection {
    fn kind(&self) -> ProjectionKind {
        ProjectionKind::Mercator
    }

    fn is_isogonal(&self) -> bool {
        true
    }

    fn extent(&self) -> (f64, f64) {
        (1.0, 1.0)
    }

    fn max_latitude(&self) -> f64 {
        PI.sinh().atan()
    }

    fn project_normalized(&self, geo: LonLat) -> Point {
        let max = self.max_latitude();
        let lat = geo.lat.clamp(-max, max);
        let y = (FRAC_PI_4 + lat / 2.0).tan().ln();
        Point::new(u_from_lon(geo.lon), 0.5 - y / (2.0 * PI))
    }

    fn unproject_normalized(&self, point: Point) -> LonLat {
        let y = (0.5 - point.y) * 2.0 * PI;
        LonLat::new(lon_from_u(point.x), y.sinh().atan())
    }
}

/// Plate carrée: longitude and latitude map linearly
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearProjection;

impl Projection for LinearProjection {
    fn kind(&self) -> ProjectionKind {
        ProjectionKind::Linear
    }

    fn is_isogonal(&self) -> bool {
        false
    }

    fn extent(&self) -> (f64, f64) {
        (1.0, 0.5)
    }

    fn max_latitude(&self) -> f64 {
        FRAC_PI_2
    }

    fn project_normalized(&self, geo: LonLat) -> Point {
        let lat = geo.lat.clamp(-FRAC_PI_2, FRAC_PI_2);
        Point::new(u_from_lon(geo.lon), (FRAC_PI_2 - lat) / (2.0 * PI))
    }

    fn unproject_normalized(&self, point: Point) -> LonLat {
        LonLat::new(lon_from_u(point.x), FRAC_PI_2 - point.y * 2.0 * PI)
    }
}

/// Mercator on an ellipsoid (EPSG:3395 style)
#[derive(Debug, Clone, Copy)]
pub struct EllipticalMercatorProjection {
    eccentricity: f64,
}

impl EllipticalMercatorProjection {
    pub fn new(eccentricity: f64) -> Self {
        Self { eccentricity }
    }

    pub fn wgs84() -> Self {
        Self::new(WGS84_ECCENTRICITY)
    }

    fn forward_y(&self, lat: f64) -> f64 {
        let e = self.eccentricity;
        let es = e * lat.sin();
        let correction = ((1.0 - es) / (1.0 + es)).powf(e / 2.0);
        ((FRAC_PI_4 + lat / 2.0).tan() * correction).ln()
    }

    fn inverse_y(&self, y: f64) -> f64 {
        let e = self.eccentricity;
        let t = (-y).exp();
        let mut lat = FRAC_PI_2 - 2.0 * t.atan();
        for _ in 0..15 {
            let es = e * lat.sin();
            let next = FRAC_PI_2 - 2.0 * (t * ((1.0 - es) / (1.0 + es)).powf(e / 2.0)).atan();
            if (next - lat).abs() < 1e-12 {
                return next;
            }
            lat = next;
        }
        lat
    }
}

impl Projection for EllipticalMercatorProjection {
    fn kind(&self) -> ProjectionKind {
        ProjectionKind::EllipticalMercator
    }

    fn is_isogonal(&self) -> bool {
        true
    }

    fn extent(&self) -> (f64, f64) {
        (1.0, 1.0)
    }

    fn max_latitude(&self) -> f64 {
        self.inverse_y(PI)
    }

    fn project_normalized(&self, geo: LonLat) -> Point {
        let max = self.max_latitude();
        let y = self.forward_y(geo.lat.clamp(-max, max));
        Point::new(u_from_lon(geo.lon), 0.5 - y / (2.0 * PI))
    }

    fn unproject_normalized(&self, point: Point) -> LonLat {
        let y = (0.5 - point.y) * 2.0 * PI;
        LonLat::new(lon_from_u(point.x), self.inverse_y(y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_round_trip(projection: &dyn Projection, geo: LonLat) {
        let p = projection.to_map_space(geo, 7.0, 256);
        let back = projection.to_geo(p, 7.0, 256);
        assert!((back.lon - geo.lon).abs() < 1e-9, "{:?} lon drift", projection.kind());
        assert!((back.lat - geo.lat).abs() < 1e-9, "{:?} lat drift", projection.kind());
    }

    #[test]
    fn test_round_trips() {
        let geo = LonLat::from_degrees(13.4, 52.5);
        for kind in [
            ProjectionKind::Mercator,
            ProjectionKind::Linear,
            ProjectionKind::EllipticalMercator,
        ] {
            assert_round_trip(kind.build().as_ref(), geo);
        }
    }

    #[test]
    fn test_mercator_world_corners() {
        let merc = MercatorProjection;
        let origin = merc.to_map_space(LonLat::new(-PI, merc.max_latitude()), 0.0, 256);
        assert!(origin.x.abs() < 1e-9);
        assert!(origin.y.abs() < 1e-6);
        let centre = merc.to_map_space(LonLat::new(0.0, 0.0), 1.0, 256);
        assert!((centre.x - 256.0).abs() < 1e-9);
        assert!((centre.y - 256.0).abs() < 1e-9);
    }

    #[test]
    fn test_elliptical_max_latitude_is_above_spherical() {
        let ell = EllipticalMercatorProjection::wgs84();
        assert!(ell.max_latitude() > MercatorProjection.max_latitude());
        let top = ell.project_normalized(LonLat::new(0.0, ell.max_latitude()));
        assert!(top.y.abs() < 1e-9);
    }

    #[test]
    fn test_linear_extent_is_half_height() {
        let lin = LinearProjection;
        let south_pole = lin.project_normalized(LonLat::new(0.0, -FRAC_PI_2));
        assert!((south_pole.y - 0.5).abs() < 1e-12);
        assert_eq!(lin.extent(), (1.0, 0.5));
    }

    #[test]
    fn test_map_bounds_corner_queries() {
        let nw = LonLat::from_degrees(-20.0, 40.0);
        let se = LonLat::from_degrees(30.0, -10.0);
        for kind in [ProjectionKind::Mercator, ProjectionKind::Linear] {
            let projection = kind.build();
            let b = projection.map_bounds(nw, se, 3.0, 256);
            assert!(b.is_valid());
            let p = projection.to_map_space(LonLat::from_degrees(5.0, 15.0), 3.0, 256);
            assert!(b.contains(&p));
        }
    }

    #[test]
    fn test_provider_ids() {
        assert_eq!(ProjectionKind::from_provider_id("WebMercator").ok(), Some(ProjectionKind::Mercator));
        assert_eq!(ProjectionKind::from_provider_id("equirectangular").ok(), Some(ProjectionKind::Linear));
        assert_eq!(
            ProjectionKind::from_provider_id("wgs84mercator").ok(),
            Some(ProjectionKind::EllipticalMercator)
        );
        assert!(matches!(
            ProjectionKind::from_provider_id("gnomonic"),
            Err(Error::UnknownProjection(_))
        ));
    }
}
