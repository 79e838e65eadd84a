//! Declarative scene descriptions.
//!
//! A description is consumed once when a scene is created and again on every
//! merge-reload. Keys are camelCase:
//!
//! ```json
//! {
//!   "name": "harbour",
//!   "kind": "geo",
//!   "visualFrame": { "north": 60.0, "south": 40.0 },
//!   "initialStartPosition": { "lon": 8.5, "lat": 47.4 },
//!   "initialZoom": 9,
//!   "refMapLayerStack": "streets",
//!   "navigationDisablement": { "wheel": true },
//!   "projection": "mercator",
//!   "config": { "tileSize": 256 }
//! }
//! ```

use crate::core::config::{NavigationDisablement, SceneConfig};
use crate::core::geo::{GeoBorder, LonLat};
use crate::core::kind::SceneKind;
use crate::core::projection::ProjectionKind;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Longitude/latitude in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPosition {
    pub lon: f64,
    pub lat: f64,
}

impl GeoPosition {
    pub fn to_lon_lat(self) -> LonLat {
        LonLat::from_degrees(self.lon, self.lat)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneDescription {
    pub name: String,
    #[serde(default)]
    pub kind: SceneKind,
    #[serde(default)]
    pub visual_frame: Option<GeoBorder>,
    #[serde(default)]
    pub initial_start_position: Option<GeoPosition>,
    #[serde(default)]
    pub initial_zoom: Option<f64>,
    #[serde(default)]
    pub ref_map_layer_stack: String,
    #[serde(default)]
    pub navigation_disablement: NavigationDisablement,
    /// Tile provider projection id
    #[serde(default)]
    pub projection: Option<String>,
    #[serde(default)]
    pub config: SceneConfig,
}

impl SceneDescription {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: SceneKind::default(),
            visual_frame: None,
            initial_start_position: None,
            initial_zoom: None,
            ref_map_layer_stack: String::new(),
            navigation_disablement: NavigationDisablement::default(),
            projection: None,
            config: SceneConfig::default(),
        }
    }

    /// Parses and validates a JSON description
    pub fn from_json(json: &str) -> Result<Self> {
        let description: SceneDescription = serde_json::from_str(json)?;
        description.validate()?;
        Ok(description)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(invalid("scene name is empty"));
        }
        if let Some(frame) = &self.visual_frame {
            if !(-90.0..=90.0).contains(&frame.north) || !(-90.0..=90.0).contains(&frame.south) {
                return Err(invalid("visual frame latitude outside [-90, 90]"));
            }
            if frame.north <= frame.south {
                return Err(invalid("visual frame north must lie above south"));
            }
            match (frame.west, frame.east) {
                (Some(west), Some(east)) if west >= east => {
                    return Err(invalid("visual frame west must lie before east"));
                }
                (Some(_), None) | (None, Some(_)) => {
                    return Err(invalid("visual frame needs both west and east or neither"));
                }
                _ => {}
            }
        }
        if let Some(start) = &self.initial_start_position {
            if !start.lon.is_finite() || !(-90.0..=90.0).contains(&start.lat) {
                return Err(invalid("initial start position out of range"));
            }
        }
        if self.initial_zoom.is_some_and(|zoom| !zoom.is_finite()) {
            return Err(invalid("initial zoom is not finite"));
        }
        let config = &self.config;
        if config.tile_size == 0 {
            return Err(invalid("tile size must be positive"));
        }
        if config.min_lod > config.max_lod {
            return Err(invalid("min LOD above max LOD"));
        }
        Ok(())
    }

    /// Projection named by the description, or the kind's default
    pub fn projection_kind(&self) -> Result<ProjectionKind> {
        match &self.projection {
            Some(id) => ProjectionKind::from_provider_id(id),
            None => Ok(self.kind.behavior().default_projection()),
        }
    }

    /// Effective configuration with the top-level frame and navigation
    /// switches folded in
    pub fn resolved_config(&self) -> SceneConfig {
        let mut config = self.config.clone();
        if self.visual_frame.is_some() {
            config.visual_border = self.visual_frame;
        }
        let nav = self.navigation_disablement;
        config.navigation.pan |= nav.pan;
        config.navigation.zoom |= nav.zoom;
        config.navigation.wheel |= nav.wheel;
        config.navigation.keyboard |= nav.keyboard;
        config
    }
}

fn invalid(reason: &str) -> Error {
    Error::InvalidDescription(reason.to_string())
}
