//! Configuration for the tile window, surfaces and interaction behavior.
//!
//! Hosts either build a [`SceneConfig`] directly, deserialize it as part of
//! a scene description, or resolve one of the [`RendererProfile`] presets.

use crate::core::constants::*;
use crate::core::geo::GeoBorder;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq)]
pub enum RendererProfile {
    Balanced,
    LowMemory,
    Custom(SceneConfig),
}

impl RendererProfile {
    pub fn resolve(&self) -> SceneConfig {
        match self {
            Self::Balanced => SceneConfig::default(),
            Self::LowMemory => SceneConfig {
                surfaces: SurfaceBudget {
                    max_bitmap_dimension: 4096,
                    max_pixel_area: Some(2_000_000),
                    force_reduced: true,
                    reduced_ratio: 0.5,
                },
                fade_frames: 0,
                cluster_cache_capacity: 2,
                ..SceneConfig::default()
            },
            Self::Custom(config) => config.clone(),
        }
    }
}

impl Default for RendererProfile {
    fn default() -> Self {
        Self::Balanced
    }
}

/// Which user gestures are switched off for a scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NavigationDisablement {
    pub pan: bool,
    pub zoom: bool,
    pub wheel: bool,
    pub keyboard: bool,
}

/// Memory bounds for render surfaces
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SurfaceBudget {
    /// Largest edge a bitmap may have
    pub max_bitmap_dimension: u32,
    /// Largest pixel count a single bitmap may have
    pub max_pixel_area: Option<u64>,
    /// Always render surfaces at `reduced_ratio`
    pub force_reduced: bool,
    /// Ratio applied when reduction is forced
    pub reduced_ratio: f64,
}

impl SurfaceBudget {
    /// Ratio (≤ 1) a bitmap of the nominal size must be scaled by to fit
    pub fn reduction_for(&self, width: u32, height: u32) -> f64 {
        let mut ratio: f64 = if self.force_reduced {
            self.reduced_ratio.clamp(0.05, 1.0)
        } else {
            1.0
        };
        let max_dim = self.max_bitmap_dimension.max(1) as f64;
        let (w, h) = (width.max(1) as f64, height.max(1) as f64);
        ratio = ratio.min(max_dim / w).min(max_dim / h);
        if let Some(area) = self.max_pixel_area {
            ratio = ratio.min((area.max(1) as f64 / (w * h)).sqrt());
        }
        ratio.min(1.0)
    }
}

impl Default for SurfaceBudget {
    fn default() -> Self {
        Self {
            max_bitmap_dimension: DEFAULT_MAX_BITMAP_DIMENSION,
            max_pixel_area: None,
            force_reduced: false,
            reduced_ratio: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnimationConfig {
    pub enabled: bool,
    /// Duration of a one-LOD zoom animation
    pub zoom_duration_ms: u64,
}

impl AnimationConfig {
    /// Duration for a zoom spanning `lod_delta` levels, ∝ |Δ|^0.8
    pub fn zoom_duration(&self, lod_delta: f64) -> std::time::Duration {
        let scaled = self.zoom_duration_ms as f64 * lod_delta.abs().powf(ZOOM_DURATION_EXPONENT);
        std::time::Duration::from_secs_f64(scaled.max(0.0) / 1000.0)
    }
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            zoom_duration_ms: DEFAULT_ZOOM_ANIMATION_MS,
        }
    }
}

/// Scene-level renderer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SceneConfig {
    pub tile_size: u32,
    pub min_lod: f64,
    pub max_lod: f64,
    /// Fractional part above which the derived minimum LOD is rounded up
    pub min_lod_round_threshold: f64,
    /// Pixels of preloaded content kept around the viewport
    pub preload_margin: f64,
    /// How far the window may travel past the north/south (and configured
    /// east/west) border, in pixels
    pub max_pixel_beyond_poles: f64,
    /// Visual border in degrees; `None` means the projection's full extent
    pub visual_border: Option<GeoBorder>,
    pub navigation: NavigationDisablement,
    pub wheel_ticks_per_lod: u32,
    pub keyboard_pan_step: f64,
    pub hit_tolerance: f64,
    pub animation: AnimationConfig,
    pub surfaces: SurfaceBudget,
    /// Frames the previous foreground stays visible after a toggle
    pub fade_frames: u32,
    pub cluster_cache_capacity: usize,
    pub cluster_grid_size: f64,
}

impl SceneConfig {
    /// Tiles of preload margin kept on every side of the surface
    pub fn margin_tiles(&self) -> i64 {
        ((self.preload_margin / self.tile_size.max(1) as f64).ceil() as i64).max(1)
    }
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            tile_size: TILE_SIZE,
            min_lod: 0.0,
            max_lod: 19.0,
            min_lod_round_threshold: DEFAULT_MIN_LOD_ROUND_THRESHOLD,
            preload_margin: DEFAULT_PRELOAD_MARGIN,
            max_pixel_beyond_poles: 0.0,
            visual_border: None,
            navigation: NavigationDisablement::default(),
            wheel_ticks_per_lod: DEFAULT_WHEEL_TICKS_PER_LOD,
            keyboard_pan_step: DEFAULT_KEYBOARD_PAN_STEP,
            hit_tolerance: DEFAULT_HIT_TOLERANCE,
            animation: AnimationConfig::default(),
            surfaces: SurfaceBudget::default(),
            fade_frames: DEFAULT_FADE_FRAMES,
            cluster_cache_capacity: DEFAULT_CLUSTER_CACHE_CAPACITY,
            cluster_grid_size: DEFAULT_CLUSTER_GRID_SIZE,
        }
    }
}
