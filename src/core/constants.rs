//! Engine-wide defaults for the tile pipeline.
//! Keeping them in a single place makes it easier to tweak magic numbers.

/// Default square tile size in pixels.
pub const TILE_SIZE: u32 = 256;

/// Preload margin kept around the viewport before a pan triggers a reload.
pub const DEFAULT_PRELOAD_MARGIN: f64 = 128.0;

/// Highest LOD a scene accepts regardless of configuration.
pub const MAX_SUPPORTED_LOD: f64 = 24.0;

/// Fraction of a LOD above which a derived minimum LOD is rounded up.
pub const DEFAULT_MIN_LOD_ROUND_THRESHOLD: f64 = 0.3;

/// Wheel ticks needed to advance one full LOD.
pub const DEFAULT_WHEEL_TICKS_PER_LOD: u32 = 4;

/// Keyboard arrow pan distance in pixels.
pub const DEFAULT_KEYBOARD_PAN_STEP: f64 = 64.0;

/// Zoom animation duration for a one-LOD step, in milliseconds.
pub const DEFAULT_ZOOM_ANIMATION_MS: u64 = 300;

/// Exponent applied to |Δlod| when scaling the animation duration.
pub const ZOOM_DURATION_EXPONENT: f64 = 0.8;

/// Frames the old foreground stays behind the new one after a toggle.
pub const DEFAULT_FADE_FRAMES: u32 = 8;

/// Largest bitmap edge a render surface may allocate.
pub const DEFAULT_MAX_BITMAP_DIMENSION: u32 = 8192;

/// Number of cluster snapshots retained by the cache.
pub const DEFAULT_CLUSTER_CACHE_CAPACITY: usize = 8;

/// Grid cell edge, in pixels, used by the bundled grid clusterer.
pub const DEFAULT_CLUSTER_GRID_SIZE: f64 = 60.0;

/// Hit-test tolerance in screen pixels.
pub const DEFAULT_HIT_TOLERANCE: f64 = 4.0;

/// Semi-major axis eccentricity of the WGS84 ellipsoid.
pub const WGS84_ECCENTRICITY: f64 = 0.081_819_190_842_622;
