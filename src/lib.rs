//! # tilescape
//!
//! Core of a tile-based geospatial scene renderer.
//!
//! A [`Scene`] keeps a pannable, zoomable window of base-map tiles in sync
//! with overlay content drawn by visual objects. Tiles are requested from a
//! host-provided [`TileSource`] and come back through an inbox that the scene
//! drains once per frame; double-buffered base surfaces hide reloads, and a
//! clustering engine groups dense point content while keeping the hovered
//! element stable across reclustering.

pub mod core;
pub mod input;
pub mod layers;
pub mod prelude;
pub mod rendering;
pub mod spatial;
pub mod tiles;
pub use crate::core::constants;

// Re-export public API
pub use crate::core::{
    bounds::Bounds,
    builder::SceneBuilder,
    config::{RendererProfile, SceneConfig},
    description::SceneDescription,
    geo::{GeoBorder, LonLat, Point},
    kind::SceneKind,
    projection::{Projection, ProjectionKind},
    registry::SceneRegistry,
    scene::{FrameReport, Scene},
};

pub use input::{DispatchOutcome, InputMode, SceneEvent, SceneNotification};

pub use layers::vo::{VisualObject, VoArena, VoFlags, VoId};

pub use rendering::{HitContext, RenderContext, SurfaceSlot};

pub use spatial::{ClusterSnapshot, ClusteringEngine, GridClusterer, HotItem};

pub use tiles::{TileCompletion, TileReply, TileRequest, TileSource, ViewState};

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced to callers.
///
/// Superseded tile completions and stale cluster snapshots are not errors;
/// they are dropped where they arrive.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A strict-mode request would violate the LOD range or the visual border
    #[error("not possible: {reason}")]
    NotPossible { reason: String },

    #[error("unknown projection id: {0}")]
    UnknownProjection(String),

    #[error("scene description error: {0}")]
    Description(#[from] serde_json::Error),

    #[error("invalid scene description: {0}")]
    InvalidDescription(String),

    #[error("unknown visual object")]
    UnknownVisualObject,

    /// The operation does not apply to this scene kind
    #[error("operation not supported for this scene kind")]
    Unsupported,

    #[error("scene not found: {0}")]
    SceneNotFound(String),

    #[error("scene already registered: {0}")]
    DuplicateScene(String),
}

/// Installs an `env_logger` backend for the `log` facade.
///
/// Safe to call more than once; later calls are ignored.
#[cfg(feature = "debug")]
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .is_test(cfg!(test))
        .try_init();
}

/// No-op without the `debug` feature
#[cfg(not(feature = "debug"))]
pub fn init_logging() {}
