//! Prelude module for common tilescape types and traits
//!
//! `use tilescape::prelude::*;` brings in what a host needs to build a scene,
//! feed it events and drive its frames.

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

pub use crate::input::{
    DispatchOutcome, EventKind, HitCandidate, InputMode, KeyCode, KeyModifiers, MouseButton,
    SceneEvent, SceneNotification,
};

pub use crate::layers::vo::{VisualObject, VoFlags, VoId};

pub use crate::rendering::{HitContext, RenderContext, SurfaceSlot};

pub use crate::spatial::{ClusteringEngine, GridClusterer, HotItem, VoClusters};

pub use crate::tiles::{GoTo, TileCompletion, TileReply, TileRequest, TileSource};

pub use crate::{Error, Result};

pub use instant::Instant;
pub use std::time::Duration;

pub use fxhash::{FxHashMap as HashMap, FxHashSet as HashSet};
