//! Scene kinds and their kind-specific behavior.

use crate::core::projection::ProjectionKind;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SceneKind {
    /// Tiled geographic map
    #[default]
    Geo,
    /// Host-composed 3D scene; only the overlay pipeline applies
    ThreeD,
    /// Untiled drawing plane
    Plain,
}

impl SceneKind {
    pub fn behavior(self) -> Box<dyn KindBehavior> {
        match self {
            SceneKind::Geo => Box::new(GeoBehavior),
            SceneKind::ThreeD => Box::new(ThreeDBehavior),
            SceneKind::Plain => Box::new(PlainBehavior),
        }
    }
}

/// What differs between scene kinds
pub trait KindBehavior: std::fmt::Debug {
    fn kind(&self) -> SceneKind;

    /// Whether 2D pan and zoom apply
    fn supports_navigation(&self) -> bool {
        true
    }

    /// Whether base tiles come from the host's tile source
    fn uses_tiles(&self) -> bool {
        true
    }

    /// Projection used when the description names none
    fn default_projection(&self) -> ProjectionKind {
        ProjectionKind::Mercator
    }
}

#[derive(Debug)]
struct GeoBehavior;

impl KindBehavior for GeoBehavior {
    fn kind(&self) -> SceneKind {
        SceneKind::Geo
    }
}

#[derive(Debug)]
struct ThreeDBehavior;

impl KindBehavior for ThreeDBehavior {
    fn kind(&self) -> SceneKind {
        SceneKind::ThreeD
    }

    fn supports_navigation(&self) -> bool {
        false
    }

    fn uses_tiles(&self) -> bool {
        false
    }
}

#[derive(Debug)]
struct PlainBehavior;

impl KindBehavior for PlainBehavior {
    fn kind(&self) -> SceneKind {
        SceneKind::Plain
    }

    fn uses_tiles(&self) -> bool {
        false
    }

    fn default_projection(&self) -> ProjectionKind {
        ProjectionKind::Linear
    }
}
