use crate::core::geo::{LonLat, Point};
use crate::layers::vo::VoId;
use crate::rendering::surface::SurfaceSlot;
use crate::spatial::hot::HotItem;
use crate::tiles::source::RequestId;
use serde::{Deserialize, Serialize};

/// Host input delivered to a scene, positions in screen pixels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SceneEvent {
    PointerDown { position: Point, button: MouseButton },
    PointerMove { position: Point },
    PointerUp { position: Point, button: MouseButton },
    Click { position: Point },
    DoubleClick { position: Point },
    SecondaryClick { position: Point },
    /// Discrete wheel steps, positive zooms in
    Wheel { position: Point, ticks: i32 },
    KeyDown { key: KeyCode, modifiers: KeyModifiers },
    Resize { width: u32, height: u32 },
}

impl SceneEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            SceneEvent::PointerDown { .. } => EventKind::PointerDown,
            SceneEvent::PointerMove { .. } => EventKind::PointerMove,
            SceneEvent::PointerUp { .. } => EventKind::PointerUp,
            SceneEvent::Click { .. } => EventKind::Click,
            SceneEvent::DoubleClick { .. } => EventKind::DoubleClick,
            SceneEvent::SecondaryClick { .. } => EventKind::SecondaryClick,
            SceneEvent::Wheel { .. } => EventKind::Wheel,
            SceneEvent::KeyDown { .. } => EventKind::KeyDown,
            SceneEvent::Resize { .. } => EventKind::Resize,
        }
    }

    /// Gets the primary position associated with this event, if any
    pub fn position(&self) -> Option<Point> {
        match self {
            SceneEvent::PointerDown { position, .. }
            | SceneEvent::PointerMove { position }
            | SceneEvent::PointerUp { position, .. }
            | SceneEvent::Click { position }
            | SceneEvent::DoubleClick { position }
            | SceneEvent::SecondaryClick { position }
            | SceneEvent::Wheel { position, .. } => Some(*position),
            SceneEvent::KeyDown { .. } | SceneEvent::Resize { .. } => None,
        }
    }
}

/// Event type a visual object can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    PointerDown,
    PointerMove,
    PointerUp,
    Click,
    DoubleClick,
    SecondaryClick,
    Wheel,
    KeyDown,
    Resize,
}

impl EventKind {
    /// Click-class events go through overlap resolution
    pub fn is_click_class(&self) -> bool {
        matches!(
            self,
            EventKind::Click | EventKind::DoubleClick | EventKind::SecondaryClick
        )
    }
}

/// Keyboard key codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyCode {
    ArrowUp,
    ArrowDown,
    ArrowLeft,
    ArrowRight,
    Plus,
    Minus,
    Escape,
    Other(u32),
}

/// Keyboard modifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct KeyModifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
    pub meta: bool,
}

/// Mouse button types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

/// Interaction mode of the dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum InputMode {
    #[default]
    Default,
    TrackObject,
    TrackMap,
    TrackDesign,
    RectSelect,
    LassoSelect,
    RectZoom,
}

impl InputMode {
    /// Modes that follow a pointer drag with their own listeners
    pub fn is_tracking(&self) -> bool {
        !matches!(self, InputMode::Default)
    }
}

/// Shape collected by a selection mode
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionShape {
    Rect { north_west: LonLat, south_east: LonLat },
    Lasso(Vec<LonLat>),
}

/// Overlapping candidate offered for disambiguation
#[derive(Debug, Clone, PartialEq)]
pub struct HitCandidate {
    pub vo: VoId,
    pub index: usize,
    pub label: String,
}

/// Notifications queued by a scene for the host to drain
#[derive(Debug, Clone, PartialEq)]
pub enum SceneNotification {
    MoveStarted,
    Moved { center: LonLat },
    ZoomStarted { exact_lod: f64 },
    ZoomCompleted { exact_lod: f64 },
    TilesRequested { request_id: RequestId, surface: SurfaceSlot, lod: i32, is_zoom: bool },
    BufferToggled { foreground: SurfaceSlot },
    HotItemChanged { hot: Option<HotItem> },
    Disambiguate { event: SceneEvent, candidates: Vec<HitCandidate> },
    InputModeChanged { from: InputMode, to: InputMode },
    SelectionArea { mode: InputMode, shape: SelectionShape },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_click_class() {
        let click = SceneEvent::SecondaryClick {
            position: Point::new(1.0, 2.0),
        };
        assert!(click.kind().is_click_class());
        assert_eq!(click.position(), Some(Point::new(1.0, 2.0)));
        assert!(!EventKind::PointerMove.is_click_class());
        assert_eq!(
            SceneEvent::Resize {
                width: 1,
                height: 1
            }
            .position(),
            None
        );
    }
}
