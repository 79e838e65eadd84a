pub mod dispatcher;
pub mod events;

// Re-export the essential types
pub use dispatcher::{compare_labels, DispatchOutcome, EventDispatcher, ModeAction};
pub use events::{
    EventKind, HitCandidate, InputMode, KeyCode, KeyModifiers, MouseButton, SceneEvent,
    SceneNotification, SelectionShape,
};
