pub mod context;
pub mod pool;
pub mod surface;

// Re-export main types
pub use context::{HitContext, RenderContext};
pub use pool::{CompletionOutcome, SurfacePool};
pub use surface::{RenderSurface, SurfaceSlot};
