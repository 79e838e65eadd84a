pub mod inbox;
pub mod source;
pub mod window;

// Re-exports for convenience
pub use inbox::{TileCompletion, TileInbox, TileReply};
pub use source::{BlankTileSource, RequestId, TileRequest, TileSource};
pub use window::{GoTo, MoveOutcome, TileWindow, TileWindowController, ViewState, ZoomOutcome};
