use crate::rendering::surface::SurfaceSlot;
use crate::tiles::inbox::TileReply;

/// Identity of one tile request; newer requests carry larger ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(pub u64);

/// A rectangular block of tiles to be drawn into one render surface
#[derive(Debug, Clone, PartialEq)]
pub struct TileRequest {
    pub request_id: RequestId,
    pub surface: SurfaceSlot,
    pub layer_stack: String,
    pub tile_x: i64,
    pub tile_y: i64,
    pub tiles_x: u32,
    pub tiles_y: u32,
    pub lod: i32,
    /// True when the request replaces the tile set after a LOD change
    pub is_zoom_request: bool,
}

impl TileRequest {
    /// Columns wrapped into the world grid, in request order
    pub fn wrapped_columns(&self) -> impl Iterator<Item = i64> + '_ {
        let n = crate::core::geo::TileCoord::grid_size(self.lod);
        (0..self.tiles_x as i64).map(move |i| (self.tile_x + i).rem_euclid(n))
    }
}

/// Anything that can fetch bitmap tiles for a surface.
///
/// `request_tiles` returns whether the request was accepted. Accepted
/// requests complete later by sending a [`TileCompletion`](crate::tiles::inbox::TileCompletion)
/// through `reply`; a source may also reply before returning.
pub trait TileSource {
    fn request_tiles(&mut self, request: &TileRequest, reply: &TileReply) -> bool;
}

/// Source used by scenes without base tiles: completes every request
/// immediately with an empty (transparent) surface.
#[derive(Debug, Default, Clone, Copy)]
pub struct BlankTileSource;

impl TileSource for BlankTileSource {
    fn request_tiles(&mut self, request: &TileRequest, reply: &TileReply) -> bool {
        reply.complete_empty(request)
    }
}
