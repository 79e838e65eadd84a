use crate::core::bounds::Bounds;
use crate::core::geo::{LonLat, Point};
use crate::core::projection::{nearest_world_copy, world_size, Projection};
use crate::tiles::window::ViewState;
use image::{Rgba, RgbaImage};

/// Coordinate transforms handed to visual objects while they draw.
///
/// Overlay-type surfaces cover the viewport, but may be size-reduced; every
/// position a visual object writes must go through [`RenderContext::to_surface`]
/// so reduced bitmaps stay aligned with the screen.
#[derive(Clone, Copy)]
pub struct RenderContext<'a> {
    projection: &'a dyn Projection,
    view: ViewState,
    tile_size: u32,
    viewport: (u32, u32),
    /// Bitmap pixels per screen pixel of the target surface
    reduction: f64,
}

impl<'a> RenderContext<'a> {
    pub fn new(
        projection: &'a dyn Projection,
        view: ViewState,
        tile_size: u32,
        viewport: (u32, u32),
        reduction: f64,
    ) -> Self {
        Self {
            projection,
            view,
            tile_size,
            viewport,
            reduction,
        }
    }

    pub fn view(&self) -> ViewState {
        self.view
    }

    pub fn exact_lod(&self) -> f64 {
        self.view.exact_lod
    }

    pub fn reduction(&self) -> f64 {
        self.reduction
    }

    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    /// UCS pixels at the exact LOD
    pub fn to_ucs(&self, geo: LonLat) -> Point {
        self.projection.to_map_space(geo, self.view.exact_lod, self.tile_size)
    }

    /// Screen position on the world copy nearest the viewport center
    pub fn to_screen(&self, geo: LonLat) -> Point {
        let ucs = self.to_ucs(geo);
        let world = self.projection.extent().0 * world_size(self.view.exact_lod, self.tile_size);
        let anchor = self.view.left + self.viewport.0 as f64 / 2.0;
        Point::new(
            nearest_world_copy(ucs.x, anchor, world) - self.view.left,
            ucs.y - self.view.top,
        )
    }

    /// Bitmap coordinates on the target surface
    pub fn to_surface(&self, geo: LonLat) -> Point {
        self.to_screen(geo).multiply(self.reduction)
    }

    pub fn screen_to_geo(&self, screen: Point) -> LonLat {
        let ucs = Point::new(self.view.left + screen.x, self.view.top + screen.y);
        self.projection.to_geo(ucs, self.view.exact_lod, self.tile_size)
    }

    pub fn screen_bounds(&self) -> Bounds {
        Bounds::from_coords(0.0, 0.0, self.viewport.0 as f64, self.viewport.1 as f64)
    }

    pub fn is_visible(&self, screen: &Point, margin: f64) -> bool {
        self.screen_bounds().expanded(margin).contains(screen)
    }

    /// Fills a disc given in screen coordinates, clipped to the bitmap
    pub fn fill_disc(&self, bitmap: &mut RgbaImage, screen: Point, radius: f64, color: Rgba<u8>) {
        let center = screen.multiply(self.reduction);
        let r = (radius * self.reduction).max(0.5);
        let (w, h) = bitmap.dimensions();
        let min_x = (center.x - r).floor().max(0.0) as u32;
        let min_y = (center.y - r).floor().max(0.0) as u32;
        let max_x = ((center.x + r).ceil().max(0.0) as u32).min(w);
        let max_y = ((center.y + r).ceil().max(0.0) as u32).min(h);
        for y in min_y..max_y {
            for x in min_x..max_x {
                let dx = x as f64 + 0.5 - center.x;
                let dy = y as f64 + 0.5 - center.y;
                if dx * dx + dy * dy <= r * r {
                    bitmap.put_pixel(x, y, color);
                }
            }
        }
    }
}

/// A pointer position resolved for hit testing
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitContext {
    pub screen: Point,
    pub geo: LonLat,
    /// Screen-pixel radius within which an instance counts as hit
    pub tolerance: f64,
}

impl HitContext {
    pub fn hits(&self, screen: &Point, radius: f64) -> bool {
        self.screen.distance_to(screen) <= radius + self.tolerance
    }
}
