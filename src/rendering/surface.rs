use crate::core::bounds::Bounds;
use crate::tiles::source::RequestId;
use crate::tiles::window::ViewState;
use image::{imageops, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

/// Addressable render-surface slot in the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SurfaceSlot {
    BaseA,
    BaseB,
    Overlay,
    Label,
    Shadow,
    Scratch,
}

impl SurfaceSlot {
    pub fn is_base(&self) -> bool {
        matches!(self, SurfaceSlot::BaseA | SurfaceSlot::BaseB)
    }

    pub fn base(index: usize) -> SurfaceSlot {
        if index == 0 {
            SurfaceSlot::BaseA
        } else {
            SurfaceSlot::BaseB
        }
    }
}

impl std::fmt::Display for SurfaceSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SurfaceSlot::BaseA => "base-a",
            SurfaceSlot::BaseB => "base-b",
            SurfaceSlot::Overlay => "overlay",
            SurfaceSlot::Label => "label",
            SurfaceSlot::Shadow => "shadow",
            SurfaceSlot::Scratch => "scratch",
        };
        write!(f, "{}", name)
    }
}

/// One bitmap buffer plus its tile window and on-screen placement.
///
/// Placement (`pixel_*`) is always derived from the view through
/// [`RenderSurface::place`], never written directly by callers.
#[derive(Debug, Clone)]
pub struct RenderSurface {
    pub slot: SurfaceSlot,
    pub pixel_left: f64,
    pub pixel_top: f64,
    pub pixel_width: f64,
    pub pixel_height: f64,
    pub current_tile_x: i64,
    pub current_tile_y: i64,
    pub current_lod: i32,
    pub exact_lod: f64,
    pub tiles_x: u32,
    pub tiles_y: u32,
    pub valid: bool,
    /// Bitmap size divided by nominal size (1.0 unless size-reduced)
    pub reduction: f64,
    pub opacity: f32,
    pub(crate) pending: Option<RequestId>,
    pub(crate) fade_frames_left: u32,
    pub(crate) retain_frames_left: Option<u32>,
    nominal_width: u32,
    nominal_height: u32,
    bitmap: RgbaImage,
}

impl RenderSurface {
    pub fn new(slot: SurfaceSlot, nominal_width: u32, nominal_height: u32, reduction: f64) -> Self {
        let reduction = reduction.clamp(f64::EPSILON, 1.0);
        let (bw, bh) = Self::bitmap_dims(nominal_width, nominal_height, reduction);
        if reduction < 1.0 {
            log::info!(
                "{} surface reduced to {}x{} (ratio {:.3})",
                slot,
                bw,
                bh,
                reduction
            );
        }
        Self {
            slot,
            pixel_left: 0.0,
            pixel_top: 0.0,
            pixel_width: nominal_width as f64,
            pixel_height: nominal_height as f64,
            current_tile_x: 0,
            current_tile_y: 0,
            current_lod: 0,
            exact_lod: 0.0,
            tiles_x: 0,
            tiles_y: 0,
            valid: false,
            reduction,
            opacity: 1.0,
            pending: None,
            fade_frames_left: 0,
            retain_frames_left: None,
            nominal_width,
            nominal_height,
            bitmap: RgbaImage::new(bw, bh),
        }
    }

    /// Base or scratch surface sized for a `tiles_x` × `tiles_y` window
    pub fn for_tiles(slot: SurfaceSlot, tiles_x: u32, tiles_y: u32, tile_size: u32, reduction: f64) -> Self {
        let mut surface = Self::new(slot, tiles_x * tile_size, tiles_y * tile_size, reduction);
        surface.tiles_x = tiles_x;
        surface.tiles_y = tiles_y;
        surface
    }

    fn bitmap_dims(width: u32, height: u32, reduction: f64) -> (u32, u32) {
        (
            ((width as f64 * reduction).round() as u32).max(1),
            ((height as f64 * reduction).round() as u32).max(1),
        )
    }

    pub fn nominal_size(&self) -> (u32, u32) {
        (self.nominal_width, self.nominal_height)
    }

    pub fn bitmap(&self) -> &RgbaImage {
        &self.bitmap
    }

    pub fn bitmap_mut(&mut self) -> &mut RgbaImage {
        &mut self.bitmap
    }

    pub fn is_reduced(&self) -> bool {
        self.reduction < 1.0
    }

    pub fn pending_request(&self) -> Option<RequestId> {
        self.pending
    }

    pub fn is_retained(&self) -> bool {
        self.retain_frames_left.is_some()
    }

    /// Screen rectangle currently covered by the surface
    pub fn screen_bounds(&self) -> Bounds {
        Bounds::from_origin_and_size(
            crate::core::geo::Point::new(self.pixel_left, self.pixel_top),
            self.pixel_width,
            self.pixel_height,
        )
    }

    /// Tile-window rectangle in UCS pixels of `current_lod`
    pub fn tile_bounds(&self, tile_size: u32) -> Bounds {
        let t = tile_size as f64;
        Bounds::from_coords(
            self.current_tile_x as f64 * t,
            self.current_tile_y as f64 * t,
            (self.current_tile_x + self.tiles_x as i64) as f64 * t,
            (self.current_tile_y + self.tiles_y as i64) as f64 * t,
        )
    }

    /// Screen pixels per bitmap pixel, including the reduction ratio
    pub fn bitmap_to_screen_scale(&self) -> f64 {
        let stretch = 2_f64.powf(self.exact_lod - self.current_lod as f64);
        stretch / self.reduction
    }

    /// Derives placement from the view; surfaces follow the view, they are
    /// never moved independently.
    pub fn place(&mut self, view: &ViewState, tile_size: u32) {
        self.exact_lod = view.exact_lod;
        let stretch = 2_f64.powf(view.exact_lod - self.current_lod as f64);
        let t = tile_size as f64 * stretch;
        self.pixel_left = self.current_tile_x as f64 * t - view.left;
        self.pixel_top = self.current_tile_y as f64 * t - view.top;
        self.pixel_width = self.tiles_x as f64 * t;
        self.pixel_height = self.tiles_y as f64 * t;
    }

    /// Fixed full-viewport placement for overlay-type surfaces
    pub fn place_fixed(&mut self, exact_lod: f64) {
        self.exact_lod = exact_lod;
        self.pixel_left = 0.0;
        self.pixel_top = 0.0;
        self.pixel_width = self.nominal_width as f64;
        self.pixel_height = self.nominal_height as f64;
    }

    /// Points the surface at a new tile window and marks it in flight
    pub(crate) fn begin_request(&mut self, id: RequestId, lod: i32, tile_x: i64, tile_y: i64) {
        self.pending = Some(id);
        self.current_lod = lod;
        self.current_tile_x = tile_x;
        self.current_tile_y = tile_y;
        self.valid = false;
        self.retain_frames_left = None;
        self.fade_frames_left = 0;
    }

    /// Applies completed tile pixels, scaling them to the bitmap size
    pub(crate) fn fill(&mut self, pixels: Option<RgbaImage>) {
        match pixels {
            Some(image) if image.dimensions() == self.bitmap.dimensions() => self.bitmap = image,
            Some(image) => {
                let (w, h) = self.bitmap.dimensions();
                self.bitmap = imageops::resize(&image, w, h, imageops::FilterType::Triangle);
            }
            None => self.clear(),
        }
        self.pending = None;
        self.valid = true;
    }

    pub fn clear(&mut self) {
        for pixel in self.bitmap.pixels_mut() {
            *pixel = Rgba([0, 0, 0, 0]);
        }
    }

    pub fn invalidate(&mut self) {
        self.valid = false;
        self.retain_frames_left = None;
        self.fade_frames_left = 0;
        self.opacity = 1.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placement_follows_view() {
        let mut s = RenderSurface::for_tiles(SurfaceSlot::BaseA, 4, 3, 256, 1.0);
        s.current_tile_x = 10;
        s.current_tile_y = 5;
        s.current_lod = 5;
        let view = ViewState::new(5.0, 10.0 * 256.0 + 100.0, 5.0 * 256.0 + 50.0);
        s.place(&view, 256);
        assert_eq!(s.pixel_left, -100.0);
        assert_eq!(s.pixel_top, -50.0);
        assert_eq!(s.pixel_width, 1024.0);

        let stretched = ViewState::new(6.0, 0.0, 0.0);
        s.place(&stretched, 256);
        assert_eq!(s.pixel_width, 2048.0);
        assert_eq!(s.pixel_left, 10.0 * 512.0);
    }

    #[test]
    fn test_reduced_surface_scale() {
        let mut s = RenderSurface::for_tiles(SurfaceSlot::BaseB, 4, 4, 256, 0.5);
        assert_eq!(s.bitmap().dimensions(), (512, 512));
        assert!(s.is_reduced());
        s.current_lod = 3;
        s.place(&ViewState::new(3.0, 0.0, 0.0), 256);
        assert_eq!(s.bitmap_to_screen_scale(), 2.0);
    }

    #[test]
    fn test_fill_resizes_to_bitmap() {
        let mut s = RenderSurface::for_tiles(SurfaceSlot::Scratch, 2, 2, 256, 0.5);
        s.begin_request(RequestId(4), 1, 0, 0);
        assert!(!s.valid);
        s.fill(Some(RgbaImage::from_pixel(512, 512, Rgba([9, 9, 9, 255]))));
        assert!(s.valid);
        assert!(s.pending_request().is_none());
        assert_eq!(s.bitmap().dimensions(), (256, 256));
        assert_eq!(s.bitmap().get_pixel(10, 10), &Rgba([9, 9, 9, 255]));
    }
}
