//! Tile window controller: pan/zoom math, border clamping and tile requests.
//!
//! The view is a single [`ViewState`] in UCS pixels at the exact LOD. Every
//! surface placement is derived from it, so pan and stretch-zoom only touch
//! the view and then re-place the pool. Whether tiles must be reloaded is
//! decided afterwards by comparing the surfaces' tile windows against the
//! visible region plus the preload margin.

use crate::core::bounds::Bounds;
use crate::core::config::SceneConfig;
use crate::core::constants::MAX_SUPPORTED_LOD;
use crate::core::geo::{GeoBorder, LonLat, Point};
use crate::core::projection::{nearest_world_copy, world_size, Projection};
use crate::rendering::pool::{CompletionOutcome, SurfacePool};
use crate::rendering::surface::{RenderSurface, SurfaceSlot};
use crate::tiles::inbox::{TileCompletion, TileReply};
use crate::tiles::source::{RequestId, TileRequest, TileSource};
use crate::{Error, Result};

/// Position of the viewport's top-left corner in UCS pixels at `exact_lod`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewState {
    pub exact_lod: f64,
    pub left: f64,
    pub top: f64,
}

impl ViewState {
    pub fn new(exact_lod: f64, left: f64, top: f64) -> Self {
        Self {
            exact_lod,
            left,
            top,
        }
    }

    /// Integer LOD whose tile set backs this view
    pub fn lod(&self) -> i32 {
        self.exact_lod.floor().max(0.0) as i32
    }

    /// Display scale of `lod` tiles at this view's exact LOD
    pub fn stretch_for(&self, lod: i32) -> f64 {
        2_f64.powf(self.exact_lod - lod as f64)
    }
}

/// The discrete tile window currently shown
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileWindow {
    pub lod: i32,
    pub tile_x: i64,
    pub tile_y: i64,
    pub tiles_x: u32,
    pub tiles_y: u32,
    pub exact_lod: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MoveOutcome {
    /// Translation actually applied after border clamping
    pub applied: Point,
    pub clamped: bool,
    pub request: Option<TileRequest>,
}

impl MoveOutcome {
    pub fn moved(&self) -> bool {
        self.applied.x != 0.0 || self.applied.y != 0.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ZoomOutcome {
    pub previous_exact_lod: f64,
    pub exact_lod: f64,
    /// The floor LOD did not change, so existing tiles were only stretched
    pub stretch_only: bool,
    pub request: Option<TileRequest>,
}

impl ZoomOutcome {
    pub fn changed(&self) -> bool {
        self.exact_lod != self.previous_exact_lod
    }
}

/// Absolute repositioning parameters for [`TileWindowController::zoom_to_geo_position`]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GoTo {
    /// Fail with `NotPossible` instead of clamping
    pub clamp_only: bool,
    pub suppress_events: bool,
    pub suppress_render: bool,
    /// Screen offset of the target from the viewport center
    pub pixel_shift: Point,
}

/// Keeps `pos` (the low edge of a window of `size`) within `[lo, hi]` plus
/// `tolerance`; an extent smaller than the window is centered instead.
fn clamp_axis(pos: f64, size: f64, lo: f64, hi: f64, tolerance: f64) -> f64 {
    let extent = hi - lo;
    if extent + 2.0 * tolerance < size {
        lo + (extent - size) / 2.0
    } else {
        pos.clamp(lo - tolerance, hi + tolerance - size)
    }
}

/// Owns the view, the surface pool and the tile source of one scene.
///
/// All surface geometry changes go through this controller.
pub struct TileWindowController {
    config: SceneConfig,
    projection: Box<dyn Projection>,
    viewport: (u32, u32),
    view: ViewState,
    pool: SurfacePool,
    tile_dims: (u32, u32),
    next_request_id: u64,
    layer_stack: String,
    source: Box<dyn TileSource>,
    reply: TileReply,
}

impl std::fmt::Debug for TileWindowController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileWindowController")
            .field("projection", &self.projection.kind())
            .field("viewport", &self.viewport)
            .field("view", &self.view)
            .field("tile_dims", &self.tile_dims)
            .field("layer_stack", &self.layer_stack)
            .finish()
    }
}

impl TileWindowController {
    pub fn new(
        config: SceneConfig,
        projection: Box<dyn Projection>,
        viewport: (u32, u32),
        layer_stack: impl Into<String>,
        source: Box<dyn TileSource>,
        reply: TileReply,
    ) -> Self {
        let viewport = (viewport.0.max(1), viewport.1.max(1));
        let tile_dims = Self::tile_dims_for(&config, viewport);
        let pool = SurfacePool::new(
            viewport,
            tile_dims,
            config.tile_size,
            config.surfaces,
            config.fade_frames,
        );
        let mut controller = Self {
            config,
            projection,
            viewport,
            view: ViewState::new(0.0, 0.0, 0.0),
            pool,
            tile_dims,
            next_request_id: 1,
            layer_stack: layer_stack.into(),
            source,
            reply,
        };
        let lod = controller.min_lod();
        let border = controller.border_pixels(lod);
        let center = border.center();
        controller.view = controller.clamp_view(ViewState::new(
            lod,
            center.x - viewport.0 as f64 / 2.0,
            center.y - viewport.1 as f64 / 2.0,
        ));
        controller.pool.place_all(&controller.view);
        controller
    }

    fn tile_dims_for(config: &SceneConfig, viewport: (u32, u32)) -> (u32, u32) {
        let t = config.tile_size.max(1);
        let m = config.margin_tiles() as u32;
        (
            viewport.0.div_ceil(t) + 2 * m + 1,
            viewport.1.div_ceil(t) + 2 * m + 1,
        )
    }

    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    pub fn projection(&self) -> &dyn Projection {
        self.projection.as_ref()
    }

    pub fn view(&self) -> ViewState {
        self.view
    }

    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    pub fn pool(&self) -> &SurfacePool {
        &self.pool
    }

    pub(crate) fn pool_mut(&mut self) -> &mut SurfacePool {
        &mut self.pool
    }

    pub fn tile_dims(&self) -> (u32, u32) {
        self.tile_dims
    }

    pub fn layer_stack(&self) -> &str {
        &self.layer_stack
    }

    pub(crate) fn set_layer_stack(&mut self, layer_stack: impl Into<String>) {
        self.layer_stack = layer_stack.into();
    }

    pub(crate) fn set_source(&mut self, source: Box<dyn TileSource>) {
        self.source = source;
    }

    /// The tile window of the foreground surface, or the one that would be
    /// requested if nothing is loaded yet
    pub fn window(&self) -> TileWindow {
        let active = self.pool.active();
        let (lod, tile_x, tile_y) = if active.valid {
            (active.current_lod, active.current_tile_x, active.current_tile_y)
        } else {
            let lod = self.view.lod();
            let (x, y) = self.required_origin(lod);
            (lod, x, y)
        };
        TileWindow {
            lod,
            tile_x,
            tile_y,
            tiles_x: self.tile_dims.0,
            tiles_y: self.tile_dims.1,
            exact_lod: self.view.exact_lod,
        }
    }

    pub fn max_lod(&self) -> f64 {
        self.config.max_lod.min(MAX_SUPPORTED_LOD)
    }

    /// Smallest exact LOD at which the visual border still fills the
    /// viewport, rounded up when the fractional part passes the threshold
    pub fn min_lod(&self) -> f64 {
        let border = self.border_pixels(0.0);
        let (vw, vh) = (self.viewport.0 as f64, self.viewport.1 as f64);
        let raw = (vw / border.width().max(f64::EPSILON))
            .log2()
            .max((vh / border.height().max(f64::EPSILON)).log2());
        let fraction = raw - raw.floor();
        let derived = if fraction > self.config.min_lod_round_threshold {
            raw.ceil()
        } else {
            raw.floor()
        };
        derived.max(self.config.min_lod).max(0.0).min(self.max_lod())
    }

    fn border(&self) -> GeoBorder {
        self.config.visual_border.unwrap_or_else(|| {
            let max = self.projection.max_latitude().to_degrees();
            GeoBorder::new(max, -max)
        })
    }

    /// Visual border in UCS pixels at `exact_lod`
    pub fn border_pixels(&self, exact_lod: f64) -> Bounds {
        let border = self.border();
        self.projection.map_bounds(
            border.north_west(),
            border.south_east(),
            exact_lod,
            self.config.tile_size,
        )
    }

    fn clamp_view(&self, view: ViewState) -> ViewState {
        let border = self.border_pixels(view.exact_lod);
        let tolerance = self.config.max_pixel_beyond_poles;
        let (vw, vh) = (self.viewport.0 as f64, self.viewport.1 as f64);
        let left = if self.border().has_longitude_limits() {
            clamp_axis(view.left, vw, border.min.x, border.max.x, tolerance)
        } else {
            view.left
        };
        let top = clamp_axis(view.top, vh, border.min.y, border.max.y, tolerance);
        ViewState::new(view.exact_lod, left, top)
    }

    /// Translates the map content by `(dx, dy)` screen pixels.
    ///
    /// Positive `dx` moves content right, i.e. the window travels west.
    /// Each axis is clamped to the border on its own, so a diagonal pan
    /// against a pole keeps its longitude component.
    pub fn move_by(&mut self, dx: f64, dy: f64) -> MoveOutcome {
        let wanted = ViewState::new(self.view.exact_lod, self.view.left - dx, self.view.top - dy);
        let next = self.clamp_view(wanted);
        let applied = Point::new(self.view.left - next.left, self.view.top - next.top);
        let clamped = next != wanted;
        if clamped {
            log::debug!(
                "pan clamped to border: wanted ({:.1}, {:.1}) applied ({:.1}, {:.1})",
                dx,
                dy,
                applied.x,
                applied.y
            );
        }
        self.view = next;
        self.pool.place_all(&self.view);
        let request = self.ensure_tiles();
        MoveOutcome {
            applied,
            clamped,
            request,
        }
    }

    /// Snaps an exact LOD to `ticks` steps per integer LOD and clamps it
    pub fn quantize(&self, exact_lod: f64, ticks: Option<u32>) -> f64 {
        let (min, max) = (self.min_lod(), self.max_lod());
        let clamped = exact_lod.clamp(min, max);
        match ticks.filter(|n| *n > 0) {
            Some(n) => {
                let n = n as f64;
                ((clamped * n).round() / n).clamp(min, max)
            }
            None => clamped,
        }
    }

    /// Zooms by `factor` around the screen point `origin`, which keeps its
    /// geographic position.
    pub fn zoom_by(&mut self, factor: f64, origin: Point, ticks: Option<u32>) -> ZoomOutcome {
        let previous = self.view.exact_lod;
        let target = if factor.is_finite() && factor > 0.0 {
            self.quantize(previous + factor.log2(), ticks)
        } else {
            log::warn!("ignoring zoom by non-positive factor {}", factor);
            previous
        };
        self.zoom_to_lod(target, origin)
    }

    /// Sets the exact LOD directly, keeping `origin` fixed on screen
    pub fn zoom_to_lod(&mut self, target: f64, origin: Point) -> ZoomOutcome {
        let previous = self.view.exact_lod;
        let target = target.clamp(self.min_lod(), self.max_lod());
        let ratio = 2_f64.powf(target - previous);
        let wanted = ViewState::new(
            target,
            (self.view.left + origin.x) * ratio - origin.x,
            (self.view.top + origin.y) * ratio - origin.y,
        );
        self.view = self.clamp_view(wanted);
        self.pool.place_all(&self.view);
        let request = self.ensure_tiles();
        ZoomOutcome {
            previous_exact_lod: previous,
            exact_lod: target,
            stretch_only: previous.floor() == target.floor(),
            request,
        }
    }

    /// Centers `geo` (shifted by `pixel_shift`) at the given LOD.
    ///
    /// With `clamp_only` set the call fails rather than adjusting a target
    /// outside the LOD range or one that the border would move.
    pub fn zoom_to_geo_position(&mut self, geo: LonLat, lod: f64, options: GoTo) -> Result<ZoomOutcome> {
        let (min, max) = (self.min_lod(), self.max_lod());
        if options.clamp_only && !(min..=max).contains(&lod) {
            return Err(Error::NotPossible {
                reason: format!("LOD {lod} outside [{min}, {max}]"),
            });
        }
        let exact = lod.clamp(min, max);
        let p = self.projection.to_map_space(geo, exact, self.config.tile_size);
        let wanted = ViewState::new(
            exact,
            p.x - self.viewport.0 as f64 / 2.0 + options.pixel_shift.x,
            p.y - self.viewport.1 as f64 / 2.0 + options.pixel_shift.y,
        );
        let next = self.clamp_view(wanted);
        let drift = (next.left - wanted.left).abs().max((next.top - wanted.top).abs());
        if options.clamp_only && drift > 0.5 {
            return Err(Error::NotPossible {
                reason: format!("target lies {drift:.1}px beyond the visual border"),
            });
        }
        let previous = self.view.exact_lod;
        self.view = next;
        self.pool.place_all(&self.view);
        let request = self.ensure_tiles();
        Ok(ZoomOutcome {
            previous_exact_lod: previous,
            exact_lod: exact,
            stretch_only: previous.floor() == exact.floor(),
            request,
        })
    }

    /// Tile origin of the window that would be requested for `lod`
    fn required_origin(&self, lod: i32) -> (i64, i64) {
        let t = self.config.tile_size as f64;
        let stretch = self.view.stretch_for(lod);
        let m = self.config.margin_tiles();
        (
            (self.view.left / stretch / t).floor() as i64 - m,
            (self.view.top / stretch / t).floor() as i64 - m,
        )
    }

    /// Region a surface at `lod` must cover: the viewport plus preload
    /// margin, in UCS pixels of `lod`, with rows limited to the world
    fn coverage_region(&self, lod: i32) -> Bounds {
        let stretch = self.view.stretch_for(lod);
        let margin = self.config.preload_margin;
        let left = self.view.left / stretch;
        let top = self.view.top / stretch;
        let world_h = world_size(lod as f64, self.config.tile_size) * self.projection.extent().1;
        let min_y = (top - margin).clamp(0.0, world_h);
        let max_y = (top + self.viewport.1 as f64 / stretch + margin).clamp(min_y, world_h);
        Bounds::from_coords(
            left - margin,
            min_y,
            left + self.viewport.0 as f64 / stretch + margin,
            max_y,
        )
    }

    fn covers(&self, surface: &RenderSurface, lod: i32, region: &Bounds) -> bool {
        surface.current_lod == lod && surface.tile_bounds(self.config.tile_size).contains_bounds(region)
    }

    /// Issues a tile request if neither the foreground nor an in-flight
    /// request covers the current view
    pub fn ensure_tiles(&mut self) -> Option<TileRequest> {
        let lod = self.view.lod();
        let region = self.coverage_region(lod);
        let inactive_slot = self.pool.inactive_slot();

        let inactive = self.pool.inactive();
        if inactive.pending_request().is_some() && inactive.current_lod != lod {
            self.pool.abandon(inactive_slot);
        }

        let active = self.pool.active();
        if active.valid && self.covers(active, lod, &region) {
            self.pool.abandon(inactive_slot);
            self.pool.abandon(SurfaceSlot::Scratch);
            return None;
        }
        let inactive = self.pool.inactive();
        if inactive.pending_request().is_some() && self.covers(inactive, lod, &region) {
            self.pool.abandon(SurfaceSlot::Scratch);
            return None;
        }
        let scratch = self.pool.scratch();
        if scratch.pending_request().is_some() && self.covers(scratch, lod, &region) {
            return None;
        }

        let active = self.pool.active();
        if active.valid && active.current_lod == lod {
            self.issue(SurfaceSlot::Scratch, lod, false)
        } else {
            let is_zoom = active.valid;
            self.pool.abandon(SurfaceSlot::Scratch);
            self.issue(inactive_slot, lod, is_zoom)
        }
    }

    fn issue(&mut self, slot: SurfaceSlot, lod: i32, is_zoom_request: bool) -> Option<TileRequest> {
        let (tile_x, tile_y) = self.required_origin(lod);
        let request_id = RequestId(self.next_request_id);
        self.next_request_id += 1;
        let request = TileRequest {
            request_id,
            surface: slot,
            layer_stack: self.layer_stack.clone(),
            tile_x,
            tile_y,
            tiles_x: self.tile_dims.0,
            tiles_y: self.tile_dims.1,
            lod,
            is_zoom_request,
        };

        let view = self.view;
        let tile_size = self.config.tile_size;
        let surface = self.pool.surface_mut(slot)?;
        surface.begin_request(request_id, lod, tile_x, tile_y);
        surface.place(&view, tile_size);

        if self.source.request_tiles(&request, &self.reply) {
            log::debug!(
                "requested {}x{} tiles at ({}, {}) lod {} into {} ({:?}{})",
                request.tiles_x,
                request.tiles_y,
                tile_x,
                tile_y,
                lod,
                slot,
                request_id,
                if is_zoom_request { ", zoom" } else { "" }
            );
            Some(request)
        } else {
            log::warn!("tile source rejected request {:?} for {}", request_id, slot);
            self.pool.abandon(slot);
            None
        }
    }

    /// Applies a tile completion and re-places the pool
    pub fn apply_completion(&mut self, completion: TileCompletion) -> CompletionOutcome {
        let outcome = self.pool.complete(completion);
        if outcome != CompletionOutcome::Stale {
            self.pool.place_all(&self.view);
        }
        outcome
    }

    /// Reallocates the pool for a new viewport size, keeping the center
    pub fn resize(&mut self, width: u32, height: u32) -> Option<TileRequest> {
        let viewport = (width.max(1), height.max(1));
        let center = Point::new(
            self.view.left + self.viewport.0 as f64 / 2.0,
            self.view.top + self.viewport.1 as f64 / 2.0,
        );
        self.pool.release_all();
        self.viewport = viewport;
        self.tile_dims = Self::tile_dims_for(&self.config, viewport);
        self.pool = SurfacePool::new(
            viewport,
            self.tile_dims,
            self.config.tile_size,
            self.config.surfaces,
            self.config.fade_frames,
        );
        let exact = self.view.exact_lod.clamp(self.min_lod(), self.max_lod());
        let ratio = 2_f64.powf(exact - self.view.exact_lod);
        self.view = self.clamp_view(ViewState::new(
            exact,
            center.x * ratio - viewport.0 as f64 / 2.0,
            center.y * ratio - viewport.1 as f64 / 2.0,
        ));
        log::info!(
            "resized viewport to {}x{} ({}x{} tiles)",
            viewport.0,
            viewport.1,
            self.tile_dims.0,
            self.tile_dims.1
        );
        self.pool.place_all(&self.view);
        self.ensure_tiles()
    }

    /// Replaces the configuration, rebuilding the pool
    pub(crate) fn reconfigure(&mut self, config: SceneConfig) -> Option<TileRequest> {
        self.config = config;
        let (w, h) = self.viewport;
        self.resize(w, h)
    }

    pub fn screen_to_geo(&self, screen: Point) -> LonLat {
        let ucs = Point::new(self.view.left + screen.x, self.view.top + screen.y);
        let geo = self.projection.to_geo(ucs, self.view.exact_lod, self.config.tile_size);
        LonLat::new(LonLat::wrap_lon(geo.lon), geo.lat)
    }

    /// Screen position on the world copy nearest the viewport center
    pub fn geo_to_screen(&self, geo: LonLat) -> Point {
        let ucs = self
            .projection
            .to_map_space(geo, self.view.exact_lod, self.config.tile_size);
        let world = self.projection.extent().0 * world_size(self.view.exact_lod, self.config.tile_size);
        let anchor = self.view.left + self.viewport.0 as f64 / 2.0;
        Point::new(
            nearest_world_copy(ucs.x, anchor, world) - self.view.left,
            ucs.y - self.view.top,
        )
    }

    pub fn center_geo(&self) -> LonLat {
        self.screen_to_geo(Point::new(
            self.viewport.0 as f64 / 2.0,
            self.viewport.1 as f64 / 2.0,
        ))
    }

    /// Viewport rectangle in UCS pixels at the exact LOD
    pub fn visible_bounds(&self) -> Bounds {
        Bounds::from_origin_and_size(
            Point::new(self.view.left, self.view.top),
            self.viewport.0 as f64,
            self.viewport.1 as f64,
        )
    }

    /// Drops all surfaces and outstanding requests
    pub fn release(&mut self) {
        self.pool.release_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::projection::ProjectionKind;
    use crate::tiles::inbox::TileInbox;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default, Clone)]
    struct Recording {
        requests: Rc<RefCell<Vec<TileRequest>>>,
        reject: bool,
    }

    impl TileSource for Recording {
        fn request_tiles(&mut self, request: &TileRequest, _reply: &TileReply) -> bool {
            self.requests.borrow_mut().push(request.clone());
            !self.reject
        }
    }

    fn controller_with(config: SceneConfig, source: Recording) -> (TileWindowController, TileInbox) {
        let inbox = TileInbox::new();
        let controller = TileWindowController::new(
            config,
            ProjectionKind::Mercator.build(),
            (800, 600),
            "base",
            Box::new(source),
            inbox.reply(),
        );
        (controller, inbox)
    }

    fn complete_last(controller: &mut TileWindowController, inbox: &TileInbox, source: &Recording) {
        let request = source.requests.borrow().last().cloned().unwrap();
        inbox.reply().complete_empty(&request);
        for completion in inbox.drain() {
            controller.apply_completion(completion);
        }
    }

    #[test]
    fn test_pan_past_north_border_stops_at_border() {
        let source = Recording::default();
        let (mut controller, _inbox) = controller_with(SceneConfig::default(), source);
        controller.view = ViewState::new(3.0, 400.0, 0.0);

        let outcome = controller.move_by(30.0, 50.0);
        assert!(outcome.clamped);
        assert!(controller.view().top.abs() < 1.0);
        assert_eq!(outcome.applied.x, 30.0);
        assert!(outcome.applied.y.abs() < 1.0);
        assert_eq!(controller.view().left, 370.0);
    }

    #[test]
    fn test_pole_tolerance() {
        let config = SceneConfig {
            max_pixel_beyond_poles: 20.0,
            ..SceneConfig::default()
        };
        let (mut controller, _inbox) = controller_with(config, Recording::default());
        controller.view = ViewState::new(4.0, 0.0, 100.0);
        controller.move_by(0.0, 500.0);
        assert!((controller.view().top + 20.0).abs() < 1e-6);

        let world = world_size(4.0, 256);
        controller.move_by(0.0, -1e7);
        assert!((controller.view().top - (world + 20.0 - 600.0)).abs() < 1e-6);
    }

    #[test]
    fn test_stretch_zoom_issues_no_request() {
        let source = Recording::default();
        let (mut controller, inbox) = controller_with(SceneConfig::default(), source.clone());
        controller
            .zoom_to_geo_position(LonLat::from_degrees(10.0, 45.0), 5.0, GoTo::default())
            .unwrap();
        complete_last(&mut controller, &inbox, &source);
        let before = source.requests.borrow().len();
        assert_eq!(controller.pool().active().current_lod, 5);

        let outcome = controller.zoom_by(2_f64.powf(0.5), Point::new(400.0, 300.0), Some(12));
        assert_eq!(outcome.exact_lod, 5.5);
        assert!(outcome.stretch_only);
        assert!(outcome.request.is_none());
        assert_eq!(source.requests.borrow().len(), before);
        assert_eq!(controller.pool().active().current_lod, 5);
        assert_eq!(controller.pool().active().pixel_width, 2_f64.powf(0.5) * 256.0 * 7.0);
    }

    #[test]
    fn test_zoom_origin_stays_fixed() {
        let (mut controller, _inbox) = controller_with(SceneConfig::default(), Recording::default());
        controller
            .zoom_to_geo_position(LonLat::from_degrees(0.0, 0.0), 6.0, GoTo::default())
            .unwrap();
        let origin = Point::new(200.0, 150.0);
        let before = controller.screen_to_geo(origin);
        controller.zoom_by(2.0, origin, None);
        let after = controller.screen_to_geo(origin);
        assert!((before.lon - after.lon).abs() < 1e-9);
        assert!((before.lat - after.lat).abs() < 1e-9);
    }

    #[test]
    fn test_lod_change_requests_inactive_base() {
        let source = Recording::default();
        let (mut controller, inbox) = controller_with(SceneConfig::default(), source.clone());
        controller
            .zoom_to_geo_position(LonLat::from_degrees(0.0, 0.0), 5.0, GoTo::default())
            .unwrap();
        complete_last(&mut controller, &inbox, &source);
        let foreground = controller.pool().active_slot();

        let outcome = controller.zoom_by(2.0, Point::new(400.0, 300.0), None);
        let request = outcome.request.unwrap();
        assert_eq!(request.lod, 6);
        assert!(request.is_zoom_request);
        assert_eq!(request.surface, controller.pool().inactive_slot());

        complete_last(&mut controller, &inbox, &source);
        assert_ne!(controller.pool().active_slot(), foreground);
        assert_eq!(controller.pool().active().current_lod, 6);
    }

    #[test]
    fn test_pan_uses_scratch_and_supersedes() {
        let source = Recording::default();
        let (mut controller, inbox) = controller_with(SceneConfig::default(), source.clone());
        controller
            .zoom_to_geo_position(LonLat::from_degrees(0.0, 0.0), 8.0, GoTo::default())
            .unwrap();
        complete_last(&mut controller, &inbox, &source);

        assert!(controller.move_by(10.0, 0.0).request.is_none());
        let first = controller.move_by(600.0, 0.0).request.unwrap();
        assert_eq!(first.surface, SurfaceSlot::Scratch);
        assert!(!first.is_zoom_request);

        let second = controller.move_by(900.0, 0.0).request.unwrap();
        assert!(second.request_id > first.request_id);

        inbox.reply().complete_empty(&first);
        let stale = inbox.drain().remove(0);
        assert_eq!(controller.apply_completion(stale), CompletionOutcome::Stale);

        complete_last(&mut controller, &inbox, &source);
        assert_eq!(controller.pool().active().current_tile_x, second.tile_x);
        assert!(controller.move_by(0.0, 0.0).request.is_none());
    }

    #[test]
    fn test_rejected_request_clears_pending() {
        let source = Recording {
            reject: true,
            ..Recording::default()
        };
        let (mut controller, _inbox) = controller_with(SceneConfig::default(), source.clone());
        assert!(controller.ensure_tiles().is_none());
        assert_eq!(source.requests.borrow().len(), 1);
        assert!(controller.pool().inactive().pending_request().is_none());
    }

    #[test]
    fn test_min_lod_rounding() {
        let inbox = TileInbox::new();
        let build = |w, h| {
            TileWindowController::new(
                SceneConfig::default(),
                ProjectionKind::Mercator.build(),
                (w, h),
                "base",
                Box::new(Recording::default()),
                inbox.reply(),
            )
        };
        assert_eq!(build(1024, 1024).min_lod(), 2.0);
        assert_eq!(build(1300, 600).min_lod(), 3.0);
        assert_eq!(build(1200, 600).min_lod(), 2.0);

        let capped = TileWindowController::new(
            SceneConfig {
                min_lod: 4.0,
                ..SceneConfig::default()
            },
            ProjectionKind::Mercator.build(),
            (1024, 1024),
            "base",
            Box::new(Recording::default()),
            inbox.reply(),
        );
        assert_eq!(capped.min_lod(), 4.0);
    }

    #[test]
    fn test_strict_go_to_rejects() {
        let (mut controller, _inbox) = controller_with(SceneConfig::default(), Recording::default());
        let before = controller.view();
        let polar = controller.zoom_to_geo_position(
            LonLat::from_degrees(0.0, 84.0),
            4.0,
            GoTo {
                clamp_only: true,
                ..GoTo::default()
            },
        );
        assert!(matches!(polar, Err(Error::NotPossible { .. })));
        assert_eq!(controller.view(), before);

        let too_deep = controller.zoom_to_geo_position(
            LonLat::from_degrees(0.0, 0.0),
            30.0,
            GoTo {
                clamp_only: true,
                ..GoTo::default()
            },
        );
        assert!(too_deep.is_err());

        let lenient = controller
            .zoom_to_geo_position(LonLat::from_degrees(0.0, 84.0), 4.0, GoTo::default())
            .unwrap();
        assert_eq!(lenient.exact_lod, 4.0);
        assert!(controller.view().top.abs() < 1.0);
    }

    #[test]
    fn test_small_border_is_centered() {
        let config = SceneConfig {
            visual_border: Some(GeoBorder::new(10.0, -10.0).with_longitudes(-10.0, 10.0)),
            min_lod_round_threshold: 0.9,
            ..SceneConfig::default()
        };
        let (mut controller, _inbox) = controller_with(config, Recording::default());
        assert_eq!(controller.min_lod(), 5.0);
        controller.zoom_to_lod(5.0, Point::new(0.0, 0.0));
        let border = controller.border_pixels(5.0);
        assert!(border.width() < 800.0 && border.height() < 600.0);
        let view = controller.view();
        assert!((view.left + 400.0 - border.center().x).abs() < 1e-6);
        assert!((view.top + 300.0 - border.center().y).abs() < 1e-6);
        controller.move_by(100.0, 100.0);
        assert_eq!(controller.view(), view);
    }

    #[test]
    fn test_resize_keeps_center() {
        let (mut controller, _inbox) = controller_with(SceneConfig::default(), Recording::default());
        controller
            .zoom_to_geo_position(LonLat::from_degrees(12.0, 30.0), 7.0, GoTo::default())
            .unwrap();
        let center = controller.center_geo();
        controller.resize(1024, 768);
        let after = controller.center_geo();
        assert!((center.lon - after.lon).abs() < 1e-9);
        assert!((center.lat - after.lat).abs() < 1e-9);
        assert_eq!(controller.tile_dims(), (4 + 3, 3 + 3));
    }
}
