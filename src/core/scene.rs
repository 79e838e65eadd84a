//! A scene: view and tile window, render surfaces, visual objects, and the
//! interaction state layered on top of them.
//!
//! Everything runs on the host's UI thread. Tile sources reply through the
//! scene's inbox; the host calls [`Scene::frame`] once per display refresh,
//! which applies in order: animation step, tile completions and buffer
//! toggles, fade transitions, cluster refresh, overlay and label redraw.

use crate::core::config::{NavigationDisablement, SceneConfig};
use crate::core::description::SceneDescription;
use crate::core::geo::{LonLat, Point};
use crate::core::kind::{KindBehavior, SceneKind};
use crate::input::dispatcher::{DispatchOutcome, EventDispatcher, ModeAction};
use crate::input::events::{HitCandidate, InputMode, KeyCode, SceneEvent, SceneNotification, SelectionShape};
use crate::layers::animation::{FrameScheduler, ZoomAnimation, ZoomAnimator};
use crate::layers::vo::{VisualObject, VoArena, VoFlags, VoId};
use crate::prelude::HashMap;
use crate::rendering::context::{HitContext, RenderContext};
use crate::rendering::pool::{CompletionOutcome, SurfacePool};
use crate::rendering::surface::RenderSurface;
use crate::spatial::clustering::{
    ClusterCache, ClusterInput, ClusterKey, ClusterSnapshot, ClusteringEngine, GridClusterer,
};
use crate::spatial::hot::{HotItem, HotItemTracker, HotResolution};
use crate::tiles::inbox::TileInbox;
use crate::tiles::source::{BlankTileSource, TileRequest, TileSource};
use crate::tiles::window::{GoTo, MoveOutcome, TileWindowController, ViewState, ZoomOutcome};
use crate::{Error, Result};
use image::RgbaImage;
use instant::Instant;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

/// Rectangles smaller than this (screen px, both axes) do not rect-zoom
const MIN_ZOOM_RECT: f64 = 4.0;

/// What one call to [`Scene::frame`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameReport {
    pub redrawn: bool,
    /// Base-surface toggles applied from tile completions
    pub toggled: usize,
    pub reclustered: bool,
    pub animating: bool,
    pub fading: bool,
}

pub struct Scene {
    description: SceneDescription,
    behavior: Box<dyn KindBehavior>,
    controller: TileWindowController,
    inbox: TileInbox,
    vos: VoArena,
    dispatcher: EventDispatcher,
    hot: HotItemTracker,
    clustering: Box<dyn ClusteringEngine>,
    cluster_cache: ClusterCache,
    snapshot: Option<Rc<ClusterSnapshot>>,
    /// Instance counts reported by the last render
    instance_counts: HashMap<VoId, usize>,
    animator: ZoomAnimator,
    frames: FrameScheduler,
    notifications: VecDeque<SceneNotification>,
    pointer: Point,
    /// Overlay and labels are out of date
    dirty: bool,
    dragging: bool,
    suppress_events: bool,
    torn_down: bool,
}

impl std::fmt::Debug for Scene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scene")
            .field("name", &self.description.name)
            .field("kind", &self.behavior.kind())
            .field("controller", &self.controller)
            .field("vos", &self.vos)
            .field("mode", &self.dispatcher.mode())
            .field("torn_down", &self.torn_down)
            .finish()
    }
}

impl Scene {
    /// Builds a scene from a validated description.
    ///
    /// `source` is ignored for kinds without base tiles.
    pub fn from_description(
        description: SceneDescription,
        viewport: (u32, u32),
        source: Box<dyn TileSource>,
    ) -> Result<Self> {
        description.validate()?;
        let behavior = description.kind.behavior();
        let projection = description.projection_kind()?.build();
        let config = description.resolved_config();
        let inbox = TileInbox::new();
        let source: Box<dyn TileSource> = if behavior.uses_tiles() {
            source
        } else {
            Box::new(BlankTileSource)
        };
        let controller = TileWindowController::new(
            config.clone(),
            projection,
            viewport,
            description.ref_map_layer_stack.clone(),
            source,
            inbox.reply(),
        );
        let mut scene = Self {
            behavior,
            controller,
            inbox,
            vos: VoArena::new(),
            dispatcher: EventDispatcher::new(),
            hot: HotItemTracker::new(),
            clustering: Box::new(GridClusterer::with_grid_size(config.cluster_grid_size)),
            cluster_cache: ClusterCache::new(config.cluster_cache_capacity),
            snapshot: None,
            instance_counts: HashMap::default(),
            animator: ZoomAnimator::new(),
            frames: FrameScheduler::new(),
            notifications: VecDeque::new(),
            pointer: Point::default(),
            dirty: true,
            dragging: false,
            suppress_events: false,
            torn_down: false,
            description,
        };
        scene.apply_initial_view();
        log::info!(
            "created {:?} scene '{}' at LOD {:.2}",
            scene.kind(),
            scene.name(),
            scene.view().exact_lod
        );
        Ok(scene)
    }

    pub fn from_json(json: &str, viewport: (u32, u32), source: Box<dyn TileSource>) -> Result<Self> {
        Self::from_description(SceneDescription::from_json(json)?, viewport, source)
    }

    /// Replaces the bundled grid clusterer
    pub fn with_clustering_engine(mut self, engine: Box<dyn ClusteringEngine>) -> Self {
        self.set_clustering_engine(engine);
        self
    }

    pub fn set_clustering_engine(&mut self, engine: Box<dyn ClusteringEngine>) {
        self.clustering = engine;
        self.data_changed();
    }

    fn apply_initial_view(&mut self) {
        let lod = self
            .description
            .initial_zoom
            .unwrap_or_else(|| self.controller.min_lod());
        let request = match self.description.initial_start_position {
            Some(start) => {
                let options = GoTo {
                    suppress_events: true,
                    ..GoTo::default()
                };
                match self.controller.zoom_to_geo_position(start.to_lon_lat(), lod, options) {
                    Ok(outcome) => outcome.request,
                    Err(err) => {
                        log::warn!("initial position rejected: {}", err);
                        self.controller.ensure_tiles()
                    }
                }
            }
            None => {
                let (w, h) = self.controller.viewport();
                let center = Point::new(w as f64 / 2.0, h as f64 / 2.0);
                self.controller.zoom_to_lod(lod, center).request
            }
        };
        self.note_request(request.as_ref());
        self.invalidate_view();
    }

    pub fn name(&self) -> &str {
        &self.description.name
    }

    pub fn kind(&self) -> SceneKind {
        self.behavior.kind()
    }

    pub fn description(&self) -> &SceneDescription {
        &self.description
    }

    pub fn config(&self) -> &SceneConfig {
        self.controller.config()
    }

    pub fn controller(&self) -> &TileWindowController {
        &self.controller
    }

    pub fn view(&self) -> ViewState {
        self.controller.view()
    }

    pub fn pool(&self) -> &SurfacePool {
        self.controller.pool()
    }

    pub fn vos(&self) -> &VoArena {
        &self.vos
    }

    /// Mutable access to one object; call [`Scene::positions_changed`] if
    /// its positions moved
    pub fn vo_mut(&mut self, id: VoId) -> Option<&mut (dyn VisualObject + 'static)> {
        self.invalidate_view();
        self.vos.get_mut(id)
    }

    pub fn input_mode(&self) -> InputMode {
        self.dispatcher.mode()
    }

    pub fn hot_item(&self) -> Option<&HotItem> {
        self.hot.current()
    }

    pub fn cluster_snapshot(&self) -> Option<&ClusterSnapshot> {
        self.snapshot.as_deref()
    }

    pub fn data_version(&self) -> u64 {
        self.cluster_cache.data_version()
    }

    /// Instances `vo` reported in the last render
    pub fn instance_count(&self, vo: VoId) -> Option<usize> {
        self.instance_counts.get(&vo).copied()
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    pub fn drain_notifications(&mut self) -> Vec<SceneNotification> {
        self.notifications.drain(..).collect()
    }

    fn emit(&mut self, notification: SceneNotification) {
        let gated = matches!(
            notification,
            SceneNotification::MoveStarted
                | SceneNotification::Moved { .. }
                | SceneNotification::ZoomStarted { .. }
                | SceneNotification::ZoomCompleted { .. }
        );
        if gated && self.suppress_events {
            return;
        }
        self.notifications.push_back(notification);
    }

    fn note_request(&mut self, request: Option<&TileRequest>) {
        if let Some(request) = request {
            self.emit(SceneNotification::TilesRequested {
                request_id: request.request_id,
                surface: request.surface,
                lod: request.lod,
                is_zoom: request.is_zoom_request,
            });
        }
    }

    fn invalidate_view(&mut self) {
        self.dirty = true;
        self.frames.request_frame();
    }

    fn navigable(&self) -> Result<()> {
        if self.torn_down {
            return Err(Error::NotPossible {
                reason: format!("scene '{}' was torn down", self.name()),
            });
        }
        if !self.behavior.supports_navigation() {
            return Err(Error::Unsupported);
        }
        Ok(())
    }

    // ---- visual objects ----

    pub fn add_vo(&mut self, vo: Box<dyn VisualObject>) -> VoId {
        let id = self.vos.insert(vo);
        self.data_changed();
        id
    }

    pub fn remove_vo(&mut self, id: VoId) -> Result<Box<dyn VisualObject>> {
        let vo = self.vos.remove(id).ok_or(Error::UnknownVisualObject)?;
        self.dispatcher.forget(id);
        self.instance_counts.remove(&id);
        if self.hot.is_hot(id) && self.hot.clear() {
            self.emit(SceneNotification::HotItemChanged { hot: None });
        }
        self.data_changed();
        Ok(vo)
    }

    pub fn set_vo_flags(&mut self, id: VoId, flags: VoFlags) -> Result<()> {
        if !self.vos.set_flags(id, flags) {
            return Err(Error::UnknownVisualObject);
        }
        self.data_changed();
        Ok(())
    }

    /// Forces reclustering after object positions changed
    pub fn positions_changed(&mut self) {
        self.data_changed();
    }

    fn data_changed(&mut self) {
        let version = self.cluster_cache.bump_version();
        log::debug!("scene '{}' data version {}", self.description.name, version);
        self.invalidate_view();
    }

    // ---- navigation ----

    /// Pans the content by `(dx, dy)` screen pixels
    pub fn move_by(&mut self, dx: f64, dy: f64) -> Result<MoveOutcome> {
        self.navigable()?;
        self.animator.cancel();
        Ok(self.apply_move(dx, dy, false))
    }

    fn apply_move(&mut self, dx: f64, dy: f64, gesture: bool) -> MoveOutcome {
        let outcome = self.controller.move_by(dx, dy);
        if outcome.moved() {
            if !(gesture && self.dragging) {
                self.emit(SceneNotification::MoveStarted);
            }
            self.dragging = gesture;
            let center = self.controller.center_geo();
            self.emit(SceneNotification::Moved { center });
            self.invalidate_view();
        }
        self.note_request(outcome.request.as_ref());
        outcome
    }

    /// Zooms by `factor` around `origin`, snapping to `ticks` steps per LOD
    pub fn zoom_by(&mut self, factor: f64, origin: Point, ticks: Option<u32>) -> Result<ZoomOutcome> {
        self.navigable()?;
        self.animator.cancel();
        let outcome = self.controller.zoom_by(factor, origin, ticks);
        self.finish_zoom(&outcome);
        Ok(outcome)
    }

    fn finish_zoom(&mut self, outcome: &ZoomOutcome) {
        if outcome.changed() {
            self.emit(SceneNotification::ZoomStarted {
                exact_lod: outcome.previous_exact_lod,
            });
            self.emit(SceneNotification::ZoomCompleted {
                exact_lod: outcome.exact_lod,
            });
            self.invalidate_view();
        }
        self.note_request(outcome.request.as_ref());
    }

    /// Starts an eased zoom to `target` around `focus`, cancelling any
    /// running one. Applies immediately when animation is disabled.
    pub fn animate_zoom_to(&mut self, target: f64, focus: Point, now: Instant) -> Result<()> {
        self.navigable()?;
        let current = self.controller.view().exact_lod;
        let target = self.controller.quantize(target, None);
        let animation = self.controller.config().animation.clone();
        if !animation.enabled {
            self.animator.cancel();
            let outcome = self.controller.zoom_to_lod(target, focus);
            self.finish_zoom(&outcome);
            return Ok(());
        }
        if (target - current).abs() < f64::EPSILON {
            self.animator.cancel();
            return Ok(());
        }
        let duration = animation.zoom_duration(target - current);
        self.animator
            .start(ZoomAnimation::new(current, target, focus, now, duration));
        self.emit(SceneNotification::ZoomStarted { exact_lod: current });
        self.frames.request_frame();
        Ok(())
    }

    /// Animates to the next integer LOD above the current exact LOD
    pub fn zoom_in(&mut self, focus: Point, now: Instant) -> Result<()> {
        let target = self.controller.view().exact_lod.floor() + 1.0;
        self.animate_zoom_to(target, focus, now)
    }

    /// Animates to the next integer LOD below the current exact LOD
    pub fn zoom_out(&mut self, focus: Point, now: Instant) -> Result<()> {
        let target = self.controller.view().exact_lod.ceil() - 1.0;
        self.animate_zoom_to(target, focus, now)
    }

    pub fn cancel_animation(&mut self) -> bool {
        self.animator.cancel().is_some()
    }

    /// Centers `geo` at `lod`; see [`TileWindowController::zoom_to_geo_position`]
    pub fn zoom_to_geo_position(&mut self, geo: LonLat, lod: f64, options: GoTo) -> Result<ZoomOutcome> {
        self.navigable()?;
        let outcome = self.controller.zoom_to_geo_position(geo, lod, options)?;
        self.animator.cancel();
        let suppress = self.suppress_events || options.suppress_events;
        let previous = std::mem::replace(&mut self.suppress_events, suppress);
        self.finish_zoom(&outcome);
        let center = self.controller.center_geo();
        self.emit(SceneNotification::Moved { center });
        self.suppress_events = previous;
        if options.suppress_render {
            self.dirty = true;
        } else {
            self.invalidate_view();
        }
        Ok(outcome)
    }

    /// Fits the geographic rectangle into the viewport
    pub fn zoom_to_bounds(&mut self, north_west: LonLat, south_east: LonLat, clamp_only: bool) -> Result<ZoomOutcome> {
        self.navigable()?;
        let tile_size = self.controller.config().tile_size;
        let projection = self.controller.projection();
        let bounds = projection.map_bounds(north_west, south_east, 0.0, tile_size);
        if !bounds.is_valid() {
            return Err(Error::NotPossible {
                reason: "empty bounds".to_string(),
            });
        }
        let (vw, vh) = self.controller.viewport();
        let fit = |viewport: u32, extent: f64| {
            if extent > 0.0 {
                (viewport as f64 / extent).log2()
            } else {
                f64::INFINITY
            }
        };
        let lod = fit(vw, bounds.width()).min(fit(vh, bounds.height()));
        let lod = if lod.is_finite() {
            lod.floor()
        } else {
            self.controller.max_lod()
        };
        let center = projection.to_geo(bounds.center(), 0.0, tile_size);
        self.zoom_to_geo_position(
            center,
            lod,
            GoTo {
                clamp_only,
                ..GoTo::default()
            },
        )
    }

    /// Fits every visual object's positions into the viewport
    pub fn zoom_to_all_content(&mut self) -> Result<ZoomOutcome> {
        let mut positions = self.vos.order().iter().filter_map(|id| self.vos.get(*id)).flat_map(|vo| vo.positions().iter());
        let Some(first) = positions.next() else {
            return Err(Error::NotPossible {
                reason: "scene has no positioned content".to_string(),
            });
        };
        let (mut west, mut east, mut south, mut north) = (first.lon, first.lon, first.lat, first.lat);
        for p in positions {
            west = west.min(p.lon);
            east = east.max(p.lon);
            south = south.min(p.lat);
            north = north.max(p.lat);
        }
        self.zoom_to_bounds(LonLat::new(west, north), LonLat::new(east, south), false)
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        let request = self.controller.resize(width, height);
        self.note_request(request.as_ref());
        self.invalidate_view();
    }

    /// Switches the base layer stack and reloads the tiles
    pub fn set_layer_stack(&mut self, layer_stack: impl Into<String>) {
        let layer_stack = layer_stack.into();
        self.description.ref_map_layer_stack = layer_stack.clone();
        self.controller.set_layer_stack(layer_stack);
        let request = self.controller.reconfigure(self.controller.config().clone());
        self.note_request(request.as_ref());
        self.invalidate_view();
    }

    pub fn set_tile_source(&mut self, source: Box<dyn TileSource>) {
        if self.behavior.uses_tiles() {
            self.controller.set_source(source);
            let request = self.controller.reconfigure(self.controller.config().clone());
            self.note_request(request.as_ref());
            self.invalidate_view();
        }
    }

    // ---- interaction ----

    pub fn set_input_mode(&mut self, mode: InputMode) {
        if let Some(from) = self.dispatcher.set_input_mode(mode) {
            self.dragging = false;
            self.emit(SceneNotification::InputModeChanged { from, to: mode });
        }
    }

    pub fn begin_design(&mut self, vo: VoId) -> Result<()> {
        if !self.vos.contains(vo) {
            return Err(Error::UnknownVisualObject);
        }
        self.dispatcher.begin_design(vo);
        Ok(())
    }

    pub fn end_design(&mut self) -> Option<VoId> {
        self.dispatcher.end_design()
    }

    pub fn capture(&mut self, vo: VoId) -> Result<()> {
        if !self.vos.contains(vo) {
            return Err(Error::UnknownVisualObject);
        }
        self.dispatcher.capture(vo);
        Ok(())
    }

    pub fn release_capture(&mut self) -> Option<VoId> {
        self.dispatcher.release_capture()
    }

    /// Makes `item` hot, e.g. for keyboard focus
    pub fn set_hot_item(&mut self, item: HotItem) -> Result<()> {
        if item.vo.is_some_and(|vo| !self.vos.contains(vo)) {
            return Err(Error::UnknownVisualObject);
        }
        if self.hot.set(item.clone(), self.snapshot.as_deref()) {
            self.emit(SceneNotification::HotItemChanged { hot: Some(item) });
            self.invalidate_view();
        }
        Ok(())
    }

    pub fn clear_hot_item(&mut self) {
        if self.hot.clear() {
            self.emit(SceneNotification::HotItemChanged { hot: None });
            self.invalidate_view();
        }
    }

    fn hit_context(&self, screen: Point) -> HitContext {
        HitContext {
            screen,
            geo: self.controller.screen_to_geo(screen),
            tolerance: self.controller.config().hit_tolerance,
        }
    }

    /// Feeds one host event through navigation, the active input mode and
    /// the visual objects
    pub fn handle_event(&mut self, event: SceneEvent, now: Instant) -> DispatchOutcome {
        if self.torn_down {
            return DispatchOutcome::NotHandled;
        }
        if let Some(position) = event.position() {
            self.pointer = position;
        }
        let nav = self.controller.config().navigation;
        let navigable = self.behavior.supports_navigation();

        match &event {
            SceneEvent::Resize { width, height } => {
                self.resize(*width, *height);
                return DispatchOutcome::Navigated;
            }
            SceneEvent::Wheel { position, ticks } => {
                if navigable && !nav.wheel && !nav.zoom && *ticks != 0 {
                    let per_lod = self.controller.config().wheel_ticks_per_lod.max(1);
                    let factor = 2_f64.powf(*ticks as f64 / per_lod as f64);
                    self.animator.cancel();
                    let outcome = self.controller.zoom_by(factor, *position, Some(per_lod));
                    self.finish_zoom(&outcome);
                    return DispatchOutcome::Navigated;
                }
            }
            SceneEvent::KeyDown { key, .. } => {
                if let Some(outcome) = self.handle_key(*key, now, nav, navigable) {
                    return outcome;
                }
            }
            _ => {}
        }

        let mode = self.dispatcher.mode();
        let consumed_by_mode = matches!(
            mode,
            InputMode::TrackMap | InputMode::RectSelect | InputMode::LassoSelect | InputMode::RectZoom
        ) && self.dispatcher.is_listening(event.kind());
        if let Some(action) = self.dispatcher.track(&event) {
            self.apply_mode_action(action, nav, navigable);
        }
        if matches!(event, SceneEvent::PointerUp { .. }) {
            self.dragging = false;
        }
        if consumed_by_mode {
            return if mode == InputMode::TrackMap {
                DispatchOutcome::MapTracking
            } else {
                DispatchOutcome::Navigated
            };
        }

        let hit = self.hit_context(self.pointer);
        let snapshot = self.snapshot.clone();
        let reduction = self.controller.pool().overlay().reduction;
        let context = RenderContext::new(
            self.controller.projection(),
            self.controller.view(),
            self.controller.config().tile_size,
            self.controller.viewport(),
            reduction,
        );
        let hovered = (matches!(event, SceneEvent::PointerMove { .. }) && mode == InputMode::Default).then(|| {
            self.dispatcher
                .topmost_candidate(&self.vos, &hit, &context, snapshot.as_deref())
        });
        let outcome = self
            .dispatcher
            .dispatch(&event, &mut self.vos, &hit, &context, snapshot.as_deref());

        if let Some(hovered) = hovered {
            self.update_hover(hovered, snapshot.as_deref());
        }
        match &outcome {
            DispatchOutcome::Disambiguate(candidates) => {
                self.emit(SceneNotification::Disambiguate {
                    event,
                    candidates: candidates.clone(),
                });
            }
            DispatchOutcome::Handled { .. } => self.invalidate_view(),
            _ => {}
        }
        outcome
    }

    /// Delivers `event` to the candidate the host picked after a
    /// disambiguation request
    pub fn dispatch_to(&mut self, candidate: &HitCandidate, event: &SceneEvent) -> Result<DispatchOutcome> {
        let hit = self.hit_context(event.position().unwrap_or(self.pointer));
        let vo = self.vos.get_mut(candidate.vo).ok_or(Error::UnknownVisualObject)?;
        let handled = vo.on_hit_test(event, &hit, Some(candidate.index));
        if handled {
            self.invalidate_view();
            Ok(DispatchOutcome::Handled { vo: candidate.vo })
        } else {
            Ok(DispatchOutcome::NotHandled)
        }
    }

    fn update_hover(&mut self, hovered: Option<HitCandidate>, snapshot: Option<&ClusterSnapshot>) {
        match hovered {
            Some(candidate) => {
                let item = HotItem::new(candidate.vo, candidate.index);
                if self.hot.set(item.clone(), snapshot) {
                    self.emit(SceneNotification::HotItemChanged { hot: Some(item) });
                    self.invalidate_view();
                }
            }
            None => self.clear_hot_item(),
        }
    }

    fn handle_key(
        &mut self,
        key: KeyCode,
        now: Instant,
        nav: NavigationDisablement,
        navigable: bool,
    ) -> Option<DispatchOutcome> {
        let step = self.controller.config().keyboard_pan_step;
        let (w, h) = self.controller.viewport();
        let center = Point::new(w as f64 / 2.0, h as f64 / 2.0);
        let can_pan = navigable && !nav.keyboard && !nav.pan;
        let can_zoom = navigable && !nav.keyboard && !nav.zoom;
        let pan = |dx: f64, dy: f64| can_pan.then_some((dx, dy));
        let delta = match key {
            KeyCode::ArrowUp => pan(0.0, step),
            KeyCode::ArrowDown => pan(0.0, -step),
            KeyCode::ArrowLeft => pan(step, 0.0),
            KeyCode::ArrowRight => pan(-step, 0.0),
            KeyCode::Plus | KeyCode::Minus if can_zoom => {
                let result = if key == KeyCode::Plus {
                    self.zoom_in(center, now)
                } else {
                    self.zoom_out(center, now)
                };
                if let Err(err) = result {
                    log::debug!("keyboard zoom ignored: {}", err);
                }
                return Some(DispatchOutcome::Navigated);
            }
            KeyCode::Escape if self.dispatcher.mode() != InputMode::Default => {
                self.set_input_mode(InputMode::Default);
                return Some(DispatchOutcome::Navigated);
            }
            _ => None,
        };
        let (dx, dy) = delta?;
        self.animator.cancel();
        self.apply_move(dx, dy, false);
        Some(DispatchOutcome::Navigated)
    }

    fn apply_mode_action(&mut self, action: ModeAction, nav: NavigationDisablement, navigable: bool) {
        match action {
            ModeAction::Pan { dx, dy } => {
                if navigable && !nav.pan {
                    self.animator.cancel();
                    self.apply_move(dx, dy, true);
                }
            }
            ModeAction::ZoomToRect { from, to } => {
                let small = (from.x - to.x).abs() < MIN_ZOOM_RECT && (from.y - to.y).abs() < MIN_ZOOM_RECT;
                if !navigable || nav.zoom || small {
                    return;
                }
                let (north_west, south_east) = self.geo_rect(from, to);
                if let Err(err) = self.zoom_to_bounds(north_west, south_east, false) {
                    log::debug!("rect zoom ignored: {}", err);
                }
            }
            ModeAction::Selection { mode, path } => {
                let shape = match (mode, path.first(), path.last()) {
                    (InputMode::RectSelect, Some(first), Some(last)) => {
                        let (north_west, south_east) = self.geo_rect(*first, *last);
                        SelectionShape::Rect {
                            north_west,
                            south_east,
                        }
                    }
                    _ => SelectionShape::Lasso(path.iter().map(|p| self.controller.screen_to_geo(*p)).collect()),
                };
                self.emit(SceneNotification::SelectionArea { mode, shape });
            }
        }
    }

    fn geo_rect(&self, a: Point, b: Point) -> (LonLat, LonLat) {
        let north_west = self
            .controller
            .screen_to_geo(Point::new(a.x.min(b.x), a.y.min(b.y)));
        let south_east = self
            .controller
            .screen_to_geo(Point::new(a.x.max(b.x), a.y.max(b.y)));
        (north_west, south_east)
    }

    // ---- frames ----

    /// Asks for a redraw in the next frame; repeated calls coalesce
    pub fn request_render(&mut self) {
        self.invalidate_view();
    }

    /// Schedules a redraw `delay` after the latest call
    pub fn request_render_debounced(&mut self, now: Instant, delay: Duration) {
        self.frames.request_debounced(now, delay);
    }

    /// Drops a pending frame and any debounced redraw
    pub fn cancel_pending_render(&mut self) {
        self.frames.cancel_all();
    }

    /// Whether calling [`Scene::frame`] at `now` would do any work
    pub fn needs_frame(&self, now: Instant) -> bool {
        !self.torn_down
            && (self.frames.is_frame_pending()
                || self.animator.is_active()
                || self.inbox.pending() > 0
                || self.frames.debounce_deadline().is_some_and(|deadline| deadline <= now))
    }

    /// Runs one display frame
    pub fn frame(&mut self, now: Instant) -> FrameReport {
        let mut report = FrameReport::default();
        if self.torn_down {
            return report;
        }
        let work = self.frames.begin_frame(now);

        if let Some(step) = self.animator.step(now) {
            let previous = std::mem::replace(&mut self.suppress_events, true);
            let outcome = self.controller.zoom_to_lod(step.lod, step.focus);
            self.finish_zoom(&outcome);
            self.suppress_events = previous;
            if step.finished {
                let exact_lod = self.controller.view().exact_lod;
                self.emit(SceneNotification::ZoomCompleted { exact_lod });
            } else {
                self.frames.request_frame();
            }
            report.animating = !step.finished;
            self.dirty = true;
        }

        for completion in self.inbox.drain() {
            match self.controller.apply_completion(completion) {
                CompletionOutcome::Toggled { foreground } | CompletionOutcome::Promoted { foreground } => {
                    report.toggled += 1;
                    self.emit(SceneNotification::BufferToggled { foreground });
                    self.dirty = true;
                }
                CompletionOutcome::Stale => {}
            }
        }
        if report.toggled > 0 {
            let request = self.controller.ensure_tiles();
            self.note_request(request.as_ref());
        }

        if self.controller.pool_mut().tick_transition() {
            report.fading = true;
            self.frames.request_frame();
        }

        report.reclustered = self.refresh_clusters();

        if self.dirty || work.debounced || report.reclustered {
            self.redraw();
            report.redrawn = true;
        }
        report
    }

    /// Brings the cluster snapshot in line with the current tile window
    /// and data version; returns true if it changed
    fn refresh_clusters(&mut self) -> bool {
        let key = ClusterKey::new(&self.controller.window(), self.cluster_cache.data_version());
        if self.snapshot.as_ref().is_some_and(|snapshot| snapshot.key == key) {
            return false;
        }
        self.hot.capture_reference(self.snapshot.as_deref());
        let snapshot = match self.cluster_cache.get(&key) {
            Some(cached) => cached,
            None => {
                let input = ClusterInput {
                    vos: self.vos.clusterable().map(|(id, vo)| (id, vo.positions())).collect(),
                    projection: self.controller.projection(),
                    tile_size: self.controller.config().tile_size,
                };
                let computed = self.clustering.compute_clusters(&input, key, self.hot.reference());
                match self.cluster_cache.insert(computed) {
                    Some(snapshot) => snapshot,
                    None => return false,
                }
            }
        };
        log::debug!(
            "cluster snapshot gen {} for LOD {} ({} instances)",
            snapshot.generation,
            key.lod,
            snapshot.instance_count()
        );
        match self.hot.resolve(&snapshot) {
            HotResolution::Cleared => self.emit(SceneNotification::HotItemChanged { hot: None }),
            HotResolution::Remapped { from, to } => log::debug!("hot index remapped {} -> {}", from, to),
            HotResolution::Kept | HotResolution::Unchanged => {}
        }
        self.snapshot = Some(snapshot);
        self.dirty = true;
        true
    }

    fn redraw(&mut self) {
        let generation = self.snapshot.as_ref().map(|snapshot| snapshot.generation);
        if self.hot.ensure_verified(generation) || self.hot.validate_unclustered(&self.instance_counts) {
            self.emit(SceneNotification::HotItemChanged { hot: None });
        }

        let snapshot = self.snapshot.clone();
        let needs_halo = snapshot.as_ref().is_some_and(|s| s.needs_halo);
        let pool = self.controller.pool_mut();
        if needs_halo {
            pool.ensure_shadow();
        } else {
            pool.release_shadow();
        }
        let reduction = pool.overlay().reduction;
        let mut overlay = take_cleared(pool.overlay_mut());
        let mut labels = take_cleared(pool.label_mut());
        let mut shadow = pool.shadow_mut().map(take_cleared);

        let context = RenderContext::new(
            self.controller.projection(),
            self.controller.view(),
            self.controller.config().tile_size,
            self.controller.viewport(),
            reduction,
        );
        self.instance_counts.clear();
        let order = self.vos.order().to_vec();
        for id in order {
            if !self.vos.flags(id).is_some_and(|flags| flags.render) {
                continue;
            }
            let clusters = snapshot.as_deref().and_then(|s| s.for_vo(id));
            let hot_index = self.hot.index_for(id);
            let Some(vo) = self.vos.get_mut(id) else { continue };
            let count = vo.render(&mut overlay, &context, clusters, hot_index);
            vo.render_labels(&mut labels, &context, clusters);
            if let (Some(shadow), Some(_)) = (shadow.as_mut(), clusters) {
                vo.render_shadow(shadow, &context, clusters);
            }
            self.instance_counts.insert(id, count);
        }

        let pool = self.controller.pool_mut();
        restore(pool.overlay_mut(), overlay);
        restore(pool.label_mut(), labels);
        if let (Some(surface), Some(bitmap)) = (pool.shadow_mut(), shadow) {
            restore(surface, bitmap);
        }
        self.dirty = false;
    }

    // ---- lifecycle ----

    /// Reloads the scene from a new description in place, keeping its name,
    /// visual objects and interaction state
    pub fn merge(&mut self, description: SceneDescription) -> Result<()> {
        description.validate()?;
        if description.name != self.description.name {
            return Err(Error::InvalidDescription(format!(
                "cannot merge '{}' into scene '{}'",
                description.name, self.description.name
            )));
        }
        if description.kind != self.description.kind {
            return Err(Error::InvalidDescription("scene kind cannot change on merge".to_string()));
        }
        if description.projection_kind()? != self.controller.projection().kind() {
            return Err(Error::InvalidDescription("projection cannot change on merge".to_string()));
        }
        self.animator.cancel();
        let config = description.resolved_config();
        let reposition = description.initial_start_position != self.description.initial_start_position
            || description.initial_zoom != self.description.initial_zoom;
        self.controller.set_layer_stack(description.ref_map_layer_stack.clone());
        self.cluster_cache.set_capacity(config.cluster_cache_capacity);
        self.clustering.set_grid_size(config.cluster_grid_size);
        let request = self.controller.reconfigure(config);
        self.note_request(request.as_ref());
        self.description = description;
        if reposition {
            self.apply_initial_view();
        }
        self.data_changed();
        log::info!("merged description into scene '{}'", self.description.name);
        Ok(())
    }

    /// Releases every surface, detaches mode listeners and drops pending
    /// tile completions. The scene ignores further frames and events.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.animator.cancel();
        self.frames.cancel_all();
        self.dispatcher.detach_all();
        self.controller.release();
        let dropped = self.inbox.discard_pending();
        self.cluster_cache.clear();
        self.snapshot = None;
        self.hot.clear();
        self.instance_counts.clear();
        self.notifications.clear();
        self.torn_down = true;
        log::info!(
            "scene '{}' torn down, {} pending completions dropped",
            self.description.name,
            dropped
        );
    }
}

fn take_cleared(surface: &mut RenderSurface) -> RgbaImage {
    surface.clear();
    std::mem::replace(surface.bitmap_mut(), RgbaImage::new(0, 0))
}

fn restore(surface: &mut RenderSurface, bitmap: RgbaImage) {
    *surface.bitmap_mut() = bitmap;
    surface.valid = true;
}
