#![allow(dead_code)]

use image::{Rgba, RgbaImage};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use tilescape::prelude::*;

/// Tile source that records requests and replies only when told to
#[derive(Clone, Default)]
pub struct RecordingSource {
    pub history: Rc<RefCell<Vec<TileRequest>>>,
    outstanding: Rc<RefCell<Vec<(TileRequest, TileReply)>>>,
    pub reject: Rc<Cell<bool>>,
}

impl TileSource for RecordingSource {
    fn request_tiles(&mut self, request: &TileRequest, reply: &TileReply) -> bool {
        if self.reject.get() {
            return false;
        }
        self.history.borrow_mut().push(request.clone());
        self.outstanding
            .borrow_mut()
            .push((request.clone(), reply.clone()));
        true
    }
}

impl RecordingSource {
    pub fn last(&self) -> Option<TileRequest> {
        self.history.borrow().last().cloned()
    }

    /// Replies to every outstanding request with an empty tile window
    pub fn complete_all(&self) -> usize {
        let pending: Vec<_> = self.outstanding.borrow_mut().drain(..).collect();
        for (request, reply) in &pending {
            reply.complete_empty(request);
        }
        pending.len()
    }
}

/// Point markers drawn as discs, optionally clusterable
pub struct Pins {
    pub label: String,
    pub positions: Vec<LonLat>,
    pub clusterable: bool,
    pub radius: f64,
    pub hits: Rc<RefCell<Vec<(EventKind, Option<usize>)>>>,
    pub last_hot: Rc<Cell<Option<usize>>>,
}

impl Pins {
    pub fn new(label: &str, positions: Vec<LonLat>) -> Self {
        Self {
            label: label.to_string(),
            positions,
            clusterable: false,
            radius: 6.0,
            hits: Rc::default(),
            last_hot: Rc::default(),
        }
    }

    pub fn clustered(mut self) -> Self {
        self.clusterable = true;
        self
    }
}

impl VisualObject for Pins {
    fn label(&self) -> &str {
        &self.label
    }

    fn positions(&self) -> &[LonLat] {
        &self.positions
    }

    fn clusterable(&self) -> bool {
        self.clusterable
    }

    fn render(
        &mut self,
        surface: &mut RgbaImage,
        context: &RenderContext,
        clusters: Option<&VoClusters>,
        hot: Option<usize>,
    ) -> usize {
        self.last_hot.set(hot);
        let points: Vec<LonLat> = match clusters {
            Some(clusters) => clusters.instances.iter().map(|i| i.position).collect(),
            None => self.positions.clone(),
        };
        for (index, geo) in points.iter().enumerate() {
            let color = if hot == Some(index) {
                Rgba([255, 0, 0, 255])
            } else {
                Rgba([0, 0, 255, 255])
            };
            context.fill_disc(surface, context.to_screen(*geo), self.radius, color);
        }
        points.len()
    }

    fn hit_candidates(&self, hit: &HitContext, context: &RenderContext, clusters: Option<&VoClusters>) -> Vec<usize> {
        let points: Vec<LonLat> = match clusters {
            Some(clusters) => clusters.instances.iter().map(|i| i.position).collect(),
            None => self.positions.clone(),
        };
        points
            .iter()
            .enumerate()
            .filter(|(_, geo)| hit.hits(&context.to_screen(**geo), self.radius))
            .map(|(index, _)| index)
            .collect()
    }

    fn on_hit_test(&mut self, event: &SceneEvent, _hit: &HitContext, target: Option<usize>) -> bool {
        self.hits.borrow_mut().push((event.kind(), target));
        target.is_some()
    }

    fn is_subscribed(&self, kind: EventKind) -> bool {
        kind == EventKind::Click
    }
}

pub const VIEWPORT: (u32, u32) = (800, 600);

pub fn center() -> Point {
    Point::new(VIEWPORT.0 as f64 / 2.0, VIEWPORT.1 as f64 / 2.0)
}

/// Geo scene centered on 10°E 45°N at LOD 6
pub fn geo_scene(source: &RecordingSource) -> Scene {
    scene_from(
        r#"{
            "name": "test",
            "initialStartPosition": { "lon": 10.0, "lat": 45.0 },
            "initialZoom": 6,
            "refMapLayerStack": "base"
        }"#,
        source,
    )
}

pub fn scene_from(json: &str, source: &RecordingSource) -> Scene {
    tilescape::init_logging();
    Scene::from_json(json, VIEWPORT, Box::new(source.clone())).unwrap()
}

/// Completes outstanding tile requests and runs one frame
pub fn settle(scene: &mut Scene, source: &RecordingSource, now: Instant) -> FrameReport {
    source.complete_all();
    scene.frame(now)
}
