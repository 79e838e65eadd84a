//! Routes scene events to visual objects.
//!
//! Order for one event: the design object, then the capturing object, then
//! (click-class only) overlap resolution, then every object from topmost to
//! bottom until one reports the event handled. Tracking modes attach their
//! own pointer listeners and turn drags into [`ModeAction`]s for the scene.

use crate::core::geo::Point;
use crate::input::events::{EventKind, HitCandidate, InputMode, SceneEvent};
use crate::layers::vo::{VoArena, VoId};
use crate::prelude::HashSet;
use crate::rendering::context::{HitContext, RenderContext};
use crate::spatial::clustering::ClusterSnapshot;
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Handled { vo: VoId },
    /// More than one candidate; the host must pick
    Disambiguate(Vec<HitCandidate>),
    NotHandled,
    /// The scene is being dragged as a whole
    MapTracking,
    /// Consumed by scene navigation (wheel, keys, mode gestures)
    Navigated,
}

/// Scene-level effect of a tracking-mode gesture
#[derive(Debug, Clone, PartialEq)]
pub enum ModeAction {
    Pan { dx: f64, dy: f64 },
    ZoomToRect { from: Point, to: Point },
    Selection { mode: InputMode, path: Vec<Point> },
}

impl InputMode {
    /// Pointer listeners a mode attaches while active
    pub fn listeners(&self) -> &'static [EventKind] {
        const DRAG: &[EventKind] = &[EventKind::PointerDown, EventKind::PointerMove, EventKind::PointerUp];
        const FOLLOW: &[EventKind] = &[EventKind::PointerMove, EventKind::PointerUp];
        match self {
            InputMode::Default => &[],
            InputMode::TrackObject | InputMode::TrackDesign => FOLLOW,
            InputMode::TrackMap | InputMode::RectSelect | InputMode::LassoSelect | InputMode::RectZoom => DRAG,
        }
    }
}

#[derive(Debug, Clone)]
struct Gesture {
    start: Point,
    last: Point,
    path: Vec<Point>,
}

impl Gesture {
    fn new(start: Point) -> Self {
        Self {
            start,
            last: start,
            path: vec![start],
        }
    }
}

/// Case-folded comparison with digit runs ordered numerically, tie-broken
/// by the raw labels
pub fn compare_labels(a: &str, b: &str) -> Ordering {
    natural_folded(a, b).then_with(|| a.cmp(b))
}

fn natural_folded(a: &str, b: &str) -> Ordering {
    let mut a = a.chars().peekable();
    let mut b = b.chars().peekable();
    loop {
        match (a.peek().copied(), b.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let run_a = take_digits(&mut a);
                let run_b = take_digits(&mut b);
                let (ta, tb) = (run_a.trim_start_matches('0'), run_b.trim_start_matches('0'));
                let ord = ta.len().cmp(&tb.len()).then_with(|| ta.cmp(tb));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(x), Some(y)) => {
                a.next();
                b.next();
                let ord = x.to_lowercase().cmp(y.to_lowercase());
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

fn take_digits(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut run = String::new();
    while let Some(c) = chars.next_if(|c| c.is_ascii_digit()) {
        run.push(c);
    }
    run
}

#[derive(Debug, Default)]
pub struct EventDispatcher {
    mode: InputMode,
    attached: HashSet<EventKind>,
    design_vo: Option<VoId>,
    capture_vo: Option<VoId>,
    gesture: Option<Gesture>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn is_listening(&self, kind: EventKind) -> bool {
        self.attached.contains(&kind)
    }

    /// Switches mode, detaching the old mode's listeners and attaching the
    /// new ones; returns the previous mode if it changed
    pub fn set_input_mode(&mut self, mode: InputMode) -> Option<InputMode> {
        if mode == self.mode {
            return None;
        }
        let previous = self.mode;
        self.attached.clear();
        self.gesture = None;
        if previous == InputMode::TrackObject {
            self.capture_vo = None;
        }
        self.attached.extend(mode.listeners().iter().copied());
        self.mode = mode;
        log::debug!("input mode {:?} -> {:?}", previous, mode);
        Some(previous)
    }

    pub fn design_vo(&self) -> Option<VoId> {
        self.design_vo
    }

    pub fn begin_design(&mut self, vo: VoId) {
        self.design_vo = Some(vo);
    }

    pub fn end_design(&mut self) -> Option<VoId> {
        self.design_vo.take()
    }

    pub fn capture_vo(&self) -> Option<VoId> {
        self.capture_vo
    }

    pub fn capture(&mut self, vo: VoId) {
        self.capture_vo = Some(vo);
    }

    pub fn release_capture(&mut self) -> Option<VoId> {
        self.capture_vo.take()
    }

    /// Forgets every reference to `vo`
    pub fn forget(&mut self, vo: VoId) {
        if self.design_vo == Some(vo) {
            self.design_vo = None;
        }
        if self.capture_vo == Some(vo) {
            self.capture_vo = None;
        }
    }

    /// Detaches all listeners and returns to the default mode
    pub fn detach_all(&mut self) {
        self.set_input_mode(InputMode::Default);
        self.design_vo = None;
        self.capture_vo = None;
    }

    /// Feeds an event to the active mode's listeners
    pub fn track(&mut self, event: &SceneEvent) -> Option<ModeAction> {
        if !self.is_listening(event.kind()) {
            return None;
        }
        match event {
            SceneEvent::PointerDown { position, .. } => {
                self.gesture = Some(Gesture::new(*position));
                None
            }
            SceneEvent::PointerMove { position } => {
                let gesture = self.gesture.as_mut()?;
                let delta = position.subtract(&gesture.last);
                gesture.last = *position;
                gesture.path.push(*position);
                (self.mode == InputMode::TrackMap).then_some(ModeAction::Pan {
                    dx: delta.x,
                    dy: delta.y,
                })
            }
            SceneEvent::PointerUp { position, .. } => {
                let mut gesture = self.gesture.take()?;
                match self.mode {
                    InputMode::RectZoom => Some(ModeAction::ZoomToRect {
                        from: gesture.start,
                        to: *position,
                    }),
                    InputMode::RectSelect => Some(ModeAction::Selection {
                        mode: self.mode,
                        path: vec![gesture.start, *position],
                    }),
                    InputMode::LassoSelect => {
                        if gesture.last != *position {
                            gesture.path.push(*position);
                        }
                        Some(ModeAction::Selection {
                            mode: self.mode,
                            path: gesture.path,
                        })
                    }
                    _ => None,
                }
            }
            _ => None,
        }
    }

    /// Candidates under the pointer from topmost to bottom
    fn collect_candidates(
        arena: &VoArena,
        kind: Option<EventKind>,
        hit: &HitContext,
        context: &RenderContext,
        snapshot: Option<&ClusterSnapshot>,
    ) -> Vec<HitCandidate> {
        let mut candidates = Vec::new();
        for id in arena.top_down() {
            if !arena.flags(id).is_some_and(|flags| flags.render) {
                continue;
            }
            let Some(vo) = arena.get(id) else { continue };
            if let Some(kind) = kind {
                if !(vo.is_subscribed(kind) || vo.is_selectable()) {
                    continue;
                }
            }
            let clusters = snapshot.and_then(|s| s.for_vo(id));
            for index in vo.hit_candidates(hit, context, clusters) {
                candidates.push(HitCandidate {
                    vo: id,
                    index,
                    label: vo.label().to_string(),
                });
            }
        }
        candidates
    }

    /// Topmost instance under the pointer regardless of subscriptions
    pub fn topmost_candidate(
        &self,
        arena: &VoArena,
        hit: &HitContext,
        context: &RenderContext,
        snapshot: Option<&ClusterSnapshot>,
    ) -> Option<HitCandidate> {
        Self::collect_candidates(arena, None, hit, context, snapshot)
            .into_iter()
            .next()
    }

    pub fn dispatch(
        &mut self,
        event: &SceneEvent,
        arena: &mut VoArena,
        hit: &HitContext,
        context: &RenderContext,
        snapshot: Option<&ClusterSnapshot>,
    ) -> DispatchOutcome {
        if self.mode == InputMode::TrackMap {
            return DispatchOutcome::MapTracking;
        }

        for (slot, id) in [(0, self.design_vo), (1, self.capture_vo)] {
            let Some(id) = id else { continue };
            match arena.get_mut(id) {
                Some(vo) => {
                    if vo.on_hit_test(event, hit, None) {
                        return DispatchOutcome::Handled { vo: id };
                    }
                }
                None => {
                    log::debug!("dropping stale {} handle {}", if slot == 0 { "design" } else { "capture" }, id);
                    self.forget(id);
                }
            }
        }

        let kind = event.kind();
        let mut tried = None;
        if kind.is_click_class() {
            let mut candidates = Self::collect_candidates(arena, Some(kind), hit, context, snapshot);
            if candidates.len() > 1 {
                candidates.sort_by(|a, b| compare_labels(&a.label, &b.label));
                log::debug!("{} overlapping candidates, deferring to disambiguation", candidates.len());
                return DispatchOutcome::Disambiguate(candidates);
            }
            if let Some(candidate) = candidates.pop() {
                if let Some(vo) = arena.get_mut(candidate.vo) {
                    if vo.on_hit_test(event, hit, Some(candidate.index)) {
                        return DispatchOutcome::Handled { vo: candidate.vo };
                    }
                }
                tried = Some(candidate.vo);
            }
        }

        let order: Vec<VoId> = arena.top_down().collect();
        for id in order {
            if Some(id) == tried || Some(id) == self.design_vo || Some(id) == self.capture_vo {
                continue;
            }
            if let Some(vo) = arena.get_mut(id) {
                if vo.on_hit_test(event, hit, None) {
                    return DispatchOutcome::Handled { vo: id };
                }
            }
        }
        DispatchOutcome::NotHandled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geo::LonLat;
    use crate::core::projection::ProjectionKind;
    use crate::layers::vo::VisualObject;
    use crate::spatial::clustering::VoClusters;
    use crate::tiles::window::ViewState;
    use image::RgbaImage;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<(String, Option<usize>)>>>;

    struct Marker {
        label: String,
        hit: bool,
        selectable: bool,
        handles: bool,
        log: Log,
    }

    impl Marker {
        fn new(label: &str, log: &Log) -> Self {
            Self {
                label: label.to_string(),
                hit: true,
                selectable: true,
                handles: true,
                log: Rc::clone(log),
            }
        }
    }

    impl VisualObject for Marker {
        fn label(&self) -> &str {
            &self.label
        }

        fn render(&mut self, _: &mut RgbaImage, _: &RenderContext, _: Option<&VoClusters>, _: Option<usize>) -> usize {
            1
        }

        fn hit_candidates(&self, _: &HitContext, _: &RenderContext, _: Option<&VoClusters>) -> Vec<usize> {
            if self.hit {
                vec![0]
            } else {
                Vec::new()
            }
        }

        fn on_hit_test(&mut self, _: &SceneEvent, _: &HitContext, target: Option<usize>) -> bool {
            self.log.borrow_mut().push((self.label.clone(), target));
            self.handles
        }

        fn is_selectable(&self) -> bool {
            self.selectable
        }
    }

    fn hit() -> HitContext {
        HitContext {
            screen: Point::new(5.0, 5.0),
            geo: LonLat::default(),
            tolerance: 4.0,
        }
    }

    fn click() -> SceneEvent {
        SceneEvent::Click {
            position: Point::new(5.0, 5.0),
        }
    }

    #[test]
    fn test_label_ordering() {
        let mut labels = vec!["Stop 10", "stop 9", "Stop 9", "alpha", "Beta"];
        labels.sort_by(|a, b| compare_labels(a, b));
        assert_eq!(labels, vec!["alpha", "Beta", "Stop 9", "stop 9", "Stop 10"]);
    }

    #[test]
    fn test_three_overlapping_candidates_disambiguate() {
        let projection = ProjectionKind::Mercator.build();
        let ctx = RenderContext::new(projection.as_ref(), ViewState::new(2.0, 0.0, 0.0), 256, (100, 100), 1.0);
        let log = Log::default();
        let mut arena = VoArena::new();
        let c = arena.insert(Box::new(Marker::new("charlie", &log)));
        let a = arena.insert(Box::new(Marker::new("Alpha", &log)));
        let b = arena.insert(Box::new(Marker::new("bravo", &log)));

        let mut dispatcher = EventDispatcher::new();
        match dispatcher.dispatch(&click(), &mut arena, &hit(), &ctx, None) {
            DispatchOutcome::Disambiguate(candidates) => {
                let ids: Vec<_> = candidates.iter().map(|c| c.vo).collect();
                assert_eq!(ids, vec![a, b, c]);
            }
            other => panic!("expected disambiguation, got {:?}", other),
        }
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_single_candidate_dispatched_directly() {
        let projection = ProjectionKind::Mercator.build();
        let ctx = RenderContext::new(projection.as_ref(), ViewState::new(2.0, 0.0, 0.0), 256, (100, 100), 1.0);
        let log = Log::default();
        let mut arena = VoArena::new();
        let only = arena.insert(Box::new(Marker::new("only", &log)));
        let mut miss = Marker::new("miss", &log);
        miss.hit = false;
        miss.handles = false;
        arena.insert(Box::new(miss));

        let mut dispatcher = EventDispatcher::new();
        let outcome = dispatcher.dispatch(&click(), &mut arena, &hit(), &ctx, None);
        assert_eq!(outcome, DispatchOutcome::Handled { vo: only });
        assert_eq!(log.borrow().as_slice(), &[("only".to_string(), Some(0))]);
    }

    #[test]
    fn test_unsubscribed_candidates_filtered() {
        let projection = ProjectionKind::Mercator.build();
        let ctx = RenderContext::new(projection.as_ref(), ViewState::new(2.0, 0.0, 0.0), 256, (100, 100), 1.0);
        let log = Log::default();
        let mut arena = VoArena::new();
        let mut passive = Marker::new("passive", &log);
        passive.selectable = false;
        passive.handles = false;
        arena.insert(Box::new(passive));
        let active = arena.insert(Box::new(Marker::new("active", &log)));

        let mut dispatcher = EventDispatcher::new();
        let outcome = dispatcher.dispatch(&click(), &mut arena, &hit(), &ctx, None);
        assert_eq!(outcome, DispatchOutcome::Handled { vo: active });
    }

    #[test]
    fn test_design_then_capture_then_top_down() {
        let projection = ProjectionKind::Mercator.build();
        let ctx = RenderContext::new(projection.as_ref(), ViewState::new(2.0, 0.0, 0.0), 256, (100, 100), 1.0);
        let log = Log::default();
        let mut arena = VoArena::new();
        let mut bottom = Marker::new("bottom", &log);
        bottom.handles = false;
        let bottom = arena.insert(Box::new(bottom));
        let mut top = Marker::new("top", &log);
        top.handles = false;
        arena.insert(Box::new(top));

        let mut dispatcher = EventDispatcher::new();
        let moved = SceneEvent::PointerMove {
            position: Point::new(1.0, 1.0),
        };
        assert_eq!(
            dispatcher.dispatch(&moved, &mut arena, &hit(), &ctx, None),
            DispatchOutcome::NotHandled
        );
        let order: Vec<_> = log.borrow().iter().map(|(l, _)| l.clone()).collect();
        assert_eq!(order, vec!["top", "bottom"]);

        log.borrow_mut().clear();
        dispatcher.begin_design(bottom);
        dispatcher.dispatch(&moved, &mut arena, &hit(), &ctx, None);
        let order: Vec<_> = log.borrow().iter().map(|(l, _)| l.clone()).collect();
        assert_eq!(order, vec!["bottom", "top"]);
    }

    #[test]
    fn test_track_map_suppresses_and_pans() {
        let projection = ProjectionKind::Mercator.build();
        let ctx = RenderContext::new(projection.as_ref(), ViewState::new(2.0, 0.0, 0.0), 256, (100, 100), 1.0);
        let log = Log::default();
        let mut arena = VoArena::new();
        arena.insert(Box::new(Marker::new("vo", &log)));

        let mut dispatcher = EventDispatcher::new();
        assert_eq!(dispatcher.set_input_mode(InputMode::TrackMap), Some(InputMode::Default));
        assert!(dispatcher.is_listening(EventKind::PointerDown));
        assert_eq!(
            dispatcher.dispatch(&click(), &mut arena, &hit(), &ctx, None),
            DispatchOutcome::MapTracking
        );
        assert!(log.borrow().is_empty());

        dispatcher.track(&SceneEvent::PointerDown {
            position: Point::new(10.0, 10.0),
            button: crate::input::events::MouseButton::Left,
        });
        let pan = dispatcher.track(&SceneEvent::PointerMove {
            position: Point::new(25.0, 4.0),
        });
        assert_eq!(pan, Some(ModeAction::Pan { dx: 15.0, dy: -6.0 }));

        dispatcher.set_input_mode(InputMode::Default);
        assert!(!dispatcher.is_listening(EventKind::PointerMove));
        assert_eq!(
            dispatcher.track(&SceneEvent::PointerMove {
                position: Point::new(30.0, 4.0)
            }),
            None
        );
    }

    #[test]
    fn test_lasso_collects_path() {
        let mut dispatcher = EventDispatcher::new();
        dispatcher.set_input_mode(InputMode::LassoSelect);
        let button = crate::input::events::MouseButton::Left;
        dispatcher.track(&SceneEvent::PointerDown {
            position: Point::new(0.0, 0.0),
            button,
        });
        dispatcher.track(&SceneEvent::PointerMove {
            position: Point::new(10.0, 0.0),
        });
        let action = dispatcher.track(&SceneEvent::PointerUp {
            position: Point::new(10.0, 10.0),
            button,
        });
        assert_eq!(
            action,
            Some(ModeAction::Selection {
                mode: InputMode::LassoSelect,
                path: vec![Point::new(0.0, 0.0), Point::new(10.0, 0.0), Point::new(10.0, 10.0)],
            })
        );
    }
}
