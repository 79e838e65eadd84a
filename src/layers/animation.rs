use crate::core::geo::Point;
use instant::Instant;
use std::time::Duration;

/// Easing curves available to zoom animations
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum EasingType {
    Linear,
    /// Quadratic ease-out, `t * (2 - t)`
    #[default]
    EaseOut,
}

impl EasingType {
    /// Apply easing function to a normalized time value (0.0 to 1.0)
    pub fn apply(self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            EasingType::Linear => t,
            EasingType::EaseOut => t * (2.0 - t),
        }
    }
}

/// Exact-LOD walk from `origin_lod` to `target_lod` around a fixed screen point
#[derive(Debug, Clone, PartialEq)]
pub struct ZoomAnimation {
    pub origin_lod: f64,
    pub target_lod: f64,
    pub start_time: Instant,
    pub duration: Duration,
    pub focus: Point,
    easing: EasingType,
}

impl ZoomAnimation {
    pub fn new(origin_lod: f64, target_lod: f64, focus: Point, start_time: Instant, duration: Duration) -> Self {
        Self {
            origin_lod,
            target_lod,
            start_time,
            duration,
            focus,
            easing: EasingType::EaseOut,
        }
    }

    pub fn with_easing(mut self, easing: EasingType) -> Self {
        self.easing = easing;
        self
    }

    /// Normalized elapsed time in `[0, 1]`
    pub fn progress(&self, now: Instant) -> f64 {
        if self.duration.is_zero() {
            return 1.0;
        }
        let elapsed = now.saturating_duration_since(self.start_time);
        (elapsed.as_secs_f64() / self.duration.as_secs_f64()).min(1.0)
    }

    /// Eased exact LOD at `now`; lands exactly on the target when done
    pub fn lod_at(&self, now: Instant) -> f64 {
        let progress = self.progress(now);
        if progress >= 1.0 {
            return self.target_lod;
        }
        self.origin_lod + (self.target_lod - self.origin_lod) * self.easing.apply(progress)
    }

    pub fn is_finished(&self, now: Instant) -> bool {
        self.progress(now) >= 1.0
    }
}

/// One frame's worth of zoom to apply
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnimationStep {
    /// Eased exact LOD for this frame
    pub lod: f64,
    pub focus: Point,
    pub finished: bool,
}

/// Holds at most one running zoom animation
#[derive(Debug, Default)]
pub struct ZoomAnimator {
    current: Option<ZoomAnimation>,
}

impl ZoomAnimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts `animation`, returning the one it replaced
    pub fn start(&mut self, animation: ZoomAnimation) -> Option<ZoomAnimation> {
        let replaced = self.current.replace(animation);
        if replaced.is_some() {
            log::debug!("zoom animation superseded");
        }
        replaced
    }

    pub fn cancel(&mut self) -> Option<ZoomAnimation> {
        self.current.take()
    }

    pub fn is_active(&self) -> bool {
        self.current.is_some()
    }

    pub fn current(&self) -> Option<&ZoomAnimation> {
        self.current.as_ref()
    }

    /// Advances to `now`
    pub fn step(&mut self, now: Instant) -> Option<AnimationStep> {
        let animation = self.current.as_ref()?;
        let step = AnimationStep {
            lod: animation.lod_at(now),
            focus: animation.focus,
            finished: animation.is_finished(now),
        };
        if step.finished {
            self.current = None;
        }
        Some(step)
    }
}

/// What a frame callback has to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameWork {
    pub redraw: bool,
    /// A debounced re-render came due in this frame
    pub debounced: bool,
}

/// Coalesces redraw requests into a single pending display frame
#[derive(Debug, Default)]
pub struct FrameScheduler {
    frame_pending: bool,
    debounce_deadline: Option<Instant>,
    frames: u64,
}

impl FrameScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks for a frame; returns false if one was already pending
    pub fn request_frame(&mut self) -> bool {
        !std::mem::replace(&mut self.frame_pending, true)
    }

    pub fn is_frame_pending(&self) -> bool {
        self.frame_pending
    }

    /// (Re)arms a re-render that fires `delay` after the latest call
    pub fn request_debounced(&mut self, now: Instant, delay: Duration) {
        self.debounce_deadline = Some(now + delay);
    }

    pub fn debounce_deadline(&self) -> Option<Instant> {
        self.debounce_deadline
    }

    pub fn cancel_debounced(&mut self) -> bool {
        self.debounce_deadline.take().is_some()
    }

    /// Drops both the pending frame and any debounced re-render
    pub fn cancel_all(&mut self) {
        self.frame_pending = false;
        self.debounce_deadline = None;
    }

    /// Consumes the pending frame at display refresh time `now`
    pub fn begin_frame(&mut self, now: Instant) -> FrameWork {
        let debounced = match self.debounce_deadline {
            Some(deadline) if deadline <= now => {
                self.debounce_deadline = None;
                true
            }
            _ => false,
        };
        let redraw = std::mem::take(&mut self.frame_pending) || debounced;
        if redraw {
            self.frames += 1;
        }
        FrameWork { redraw, debounced }
    }

    /// Frames that did work so far
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ease_out_curve() {
        assert_eq!(EasingType::EaseOut.apply(0.0), 0.0);
        assert_eq!(EasingType::EaseOut.apply(0.5), 0.75);
        assert_eq!(EasingType::EaseOut.apply(1.0), 1.0);
        assert_eq!(EasingType::EaseOut.apply(3.0), 1.0);
    }

    #[test]
    fn test_animation_lands_on_target() {
        let start = Instant::now();
        let anim = ZoomAnimation::new(3.0, 5.0, Point::new(0.0, 0.0), start, Duration::from_millis(100));
        assert_eq!(anim.lod_at(start), 3.0);
        let half = anim.lod_at(start + Duration::from_millis(50));
        assert!((half - 4.5).abs() < 1e-9);
        assert_eq!(anim.lod_at(start + Duration::from_millis(150)), 5.0);
    }

    #[test]
    fn test_animator_step_and_cancel() {
        let start = Instant::now();
        let mut animator = ZoomAnimator::new();
        let focus = Point::new(10.0, 20.0);
        assert!(animator
            .start(ZoomAnimation::new(2.0, 4.0, focus, start, Duration::from_millis(100)))
            .is_none());
        let step = animator.step(start + Duration::from_millis(50)).unwrap();
        assert!((step.lod - 3.5).abs() < 1e-9);
        assert_eq!(step.focus, focus);
        assert!(!step.finished);

        let last = animator.step(start + Duration::from_millis(100)).unwrap();
        assert!(last.finished);
        assert_eq!(last.lod, 4.0);
        assert!(!animator.is_active());

        animator.start(ZoomAnimation::new(2.0, 4.0, focus, start, Duration::ZERO));
        assert!(animator
            .start(ZoomAnimation::new(2.0, 1.0, focus, start, Duration::ZERO))
            .is_some());
        assert!(animator.cancel().is_some());
        assert!(animator.step(start).is_none());
    }

    #[test]
    fn test_frame_coalescing() {
        let now = Instant::now();
        let mut frames = FrameScheduler::new();
        assert!(frames.request_frame());
        assert!(!frames.request_frame());
        assert!(!frames.request_frame());
        assert!(frames.begin_frame(now).redraw);
        assert!(!frames.begin_frame(now).redraw);
        assert_eq!(frames.frames(), 1);
    }

    #[test]
    fn test_debounce() {
        let now = Instant::now();
        let mut frames = FrameScheduler::new();
        frames.request_debounced(now, Duration::from_millis(40));
        assert!(!frames.begin_frame(now + Duration::from_millis(20)).redraw);
        frames.request_debounced(now + Duration::from_millis(20), Duration::from_millis(40));
        assert!(!frames.begin_frame(now + Duration::from_millis(50)).redraw);
        let work = frames.begin_frame(now + Duration::from_millis(60));
        assert!(work.redraw && work.debounced);

        frames.request_debounced(now, Duration::from_millis(10));
        assert!(frames.cancel_debounced());
        assert!(!frames.begin_frame(now + Duration::from_secs(1)).redraw);
    }
}
