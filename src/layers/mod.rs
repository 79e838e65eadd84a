pub mod animation;
pub mod vo;

pub use animation::{
    AnimationStep, EasingType, FrameScheduler, FrameWork, ZoomAnimation, ZoomAnimator,
};
pub use vo::{VisualObject, VoArena, VoFlags, VoId};
