//! Keyframed animation: clip data, per-clip playback states with layered
//! blending, and the multi-clip controller with its replication protocol.

pub mod clip;
pub mod controller;
pub mod replication;
pub mod state;

pub use clip::{
    AnimationClip, Channels, Keyframe, KeyframeCursor, Track, TransformSample, TriggerPoint,
};
pub use controller::{AnimationControl, AnimationController};
pub use replication::{ControlSnapshot, ControllerSnapshot, NodeStateSnapshot, ReplicatedField};
pub use state::{
    AnimationBlendMode, AnimationEvent, AnimationEventKind, AnimationState, AnimationTarget,
};
