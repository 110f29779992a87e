#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

//! Skeletal animation and skinning engine.
//!
//! Samples keyframed bone transforms with correct interpolation and looping,
//! blends many simultaneously playing clips (weighted, layered, lerp or
//! additive) into one pose per bone, and turns the posed hierarchy into
//! render-ready skin matrices and morphed vertex streams — lazily, behind
//! dirty flags, once per frame.

pub mod animation;
pub mod errors;
pub mod hash;
pub mod library;
pub mod model;
pub mod resources;
pub mod scene;
pub mod systems;

pub use animation::{
    AnimationBlendMode, AnimationClip, AnimationControl, AnimationController, AnimationEvent,
    AnimationEventKind, AnimationState, AnimationTarget, Channels, ControlSnapshot,
    ControllerSnapshot, Keyframe, KeyframeCursor, NodeStateSnapshot, ReplicatedField, Track,
    TransformSample, TriggerPoint,
};
pub use errors::{MarrowError, Result};
pub use hash::NameHash;
pub use library::Library;
pub use model::{AnimatedModel, BoneMapping, SkinningSettings};
pub use resources::{
    BoundingBox, GeometryData, ModelMorph, MorphBuffer, MorphChannels, MorphVertex, SkinInfluence,
    VertexStream,
};
pub use scene::{
    Bone, BoneCollision, ControllerKey, ModelKey, Node, NodeKey, Scene, Skeleton, Transform,
};
