use std::sync::Arc;

use serde::{Deserialize, Serialize};
use slotmap::SlotMap;

use crate::animation::clip::{AnimationClip, Channels, KeyframeCursor, TransformSample};
use crate::hash::NameHash;
use crate::scene::node::Node;
use crate::scene::scene::find_descendant;
use crate::scene::skeleton::{Bone, Skeleton};
use crate::scene::NodeKey;

/// Weights below this are treated as zero; weights above `1 - ε` as full.
pub const WEIGHT_EPSILON: f32 = 1e-4;

/// Full-lap trigger replay cap for one `add_time` call; a time debt beyond
/// this is treated as a scrub rather than replayed lap by lap.
const MAX_TRIGGER_LAPS: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AnimationBlendMode {
    /// Interpolate the target toward the sampled pose by the effective
    /// weight. Order-dependent across states by design: later-applied states
    /// partially overwrite earlier ones.
    #[default]
    Lerp,
    /// Add the sampled pose's deviation from the bind pose on top of
    /// whatever the target already holds.
    Additive,
}

/// What a state drives. A tagged variant, not runtime type inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimationTarget {
    /// A skeleton owned by an [`AnimatedModel`](crate::model::AnimatedModel);
    /// bindings are bone indices, application is weighted and layered.
    Model,
    /// A free node subtree rooted at the key; bindings are node keys,
    /// application is full-weight standalone playback.
    Nodes(NodeKey),
}

/// Per-track runtime state: the resolved binding, the per-bone weight mask
/// entry, and the sampling cursor.
#[derive(Debug, Clone)]
struct StateTrack {
    track_index: usize,
    bone: Option<usize>,
    node: Option<NodeKey>,
    weight: f32,
    /// Set by an explicit per-bone weight call; recursive propagation from an
    /// ancestor never overrides an explicit entry.
    explicit_weight: bool,
    cursor: KeyframeCursor,
}

#[derive(Debug, Clone)]
pub enum AnimationEventKind {
    /// A trigger point was crossed during a time advance.
    Trigger { time: f32, data: serde_json::Value },
    /// A non-looping clip reached its end (fired exactly once per arrival).
    Completed,
}

/// An event queued by a state during time advancement, drained by the owner.
#[derive(Debug, Clone)]
pub struct AnimationEvent {
    pub clip: NameHash,
    pub clip_name: String,
    pub kind: AnimationEventKind,
}

/// One playing instance of a clip: current time, blending weight and the
/// cached track bindings into its target.
#[derive(Debug, Clone)]
pub struct AnimationState {
    clip: Arc<AnimationClip>,
    target: AnimationTarget,
    tracks: Vec<StateTrack>,
    start_bone: Option<usize>,

    time: f32,
    weight: f32,
    looped: bool,
    layer: u8,
    blend_mode: AnimationBlendMode,

    completed: bool,
    events: Vec<AnimationEvent>,
}

impl AnimationState {
    /// State driving a model-owned skeleton. Bindings are empty until
    /// [`resolve_for_model`](Self::resolve_for_model) runs.
    #[must_use]
    pub fn new_for_model(clip: Arc<AnimationClip>) -> Self {
        Self::new(clip, AnimationTarget::Model)
    }

    /// State driving a free node subtree. Bindings are empty until
    /// [`resolve_for_nodes`](Self::resolve_for_nodes) runs.
    #[must_use]
    pub fn new_for_nodes(clip: Arc<AnimationClip>, root: NodeKey) -> Self {
        Self::new(clip, AnimationTarget::Nodes(root))
    }

    fn new(clip: Arc<AnimationClip>, target: AnimationTarget) -> Self {
        Self {
            clip,
            target,
            tracks: Vec::new(),
            start_bone: None,
            time: 0.0,
            weight: 1.0,
            looped: false,
            layer: 0,
            blend_mode: AnimationBlendMode::Lerp,
            completed: false,
            events: Vec::new(),
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    #[inline]
    #[must_use]
    pub fn clip(&self) -> &Arc<AnimationClip> {
        &self.clip
    }

    #[inline]
    #[must_use]
    pub fn clip_hash(&self) -> NameHash {
        self.clip.hash()
    }

    #[inline]
    #[must_use]
    pub fn length(&self) -> f32 {
        self.clip.length()
    }

    #[inline]
    #[must_use]
    pub fn target(&self) -> AnimationTarget {
        self.target
    }

    #[inline]
    #[must_use]
    pub fn time(&self) -> f32 {
        self.time
    }

    #[inline]
    #[must_use]
    pub fn weight(&self) -> f32 {
        self.weight
    }

    #[inline]
    #[must_use]
    pub fn looped(&self) -> bool {
        self.looped
    }

    #[inline]
    #[must_use]
    pub fn layer(&self) -> u8 {
        self.layer
    }

    #[inline]
    #[must_use]
    pub fn blend_mode(&self) -> AnimationBlendMode {
        self.blend_mode
    }

    /// Whether the blending weight is nonzero.
    #[inline]
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.weight >= WEIGHT_EPSILON
    }

    /// Whether a non-looping clip has reached its end.
    #[must_use]
    pub fn is_at_end(&self) -> bool {
        !self.looped && self.time >= self.clip.length()
    }

    #[inline]
    #[must_use]
    pub fn start_bone(&self) -> Option<usize> {
        self.start_bone
    }

    /// Number of tracks currently bound to a live target.
    #[must_use]
    pub fn bound_track_count(&self) -> usize {
        self.tracks.len()
    }

    // ========================================================================
    // Setters
    // ========================================================================

    pub fn set_looped(&mut self, looped: bool) {
        self.looped = looped;
        if looped {
            self.completed = false;
        }
    }

    pub fn set_weight(&mut self, weight: f32) {
        self.weight = weight.clamp(0.0, 1.0);
    }

    pub fn add_weight(&mut self, delta: f32) {
        self.set_weight(self.weight + delta);
    }

    pub fn set_layer(&mut self, layer: u8) {
        self.layer = layer;
    }

    pub fn set_blend_mode(&mut self, mode: AnimationBlendMode) {
        self.blend_mode = mode;
    }

    /// Seeks without firing triggers; re-arms the completion latch when the
    /// new time is before the end.
    pub fn set_time(&mut self, time: f32) {
        let length = self.clip.length();
        self.time = time.clamp(0.0, length);
        self.completed = !self.looped && self.time >= length;
    }

    /// Advances playback time.
    ///
    /// Looped clips wrap modulo length; non-looping clips clamp, and arriving
    /// at the end queues a completion event exactly once. Triggers inside the
    /// traversed interval fire in time order, once per crossing, with loop
    /// wraps splitting the interval into `(t, length] ∪ [0, t']`. Reverse
    /// traversal moves time but fires nothing.
    pub fn add_time(&mut self, delta: f32) {
        let length = self.clip.length();
        if length <= 0.0 || delta == 0.0 {
            return;
        }

        let prev = self.time;
        if delta < 0.0 {
            self.time = if self.looped {
                (prev + delta).rem_euclid(length)
            } else {
                (prev + delta).clamp(0.0, length)
            };
            if self.time < length {
                self.completed = false;
            }
            return;
        }

        if self.looped {
            let laps = (delta / length) as u32;
            if laps > MAX_TRIGGER_LAPS {
                let end = (prev + delta).rem_euclid(length);
                self.collect_triggers(0.0, end, true);
                self.time = end;
                return;
            }

            let mut seg_start = prev;
            let mut remaining = delta;
            let mut wrapped = false;
            loop {
                let seg_end = (seg_start + remaining).min(length);
                self.collect_triggers(seg_start, seg_end, wrapped);
                remaining -= seg_end - seg_start;
                if remaining <= 0.0 {
                    break;
                }
                seg_start = 0.0;
                wrapped = true;
            }
            self.time = (prev + delta).rem_euclid(length);
        } else {
            let end = (prev + delta).min(length);
            self.collect_triggers(prev, end, false);
            self.time = end;
            if end >= length && !self.completed {
                self.completed = true;
                self.events.push(AnimationEvent {
                    clip: self.clip.hash(),
                    clip_name: self.clip.name().to_string(),
                    kind: AnimationEventKind::Completed,
                });
            }
        }
    }

    fn collect_triggers(&mut self, start: f32, end: f32, include_start: bool) {
        let clip = self.clip.clone();
        for trigger in clip.triggers_in(start, end, include_start) {
            self.events.push(AnimationEvent {
                clip: clip.hash(),
                clip_name: clip.name().to_string(),
                kind: AnimationEventKind::Trigger {
                    time: trigger.time,
                    data: trigger.data.clone(),
                },
            });
        }
    }

    /// Drains events queued since the last drain.
    pub fn take_events(&mut self) -> Vec<AnimationEvent> {
        std::mem::take(&mut self.events)
    }

    // ========================================================================
    // Binding
    // ========================================================================

    /// Resolves tracks against a skeleton by bone name hash. Unmatched
    /// tracks stay unbound (partial rigs are legitimate). Honors the start
    /// bone restriction.
    pub fn resolve_for_model(&mut self, skeleton: &Skeleton) {
        self.tracks.clear();
        for (index, track) in self.clip.tracks().iter().enumerate() {
            let Some(bone_index) = skeleton.bone_index(track.hash) else {
                log::debug!(
                    "clip '{}': no bone for track '{}'",
                    self.clip.name(),
                    track.name
                );
                continue;
            };
            if let Some(start) = self.start_bone {
                if !skeleton.is_in_subtree(bone_index, start) {
                    continue;
                }
            }
            self.tracks.push(StateTrack {
                track_index: index,
                bone: Some(bone_index),
                node: None,
                weight: 1.0,
                explicit_weight: false,
                cursor: KeyframeCursor::default(),
            });
        }
    }

    /// Resolves tracks against a node subtree by node name hash.
    pub fn resolve_for_nodes(&mut self, nodes: &SlotMap<NodeKey, Node>) {
        let AnimationTarget::Nodes(root) = self.target else {
            return;
        };
        self.tracks.clear();
        for (index, track) in self.clip.tracks().iter().enumerate() {
            let Some(node_key) = find_descendant(nodes, root, track.hash) else {
                log::debug!(
                    "clip '{}': no node for track '{}'",
                    self.clip.name(),
                    track.name
                );
                continue;
            };
            self.tracks.push(StateTrack {
                track_index: index,
                bone: None,
                node: Some(node_key),
                weight: 1.0,
                explicit_weight: false,
                cursor: KeyframeCursor::default(),
            });
        }
    }

    /// Swaps the clip for a reloaded instance. Bindings and cursors are
    /// dropped; the owner re-resolves.
    pub fn set_clip(&mut self, clip: Arc<AnimationClip>) {
        self.clip = clip;
        self.tracks.clear();
        self.time = self.time.clamp(0.0, self.clip.length());
    }

    /// Restricts application to the subtree rooted at `bone` (model mode).
    /// Resets per-bone weight overrides, which are defined relative to the
    /// affected subtree.
    pub fn set_start_bone(&mut self, skeleton: &Skeleton, bone: Option<usize>) {
        if self.target != AnimationTarget::Model {
            return;
        }
        self.start_bone = bone;
        self.resolve_for_model(skeleton);
    }

    // ========================================================================
    // Per-bone weights
    // ========================================================================

    /// Sets the weight mask entry for `bone_index`. With `recursive`, every
    /// descendant bone inherits the weight unless it carries its own explicit
    /// override.
    pub fn set_bone_weight(
        &mut self,
        skeleton: &Skeleton,
        bone_index: usize,
        weight: f32,
        recursive: bool,
    ) {
        let weight = weight.clamp(0.0, 1.0);
        for track in &mut self.tracks {
            if track.bone == Some(bone_index) {
                track.weight = weight;
                track.explicit_weight = true;
            }
        }
        if recursive {
            for track in &mut self.tracks {
                let Some(bone) = track.bone else {
                    continue;
                };
                if bone != bone_index
                    && !track.explicit_weight
                    && skeleton.is_in_subtree(bone, bone_index)
                {
                    track.weight = weight;
                }
            }
        }
    }

    /// Name-addressed variant; `false` when the skeleton has no such bone.
    pub fn set_bone_weight_by_hash(
        &mut self,
        skeleton: &Skeleton,
        hash: NameHash,
        weight: f32,
        recursive: bool,
    ) -> bool {
        match skeleton.bone_index(hash) {
            Some(index) => {
                self.set_bone_weight(skeleton, index, weight, recursive);
                true
            }
            None => false,
        }
    }

    /// Current mask weight of `bone_index`, if a track drives it.
    #[must_use]
    pub fn bone_weight(&self, bone_index: usize) -> Option<f32> {
        self.tracks
            .iter()
            .find(|t| t.bone == Some(bone_index))
            .map(|t| t.weight)
    }

    /// Explicit per-track weight overrides as `(track hash, weight)` pairs —
    /// the compact blob used by controller snapshots.
    #[must_use]
    pub fn weight_overrides(&self) -> Vec<(NameHash, f32)> {
        self.tracks
            .iter()
            .filter(|t| t.explicit_weight)
            .filter_map(|t| self.clip.track(t.track_index).map(|tr| (tr.hash, t.weight)))
            .collect()
    }

    /// Restores explicit weight overrides from a snapshot blob.
    pub fn apply_weight_overrides(&mut self, overrides: &[(NameHash, f32)]) {
        for &(hash, weight) in overrides {
            let Some(track_index) = self.clip.track_index(hash) else {
                continue;
            };
            for track in &mut self.tracks {
                if track.track_index == track_index {
                    track.weight = weight.clamp(0.0, 1.0);
                    track.explicit_weight = true;
                }
            }
        }
    }

    // ========================================================================
    // Application
    // ========================================================================

    /// Blends this state into the bone nodes of `skeleton`.
    ///
    /// Effective weight per track is `state weight × per-bone mask`. Bones
    /// with animation disabled, unbound tracks and dead node keys are
    /// skipped. Zero effective weight leaves the target untouched.
    pub fn apply_to_model(&mut self, skeleton: &Skeleton, nodes: &mut SlotMap<NodeKey, Node>) {
        if self.weight < WEIGHT_EPSILON {
            return;
        }
        let clip = self.clip.clone();
        for state_track in &mut self.tracks {
            let Some(bone) = state_track.bone.and_then(|i| skeleton.bone(i)) else {
                continue;
            };
            if !bone.animated {
                continue;
            }
            let weight = self.weight * state_track.weight;
            if weight < WEIGHT_EPSILON {
                continue;
            }
            let Some(node) = bone.node.and_then(|key| nodes.get_mut(key)) else {
                continue;
            };
            let Some(track) = clip.track(state_track.track_index) else {
                continue;
            };
            let Some(sample) = track.sample_with_cursor(self.time, &mut state_track.cursor)
            else {
                continue;
            };
            blend_into(node, track.channels, &sample, weight, self.blend_mode, bone);
        }
    }

    /// Writes this state into its free node subtree. Standalone playback:
    /// authored channels are set directly, weight and blend mode do not
    /// apply.
    pub fn apply_to_nodes(&mut self, nodes: &mut SlotMap<NodeKey, Node>) {
        let clip = self.clip.clone();
        for state_track in &mut self.tracks {
            let Some(node) = state_track.node.and_then(|key| nodes.get_mut(key)) else {
                continue;
            };
            let Some(track) = clip.track(state_track.track_index) else {
                continue;
            };
            let Some(sample) = track.sample_with_cursor(self.time, &mut state_track.cursor)
            else {
                continue;
            };
            let transform = &mut node.transform;
            if track.channels.contains(Channels::POSITION) {
                transform.position = sample.position;
            }
            if track.channels.contains(Channels::ROTATION) {
                transform.rotation = sample.rotation;
            }
            if track.channels.contains(Channels::SCALE) {
                transform.scale = sample.scale;
            }
        }
    }
}

/// Blends one sampled SRT into a bone node's local transform.
fn blend_into(
    node: &mut Node,
    channels: Channels,
    sample: &TransformSample,
    weight: f32,
    mode: AnimationBlendMode,
    bone: &Bone,
) {
    let transform = &mut node.transform;
    let full = weight >= 1.0 - WEIGHT_EPSILON;
    match mode {
        AnimationBlendMode::Lerp => {
            if channels.contains(Channels::POSITION) {
                transform.position = if full {
                    sample.position
                } else {
                    transform.position.lerp(sample.position, weight)
                };
            }
            if channels.contains(Channels::ROTATION) {
                transform.rotation = if full {
                    sample.rotation
                } else {
                    transform.rotation.slerp(sample.rotation, weight)
                };
            }
            if channels.contains(Channels::SCALE) {
                transform.scale = if full {
                    sample.scale
                } else {
                    transform.scale.lerp(sample.scale, weight)
                };
            }
        }
        AnimationBlendMode::Additive => {
            if channels.contains(Channels::POSITION) {
                transform.position += (sample.position - bone.initial_position) * weight;
            }
            if channels.contains(Channels::ROTATION) {
                let delta = sample.rotation * bone.initial_rotation.inverse();
                let target = (delta * transform.rotation).normalize();
                transform.rotation = if full {
                    target
                } else {
                    transform.rotation.slerp(target, weight)
                };
            }
            if channels.contains(Channels::SCALE) {
                transform.scale += (sample.scale - bone.initial_scale) * weight;
            }
        }
    }
}
