//! The animated-mesh skinning pipeline: a skeleton instance, the states
//! blending into it, skin matrices, morph streams and bone bounds, all
//! recomputed lazily behind dirty flags.

pub mod morphs;
pub mod skinning;

pub use skinning::BoneMapping;

use std::sync::Arc;

use bitflags::bitflags;
use glam::Mat4;
use slotmap::SlotMap;

use crate::animation::clip::AnimationClip;
use crate::animation::state::{AnimationEvent, AnimationState};
use crate::hash::NameHash;
use crate::library::Library;
use crate::resources::{BoundingBox, GeometryData, ModelMorph, VertexStream};
use crate::scene::node::Node;
use crate::scene::skeleton::{BoneCollision, Skeleton};
use crate::scene::NodeKey;

bitflags! {
    /// Lazy-recompute state. Each flag is set by a mutation and cleared only
    /// by the corresponding recompute, giving at-most-once-per-frame work.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    struct DirtyFlags: u8 {
        /// State time/weight changed; the pose pass must re-blend.
        const ANIMATION       = 1 << 0;
        /// State layering changed; the pose pass must re-sort first.
        const ANIMATION_ORDER = 1 << 1;
        const MORPHS          = 1 << 2;
        const SKINNING        = 1 << 3;
        const BONE_BOUNDS     = 1 << 4;
    }
}

/// Rendering-backend constraints injected at model construction.
#[derive(Debug, Clone, Copy)]
pub struct SkinningSettings {
    /// Bone matrices the skinning shader can bind per draw.
    pub max_shader_bones: usize,
}

impl Default for SkinningSettings {
    fn default() -> Self {
        Self {
            max_shader_bones: 64,
        }
    }
}

/// An animated mesh instance attached to a scene node.
///
/// Owns the runtime skeleton (bone node keys populated), the model-mode
/// animation states blending into it, the global skin-matrix array with
/// optional per-geometry bone remapping, and the morph pipeline.
///
/// The first model on a node is the master and owns the bone nodes;
/// secondaries resolve the same nodes by bone name. All read accessors
/// (skin matrices, bounds, mappings) are `&self` and safe to call from
/// worker threads between update passes.
pub struct AnimatedModel {
    node: NodeKey,
    is_master: bool,
    skeleton: Skeleton,
    states: Vec<AnimationState>,

    geometries: Vec<Arc<GeometryData>>,
    morphs: Vec<ModelMorph>,
    /// Morph outputs; empty while every morph weight is zero, in which case
    /// the immutable base streams are served directly.
    working_streams: Vec<VertexStream>,

    skin_matrices: Vec<Mat4>,
    geometry_bone_mappings: Vec<BoneMapping>,
    bone_bounding_box: BoundingBox,

    settings: SkinningSettings,
    update_invisible: bool,
    dirty: DirtyFlags,
    /// Last seen world-transform version per bone node.
    bone_versions: Vec<Option<u32>>,
    events: Vec<AnimationEvent>,
    library_generation: u64,
}

impl AnimatedModel {
    #[must_use]
    pub fn new(
        node: NodeKey,
        skeleton: &Skeleton,
        geometries: Vec<Arc<GeometryData>>,
        morphs: Vec<ModelMorph>,
        settings: SkinningSettings,
        is_master: bool,
    ) -> Self {
        let mut own_skeleton = Skeleton::new();
        own_skeleton.define(skeleton);
        let bone_count = own_skeleton.len();
        let geometry_bone_mappings = skinning::build_geometry_bone_mappings(
            &geometries,
            bone_count,
            settings.max_shader_bones,
        );
        Self {
            node,
            is_master,
            skeleton: own_skeleton,
            states: Vec::new(),
            geometries,
            morphs,
            working_streams: Vec::new(),
            skin_matrices: vec![Mat4::IDENTITY; bone_count],
            geometry_bone_mappings,
            bone_bounding_box: BoundingBox::empty(),
            settings,
            update_invisible: false,
            dirty: DirtyFlags::SKINNING | DirtyFlags::BONE_BOUNDS,
            bone_versions: vec![None; bone_count],
            events: Vec::new(),
            library_generation: 0,
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    #[inline]
    #[must_use]
    pub fn node(&self) -> NodeKey {
        self.node
    }

    #[inline]
    #[must_use]
    pub fn is_master(&self) -> bool {
        self.is_master
    }

    #[inline]
    #[must_use]
    pub fn skeleton(&self) -> &Skeleton {
        &self.skeleton
    }

    #[inline]
    #[must_use]
    pub fn geometries(&self) -> &[Arc<GeometryData>] {
        &self.geometries
    }

    #[inline]
    #[must_use]
    pub fn settings(&self) -> SkinningSettings {
        self.settings
    }

    #[inline]
    #[must_use]
    pub fn update_invisible(&self) -> bool {
        self.update_invisible
    }

    /// Whether weight-zero states keep advancing time.
    pub fn set_update_invisible(&mut self, enable: bool) {
        self.update_invisible = enable;
    }

    /// Bone bounding box in the model node's local space, for culling.
    #[inline]
    #[must_use]
    pub fn bone_bounding_box(&self) -> &BoundingBox {
        &self.bone_bounding_box
    }

    // ========================================================================
    // Animation states
    // ========================================================================

    /// Adds a playback state for `clip`, resolved against the skeleton.
    pub fn add_animation_state(&mut self, clip: Arc<AnimationClip>) -> &mut AnimationState {
        let mut state = AnimationState::new_for_model(clip);
        state.resolve_for_model(&self.skeleton);
        self.states.push(state);
        self.dirty |= DirtyFlags::ANIMATION | DirtyFlags::ANIMATION_ORDER;
        let last = self.states.len() - 1;
        &mut self.states[last]
    }

    #[must_use]
    pub fn animation_state(&self, clip: NameHash) -> Option<&AnimationState> {
        self.states.iter().find(|s| s.clip_hash() == clip)
    }

    /// Mutable state access. Conservatively marks animation and ordering
    /// dirty, since the caller may change time, weight or layer.
    pub fn animation_state_mut(&mut self, clip: NameHash) -> Option<&mut AnimationState> {
        let state = self.states.iter_mut().find(|s| s.clip_hash() == clip)?;
        self.dirty |= DirtyFlags::ANIMATION | DirtyFlags::ANIMATION_ORDER;
        Some(state)
    }

    #[inline]
    #[must_use]
    pub fn animation_states(&self) -> &[AnimationState] {
        &self.states
    }

    pub fn remove_animation_state(&mut self, clip: NameHash) -> bool {
        let before = self.states.len();
        self.states.retain(|s| s.clip_hash() != clip);
        let removed = self.states.len() != before;
        if removed {
            self.dirty |= DirtyFlags::ANIMATION | DirtyFlags::ANIMATION_ORDER;
        }
        removed
    }

    pub fn remove_all_animation_states(&mut self) {
        if !self.states.is_empty() {
            self.states.clear();
            self.dirty |= DirtyFlags::ANIMATION | DirtyFlags::ANIMATION_ORDER;
        }
    }

    /// Restricts a state to the subtree below a bone; `None` clears the
    /// restriction. `false` when the state or bone does not exist.
    pub fn set_state_start_bone(&mut self, clip: NameHash, bone_name: Option<&str>) -> bool {
        let bone_index = match bone_name {
            Some(name) => match self.skeleton.bone_index(NameHash::new(name)) {
                Some(index) => Some(index),
                None => return false,
            },
            None => None,
        };
        let Self {
            states,
            skeleton,
            dirty,
            ..
        } = self;
        let Some(state) = states.iter_mut().find(|s| s.clip_hash() == clip) else {
            return false;
        };
        state.set_start_bone(skeleton, bone_index);
        *dirty |= DirtyFlags::ANIMATION | DirtyFlags::ANIMATION_ORDER;
        true
    }

    /// Per-bone weight mask entry of a state, optionally propagated through
    /// the bone's subtree.
    pub fn set_state_bone_weight(
        &mut self,
        clip: NameHash,
        bone: NameHash,
        weight: f32,
        recursive: bool,
    ) -> bool {
        let Self {
            states,
            skeleton,
            dirty,
            ..
        } = self;
        let Some(state) = states.iter_mut().find(|s| s.clip_hash() == clip) else {
            return false;
        };
        let applied = state.set_bone_weight_by_hash(skeleton, bone, weight, recursive);
        if applied {
            *dirty |= DirtyFlags::ANIMATION;
        }
        applied
    }

    // ========================================================================
    // Dirty marks
    // ========================================================================

    pub fn mark_animation_dirty(&mut self) {
        self.dirty |= DirtyFlags::ANIMATION;
    }

    pub fn mark_animation_order_dirty(&mut self) {
        self.dirty |= DirtyFlags::ANIMATION | DirtyFlags::ANIMATION_ORDER;
    }

    pub fn mark_morphs_dirty(&mut self) {
        self.dirty |= DirtyFlags::MORPHS;
    }

    pub fn mark_skinning_dirty(&mut self) {
        self.dirty |= DirtyFlags::SKINNING;
    }

    // ========================================================================
    // Pose pass
    // ========================================================================

    /// Blends all states into the bone nodes, if animation is dirty.
    ///
    /// Application order is ascending layer, then insertion order within a
    /// layer (the sort is stable). That ordering is a documented contract:
    /// lerp blending deliberately lets later states partially overwrite
    /// earlier ones. The skeleton is first reset to bind pose so the blend
    /// starts from a known base every pass.
    pub fn apply_animation(&mut self, nodes: &mut SlotMap<NodeKey, Node>) {
        if !self
            .dirty
            .intersects(DirtyFlags::ANIMATION | DirtyFlags::ANIMATION_ORDER)
        {
            return;
        }
        if self.dirty.contains(DirtyFlags::ANIMATION_ORDER) {
            self.states.sort_by_key(AnimationState::layer);
            self.dirty -= DirtyFlags::ANIMATION_ORDER;
        }

        self.skeleton.reset_silent(nodes);
        let Self {
            skeleton,
            states,
            events,
            ..
        } = self;
        for state in states.iter_mut() {
            state.apply_to_model(skeleton, nodes);
            events.append(&mut state.take_events());
        }

        self.dirty -= DirtyFlags::ANIMATION;
        self.dirty |= DirtyFlags::SKINNING | DirtyFlags::BONE_BOUNDS;
    }

    /// Drains events queued by the pose pass.
    pub fn take_events(&mut self) -> Vec<AnimationEvent> {
        std::mem::take(&mut self.events)
    }

    // ========================================================================
    // Skinning pass
    // ========================================================================

    /// Recomputes skin matrices (`bone world transform × offset matrix`)
    /// when skinning is dirty or any bone node's world transform moved since
    /// the last pass. Dead bone nodes keep their last matrix.
    pub fn update_skinning(&mut self, nodes: &SlotMap<NodeKey, Node>) {
        let mut changed = self.dirty.contains(DirtyFlags::SKINNING);
        if !changed {
            for (index, bone) in self.skeleton.bones().iter().enumerate() {
                let version = bone
                    .node
                    .and_then(|key| nodes.get(key))
                    .map(|node| node.transform.version());
                if version != self.bone_versions[index] {
                    changed = true;
                    break;
                }
            }
        }
        if !changed {
            return;
        }

        for (index, bone) in self.skeleton.bones().iter().enumerate() {
            let Some(node) = bone.node.and_then(|key| nodes.get(key)) else {
                self.bone_versions[index] = None;
                continue;
            };
            self.skin_matrices[index] = Mat4::from(*node.world_matrix() * bone.offset_matrix);
            self.bone_versions[index] = Some(node.transform.version());
        }
        self.dirty -= DirtyFlags::SKINNING;
    }

    /// The global skin-matrix array, one entry per bone.
    #[inline]
    #[must_use]
    pub fn skin_matrices(&self) -> &[Mat4] {
        &self.skin_matrices
    }

    /// Compacted bone table for a geometry, when per-geometry remapping is
    /// active (`None` under global skinning).
    #[must_use]
    pub fn geometry_bone_mapping(&self, geometry_index: usize) -> Option<&[u32]> {
        self.geometry_bone_mappings
            .get(geometry_index)
            .map(|mapping| mapping.as_slice())
    }

    /// Skin matrix for a geometry-local bone slot, resolved through the
    /// remap table when one is active. Aliases into the global array.
    #[must_use]
    pub fn geometry_skin_matrix(&self, geometry_index: usize, local_index: usize) -> Option<&Mat4> {
        match self.geometry_bone_mappings.get(geometry_index) {
            Some(mapping) => {
                let global = *mapping.get(local_index)? as usize;
                self.skin_matrices.get(global)
            }
            None => self.skin_matrices.get(local_index),
        }
    }

    /// Gathers the matrices a geometry draws with into `out` (an upload
    /// staging buffer), remapped when necessary.
    pub fn gather_geometry_skin_matrices(&self, geometry_index: usize, out: &mut Vec<Mat4>) {
        out.clear();
        match self.geometry_bone_mappings.get(geometry_index) {
            Some(mapping) => {
                out.extend(
                    mapping
                        .iter()
                        .filter_map(|&global| self.skin_matrices.get(global as usize))
                        .copied(),
                );
            }
            None => out.extend_from_slice(&self.skin_matrices),
        }
    }

    // ========================================================================
    // Morphs
    // ========================================================================

    #[inline]
    #[must_use]
    pub fn morphs(&self) -> &[ModelMorph] {
        &self.morphs
    }

    pub fn set_morph_weight(&mut self, index: usize, weight: f32) -> bool {
        match self.morphs.get_mut(index) {
            Some(morph) => {
                if (morph.weight - weight).abs() > f32::EPSILON {
                    morph.weight = weight;
                    self.dirty |= DirtyFlags::MORPHS;
                }
                true
            }
            None => false,
        }
    }

    pub fn set_morph_weight_by_hash(&mut self, hash: NameHash, weight: f32) -> bool {
        match self.morphs.iter().position(|m| m.hash == hash) {
            Some(index) => self.set_morph_weight(index, weight),
            None => false,
        }
    }

    pub fn set_morph_weight_by_name(&mut self, name: &str, weight: f32) -> bool {
        self.set_morph_weight_by_hash(NameHash::new(name), weight)
    }

    #[must_use]
    pub fn morph_weight(&self, index: usize) -> Option<f32> {
        self.morphs.get(index).map(|m| m.weight)
    }

    #[must_use]
    pub fn morph_weight_by_name(&self, name: &str) -> Option<f32> {
        let hash = NameHash::new(name);
        self.morphs
            .iter()
            .find(|m| m.hash == hash)
            .map(|m| m.weight)
    }

    pub fn reset_morph_weights(&mut self) {
        let mut any = false;
        for morph in &mut self.morphs {
            if morph.weight != 0.0 {
                morph.weight = 0.0;
                any = true;
            }
        }
        if any {
            self.dirty |= DirtyFlags::MORPHS;
        }
    }

    /// Rebuilds working vertex streams when morphs are dirty.
    ///
    /// Starts from the immutable base, then adds `weight × delta` for every
    /// morph with a nonzero weight; zero-weight morphs cost nothing. With all
    /// weights zero the working copies are dropped entirely and the base
    /// streams are served again, bit-for-bit.
    pub fn update_morphs(&mut self) {
        if !self.dirty.contains(DirtyFlags::MORPHS) {
            return;
        }
        let any_active = self.morphs.iter().any(|m| m.weight != 0.0);
        if any_active {
            self.working_streams = self
                .geometries
                .iter()
                .map(|g| g.vertices.clone())
                .collect();
            for morph in &self.morphs {
                if morph.weight == 0.0 {
                    continue;
                }
                for buffer in &morph.buffers {
                    let Some(stream) = self.working_streams.get_mut(buffer.geometry_index) else {
                        log::warn!(
                            "morph '{}' targets missing geometry {}",
                            morph.name,
                            buffer.geometry_index
                        );
                        continue;
                    };
                    morphs::apply_morph(stream, buffer, morph.weight);
                }
            }
        } else {
            self.working_streams.clear();
        }
        self.dirty -= DirtyFlags::MORPHS;
    }

    /// Current vertex stream of a geometry: the morphed working copy when
    /// one exists, the immutable base otherwise.
    #[must_use]
    pub fn vertex_stream(&self, geometry_index: usize) -> Option<&VertexStream> {
        if let Some(stream) = self.working_streams.get(geometry_index) {
            return Some(stream);
        }
        self.geometries.get(geometry_index).map(|g| &g.vertices)
    }

    // ========================================================================
    // Bone bounds
    // ========================================================================

    /// Unions every collision-carrying bone's volume (box or sphere) in the
    /// model node's local space, if bounds are dirty.
    pub fn update_bone_bounding_box(&mut self, nodes: &SlotMap<NodeKey, Node>) {
        if !self.dirty.contains(DirtyFlags::BONE_BOUNDS) {
            return;
        }
        self.dirty -= DirtyFlags::BONE_BOUNDS;

        let Some(model_node) = nodes.get(self.node) else {
            return;
        };
        let model_world_inv = model_node.world_matrix().inverse();

        let mut merged = BoundingBox::empty();
        for bone in self.skeleton.bones() {
            if bone.collision.is_empty() {
                continue;
            }
            let Some(bone_node) = bone.node.and_then(|key| nodes.get(key)) else {
                continue;
            };
            let relative = model_world_inv * *bone_node.world_matrix();
            if bone.collision.contains(BoneCollision::BOX) {
                merged.merge(&bone.bounding_box.transformed(&relative));
            }
            if bone.collision.contains(BoneCollision::SPHERE) {
                merged.merge_sphere(relative.translation.into(), bone.radius);
            }
        }
        self.bone_bounding_box = merged;
    }

    // ========================================================================
    // Master/secondary and reload wiring
    // ========================================================================

    /// Assigns freshly created bone nodes (master instance), in bone order.
    pub(crate) fn set_bone_nodes(&mut self, keys: &[NodeKey]) {
        for (bone, &key) in self.skeleton.bones_mut().iter_mut().zip(keys) {
            bone.node = Some(key);
        }
        self.dirty |= DirtyFlags::SKINNING | DirtyFlags::BONE_BOUNDS;
    }

    /// Resolves bone nodes by name against a master's skeleton (secondary
    /// instance). Bones the master lacks stay detached and are skipped at
    /// apply time.
    pub(crate) fn assign_bone_nodes_from(&mut self, master: &Skeleton) {
        for bone in self.skeleton.bones_mut() {
            bone.node = master
                .bone_index(bone.hash)
                .and_then(|i| master.bone(i))
                .and_then(|b| b.node);
            if bone.node.is_none() {
                log::debug!("secondary model: no master bone named '{}'", bone.name);
            }
        }
        self.dirty |= DirtyFlags::SKINNING | DirtyFlags::BONE_BOUNDS;
    }

    /// Merges per-bone collision volumes reported by secondary instances
    /// into this (master) skeleton, keyed by bone name.
    pub(crate) fn merge_secondary_bone_volumes(
        &mut self,
        volumes: &[(NameHash, BoundingBox, f32, BoneCollision)],
    ) {
        for &(hash, ref bounding_box, radius, collision) in volumes {
            let Some(index) = self.skeleton.bone_index(hash) else {
                continue;
            };
            let Some(bone) = self.skeleton.bone_mut(index) else {
                continue;
            };
            if collision.contains(BoneCollision::BOX) {
                bone.bounding_box.merge(bounding_box);
                bone.collision |= BoneCollision::BOX;
            }
            if collision.contains(BoneCollision::SPHERE) {
                bone.radius = bone.radius.max(radius);
                bone.collision |= BoneCollision::SPHERE;
            }
        }
        self.dirty |= DirtyFlags::BONE_BOUNDS;
    }

    /// Reload notification hook: swaps states onto reloaded clips and
    /// re-resolves all track bindings when the library generation moved.
    pub fn refresh_clips(&mut self, library: &Library) {
        if library.generation() == self.library_generation {
            return;
        }
        self.library_generation = library.generation();

        let Self {
            states, skeleton, ..
        } = self;
        for state in states.iter_mut() {
            if let Some(clip) = library.clip(state.clip_hash()) {
                if !Arc::ptr_eq(&clip, state.clip()) {
                    state.set_clip(clip);
                }
            }
            state.resolve_for_model(skeleton);
        }
        self.dirty |= DirtyFlags::ANIMATION | DirtyFlags::ANIMATION_ORDER;
    }
}
