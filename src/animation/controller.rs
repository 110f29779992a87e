use std::sync::Arc;

use crate::animation::replication::{
    ControlSnapshot, ControllerSnapshot, NodeStateSnapshot, ReplicatedField,
};
use crate::animation::state::{
    AnimationBlendMode, AnimationEvent, AnimationState, WEIGHT_EPSILON,
};
use crate::errors::{MarrowError, Result};
use crate::hash::NameHash;
use crate::library::Library;
use crate::scene::scene::Scene;
use crate::scene::{ModelKey, NodeKey};

/// Per-playing-clip record: fade bookkeeping, speed, auto-fade, and the two
/// replicated command slots.
#[derive(Debug, Clone)]
pub struct AnimationControl {
    name: String,
    hash: NameHash,
    speed: f32,
    target_weight: f32,
    fade_time: f32,
    auto_fade_time: f32,
    remove_on_completion: bool,
    set_time: ReplicatedField<f32>,
    set_weight: ReplicatedField<f32>,
}

impl AnimationControl {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            hash: NameHash::new(name),
            speed: 1.0,
            target_weight: 0.0,
            fade_time: 0.0,
            auto_fade_time: 0.0,
            remove_on_completion: true,
            set_time: ReplicatedField::default(),
            set_weight: ReplicatedField::default(),
        }
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub fn hash(&self) -> NameHash {
        self.hash
    }

    #[inline]
    #[must_use]
    pub fn speed(&self) -> f32 {
        self.speed
    }

    #[inline]
    #[must_use]
    pub fn target_weight(&self) -> f32 {
        self.target_weight
    }

    #[inline]
    #[must_use]
    pub fn fade_time(&self) -> f32 {
        self.fade_time
    }

    #[inline]
    #[must_use]
    pub fn auto_fade_time(&self) -> f32 {
        self.auto_fade_time
    }

    #[inline]
    #[must_use]
    pub fn remove_on_completion(&self) -> bool {
        self.remove_on_completion
    }

    /// Live outbound `set time` command, if not yet decayed.
    #[must_use]
    pub fn pending_set_time(&self) -> Option<f32> {
        self.set_time.pending()
    }

    /// Live outbound `set weight` command, if not yet decayed.
    #[must_use]
    pub fn pending_set_weight(&self) -> Option<f32> {
        self.set_weight.pending()
    }
}

/// Orchestrates the set of concurrently playing clips on one entity:
/// play/stop with fades, layering, exclusivity, per-frame time and weight
/// advancement, and the revision-counted remote command protocol.
///
/// A controller drives either an [`AnimatedModel`](crate::model::AnimatedModel)
/// (skeletal blending; states are owned by the model) or a free node subtree
/// (standalone playback; states are owned here). All name-addressed
/// operations return `false` when no matching active clip exists.
pub struct AnimationController {
    model: Option<ModelKey>,
    node: Option<NodeKey>,
    controls: Vec<AnimationControl>,
    node_states: Vec<AnimationState>,
    events: Vec<AnimationEvent>,
}

impl AnimationController {
    /// Controller driving a skeletal model.
    #[must_use]
    pub fn for_model(model: ModelKey) -> Self {
        Self {
            model: Some(model),
            node: None,
            controls: Vec::new(),
            node_states: Vec::new(),
            events: Vec::new(),
        }
    }

    /// Controller driving a free node subtree.
    #[must_use]
    pub fn for_node(root: NodeKey) -> Self {
        Self {
            model: None,
            node: Some(root),
            controls: Vec::new(),
            node_states: Vec::new(),
            events: Vec::new(),
        }
    }

    /// Placeholder with no target; used to temporarily vacate a scene slot.
    pub(crate) fn detached() -> Self {
        Self {
            model: None,
            node: None,
            controls: Vec::new(),
            node_states: Vec::new(),
            events: Vec::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn model(&self) -> Option<ModelKey> {
        self.model
    }

    #[inline]
    #[must_use]
    pub fn controls(&self) -> &[AnimationControl] {
        &self.controls
    }

    #[inline]
    #[must_use]
    pub fn node_states(&self) -> &[AnimationState] {
        &self.node_states
    }

    // ========================================================================
    // Playback
    // ========================================================================

    /// Starts (or retargets) playback of the named clip.
    ///
    /// Idempotent merge: a clip that is already active keeps its time, and
    /// only layer, loop flag and fade target are updated. A new clip starts
    /// at weight 0 and ramps to 1 over `fade_in_time` (immediately when ≈ 0).
    pub fn play(
        &mut self,
        scene: &mut Scene,
        library: &Library,
        name: &str,
        layer: u8,
        looped: bool,
        fade_in_time: f32,
    ) -> bool {
        let hash = NameHash::new(name);
        if !self.ensure_state(scene, library, name, hash) {
            return false;
        }

        if self.control_index(hash).is_none() {
            self.controls.push(AnimationControl::new(name));
        }
        if let Some(index) = self.control_index(hash) {
            let control = &mut self.controls[index];
            control.target_weight = 1.0;
            control.fade_time = fade_in_time;
        }
        if let Some(state) = self.state_mut(scene, hash) {
            state.set_layer(layer);
            state.set_looped(looped);
        }
        true
    }

    /// [`play`](Self::play), plus fading every other clip on the same layer
    /// out over the same fade time.
    pub fn play_exclusive(
        &mut self,
        scene: &mut Scene,
        library: &Library,
        name: &str,
        layer: u8,
        looped: bool,
        fade_time: f32,
    ) -> bool {
        if !self.play(scene, library, name, layer, looped, fade_time) {
            return false;
        }
        self.retarget_others(scene, Some(NameHash::new(name)), Some(layer), 0.0, fade_time);
        true
    }

    /// Sets a linear weight ramp toward `target_weight` over `fade_time`.
    pub fn fade(&mut self, name: &str, target_weight: f32, fade_time: f32) -> bool {
        let Some(index) = self.control_index(NameHash::new(name)) else {
            return false;
        };
        let control = &mut self.controls[index];
        control.target_weight = target_weight.clamp(0.0, 1.0);
        control.fade_time = fade_time;
        true
    }

    /// Fades every other clip on the named clip's layer toward
    /// `target_weight`.
    pub fn fade_others(
        &mut self,
        scene: &Scene,
        name: &str,
        target_weight: f32,
        fade_time: f32,
    ) -> bool {
        let hash = NameHash::new(name);
        let Some(layer) = self.state(scene, hash).map(AnimationState::layer) else {
            return false;
        };
        self.retarget_others(scene, Some(hash), Some(layer), target_weight, fade_time);
        true
    }

    /// Fades the named clip out; it is removed once the weight reaches zero
    /// unless `remove_on_completion` was disabled.
    pub fn stop(&mut self, name: &str, fade_out_time: f32) -> bool {
        self.fade(name, 0.0, fade_out_time)
    }

    /// Fades out every clip on `layer`.
    pub fn stop_layer(&mut self, scene: &Scene, layer: u8, fade_out_time: f32) {
        self.retarget_others(scene, None, Some(layer), 0.0, fade_out_time);
    }

    /// Fades out every active clip.
    pub fn stop_all(&mut self, fade_out_time: f32) {
        for control in &mut self.controls {
            control.target_weight = 0.0;
            control.fade_time = fade_out_time;
        }
    }

    fn retarget_others(
        &mut self,
        scene: &Scene,
        exclude: Option<NameHash>,
        layer: Option<u8>,
        target_weight: f32,
        fade_time: f32,
    ) {
        for index in 0..self.controls.len() {
            let hash = self.controls[index].hash;
            if exclude == Some(hash) {
                continue;
            }
            if let Some(required) = layer {
                let state_layer = if let Some(model_key) = self.model {
                    scene
                        .models
                        .get(model_key)
                        .and_then(|m| m.animation_state(hash))
                        .map(AnimationState::layer)
                } else {
                    self.node_states
                        .iter()
                        .find(|s| s.clip_hash() == hash)
                        .map(AnimationState::layer)
                };
                if state_layer != Some(required) {
                    continue;
                }
            }
            let control = &mut self.controls[index];
            control.target_weight = target_weight;
            control.fade_time = fade_time;
        }
    }

    // ========================================================================
    // Setters
    // ========================================================================

    pub fn set_layer(&mut self, scene: &mut Scene, name: &str, layer: u8) -> bool {
        let hash = NameHash::new(name);
        match self.state_mut(scene, hash) {
            Some(state) => {
                state.set_layer(layer);
                true
            }
            None => false,
        }
    }

    /// Restricts the named clip to the subtree below `bone_name` (model mode
    /// only); `None` clears the restriction.
    pub fn set_start_bone(
        &mut self,
        scene: &mut Scene,
        name: &str,
        bone_name: Option<&str>,
    ) -> bool {
        let Some(model) = self.model.and_then(|k| scene.models.get_mut(k)) else {
            return false;
        };
        model.set_state_start_bone(NameHash::new(name), bone_name)
    }

    pub fn set_time(&mut self, scene: &mut Scene, name: &str, time: f32) -> bool {
        let hash = NameHash::new(name);
        match self.state_mut(scene, hash) {
            Some(state) => {
                state.set_time(time);
                true
            }
            None => false,
        }
    }

    pub fn set_weight(&mut self, scene: &mut Scene, name: &str, weight: f32) -> bool {
        let hash = NameHash::new(name);
        match self.state_mut(scene, hash) {
            Some(state) => {
                state.set_weight(weight);
                true
            }
            None => false,
        }
    }

    pub fn set_looped(&mut self, scene: &mut Scene, name: &str, looped: bool) -> bool {
        let hash = NameHash::new(name);
        match self.state_mut(scene, hash) {
            Some(state) => {
                state.set_looped(looped);
                true
            }
            None => false,
        }
    }

    pub fn set_blend_mode(
        &mut self,
        scene: &mut Scene,
        name: &str,
        mode: AnimationBlendMode,
    ) -> bool {
        let hash = NameHash::new(name);
        match self.state_mut(scene, hash) {
            Some(state) => {
                state.set_blend_mode(mode);
                true
            }
            None => false,
        }
    }

    pub fn set_speed(&mut self, name: &str, speed: f32) -> bool {
        match self.control_index(NameHash::new(name)) {
            Some(index) => {
                self.controls[index].speed = speed;
                true
            }
            None => false,
        }
    }

    /// Fade-out time applied automatically when a non-looping clip
    /// approaches completion. Zero disables.
    pub fn set_auto_fade(&mut self, name: &str, fade_out_time: f32) -> bool {
        match self.control_index(NameHash::new(name)) {
            Some(index) => {
                self.controls[index].auto_fade_time = fade_out_time.max(0.0);
                true
            }
            None => false,
        }
    }

    pub fn set_remove_on_completion(&mut self, name: &str, enable: bool) -> bool {
        match self.control_index(NameHash::new(name)) {
            Some(index) => {
                self.controls[index].remove_on_completion = enable;
                true
            }
            None => false,
        }
    }

    /// Per-bone weight mask entry of the named clip (model mode only).
    pub fn set_bone_weight(
        &mut self,
        scene: &mut Scene,
        name: &str,
        bone_name: &str,
        weight: f32,
        recursive: bool,
    ) -> bool {
        let Some(model) = self.model.and_then(|k| scene.models.get_mut(k)) else {
            return false;
        };
        model.set_state_bone_weight(
            NameHash::new(name),
            NameHash::new(bone_name),
            weight,
            recursive,
        )
    }

    // ========================================================================
    // Getters
    // ========================================================================

    /// Whether the named clip has an active control.
    #[must_use]
    pub fn is_playing(&self, name: &str) -> bool {
        self.control_index(NameHash::new(name)).is_some()
    }

    /// Whether any active clip plays on `layer`.
    #[must_use]
    pub fn is_playing_layer(&self, scene: &Scene, layer: u8) -> bool {
        self.controls
            .iter()
            .any(|c| self.state(scene, c.hash).map(AnimationState::layer) == Some(layer))
    }

    #[must_use]
    pub fn is_fading_in(&self, scene: &Scene, name: &str) -> bool {
        let hash = NameHash::new(name);
        let Some(index) = self.control_index(hash) else {
            return false;
        };
        let control = &self.controls[index];
        self.state(scene, hash).is_some_and(|state| {
            control.fade_time > 0.0 && control.target_weight > state.weight()
        })
    }

    #[must_use]
    pub fn is_fading_out(&self, scene: &Scene, name: &str) -> bool {
        let hash = NameHash::new(name);
        let Some(index) = self.control_index(hash) else {
            return false;
        };
        let control = &self.controls[index];
        self.state(scene, hash).is_some_and(|state| {
            control.fade_time > 0.0 && control.target_weight < state.weight()
        })
    }

    /// Whether the named non-looping clip has reached its end.
    #[must_use]
    pub fn is_at_end(&self, scene: &Scene, name: &str) -> bool {
        self.state(scene, NameHash::new(name))
            .is_some_and(AnimationState::is_at_end)
    }

    #[must_use]
    pub fn layer(&self, scene: &Scene, name: &str) -> Option<u8> {
        self.state(scene, NameHash::new(name))
            .map(AnimationState::layer)
    }

    #[must_use]
    pub fn time(&self, scene: &Scene, name: &str) -> Option<f32> {
        self.state(scene, NameHash::new(name))
            .map(AnimationState::time)
    }

    #[must_use]
    pub fn weight(&self, scene: &Scene, name: &str) -> Option<f32> {
        self.state(scene, NameHash::new(name))
            .map(AnimationState::weight)
    }

    #[must_use]
    pub fn length(&self, scene: &Scene, name: &str) -> Option<f32> {
        self.state(scene, NameHash::new(name))
            .map(AnimationState::length)
    }

    #[must_use]
    pub fn looped(&self, scene: &Scene, name: &str) -> Option<bool> {
        self.state(scene, NameHash::new(name))
            .map(AnimationState::looped)
    }

    #[must_use]
    pub fn blend_mode(&self, scene: &Scene, name: &str) -> Option<AnimationBlendMode> {
        self.state(scene, NameHash::new(name))
            .map(AnimationState::blend_mode)
    }

    #[must_use]
    pub fn speed(&self, name: &str) -> Option<f32> {
        self.control_index(NameHash::new(name))
            .map(|i| self.controls[i].speed)
    }

    #[must_use]
    pub fn fade_target(&self, name: &str) -> Option<f32> {
        self.control_index(NameHash::new(name))
            .map(|i| self.controls[i].target_weight)
    }

    #[must_use]
    pub fn fade_time(&self, name: &str) -> Option<f32> {
        self.control_index(NameHash::new(name))
            .map(|i| self.controls[i].fade_time)
    }

    #[must_use]
    pub fn auto_fade(&self, name: &str) -> Option<f32> {
        self.control_index(NameHash::new(name))
            .map(|i| self.controls[i].auto_fade_time)
    }

    #[must_use]
    pub fn removed_on_completion(&self, name: &str) -> Option<bool> {
        self.control_index(NameHash::new(name))
            .map(|i| self.controls[i].remove_on_completion)
    }

    #[must_use]
    pub fn start_bone_name(&self, scene: &Scene, name: &str) -> Option<String> {
        let model = self.model.and_then(|k| scene.models.get(k))?;
        let state = model.animation_state(NameHash::new(name))?;
        let bone = model.skeleton().bone(state.start_bone()?)?;
        Some(bone.name.clone())
    }

    // ========================================================================
    // Remote commands
    // ========================================================================

    /// Applies a replicated `set time` command. Accepted only when
    /// `revision` is strictly newer than the last accepted one for this
    /// field; stale or duplicate deliveries are silently ignored.
    pub fn command_set_time(
        &mut self,
        scene: &mut Scene,
        name: &str,
        time: f32,
        revision: u32,
        ttl: f32,
    ) -> bool {
        let hash = NameHash::new(name);
        let Some(index) = self.control_index(hash) else {
            return false;
        };
        if !self.controls[index].set_time.offer(time, revision, ttl) {
            return false;
        }
        if let Some(state) = self.state_mut(scene, hash) {
            state.set_time(time);
        }
        true
    }

    /// Applies a replicated `set weight` command; same acceptance rules as
    /// [`command_set_time`](Self::command_set_time).
    pub fn command_set_weight(
        &mut self,
        scene: &mut Scene,
        name: &str,
        weight: f32,
        revision: u32,
        ttl: f32,
    ) -> bool {
        let hash = NameHash::new(name);
        let Some(index) = self.control_index(hash) else {
            return false;
        };
        if !self.controls[index].set_weight.offer(weight, revision, ttl) {
            return false;
        }
        if let Some(state) = self.state_mut(scene, hash) {
            state.set_weight(weight);
        }
        true
    }

    // ========================================================================
    // Snapshots
    // ========================================================================

    /// Serializable record of the active controls and node states, for
    /// outbound replication or persistence.
    #[must_use]
    pub fn snapshot(&self, scene: &Scene) -> ControllerSnapshot {
        let controls = self
            .controls
            .iter()
            .filter_map(|control| {
                let state = self.state(scene, control.hash)?;
                Some(ControlSnapshot {
                    name: control.name.clone(),
                    layer: state.layer(),
                    time: state.time(),
                    weight: state.weight(),
                    speed: control.speed,
                    looped: state.looped(),
                    blend_mode: state.blend_mode(),
                    target_weight: control.target_weight,
                    fade_time: control.fade_time,
                    auto_fade_time: control.auto_fade_time,
                    remove_on_completion: control.remove_on_completion,
                })
            })
            .collect();
        let node_states = self
            .node_states
            .iter()
            .map(|state| NodeStateSnapshot {
                clip: state.clip().name().to_string(),
                time: state.time(),
                weight: state.weight(),
                looped: state.looped(),
                layer: state.layer(),
                blend_mode: state.blend_mode(),
                weight_overrides: state.weight_overrides(),
            })
            .collect();
        ControllerSnapshot {
            controls,
            node_states,
        }
    }

    /// Restores playback from a snapshot. Fails when a referenced clip is
    /// missing from the library.
    pub fn apply_snapshot(
        &mut self,
        scene: &mut Scene,
        library: &Library,
        snapshot: &ControllerSnapshot,
    ) -> Result<()> {
        for entry in &snapshot.controls {
            if !self.play(scene, library, &entry.name, entry.layer, entry.looped, 0.0) {
                return Err(MarrowError::ClipNotFound(entry.name.clone()));
            }
            let hash = NameHash::new(&entry.name);
            if let Some(index) = self.control_index(hash) {
                let control = &mut self.controls[index];
                control.speed = entry.speed;
                control.target_weight = entry.target_weight;
                control.fade_time = entry.fade_time;
                control.auto_fade_time = entry.auto_fade_time;
                control.remove_on_completion = entry.remove_on_completion;
            }
            if let Some(state) = self.state_mut(scene, hash) {
                state.set_time(entry.time);
                state.set_weight(entry.weight);
                state.set_blend_mode(entry.blend_mode);
            }
        }
        for entry in &snapshot.node_states {
            if !self.play(scene, library, &entry.clip, entry.layer, entry.looped, 0.0) {
                return Err(MarrowError::ClipNotFound(entry.clip.clone()));
            }
            let hash = NameHash::new(&entry.clip);
            if let Some(state) = self.state_mut(scene, hash) {
                state.set_time(entry.time);
                state.set_weight(entry.weight);
                state.set_blend_mode(entry.blend_mode);
                state.apply_weight_overrides(&entry.weight_overrides);
            }
        }
        Ok(())
    }

    // ========================================================================
    // Per-frame update
    // ========================================================================

    /// Advances every active control for this frame: replicated-command
    /// decay, time advance, linear weight ramp, auto-fade conversion and
    /// removal of faded-out controls. Node-mode states are applied here;
    /// model-mode application is deferred to the model's lazy pose pass.
    pub fn update(&mut self, scene: &mut Scene, dt: f32) {
        // Events queued by the model's previous pose pass.
        if let Some(model) = self.model.and_then(|k| scene.models.get_mut(k)) {
            self.events.extend(model.take_events());
        }

        let mut index = 0;
        while index < self.controls.len() {
            let hash = self.controls[index].hash;
            let remove = if let Some(model_key) = self.model {
                match scene.models.get_mut(model_key) {
                    Some(model) => {
                        let update_invisible = model.update_invisible();
                        match model.animation_state_mut(hash) {
                            Some(state) => {
                                step_control(&mut self.controls[index], state, dt, update_invisible)
                            }
                            None => true,
                        }
                    }
                    None => true,
                }
            } else {
                let control = &mut self.controls[index];
                match self
                    .node_states
                    .iter_mut()
                    .find(|s| s.clip_hash() == hash)
                {
                    Some(state) => step_control(control, state, dt, true),
                    None => true,
                }
            };

            if remove {
                if let Some(model) = self.model.and_then(|k| scene.models.get_mut(k)) {
                    model.remove_animation_state(hash);
                }
                self.node_states.retain(|s| s.clip_hash() != hash);
                self.controls.remove(index);
            } else {
                index += 1;
            }
        }

        // Standalone playback happens immediately; skeletal states are
        // blended later by AnimatedModel::apply_animation.
        for state in &mut self.node_states {
            state.apply_to_nodes(&mut scene.nodes);
            self.events.extend(state.take_events());
        }

        if !self.controls.is_empty() {
            if let Some(model) = self.model.and_then(|k| scene.models.get_mut(k)) {
                model.mark_animation_dirty();
            }
        }
    }

    /// Drains completion/trigger events aggregated from this controller's
    /// states.
    pub fn drain_events(&mut self) -> Vec<AnimationEvent> {
        std::mem::take(&mut self.events)
    }

    /// Re-resolves clips and bindings after a library reload.
    pub fn refresh(&mut self, scene: &mut Scene, library: &Library) {
        if let Some(model) = self.model.and_then(|k| scene.models.get_mut(k)) {
            model.refresh_clips(library);
        }
        for state in &mut self.node_states {
            if let Some(clip) = library.clip(state.clip_hash()) {
                if !Arc::ptr_eq(&clip, state.clip()) {
                    state.set_clip(clip);
                }
            }
            if state.bound_track_count() == 0 {
                state.resolve_for_nodes(&scene.nodes);
            }
        }
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn control_index(&self, hash: NameHash) -> Option<usize> {
        self.controls.iter().position(|c| c.hash == hash)
    }

    fn state<'a>(&'a self, scene: &'a Scene, hash: NameHash) -> Option<&'a AnimationState> {
        if let Some(model_key) = self.model {
            scene.models.get(model_key)?.animation_state(hash)
        } else {
            self.node_states.iter().find(|s| s.clip_hash() == hash)
        }
    }

    fn state_mut<'a>(
        &'a mut self,
        scene: &'a mut Scene,
        hash: NameHash,
    ) -> Option<&'a mut AnimationState> {
        if let Some(model_key) = self.model {
            scene.models.get_mut(model_key)?.animation_state_mut(hash)
        } else {
            self.node_states.iter_mut().find(|s| s.clip_hash() == hash)
        }
    }

    /// Makes sure a state for `name` exists on the target, creating one from
    /// the library if needed.
    fn ensure_state(
        &mut self,
        scene: &mut Scene,
        library: &Library,
        name: &str,
        hash: NameHash,
    ) -> bool {
        if let Some(model_key) = self.model {
            let Some(model) = scene.models.get_mut(model_key) else {
                log::warn!("play '{name}': target model is gone");
                return false;
            };
            if model.animation_state(hash).is_none() {
                let Some(clip) = library.clip(hash) else {
                    log::warn!("play '{name}': clip not found in library");
                    return false;
                };
                // New states enter at weight 0 and fade in.
                model.add_animation_state(clip).set_weight(0.0);
            }
            true
        } else if let Some(root) = self.node {
            if !self.node_states.iter().any(|s| s.clip_hash() == hash) {
                let Some(clip) = library.clip(hash) else {
                    log::warn!("play '{name}': clip not found in library");
                    return false;
                };
                let mut state = AnimationState::new_for_nodes(clip, root);
                state.resolve_for_nodes(&scene.nodes);
                state.set_weight(0.0);
                self.node_states.push(state);
            }
            true
        } else {
            false
        }
    }
}

/// Advances one control/state pair by `dt`. Returns whether the pair is due
/// for removal.
fn step_control(
    control: &mut AnimationControl,
    state: &mut AnimationState,
    dt: f32,
    update_invisible: bool,
) -> bool {
    control.set_time.tick(dt);
    control.set_weight.tick(dt);

    // Time advance; a weight-zero state only advances when the policy says
    // invisible playback keeps running.
    if control.speed != 0.0 && (state.is_enabled() || update_invisible) {
        state.add_time(dt * control.speed);
    }

    // Linear weight ramp.
    let target = control.target_weight;
    let weight = state.weight();
    if (weight - target).abs() >= WEIGHT_EPSILON {
        if control.fade_time >= WEIGHT_EPSILON {
            let step = dt / control.fade_time;
            let stepped = if weight < target {
                (weight + step).min(target)
            } else {
                (weight - step).max(target)
            };
            state.set_weight(stepped);
        } else {
            state.set_weight(target);
        }
    }

    // Convert to a fade-out once a non-looping clip is close enough to its
    // end.
    if control.auto_fade_time > 0.0
        && control.target_weight > 0.0
        && control.speed > 0.0
        && !state.looped()
    {
        let remaining = (state.length() - state.time()) / control.speed;
        if remaining <= control.auto_fade_time {
            control.target_weight = 0.0;
            control.fade_time = control.auto_fade_time;
        }
    }

    state.weight() < WEIGHT_EPSILON
        && control.target_weight < WEIGHT_EPSILON
        && control.remove_on_completion
}
