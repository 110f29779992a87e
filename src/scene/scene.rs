use slotmap::{SecondaryMap, SlotMap};

use crate::animation::controller::AnimationController;
use crate::hash::NameHash;
use crate::model::{AnimatedModel, SkinningSettings};
use crate::resources::{BoundingBox, GeometryData, ModelMorph};
use crate::scene::node::Node;
use crate::scene::skeleton::{BoneCollision, Skeleton};
use crate::scene::transform_system;
use crate::scene::{ControllerKey, ModelKey, NodeKey};

use std::sync::Arc;

/// The scene data layer: node hierarchy plus the animation components that
/// write through it.
///
/// Components are stored in per-type slotmaps keyed by generational handles;
/// a handle held after removal simply stops resolving. The first animated
/// model attached to a node becomes that node's master instance and owns the
/// mutable skeleton; later models on the same node become secondaries that
/// reference the master's bone nodes by name.
pub struct Scene {
    pub nodes: SlotMap<NodeKey, Node>,
    pub root_nodes: Vec<NodeKey>,

    pub models: SlotMap<ModelKey, AnimatedModel>,
    pub controllers: SlotMap<ControllerKey, AnimationController>,

    /// Models attached per node, in attach order (first = master).
    pub(crate) node_models: SecondaryMap<NodeKey, Vec<ModelKey>>,
}

impl Scene {
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: SlotMap::with_key(),
            root_nodes: Vec::new(),
            models: SlotMap::with_key(),
            controllers: SlotMap::with_key(),
            node_models: SecondaryMap::new(),
        }
    }

    // ========================================================================
    // Nodes
    // ========================================================================

    pub fn create_node(&mut self, name: &str) -> NodeKey {
        let key = self.nodes.insert(Node::new(name));
        self.root_nodes.push(key);
        key
    }

    pub fn create_child(&mut self, parent: NodeKey, name: &str) -> NodeKey {
        let key = self.nodes.insert(Node::new(name));
        self.attach(parent, key);
        key
    }

    /// Reparents `child` under `parent`, keeping both sides of the relation
    /// in sync. No-op when either key is stale.
    pub fn attach(&mut self, parent: NodeKey, child: NodeKey) {
        if !self.nodes.contains_key(parent) || !self.nodes.contains_key(child) || parent == child {
            return;
        }
        self.detach_internal(child);
        self.nodes[child].parent = Some(parent);
        self.nodes[parent].children.push(child);
    }

    fn detach_internal(&mut self, child: NodeKey) {
        match self.nodes[child].parent.take() {
            Some(old_parent) => {
                if let Some(parent_node) = self.nodes.get_mut(old_parent) {
                    parent_node.children.retain(|&c| c != child);
                }
            }
            None => self.root_nodes.retain(|&r| r != child),
        }
    }

    /// Removes a node and its whole subtree. Keys into the subtree held
    /// elsewhere (bones, animation bindings) become stale and degrade to
    /// no-ops.
    pub fn remove_node(&mut self, key: NodeKey) {
        if !self.nodes.contains_key(key) {
            return;
        }
        self.detach_internal(key);

        let mut stack = vec![key];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.remove(current) {
                stack.extend(node.children);
            }
        }
    }

    #[inline]
    #[must_use]
    pub fn get_node(&self, key: NodeKey) -> Option<&Node> {
        self.nodes.get(key)
    }

    #[inline]
    pub fn get_node_mut(&mut self, key: NodeKey) -> Option<&mut Node> {
        self.nodes.get_mut(key)
    }

    /// Depth-first search for a node by name hash, including `root` itself.
    #[must_use]
    pub fn find_descendant(&self, root: NodeKey, hash: NameHash) -> Option<NodeKey> {
        find_descendant(&self.nodes, root, hash)
    }

    /// Runs the world-matrix hierarchy pass over the whole scene.
    pub fn update_transforms(&mut self) {
        transform_system::update_hierarchy(&mut self.nodes, &self.root_nodes);
    }

    // ========================================================================
    // Animated models
    // ========================================================================

    /// Creates an animated model on `node` from a skeleton definition.
    ///
    /// The first model on a node is the master: its bones get freshly created
    /// child nodes mirroring the bone hierarchy. Subsequent models are
    /// secondaries sharing the master's bone nodes by name, so several meshes
    /// can ride one animated rig without duplicating bone transforms.
    pub fn add_model(
        &mut self,
        node: NodeKey,
        skeleton: &Skeleton,
        geometries: Vec<Arc<GeometryData>>,
        morphs: Vec<ModelMorph>,
        settings: SkinningSettings,
    ) -> Option<ModelKey> {
        if !self.nodes.contains_key(node) {
            log::warn!("add_model: target node is not alive");
            return None;
        }

        let master_key = self
            .node_models
            .get(node)
            .and_then(|list| list.first().copied());
        let is_master = master_key.is_none();

        let mut model =
            AnimatedModel::new(node, skeleton, geometries, morphs, settings, is_master);

        if is_master {
            self.create_bone_nodes(node, &mut model);
        } else if let Some(master) = master_key.and_then(|k| self.models.get(k)) {
            model.assign_bone_nodes_from(master.skeleton());
        }

        let key = self.models.insert(model);
        if let Some(entry) = self.node_models.entry(node) {
            entry.or_default().push(key);
        }
        self.finalize_bone_bounding_boxes(node);
        Some(key)
    }

    fn create_bone_nodes(&mut self, owner: NodeKey, model: &mut AnimatedModel) {
        // First pass: one node per bone, bind pose applied.
        let mut keys = Vec::with_capacity(model.skeleton().len());
        for bone in model.skeleton().bones() {
            let key = self.nodes.insert(Node::new(&bone.name));
            let node = &mut self.nodes[key];
            node.transform
                .set_srt(bone.initial_position, bone.initial_rotation, bone.initial_scale);
            self.root_nodes.push(key);
            keys.push(key);
        }
        // Second pass: wire the hierarchy; the root bone hangs off the owner.
        for (i, &key) in keys.iter().enumerate() {
            let parent_index = model.skeleton().bones()[i].parent_index;
            if parent_index == i {
                self.attach(owner, key);
            } else if let Some(&parent_key) = keys.get(parent_index) {
                self.attach(parent_key, key);
            }
        }
        model.set_bone_nodes(&keys);
    }

    pub fn remove_model(&mut self, key: ModelKey) {
        let Some(model) = self.models.remove(key) else {
            return;
        };
        let owner = model.node();
        if let Some(list) = self.node_models.get_mut(owner) {
            list.retain(|&m| m != key);
        }
        if model.is_master() {
            // The shared rig goes with its owner; secondaries degrade to
            // no-ops through their now-stale bone node keys.
            if let Some(root_key) = model.skeleton().root_bone().and_then(|b| b.node) {
                self.remove_node(root_key);
            }
        }
    }

    /// Runs a closure against one controller and the rest of the scene.
    ///
    /// Controller operations (play, fade, commands) mutate scene-owned
    /// models and nodes, so the controller is briefly moved out of its slot
    /// for the call.
    pub fn with_controller<R>(
        &mut self,
        key: ControllerKey,
        f: impl FnOnce(&mut AnimationController, &mut Scene) -> R,
    ) -> Option<R> {
        let slot = self.controllers.get_mut(key)?;
        let mut controller = std::mem::replace(slot, AnimationController::detached());
        let result = f(&mut controller, self);
        if let Some(slot) = self.controllers.get_mut(key) {
            *slot = controller;
        }
        Some(result)
    }

    /// Merges per-bone bounding volumes of secondary models into the master's
    /// bones, so culling against the master covers every mesh on the rig.
    pub fn finalize_bone_bounding_boxes(&mut self, node: NodeKey) {
        let Some(list) = self.node_models.get(node) else {
            return;
        };
        let Some((&master_key, secondary_keys)) = list.split_first() else {
            return;
        };
        let merged: Vec<(NameHash, BoundingBox, f32, BoneCollision)> = secondary_keys
            .iter()
            .filter_map(|&k| self.models.get(k))
            .flat_map(|m| {
                m.skeleton()
                    .bones()
                    .iter()
                    .map(|b| (b.hash, b.bounding_box, b.radius, b.collision))
                    .collect::<Vec<_>>()
            })
            .collect();

        let Some(master) = self.models.get_mut(master_key) else {
            return;
        };
        master.merge_secondary_bone_volumes(&merged);
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

/// Depth-first name search over raw node storage, usable while the rest of
/// the scene is mutably borrowed elsewhere.
pub(crate) fn find_descendant(
    nodes: &SlotMap<NodeKey, Node>,
    root: NodeKey,
    hash: NameHash,
) -> Option<NodeKey> {
    let mut stack = vec![root];
    while let Some(current) = stack.pop() {
        let Some(node) = nodes.get(current) else {
            continue;
        };
        if node.name_hash() == hash {
            return Some(current);
        }
        stack.extend(node.children.iter().copied());
    }
    None
}
