use bitflags::bitflags;
use glam::{Affine3A, Quat, Vec3};
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;

use crate::hash::NameHash;
use crate::resources::BoundingBox;
use crate::scene::node::Node;
use crate::scene::NodeKey;

bitflags! {
    /// Collision shapes a bone supports for bounding-volume purposes.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub struct BoneCollision: u8 {
        const SPHERE = 1 << 0;
        const BOX    = 1 << 1;
    }
}

/// One rigid segment of a skeleton.
///
/// The root bone marks itself by a self-referential parent index
/// (`parent_index == own index`); parent indices are otherwise unordered
/// relative to child indices. The scene-node key is runtime-only state and
/// is not persisted; it must be liveness-checked on every access because the
/// node is owned by the scene and may be destroyed externally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bone {
    pub name: String,
    pub hash: NameHash,
    pub parent_index: usize,

    /// Bind-pose local transform.
    pub initial_position: Vec3,
    pub initial_rotation: Quat,
    pub initial_scale: Vec3,

    /// Offset matrix (inverse bind pose).
    pub offset_matrix: Affine3A,

    /// Whether animation states may write this bone.
    pub animated: bool,

    pub collision: BoneCollision,
    pub radius: f32,
    /// Local-space bounding box, valid when `collision` contains `BOX`.
    pub bounding_box: BoundingBox,

    #[serde(skip)]
    pub node: Option<NodeKey>,
}

impl Bone {
    #[must_use]
    pub fn new(name: &str, parent_index: usize) -> Self {
        Self {
            name: name.to_string(),
            hash: NameHash::new(name),
            parent_index,
            initial_position: Vec3::ZERO,
            initial_rotation: Quat::IDENTITY,
            initial_scale: Vec3::ONE,
            offset_matrix: Affine3A::IDENTITY,
            animated: true,
            collision: BoneCollision::empty(),
            radius: 0.0,
            bounding_box: BoundingBox::empty(),
            node: None,
        }
    }
}

/// Static bone hierarchy with bind-pose transforms and offset matrices.
///
/// The bone list is immutable after construction except through explicit
/// redefinition ([`Skeleton::define`], [`Skeleton::clear_bones`]). Lookups
/// return `Option` — animation data may legitimately reference bones a
/// particular rig does not have.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Skeleton {
    bones: Vec<Bone>,
    root_bone_index: Option<usize>,
}

impl Skeleton {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a skeleton from a bone list, locating the self-referential
    /// root marker. A list without one yields a skeleton with no root bone.
    #[must_use]
    pub fn from_bones(bones: Vec<Bone>) -> Self {
        let root_bone_index = bones
            .iter()
            .enumerate()
            .position(|(i, bone)| bone.parent_index == i);
        if root_bone_index.is_none() && !bones.is_empty() {
            log::warn!("skeleton has no self-referential root bone");
        }
        Self {
            bones,
            root_bone_index,
        }
    }

    /// Redefines this skeleton from another, dropping any runtime node keys.
    pub fn define(&mut self, src: &Skeleton) {
        self.bones = src.bones.clone();
        for bone in &mut self.bones {
            bone.node = None;
        }
        self.root_bone_index = src.root_bone_index;
    }

    pub fn clear_bones(&mut self) {
        self.bones.clear();
        self.root_bone_index = None;
    }

    #[inline]
    #[must_use]
    pub fn bones(&self) -> &[Bone] {
        &self.bones
    }

    #[inline]
    #[must_use]
    pub fn bones_mut(&mut self) -> &mut [Bone] {
        &mut self.bones
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.bones.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn root_bone_index(&self) -> Option<usize> {
        self.root_bone_index
    }

    #[must_use]
    pub fn root_bone(&self) -> Option<&Bone> {
        self.bones.get(self.root_bone_index?)
    }

    #[inline]
    #[must_use]
    pub fn bone(&self, index: usize) -> Option<&Bone> {
        self.bones.get(index)
    }

    #[inline]
    pub fn bone_mut(&mut self, index: usize) -> Option<&mut Bone> {
        self.bones.get_mut(index)
    }

    #[must_use]
    pub fn bone_index(&self, hash: NameHash) -> Option<usize> {
        self.bones.iter().position(|bone| bone.hash == hash)
    }

    #[must_use]
    pub fn bone_by_name(&self, name: &str) -> Option<&Bone> {
        self.bone_index(NameHash::new(name)).map(|i| &self.bones[i])
    }

    /// Whether `bone_index` lies in the subtree rooted at `ancestor_index`
    /// (a bone is in its own subtree).
    #[must_use]
    pub fn is_in_subtree(&self, bone_index: usize, ancestor_index: usize) -> bool {
        let mut current = bone_index;
        loop {
            if current == ancestor_index {
                return true;
            }
            let Some(bone) = self.bones.get(current) else {
                return false;
            };
            if bone.parent_index == current {
                // Reached the root without passing the ancestor.
                return false;
            }
            current = bone.parent_index;
        }
    }

    /// Restores every animated bone's node to the bind pose and forces a
    /// transform refresh.
    pub fn reset(&self, nodes: &mut SlotMap<NodeKey, Node>) {
        self.write_bind_pose(nodes, true);
    }

    /// Restores bind pose without forcing a refresh; the transform's own
    /// shadow-state compare decides whether anything actually changed.
    pub fn reset_silent(&self, nodes: &mut SlotMap<NodeKey, Node>) {
        self.write_bind_pose(nodes, false);
    }

    fn write_bind_pose(&self, nodes: &mut SlotMap<NodeKey, Node>, force: bool) {
        for bone in &self.bones {
            if !bone.animated {
                continue;
            }
            let Some(node) = bone.node.and_then(|key| nodes.get_mut(key)) else {
                continue;
            };
            node.transform
                .set_srt(bone.initial_position, bone.initial_rotation, bone.initial_scale);
            if force {
                node.transform.mark_dirty();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> Skeleton {
        // root(0) -> spine(1) -> head(2), arm(3) under spine
        let mut bones = vec![
            Bone::new("root", 0),
            Bone::new("spine", 0),
            Bone::new("head", 1),
            Bone::new("arm", 1),
        ];
        bones[0].parent_index = 0;
        Skeleton::from_bones(bones)
    }

    #[test]
    fn root_is_self_referential() {
        let skeleton = chain();
        assert_eq!(skeleton.root_bone_index(), Some(0));
        assert_eq!(skeleton.root_bone().unwrap().name, "root");
    }

    #[test]
    fn subtree_membership() {
        let skeleton = chain();
        assert!(skeleton.is_in_subtree(2, 1)); // head under spine
        assert!(skeleton.is_in_subtree(1, 1)); // self
        assert!(!skeleton.is_in_subtree(1, 2)); // spine not under head
        assert!(skeleton.is_in_subtree(3, 0)); // everything under root
    }

    #[test]
    fn lookup_failure_is_none() {
        let skeleton = chain();
        assert!(skeleton.bone_by_name("tail").is_none());
        assert!(skeleton.bone_index(NameHash::new("tail")).is_none());
    }
}
