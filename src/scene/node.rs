use glam::Affine3A;

use crate::hash::NameHash;
use crate::scene::transform::Transform;
use crate::scene::NodeKey;

/// A scene node: hierarchy links, a transform, and a name animation tracks
/// can bind to.
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) parent: Option<NodeKey>,
    pub(crate) children: Vec<NodeKey>,

    name: String,
    name_hash: NameHash,

    /// Transform component (hot data accessed every frame).
    pub transform: Transform,
}

impl Node {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            parent: None,
            children: Vec::new(),
            name: name.to_string(),
            name_hash: NameHash::new(name),
            transform: Transform::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub fn name_hash(&self) -> NameHash {
        self.name_hash
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
        self.name_hash = NameHash::new(name);
    }

    #[inline]
    #[must_use]
    pub fn parent(&self) -> Option<NodeKey> {
        self.parent
    }

    #[inline]
    #[must_use]
    pub fn children(&self) -> &[NodeKey] {
        &self.children
    }

    #[inline]
    #[must_use]
    pub fn world_matrix(&self) -> &Affine3A {
        &self.transform.world_matrix
    }
}
