//! World-matrix hierarchy update.
//!
//! Borrows only the node storage, not the whole scene, so it can run while
//! other scene components are held elsewhere. Iterative with an explicit
//! stack; deep hierarchies cannot overflow the call stack.

use glam::Affine3A;
use slotmap::SlotMap;

use crate::scene::node::Node;
use crate::scene::NodeKey;

/// Updates world matrices for all nodes reachable from `roots`.
///
/// A node's world matrix is recomputed only when its own local SRT changed
/// or an ancestor's world matrix did; unchanged subtrees are visited but not
/// rewritten, so their change versions stay stable.
pub fn update_hierarchy(nodes: &mut SlotMap<NodeKey, Node>, roots: &[NodeKey]) {
    // (node, parent world matrix, parent changed)
    let mut stack: Vec<(NodeKey, Affine3A, bool)> = Vec::with_capacity(64);

    for &root in roots.iter().rev() {
        stack.push((root, Affine3A::IDENTITY, false));
    }

    while let Some((key, parent_world, parent_changed)) = stack.pop() {
        let Some(node) = nodes.get_mut(key) else {
            continue;
        };

        let local_changed = node.transform.update_local_matrix();
        let world_needs_update = local_changed || parent_changed;

        if world_needs_update {
            let new_world = parent_world * *node.transform.local_matrix();
            node.transform.set_world_matrix(new_world);
        }

        let current_world = *node.transform.world_matrix();
        for i in (0..node.children.len()).rev() {
            stack.push((node.children[i], current_world, world_needs_update));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn child_inherits_parent_translation() {
        let mut nodes: SlotMap<NodeKey, Node> = SlotMap::with_key();

        let mut parent = Node::new("parent");
        parent.transform.position = Vec3::new(1.0, 0.0, 0.0);
        let parent_key = nodes.insert(parent);

        let mut child = Node::new("child");
        child.transform.position = Vec3::new(0.0, 1.0, 0.0);
        child.parent = Some(parent_key);
        let child_key = nodes.insert(child);

        nodes[parent_key].children.push(child_key);

        update_hierarchy(&mut nodes, &[parent_key]);

        let world_pos = nodes[child_key].transform.world_matrix().translation;
        assert!((world_pos.x - 1.0).abs() < 1e-5);
        assert!((world_pos.y - 1.0).abs() < 1e-5);
    }

    #[test]
    fn unchanged_subtree_keeps_version() {
        let mut nodes: SlotMap<NodeKey, Node> = SlotMap::with_key();
        let key = nodes.insert(Node::new("static"));

        update_hierarchy(&mut nodes, &[key]);
        let version = nodes[key].transform.version();

        update_hierarchy(&mut nodes, &[key]);
        assert_eq!(nodes[key].transform.version(), version);

        nodes[key].transform.position = Vec3::ONE;
        update_hierarchy(&mut nodes, &[key]);
        assert_ne!(nodes[key].transform.version(), version);
    }
}
