//! Scene graph: slotmap-keyed nodes with SRT transforms, the hierarchy
//! update pass, and the skeleton type bound to it.
//!
//! Slotmap keys double as the weak, non-owning references of the data model:
//! a key whose node has been removed simply fails `get`, and every consumer
//! treats that as a no-op rather than a fault.

pub mod node;
pub mod scene;
pub mod skeleton;
pub mod transform;
pub mod transform_system;

pub use node::Node;
pub use scene::Scene;
pub use skeleton::{Bone, BoneCollision, Skeleton};
pub use transform::Transform;

use slotmap::new_key_type;

new_key_type! {
    pub struct NodeKey;
    pub struct ModelKey;
    pub struct ControllerKey;
}
