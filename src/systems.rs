//! Frame scheduling.
//!
//! The phase order is an explicit contract, not a call-order accident:
//! controllers advance time and weight for *every* entity before any model
//! blends its pose, poses land in node-local transforms before the world
//! matrix pass, and skinning reads world transforms only after that pass.
//! Everything runs synchronously on the calling thread; between calls the
//! read accessors (skin matrices, bounds, snapshots) are safe from worker
//! threads.

use crate::scene::scene::Scene;

/// Runs one full animation frame: animate → pose → transforms → skin.
pub fn update(scene: &mut Scene, dt: f32) {
    animate(scene, dt);
    pose(scene);
    scene.update_transforms();
    skin(scene);
}

/// Phase 1: every controller advances its controls (time, fades, command
/// decay), applies node-mode states and marks its model's animation dirty.
///
/// Controllers are taken out of the scene for the duration of the pass so
/// they can mutate the scene they live in.
pub fn animate(scene: &mut Scene, dt: f32) {
    let mut controllers = std::mem::take(&mut scene.controllers);
    for (_key, controller) in &mut controllers {
        controller.update(scene, dt);
    }
    scene.controllers = controllers;
}

/// Phase 2: every animation-dirty model re-blends its states into its bone
/// nodes.
pub fn pose(scene: &mut Scene) {
    let Scene { nodes, models, .. } = scene;
    for (_key, model) in models.iter_mut() {
        model.apply_animation(nodes);
    }
}

/// Phase 4: every model refreshes skin matrices, morph streams and bone
/// bounds where dirty. Requires world transforms to be current.
pub fn skin(scene: &mut Scene) {
    let Scene { nodes, models, .. } = scene;
    for (_key, model) in models.iter_mut() {
        model.update_skinning(nodes);
        model.update_morphs();
        model.update_bone_bounding_box(nodes);
    }
}
