//! AnimationController tests:
//! - play/fade/stop state machine, fade ramps, exclusivity, auto-fade
//! - idempotent play merges and name-addressed failure sentinels
//! - revision-counted remote commands with TTL decay
//! - snapshot round-trip
//! - full frame pipeline with scene-stored controllers

use std::sync::Arc;

use glam::Vec3;

use marrow::{
    AnimationClip, AnimationController, AnimationEventKind, Bone, Channels, Keyframe, Library,
    ModelKey, Scene, Skeleton, SkinningSettings,
};

const EPSILON: f32 = 1e-4;

fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < EPSILON
}

fn rig_skeleton() -> Skeleton {
    let mut bones = vec![Bone::new("root", 0), Bone::new("spine", 0)];
    bones[1].initial_position = Vec3::new(0.0, 1.0, 0.0);
    Skeleton::from_bones(bones)
}

fn moving_clip(name: &str, length: f32, bone: &str) -> AnimationClip {
    let mut clip = AnimationClip::new(name, length);
    let track = clip.create_track(bone, Channels::POSITION);
    track.add_keyframe(Keyframe::new(0.0));
    let mut end = Keyframe::new(length);
    end.position = Vec3::X;
    track.add_keyframe(end);
    clip
}

fn setup() -> (Scene, Library, ModelKey, AnimationController) {
    let mut scene = Scene::new();
    let root = scene.create_node("actor");
    let model = scene
        .add_model(
            root,
            &rig_skeleton(),
            Vec::new(),
            Vec::new(),
            SkinningSettings::default(),
        )
        .unwrap();

    let library = Library::new();
    library.insert_clip(moving_clip("walk", 1.0, "spine"));
    library.insert_clip(moving_clip("run", 1.0, "spine"));
    library.insert_clip(moving_clip("wave", 1.0, "spine"));

    let controller = AnimationController::for_model(model);
    (scene, library, model, controller)
}

// ============================================================================
// Play / fade / stop
// ============================================================================

#[test]
fn play_unknown_clip_returns_false() {
    let (mut scene, library, _model, mut controller) = setup();
    assert!(!controller.play(&mut scene, &library, "swim", 0, true, 0.0));
    assert!(!controller.is_playing("swim"));
    assert!(!controller.stop("swim", 0.0));
    assert!(!controller.fade("swim", 0.5, 0.1));
    assert!(controller.weight(&scene, "swim").is_none());
}

#[test]
fn fade_in_is_a_linear_ramp() {
    let (mut scene, library, _model, mut controller) = setup();
    assert!(controller.play(&mut scene, &library, "walk", 0, true, 0.5));

    controller.update(&mut scene, 0.25);
    let weight = controller.weight(&scene, "walk").unwrap();
    assert!(approx(weight, 0.5), "0.25s into a 0.5s fade: got {weight}");
    assert!(controller.is_fading_in(&scene, "walk"));

    controller.update(&mut scene, 0.25);
    assert!(approx(controller.weight(&scene, "walk").unwrap(), 1.0));
    assert!(!controller.is_fading_in(&scene, "walk"));
}

#[test]
fn play_merges_instead_of_restarting() {
    let (mut scene, library, _model, mut controller) = setup();
    controller.play(&mut scene, &library, "walk", 0, true, 0.0);
    controller.set_weight(&mut scene, "walk", 1.0);
    controller.update(&mut scene, 0.4);
    let time_before = controller.time(&scene, "walk").unwrap();
    assert!(time_before > 0.0);

    // Second play keeps time, retargets layer and loop flag.
    assert!(controller.play(&mut scene, &library, "walk", 3, false, 0.0));
    assert!(approx(controller.time(&scene, "walk").unwrap(), time_before));
    assert_eq!(controller.layer(&scene, "walk"), Some(3));
    assert_eq!(controller.looped(&scene, "walk"), Some(false));
}

#[test]
fn play_exclusive_fades_out_same_layer() {
    let (mut scene, library, _model, mut controller) = setup();
    controller.play(&mut scene, &library, "walk", 0, true, 0.0);
    controller.play(&mut scene, &library, "wave", 1, true, 0.0);
    controller.update(&mut scene, 0.1);
    assert!(approx(controller.weight(&scene, "walk").unwrap(), 1.0));

    assert!(controller.play_exclusive(&mut scene, &library, "run", 0, true, 0.25));

    assert!(approx(controller.fade_target("walk").unwrap(), 0.0));
    assert!(approx(controller.fade_target("run").unwrap(), 1.0));
    assert!(
        approx(controller.fade_target("wave").unwrap(), 1.0),
        "other layers are untouched"
    );

    // Let the fades run out; "walk" is removed once fully faded.
    for _ in 0..10 {
        controller.update(&mut scene, 0.1);
    }
    assert!(!controller.is_playing("walk"));
    assert!(controller.is_playing("run"));
    assert!(approx(controller.weight(&scene, "run").unwrap(), 1.0));
}

#[test]
fn stop_without_removal_keeps_control_at_zero() {
    let (mut scene, library, _model, mut controller) = setup();
    controller.play(&mut scene, &library, "walk", 0, true, 0.0);
    controller.set_remove_on_completion("walk", false);
    controller.stop("walk", 0.1);

    for _ in 0..5 {
        controller.update(&mut scene, 0.1);
    }
    assert!(controller.is_playing("walk"), "control must survive at weight 0");
    assert!(approx(controller.weight(&scene, "walk").unwrap(), 0.0));
}

#[test]
fn stop_layer_and_stop_all_fade_matching_entries() {
    let (mut scene, library, _model, mut controller) = setup();
    controller.play(&mut scene, &library, "walk", 0, true, 0.0);
    controller.play(&mut scene, &library, "run", 1, true, 0.0);

    controller.stop_layer(&scene, 0, 0.0);
    controller.update(&mut scene, 0.1);
    assert!(!controller.is_playing("walk"));
    assert!(controller.is_playing("run"));

    controller.stop_all(0.0);
    controller.update(&mut scene, 0.1);
    assert!(!controller.is_playing("run"));
}

#[test]
fn auto_fade_kicks_in_near_completion() {
    let (mut scene, library, _model, mut controller) = setup();
    controller.play(&mut scene, &library, "walk", 0, false, 0.0);
    controller.set_auto_fade("walk", 0.3);
    controller.update(&mut scene, 0.0); // weight snaps to 1

    // Advance to 0.5s: 0.5s remain, no auto-fade yet.
    controller.update(&mut scene, 0.5);
    assert!(approx(controller.fade_target("walk").unwrap(), 1.0));

    // Advance to 0.8s: 0.2s remain ≤ 0.3s, fade-out begins.
    controller.update(&mut scene, 0.3);
    assert!(approx(controller.fade_target("walk").unwrap(), 0.0));

    for _ in 0..10 {
        controller.update(&mut scene, 0.1);
    }
    assert!(!controller.is_playing("walk"), "auto-faded clip is removed");
}

#[test]
fn speed_multiplies_time_advance() {
    let (mut scene, library, _model, mut controller) = setup();
    controller.play(&mut scene, &library, "walk", 0, true, 0.0);
    controller.set_speed("walk", 2.0);
    controller.update(&mut scene, 0.0); // weight snaps to 1
    controller.update(&mut scene, 0.25);
    assert!(approx(controller.time(&scene, "walk").unwrap(), 0.5));
}

// ============================================================================
// Remote commands
// ============================================================================

#[test]
fn command_revisions_are_idempotent() {
    let (mut scene, library, _model, mut controller) = setup();
    controller.play(&mut scene, &library, "walk", 0, true, 0.0);

    assert!(controller.command_set_time(&mut scene, "walk", 0.4, 1, 1.0));
    assert!(approx(controller.time(&scene, "walk").unwrap(), 0.4));

    // Replays with equal or lower revision change nothing.
    assert!(!controller.command_set_time(&mut scene, "walk", 0.9, 1, 1.0));
    assert!(!controller.command_set_time(&mut scene, "walk", 0.9, 0, 1.0));
    assert!(approx(controller.time(&scene, "walk").unwrap(), 0.4));

    // A strictly higher revision always applies.
    assert!(controller.command_set_time(&mut scene, "walk", 0.7, 2, 1.0));
    assert!(approx(controller.time(&scene, "walk").unwrap(), 0.7));

    assert!(controller.command_set_weight(&mut scene, "walk", 0.25, 1, 1.0));
    assert!(approx(controller.weight(&scene, "walk").unwrap(), 0.25));
    assert!(!controller.command_set_weight(&mut scene, "walk", 0.9, 1, 1.0));
}

#[test]
fn commands_decay_after_ttl_without_reopening() {
    let (mut scene, library, _model, mut controller) = setup();
    controller.play(&mut scene, &library, "walk", 0, true, 0.0);

    assert!(controller.command_set_time(&mut scene, "walk", 0.4, 5, 0.15));
    let pending = controller.controls()[0].pending_set_time();
    assert_eq!(pending, Some(0.4));

    controller.update(&mut scene, 0.2);
    assert_eq!(
        controller.controls()[0].pending_set_time(),
        None,
        "command must decay once its TTL elapses"
    );

    // Decay does not forget the revision: a stale replay is still ignored.
    assert!(!controller.command_set_time(&mut scene, "walk", 0.9, 5, 0.15));
    assert!(controller.command_set_time(&mut scene, "walk", 0.9, 6, 0.15));
}

// ============================================================================
// Snapshots
// ============================================================================

#[test]
fn snapshot_round_trips_through_json() {
    let (mut scene, library, _model, mut controller) = setup();
    controller.play(&mut scene, &library, "walk", 2, true, 0.0);
    controller.set_speed("walk", 1.5);
    controller.set_weight(&mut scene, "walk", 0.75);
    controller.set_time(&mut scene, "walk", 0.3);

    let snapshot = controller.snapshot(&scene);
    let json = snapshot.to_json().unwrap();
    let restored = marrow::ControllerSnapshot::from_json(&json).unwrap();

    // Replicate onto a fresh entity.
    let mut scene2 = Scene::new();
    let root2 = scene2.create_node("actor");
    let model2 = scene2
        .add_model(
            root2,
            &rig_skeleton(),
            Vec::new(),
            Vec::new(),
            SkinningSettings::default(),
        )
        .unwrap();
    let mut controller2 = AnimationController::for_model(model2);
    controller2
        .apply_snapshot(&mut scene2, &library, &restored)
        .unwrap();

    assert!(controller2.is_playing("walk"));
    assert_eq!(controller2.layer(&scene2, "walk"), Some(2));
    assert!(approx(controller2.time(&scene2, "walk").unwrap(), 0.3));
    assert!(approx(controller2.weight(&scene2, "walk").unwrap(), 0.75));
    assert!(approx(controller2.speed("walk").unwrap(), 1.5));
}

#[test]
fn apply_snapshot_fails_on_missing_clip() {
    let (mut scene, _library, _model, mut controller) = setup();
    let empty_library = Library::new();
    let snapshot = marrow::ControllerSnapshot {
        controls: vec![],
        node_states: vec![],
    };
    assert!(controller
        .apply_snapshot(&mut scene, &empty_library, &snapshot)
        .is_ok());

    let mut bad = snapshot;
    bad.controls.push(marrow::ControlSnapshot {
        name: "missing".into(),
        layer: 0,
        time: 0.0,
        weight: 1.0,
        speed: 1.0,
        looped: true,
        blend_mode: marrow::AnimationBlendMode::Lerp,
        target_weight: 1.0,
        fade_time: 0.0,
        auto_fade_time: 0.0,
        remove_on_completion: true,
    });
    assert!(controller
        .apply_snapshot(&mut scene, &empty_library, &bad)
        .is_err());
}

// ============================================================================
// Full frame pipeline
// ============================================================================

#[test]
fn scene_stored_controller_drives_bones_through_update() {
    let (mut scene, library, model, controller) = setup();
    let key = scene.controllers.insert(controller);

    scene.with_controller(key, |controller, scene| {
        assert!(controller.play(scene, &library, "walk", 0, true, 0.0));
    });

    marrow::systems::update(&mut scene, 0.0); // weight snaps to 1
    marrow::systems::update(&mut scene, 0.5);

    let spine = scene.models[model]
        .skeleton()
        .bone_by_name("spine")
        .unwrap()
        .node
        .unwrap();
    // Track moves (0,0,0) → (1,0,0) over 1s; at t=0.5 the bone sits halfway.
    let x = scene.nodes[spine].transform.position.x;
    assert!(approx(x, 0.5), "got {x}");
}

#[test]
fn node_mode_controller_plays_standalone() {
    let mut scene = Scene::new();
    let door = scene.create_node("door");
    let handle = scene.create_child(door, "handle");

    let library = Library::new();
    library.insert_clip(moving_clip("open", 1.0, "handle"));

    let key = scene.controllers.insert(AnimationController::for_node(door));
    scene.with_controller(key, |controller, scene| {
        assert!(controller.play(scene, &library, "open", 0, false, 0.0));
    });

    marrow::systems::update(&mut scene, 0.5);

    let x = scene.nodes[handle].transform.position.x;
    assert!(approx(x, 0.5), "standalone playback writes at full weight");
}

#[test]
fn model_state_events_reach_the_controller() {
    let (mut scene, library, _model, controller) = setup();
    let mut clip = moving_clip("kick", 1.0, "spine");
    clip.add_trigger(0.1, serde_json::json!("impact"));
    library.insert_clip(clip);

    let key = scene.controllers.insert(controller);
    scene.with_controller(key, |controller, scene| {
        controller.play(scene, &library, "kick", 0, false, 0.0);
    });

    marrow::systems::update(&mut scene, 0.0); // weight snaps to 1
    marrow::systems::update(&mut scene, 0.2); // crosses the trigger; pose queues it
    marrow::systems::update(&mut scene, 0.01); // controller collects from the model

    let events = scene
        .with_controller(key, |controller, _| controller.drain_events())
        .unwrap();
    assert!(
        events
            .iter()
            .any(|e| matches!(e.kind, AnimationEventKind::Trigger { .. })),
        "trigger event must surface through the controller"
    );
}
