//! Clip and track tests:
//! - linear/slerp keyframe interpolation and end clamping
//! - last-wins semantics for duplicate keyframe times
//! - cursor-cached sampling vs. stateless sampling, forward and jumping back
//! - trigger ordering and interval semantics
//! - JSON round-trip of the persisted clip shape

use std::f32::consts::FRAC_PI_2;

use glam::{Quat, Vec3};

use marrow::{AnimationClip, Channels, Keyframe, KeyframeCursor, NameHash, Track};

const EPSILON: f32 = 1e-5;

fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < EPSILON
}

fn key(time: f32, x: f32) -> Keyframe {
    let mut k = Keyframe::new(time);
    k.position = Vec3::new(x, 0.0, 0.0);
    k
}

fn position_track(keys: &[(f32, f32)]) -> Track {
    let mut track = Track::new("bone", Channels::POSITION);
    for &(time, x) in keys {
        track.add_keyframe(key(time, x));
    }
    track
}

// ============================================================================
// Interpolation
// ============================================================================

#[test]
fn linear_position_midpoint() {
    let track = position_track(&[(0.0, 0.0), (1.0, 10.0)]);
    let sample = track.sample(0.5).unwrap();
    assert!(approx(sample.position.x, 5.0), "got {}", sample.position.x);
}

#[test]
fn sample_clamps_outside_key_range() {
    let track = position_track(&[(1.0, 10.0), (2.0, 20.0)]);
    assert!(approx(track.sample(0.0).unwrap().position.x, 10.0));
    assert!(approx(track.sample(5.0).unwrap().position.x, 20.0));
}

#[test]
fn rotation_uses_shortest_arc_slerp() {
    let mut track = Track::new("bone", Channels::ROTATION);
    let mut k0 = Keyframe::new(0.0);
    k0.rotation = Quat::IDENTITY;
    let mut k1 = Keyframe::new(1.0);
    k1.rotation = Quat::from_rotation_y(FRAC_PI_2);
    track.add_keyframe(k0);
    track.add_keyframe(k1);

    let sample = track.sample(0.5).unwrap();
    let expected = Quat::IDENTITY.slerp(Quat::from_rotation_y(FRAC_PI_2), 0.5);
    assert!(
        sample.rotation.angle_between(expected) < 1e-4,
        "slerp mismatch"
    );
}

#[test]
fn empty_track_samples_none() {
    let track = Track::new("bone", Channels::POSITION);
    assert!(track.sample(0.0).is_none());
}

#[test]
fn single_keyframe_is_constant() {
    let track = position_track(&[(0.0, 7.0)]);
    let mut cursor = KeyframeCursor::default();
    assert!(approx(
        track.sample_with_cursor(3.0, &mut cursor).unwrap().position.x,
        7.0
    ));
}

#[test]
fn duplicate_times_last_wins() {
    let track = position_track(&[(0.0, 0.0), (0.5, 1.0), (0.5, 9.0), (1.0, 10.0)]);
    // Exactly at the duplicate time, the later keyframe provides the value.
    assert!(approx(track.sample(0.5).unwrap().position.x, 9.0));
    // Just past it, interpolation runs from the later keyframe.
    let just_after = track.sample(0.75).unwrap().position.x;
    assert!(approx(just_after, 9.5), "got {just_after}");
}

// ============================================================================
// Cursor
// ============================================================================

#[test]
fn cursor_matches_stateless_sampling() {
    let track = position_track(&[(0.0, 0.0), (1.0, 10.0), (2.0, 5.0), (3.0, 20.0), (4.0, 15.0)]);
    let mut cursor = KeyframeCursor::default();
    for i in 0..=40 {
        let t = i as f32 * 0.1;
        let with_cursor = track.sample_with_cursor(t, &mut cursor).unwrap();
        let stateless = track.sample(t).unwrap();
        assert!(
            approx(with_cursor.position.x, stateless.position.x),
            "t={t}: cursor={} stateless={}",
            with_cursor.position.x,
            stateless.position.x
        );
    }
}

#[test]
fn cursor_survives_jump_back() {
    let track = position_track(&[(0.0, 0.0), (1.0, 10.0), (2.0, 20.0), (3.0, 30.0)]);
    let mut cursor = KeyframeCursor::default();

    assert!(approx(
        track.sample_with_cursor(2.5, &mut cursor).unwrap().position.x,
        25.0
    ));
    // Loop-wrap-style jump backwards forces the binary search fallback.
    assert!(approx(
        track.sample_with_cursor(0.5, &mut cursor).unwrap().position.x,
        5.0
    ));
}

#[test]
fn keyframe_index_advances_monotonically() {
    let track = position_track(&[(0.0, 0.0), (1.0, 1.0), (2.0, 2.0), (3.0, 3.0)]);
    let mut last = 0;
    for i in 0..=30 {
        let t = i as f32 * 0.1;
        let index = track.keyframe_index(t);
        assert!(index >= last, "index went backwards without a seek");
        last = index;
    }
}

// ============================================================================
// Track editing
// ============================================================================

#[test]
fn add_keyframe_keeps_time_order() {
    let mut track = Track::new("bone", Channels::POSITION);
    track.add_keyframe(key(1.0, 1.0));
    track.add_keyframe(key(0.0, 0.0));
    track.add_keyframe(key(0.5, 0.5));
    let times: Vec<f32> = track.keyframes().iter().map(|k| k.time).collect();
    assert_eq!(times, vec![0.0, 0.5, 1.0]);
}

#[test]
fn remove_keyframe_out_of_range_fails() {
    let mut track = position_track(&[(0.0, 0.0)]);
    assert!(track.remove_keyframe(0));
    assert!(!track.remove_keyframe(0));
}

// ============================================================================
// Clip structure
// ============================================================================

#[test]
fn track_lookup_by_name_and_hash() {
    let mut clip = AnimationClip::new("walk", 1.0);
    clip.create_track("spine", Channels::POSITION);
    clip.create_track("head", Channels::ROTATION);

    assert!(clip.track_by_name("spine").is_some());
    assert!(clip.track_by_hash(NameHash::new("head")).is_some());
    assert!(clip.track_by_name("tail").is_none());
    assert_eq!(clip.track_count(), 2);

    assert!(clip.remove_track(NameHash::new("spine")));
    assert!(clip.track_by_name("spine").is_none());
    // Lookup must survive the removal-triggered reindex.
    assert!(clip.track_by_name("head").is_some());
}

#[test]
fn triggers_stay_time_ordered() {
    let mut clip = AnimationClip::new("walk", 2.0);
    clip.add_trigger(1.5, serde_json::json!("late"));
    clip.add_trigger(0.5, serde_json::json!("early"));
    clip.add_trigger_normalized(0.5, serde_json::json!("middle"));

    let times: Vec<f32> = clip.triggers().iter().map(|t| t.time).collect();
    assert_eq!(times, vec![0.5, 1.0, 1.5]);
}

#[test]
fn triggers_in_interval_is_half_open() {
    let mut clip = AnimationClip::new("walk", 1.0);
    clip.add_trigger(0.2, serde_json::json!(1));
    clip.add_trigger(0.5, serde_json::json!(2));

    // (0.2, 0.5] excludes the trigger exactly at the interval start.
    let fired: Vec<f32> = clip.triggers_in(0.2, 0.5, false).map(|t| t.time).collect();
    assert_eq!(fired, vec![0.5]);

    // A wrapped segment includes its start point.
    let fired: Vec<f32> = clip.triggers_in(0.2, 0.5, true).map(|t| t.time).collect();
    assert_eq!(fired, vec![0.2, 0.5]);
}

// ============================================================================
// Persistence
// ============================================================================

#[test]
fn clip_json_round_trip() {
    let mut clip = AnimationClip::new("walk", 1.0);
    let track = clip.create_track("spine", Channels::POSITION | Channels::ROTATION);
    track.add_keyframe(key(0.0, 0.0));
    track.add_keyframe(key(1.0, 2.0));
    clip.add_trigger(0.5, serde_json::json!({"sound": "footstep"}));

    let json = clip.to_json().unwrap();
    let restored = AnimationClip::from_json(&json).unwrap();

    assert_eq!(restored.name(), "walk");
    assert_eq!(restored.hash(), clip.hash());
    assert!(approx(restored.length(), 1.0));
    assert_eq!(restored.track_count(), 1);
    assert_eq!(restored.triggers().len(), 1);

    // The hash lookup is rebuilt, not persisted.
    let restored_track = restored.track_by_name("spine").unwrap();
    assert_eq!(restored_track.keyframes().len(), 2);
    assert_eq!(restored_track.channels, Channels::POSITION | Channels::ROTATION);
}
