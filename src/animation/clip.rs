use bitflags::bitflags;
use glam::{Quat, Vec3};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::hash::NameHash;

bitflags! {
    /// Which SRT channels of a track are authored. Channels missing from the
    /// mask are never written at apply time, so the target keeps its bind
    /// pose (or whatever an earlier state blended in).
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub struct Channels: u8 {
        const POSITION = 1 << 0;
        const ROTATION = 1 << 1;
        const SCALE    = 1 << 2;
    }
}

/// One keyframe of a track. Every keyframe carries a full SRT; the track's
/// channel mask decides which components are meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keyframe {
    pub time: f32,
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Keyframe {
    #[must_use]
    pub fn new(time: f32) -> Self {
        Self {
            time,
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }

    fn value(&self) -> TransformSample {
        TransformSample {
            position: self.position,
            rotation: self.rotation,
            scale: self.scale,
        }
    }
}

/// An interpolated SRT sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformSample {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

/// Remembered bracketing index of the previous sample. Keeps repeated
/// sampling O(1) while time advances monotonically, which is the common
/// case; large jumps fall back to binary search.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyframeCursor {
    last_index: usize,
}

/// Bounded linear scan distance before giving up and binary-searching.
const MAX_SCAN_OFFSET: usize = 3;

/// A named channel of time-ordered keyframes animating one bone or node.
///
/// Duplicate keyframe times are permitted; the later keyframe wins. Keyframes
/// are assumed time-ordered — the editing API preserves that, and the blend
/// result for externally supplied unordered data is undefined (not a crash).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    pub name: String,
    pub hash: NameHash,
    pub channels: Channels,
    keyframes: Vec<Keyframe>,
}

impl Track {
    #[must_use]
    pub fn new(name: &str, channels: Channels) -> Self {
        Self {
            name: name.to_string(),
            hash: NameHash::new(name),
            channels,
            keyframes: Vec::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn keyframes(&self) -> &[Keyframe] {
        &self.keyframes
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.keyframes.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keyframes.is_empty()
    }

    /// Inserts keeping time order; after existing keyframes with an equal
    /// time, so the new one wins.
    pub fn add_keyframe(&mut self, keyframe: Keyframe) {
        let pos = self.keyframes.partition_point(|k| k.time <= keyframe.time);
        self.keyframes.insert(pos, keyframe);
    }

    /// Replaces the keyframe at `index`. The caller is responsible for
    /// keeping the replacement's time consistent with its neighbors.
    pub fn set_keyframe(&mut self, index: usize, keyframe: Keyframe) -> bool {
        match self.keyframes.get_mut(index) {
            Some(slot) => {
                *slot = keyframe;
                true
            }
            None => false,
        }
    }

    pub fn remove_keyframe(&mut self, index: usize) -> bool {
        if index < self.keyframes.len() {
            self.keyframes.remove(index);
            true
        } else {
            false
        }
    }

    pub fn remove_all_keyframes(&mut self) {
        self.keyframes.clear();
    }

    /// Index of the last keyframe with `time <= t` (0 when `t` precedes the
    /// first keyframe).
    #[must_use]
    pub fn keyframe_index(&self, time: f32) -> usize {
        self.keyframes
            .partition_point(|k| k.time <= time)
            .saturating_sub(1)
    }

    /// Stateless sample; `None` for an empty track.
    #[must_use]
    pub fn sample(&self, time: f32) -> Option<TransformSample> {
        if self.keyframes.is_empty() {
            return None;
        }
        Some(self.interpolate(self.keyframe_index(time), time))
    }

    /// Cursor-cached sample. Equivalent to [`Track::sample`] for every input;
    /// the cursor only changes how the bracketing pair is located.
    #[must_use]
    pub fn sample_with_cursor(
        &self,
        time: f32,
        cursor: &mut KeyframeCursor,
    ) -> Option<TransformSample> {
        let len = self.keyframes.len();
        if len == 0 {
            return None;
        }
        if len == 1 {
            return Some(self.keyframes[0].value());
        }

        // Cursor may be stale if the track changed under it; clamp first.
        let i = cursor.last_index.min(len - 1);
        let t_curr = self.keyframes[i].time;

        let found = if time >= t_curr {
            // Normal playback: scan forward a few frames.
            let mut res = None;
            for offset in 0..=MAX_SCAN_OFFSET {
                let idx = i + offset;
                if idx >= len - 1 {
                    if time >= self.keyframes[len - 1].time {
                        res = Some(len - 1);
                    }
                    break;
                }
                if time < self.keyframes[idx + 1].time {
                    res = Some(idx);
                    break;
                }
            }
            res
        } else {
            // Loop reset or reverse playback: scan backward.
            let mut res = None;
            for offset in 0..=MAX_SCAN_OFFSET {
                if i < offset {
                    break;
                }
                let idx = i - offset;
                if time >= self.keyframes[idx].time {
                    res = Some(idx);
                    break;
                }
            }
            res
        };

        let index = match found {
            Some(idx) => idx,
            // Large jump: binary search fallback.
            None => self.keyframe_index(time),
        };
        cursor.last_index = index;
        Some(self.interpolate(index, time))
    }

    fn interpolate(&self, index: usize, time: f32) -> TransformSample {
        let len = self.keyframes.len();
        if index >= len - 1 {
            return self.keyframes[len - 1].value();
        }

        let k0 = &self.keyframes[index];
        let k1 = &self.keyframes[index + 1];
        let dt = k1.time - k0.time;
        // Coincident keyframe times collapse to the bracketing (later) key.
        let t = if dt > 1e-6 {
            ((time - k0.time) / dt).clamp(0.0, 1.0)
        } else {
            0.0
        };

        TransformSample {
            position: k0.position.lerp(k1.position, t),
            rotation: k0.rotation.slerp(k1.rotation, t),
            scale: k0.scale.lerp(k1.scale, t),
        }
    }
}

/// A discrete event authored on the clip timeline. The payload is opaque to
/// the engine and handed back verbatim when the trigger fires.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerPoint {
    pub time: f32,
    pub data: serde_json::Value,
}

/// Immutable keyframe data: named per-bone tracks plus trigger points.
///
/// Clips are built, then published to a [`Library`](crate::Library) behind an
/// `Arc` and shared read-only by any number of playback states.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnimationClip {
    name: String,
    hash: NameHash,
    length: f32,
    tracks: Vec<Track>,
    #[serde(skip)]
    track_lookup: FxHashMap<NameHash, usize>,
    triggers: Vec<TriggerPoint>,
}

impl AnimationClip {
    #[must_use]
    pub fn new(name: &str, length: f32) -> Self {
        Self {
            name: name.to_string(),
            hash: NameHash::new(name),
            length: length.max(0.0),
            tracks: Vec::new(),
            track_lookup: FxHashMap::default(),
            triggers: Vec::new(),
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
    pub fn length(&self) -> f32 {
        self.length
    }

    pub fn set_length(&mut self, length: f32) {
        self.length = length.max(0.0);
    }

    // ========================================================================
    // Tracks
    // ========================================================================

    pub fn create_track(&mut self, name: &str, channels: Channels) -> &mut Track {
        let track = Track::new(name, channels);
        let index = self.tracks.len();
        self.track_lookup.insert(track.hash, index);
        self.tracks.push(track);
        &mut self.tracks[index]
    }

    pub fn remove_track(&mut self, hash: NameHash) -> bool {
        let Some(index) = self.track_index(hash) else {
            return false;
        };
        self.tracks.remove(index);
        self.rebuild_track_lookup();
        true
    }

    pub fn remove_all_tracks(&mut self) {
        self.tracks.clear();
        self.track_lookup.clear();
    }

    #[inline]
    #[must_use]
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    #[inline]
    #[must_use]
    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    #[inline]
    #[must_use]
    pub fn track(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    #[must_use]
    pub fn track_index(&self, hash: NameHash) -> Option<usize> {
        self.track_lookup.get(&hash).copied()
    }

    #[must_use]
    pub fn track_by_hash(&self, hash: NameHash) -> Option<&Track> {
        self.track_index(hash).map(|i| &self.tracks[i])
    }

    #[must_use]
    pub fn track_by_name(&self, name: &str) -> Option<&Track> {
        self.track_by_hash(NameHash::new(name))
    }

    pub(crate) fn rebuild_track_lookup(&mut self) {
        self.track_lookup = self
            .tracks
            .iter()
            .enumerate()
            .map(|(i, t)| (t.hash, i))
            .collect();
    }

    // ========================================================================
    // Triggers
    // ========================================================================

    /// Inserts keeping time order (after equal times).
    pub fn add_trigger(&mut self, time: f32, data: serde_json::Value) {
        let pos = self.triggers.partition_point(|t| t.time <= time);
        self.triggers.insert(pos, TriggerPoint { time, data });
    }

    /// Adds a trigger at `fraction` of the clip length.
    pub fn add_trigger_normalized(&mut self, fraction: f32, data: serde_json::Value) {
        self.add_trigger(fraction.clamp(0.0, 1.0) * self.length, data);
    }

    pub fn remove_trigger(&mut self, index: usize) -> bool {
        if index < self.triggers.len() {
            self.triggers.remove(index);
            true
        } else {
            false
        }
    }

    pub fn remove_all_triggers(&mut self) {
        self.triggers.clear();
    }

    #[inline]
    #[must_use]
    pub fn triggers(&self) -> &[TriggerPoint] {
        &self.triggers
    }

    /// Triggers inside the traversed interval `(start, end]`, or
    /// `[start, end]` when `include_start` is set (the segment beginning at a
    /// loop wrap includes its start point).
    pub fn triggers_in(
        &self,
        start: f32,
        end: f32,
        include_start: bool,
    ) -> impl Iterator<Item = &TriggerPoint> {
        self.triggers.iter().filter(move |t| {
            (t.time > start || (include_start && t.time >= start)) && t.time <= end
        })
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let mut clip: AnimationClip = serde_json::from_str(json)?;
        clip.rebuild_track_lookup();
        Ok(clip)
    }
}
