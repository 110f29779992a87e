//! Shared clip/skeleton registry.
//!
//! Stands in for the embedder's resource cache: immutable clips and skeleton
//! definitions behind `Arc`, shared read-only by any number of playback
//! states and safe to query from worker threads. Replacing an entry bumps a
//! generation counter — the reload notification consumers poll to re-resolve
//! their cached track→bone/node bindings.

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::animation::clip::AnimationClip;
use crate::errors::{MarrowError, Result};
use crate::hash::NameHash;
use crate::scene::skeleton::Skeleton;

#[derive(Default)]
struct LibraryInner {
    clips: FxHashMap<NameHash, Arc<AnimationClip>>,
    skeletons: FxHashMap<NameHash, Arc<Skeleton>>,
    generation: u64,
}

/// Thread-safe registry of animation clips and skeleton definitions.
#[derive(Default)]
pub struct Library {
    inner: RwLock<LibraryInner>,
}

impl Library {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) a clip under its own name. Returns the
    /// previous entry; any replacement bumps the generation.
    pub fn insert_clip(&self, clip: AnimationClip) -> Option<Arc<AnimationClip>> {
        let mut inner = self.inner.write();
        inner.generation += 1;
        let previous = inner.clips.insert(clip.hash(), Arc::new(clip));
        if previous.is_some() {
            log::debug!("library: clip replaced, generation {}", inner.generation);
        }
        previous
    }

    /// Registers (or replaces) a skeleton definition under `name`.
    pub fn insert_skeleton(&self, name: &str, skeleton: Skeleton) -> Option<Arc<Skeleton>> {
        let mut inner = self.inner.write();
        inner.generation += 1;
        inner
            .skeletons
            .insert(NameHash::new(name), Arc::new(skeleton))
    }

    #[must_use]
    pub fn clip(&self, hash: NameHash) -> Option<Arc<AnimationClip>> {
        self.inner.read().clips.get(&hash).cloned()
    }

    #[must_use]
    pub fn clip_by_name(&self, name: &str) -> Option<Arc<AnimationClip>> {
        self.clip(NameHash::new(name))
    }

    #[must_use]
    pub fn skeleton(&self, name: &str) -> Option<Arc<Skeleton>> {
        self.inner.read().skeletons.get(&NameHash::new(name)).cloned()
    }

    /// [`clip_by_name`](Self::clip_by_name) as a hard requirement, for
    /// loading paths where a missing clip is a real error rather than a
    /// skippable lookup failure.
    pub fn require_clip(&self, name: &str) -> Result<Arc<AnimationClip>> {
        self.clip_by_name(name)
            .ok_or_else(|| MarrowError::ClipNotFound(name.to_string()))
    }

    /// [`skeleton`](Self::skeleton) as a hard requirement.
    pub fn require_skeleton(&self, name: &str) -> Result<Arc<Skeleton>> {
        self.skeleton(name)
            .ok_or_else(|| MarrowError::SkeletonNotFound(name.to_string()))
    }

    /// Monotonic counter bumped on every insert/replace. Consumers caching
    /// resolved bindings re-resolve when this moves.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.inner.read().generation
    }

    /// Parses a persisted clip and registers it.
    pub fn load_clip_json(&self, json: &str) -> Result<Arc<AnimationClip>> {
        let clip = Arc::new(AnimationClip::from_json(json)?);
        let mut inner = self.inner.write();
        inner.generation += 1;
        inner.clips.insert(clip.hash(), clip.clone());
        Ok(clip)
    }
}
