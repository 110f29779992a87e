use serde::{Deserialize, Serialize};

use crate::animation::state::AnimationBlendMode;
use crate::errors::Result;
use crate::hash::NameHash;

/// A last-writer-wins replicated field: `(value, revision, time-to-live)`.
///
/// A command is accepted only when its revision is strictly newer than the
/// last accepted one, so duplicated or reordered deliveries are idempotent.
/// An accepted command stays pending (available for outbound replication)
/// until its TTL elapses; decay clears the pending value but not the
/// last-accepted revision, so a decayed command replayed later is still
/// rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplicatedField<T> {
    pending: Option<(T, f32)>,
    last_revision: u32,
}

impl<T: Copy> ReplicatedField<T> {
    /// Offers a remote command. Returns whether it was accepted.
    pub fn offer(&mut self, value: T, revision: u32, ttl: f32) -> bool {
        if revision <= self.last_revision {
            return false;
        }
        self.last_revision = revision;
        self.pending = Some((value, ttl));
        true
    }

    /// Ages the pending command; expired commands decay.
    pub fn tick(&mut self, dt: f32) {
        if let Some((_, ttl)) = &mut self.pending {
            *ttl -= dt;
            if *ttl <= 0.0 {
                self.pending = None;
            }
        }
    }

    /// The live (not yet decayed) command value, for outbound replication.
    #[must_use]
    pub fn pending(&self) -> Option<T> {
        self.pending.map(|(value, _)| value)
    }

    #[inline]
    #[must_use]
    pub fn last_revision(&self) -> u32 {
        self.last_revision
    }
}

/// Serializable record of one active control, for outbound replication and
/// persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlSnapshot {
    pub name: String,
    pub layer: u8,
    pub time: f32,
    pub weight: f32,
    pub speed: f32,
    pub looped: bool,
    pub blend_mode: AnimationBlendMode,
    pub target_weight: f32,
    pub fade_time: f32,
    pub auto_fade_time: f32,
    pub remove_on_completion: bool,
}

/// Serializable record of one node-hierarchy state, including the compact
/// per-track weight blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeStateSnapshot {
    pub clip: String,
    pub time: f32,
    pub weight: f32,
    pub looped: bool,
    pub layer: u8,
    pub blend_mode: AnimationBlendMode,
    pub weight_overrides: Vec<(NameHash, f32)>,
}

/// Full serializable controller state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControllerSnapshot {
    pub controls: Vec<ControlSnapshot>,
    pub node_states: Vec<NodeStateSnapshot>,
}

impl ControllerSnapshot {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strictly_newer_revision_applies() {
        let mut field = ReplicatedField::default();
        assert!(field.offer(1.0_f32, 1, 0.5));
        assert!(!field.offer(2.0, 1, 0.5), "equal revision must be ignored");
        assert!(!field.offer(3.0, 0, 0.5), "older revision must be ignored");
        assert!(field.offer(4.0, 2, 0.5));
        assert_eq!(field.pending(), Some(4.0));
    }

    #[test]
    fn decay_keeps_revision() {
        let mut field = ReplicatedField::default();
        assert!(field.offer(1.0_f32, 5, 0.2));
        field.tick(0.3);
        assert_eq!(field.pending(), None, "command must decay after its TTL");
        assert!(
            !field.offer(9.0, 5, 0.2),
            "decay must not reopen old revisions"
        );
        assert!(field.offer(9.0, 6, 0.2));
    }
}
